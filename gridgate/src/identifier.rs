//! Composite primary keys carried as a single token, e.g. `North|42`.
//!
//! The token stays an opaque string through the generic dispatch layer; it is decoded against
//! the entity's key types only inside the entity write procedure. Components that contain the
//! delimiter cannot be represented and are rejected on encode.

use crate::error::AppError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use utoipa::ToSchema;

pub const DELIMITER: char = '|';
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    Int,
    Text,
    Bool,
    Date,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyComponent {
    Int(i64),
    Text(String),
    Bool(bool),
    Date(NaiveDate),
}

impl KeyComponent {
    pub fn parse(raw: &str, key_type: KeyType) -> Result<KeyComponent, AppError> {
        let invalid = || AppError::invalid_type(format!("key component '{}' is not a valid {:?}", raw, key_type));
        match key_type {
            KeyType::Int => raw.parse::<i64>().map(KeyComponent::Int).map_err(|_| invalid()),
            KeyType::Text => Ok(KeyComponent::Text(raw.to_string())),
            KeyType::Bool => match raw {
                "true" | "1" => Ok(KeyComponent::Bool(true)),
                "false" | "0" => Ok(KeyComponent::Bool(false)),
                _ => Err(invalid()),
            },
            KeyType::Date => NaiveDate::parse_from_str(raw, DATE_FORMAT).map(KeyComponent::Date).map_err(|_| invalid()),
        }
    }

    /// Reads a key component out of a row field.
    pub fn from_json(field: &str, value: &Value, key_type: KeyType) -> Result<KeyComponent, AppError> {
        match (key_type, value) {
            (KeyType::Int, Value::Number(n)) => n
                .as_i64()
                .map(KeyComponent::Int)
                .ok_or_else(|| AppError::invalid_type(format!("key field {} is not an integer", field))),
            (KeyType::Bool, Value::Bool(b)) => Ok(KeyComponent::Bool(*b)),
            (_, Value::String(s)) => KeyComponent::parse(s, key_type),
            (_, Value::Null) => Err(AppError::invalid_format(format!("key field {} is missing", field))),
            _ => Err(AppError::invalid_type(format!("key field {} is not a valid {:?}", field, key_type))),
        }
    }
}

impl fmt::Display for KeyComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyComponent::Int(i) => write!(f, "{}", i),
            KeyComponent::Text(s) => write!(f, "{}", s),
            KeyComponent::Bool(b) => write!(f, "{}", b),
            KeyComponent::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
        }
    }
}

pub fn encode(components: &[KeyComponent]) -> Result<String, AppError> {
    if components.is_empty() {
        return Err(AppError::invalid_format("identifier needs at least one component"));
    }
    let mut parts = Vec::with_capacity(components.len());
    for component in components {
        let text = component.to_string();
        if text.contains(DELIMITER) {
            return Err(AppError::invalid_format(format!("key component '{}' contains the delimiter '{}'", text, DELIMITER)));
        }
        parts.push(text);
    }
    Ok(parts.join(&DELIMITER.to_string()))
}

pub fn decode(token: &str, expected: &[KeyType]) -> Result<Vec<KeyComponent>, AppError> {
    let parts: Vec<&str> = token.split(DELIMITER).collect();
    if parts.len() != expected.len() {
        return Err(AppError::invalid_format(format!(
            "identifier '{}' has {} components, expected {}",
            token,
            parts.len(),
            expected.len()
        )));
    }
    parts
        .into_iter()
        .zip(expected.iter())
        .map(|(raw, key_type)| KeyComponent::parse(raw, *key_type))
        .collect()
}
