//! Entity descriptors: declared columns, composite key layout and row level validation rules.

use crate::columns::{ColumnDef, ColumnMeta};
use crate::error::AppError;
use crate::filter::{self, number_of, text_of, ColumnType, ColumnTypes, SortDirection, SortSpec};
use crate::identifier::{self, KeyComponent, KeyType};
use crate::model::Row;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPart {
    pub field: String,
    pub key_type: KeyType,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationRule {
    /// Inclusive numeric bounds on one field.
    Range { field: String, min: f64, max: f64 },
    /// `lower <= upper` whenever both fields are set, numerically or as ISO dates.
    Ordered { lower: String, upper: String },
}

impl ValidationRule {
    pub fn check(&self, row: &Row) -> Result<(), AppError> {
        match self {
            ValidationRule::Range { field, min, max } => match row.get(field) {
                None | Some(Value::Null) => Ok(()),
                value => match number_of(value) {
                    Some(n) if n >= *min && n <= *max => Ok(()),
                    _ => Err(AppError::validation(format!("{} must be between {} and {}", field, min, max))),
                },
            },
            ValidationRule::Ordered { lower, upper } => {
                let (a, b) = (row.get(lower), row.get(upper));
                let in_order = match (number_of(a), number_of(b)) {
                    (Some(x), Some(y)) => x <= y,
                    _ => match (text_of(a), text_of(b)) {
                        (Some(x), Some(y)) => x <= y,
                        _ => true,
                    },
                };
                if in_order {
                    Ok(())
                } else {
                    Err(AppError::validation(format!("{} must not be after {}", lower, upper)))
                }
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EntityDescriptor {
    name: String,
    columns: Vec<ColumnDef>,
    types: ColumnTypes,
    key: Vec<KeyPart>,
    rules: Vec<ValidationRule>,
    unique: Vec<String>,
}

impl EntityDescriptor {
    pub fn new(name: &str) -> Self {
        EntityDescriptor { name: name.to_string(), ..Default::default() }
    }

    pub fn column(mut self, column: ColumnDef) -> Self {
        self.types.insert(column.field.clone(), column.column_type);
        self.columns.push(column);
        self
    }

    pub fn key(mut self, field: &str, key_type: KeyType) -> Self {
        self.key.push(KeyPart { field: field.to_string(), key_type });
        self
    }

    pub fn rule(mut self, rule: ValidationRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn unique(mut self, field: &str) -> Self {
        self.unique.push(field.to_string());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column_types(&self) -> &ColumnTypes {
        &self.types
    }

    pub fn key_types(&self) -> Vec<KeyType> {
        self.key.iter().map(|k| k.key_type).collect()
    }

    pub fn unique_fields(&self) -> &[String] {
        &self.unique
    }

    pub fn column_meta(&self) -> Vec<ColumnMeta> {
        self.columns.iter().map(ColumnDef::meta).collect()
    }

    fn is_key_field(&self, field: &str) -> bool {
        self.key.iter().any(|k| k.field == field)
    }

    pub fn row_key(&self, row: &Row) -> Result<Vec<KeyComponent>, AppError> {
        self.key
            .iter()
            .map(|part| KeyComponent::from_json(&part.field, row.get(&part.field).unwrap_or(&Value::Null), part.key_type))
            .collect()
    }

    pub fn row_id(&self, row: &Row) -> Result<String, AppError> {
        identifier::encode(&self.row_key(row)?)
    }

    pub fn decode_key(&self, token: &str) -> Result<Vec<KeyComponent>, AppError> {
        identifier::decode(token, &self.key_types())
    }

    /// Checks a change set before it reaches storage: only declared, editable, non-key columns with
    /// values of the column's type.
    pub fn check_changes(&self, changes: &Row) -> Result<(), AppError> {
        if changes.is_empty() {
            return Err(AppError::validation("no changes given"));
        }
        for (field, value) in changes {
            if self.is_key_field(field) {
                return Err(AppError::validation(format!("key field {} cannot be changed", field)));
            }
            let column = self
                .columns
                .iter()
                .find(|c| c.field == *field)
                .ok_or_else(|| AppError::validation(format!("unknown field {}", field)))?;
            if !column.editable {
                return Err(AppError::validation(format!("field {} is not editable", field)));
            }
            let fits = match (column.column_type, value) {
                (_, Value::Null) => true,
                (ColumnType::Numeric, Value::Number(_)) => true,
                (ColumnType::Text, Value::String(_)) => true,
                (ColumnType::Set, Value::String(_) | Value::Number(_) | Value::Bool(_)) => true,
                _ => false,
            };
            if !fits {
                return Err(AppError::validation(format!("field {} expects a {:?} value", field, column.column_type)));
            }
        }
        Ok(())
    }

    /// Sort on a declared column that is not marked unsortable.
    pub fn resolve_sort(&self, column: Option<&str>, direction: SortDirection) -> Result<Option<SortSpec>, AppError> {
        let sort = filter::resolve_sort(column, direction, &self.types)?;
        if let Some(spec) = &sort {
            if self.columns.iter().any(|c| c.field == spec.column && !c.sortable) {
                return Err(AppError::bad_filter(format!("column {} is not sortable", spec.column)));
            }
        }
        Ok(sort)
    }

    pub fn validate_row(&self, row: &Row) -> Result<(), AppError> {
        self.rules.iter().try_for_each(|rule| rule.check(row))
    }

    pub fn merge(&self, current: &Row, changes: &Row) -> Row {
        let mut merged = current.clone();
        for (field, value) in changes {
            merged.insert(field.clone(), value.clone());
        }
        merged
    }
}
