//! Translates a grid filter model into parameter-bound predicates.
//!
//! Column names are only ever embedded after being found in the entity's declared column type table,
//! operands are only ever bound. Every predicate renders to a SQL fragment and evaluates in-process
//! against a row with the same semantics, so a count and a page fetch driven by one
//! [`TranslatedFilter`] always agree.

use crate::error::AppError;
use crate::model::Row;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Text,
    Numeric,
    Set,
}

impl ColumnType {
    /// Filter widget the grid should offer for this column.
    pub fn filter_widget(&self) -> &'static str {
        match self {
            ColumnType::Text => "agTextColumnFilter",
            ColumnType::Numeric => "agNumberColumnFilter",
            ColumnType::Set => "agSetColumnFilter",
        }
    }
}

/// Declared column → type table of one entity.
pub type ColumnTypes = BTreeMap<String, ColumnType>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum SortDirection {
    #[default]
    #[serde(rename = "ASC", alias = "asc", alias = "Asc")]
    Asc,
    #[serde(rename = "DESC", alias = "desc", alias = "Desc")]
    Desc,
}

/// One column entry of the filter model as sent by the grid.
///
/// The operator may come as `type`, `operator`, or directly as `filterType` when the latter is not
/// a column family word (`text`, `number`, `set`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FilterEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_type: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub filter: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub filter_to: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Vec<Object>)]
    pub values: Option<Vec<Value>>,
}

const FAMILY_WORDS: [&str; 5] = ["text", "number", "numeric", "set", "date"];

impl FilterEntry {
    pub fn text(operator: &str, operand: &str) -> Self {
        FilterEntry { filter_type: Some("text".into()), kind: Some(operator.into()), filter: Some(Value::from(operand)), ..Default::default() }
    }

    pub fn number(operator: &str, operand: impl Into<Value>) -> Self {
        FilterEntry { filter_type: Some("number".into()), kind: Some(operator.into()), filter: Some(operand.into()), ..Default::default() }
    }

    pub fn set<I: IntoIterator<Item = V>, V: Into<Value>>(values: I) -> Self {
        FilterEntry { filter_type: Some("set".into()), values: Some(values.into_iter().map(Into::into).collect()), ..Default::default() }
    }

    fn family(&self) -> Option<&str> {
        self.filter_type.as_deref().filter(|ft| FAMILY_WORDS.contains(ft))
    }

    fn operator(&self) -> Option<&str> {
        self.kind
            .as_deref()
            .or(self.operator.as_deref())
            .or_else(|| self.filter_type.as_deref().filter(|ft| !FAMILY_WORDS.contains(ft)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextOp {
    Contains,
    NotContains,
    Equals,
    NotEqual,
    StartsWith,
    EndsWith,
}

impl TextOp {
    pub fn parse(op: Option<&str>) -> TextOp {
        match op {
            Some("notContains") => TextOp::NotContains,
            Some("equals") => TextOp::Equals,
            Some("notEqual") => TextOp::NotEqual,
            Some("startsWith") => TextOp::StartsWith,
            Some("endsWith") => TextOp::EndsWith,
            _ => TextOp::Contains,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericOp {
    Equals,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    InRange,
}

impl NumericOp {
    pub fn parse(op: Option<&str>) -> NumericOp {
        match op {
            Some("notEqual") => NumericOp::NotEqual,
            Some("lessThan") => NumericOp::LessThan,
            Some("lessThanOrEqual") => NumericOp::LessThanOrEqual,
            Some("greaterThan") => NumericOp::GreaterThan,
            Some("greaterThanOrEqual") => NumericOp::GreaterThanOrEqual,
            Some("inRange") => NumericOp::InRange,
            _ => NumericOp::Equals,
        }
    }

    fn sql(&self) -> &'static str {
        match self {
            NumericOp::Equals => "=",
            NumericOp::NotEqual => "<>",
            NumericOp::LessThan => "<",
            NumericOp::LessThanOrEqual => "<=",
            NumericOp::GreaterThan => ">",
            NumericOp::GreaterThanOrEqual => ">=",
            NumericOp::InRange => "BETWEEN",
        }
    }
}

/// A value bound to a `?n` placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    Number(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Text { column: String, op: TextOp, needle: String },
    Numeric { column: String, op: NumericOp, operand: f64, operand_to: Option<f64> },
    Set { column: String, members: Vec<String> },
    Search { columns: Vec<String>, needle: String },
}

pub fn quote_ident(column: &str) -> String {
    format!("\"{}\"", column.replace('"', "\"\""))
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn bind(params: &mut Vec<SqlParam>, param: SqlParam) -> String {
    params.push(param);
    format!("?{}", params.len())
}

pub(crate) fn text_of(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    }
}

pub(crate) fn number_of(value: Option<&Value>) -> Option<f64> {
    match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

impl Predicate {
    /// Renders the SQL fragment, appending its operands to `params`.
    pub fn render(&self, params: &mut Vec<SqlParam>) -> String {
        match self {
            Predicate::Text { column, op, needle } => {
                let col = format!("LOWER({})", quote_ident(column));
                let like = |params: &mut Vec<SqlParam>, pattern: String, negate: bool| {
                    let not = if negate { "NOT " } else { "" };
                    format!("{} {}LIKE {} ESCAPE '\\'", col, not, bind(params, SqlParam::Text(pattern)))
                };
                match op {
                    TextOp::Contains => like(params, format!("%{}%", escape_like(needle)), false),
                    TextOp::NotContains => like(params, format!("%{}%", escape_like(needle)), true),
                    TextOp::StartsWith => like(params, format!("{}%", escape_like(needle)), false),
                    TextOp::EndsWith => like(params, format!("%{}", escape_like(needle)), false),
                    TextOp::Equals => format!("{} = {}", col, bind(params, SqlParam::Text(needle.clone()))),
                    TextOp::NotEqual => format!("{} <> {}", col, bind(params, SqlParam::Text(needle.clone()))),
                }
            }
            Predicate::Numeric { column, op, operand, operand_to } => match (op, operand_to) {
                (NumericOp::InRange, Some(to)) => {
                    let from = bind(params, SqlParam::Number(*operand));
                    let to = bind(params, SqlParam::Number(*to));
                    format!("{} BETWEEN {} AND {}", quote_ident(column), from, to)
                }
                _ => format!("{} {} {}", quote_ident(column), op.sql(), bind(params, SqlParam::Number(*operand))),
            },
            Predicate::Set { column, members } => {
                if members.is_empty() {
                    return "1 = 0".to_string();
                }
                let alternatives: Vec<String> = members
                    .iter()
                    .map(|m| format!("{} = {}", quote_ident(column), bind(params, SqlParam::Text(m.clone()))))
                    .collect();
                format!("({})", alternatives.join(" OR "))
            }
            Predicate::Search { columns, needle } => {
                let pattern = format!("%{}%", escape_like(needle));
                let alternatives: Vec<String> = columns
                    .iter()
                    .map(|c| format!("LOWER({}) LIKE {} ESCAPE '\\'", quote_ident(c), bind(params, SqlParam::Text(pattern.clone()))))
                    .collect();
                format!("({})", alternatives.join(" OR "))
            }
        }
    }

    /// Missing and null values never satisfy a predicate, mirroring SQL's NULL handling.
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Predicate::Text { column, op, needle } => match text_of(row.get(column)) {
                None => false,
                Some(text) => {
                    let hay = text.to_lowercase();
                    match op {
                        TextOp::Contains => hay.contains(needle.as_str()),
                        TextOp::NotContains => !hay.contains(needle.as_str()),
                        TextOp::Equals => hay == *needle,
                        TextOp::NotEqual => hay != *needle,
                        TextOp::StartsWith => hay.starts_with(needle.as_str()),
                        TextOp::EndsWith => hay.ends_with(needle.as_str()),
                    }
                }
            },
            Predicate::Numeric { column, op, operand, operand_to } => match number_of(row.get(column)) {
                None => false,
                Some(v) => match op {
                    NumericOp::Equals => v == *operand,
                    NumericOp::NotEqual => v != *operand,
                    NumericOp::LessThan => v < *operand,
                    NumericOp::LessThanOrEqual => v <= *operand,
                    NumericOp::GreaterThan => v > *operand,
                    NumericOp::GreaterThanOrEqual => v >= *operand,
                    NumericOp::InRange => v >= *operand && v <= operand_to.unwrap_or(*operand),
                },
            },
            Predicate::Set { column, members } => match text_of(row.get(column)) {
                None => false,
                Some(text) => members.iter().any(|m| *m == text),
            },
            Predicate::Search { columns, needle } => columns
                .iter()
                .filter_map(|c| text_of(row.get(c)))
                .any(|text| text.to_lowercase().contains(needle.as_str())),
        }
    }
}

/// Ordered, AND-combined predicates together with their rendered fragments and bound operands.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranslatedFilter {
    predicates: Vec<Predicate>,
    fragments: Vec<String>,
    params: Vec<SqlParam>,
}

impl TranslatedFilter {
    pub fn new(predicates: Vec<Predicate>) -> Self {
        let mut params = Vec::new();
        let fragments = predicates.iter().map(|p| p.render(&mut params)).collect();
        TranslatedFilter { predicates, fragments, params }
    }

    pub fn predicates(&self) -> &[Predicate] { &self.predicates }
    pub fn fragments(&self) -> &[String] { &self.fragments }
    pub fn params(&self) -> &[SqlParam] { &self.params }

    pub fn where_clause(&self) -> Option<String> {
        if self.fragments.is_empty() {
            None
        } else {
            Some(self.fragments.join(" AND "))
        }
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.predicates.iter().all(|p| p.matches(row))
    }
}

fn family_matches(family: &str, column_type: ColumnType) -> bool {
    matches!(
        (family, column_type),
        ("text", ColumnType::Text) | ("number" | "numeric", ColumnType::Numeric) | ("set", ColumnType::Set)
    )
}

fn numeric_operand(column: &str, value: Option<&Value>) -> Result<f64, AppError> {
    match value {
        Some(Value::Number(_)) | Some(Value::String(_)) => number_of(value)
            .filter(|n| n.is_finite())
            .ok_or_else(|| AppError::bad_filter(format!("filter on {} expects a numeric operand", column))),
        _ => Err(AppError::bad_filter(format!("filter on {} is missing a numeric operand", column))),
    }
}

fn translate_entry(column: &str, column_type: ColumnType, entry: &FilterEntry) -> Result<Predicate, AppError> {
    if let Some(family) = entry.family() {
        if !family_matches(family, column_type) {
            return Err(AppError::bad_filter(format!("{} filter does not apply to {:?} column {}", family, column_type, column)));
        }
    }
    match column_type {
        ColumnType::Text => {
            let needle = match &entry.filter {
                Some(Value::String(s)) => s.to_lowercase(),
                _ => return Err(AppError::bad_filter(format!("filter on {} expects a text operand", column))),
            };
            Ok(Predicate::Text { column: column.to_string(), op: TextOp::parse(entry.operator()), needle })
        }
        ColumnType::Numeric => {
            let op = NumericOp::parse(entry.operator());
            let operand = numeric_operand(column, entry.filter.as_ref())?;
            let operand_to = match op {
                NumericOp::InRange => Some(numeric_operand(column, entry.filter_to.as_ref())?),
                _ => None,
            };
            Ok(Predicate::Numeric { column: column.to_string(), op, operand, operand_to })
        }
        ColumnType::Set => {
            let values = match (&entry.values, &entry.filter) {
                (Some(values), _) => values,
                (None, Some(Value::Array(values))) => values,
                _ => return Err(AppError::bad_filter(format!("set filter on {} expects a list of values", column))),
            };
            let mut members = Vec::with_capacity(values.len());
            for value in values {
                match value {
                    Value::Null => {}
                    Value::Array(_) | Value::Object(_) => {
                        return Err(AppError::bad_filter(format!("set filter on {} accepts only scalar values", column)))
                    }
                    scalar => members.extend(text_of(Some(scalar))),
                }
            }
            Ok(Predicate::Set { column: column.to_string(), members })
        }
    }
}

/// Builds the AND-combined predicate list for one request.
///
/// Any filter key missing from `types` fails the whole request with `BadFilter`. A non-blank search
/// term becomes one OR-group over every declared text column.
pub fn translate(
    filters: &BTreeMap<String, FilterEntry>,
    search_term: Option<&str>,
    types: &ColumnTypes,
) -> Result<TranslatedFilter, AppError> {
    let mut predicates = Vec::with_capacity(filters.len() + 1);
    for (column, entry) in filters {
        let column_type = types
            .get(column)
            .ok_or_else(|| AppError::bad_filter(format!("unknown filter column {}", column)))?;
        predicates.push(translate_entry(column, *column_type, entry)?);
    }
    if let Some(term) = search_term.map(str::trim).filter(|t| !t.is_empty()) {
        let columns: Vec<String> = types
            .iter()
            .filter(|(_, t)| **t == ColumnType::Text)
            .map(|(c, _)| c.clone())
            .collect();
        if !columns.is_empty() {
            predicates.push(Predicate::Search { columns, needle: term.to_lowercase() });
        }
    }
    Ok(TranslatedFilter::new(predicates))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub column: String,
    pub column_type: ColumnType,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn new(column: &str, column_type: ColumnType, direction: SortDirection) -> Self {
        SortSpec { column: column.to_string(), column_type, direction }
    }

    pub fn order_by(&self) -> String {
        let direction = match self.direction {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        };
        format!("{} {}", quote_ident(&self.column), direction)
    }

    /// Ordered by the declared column type only. Values without a numeric (resp. text) reading sort
    /// first; numbers use `f64::total_cmp`, text compares case-insensitively.
    pub fn compare(&self, a: &Row, b: &Row) -> Ordering {
        let (va, vb) = (a.get(&self.column), b.get(&self.column));
        let ordering = match self.column_type {
            ColumnType::Numeric => match (number_of(va), number_of(vb)) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(x), Some(y)) => x.total_cmp(&y),
            },
            ColumnType::Text | ColumnType::Set => {
                text_of(va).map(|t| t.to_lowercase()).cmp(&text_of(vb).map(|t| t.to_lowercase()))
            }
        };
        match self.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

/// Validates the sort column against the same whitelist the filter uses.
pub fn resolve_sort(column: Option<&str>, direction: SortDirection, types: &ColumnTypes) -> Result<Option<SortSpec>, AppError> {
    match column.map(str::trim).filter(|c| !c.is_empty()) {
        None => Ok(None),
        Some(column) => match types.get(column) {
            Some(column_type) => Ok(Some(SortSpec::new(column, *column_type, direction))),
            None => Err(AppError::bad_filter(format!("unknown sort column {}", column))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use serde_json::json;

    fn types() -> ColumnTypes {
        [
            ("name".to_string(), ColumnType::Text),
            ("model".to_string(), ColumnType::Text),
            ("baskv".to_string(), ColumnType::Numeric),
            ("status".to_string(), ColumnType::Set),
        ]
        .into_iter()
        .collect()
    }

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    fn one(column: &str, entry: FilterEntry) -> TranslatedFilter {
        let filters = [(column.to_string(), entry)].into_iter().collect();
        translate(&filters, None, &types()).unwrap()
    }

    fn entry(value: Value) -> FilterEntry {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn contains_is_case_insensitive_substring() {
        let filter = one("name", entry(json!({"filterType": "contains", "filter": "abc"})));
        assert!(filter.matches(&row(json!({"name": "XabcY"}))));
        assert!(filter.matches(&row(json!({"name": "xABCy"}))));
        assert!(!filter.matches(&row(json!({"name": "xyz"}))));
        assert_eq!(filter.where_clause().unwrap(), "LOWER(\"name\") LIKE ?1 ESCAPE '\\'");
        assert_eq!(filter.params(), &[SqlParam::Text("%abc%".into())]);
    }

    #[test]
    fn greater_than_is_strict() {
        let filter = one("baskv", entry(json!({"type": "greaterThan", "filter": 100})));
        assert!(filter.matches(&row(json!({"baskv": 101}))));
        assert!(!filter.matches(&row(json!({"baskv": 100}))));
        assert_eq!(filter.fragments(), &["\"baskv\" > ?1".to_string()]);
        assert_eq!(filter.params(), &[SqlParam::Number(100.0)]);
    }

    #[test]
    fn numeric_operand_may_arrive_as_text() {
        let filter = one("baskv", entry(json!({"filterType": "greaterThan", "filter": "100"})));
        assert!(filter.matches(&row(json!({"baskv": 150}))));
        assert!(!filter.matches(&row(json!({"baskv": 99.5}))));
    }

    #[test]
    fn unrecognized_operators_fall_back_to_defaults() {
        let text = one("name", entry(json!({"filterType": "text", "type": "fuzzy", "filter": "bus"})));
        assert_eq!(text.predicates()[0], Predicate::Text { column: "name".into(), op: TextOp::Contains, needle: "bus".into() });
        let number = one("baskv", entry(json!({"filterType": "number", "filter": 7})));
        assert!(matches!(number.predicates()[0], Predicate::Numeric { op: NumericOp::Equals, .. }));
    }

    #[test]
    fn text_operators() {
        let r = row(json!({"name": "Volvo 7900"}));
        assert!(one("name", FilterEntry::text("equals", "VOLVO 7900")).matches(&r));
        assert!(!one("name", FilterEntry::text("notEqual", "volvo 7900")).matches(&r));
        assert!(one("name", FilterEntry::text("startsWith", "volvo")).matches(&r));
        assert!(one("name", FilterEntry::text("endsWith", "7900")).matches(&r));
        assert!(one("name", FilterEntry::text("notContains", "scania")).matches(&r));
        assert!(!one("name", FilterEntry::text("notContains", "volvo")).matches(&r));
    }

    #[test]
    fn in_range_binds_both_bounds() {
        let filter = one("baskv", entry(json!({"type": "inRange", "filter": 10, "filterTo": 20})));
        assert_eq!(filter.where_clause().unwrap(), "\"baskv\" BETWEEN ?1 AND ?2");
        assert!(filter.matches(&row(json!({"baskv": 20}))));
        assert!(!filter.matches(&row(json!({"baskv": 21}))));
        let missing_upper = [("baskv".to_string(), entry(json!({"type": "inRange", "filter": 10})))].into_iter().collect();
        assert_eq!(translate(&missing_upper, None, &types()).unwrap_err().code(), ErrorCode::BadFilter);
    }

    #[test]
    fn set_is_exact_membership_or_combined() {
        let filter = one("status", FilterEntry::set(["Active", "Repair"]));
        assert_eq!(filter.where_clause().unwrap(), "(\"status\" = ?1 OR \"status\" = ?2)");
        assert!(filter.matches(&row(json!({"status": "Repair"}))));
        assert!(!filter.matches(&row(json!({"status": "active"}))));
        let empty = one("status", FilterEntry::set(Vec::<String>::new()));
        assert_eq!(empty.where_clause().unwrap(), "1 = 0");
        assert!(!empty.matches(&row(json!({"status": "Active"}))));
    }

    #[test]
    fn unknown_column_fails_the_whole_request() {
        let filters = [
            ("name".to_string(), FilterEntry::text("contains", "a")),
            ("name; DROP TABLE buses".to_string(), FilterEntry::text("contains", "a")),
        ]
        .into_iter()
        .collect();
        let err = translate(&filters, None, &types()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadFilter);
    }

    #[test]
    fn operand_must_fit_declared_type() {
        let cases = vec![
            ("baskv", json!({"type": "greaterThan", "filter": "lots"})),
            ("baskv", json!({"type": "greaterThan"})),
            ("name", json!({"type": "contains", "filter": 5})),
            ("status", json!({"filterType": "set", "filter": "Active"})),
            ("name", json!({"filterType": "number", "type": "equals", "filter": 5})),
        ];
        for (column, raw) in cases {
            let filters = [(column.to_string(), entry(raw.clone()))].into_iter().collect();
            assert_eq!(translate(&filters, None, &types()).unwrap_err().code(), ErrorCode::BadFilter, "{}", raw);
        }
    }

    #[test]
    fn operands_are_bound_and_like_wildcards_escaped() {
        let filter = one("name", FilterEntry::text("contains", "50%_off' OR 1=1"));
        let clause = filter.where_clause().unwrap();
        assert!(!clause.contains("OR 1=1"));
        assert_eq!(filter.params(), &[SqlParam::Text("%50\\%\\_off' or 1=1%".into())]);
        assert!(filter.matches(&row(json!({"name": "get 50%_OFF' or 1=1 today"}))));
        assert!(!filter.matches(&row(json!({"name": "get 50 off"}))));
    }

    #[test]
    fn predicates_are_and_combined_with_running_placeholders() {
        let filters = [
            ("baskv".to_string(), FilterEntry::number("lessThan", 50)),
            ("name".to_string(), FilterEntry::text("startsWith", "v")),
        ]
        .into_iter()
        .collect();
        let filter = translate(&filters, Some("  Depot "), &types()).unwrap();
        assert_eq!(
            filter.where_clause().unwrap(),
            "\"baskv\" < ?1 AND LOWER(\"name\") LIKE ?2 ESCAPE '\\' AND (LOWER(\"model\") LIKE ?3 ESCAPE '\\' OR LOWER(\"name\") LIKE ?4 ESCAPE '\\')"
        );
        assert!(filter.matches(&row(json!({"baskv": 10, "name": "Volvo", "model": "depot shuttle"}))));
        assert!(!filter.matches(&row(json!({"baskv": 10, "name": "Volvo", "model": "city"}))));
        assert!(!filter.matches(&row(json!({"baskv": 60, "name": "Volvo depot"}))));
    }

    #[test]
    fn null_and_missing_values_never_match() {
        let filter = one("name", FilterEntry::text("notContains", "x"));
        assert!(!filter.matches(&row(json!({"name": null}))));
        assert!(!filter.matches(&row(json!({}))));
    }

    #[test]
    fn sort_column_is_whitelisted() {
        let sort = resolve_sort(Some("baskv"), SortDirection::Desc, &types()).unwrap().unwrap();
        assert_eq!(sort.order_by(), "\"baskv\" DESC");
        assert_eq!(resolve_sort(Some(" "), SortDirection::Asc, &types()).unwrap(), None);
        assert_eq!(resolve_sort(Some("1; --"), SortDirection::Asc, &types()).unwrap_err().code(), ErrorCode::BadFilter);

        let (low, high) = (row(json!({"baskv": 9})), row(json!({"baskv": 10})));
        assert_eq!(sort.compare(&low, &high), Ordering::Greater);
        let by_name = SortSpec::new("name", ColumnType::Text, SortDirection::Asc);
        assert_eq!(by_name.compare(&row(json!({"name": null})), &row(json!({"name": "a"}))), Ordering::Less);
        assert_eq!(by_name.compare(&row(json!({"name": "b"})), &row(json!({"name": "A"}))), Ordering::Greater);
    }

    fn assert_total_order(sort: &SortSpec, rows: &[Row]) {
        for a in rows {
            for b in rows {
                assert_eq!(sort.compare(a, b), sort.compare(b, a).reverse(), "{:?} vs {:?}", a, b);
                for c in rows {
                    if sort.compare(a, b) != Ordering::Greater && sort.compare(b, c) != Ordering::Greater {
                        assert_ne!(sort.compare(a, c), Ordering::Greater, "{:?} <= {:?} <= {:?}", a, b, c);
                    }
                }
            }
        }
    }

    #[test]
    fn digit_like_text_sorts_as_text() {
        let by_name = SortSpec::new("name", ColumnType::Text, SortDirection::Asc);
        let mut rows: Vec<Row> = ["10", "9", "1a", "Nan", "inf", "2z", "x"].iter().map(|n| row(json!({"name": n}))).collect();
        rows.push(row(json!({"name": null})));
        assert_total_order(&by_name, &rows);

        rows.sort_by(|a, b| by_name.compare(a, b));
        let names: Vec<Value> = rows.iter().map(|r| r["name"].clone()).collect();
        assert_eq!(names, vec![json!(null), json!("10"), json!("1a"), json!("2z"), json!("9"), json!("inf"), json!("Nan"), json!("x")]);
    }

    #[test]
    fn numeric_sort_is_total_over_unparseable_values() {
        let by_kv = SortSpec::new("baskv", ColumnType::Numeric, SortDirection::Desc);
        let mut rows: Vec<Row> =
            [json!(10), json!("9"), json!(115.5), json!("nan"), json!("n/a"), json!(null), json!(-1)].into_iter().map(|v| row(json!({"baskv": v}))).collect();
        assert_total_order(&by_kv, &rows);

        rows.sort_by(|a, b| by_kv.compare(a, b));
        assert_eq!(rows[0]["baskv"], json!("nan"));
        assert_eq!(rows[1]["baskv"], json!(115.5));
        assert_eq!(rows[2]["baskv"], json!(10));
        assert_eq!(rows[3]["baskv"], json!("9"));
        assert_eq!(rows[4]["baskv"], json!(-1));
    }

    #[test]
    fn sort_direction_accepts_grid_spellings() {
        let asc: SortDirection = serde_json::from_value(json!("asc")).unwrap();
        let desc: SortDirection = serde_json::from_value(json!("DESC")).unwrap();
        assert_eq!((asc, desc), (SortDirection::Asc, SortDirection::Desc));
    }
}
