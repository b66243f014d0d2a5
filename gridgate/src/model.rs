use crate::columns::ColumnMeta;
use crate::error::{AppError, ErrorCode};
use crate::filter::{FilterEntry, SortDirection};
use crate::pagination::{PageAddress, PaginationMode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use utoipa::ToSchema;

/// One row as exchanged with the grid: field name → value.
pub type Row = serde_json::Map<String, Value>;

fn first_page() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GridRequest {
    #[schema(example = "sp_Grid_Buses")]
    pub procedure_name: String,
    #[serde(default = "first_page")]
    pub page_number: u32,
    #[serde(default)]
    pub page_size: u32,
    #[serde(default)]
    pub start_row: Option<u64>,
    #[serde(default)]
    pub end_row: Option<u64>,
    #[serde(default)]
    pub sort_column: Option<String>,
    #[serde(default)]
    pub sort_direction: SortDirection,
    #[serde(default)]
    pub filter_spec: BTreeMap<String, FilterEntry>,
    #[serde(default)]
    pub search_term: Option<String>,
}

impl GridRequest {
    pub fn new(procedure_name: impl Into<String>) -> Self {
        GridRequest {
            procedure_name: procedure_name.into(),
            page_number: first_page(),
            page_size: 0,
            start_row: None,
            end_row: None,
            sort_column: None,
            sort_direction: SortDirection::Asc,
            filter_spec: BTreeMap::new(),
            search_term: None,
        }
    }

    pub fn page(mut self, page_number: u32, page_size: u32) -> Self {
        self.page_number = page_number;
        self.page_size = page_size;
        self
    }

    pub fn rows(mut self, start_row: u64, end_row: u64) -> Self {
        self.start_row = Some(start_row);
        self.end_row = Some(end_row);
        self
    }

    pub fn sort(mut self, column: &str, direction: SortDirection) -> Self {
        self.sort_column = Some(column.to_string());
        self.sort_direction = direction;
        self
    }

    pub fn filter(mut self, column: &str, entry: FilterEntry) -> Self {
        self.filter_spec.insert(column.to_string(), entry);
        self
    }

    pub fn search(mut self, term: &str) -> Self {
        self.search_term = Some(term.to_string());
        self
    }

    pub fn address(&self) -> PageAddress {
        PageAddress { page_number: self.page_number, page_size: self.page_size, start_row: self.start_row, end_row: self.end_row }
    }

    /// Canonical text of everything that changes the result set, used to detect sort/filter changes.
    pub fn query_signature(&self) -> Result<String, AppError> {
        let signature = serde_json::to_string(&(&self.sort_column, self.sort_direction, &self.filter_spec, &self.search_term))?;
        Ok(signature)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GridResult {
    #[schema(value_type = Vec<Object>)]
    pub rows: Vec<Row>,
    pub columns: Vec<ColumnMeta>,
    pub total_count: u64,
    pub page_number: u64,
    pub page_size: u64,
    pub total_pages: u64,
    pub pagination_mode: PaginationMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    #[schema(example = "sp_Grid_Buses")]
    pub procedure_name: String,
    #[schema(example = "North|42")]
    pub row_id: String,
    #[schema(value_type = Object)]
    pub changes: Row,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRequest {
    #[schema(example = "sp_Grid_Buses")]
    pub procedure_name: String,
    #[schema(example = "North|42")]
    pub row_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WriteResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<u64>,
}

impl WriteResponse {
    pub fn ok(message: impl Into<String>, rows_affected: u64) -> Self {
        WriteResponse { success: true, message: message.into(), error_code: None, rows_affected: Some(rows_affected) }
    }

    pub fn done(message: impl Into<String>) -> Self {
        WriteResponse { success: true, message: message.into(), error_code: None, rows_affected: None }
    }
}

/// Failure envelope returned for every rejected request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    pub error_code: ErrorCode,
    pub code: u16,
}

impl From<&AppError> for ErrorResponse {
    fn from(err: &AppError) -> Self {
        ErrorResponse { success: false, message: err.public_message(), error_code: err.code(), code: err.status_code().as_u16() }
    }
}

/// Write procedures a caller may dispatch for a grid; `None` means unsupported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WriteCapabilities {
    pub procedure_name: String,
    pub update: Option<String>,
    pub delete: Option<String>,
}
