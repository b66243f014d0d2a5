//! gridgate dispatches data-grid reads and writes to registered entity procedures.
//!
//! A request names a procedure; the registry decides whether the caller may run it, the filter
//! model is translated against the entity's declared columns, and reads pick between shipping the
//! whole result set and windowed pages. Writes go to update/delete procedures derived from the grid
//! name and address rows through composite identifier tokens.
//!
pub mod columns;
pub mod demo;
pub mod entity;
pub mod error;
pub mod executor;
pub mod filter;
pub mod gate;
pub mod identifier;
pub mod launcher;
pub mod logger;
pub mod model;
pub mod naming;
pub mod pagination;
pub mod procedure;
pub mod registry;
pub mod rest;
pub mod settings;
pub mod store;

pub use axum;
pub use redb;
pub use serde_json;
pub use utoipa;

pub use columns::{augment, Augmentations, ColumnAugmentation, ColumnDef, ColumnMeta, DropdownConfig, LinkConfig};
pub use entity::{EntityDescriptor, KeyPart, ValidationRule};
pub use error::{AppError, ErrorCode};
pub use executor::GridExecutor;
pub use filter::{translate, ColumnType, ColumnTypes, FilterEntry, SortDirection, SortSpec, TranslatedFilter};
pub use gate::{authorize, Caller, GateDecision};
pub use identifier::{KeyComponent, KeyType};
pub use model::{DeleteRequest, ErrorResponse, GridRequest, GridResult, Row, UpdateRequest, WriteCapabilities, WriteResponse};
pub use naming::{derive_write_procedures, WriteProcedures};
pub use pagination::{PaginationMode, SessionPaging};
pub use procedure::{EntityProcedure, ProcedureCatalog, ProcedureKind};
pub use registry::{ProcedureRegistration, RedbRegistry, RegistryCache, RegistrySource};
pub use rest::{build_router, serve, AppJson, RequestState};
pub use settings::{AppConfig, GridSettings};
pub use store::{GridStore, RedbStore, StoreRouter};
