//! Dynamic procedure dispatch: one authorize, one count, one fetch per read; one gated,
//! atomic entity procedure per write.

use crate::columns::augment;
use crate::error::AppError;
use crate::filter::translate;
use crate::gate::{self, Caller};
use crate::model::{DeleteRequest, GridRequest, GridResult, UpdateRequest, WriteCapabilities, WriteResponse};
use crate::naming;
use crate::pagination::{PageLimits, PaginationMode, SessionPaging, Window};
use crate::procedure::{EntityProcedure, ProcedureCatalog, ProcedureKind};
use crate::registry::{ProcedureRegistration, RegistryCache};
use crate::settings::GridSettings;
use crate::store::{GridStore, StoreRouter};
use crate::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

pub struct GridExecutor {
    registry: Arc<RegistryCache>,
    catalog: Arc<ProcedureCatalog>,
    stores: StoreRouter,
    paging: SessionPaging,
    query_timeout: Duration,
}

impl GridExecutor {
    pub fn new(registry: Arc<RegistryCache>, catalog: Arc<ProcedureCatalog>, stores: StoreRouter, settings: &GridSettings) -> Self {
        GridExecutor {
            registry,
            catalog,
            stores,
            paging: SessionPaging::new(settings.all_loaded_threshold, settings.session_capacity),
            query_timeout: settings.query_timeout,
        }
    }

    pub fn registry(&self) -> &RegistryCache {
        &self.registry
    }

    pub fn paging(&self) -> &SessionPaging {
        &self.paging
    }

    /// Runs a storage call on the blocking pool, giving up after the configured query timeout.
    async fn run_query<T, F>(&self, procedure: &str, query: F) -> Result<T, AppError>
    where
        F: FnOnce() -> Result<T, AppError> + Send + 'static,
        T: Send + 'static,
    {
        match tokio::time::timeout(self.query_timeout, tokio::task::spawn_blocking(query)).await {
            Ok(joined) => joined?,
            Err(_) => {
                warn!("{} timed out after {:?}", procedure, self.query_timeout);
                Err(AppError::timed_out(format!("{} timed out after {} ms", procedure, self.query_timeout.as_millis())))
            }
        }
    }

    /// Gate check against the registry; a passing caller gets the registration back.
    fn authorize(&self, caller: &Caller, procedure: &str) -> Result<ProcedureRegistration, AppError> {
        let registration = self.registry.lookup(procedure)?;
        let decision = gate::authorize(registration.as_ref(), caller);
        if !decision.is_allowed() {
            warn!("Denied {} to roles {:?}: {:?}", procedure, caller.roles, decision);
        }
        decision.into_result(procedure)?;
        registration.ok_or_else(|| AppError::not_found(format!("procedure {} not found", procedure)))
    }

    fn store_for(&self, registration: &ProcedureRegistration) -> Result<Arc<dyn GridStore>, AppError> {
        self.stores.resolve(&registration.database_routing_key)
    }

    pub async fn read(&self, caller: &Caller, request: GridRequest) -> Result<GridResult, AppError> {
        self.read_grid(caller, request).await.map_err(AppError::normalize)
    }

    async fn read_grid(&self, caller: &Caller, request: GridRequest) -> Result<GridResult, AppError> {
        let name = request.procedure_name.clone();
        let registration = self.authorize(caller, &name)?;
        let procedure = self
            .catalog
            .resolve(&name, ProcedureKind::Grid)
            .ok_or_else(|| AppError::not_found(format!("procedure {} is not a grid procedure", name)))?;
        let entity = procedure.entity();

        let filter = Arc::new(translate(&request.filter_spec, request.search_term.as_deref(), entity.column_types())?);
        let sort = entity.resolve_sort(request.sort_column.as_deref(), request.sort_direction)?;
        let limits = PageLimits::from(&registration);
        let address = request.address();
        let requested = address.window(limits)?;
        debug!("{} where {:?} params {:?}", name, filter.where_clause(), filter.params());

        let store = self.store_for(&registration)?;
        let total = {
            let (procedure, store, filter) = (procedure.clone(), store.clone(), filter.clone());
            self.run_query(&name, move || procedure.count(store.as_ref(), &filter)).await?
        };

        let decision = self.paging.advance(caller.session_id.as_deref(), &name, &request.query_signature()?, total)?;
        let window = match decision.mode {
            PaginationMode::AllLoaded => Window::all(total),
            _ if decision.restart_at_first_page() => address.first_page().window(limits)?,
            _ => requested,
        };

        let rows = {
            let (procedure, sort) = (procedure.clone(), sort.clone());
            self.run_query(&name, move || procedure.fetch(store.as_ref(), &filter, sort.as_ref(), window)).await?
        };

        let mut columns = entity.column_meta();
        if let Some(extras) = self.catalog.augmentations(&name) {
            augment(&mut columns, extras);
        }
        Ok(GridResult {
            rows,
            columns,
            total_count: total,
            page_number: window.page_number(),
            page_size: window.limit,
            total_pages: window.total_pages(total),
            pagination_mode: decision.mode,
        })
    }

    /// Resolves the write procedure derived from `read_name`, gating both the grid and the target.
    /// A target that is not registered, not active, or not executable is reported as unsupported.
    fn write_target(&self, caller: &Caller, read_name: &str, kind: ProcedureKind) -> Result<(Arc<EntityProcedure>, ProcedureRegistration), AppError> {
        self.authorize(caller, read_name)?;
        let unsupported = || AppError::not_found(format!("{:?} is not supported for {}", kind, read_name));
        let derived = naming::derive_write_procedures(read_name).ok_or_else(unsupported)?;
        let target = match kind {
            ProcedureKind::Update => derived.update,
            ProcedureKind::Delete => derived.delete,
            ProcedureKind::Grid => return Err(AppError::Custom(format!("{} is not a write procedure kind", read_name))),
        };
        let registration = self.registry.lookup(&target)?.filter(|r| r.is_active).ok_or_else(unsupported)?;
        let procedure = self.catalog.resolve(&target, kind).ok_or_else(unsupported)?;
        let decision = gate::authorize(Some(&registration), caller);
        if !decision.is_allowed() {
            warn!("Denied {} to roles {:?}: {:?}", target, caller.roles, decision);
        }
        decision.into_result(&target)?;
        Ok((procedure, registration))
    }

    pub async fn update(&self, caller: &Caller, request: UpdateRequest) -> Result<WriteResponse, AppError> {
        self.update_row(caller, request).await.map_err(AppError::normalize)
    }

    async fn update_row(&self, caller: &Caller, request: UpdateRequest) -> Result<WriteResponse, AppError> {
        let (procedure, registration) = self.write_target(caller, &request.procedure_name, ProcedureKind::Update)?;
        let store = self.store_for(&registration)?;
        let UpdateRequest { row_id, changes, .. } = request;
        let target = procedure.name().to_string();
        let row = row_id.clone();
        let affected = tokio::task::spawn_blocking(move || procedure.update(store.as_ref(), &row, &changes)).await??;
        info!("{} updated row {}", target, row_id);
        Ok(WriteResponse::ok(format!("row {} updated", row_id), affected))
    }

    pub async fn delete(&self, caller: &Caller, request: DeleteRequest) -> Result<WriteResponse, AppError> {
        self.delete_row(caller, request).await.map_err(AppError::normalize)
    }

    async fn delete_row(&self, caller: &Caller, request: DeleteRequest) -> Result<WriteResponse, AppError> {
        let (procedure, registration) = self.write_target(caller, &request.procedure_name, ProcedureKind::Delete)?;
        let store = self.store_for(&registration)?;
        let target = procedure.name().to_string();
        let row = request.row_id.clone();
        let affected = tokio::task::spawn_blocking(move || procedure.delete(store.as_ref(), &row)).await??;
        info!("{} deleted row {}", target, request.row_id);
        Ok(WriteResponse::ok(format!("row {} deleted", request.row_id), affected))
    }

    /// Derived write procedures the caller could dispatch for a grid it may read.
    pub fn capabilities(&self, caller: &Caller, read_name: &str) -> Result<WriteCapabilities, AppError> {
        self.authorize(caller, read_name).map_err(AppError::normalize)?;
        let check = |kind| match self.write_target(caller, read_name, kind) {
            Ok((procedure, _)) => Ok(Some(procedure.name().to_string())),
            Err(AppError::Grid { .. }) => Ok(None),
            Err(other) => Err(other.normalize()),
        };
        Ok(WriteCapabilities {
            procedure_name: read_name.to_string(),
            update: check(ProcedureKind::Update)?,
            delete: check(ProcedureKind::Delete)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo;
    use crate::error::ErrorCode;
    use crate::entity::EntityDescriptor;
    use crate::filter::{FilterEntry, SortDirection, SortSpec, TranslatedFilter};
    use crate::identifier::KeyComponent;
    use crate::model::Row;
    use crate::registry::RedbRegistry;
    use crate::store::{temp_database, RedbStore};
    use serde_json::json;
    use std::num::NonZeroUsize;

    /// Store whose counts stall, to exercise the query timeout.
    struct StallingStore {
        inner: RedbStore,
        stall: Duration,
    }

    impl GridStore for StallingStore {
        fn count(&self, entity: &EntityDescriptor, filter: &TranslatedFilter) -> Result<u64, AppError> {
            std::thread::sleep(self.stall);
            self.inner.count(entity, filter)
        }
        fn fetch(&self, entity: &EntityDescriptor, filter: &TranslatedFilter, sort: Option<&SortSpec>, window: Window) -> Result<Vec<Row>, AppError> {
            self.inner.fetch(entity, filter, sort, window)
        }
        fn insert(&self, entity: &EntityDescriptor, rows: Vec<Row>) -> Result<Vec<String>, AppError> {
            self.inner.insert(entity, rows)
        }
        fn update(&self, entity: &EntityDescriptor, key: &[KeyComponent], changes: &Row) -> Result<u64, AppError> {
            self.inner.update(entity, key, changes)
        }
        fn delete(&self, entity: &EntityDescriptor, key: &[KeyComponent]) -> Result<u64, AppError> {
            self.inner.delete(entity, key)
        }
    }

    fn executor_with(settings: GridSettings, stall: Option<Duration>) -> (GridExecutor, Arc<RedbRegistry>) {
        let db = temp_database("executor");
        let registry = Arc::new(RedbRegistry::new(db.clone()));
        let inner = RedbStore::new(db);
        demo::install(&registry, &inner, "Admin").unwrap();
        let store: Arc<dyn GridStore> = match stall {
            Some(stall) => Arc::new(StallingStore { inner, stall }),
            None => Arc::new(inner),
        };
        let cache = Arc::new(RegistryCache::new(registry.clone(), NonZeroUsize::new(16).unwrap(), Duration::from_secs(60)));
        let stores = StoreRouter::new().route(demo::MAIN_STORE, store);
        (GridExecutor::new(cache, Arc::new(demo::catalog()), stores, &settings), registry)
    }

    fn executor(settings: GridSettings) -> (GridExecutor, Arc<RedbRegistry>) {
        executor_with(settings, None)
    }

    fn user() -> Caller {
        Caller::with_roles(["User"])
    }

    fn changes(value: serde_json::Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn filtered_total_matches_unlimited_count_of_same_predicate() {
        let (executor, _) = executor(GridSettings::default());
        let request = GridRequest::new(demo::BUSES).page(1, 15).filter("baskv", FilterEntry::number("greaterThan", "100"));
        let page = executor.read(&user(), request).await.unwrap();

        let expected = demo::bus_rows().iter().filter(|r| r["baskv"].as_f64().unwrap() > 100.0).count() as u64;
        assert_eq!(page.total_count, expected);
        assert_eq!(page.rows.len(), 15);
        assert!(page.rows.iter().all(|r| r["baskv"].as_f64().unwrap() > 100.0));
        assert_eq!(page.pagination_mode, PaginationMode::Windowed);
        assert_eq!(page.total_pages, expected.div_ceil(15));
        assert_eq!(page.columns.iter().find(|c| c.field == "zone").unwrap().cell_editor.as_deref(), Some("agSelectCellEditor"));
    }

    #[tokio::test]
    async fn small_result_sets_are_loaded_whole() {
        let (executor, _) = executor(GridSettings::default());
        let hr = Caller::with_roles(["HR"]).session("s-1");
        let page = executor.read(&hr, GridRequest::new(demo::EMPLOYEES).page(2, 10)).await.unwrap();
        assert_eq!(page.pagination_mode, PaginationMode::AllLoaded);
        assert_eq!(page.rows.len() as u64, page.total_count);
        assert_eq!(page.page_number, 1);
        assert_eq!(page.total_pages, 1);
    }

    #[tokio::test]
    async fn changing_the_sort_restarts_a_windowed_session_at_page_one() {
        let (executor, _) = executor(GridSettings::default());
        let caller = user().session("s-2");
        let third = executor.read(&caller, GridRequest::new(demo::BUSES).page(3, 20)).await.unwrap();
        assert_eq!(third.page_number, 3);
        let again = executor.read(&caller, GridRequest::new(demo::BUSES).page(4, 20)).await.unwrap();
        assert_eq!(again.page_number, 4);
        let sorted = executor.read(&caller, GridRequest::new(demo::BUSES).page(4, 20).sort("baskv", SortDirection::Desc)).await.unwrap();
        assert_eq!(sorted.page_number, 1);
        assert_eq!(sorted.rows[0]["baskv"], json!(500.0));
    }

    #[tokio::test]
    async fn role_mismatch_is_unauthorized_before_any_storage_access() {
        let (executor, _) = executor(GridSettings::default());
        let err = executor.read(&Caller::with_roles(["Guest"]), GridRequest::new(demo::BUSES)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Unauthorized);
        let err = executor.read(&Caller::anonymous(), GridRequest::new(demo::BUSES)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Unauthorized);
        let err = executor.read(&user(), GridRequest::new("sp_Grid_Nothing")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn unknown_filter_column_is_bad_filter() {
        let (executor, _) = executor(GridSettings::default());
        let request = GridRequest::new(demo::BUSES).filter("password", FilterEntry::text("contains", "x"));
        assert_eq!(executor.read(&user(), request).await.unwrap_err().code(), ErrorCode::BadFilter);
    }

    #[tokio::test]
    async fn sorting_an_unsortable_column_is_bad_filter() {
        let (executor, _) = executor(GridSettings::default());
        let hr = Caller::with_roles(["HR"]);
        let request = GridRequest::new(demo::EMPLOYEES).sort("email", SortDirection::Asc);
        assert_eq!(executor.read(&hr, request).await.unwrap_err().code(), ErrorCode::BadFilter);
        let request = GridRequest::new(demo::EMPLOYEES).sort("full_name", SortDirection::Desc);
        assert_eq!(executor.read(&hr, request).await.unwrap().rows[0]["full_name"], json!("Employee 1047"));
    }

    #[tokio::test]
    async fn search_term_spans_text_columns() {
        let (executor, _) = executor(GridSettings::default());
        let page = executor.read(&user(), GridRequest::new(demo::BUSES).search("west 01")).await.unwrap();
        assert_eq!(page.total_count, 10);
        assert!(page.rows.iter().all(|r| r["depot"] == json!("West")));
    }

    #[tokio::test]
    async fn update_and_delete_go_through_derived_procedures() {
        let (executor, _) = executor(GridSettings::default());
        let update = UpdateRequest { procedure_name: demo::BUSES.into(), row_id: "North|42".into(), changes: changes(json!({"baskv": 230})) };
        let response = executor.update(&user(), update).await.unwrap();
        assert!(response.success);
        assert_eq!(response.rows_affected, Some(1));

        let delete = DeleteRequest { procedure_name: demo::BUSES.into(), row_id: "North|42".into() };
        assert_eq!(executor.delete(&user(), delete.clone()).await.unwrap_err().code(), ErrorCode::Unauthorized);
        assert_eq!(executor.delete(&Caller::with_roles(["Admin"]), delete.clone()).await.unwrap().rows_affected, Some(1));
        assert_eq!(executor.delete(&Caller::with_roles(["Admin"]), delete).await.unwrap_err().code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn write_failures_map_to_stable_codes() {
        let (executor, _) = executor(GridSettings::default());
        let cases = [
            ("North|forty", json!({"baskv": 1}), ErrorCode::InvalidType),
            ("North", json!({"baskv": 1}), ErrorCode::InvalidFormat),
            ("North|1", json!({"baskv": 5000}), ErrorCode::ValidationFailed),
            ("North|1", json!({"vmin": 1.2, "vmax": 1.0}), ErrorCode::ValidationFailed),
            ("North|1", json!({"name": "North 002"}), ErrorCode::ConstraintViolation),
        ];
        for (row_id, change, code) in cases {
            let request = UpdateRequest { procedure_name: demo::BUSES.into(), row_id: row_id.into(), changes: changes(change) };
            assert_eq!(executor.update(&user(), request).await.unwrap_err().code(), code, "{}", row_id);
        }
    }

    #[tokio::test]
    async fn missing_write_registration_is_unsupported_not_an_error() {
        let (executor, registry) = executor(GridSettings::default());
        let hr = Caller::with_roles(["HR"]);
        let caps = executor.capabilities(&hr, demo::EMPLOYEES).unwrap();
        assert_eq!(caps.update.as_deref(), Some("sp_Grid_Update_Employee"));
        assert_eq!(caps.delete, None);

        let delete = DeleteRequest { procedure_name: demo::EMPLOYEES.into(), row_id: "Acme|Ops|10|2010-01-01|1000".into() };
        assert_eq!(executor.delete(&hr, delete).await.unwrap_err().code(), ErrorCode::NotFound);

        registry.upsert(&ProcedureRegistration::new("sp_Grid_Update_Employee", demo::MAIN_STORE).roles(["HR"]).inactive()).unwrap();
        executor.registry().invalidate("sp_Grid_Update_Employee").unwrap();
        assert_eq!(executor.capabilities(&hr, demo::EMPLOYEES).unwrap().update, None);
    }

    #[tokio::test]
    async fn five_part_identifier_updates_one_employee() {
        let (executor, _) = executor(GridSettings::default());
        let hr = Caller::with_roles(["HR"]);
        let request = UpdateRequest {
            procedure_name: demo::EMPLOYEES.into(),
            row_id: "Acme|Ops|10|2010-01-01|1000".into(),
            changes: changes(json!({"salary": 51000, "title": "Manager"})),
        };
        assert_eq!(executor.update(&hr, request).await.unwrap().rows_affected, Some(1));

        let before_hire = UpdateRequest {
            procedure_name: demo::EMPLOYEES.into(),
            row_id: "Acme|Ops|10|2010-01-01|1000".into(),
            changes: changes(json!({"end_date": "2009-12-31"})),
        };
        assert_eq!(executor.update(&hr, before_hire).await.unwrap_err().code(), ErrorCode::ValidationFailed);
    }

    #[tokio::test]
    async fn stalled_count_surfaces_timed_out() {
        let settings = GridSettings { query_timeout: Duration::from_millis(20), ..GridSettings::default() };
        let (executor, _) = executor_with(settings, Some(Duration::from_millis(500)));
        let err = executor.read(&user(), GridRequest::new(demo::BUSES)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::TimedOut);
    }
}
