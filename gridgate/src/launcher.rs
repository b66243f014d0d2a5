use crate::demo;
use crate::error::AppError;
use crate::executor::GridExecutor;
use crate::info;
use crate::registry::{RedbRegistry, RegistryCache};
use crate::rest::{serve, RequestState};
use crate::settings::{AppConfig, HttpSettings};
use crate::store::{open_database, RedbStore, StoreRouter};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors;
use tower_http::cors::CorsLayer;

pub const CONFIG_ENV: &str = "GRIDGATE_CONFIG";
pub const DEFAULT_CONFIG: &str = "config/settings";

pub async fn maybe_run_server(
    http_conf: HttpSettings,
    state: RequestState,
    cors: Option<CorsLayer>,
    shutdown: watch::Receiver<bool>,
) -> Result<(), AppError> {
    if http_conf.enable {
        info!("Starting http server at {}", http_conf.bind_address);
        let cors = cors.unwrap_or_else(|| CorsLayer::new()
            .allow_origin(cors::Any)
            .allow_methods(cors::Any)
            .allow_headers(cors::Any));
        serve(state, http_conf.bind_address, Some(cors), shutdown).await
    } else {
        info!("HTTP server is disabled, skipping");
        Ok(())
    }
}

/// Wires storage, registry and the demo catalog into request state.
pub fn build_state(config: &AppConfig) -> Result<RequestState, AppError> {
    let db = open_database(Path::new(&config.storage.db_path))?;
    let registry = Arc::new(RedbRegistry::new(Arc::clone(&db)));
    let store = Arc::new(RedbStore::new(db));
    if config.storage.seed_demo && demo::install(&registry, store.as_ref(), &config.grid.admin_role)? {
        info!("Demo grids {} and {} provisioned", demo::BUSES, demo::EMPLOYEES);
    }
    let cache = Arc::new(RegistryCache::new(registry.clone(), config.grid.registry_cache_capacity, config.grid.registry_ttl));
    let stores = StoreRouter::new().route(demo::MAIN_STORE, store);
    let executor = GridExecutor::new(cache, Arc::new(demo::catalog()), stores, &config.grid);
    Ok(RequestState { executor: Arc::new(executor), registry, admin_role: config.grid.admin_role.clone() })
}

pub async fn launch(config_path: &str, cors: Option<CorsLayer>) -> Result<(), AppError> {
    let config = AppConfig::new(config_path)?;
    let state = build_state(&config)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut server = tokio::spawn(maybe_run_server(config.http, state, cors, shutdown_rx));
    tokio::select! {
        joined = &mut server => return joined?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl-C, shutting down...");
            let _ = shutdown_tx.send(true);
        }
    }
    server.await?
}
