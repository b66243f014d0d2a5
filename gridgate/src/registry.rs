//! Procedure registry: the only set of names the dispatcher will ever route to.
//!
//! Registrations are provisioned out-of-band and read on every request through [`RegistryCache`],
//! a small LRU with a time-to-live in front of the durable [`RegistrySource`].

use crate::error::AppError;
use crate::{debug, info};
use lru::LruCache;
use redb::{Database, ReadableTable, TableDefinition, TableError};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use utoipa::ToSchema;

const REGISTRY_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("procedure_registry");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcedureRegistration {
    #[schema(example = "sp_Grid_Buses")]
    pub name: String,
    pub is_active: bool,
    pub requires_auth: bool,
    #[serde(default)]
    pub allowed_roles: Vec<String>,
    #[schema(example = "main")]
    pub database_routing_key: String,
    #[schema(example = 15)]
    pub default_page_size: u32,
    #[schema(example = 500)]
    pub max_page_size: u32,
}

impl ProcedureRegistration {
    pub fn new(name: impl Into<String>, routing_key: impl Into<String>) -> Self {
        ProcedureRegistration {
            name: name.into(),
            is_active: true,
            requires_auth: true,
            allowed_roles: Vec::new(),
            database_routing_key: routing_key.into(),
            default_page_size: 15,
            max_page_size: 500,
        }
    }

    pub fn roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn public(mut self) -> Self {
        self.requires_auth = false;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn page_sizes(mut self, default_page_size: u32, max_page_size: u32) -> Self {
        self.default_page_size = default_page_size;
        self.max_page_size = max_page_size;
        self
    }
}

/// Durable lookup of registrations by exact procedure name.
pub trait RegistrySource: Send + Sync {
    fn load(&self, name: &str) -> Result<Option<ProcedureRegistration>, AppError>;
}

pub struct RedbRegistry {
    db: Arc<Database>,
}

impl RedbRegistry {
    pub fn new(db: Arc<Database>) -> Self {
        RedbRegistry { db }
    }

    pub fn upsert(&self, registration: &ProcedureRegistration) -> Result<(), AppError> {
        let bytes = bincode::serde::encode_to_vec(registration, bincode::config::standard())?;
        let write_tx = self.db.begin_write()?;
        {
            let mut table = write_tx.open_table(REGISTRY_TABLE)?;
            table.insert(registration.name.as_str(), bytes.as_slice())?;
        }
        write_tx.commit()?;
        info!("Registered procedure {} (active={})", registration.name, registration.is_active);
        Ok(())
    }

    pub fn remove(&self, name: &str) -> Result<bool, AppError> {
        let write_tx = self.db.begin_write()?;
        let removed = {
            let mut table = write_tx.open_table(REGISTRY_TABLE)?;
            let removed = table.remove(name)?.is_some();
            removed
        };
        write_tx.commit()?;
        Ok(removed)
    }

    pub fn is_empty(&self) -> Result<bool, AppError> {
        let read_tx = self.db.begin_read()?;
        let empty = match read_tx.open_table(REGISTRY_TABLE) {
            Ok(table) => {
                let first = table.first()?;
                first.is_none()
            }
            Err(TableError::TableDoesNotExist(_)) => true,
            Err(e) => return Err(e.into()),
        };
        Ok(empty)
    }
}

impl RegistrySource for RedbRegistry {
    fn load(&self, name: &str) -> Result<Option<ProcedureRegistration>, AppError> {
        let read_tx = self.db.begin_read()?;
        let table = match read_tx.open_table(REGISTRY_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let bytes = table.get(name)?.map(|guard| guard.value().to_vec());
        match bytes {
            Some(bytes) => {
                let (registration, _) = bincode::serde::decode_from_slice::<ProcedureRegistration, _>(
                    &bytes,
                    bincode::config::standard(),
                )?;
                Ok(Some(registration))
            }
            None => Ok(None),
        }
    }
}

struct CachedRegistration {
    registration: Option<ProcedureRegistration>,
    loaded_at: Instant,
}

/// Read-mostly cache over a [`RegistrySource`]. Misses are cached too, so an unknown name
/// does not hit storage on every request until the entry expires or is invalidated.
pub struct RegistryCache {
    source: Arc<dyn RegistrySource>,
    ttl: Duration,
    entries: Mutex<LruCache<String, CachedRegistration>>,
}

impl RegistryCache {
    pub fn new(source: Arc<dyn RegistrySource>, capacity: NonZeroUsize, ttl: Duration) -> Self {
        RegistryCache { source, ttl, entries: Mutex::new(LruCache::new(capacity)) }
    }

    pub fn lookup(&self, name: &str) -> Result<Option<ProcedureRegistration>, AppError> {
        {
            let mut entries = self.entries.lock()?;
            if let Some(cached) = entries.get(name) {
                if cached.loaded_at.elapsed() < self.ttl {
                    return Ok(cached.registration.clone());
                }
            }
        }
        let registration = self.source.load(name)?;
        debug!("Registry refreshed {} (found={})", name, registration.is_some());
        self.entries.lock()?.put(name.to_string(), CachedRegistration { registration: registration.clone(), loaded_at: Instant::now() });
        Ok(registration)
    }

    pub fn invalidate(&self, name: &str) -> Result<(), AppError> {
        self.entries.lock()?.pop(name);
        Ok(())
    }

    pub fn invalidate_all(&self) -> Result<(), AppError> {
        self.entries.lock()?.clear();
        info!("Registry cache invalidated");
        Ok(())
    }
}
