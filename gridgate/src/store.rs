//! Row storage behind the entity procedures.
//!
//! Each entity lives in its own redb table keyed by the encoded identifier token, with the row kept
//! as a JSON document. Counts and page fetches evaluate the same [`TranslatedFilter`] over the same
//! snapshot semantics, writes run in a single write transaction that is only committed once every
//! check passed.

use crate::entity::EntityDescriptor;
use crate::error::AppError;
use crate::filter::{SortSpec, TranslatedFilter};
use crate::identifier::{self, KeyComponent};
use crate::model::Row;
use crate::pagination::Window;
use crate::{debug, info};
use redb::{Database, ReadableTable, TableDefinition, TableError};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

/// Storage a grid procedure executes against. Implementations must be safe to share across requests.
pub trait GridStore: Send + Sync {
    fn count(&self, entity: &EntityDescriptor, filter: &TranslatedFilter) -> Result<u64, AppError>;
    fn fetch(&self, entity: &EntityDescriptor, filter: &TranslatedFilter, sort: Option<&SortSpec>, window: Window) -> Result<Vec<Row>, AppError>;
    /// Stores all rows in one transaction, returning their identifier tokens. Nothing is stored if any row fails.
    fn insert(&self, entity: &EntityDescriptor, rows: Vec<Row>) -> Result<Vec<String>, AppError>;
    fn update(&self, entity: &EntityDescriptor, key: &[KeyComponent], changes: &Row) -> Result<u64, AppError>;
    fn delete(&self, entity: &EntityDescriptor, key: &[KeyComponent]) -> Result<u64, AppError>;
}

fn table_name(entity: &EntityDescriptor) -> String {
    format!("rows_{}", entity.name())
}

fn rows_table(name: &str) -> TableDefinition<'_, &'static str, &'static [u8]> {
    TableDefinition::new(name)
}

fn decode_row(bytes: &[u8]) -> Result<Row, AppError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Comparable form of a unique field value, so `110` and `110.0` collide.
fn unique_key(value: &Value) -> String {
    match value {
        Value::Number(n) => n.as_f64().map(|f| f.to_string()).unwrap_or_else(|| n.to_string()),
        other => other.to_string(),
    }
}

/// Rejects `row` when another row already holds the same value in a unique field.
fn check_unique<T>(table: &T, entity: &EntityDescriptor, token: &str, row: &Row) -> Result<(), AppError>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let claimed: Vec<(&String, String)> = entity
        .unique_fields()
        .iter()
        .filter_map(|field| row.get(field).filter(|v| !v.is_null()).map(|v| (field, unique_key(v))))
        .collect();
    if claimed.is_empty() {
        return Ok(());
    }
    for entry in table.iter()? {
        let (key, value) = entry?;
        if key.value() == token {
            continue;
        }
        let other = decode_row(value.value())?;
        for (field, wanted) in claimed.iter() {
            if other.get(field.as_str()).map(unique_key).as_ref() == Some(wanted) {
                return Err(AppError::constraint(format!("{} {} is already taken by {}", field, wanted, key.value())));
            }
        }
    }
    Ok(())
}

/// Every (unique field, value) pair already present in the table.
fn taken_values<T>(table: &T, entity: &EntityDescriptor) -> Result<HashSet<(String, String)>, AppError>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let mut taken = HashSet::new();
    if entity.unique_fields().is_empty() {
        return Ok(taken);
    }
    for entry in table.iter()? {
        let (_, value) = entry?;
        let row = decode_row(value.value())?;
        for field in entity.unique_fields() {
            if let Some(value) = row.get(field).filter(|v| !v.is_null()) {
                taken.insert((field.clone(), unique_key(value)));
            }
        }
    }
    Ok(taken)
}

pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    pub fn new(db: Arc<Database>) -> Self {
        RedbStore { db }
    }

    /// All rows of `entity` satisfying `filter`, in key order.
    fn scan(&self, entity: &EntityDescriptor, filter: &TranslatedFilter) -> Result<Vec<Row>, AppError> {
        let name = table_name(entity);
        let read_tx = self.db.begin_read()?;
        let table = match read_tx.open_table(rows_table(&name)) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut rows = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let row = decode_row(value.value())?;
            if filter.matches(&row) {
                rows.push(row);
            }
        }
        Ok(rows)
    }
}

impl GridStore for RedbStore {
    fn count(&self, entity: &EntityDescriptor, filter: &TranslatedFilter) -> Result<u64, AppError> {
        let total = self.scan(entity, filter)?.len() as u64;
        debug!("count {} where {:?} -> {}", entity.name(), filter.where_clause(), total);
        Ok(total)
    }

    fn fetch(&self, entity: &EntityDescriptor, filter: &TranslatedFilter, sort: Option<&SortSpec>, window: Window) -> Result<Vec<Row>, AppError> {
        let mut rows = self.scan(entity, filter)?;
        if let Some(sort) = sort {
            rows.sort_by(|a, b| sort.compare(a, b));
        }
        debug!(
            "fetch {} where {:?} order by {:?} offset {} limit {}",
            entity.name(),
            filter.where_clause(),
            sort.map(SortSpec::order_by),
            window.offset,
            window.limit
        );
        Ok(rows.into_iter().skip(window.offset as usize).take(window.limit as usize).collect())
    }

    fn insert(&self, entity: &EntityDescriptor, rows: Vec<Row>) -> Result<Vec<String>, AppError> {
        let name = table_name(entity);
        let write_tx = self.db.begin_write()?;
        let mut tokens = Vec::with_capacity(rows.len());
        {
            let mut table = write_tx.open_table(rows_table(&name))?;
            let mut taken = taken_values(&table, entity)?;
            for row in rows {
                let token = entity.row_id(&row)?;
                entity.validate_row(&row)?;
                if table.get(token.as_str())?.is_some() {
                    return Err(AppError::constraint(format!("{} row {} already exists", entity.name(), token)));
                }
                for field in entity.unique_fields() {
                    if let Some(value) = row.get(field).filter(|v| !v.is_null()) {
                        if !taken.insert((field.clone(), unique_key(value))) {
                            return Err(AppError::constraint(format!("{} {} is already taken", field, value)));
                        }
                    }
                }
                let bytes = serde_json::to_vec(&row)?;
                table.insert(token.as_str(), bytes.as_slice())?;
                tokens.push(token);
            }
        }
        write_tx.commit()?;
        debug!("inserted {} {} rows", tokens.len(), entity.name());
        Ok(tokens)
    }

    fn update(&self, entity: &EntityDescriptor, key: &[KeyComponent], changes: &Row) -> Result<u64, AppError> {
        let token = identifier::encode(key)?;
        let name = table_name(entity);
        let write_tx = self.db.begin_write()?;
        {
            let mut table = write_tx.open_table(rows_table(&name))?;
            let current = table.get(token.as_str())?.map(|guard| guard.value().to_vec());
            let current = match current {
                Some(bytes) => decode_row(&bytes)?,
                None => return Err(AppError::not_found(format!("{} row {} does not exist", entity.name(), token))),
            };
            let merged = entity.merge(&current, changes);
            entity.validate_row(&merged)?;
            check_unique(&table, entity, &token, &merged)?;
            let bytes = serde_json::to_vec(&merged)?;
            table.insert(token.as_str(), bytes.as_slice())?;
        }
        write_tx.commit()?;
        info!("updated {} row {}", entity.name(), token);
        Ok(1)
    }

    fn delete(&self, entity: &EntityDescriptor, key: &[KeyComponent]) -> Result<u64, AppError> {
        let token = identifier::encode(key)?;
        let name = table_name(entity);
        let write_tx = self.db.begin_write()?;
        let removed = {
            let mut table = write_tx.open_table(rows_table(&name))?;
            let removed = table.remove(token.as_str())?.is_some();
            removed
        };
        if !removed {
            return Err(AppError::not_found(format!("{} row {} does not exist", entity.name(), token)));
        }
        write_tx.commit()?;
        info!("deleted {} row {}", entity.name(), token);
        Ok(1)
    }
}

/// Maps a registration's database routing key to the store it executes against.
#[derive(Clone, Default)]
pub struct StoreRouter {
    stores: HashMap<String, Arc<dyn GridStore>>,
}

impl StoreRouter {
    pub fn new() -> Self {
        StoreRouter::default()
    }

    pub fn route(mut self, routing_key: &str, store: Arc<dyn GridStore>) -> Self {
        self.stores.insert(routing_key.to_string(), store);
        self
    }

    pub fn resolve(&self, routing_key: &str) -> Result<Arc<dyn GridStore>, AppError> {
        self.stores
            .get(routing_key)
            .cloned()
            .ok_or_else(|| AppError::Custom(format!("no store is routed for database key {}", routing_key)))
    }
}

pub fn open_database(path: &Path) -> Result<Arc<Database>, AppError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let db = Database::create(path)?;
    info!("Opened database {}", path.display());
    Ok(Arc::new(db))
}

pub fn temp_database(prefix: &str) -> Arc<Database> {
    let dir = std::env::temp_dir().join("gridgate").join("test");
    if !dir.exists() {
        std::fs::create_dir_all(dir.clone()).unwrap();
    }
    let db = Database::create(dir.join(format!("{}_{}.redb", prefix, rand::random::<u64>()))).expect("Failed to create test database");
    Arc::new(db)
}
