//! Entity procedures: the executable side of registered procedure names.
//!
//! A grid read procedure and its derived update/delete procedures all bind to one
//! [`EntityDescriptor`]. Identifier tokens stay opaque up to here and are decoded against the
//! entity's key layout only inside [`EntityProcedure::update`] and [`EntityProcedure::delete`].

use crate::columns::{Augmentations, ColumnAugmentation};
use crate::entity::EntityDescriptor;
use crate::error::AppError;
use crate::filter::{SortSpec, TranslatedFilter};
use crate::model::Row;
use crate::naming;
use crate::pagination::Window;
use crate::store::GridStore;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcedureKind {
    Grid,
    Update,
    Delete,
}

pub struct EntityProcedure {
    name: String,
    kind: ProcedureKind,
    entity: Arc<EntityDescriptor>,
}

impl EntityProcedure {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entity(&self) -> &EntityDescriptor {
        &self.entity
    }

    fn expect_kind(&self, kind: ProcedureKind) -> Result<(), AppError> {
        if self.kind == kind {
            Ok(())
        } else {
            Err(AppError::Custom(format!("{} is a {:?} procedure, not {:?}", self.name, self.kind, kind)))
        }
    }

    pub fn count(&self, store: &dyn GridStore, filter: &TranslatedFilter) -> Result<u64, AppError> {
        self.expect_kind(ProcedureKind::Grid)?;
        store.count(&self.entity, filter)
    }

    pub fn fetch(&self, store: &dyn GridStore, filter: &TranslatedFilter, sort: Option<&SortSpec>, window: Window) -> Result<Vec<Row>, AppError> {
        self.expect_kind(ProcedureKind::Grid)?;
        store.fetch(&self.entity, filter, sort, window)
    }

    pub fn update(&self, store: &dyn GridStore, row_id: &str, changes: &Row) -> Result<u64, AppError> {
        self.expect_kind(ProcedureKind::Update)?;
        let key = self.entity.decode_key(row_id)?;
        self.entity.check_changes(changes)?;
        store.update(&self.entity, &key, changes)
    }

    pub fn delete(&self, store: &dyn GridStore, row_id: &str) -> Result<u64, AppError> {
        self.expect_kind(ProcedureKind::Delete)?;
        let key = self.entity.decode_key(row_id)?;
        store.delete(&self.entity, &key)
    }
}

/// Every procedure name the service can execute, with the column augmentations of each grid.
#[derive(Default)]
pub struct ProcedureCatalog {
    procedures: HashMap<String, Arc<EntityProcedure>>,
    augmentations: HashMap<String, Augmentations>,
}

impl ProcedureCatalog {
    pub fn new() -> Self {
        ProcedureCatalog::default()
    }

    pub fn bind(&mut self, name: &str, kind: ProcedureKind, entity: Arc<EntityDescriptor>) {
        self.procedures.insert(name.to_string(), Arc::new(EntityProcedure { name: name.to_string(), kind, entity }));
    }

    /// Binds a read procedure plus the update/delete procedures its name derives to.
    pub fn grid(&mut self, read_name: &str, entity: EntityDescriptor) -> Arc<EntityDescriptor> {
        let entity = Arc::new(entity);
        self.bind(read_name, ProcedureKind::Grid, entity.clone());
        if let Some(derived) = naming::derive_write_procedures(read_name) {
            self.bind(&derived.update, ProcedureKind::Update, entity.clone());
            self.bind(&derived.delete, ProcedureKind::Delete, entity.clone());
        }
        entity
    }

    /// Binds a read procedure only; its derived write names stay unresolvable.
    pub fn view(&mut self, read_name: &str, entity: EntityDescriptor) -> Arc<EntityDescriptor> {
        let entity = Arc::new(entity);
        self.bind(read_name, ProcedureKind::Grid, entity.clone());
        entity
    }

    pub fn augment(&mut self, read_name: &str, field: &str, augmentation: ColumnAugmentation) {
        self.augmentations.entry(read_name.to_string()).or_default().insert(field.to_string(), augmentation);
    }

    pub fn resolve(&self, name: &str, kind: ProcedureKind) -> Option<Arc<EntityProcedure>> {
        self.procedures.get(name).filter(|p| p.kind == kind).cloned()
    }

    pub fn augmentations(&self, read_name: &str) -> Option<&Augmentations> {
        self.augmentations.get(read_name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.procedures.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::ColumnDef;
    use crate::error::ErrorCode;
    use crate::identifier::KeyType;
    use crate::store::{temp_database, RedbStore};
    use serde_json::json;

    fn routes() -> EntityDescriptor {
        EntityDescriptor::new("routes")
            .column(ColumnDef::text("line", "Line"))
            .column(ColumnDef::text("label", "Label").editable())
            .key("line", KeyType::Text)
    }

    #[test]
    fn grid_binds_derived_write_procedures() {
        let mut catalog = ProcedureCatalog::new();
        catalog.grid("sp_Grid_Routes", routes());
        catalog.view("sp_Grid_Report_Totals", routes());
        assert_eq!(catalog.names(), vec!["sp_Grid_Delete_Route", "sp_Grid_Report_Totals", "sp_Grid_Routes", "sp_Grid_Update_Route"]);
        assert!(catalog.resolve("sp_Grid_Update_Route", ProcedureKind::Update).is_some());
        assert!(catalog.resolve("sp_Grid_Update_Route", ProcedureKind::Delete).is_none());
        assert!(catalog.resolve("sp_Grid_Update_Total", ProcedureKind::Update).is_none());
    }

    #[test]
    fn identifier_is_decoded_inside_the_write_procedure() {
        let mut catalog = ProcedureCatalog::new();
        let entity = catalog.grid("sp_Grid_Routes", routes());
        let store = RedbStore::new(temp_database("procedure"));
        store.insert(&entity, vec![json!({"line": "L1", "label": "Harbour"}).as_object().cloned().unwrap()]).unwrap();

        let update = catalog.resolve("sp_Grid_Update_Route", ProcedureKind::Update).unwrap();
        let changes = json!({"label": "Harbour Loop"}).as_object().cloned().unwrap();
        assert_eq!(update.update(&store, "L1", &changes).unwrap(), 1);
        assert_eq!(update.update(&store, "L1|extra", &changes).unwrap_err().code(), ErrorCode::InvalidFormat);
        assert_eq!(update.delete(&store, "L1").unwrap_err().code(), ErrorCode::Internal);

        let delete = catalog.resolve("sp_Grid_Delete_Route", ProcedureKind::Delete).unwrap();
        assert_eq!(delete.delete(&store, "L1").unwrap(), 1);
    }
}
