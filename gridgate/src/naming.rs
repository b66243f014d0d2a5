//! Derives companion write procedure names from a grid read procedure name.
//!
//! `<prefix>_Grid_<Descriptor>_<EntityPlural>` yields `<prefix>_Grid_Update_<EntitySingular>` and
//! `<prefix>_Grid_Delete_<EntitySingular>`. The entity is the last PascalCase word of the last underscore
//! separated token; everything between `_Grid_` and it is descriptor. Irregular plurals are not handled,
//! the resulting name simply will not be registered.

pub const GRID_MARKER: &str = "_Grid_";
const UPDATE_VERB: &str = "Update";
const DELETE_VERB: &str = "Delete";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteProcedures {
    pub update: String,
    pub delete: String,
}

/// Splits `sp_Grid_Example_Employees` into (`sp`, `Employees`).
fn split_read_name(read_name: &str) -> Option<(&str, &str)> {
    let at = read_name.find(GRID_MARKER)?;
    let prefix = &read_name[..at];
    let rest = &read_name[at + GRID_MARKER.len()..];
    if prefix.is_empty() || rest.is_empty() {
        return None;
    }
    let first = rest.split('_').next().unwrap_or_default();
    if first == UPDATE_VERB || first == DELETE_VERB {
        return None;
    }
    let token = rest.rsplit('_').next().filter(|token| !token.is_empty())?;
    Some((prefix, last_word(token)))
}

/// `ExampleEmployees` → `Employees`; a word starts at an uppercase letter following a lowercase one or a digit.
fn last_word(token: &str) -> &str {
    let chars: Vec<(usize, char)> = token.char_indices().collect();
    let start = chars
        .windows(2)
        .rev()
        .find(|pair| pair[1].1.is_uppercase() && (pair[0].1.is_lowercase() || pair[0].1.is_ascii_digit()))
        .map(|pair| pair[1].0)
        .unwrap_or(0);
    &token[start..]
}

/// Sibilant endings take "es" in the plural (Bus → Buses, Box → Boxes, Batch → Batches).
fn takes_es(stem: &str) -> bool {
    stem.ends_with('s') || stem.ends_with('x') || stem.ends_with('z') || stem.ends_with("ch") || stem.ends_with("sh")
}

pub fn singularize(plural: &str) -> &str {
    if let Some(stem) = plural.strip_suffix("es") {
        if takes_es(stem) {
            return stem;
        }
    }
    if plural.ends_with('s') && !plural.ends_with("ss") {
        return &plural[..plural.len() - 1];
    }
    plural
}

pub fn derive_write_procedures(read_name: &str) -> Option<WriteProcedures> {
    let (prefix, entity) = split_read_name(read_name)?;
    let singular = singularize(entity);
    Some(WriteProcedures {
        update: format!("{}{}{}_{}", prefix, GRID_MARKER, UPDATE_VERB, singular),
        delete: format!("{}{}{}_{}", prefix, GRID_MARKER, DELETE_VERB, singular),
    })
}
