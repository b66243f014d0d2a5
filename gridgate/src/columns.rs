use crate::filter::ColumnType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

const DEFAULT_WIDTH: u32 = 150;
const SELECT_EDITOR: &str = "agSelectCellEditor";

/// Declared column of an entity, the whitelist filters and sorting are checked against.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub field: String,
    pub header_name: String,
    pub column_type: ColumnType,
    pub width: u32,
    pub sortable: bool,
    pub editable: bool,
    pub cell_editor: Option<String>,
    pub column_group: Option<String>,
}

impl ColumnDef {
    pub fn new(field: &str, header_name: &str, column_type: ColumnType) -> Self {
        ColumnDef {
            field: field.to_string(),
            header_name: header_name.to_string(),
            column_type,
            width: DEFAULT_WIDTH,
            sortable: true,
            editable: false,
            cell_editor: None,
            column_group: None,
        }
    }

    pub fn text(field: &str, header_name: &str) -> Self {
        Self::new(field, header_name, ColumnType::Text)
    }

    pub fn numeric(field: &str, header_name: &str) -> Self {
        Self::new(field, header_name, ColumnType::Numeric)
    }

    pub fn set(field: &str, header_name: &str) -> Self {
        Self::new(field, header_name, ColumnType::Set)
    }

    pub fn width(mut self, width: u32) -> Self {
        self.width = width;
        self
    }

    pub fn editable(mut self) -> Self {
        self.editable = true;
        self
    }

    pub fn unsortable(mut self) -> Self {
        self.sortable = false;
        self
    }

    pub fn editor(mut self, cell_editor: &str) -> Self {
        self.cell_editor = Some(cell_editor.to_string());
        self
    }

    pub fn group(mut self, column_group: &str) -> Self {
        self.column_group = Some(column_group.to_string());
        self
    }

    pub fn meta(&self) -> ColumnMeta {
        ColumnMeta {
            field: self.field.clone(),
            header_name: self.header_name.clone(),
            column_type: self.column_type,
            width: self.width,
            sortable: self.sortable,
            filter: self.column_type.filter_widget().to_string(),
            editable: self.editable,
            cell_editor: self.cell_editor.clone(),
            column_group: self.column_group.clone(),
            dropdown_config: None,
            link_config: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DropdownOption {
    pub value: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DropdownConfig {
    pub options: Vec<DropdownOption>,
    #[serde(default)]
    pub allow_empty: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LinkConfig {
    /// `{field}` placeholders are substituted by the client from the row.
    #[schema(example = "/depots/{depot}")]
    pub url_template: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

/// Client-facing column description sent along with every page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMeta {
    pub field: String,
    pub header_name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    pub width: u32,
    pub sortable: bool,
    pub filter: String,
    pub editable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cell_editor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dropdown_config: Option<DropdownConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_config: Option<LinkConfig>,
}

/// Per procedure column extras layered on top of the entity's declared columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnAugmentation {
    pub dropdown: Option<DropdownConfig>,
    pub link: Option<LinkConfig>,
}

impl ColumnAugmentation {
    pub fn dropdown<I, V, L>(options: I, allow_empty: bool) -> Self
    where
        I: IntoIterator<Item = (V, L)>,
        V: Into<String>,
        L: Into<String>,
    {
        let options = options.into_iter().map(|(value, label)| DropdownOption { value: value.into(), label: label.into() }).collect();
        ColumnAugmentation { dropdown: Some(DropdownConfig { options, allow_empty }), link: None }
    }

    pub fn link(url_template: &str, target: Option<&str>) -> Self {
        ColumnAugmentation {
            dropdown: None,
            link: Some(LinkConfig { url_template: url_template.to_string(), target: target.map(str::to_string) }),
        }
    }
}

pub type Augmentations = BTreeMap<String, ColumnAugmentation>;

/// Applies augmentations to matching columns; augmentations naming unknown fields are ignored.
pub fn augment(columns: &mut [ColumnMeta], augmentations: &Augmentations) {
    for column in columns.iter_mut() {
        let Some(extra) = augmentations.get(&column.field) else { continue };
        if let Some(dropdown) = &extra.dropdown {
            column.dropdown_config = Some(dropdown.clone());
            if column.editable && column.cell_editor.is_none() {
                column.cell_editor = Some(SELECT_EDITOR.to_string());
            }
        }
        if let Some(link) = &extra.link {
            column.link_config = Some(link.clone());
        }
    }
}
