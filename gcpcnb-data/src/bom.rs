use serde::{Deserialize, Serialize};
use toml::value::Table;

pub type Bom = Vec<Entry>;

/// A bill-of-materials entry, surfaced verbatim in the image's build metadata label.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Entry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Table::is_empty")]
    pub metadata: Table,
}

impl Entry {
    pub fn new(name: impl Into<String>, metadata: Table) -> Self {
        Self {
            name: name.into(),
            metadata,
        }
    }
}
