//! Raw entity model types matching the JSON config format.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnTypeConfig {
    Simple(String),
    Parameterized { name: String, params: Option<Vec<u32>> },
}

impl ColumnTypeConfig {
    pub fn name(&self) -> &str {
        match self {
            ColumnTypeConfig::Simple(s) => s,
            ColumnTypeConfig::Parameterized { name, .. } => name,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ColumnConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: ColumnTypeConfig,
    #[serde(default = "default_true")]
    pub nullable: bool,
    /// Presence means the column has a DB-side default and may be omitted
    /// from inserts.
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub comment: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntityConfig {
    pub id: String,
    #[serde(default)]
    pub schema: Option<String>,
    pub table: String,
    pub path_segment: String,
    pub primary_key: String,
    /// Alternate unique lookup field, addressed with an `@` prefix in URLs.
    #[serde(default)]
    pub key_field: Option<String>,
    /// Fields matched by the `_search_key` directive.
    #[serde(default)]
    pub search_fields: Vec<String>,
    pub columns: Vec<ColumnConfig>,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Whole model in one struct for in-memory loading.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    pub entities: Vec<EntityConfig>,
}
