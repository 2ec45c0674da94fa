//! Build resolved descriptors from raw config, and load config from disk.

use crate::config::resolved::{ColumnKind, EntityDescriptor, FieldInfo, ResolvedModel};
use crate::config::{validate, ModelConfig};
use crate::error::ConfigError;
use std::path::Path;

/// Build the resolved model from raw config (validates first).
pub fn resolve(config: &ModelConfig) -> Result<ResolvedModel, ConfigError> {
    validate(config)?;
    let mut entities = Vec::with_capacity(config.entities.len());
    for raw in &config.entities {
        let fields = raw
            .columns
            .iter()
            .map(|c| FieldInfo {
                name: c.name.clone(),
                kind: kind_from_type(c.type_.name()),
                nullable: c.nullable,
                has_default: c.default.is_some(),
                is_pk: c.name == raw.primary_key,
            })
            .collect();
        entities.push(EntityDescriptor::new(
            raw.id.clone(),
            raw.schema.clone().unwrap_or_else(|| "public".into()),
            raw.table.clone(),
            raw.path_segment.clone(),
            raw.primary_key.clone(),
            raw.key_field.clone(),
            raw.search_fields.clone(),
            fields,
        ));
    }
    Ok(ResolvedModel::new(entities))
}

/// Load a `ModelConfig` from a JSON file.
pub fn load_from_file(path: impl AsRef<Path>) -> Result<ModelConfig, ConfigError> {
    let text = std::fs::read_to_string(path.as_ref())
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.as_ref().display(), e)))?;
    serde_json::from_str(&text).map_err(|e| ConfigError::Load(e.to_string()))
}

fn kind_from_type(name: &str) -> ColumnKind {
    let lower = name.to_ascii_lowercase();
    match lower.as_str() {
        "smallint" | "int2" | "smallserial" => ColumnKind::SmallInt,
        "int" | "integer" | "int4" | "serial" => ColumnKind::Int,
        "bigint" | "int8" | "bigserial" => ColumnKind::BigInt,
        "real" | "float4" | "float8" | "float" | "double precision" => ColumnKind::Float,
        "numeric" | "decimal" => ColumnKind::Numeric,
        "bool" | "boolean" => ColumnKind::Bool,
        "uuid" => ColumnKind::Uuid,
        "date" => ColumnKind::Date,
        "json" | "jsonb" => ColumnKind::Json,
        _ if lower.starts_with("timestamp") || lower == "datetime" => ColumnKind::DateTime,
        // varchar, char, text and anything else bind without a cast.
        _ => ColumnKind::Text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(kind_from_type("BIGSERIAL"), ColumnKind::BigInt);
        assert_eq!(kind_from_type("timestamptz"), ColumnKind::DateTime);
        assert_eq!(kind_from_type("timestamp with time zone"), ColumnKind::DateTime);
        assert_eq!(kind_from_type("numeric"), ColumnKind::Numeric);
        assert_eq!(kind_from_type("varchar"), ColumnKind::Text);
    }

    #[test]
    fn test_resolve_builds_descriptor() {
        let config: ModelConfig = serde_json::from_str(
            r#"{
                "entities": [{
                    "id": "clients",
                    "table": "dk_client",
                    "path_segment": "clients",
                    "primary_key": "id",
                    "key_field": "name",
                    "search_fields": ["name"],
                    "columns": [
                        {"name": "id", "type": "bigserial", "nullable": false, "default": "autoincrement"},
                        {"name": "name", "type": {"name": "varchar", "params": [255]}, "nullable": false},
                        {"name": "modified", "type": "timestamptz", "default": "now()"}
                    ]
                }]
            }"#,
        )
        .unwrap();
        let model = resolve(&config).unwrap();
        let entity = model.entity_by_path("clients").unwrap();
        assert_eq!(entity.table_name, "dk_client");
        assert_eq!(entity.pk_field, "id");
        assert_eq!(entity.key_field.as_deref(), Some("name"));
        assert!(entity.field("modified").unwrap().has_default);
        assert_eq!(entity.field("name").unwrap().kind, ColumnKind::Text);
        assert!(entity.pk().is_pk);
        assert!(model.entity_by_path("nope").is_none());
    }
}
