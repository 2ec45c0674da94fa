//! Model validation: every declared key, lookup field, and search field must
//! be a real column, and path segments must be unique.

use crate::config::ModelConfig;
use crate::error::ConfigError;
use std::collections::HashSet;

pub fn validate(config: &ModelConfig) -> Result<(), ConfigError> {
    let mut path_segments = HashSet::new();
    for entity in &config.entities {
        if !path_segments.insert(entity.path_segment.as_str()) {
            return Err(ConfigError::DuplicatePathSegment(
                entity.path_segment.clone(),
            ));
        }
        if entity.columns.is_empty() {
            return Err(ConfigError::Validation(format!(
                "entity {} declares no columns",
                entity.id
            )));
        }

        let mut names = HashSet::new();
        for col in &entity.columns {
            if !names.insert(col.name.as_str()) {
                return Err(ConfigError::DuplicateColumn {
                    entity: entity.id.clone(),
                    column: col.name.clone(),
                });
            }
        }

        let missing = |column: &str| ConfigError::MissingColumn {
            entity: entity.id.clone(),
            column: column.to_string(),
        };
        if !names.contains(entity.primary_key.as_str()) {
            return Err(missing(&entity.primary_key));
        }
        if let Some(key_field) = &entity.key_field {
            if !names.contains(key_field.as_str()) {
                return Err(missing(key_field));
            }
        }
        for field in &entity.search_fields {
            if !names.contains(field.as_str()) {
                return Err(missing(field));
            }
        }
    }
    Ok(())
}
