//! Insert-body validation against the descriptor.

use crate::config::EntityDescriptor;
use crate::error::ApiError;
use serde_json::{Map, Value};

/// Every non-nullable column without a DB default must be supplied.
/// Generated primary keys are exempt.
pub fn check_required(entity: &EntityDescriptor, record: &Map<String, Value>) -> Result<(), ApiError> {
    for f in &entity.fields {
        if f.nullable || f.has_default || f.is_pk {
            continue;
        }
        match record.get(&f.name) {
            None | Some(Value::Null) => return Err(ApiError::params_required(&f.name)),
            Some(_) => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, ModelConfig};
    use serde_json::json;

    fn descriptor() -> EntityDescriptor {
        let config: ModelConfig = serde_json::from_str(
            r#"{
                "entities": [{
                    "id": "clients",
                    "table": "dk_client",
                    "path_segment": "clients",
                    "primary_key": "id",
                    "columns": [
                        {"name": "id", "type": "bigserial", "nullable": false, "default": "autoincrement"},
                        {"name": "name", "type": "varchar", "nullable": false},
                        {"name": "status", "type": "int"}
                    ]
                }]
            }"#,
        )
        .unwrap();
        resolve(&config)
            .unwrap()
            .entity_by_path("clients")
            .unwrap()
            .clone()
    }

    #[test]
    fn test_missing_required_field_rejected() {
        let entity = descriptor();
        let record = json!({"status": 1}).as_object().unwrap().clone();
        let err = check_required(&entity, &record).unwrap_err();
        assert_eq!(err.code(), crate::error::ERR_PARAMS_REQUIRED);
        assert_eq!(err.message(), "request parameter required: name");
    }

    #[test]
    fn test_nullable_and_defaulted_fields_optional() {
        let entity = descriptor();
        let record = json!({"name": "a"}).as_object().unwrap().clone();
        assert!(check_required(&entity, &record).is_ok());
    }
}
