//! Generic CRUD execution against PostgreSQL: query pipeline (filters →
//! count → page → shape) and transactional mutations.

use crate::config::{EntityDescriptor, FieldInfo};
use crate::error::{ApiError, ERR_DB_INTERNAL};
use crate::filter::{compile, FilterExpr};
use crate::params::ListDirectives;
use crate::service::shape::shape_row;
use crate::service::validation::check_required;
use crate::sql::{self, value_for_field, BindValue, QueryBuf, SortKey};
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Transaction};

/// Total over the filtered set plus the shaped records of one page.
#[derive(Debug, Serialize)]
pub struct QueryResult {
    pub total: i64,
    pub items: Vec<Value>,
}

/// How a URL key addresses a record: digit-only keys hit the primary key,
/// `@`-prefixed keys hit the declared key field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyLookup {
    PrimaryKey(String),
    KeyField(String),
}

pub fn classify_key(key: &str) -> Result<KeyLookup, ApiError> {
    if !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(KeyLookup::PrimaryKey(key.to_string()));
    }
    match key.strip_prefix('@') {
        Some(rest) => Ok(KeyLookup::KeyField(rest.to_string())),
        None => Err(ApiError::url_params()),
    }
}

fn lookup_column<'a>(
    entity: &'a EntityDescriptor,
    key: &str,
) -> Result<(&'a FieldInfo, Value), ApiError> {
    match classify_key(key)? {
        KeyLookup::PrimaryKey(raw) => {
            let field = entity.pk();
            Ok((field, value_for_field(field, &raw)))
        }
        KeyLookup::KeyField(raw) => {
            let name = entity.key_field.as_deref().ok_or_else(|| {
                tracing::error!(entity = %entity.id, "key lookup on an entity with no key field");
                ApiError::undefined()
            })?;
            let field = entity
                .field(name)
                .expect("validated: key field is a declared column");
            Ok((field, value_for_field(field, &raw)))
        }
    }
}

fn not_found(entity: &EntityDescriptor, key: &str) -> ApiError {
    ApiError::record_not_found(format!("{}({})", entity.table_name, key))
}

/// OR-of-contains across the declared search fields.
fn search_filter(entity: &EntityDescriptor, term: &str) -> Result<FilterExpr, ApiError> {
    if entity.search_fields.is_empty() {
        return Err(ApiError::params(format!("{} has no search fields", entity.id)));
    }
    Ok(FilterExpr::Or(
        entity
            .search_fields
            .iter()
            .map(|f| FilterExpr::Like {
                field: f.clone(),
                pattern: format!("%{}%", term),
            })
            .collect(),
    ))
}

/// Resolve `_sort`/`_direction` to concrete sort keys. With no explicit sort
/// an entity with a `modified` column lists newest first. A field's `-`
/// prefix flips the base direction.
fn resolve_sort(
    entity: &EntityDescriptor,
    directives: &ListDirectives,
) -> Result<Vec<SortKey>, ApiError> {
    let (sort, direction) = if directives.sort.is_empty() {
        if !entity.has_field("modified") {
            return Ok(Vec::new());
        }
        ("modified".to_string(), "desc".to_string())
    } else {
        (directives.sort.clone(), directives.direction.clone())
    };
    let base_desc = direction != "asc";
    let mut keys = Vec::new();
    for part in sort.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (name, flip) = match part.strip_prefix('-') {
            Some(rest) => (rest, true),
            None => (part, false),
        };
        if !entity.has_field(name) {
            return Err(ApiError::params(format!("sort field {} invalid", name)));
        }
        keys.push(SortKey {
            field: name.to_string(),
            descending: base_desc ^ flip,
        });
    }
    Ok(keys)
}

/// `num == -1` means the whole filtered set, whatever the page says.
fn page_window(page: i64, num: i64) -> (Option<i64>, Option<i64>) {
    if num == -1 {
        (None, None)
    } else {
        (Some(num), Some((page - 1) * num))
    }
}

pub struct CrudService;

impl CrudService {
    /// Filtered, sorted, paged listing with total count over the pre-paging
    /// set.
    pub async fn list(
        pool: &PgPool,
        entity: &EntityDescriptor,
        mut tree: Map<String, Value>,
    ) -> Result<QueryResult, ApiError> {
        let directives = ListDirectives::pop_from(&mut tree);
        tracing::debug!(entity = %entity.id, ?directives, "list");

        let mut filters = compile(entity, &tree)?;
        if !directives.search_key.is_empty() {
            filters.push(search_filter(entity, &directives.search_key)?);
        }

        let total = Self::fetch_count(pool, &sql::select_count(entity, &filters)).await?;

        let sort = resolve_sort(entity, &directives)?;
        let (limit, offset) = page_window(directives.page, directives.num);
        let page_q = sql::select_page(entity, &filters, &sort, limit, offset);
        let rows = Self::fetch_rows(pool, &page_q).await?;
        let items = rows.iter().map(|r| shape_row(entity, r)).collect();
        Ok(QueryResult { total, items })
    }

    /// Fetch one record by URL key.
    pub async fn get_one(
        pool: &PgPool,
        entity: &EntityDescriptor,
        key: &str,
    ) -> Result<Value, ApiError> {
        let (field, value) = lookup_column(entity, key)?;
        let q = sql::select_one_by(entity, &field.name, value);
        let row = Self::fetch_optional(pool, &q).await?;
        row.map(|r| shape_row(entity, &r))
            .ok_or_else(|| not_found(entity, key))
    }

    /// Insert one record or a batch; the whole call is one transaction, so a
    /// failing record rolls back everything before it.
    pub async fn insert(
        pool: &PgPool,
        entity: &EntityDescriptor,
        body: Value,
    ) -> Result<u64, ApiError> {
        let records = match body {
            Value::Object(m) => vec![m],
            Value::Array(items) => items
                .into_iter()
                .map(|v| match v {
                    Value::Object(m) => Ok(m),
                    other => Err(ApiError::params(format!(
                        "insert items must be objects, got {}",
                        type_name(&other)
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()?,
            other => {
                return Err(ApiError::params(format!(
                    "insert body must be an object or a list of objects, got {}",
                    type_name(&other)
                )))
            }
        };

        let mut tx = pool.begin().await?;
        for record in &records {
            check_required(entity, record)?;
            Self::execute_tx(&mut tx, &sql::insert(entity, record)).await?;
        }
        tx.commit().await?;
        Ok(records.len() as u64)
    }

    /// Insert-or-update on key conflict. Failures are logged and normalized
    /// to the generic internal-database error; the cause stays server-side.
    pub async fn upsert(
        pool: &PgPool,
        entity: &EntityDescriptor,
        record: Map<String, Value>,
    ) -> Result<(), ApiError> {
        let run = async {
            let mut tx = pool.begin().await?;
            Self::execute_tx(&mut tx, &sql::upsert(entity, &record)).await?;
            tx.commit().await
        };
        run.await.map_err(|e: sqlx::Error| {
            tracing::error!(entity = %entity.id, error = %e, "upsert failed");
            ApiError::new(ERR_DB_INTERNAL)
        })
    }

    /// Update declared fields by URL key; unrecognized body fields are
    /// silently ignored. Returns the updated shape.
    pub async fn update_one(
        pool: &PgPool,
        entity: &EntityDescriptor,
        key: &str,
        body: Value,
    ) -> Result<Value, ApiError> {
        let Value::Object(record) = body else {
            return Err(ApiError::params("update body must be an object"));
        };
        let touches_any = entity
            .fields
            .iter()
            .any(|f| !f.is_pk && record.contains_key(&f.name));
        if !touches_any {
            return Self::get_one(pool, entity, key).await;
        }
        let (field, value) = lookup_column(entity, key)?;
        let q = sql::update_by(entity, &field.name, value, &record);
        let mut tx = pool.begin().await?;
        let row = Self::fetch_optional_tx(&mut tx, &q).await?;
        tx.commit().await?;
        row.map(|r| shape_row(entity, &r))
            .ok_or_else(|| not_found(entity, key))
    }

    /// Delete by URL key, returning the shaped pre-delete record.
    pub async fn delete_one(
        pool: &PgPool,
        entity: &EntityDescriptor,
        key: &str,
    ) -> Result<Value, ApiError> {
        let (field, value) = lookup_column(entity, key)?;
        let mut tx = pool.begin().await?;
        let select_q = sql::select_one_by(entity, &field.name, value.clone());
        let row = Self::fetch_optional_tx(&mut tx, &select_q)
            .await?
            .ok_or_else(|| not_found(entity, key))?;
        let shaped = shape_row(entity, &row);
        Self::execute_tx(&mut tx, &sql::delete_by(entity, &field.name, value)).await?;
        tx.commit().await?;
        Ok(shaped)
    }

    async fn fetch_count(pool: &PgPool, q: &QueryBuf) -> Result<i64, ApiError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query_scalar::<_, i64>(&q.sql);
        for p in &q.params {
            query = query.bind(BindValue::from_json(p));
        }
        Ok(query.fetch_one(pool).await?)
    }

    async fn fetch_rows(pool: &PgPool, q: &QueryBuf) -> Result<Vec<PgRow>, ApiError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(BindValue::from_json(p));
        }
        Ok(query.fetch_all(pool).await?)
    }

    async fn fetch_optional(pool: &PgPool, q: &QueryBuf) -> Result<Option<PgRow>, ApiError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(BindValue::from_json(p));
        }
        Ok(query.fetch_optional(pool).await?)
    }

    async fn fetch_optional_tx(
        tx: &mut Transaction<'_, Postgres>,
        q: &QueryBuf,
    ) -> Result<Option<PgRow>, sqlx::Error> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query (tx)");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(BindValue::from_json(p));
        }
        query.fetch_optional(&mut **tx).await
    }

    async fn execute_tx(tx: &mut Transaction<'_, Postgres>, q: &QueryBuf) -> Result<(), sqlx::Error> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query (tx)");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(BindValue::from_json(p));
        }
        query.execute(&mut **tx).await?;
        Ok(())
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, ModelConfig};

    fn descriptor(with_modified: bool, search: bool) -> EntityDescriptor {
        let modified = if with_modified {
            r#", {"name": "modified", "type": "timestamptz", "default": "now()"}"#
        } else {
            ""
        };
        let search_fields = if search { r#"["name"]"# } else { "[]" };
        let json = format!(
            r#"{{
                "entities": [{{
                    "id": "clients",
                    "table": "dk_client",
                    "path_segment": "clients",
                    "primary_key": "id",
                    "key_field": "name",
                    "search_fields": {search_fields},
                    "columns": [
                        {{"name": "id", "type": "bigserial", "nullable": false, "default": "autoincrement"}},
                        {{"name": "name", "type": "varchar", "nullable": false}},
                        {{"name": "status", "type": "int"}}{modified}
                    ]
                }}]
            }}"#
        );
        let config: ModelConfig = serde_json::from_str(&json).unwrap();
        resolve(&config)
            .unwrap()
            .entity_by_path("clients")
            .unwrap()
            .clone()
    }

    #[test]
    fn test_classify_key() {
        assert_eq!(
            classify_key("42").unwrap(),
            KeyLookup::PrimaryKey("42".into())
        );
        assert_eq!(
            classify_key("@alice").unwrap(),
            KeyLookup::KeyField("alice".into())
        );
        let err = classify_key("alice").unwrap_err();
        assert_eq!(err.code(), crate::error::ERR_URL_PARAMS);
        assert!(classify_key("").is_err());
    }

    #[test]
    fn test_lookup_without_key_field_is_internal() {
        let mut entity = descriptor(false, false);
        entity.key_field = None;
        let err = lookup_column(&entity, "@alice").unwrap_err();
        assert_eq!(err.code(), crate::error::ERR_UNDEFINED);
    }

    #[test]
    fn test_page_window() {
        assert_eq!(page_window(3, 10), (Some(10), Some(20)));
        assert_eq!(page_window(1, 10), (Some(10), Some(0)));
        assert_eq!(page_window(5, -1), (None, None));
    }

    #[test]
    fn test_sort_direction_combination() {
        let entity = descriptor(false, false);
        let mut d = ListDirectives::default();

        d.sort = "-name".into();
        d.direction = "asc".into();
        let keys = resolve_sort(&entity, &d).unwrap();
        assert_eq!(keys, vec![SortKey { field: "name".into(), descending: true }]);

        d.sort = "name".into();
        d.direction = "desc".into();
        let keys = resolve_sort(&entity, &d).unwrap();
        assert!(keys[0].descending);

        d.sort = "-name".into();
        d.direction = "desc".into();
        let keys = resolve_sort(&entity, &d).unwrap();
        assert!(!keys[0].descending);
    }

    #[test]
    fn test_default_sort_uses_modified_desc() {
        let entity = descriptor(true, false);
        let keys = resolve_sort(&entity, &ListDirectives::default()).unwrap();
        assert_eq!(
            keys,
            vec![SortKey {
                field: "modified".into(),
                descending: true,
            }]
        );
        // Without a modified column there is no implicit sort.
        let entity = descriptor(false, false);
        assert!(resolve_sort(&entity, &ListDirectives::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_unknown_sort_field_is_parameter_error() {
        let entity = descriptor(false, false);
        let mut d = ListDirectives::default();
        d.sort = "nope".into();
        let err = resolve_sort(&entity, &d).unwrap_err();
        assert_eq!(err.code(), crate::error::ERR_PARAMS);
    }

    #[test]
    fn test_search_requires_declared_fields() {
        let entity = descriptor(false, false);
        let err = search_filter(&entity, "foo").unwrap_err();
        assert_eq!(err.code(), crate::error::ERR_PARAMS);

        let entity = descriptor(false, true);
        let expr = search_filter(&entity, "foo").unwrap();
        assert_eq!(
            expr,
            FilterExpr::Or(vec![FilterExpr::Like {
                field: "name".into(),
                pattern: "%foo%".into(),
            }])
        );
    }
}
