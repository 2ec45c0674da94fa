//! Builds parameterized SELECT, INSERT, UPSERT, UPDATE, DELETE statements
//! from an entity descriptor and a compiled filter expression.

use crate::config::{ColumnKind, EntityDescriptor};
use crate::filter::{CompareOp, FilterExpr};
use serde_json::{Map, Value};

/// Quote identifier for PostgreSQL (safe: only descriptor-sourced names).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn qualified_table(entity: &EntityDescriptor) -> String {
    format!("{}.{}", quoted(&entity.schema_name), quoted(&entity.table_name))
}

pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: Value) -> usize {
        self.params.push(v);
        self.params.len()
    }
}

/// `$n`, with the column's SQL cast so string-transported values bind
/// against the native type. Null binds stay uncast.
fn placeholder(q: &mut QueryBuf, entity: &EntityDescriptor, field: &str, value: Value) -> String {
    let is_null = value.is_null();
    let n = q.push_param(value);
    let cast = entity
        .field(field)
        .and_then(|f| f.kind.bind_cast())
        .filter(|_| !is_null);
    match cast {
        Some(cast) => format!("${}::{}", n, cast),
        None => format!("${}", n),
    }
}

/// SELECT list: numeric columns as `::text` so arbitrary precision survives
/// as its canonical string form.
fn select_column_list(entity: &EntityDescriptor) -> String {
    entity
        .fields
        .iter()
        .map(|f| {
            let q = quoted(&f.name);
            if f.kind == ColumnKind::Numeric {
                format!("{}::text AS {}", q, q)
            } else {
                q
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

const fn op_sql(op: CompareOp) -> &'static str {
    match op {
        CompareOp::Eq => "=",
        CompareOp::Ne => "<>",
        CompareOp::Lt => "<",
        CompareOp::Le => "<=",
        CompareOp::Gt => ">",
        CompareOp::Ge => ">=",
    }
}

fn render_expr(entity: &EntityDescriptor, expr: &FilterExpr, q: &mut QueryBuf) -> String {
    match expr {
        FilterExpr::Compare { field, op, value } => {
            let ph = placeholder(q, entity, field, value.clone());
            format!("{} {} {}", quoted(field), op_sql(*op), ph)
        }
        FilterExpr::In { field, values } => {
            if values.is_empty() {
                return "1 = 0".into();
            }
            let phs: Vec<String> = values
                .iter()
                .map(|v| placeholder(q, entity, field, v.clone()))
                .collect();
            format!("{} IN ({})", quoted(field), phs.join(", "))
        }
        FilterExpr::Null { field, negated } => {
            if *negated {
                format!("{} IS NOT NULL", quoted(field))
            } else {
                format!("{} IS NULL", quoted(field))
            }
        }
        FilterExpr::Like { field, pattern } => {
            let n = q.push_param(Value::String(pattern.clone()));
            format!("{} LIKE ${}", quoted(field), n)
        }
        FilterExpr::And(terms) => {
            if terms.is_empty() {
                return "TRUE".into();
            }
            let parts: Vec<String> = terms.iter().map(|t| render_expr(entity, t, q)).collect();
            format!("({})", parts.join(" AND "))
        }
        FilterExpr::Or(terms) => {
            if terms.is_empty() {
                return "FALSE".into();
            }
            let parts: Vec<String> = terms.iter().map(|t| render_expr(entity, t, q)).collect();
            format!("({})", parts.join(" OR "))
        }
        FilterExpr::Not(inner) => {
            let part = render_expr(entity, inner, q);
            format!("NOT ({})", part)
        }
    }
}

fn where_clause(entity: &EntityDescriptor, filters: &[FilterExpr], q: &mut QueryBuf) -> String {
    if filters.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = filters.iter().map(|f| render_expr(entity, f, q)).collect();
    format!(" WHERE {}", parts.join(" AND "))
}

/// COUNT over the filtered, pre-paging set.
pub fn select_count(entity: &EntityDescriptor, filters: &[FilterExpr]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_ = where_clause(entity, filters, &mut q);
    q.sql = format!("SELECT COUNT(*) FROM {}{}", qualified_table(entity), where_);
    q
}

/// One resolved sort key: field plus effective descending flag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

/// Filtered page: ORDER BY the resolved sort keys, LIMIT/OFFSET omitted for
/// unbounded queries.
pub fn select_page(
    entity: &EntityDescriptor,
    filters: &[FilterExpr],
    sort: &[SortKey],
    limit: Option<i64>,
    offset: Option<i64>,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_ = where_clause(entity, filters, &mut q);
    let order = if sort.is_empty() {
        String::new()
    } else {
        let keys: Vec<String> = sort
            .iter()
            .map(|k| {
                format!(
                    "{} {}",
                    quoted(&k.field),
                    if k.descending { "DESC" } else { "ASC" }
                )
            })
            .collect();
        format!(" ORDER BY {}", keys.join(", "))
    };
    let limit_ = limit.map(|n| format!(" LIMIT {}", n)).unwrap_or_default();
    let offset_ = offset
        .filter(|n| *n > 0)
        .map(|n| format!(" OFFSET {}", n))
        .unwrap_or_default();
    q.sql = format!(
        "SELECT {} FROM {}{}{}{}{}",
        select_column_list(entity),
        qualified_table(entity),
        where_,
        order,
        limit_,
        offset_
    );
    q
}

/// SELECT one row by an exact column match (primary-key or key-field lookup).
pub fn select_one_by(entity: &EntityDescriptor, field: &str, value: Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let ph = placeholder(&mut q, entity, field, value);
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} = {} LIMIT 1",
        select_column_list(entity),
        qualified_table(entity),
        quoted(field),
        ph
    );
    q
}

/// INSERT one record: only supplied declared columns are copied, anything
/// else in the body is ignored, and omitted columns take their DB defaults.
pub fn insert(entity: &EntityDescriptor, record: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for f in &entity.fields {
        let Some(value) = record.get(&f.name) else {
            continue;
        };
        let ph = placeholder(&mut q, entity, &f.name, value.clone());
        cols.push(quoted(&f.name));
        placeholders.push(ph);
    }
    if cols.is_empty() {
        q.sql = format!("INSERT INTO {} DEFAULT VALUES", qualified_table(entity));
        return q;
    }
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        qualified_table(entity),
        cols.join(", "),
        placeholders.join(", ")
    );
    q
}

/// Insert-or-update on primary key conflict, updating the supplied columns.
pub fn upsert(entity: &EntityDescriptor, record: &Map<String, Value>) -> QueryBuf {
    let mut q = insert(entity, record);
    let pk = quoted(&entity.pk_field);
    let updates: Vec<String> = entity
        .fields
        .iter()
        .filter(|f| !f.is_pk && record.contains_key(&f.name))
        .map(|f| {
            let col = quoted(&f.name);
            format!("{} = EXCLUDED.{}", col, col)
        })
        .collect();
    if updates.is_empty() {
        q.sql = format!("{} ON CONFLICT ({}) DO NOTHING", q.sql, pk);
    } else {
        q.sql = format!(
            "{} ON CONFLICT ({}) DO UPDATE SET {}",
            q.sql,
            pk,
            updates.join(", ")
        );
    }
    q
}

/// UPDATE the declared columns present in `record`, matched by one column.
pub fn update_by(
    entity: &EntityDescriptor,
    field: &str,
    key: Value,
    record: &Map<String, Value>,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut sets = Vec::new();
    for f in &entity.fields {
        if f.is_pk {
            continue;
        }
        if let Some(value) = record.get(&f.name) {
            let ph = placeholder(&mut q, entity, &f.name, value.clone());
            sets.push(format!("{} = {}", quoted(&f.name), ph));
        }
    }
    let key_ph = placeholder(&mut q, entity, field, key);
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = {} RETURNING {}",
        qualified_table(entity),
        sets.join(", "),
        quoted(field),
        key_ph,
        select_column_list(entity)
    );
    q
}

/// DELETE rows matched by one column.
pub fn delete_by(entity: &EntityDescriptor, field: &str, value: Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let ph = placeholder(&mut q, entity, field, value);
    q.sql = format!(
        "DELETE FROM {} WHERE {} = {}",
        qualified_table(entity),
        quoted(field),
        ph
    );
    q
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
                    "key_field": "name",
                    "search_fields": ["name"],
                    "columns": [
                        {"name": "id", "type": "bigserial", "nullable": false, "default": "autoincrement"},
                        {"name": "name", "type": "varchar", "nullable": false},
                        {"name": "status", "type": "int"},
                        {"name": "price", "type": "numeric"},
                        {"name": "modified", "type": "timestamptz", "default": "now()"}
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
    fn test_count_with_compare_filter() {
        let entity = descriptor();
        let filters = vec![FilterExpr::Compare {
            field: "status".into(),
            op: CompareOp::Eq,
            value: json!(1),
        }];
        let q = select_count(&entity, &filters);
        assert_eq!(
            q.sql,
            r#"SELECT COUNT(*) FROM "public"."dk_client" WHERE "status" = $1::bigint"#
        );
        assert_eq!(q.params, vec![json!(1)]);
    }

    #[test]
    fn test_page_with_sort_and_paging() {
        let entity = descriptor();
        let sort = vec![
            SortKey {
                field: "modified".into(),
                descending: true,
            },
            SortKey {
                field: "name".into(),
                descending: false,
            },
        ];
        let q = select_page(&entity, &[], &sort, Some(10), Some(20));
        assert!(q.sql.contains(r#"ORDER BY "modified" DESC, "name" ASC"#));
        assert!(q.sql.ends_with("LIMIT 10 OFFSET 20"));
        assert!(q.sql.contains(r#""price"::text AS "price""#));
        assert!(!q.sql.contains("WHERE"));
    }

    #[test]
    fn test_unbounded_page_has_no_limit() {
        let entity = descriptor();
        let q = select_page(&entity, &[], &[], None, None);
        assert!(!q.sql.contains("LIMIT"));
        assert!(!q.sql.contains("OFFSET"));
    }

    #[test]
    fn test_empty_in_never_matches() {
        let entity = descriptor();
        let filters = vec![FilterExpr::In {
            field: "status".into(),
            values: vec![],
        }];
        let q = select_count(&entity, &filters);
        assert!(q.sql.ends_with("WHERE 1 = 0"));
        assert!(q.params.is_empty());
    }

    #[test]
    fn test_nested_boolean_rendering() {
        let entity = descriptor();
        let filters = vec![FilterExpr::Or(vec![
            FilterExpr::And(vec![FilterExpr::Compare {
                field: "status".into(),
                op: CompareOp::Eq,
                value: json!(1),
            }]),
            FilterExpr::And(vec![FilterExpr::Not(Box::new(FilterExpr::Null {
                field: "name".into(),
                negated: false,
            }))]),
        ])];
        let q = select_count(&entity, &filters);
        assert!(q
            .sql
            .contains(r#"(("status" = $1::bigint) OR (NOT ("name" IS NULL)))"#));
    }

    #[test]
    fn test_like_binds_pattern() {
        let entity = descriptor();
        let filters = vec![FilterExpr::Like {
            field: "name".into(),
            pattern: "%ali%".into(),
        }];
        let q = select_count(&entity, &filters);
        assert!(q.sql.ends_with(r#"WHERE "name" LIKE $1"#));
        assert_eq!(q.params, vec![json!("%ali%")]);
    }

    #[test]
    fn test_insert_copies_only_supplied_declared_fields() {
        let entity = descriptor();
        let record = json!({"name": "a", "status": 1, "bogus": true})
            .as_object()
            .unwrap()
            .clone();
        let q = insert(&entity, &record);
        assert_eq!(
            q.sql,
            r#"INSERT INTO "public"."dk_client" ("name", "status") VALUES ($1, $2::bigint)"#
        );
        assert_eq!(q.params.len(), 2);
    }

    #[test]
    fn test_insert_of_empty_record_uses_defaults() {
        let entity = descriptor();
        let q = insert(&entity, &Map::new());
        assert_eq!(q.sql, r#"INSERT INTO "public"."dk_client" DEFAULT VALUES"#);
    }

    #[test]
    fn test_insert_with_explicit_pk() {
        let entity = descriptor();
        let record = json!({"id": 7, "name": "a"}).as_object().unwrap().clone();
        let q = insert(&entity, &record);
        assert!(q.sql.contains(r#""id""#));
    }

    #[test]
    fn test_upsert_targets_primary_key() {
        let entity = descriptor();
        let record = json!({"id": 7, "name": "a"}).as_object().unwrap().clone();
        let q = upsert(&entity, &record);
        assert!(q
            .sql
            .contains(r#"ON CONFLICT ("id") DO UPDATE SET "name" = EXCLUDED."name""#));
    }

    #[test]
    fn test_update_returns_row() {
        let entity = descriptor();
        let record = json!({"status": 2}).as_object().unwrap().clone();
        let q = update_by(&entity, "id", json!(7), &record);
        assert_eq!(
            q.sql,
            format!(
                r#"UPDATE "public"."dk_client" SET "status" = $1::bigint WHERE "id" = $2::bigint RETURNING {}"#,
                r#""id", "name", "status", "price"::text AS "price", "modified""#
            )
        );
    }

    #[test]
    fn test_null_bind_is_uncast() {
        let entity = descriptor();
        let filters = vec![FilterExpr::Compare {
            field: "status".into(),
            op: CompareOp::Ne,
            value: Value::Null,
        }];
        let q = select_count(&entity, &filters);
        assert!(q.sql.ends_with(r#""status" <> $1"#));
    }
}
