//! Filter compiler: a parameter tree becomes a boolean expression tree over
//! a single entity's declared fields.

use crate::config::EntityDescriptor;
use crate::error::ApiError;
use crate::params;
use serde_json::{Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A compiled filter expression. Leaves always name a declared field;
/// compilation rejects anything else.
#[derive(Clone, Debug, PartialEq)]
pub enum FilterExpr {
    Compare {
        field: String,
        op: CompareOp,
        value: Value,
    },
    In {
        field: String,
        values: Vec<Value>,
    },
    Null {
        field: String,
        negated: bool,
    },
    /// SQL LIKE with the pattern used verbatim.
    Like {
        field: String,
        pattern: String,
    },
    And(Vec<FilterExpr>),
    Or(Vec<FilterExpr>),
    Not(Box<FilterExpr>),
}

const CMP_SUFFIXES: &[(&str, CompareOp)] = &[
    ("__lte", CompareOp::Le),
    ("__lt", CompareOp::Lt),
    ("__gte", CompareOp::Ge),
    ("__gt", CompareOp::Gt),
];

/// Compile a parameter tree into the list of AND-ed filter terms.
///
/// The `or`/`not` object forms operate on the entire accumulated term list,
/// not just their own branch; that makes key order significant. This mirrors
/// the observed behavior of the system this layer is compatible with (see
/// DESIGN.md) and is deliberately not "fixed".
pub fn compile(
    entity: &EntityDescriptor,
    tree: &Map<String, Value>,
) -> Result<Vec<FilterExpr>, ApiError> {
    let tree = params::expand_indexed(tree);
    let mut filters: Vec<FilterExpr> = Vec::new();
    for (key, value) in &tree {
        match key.as_str() {
            "and" => match value {
                Value::Object(nested) => filters.extend(compile(entity, nested)?),
                _ => return Err(combinator_error("and", value)),
            },
            "or" => match value {
                Value::Object(nested) => {
                    let branch = compile(entity, nested)?;
                    let accumulated = std::mem::take(&mut filters);
                    filters.push(FilterExpr::Or(vec![
                        FilterExpr::And(accumulated),
                        FilterExpr::And(branch),
                    ]));
                }
                Value::Array(items) => {
                    filters.push(FilterExpr::Or(compile_branches(entity, "or", items)?));
                }
                _ => return Err(combinator_error("or", value)),
            },
            "not" => match value {
                Value::Object(nested) => {
                    let branch = compile(entity, nested)?;
                    filters = vec![FilterExpr::Not(Box::new(FilterExpr::And(branch)))];
                }
                Value::Array(items) => {
                    let terms = compile_branches(entity, "not", items)?;
                    filters.push(FilterExpr::Not(Box::new(FilterExpr::And(terms))));
                }
                _ => return Err(combinator_error("not", value)),
            },
            _ => filters.push(compile_leaf(entity, key, value)?),
        }
    }
    Ok(filters)
}

fn compile_branches(
    entity: &EntityDescriptor,
    combinator: &str,
    items: &[Value],
) -> Result<Vec<FilterExpr>, ApiError> {
    let mut terms = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::Object(m) => terms.push(FilterExpr::And(compile(entity, m)?)),
            other => return Err(combinator_error(combinator, other)),
        }
    }
    Ok(terms)
}

fn combinator_error(combinator: &str, value: &Value) -> ApiError {
    ApiError::params(format!(
        "'{}' expects an object or a list of objects, got {}",
        combinator,
        json_type_name(value)
    ))
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn resolve_field(entity: &EntityDescriptor, name: &str) -> Result<String, ApiError> {
    if entity.has_field(name) {
        Ok(name.to_string())
    } else {
        Err(ApiError::params(name.to_string()))
    }
}

fn compile_leaf(entity: &EntityDescriptor, key: &str, value: &Value) -> Result<FilterExpr, ApiError> {
    for (suffix, op) in CMP_SUFFIXES {
        if let Some(name) = key.strip_suffix(suffix) {
            return Ok(FilterExpr::Compare {
                field: resolve_field(entity, name)?,
                op: *op,
                value: value.clone(),
            });
        }
    }
    if let Some(name) = key.strip_suffix("__in") {
        let field = resolve_field(entity, name)?;
        let values = match value {
            Value::Array(items) => items.clone(),
            other => vec![other.clone()],
        };
        return Ok(FilterExpr::In { field, values });
    }

    let field = resolve_field(entity, key)?;
    let expr = match value {
        Value::String(s) if s.starts_with('!') => {
            let rest = &s[1..];
            if rest.is_empty() || rest == "null" || rest == "None" {
                FilterExpr::Null {
                    field,
                    negated: true,
                }
            } else {
                FilterExpr::Compare {
                    field,
                    op: CompareOp::Ne,
                    value: Value::String(rest.to_string()),
                }
            }
        }
        Value::Object(m) if m.contains_key("like") => {
            let pattern = m["like"]
                .as_str()
                .ok_or_else(|| ApiError::params(format!("'like' pattern for {} must be a string", field)))?;
            FilterExpr::Like {
                field,
                pattern: pattern.to_string(),
            }
        }
        Value::Number(n) if n.is_i64() || n.is_u64() => FilterExpr::Compare {
            field,
            op: CompareOp::Eq,
            value: value.clone(),
        },
        Value::Null => FilterExpr::Null {
            field,
            negated: false,
        },
        Value::String(s) if s.is_empty() || s == "null" || s == "None" => FilterExpr::Null {
            field,
            negated: false,
        },
        Value::Object(m) if m.contains_key("in") => FilterExpr::In {
            field,
            values: m["in"].as_array().cloned().unwrap_or_default(),
        },
        Value::Array(items) => FilterExpr::In {
            field,
            values: items.clone(),
        },
        other => FilterExpr::Compare {
            field,
            op: CompareOp::Eq,
            value: other.clone(),
        },
    };
    Ok(expr)
}
