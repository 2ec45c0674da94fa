//! Error taxonomy: numeric codes mapped to HTTP statuses and message
//! templates, rendered as the stable `{code, msg, request, detail}` envelope.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{OnceLock, RwLock};
use thiserror::Error;

/// Startup-time model configuration failures. These never reach a request
/// path; the process refuses to serve with a broken model.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing column: entity {entity} references '{column}'")]
    MissingColumn { entity: String, column: String },
    #[error("duplicate path segment: {0}")]
    DuplicatePathSegment(String),
    #[error("duplicate column: entity {entity} declares '{column}' twice")]
    DuplicateColumn { entity: String, column: String },
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

/// Fallback code for anything unregistered or unclassified.
pub const ERR_UNKNOWN: u32 = 10000;

pub const ERR_DB_EXECUTION: u32 = 10001;
pub const ERR_COLLECTION_MISSING: u32 = 11000;
pub const ERR_DB_CONNECTION: u32 = 11003;
pub const ERR_RESOURCE_DEPENDED: u32 = 21001;
pub const ERR_PARAMS: u32 = 40001;
pub const ERR_PARAMS_REQUIRED: u32 = 40002;
pub const ERR_PARAMS_FORMAT: u32 = 40003;
pub const ERR_PARAMS_INVALID: u32 = 40004;
pub const ERR_URL_PARAMS: u32 = 40006;
pub const ERR_DB_INTERNAL: u32 = 40008;
pub const ERR_PARAMS_NO_MATCH_TABLE: u32 = 40012;
pub const ERR_RELATION_EXISTS: u32 = 40013;
pub const ERR_TABLE_MISSING: u32 = 40402;
pub const ERR_RECORD_NOT_FOUND: u32 = 40404;
pub const ERR_DUPLICATE_RECORD: u32 = 40901;
pub const ERR_UNDEFINED: u32 = 50001;
pub const ERR_INTERNAL_UNKNOWN: u32 = 50002;

#[derive(Clone, Debug)]
struct CodeSpec {
    http_status: u16,
    template: String,
}

const BUILTIN_CODES: &[(u16, u32, &str)] = &[
    (500, ERR_UNKNOWN, "unknown server error"),
    (400, ERR_DB_EXECUTION, "database execution error"),
    (404, ERR_COLLECTION_MISSING, "collection {collection} does not exist"),
    (500, ERR_DB_CONNECTION, "database connection error"),
    (400, ERR_RESOURCE_DEPENDED, "resource is depended on by others"),
    (400, ERR_PARAMS, "request parameter error: {msg}"),
    (400, ERR_PARAMS_REQUIRED, "request parameter required: {field}"),
    (400, ERR_PARAMS_FORMAT, "request field has invalid type: {field}"),
    (400, ERR_PARAMS_INVALID, "request field has invalid value: {field}"),
    (400, ERR_URL_PARAMS, "malformed parameter in url"),
    (400, ERR_DB_INTERNAL, "internal database error: {msg}"),
    (400, ERR_PARAMS_NO_MATCH_TABLE, "request fields do not match table columns"),
    (400, ERR_RELATION_EXISTS, "relationship already exists"),
    (404, ERR_TABLE_MISSING, "requested table does not exist"),
    (404, ERR_RECORD_NOT_FOUND, "record not found: {msg}"),
    (409, ERR_DUPLICATE_RECORD, "duplicate database record: {msg}"),
    (500, ERR_UNDEFINED, "undefined exception"),
    (500, ERR_INTERNAL_UNKNOWN, "unknown server error"),
];

static REGISTRY: OnceLock<RwLock<HashMap<u32, CodeSpec>>> = OnceLock::new();

fn registry() -> &'static RwLock<HashMap<u32, CodeSpec>> {
    REGISTRY.get_or_init(|| {
        let mut map = HashMap::new();
        for (status, code, template) in BUILTIN_CODES {
            map.insert(
                *code,
                CodeSpec {
                    http_status: *status,
                    template: (*template).to_string(),
                },
            );
        }
        RwLock::new(map)
    })
}

/// Associate `code` with an HTTP status and a message template containing
/// `{name}` placeholders. Re-registering a code overwrites it.
pub fn register(http_status: u16, code: u32, template: impl Into<String>) {
    let spec = CodeSpec {
        http_status,
        template: template.into(),
    };
    if let Ok(mut map) = registry().write() {
        map.insert(code, spec);
    }
}

fn lookup(code: u32) -> CodeSpec {
    registry()
        .read()
        .ok()
        .and_then(|map| map.get(&code).cloned())
        .unwrap_or(CodeSpec {
            http_status: 500,
            template: "unknown server error".into(),
        })
}

/// Fill `{name}` placeholders from `args`; missing names render as empty
/// string. Must never fail: malformed braces pass through verbatim.
fn render_template(template: &str, args: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    loop {
        let Some(open) = rest.find('{') else {
            out.push_str(rest);
            return out;
        };
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) if after[..close].chars().all(|c| c.is_alphanumeric() || c == '_') => {
                if let Some(v) = args.get(&after[..close]) {
                    out.push_str(v);
                }
                rest = &after[close + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }
}

/// Request metadata attached to error envelopes.
#[derive(Clone, Debug, Serialize)]
pub struct RequestContext {
    pub method: String,
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub req_data: Option<String>,
}

/// A classified failure: numeric code plus template substitution fields.
/// Rendered exactly once, at the HTTP boundary.
#[derive(Clone, Debug)]
pub struct ApiError {
    code: u32,
    args: BTreeMap<String, String>,
    request: Option<RequestContext>,
    detail: Option<Value>,
}

impl ApiError {
    pub fn new(code: u32) -> Self {
        ApiError {
            code,
            args: BTreeMap::new(),
            request: None,
            detail: None,
        }
    }

    /// Add a template substitution field.
    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.args.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_request(mut self, request: RequestContext) -> Self {
        self.request = Some(request);
        self
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn code(&self) -> u32 {
        self.code
    }

    pub fn http_status(&self) -> StatusCode {
        StatusCode::from_u16(lookup(self.code).http_status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn message(&self) -> String {
        render_template(&lookup(self.code).template, &self.args)
    }

    pub fn params(msg: impl ToString) -> Self {
        ApiError::new(ERR_PARAMS).with("msg", msg)
    }

    pub fn params_required(field: impl ToString) -> Self {
        ApiError::new(ERR_PARAMS_REQUIRED).with("field", field)
    }

    pub fn url_params() -> Self {
        ApiError::new(ERR_URL_PARAMS)
    }

    pub fn table_missing() -> Self {
        ApiError::new(ERR_TABLE_MISSING)
    }

    pub fn record_not_found(msg: impl ToString) -> Self {
        ApiError::new(ERR_RECORD_NOT_FOUND).with("msg", msg)
    }

    pub fn database(msg: impl ToString) -> Self {
        ApiError::new(ERR_DB_INTERNAL).with("msg", msg)
    }

    pub fn undefined() -> Self {
        ApiError::new(ERR_UNDEFINED)
    }

    pub fn envelope(&self) -> Value {
        serde_json::json!({
            "code": self.code,
            "msg": self.message(),
            "request": self.request,
            "detail": self.detail,
        })
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message())
    }
}

impl std::error::Error for ApiError {}

/// Normalize storage failures: driver text is logged, never sent to clients.
impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => ApiError::new(ERR_RECORD_NOT_FOUND),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                tracing::error!(error = %e, "database connection failure");
                ApiError::new(ERR_DB_CONNECTION)
            }
            _ => {
                tracing::error!(error = %e, "database execution failure");
                ApiError::new(ERR_DB_EXECUTION)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.http_status();
        tracing::error!(code = self.code, msg = %self.message(), "request failed");
        (status, Json(self.envelope())).into_response()
    }
}
