//! Request metadata extractor: captures method and URI so handlers can
//! attach them to error envelopes.

use crate::error::RequestContext;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::convert::Infallible;

#[derive(Clone, Debug)]
pub struct RequestMeta {
    pub method: String,
    pub uri: String,
}

impl RequestMeta {
    pub fn context(&self, req_data: Option<String>) -> RequestContext {
        RequestContext {
            method: self.method.clone(),
            uri: self.uri.clone(),
            req_data,
        }
    }
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for RequestMeta {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Nested routers strip their prefix from the matched URI; prefer the
        // original one when the router recorded it.
        let uri = parts
            .extensions
            .get::<axum::extract::OriginalUri>()
            .map(|o| o.0.to_string())
            .unwrap_or_else(|| parts.uri.to_string());
        Ok(RequestMeta {
            method: parts.method.to_string(),
            uri,
        })
    }
}
