//! Entity CRUD routes. Paths are parameterized so one router serves every
//! entity in the model; handlers resolve the entity by path segment.

use crate::handlers::entity::{create, delete as delete_handler, list, read, update};
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn entity_routes(state: AppState) -> Router {
    Router::new()
        .route("/:path_segment", get(list).post(create))
        .route(
            "/:path_segment/:key",
            get(read).patch(update).delete(delete_handler),
        )
        .with_state(state)
}
