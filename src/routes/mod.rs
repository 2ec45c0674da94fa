pub mod common;
pub mod entity;

pub use common::{common_routes, common_routes_with_ready, not_found_fallback, panic_response};
pub use entity::entity_routes;
