//! Demo server: loads the entity model from a JSON file, connects the pool,
//! mounts common and entity routes behind the trace and panic boundaries.

use axum::Router;
use restbase_sdk::{
    common_routes_with_ready, entity_routes, load_from_file, resolve,
    routes::{not_found_fallback, panic_response},
    AppState,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("restbase_sdk=info".parse()?))
        .init();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/restbase".into());
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    let model_path = std::env::var("MODEL_PATH").unwrap_or_else(|_| "model.json".into());
    let config = load_from_file(&model_path)?;
    let model = resolve(&config)?;
    let state = AppState {
        pool,
        model: Arc::new(model),
    };

    let app = Router::new()
        .merge(common_routes_with_ready(state.clone()))
        .nest("/api/v1", entity_routes(state))
        .fallback(not_found_fallback)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http());

    let bind = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let listener = TcpListener::bind(&bind).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
