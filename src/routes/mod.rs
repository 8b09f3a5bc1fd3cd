use axum::{routing::get, Router};

pub mod ws;

pub fn router() -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .nest("/ws", ws::router())
}
