use axum::{response::Html, routing::get, Json, Router};
use serde_json::{json, Value};

const INDEX_HTML: &str = include_str!("../../static/index.html");

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub fn routes() -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
}
