// handlers/health.rs - GET /health handler

use axum::{http::Method, response::Response};
use serde_json::{json, Value};

use crate::middleware::{ApiResult, Endpoint};

const ENDPOINT: Endpoint = Endpoint::new(&["GET"], "Content-Type");

/// GET /health - liveness only, touches neither the database nor AlfaCRM
pub async fn health(method: Method) -> Response {
    ENDPOINT.dispatch(&method, || async { status() }).await
}

fn status() -> ApiResult<Value> {
    Ok(json!({
        "success": true,
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
