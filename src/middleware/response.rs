use std::future::Future;

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ApiError;

pub type ApiResult<T> = Result<T, ApiError>;

/// Method and CORS description of one handler
#[derive(Debug, Clone, Copy)]
pub struct Endpoint {
    /// Upper-case method names, e.g. `"POST"`
    pub methods: &'static [&'static str],
    pub allow_headers: &'static str,
}

impl Endpoint {
    pub const fn new(methods: &'static [&'static str], allow_headers: &'static str) -> Self {
        Self { methods, allow_headers }
    }

    /// `Access-Control-Allow-Methods` value, always ending with OPTIONS
    pub fn allow_methods(&self) -> String {
        let mut names: Vec<&str> = self.methods.to_vec();
        names.push("OPTIONS");
        names.join(", ")
    }

    /// Preflight short-circuit, then method guard, then the handler body
    pub async fn dispatch<F, Fut>(&self, method: &Method, work: F) -> Response
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ApiResult<Value>>,
    {
        if *method == Method::OPTIONS {
            return self.preflight();
        }
        if !self.methods.contains(&method.as_str()) {
            return json_response(Err(ApiError::MethodNotAllowed));
        }
        json_response(work().await)
    }

    fn preflight(&self) -> Response {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::OK;
        let headers = response.headers_mut();
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        if let Ok(methods) = HeaderValue::from_str(&self.allow_methods()) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, methods);
        }
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(self.allow_headers),
        );
        headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("86400"));
        response
    }
}

/// JSON body with the wildcard origin header every non-preflight response carries
fn json_response(result: ApiResult<Value>) -> Response {
    let mut response = match result {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(err) => {
            if err.status_code() >= 500 {
                tracing::error!(status = err.status_code(), "request failed: {}", err);
            } else {
                tracing::debug!(status = err.status_code(), "request rejected: {}", err);
            }
            err.into_response()
        }
    };
    response
        .headers_mut()
        .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}

/// Decode a request body; an empty body reads as `{}`
pub fn parse_body<T: DeserializeOwned>(body: &Bytes) -> ApiResult<T> {
    let raw: &[u8] = if body.iter().all(u8::is_ascii_whitespace) { b"{}" } else { &body[..] };
    serde_json::from_slice(raw).map_err(|e| {
        tracing::debug!("invalid JSON body: {}", e);
        ApiError::invalid_json("Invalid JSON in request body")
    })
}
