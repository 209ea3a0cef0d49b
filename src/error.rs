// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::config::ConfigError;
use crate::crm::CrmError;
use crate::database::DatabaseError;
use crate::sync::SyncError;

/// Every failure a handler can report, with a single mapping to status codes
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest { message: String, details: Option<String> },
    InvalidJson(String),

    // 401 Unauthorized
    Unauthorized { message: String, details: Option<String> },

    // 405 Method Not Allowed
    MethodNotAllowed,

    // 500 Internal Server Error (checked before any I/O)
    Configuration { message: String, details: Option<String> },

    // Upstream CRM failures: upstream status when known, else 500
    Upstream { status: Option<u16>, message: String, details: Option<String> },

    // 500 Internal Server Error
    Internal { message: String, details: Option<String> },
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest { .. } => 400,
            ApiError::InvalidJson(_) => 400,
            ApiError::Unauthorized { .. } => 401,
            ApiError::MethodNotAllowed => 405,
            ApiError::Configuration { .. } => 500,
            ApiError::Upstream { status, .. } => match status {
                Some(code) if (400..=599).contains(code) => *code,
                _ => 500,
            },
            ApiError::Internal { .. } => 500,
        }
    }

    /// Get client-facing error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest { message, .. } => message,
            ApiError::InvalidJson(msg) => msg,
            ApiError::Unauthorized { message, .. } => message,
            ApiError::MethodNotAllowed => "Method not allowed",
            ApiError::Configuration { message, .. } => message,
            ApiError::Upstream { message, .. } => message,
            ApiError::Internal { message, .. } => message,
        }
    }

    pub fn details(&self) -> Option<&str> {
        match self {
            ApiError::BadRequest { details, .. }
            | ApiError::Unauthorized { details, .. }
            | ApiError::Configuration { details, .. }
            | ApiError::Upstream { details, .. }
            | ApiError::Internal { details, .. } => details.as_deref(),
            _ => None,
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        let mut body = json!({
            "success": false,
            "error": self.message(),
        });
        if let Some(details) = self.details() {
            body["details"] = json!(details);
        }
        if let ApiError::Upstream { status: Some(status), .. } = self {
            body["status"] = json!(status);
        }
        body
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest { message: message.into(), details: None }
    }

    pub fn bad_request_with(message: impl Into<String>, details: impl Into<String>) -> Self {
        ApiError::BadRequest { message: message.into(), details: Some(details.into()) }
    }

    pub fn invalid_json(message: impl Into<String>) -> Self {
        ApiError::InvalidJson(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized { message: message.into(), details: None }
    }

    pub fn internal(message: impl Into<String>, details: impl Into<String>) -> Self {
        ApiError::Internal { message: message.into(), details: Some(details.into()) }
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::Configuration { message: err.to_string(), details: err.details() }
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        tracing::error!("Database error: {}", err);
        ApiError::internal("Internal server error", err.to_string())
    }
}

impl From<CrmError> for ApiError {
    fn from(err: CrmError) -> Self {
        match err {
            CrmError::Http { status, body } => {
                tracing::warn!("AlfaCRM responded with {}", status);
                ApiError::Upstream {
                    status: Some(status),
                    message: "AlfaCRM API error".to_string(),
                    details: Some(body),
                }
            }
            CrmError::Connection(reason) => {
                tracing::warn!("AlfaCRM connection error: {}", reason);
                ApiError::Upstream {
                    status: None,
                    message: "Connection error".to_string(),
                    details: Some(reason),
                }
            }
            CrmError::MissingToken => ApiError::Unauthorized {
                message: "Authentication failed".to_string(),
                details: Some("Could not obtain auth token from AlfaCRM".to_string()),
            },
            CrmError::Decode(reason) => {
                tracing::error!("AlfaCRM payload could not be decoded: {}", reason);
                ApiError::internal("Internal server error", reason)
            }
        }
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Crm(err) => err.into(),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.details() {
            Some(details) => write!(f, "{}: {}", self.message(), details),
            None => write!(f, "{}", self.message()),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}
