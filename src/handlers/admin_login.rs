// handlers/admin_login.rs - POST /admin-login handler

use axum::{body::Bytes, extract::State, http::Method, response::Response};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::database::models::AdminProfile;
use crate::error::ApiError;
use crate::middleware::{parse_body, ApiResult, Endpoint};
use crate::state::{release, AppState};

const ENDPOINT: Endpoint = Endpoint::new(&["POST"], "Content-Type");

#[derive(Debug, Deserialize)]
struct LoginRequest {
    #[serde(default)]
    login: String,
    #[serde(default)]
    password: String,
}

/// POST /admin-login - plaintext credential check against admin rows
///
/// Body `{"login", "password"}`, both trimmed and required. A match returns the
/// admin profile; anything else is 401 without saying which part was wrong.
pub async fn admin_login(State(state): State<AppState>, method: Method, body: Bytes) -> Response {
    ENDPOINT.dispatch(&method, || login(state, body)).await
}

async fn login(state: AppState, body: Bytes) -> ApiResult<Value> {
    let request: LoginRequest = parse_body(&body)?;
    let login = request.login.trim();
    let password = request.password.trim();
    if login.is_empty() || password.is_empty() {
        return Err(ApiError::bad_request("Login and password required"));
    }

    let mut store = state.open_store().await?;
    let found = store.find_admin(login, password).await;
    release(store).await;

    match found? {
        Some(user) => {
            info!("Admin {} logged in", user.login);
            Ok(json!({"success": true, "user": AdminProfile::from(user)}))
        }
        None => {
            info!("Rejected admin login for {}", login);
            Err(ApiError::unauthorized("Invalid credentials"))
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::handlers::test_support::{call, configured, state};
    use crate::config::AppConfig;
    use crate::testing::{FakeCrm, MemoryDb};
    use crate::types::Role;
    use axum::http::StatusCode;

    fn seeded() -> MemoryDb {
        let db = MemoryDb::new();
        db.seed_user("admin", "secret", "Главный Админ", Role::Admin, Some("+79000000000"));
        db.seed_user("teacher", "secret", "Учитель", Role::Teacher, None);
        db
    }

    #[tokio::test]
    async fn valid_credentials_return_profile() {
        let db = seeded();
        let app = state(configured(), &db, &FakeCrm::default());
        let (status, _, body) =
            call(app, "POST", "/admin-login", r#"{"login":" admin ","password":"secret"}"#).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["user"]["login"], "admin");
        assert_eq!(body["user"]["fullName"], "Главный Админ");
        assert_eq!(body["user"]["role"], "admin");
        assert_eq!(db.connections(), (1, 1));
    }

    #[tokio::test]
    async fn wrong_password_is_401() {
        let db = seeded();
        let app = state(configured(), &db, &FakeCrm::default());
        let (status, _, body) = call(app, "POST", "/admin-login", r#"{"login":"admin","password":"nope"}"#).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Invalid credentials");
        assert_eq!(db.connections(), (1, 1));
    }

    #[tokio::test]
    async fn non_admin_rows_never_match() {
        let db = seeded();
        let app = state(configured(), &db, &FakeCrm::default());
        let (status, _, _) = call(app, "POST", "/admin-login", r#"{"login":"teacher","password":"secret"}"#).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn blank_fields_are_rejected_before_any_query() {
        let db = seeded();
        let app = state(configured(), &db, &FakeCrm::default());
        let (status, _, body) = call(app, "POST", "/admin-login", r#"{"login":"  ","password":"x"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Login and password required");
        assert_eq!(db.connections(), (0, 0));
    }

    #[tokio::test]
    async fn malformed_body_is_400() {
        let db = seeded();
        let app = state(configured(), &db, &FakeCrm::default());
        let (status, _, body) = call(app, "POST", "/admin-login", "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid JSON in request body");
    }

    #[tokio::test]
    async fn missing_database_url_is_500_without_io() {
        let db = seeded();
        let app = state(AppConfig::development(), &db, &FakeCrm::default());
        let (status, _, body) = call(app, "POST", "/admin-login", r#"{"login":"admin","password":"secret"}"#).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Database not configured");
        assert_eq!(db.connections(), (0, 0));
    }

    #[tokio::test]
    async fn preflight_and_wrong_method() {
        let db = seeded();
        let (status, headers, body) =
            call(state(configured(), &db, &FakeCrm::default()), "OPTIONS", "/admin-login", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["access-control-allow-methods"], "POST, OPTIONS");
        assert_eq!(headers["access-control-allow-headers"], "Content-Type");
        assert!(body.is_null());

        let (status, headers, body) =
            call(state(configured(), &db, &FakeCrm::default()), "GET", "/admin-login", "").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(headers["access-control-allow-origin"], "*");
        assert_eq!(body["error"], "Method not allowed");
    }
}
