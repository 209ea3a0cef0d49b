// handlers/mod.rs - one module per endpoint group
//
// Every handler takes the raw method and wraps its work in `Endpoint::dispatch`,
// so preflight and 405 behaviour is decided per endpoint instead of by the router.

pub mod admin_login;
pub mod crm;
pub mod directory;
pub mod games;
pub mod health;
pub mod results;
pub mod sync;

pub use admin_login::admin_login;
pub use crm::{alfacrm_proxy, get_branches};
pub use directory::get_students;
pub use games::{get_games, save_game};
pub use health::health;
pub use results::save_game_result;
pub use sync::alfacrm_sync;

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{HeaderMap, Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::config::AppConfig;
    use crate::state::AppState;
    use crate::testing::{FakeCrm, MemoryDb};

    /// Config with every required value present
    pub fn configured() -> AppConfig {
        let mut config = AppConfig::development();
        config.database.url = Some("postgres://memory/school".to_string());
        config.crm.domain = Some("school.s20.online".to_string());
        config.crm.email = Some("admin@example.com".to_string());
        config.crm.api_key = Some("key".to_string());
        config.crm.branch_id = Some("1".to_string());
        config
    }

    pub fn state(config: AppConfig, db: &MemoryDb, crm: &FakeCrm) -> AppState {
        AppState::with_connectors(config, Arc::new(db.clone()), Arc::new(crm.clone()))
    }

    /// Run one request through the full router
    pub async fn call(state: AppState, method: &str, uri: &str, body: &str) -> (StatusCode, HeaderMap, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = crate::app(state).oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, headers, json)
    }
}
