// handlers/crm.rs - GET /alfacrm proxy and GET /get-branches handlers

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::Method,
    response::Response,
};
use serde_json::{json, Value};
use tracing::info;

use crate::crm::{self, CrmEntity, CrmPage, IndexQuery};
use crate::error::ApiError;
use crate::middleware::{ApiResult, Endpoint};
use crate::state::AppState;

const PROXY_ENDPOINT: Endpoint = Endpoint::new(&["GET"], "Content-Type, X-User-Id");
const BRANCHES_ENDPOINT: Endpoint = Endpoint::new(&["GET"], "Content-Type");

const PROXY_PAGE_SIZE: u32 = 50;

/// What `?type=` asks the proxy for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProxyKind {
    Test,
    Students,
    Teachers,
    Lessons,
}

impl ProxyKind {
    fn parse(value: Option<&str>) -> ApiResult<Self> {
        match value.unwrap_or("test") {
            "test" => Ok(ProxyKind::Test),
            "students" => Ok(ProxyKind::Students),
            "teachers" => Ok(ProxyKind::Teachers),
            "lessons" => Ok(ProxyKind::Lessons),
            _ => Err(ApiError::bad_request_with(
                "Invalid entity type",
                "Use type=test, students, teachers, or lessons",
            )),
        }
    }

    fn entity(&self) -> CrmEntity {
        match self {
            ProxyKind::Test | ProxyKind::Students => CrmEntity::Customer,
            ProxyKind::Teachers => CrmEntity::Teacher,
            ProxyKind::Lessons => CrmEntity::Lesson,
        }
    }

    fn payload_key(&self) -> &'static str {
        match self {
            ProxyKind::Test => "response",
            ProxyKind::Students => "students",
            ProxyKind::Teachers => "teachers",
            ProxyKind::Lessons => "lessons",
        }
    }

    /// Test probes with one record; teachers use the server's default paging
    fn query(&self, branch_id: i64, customer_id: Option<i64>) -> IndexQuery {
        match self {
            ProxyKind::Test => IndexQuery::new(branch_id, 0, 1),
            ProxyKind::Students => IndexQuery::new(branch_id, 0, PROXY_PAGE_SIZE),
            ProxyKind::Teachers => IndexQuery::branch(branch_id),
            ProxyKind::Lessons => {
                let query = IndexQuery::new(branch_id, 0, PROXY_PAGE_SIZE);
                match customer_id {
                    Some(id) => query.filter("customer_id", id),
                    None => query,
                }
            }
        }
    }
}

fn customer_filter(params: &HashMap<String, String>) -> ApiResult<Option<i64>> {
    match params.get("customer_id").map(|v| v.trim()).filter(|v| !v.is_empty()) {
        Some(raw) => raw
            .parse::<i64>()
            .map(Some)
            .map_err(|_| ApiError::bad_request("customer_id must be a number")),
        None => Ok(None),
    }
}

/// GET /alfacrm - pass-through reads of AlfaCRM customers, teachers and lessons
///
/// `type` is `test` (default), `students`, `teachers` or `lessons`; lessons can be
/// narrowed with `customer_id`. Upstream HTTP errors keep their status code.
pub async fn alfacrm_proxy(
    State(state): State<AppState>,
    method: Method,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    PROXY_ENDPOINT.dispatch(&method, || proxy(state, params)).await
}

async fn proxy(state: AppState, params: HashMap<String, String>) -> ApiResult<Value> {
    let kind = ProxyKind::parse(params.get("type").map(String::as_str))?;
    let customer_id = customer_filter(&params)?;
    let credentials = state.config.crm.credentials()?;
    let branch_id = credentials.require_branch()?;

    let source = state.open_crm(&credentials)?;
    let token = crm::login(source.as_ref()).await?;
    let page = source
        .index(&token, kind.entity(), &kind.query(branch_id, customer_id))
        .await?;
    info!("Proxied {} from AlfaCRM: {} of {}", kind.payload_key(), page.items.len(), page.total);

    if kind == ProxyKind::Test {
        return Ok(json!({
            "success": true,
            "message": "AlfaCRM connection successful",
            "response": page,
        }));
    }
    let mut body = json!({"success": true, "total": page.total});
    body[kind.payload_key()] = Value::Array(page.items);
    Ok(body)
}

/// GET /get-branches - branches visible to the configured AlfaCRM account
pub async fn get_branches(State(state): State<AppState>, method: Method) -> Response {
    BRANCHES_ENDPOINT.dispatch(&method, || branches(state)).await
}

async fn branches(state: AppState) -> ApiResult<Value> {
    let page = fetch_branches(&state).await?;
    Ok(json!({
        "success": true,
        "total": page.items.len(),
        "branches": page.items,
    }))
}

/// Branch list for the configured account; no branch id needed
pub async fn fetch_branches(state: &AppState) -> ApiResult<CrmPage<Value>> {
    let credentials = state.config.crm.account_credentials()?;
    let source = state.open_crm(&credentials)?;
    let token = crm::login(source.as_ref()).await?;
    Ok(source.branches(&token).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{call, configured, state};
    use crate::testing::{FakeCrm, MemoryDb};
    use axum::http::StatusCode;

    fn crm() -> FakeCrm {
        FakeCrm::new("tok")
            .with_customers(vec![json!({"id": 1, "name": "Анна"}), json!({"id": 2, "name": "Борис"})])
            .with_teachers(vec![json!({"id": 7, "name": "Мария"})])
            .with_lessons(vec![
                json!({"id": 100, "customer_ids": [1]}),
                json!({"id": 101, "customer_ids": [2]}),
            ])
            .with_branches(vec![json!({"id": 1, "name": "Центр"})])
    }

    #[test]
    fn teachers_query_is_branch_only() {
        assert_eq!(ProxyKind::Teachers.query(3, None).to_body(), json!({"branch_id": 3}));
        assert_eq!(ProxyKind::Test.query(3, None).count, Some(1));
        assert_eq!(ProxyKind::Lessons.query(3, Some(9)).to_body()["customer_id"], 9);
        assert_eq!(ProxyKind::Students.query(3, Some(9)).filters.len(), 0);
    }

    #[tokio::test]
    async fn default_type_is_connection_test() {
        let crm = crm();
        let (status, _, body) = call(state(configured(), &MemoryDb::new(), &crm), "GET", "/alfacrm", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "AlfaCRM connection successful");
        assert_eq!(body["response"]["total"], 2);
        assert_eq!(body["response"]["items"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn students_and_filtered_lessons() {
        let crm = crm();
        let (_, _, body) = call(state(configured(), &MemoryDb::new(), &crm), "GET", "/alfacrm?type=students", "").await;
        assert_eq!(body["students"].as_array().unwrap().len(), 2);
        assert_eq!(body["total"], 2);

        let (_, _, body) = call(
            state(configured(), &MemoryDb::new(), &crm),
            "GET",
            "/alfacrm?type=lessons&customer_id=2",
            "",
        )
        .await;
        assert_eq!(body["lessons"].as_array().unwrap().len(), 1);
        assert_eq!(body["lessons"][0]["id"], 101);
    }

    #[tokio::test]
    async fn unknown_type_is_400() {
        let crm = crm();
        let (status, _, body) = call(state(configured(), &MemoryDb::new(), &crm), "GET", "/alfacrm?type=rooms", "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid entity type");
        assert_eq!(body["details"], "Use type=test, students, teachers, or lessons");
        assert!(crm.opened_with().is_empty());
    }

    #[tokio::test]
    async fn missing_credentials_are_500_before_any_call() {
        let crm = crm();
        let mut config = configured();
        config.crm.api_key = None;
        config.crm.branch_id = None;
        let (status, _, body) = call(state(config, &MemoryDb::new(), &crm), "GET", "/alfacrm?type=students", "").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Missing AlfaCRM credentials");
        assert_eq!(body["details"], "ALFACRM_API_KEY, ALFACRM_BRANCH_ID not configured");
        assert!(crm.opened_with().is_empty());
    }

    #[tokio::test]
    async fn empty_token_is_401() {
        let crm = FakeCrm::new("");
        let (status, _, body) = call(state(configured(), &MemoryDb::new(), &crm), "GET", "/alfacrm", "").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Authentication failed");
        assert!(crm.requests().is_empty());
    }

    #[tokio::test]
    async fn upstream_status_is_passed_through() {
        let crm = crm().failing_on(CrmEntity::Teacher, 403);
        let (status, _, body) = call(state(configured(), &MemoryDb::new(), &crm), "GET", "/alfacrm?type=teachers", "").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "AlfaCRM API error");
        assert_eq!(body["status"], 403);
    }

    #[tokio::test]
    async fn unreachable_crm_is_500() {
        let crm = crm().unreachable();
        let (status, _, body) = call(state(configured(), &MemoryDb::new(), &crm), "GET", "/alfacrm", "").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Connection error");
    }

    #[tokio::test]
    async fn branches_do_not_need_branch_id() {
        let crm = crm();
        let mut config = configured();
        config.crm.branch_id = None;
        let (status, _, body) = call(state(config, &MemoryDb::new(), &crm), "GET", "/get-branches", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["branches"][0]["name"], "Центр");
        assert_eq!(body["total"], 1);
    }
}
