#![allow(dead_code)]

use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};

use lineaschool_api::config::AppConfig;
use lineaschool_api::crm::HttpCrmConnector;
use lineaschool_api::testing::MemoryDb;
use lineaschool_api::AppState;

pub const CRM_TOKEN: &str = "fake-token";
pub const CRM_API_KEY: &str = "fake-key";

async fn wait_ready(base_url: &str, timeout: Duration) -> Result<()> {
    let client = reqwest::Client::new();
    let deadline = Instant::now() + timeout;
    loop {
        if Instant::now() > deadline {
            break;
        }
        let url = format!("{}/health", base_url);
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status() == reqwest::StatusCode::OK {
                return Ok(());
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    anyhow::bail!("server did not become ready on {} within {:?}", base_url, timeout)
}

async fn bind() -> Result<(tokio::net::TcpListener, String)> {
    let port = portpicker::pick_unused_port().context("failed to pick free port")?;
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .with_context(|| format!("failed to bind port {}", port))?;
    Ok((listener, format!("http://127.0.0.1:{}", port)))
}

/// The real router on a picked port, backed by an in-memory database
pub struct TestServer {
    pub base_url: String,
    pub db: MemoryDb,
}

impl TestServer {
    pub async fn spawn(config: AppConfig) -> Result<Self> {
        let db = MemoryDb::new();
        let state = AppState::with_connectors(config, Arc::new(db.clone()), Arc::new(HttpCrmConnector));
        let (listener, base_url) = bind().await?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, lineaschool_api::app(state)).await;
        });
        wait_ready(&base_url, Duration::from_secs(5)).await?;
        Ok(Self { base_url, db })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Config pointing at an in-memory database and, optionally, a fake AlfaCRM
pub fn config(crm_base_url: Option<&str>) -> AppConfig {
    let mut config = AppConfig::development();
    config.server.enable_request_logging = false;
    config.database.url = Some("postgres://memory/school".to_string());
    if let Some(base) = crm_base_url {
        config.crm.base_url = Some(base.to_string());
        config.crm.email = Some("admin@example.com".to_string());
        config.crm.api_key = Some(CRM_API_KEY.to_string());
        config.crm.branch_id = Some("1".to_string());
    }
    config
}

#[derive(Default)]
struct CrmData {
    customers: Vec<Value>,
    teachers: Vec<Value>,
    lessons: Vec<Value>,
    branches: Vec<Value>,
    failing_entity: Option<(String, u16)>,
    requests: Mutex<Vec<(String, Value)>>,
}

/// Minimal AlfaCRM v2 API: token login plus the index endpoints
pub struct FakeAlfaCrm {
    pub base_url: String,
    data: Arc<CrmData>,
}

pub struct FakeAlfaCrmBuilder {
    data: CrmData,
}

impl FakeAlfaCrm {
    pub fn builder() -> FakeAlfaCrmBuilder {
        FakeAlfaCrmBuilder { data: CrmData::default() }
    }

    /// `(entity, body)` of every index call received
    pub fn requests(&self) -> Vec<(String, Value)> {
        self.data.requests.lock().unwrap().clone()
    }
}

impl FakeAlfaCrmBuilder {
    pub fn customers(mut self, items: Vec<Value>) -> Self {
        self.data.customers = items;
        self
    }

    pub fn teachers(mut self, items: Vec<Value>) -> Self {
        self.data.teachers = items;
        self
    }

    pub fn lessons(mut self, items: Vec<Value>) -> Self {
        self.data.lessons = items;
        self
    }

    pub fn branches(mut self, items: Vec<Value>) -> Self {
        self.data.branches = items;
        self
    }

    pub fn failing(mut self, entity: &str, status: u16) -> Self {
        self.data.failing_entity = Some((entity.to_string(), status));
        self
    }

    pub async fn spawn(self) -> Result<FakeAlfaCrm> {
        let data = Arc::new(self.data);
        let router = Router::new()
            .route("/v2api/auth/login", post(crm_login))
            .route("/v2api/:entity/index", post(crm_index))
            .with_state(data.clone());
        let (listener, base_url) = bind().await?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        Ok(FakeAlfaCrm { base_url, data })
    }
}

async fn crm_login(Json(body): Json<Value>) -> Json<Value> {
    if body["api_key"] == CRM_API_KEY {
        Json(json!({"token": CRM_TOKEN}))
    } else {
        Json(json!({"token": ""}))
    }
}

async fn crm_index(
    State(data): State<Arc<CrmData>>,
    Path(entity): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    data.requests.lock().unwrap().push((entity.clone(), body.clone()));

    if headers.get("X-ALFACRM-TOKEN").and_then(|v| v.to_str().ok()) != Some(CRM_TOKEN) {
        return (StatusCode::UNAUTHORIZED, "bad token").into_response();
    }
    if let Some((failing, status)) = &data.failing_entity {
        if failing == &entity {
            let status = StatusCode::from_u16(*status).unwrap();
            return (status, r#"{"errors":["scripted"]}"#).into_response();
        }
    }

    let items: Vec<Value> = match entity.as_str() {
        "customer" => data.customers.clone(),
        "teacher" => data.teachers.clone(),
        "lesson" => data
            .lessons
            .iter()
            .filter(|lesson| match body.get("customer_id") {
                Some(id) => lesson["customer_ids"].as_array().map_or(false, |ids| ids.contains(id)),
                None => true,
            })
            .cloned()
            .collect(),
        "branch" => data.branches.clone(),
        _ => return (StatusCode::NOT_FOUND, "unknown entity").into_response(),
    };
    let total = items.len();
    let count = body["count"].as_u64().map_or(items.len(), |c| c as usize);
    let items: Vec<Value> = items.into_iter().take(count).collect();
    Json(json!({"items": items, "total": total, "count": count, "page": 0})).into_response()
}

/// The compiled binary, run like a deployment with no database or CRM settings
pub struct BinaryServer {
    pub base_url: String,
    child: Child,
}

impl BinaryServer {
    pub async fn spawn() -> Result<Self> {
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let mut cmd = Command::new(env!("CARGO_BIN_EXE_lineaschool-api"));
        cmd.args(["serve", "--port", &port.to_string()])
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        for var in [
            "DATABASE_URL",
            "ALFACRM_DOMAIN",
            "ALFACRM_EMAIL",
            "ALFACRM_API_KEY",
            "ALFACRM_BRANCH_ID",
            "ALFACRM_BASE_URL",
        ] {
            cmd.env_remove(var);
        }
        let child = cmd.spawn().context("failed to spawn server binary")?;

        let server = Self { base_url, child };
        wait_ready(&server.base_url, Duration::from_secs(10)).await?;
        Ok(server)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for BinaryServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
