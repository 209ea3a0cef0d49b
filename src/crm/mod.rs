//! AlfaCRM access: authentication, paged index requests and typed records.

pub mod client;
pub mod records;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::CrmCredentials;

pub use client::AlfaCrmClient;
pub use records::{CrmCustomer, CrmLesson, CrmTeacher};

/// Largest page AlfaCRM serves per index call
pub const MAX_PAGE_SIZE: u32 = 1000;

#[derive(Debug, Error)]
pub enum CrmError {
    /// Transport failure or timeout, no HTTP status available
    #[error("AlfaCRM connection error: {0}")]
    Connection(String),

    /// Non-2xx reply
    #[error("AlfaCRM returned HTTP {status}")]
    Http { status: u16, body: String },

    #[error("AlfaCRM returned an unexpected payload: {0}")]
    Decode(String),

    #[error("AlfaCRM did not issue an auth token")]
    MissingToken,
}

/// Index endpoints the client pages through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrmEntity {
    Customer,
    Teacher,
    Lesson,
}

impl CrmEntity {
    pub fn path(&self) -> &'static str {
        match self {
            CrmEntity::Customer => "customer/index",
            CrmEntity::Teacher => "teacher/index",
            CrmEntity::Lesson => "lesson/index",
        }
    }
}

/// Body of an index request; `count` is clamped to `MAX_PAGE_SIZE`
#[derive(Debug, Clone, PartialEq)]
pub struct IndexQuery {
    pub branch_id: i64,
    pub page: u32,
    pub count: Option<u32>,
    pub filters: Map<String, Value>,
}

impl IndexQuery {
    pub fn new(branch_id: i64, page: u32, count: u32) -> Self {
        Self {
            branch_id,
            page,
            count: Some(count.min(MAX_PAGE_SIZE)),
            filters: Map::new(),
        }
    }

    /// Branch-only query, server default paging
    pub fn branch(branch_id: i64) -> Self {
        Self {
            branch_id,
            page: 0,
            count: None,
            filters: Map::new(),
        }
    }

    pub fn filter(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.filters.insert(key.to_string(), value.into());
        self
    }

    pub fn to_body(&self) -> Value {
        let mut body = self.filters.clone();
        body.insert("branch_id".into(), Value::from(self.branch_id));
        if let Some(count) = self.count {
            body.insert("page".into(), Value::from(self.page));
            body.insert("count".into(), Value::from(count));
        }
        Value::Object(body)
    }
}

/// One page of an index call. Missing keys decode as an empty page
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrmPage<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    #[serde(default)]
    pub total: i64,
}

/// Remote CRM operations; the HTTP client and test fakes implement this
#[async_trait]
pub trait CrmSource: Send + Sync {
    /// Exchange email + API key for a session token; empty token means rejected
    async fn authenticate(&self) -> Result<String, CrmError>;

    async fn index(&self, token: &str, entity: CrmEntity, query: &IndexQuery) -> Result<CrmPage<Value>, CrmError>;

    async fn branches(&self, token: &str) -> Result<CrmPage<Value>, CrmError>;
}

/// Builds a `CrmSource` for validated credentials
pub trait CrmConnector: Send + Sync {
    fn open(&self, credentials: &CrmCredentials) -> Result<Box<dyn CrmSource>, CrmError>;
}

/// Connector producing real HTTP clients
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpCrmConnector;

impl CrmConnector for HttpCrmConnector {
    fn open(&self, credentials: &CrmCredentials) -> Result<Box<dyn CrmSource>, CrmError> {
        Ok(Box::new(AlfaCrmClient::new(credentials.clone())?))
    }
}

/// Authenticate and treat an empty token as a failure
pub async fn login(source: &dyn CrmSource) -> Result<String, CrmError> {
    let token = source.authenticate().await?;
    if token.is_empty() {
        return Err(CrmError::MissingToken);
    }
    Ok(token)
}
