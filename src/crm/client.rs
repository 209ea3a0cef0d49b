use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument};

use super::{CrmEntity, CrmError, CrmPage, CrmSource, IndexQuery};
use crate::config::CrmCredentials;

const TOKEN_HEADER: &str = "X-ALFACRM-TOKEN";

/// HTTP client for the AlfaCRM v2 API
pub struct AlfaCrmClient {
    credentials: CrmCredentials,
    api_base: url::Url,
    http: Client,
}

impl std::fmt::Debug for AlfaCrmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlfaCrmClient")
            .field("api_base", &self.api_base.as_str())
            .finish()
    }
}

impl AlfaCrmClient {
    pub fn new(credentials: CrmCredentials) -> Result<Self, CrmError> {
        let api_base = url::Url::parse(&format!("{}/v2api/", credentials.base_url))
            .map_err(|e| CrmError::Connection(format!("invalid AlfaCRM address: {}", e)))?;
        let http = Client::builder()
            .connect_timeout(credentials.auth_timeout)
            .build()
            .map_err(|e| CrmError::Connection(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            credentials,
            api_base,
            http,
        })
    }

    fn endpoint(&self, path: &str) -> Result<url::Url, CrmError> {
        self.api_base
            .join(path)
            .map_err(|e| CrmError::Connection(format!("invalid AlfaCRM path {}: {}", path, e)))
    }

    fn post(&self, path: &str, timeout: Duration) -> Result<RequestBuilder, CrmError> {
        Ok(self.http.post(self.endpoint(path)?).timeout(timeout))
    }

    /// Send, map non-2xx to `Http` and decode the JSON body
    async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, CrmError> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "No error details".to_string());
            return Err(CrmError::Http {
                status: status.as_u16(),
                body,
            });
        }
        let text = response.text().await.map_err(transport_error)?;
        serde_json::from_str(&text).map_err(|e| CrmError::Decode(e.to_string()))
    }
}

fn transport_error(err: reqwest::Error) -> CrmError {
    if err.is_timeout() {
        CrmError::Connection(format!("request timed out: {}", err))
    } else {
        CrmError::Connection(err.to_string())
    }
}

#[derive(serde::Deserialize)]
struct AuthReply {
    #[serde(default)]
    token: Option<String>,
}

#[async_trait]
impl CrmSource for AlfaCrmClient {
    #[instrument(skip(self), fields(base = %self.credentials.base_url))]
    async fn authenticate(&self) -> Result<String, CrmError> {
        let request = self.post("auth/login", self.credentials.auth_timeout)?.json(&json!({
            "email": self.credentials.email,
            "api_key": self.credentials.api_key,
        }));
        let reply: AuthReply = Self::send(request).await?;
        let token = reply.token.unwrap_or_default();
        debug!(issued = !token.is_empty(), "AlfaCRM auth finished");
        Ok(token)
    }

    #[instrument(skip(self, token, query), fields(branch = query.branch_id, page = query.page))]
    async fn index(&self, token: &str, entity: CrmEntity, query: &IndexQuery) -> Result<CrmPage<Value>, CrmError> {
        let request = self
            .post(entity.path(), self.credentials.index_timeout)?
            .header(TOKEN_HEADER, token)
            .json(&query.to_body());
        let page: CrmPage<Value> = Self::send(request).await?;
        debug!(items = page.items.len(), total = page.total, "AlfaCRM index page received");
        Ok(page)
    }

    #[instrument(skip(self, token))]
    async fn branches(&self, token: &str) -> Result<CrmPage<Value>, CrmError> {
        let request = self
            .post("branch/index", self.credentials.auth_timeout)?
            .header(TOKEN_HEADER, token)
            .json(&json!({}));
        Self::send(request).await
    }
}
