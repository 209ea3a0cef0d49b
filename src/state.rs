use std::sync::Arc;

use crate::config::{AppConfig, CrmCredentials};
use crate::crm::{CrmConnector, CrmSource, HttpCrmConnector};
use crate::database::{DatabaseManager, SchoolStore, StoreConnector};
use crate::middleware::ApiResult;

/// Shared handler state: configuration plus the two connection seams
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    stores: Arc<dyn StoreConnector>,
    crm: Arc<dyn CrmConnector>,
}

impl AppState {
    /// Postgres stores and the HTTP AlfaCRM client
    pub fn new(config: AppConfig) -> Self {
        let stores = DatabaseManager::new(config.database.schema.clone(), config.database.connect_timeout());
        Self::with_connectors(config, Arc::new(stores), Arc::new(HttpCrmConnector))
    }

    pub fn with_connectors(config: AppConfig, stores: Arc<dyn StoreConnector>, crm: Arc<dyn CrmConnector>) -> Self {
        Self {
            config: Arc::new(config),
            stores,
            crm,
        }
    }

    /// Validate database settings, then open this request's connection
    pub async fn open_store(&self) -> ApiResult<Box<dyn SchoolStore>> {
        let url = self.config.database.require_url()?;
        self.config.database.require_schema()?;
        Ok(self.stores.connect(url).await?)
    }

    pub fn open_crm(&self, credentials: &CrmCredentials) -> ApiResult<Box<dyn CrmSource>> {
        Ok(self.crm.open(credentials)?)
    }
}

/// Close a request's store; a failed close is logged and never replaces the response
pub async fn release(store: Box<dyn SchoolStore>) {
    if let Err(err) = store.close().await {
        tracing::warn!("Failed to close database connection: {}", err);
    }
}
