use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Configuration errors surfaced to clients as 500s before any I/O happens
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Database not configured")]
    MissingDatabaseUrl,

    #[error("Missing AlfaCRM credentials")]
    MissingCrmCredentials { missing: Vec<&'static str> },

    #[error("Invalid ALFACRM_BRANCH_ID: {0}")]
    InvalidBranchId(String),

    #[error("Invalid database schema name: {0}")]
    InvalidSchema(String),
}

impl ConfigError {
    /// Names of the variables that were not set, for the error `details` field
    pub fn details(&self) -> Option<String> {
        match self {
            ConfigError::MissingCrmCredentials { missing } => {
                Some(format!("{} not configured", missing.join(", ")))
            }
            ConfigError::MissingDatabaseUrl => Some("DATABASE_URL not configured".to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub crm: CrmConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub enable_request_logging: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub schema: String,
    pub connect_timeout_secs: u64,
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct CrmConfig {
    pub domain: Option<String>,
    pub email: Option<String>,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    pub branch_id: Option<String>,
    /// Overrides `https://{domain}` (local fakes, proxies)
    pub base_url: Option<String>,
    pub auth_timeout_secs: u64,
    pub index_timeout_secs: u64,
}

impl std::fmt::Debug for CrmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrmConfig")
            .field("domain", &self.domain)
            .field("email", &self.email)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("branch_id", &self.branch_id)
            .field("base_url", &self.base_url)
            .field("auth_timeout_secs", &self.auth_timeout_secs)
            .field("index_timeout_secs", &self.index_timeout_secs)
            .finish()
    }
}

/// Validated CRM credentials; only constructed when every required value is present
#[derive(Clone)]
pub struct CrmCredentials {
    pub base_url: String,
    pub email: String,
    pub api_key: String,
    pub branch_id: Option<i64>,
    pub auth_timeout: Duration,
    pub index_timeout: Duration,
}

impl std::fmt::Debug for CrmCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrmCredentials")
            .field("base_url", &self.base_url)
            .field("email", &self.email)
            .field("api_key", &"<redacted>")
            .field("branch_id", &self.branch_id)
            .finish()
    }
}

impl CrmCredentials {
    /// Branch id for endpoints that index per branch
    pub fn require_branch(&self) -> Result<i64, ConfigError> {
        self.branch_id.ok_or(ConfigError::MissingCrmCredentials {
            missing: vec!["ALFACRM_BRANCH_ID"],
        })
    }
}

impl CrmConfig {
    /// Credentials for endpoints that work across branches (branch listing)
    pub fn account_credentials(&self) -> Result<CrmCredentials, ConfigError> {
        self.collect(false)
    }

    /// Credentials including a parsed branch id
    pub fn credentials(&self) -> Result<CrmCredentials, ConfigError> {
        self.collect(true)
    }

    fn collect(&self, with_branch: bool) -> Result<CrmCredentials, ConfigError> {
        let mut missing = Vec::new();
        if is_blank(&self.api_key) {
            missing.push("ALFACRM_API_KEY");
        }
        if with_branch && is_blank(&self.branch_id) {
            missing.push("ALFACRM_BRANCH_ID");
        }
        if is_blank(&self.domain) && is_blank(&self.base_url) {
            missing.push("ALFACRM_DOMAIN");
        }
        if is_blank(&self.email) {
            missing.push("ALFACRM_EMAIL");
        }
        if !missing.is_empty() {
            return Err(ConfigError::MissingCrmCredentials { missing });
        }

        let branch_id = match (&self.branch_id, with_branch) {
            (Some(raw), true) => Some(
                raw.trim()
                    .parse::<i64>()
                    .map_err(|_| ConfigError::InvalidBranchId(raw.clone()))?,
            ),
            _ => None,
        };

        let base_url = match self.base_url.as_deref().map(str::trim).filter(|b| !b.is_empty()) {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => {
                let domain = self.domain.as_deref().unwrap_or_default().trim();
                format!("https://{}", domain.trim_end_matches('/'))
            }
        };

        Ok(CrmCredentials {
            base_url,
            email: self.email.clone().unwrap_or_default(),
            api_key: self.api_key.clone().unwrap_or_default(),
            branch_id,
            auth_timeout: Duration::from_secs(self.auth_timeout_secs),
            index_timeout: Duration::from_secs(self.index_timeout_secs),
        })
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

impl DatabaseConfig {
    pub fn require_url(&self) -> Result<&str, ConfigError> {
        match self.url.as_deref() {
            Some(url) if !url.trim().is_empty() => Ok(url),
            _ => Err(ConfigError::MissingDatabaseUrl),
        }
    }

    /// Schema name, checked so it can be spliced into SQL as an identifier
    pub fn require_schema(&self) -> Result<&str, ConfigError> {
        let valid = !self.schema.is_empty()
            && self.schema.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            && !self.schema.starts_with(|c: char| c.is_ascii_digit());
        if valid {
            Ok(&self.schema)
        } else {
            Err(ConfigError::InvalidSchema(self.schema.clone()))
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

pub const DEFAULT_SCHEMA: &str = "t_p720035_lineaschool_app";

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Server overrides
        if let Some(port) = env::var("LINEASCHOOL_API_PORT")
            .ok()
            .or_else(|| env::var("PORT").ok())
            .and_then(|s| s.parse::<u16>().ok())
        {
            self.server.port = port;
        }
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.server.enable_request_logging = v.parse().unwrap_or(self.server.enable_request_logging);
        }

        // Database overrides
        self.database.url = non_empty_var("DATABASE_URL");
        if let Some(v) = non_empty_var("DATABASE_SCHEMA") {
            self.database.schema = v;
        }
        if let Ok(v) = env::var("DATABASE_CONNECT_TIMEOUT_SECS") {
            self.database.connect_timeout_secs = v.parse().unwrap_or(self.database.connect_timeout_secs);
        }

        // CRM overrides
        self.crm.domain = non_empty_var("ALFACRM_DOMAIN");
        self.crm.email = non_empty_var("ALFACRM_EMAIL");
        self.crm.api_key = non_empty_var("ALFACRM_API_KEY");
        self.crm.branch_id = non_empty_var("ALFACRM_BRANCH_ID");
        self.crm.base_url = non_empty_var("ALFACRM_BASE_URL");
        if let Ok(v) = env::var("ALFACRM_AUTH_TIMEOUT_SECS") {
            self.crm.auth_timeout_secs = v.parse().unwrap_or(self.crm.auth_timeout_secs);
        }
        if let Ok(v) = env::var("ALFACRM_INDEX_TIMEOUT_SECS") {
            self.crm.index_timeout_secs = v.parse().unwrap_or(self.crm.index_timeout_secs);
        }

        self
    }

    /// Profile with no secrets set; used as the base for every environment and in tests
    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                port: 3000,
                enable_request_logging: true,
            },
            database: DatabaseConfig {
                url: None,
                schema: DEFAULT_SCHEMA.to_string(),
                connect_timeout_secs: 30,
            },
            crm: CrmConfig {
                auth_timeout_secs: 10,
                index_timeout_secs: 15,
                ..CrmConfig::default()
            },
        }
    }

    fn staging() -> Self {
        let mut config = Self::development();
        config.environment = Environment::Staging;
        config.database.connect_timeout_secs = 10;
        config
    }

    fn production() -> Self {
        let mut config = Self::development();
        config.environment = Environment::Production;
        config.server.enable_request_logging = false;
        config.database.connect_timeout_secs = 5;
        config
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}
