//! read client configuration from a file or the environment

use std::time::Duration;

use serde::Deserialize;

use crate::errors::Error;

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";
pub const LOGIN_API: &str = "/oauth2/token";
pub const REFRESH_TOKEN_API: &str = "/oauth2/refresh-token";
pub const LOGOUT_API: &str = "/oauth2/logout";

pub enum ConfigLocation {
    File(String),
    Env,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    /// Default per-call timeout; `RequestOptions::timeout` overrides it.
    pub timeout_ms: u64,
    /// Envelope `code` treated as success.
    pub success_code: i64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub refresh_timeout_ms: u64,
    pub login_path: String,
    pub refresh_path: String,
    pub logout_path: String,
    /// URL fragments whose 401 responses never trigger a refresh exchange.
    pub refresh_excluded_urls: Vec<String>,
    /// JSON file the token store persists to; in-memory when absent.
    pub token_path: Option<String>,
    pub encrypt_refresh_token: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_ms: 15_000,
            success_code: 0,
            max_retries: 2,
            retry_delay_ms: 500,
            refresh_timeout_ms: 5_000,
            login_path: LOGIN_API.to_string(),
            refresh_path: REFRESH_TOKEN_API.to_string(),
            logout_path: LOGOUT_API.to_string(),
            refresh_excluded_urls: vec![
                REFRESH_TOKEN_API.to_string(),
                LOGIN_API.to_string(),
                "/api/permissions".to_string(),
                "/user/info".to_string(),
                "/get-menu-list".to_string(),
            ],
            token_path: None,
            encrypt_refresh_token: false,
        }
    }
}

impl ClientConfig {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn from_file(path: &str) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)?;
        let config: ClientConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self, Error> {
        let mut config = ClientConfig {
            base_url: std::env::var("ADMIN_API_URL")
                .map_err(|_| Error::Config("Missing ADMIN_API_URL env var".to_string()))?,
            ..ClientConfig::default()
        };
        if let Some(v) = env_parsed::<u64>("ADMIN_API_TIMEOUT_MS")? {
            config.timeout_ms = v;
        }
        if let Some(v) = env_parsed::<u32>("ADMIN_API_MAX_RETRIES")? {
            config.max_retries = v;
        }
        if let Some(v) = env_parsed::<u64>("ADMIN_API_RETRY_DELAY_MS")? {
            config.retry_delay_ms = v;
        }
        if let Some(v) = env_parsed::<i64>("ADMIN_API_SUCCESS_CODE")? {
            config.success_code = v;
        }
        if let Some(v) = env_parsed::<bool>("ADMIN_ENCRYPT_REFRESH_TOKEN")? {
            config.encrypt_refresh_token = v;
        }
        config.token_path = std::env::var("ADMIN_TOKEN_PATH").ok();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        reqwest::Url::parse(&self.base_url).map_err(|e| {
            Error::Config(format!("Invalid base URL '{}': {}", self.base_url, e))
        })?;
        if self.timeout_ms == 0 {
            return Err(Error::Config("timeout_ms must be > 0".into()));
        }
        if self.refresh_timeout_ms == 0 {
            return Err(Error::Config("refresh_timeout_ms must be > 0".into()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_millis(self.refresh_timeout_ms)
    }

    /// True when a 401 on `url` must propagate instead of starting a refresh.
    pub fn is_refresh_excluded(&self, url: &str) -> bool {
        self.refresh_excluded_urls
            .iter()
            .any(|fragment| url.contains(fragment.as_str()))
    }
}

pub fn read_config(loc: ConfigLocation) -> Result<ClientConfig, Error> {
    match loc {
        ConfigLocation::File(path) => ClientConfig::from_file(&path),
        ConfigLocation::Env => ClientConfig::from_env(),
    }
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Result<Option<T>, Error> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("Invalid value for {name}: '{raw}'"))),
        Err(_) => Ok(None),
    }
}
