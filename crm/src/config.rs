use serde::Deserialize;
use std::fmt;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://api.systeme.io/api";
pub const DEFAULT_API_KEY_ENV: &str = "SYSTEME_API_KEY";

/// Connection settings for the CRM API.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct CrmConfig {
    /// Base URL that endpoint paths such as `/tags` are appended to
    #[serde(default = "default_base_url")]
    pub base_url: Url,
    /// API key from the config file. The environment variable named by
    /// `api_key_env` takes precedence when it is set.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Timeout applied to each CRM request
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Page size used when listing tags
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_base_url() -> Url {
    Url::parse(DEFAULT_BASE_URL).expect("default base URL is valid")
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_page_size() -> u32 {
    100
}

impl Default for CrmConfig {
    fn default() -> Self {
        CrmConfig {
            base_url: default_base_url(),
            api_key: None,
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            page_size: default_page_size(),
        }
    }
}

impl CrmConfig {
    /// Resolves the API key from the process environment, falling back to
    /// the value in the config file. Blank values count as missing.
    pub fn resolve_api_key(&self) -> Option<ApiKey> {
        self.resolve_api_key_with(|name| std::env::var(name).ok())
    }

    fn resolve_api_key_with<F>(&self, lookup: F) -> Option<ApiKey>
    where
        F: Fn(&str) -> Option<String>,
    {
        lookup(&self.api_key_env)
            .into_iter()
            .chain(self.api_key.clone())
            .map(|key| key.trim().to_string())
            .find(|key| !key.is_empty())
            .map(ApiKey)
    }
}

/// API key for the CRM. Never printed in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        ApiKey(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}
