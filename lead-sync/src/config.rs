use crm::CrmConfig;
use http::HeaderValue;
use serde::Deserialize;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Sync path must start with '/': {0}")]
    InvalidPath(String),

    #[error("Empty tag name in {0}")]
    EmptyTagName(&'static str),

    #[error("Empty field slug for {0}")]
    EmptyFieldSlug(&'static str),

    #[error("Invalid CORS origin: {0}")]
    InvalidCorsOrigin(String),

    #[error("Listener and admin listener share the address {0}")]
    ListenerConflict(String),
}

/// How failures of individual tag operations are handled
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TagPolicy {
    /// Any failed tag creation, removal or assignment aborts the sync
    #[default]
    Strict,
    /// Failed tag operations are reported in the response and skipped
    Lenient,
}

/// Lead sync configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Main listener serving the sync endpoint
    #[serde(default)]
    pub listener: Listener,
    /// Admin listener for health and readiness probes
    #[serde(default = "Listener::admin_default")]
    pub admin_listener: Listener,
    /// Path of the sync endpoint
    #[serde(default = "default_path")]
    pub path: String,
    /// Value of `Access-Control-Allow-Origin`. No CORS headers are sent when unset.
    #[serde(default)]
    pub cors_allow_origin: Option<String>,
    #[serde(default)]
    pub crm: CrmConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

fn default_path() -> String {
    "/sync".to_string()
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        if self.listener == self.admin_listener {
            return Err(ValidationError::ListenerConflict(format!(
                "{}:{}",
                self.listener.host, self.listener.port
            )));
        }

        if !self.path.starts_with('/') {
            return Err(ValidationError::InvalidPath(self.path.clone()));
        }

        if let Some(origin) = &self.cors_allow_origin
            && HeaderValue::from_str(origin).is_err()
        {
            return Err(ValidationError::InvalidCorsOrigin(origin.clone()));
        }

        self.sync.validate()
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "127.0.0.1".into(),
            port: 3000,
        }
    }
}

impl Listener {
    fn admin_default() -> Self {
        Listener {
            host: "127.0.0.1".into(),
            port: 3001,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

/// Settings that shape how a lead is written to the CRM
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct SyncConfig {
    #[serde(default)]
    pub tag_policy: TagPolicy,
    /// Marker tags added to every lead, in addition to the requested ones
    #[serde(default)]
    pub forced_tags: Vec<String>,
    /// Assessment marker tags. When `remove_stale_tags` is set, those already
    /// on the contact but not requested again are removed.
    #[serde(default)]
    pub assessment_tags: Vec<String>,
    #[serde(default)]
    pub remove_stale_tags: bool,
    #[serde(default = "default_first_name_slug")]
    pub first_name_field_slug: String,
    #[serde(default = "default_score_slug")]
    pub score_field_slug: String,
}

fn default_first_name_slug() -> String {
    crm::types::FIRST_NAME_SLUG.to_string()
}

fn default_score_slug() -> String {
    "score".to_string()
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            tag_policy: TagPolicy::default(),
            forced_tags: Vec::new(),
            assessment_tags: Vec::new(),
            remove_stale_tags: false,
            first_name_field_slug: default_first_name_slug(),
            score_field_slug: default_score_slug(),
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.forced_tags.iter().any(|t| t.trim().is_empty()) {
            return Err(ValidationError::EmptyTagName("forced_tags"));
        }
        if self.assessment_tags.iter().any(|t| t.trim().is_empty()) {
            return Err(ValidationError::EmptyTagName("assessment_tags"));
        }
        if self.first_name_field_slug.trim().is_empty() {
            return Err(ValidationError::EmptyFieldSlug("first name"));
        }
        if self.score_field_slug.trim().is_empty() {
            return Err(ValidationError::EmptyFieldSlug("score"));
        }
        Ok(())
    }

    /// Lowercased assessment tag names, for case-insensitive membership checks.
    pub fn assessment_set(&self) -> HashSet<String> {
        self.assessment_tags
            .iter()
            .map(|t| t.trim().to_lowercase())
            .collect()
    }
}
