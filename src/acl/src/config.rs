//! Engine and provider configuration
//!
//! These structs are what a settings loader deserializes into; the engine
//! itself performs no parsing.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{AclError, Result};

/// Engine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Upper bound for a single async rule; a slower rule is a non-match
    #[serde(default = "default_async_rule_timeout_ms")]
    pub async_rule_timeout_ms: u64,

    /// Upper bound for a whole evaluation; exceeding it yields ERRORED
    #[serde(default)]
    pub evaluation_timeout_ms: Option<u64>,

    /// Collect decision counters and latency
    #[serde(default = "default_true")]
    pub enable_metrics: bool,

    /// Hand decisions to the configured audit sink
    #[serde(default = "default_true")]
    pub enable_audit: bool,

    /// Ask clients for basic-auth credentials when a block authenticates
    #[serde(default)]
    pub prompt_for_basic_auth: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            async_rule_timeout_ms: default_async_rule_timeout_ms(),
            evaluation_timeout_ms: None,
            enable_metrics: true,
            enable_audit: true,
            prompt_for_basic_auth: false,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.async_rule_timeout_ms == 0 {
            return Err(AclError::InvalidConfig(
                "async_rule_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.evaluation_timeout_ms == Some(0) {
            return Err(AclError::InvalidConfig(
                "evaluation_timeout_ms must be greater than zero when set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn async_rule_timeout(&self) -> Duration {
        Duration::from_millis(self.async_rule_timeout_ms)
    }

    pub fn evaluation_timeout(&self) -> Option<Duration> {
        self.evaluation_timeout_ms.map(Duration::from_millis)
    }
}

/// Cache settings attached to an external provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct CacheSettings {
    /// Entry lifetime; zero disables caching
    #[serde(default)]
    pub cache_ttl_in_sec: u64,
}

impl CacheSettings {
    pub fn from_secs(secs: u64) -> Self {
        Self {
            cache_ttl_in_sec: secs,
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_in_sec)
    }

    pub fn is_enabled(&self) -> bool {
        self.cache_ttl_in_sec > 0
    }
}

/// How the user id is handed to an HTTP groups provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TokenPassing {
    Query,
    Header,
}

/// HTTP service answering "which groups does this user belong to"
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpGroupsProviderConfig {
    pub name: String,
    pub endpoint: String,

    /// Query parameter or header name carrying the user id
    pub auth_token_name: String,

    #[serde(default = "default_token_passing")]
    pub auth_token_passed_as: TokenPassing,

    /// JSON pointer to the array of group names in the response
    #[serde(default = "default_groups_pointer")]
    pub response_groups_pointer: String,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default, flatten)]
    pub cache: CacheSettings,
}

impl HttpGroupsProviderConfig {
    pub fn validate(&self) -> Result<()> {
        validate_provider(&self.name, &self.endpoint, self.request_timeout_ms)?;
        if self.auth_token_name.is_empty() {
            return Err(AclError::InvalidConfig(format!(
                "groups provider '{}' needs an auth_token_name",
                self.name
            )));
        }
        if !self.response_groups_pointer.is_empty() && !self.response_groups_pointer.starts_with('/') {
            return Err(AclError::InvalidConfig(format!(
                "groups provider '{}': response_groups_pointer must start with '/'",
                self.name
            )));
        }
        Ok(())
    }
}

/// HTTP service that accepts or rejects basic-auth credentials
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExternalAuthenticationConfig {
    pub name: String,
    pub endpoint: String,

    /// Status code meaning "authenticated"
    #[serde(default = "default_success_status")]
    pub success_status_code: u16,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default, flatten)]
    pub cache: CacheSettings,
}

impl ExternalAuthenticationConfig {
    pub fn validate(&self) -> Result<()> {
        validate_provider(&self.name, &self.endpoint, self.request_timeout_ms)?;
        if !(100..600).contains(&self.success_status_code) {
            return Err(AclError::InvalidConfig(format!(
                "external authentication '{}': {} is not an HTTP status code",
                self.name, self.success_status_code
            )));
        }
        Ok(())
    }
}

fn validate_provider(name: &str, endpoint: &str, timeout_ms: u64) -> Result<()> {
    if name.is_empty() {
        return Err(AclError::InvalidConfig("provider name cannot be empty".to_string()));
    }
    if reqwest::Url::parse(endpoint).is_err() {
        return Err(AclError::InvalidConfig(format!(
            "provider '{}': invalid endpoint '{}'",
            name, endpoint
        )));
    }
    if timeout_ms == 0 {
        return Err(AclError::InvalidConfig(format!(
            "provider '{}': request_timeout_ms must be greater than zero",
            name
        )));
    }
    Ok(())
}

fn default_true() -> bool {
    true
}

fn default_async_rule_timeout_ms() -> u64 {
    10_000
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

fn default_token_passing() -> TokenPassing {
    TokenPassing::Query
}

fn default_groups_pointer() -> String {
    "/groups".to_string()
}

fn default_success_status() -> u16 {
    204
}
