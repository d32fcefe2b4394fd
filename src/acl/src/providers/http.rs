//! HTTP-backed providers

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::cache::{cached_authentication_provider, cached_groups_provider};
use super::{AuthenticationProvider, GroupsProvider};
use crate::config::{ExternalAuthenticationConfig, HttpGroupsProviderConfig, TokenPassing};
use crate::error::{AclError, Result};
use crate::types::{Credentials, LoggedUser};

fn build_client(timeout_ms: u64) -> Result<Client> {
    Ok(Client::builder()
        .timeout(Duration::from_millis(timeout_ms))
        .build()?)
}

fn parse_endpoint(name: &str, endpoint: &str) -> Result<Url> {
    Url::parse(endpoint).map_err(|e| {
        AclError::InvalidConfig(format!("provider '{}': invalid endpoint '{}': {}", name, endpoint, e))
    })
}

/// Groups provider calling a JSON HTTP endpoint with the user id
///
/// The user id travels as a query parameter or a header named by
/// `auth_token_name`; the groups are read from the response at
/// `response_groups_pointer`.
pub struct HttpGroupsProvider {
    name: String,
    client: Client,
    endpoint: Url,
    token_name: String,
    passing: TokenPassing,
    groups_pointer: String,
}

impl HttpGroupsProvider {
    pub fn new(config: &HttpGroupsProviderConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            name: config.name.clone(),
            client: build_client(config.request_timeout_ms)?,
            endpoint: parse_endpoint(&config.name, &config.endpoint)?,
            token_name: config.auth_token_name.clone(),
            passing: config.auth_token_passed_as,
            groups_pointer: config.response_groups_pointer.clone(),
        })
    }

    /// Build the provider and wrap it in a cache per `config.cache`
    pub fn shared(config: &HttpGroupsProviderConfig) -> Result<Arc<dyn GroupsProvider>> {
        let provider: Arc<dyn GroupsProvider> = Arc::new(Self::new(config)?);
        Ok(cached_groups_provider(provider, config.cache.ttl()))
    }

    fn parse_groups(&self, body: &serde_json::Value) -> Result<HashSet<String>> {
        let Some(groups) = body.pointer(&self.groups_pointer).and_then(|v| v.as_array()) else {
            return Err(AclError::provider(
                &self.name,
                format!("response has no group array at '{}'", self.groups_pointer),
            ));
        };

        Ok(groups
            .iter()
            .filter_map(|group| match group.as_str() {
                Some(name) => Some(name.to_string()),
                None => {
                    debug!("Ignoring non-string group {} from {}", group, self.name);
                    None
                }
            })
            .collect())
    }
}

#[async_trait]
impl GroupsProvider for HttpGroupsProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_groups_for(&self, user: &LoggedUser) -> Result<HashSet<String>> {
        let request = self.client.get(self.endpoint.clone());
        let request = match self.passing {
            TokenPassing::Query => request.query(&[(self.token_name.as_str(), user.id.as_str())]),
            TokenPassing::Header => request.header(self.token_name.as_str(), user.id.as_str()),
        };

        let response = request.send().await.map_err(|e| {
            warn!("Groups provider {} unreachable: {}", self.name, e);
            AclError::provider(&self.name, e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AclError::provider(
                &self.name,
                format!("unexpected status {}", status),
            ));
        }

        let body: serde_json::Value = response.json().await?;
        let groups = self.parse_groups(&body)?;
        debug!("{} returned {} groups for '{}'", self.name, groups.len(), user.id);

        Ok(groups)
    }
}

/// Authentication provider forwarding basic-auth credentials to a service
///
/// The configured success status accepts the caller; any other 2xx or 4xx
/// status rejects it. Server errors and transport failures are provider
/// failures.
pub struct HttpAuthenticationService {
    name: String,
    client: Client,
    endpoint: Url,
    success_status: StatusCode,
}

impl HttpAuthenticationService {
    pub fn new(config: &ExternalAuthenticationConfig) -> Result<Self> {
        config.validate()?;

        let success_status = StatusCode::from_u16(config.success_status_code).map_err(|e| {
            AclError::InvalidConfig(format!("external authentication '{}': {}", config.name, e))
        })?;

        Ok(Self {
            name: config.name.clone(),
            client: build_client(config.request_timeout_ms)?,
            endpoint: parse_endpoint(&config.name, &config.endpoint)?,
            success_status,
        })
    }

    /// Build the service and wrap it in a cache per `config.cache`
    pub fn shared(config: &ExternalAuthenticationConfig) -> Result<Arc<dyn AuthenticationProvider>> {
        let provider: Arc<dyn AuthenticationProvider> = Arc::new(Self::new(config)?);
        Ok(cached_authentication_provider(provider, config.cache.ttl()))
    }
}

#[async_trait]
impl AuthenticationProvider for HttpAuthenticationService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<Option<LoggedUser>> {
        let response = self
            .client
            .get(self.endpoint.clone())
            .basic_auth(&credentials.user, Some(credentials.secret()))
            .send()
            .await
            .map_err(|e| {
                warn!("Authentication service {} unreachable: {}", self.name, e);
                AclError::provider(&self.name, e.to_string())
            })?;

        let status = response.status();
        if status == self.success_status {
            return Ok(Some(LoggedUser::new(&credentials.user)));
        }
        if status.is_server_error() {
            return Err(AclError::provider(
                &self.name,
                format!("unexpected status {}", status),
            ));
        }

        debug!("{} rejected '{}' with {}", self.name, credentials.user, status);
        Ok(None)
    }
}
