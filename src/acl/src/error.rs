//! Error types for the access-control engine

use thiserror::Error;

use crate::value::ResolvingError;

/// Access-control engine errors
///
/// Configuration errors (`InvalidBlock`, `InvalidRule`, `InvalidConfig`) are
/// raised while building blocks and abort startup. Everything else is raised
/// while evaluating a request and is turned into a mismatch cause by the
/// block evaluator.
#[derive(Debug, Error)]
pub enum AclError {
    /// Block definition violates a load-time invariant
    #[error("Invalid block '{block}': {reason}")]
    InvalidBlock { block: String, reason: String },

    /// Rule settings are malformed
    #[error("Invalid settings for rule '{rule}': {reason}")]
    InvalidRule { rule: String, reason: String },

    /// Engine or provider configuration is malformed
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A variable resolved to a value its parser rejected
    #[error(transparent)]
    Resolving(#[from] ResolvingError),

    /// External identity or group provider failed
    #[error("Provider '{provider}' failed: {reason}")]
    Provider { provider: String, reason: String },

    /// HTTP transport error talking to an external provider
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// An async rule or the whole evaluation ran out of time
    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AclError {
    pub(crate) fn invalid_rule(rule: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRule {
            rule: rule.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_block(block: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidBlock {
            block: block.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn provider(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for access-control operations
pub type Result<T> = std::result::Result<T, AclError>;
