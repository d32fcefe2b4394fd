//! Contracts for external identity and group services
//!
//! Async rules talk to the outside world only through these traits. The
//! engine ships HTTP-backed implementations ([`http`]) and TTL caching
//! decorators ([`cache`]); directory clients are supplied by the host.

pub mod cache;
pub mod http;

pub use cache::{
    cached_authentication_provider, cached_groups_provider, CacheStats,
    CachedAuthenticationProvider, CachedGroupsProvider, TtlCache,
};
pub use http::{HttpAuthenticationService, HttpGroupsProvider};

use async_trait::async_trait;
use std::collections::HashSet;

use crate::error::Result;
use crate::types::{Credentials, LoggedUser};

/// Answers which groups a user belongs to
#[async_trait]
pub trait GroupsProvider: Send + Sync {
    /// Name used in logs and mismatch causes
    fn name(&self) -> &str;

    /// Groups of `user`; an empty set means "no groups", not a failure
    async fn fetch_groups_for(&self, user: &LoggedUser) -> Result<HashSet<String>>;
}

/// Verifies credentials against an external service
#[async_trait]
pub trait AuthenticationProvider: Send + Sync {
    /// Name used in logs and mismatch causes
    fn name(&self) -> &str;

    /// `Some(user)` if the credentials are accepted, `None` if rejected
    async fn authenticate(&self, credentials: &Credentials) -> Result<Option<LoggedUser>>;
}

/// Directory service that both authenticates and resolves groups
pub trait LdapClient: AuthenticationProvider + GroupsProvider {}

impl<T> LdapClient for T where T: AuthenticationProvider + GroupsProvider + ?Sized {}
