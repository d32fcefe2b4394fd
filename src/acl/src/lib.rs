//! # Warden access control
//!
//! Ordered block/rule access-control decision engine.
//!
//! ## Features
//!
//! - **Ordered blocks**: the first block whose rules all match decides
//! - **Rule ordering**: authentication, then authorization, then request inspection
//! - **Async rules** backed by LDAP, HTTP groups and external authentication providers
//! - **TTL caching** of provider answers, with hashed-secret credential caching
//! - **Request variables** (`@{user}`, `@{header}`) in rule settings
//! - **Audit trail** and Prometheus-style metrics for every decision
//!
//! ## Example
//!
//! ```rust
//! use warden_acl::{
//!     AccessControl, AclRequest, AuthKeyRule, BlockDefinition, EngineConfig, IndicesRule,
//!     Policy, Rule,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = AccessControl::new(
//!         EngineConfig::default(),
//!         vec![BlockDefinition::new("logs readers", Policy::Allow)
//!             .with_rule(Rule::sync(AuthKeyRule::plain("alice:secret")?))
//!             .with_rule(Rule::sync(IndicesRule::new(["logs-*"])?))],
//!     )?;
//!
//!     let request = AclRequest::new("indices:data/read/search")
//!         .with_basic_auth("alice", "secret")
//!         .with_indices(["logs-2024.01.01"]);
//!
//!     let decision = engine.check(&request).await;
//!     assert!(decision.is_allowed());
//!     assert_eq!(decision.matched_block(), Some("logs readers"));
//!
//!     Ok(())
//! }
//! ```

pub mod block;
pub mod config;
pub mod engine;
pub mod error;
pub mod matcher;
pub mod providers;
pub mod rules;
pub mod types;
pub mod value;

// Re-export commonly used types
pub use block::{Block, BlockDefinition, Policy, Verbosity};
pub use config::{CacheSettings, EngineConfig, ExternalAuthenticationConfig, HttpGroupsProviderConfig, TokenPassing};
pub use engine::{
    AccessControl, AccessControlHandle, AuditEntry, AuditSink, BlockExitResult, Decision, FinalState,
    ForbiddenCause, InMemoryAuditSink, MetricsCollector,
};
pub use error::{AclError, Result};
pub use matcher::MatcherWithWildcards;
pub use providers::{AuthenticationProvider, GroupsProvider, LdapClient};
pub use rules::{
    ActionsRule, AuthKeyHash, AuthKeyRule, BlockContext, ExternalAuthenticationRule, GroupsProviderAuthorizationRule,
    GroupsRule, GroupsUser, HeadersMode, HeadersRule, HostsRule, IndicesRule, LdapAuthRule, LdapAuthenticationRule,
    LdapAuthorizationRule, MaxBodyLengthRule, MethodsRule, MismatchCause, ProxyAuthRule, Rule, RuleClass,
    RuleExitResult, RuleOutcome, SyncRule, AsyncRule, UriReRule, UsersRule,
};
pub use types::{AclRequest, Credentials, LoggedUser};
pub use value::{ResolvingError, Value, VariableResolver};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
