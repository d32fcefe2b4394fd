//! Rules: named predicates over a request
//!
//! A rule is either synchronous (decides from the request alone) or
//! asynchronous (may call an external provider). Both report a
//! [`RuleOutcome`]; authentication rules attach the identity they
//! established with [`RuleOutcome::Authenticated`].
//!
//! # Catalogue
//!
//! | key                             | class          | variant |
//! |---------------------------------|----------------|---------|
//! | `auth_key`, `auth_key_sha256`, `auth_key_sha512` | authentication | sync |
//! | `proxy_auth`                    | authentication | sync    |
//! | `ldap_authentication`           | authentication | async   |
//! | `external_authentication`       | authentication | async   |
//! | `ldap_auth`, `groups`           | authentication + authorization | async |
//! | `ldap_authorization`            | authorization  | async   |
//! | `groups_provider_authorization` | authorization  | async   |
//! | `users`, `headers`, `headers_or`, `hosts`, `methods`, `actions`, `indices`, `uri_re`, `max_body_length` | inspection | sync |

pub mod auth_key;
pub mod external;
pub mod groups;
pub mod headers;
pub mod hosts;
pub mod indices;
pub mod ldap;
pub mod ordering;
pub mod proxy_auth;
pub mod request;
pub mod users;

pub use auth_key::{AuthKeyHash, AuthKeyRule};
pub use external::{ExternalAuthenticationRule, GroupsProviderAuthorizationRule};
pub use groups::{GroupsRule, GroupsUser};
pub use headers::{HeadersMode, HeadersRule};
pub use hosts::HostsRule;
pub use indices::IndicesRule;
pub use ldap::{LdapAuthRule, LdapAuthenticationRule, LdapAuthorizationRule};
pub use ordering::RulesOrdering;
pub use proxy_auth::ProxyAuthRule;
pub use request::{ActionsRule, MaxBodyLengthRule, MethodsRule, UriReRule};
pub use users::UsersRule;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::types::{AclRequest, Credentials, LoggedUser};
use crate::value::RequestVariables;

/// Ordering class of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleClass {
    /// Establishes who the caller is
    Authentication,
    /// Decides what an established caller may do
    Authorization,
    /// Inspects properties of the request
    Inspection,
}

impl RuleClass {
    /// Position in evaluation order
    pub fn rank(self) -> u8 {
        match self {
            RuleClass::Authentication => 0,
            RuleClass::Authorization => 1,
            RuleClass::Inspection => 2,
        }
    }
}

/// Result of checking one rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    Match,
    /// Matched and established the caller's identity
    Authenticated(LoggedUser),
    NoMatch,
}

impl RuleOutcome {
    pub fn from_bool(matched: bool) -> Self {
        if matched {
            RuleOutcome::Match
        } else {
            RuleOutcome::NoMatch
        }
    }

    pub fn is_match(&self) -> bool {
        !matches!(self, RuleOutcome::NoMatch)
    }
}

/// Per-block evaluation state handed to rules
///
/// Created fresh for every block so an identity established in a block that
/// later fails does not leak into the next one.
pub struct BlockContext<'a> {
    request: &'a AclRequest,
    block: &'a str,
    user: Option<LoggedUser>,
}

impl<'a> BlockContext<'a> {
    pub fn new(request: &'a AclRequest, block: &'a str) -> Self {
        Self {
            request,
            block,
            user: None,
        }
    }

    pub fn request(&self) -> &'a AclRequest {
        self.request
    }

    pub fn block(&self) -> &'a str {
        self.block
    }

    pub fn logged_user(&self) -> Option<&LoggedUser> {
        self.user.as_ref()
    }

    pub fn credentials(&self) -> Option<Credentials> {
        self.request.credentials()
    }

    /// Resolver for `@{...}` placeholders in this block's context
    pub fn variables(&self) -> RequestVariables<'_> {
        RequestVariables::new(self.request, self.user.as_ref())
    }

    /// Attach the identity established by an authentication rule
    ///
    /// Returns the already attached user if it differs from `user`.
    pub(crate) fn attach_user(&mut self, user: LoggedUser) -> std::result::Result<(), LoggedUser> {
        match &self.user {
            None => {
                self.user = Some(user);
                Ok(())
            }
            Some(existing) if existing.id == user.id => Ok(()),
            Some(existing) => Err(existing.clone()),
        }
    }

    pub(crate) fn into_user(self) -> Option<LoggedUser> {
        self.user
    }
}

/// Rule decided from the request alone
pub trait SyncRule: Send + Sync {
    /// Unique key, used for ordering diagnostics and history
    fn key(&self) -> &str;

    fn class(&self) -> RuleClass;

    /// Whether the rule also makes authorization decisions
    fn authorizes(&self) -> bool {
        self.class() == RuleClass::Authorization
    }

    fn check(&self, ctx: &BlockContext<'_>) -> Result<RuleOutcome>;
}

/// Rule that may suspend on an external provider
#[async_trait]
pub trait AsyncRule: Send + Sync {
    /// Unique key, used for ordering diagnostics and history
    fn key(&self) -> &str;

    fn class(&self) -> RuleClass;

    /// Whether the rule also makes authorization decisions
    fn authorizes(&self) -> bool {
        self.class() == RuleClass::Authorization
    }

    async fn check(&self, ctx: &BlockContext<'_>) -> Result<RuleOutcome>;
}

/// A configured rule, shared read-only between requests
#[derive(Clone)]
pub enum Rule {
    Sync(Arc<dyn SyncRule>),
    Async(Arc<dyn AsyncRule>),
}

impl Rule {
    pub fn sync(rule: impl SyncRule + 'static) -> Self {
        Rule::Sync(Arc::new(rule))
    }

    pub fn asynchronous(rule: impl AsyncRule + 'static) -> Self {
        Rule::Async(Arc::new(rule))
    }

    pub fn key(&self) -> &str {
        match self {
            Rule::Sync(rule) => rule.key(),
            Rule::Async(rule) => rule.key(),
        }
    }

    pub fn class(&self) -> RuleClass {
        match self {
            Rule::Sync(rule) => rule.class(),
            Rule::Async(rule) => rule.class(),
        }
    }

    pub fn authenticates(&self) -> bool {
        self.class() == RuleClass::Authentication
    }

    pub fn authorizes(&self) -> bool {
        match self {
            Rule::Sync(rule) => rule.authorizes(),
            Rule::Async(rule) => rule.authorizes(),
        }
    }

    pub fn is_async(&self) -> bool {
        matches!(self, Rule::Async(_))
    }

    pub async fn check(&self, ctx: &BlockContext<'_>) -> Result<RuleOutcome> {
        match self {
            Rule::Sync(rule) => rule.check(ctx),
            Rule::Async(rule) => rule.check(ctx).await,
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("key", &self.key())
            .field("class", &self.class())
            .field("async", &self.is_async())
            .finish()
    }
}

/// Why a rule did not match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MismatchCause {
    /// The rule evaluated and said no
    Rejected,
    /// An external provider failed
    ProviderFailure { reason: String },
    /// The async rule did not finish in time
    Timeout { after_ms: u64 },
    /// A variable resolved to an unusable value
    ResolvingFailure { reason: String },
    /// A second authentication rule established a different identity
    IdentityConflict { attached: String, presented: String },
    /// Any other evaluation error
    Error { reason: String },
}

impl fmt::Display for MismatchCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected => write!(f, "rejected"),
            Self::ProviderFailure { reason } => write!(f, "provider failure: {}", reason),
            Self::Timeout { after_ms } => write!(f, "timed out after {}ms", after_ms),
            Self::ResolvingFailure { reason } => write!(f, "resolving failure: {}", reason),
            Self::IdentityConflict { attached, presented } => write!(
                f,
                "identity conflict: '{}' already attached, got '{}'",
                attached, presented
            ),
            Self::Error { reason } => write!(f, "error: {}", reason),
        }
    }
}

/// One rule's result for one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleExitResult {
    pub rule: String,
    pub class: RuleClass,
    pub matched: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<MismatchCause>,
}

impl RuleExitResult {
    pub fn matched(rule: &Rule) -> Self {
        Self {
            rule: rule.key().to_string(),
            class: rule.class(),
            matched: true,
            cause: None,
        }
    }

    pub fn mismatched(rule: &Rule, cause: MismatchCause) -> Self {
        Self {
            rule: rule.key().to_string(),
            class: rule.class(),
            matched: false,
            cause: Some(cause),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_ranks() {
        assert!(RuleClass::Authentication.rank() < RuleClass::Authorization.rank());
        assert!(RuleClass::Authorization.rank() < RuleClass::Inspection.rank());
    }

    #[test]
    fn test_attach_user_once() {
        let request = AclRequest::new("cluster:monitor/health");
        let mut ctx = BlockContext::new(&request, "b1");

        assert!(ctx.attach_user(LoggedUser::new("alice")).is_ok());
        assert!(ctx.attach_user(LoggedUser::new("alice")).is_ok());

        let conflict = ctx.attach_user(LoggedUser::new("bob")).unwrap_err();
        assert_eq!(conflict.id, "alice");
        assert_eq!(ctx.logged_user().unwrap().id, "alice");
    }

    #[test]
    fn test_outcome_helpers() {
        assert!(RuleOutcome::from_bool(true).is_match());
        assert!(!RuleOutcome::from_bool(false).is_match());
        assert!(RuleOutcome::Authenticated(LoggedUser::new("a")).is_match());
    }

    #[test]
    fn test_cause_display() {
        let cause = MismatchCause::ProviderFailure {
            reason: "connection refused".to_string(),
        };
        assert_eq!(cause.to_string(), "provider failure: connection refused");
    }
}
