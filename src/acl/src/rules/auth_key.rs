//! Static basic-auth credentials, optionally stored as digests

use ring::{constant_time, digest};
use tracing::trace;

use super::{BlockContext, RuleClass, RuleOutcome, SyncRule};
use crate::error::{AclError, Result};
use crate::types::LoggedUser;

/// How the configured `user:secret` is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthKeyHash {
    Plain,
    Sha256,
    Sha512,
}

impl AuthKeyHash {
    pub fn rule_key(self) -> &'static str {
        match self {
            AuthKeyHash::Plain => "auth_key",
            AuthKeyHash::Sha256 => "auth_key_sha256",
            AuthKeyHash::Sha512 => "auth_key_sha512",
        }
    }

    fn encode(self, joined: &str) -> String {
        match self {
            AuthKeyHash::Plain => joined.to_string(),
            AuthKeyHash::Sha256 => hex::encode(digest::digest(&digest::SHA256, joined.as_bytes())),
            AuthKeyHash::Sha512 => hex::encode(digest::digest(&digest::SHA512, joined.as_bytes())),
        }
    }
}

/// Matches when the request's basic-auth `user:secret` equals the
/// configured key, and attaches `user`
#[derive(Debug, Clone)]
pub struct AuthKeyRule {
    hash: AuthKeyHash,
    expected: String,
}

impl AuthKeyRule {
    /// `key` is `user:secret` for [`AuthKeyHash::Plain`], otherwise the
    /// hex digest of it
    pub fn new(hash: AuthKeyHash, key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(AclError::invalid_rule(hash.rule_key(), "key cannot be empty"));
        }
        if hash == AuthKeyHash::Plain && !key.contains(':') {
            return Err(AclError::invalid_rule(hash.rule_key(), "key must have the form user:secret"));
        }

        let expected = match hash {
            AuthKeyHash::Plain => key,
            _ => key.to_lowercase(),
        };

        Ok(Self { hash, expected })
    }

    pub fn plain(key: impl Into<String>) -> Result<Self> {
        Self::new(AuthKeyHash::Plain, key)
    }
}

impl SyncRule for AuthKeyRule {
    fn key(&self) -> &str {
        self.hash.rule_key()
    }

    fn class(&self) -> RuleClass {
        RuleClass::Authentication
    }

    fn check(&self, ctx: &BlockContext<'_>) -> Result<RuleOutcome> {
        let Some(credentials) = ctx.credentials() else {
            trace!("[{}] no basic auth credentials", ctx.block());
            return Ok(RuleOutcome::NoMatch);
        };

        let presented = self.hash.encode(&credentials.joined());
        if constant_time::verify_slices_are_equal(presented.as_bytes(), self.expected.as_bytes()).is_ok() {
            Ok(RuleOutcome::Authenticated(LoggedUser::new(credentials.user)))
        } else {
            Ok(RuleOutcome::NoMatch)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AclRequest;

    fn check(rule: &AuthKeyRule, request: &AclRequest) -> RuleOutcome {
        rule.check(&BlockContext::new(request, "test")).unwrap()
    }

    #[test]
    fn test_plain_key() {
        let rule = AuthKeyRule::plain("alice:secret").unwrap();

        let ok = AclRequest::new("a").with_basic_auth("alice", "secret");
        assert_eq!(check(&rule, &ok), RuleOutcome::Authenticated(LoggedUser::new("alice")));

        let wrong = AclRequest::new("a").with_basic_auth("alice", "nope");
        assert_eq!(check(&rule, &wrong), RuleOutcome::NoMatch);

        let anonymous = AclRequest::new("a");
        assert_eq!(check(&rule, &anonymous), RuleOutcome::NoMatch);
    }

    #[test]
    fn test_sha256_key() {
        // sha256("alice:secret")
        let digest = hex::encode(digest::digest(&digest::SHA256, b"alice:secret"));
        let rule = AuthKeyRule::new(AuthKeyHash::Sha256, digest.to_uppercase()).unwrap();

        let ok = AclRequest::new("a").with_basic_auth("alice", "secret");
        assert!(check(&rule, &ok).is_match());
        assert_eq!(rule.key(), "auth_key_sha256");
    }

    #[test]
    fn test_sha512_key() {
        let digest = hex::encode(digest::digest(&digest::SHA512, b"bob:hunter2"));
        let rule = AuthKeyRule::new(AuthKeyHash::Sha512, digest).unwrap();

        let ok = AclRequest::new("a").with_basic_auth("bob", "hunter2");
        let wrong = AclRequest::new("a").with_basic_auth("bob", "hunter3");
        assert!(check(&rule, &ok).is_match());
        assert!(!check(&rule, &wrong).is_match());
    }

    #[test]
    fn test_near_miss_keys_rejected() {
        let rule = AuthKeyRule::plain("alice:secret").unwrap();

        // same length, last byte differs
        let same_length = AclRequest::new("a").with_basic_auth("alice", "secreT");
        assert_eq!(check(&rule, &same_length), RuleOutcome::NoMatch);

        let prefix = AclRequest::new("a").with_basic_auth("alice", "secre");
        assert_eq!(check(&rule, &prefix), RuleOutcome::NoMatch);

        let longer = AclRequest::new("a").with_basic_auth("alice", "secret!");
        assert_eq!(check(&rule, &longer), RuleOutcome::NoMatch);

        let digest = hex::encode(digest::digest(&digest::SHA256, b"alice:secret"));
        let rule = AuthKeyRule::new(AuthKeyHash::Sha256, digest).unwrap();
        assert_eq!(check(&rule, &same_length), RuleOutcome::NoMatch);
        assert!(check(&rule, &AclRequest::new("a").with_basic_auth("alice", "secret")).is_match());
    }

    #[test]
    fn test_invalid_settings() {
        assert!(AuthKeyRule::plain("").is_err());
        assert!(AuthKeyRule::plain("nocolon").is_err());
    }
}
