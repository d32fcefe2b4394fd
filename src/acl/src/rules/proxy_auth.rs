//! Identity asserted by a trusted proxy header

use super::{BlockContext, RuleClass, RuleOutcome, SyncRule};
use crate::error::{AclError, Result};
use crate::matcher::MatcherWithWildcards;
use crate::types::LoggedUser;

/// Header a fronting proxy puts the authenticated user in
pub const DEFAULT_USER_HEADER: &str = "X-Forwarded-User";

/// Trusts the user named in a proxy header if it matches the allowed users
#[derive(Debug, Clone)]
pub struct ProxyAuthRule {
    users: MatcherWithWildcards,
    user_header: String,
}

impl ProxyAuthRule {
    pub fn new<I, S>(users: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let users = MatcherWithWildcards::new(users);
        if users.is_empty() {
            return Err(AclError::invalid_rule("proxy_auth", "at least one user is required"));
        }

        Ok(Self {
            users,
            user_header: DEFAULT_USER_HEADER.to_string(),
        })
    }

    pub fn with_user_header(mut self, header: impl Into<String>) -> Self {
        self.user_header = header.into();
        self
    }
}

impl SyncRule for ProxyAuthRule {
    fn key(&self) -> &str {
        "proxy_auth"
    }

    fn class(&self) -> RuleClass {
        RuleClass::Authentication
    }

    fn check(&self, ctx: &BlockContext<'_>) -> Result<RuleOutcome> {
        match ctx.request().header(&self.user_header) {
            Some(user) if !user.is_empty() && self.users.matches(user) => {
                Ok(RuleOutcome::Authenticated(LoggedUser::new(user)))
            }
            _ => Ok(RuleOutcome::NoMatch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AclRequest;

    #[test]
    fn test_default_header() {
        let rule = ProxyAuthRule::new(["svc-*"]).unwrap();
        let request = AclRequest::new("a").with_header("x-forwarded-user", "svc-kibana");

        let outcome = rule.check(&BlockContext::new(&request, "b")).unwrap();
        assert_eq!(outcome, RuleOutcome::Authenticated(LoggedUser::new("svc-kibana")));
    }

    #[test]
    fn test_custom_header_and_unknown_user() {
        let rule = ProxyAuthRule::new(["alice"]).unwrap().with_user_header("X-Auth-User");

        let known = AclRequest::new("a").with_header("X-Auth-User", "alice");
        let unknown = AclRequest::new("a").with_header("X-Auth-User", "mallory");
        let missing = AclRequest::new("a").with_header("X-Forwarded-User", "alice");

        assert!(rule.check(&BlockContext::new(&known, "b")).unwrap().is_match());
        assert!(!rule.check(&BlockContext::new(&unknown, "b")).unwrap().is_match());
        assert!(!rule.check(&BlockContext::new(&missing, "b")).unwrap().is_match());
    }

    #[test]
    fn test_requires_users() {
        assert!(ProxyAuthRule::new(Vec::<String>::new()).is_err());
    }
}
