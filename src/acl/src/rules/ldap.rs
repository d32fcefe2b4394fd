//! Directory-backed authentication and authorization

use async_trait::async_trait;
use std::sync::Arc;

use super::external::{authenticate_with, with_available_groups, GroupsCheck};
use super::{AsyncRule, BlockContext, RuleClass, RuleOutcome};
use crate::config::CacheSettings;
use crate::error::Result;
use crate::providers::{
    cached_authentication_provider, cached_groups_provider, AuthenticationProvider, GroupsProvider, LdapClient,
};

/// Authenticates basic-auth credentials with a directory bind
pub struct LdapAuthenticationRule {
    client: Arc<dyn AuthenticationProvider>,
}

impl LdapAuthenticationRule {
    pub fn new(client: Arc<dyn AuthenticationProvider>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AsyncRule for LdapAuthenticationRule {
    fn key(&self) -> &str {
        "ldap_authentication"
    }

    fn class(&self) -> RuleClass {
        RuleClass::Authentication
    }

    async fn check(&self, ctx: &BlockContext<'_>) -> Result<RuleOutcome> {
        authenticate_with(self.client.as_ref(), ctx).await
    }
}

/// Authorizes the logged user by directory group membership
pub struct LdapAuthorizationRule {
    groups: GroupsCheck,
}

impl LdapAuthorizationRule {
    pub fn new<I, S>(client: Arc<dyn GroupsProvider>, groups: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self {
            groups: GroupsCheck::new("ldap_authorization", client, groups)?,
        })
    }
}

#[async_trait]
impl AsyncRule for LdapAuthorizationRule {
    fn key(&self) -> &str {
        "ldap_authorization"
    }

    fn class(&self) -> RuleClass {
        RuleClass::Authorization
    }

    async fn check(&self, ctx: &BlockContext<'_>) -> Result<RuleOutcome> {
        self.groups.check(ctx).await
    }
}

/// Authentication followed by group authorization against one directory
///
/// Matches only when both succeed; the attached user carries the configured
/// groups it belongs to.
pub struct LdapAuthRule {
    authentication: LdapAuthenticationRule,
    authorization: LdapAuthorizationRule,
}

impl LdapAuthRule {
    pub fn new(authentication: LdapAuthenticationRule, authorization: LdapAuthorizationRule) -> Self {
        Self {
            authentication,
            authorization,
        }
    }

    /// Build both halves from one client, each behind its own cache
    pub fn for_client<C, I, S>(client: Arc<C>, groups: I, cache: CacheSettings) -> Result<Self>
    where
        C: LdapClient + 'static,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let authenticator: Arc<dyn AuthenticationProvider> = client.clone();
        let groups_provider: Arc<dyn GroupsProvider> = client;

        Ok(Self::new(
            LdapAuthenticationRule::new(cached_authentication_provider(authenticator, cache.ttl())),
            LdapAuthorizationRule::new(cached_groups_provider(groups_provider, cache.ttl()), groups)?,
        ))
    }
}

#[async_trait]
impl AsyncRule for LdapAuthRule {
    fn key(&self) -> &str {
        "ldap_auth"
    }

    fn class(&self) -> RuleClass {
        RuleClass::Authentication
    }

    fn authorizes(&self) -> bool {
        true
    }

    async fn check(&self, ctx: &BlockContext<'_>) -> Result<RuleOutcome> {
        let RuleOutcome::Authenticated(user) = self.authentication.check(ctx).await? else {
            return Ok(RuleOutcome::NoMatch);
        };

        match self.authorization.groups.available_groups(ctx, &user).await? {
            Some(available) => Ok(RuleOutcome::Authenticated(with_available_groups(ctx, user, available))),
            None => Ok(RuleOutcome::NoMatch),
        }
    }
}
