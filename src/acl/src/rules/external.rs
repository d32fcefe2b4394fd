//! Rules delegating to external authentication and group services

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, trace};

use super::{AsyncRule, BlockContext, RuleClass, RuleOutcome};
use crate::error::{AclError, Result};
use crate::providers::{AuthenticationProvider, GroupsProvider};
use crate::types::{LoggedUser, CURRENT_GROUP_HEADER};

/// Authenticate the request's basic-auth credentials with `provider`
pub(crate) async fn authenticate_with(
    provider: &dyn AuthenticationProvider,
    ctx: &BlockContext<'_>,
) -> Result<RuleOutcome> {
    let Some(credentials) = ctx.credentials() else {
        trace!("[{}] no basic auth credentials", ctx.block());
        return Ok(RuleOutcome::NoMatch);
    };

    match provider.authenticate(&credentials).await? {
        Some(user) => Ok(RuleOutcome::Authenticated(user)),
        None => {
            debug!("[{}] {} rejected '{}'", ctx.block(), provider.name(), credentials.user);
            Ok(RuleOutcome::NoMatch)
        }
    }
}

/// Group membership check shared by the authorization rules
#[derive(Clone)]
pub(crate) struct GroupsCheck {
    provider: Arc<dyn GroupsProvider>,
    groups: BTreeSet<String>,
}

impl GroupsCheck {
    pub(crate) fn new<I, S>(rule: &str, provider: Arc<dyn GroupsProvider>, groups: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let groups: BTreeSet<String> = groups.into_iter().map(Into::into).collect();
        if groups.is_empty() {
            return Err(AclError::invalid_rule(rule, "at least one group is required"));
        }
        Ok(Self { provider, groups })
    }

    /// Configured groups `user` belongs to
    ///
    /// `None` if there are none, or if the caller selected a current group
    /// outside of them.
    pub(crate) async fn available_groups(
        &self,
        ctx: &BlockContext<'_>,
        user: &LoggedUser,
    ) -> Result<Option<BTreeSet<String>>> {
        let fetched = self.provider.fetch_groups_for(user).await?;
        let available: BTreeSet<String> = self
            .groups
            .iter()
            .filter(|g| fetched.contains(*g))
            .cloned()
            .collect();

        if available.is_empty() {
            debug!("[{}] '{}' is in none of {:?}", ctx.block(), user.id, self.groups);
            return Ok(None);
        }

        if let Some(current) = ctx.request().header(CURRENT_GROUP_HEADER) {
            if !available.contains(current) {
                debug!("[{}] '{}' selected group '{}' it cannot use", ctx.block(), user.id, current);
                return Ok(None);
            }
        }

        Ok(Some(available))
    }

    /// Authorize the block's logged user
    pub(crate) async fn check(&self, ctx: &BlockContext<'_>) -> Result<RuleOutcome> {
        let Some(user) = ctx.logged_user() else {
            trace!("[{}] authorization without a logged user", ctx.block());
            return Ok(RuleOutcome::NoMatch);
        };
        Ok(RuleOutcome::from_bool(self.available_groups(ctx, user).await?.is_some()))
    }
}

/// `user` enriched with its available groups and current group
pub(crate) fn with_available_groups(
    ctx: &BlockContext<'_>,
    user: LoggedUser,
    available: BTreeSet<String>,
) -> LoggedUser {
    let current = ctx
        .request()
        .header(CURRENT_GROUP_HEADER)
        .map(str::to_string)
        .or_else(|| available.iter().next().cloned());

    let user = user.with_groups(available);
    match current {
        Some(group) => user.with_current_group(group),
        None => user,
    }
}

/// Authenticates basic-auth credentials against an HTTP service
pub struct ExternalAuthenticationRule {
    provider: Arc<dyn AuthenticationProvider>,
}

impl ExternalAuthenticationRule {
    pub fn new(provider: Arc<dyn AuthenticationProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl AsyncRule for ExternalAuthenticationRule {
    fn key(&self) -> &str {
        "external_authentication"
    }

    fn class(&self) -> RuleClass {
        RuleClass::Authentication
    }

    async fn check(&self, ctx: &BlockContext<'_>) -> Result<RuleOutcome> {
        authenticate_with(self.provider.as_ref(), ctx).await
    }
}

/// Authorizes the logged user by groups from a groups provider
pub struct GroupsProviderAuthorizationRule {
    groups: GroupsCheck,
}

impl GroupsProviderAuthorizationRule {
    pub fn new<I, S>(provider: Arc<dyn GroupsProvider>, groups: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self {
            groups: GroupsCheck::new("groups_provider_authorization", provider, groups)?,
        })
    }
}

#[async_trait]
impl AsyncRule for GroupsProviderAuthorizationRule {
    fn key(&self) -> &str {
        "groups_provider_authorization"
    }

    fn class(&self) -> RuleClass {
        RuleClass::Authorization
    }

    async fn check(&self, ctx: &BlockContext<'_>) -> Result<RuleOutcome> {
        self.groups.check(ctx).await
    }
}
