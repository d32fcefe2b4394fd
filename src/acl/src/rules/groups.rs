//! Locally defined users with group membership

use async_trait::async_trait;
use std::collections::BTreeSet;
use tracing::trace;

use super::external::with_available_groups;
use super::{AsyncRule, BlockContext, Rule, RuleClass, RuleOutcome};
use crate::error::{AclError, Result};
use crate::types::{LoggedUser, CURRENT_GROUP_HEADER};
use crate::value::{resolve_all, Value};

/// A user definition: name, groups, and how the user authenticates
#[derive(Debug, Clone)]
pub struct GroupsUser {
    pub username: String,
    pub groups: BTreeSet<String>,
    pub authentication: Rule,
}

impl GroupsUser {
    pub fn new<I, S>(username: impl Into<String>, groups: I, authentication: Rule) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let username = username.into();
        if username.is_empty() {
            return Err(AclError::invalid_rule("groups", "username cannot be empty"));
        }
        if !authentication.authenticates() {
            return Err(AclError::invalid_rule(
                "groups",
                format!(
                    "user '{}' needs an authentication rule, got '{}'",
                    username,
                    authentication.key()
                ),
            ));
        }

        Ok(Self {
            username,
            groups: groups.into_iter().map(Into::into).collect(),
            authentication,
        })
    }
}

/// Matches when a defined user in one of the configured groups
/// authenticates
///
/// Group names may reference request variables. A current group selected
/// by the caller must be one of the user's available groups.
#[derive(Debug)]
pub struct GroupsRule {
    groups: Vec<Value<String>>,
    users: Vec<GroupsUser>,
}

impl GroupsRule {
    pub fn new<I, S>(groups: I, users: Vec<GroupsUser>) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let groups: Vec<Value<String>> = groups.into_iter().map(Value::text).collect();
        if groups.is_empty() {
            return Err(AclError::invalid_rule("groups", "at least one group is required"));
        }
        if users.is_empty() {
            return Err(AclError::invalid_rule("groups", "at least one user is required"));
        }
        Ok(Self { groups, users })
    }
}

#[async_trait]
impl AsyncRule for GroupsRule {
    fn key(&self) -> &str {
        "groups"
    }

    fn class(&self) -> RuleClass {
        RuleClass::Authentication
    }

    fn authorizes(&self) -> bool {
        true
    }

    async fn check(&self, ctx: &BlockContext<'_>) -> Result<RuleOutcome> {
        let configured: BTreeSet<String> = resolve_all(&self.groups, &ctx.variables())?
            .into_iter()
            .collect();
        let presented = ctx.credentials().map(|c| c.user);
        let current = ctx.request().header(CURRENT_GROUP_HEADER);

        for user in &self.users {
            if presented.as_deref().is_some_and(|name| name != user.username) {
                continue;
            }

            let available: BTreeSet<String> = user.groups.intersection(&configured).cloned().collect();
            if available.is_empty() || current.is_some_and(|group| !available.contains(group)) {
                trace!("[{}] '{}' has no usable group", ctx.block(), user.username);
                continue;
            }

            let authenticated = match user.authentication.check(ctx).await? {
                RuleOutcome::Match => true,
                RuleOutcome::Authenticated(found) => found.id == user.username,
                RuleOutcome::NoMatch => false,
            };
            if authenticated {
                let logged = LoggedUser::new(&user.username);
                return Ok(RuleOutcome::Authenticated(with_available_groups(ctx, logged, available)));
            }
        }

        Ok(RuleOutcome::NoMatch)
    }
}
