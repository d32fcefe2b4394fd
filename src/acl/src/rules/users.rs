//! Restrict a block to some logged users

use tracing::trace;

use super::{BlockContext, RuleClass, RuleOutcome, SyncRule};
use crate::error::{AclError, Result};
use crate::matcher::MatcherWithWildcards;
use crate::value::{resolve_all, Value};

/// Matches when the logged user's id matches one of the patterns
///
/// Patterns may reference request variables, e.g. `@{x-team}-*`.
#[derive(Debug, Clone)]
pub struct UsersRule {
    patterns: Vec<Value<String>>,
}

impl UsersRule {
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: Vec<Value<String>> = patterns.into_iter().map(Value::text).collect();
        if patterns.is_empty() {
            return Err(AclError::invalid_rule("users", "at least one user is required"));
        }
        Ok(Self { patterns })
    }
}

impl SyncRule for UsersRule {
    fn key(&self) -> &str {
        "users"
    }

    fn class(&self) -> RuleClass {
        RuleClass::Inspection
    }

    fn check(&self, ctx: &BlockContext<'_>) -> Result<RuleOutcome> {
        let Some(user) = ctx.logged_user() else {
            trace!("[{}] users rule without a logged user", ctx.block());
            return Ok(RuleOutcome::NoMatch);
        };

        let patterns = resolve_all(&self.patterns, &ctx.variables())?;
        let matcher = MatcherWithWildcards::new(patterns);

        Ok(RuleOutcome::from_bool(matcher.matches(&user.id)))
    }
}
