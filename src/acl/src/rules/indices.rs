//! Restrict which indices a request may touch

use tracing::debug;

use super::{BlockContext, RuleClass, RuleOutcome, SyncRule};
use crate::error::{AclError, Result};
use crate::matcher::MatcherWithWildcards;
use crate::value::{resolve_all, Value};

const ALL_INDICES: &str = "*";

/// Matches when every index the request targets is allowed
///
/// Requests that involve no indices always match. A request that targets
/// indices without naming any (an "all indices" request) is treated as
/// targeting `*` and needs a pattern covering it.
#[derive(Debug, Clone)]
pub struct IndicesRule {
    patterns: Vec<Value<String>>,
}

impl IndicesRule {
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: Vec<Value<String>> = patterns.into_iter().map(Value::text).collect();
        if patterns.is_empty() {
            return Err(AclError::invalid_rule("indices", "at least one index is required"));
        }
        Ok(Self { patterns })
    }
}

impl SyncRule for IndicesRule {
    fn key(&self) -> &str {
        "indices"
    }

    fn class(&self) -> RuleClass {
        RuleClass::Inspection
    }

    fn check(&self, ctx: &BlockContext<'_>) -> Result<RuleOutcome> {
        let request = ctx.request();
        if !request.involves_indices {
            return Ok(RuleOutcome::Match);
        }

        let matcher = MatcherWithWildcards::new(resolve_all(&self.patterns, &ctx.variables())?);
        if matcher.patterns().contains(ALL_INDICES) {
            return Ok(RuleOutcome::Match);
        }

        if request.indices.is_empty() {
            return Ok(RuleOutcome::from_bool(matcher.matches(ALL_INDICES)));
        }

        let allowed = matcher.filter(request.indices.iter().map(String::as_str));
        if allowed.len() == request.indices.len() {
            return Ok(RuleOutcome::Match);
        }

        debug!(
            "[{}] {} request targets {} indices, {} allowed",
            ctx.block(),
            if request.read_request { "read" } else { "write" },
            request.indices.len(),
            allowed.len()
        );
        Ok(RuleOutcome::NoMatch)
    }
}
