//! Rules over plain request properties

use regex::Regex;
use std::collections::BTreeSet;

use super::{BlockContext, RuleClass, RuleOutcome, SyncRule};
use crate::error::{AclError, Result};
use crate::matcher::MatcherWithWildcards;
use crate::value::Value;

/// Matches requests using one of the given HTTP methods
#[derive(Debug, Clone)]
pub struct MethodsRule {
    methods: BTreeSet<String>,
}

impl MethodsRule {
    pub fn new<I, S>(methods: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let methods: BTreeSet<String> = methods
            .into_iter()
            .map(|m| m.as_ref().trim().to_uppercase())
            .collect();
        if methods.is_empty() || methods.contains("") {
            return Err(AclError::invalid_rule("methods", "methods cannot be empty"));
        }
        Ok(Self { methods })
    }
}

impl SyncRule for MethodsRule {
    fn key(&self) -> &str {
        "methods"
    }

    fn class(&self) -> RuleClass {
        RuleClass::Inspection
    }

    fn check(&self, ctx: &BlockContext<'_>) -> Result<RuleOutcome> {
        Ok(RuleOutcome::from_bool(self.methods.contains(&ctx.request().method)))
    }
}

/// Matches requests whose action matches a wildcard pattern
#[derive(Debug, Clone)]
pub struct ActionsRule {
    actions: MatcherWithWildcards,
}

impl ActionsRule {
    pub fn new<I, S>(actions: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let actions = MatcherWithWildcards::new(actions);
        if actions.is_empty() {
            return Err(AclError::invalid_rule("actions", "at least one action is required"));
        }
        Ok(Self { actions })
    }
}

impl SyncRule for ActionsRule {
    fn key(&self) -> &str {
        "actions"
    }

    fn class(&self) -> RuleClass {
        RuleClass::Inspection
    }

    fn check(&self, ctx: &BlockContext<'_>) -> Result<RuleOutcome> {
        Ok(RuleOutcome::from_bool(self.actions.matches(&ctx.request().action)))
    }
}

/// Matches requests whose URI matches a regular expression
///
/// The expression may reference request variables; it is then compiled per
/// request and a resolved string that does not compile is a resolving
/// failure.
#[derive(Debug, Clone)]
pub struct UriReRule {
    pattern: Value<Regex>,
}

impl UriReRule {
    pub fn new(pattern: impl Into<String>) -> Result<Self> {
        let pattern = Value::from_string(pattern, |raw: &str| Regex::new(raw).map_err(|e| e.to_string()))
            .map_err(|e| AclError::invalid_rule("uri_re", e.to_string()))?;
        Ok(Self { pattern })
    }
}

impl SyncRule for UriReRule {
    fn key(&self) -> &str {
        "uri_re"
    }

    fn class(&self) -> RuleClass {
        RuleClass::Inspection
    }

    fn check(&self, ctx: &BlockContext<'_>) -> Result<RuleOutcome> {
        match self.pattern.resolve(&ctx.variables())? {
            Some(re) => Ok(RuleOutcome::from_bool(re.is_match(&ctx.request().uri))),
            None => Ok(RuleOutcome::NoMatch),
        }
    }
}

/// Matches requests whose body is at most `max` bytes
#[derive(Debug, Clone, Copy)]
pub struct MaxBodyLengthRule {
    max: usize,
}

impl MaxBodyLengthRule {
    pub fn new(max: usize) -> Self {
        Self { max }
    }
}

impl SyncRule for MaxBodyLengthRule {
    fn key(&self) -> &str {
        "max_body_length"
    }

    fn class(&self) -> RuleClass {
        RuleClass::Inspection
    }

    fn check(&self, ctx: &BlockContext<'_>) -> Result<RuleOutcome> {
        Ok(RuleOutcome::from_bool(ctx.request().content_length <= self.max))
    }
}
