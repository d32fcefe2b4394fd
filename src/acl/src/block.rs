//! Policy blocks: a named, ordered conjunction of rules

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, trace, warn};

use crate::engine::decision::BlockExitResult;
use crate::error::{AclError, Result};
use crate::rules::{BlockContext, MismatchCause, Rule, RuleExitResult, RuleOutcome, RulesOrdering};
use crate::types::AclRequest;

/// What a fully matched block decides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    Allow,
    Forbid,
}

/// How loudly a matched block is reported
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    /// Log and audit every match
    #[default]
    Info,
    /// Log and audit only forbidden outcomes
    Error,
}

/// Block as configured, before validation
#[derive(Debug, Clone)]
pub struct BlockDefinition {
    pub name: String,
    pub policy: Policy,
    pub verbosity: Verbosity,
    pub rules: Vec<Rule>,
}

impl BlockDefinition {
    pub fn new(name: impl Into<String>, policy: Policy) -> Self {
        Self {
            name: name.into(),
            policy,
            verbosity: Verbosity::default(),
            rules: Vec::new(),
        }
    }

    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }
}

/// A validated block with its rules in evaluation order
#[derive(Debug)]
pub struct Block {
    name: String,
    policy: Policy,
    verbosity: Verbosity,
    rules: Vec<Rule>,
}

impl Block {
    /// Validate a definition and order its rules
    pub fn new(definition: BlockDefinition) -> Result<Self> {
        let BlockDefinition {
            name,
            policy,
            verbosity,
            mut rules,
        } = definition;

        if name.trim().is_empty() {
            return Err(AclError::invalid_block(name, "block name cannot be empty"));
        }
        if rules.is_empty() {
            return Err(AclError::invalid_block(name, "block has no rules"));
        }

        let mut keys = HashSet::new();
        for rule in &rules {
            if !keys.insert(rule.key()) {
                return Err(AclError::invalid_block(
                    &name,
                    format!("rule '{}' appears more than once", rule.key()),
                ));
            }
        }

        if rules.iter().any(Rule::authorizes) && !rules.iter().any(Rule::authenticates) {
            return Err(AclError::invalid_block(
                &name,
                "block contains an authorization rule but no authentication rule",
            ));
        }

        RulesOrdering.sort(&mut rules);

        Ok(Self {
            name,
            policy,
            verbosity,
            rules,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    /// Rules in evaluation order
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn authenticates(&self) -> bool {
        self.rules.iter().any(Rule::authenticates)
    }

    /// Evaluate the rules in order, stopping at the first mismatch
    ///
    /// Async rules get `rule_timeout` each. Rule errors never escape: they
    /// become mismatches with a cause in the history.
    pub async fn check(&self, request: &AclRequest, rule_timeout: Duration) -> BlockExitResult {
        let mut ctx = BlockContext::new(request, &self.name);
        let mut history = Vec::with_capacity(self.rules.len());

        for rule in &self.rules {
            let outcome = if rule.is_async() {
                tokio::time::timeout(rule_timeout, rule.check(&ctx))
                    .await
                    .unwrap_or_else(|_| Err(AclError::Timeout(rule_timeout)))
            } else {
                rule.check(&ctx).await
            };

            let mismatch = match outcome {
                Ok(RuleOutcome::Match) => None,
                Ok(RuleOutcome::Authenticated(user)) => {
                    let presented = user.id.clone();
                    match ctx.attach_user(user) {
                        Ok(()) => None,
                        Err(attached) => Some(MismatchCause::IdentityConflict {
                            attached: attached.id,
                            presented,
                        }),
                    }
                }
                Ok(RuleOutcome::NoMatch) => Some(MismatchCause::Rejected),
                Err(e) => Some(self.cause_for(rule, e)),
            };

            match mismatch {
                None => {
                    trace!("[{}] rule '{}' matched", self.name, rule.key());
                    history.push(RuleExitResult::matched(rule));
                }
                Some(cause) => {
                    debug!("[{}] rule '{}' did not match: {}", self.name, rule.key(), cause);
                    history.push(RuleExitResult::mismatched(rule, cause));
                    return BlockExitResult::mismatched(self, history);
                }
            }
        }

        debug!("[{}] matched", self.name);
        BlockExitResult::matched(self, history, ctx.into_user())
    }

    fn cause_for(&self, rule: &Rule, error: AclError) -> MismatchCause {
        match error {
            AclError::Provider { .. } | AclError::Http(_) => {
                warn!("[{}] rule '{}': {}", self.name, rule.key(), error);
                MismatchCause::ProviderFailure {
                    reason: error.to_string(),
                }
            }
            AclError::Timeout(after) => {
                warn!("[{}] rule '{}' timed out after {:?}", self.name, rule.key(), after);
                MismatchCause::Timeout {
                    after_ms: after.as_millis() as u64,
                }
            }
            AclError::Resolving(e) => {
                debug!("[{}] rule '{}': {}", self.name, rule.key(), e);
                MismatchCause::ResolvingFailure { reason: e.to_string() }
            }
            other => {
                error!("[{}] rule '{}' failed: {}", self.name, rule.key(), other);
                MismatchCause::Error {
                    reason: other.to_string(),
                }
            }
        }
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<&str> = self.rules.iter().map(Rule::key).collect();
        write!(f, "{{ name: '{}', policy: {:?}, rules: [{}] }}", self.name, self.policy, keys.join(", "))
    }
}
