//! Decision types and per-block evaluation history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::block::{Block, Policy};
use crate::rules::{MismatchCause, RuleExitResult};
use crate::types::{AclRequest, LoggedUser};

/// Outcome of evaluating one block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockExitResult {
    /// Block name
    pub block: String,

    pub policy: Policy,

    /// Whether every rule matched
    pub matched: bool,

    /// Rules evaluated, in order; the last one is the mismatch if any
    pub history: Vec<RuleExitResult>,

    /// Identity established in the block, kept only when it matched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<LoggedUser>,
}

impl BlockExitResult {
    pub fn matched(block: &Block, history: Vec<RuleExitResult>, user: Option<LoggedUser>) -> Self {
        Self {
            block: block.name().to_string(),
            policy: block.policy(),
            matched: true,
            history,
            user,
        }
    }

    pub fn mismatched(block: &Block, history: Vec<RuleExitResult>) -> Self {
        Self {
            block: block.name().to_string(),
            policy: block.policy(),
            matched: false,
            history,
            user: None,
        }
    }

    /// The rule that stopped the block
    pub fn mismatch(&self) -> Option<&RuleExitResult> {
        self.history.last().filter(|r| !r.matched)
    }
}

/// Why a request was forbidden
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ForbiddenCause {
    /// A block with the forbid policy matched
    MatchedForbidBlock { block: String },

    /// A block did not match because of one of its rules
    BlockMismatch {
        block: String,
        rule: String,
        cause: MismatchCause,
    },
}

impl ForbiddenCause {
    fn from_block(result: &BlockExitResult) -> Option<Self> {
        result.mismatch().map(|rule| ForbiddenCause::BlockMismatch {
            block: result.block.clone(),
            rule: rule.rule.clone(),
            cause: rule.cause.clone().unwrap_or(MismatchCause::Rejected),
        })
    }
}

impl fmt::Display for ForbiddenCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MatchedForbidBlock { block } => write!(f, "forbidden by block '{}'", block),
            Self::BlockMismatch { block, rule, cause } => {
                write!(f, "block '{}' stopped at '{}': {}", block, rule, cause)
            }
        }
    }
}

/// Terminal state of a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalState {
    Allowed { block: String },
    Forbidden { causes: Vec<ForbiddenCause> },
    Errored { cause: String },
    NotFound { reason: String },
}

impl FinalState {
    pub fn label(&self) -> &'static str {
        match self {
            FinalState::Allowed { .. } => "ALLOWED",
            FinalState::Forbidden { .. } => "FORBIDDEN",
            FinalState::Errored { .. } => "ERRORED",
            FinalState::NotFound { .. } => "NOT_FOUND",
        }
    }
}

impl fmt::Display for FinalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The single decision produced for a request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    /// Unique decision ID
    pub id: String,

    pub request_id: String,

    pub state: FinalState,

    /// Identity established by the deciding block
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<LoggedUser>,

    /// Every attempted block, in evaluation order
    #[serde(default)]
    pub history: Vec<BlockExitResult>,

    pub timestamp: DateTime<Utc>,
}

impl Decision {
    fn new(request: &AclRequest, state: FinalState, user: Option<LoggedUser>, history: Vec<BlockExitResult>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            request_id: request.id.clone(),
            state,
            user,
            history,
            timestamp: Utc::now(),
        }
    }

    pub fn allowed(request: &AclRequest, block: &str, user: Option<LoggedUser>, history: Vec<BlockExitResult>) -> Self {
        Self::new(
            request,
            FinalState::Allowed {
                block: block.to_string(),
            },
            user,
            history,
        )
    }

    /// Forbidden by a matched forbid block
    pub fn forbidden_by(
        request: &AclRequest,
        block: &str,
        user: Option<LoggedUser>,
        history: Vec<BlockExitResult>,
    ) -> Self {
        let causes = vec![ForbiddenCause::MatchedForbidBlock {
            block: block.to_string(),
        }];
        Self::new(request, FinalState::Forbidden { causes }, user, history)
    }

    /// Forbidden because no block matched; one cause per attempted block
    pub fn no_match(request: &AclRequest, history: Vec<BlockExitResult>) -> Self {
        let causes = history.iter().filter_map(ForbiddenCause::from_block).collect();
        Self::new(request, FinalState::Forbidden { causes }, None, history)
    }

    pub fn errored(request: &AclRequest, cause: impl Into<String>) -> Self {
        Self::new(request, FinalState::Errored { cause: cause.into() }, None, Vec::new())
    }

    pub fn not_found(request: &AclRequest, reason: impl Into<String>) -> Self {
        Self::new(request, FinalState::NotFound { reason: reason.into() }, None, Vec::new())
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self.state, FinalState::Allowed { .. })
    }

    /// Name of the block that allowed or forbade the request
    pub fn matched_block(&self) -> Option<&str> {
        match &self.state {
            FinalState::Allowed { block } => Some(block.as_str()),
            FinalState::Forbidden { causes } => causes.iter().find_map(|c| match c {
                ForbiddenCause::MatchedForbidBlock { block } => Some(block.as_str()),
                _ => None,
            }),
            _ => None,
        }
    }

    /// Causes of a forbidden decision
    pub fn causes(&self) -> &[ForbiddenCause] {
        match &self.state {
            FinalState::Forbidden { causes } => causes,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RuleClass;

    fn mismatched(block: &str, rule: &str, cause: MismatchCause) -> BlockExitResult {
        BlockExitResult {
            block: block.to_string(),
            policy: Policy::Allow,
            matched: false,
            history: vec![RuleExitResult {
                rule: rule.to_string(),
                class: RuleClass::Inspection,
                matched: false,
                cause: Some(cause),
            }],
            user: None,
        }
    }

    #[test]
    fn test_no_match_has_one_cause_per_block() {
        let request = AclRequest::new("a");
        let history = vec![
            mismatched("b1", "hosts", MismatchCause::Rejected),
            mismatched(
                "b2",
                "ldap_auth",
                MismatchCause::ProviderFailure {
                    reason: "down".to_string(),
                },
            ),
        ];

        let decision = Decision::no_match(&request, history);

        assert!(!decision.is_allowed());
        assert_eq!(decision.causes().len(), 2);
        assert_eq!(decision.request_id, request.id);
        assert!(decision.matched_block().is_none());
    }

    #[test]
    fn test_matched_block() {
        let request = AclRequest::new("a");

        let allowed = Decision::allowed(&request, "kibana", None, Vec::new());
        assert_eq!(allowed.matched_block(), Some("kibana"));
        assert_eq!(allowed.state.label(), "ALLOWED");

        let forbidden = Decision::forbidden_by(&request, "blacklist", None, Vec::new());
        assert_eq!(forbidden.matched_block(), Some("blacklist"));
        assert_eq!(forbidden.state.to_string(), "FORBIDDEN");
    }

    #[test]
    fn test_serialized_shape() {
        let request = AclRequest::new("a");
        let decision = Decision::not_found(&request, "index missing");
        let json = serde_json::to_value(&decision).unwrap();

        assert_eq!(json["state"]["state"], "NOT_FOUND");
        assert_eq!(json["state"]["reason"], "index missing");
    }
}
