//! Block evaluator
//!
//! Evaluates blocks in declaration order and stops at the first block whose
//! rules all match. Every request gets exactly one [`Decision`].
//!
//! ```text
//! Request → Block 1 → Block 2 → ... → Block n → default FORBIDDEN
//!              ↓         ↓               ↓
//!           rules in class order, first mismatch stops the block
//!              ↓
//!          [Metrics] [Audit]
//! ```

pub mod audit;
pub mod decision;
pub mod metrics;

pub use audit::{AuditEntry, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use decision::{BlockExitResult, Decision, FinalState, ForbiddenCause};
pub use metrics::{EngineMetrics, MetricsCollector};

use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::block::{Block, BlockDefinition, Policy, Verbosity};
use crate::config::EngineConfig;
use crate::error::{AclError, Result};
use crate::rules::MismatchCause;
use crate::types::AclRequest;

/// Access-control engine over an immutable list of blocks
pub struct AccessControl {
    blocks: Vec<Block>,

    config: EngineConfig,

    audit: Option<Arc<dyn AuditSink>>,

    metrics: Option<Arc<MetricsCollector>>,
}

impl AccessControl {
    /// Validate the configuration and build every block
    ///
    /// Any invalid block aborts construction.
    pub fn new(config: EngineConfig, definitions: Vec<BlockDefinition>) -> Result<Self> {
        config.validate()?;

        let mut names = HashSet::new();
        let mut blocks = Vec::with_capacity(definitions.len());
        for definition in definitions {
            if !names.insert(definition.name.clone()) {
                return Err(AclError::invalid_block(
                    &definition.name,
                    "block name is used more than once",
                ));
            }
            let block = Block::new(definition)?;
            info!("ADDING BLOCK: {}", block);
            blocks.push(block);
        }

        let metrics = config.enable_metrics.then(|| Arc::new(MetricsCollector::new()));

        info!(
            "AccessControl initialized with {} blocks, metrics={}, audit={}",
            blocks.len(),
            config.enable_metrics,
            config.enable_audit
        );

        Ok(Self {
            blocks,
            config,
            audit: None,
            metrics,
        })
    }

    /// Report decisions to `sink` (when audit is enabled)
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn metrics(&self) -> Option<&Arc<MetricsCollector>> {
        self.metrics.as_ref()
    }

    /// Whether clients should be challenged for basic-auth credentials
    pub fn requires_password(&self) -> bool {
        self.config.prompt_for_basic_auth && self.blocks.iter().any(Block::authenticates)
    }

    /// Decide a request
    pub async fn check(&self, request: &AclRequest) -> Decision {
        let start = Instant::now();

        debug!(
            "Checking request {}: action={}, method={}, uri={}",
            request.id, request.action, request.method, request.uri
        );

        let decision = match self.config.evaluation_timeout() {
            Some(limit) => match tokio::time::timeout(limit, self.evaluate(request)).await {
                Ok(decision) => decision,
                Err(_) => {
                    warn!("Request {} not decided within {:?}", request.id, limit);
                    Decision::errored(request, AclError::Timeout(limit).to_string())
                }
            },
            None => self.evaluate(request).await,
        };

        self.finalize(request, decision, start).await
    }

    /// Record that the host found a resource missing after evaluation
    pub async fn not_found(&self, request: &AclRequest, reason: impl Into<String>) -> Decision {
        let decision = Decision::not_found(request, reason);
        self.finalize(request, decision, Instant::now()).await
    }

    async fn evaluate(&self, request: &AclRequest) -> Decision {
        let rule_timeout = self.config.async_rule_timeout();
        let mut history = Vec::with_capacity(self.blocks.len());

        for block in &self.blocks {
            let result = block.check(request, rule_timeout).await;
            if !result.matched {
                history.push(result);
                continue;
            }

            let user = result.user.clone();
            history.push(result);
            return match block.policy() {
                Policy::Allow => Decision::allowed(request, block.name(), user, history),
                Policy::Forbid => Decision::forbidden_by(request, block.name(), user, history),
            };
        }

        Decision::no_match(request, history)
    }

    async fn finalize(&self, request: &AclRequest, decision: Decision, start: Instant) -> Decision {
        let latency = start.elapsed();
        let quiet = decision.is_allowed() && self.matched_verbosity(&decision) == Some(Verbosity::Error);

        match &decision.state {
            FinalState::Allowed { block } if !quiet => {
                info!("ALLOWED by '{}' req={} action={}", block, request.id, request.action);
            }
            FinalState::Allowed { .. } => {}
            FinalState::Forbidden { causes } => {
                info!(
                    "FORBIDDEN req={} action={} causes=[{}]",
                    request.id,
                    request.action,
                    causes.iter().map(|c| c.to_string()).collect::<Vec<_>>().join("; ")
                );
            }
            FinalState::Errored { cause } => {
                warn!("ERRORED req={} action={}: {}", request.id, request.action, cause);
            }
            FinalState::NotFound { reason } => {
                info!("NOT_FOUND req={} action={}: {}", request.id, request.action, reason);
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_latency(latency);
            metrics.record_decision(&decision.state).await;
            metrics.record_provider_failures(count_provider_failures(&decision)).await;
        }

        if self.config.enable_audit && !quiet {
            if let Some(sink) = &self.audit {
                let entry = AuditEntry::from_decision(request, &decision, latency);
                if let Err(e) = sink.record(entry).await {
                    warn!("Failed to record audit entry for {}: {}", request.id, e);
                }
            }
        }

        decision
    }

    fn matched_verbosity(&self, decision: &Decision) -> Option<Verbosity> {
        let name = decision.matched_block()?;
        self.blocks.iter().find(|b| b.name() == name).map(Block::verbosity)
    }
}

fn count_provider_failures(decision: &Decision) -> u64 {
    decision
        .history
        .iter()
        .filter_map(BlockExitResult::mismatch)
        .filter(|r| {
            matches!(
                r.cause,
                Some(MismatchCause::ProviderFailure { .. }) | Some(MismatchCause::Timeout { .. })
            )
        })
        .count() as u64
}

/// Shared, swappable reference to the current engine
///
/// A configuration change builds a complete new [`AccessControl`] and swaps
/// it in; requests already running keep the engine they started with.
pub struct AccessControlHandle {
    current: RwLock<Arc<AccessControl>>,
}

impl AccessControlHandle {
    pub fn new(engine: AccessControl) -> Self {
        Self {
            current: RwLock::new(Arc::new(engine)),
        }
    }

    pub fn current(&self) -> Arc<AccessControl> {
        self.current.read().clone()
    }

    /// Install `engine`, returning the one it replaces
    pub fn swap(&self, engine: AccessControl) -> Arc<AccessControl> {
        let engine = Arc::new(engine);
        info!("Swapping access-control engine ({} blocks)", engine.blocks().len());
        std::mem::replace(&mut *self.current.write(), engine)
    }

    pub async fn check(&self, request: &AclRequest) -> Decision {
        let engine = self.current();
        engine.check(request).await
    }
}
