//! Audit trail of access-control decisions
//!
//! The engine hands every reportable decision to an [`AuditSink`]. Delivery
//! and storage are the sink's business; [`InMemoryAuditSink`] buffers
//! entries and [`TracingAuditSink`] writes them as JSON log events.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::info;

use super::decision::{BlockExitResult, Decision, FinalState};
use crate::error::{AclError, Result};
use crate::types::AclRequest;

/// Audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique entry ID
    pub id: String,

    pub decision_id: String,
    pub request_id: String,
    pub action: String,
    pub uri: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_address: Option<String>,

    /// Final state and its details
    pub state: FinalState,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_block: Option<String>,

    /// Id of the logged user, if a matched block established one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Per-block rule history
    pub history: Vec<BlockExitResult>,

    pub latency_ms: u64,

    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn from_decision(request: &AclRequest, decision: &Decision, latency: Duration) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            decision_id: decision.id.clone(),
            request_id: request.id.clone(),
            action: request.action.clone(),
            uri: request.uri.clone(),
            remote_address: request.remote_address.clone(),
            state: decision.state.clone(),
            matched_block: decision.matched_block().map(str::to_string),
            user: decision.user.as_ref().map(|u| u.id.clone()),
            history: decision.history.clone(),
            latency_ms: latency.as_millis() as u64,
            timestamp: decision.timestamp,
        }
    }
}

/// Consumer of audit entries
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditEntry) -> Result<()>;
}

/// Buffers entries in memory
#[derive(Default, Clone)]
pub struct InMemoryAuditSink {
    buffer: Arc<RwLock<Vec<AuditEntry>>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.buffer.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.buffer.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.buffer.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.buffer.write().await.clear();
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn record(&self, entry: AuditEntry) -> Result<()> {
        self.buffer.write().await.push(entry);
        Ok(())
    }
}

/// Emits each entry as a JSON `info` event on the `acl_audit` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, entry: AuditEntry) -> Result<()> {
        let json = serde_json::to_string(&entry)
            .map_err(|e| AclError::Internal(format!("cannot serialize audit entry: {}", e)))?;
        info!(target: "acl_audit", "{}", json);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LoggedUser;

    #[tokio::test]
    async fn test_entry_from_decision() {
        let request = AclRequest::new("indices:data/read/search")
            .with_uri("/logs/_search")
            .with_remote_address("10.0.0.1");
        let decision = Decision::allowed(&request, "kibana", Some(LoggedUser::new("alice")), Vec::new());

        let entry = AuditEntry::from_decision(&request, &decision, Duration::from_millis(3));

        assert_eq!(entry.decision_id, decision.id);
        assert_eq!(entry.request_id, request.id);
        assert_eq!(entry.matched_block.as_deref(), Some("kibana"));
        assert_eq!(entry.user.as_deref(), Some("alice"));
        assert_eq!(entry.latency_ms, 3);
    }

    #[tokio::test]
    async fn test_in_memory_sink() {
        let sink = InMemoryAuditSink::new();
        let request = AclRequest::new("a");
        let decision = Decision::not_found(&request, "missing");

        sink.record(AuditEntry::from_decision(&request, &decision, Duration::ZERO))
            .await
            .unwrap();

        assert_eq!(sink.len().await, 1);
        assert_eq!(sink.entries().await[0].state.label(), "NOT_FOUND");

        sink.clear().await;
        assert!(sink.is_empty().await);
    }

    #[tokio::test]
    async fn test_tracing_sink_serializes() {
        let request = AclRequest::new("a");
        let decision = Decision::errored(&request, "timeout");

        let result = TracingAuditSink
            .record(AuditEntry::from_decision(&request, &decision, Duration::ZERO))
            .await;
        assert!(result.is_ok());
    }
}
