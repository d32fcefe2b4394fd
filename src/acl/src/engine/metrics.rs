//! Decision counters and latency, exported in Prometheus text format

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::decision::FinalState;

const DEFAULT_MAX_SAMPLES: usize = 10_000;

/// Engine metrics snapshot
#[derive(Debug, Clone, Default)]
pub struct EngineMetrics {
    /// Total number of decisions
    pub total_requests: u64,

    pub allowed_decisions: u64,
    pub forbidden_decisions: u64,
    pub errored_decisions: u64,
    pub not_found_decisions: u64,

    /// Rules that failed closed on a provider error or timeout
    pub provider_failures: u64,

    /// Latency percentiles (p50, p90, p95, p99, p99.9)
    pub latency_p50_ms: f64,
    pub latency_p90_ms: f64,
    pub latency_p95_ms: f64,
    pub latency_p99_ms: f64,
    pub latency_p999_ms: f64,

    pub avg_latency_ms: f64,
}

impl EngineMetrics {
    pub fn allow_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.allowed_decisions as f64 / self.total_requests as f64
        }
    }
}

/// Metrics collector with Prometheus-compatible export
///
/// Recording only bumps counters or appends a sample. Average and
/// percentiles are computed when metrics are read.
pub struct MetricsCollector {
    metrics: Arc<RwLock<EngineMetrics>>,

    /// Recent latency samples in milliseconds, oldest first
    latency_samples: Arc<Mutex<VecDeque<f64>>>,

    max_samples: usize,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::with_max_samples(DEFAULT_MAX_SAMPLES)
    }

    /// Collector keeping at most `max_samples` latency samples
    pub fn with_max_samples(max_samples: usize) -> Self {
        let max_samples = max_samples.max(1);
        Self {
            metrics: Arc::new(RwLock::new(EngineMetrics::default())),
            latency_samples: Arc::new(Mutex::new(VecDeque::with_capacity(max_samples))),
            max_samples,
        }
    }

    pub async fn record_decision(&self, state: &FinalState) {
        let mut metrics = self.metrics.write().await;
        metrics.total_requests += 1;

        match state {
            FinalState::Allowed { .. } => metrics.allowed_decisions += 1,
            FinalState::Forbidden { .. } => metrics.forbidden_decisions += 1,
            FinalState::Errored { .. } => metrics.errored_decisions += 1,
            FinalState::NotFound { .. } => metrics.not_found_decisions += 1,
        }
    }

    pub async fn record_provider_failures(&self, count: u64) {
        if count == 0 {
            return;
        }
        let mut metrics = self.metrics.write().await;
        metrics.provider_failures += count;
    }

    pub fn record_latency(&self, latency: Duration) {
        let latency_ms = latency.as_secs_f64() * 1000.0;

        let mut samples = self.latency_samples.lock();
        if samples.len() >= self.max_samples {
            samples.pop_front();
        }
        samples.push_back(latency_ms);
    }

    /// Number of latency samples currently retained
    pub fn sample_count(&self) -> usize {
        self.latency_samples.lock().len()
    }

    pub async fn get_metrics(&self) -> EngineMetrics {
        let mut metrics = self.metrics.read().await.clone();

        let mut sorted: Vec<f64> = self.latency_samples.lock().iter().copied().collect();
        if sorted.is_empty() {
            return metrics;
        }
        sorted.sort_by(|a, b| a.total_cmp(b));

        metrics.avg_latency_ms = sorted.iter().sum::<f64>() / sorted.len() as f64;
        metrics.latency_p50_ms = Self::percentile(&sorted, 0.50);
        metrics.latency_p90_ms = Self::percentile(&sorted, 0.90);
        metrics.latency_p95_ms = Self::percentile(&sorted, 0.95);
        metrics.latency_p99_ms = Self::percentile(&sorted, 0.99);
        metrics.latency_p999_ms = Self::percentile(&sorted, 0.999);

        metrics
    }

    pub async fn reset(&self) {
        let mut metrics = self.metrics.write().await;
        *metrics = EngineMetrics::default();

        self.latency_samples.lock().clear();
    }

    pub async fn export_prometheus(&self) -> String {
        let metrics = self.get_metrics().await;

        format!(
            r#"# HELP acl_requests_total Total number of access-control decisions
# TYPE acl_requests_total counter
acl_requests_total {}

# HELP acl_decisions_total Decisions by final state
# TYPE acl_decisions_total counter
acl_decisions_total{{state="allowed"}} {}
acl_decisions_total{{state="forbidden"}} {}
acl_decisions_total{{state="errored"}} {}
acl_decisions_total{{state="not_found"}} {}

# HELP acl_provider_failures_total Rules failed closed on provider errors or timeouts
# TYPE acl_provider_failures_total counter
acl_provider_failures_total {}

# HELP acl_latency_seconds Decision latency percentiles
# TYPE acl_latency_seconds summary
acl_latency_seconds{{quantile="0.5"}} {}
acl_latency_seconds{{quantile="0.9"}} {}
acl_latency_seconds{{quantile="0.95"}} {}
acl_latency_seconds{{quantile="0.99"}} {}
acl_latency_seconds{{quantile="0.999"}} {}
"#,
            metrics.total_requests,
            metrics.allowed_decisions,
            metrics.forbidden_decisions,
            metrics.errored_decisions,
            metrics.not_found_decisions,
            metrics.provider_failures,
            metrics.latency_p50_ms / 1000.0,
            metrics.latency_p90_ms / 1000.0,
            metrics.latency_p95_ms / 1000.0,
            metrics.latency_p99_ms / 1000.0,
            metrics.latency_p999_ms / 1000.0,
        )
    }

    fn percentile(sorted: &[f64], p: f64) -> f64 {
        if sorted.is_empty() {
            return 0.0;
        }

        let idx = ((sorted.len() as f64) * p) as usize;
        let idx = idx.min(sorted.len() - 1);
        sorted[idx]
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed() -> FinalState {
        FinalState::Allowed {
            block: "b".to_string(),
        }
    }

    fn forbidden() -> FinalState {
        FinalState::Forbidden { causes: Vec::new() }
    }

    #[tokio::test]
    async fn test_metrics_creation() {
        let collector = MetricsCollector::new();
        let metrics = collector.get_metrics().await;

        assert_eq!(metrics.total_requests, 0);
        assert_eq!(metrics.allow_rate(), 0.0);
    }

    #[tokio::test]
    async fn test_record_decision() {
        let collector = MetricsCollector::new();

        collector.record_decision(&allowed()).await;
        collector.record_decision(&forbidden()).await;
        collector.record_decision(&allowed()).await;
        collector
            .record_decision(&FinalState::Errored {
                cause: "timeout".to_string(),
            })
            .await;

        let metrics = collector.get_metrics().await;
        assert_eq!(metrics.total_requests, 4);
        assert_eq!(metrics.allowed_decisions, 2);
        assert_eq!(metrics.forbidden_decisions, 1);
        assert_eq!(metrics.errored_decisions, 1);
        assert!((metrics.allow_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_record_latency() {
        let collector = MetricsCollector::new();

        collector.record_latency(Duration::from_millis(5));
        collector.record_latency(Duration::from_millis(10));
        collector.record_latency(Duration::from_millis(15));

        let metrics = collector.get_metrics().await;
        assert!((metrics.avg_latency_ms - 10.0).abs() < 1.0);
        assert!(metrics.latency_p50_ms > 0.0);
        assert!(metrics.latency_p99_ms > 0.0);
    }

    #[tokio::test]
    async fn test_latency_window_is_bounded() {
        let collector = MetricsCollector::with_max_samples(4);

        for ms in 1..=10 {
            collector.record_latency(Duration::from_millis(ms));
        }
        assert_eq!(collector.sample_count(), 4);

        // only 7, 8, 9 and 10 ms remain
        let metrics = collector.get_metrics().await;
        assert!((metrics.avg_latency_ms - 8.5).abs() < 0.01);
        assert!((metrics.latency_p50_ms - 9.0).abs() < 0.01);
        assert!((metrics.latency_p99_ms - 10.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_percentiles_follow_new_samples() {
        let collector = MetricsCollector::new();

        collector.record_latency(Duration::from_millis(2));
        assert!((collector.get_metrics().await.latency_p50_ms - 2.0).abs() < 0.01);

        collector.record_latency(Duration::from_millis(40));
        collector.record_latency(Duration::from_millis(40));
        let metrics = collector.get_metrics().await;
        assert!((metrics.latency_p50_ms - 40.0).abs() < 0.01);
        assert!((metrics.avg_latency_ms - 82.0 / 3.0).abs() < 0.01);

        let prometheus = collector.export_prometheus().await;
        assert!(prometheus.contains("acl_latency_seconds{quantile=\"0.5\"} 0.04"));
    }

    #[tokio::test]
    async fn test_prometheus_export() {
        let collector = MetricsCollector::new();

        collector.record_decision(&allowed()).await;
        collector.record_provider_failures(2).await;

        let prometheus = collector.export_prometheus().await;
        assert!(prometheus.contains("acl_requests_total 1"));
        assert!(prometheus.contains("acl_decisions_total{state=\"allowed\"} 1"));
        assert!(prometheus.contains("acl_provider_failures_total 2"));
    }

    #[tokio::test]
    async fn test_reset() {
        let collector = MetricsCollector::new();

        collector.record_decision(&forbidden()).await;
        collector.record_latency(Duration::from_millis(3));
        collector.reset().await;

        let metrics = collector.get_metrics().await;
        assert_eq!(metrics.total_requests, 0);
        assert_eq!(metrics.avg_latency_ms, 0.0);
        assert_eq!(collector.sample_count(), 0);
    }
}
