//! Prometheus metrics for approval workflow monitoring.
//!
//! The `metrics` facade counters emitted from transitions and dispatch are always on and
//! go wherever the host application installs a recorder. This module adds an optional
//! Prometheus registry wrapper for hosts that scrape a `prometheus::Registry` directly:
//! - **Counters**: execution outcomes, reviewer decisions
//! - **Histograms**: execution duration
//!
//! All metrics are labelled by handler type and request type for drill-down.

#[cfg(feature = "metrics")]
use prometheus::{CounterVec, HistogramVec, Opts, Registry};
#[cfg(feature = "metrics")]
use std::time::Duration;

#[cfg(feature = "metrics")]
use crate::error::Result;

/// Prometheus metrics registry for the approval workflow.
#[cfg(feature = "metrics")]
#[derive(Clone)]
pub struct CountersignMetrics {
    registry: Registry,

    // Counters (cumulative totals)
    executions_total: CounterVec,
    decisions_total: CounterVec,

    // Histograms (distributions)
    execution_duration_seconds: HistogramVec,
}

#[cfg(feature = "metrics")]
impl CountersignMetrics {
    /// Create a new CountersignMetrics instance with the given registry.
    ///
    /// # Errors
    ///
    /// Returns an error if metrics fail to register (e.g., duplicate registration).
    pub fn new(registry: Registry) -> Result<Self> {
        // Counter: executions by outcome
        let executions_total = CounterVec::new(
            Opts::new(
                "countersign_executions_total",
                "Total number of approved operations executed, by outcome",
            ),
            &["handler_type", "request_type", "outcome"],
        )
        .map_err(|e| anyhow::anyhow!("Failed to create executions_total counter: {}", e))?;

        // Counter: reviewer decisions
        let decisions_total = CounterVec::new(
            Opts::new(
                "countersign_decisions_total",
                "Total number of reviewer decisions, by decision",
            ),
            &["handler_type", "decision"],
        )
        .map_err(|e| anyhow::anyhow!("Failed to create decisions_total counter: {}", e))?;

        // Histogram: operation duration
        let execution_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "countersign_execution_duration_seconds",
                "Approved operation duration in seconds",
            )
            .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
            &["handler_type", "request_type"],
        )
        .map_err(|e| {
            anyhow::anyhow!("Failed to create execution_duration_seconds histogram: {}", e)
        })?;

        registry
            .register(Box::new(executions_total.clone()))
            .map_err(|e| anyhow::anyhow!("Failed to register executions_total: {}", e))?;
        registry
            .register(Box::new(decisions_total.clone()))
            .map_err(|e| anyhow::anyhow!("Failed to register decisions_total: {}", e))?;
        registry
            .register(Box::new(execution_duration_seconds.clone()))
            .map_err(|e| {
                anyhow::anyhow!("Failed to register execution_duration_seconds: {}", e)
            })?;

        Ok(Self {
            registry,
            executions_total,
            decisions_total,
            execution_duration_seconds,
        })
    }

    /// Get the underlying Prometheus registry.
    ///
    /// Useful for exporting metrics via HTTP endpoint.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record an operation run. `outcome` should be low-cardinality: "executed" or "failed".
    pub fn record_execution(
        &self,
        handler_type: &str,
        request_type: &str,
        outcome: &str,
        duration: Duration,
    ) {
        self.executions_total
            .with_label_values(&[handler_type, request_type, outcome])
            .inc();

        self.execution_duration_seconds
            .with_label_values(&[handler_type, request_type])
            .observe(duration.as_secs_f64());
    }

    /// Record an approve, decline or defer.
    pub fn record_decision(&self, handler_type: &str, decision: &str) {
        self.decisions_total
            .with_label_values(&[handler_type, decision])
            .inc();
    }
}

#[cfg(all(test, feature = "metrics"))]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let registry = Registry::new();
        let metrics = CountersignMetrics::new(registry.clone()).unwrap();
        metrics.record_decision("fee", "approve");
        metrics.record_execution("fee", "UPDATE_FEE", "executed", Duration::from_millis(20));

        let metric_names: Vec<String> = registry
            .gather()
            .iter()
            .map(|f| f.get_name().to_string())
            .collect();
        assert!(metric_names.contains(&"countersign_executions_total".to_string()));
        assert!(metric_names.contains(&"countersign_decisions_total".to_string()));
        assert!(metric_names.contains(&"countersign_execution_duration_seconds".to_string()));
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = Registry::new();
        CountersignMetrics::new(registry.clone()).unwrap();
        assert!(CountersignMetrics::new(registry).is_err());
    }

    #[test]
    fn test_record_execution_by_outcome() {
        let registry = Registry::new();
        let metrics = CountersignMetrics::new(registry.clone()).unwrap();

        metrics.record_execution("fee", "UPDATE_FEE", "executed", Duration::from_secs(1));
        metrics.record_execution("fee", "UPDATE_FEE", "executed", Duration::from_secs(1));
        metrics.record_execution("fee", "UPDATE_FEE", "failed", Duration::from_secs(2));

        let families = registry.gather();
        let executions = families
            .iter()
            .find(|f| f.get_name() == "countersign_executions_total")
            .expect("executions_total metric not found");

        // One series per outcome
        assert_eq!(executions.get_metric().len(), 2);

        let executed = executions
            .get_metric()
            .iter()
            .find(|m| {
                m.get_label()
                    .iter()
                    .any(|l| l.get_name() == "outcome" && l.get_value() == "executed")
            })
            .expect("executed outcome not found");
        assert_eq!(executed.get_counter().get_value(), 2.0);
    }
}
