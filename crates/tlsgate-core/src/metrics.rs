//! Prometheus metrics for enforcement decisions

use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use tlsgate_common::{EnforcementDecision, Error, Phase, Result};

/// Counters describing what the engine decided and why
pub struct EnforcementMetrics {
    registry: Registry,
    decisions: IntCounterVec,
    certificate_failures: IntCounterVec,
    policy_loads: IntCounterVec,
}

impl EnforcementMetrics {
    /// Create the counters in a dedicated registry
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let decisions = IntCounterVec::new(
            Opts::new("tlsgate_decisions_total", "Enforcement decisions by phase and outcome"),
            &["phase", "outcome"],
        )
        .map_err(metrics_error)?;

        let certificate_failures = IntCounterVec::new(
            Opts::new(
                "tlsgate_certificate_failures_total",
                "Certificate validation failures by reason",
            ),
            &["reason"],
        )
        .map_err(metrics_error)?;

        let policy_loads = IntCounterVec::new(
            Opts::new("tlsgate_policy_loads_total", "Policy loads by result"),
            &["result"],
        )
        .map_err(metrics_error)?;

        registry
            .register(Box::new(decisions.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(certificate_failures.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(policy_loads.clone()))
            .map_err(metrics_error)?;

        Ok(Self {
            registry,
            decisions,
            certificate_failures,
            policy_loads,
        })
    }

    pub fn record_decision(&self, phase: Phase, decision: &EnforcementDecision) {
        self.decisions
            .with_label_values(&[phase.as_str(), decision.outcome()])
            .inc();
    }

    pub fn record_certificate_failure(&self, reason: &str) {
        self.certificate_failures.with_label_values(&[reason]).inc();
    }

    /// `result` is one of "loaded", "fallback" or "replaced"
    pub fn record_policy_load(&self, result: &str) {
        self.policy_loads.with_label_values(&[result]).inc();
    }

    pub fn decision_count(&self, phase: Phase, outcome: &str) -> u64 {
        self.decisions
            .with_label_values(&[phase.as_str(), outcome])
            .get()
    }

    pub fn certificate_failure_count(&self, reason: &str) -> u64 {
        self.certificate_failures.with_label_values(&[reason]).get()
    }

    pub fn policy_load_count(&self, result: &str) -> u64 {
        self.policy_loads.with_label_values(&[result]).get()
    }

    /// Render all counters in the Prometheus text exposition format
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;

        String::from_utf8(buffer).map_err(|e| Error::Internal(format!("Invalid metrics output: {}", e)))
    }
}

fn metrics_error(e: prometheus::Error) -> Error {
    Error::Internal(format!("Metrics error: {}", e))
}
