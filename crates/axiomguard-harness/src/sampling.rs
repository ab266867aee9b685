//! Sampling-gate statistics.
//!
//! Runs a verification engine at each status's published probability and
//! compares the observed run rate against the configured one.

use std::sync::Arc;

use axiomguard_kernel::{
    CheckContext, DomainTag, KernelConfig, KernelMetrics, SamplingGate, SupervisionMode,
    SystemStatus, VerificationEngine, ViolationBus,
};
use serde::Serialize;

/// Allowed deviation, in binomial standard deviations.
pub const TOLERANCE_SIGMAS: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateSample {
    pub domain: DomainTag,
    pub status: SystemStatus,
    /// Probability the gate should apply for this domain and status.
    pub expected_rate: f64,
    pub trials: u64,
    pub ran: u64,
    pub observed_rate: f64,
    pub within_tolerance: bool,
}

/// Measure the gate for `domain` at every status.
#[must_use]
pub fn sample_gate(config: &KernelConfig, domain: DomainTag, trials: u64, seed: u64) -> Vec<GateSample> {
    [SystemStatus::Stable, SystemStatus::Unstable, SystemStatus::Critical]
        .into_iter()
        .enumerate()
        .map(|(i, status)| {
            let probability = config.sampling.probability(status);
            let gate = Arc::new(SamplingGate::new(probability, Some(seed.wrapping_add(i as u64))));
            let ran = run_trials(gate, domain, trials);
            let expected_rate = if domain.is_critical() { 1.0 } else { probability };
            GateSample {
                domain,
                status,
                expected_rate,
                trials,
                ran,
                observed_rate: if trials == 0 { 0.0 } else { ran as f64 / trials as f64 },
                within_tolerance: within_tolerance(ran, trials, expected_rate),
            }
        })
        .collect()
}

fn run_trials(gate: Arc<SamplingGate>, domain: DomainTag, trials: u64) -> u64 {
    let metrics = Arc::new(KernelMetrics::new());
    let bus = ViolationBus::new(Arc::clone(&metrics));
    let mut engine = VerificationEngine::new(gate, SupervisionMode::Repair, bus, metrics);
    let ctx = CheckContext::Custom(serde_json::Value::Null);
    for t in 0..trials {
        engine.verify(domain, &ctx, t);
    }
    engine.domain_metrics(domain).checks
}

#[must_use]
pub fn within_tolerance(observed: u64, trials: u64, p: f64) -> bool {
    let mean = trials as f64 * p;
    let sigma = (trials as f64 * p * (1.0 - p)).sqrt();
    (observed as f64 - mean).abs() <= TOLERANCE_SIGMAS * sigma
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critical_domain_ignores_probability() {
        let samples = sample_gate(&KernelConfig::default(), DomainTag::Inventory, 500, 3);
        assert_eq!(samples.len(), 3);
        for s in &samples {
            assert_eq!(s.ran, 500);
            assert_eq!(s.expected_rate, 1.0);
            assert!(s.within_tolerance);
        }
    }

    #[test]
    fn sampled_domain_tracks_each_status() {
        let samples = sample_gate(&KernelConfig::default(), DomainTag::Render, 10_000, 7);
        let rates: Vec<f64> = samples.iter().map(|s| s.expected_rate).collect();
        assert_eq!(rates, vec![0.05, 0.25, 1.0]);
        assert!(samples.iter().all(|s| s.within_tolerance), "{samples:?}");
        assert_eq!(samples[2].ran, 10_000);
    }

    #[test]
    fn tolerance_is_exact_at_certainty() {
        assert!(within_tolerance(100, 100, 1.0));
        assert!(!within_tolerance(99, 100, 1.0));
        assert!(within_tolerance(0, 100, 0.0));
    }
}
