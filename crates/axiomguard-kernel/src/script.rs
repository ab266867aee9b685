//! Deterministic severity scripts.
//!
//! Drives a bare supervisor with one synthetic violation per scripted
//! severity, a fixed delay apart, then lets it recover. The trajectory checks
//! the decay and recovery arithmetic without a live simulation.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::config::KernelConfig;
use crate::domain::{DomainTag, Severity, SystemStatus};
use crate::engine::SamplingGate;
use crate::metrics::KernelMetrics;
use crate::supervisor::{KernelSupervisor, RecordingEffects};
use crate::violation::ViolationReport;

/// Origin tag on scripted reports.
pub const SCRIPT_ORIGIN: &str = "SCRIPT";

#[derive(Debug, Clone, PartialEq)]
pub struct SeverityScript {
    pub severities: Vec<Severity>,
    pub interval_ms: u64,
    pub domain: DomainTag,
    /// Time to keep ticking after the last event.
    pub settle_ms: u64,
}

impl SeverityScript {
    #[must_use]
    pub fn new(severities: Vec<Severity>, interval_ms: u64) -> Self {
        Self {
            severities,
            interval_ms,
            domain: DomainTag::Integrity,
            settle_ms: 0,
        }
    }
}

/// One sample of the score trajectory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrajectoryPoint {
    pub t_ms: u64,
    /// The injected severity, or `None` for a recovery-only sample.
    pub severity: Option<Severity>,
    pub score: f64,
    pub status: SystemStatus,
    pub sampling_probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScriptTrace {
    pub points: Vec<TrajectoryPoint>,
    pub corrections: usize,
    pub emergency_caps: u32,
}

impl ScriptTrace {
    #[must_use]
    pub fn final_score(&self) -> Option<f64> {
        self.points.last().map(|p| p.score)
    }

    /// Distinct statuses in the order they were first entered.
    #[must_use]
    pub fn status_path(&self) -> Vec<SystemStatus> {
        let mut path: Vec<SystemStatus> = Vec::new();
        for p in &self.points {
            if path.last() != Some(&p.status) {
                path.push(p.status);
            }
        }
        path
    }
}

pub fn run_severity_script(config: &KernelConfig, script: &SeverityScript) -> ScriptTrace {
    let metrics = Arc::new(KernelMetrics::new());
    let gate = Arc::new(SamplingGate::new(config.sampling.stable, Some(0)));
    let mut sup = KernelSupervisor::new(config, gate, metrics, 0);
    let mut fx = RecordingEffects::default();
    let mut points = Vec::with_capacity(script.severities.len() + 1);

    let mut sample = |sup: &KernelSupervisor, t_ms: u64, severity: Option<Severity>| {
        let point = TrajectoryPoint {
            t_ms,
            severity,
            score: sup.score(),
            status: sup.status(),
            sampling_probability: sup.sampling_probability(),
        };
        info!(
            target: "axiomguard::script",
            t_ms,
            severity = severity.map_or("-", Severity::as_str),
            score = point.score,
            status = point.status.as_str(),
            "trajectory"
        );
        points.push(point);
    };

    sample(&sup, 0, None);
    let mut t = 0;
    for (i, &severity) in script.severities.iter().enumerate() {
        t = i as u64 * script.interval_ms;
        sup.recovery_tick(t, &mut fx);
        let report = ViolationReport::new(script.domain, severity, SCRIPT_ORIGIN, "scripted", t);
        sup.handle_violation(&report, t, &mut fx);
        sample(&sup, t, Some(severity));
    }

    let period = config.stability.recovery_period_ms.max(1);
    let end = t.saturating_add(script.settle_ms);
    let mut next = t + period;
    while next <= end {
        sup.recovery_tick(next, &mut fx);
        sample(&sup, next, None);
        next += period;
    }

    ScriptTrace {
        points,
        corrections: fx.corrections.len(),
        emergency_caps: fx.emergency_engaged,
    }
}
