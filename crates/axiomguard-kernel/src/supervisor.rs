//! Kernel supervisor: the stability control loop.
//!
//! One scalar, the stability score in `[0, 100]`, is decremented by each
//! violation's severity weight and recovered at a fixed rate per period.
//! Status and sampling probability are pure functions of the score and are
//! recomputed on every read. A domain-keyed policy table maps violations to
//! log level, corrective action and quality cap.
//!
//! The emergency MEDIUM cap has hysteresis: it engages only while the status
//! is CRITICAL and releases only once the score is back in the STABLE band.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::{KernelConfig, SamplingConfig, SeverityWeights, StabilityConfig, SupervisionMode};
use crate::corrector::{CorrectionKind, TriggerOutcome};
use crate::domain::{DomainTag, Severity, SystemStatus};
use crate::engine::SamplingGate;
use crate::metrics::KernelMetrics;
use crate::quality::SafetyCap;
use crate::violation::ViolationReport;

pub const MAX_SCORE: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    Warn,
    Error,
}

/// Reaction to violations of one domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Policy {
    pub action: Option<CorrectionKind>,
    pub cap: Option<SafetyCap>,
    pub log_level: LogLevel,
    /// Action and cap apply only at or above this severity.
    pub min_severity: Severity,
}

impl Policy {
    #[must_use]
    pub const fn new(log_level: LogLevel) -> Self {
        Self {
            action: None,
            cap: None,
            log_level,
            min_severity: Severity::Low,
        }
    }

    #[must_use]
    pub const fn action(mut self, kind: CorrectionKind) -> Self {
        self.action = Some(kind);
        self
    }

    #[must_use]
    pub const fn cap(mut self, cap: SafetyCap) -> Self {
        self.cap = Some(cap);
        self
    }

    #[must_use]
    pub const fn min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = severity;
        self
    }

    #[must_use]
    pub fn applies_to(&self, severity: Severity) -> bool {
        severity >= self.min_severity
    }
}

/// Domain → policy. Lookup is by exact domain.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyTable {
    policies: HashMap<DomainTag, Policy>,
}

impl PolicyTable {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            policies: HashMap::new(),
        }
    }

    pub fn insert(&mut self, domain: DomainTag, policy: Policy) {
        self.policies.insert(domain, policy);
    }

    #[must_use]
    pub fn get(&self, domain: DomainTag) -> Option<&Policy> {
        self.policies.get(&domain)
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        use CorrectionKind as K;
        use LogLevel::{Error, Warn};
        let mut t = Self::empty();
        t.insert(
            DomainTag::SpatialTopology,
            Policy::new(Warn).action(K::Spatial).cap(SafetyCap::High),
        );
        t.insert(
            DomainTag::Geometry,
            Policy::new(Error).action(K::Spatial).cap(SafetyCap::Medium),
        );
        t.insert(
            DomainTag::GeometrySegments,
            Policy::new(Warn).action(K::Spatial).cap(SafetyCap::Medium),
        );
        t.insert(DomainTag::PathContinuity, Policy::new(Warn).action(K::Spatial));
        t.insert(DomainTag::RenderDepth, Policy::new(Warn).action(K::Render));
        t.insert(
            DomainTag::Render,
            Policy::new(Warn).action(K::Render).cap(SafetyCap::Medium),
        );
        t.insert(
            DomainTag::World,
            Policy::new(Error).action(K::WorldGen).cap(SafetyCap::Medium),
        );
        t.insert(DomainTag::Inventory, Policy::new(Error).action(K::Inventory));
        t.insert(
            DomainTag::Combat,
            Policy::new(Error)
                .action(K::Combat)
                .min_severity(Severity::Medium),
        );
        t.insert(DomainTag::Status, Policy::new(Warn));
        t.insert(DomainTag::Integrity, Policy::new(Error).cap(SafetyCap::Medium));
        t
    }
}

/// Downstream components the supervisor drives.
pub trait SupervisorEffects {
    fn trigger_correction(&mut self, kind: CorrectionKind, now_ms: u64) -> TriggerOutcome;
    /// Policy cap; applied regardless of status, held until full recovery.
    fn set_safety_cap(&mut self, cap: SafetyCap);
    fn release_safety_cap(&mut self);
    fn engage_emergency_cap(&mut self, cap: SafetyCap);
    fn release_emergency_cap(&mut self);
}

/// Entry in the bounded recent-violation log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentViolation {
    pub source: String,
    pub severity: Severity,
    pub weight: f64,
    pub timestamp_ms: u64,
}

/// What the supervisor did with one report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViolationOutcome {
    pub score: f64,
    pub status: SystemStatus,
    pub level: LogLevel,
    pub policy_matched: bool,
    pub action: Option<(CorrectionKind, TriggerOutcome)>,
    pub cap: Option<SafetyCap>,
}

/// Owns the stability score. Nothing else writes it.
pub struct KernelSupervisor {
    score: f64,
    stability: StabilityConfig,
    weights: SeverityWeights,
    sampling: SamplingConfig,
    mode: SupervisionMode,
    policies: PolicyTable,
    recent: VecDeque<RecentViolation>,
    emergency_cap_active: bool,
    policy_cap_active: bool,
    last_recovery_ms: u64,
    gate: Arc<SamplingGate>,
    metrics: Arc<KernelMetrics>,
}

impl KernelSupervisor {
    #[must_use]
    pub fn new(
        config: &KernelConfig,
        gate: Arc<SamplingGate>,
        metrics: Arc<KernelMetrics>,
        now_ms: u64,
    ) -> Self {
        let sup = Self {
            score: MAX_SCORE,
            stability: config.stability,
            weights: config.severity_weights,
            sampling: config.sampling,
            mode: config.mode,
            policies: PolicyTable::default(),
            recent: VecDeque::with_capacity(config.stability.recent_violation_capacity),
            emergency_cap_active: false,
            policy_cap_active: false,
            last_recovery_ms: now_ms,
            gate,
            metrics,
        };
        sup.publish_probability();
        sup
    }

    #[must_use]
    pub fn with_policies(mut self, policies: PolicyTable) -> Self {
        self.policies = policies;
        self
    }

    #[must_use]
    pub fn score(&self) -> f64 {
        self.score
    }

    #[must_use]
    pub fn status(&self) -> SystemStatus {
        self.stability.classify(self.score)
    }

    #[must_use]
    pub fn sampling_probability(&self) -> f64 {
        self.sampling.probability(self.status())
    }

    #[must_use]
    pub fn emergency_cap_active(&self) -> bool {
        self.emergency_cap_active
    }

    /// True while a HIGH policy cap is in force.
    #[must_use]
    pub fn policy_cap_active(&self) -> bool {
        self.policy_cap_active
    }

    #[must_use]
    pub fn recent_violations(&self) -> Vec<RecentViolation> {
        self.recent.iter().cloned().collect()
    }

    #[must_use]
    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    fn publish_probability(&self) {
        if self.gate.publish(self.sampling_probability()) {
            info!(
                target: "axiomguard::supervisor",
                status = self.status().as_str(),
                probability = self.sampling_probability(),
                "sampling probability changed"
            );
        }
    }

    /// Apply one violation: decay, log, policy.
    ///
    /// `now_ms` is the wall-clock time of the handling tick; correction
    /// cooldowns are measured against it. The report's own timestamp is only
    /// kept in the recent-violation log.
    pub fn handle_violation(
        &mut self,
        report: &ViolationReport,
        now_ms: u64,
        effects: &mut dyn SupervisorEffects,
    ) -> ViolationOutcome {
        KernelMetrics::inc(&self.metrics.violations_consumed);
        let weight = self.weights.weight(report.severity);
        self.score = (self.score - weight).max(0.0);
        if self.recent.len() == self.stability.recent_violation_capacity {
            self.recent.pop_front();
        }
        self.recent.push_back(RecentViolation {
            source: report.source(),
            severity: report.severity,
            weight,
            timestamp_ms: report.timestamp_ms,
        });
        self.publish_probability();
        let status = self.status();

        let policy = self.policies.get(report.domain).copied();
        let mut level = policy.map_or(LogLevel::Warn, |p| p.log_level);
        if report.severity == Severity::Critical {
            level = LogLevel::Error;
        }
        match level {
            LogLevel::Warn => warn!(
                target: "axiomguard::supervisor",
                source = %report.source(),
                severity = report.severity.as_str(),
                score = self.score,
                status = status.as_str(),
                "{}",
                report.message
            ),
            LogLevel::Error => error!(
                target: "axiomguard::supervisor",
                source = %report.source(),
                severity = report.severity.as_str(),
                score = self.score,
                status = status.as_str(),
                "{}",
                report.message
            ),
        }

        let mut outcome = ViolationOutcome {
            score: self.score,
            status,
            level,
            policy_matched: policy.is_some(),
            action: None,
            cap: None,
        };
        let Some(policy) = policy.filter(|p| p.applies_to(report.severity)) else {
            return outcome;
        };

        if let Some(kind) = policy.action {
            if self.mode.corrections_enabled() {
                let result = effects.trigger_correction(kind, now_ms);
                outcome.action = Some((kind, result));
            }
        }
        match policy.cap {
            Some(SafetyCap::High) => {
                self.policy_cap_active = true;
                effects.set_safety_cap(SafetyCap::High);
                outcome.cap = Some(SafetyCap::High);
            }
            Some(SafetyCap::Medium) => {
                if status == SystemStatus::Critical && !self.emergency_cap_active {
                    self.emergency_cap_active = true;
                    effects.engage_emergency_cap(SafetyCap::Medium);
                    outcome.cap = Some(SafetyCap::Medium);
                }
            }
            None => {}
        }
        outcome
    }

    /// Apply every recovery period elapsed since the last call, then check
    /// whether caps can be released. Returns the steps applied.
    ///
    /// The emergency cap releases once the score is strictly above the
    /// stable threshold; the policy cap once the score is back at 100.
    pub fn recovery_tick(&mut self, now_ms: u64, effects: &mut dyn SupervisorEffects) -> u64 {
        let period = self.stability.recovery_period_ms.max(1);
        let steps = now_ms.saturating_sub(self.last_recovery_ms) / period;
        if steps > 0 {
            self.last_recovery_ms += steps * period;
            self.score = (self.score + self.stability.recovery_rate * steps as f64).min(MAX_SCORE);
            self.publish_probability();
        }
        if self.emergency_cap_active && self.score > self.stability.stable_threshold {
            self.emergency_cap_active = false;
            effects.release_emergency_cap();
            info!(target: "axiomguard::supervisor", score = self.score, "stability restored; emergency cap released");
        }
        if self.policy_cap_active && self.score >= MAX_SCORE {
            self.policy_cap_active = false;
            effects.release_safety_cap();
            info!(target: "axiomguard::supervisor", "fully recovered; policy cap lifted");
        }
        steps
    }
}

/// Effects sink that records calls. Useful when only the control law matters.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RecordingEffects {
    pub corrections: Vec<(CorrectionKind, u64)>,
    pub caps: Vec<SafetyCap>,
    pub caps_released: u32,
    pub emergency_engaged: u32,
    pub emergency_released: u32,
}

impl SupervisorEffects for RecordingEffects {
    fn trigger_correction(&mut self, kind: CorrectionKind, now_ms: u64) -> TriggerOutcome {
        self.corrections.push((kind, now_ms));
        TriggerOutcome::Executed
    }

    fn set_safety_cap(&mut self, cap: SafetyCap) {
        self.caps.push(cap);
    }

    fn release_safety_cap(&mut self) {
        self.caps_released += 1;
    }

    fn engage_emergency_cap(&mut self, _cap: SafetyCap) {
        self.emergency_engaged += 1;
    }

    fn release_emergency_cap(&mut self) {
        self.emergency_released += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supervisor() -> (KernelSupervisor, Arc<SamplingGate>) {
        let config = KernelConfig::default();
        let gate = Arc::new(SamplingGate::new(0.0, Some(3)));
        let metrics = Arc::new(KernelMetrics::new());
        (
            KernelSupervisor::new(&config, Arc::clone(&gate), metrics, 0),
            gate,
        )
    }

    fn report(domain: DomainTag, severity: Severity, t: u64) -> ViolationReport {
        ViolationReport::new(domain, severity, "TEST", "x", t)
    }

    #[test]
    fn starts_stable_and_publishes_probability() {
        let (sup, gate) = supervisor();
        assert_eq!(sup.score(), 100.0);
        assert_eq!(sup.status(), SystemStatus::Stable);
        assert_eq!(gate.probability(), 0.05);
    }

    #[test]
    fn single_critical_costs_fifteen() {
        let (mut sup, _) = supervisor();
        let mut fx = RecordingEffects::default();
        let out = sup.handle_violation(&report(DomainTag::Status, Severity::Critical, 0), 0, &mut fx);
        assert_eq!(out.score, 85.0);
        assert_eq!(out.status, SystemStatus::Stable);
        assert_eq!(out.level, LogLevel::Error);
    }

    #[test]
    fn score_floors_at_zero() {
        let (mut sup, gate) = supervisor();
        let mut fx = RecordingEffects::default();
        for _ in 0..10 {
            sup.handle_violation(&report(DomainTag::Status, Severity::Critical, 0), 0, &mut fx);
        }
        assert_eq!(sup.score(), 0.0);
        assert_eq!(gate.probability(), 1.0);
    }

    #[test]
    fn recent_log_keeps_last_eight() {
        let (mut sup, _) = supervisor();
        let mut fx = RecordingEffects::default();
        for t in 0..12 {
            sup.handle_violation(&report(DomainTag::Status, Severity::Low, t), t, &mut fx);
        }
        let recent = sup.recent_violations();
        assert_eq!(recent.len(), 8);
        assert_eq!(recent[0].timestamp_ms, 4);
        assert_eq!(recent[7].source, "TEST:STATUS");
    }

    #[test]
    fn level_follows_policy_unless_critical() {
        let (mut sup, _) = supervisor();
        let mut fx = RecordingEffects::default();
        let warn = sup.handle_violation(&report(DomainTag::SpatialTopology, Severity::High, 0), 0, &mut fx);
        assert_eq!(warn.level, LogLevel::Warn);
        let err = sup.handle_violation(&report(DomainTag::Inventory, Severity::Low, 0), 0, &mut fx);
        assert_eq!(err.level, LogLevel::Error);
        let crit = sup.handle_violation(&report(DomainTag::RenderDepth, Severity::Critical, 0), 0, &mut fx);
        assert_eq!(crit.level, LogLevel::Error);
    }

    #[test]
    fn combat_policy_ignores_low_severity() {
        let (mut sup, _) = supervisor();
        let mut fx = RecordingEffects::default();
        let out = sup.handle_violation(&report(DomainTag::Combat, Severity::Low, 0), 0, &mut fx);
        assert!(out.policy_matched);
        assert_eq!(out.action, None);
        sup.handle_violation(&report(DomainTag::Combat, Severity::Medium, 0), 0, &mut fx);
        assert_eq!(fx.corrections, vec![(CorrectionKind::Combat, 0)]);
    }

    #[test]
    fn observe_mode_never_corrects() {
        let config = KernelConfig {
            mode: SupervisionMode::Observe,
            ..KernelConfig::default()
        };
        let gate = Arc::new(SamplingGate::new(0.0, Some(3)));
        let mut sup = KernelSupervisor::new(&config, gate, Arc::new(KernelMetrics::new()), 0);
        let mut fx = RecordingEffects::default();
        let out = sup.handle_violation(&report(DomainTag::SpatialTopology, Severity::High, 0), 0, &mut fx);
        assert!(fx.corrections.is_empty());
        assert_eq!(out.cap, Some(SafetyCap::High));
    }

    #[test]
    fn medium_cap_needs_critical_status() {
        let (mut sup, _) = supervisor();
        let mut fx = RecordingEffects::default();
        sup.handle_violation(&report(DomainTag::Geometry, Severity::High, 0), 0, &mut fx);
        assert_eq!(fx.emergency_engaged, 0);
        for _ in 0..5 {
            sup.handle_violation(&report(DomainTag::Geometry, Severity::High, 0), 0, &mut fx);
        }
        assert_eq!(sup.status(), SystemStatus::Critical);
        assert_eq!(fx.emergency_engaged, 1);
        sup.handle_violation(&report(DomainTag::Geometry, Severity::High, 0), 0, &mut fx);
        assert_eq!(fx.emergency_engaged, 1);
        assert!(sup.emergency_cap_active());
    }

    #[test]
    fn corrections_use_handling_time_not_report_time() {
        let (mut sup, _) = supervisor();
        let mut fx = RecordingEffects::default();
        sup.handle_violation(&report(DomainTag::Inventory, Severity::High, 7_000), 10_002, &mut fx);
        assert_eq!(fx.corrections, vec![(CorrectionKind::Inventory, 10_002)]);
        assert_eq!(sup.recent_violations()[0].timestamp_ms, 7_000);
    }

    #[test]
    fn policy_cap_lifts_only_at_full_recovery() {
        let (mut sup, _) = supervisor();
        let mut fx = RecordingEffects::default();
        sup.handle_violation(&report(DomainTag::SpatialTopology, Severity::Low, 0), 0, &mut fx);
        assert!(sup.policy_cap_active());
        assert_eq!(fx.caps, vec![SafetyCap::High]);
        sup.recovery_tick(0, &mut fx);
        assert_eq!(sup.status(), SystemStatus::Stable);
        assert!(sup.policy_cap_active());
        assert_eq!(fx.caps_released, 0);
        sup.recovery_tick(1_000, &mut fx);
        assert_eq!(sup.score(), 100.0);
        assert!(!sup.policy_cap_active());
        assert_eq!(fx.caps_released, 1);
        sup.recovery_tick(5_000, &mut fx);
        assert_eq!(fx.caps_released, 1);
    }

    #[test]
    fn emergency_cap_stays_at_exactly_stable_threshold() {
        let (mut sup, _) = supervisor();
        let mut fx = RecordingEffects::default();
        for _ in 0..6 {
            sup.handle_violation(&report(DomainTag::Geometry, Severity::High, 0), 0, &mut fx);
        }
        assert_eq!(sup.score(), 40.0);
        assert!(sup.emergency_cap_active());
        sup.recovery_tick(20_000, &mut fx);
        assert_eq!(sup.score(), 80.0);
        assert_eq!(sup.status(), SystemStatus::Stable);
        assert!(sup.emergency_cap_active());
        sup.recovery_tick(21_000, &mut fx);
        assert!(!sup.emergency_cap_active());
        assert_eq!(fx.emergency_released, 1);
    }

    #[test]
    fn recovery_catches_up_whole_periods_and_clamps() {
        let (mut sup, _) = supervisor();
        let mut fx = RecordingEffects::default();
        sup.handle_violation(&report(DomainTag::Status, Severity::High, 0), 0, &mut fx);
        assert_eq!(sup.recovery_tick(999, &mut fx), 0);
        assert_eq!(sup.score(), 90.0);
        assert_eq!(sup.recovery_tick(3_500, &mut fx), 3);
        assert_eq!(sup.score(), 96.0);
        assert_eq!(sup.recovery_tick(4_000, &mut fx), 1);
        assert_eq!(sup.score(), 98.0);
        sup.recovery_tick(60_000, &mut fx);
        assert_eq!(sup.score(), 100.0);
    }
}
