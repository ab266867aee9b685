//! End-to-end supervision scenarios.
//!
//! Each scenario drives a [`RealityKernel`] against a [`SandboxWorld`] on a
//! manual clock, logs every scored violation as a JSONL record, and checks
//! the externally visible outcome: score, status path, corrections run,
//! quality ceiling.

use std::thread;
use std::time::Duration;

use axiomguard_core::{LabeledRect, Rect};
use axiomguard_kernel::{
    Clock, CombatTransaction, CorrectionKind, DiagnosticsSnapshot, EntityState, FormalCheck,
    KernelConfig, ManualClock, QualityDecision, QualityTier, RealityKernel, SandboxWorld, Severity,
    SystemStatus, TickReport, ViolationReport, Waypoint,
};
use serde::Serialize;

use crate::HarnessError;
use crate::structured_log::{LogEmitter, LogLevel, Outcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    /// Five HIGH spatial-topology reports 200ms apart.
    SpatialTopology,
    /// Overlapping zones caught by the inline geometry axiom.
    GeometryOverlap,
    /// A combat step whose health does not add up.
    CombatDesync,
    /// Frame rate collapse and recovery of the quality ladder.
    QualityCollapse,
    /// Drive the score into CRITICAL and let it recover.
    CriticalRecovery,
    /// Formal checks through the live background worker.
    FormalWorker,
}

impl Scenario {
    pub const ALL: [Scenario; 6] = [
        Self::SpatialTopology,
        Self::GeometryOverlap,
        Self::CombatDesync,
        Self::QualityCollapse,
        Self::CriticalRecovery,
        Self::FormalWorker,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SpatialTopology => "spatial-topology",
            Self::GeometryOverlap => "geometry-overlap",
            Self::CombatDesync => "combat-desync",
            Self::QualityCollapse => "quality-collapse",
            Self::CriticalRecovery => "critical-recovery",
            Self::FormalWorker => "formal-worker",
        }
    }

    pub fn parse(s: &str) -> Result<Self, HarnessError> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|sc| sc.as_str() == normalized)
            .ok_or_else(|| HarnessError::UnknownScenario(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioCheck {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub scenario: Scenario,
    pub passed: bool,
    pub checks: Vec<ScenarioCheck>,
    pub final_score: f64,
    pub final_status: SystemStatus,
    pub status_path: Vec<SystemStatus>,
    pub diagnostics: DiagnosticsSnapshot,
}

impl ScenarioReport {
    #[must_use]
    pub fn failed_checks(&self) -> Vec<&ScenarioCheck> {
        self.checks.iter().filter(|c| !c.passed).collect()
    }
}

/// Kernel, world and clock for one scenario run, plus the log sink.
struct Driver<'a> {
    kernel: RealityKernel,
    world: SandboxWorld,
    clock: ManualClock,
    log: &'a mut LogEmitter,
    checks: Vec<ScenarioCheck>,
    status_path: Vec<SystemStatus>,
}

impl<'a> Driver<'a> {
    fn new(kernel: RealityKernel, world: SandboxWorld, clock: ManualClock, log: &'a mut LogEmitter) -> Self {
        let status_path = vec![kernel.supervisor().status()];
        Self {
            kernel,
            world,
            clock,
            log,
            checks: Vec::new(),
            status_path,
        }
    }

    fn tick(&mut self) -> std::io::Result<TickReport> {
        let now = self.clock.now_ms();
        let report = self.kernel.tick(now, &mut self.world);
        for (violation, outcome) in &report.violations {
            let entry = self
                .log
                .entry(LogLevel::from(outcome.level), "violation")
                .at(now)
                .with_stability(outcome.score, outcome.status)
                .with_violation(violation.severity, violation.source())
                .with_details(serde_json::json!({
                    "message": violation.message,
                    "policy_matched": outcome.policy_matched,
                    "action": outcome.action,
                    "cap": outcome.cap,
                }));
            self.log.emit_entry(entry)?;
        }
        if let QualityDecision::Emergency { from }
        | QualityDecision::Downgraded { from, .. }
        | QualityDecision::Upgraded { from, .. } = report.quality
        {
            let entry = self
                .log
                .entry(LogLevel::Info, "quality_change")
                .at(now)
                .with_details(serde_json::json!({
                    "from": from,
                    "to": self.kernel.quality().current_tier(),
                }));
            self.log.emit_entry(entry)?;
        }
        let status = self.kernel.supervisor().status();
        if self.status_path.last() != Some(&status) {
            self.status_path.push(status);
        }
        Ok(report)
    }

    fn check(&mut self, name: &str, passed: bool, detail: impl Into<String>) {
        self.checks.push(ScenarioCheck {
            name: name.to_string(),
            passed,
            detail: detail.into(),
        });
    }

    fn check_eq<T: PartialEq + std::fmt::Debug>(&mut self, name: &str, actual: T, expected: T) {
        let passed = actual == expected;
        self.check(name, passed, format!("expected {expected:?}, got {actual:?}"));
    }

    fn finish(self, scenario: Scenario) -> std::io::Result<ScenarioReport> {
        let passed = self.checks.iter().all(|c| c.passed);
        let sup = self.kernel.supervisor();
        let report = ScenarioReport {
            scenario,
            passed,
            final_score: sup.score(),
            final_status: sup.status(),
            status_path: self.status_path,
            diagnostics: self.kernel.diagnostics(),
            checks: self.checks,
        };
        let entry = self
            .log
            .entry(
                if passed { LogLevel::Info } else { LogLevel::Error },
                "scenario_end",
            )
            .at(self.clock.now_ms())
            .with_stability(report.final_score, report.final_status)
            .with_outcome(Outcome::from_bool(passed))
            .with_details(serde_json::json!({
                "scenario": scenario.as_str(),
                "failed": report.failed_checks(),
            }));
        self.log.emit_entry(entry)?;
        Ok(report)
    }
}

/// Run one scenario against a fresh kernel built from `config`.
pub fn run_scenario(
    scenario: Scenario,
    config: &KernelConfig,
    log: &mut LogEmitter,
) -> Result<ScenarioReport, HarnessError> {
    let entry = log
        .entry(LogLevel::Info, "scenario_start")
        .with_details(serde_json::json!({ "scenario": scenario.as_str() }));
    log.emit_entry(entry)?;

    let report = match scenario {
        Scenario::SpatialTopology => spatial_topology(config, log)?,
        Scenario::GeometryOverlap => geometry_overlap(config, log)?,
        Scenario::CombatDesync => combat_desync(config, log)?,
        Scenario::QualityCollapse => quality_collapse(config, log)?,
        Scenario::CriticalRecovery => critical_recovery(config, log)?,
        Scenario::FormalWorker => formal_worker(config, log)?,
    };
    log.flush()?;
    Ok(report)
}

fn offline_driver<'a>(
    config: &KernelConfig,
    world: SandboxWorld,
    log: &'a mut LogEmitter,
) -> Result<Driver<'a>, HarnessError> {
    let clock = ManualClock::starting_at(0);
    let kernel = RealityKernel::without_worker(config.clone(), clock.now_ms())?;
    Ok(Driver::new(kernel, world, clock, log))
}

fn injected(source: &str, severity: Severity, now_ms: u64) -> Result<ViolationReport, HarnessError> {
    ViolationReport::from_source_str(source, severity, "injected by scenario", now_ms)
        .ok_or_else(|| HarnessError::UnknownSource(source.to_string()))
}

fn spatial_topology(config: &KernelConfig, log: &mut LogEmitter) -> Result<ScenarioReport, HarnessError> {
    let mut d = offline_driver(config, SandboxWorld::new(), log)?;
    for i in 0..5 {
        let now = if i == 0 { d.clock.now_ms() } else { d.clock.advance(200) };
        d.kernel
            .publish(injected("KERNEL:SPATIAL_TOPOLOGY", Severity::High, now)?);
        d.tick()?;
    }

    let path = d.status_path.clone();
    d.check_eq(
        "status_path",
        path,
        vec![SystemStatus::Stable, SystemStatus::Unstable],
    );
    let score = d.kernel.supervisor().score();
    d.check_eq("score", score, 50.0);
    let spatial = d.kernel.corrector().executions(CorrectionKind::Spatial);
    d.check_eq("spatial_corrections", spatial, 1);
    let ceiling = d.kernel.quality().ceiling();
    d.check_eq("quality_ceiling", ceiling, QualityTier::High);
    let emergency = d.kernel.supervisor().emergency_cap_active();
    d.check_eq("emergency_cap", emergency, false);
    Ok(d.finish(Scenario::SpatialTopology)?)
}

fn geometry_overlap(config: &KernelConfig, log: &mut LogEmitter) -> Result<ScenarioReport, HarnessError> {
    let world = SandboxWorld::new().with_entities(vec![
        EntityState::new(1, 10.0, 10.0, 50.0, 50.0),
        EntityState::new(2, 900.0, 0.0, 50.0, 50.0),
        EntityState::new(3, 0.0, 1_200.0, 80.0, 80.0).persistent(),
    ]);
    let mut d = offline_driver(config, world, log)?;
    let now = d.clock.now_ms();

    let clean = [
        LabeledRect::new("market", Rect::new(0.0, 0.0, 10.0, 10.0)),
        LabeledRect::new("harbor", Rect::new(10.0, 0.0, 20.0, 10.0)),
    ];
    let ok = d.kernel.engine_mut().verify_non_overlap(&clean, now);
    d.check_eq("edge_touching_zones_valid", ok.is_valid, true);

    let overlapping = [
        LabeledRect::new("market", Rect::new(0.0, 0.0, 10.0, 10.0)),
        LabeledRect::new("plaza", Rect::new(5.0, 5.0, 15.0, 15.0)),
    ];
    let bad = d.kernel.engine_mut().verify_non_overlap(&overlapping, now);
    d.check_eq("overlap_detected", bad.is_valid, false);

    let tick = d.tick()?;
    let sources: Vec<String> = tick.violations.iter().map(|(v, _)| v.source()).collect();
    d.check_eq("violation_sources", sources, vec!["VERIFY:GEOMETRY".to_string()]);
    let score = d.kernel.supervisor().score();
    d.check_eq("score", score, 90.0);
    let rebuilds = d.world.spatial_rebuilds;
    d.check_eq("spatial_rebuilds", rebuilds, 1);
    let survivors: Vec<u64> = d.world.entities.iter().map(|e| e.id).collect();
    d.check_eq("culled_far_transients", survivors, vec![1, 3]);
    Ok(d.finish(Scenario::GeometryOverlap)?)
}

fn combat_desync(config: &KernelConfig, log: &mut LogEmitter) -> Result<ScenarioReport, HarnessError> {
    let world = SandboxWorld::new().with_entities(vec![
        EntityState::new(7, 0.0, 0.0, 150.0, 100.0),
        EntityState::new(8, 0.0, 0.0, 40.0, 100.0),
    ]);
    let mut d = offline_driver(config, world, log)?;
    let now = d.clock.now_ms();

    let legal = CombatTransaction {
        old_hp: 100.0,
        damage: 30.0,
        new_hp: 70.0,
    };
    let ok = d.kernel.engine_mut().verify_combat_transaction(legal, now);
    d.check_eq("legal_step_valid", ok.is_valid, true);

    let desync = CombatTransaction {
        old_hp: 100.0,
        damage: 30.0,
        new_hp: 80.0,
    };
    let bad = d.kernel.engine_mut().verify_combat_transaction(desync, now);
    let severities: Vec<Severity> = bad.errors.iter().map(|e| e.severity).collect();
    d.check_eq("desync_severity", severities, vec![Severity::Critical]);

    d.tick()?;
    let score = d.kernel.supervisor().score();
    d.check_eq("score", score, 85.0);
    let combat = d.kernel.corrector().executions(CorrectionKind::Combat);
    d.check_eq("combat_corrections", combat, 1);
    let hps: Vec<f64> = d.world.entities.iter().map(|e| e.hp).collect();
    d.check_eq("hp_clamped", hps, vec![100.0, 40.0]);
    Ok(d.finish(Scenario::CombatDesync)?)
}

fn quality_collapse(config: &KernelConfig, log: &mut LogEmitter) -> Result<ScenarioReport, HarnessError> {
    let mut d = offline_driver(config, SandboxWorld::new(), log)?;
    let window = config.quality.frame_window.max(1);

    for _ in 0..window {
        d.kernel.quality_mut().record_frame(50.0);
    }
    d.tick()?;
    let tier = d.kernel.quality().current_tier();
    d.check_eq("emergency_tier", tier, QualityTier::Emergency);

    d.clock.advance(16);
    let tick = d.tick()?;
    let sources: Vec<String> = tick.violations.iter().map(|(v, _)| v.source()).collect();
    d.check_eq(
        "collapse_reported",
        sources,
        vec!["ADAPTIVE_QUALITY:RENDER".to_string()],
    );
    let score = d.kernel.supervisor().score();
    d.check_eq("score", score, 85.0);

    for _ in 0..window {
        d.kernel.quality_mut().record_frame(10.0);
    }
    d.clock.advance(config.quality.adjustment_cooldown_ms);
    let tick = d.tick()?;
    d.check_eq(
        "upgrade_after_cooldown",
        tick.quality,
        QualityDecision::Upgraded {
            from: QualityTier::Emergency,
            to: QualityTier::Low,
        },
    );
    Ok(d.finish(Scenario::QualityCollapse)?)
}

fn critical_recovery(config: &KernelConfig, log: &mut LogEmitter) -> Result<ScenarioReport, HarnessError> {
    let mut d = offline_driver(config, SandboxWorld::new(), log)?;
    for _ in 0..6 {
        d.kernel
            .publish(injected("VERIFY:GEOMETRY", Severity::High, 0)?);
    }
    d.tick()?;
    let status = d.kernel.supervisor().status();
    d.check_eq("collapsed", status, SystemStatus::Critical);
    let ceiling = d.kernel.quality().ceiling();
    d.check_eq("emergency_ceiling", ceiling, QualityTier::Medium);

    let period = config.stability.recovery_period_ms.max(1);
    let mut released_early = false;
    for _ in 0..200 {
        d.clock.advance(period);
        d.tick()?;
        let sup = d.kernel.supervisor();
        if sup.status() != SystemStatus::Stable && !sup.emergency_cap_active() {
            released_early = true;
        }
        if !sup.emergency_cap_active() {
            break;
        }
    }
    d.check("cap_held_until_stable", !released_early, "emergency cap never released below STABLE");
    let score = d.kernel.supervisor().score();
    d.check(
        "released_above_threshold",
        score > config.stability.stable_threshold,
        format!("released at score {score}"),
    );
    let path = d.status_path.clone();
    d.check_eq(
        "status_path",
        path,
        vec![
            SystemStatus::Stable,
            SystemStatus::Critical,
            SystemStatus::Unstable,
            SystemStatus::Stable,
        ],
    );
    let emergency = d.kernel.supervisor().emergency_cap_active();
    d.check_eq("cap_released", emergency, false);
    let ceiling = d.kernel.quality().ceiling();
    d.check_eq("ceiling_restored", ceiling, QualityTier::Ultra);
    Ok(d.finish(Scenario::CriticalRecovery)?)
}

fn formal_worker(config: &KernelConfig, log: &mut LogEmitter) -> Result<ScenarioReport, HarnessError> {
    let mut config = config.clone();
    config.sampling.stable = 1.0;
    config.sampling.unstable = 1.0;
    let clock = ManualClock::starting_at(0);
    let kernel = RealityKernel::new(config, clock.now_ms())?;
    let mut d = Driver::new(kernel, SandboxWorld::new(), clock, log);
    let now = d.clock.now_ms();

    let checks = [
        FormalCheck::SpatialTopology {
            cell_count: 4,
            entity_count: 320,
        },
        FormalCheck::PathContinuity {
            waypoints: vec![Waypoint::new(0.0, 0.0), Waypoint::new(1.0, 0.0)],
            grid_size: -1.0,
        },
        FormalCheck::RenderDepth {
            depths: vec![0.5, 1.0, 4.0],
        },
    ];
    let expected = checks.len();
    for check in checks {
        d.kernel.verify_formal(check, now);
    }

    let mut answered = 0;
    let mut scored = Vec::new();
    for _ in 0..400 {
        let tick = d.tick()?;
        answered += tick.responses.len();
        scored.extend(tick.violations.into_iter().map(|(v, _)| v));
        if answered >= expected {
            break;
        }
        thread::sleep(Duration::from_millis(5));
        d.clock.advance(5);
    }
    d.check_eq("responses", answered, expected);

    let dense = scored
        .iter()
        .any(|v| v.source() == "KERNEL:SPATIAL_TOPOLOGY" && v.severity == Severity::High);
    d.check("dense_cell_reported", dense, "HIGH from KERNEL:SPATIAL_TOPOLOGY");
    let fault = scored
        .iter()
        .any(|v| v.severity == Severity::Critical && v.message.starts_with("WORKER_FAULT"));
    d.check("fault_reported", fault, "CRITICAL WORKER_FAULT report");
    d.check_eq("violations", scored.len(), 2);
    let faults = d.kernel.metrics().snapshot().worker_faults;
    d.check_eq("worker_faults", faults, 1);
    let score = d.kernel.supervisor().score();
    d.check_eq("score", score, 75.0);
    Ok(d.finish(Scenario::FormalWorker)?)
}
