//! Integration test: stability control loop through the full kernel.
//!
//! Validates that:
//! 1. A single CRITICAL violation costs exactly 15 points and stays STABLE.
//! 2. Recovery is monotone at the fixed rate and clamps at 100.
//! 3. The emergency MEDIUM cap engages at CRITICAL and holds through the
//!    UNSTABLE band until the score exceeds the STABLE threshold.
//! 4. Five HIGH reports from KERNEL:SPATIAL_TOPOLOGY 200ms apart move the
//!    status STABLE -> UNSTABLE, fire SPATIAL once, and cap quality at HIGH.
//! 5. Direct SPATIAL triggers inside the cooldown execute once.
//! 6. Correction cooldowns and the inventory lock window run on the tick's
//!    wall clock, even for reports stamped long before they are drained.
//! 7. The HIGH policy cap is lifted once the score fully recovers, after
//!    which quality climbs back to ULTRA.
//!
//! Run: cargo test -p axiomguard-kernel --test control_loop_test

use axiomguard_kernel::{
    Clock, CorrectionKind, DomainTag, KernelConfig, ManualClock, QualityDecision, QualityTier, RealityKernel,
    SandboxWorld, Severity, SystemStatus, TriggerOutcome, ViolationReport,
};

fn kernel_at(clock: &ManualClock) -> RealityKernel {
    let mut config = KernelConfig::default();
    config.sampling.seed = Some(11);
    RealityKernel::without_worker(config, clock.now_ms()).expect("default config is valid")
}

fn report(source: &str, severity: Severity, now: u64) -> ViolationReport {
    ViolationReport::from_source_str(source, severity, "injected", now).expect("known domain")
}

#[test]
fn single_critical_violation_costs_fifteen() {
    let clock = ManualClock::starting_at(0);
    let mut kernel = kernel_at(&clock);
    let mut world = SandboxWorld::new();
    kernel.publish(report("SIM:STATUS", Severity::Critical, 0));
    let tick = kernel.tick(0, &mut world);
    assert_eq!(tick.violations.len(), 1);
    assert_eq!(kernel.supervisor().score(), 85.0);
    assert_eq!(kernel.supervisor().status(), SystemStatus::Stable);
}

#[test]
fn recovery_is_monotone_and_clamped() {
    let clock = ManualClock::starting_at(0);
    let mut kernel = kernel_at(&clock);
    let mut world = SandboxWorld::new();
    for _ in 0..3 {
        kernel.publish(report("SIM:STATUS", Severity::Critical, 0));
    }
    kernel.tick(0, &mut world);
    assert_eq!(kernel.supervisor().score(), 55.0);

    let mut previous = kernel.supervisor().score();
    for _ in 0..30 {
        let now = clock.advance(1_000);
        kernel.tick(now, &mut world);
        let score = kernel.supervisor().score();
        assert!(score >= previous);
        assert!(score - previous <= 2.0 + f64::EPSILON);
        previous = score;
    }
    assert_eq!(previous, 100.0);
}

#[test]
fn emergency_cap_has_hysteresis() {
    let clock = ManualClock::starting_at(0);
    let mut kernel = kernel_at(&clock);
    let mut world = SandboxWorld::new();

    for _ in 0..6 {
        kernel.publish(report("VERIFY:GEOMETRY", Severity::High, 0));
    }
    kernel.tick(0, &mut world);
    assert_eq!(kernel.supervisor().status(), SystemStatus::Critical);
    assert!(kernel.supervisor().emergency_cap_active());
    assert_eq!(kernel.quality().ceiling(), QualityTier::Medium);
    assert_eq!(kernel.quality().current_tier(), QualityTier::Medium);

    let mut saw_unstable_with_cap = false;
    loop {
        let now = clock.advance(1_000);
        kernel.tick(now, &mut world);
        let sup = kernel.supervisor();
        match sup.status() {
            SystemStatus::Unstable => {
                assert!(sup.emergency_cap_active(), "cap released at score {}", sup.score());
                saw_unstable_with_cap = true;
            }
            SystemStatus::Stable if sup.score() == 80.0 => {
                assert!(sup.emergency_cap_active(), "cap released at the threshold itself");
            }
            SystemStatus::Stable => {
                assert!(!sup.emergency_cap_active());
                assert_eq!(sup.score(), 82.0);
                break;
            }
            SystemStatus::Critical => assert!(sup.emergency_cap_active()),
        }
    }
    assert!(saw_unstable_with_cap);
    assert_eq!(kernel.quality().ceiling(), QualityTier::Ultra);
    let snap = kernel.metrics().snapshot();
    assert_eq!(snap.emergency_caps_engaged, 1);
    assert_eq!(snap.emergency_caps_released, 1);
}

#[test]
fn spatial_topology_scenario() {
    let clock = ManualClock::starting_at(0);
    let mut kernel = kernel_at(&clock);
    let mut world = SandboxWorld::new();
    let mut statuses = vec![kernel.supervisor().status()];

    for i in 0..5 {
        let now = if i == 0 { clock.now_ms() } else { clock.advance(200) };
        kernel.publish(report("KERNEL:SPATIAL_TOPOLOGY", Severity::High, now));
        kernel.tick(now, &mut world);
        let status = kernel.supervisor().status();
        if statuses.last() != Some(&status) {
            statuses.push(status);
        }
    }

    assert_eq!(statuses, vec![SystemStatus::Stable, SystemStatus::Unstable]);
    assert_eq!(kernel.supervisor().score(), 50.0);
    assert_eq!(kernel.corrector().executions(CorrectionKind::Spatial), 1);
    assert_eq!(world.spatial_rebuilds, 1);
    assert_eq!(kernel.quality().ceiling(), QualityTier::High);
    assert_eq!(kernel.quality().current_tier(), QualityTier::High);
    assert!(!kernel.supervisor().emergency_cap_active());

    let diag = kernel.diagnostics();
    assert_eq!(diag.corrections.len(), 1);
    assert_eq!(diag.recent_violations.len(), 5);
    assert_eq!(diag.metrics.corrections_debounced, 4);
    assert_eq!(
        diag.recent_violations[0].source,
        format!("KERNEL:{}", DomainTag::SpatialTopology)
    );
}

#[test]
fn direct_spatial_trigger_is_debounced() {
    let clock = ManualClock::starting_at(1_000);
    let mut kernel = kernel_at(&clock);
    let mut world = SandboxWorld::new();
    assert_eq!(
        kernel.trigger_correction("SPATIAL", &mut world, clock.now_ms()),
        TriggerOutcome::Executed
    );
    let later = clock.advance(4_999);
    assert!(matches!(
        kernel.trigger_correction("SPATIAL", &mut world, later),
        TriggerOutcome::Debounced { remaining_ms: 1 }
    ));
    assert_eq!(world.spatial_rebuilds, 1);
    assert_eq!(
        kernel.trigger_correction("TELEPORT", &mut world, later),
        TriggerOutcome::Unknown
    );
}

#[test]
fn observe_mode_scores_without_correcting() {
    let config = KernelConfig::from_json_str(r#"{ "mode": "observe" }"#).unwrap();
    let mut kernel = RealityKernel::without_worker(config, 0).unwrap();
    let mut world = SandboxWorld::new();
    kernel.publish(report("KERNEL:SPATIAL_TOPOLOGY", Severity::High, 0));
    kernel.tick(0, &mut world);
    assert_eq!(kernel.supervisor().score(), 90.0);
    assert_eq!(world.spatial_rebuilds, 0);
    assert_eq!(kernel.quality().ceiling(), QualityTier::High);
}

#[test]
fn quality_collapse_feeds_back_into_supervisor() {
    let clock = ManualClock::starting_at(0);
    let mut kernel = kernel_at(&clock);
    let mut world = SandboxWorld::new();
    for _ in 0..30 {
        kernel.quality_mut().record_frame(50.0);
    }
    let first = kernel.tick(0, &mut world);
    assert_eq!(kernel.quality().current_tier(), QualityTier::Emergency);
    assert!(first.violations.is_empty());

    let second = kernel.tick(clock.advance(16), &mut world);
    assert_eq!(second.violations.len(), 1);
    let (report, outcome) = &second.violations[0];
    assert_eq!(report.source(), "ADAPTIVE_QUALITY:RENDER");
    assert_eq!(outcome.score, 85.0);
    assert!(matches!(
        outcome.action,
        Some((CorrectionKind::Render, TriggerOutcome::Executed))
    ));
}

#[test]
fn stale_reports_are_debounced_on_the_tick_clock() {
    let clock = ManualClock::starting_at(0);
    let mut kernel = kernel_at(&clock);
    let mut world = SandboxWorld::new();

    kernel.publish(report("KERNEL:SPATIAL_TOPOLOGY", Severity::Low, 0));
    clock.set(10_000);
    kernel.tick(clock.now_ms(), &mut world);
    kernel.publish(report("KERNEL:SPATIAL_TOPOLOGY", Severity::Low, 10_000));
    kernel.tick(clock.advance(1), &mut world);
    assert_eq!(kernel.corrector().executions(CorrectionKind::Spatial), 1);
    assert_eq!(world.spatial_rebuilds, 1);
    assert_eq!(kernel.corrector().last_run_ms(CorrectionKind::Spatial), Some(10_000));

    kernel.publish(report("SIM:INVENTORY", Severity::High, 7_000));
    kernel.tick(clock.advance(1), &mut world);
    assert!(world.inventory_locked);
    kernel.tick(clock.advance(1_999), &mut world);
    assert!(world.inventory_locked);
    kernel.tick(clock.advance(1), &mut world);
    assert!(!world.inventory_locked);
}

#[test]
fn policy_cap_lifts_after_full_recovery() {
    let clock = ManualClock::starting_at(0);
    let mut kernel = kernel_at(&clock);
    let mut world = SandboxWorld::new();
    // A SIM origin keeps the upgrade hold out of the picture.
    kernel.publish(report("SIM:SPATIAL_TOPOLOGY", Severity::Low, 0));
    kernel.tick(0, &mut world);
    assert_eq!(kernel.supervisor().status(), SystemStatus::Stable);
    assert_eq!(kernel.quality().ceiling(), QualityTier::High);
    assert_eq!(kernel.quality().current_tier(), QualityTier::High);

    for _ in 0..60 {
        kernel.quality_mut().record_frame(10.0);
    }
    let tick = kernel.tick(clock.advance(1_000), &mut world);
    assert_eq!(kernel.supervisor().score(), 100.0);
    assert!(!kernel.supervisor().policy_cap_active());
    assert_eq!(kernel.quality().ceiling(), QualityTier::Ultra);
    assert_eq!(
        tick.quality,
        QualityDecision::Upgraded {
            from: QualityTier::High,
            to: QualityTier::Ultra
        }
    );
}
