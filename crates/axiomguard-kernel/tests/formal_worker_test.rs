//! Integration test: formal checks through the background worker.
//!
//! Validates that:
//! 1. A failing spatial-topology check comes back as a HIGH violation from
//!    KERNEL:SPATIAL_TOPOLOGY and is scored by the supervisor.
//! 2. A malformed payload becomes a CRITICAL WORKER_FAULT report and the
//!    worker keeps serving requests afterwards.
//! 3. Passing checks update domain metrics without publishing anything.
//! 4. `off` mode dispatches nothing.
//!
//! Run: cargo test -p axiomguard-kernel --test formal_worker_test

use std::thread;
use std::time::Duration;

use axiomguard_kernel::{
    DomainTag, FormalCheck, FormalDispatch, KernelConfig, RealityKernel, SandboxWorld, Severity,
    SupervisionMode, TickReport, Waypoint,
};

fn always_sampled() -> KernelConfig {
    let mut config = KernelConfig::default();
    config.sampling.stable = 1.0;
    config.sampling.unstable = 1.0;
    config
}

/// Tick until the worker has answered `expected` requests.
fn tick_until_answered(
    kernel: &mut RealityKernel,
    world: &mut SandboxWorld,
    expected: usize,
) -> Vec<TickReport> {
    let mut ticks = Vec::new();
    let mut answered = 0;
    for step in 0..400_u64 {
        let tick = kernel.tick(step * 5, world);
        answered += tick.responses.len();
        ticks.push(tick);
        if answered >= expected {
            return ticks;
        }
        thread::sleep(Duration::from_millis(5));
    }
    panic!("worker answered {answered} of {expected} requests");
}

#[test]
fn dense_spatial_index_is_reported_and_corrected() {
    let mut kernel = RealityKernel::new(always_sampled(), 0).unwrap();
    let mut world = SandboxWorld::new();
    let dispatched = kernel.verify_formal(
        FormalCheck::SpatialTopology {
            cell_count: 4,
            entity_count: 320,
        },
        0,
    );
    assert_eq!(dispatched, FormalDispatch::Dispatched);

    let ticks = tick_until_answered(&mut kernel, &mut world, 1);
    let (report, outcome) = ticks
        .iter()
        .flat_map(|t| t.violations.iter())
        .next()
        .expect("violation scored in the same tick as the response");
    assert_eq!(report.source(), "KERNEL:SPATIAL_TOPOLOGY");
    assert_eq!(report.severity, Severity::High);
    assert!(report.message.contains("80.00"));
    assert_eq!(outcome.score, 90.0);
    assert_eq!(world.spatial_rebuilds, 1);
    assert_eq!(kernel.engine().pending_formal(), 0);

    let m = kernel.engine().domain_metrics(DomainTag::SpatialTopology);
    assert_eq!((m.checks, m.failures), (1, 1));
}

#[test]
fn worker_fault_is_critical_and_worker_survives() {
    let mut kernel = RealityKernel::new(always_sampled(), 0).unwrap();
    let mut world = SandboxWorld::new();
    kernel.verify_formal(
        FormalCheck::PathContinuity {
            waypoints: vec![Waypoint::new(0.0, 0.0)],
            grid_size: -1.0,
        },
        0,
    );
    kernel.verify_formal(
        FormalCheck::RenderDepth {
            depths: vec![0.0, 1.0, 2.0],
        },
        0,
    );

    let ticks = tick_until_answered(&mut kernel, &mut world, 2);
    let violations: Vec<_> = ticks.iter().flat_map(|t| t.violations.iter()).collect();
    assert_eq!(violations.len(), 1);
    let (report, _) = violations[0];
    assert_eq!(report.severity, Severity::Critical);
    assert!(report.message.starts_with("WORKER_FAULT"));
    assert_eq!(report.domain, DomainTag::PathContinuity);
    assert_eq!(kernel.supervisor().score(), 85.0);

    let depth = kernel.engine().domain_metrics(DomainTag::RenderDepth);
    assert_eq!((depth.checks, depth.failures), (1, 0));
    assert_eq!(kernel.metrics().snapshot().worker_faults, 1);
}

#[test]
fn off_mode_dispatches_nothing() {
    let mut config = always_sampled();
    config.mode = SupervisionMode::Off;
    let mut kernel = RealityKernel::new(config, 0).unwrap();
    let out = kernel.verify_formal(FormalCheck::RenderDepth { depths: vec![2.0, 1.0] }, 0);
    assert_eq!(out, FormalDispatch::Gated);
    assert_eq!(kernel.engine().pending_formal(), 0);
}
