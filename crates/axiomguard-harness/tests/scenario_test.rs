//! Integration test: end-to-end scenarios and their JSONL output.
//!
//! Validates that:
//! 1. Every offline scenario passes all of its checks on the default config.
//! 2. The live-worker scenario passes with a real background thread.
//! 3. Every record a scenario writes satisfies the log schema.
//! 4. Violation records carry score, status, severity and source.
//! 5. A config that breaks the expected arithmetic makes checks fail
//!    instead of erroring.
//!
//! Run: cargo test -p axiomguard-harness --test scenario_test

use axiomguard_harness::structured_log::validate_log_line;
use axiomguard_harness::{LogEmitter, Outcome, Scenario, run_scenario};
use axiomguard_kernel::{KernelConfig, SystemStatus};

fn assert_passes(scenario: Scenario) -> LogEmitter {
    let mut log = LogEmitter::to_buffer(scenario.as_str());
    let report = run_scenario(scenario, &KernelConfig::default(), &mut log).unwrap();
    assert!(
        report.passed,
        "{} failed: {:?}",
        scenario.as_str(),
        report.failed_checks()
    );
    log
}

#[test]
fn offline_scenarios_pass() {
    for scenario in Scenario::ALL {
        if scenario == Scenario::FormalWorker {
            continue;
        }
        assert_passes(scenario);
    }
}

#[test]
fn formal_worker_scenario_passes() {
    assert_passes(Scenario::FormalWorker);
}

#[test]
fn scenario_records_validate() {
    let log = assert_passes(Scenario::CriticalRecovery);
    assert!(log.entries().len() > 2);
    for (i, entry) in log.entries().iter().enumerate() {
        let line = entry.to_jsonl().unwrap();
        if let Err(errors) = validate_log_line(&line, i + 1) {
            panic!("line {} invalid: {errors:?}", i + 1);
        }
    }
    assert_eq!(log.entries()[0].event, "scenario_start");
    let last = log.entries().last().unwrap();
    assert_eq!(last.event, "scenario_end");
    assert_eq!(last.outcome, Some(Outcome::Pass));
    assert_eq!(last.status, Some(SystemStatus::Stable));
}

#[test]
fn violation_records_carry_stability_fields() {
    let log = assert_passes(Scenario::SpatialTopology);
    let violations: Vec<_> = log
        .entries()
        .iter()
        .filter(|e| e.event == "violation")
        .collect();
    assert_eq!(violations.len(), 5);
    let scores: Vec<f64> = violations.iter().filter_map(|e| e.score).collect();
    assert_eq!(scores, vec![90.0, 80.0, 70.0, 60.0, 50.0]);
    assert!(
        violations
            .iter()
            .all(|e| e.source.as_deref() == Some("KERNEL:SPATIAL_TOPOLOGY"))
    );
    assert_eq!(violations[1].status, Some(SystemStatus::Stable));
    assert_eq!(violations[2].status, Some(SystemStatus::Unstable));
}

#[test]
fn altered_weights_fail_checks_without_erroring() {
    let config = KernelConfig::from_json_str(r#"{ "severity_weights": { "high": 5.0 } }"#).unwrap();
    let mut log = LogEmitter::to_buffer("altered");
    let report = run_scenario(Scenario::SpatialTopology, &config, &mut log).unwrap();
    assert!(!report.passed);
    assert!(report.failed_checks().iter().any(|c| c.name == "score"));
    assert_eq!(report.final_score, 75.0);
    assert_eq!(log.entries().last().unwrap().outcome, Some(Outcome::Fail));
}

#[test]
fn scenario_names_parse_loosely() {
    assert_eq!(
        Scenario::parse("Quality_Collapse").unwrap(),
        Scenario::QualityCollapse
    );
    assert!(Scenario::parse("teleport").is_err());
}
