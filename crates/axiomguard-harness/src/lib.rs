//! Scenario and statistics harness for axiomguard.
//!
//! This crate provides:
//! - Severity scripts: deterministic score trajectories from a list of severities
//! - Scenarios: end-to-end kernel runs against an in-memory world
//! - Gate statistics: observed vs configured sampling rates
//! - Structured logging: JSONL records every run writes, plus a validator

#![forbid(unsafe_code)]

pub mod sampling;
pub mod scenario;
pub mod script;
pub mod structured_log;

use thiserror::Error;

pub use sampling::{GateSample, sample_gate};
pub use scenario::{Scenario, ScenarioCheck, ScenarioReport, run_scenario};
pub use structured_log::{LogEmitter, LogEntry, LogLevel, Outcome};

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Kernel(#[from] axiomguard_kernel::KernelError),

    #[error(transparent)]
    Config(#[from] axiomguard_kernel::ConfigError),

    #[error("log output failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown scenario '{0}'")]
    UnknownScenario(String),

    #[error("unknown severity '{0}'")]
    BadSeverity(String),

    #[error("unrecognized violation source '{0}'")]
    UnknownSource(String),
}
