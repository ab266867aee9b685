//! # axiomguard-kernel
//!
//! Runtime invariant supervision for a real-time simulation loop.
//!
//! Simulation systems hand domain contexts to the [`VerificationEngine`],
//! which checks them against registered axioms (inline) or ships them to the
//! background [`VerificationWorker`] (formal checks). Failures travel as
//! [`ViolationReport`]s over the [`ViolationBus`] to the
//! [`KernelSupervisor`], which folds them into a single stability score,
//! feeds the resulting sampling probability back to the engine, and applies
//! a per-domain policy: log level, a cooldown-gated [`RealityCorrector`]
//! strategy, and a quality cap on the [`AdaptiveQuality`] controller.
//!
//! [`RealityKernel`] wires all of it together behind a single `tick`.

#![forbid(unsafe_code)]

pub mod axiom;
pub mod clock;
pub mod config;
pub mod corrector;
pub mod diagnostics;
pub mod domain;
pub mod engine;
pub mod error;
pub mod host;
pub mod kernel;
pub mod metrics;
pub mod quality;
pub mod script;
pub mod supervisor;
pub mod violation;
pub mod worker;

pub use axiom::{Axiom, CheckContext, InventorySlot, StatusEffect, WorldSample, canonical_axioms};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, KernelConfig, SupervisionMode, supervision_mode};
pub use corrector::{CorrectionKind, CorrectionRecord, RealityCorrector, TriggerOutcome};
pub use diagnostics::DiagnosticsSnapshot;
pub use domain::{DomainTag, Severity, SystemStatus};
pub use engine::{
    AxiomStats, CombatTransaction, DomainMetrics, FormalDispatch, SamplingGate, VerificationEngine,
    VerificationResult,
};
pub use error::{KernelError, KernelResult};
pub use host::{EntityState, SandboxWorld, SimulationHost};
pub use kernel::{RealityKernel, TickReport};
pub use metrics::{KernelMetrics, MetricsSnapshot};
pub use quality::{AdaptiveQuality, FrameTrend, QualityDecision, QualityPreset, QualityTier, SafetyCap};
pub use script::{ScriptTrace, SeverityScript, TrajectoryPoint, run_severity_script};
pub use supervisor::{
    KernelSupervisor, LogLevel, Policy, PolicyTable, RecordingEffects, SupervisorEffects,
    ViolationOutcome,
};
pub use violation::{ViolationBus, ViolationReport};
pub use worker::{CorrelationId, FormalCheck, FormalRequest, FormalResponse, VerificationWorker, Waypoint};
