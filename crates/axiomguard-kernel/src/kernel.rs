//! Composition root.
//!
//! `RealityKernel` owns every component and wires them through explicit
//! handles: the violation bus carries reports to the supervisor, the
//! sampling gate carries probability back to the engine, and a borrowed
//! effects adapter carries supervisor decisions to the corrector and the
//! quality controller.

use std::sync::Arc;

use tracing::info;

use crate::axiom::CheckContext;
use crate::config::KernelConfig;
use crate::corrector::{CorrectionKind, RealityCorrector, TriggerOutcome};
use crate::diagnostics::{AxiomDiagnostics, DiagnosticsSnapshot, DomainDiagnostics};
use crate::domain::DomainTag;
use crate::engine::{FormalDispatch, SamplingGate, VerificationEngine, VerificationResult};
use crate::error::KernelResult;
use crate::host::SimulationHost;
use crate::metrics::KernelMetrics;
use crate::quality::{AdaptiveQuality, QualityDecision, SafetyCap};
use crate::supervisor::{KernelSupervisor, SupervisorEffects, ViolationOutcome};
use crate::violation::{ViolationBus, ViolationReport};
use crate::worker::{FormalCheck, FormalResponse, VerificationWorker};

struct KernelEffects<'a> {
    corrector: &'a mut RealityCorrector,
    quality: &'a mut AdaptiveQuality,
    host: &'a mut dyn SimulationHost,
}

impl SupervisorEffects for KernelEffects<'_> {
    fn trigger_correction(&mut self, kind: CorrectionKind, now_ms: u64) -> TriggerOutcome {
        self.corrector.trigger(kind, &mut *self.host, now_ms)
    }

    fn set_safety_cap(&mut self, cap: SafetyCap) {
        self.quality.set_safety_cap(cap);
    }

    fn release_safety_cap(&mut self) {
        self.quality.clear_safety_cap();
    }

    fn engage_emergency_cap(&mut self, cap: SafetyCap) {
        self.quality.engage_emergency_cap(cap);
    }

    fn release_emergency_cap(&mut self) {
        self.quality.release_emergency_cap();
    }
}

/// Everything one `tick` did.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub responses: Vec<FormalResponse>,
    pub violations: Vec<(ViolationReport, ViolationOutcome)>,
    pub recovery_steps: u64,
    pub quality: QualityDecision,
}

pub struct RealityKernel {
    config: KernelConfig,
    fingerprint: String,
    metrics: Arc<KernelMetrics>,
    bus: ViolationBus,
    engine: VerificationEngine,
    supervisor: KernelSupervisor,
    corrector: RealityCorrector,
    quality: AdaptiveQuality,
}

impl RealityKernel {
    /// Validate `config`, spawn the background worker and register the
    /// canonical axioms.
    pub fn new(config: KernelConfig, now_ms: u64) -> KernelResult<Self> {
        let mut kernel = Self::without_worker(config, now_ms)?;
        kernel.engine.attach_worker(VerificationWorker::spawn()?);
        Ok(kernel)
    }

    /// Same as [`RealityKernel::new`] but formal checks report
    /// `WorkerUnavailable`.
    pub fn without_worker(config: KernelConfig, now_ms: u64) -> KernelResult<Self> {
        config.validate()?;
        let metrics = Arc::new(KernelMetrics::new());
        let bus = ViolationBus::new(Arc::clone(&metrics));
        let gate = Arc::new(SamplingGate::from_config(&config.sampling));
        let mut engine =
            VerificationEngine::new(Arc::clone(&gate), config.mode, bus.clone(), Arc::clone(&metrics));
        engine.register_canonical_axioms();
        let supervisor = KernelSupervisor::new(&config, gate, Arc::clone(&metrics), now_ms);
        let corrector = RealityCorrector::new(config.correction, Arc::clone(&metrics));
        let quality = AdaptiveQuality::new(config.quality.clone(), Arc::clone(&metrics));
        let fingerprint = config.fingerprint();
        info!(
            target: "axiomguard::kernel",
            mode = ?config.mode,
            fingerprint = %fingerprint,
            "reality kernel ready"
        );
        Ok(Self {
            config,
            fingerprint,
            metrics,
            bus,
            engine,
            supervisor,
            corrector,
            quality,
        })
    }

    /// Build from `AXIOMGUARD_CONFIG` / `AXIOMGUARD_MODE`.
    pub fn from_env(now_ms: u64) -> KernelResult<Self> {
        Self::new(KernelConfig::from_env()?, now_ms)
    }

    #[must_use]
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<KernelMetrics> {
        &self.metrics
    }

    /// A publishing handle for external simulation systems.
    #[must_use]
    pub fn bus(&self) -> ViolationBus {
        self.bus.clone()
    }

    pub fn publish(&self, report: ViolationReport) {
        self.bus.publish(report);
    }

    #[must_use]
    pub fn engine(&self) -> &VerificationEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut VerificationEngine {
        &mut self.engine
    }

    #[must_use]
    pub fn supervisor(&self) -> &KernelSupervisor {
        &self.supervisor
    }

    #[must_use]
    pub fn corrector(&self) -> &RealityCorrector {
        &self.corrector
    }

    #[must_use]
    pub fn quality(&self) -> &AdaptiveQuality {
        &self.quality
    }

    pub fn quality_mut(&mut self) -> &mut AdaptiveQuality {
        &mut self.quality
    }

    pub fn verify(&mut self, domain: DomainTag, ctx: &CheckContext, now_ms: u64) -> VerificationResult {
        self.engine.verify(domain, ctx, now_ms)
    }

    pub fn verify_formal(&mut self, check: FormalCheck, now_ms: u64) -> FormalDispatch {
        let id = self.engine.next_correlation_id();
        self.engine.verify_formal(check, id, now_ms)
    }

    /// Direct string-keyed correction request, outside any policy.
    pub fn trigger_correction(
        &mut self,
        name: &str,
        host: &mut dyn SimulationHost,
        now_ms: u64,
    ) -> TriggerOutcome {
        self.corrector.trigger_named(name, host, now_ms)
    }

    /// One supervision pass: worker responses, violations, recovery,
    /// corrector housekeeping, quality.
    pub fn tick(&mut self, now_ms: u64, host: &mut dyn SimulationHost) -> TickReport {
        let responses = self.engine.pump_worker(now_ms);

        let mut violations = Vec::new();
        let mut effects = KernelEffects {
            corrector: &mut self.corrector,
            quality: &mut self.quality,
            host: &mut *host,
        };
        for report in self.bus.drain() {
            effects.quality.observe_violation(&report, now_ms);
            let outcome = self.supervisor.handle_violation(&report, now_ms, &mut effects);
            violations.push((report, outcome));
        }
        let recovery_steps = self.supervisor.recovery_tick(now_ms, &mut effects);

        self.corrector.tick(host, now_ms);
        let quality = self.quality.evaluate_and_adjust(now_ms, &self.bus);

        TickReport {
            responses,
            violations,
            recovery_steps,
            quality,
        }
    }

    #[must_use]
    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        let domains = DomainTag::ALL
            .into_iter()
            .filter_map(|domain| {
                let m = self.engine.domain_metrics(domain);
                (m.checks > 0).then(|| DomainDiagnostics {
                    domain,
                    checks: m.checks,
                    failures: m.failures,
                    avg_ms: m.avg_ms(),
                    last_failure_ms: m.last_failure_ms,
                })
            })
            .collect();
        let mut failing_axioms: Vec<AxiomDiagnostics> = self
            .engine
            .all_axiom_stats()
            .into_iter()
            .filter(|(_, s)| s.failures > 0)
            .map(|(id, s)| AxiomDiagnostics {
                id,
                checks: s.checks,
                failures: s.failures,
            })
            .collect();
        failing_axioms.sort_by(|a, b| b.failures.cmp(&a.failures));

        DiagnosticsSnapshot {
            score: self.supervisor.score(),
            status: self.supervisor.status(),
            sampling_probability: self.supervisor.sampling_probability(),
            emergency_cap_active: self.supervisor.emergency_cap_active(),
            quality_tier: self.quality.current_tier(),
            quality_ceiling: self.quality.ceiling(),
            config_fingerprint: self.fingerprint.clone(),
            domains,
            failing_axioms,
            recent_violations: self.supervisor.recent_violations(),
            corrections: self.corrector.history(),
            metrics: self.metrics.snapshot(),
        }
    }
}
