//! Axiom verification engine.
//!
//! Owns the axiom registry, per-axiom counters and per-domain metrics.
//! Synchronous checks run inline; formal checks go to the background worker
//! and come back through [`VerificationEngine::pump_worker`]. Both shapes
//! pass through the sampling gate first.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use axiomguard_core::{CombatStep, CombatantState, DamageInput, LabeledRect};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, warn};

use crate::axiom::{Axiom, CheckContext, canonical_axioms};
use crate::config::{SamplingConfig, SupervisionMode};
use crate::domain::{DomainTag, Severity};
use crate::metrics::KernelMetrics;
use crate::violation::{ViolationBus, ViolationReport};
use crate::worker::{CorrelationId, FormalCheck, FormalRequest, FormalResponse, VerificationWorker};

/// Origin tag on reports from synchronous axioms.
pub const VERIFY_ORIGIN: &str = "VERIFY";
/// Origin tag on reports from formal (worker) checks.
pub const FORMAL_ORIGIN: &str = "KERNEL";
/// Message prefix for worker faults.
pub const WORKER_FAULT_TAG: &str = "WORKER_FAULT";
/// Unanswered formal requests older than this are dropped.
pub const PENDING_FORMAL_TIMEOUT_MS: u64 = 30_000;
/// Upper bound on outstanding formal requests.
pub const MAX_PENDING_FORMAL: usize = 1_024;

/// Published sampling probability plus the RNG that draws against it.
///
/// The supervisor writes, the engine reads. Keeping both behind one handle
/// keeps gating decisions in one place.
pub struct SamplingGate {
    probability_bits: AtomicU64,
    rng: Mutex<StdRng>,
}

impl SamplingGate {
    #[must_use]
    pub fn new(initial: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            probability_bits: AtomicU64::new(initial.clamp(0.0, 1.0).to_bits()),
            rng: Mutex::new(rng),
        }
    }

    #[must_use]
    pub fn from_config(config: &SamplingConfig) -> Self {
        Self::new(config.stable, config.seed)
    }

    #[must_use]
    pub fn probability(&self) -> f64 {
        f64::from_bits(self.probability_bits.load(Ordering::Relaxed))
    }

    /// Returns true when the stored value changed.
    pub fn publish(&self, probability: f64) -> bool {
        let bits = probability.clamp(0.0, 1.0).to_bits();
        self.probability_bits.swap(bits, Ordering::Relaxed) != bits
    }

    /// One Bernoulli draw at the current probability.
    #[must_use]
    pub fn draw(&self) -> bool {
        let p = self.probability();
        if p >= 1.0 {
            return true;
        }
        if p <= 0.0 {
            return false;
        }
        self.rng.lock().gen_bool(p)
    }
}

/// Running counters for one axiom.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AxiomStats {
    pub checks: u64,
    pub failures: u64,
}

/// Per-domain accumulator. Never reset while the engine lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DomainMetrics {
    pub checks: u64,
    pub failures: u64,
    pub total_time_ms: f64,
    pub last_failure_ms: Option<u64>,
}

impl DomainMetrics {
    #[must_use]
    pub fn avg_ms(&self) -> f64 {
        if self.checks == 0 {
            0.0
        } else {
            self.total_time_ms / self.checks as f64
        }
    }

    fn record(&mut self, elapsed_ms: f64, failed: bool, now_ms: u64) {
        self.checks += 1;
        self.total_time_ms += elapsed_ms;
        if failed {
            self.failures += 1;
            self.last_failure_ms = Some(now_ms);
        }
    }
}

/// Outcome of a synchronous verification.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationResult {
    pub is_valid: bool,
    pub errors: Vec<ViolationReport>,
}

impl VerificationResult {
    #[must_use]
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
        }
    }
}

/// What `verify_formal` did with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormalDispatch {
    Dispatched,
    Gated,
    /// No worker attached, or it has gone away.
    WorkerUnavailable,
}

/// Health-only transaction shape used by simulation code that does not track armor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CombatTransaction {
    pub old_hp: f64,
    pub damage: f64,
    pub new_hp: f64,
}

impl CombatTransaction {
    /// Unarmored step with the old health as the maximum.
    #[must_use]
    pub fn to_step(self) -> CombatStep {
        CombatStep {
            prev: CombatantState::new(self.old_hp, self.old_hp, 0.0),
            input: DamageInput::new(self.damage, 0.0),
            next: CombatantState::new(self.new_hp, self.old_hp, 0.0),
        }
    }
}

struct RegisteredAxiom {
    axiom: Axiom,
    stats: AxiomStats,
}

struct PendingFormal {
    domain: DomainTag,
    dispatched_ms: u64,
}

pub struct VerificationEngine {
    registry: Vec<RegisteredAxiom>,
    domains: [DomainMetrics; DomainTag::COUNT],
    gate: Arc<SamplingGate>,
    mode: SupervisionMode,
    bus: ViolationBus,
    worker: Option<VerificationWorker>,
    pending: HashMap<CorrelationId, PendingFormal>,
    next_id: CorrelationId,
    metrics: Arc<KernelMetrics>,
}

impl VerificationEngine {
    #[must_use]
    pub fn new(
        gate: Arc<SamplingGate>,
        mode: SupervisionMode,
        bus: ViolationBus,
        metrics: Arc<KernelMetrics>,
    ) -> Self {
        Self {
            registry: Vec::new(),
            domains: [DomainMetrics::default(); DomainTag::COUNT],
            gate,
            mode,
            bus,
            worker: None,
            pending: HashMap::new(),
            next_id: 1,
            metrics,
        }
    }

    pub fn attach_worker(&mut self, worker: VerificationWorker) {
        self.worker = Some(worker);
    }

    /// Insert or replace by id. Counters restart at zero.
    pub fn register_axiom(&mut self, axiom: Axiom) {
        let entry = RegisteredAxiom {
            axiom,
            stats: AxiomStats::default(),
        };
        match self
            .registry
            .iter_mut()
            .find(|r| r.axiom.id == entry.axiom.id)
        {
            Some(slot) => *slot = entry,
            None => self.registry.push(entry),
        }
    }

    pub fn register_canonical_axioms(&mut self) {
        for axiom in canonical_axioms() {
            self.register_axiom(axiom);
        }
    }

    #[must_use]
    pub fn axiom_count(&self) -> usize {
        self.registry.len()
    }

    /// Critical domains always pass; others pass with the published probability.
    #[must_use]
    pub fn should_verify(&self, domain: DomainTag) -> bool {
        if !self.mode.verification_enabled() {
            return false;
        }
        domain.is_critical() || self.gate.draw()
    }

    pub fn verify(&mut self, domain: DomainTag, ctx: &CheckContext, now_ms: u64) -> VerificationResult {
        if !self.should_verify(domain) {
            KernelMetrics::inc(&self.metrics.verifications_gated);
            return VerificationResult::valid();
        }
        KernelMetrics::inc(&self.metrics.verifications_run);

        let started = Instant::now();
        let mut errors = Vec::new();
        for entry in self.registry.iter_mut().filter(|r| r.axiom.domain == domain) {
            entry.stats.checks += 1;
            let axiom = &entry.axiom;
            let held = match panic::catch_unwind(AssertUnwindSafe(|| axiom.holds(ctx))) {
                Ok(held) => held,
                Err(_) => {
                    KernelMetrics::inc(&self.metrics.check_faults);
                    warn!(target: "axiomguard::engine", axiom = %axiom.id, "axiom check panicked; scored as pass");
                    true
                }
            };
            if held {
                continue;
            }
            entry.stats.failures += 1;
            let message = panic::catch_unwind(AssertUnwindSafe(|| axiom.describe(ctx)))
                .unwrap_or_else(|_| format!("{} failed", axiom.id));
            errors.push(
                ViolationReport::new(domain, axiom.severity, VERIFY_ORIGIN, message, now_ms)
                    .with_meta(serde_json::json!({ "axiom": axiom.id })),
            );
        }
        let elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0;
        self.domains[domain.index()].record(elapsed_ms, !errors.is_empty(), now_ms);

        for report in &errors {
            self.bus.publish(report.clone());
        }
        VerificationResult {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    pub fn verify_non_overlap(&mut self, rects: &[LabeledRect], now_ms: u64) -> VerificationResult {
        self.verify(DomainTag::Geometry, &CheckContext::Geometry(rects.to_vec()), now_ms)
    }

    pub fn verify_combat_transaction(&mut self, tx: CombatTransaction, now_ms: u64) -> VerificationResult {
        self.verify(DomainTag::Combat, &CheckContext::Combat(tx.to_step()), now_ms)
    }

    /// Fresh id for callers that do not manage their own.
    pub fn next_correlation_id(&mut self) -> CorrelationId {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }

    /// Fire and forget.
    pub fn verify_formal(&mut self, check: FormalCheck, id: CorrelationId, now_ms: u64) -> FormalDispatch {
        let domain = check.domain();
        if !self.should_verify(domain) {
            KernelMetrics::inc(&self.metrics.formal_gated);
            return FormalDispatch::Gated;
        }
        let Some(worker) = &self.worker else {
            return FormalDispatch::WorkerUnavailable;
        };
        if !worker.submit(FormalRequest { id, check }) {
            return FormalDispatch::WorkerUnavailable;
        }
        if self.pending.len() >= MAX_PENDING_FORMAL && !self.pending.contains_key(&id) {
            self.evict_oldest_pending();
        }
        self.pending.insert(
            id,
            PendingFormal {
                domain,
                dispatched_ms: now_ms,
            },
        );
        KernelMetrics::inc(&self.metrics.formal_dispatched);
        FormalDispatch::Dispatched
    }

    #[must_use]
    pub fn pending_formal(&self) -> usize {
        self.pending.len()
    }

    /// Drain whatever the worker has answered so far and publish failures.
    pub fn pump_worker(&mut self, now_ms: u64) -> Vec<FormalResponse> {
        let mut received = Vec::new();
        if let Some(worker) = &self.worker {
            while let Some(resp) = worker.try_recv() {
                received.push(resp);
            }
        }
        for resp in &received {
            self.absorb_response(resp, now_ms);
        }
        self.expire_pending(now_ms);
        received
    }

    /// Drop requests the worker never answered within
    /// [`PENDING_FORMAL_TIMEOUT_MS`]. A late answer then counts as an orphan.
    pub fn expire_pending(&mut self, now_ms: u64) -> usize {
        let before = self.pending.len();
        self.pending
            .retain(|_, p| now_ms.saturating_sub(p.dispatched_ms) < PENDING_FORMAL_TIMEOUT_MS);
        let expired = before - self.pending.len();
        for _ in 0..expired {
            KernelMetrics::inc(&self.metrics.formal_expired);
        }
        if expired > 0 {
            debug!(target: "axiomguard::engine", expired, "unanswered formal requests dropped");
        }
        expired
    }

    fn evict_oldest_pending(&mut self) {
        let oldest = self
            .pending
            .iter()
            .min_by_key(|(id, p)| (p.dispatched_ms, **id))
            .map(|(id, _)| *id);
        if let Some(id) = oldest {
            self.pending.remove(&id);
            KernelMetrics::inc(&self.metrics.formal_expired);
        }
    }

    /// Correlate one worker response and turn failures into reports.
    /// Unmatched ids are counted and dropped.
    pub fn absorb_response(&mut self, resp: &FormalResponse, now_ms: u64) {
        let Some(pending) = self.pending.remove(&resp.id) else {
            KernelMetrics::inc(&self.metrics.orphan_responses);
            debug!(target: "axiomguard::engine", id = resp.id, "orphan worker response");
            return;
        };
        KernelMetrics::inc(&self.metrics.worker_responses);
        let domain = pending.domain;
        self.domains[domain.index()].record(resp.compute_time_ms, !resp.valid, now_ms);

        let detail = resp.error.clone().unwrap_or_default();
        let report = if resp.fault {
            KernelMetrics::inc(&self.metrics.worker_faults);
            ViolationReport::new(
                domain,
                Severity::Critical,
                FORMAL_ORIGIN,
                format!("{WORKER_FAULT_TAG}: {detail}"),
                now_ms,
            )
        } else if !resp.valid {
            ViolationReport::new(domain, formal_severity(domain), FORMAL_ORIGIN, detail, now_ms)
        } else {
            return;
        };
        let mut meta = serde_json::json!({
            "id": resp.id,
            "latency_ms": now_ms.saturating_sub(pending.dispatched_ms),
            "compute_time_ms": resp.compute_time_ms,
        });
        if let (Some(extra), Some(obj)) = (&resp.meta, meta.as_object_mut()) {
            obj.insert("result".to_string(), extra.clone());
        }
        self.bus.publish(report.with_meta(meta));
    }

    #[must_use]
    pub fn domain_metrics(&self, domain: DomainTag) -> DomainMetrics {
        self.domains[domain.index()]
    }

    #[must_use]
    pub fn axiom_stats(&self, id: &str) -> Option<AxiomStats> {
        self.registry
            .iter()
            .find(|r| r.axiom.id == id)
            .map(|r| r.stats)
    }

    /// `(id, stats)` in registration order.
    #[must_use]
    pub fn all_axiom_stats(&self) -> Vec<(String, AxiomStats)> {
        self.registry
            .iter()
            .map(|r| (r.axiom.id.clone(), r.stats))
            .collect()
    }

    #[must_use]
    pub fn gate(&self) -> &Arc<SamplingGate> {
        &self.gate
    }
}

/// Severity assigned to a failed formal check.
#[must_use]
pub const fn formal_severity(domain: DomainTag) -> Severity {
    match domain {
        DomainTag::SpatialTopology => Severity::High,
        DomainTag::PathContinuity => Severity::Medium,
        _ => Severity::Low,
    }
}
