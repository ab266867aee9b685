//! Atomic counters for kernel observability.
//!
//! All counters use relaxed ordering. They are advisory/diagnostic and must
//! never feed a control decision. One instance is shared (behind `Arc`) by
//! every component of a kernel.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Kernel operation counters.
pub struct KernelMetrics {
    /// Synchronous verifications that passed the sampling gate.
    pub verifications_run: AtomicU64,
    /// Synchronous verifications skipped by the sampling gate.
    pub verifications_gated: AtomicU64,
    /// Formal requests sent to the background worker.
    pub formal_dispatched: AtomicU64,
    /// Formal requests skipped by the sampling gate.
    pub formal_gated: AtomicU64,
    /// Worker responses matched to an outstanding request.
    pub worker_responses: AtomicU64,
    /// Worker responses with no matching outstanding request.
    pub orphan_responses: AtomicU64,
    /// Outstanding formal requests dropped unanswered (too old, or evicted
    /// to keep the pending table bounded).
    pub formal_expired: AtomicU64,
    /// Worker dispatch faults (panics or malformed payloads).
    pub worker_faults: AtomicU64,
    /// Axiom checks that panicked and were scored as passes.
    pub check_faults: AtomicU64,
    /// Violation reports published onto the bus.
    pub violations_published: AtomicU64,
    /// Violation reports consumed by the supervisor.
    pub violations_consumed: AtomicU64,
    /// Corrections that actually executed.
    pub corrections_executed: AtomicU64,
    /// Corrections suppressed by their cooldown.
    pub corrections_debounced: AtomicU64,
    /// Emergency quality caps engaged.
    pub emergency_caps_engaged: AtomicU64,
    /// Emergency quality caps released.
    pub emergency_caps_released: AtomicU64,
    /// Quality tier steps down (including emergency jumps and forced caps).
    pub quality_downgrades: AtomicU64,
    /// Quality tier steps up.
    pub quality_upgrades: AtomicU64,
}

impl KernelMetrics {
    /// Create a new zeroed metrics instance.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            verifications_run: AtomicU64::new(0),
            verifications_gated: AtomicU64::new(0),
            formal_dispatched: AtomicU64::new(0),
            formal_gated: AtomicU64::new(0),
            worker_responses: AtomicU64::new(0),
            orphan_responses: AtomicU64::new(0),
            formal_expired: AtomicU64::new(0),
            worker_faults: AtomicU64::new(0),
            check_faults: AtomicU64::new(0),
            violations_published: AtomicU64::new(0),
            violations_consumed: AtomicU64::new(0),
            corrections_executed: AtomicU64::new(0),
            corrections_debounced: AtomicU64::new(0),
            emergency_caps_engaged: AtomicU64::new(0),
            emergency_caps_released: AtomicU64::new(0),
            quality_downgrades: AtomicU64::new(0),
            quality_upgrades: AtomicU64::new(0),
        }
    }

    /// Increment a counter by 1.
    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Read a counter value.
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    /// Snapshot all counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            verifications_run: Self::get(&self.verifications_run),
            verifications_gated: Self::get(&self.verifications_gated),
            formal_dispatched: Self::get(&self.formal_dispatched),
            formal_gated: Self::get(&self.formal_gated),
            worker_responses: Self::get(&self.worker_responses),
            orphan_responses: Self::get(&self.orphan_responses),
            formal_expired: Self::get(&self.formal_expired),
            worker_faults: Self::get(&self.worker_faults),
            check_faults: Self::get(&self.check_faults),
            violations_published: Self::get(&self.violations_published),
            violations_consumed: Self::get(&self.violations_consumed),
            corrections_executed: Self::get(&self.corrections_executed),
            corrections_debounced: Self::get(&self.corrections_debounced),
            emergency_caps_engaged: Self::get(&self.emergency_caps_engaged),
            emergency_caps_released: Self::get(&self.emergency_caps_released),
            quality_downgrades: Self::get(&self.quality_downgrades),
            quality_upgrades: Self::get(&self.quality_upgrades),
        }
    }
}

impl Default for KernelMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time snapshot of all kernel counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub verifications_run: u64,
    pub verifications_gated: u64,
    pub formal_dispatched: u64,
    pub formal_gated: u64,
    pub worker_responses: u64,
    pub orphan_responses: u64,
    pub formal_expired: u64,
    pub worker_faults: u64,
    pub check_faults: u64,
    pub violations_published: u64,
    pub violations_consumed: u64,
    pub corrections_executed: u64,
    pub corrections_debounced: u64,
    pub emergency_caps_engaged: u64,
    pub emergency_caps_released: u64,
    pub quality_downgrades: u64,
    pub quality_upgrades: u64,
}
