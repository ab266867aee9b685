//! Read-only projection of kernel state for dashboards and tests.
//! Never feed any of this back into a control decision.

use serde::Serialize;

use crate::corrector::CorrectionRecord;
use crate::domain::{DomainTag, SystemStatus};
use crate::metrics::MetricsSnapshot;
use crate::quality::QualityTier;
use crate::supervisor::RecentViolation;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainDiagnostics {
    pub domain: DomainTag,
    pub checks: u64,
    pub failures: u64,
    pub avg_ms: f64,
    pub last_failure_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AxiomDiagnostics {
    pub id: String,
    pub checks: u64,
    pub failures: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticsSnapshot {
    pub score: f64,
    pub status: SystemStatus,
    pub sampling_probability: f64,
    pub emergency_cap_active: bool,
    pub quality_tier: QualityTier,
    pub quality_ceiling: QualityTier,
    pub config_fingerprint: String,
    /// Domains that have run at least once.
    pub domains: Vec<DomainDiagnostics>,
    /// Axioms with at least one failure, most failures first.
    pub failing_axioms: Vec<AxiomDiagnostics>,
    pub recent_violations: Vec<RecentViolation>,
    pub corrections: Vec<CorrectionRecord>,
    pub metrics: MetricsSnapshot,
}

impl DiagnosticsSnapshot {
    #[must_use]
    pub fn domain(&self, domain: DomainTag) -> Option<&DomainDiagnostics> {
        self.domains.iter().find(|d| d.domain == domain)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
