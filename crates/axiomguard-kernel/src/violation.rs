//! Violation reports and the channel that carries them to the supervisor.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::domain::{DomainTag, Severity};
use crate::metrics::KernelMetrics;

/// A failed check, as published on the bus.
///
/// The source is carried as a structured `{origin, domain}` pair; the
/// `"ORIGIN:DOMAIN"` string form is only rendered for display and logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationReport {
    pub domain: DomainTag,
    pub severity: Severity,
    /// Component that detected the violation (`VERIFY`, `KERNEL`, ...).
    pub origin: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
    pub timestamp_ms: u64,
}

impl ViolationReport {
    #[must_use]
    pub fn new(
        domain: DomainTag,
        severity: Severity,
        origin: impl Into<String>,
        message: impl Into<String>,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            domain,
            severity,
            origin: origin.into(),
            message: message.into(),
            meta: None,
            timestamp_ms,
        }
    }

    /// Build from a legacy `"ORIGIN:DOMAIN"` source string.
    ///
    /// The domain is the text after the last `:`; returns `None` when it does
    /// not name a known domain.
    #[must_use]
    pub fn from_source_str(
        source: &str,
        severity: Severity,
        message: impl Into<String>,
        timestamp_ms: u64,
    ) -> Option<Self> {
        let (origin, domain) = match source.rsplit_once(':') {
            Some((origin, domain)) => (origin, domain),
            None => ("", source),
        };
        let domain = DomainTag::from_str_loose(domain)?;
        Some(Self::new(domain, severity, origin, message, timestamp_ms))
    }

    #[must_use]
    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = Some(meta);
        self
    }

    /// `"ORIGIN:DOMAIN"`, or just the domain when the origin is empty.
    #[must_use]
    pub fn source(&self) -> String {
        if self.origin.is_empty() {
            self.domain.as_str().to_string()
        } else {
            format!("{}:{}", self.origin, self.domain)
        }
    }
}

impl fmt::Display for ViolationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.source(), self.message)
    }
}

/// Multi-producer FIFO of violation reports.
///
/// Any component may publish. The supervisor is the only consumer that acts
/// on what it drains.
#[derive(Clone)]
pub struct ViolationBus {
    queue: Arc<Mutex<VecDeque<ViolationReport>>>,
    metrics: Arc<KernelMetrics>,
}

impl ViolationBus {
    #[must_use]
    pub fn new(metrics: Arc<KernelMetrics>) -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            metrics,
        }
    }

    pub fn publish(&self, report: ViolationReport) {
        self.queue.lock().push_back(report);
        KernelMetrics::inc(&self.metrics.violations_published);
    }

    /// Take everything published so far, oldest first.
    #[must_use]
    pub fn drain(&self) -> Vec<ViolationReport> {
        self.queue.lock().drain(..).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}
