//! Adaptive quality controller.
//!
//! Walks a five-tier preset ladder from frame telemetry, one step at a time,
//! rate-limited by an adjustment cooldown. The supervisor imposes a ceiling
//! through safety caps and is the only party that lifts one; this controller
//! never raises a cap on its own.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::QualityConfig;
use crate::domain::{DomainTag, Severity};
use crate::metrics::KernelMetrics;
use crate::violation::{ViolationBus, ViolationReport};

/// Origin tag on reports emitted by this controller.
pub const QUALITY_ORIGIN: &str = "ADAPTIVE_QUALITY";

/// Substrings in a violation's source or message that hold upgrades back.
const UPGRADE_HOLD_MARKERS: [&str; 3] = ["GEOMETRY", "KERNEL", "SECTOR_LOAD"];

/// Quality tiers, best first. Index 0 is the most expensive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QualityTier {
    Ultra,
    High,
    Medium,
    Low,
    Emergency,
}

impl QualityTier {
    pub const COUNT: usize = 5;

    pub const ALL: [QualityTier; Self::COUNT] = [
        Self::Ultra,
        Self::High,
        Self::Medium,
        Self::Low,
        Self::Emergency,
    ];

    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        if index < Self::COUNT {
            Some(Self::ALL[index])
        } else {
            None
        }
    }

    /// True when `self` is strictly better (more expensive) than `other`.
    #[must_use]
    pub const fn is_above(self, other: Self) -> bool {
        self.index() < other.index()
    }

    /// The cheaper of the two.
    #[must_use]
    pub const fn min_quality(self, other: Self) -> Self {
        if self.is_above(other) { other } else { self }
    }

    #[must_use]
    pub const fn step_down(self) -> Option<Self> {
        Self::from_index(self.index() + 1)
    }

    #[must_use]
    pub const fn step_up(self) -> Option<Self> {
        match self.index() {
            0 => None,
            i => Self::from_index(i - 1),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ultra => "ULTRA",
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
            Self::Emergency => "EMERGENCY",
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rendering/simulation fidelity bundle for one tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityPreset {
    pub name: String,
    pub render_distance: f64,
    pub max_visible_entities: u32,
    /// 0 = flat, 3 = full dynamic lighting.
    pub lighting_quality: u8,
    pub particle_multiplier: f64,
    pub shadows_enabled: bool,
}

impl QualityPreset {
    /// Shipped parameters for `tier`.
    #[must_use]
    pub fn builtin(tier: QualityTier) -> Self {
        let (render_distance, max_visible_entities, lighting_quality, particle_multiplier, shadows) =
            match tier {
                QualityTier::Ultra => (2_000.0, 500, 3, 1.0, true),
                QualityTier::High => (1_500.0, 300, 2, 0.75, true),
                QualityTier::Medium => (1_000.0, 200, 1, 0.5, false),
                QualityTier::Low => (600.0, 100, 1, 0.25, false),
                QualityTier::Emergency => (300.0, 50, 0, 0.0, false),
            };
        Self {
            name: tier.as_str().to_string(),
            render_distance,
            max_visible_entities,
            lighting_quality,
            particle_multiplier,
            shadows_enabled: shadows,
        }
    }

    /// True when no parameter of `self` costs more than the same parameter of `other`.
    #[must_use]
    pub fn is_cheaper_or_equal(&self, other: &Self) -> bool {
        self.render_distance <= other.render_distance
            && self.max_visible_entities <= other.max_visible_entities
            && self.lighting_quality <= other.lighting_quality
            && self.particle_multiplier <= other.particle_multiplier
            && (!self.shadows_enabled || other.shadows_enabled)
    }
}

/// Ceilings the supervisor may impose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SafetyCap {
    High,
    Medium,
}

impl SafetyCap {
    #[must_use]
    pub const fn tier(self) -> QualityTier {
        match self {
            Self::High => QualityTier::High,
            Self::Medium => QualityTier::Medium,
        }
    }

    /// Accepts `"HIGH"` or `"MEDIUM"` only.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HIGH" => Some(Self::High),
            "MEDIUM" => Some(Self::Medium),
            _ => None,
        }
    }
}

/// Direction frame times are moving in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FrameTrend {
    Improving,
    Stable,
    Degrading,
}

/// Bounded window of frame times in milliseconds.
#[derive(Debug, Clone)]
pub struct FrameTelemetry {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl FrameTelemetry {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Non-finite and non-positive frame times are dropped.
    pub fn record(&mut self, frame_ms: f64) {
        if !frame_ms.is_finite() || frame_ms <= 0.0 {
            return;
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(frame_ms);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// `1000 / mean frame time`, or `None` before the first sample.
    #[must_use]
    pub fn fps(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let mean = self.samples.iter().sum::<f64>() / self.samples.len() as f64;
        Some(1_000.0 / mean)
    }

    /// Newer half of the window against the older half, with a ±10% band.
    #[must_use]
    pub fn trend(&self) -> FrameTrend {
        let n = self.samples.len();
        if n < 4 {
            return FrameTrend::Stable;
        }
        let half = n / 2;
        let older = self.samples.iter().take(half).sum::<f64>() / half as f64;
        let newer = self.samples.iter().skip(n - half).sum::<f64>() / half as f64;
        if newer > older * 1.1 {
            FrameTrend::Degrading
        } else if newer < older * 0.9 {
            FrameTrend::Improving
        } else {
            FrameTrend::Stable
        }
    }
}

/// What one `evaluate_and_adjust` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityDecision {
    /// No frame samples yet.
    NoTelemetry,
    /// Inside the adjustment cooldown.
    CoolingDown,
    Hold,
    Emergency { from: QualityTier },
    Downgraded { from: QualityTier, to: QualityTier },
    Upgraded { from: QualityTier, to: QualityTier },
}

/// Owns the current tier pointer and the externally imposed ceiling.
pub struct AdaptiveQuality {
    config: QualityConfig,
    current: QualityTier,
    /// Policy cap, as last set by the supervisor.
    policy_cap: Option<QualityTier>,
    /// Hysteresis-controlled cap engaged at critical status.
    emergency_cap: Option<QualityTier>,
    last_adjust_ms: Option<u64>,
    upgrade_hold_until_ms: u64,
    telemetry: FrameTelemetry,
    metrics: Arc<KernelMetrics>,
}

impl AdaptiveQuality {
    #[must_use]
    pub fn new(config: QualityConfig, metrics: Arc<KernelMetrics>) -> Self {
        let telemetry = FrameTelemetry::new(config.frame_window);
        Self {
            config,
            current: QualityTier::Ultra,
            policy_cap: None,
            emergency_cap: None,
            last_adjust_ms: None,
            upgrade_hold_until_ms: 0,
            telemetry,
            metrics,
        }
    }

    pub fn record_frame(&mut self, frame_ms: f64) {
        self.telemetry.record(frame_ms);
    }

    #[must_use]
    pub fn telemetry(&self) -> &FrameTelemetry {
        &self.telemetry
    }

    #[must_use]
    pub fn current_tier(&self) -> QualityTier {
        self.current
    }

    #[must_use]
    pub fn current_preset(&self) -> &QualityPreset {
        &self.config.presets[self.current.index()]
    }

    /// Best tier currently allowed.
    #[must_use]
    pub fn ceiling(&self) -> QualityTier {
        [self.policy_cap, self.emergency_cap]
            .into_iter()
            .flatten()
            .fold(QualityTier::Ultra, QualityTier::min_quality)
    }

    #[must_use]
    pub fn emergency_cap_engaged(&self) -> bool {
        self.emergency_cap.is_some()
    }

    /// Record `cap` as the policy ceiling, replacing any earlier one, and
    /// force a downgrade if the current tier is above it.
    pub fn set_safety_cap(&mut self, cap: SafetyCap) {
        self.policy_cap = Some(cap.tier());
        self.enforce_ceiling();
    }

    /// Lift the policy ceiling. The tier itself only climbs back through
    /// later upgrades.
    pub fn clear_safety_cap(&mut self) {
        if self.policy_cap.take().is_some() {
            info!(target: "axiomguard::quality", ceiling = self.ceiling().as_str(), "policy cap lifted");
        }
    }

    /// Engage the hysteresis-controlled cap.
    pub fn engage_emergency_cap(&mut self, cap: SafetyCap) {
        self.emergency_cap = Some(cap.tier());
        KernelMetrics::inc(&self.metrics.emergency_caps_engaged);
        info!(target: "axiomguard::quality", cap = cap.tier().as_str(), "emergency cap engaged");
        self.enforce_ceiling();
    }

    /// Drop the emergency cap; any policy cap stays in force.
    pub fn release_emergency_cap(&mut self) {
        if self.emergency_cap.take().is_some() {
            KernelMetrics::inc(&self.metrics.emergency_caps_released);
            info!(target: "axiomguard::quality", ceiling = self.ceiling().as_str(), "emergency cap released");
        }
    }

    fn enforce_ceiling(&mut self) {
        let ceiling = self.ceiling();
        if self.current.is_above(ceiling) {
            let from = self.current;
            self.current = ceiling;
            KernelMetrics::inc(&self.metrics.quality_downgrades);
            info!(target: "axiomguard::quality", from = from.as_str(), to = ceiling.as_str(), "quality forced down to ceiling");
        }
    }

    /// Read-only subscription to the violation stream.
    pub fn observe_violation(&mut self, report: &ViolationReport, now_ms: u64) {
        let source = report.source();
        let hit = UPGRADE_HOLD_MARKERS
            .iter()
            .any(|m| source.contains(m) || report.message.contains(m));
        if hit {
            self.upgrade_hold_until_ms = now_ms.saturating_add(self.config.adjustment_cooldown_ms);
            debug!(target: "axiomguard::quality", source = %source, "upgrades held");
        }
    }

    /// One per-tick adjustment pass.
    pub fn evaluate_and_adjust(&mut self, now_ms: u64, bus: &ViolationBus) -> QualityDecision {
        if let Some(last) = self.last_adjust_ms {
            if now_ms.saturating_sub(last) < self.config.adjustment_cooldown_ms {
                return QualityDecision::CoolingDown;
            }
        }
        let Some(fps) = self.telemetry.fps() else {
            return QualityDecision::NoTelemetry;
        };
        let trend = self.telemetry.trend();
        let from = self.current;

        if fps < self.config.emergency_fps && from != QualityTier::Emergency {
            self.current = QualityTier::Emergency;
            self.last_adjust_ms = Some(now_ms);
            KernelMetrics::inc(&self.metrics.quality_downgrades);
            warn!(target: "axiomguard::quality", fps, from = from.as_str(), "emergency quality drop");
            bus.publish(
                ViolationReport::new(
                    DomainTag::Render,
                    Severity::Critical,
                    QUALITY_ORIGIN,
                    format!("QUALITY_COLLAPSE: fps {fps:.1} below {}", self.config.emergency_fps),
                    now_ms,
                )
                .with_meta(serde_json::json!({ "fps": fps, "from": from.as_str() })),
            );
            return QualityDecision::Emergency { from };
        }

        let degrading = trend == FrameTrend::Degrading && fps < self.config.soft_degrade_fps;
        if degrading || fps < self.config.hard_degrade_fps {
            if let Some(to) = from.step_down() {
                self.current = to;
                self.last_adjust_ms = Some(now_ms);
                KernelMetrics::inc(&self.metrics.quality_downgrades);
                info!(target: "axiomguard::quality", fps, from = from.as_str(), to = to.as_str(), "quality stepped down");
                return QualityDecision::Downgraded { from, to };
            }
            return QualityDecision::Hold;
        }

        if trend == FrameTrend::Stable
            && fps > self.config.upgrade_fps
            && now_ms >= self.upgrade_hold_until_ms
        {
            if let Some(to) = from.step_up() {
                if !to.is_above(self.ceiling()) {
                    self.current = to;
                    self.last_adjust_ms = Some(now_ms);
                    KernelMetrics::inc(&self.metrics.quality_upgrades);
                    info!(target: "axiomguard::quality", fps, from = from.as_str(), to = to.as_str(), "quality stepped up");
                    return QualityDecision::Upgraded { from, to };
                }
            }
        }
        QualityDecision::Hold
    }
}
