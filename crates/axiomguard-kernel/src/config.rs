//! Runtime configuration.
//!
//! Two layers:
//! - **Supervision mode**, set via the `AXIOMGUARD_MODE` environment variable:
//!   - `repair` (default): violations are scored, logged, and drive corrective
//!     actions and quality caps.
//!   - `observe`: violations are scored and logged and may cap quality, but
//!     the corrector is never invoked. Useful when diagnosing a live session
//!     without the kernel mutating world state.
//!   - `off`: verification gate always closed. Benchmark baseline only; not
//!     reachable through env parsing.
//! - **Tuning tables** (`KernelConfig`), loaded from the JSON file named by
//!   `AXIOMGUARD_CONFIG`. Every field has a default, so a partial file only
//!   overrides what it names.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::domain::{Severity, SystemStatus};
use crate::quality::{QualityPreset, QualityTier};

pub const MODE_ENV: &str = "AXIOMGUARD_MODE";
pub const CONFIG_ENV: &str = "AXIOMGUARD_CONFIG";

/// Operating mode for the supervision kernel.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupervisionMode {
    /// Full behaviour: score, log, correct, cap.
    #[default]
    Repair,
    /// Score, log and cap; never run corrections.
    Observe,
    /// No verification at all.
    Off,
}

impl SupervisionMode {
    /// Parse from string (case-insensitive).
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "repair" | "hardened" | "full" | "correct" | "default" => Self::Repair,
            "observe" | "strict" | "monitor" | "log" => Self::Observe,
            "off" | "none" | "disabled" => Self::Off,
            _ => Self::Repair,
        }
    }

    /// Returns true if the supervisor may invoke the corrector.
    #[must_use]
    pub const fn corrections_enabled(self) -> bool {
        matches!(self, Self::Repair)
    }

    /// Returns true if verification is active.
    #[must_use]
    pub const fn verification_enabled(self) -> bool {
        !matches!(self, Self::Off)
    }
}

fn parse_mode_env(raw: &str) -> SupervisionMode {
    match SupervisionMode::from_str_loose(raw) {
        // `off` stays reachable via config and direct API use only.
        SupervisionMode::Off => SupervisionMode::Repair,
        mode => mode,
    }
}

static GLOBAL_MODE: OnceLock<SupervisionMode> = OnceLock::new();

/// Get the mode requested by the environment (reads the variable on first
/// call, caches thereafter).
#[must_use]
pub fn supervision_mode() -> SupervisionMode {
    *GLOBAL_MODE.get_or_init(|| {
        std::env::var(MODE_ENV)
            .map(|v| parse_mode_env(&v))
            .unwrap_or_default()
    })
}

/// Failure to load or accept a configuration table.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Severity → stability penalty.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityWeights {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl Default for SeverityWeights {
    fn default() -> Self {
        Self {
            low: 1.0,
            medium: 5.0,
            high: 10.0,
            critical: 15.0,
        }
    }
}

impl SeverityWeights {
    #[must_use]
    pub const fn weight(&self, severity: Severity) -> f64 {
        match severity {
            Severity::Low => self.low,
            Severity::Medium => self.medium,
            Severity::High => self.high,
            Severity::Critical => self.critical,
        }
    }
}

/// Stability score dynamics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityConfig {
    /// Points restored per recovery period.
    pub recovery_rate: f64,
    pub recovery_period_ms: u64,
    /// Scores at or above this are `STABLE`.
    pub stable_threshold: f64,
    /// Scores at or below this are `CRITICAL`.
    pub critical_threshold: f64,
    /// Ring-buffer size for recent violations.
    pub recent_violation_capacity: usize,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            recovery_rate: 2.0,
            recovery_period_ms: 1_000,
            stable_threshold: 80.0,
            critical_threshold: 40.0,
            recent_violation_capacity: 8,
        }
    }
}

impl StabilityConfig {
    #[must_use]
    pub fn classify(&self, score: f64) -> SystemStatus {
        SystemStatus::classify(score, self.stable_threshold, self.critical_threshold)
    }
}

/// Sampling probability per status for non-critical domains.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub stable: f64,
    pub unstable: f64,
    pub critical: f64,
    /// Fixed RNG seed for reproducible gating; entropy-seeded when absent.
    pub seed: Option<u64>,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            stable: 0.05,
            unstable: 0.25,
            critical: 1.0,
            seed: None,
        }
    }
}

impl SamplingConfig {
    #[must_use]
    pub const fn probability(&self, status: SystemStatus) -> f64 {
        match status {
            SystemStatus::Stable => self.stable,
            SystemStatus::Unstable => self.unstable,
            SystemStatus::Critical => self.critical,
        }
    }
}

/// Corrector cooldowns and strategy parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrectionConfig {
    pub spatial_cooldown_ms: u64,
    pub render_cooldown_ms: u64,
    pub world_gen_cooldown_ms: u64,
    pub inventory_cooldown_ms: u64,
    pub combat_cooldown_ms: u64,
    /// Non-persistent entities farther than this from the player are culled.
    pub cull_radius: f64,
    /// Fraction of world-generation entropy removed per correction.
    pub entropy_reduction_fraction: f64,
    /// How long the inventory stays locked before the automatic unlock.
    pub inventory_lock_ms: u64,
    pub history_capacity: usize,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            spatial_cooldown_ms: 5_000,
            render_cooldown_ms: 1_000,
            world_gen_cooldown_ms: 10_000,
            inventory_cooldown_ms: 5_000,
            combat_cooldown_ms: 1_000,
            cull_radius: 500.0,
            entropy_reduction_fraction: 0.2,
            inventory_lock_ms: 2_000,
            history_capacity: 32,
        }
    }
}

/// Adaptive quality ladder and thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// One preset per tier, best first.
    pub presets: Vec<QualityPreset>,
    pub adjustment_cooldown_ms: u64,
    /// Below this FPS the controller jumps straight to the bottom tier.
    pub emergency_fps: f64,
    /// Below this FPS the controller steps down regardless of trend.
    pub hard_degrade_fps: f64,
    /// Below this FPS the controller steps down when the trend is degrading.
    pub soft_degrade_fps: f64,
    /// Above this FPS with a stable trend the controller steps up.
    pub upgrade_fps: f64,
    /// Frame samples kept for FPS and trend estimation.
    pub frame_window: usize,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            presets: QualityTier::ALL.into_iter().map(QualityPreset::builtin).collect(),
            adjustment_cooldown_ms: 3_000,
            emergency_fps: 25.0,
            hard_degrade_fps: 35.0,
            soft_degrade_fps: 45.0,
            upgrade_fps: 58.0,
            frame_window: 60,
        }
    }
}

/// Every externally tunable constant of the kernel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub mode: SupervisionMode,
    pub severity_weights: SeverityWeights,
    pub stability: StabilityConfig,
    pub sampling: SamplingConfig,
    pub correction: CorrectionConfig,
    pub quality: QualityConfig,
}

impl KernelConfig {
    /// Parse and validate a JSON table.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Load from `AXIOMGUARD_CONFIG` (defaults when unset), then apply
    /// `AXIOMGUARD_MODE` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_path(Path::new(&path))?,
            None => Self::default(),
        };
        if std::env::var_os(MODE_ENV).is_some() {
            config.mode = supervision_mode();
        }
        Ok(config)
    }

    /// Reject tables the control loop cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        let s = &self.stability;
        if !(0.0..=100.0).contains(&s.critical_threshold)
            || !(0.0..=100.0).contains(&s.stable_threshold)
            || s.critical_threshold >= s.stable_threshold
        {
            return invalid(format!(
                "thresholds must satisfy 0 <= critical ({}) < stable ({}) <= 100",
                s.critical_threshold, s.stable_threshold
            ));
        }
        if s.recovery_period_ms == 0 {
            return invalid("recovery_period_ms must be positive".to_string());
        }
        if !s.recovery_rate.is_finite() || s.recovery_rate < 0.0 {
            return invalid(format!("recovery_rate {} out of range", s.recovery_rate));
        }
        if s.recent_violation_capacity == 0 || self.correction.history_capacity == 0 {
            return invalid("ring buffer capacities must be positive".to_string());
        }
        for sev in Severity::ALL {
            let w = self.severity_weights.weight(sev);
            if !w.is_finite() || w < 0.0 {
                return invalid(format!("weight for {sev} is {w}"));
            }
        }
        for p in [self.sampling.stable, self.sampling.unstable, self.sampling.critical] {
            if !(0.0..=1.0).contains(&p) {
                return invalid(format!("sampling probability {p} outside [0, 1]"));
            }
        }
        let c = &self.correction;
        if !(0.0..=1.0).contains(&c.entropy_reduction_fraction) {
            return invalid(format!(
                "entropy_reduction_fraction {} outside [0, 1]",
                c.entropy_reduction_fraction
            ));
        }
        if !c.cull_radius.is_finite() || c.cull_radius <= 0.0 {
            return invalid(format!("cull_radius {} must be positive", c.cull_radius));
        }
        self.validate_quality()
    }

    fn validate_quality(&self) -> Result<(), ConfigError> {
        let q = &self.quality;
        if q.presets.len() != QualityTier::COUNT {
            return Err(ConfigError::Invalid(format!(
                "expected {} quality presets, found {}",
                QualityTier::COUNT,
                q.presets.len()
            )));
        }
        for pair in q.presets.windows(2) {
            if !pair[1].is_cheaper_or_equal(&pair[0]) {
                return Err(ConfigError::Invalid(format!(
                    "preset '{}' costs more than the tier above it ('{}')",
                    pair[1].name, pair[0].name
                )));
            }
        }
        if q.frame_window < 2 {
            return Err(ConfigError::Invalid("frame_window must be >= 2".to_string()));
        }
        if !(q.emergency_fps <= q.hard_degrade_fps
            && q.hard_degrade_fps <= q.soft_degrade_fps
            && q.soft_degrade_fps < q.upgrade_fps)
        {
            return Err(ConfigError::Invalid(format!(
                "fps thresholds must satisfy emergency ({}) <= hard ({}) <= soft ({}) < upgrade ({})",
                q.emergency_fps, q.hard_degrade_fps, q.soft_degrade_fps, q.upgrade_fps
            )));
        }
        Ok(())
    }

    /// Hex SHA-256 of the canonical JSON encoding.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let encoded = serde_json::to_vec(self).unwrap_or_default();
        let digest = Sha256::digest(&encoded);
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }
}
