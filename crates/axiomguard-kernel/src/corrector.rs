//! Reality corrector.
//!
//! When the supervisor matches a violation to a policy with an action, the
//! corrector applies a bounded remediation to the simulation instead of
//! letting corrupted state propagate. Each strategy has its own cooldown;
//! a trigger inside the window is a no-op.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::CorrectionConfig;
use crate::host::SimulationHost;
use crate::metrics::KernelMetrics;

/// Remediation strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CorrectionKind {
    /// Rebuild the spatial index, then cull distant non-persistent entities.
    Spatial,
    /// Reserved for cache flushes. Currently does nothing beyond bookkeeping.
    Render,
    /// Reduce world-generation entropy by a fixed fraction.
    WorldGen,
    /// Lock the inventory and schedule an automatic unlock.
    Inventory,
    /// Clamp health into `[0, max_hp]`, NaN to zero.
    Combat,
}

impl CorrectionKind {
    pub const COUNT: usize = 5;

    pub const ALL: [CorrectionKind; Self::COUNT] = [
        Self::Spatial,
        Self::Render,
        Self::WorldGen,
        Self::Inventory,
        Self::Combat,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Spatial => "SPATIAL",
            Self::Render => "RENDER",
            Self::WorldGen => "WORLD_GEN",
            Self::Inventory => "INVENTORY",
            Self::Combat => "COMBAT",
        }
    }

    #[must_use]
    pub fn from_str_loose(s: &str) -> Option<Self> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL.into_iter().find(|k| k.as_str() == normalized)
    }

    #[must_use]
    pub const fn cooldown_ms(self, config: &CorrectionConfig) -> u64 {
        match self {
            Self::Spatial => config.spatial_cooldown_ms,
            Self::Render => config.render_cooldown_ms,
            Self::WorldGen => config.world_gen_cooldown_ms,
            Self::Inventory => config.inventory_cooldown_ms,
            Self::Combat => config.combat_cooldown_ms,
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for CorrectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a trigger request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOutcome {
    Executed,
    /// Still inside the strategy's cooldown.
    Debounced { remaining_ms: u64 },
    /// The name does not match any strategy.
    Unknown,
}

/// One executed correction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrectionRecord {
    pub kind: CorrectionKind,
    pub timestamp_ms: u64,
    pub detail: String,
}

/// Strategy table plus per-strategy cooldown state.
pub struct RealityCorrector {
    config: CorrectionConfig,
    last_run_ms: [Option<u64>; CorrectionKind::COUNT],
    history: VecDeque<CorrectionRecord>,
    inventory_unlock_at_ms: Option<u64>,
    metrics: Arc<KernelMetrics>,
}

impl RealityCorrector {
    #[must_use]
    pub fn new(config: CorrectionConfig, metrics: Arc<KernelMetrics>) -> Self {
        Self {
            config,
            last_run_ms: [None; CorrectionKind::COUNT],
            history: VecDeque::with_capacity(config.history_capacity),
            inventory_unlock_at_ms: None,
            metrics,
        }
    }

    /// String entry point. Unknown names are ignored.
    pub fn trigger_named(
        &mut self,
        name: &str,
        host: &mut dyn SimulationHost,
        now_ms: u64,
    ) -> TriggerOutcome {
        match CorrectionKind::from_str_loose(name) {
            Some(kind) => self.trigger(kind, host, now_ms),
            None => {
                debug!(target: "axiomguard::corrector", name, "unknown correction ignored");
                TriggerOutcome::Unknown
            }
        }
    }

    pub fn trigger(
        &mut self,
        kind: CorrectionKind,
        host: &mut dyn SimulationHost,
        now_ms: u64,
    ) -> TriggerOutcome {
        let cooldown = kind.cooldown_ms(&self.config);
        if let Some(last) = self.last_run_ms[kind.index()] {
            let elapsed = now_ms.saturating_sub(last);
            if elapsed < cooldown {
                KernelMetrics::inc(&self.metrics.corrections_debounced);
                return TriggerOutcome::Debounced {
                    remaining_ms: cooldown - elapsed,
                };
            }
        }

        let detail = self.execute(kind, host, now_ms);
        self.last_run_ms[kind.index()] = Some(now_ms);
        KernelMetrics::inc(&self.metrics.corrections_executed);
        info!(target: "axiomguard::corrector", kind = kind.as_str(), detail = %detail, "correction executed");

        if self.history.len() == self.config.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(CorrectionRecord {
            kind,
            timestamp_ms: now_ms,
            detail,
        });
        TriggerOutcome::Executed
    }

    fn execute(&mut self, kind: CorrectionKind, host: &mut dyn SimulationHost, now_ms: u64) -> String {
        match kind {
            CorrectionKind::Spatial => {
                host.rebuild_spatial_index();
                let (px, py) = host.player_position();
                let radius = self.config.cull_radius;
                let entities = host.entities_mut();
                let before = entities.len();
                entities.retain(|e| e.persistent || (e.x - px).hypot(e.y - py) <= radius);
                format!("index rebuilt, culled {}", before - entities.len())
            }
            CorrectionKind::Render => "no-op".to_string(),
            CorrectionKind::WorldGen => {
                let entropy = host.reduce_world_entropy(self.config.entropy_reduction_fraction);
                format!("entropy now {entropy:.3}")
            }
            CorrectionKind::Inventory => {
                host.set_inventory_locked(true);
                let unlock_at = now_ms.saturating_add(self.config.inventory_lock_ms);
                self.inventory_unlock_at_ms = Some(unlock_at);
                format!("inventory locked until {unlock_at}")
            }
            CorrectionKind::Combat => {
                let mut clamped = 0_usize;
                for e in host.entities_mut() {
                    let fixed = if e.hp.is_nan() {
                        0.0
                    } else {
                        e.hp.clamp(0.0, e.max_hp.max(0.0))
                    };
                    if fixed != e.hp {
                        e.hp = fixed;
                        clamped += 1;
                    }
                }
                format!("clamped {clamped} entities")
            }
        }
    }

    /// Housekeeping: release the inventory once its lock has expired.
    pub fn tick(&mut self, host: &mut dyn SimulationHost, now_ms: u64) {
        if let Some(at) = self.inventory_unlock_at_ms {
            if now_ms >= at {
                host.set_inventory_locked(false);
                self.inventory_unlock_at_ms = None;
                debug!(target: "axiomguard::corrector", "inventory unlocked");
            }
        }
    }

    #[must_use]
    pub fn history(&self) -> Vec<CorrectionRecord> {
        self.history.iter().cloned().collect()
    }

    #[must_use]
    pub fn last_run_ms(&self, kind: CorrectionKind) -> Option<u64> {
        self.last_run_ms[kind.index()]
    }

    #[must_use]
    pub fn executions(&self, kind: CorrectionKind) -> usize {
        self.history.iter().filter(|r| r.kind == kind).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{EntityState, SandboxWorld};

    fn corrector() -> (RealityCorrector, Arc<KernelMetrics>) {
        let metrics = Arc::new(KernelMetrics::new());
        (
            RealityCorrector::new(CorrectionConfig::default(), Arc::clone(&metrics)),
            metrics,
        )
    }

    #[test]
    fn names_parse_loosely() {
        assert_eq!(CorrectionKind::from_str_loose("world-gen"), Some(CorrectionKind::WorldGen));
        assert_eq!(CorrectionKind::from_str_loose("spatial"), Some(CorrectionKind::Spatial));
        assert_eq!(CorrectionKind::from_str_loose("REBOOT"), None);
    }

    #[test]
    fn spatial_debounces_inside_cooldown() {
        let (mut c, metrics) = corrector();
        let mut world = SandboxWorld::new();
        assert_eq!(c.trigger(CorrectionKind::Spatial, &mut world, 1_000), TriggerOutcome::Executed);
        assert_eq!(
            c.trigger(CorrectionKind::Spatial, &mut world, 3_000),
            TriggerOutcome::Debounced { remaining_ms: 3_000 }
        );
        assert_eq!(world.spatial_rebuilds, 1);
        assert_eq!(c.trigger(CorrectionKind::Spatial, &mut world, 6_000), TriggerOutcome::Executed);
        assert_eq!(world.spatial_rebuilds, 2);
        let snap = metrics.snapshot();
        assert_eq!(snap.corrections_executed, 2);
        assert_eq!(snap.corrections_debounced, 1);
    }

    #[test]
    fn cooldowns_are_independent() {
        let (mut c, _) = corrector();
        let mut world = SandboxWorld::new();
        assert_eq!(c.trigger(CorrectionKind::Spatial, &mut world, 0), TriggerOutcome::Executed);
        assert_eq!(c.trigger(CorrectionKind::Render, &mut world, 10), TriggerOutcome::Executed);
        assert_eq!(c.last_run_ms(CorrectionKind::Render), Some(10));
        assert_eq!(c.last_run_ms(CorrectionKind::Combat), None);
    }

    #[test]
    fn unknown_names_are_ignored() {
        let (mut c, metrics) = corrector();
        let mut world = SandboxWorld::new();
        assert_eq!(c.trigger_named("REBOOT", &mut world, 0), TriggerOutcome::Unknown);
        assert!(c.history().is_empty());
        assert_eq!(metrics.snapshot().corrections_executed, 0);
    }

    #[test]
    fn spatial_culls_distant_transients_only() {
        let (mut c, _) = corrector();
        let mut world = SandboxWorld::new().with_entities(vec![
            EntityState::new(1, 10.0, 10.0, 5.0, 5.0),
            EntityState::new(2, 900.0, 0.0, 5.0, 5.0),
            EntityState::new(3, 0.0, 900.0, 5.0, 5.0).persistent(),
        ]);
        c.trigger(CorrectionKind::Spatial, &mut world, 0);
        let ids: Vec<u64> = world.entities.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(c.history()[0].detail, "index rebuilt, culled 1");
    }

    #[test]
    fn combat_clamps_health() {
        let (mut c, _) = corrector();
        let mut world = SandboxWorld::new().with_entities(vec![
            EntityState::new(1, 0.0, 0.0, 150.0, 100.0),
            EntityState::new(2, 0.0, 0.0, -4.0, 100.0),
            EntityState::new(3, 0.0, 0.0, f64::NAN, 100.0),
            EntityState::new(4, 0.0, 0.0, 40.0, 100.0),
        ]);
        c.trigger_named("combat", &mut world, 0);
        let hp: Vec<f64> = world.entities.iter().map(|e| e.hp).collect();
        assert_eq!(hp, vec![100.0, 0.0, 0.0, 40.0]);
        assert_eq!(c.history()[0].detail, "clamped 3 entities");
    }

    #[test]
    fn world_gen_reduces_entropy() {
        let (mut c, _) = corrector();
        let mut world = SandboxWorld::new();
        c.trigger(CorrectionKind::WorldGen, &mut world, 0);
        assert!((world.world_entropy - 0.8).abs() < 1e-12);
    }

    #[test]
    fn inventory_lock_expires_on_tick() {
        let (mut c, _) = corrector();
        let mut world = SandboxWorld::new();
        c.trigger(CorrectionKind::Inventory, &mut world, 1_000);
        assert!(world.inventory_locked);
        c.tick(&mut world, 2_999);
        assert!(world.inventory_locked);
        c.tick(&mut world, 3_000);
        assert!(!world.inventory_locked);
    }

    #[test]
    fn history_is_bounded() {
        let metrics = Arc::new(KernelMetrics::new());
        let config = CorrectionConfig {
            history_capacity: 2,
            render_cooldown_ms: 0,
            ..CorrectionConfig::default()
        };
        let mut c = RealityCorrector::new(config, metrics);
        let mut world = SandboxWorld::new();
        for t in 0..5 {
            c.trigger(CorrectionKind::Render, &mut world, t);
        }
        let stamps: Vec<u64> = c.history().iter().map(|r| r.timestamp_ms).collect();
        assert_eq!(stamps, vec![3, 4]);
    }
}
