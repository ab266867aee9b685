//! Axioms: named predicates over a domain context that must always hold.
//!
//! An axiom whose context variant does not match its domain is vacuously
//! true, so callers can pass any context to `verify` without tripping
//! unrelated checks.

use std::fmt;

use axiomguard_core::{CombatStep, LabeledRect, Segment, validate_non_overlap};
use serde::{Deserialize, Serialize};

use crate::domain::{DomainTag, Severity};

/// One inventory slot as seen by the inventory subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventorySlot {
    pub item_id: String,
    pub quantity: i64,
    pub max_stack: i64,
}

/// World-generation parameters sampled at check time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldSample {
    /// Generator entropy, expected in `[0, 1]`.
    pub entropy: f64,
}

/// An active status effect (buff, debuff, damage-over-time).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEffect {
    pub id: String,
    pub remaining_ms: f64,
}

/// Domain-specific input handed to axiom checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum CheckContext {
    Combat(CombatStep),
    Geometry(Vec<LabeledRect>),
    Segments(Vec<Segment>),
    Inventory(Vec<InventorySlot>),
    World(WorldSample),
    Status(Vec<StatusEffect>),
    /// Free-form payload for host-registered axioms.
    Custom(serde_json::Value),
}

type CheckFn = Box<dyn Fn(&CheckContext) -> bool + Send + Sync>;
type DescribeFn = Box<dyn Fn(&CheckContext) -> String + Send + Sync>;

/// A registered invariant. Immutable once built; identified by `id`.
pub struct Axiom {
    pub id: String,
    pub domain: DomainTag,
    pub severity: Severity,
    check: CheckFn,
    describe: DescribeFn,
}

impl Axiom {
    pub fn new(
        id: impl Into<String>,
        domain: DomainTag,
        severity: Severity,
        check: impl Fn(&CheckContext) -> bool + Send + Sync + 'static,
        describe: impl Fn(&CheckContext) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            domain,
            severity,
            check: Box::new(check),
            describe: Box::new(describe),
        }
    }

    /// True when the invariant holds for `ctx`.
    #[must_use]
    pub fn holds(&self, ctx: &CheckContext) -> bool {
        (self.check)(ctx)
    }

    /// Human-readable diagnostic for a failing `ctx`.
    #[must_use]
    pub fn describe(&self, ctx: &CheckContext) -> String {
        (self.describe)(ctx)
    }
}

impl fmt::Debug for Axiom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Axiom")
            .field("id", &self.id)
            .field("domain", &self.domain)
            .field("severity", &self.severity)
            .finish_non_exhaustive()
    }
}

/// The built-in axiom set. Combat and geometry delegate to the canonical
/// bridge in `axiomguard-core`.
#[must_use]
pub fn canonical_axioms() -> Vec<Axiom> {
    vec![
        Axiom::new(
            "combat.step_arithmetic",
            DomainTag::Combat,
            Severity::Critical,
            |ctx| match ctx {
                CheckContext::Combat(step) => step.validate().is_ok(),
                _ => true,
            },
            |ctx| match ctx {
                CheckContext::Combat(step) => match step.validate() {
                    Err(v) => format!("illegal damage application: {v}"),
                    Ok(()) => "combat step is legal".to_string(),
                },
                _ => "not a combat context".to_string(),
            },
        ),
        Axiom::new(
            "combat.hp_finite",
            DomainTag::Combat,
            Severity::High,
            |ctx| match ctx {
                CheckContext::Combat(step) => [step.prev, step.next]
                    .iter()
                    .all(|s| s.hp.is_finite() && s.max_hp.is_finite() && s.hp >= 0.0),
                _ => true,
            },
            |ctx| match ctx {
                CheckContext::Combat(step) => format!(
                    "non-finite or negative health (prev {}, next {})",
                    step.prev.hp, step.next.hp
                ),
                _ => "not a combat context".to_string(),
            },
        ),
        Axiom::new(
            "geometry.non_overlap",
            DomainTag::Geometry,
            Severity::High,
            |ctx| match ctx {
                CheckContext::Geometry(rects) => validate_non_overlap(rects).is_ok(),
                _ => true,
            },
            |ctx| match ctx {
                CheckContext::Geometry(rects) => match validate_non_overlap(rects) {
                    Err(v) => v.message,
                    Ok(()) => "no overlap".to_string(),
                },
                _ => "not a geometry context".to_string(),
            },
        ),
        Axiom::new(
            "geometry.positive_extent",
            DomainTag::Geometry,
            Severity::Medium,
            |ctx| match ctx {
                CheckContext::Geometry(rects) => rects.iter().all(|r| r.rect.has_positive_extent()),
                _ => true,
            },
            |ctx| match ctx {
                CheckContext::Geometry(rects) => {
                    let bad: Vec<&str> = rects
                        .iter()
                        .filter(|r| !r.rect.has_positive_extent())
                        .map(|r| r.id.as_str())
                        .collect();
                    format!("degenerate bounds: {}", bad.join(", "))
                }
                _ => "not a geometry context".to_string(),
            },
        ),
        Axiom::new(
            "geometry_segments.non_degenerate",
            DomainTag::GeometrySegments,
            Severity::Medium,
            |ctx| match ctx {
                CheckContext::Segments(segs) => segs.iter().all(|s| !s.is_degenerate()),
                _ => true,
            },
            |ctx| match ctx {
                CheckContext::Segments(segs) => {
                    let bad: Vec<&str> = segs
                        .iter()
                        .filter(|s| s.is_degenerate())
                        .map(|s| s.id.as_str())
                        .collect();
                    format!("degenerate segments: {}", bad.join(", "))
                }
                _ => "not a segment context".to_string(),
            },
        ),
        Axiom::new(
            "inventory.stack_bounds",
            DomainTag::Inventory,
            Severity::High,
            |ctx| match ctx {
                CheckContext::Inventory(slots) => slots
                    .iter()
                    .all(|s| s.quantity >= 0 && s.quantity <= s.max_stack),
                _ => true,
            },
            |ctx| match ctx {
                CheckContext::Inventory(slots) => {
                    let bad: Vec<String> = slots
                        .iter()
                        .filter(|s| s.quantity < 0 || s.quantity > s.max_stack)
                        .map(|s| format!("{}={}/{}", s.item_id, s.quantity, s.max_stack))
                        .collect();
                    format!("stack out of bounds: {}", bad.join(", "))
                }
                _ => "not an inventory context".to_string(),
            },
        ),
        Axiom::new(
            "world.entropy_bounded",
            DomainTag::World,
            Severity::Medium,
            |ctx| match ctx {
                CheckContext::World(w) => (0.0..=1.0).contains(&w.entropy),
                _ => true,
            },
            |ctx| match ctx {
                CheckContext::World(w) => format!("generator entropy {} outside [0, 1]", w.entropy),
                _ => "not a world context".to_string(),
            },
        ),
        Axiom::new(
            "status.durations_valid",
            DomainTag::Status,
            Severity::Low,
            |ctx| match ctx {
                CheckContext::Status(effects) => effects
                    .iter()
                    .all(|e| e.remaining_ms.is_finite() && e.remaining_ms >= 0.0),
                _ => true,
            },
            |ctx| match ctx {
                CheckContext::Status(effects) => {
                    let bad: Vec<&str> = effects
                        .iter()
                        .filter(|e| !(e.remaining_ms.is_finite() && e.remaining_ms >= 0.0))
                        .map(|e| e.id.as_str())
                        .collect();
                    format!("invalid effect durations: {}", bad.join(", "))
                }
                _ => "not a status context".to_string(),
            },
        ),
    ]
}

#[cfg(test)]
mod tests {
    use axiomguard_core::{CombatantState, DamageInput, Rect};

    use super::*;

    fn find(id: &str) -> Axiom {
        canonical_axioms()
            .into_iter()
            .find(|a| a.id == id)
            .expect("canonical axiom exists")
    }

    #[test]
    fn canonical_ids_are_unique() {
        let axioms = canonical_axioms();
        let mut ids: Vec<&str> = axioms.iter().map(|a| a.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), axioms.len());
    }

    #[test]
    fn combat_arithmetic_delegates_to_bridge() {
        let axiom = find("combat.step_arithmetic");
        let mut step = CombatStep {
            prev: CombatantState::new(100.0, 100.0, 5.0),
            input: DamageInput::new(10.0, 0.0),
            next: CombatantState::new(95.0, 100.0, 5.0),
        };
        assert!(axiom.holds(&CheckContext::Combat(step)));
        step.next.hp = 80.0;
        let ctx = CheckContext::Combat(step);
        assert!(!axiom.holds(&ctx));
        assert!(axiom.describe(&ctx).contains("expected 95"));
    }

    #[test]
    fn mismatched_context_is_vacuously_true() {
        let axiom = find("geometry.non_overlap");
        assert!(axiom.holds(&CheckContext::World(WorldSample { entropy: 9.0 })));
    }

    #[test]
    fn overlap_axiom_names_the_pair() {
        let axiom = find("geometry.non_overlap");
        let ctx = CheckContext::Geometry(vec![
            LabeledRect::new("crate", Rect::new(0.0, 0.0, 2.0, 2.0)),
            LabeledRect::new("barrel", Rect::new(1.0, 1.0, 3.0, 3.0)),
        ]);
        assert!(!axiom.holds(&ctx));
        let msg = axiom.describe(&ctx);
        assert!(msg.contains("crate") && msg.contains("barrel"));
    }

    #[test]
    fn inventory_bounds() {
        let axiom = find("inventory.stack_bounds");
        let ok = CheckContext::Inventory(vec![InventorySlot {
            item_id: "potion".into(),
            quantity: 20,
            max_stack: 20,
        }]);
        let bad = CheckContext::Inventory(vec![InventorySlot {
            item_id: "potion".into(),
            quantity: 21,
            max_stack: 20,
        }]);
        assert!(axiom.holds(&ok));
        assert!(!axiom.holds(&bad));
        assert_eq!(axiom.describe(&bad), "stack out of bounds: potion=21/20");
    }

    #[test]
    fn context_serializes_with_kind_tag() {
        let ctx = CheckContext::World(WorldSample { entropy: 0.5 });
        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["kind"], "world");
        assert_eq!(json["data"]["entropy"], 0.5);
    }
}
