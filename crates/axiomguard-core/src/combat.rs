//! Combat-step arithmetic.
//!
//! A damage application is legal when the defender's new health matches
//! `max(0, hp - max(0, damage - max(0, armor - penetration)))` and never
//! exceeds the new maximum. Values are integral in practice; the
//! comparison allows [`HP_TOLERANCE`] of floating-point drift.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Allowed absolute drift between reported and expected health.
pub const HP_TOLERANCE: f64 = 0.1;

/// Health/armor state of one combatant at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CombatantState {
    pub hp: f64,
    pub max_hp: f64,
    pub armor: f64,
}

impl CombatantState {
    #[must_use]
    pub const fn new(hp: f64, max_hp: f64, armor: f64) -> Self {
        Self { hp, max_hp, armor }
    }
}

/// One incoming hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DamageInput {
    pub damage: f64,
    pub penetration: f64,
}

impl DamageInput {
    #[must_use]
    pub const fn new(damage: f64, penetration: f64) -> Self {
        Self {
            damage,
            penetration,
        }
    }
}

/// Before/input/after triple checked by [`validate_combat_step`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CombatStep {
    pub prev: CombatantState,
    pub input: DamageInput,
    pub next: CombatantState,
}

impl CombatStep {
    pub fn validate(&self) -> Result<(), CombatStepViolation> {
        validate_combat_step(&self.prev, &self.input, &self.next)
    }
}

/// Why a combat step was rejected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CombatStepViolation {
    /// Health above the maximum, regardless of the arithmetic.
    HpAboveMax { hp: f64, max_hp: f64 },
    /// Health is NaN or infinite.
    NonFiniteHp { hp: f64 },
    /// Health disagrees with the expected result by more than the tolerance.
    HpMismatch { expected: f64, actual: f64 },
}

impl fmt::Display for CombatStepViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HpAboveMax { hp, max_hp } => {
                write!(f, "hp {hp} exceeds max_hp {max_hp}")
            }
            Self::NonFiniteHp { hp } => write!(f, "hp is not finite ({hp})"),
            Self::HpMismatch { expected, actual } => {
                write!(f, "hp {actual} does not match expected {expected}")
            }
        }
    }
}

impl std::error::Error for CombatStepViolation {}

/// Health the defender should have after `input` lands on `prev`.
#[must_use]
pub fn expected_hp(prev: &CombatantState, input: &DamageInput) -> f64 {
    let effective_armor = (prev.armor - input.penetration).max(0.0);
    let expected_damage = (input.damage - effective_armor).max(0.0);
    (prev.hp - expected_damage).max(0.0)
}

/// Single source of truth for "is this damage application legal".
pub fn validate_combat_step(
    prev: &CombatantState,
    input: &DamageInput,
    next: &CombatantState,
) -> Result<(), CombatStepViolation> {
    if !next.hp.is_finite() {
        return Err(CombatStepViolation::NonFiniteHp { hp: next.hp });
    }
    if next.hp > next.max_hp {
        return Err(CombatStepViolation::HpAboveMax {
            hp: next.hp,
            max_hp: next.max_hp,
        });
    }
    let expected = expected_hp(prev, input);
    if (next.hp - expected).abs() > HP_TOLERANCE {
        return Err(CombatStepViolation::HpMismatch {
            expected,
            actual: next.hp,
        });
    }
    Ok(())
}
