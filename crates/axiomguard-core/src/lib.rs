//! # axiomguard-core
//!
//! Canonical domain checks for the axiomguard supervision kernel.
//!
//! These functions are the ground-truth oracle for the two domains whose
//! correctness is arithmetic rather than statistical:
//! - **Geometry** (`geometry`): open-interval rectangle overlap and the
//!   all-pairs non-overlap scan, plus segment sanity.
//! - **Combat** (`combat`): legality of a single damage application.
//!
//! Everything here is pure and deterministic. The verification engine's
//! axioms and the supervisor-facing transaction wrappers delegate to these
//! functions instead of re-deriving the arithmetic.

#![deny(unsafe_code)]

pub mod combat;
pub mod geometry;

pub use combat::{
    CombatStep, CombatStepViolation, CombatantState, DamageInput, HP_TOLERANCE, expected_hp,
    validate_combat_step,
};
pub use geometry::{
    LabeledRect, OverlapViolation, Rect, Segment, rectangles_overlap, validate_non_overlap,
};
