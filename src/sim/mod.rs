//! Deterministic simulation module
//!
//! All gameplay logic lives here. This module must be pure and deterministic:
//! - Fixed timestep only
//! - Seeded RNG only
//! - Stable iteration order (by entity ID)
//! - No rendering or platform dependencies

pub mod collision;
pub mod context;
pub mod motion;
pub mod patterns;
pub mod phase;
pub mod quiz;
pub mod script;
pub mod spawn;
pub mod state;
pub mod tick;

pub use collision::{CollisionRouter, ContactRule};
pub use motion::{MotionController, MotionState};
pub use phase::{Dialog, EncounterKind, Phase, PhaseStateMachine, SpawnMode};
pub use quiz::{Question, QuestionBank};
pub use spawn::SpawnScheduler;
pub use state::{Entity, EntityKind, GameEvent, RunState, World, Zone};
pub use tick::{SimClock, Simulation, TickInput};
