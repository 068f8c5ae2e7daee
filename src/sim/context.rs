//! Shared per-tick context
//!
//! Bundles the state every component may touch during a tick so ownership
//! stays explicit instead of components reaching into a global scene.

use rand_pcg::Pcg32;

use super::motion::MotionController;
use super::state::{GameEvent, RunState, World};

pub struct Ctx<'a> {
    pub run: &'a mut RunState,
    pub world: &'a mut World,
    pub motion: &'a mut MotionController,
    pub rng: &'a mut Pcg32,
    pub events: &'a mut Vec<GameEvent>,
}

impl Ctx<'_> {
    pub fn emit(&mut self, event: GameEvent) {
        self.events.push(event);
    }
}
