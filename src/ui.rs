//! Read-only view published to the UI collaborator
//!
//! The UI never touches simulation state; it reads a `UiSnapshot` (pulled at
//! a throttled rate) and calls back through the `Simulation` inbound methods.

use serde::{Deserialize, Serialize};

use crate::consts::MAX_HEARTS;
use crate::sim::motion::{Feedback, MotionController, MotionState};
use crate::sim::phase::{Dialog, Phase, PhaseStateMachine};
use crate::sim::state::{RunState, Zone};

/// Question as shown to the player (no answer key)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionView {
    pub id: u32,
    pub text: String,
    pub options: Vec<String>,
}

/// End-of-stage report shown before the zone transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSummary {
    pub stage: u32,
    pub zone_name: String,
    /// Meters covered in the stage
    pub distance: f32,
    /// Stars held by the run so far
    pub stars: u32,
    pub correct: u32,
    pub incorrect: u32,
    /// Scaled seconds spent in the stage
    pub elapsed: f32,
    /// Acknowledging this summary ends the run
    pub is_final: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DialogView {
    Question(QuestionView),
    Message(String),
    Summary(StageSummary),
}

impl From<&Dialog> for DialogView {
    fn from(dialog: &Dialog) -> Self {
        match dialog {
            Dialog::Question(q) => DialogView::Question(QuestionView {
                id: q.id,
                text: q.text.clone(),
                options: q.options.clone(),
            }),
            Dialog::Message(text) => DialogView::Message(text.clone()),
            Dialog::Summary(summary) => DialogView::Summary(summary.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiSnapshot {
    pub distance: u32,
    pub speed: f32,
    pub stage: u32,
    pub zone: Zone,
    pub zone_name: String,
    pub hearts: u8,
    pub max_hearts: u8,
    pub stars: u32,
    pub phase: Phase,
    pub motion: MotionState,
    pub climb_progress: f32,
    pub shielded: bool,
    pub flashing: bool,
    /// Dust puffs and after-images behind the avatar, oldest first
    pub trail: Vec<Feedback>,
    pub guidance: Option<String>,
    pub dialog: Option<DialogView>,
    pub is_game_over: bool,
    pub is_victory: bool,
}

impl UiSnapshot {
    pub fn capture(run: &RunState, motion: &MotionController, phases: &PhaseStateMachine) -> Self {
        Self {
            distance: run.distance().floor() as u32,
            speed: run.speed(),
            stage: run.stage(),
            zone: run.zone(),
            zone_name: run.zone().name().to_string(),
            hearts: run.hearts(),
            max_hearts: MAX_HEARTS,
            stars: run.stars(),
            phase: phases.current_phase(),
            motion: motion.current_state(),
            climb_progress: motion.climb_progress(),
            shielded: motion.is_shielded(),
            flashing: motion.is_flashing(),
            trail: motion.feedback().to_vec(),
            guidance: phases.guidance().map(|g| g.text.clone()),
            dialog: phases.dialog().map(DialogView::from),
            is_game_over: run.is_game_over(),
            is_victory: run.is_victory(),
        }
    }
}

/// Lets a snapshot through at most `hz` times per real second
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotThrottle {
    interval: f32,
    accumulator: f32,
}

impl SnapshotThrottle {
    pub fn new(hz: f32) -> Self {
        let interval = if hz > 0.0 { 1.0 / hz } else { 0.0 };
        Self {
            interval,
            // First poll publishes immediately
            accumulator: interval,
        }
    }

    pub fn ready(&mut self, real_dt: f32) -> bool {
        self.accumulator += real_dt.max(0.0);
        if self.accumulator >= self.interval {
            self.accumulator = (self.accumulator - self.interval).min(self.interval);
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.accumulator = self.interval;
    }
}
