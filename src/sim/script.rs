//! Cutscene step lists
//!
//! A phase's delay → action → delay chain is a queue of steps executed by
//! the phase's own tick. Dropping the script cancels every pending step at
//! once, which is all `reset()` needs to do.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::phase::Phase;

/// Things a script can wait for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    /// Entity's center reached `x` scrolling left. A stale entity counts as arrived.
    ObjectReachedX { id: u32, x: f32 },
    MessageDismissed,
    SummaryAcknowledged,
    EncounterCleared,
}

/// Side effects a script can request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScriptAction {
    ShowMessage(String),
    ShowGuidance(String),
    EnterScripted { target_x: Option<f32> },
    ExitScripted,
    EnterStruggle,
    ExitStruggle,
    RestoreHearts,
    RecordIntroEnd,
    MarkMarketDiscovered,
    ShowStageSummary,
    AdvanceStage,
    FinishRun,
    EndRide,
    Goto(Phase),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Step {
    Wait(f32),
    WaitUntil(Condition),
    Do(ScriptAction),
}

/// Pending steps owned by one phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Script {
    owner: Phase,
    steps: VecDeque<Step>,
    elapsed: f32,
}

impl Script {
    pub fn new(owner: Phase, steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            owner,
            steps: steps.into_iter().collect(),
            elapsed: 0.0,
        }
    }

    pub fn owner(&self) -> Phase {
        self.owner
    }

    pub fn is_finished(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.steps.len()
    }

    /// Scaled time spent on the current wait
    pub fn tick(&mut self, dt: f32) {
        self.elapsed += dt;
    }

    /// Pop the next action if everything in front of it is satisfied
    pub fn next_action(&mut self, is_met: impl Fn(&Condition) -> bool) -> Option<ScriptAction> {
        loop {
            match self.steps.front()? {
                Step::Wait(secs) => {
                    if self.elapsed < *secs {
                        return None;
                    }
                    self.elapsed -= *secs;
                    self.steps.pop_front();
                }
                Step::WaitUntil(cond) => {
                    if !is_met(cond) {
                        return None;
                    }
                    self.elapsed = 0.0;
                    self.steps.pop_front();
                }
                Step::Do(_) => {
                    if let Some(Step::Do(action)) = self.steps.pop_front() {
                        return Some(action);
                    }
                }
            }
        }
    }
}
