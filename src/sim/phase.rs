//! Run-level phase state machine
//!
//! Owns the scripted timeline: intro, level end gate, hazard, the market
//! discovery, the carpet ride and ledge hanging. Each phase's delay → action
//! chain is a `Script` stored here and executed by `tick`, so `reset` cancels
//! every pending step by dropping it.
//!
//! Phases never write the run's speed; they expose a factor that the
//! simulation loop applies to the stage speed.

use glam::Vec2;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::context::Ctx;
use super::motion::MotionState;
use super::quiz::{Question, QuestionBank};
use super::script::{Condition, Script, ScriptAction, Step};
use super::state::{EntityKind, GameEvent, RunState, World, Zone};
use crate::consts::*;
use crate::tuning::{PhaseTuning, Tuning, WorldTuning};
use crate::ui::StageSummary;

/// Exactly one phase is active at a time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Intro,
    NormalRun,
    LevelEndApproach,
    LevelEndGate,
    ZoneTransition,
    Stage2Intro,
    Recovery,
    HazardOnset,
    HazardWalk,
    HazardApproach,
    HazardShelter,
    SecondZoneApproach,
    SecondZoneEntry,
    SpecialRide,
    Hanging,
}

/// What the spawner may place this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpawnMode {
    Disabled,
    Ordinary,
    FlightOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncounterKind {
    Gate,
    Chest,
    Carpet,
}

/// A scripted obstacle bound to one world object
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Encounter {
    pub kind: EncounterKind,
    pub object: u32,
    pub is_active: bool,
    pub is_opening: bool,
    /// Seconds before the question may be asked again
    cooldown: f32,
    opening_timer: f32,
}

impl Encounter {
    fn new(kind: EncounterKind, object: u32) -> Self {
        Self {
            kind,
            object,
            is_active: true,
            is_opening: false,
            cooldown: 0.0,
            opening_timer: 0.0,
        }
    }
}

/// Notifications from other components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhaseEvent {
    LedgeGrab,
    CarpetContact { carpet: u32 },
    RideEnd,
    ChestSpawned { chest: u32 },
}

/// Soft-pause dialogs; at most one is open
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Dialog {
    Question(Question),
    Message(String),
    Summary(StageSummary),
}

/// Short hint shown over gameplay, timed in real seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guidance {
    pub text: String,
    pub remaining: f32,
}

fn condition_met(
    cond: &Condition,
    dialog: &Option<Dialog>,
    encounter: &Option<Encounter>,
    world: &World,
) -> bool {
    match cond {
        Condition::ObjectReachedX { id, x } => match world.get(*id) {
            Some(entity) => entity.pos.x <= *x,
            None => {
                warn!("Scripted object {id} is gone, treating its arrival as done");
                true
            }
        },
        Condition::MessageDismissed => !matches!(dialog, Some(Dialog::Message(_))),
        Condition::SummaryAcknowledged => !matches!(dialog, Some(Dialog::Summary(_))),
        Condition::EncounterCleared => encounter.is_none(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseStateMachine {
    tuning: PhaseTuning,
    layout: WorldTuning,
    guidance_lifetime: f32,
    phase: Phase,
    /// Scaled seconds in the current phase
    phase_time: f32,
    phase_speed: f32,
    script: Option<Script>,
    /// Object spawned or claimed by the current phase chain
    transient: Option<u32>,
    encounter: Option<Encounter>,
    dialog: Option<Dialog>,
    guidance: Option<Guidance>,
    questions: QuestionBank,
    intro_end_distance: f32,
    hazard_done: bool,
    market_triggered: bool,
    market_discovered: bool,
    stage_correct: u32,
    stage_incorrect: u32,
    last_refused: Option<Phase>,
}

impl PhaseStateMachine {
    pub fn new(tuning: &Tuning, questions: QuestionBank) -> Self {
        let mut machine = Self {
            tuning: tuning.phase.clone(),
            layout: tuning.world.clone(),
            guidance_lifetime: tuning.ui.guidance_lifetime,
            phase: Phase::Intro,
            phase_time: 0.0,
            phase_speed: 0.0,
            script: None,
            transient: None,
            encounter: None,
            dialog: None,
            guidance: None,
            questions,
            intro_end_distance: 0.0,
            hazard_done: false,
            market_triggered: false,
            market_discovered: false,
            stage_correct: 0,
            stage_incorrect: 0,
            last_refused: None,
        };
        machine.start_intro();
        machine
    }

    /// Cancel every pending chain and start over at the intro
    pub fn reset(&mut self) {
        self.script = None;
        self.transient = None;
        self.encounter = None;
        self.dialog = None;
        self.guidance = None;
        self.intro_end_distance = 0.0;
        self.hazard_done = false;
        self.market_triggered = false;
        self.market_discovered = false;
        self.stage_correct = 0;
        self.stage_incorrect = 0;
        self.last_refused = None;
        self.questions.reset();
        self.start_intro();
    }

    fn start_intro(&mut self) {
        self.phase = Phase::Intro;
        self.phase_time = 0.0;
        self.phase_speed = self.tuning.intro_speed;
        self.show_guidance("Tap to jump!");
        self.script = Some(Script::new(
            Phase::Intro,
            [
                Step::Wait(self.tuning.intro_duration),
                Step::Do(ScriptAction::RecordIntroEnd),
                Step::Do(ScriptAction::Goto(Phase::NormalRun)),
            ],
        ));
    }

    pub fn current_phase(&self) -> Phase {
        self.phase
    }

    pub fn phase_time(&self) -> f32 {
        self.phase_time
    }

    pub fn encounter(&self) -> Option<&Encounter> {
        self.encounter.as_ref()
    }

    pub fn dialog(&self) -> Option<&Dialog> {
        self.dialog.as_ref()
    }

    pub fn guidance(&self) -> Option<&Guidance> {
        self.guidance.as_ref()
    }

    pub fn pending_question(&self) -> Option<&Question> {
        match &self.dialog {
            Some(Dialog::Question(q)) => Some(q),
            _ => None,
        }
    }

    pub fn script(&self) -> Option<&Script> {
        self.script.as_ref()
    }

    pub fn transient(&self) -> Option<u32> {
        self.transient
    }

    pub fn is_market_discovered(&self) -> bool {
        self.market_discovered
    }

    pub fn stage_answers(&self) -> (u32, u32) {
        (self.stage_correct, self.stage_incorrect)
    }

    /// Fraction of the stage speed the world should scroll at
    pub fn speed_factor(&self) -> f32 {
        let opening = self.encounter.is_some_and(|e| e.is_opening);
        if self.dialog.is_some() || opening {
            0.0
        } else {
            self.phase_speed
        }
    }

    /// Avatar physics pause while a dialog is open
    pub fn physics_frozen(&self) -> bool {
        self.dialog.is_some()
    }

    /// Global time scale for gameplay timers
    pub fn time_scale(&self) -> f32 {
        if self.dialog.is_some() {
            self.tuning.soft_pause_time_scale
        } else {
            1.0
        }
    }

    pub fn spawn_mode(&self) -> SpawnMode {
        if self.dialog.is_some() || self.speed_factor() <= 0.0 {
            return SpawnMode::Disabled;
        }
        match self.phase {
            Phase::NormalRun => SpawnMode::Ordinary,
            Phase::SpecialRide => SpawnMode::FlightOnly,
            _ => SpawnMode::Disabled,
        }
    }

    pub fn is_spawning_allowed(&self) -> bool {
        self.spawn_mode() != SpawnMode::Disabled
    }

    /// Whether a new phase chain or encounter may start now
    pub fn can_enter(&self, world: &World) -> bool {
        self.phase == Phase::NormalRun
            && self.dialog.is_none()
            && self.encounter.is_none()
            && self.transient.is_none_or(|id| !world.contains(id))
    }

    /// A chest may be placed only while nothing else is scripted
    pub fn can_start_encounter(&self) -> bool {
        self.phase == Phase::NormalRun && self.encounter.is_none()
    }

    /// Absolute distances of this stage's scripted beats, ascending
    pub fn checkpoints(&self, run: &RunState) -> Vec<f32> {
        let start = run.stage_started_at();
        let end = start + self.layout.stage_length;
        let beat = match run.zone() {
            Zone::First => Some(self.intro_end_distance.max(start) + self.tuning.hazard_trigger_distance),
            Zone::Second => Some(start + self.tuning.second_zone_discovery_distance),
            Zone::Third => None,
        };
        let mut points = vec![start];
        points.extend(beat.filter(|b| *b > start && *b < end));
        points.push(end);
        points
    }

    pub fn show_guidance(&mut self, text: impl Into<String>) {
        self.guidance = Some(Guidance {
            text: text.into(),
            remaining: self.guidance_lifetime,
        });
    }

    /// UI-facing timers, real seconds
    pub fn tick_ui(&mut self, real_dt: f32) {
        if let Some(guidance) = self.guidance.as_mut() {
            guidance.remaining -= real_dt;
            if guidance.remaining <= 0.0 {
                self.guidance = None;
            }
        }
    }

    /// Advance the timeline by scaled `dt`
    pub fn tick(&mut self, dt: f32, ctx: &mut Ctx) {
        if ctx.run.is_game_over() {
            return;
        }
        self.phase_time += dt;
        self.check_transitions(ctx);
        self.run_script(dt, ctx);
        self.tick_encounter(dt, ctx);
    }

    fn run_script(&mut self, dt: f32, ctx: &mut Ctx) {
        if let Some(script) = self.script.as_mut() {
            script.tick(dt);
        }
        loop {
            let Some(script) = self.script.as_mut() else {
                break;
            };
            let dialog = &self.dialog;
            let encounter = &self.encounter;
            let world = &*ctx.world;
            match script.next_action(|c| condition_met(c, dialog, encounter, world)) {
                Some(action) => self.apply(action, ctx),
                None => {
                    if script.is_finished() {
                        self.script = None;
                    }
                    break;
                }
            }
        }
    }

    fn apply(&mut self, action: ScriptAction, ctx: &mut Ctx) {
        match action {
            ScriptAction::ShowMessage(text) => self.dialog = Some(Dialog::Message(text)),
            ScriptAction::ShowGuidance(text) => self.show_guidance(text),
            ScriptAction::EnterScripted { target_x } => {
                ctx.motion.enter_scripted();
                ctx.motion.set_scripted_target(target_x);
                self.clear_path(ctx);
            }
            ScriptAction::ExitScripted => ctx.motion.exit_scripted(),
            ScriptAction::EnterStruggle => {
                ctx.motion.enter_struggle();
                self.clear_path(ctx);
            }
            ScriptAction::ExitStruggle => ctx.motion.exit_struggle(),
            ScriptAction::RestoreHearts => {
                ctx.run.restore_hearts();
                let pos = ctx.motion.position() - Vec2::new(0.0, AVATAR_HEIGHT);
                ctx.emit(GameEvent::FloatingText {
                    text: "Hearts restored".to_string(),
                    pos,
                });
            }
            ScriptAction::RecordIntroEnd => self.intro_end_distance = ctx.run.distance(),
            ScriptAction::MarkMarketDiscovered => {
                self.market_discovered = true;
                info!("Market discovered at {:.0}m", ctx.run.distance());
            }
            ScriptAction::ShowStageSummary => {
                let summary = self.stage_summary(ctx.run);
                self.dialog = Some(Dialog::Summary(summary));
            }
            ScriptAction::AdvanceStage => self.advance_stage(ctx),
            ScriptAction::FinishRun => {
                info!("Run complete after stage {}", ctx.run.stage());
                ctx.run.mark_game_over(true);
                ctx.emit(GameEvent::GameOver { victory: true });
            }
            ScriptAction::EndRide => self.end_ride(ctx),
            ScriptAction::Goto(phase) => self.transition(phase, ctx),
        }
    }

    /// Nothing the avatar could hit or fall into stays ahead of forced motion
    fn clear_path(&self, ctx: &mut Ctx) {
        let behind = ctx.motion.position().x - AVATAR_WIDTH * 0.5;
        let cleared = ctx.world.clear_obstacles_from(behind);
        if cleared > 0 {
            debug!("Cleared {cleared} obstacles ahead of {:?}", self.phase);
        }
    }

    fn stage_summary(&self, run: &RunState) -> StageSummary {
        StageSummary {
            stage: run.stage(),
            zone_name: run.zone().name().to_string(),
            distance: run.stage_distance(),
            stars: run.stars(),
            correct: self.stage_correct,
            incorrect: self.stage_incorrect,
            elapsed: run.stage_elapsed(),
            is_final: run.stage() >= self.layout.stage_count,
        }
    }

    fn advance_stage(&mut self, ctx: &mut Ctx) {
        let stage = ctx.run.advance_stage();
        ctx.motion.unlock_variable_jump();
        self.stage_correct = 0;
        self.stage_incorrect = 0;
        info!("Stage {stage} ({})", ctx.run.zone().name());
        ctx.emit(GameEvent::StageAdvanced { stage });
    }

    fn check_transitions(&mut self, ctx: &mut Ctx) {
        match self.phase {
            Phase::NormalRun => {
                let wanted = if ctx.run.stage_distance() >= self.layout.stage_length {
                    Some(Phase::LevelEndApproach)
                } else if ctx.run.zone() == Zone::First
                    && !self.hazard_done
                    && ctx.run.distance() - self.intro_end_distance
                        >= self.tuning.hazard_trigger_distance
                {
                    Some(Phase::HazardOnset)
                } else if ctx.run.zone() == Zone::Second
                    && !self.market_triggered
                    && ctx.run.stage_distance() >= self.tuning.second_zone_discovery_distance
                {
                    Some(Phase::SecondZoneApproach)
                } else {
                    None
                };
                if let Some(phase) = wanted {
                    self.request(phase, ctx);
                }
            }
            Phase::Hanging => {
                if !matches!(
                    ctx.motion.current_state(),
                    MotionState::Hanging | MotionState::Climbing
                ) {
                    self.transition(Phase::NormalRun, ctx);
                }
            }
            Phase::SpecialRide => {
                if let Some(carpet) = self.transient {
                    if !ctx.world.contains(carpet) {
                        warn!("Ride carpet {carpet} is gone, ending the ride");
                        self.end_ride(ctx);
                    }
                }
            }
            _ => {}
        }
    }

    /// Start a new chain from NormalRun. Refused silently while anything else is in progress.
    fn request(&mut self, to: Phase, ctx: &mut Ctx) -> bool {
        if !self.can_enter(ctx.world) {
            if self.last_refused != Some(to) {
                debug!("Refused {to:?} during {:?}", self.phase);
                self.last_refused = Some(to);
            }
            return false;
        }
        self.last_refused = None;
        self.transient = None;
        self.transition(to, ctx);
        true
    }

    fn transition(&mut self, to: Phase, ctx: &mut Ctx) {
        let from = self.phase;
        info!("Phase {from:?} -> {to:?}");
        self.phase = to;
        self.phase_time = 0.0;
        self.script = None;
        ctx.emit(GameEvent::PhaseChanged { from, to });
        self.enter(to, ctx);
    }

    fn enter(&mut self, phase: Phase, ctx: &mut Ctx) {
        use ScriptAction::*;
        let t = &self.tuning;
        let steps = match phase {
            Phase::Intro => {
                self.start_intro();
                return;
            }
            Phase::NormalRun => {
                self.phase_speed = 1.0;
                Vec::new()
            }
            Phase::LevelEndApproach => {
                self.phase_speed = 1.0;
                let size = EntityKind::Gate.default_size();
                let gate = ctx.world.spawn_on_ground(EntityKind::Gate, SPAWN_X, 0.0, size);
                self.transient = Some(gate);
                vec![
                    Step::WaitUntil(Condition::ObjectReachedX {
                        id: gate,
                        x: SCREEN_CENTER_X,
                    }),
                    Step::Do(Goto(Phase::LevelEndGate)),
                ]
            }
            Phase::LevelEndGate => {
                self.phase_speed = 0.0;
                let last = if ctx.run.stage() >= self.layout.stage_count {
                    FinishRun
                } else {
                    Goto(Phase::ZoneTransition)
                };
                let steps = vec![
                    Step::WaitUntil(Condition::EncounterCleared),
                    Step::Do(ShowStageSummary),
                    Step::WaitUntil(Condition::SummaryAcknowledged),
                    Step::Do(last),
                ];
                match self.transient.filter(|id| ctx.world.contains(*id)) {
                    Some(gate) => {
                        self.encounter = Some(Encounter::new(EncounterKind::Gate, gate));
                        self.ask(ctx);
                    }
                    None => warn!("Gate is gone before its question, treating it as opened"),
                }
                steps
            }
            Phase::ZoneTransition => {
                self.phase_speed = 1.0;
                vec![
                    Step::Do(EnterScripted { target_x: None }),
                    Step::Wait(t.zone_transition_duration),
                    Step::Do(AdvanceStage),
                    Step::Do(Goto(Phase::Stage2Intro)),
                ]
            }
            Phase::Stage2Intro => {
                self.phase_speed = t.intro_speed;
                let text = format!("Stage {}: {}", ctx.run.stage(), ctx.run.zone().name());
                vec![
                    Step::Do(ShowGuidance(text)),
                    Step::Wait(t.stage_intro_duration),
                    Step::Do(ExitScripted),
                    Step::Do(Goto(Phase::NormalRun)),
                ]
            }
            Phase::Recovery => {
                self.phase_speed = 1.0;
                vec![
                    Step::Wait(t.recovery_duration),
                    Step::Do(Goto(Phase::NormalRun)),
                ]
            }
            Phase::HazardOnset => {
                self.hazard_done = true;
                self.phase_speed = t.hazard_onset_speed;
                vec![
                    Step::Do(ShowMessage(
                        "A sandstorm is rolling in! Push through it and find shelter.".to_string(),
                    )),
                    Step::WaitUntil(Condition::MessageDismissed),
                    Step::Wait(t.hazard_onset_duration),
                    Step::Do(Goto(Phase::HazardWalk)),
                ]
            }
            Phase::HazardWalk => {
                self.phase_speed = t.hazard_walk_speed;
                vec![
                    Step::Do(EnterStruggle),
                    Step::Do(ShowGuidance("Keep walking!".to_string())),
                    Step::Wait(t.hazard_walk_duration),
                    Step::Do(Goto(Phase::HazardApproach)),
                ]
            }
            Phase::HazardApproach => {
                self.phase_speed = t.hazard_approach_speed;
                let size = EntityKind::Shelter.default_size();
                let shelter = ctx.world.spawn_on_ground(EntityKind::Shelter, SPAWN_X, 0.0, size);
                self.transient = Some(shelter);
                vec![
                    Step::WaitUntil(Condition::ObjectReachedX {
                        id: shelter,
                        x: PLAYER_X + AVATAR_WIDTH,
                    }),
                    Step::Do(Goto(Phase::HazardShelter)),
                ]
            }
            Phase::HazardShelter => {
                self.phase_speed = 0.0;
                vec![
                    Step::Do(ExitStruggle),
                    Step::Do(EnterScripted { target_x: None }),
                    Step::Do(RestoreHearts),
                    Step::Wait(t.shelter_dwell),
                    Step::Do(ExitScripted),
                    Step::Do(Goto(Phase::NormalRun)),
                ]
            }
            Phase::SecondZoneApproach => {
                self.market_triggered = true;
                self.phase_speed = 1.0;
                let size = EntityKind::Landmark.default_size();
                let landmark = ctx.world.spawn_on_ground(EntityKind::Landmark, SPAWN_X, 0.0, size);
                self.transient = Some(landmark);
                vec![
                    Step::WaitUntil(Condition::ObjectReachedX {
                        id: landmark,
                        x: PLAYER_X + AVATAR_WIDTH,
                    }),
                    Step::Do(Goto(Phase::SecondZoneEntry)),
                ]
            }
            Phase::SecondZoneEntry => {
                self.phase_speed = 0.0;
                vec![
                    Step::Do(EnterScripted { target_x: None }),
                    Step::Do(ShowMessage(
                        "Welcome to the Spice Market! Mind the gaps between the stalls.".to_string(),
                    )),
                    Step::WaitUntil(Condition::MessageDismissed),
                    Step::Wait(t.second_zone_entry_dwell),
                    Step::Do(MarkMarketDiscovered),
                    Step::Do(ExitScripted),
                    Step::Do(Goto(Phase::NormalRun)),
                ]
            }
            Phase::SpecialRide => {
                self.phase_speed = 1.0;
                ctx.motion.enter_flight();
                vec![
                    Step::Do(ShowGuidance("Hold to fly higher!".to_string())),
                    Step::Wait(t.ride_duration),
                    Step::Do(EndRide),
                ]
            }
            Phase::Hanging => {
                self.phase_speed = 0.0;
                self.show_guidance("Tap repeatedly to climb!");
                Vec::new()
            }
        };
        self.script = (!steps.is_empty()).then(|| Script::new(phase, steps));
    }

    fn end_ride(&mut self, ctx: &mut Ctx) {
        if let Some(carpet) = self.transient.take() {
            ctx.world.despawn(carpet);
        }
        if self
            .encounter
            .is_some_and(|e| e.kind == EncounterKind::Carpet)
        {
            self.encounter = None;
        }
        ctx.motion.exit_flight();
        self.transition(Phase::Recovery, ctx);
    }

    /// Notification from the router or spawner. Returns true if it was acted on.
    pub fn notify(&mut self, event: PhaseEvent, ctx: &mut Ctx) -> bool {
        match event {
            PhaseEvent::LedgeGrab => self.request(Phase::Hanging, ctx),
            PhaseEvent::CarpetContact { carpet } => {
                if !self.can_enter(ctx.world) {
                    return false;
                }
                let Some(entity) = ctx.world.get_mut(carpet) else {
                    warn!("Carpet {carpet} is gone, ignoring contact");
                    return false;
                };
                entity.pinned = true;
                entity.vel = Vec2::ZERO;
                if !self.request(Phase::SpecialRide, ctx) {
                    return false;
                }
                self.transient = Some(carpet);
                self.encounter = Some(Encounter::new(EncounterKind::Carpet, carpet));
                true
            }
            PhaseEvent::RideEnd => {
                if self.phase != Phase::SpecialRide {
                    return false;
                }
                self.end_ride(ctx);
                true
            }
            PhaseEvent::ChestSpawned { chest } => {
                if !self.can_start_encounter() {
                    debug!("Chest {chest} arrived while another encounter is running");
                    return false;
                }
                debug!("Chest encounter on {chest}");
                self.encounter = Some(Encounter::new(EncounterKind::Chest, chest));
                true
            }
        }
    }

    fn tick_encounter(&mut self, dt: f32, ctx: &mut Ctx) {
        let Some(mut enc) = self.encounter else {
            return;
        };
        if enc.kind == EncounterKind::Carpet {
            return;
        }

        if enc.is_opening {
            enc.opening_timer -= dt;
            if enc.opening_timer <= 0.0 {
                if enc.kind == EncounterKind::Chest {
                    ctx.world.despawn(enc.object);
                }
                debug!("{:?} encounter cleared", enc.kind);
                self.encounter = None;
            } else {
                self.encounter = Some(enc);
            }
            return;
        }

        let Some(object) = ctx.world.get(enc.object) else {
            warn!(
                "{:?} object {} is gone, treating the encounter as resolved",
                enc.kind, enc.object
            );
            self.encounter = None;
            return;
        };
        if self.dialog.is_some() {
            return;
        }

        enc.cooldown = (enc.cooldown - dt).max(0.0);
        let avatar_front = ctx.motion.position().x + AVATAR_WIDTH * 0.5;
        let should_ask = enc.cooldown <= 0.0
            && match enc.kind {
                EncounterKind::Gate => true,
                EncounterKind::Chest => {
                    object.left() >= avatar_front
                        && object.left() - avatar_front <= self.tuning.encounter_stop_distance
                }
                EncounterKind::Carpet => false,
            };
        self.encounter = Some(enc);
        if should_ask {
            self.ask(ctx);
        }
    }

    fn ask(&mut self, ctx: &mut Ctx) {
        let Some(kind) = self.encounter.map(|e| e.kind) else {
            return;
        };
        match self.questions.draw(ctx.rng) {
            Some(question) => {
                debug!("{kind:?} asks question {}", question.id);
                ctx.emit(GameEvent::QuestionPresented { id: question.id });
                self.dialog = Some(Dialog::Question(question));
            }
            None => {
                warn!("Question bank is empty, {kind:?} opens without asking");
                self.resolve_answer(true, ctx);
            }
        }
    }

    /// Inbound answer from the UI. Ignored unless a question is pending.
    pub fn answer(&mut self, correct: bool, ctx: &mut Ctx) -> bool {
        if !matches!(self.dialog, Some(Dialog::Question(_))) {
            return false;
        }
        self.dialog = None;
        self.resolve_answer(correct, ctx);
        true
    }

    /// Answer by option index against the pending question
    pub fn submit_answer(&mut self, option: usize, ctx: &mut Ctx) -> bool {
        let Some(correct) = self.pending_question().map(|q| q.is_correct(option)) else {
            return false;
        };
        self.answer(correct, ctx)
    }

    fn resolve_answer(&mut self, correct: bool, ctx: &mut Ctx) {
        let Some(mut enc) = self.encounter else {
            warn!("Answer arrived with no encounter running");
            return;
        };
        ctx.emit(GameEvent::QuestionAnswered {
            kind: enc.kind,
            correct,
        });
        if correct {
            self.stage_correct += 1;
            enc.is_opening = true;
            enc.opening_timer = self.tuning.post_answer_delay;
            self.grant_reward(enc, ctx);
        } else {
            self.stage_incorrect += 1;
            enc.cooldown = self.tuning.reask_delay;
        }
        self.encounter = Some(enc);
    }

    fn grant_reward(&self, enc: Encounter, ctx: &mut Ctx) {
        let (stars, hearts) = match enc.kind {
            EncounterKind::Gate => (self.tuning.gate_reward_stars, 0),
            EncounterKind::Chest => (self.tuning.chest_reward_stars, self.tuning.chest_reward_hearts),
            EncounterKind::Carpet => (0, 0),
        };
        ctx.run.add_stars(stars);
        let healed = hearts > 0 && ctx.run.heal(hearts);
        let pos = ctx
            .world
            .get(enc.object)
            .map(|e| Vec2::new(e.pos.x, e.top()))
            .unwrap_or_else(|| ctx.motion.position());
        let text = if healed {
            format!("+{stars} stars +{hearts} heart")
        } else {
            format!("+{stars} stars")
        };
        ctx.emit(GameEvent::FloatingText { text, pos });
    }

    /// Close a pending system message. Returns false if none was open.
    pub fn dismiss_system_message(&mut self) -> bool {
        if matches!(self.dialog, Some(Dialog::Message(_))) {
            self.dialog = None;
            true
        } else {
            false
        }
    }

    pub fn continue_after_stage_summary(&mut self) -> bool {
        if matches!(self.dialog, Some(Dialog::Summary(_))) {
            self.dialog = None;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::motion::MotionController;
    use crate::sim::state::Entity;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    const DT: f32 = 1.0 / 120.0;

    struct Harness {
        tuning: Tuning,
        run: RunState,
        world: World,
        motion: MotionController,
        rng: Pcg32,
        events: Vec<GameEvent>,
        phases: PhaseStateMachine,
    }

    impl Harness {
        fn new() -> Self {
            let tuning = Tuning::default();
            Self {
                run: RunState::new(),
                world: World::new(),
                motion: MotionController::new(tuning.motion.clone()),
                rng: Pcg32::seed_from_u64(11),
                events: Vec::new(),
                phases: PhaseStateMachine::new(&tuning, QuestionBank::builtin()),
                tuning,
            }
        }

        fn with_ctx<R>(&mut self, f: impl FnOnce(&mut PhaseStateMachine, &mut Ctx) -> R) -> R {
            let mut ctx = Ctx {
                run: &mut self.run,
                world: &mut self.world,
                motion: &mut self.motion,
                rng: &mut self.rng,
                events: &mut self.events,
            };
            f(&mut self.phases, &mut ctx)
        }

        /// Minimal loop: phase tick, then scroll at the phase's speed
        fn step(&mut self) {
            let dt = DT * self.phases.time_scale();
            self.with_ctx(|phases, ctx| phases.tick(dt, ctx));
            let speed = self.tuning.world.stage_speed(self.run.stage()) * self.phases.speed_factor();
            self.run.set_speed(speed);
            self.run.add_elapsed(dt);
            self.run.advance_distance(speed * dt / PIXELS_PER_METER);
            self.world.scroll(speed * dt, dt);
            let _: Vec<Entity> = self.world.cull();
        }

        fn step_for(&mut self, seconds: f32) {
            for _ in 0..(seconds / DT).ceil() as usize {
                self.step();
            }
        }

        fn step_until(&mut self, max_seconds: f32, done: impl Fn(&Self) -> bool) -> bool {
            for _ in 0..(max_seconds / DT).ceil() as usize {
                if done(self) {
                    return true;
                }
                self.step();
            }
            done(self)
        }

        fn phase(&self) -> Phase {
            self.phases.current_phase()
        }

        fn into_normal_run(&mut self) {
            assert!(self.step_until(5.0, |h| h.phase() == Phase::NormalRun));
        }

        fn answer(&mut self, correct: bool) -> bool {
            self.with_ctx(|phases, ctx| phases.answer(correct, ctx))
        }
    }

    #[test]
    fn test_intro_hands_over_to_normal_run() {
        let mut h = Harness::new();
        assert_eq!(h.phase(), Phase::Intro);
        assert_eq!(h.phases.spawn_mode(), SpawnMode::Disabled);
        h.step_for(h.tuning.phase.intro_duration - 0.1);
        assert_eq!(h.phase(), Phase::Intro);
        h.step_for(0.2);
        assert_eq!(h.phase(), Phase::NormalRun);
        assert_eq!(h.phases.spawn_mode(), SpawnMode::Ordinary);
        assert!(h.events.contains(&GameEvent::PhaseChanged {
            from: Phase::Intro,
            to: Phase::NormalRun
        }));
    }

    #[test]
    fn test_level_end_gate_stops_the_world() {
        let mut h = Harness::new();
        h.into_normal_run();
        h.phases.hazard_done = true;
        let missing = h.tuning.world.stage_length - h.run.distance();
        h.run.advance_distance(missing);
        h.step();
        assert_eq!(h.phase(), Phase::LevelEndApproach);
        let gate = h.phases.transient().expect("gate spawned");
        assert!(h.world.get(gate).is_some_and(|e| e.pos.x > SCREEN_WIDTH));

        assert!(h.step_until(10.0, |h| h.phase() == Phase::LevelEndGate));
        let gate_x = h.world.get(gate).map(|e| e.pos.x).unwrap_or_default();
        assert!(gate_x <= SCREEN_CENTER_X);
        h.step();
        assert_eq!(h.run.speed(), 0.0);
        assert!(h.phases.pending_question().is_some());
        assert!(h.phases.physics_frozen());
        assert_eq!(h.phases.spawn_mode(), SpawnMode::Disabled);
    }

    fn reach_gate(h: &mut Harness) {
        h.into_normal_run();
        h.phases.hazard_done = true;
        let missing = h.run.stage_started_at() + h.tuning.world.stage_length - h.run.distance();
        h.run.advance_distance(missing);
        assert!(h.step_until(10.0, |h| h.phase() == Phase::LevelEndGate));
    }

    #[test]
    fn test_correct_answer_rewards_once_and_clears() {
        let mut h = Harness::new();
        reach_gate(&mut h);
        let stars = h.run.stars();
        assert!(h.answer(true));
        assert!(!h.answer(true), "no second answer without a question");
        assert_eq!(h.run.stars(), stars + h.tuning.phase.gate_reward_stars);

        h.step_for(h.tuning.phase.post_answer_delay + 0.05);
        assert!(h.phases.encounter().is_none());
        assert_eq!(h.run.stars(), stars + h.tuning.phase.gate_reward_stars);
        assert!(matches!(h.phases.dialog(), Some(Dialog::Summary(_))));
        assert_eq!(h.phases.stage_answers(), (1, 0));
    }

    #[test]
    fn test_incorrect_answer_keeps_encounter_and_hearts() {
        let mut h = Harness::new();
        reach_gate(&mut h);
        let hearts = h.run.hearts();
        assert!(h.answer(false));
        assert_eq!(h.run.hearts(), hearts);
        assert!(h.phases.encounter().is_some_and(|e| e.is_active && !e.is_opening));
        assert!(h.phases.pending_question().is_none());

        h.step_for(h.tuning.phase.reask_delay + 0.05);
        assert!(h.phases.pending_question().is_some(), "gate asks again");
        assert_eq!(h.phases.stage_answers(), (0, 1));
    }

    #[test]
    fn test_stage_advance_unlocks_variable_jump() {
        let mut h = Harness::new();
        reach_gate(&mut h);
        h.answer(true);
        assert!(h.step_until(5.0, |h| matches!(h.phases.dialog(), Some(Dialog::Summary(_)))));
        assert!(h.phases.continue_after_stage_summary());
        h.step();
        assert_eq!(h.phase(), Phase::ZoneTransition);
        assert_eq!(h.motion.current_state(), MotionState::Scripted);

        assert!(h.step_until(10.0, |h| h.phase() == Phase::NormalRun));
        assert_eq!(h.run.stage(), 2);
        assert_eq!(h.run.zone(), Zone::Second);
        assert!(h.motion.has_variable_jump());
        assert_eq!(h.motion.current_state(), MotionState::Running);
        assert_eq!(h.phases.stage_answers(), (0, 0));
    }

    #[test]
    fn test_final_gate_ends_in_victory() {
        let mut h = Harness::new();
        h.into_normal_run();
        h.run.advance_stage();
        h.run.advance_stage();
        h.phases.market_triggered = true;
        reach_gate(&mut h);
        h.answer(true);
        assert!(h.step_until(5.0, |h| matches!(h.phases.dialog(), Some(Dialog::Summary(s)) if s.is_final)));
        h.phases.continue_after_stage_summary();
        h.step();
        assert!(h.run.is_game_over());
        assert!(h.run.is_victory());
        assert!(h.events.contains(&GameEvent::GameOver { victory: true }));
    }

    #[test]
    fn test_hazard_chain_restores_hearts() {
        let mut h = Harness::new();
        h.into_normal_run();
        h.run.damage(3);
        h.run.advance_distance(h.tuning.phase.hazard_trigger_distance);
        h.step();
        assert_eq!(h.phase(), Phase::HazardOnset);
        assert!(matches!(h.phases.dialog(), Some(Dialog::Message(_))));
        assert!((h.phases.time_scale() - h.tuning.phase.soft_pause_time_scale).abs() < 1e-6);

        // Stays up until dismissed
        h.step_for(1.0);
        assert_eq!(h.phase(), Phase::HazardOnset);
        assert!(h.phases.dismiss_system_message());

        assert!(h.step_until(5.0, |h| h.phase() == Phase::HazardWalk));
        h.step();
        assert_eq!(h.motion.current_state(), MotionState::Struggling);
        assert!(h.step_until(10.0, |h| h.phase() == Phase::HazardApproach));
        assert!(h.step_until(20.0, |h| h.phase() == Phase::HazardShelter));
        h.step();
        assert_eq!(h.run.hearts(), MAX_HEARTS);
        assert_eq!(h.run.speed(), 0.0);
        assert_eq!(h.motion.current_state(), MotionState::Scripted);
        assert!(h.step_until(5.0, |h| h.phase() == Phase::NormalRun));
        assert_eq!(h.motion.current_state(), MotionState::Running);

        // The hazard is a one-off
        h.step_for(1.0);
        assert_eq!(h.phase(), Phase::NormalRun);
    }

    #[test]
    fn test_requests_refused_while_transient_is_live() {
        let mut h = Harness::new();
        h.into_normal_run();
        let shelter = h.world.spawn_on_ground(
            EntityKind::Shelter,
            600.0,
            0.0,
            EntityKind::Shelter.default_size(),
        );
        h.phases.transient = Some(shelter);
        assert!(!h.with_ctx(|p, ctx| p.notify(PhaseEvent::LedgeGrab, ctx)));
        assert_eq!(h.phase(), Phase::NormalRun);

        h.world.despawn(shelter);
        assert!(h.with_ctx(|p, ctx| p.notify(PhaseEvent::LedgeGrab, ctx)));
        assert_eq!(h.phase(), Phase::Hanging);

        // Nothing else may start while hanging
        let carpet = h.world.spawn(EntityKind::Carpet, Vec2::new(300.0, 300.0), Vec2::new(90.0, 20.0));
        assert!(!h.with_ctx(|p, ctx| p.notify(PhaseEvent::CarpetContact { carpet }, ctx)));
        assert_eq!(h.phase(), Phase::Hanging);
    }

    #[test]
    fn test_special_ride_only_spawns_flight_patterns() {
        let mut h = Harness::new();
        h.into_normal_run();
        let carpet = h.world.spawn(EntityKind::Carpet, Vec2::new(200.0, 420.0), Vec2::new(90.0, 20.0));
        assert!(h.with_ctx(|p, ctx| p.notify(PhaseEvent::CarpetContact { carpet }, ctx)));
        assert_eq!(h.phase(), Phase::SpecialRide);
        assert!(h.phases.is_spawning_allowed());
        assert_eq!(h.phases.spawn_mode(), SpawnMode::FlightOnly);
        assert_eq!(h.motion.current_state(), MotionState::Flying);
        assert!(h.world.get(carpet).is_some_and(|e| e.pinned));

        assert!(h.step_until(h.tuning.phase.ride_duration + 0.5, |h| h.phase() == Phase::Recovery));
        assert!(!h.world.contains(carpet));
        assert_eq!(h.phases.spawn_mode(), SpawnMode::Disabled);
        assert!(h.phases.encounter().is_none());
        assert!(h.step_until(5.0, |h| h.phase() == Phase::NormalRun));
    }

    #[test]
    fn test_ride_end_notification() {
        let mut h = Harness::new();
        h.into_normal_run();
        assert!(!h.with_ctx(|p, ctx| p.notify(PhaseEvent::RideEnd, ctx)));
        let carpet = h.world.spawn(EntityKind::Carpet, Vec2::new(200.0, 420.0), Vec2::new(90.0, 20.0));
        h.with_ctx(|p, ctx| p.notify(PhaseEvent::CarpetContact { carpet }, ctx));
        assert!(h.with_ctx(|p, ctx| p.notify(PhaseEvent::RideEnd, ctx)));
        assert_eq!(h.phase(), Phase::Recovery);
    }

    #[test]
    fn test_chest_asks_at_stop_distance() {
        let mut h = Harness::new();
        h.into_normal_run();
        let chest = h.world.spawn_on_ground(
            EntityKind::Chest,
            SPAWN_X,
            0.0,
            EntityKind::Chest.default_size(),
        );
        assert!(h.with_ctx(|p, ctx| p.notify(PhaseEvent::ChestSpawned { chest }, ctx)));
        assert!(!h.phases.can_start_encounter());
        h.step();
        assert!(h.phases.pending_question().is_none());

        assert!(h.step_until(10.0, |h| h.phases.pending_question().is_some()));
        let left = h.world.get(chest).map(|e| e.left()).unwrap_or_default();
        let gap = left - (h.motion.position().x + AVATAR_WIDTH * 0.5);
        assert!(gap >= 0.0 && gap <= h.tuning.phase.encounter_stop_distance);

        let hearts = h.run.hearts();
        h.answer(true);
        assert_eq!(h.run.stars(), h.tuning.phase.chest_reward_stars);
        assert_eq!(h.run.hearts(), hearts);
        h.step_for(h.tuning.phase.post_answer_delay + 0.05);
        assert!(h.phases.encounter().is_none());
        assert!(!h.world.contains(chest));
    }

    #[test]
    fn test_stale_gate_counts_as_opened() {
        let mut h = Harness::new();
        h.into_normal_run();
        h.phases.hazard_done = true;
        h.run.advance_distance(h.tuning.world.stage_length);
        h.step();
        let gate = h.phases.transient().expect("gate spawned");
        h.world.despawn(gate);
        h.step();
        h.step();
        assert!(matches!(h.phases.dialog(), Some(Dialog::Summary(_))));
    }

    #[test]
    fn test_reset_mid_chain_is_safe() {
        let mut h = Harness::new();
        reach_gate(&mut h);
        h.phases.reset();
        h.world.clear();
        h.run.reset();
        h.motion.reset();
        assert_eq!(h.phase(), Phase::Intro);
        assert!(h.phases.encounter().is_none());
        assert!(h.phases.dialog().is_none());
        assert_eq!(h.phases.script().map(|s| s.owner()), Some(Phase::Intro));
        h.step_for(30.0);
        assert!(!h.run.is_game_over());
    }

    #[test]
    fn test_checkpoints_per_zone() {
        let h = Harness::new();
        let points = h.phases.checkpoints(&h.run);
        assert_eq!(
            points,
            vec![0.0, h.tuning.phase.hazard_trigger_distance, h.tuning.world.stage_length]
        );
    }

    #[test]
    fn test_guidance_expires_in_real_time() {
        let mut h = Harness::new();
        assert!(h.phases.guidance().is_some());
        h.phases.tick_ui(h.tuning.ui.guidance_lifetime + 0.1);
        assert!(h.phases.guidance().is_none());
    }
}
