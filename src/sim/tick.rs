//! Fixed timestep simulation tick
//!
//! `Simulation` owns every component and advances them in one explicit order:
//! run state read, motion, phases, spawner, collision, run state write-back.

use log::info;
use rand::SeedableRng;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::collision::CollisionRouter;
use super::context::Ctx;
use super::motion::{ControlInput, MotionController, MotionState};
use super::phase::{Dialog, PhaseStateMachine};
use super::quiz::QuestionBank;
use super::spawn::SpawnScheduler;
use super::state::{EntityKind, GameEvent, RunState, World, Zone};
use crate::Tuning;
use crate::consts::*;
use crate::ui::{SnapshotThrottle, UiSnapshot};

/// Input edges for a single tick (deterministic)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickInput {
    /// Button went down
    pub press_start: bool,
    /// Button went up
    pub press_end: bool,
    /// Contextual tap: climb while hanging, dismiss a message or summary
    pub tap: bool,
}

/// Global time scale. Gameplay runs on scaled time, UI timers on real time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimClock {
    time_scale: f32,
    ticks: u64,
    scaled_time: f32,
    real_time: f32,
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SimClock {
    pub fn new() -> Self {
        Self {
            time_scale: 1.0,
            ticks: 0,
            scaled_time: 0.0,
            real_time: 0.0,
        }
    }

    pub fn time_scale(&self) -> f32 {
        self.time_scale
    }

    pub fn set_time_scale(&mut self, scale: f32) {
        self.time_scale = scale.clamp(0.0, 1.0);
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn scaled_time(&self) -> f32 {
        self.scaled_time
    }

    pub fn real_time(&self) -> f32 {
        self.real_time
    }

    /// Consume one real step, returning the scaled step
    pub fn advance(&mut self, real_dt: f32) -> f32 {
        let real_dt = real_dt.max(0.0);
        let dt = real_dt * self.time_scale;
        self.ticks += 1;
        self.real_time += real_dt;
        self.scaled_time += dt;
        dt
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// One run of the game
pub struct Simulation {
    seed: u64,
    tuning: Tuning,
    clock: SimClock,
    run: RunState,
    world: World,
    motion: MotionController,
    phases: PhaseStateMachine,
    spawner: SpawnScheduler,
    router: CollisionRouter,
    rng: Pcg32,
    events: Vec<GameEvent>,
    /// Button state folded from press edges
    held: bool,
    throttle: SnapshotThrottle,
}

impl Simulation {
    pub fn new(seed: u64, tuning: Tuning) -> Self {
        Self::with_questions(seed, tuning, QuestionBank::builtin())
    }

    pub fn with_questions(seed: u64, tuning: Tuning, questions: QuestionBank) -> Self {
        let world = World::new();
        let mut router = CollisionRouter::new(tuning.pickups.clone());
        router.wire_up(&world);
        info!("New run (seed {seed}, {} questions)", questions.len());
        Self {
            seed,
            clock: SimClock::new(),
            run: RunState::new(),
            world,
            motion: MotionController::new(tuning.motion.clone()),
            phases: PhaseStateMachine::new(&tuning, questions),
            spawner: SpawnScheduler::new(tuning.spawn.clone()),
            router,
            rng: Pcg32::seed_from_u64(seed),
            events: Vec::new(),
            held: false,
            throttle: SnapshotThrottle::new(tuning.ui.snapshot_hz),
            tuning,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn tuning(&self) -> &Tuning {
        &self.tuning
    }

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    pub fn run(&self) -> &RunState {
        &self.run
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn motion(&self) -> &MotionController {
        &self.motion
    }

    pub fn phases(&self) -> &PhaseStateMachine {
        &self.phases
    }

    pub fn spawner(&self) -> &SpawnScheduler {
        &self.spawner
    }

    pub fn is_game_over(&self) -> bool {
        self.run.is_game_over()
    }

    pub fn current_zone(&self) -> Zone {
        self.run.current_zone()
    }

    pub fn is_near_shop(&self, x: f32, radius: f32) -> bool {
        self.world.is_near_shop(x, radius)
    }

    fn split(
        &mut self,
    ) -> (
        Ctx<'_>,
        &mut PhaseStateMachine,
        &mut SpawnScheduler,
        &mut CollisionRouter,
    ) {
        (
            Ctx {
                run: &mut self.run,
                world: &mut self.world,
                motion: &mut self.motion,
                rng: &mut self.rng,
                events: &mut self.events,
            },
            &mut self.phases,
            &mut self.spawner,
            &mut self.router,
        )
    }

    /// Advance by one real step
    pub fn tick(&mut self, real_dt: f32, input: &TickInput) {
        self.phases.tick_ui(real_dt);
        if self.run.is_game_over() {
            return;
        }

        if input.press_start {
            self.held = true;
        }
        if input.press_end {
            self.held = false;
        }
        let control = ControlInput {
            pressed: input.press_start,
            held: self.held,
        };
        if input.tap {
            self.handle_tap();
        }

        self.clock.set_time_scale(self.phases.time_scale());
        let dt = self.clock.advance(real_dt);
        if dt <= 0.0 {
            return;
        }

        // Read
        self.run.add_elapsed(dt);
        let frozen = self.phases.physics_frozen();

        // Motion
        if !frozen {
            if self.ledge_lost() {
                self.motion.release_ledge();
            }
            let support = self.router.support_under(&self.world, &self.motion);
            let report = self.motion.advance(dt, control, &self.run, support);
            if report.jumped {
                self.events.push(GameEvent::Jumped);
            }
            if report.landed {
                self.events.push(GameEvent::Landed);
            }
            if report.bounced {
                self.events.push(GameEvent::Bounced);
            }
        }

        let (mut ctx, phases, spawner, router) = self.split();

        // Phases, then spawner (asked for permission inside its tick)
        phases.tick(dt, &mut ctx);
        spawner.tick(dt, &mut ctx, phases);

        // Collision
        if !frozen && !ctx.run.is_game_over() {
            router.resolve(&mut ctx, phases);
            router.poll_dynamic_contacts(&mut ctx, phases);
        }

        // Write-back: the loop is the only writer of speed and distance
        let speed = self.tuning.world.stage_speed(self.run.stage()) * self.phases.speed_factor();
        self.run.set_speed(speed);
        let scroll_px = self.run.speed() * dt;
        self.run.advance_distance(scroll_px / PIXELS_PER_METER);
        self.world.scroll(scroll_px, dt);
        let gone = self.world.cull();
        self.spawner.on_scrolled_away(&gone);
        self.world.normalize_order();

        self.check_game_over();
    }

    /// Hanging on a building that no longer exists
    fn ledge_lost(&self) -> bool {
        if !matches!(
            self.motion.current_state(),
            MotionState::Hanging | MotionState::Climbing
        ) {
            return false;
        }
        let x = self.motion.position().x;
        !self.world.iter().any(|e| {
            e.kind == EntityKind::Rooftop
                && x > e.left() - AVATAR_WIDTH
                && x < e.right() + AVATAR_WIDTH
        })
    }

    fn handle_tap(&mut self) {
        match self.phases.dialog() {
            Some(Dialog::Message(_)) => {
                self.phases.dismiss_system_message();
            }
            Some(Dialog::Summary(_)) => {
                self.phases.continue_after_stage_summary();
            }
            // Questions need an answer
            Some(Dialog::Question(_)) => {}
            None => {
                if self.motion.current_state() == MotionState::Hanging {
                    self.motion.tap_climb();
                }
            }
        }
    }

    fn check_game_over(&mut self) {
        if self.run.is_game_over() {
            return;
        }
        let fell = self.motion.fell_out_of_bounds();
        if self.run.hearts() == 0 || fell {
            info!(
                "Game over at {:.0}m (stage {}, {})",
                self.run.distance(),
                self.run.stage(),
                if fell { "fell" } else { "out of hearts" }
            );
            self.run.mark_game_over(false);
            self.events.push(GameEvent::GameOver { victory: false });
        }
    }

    /// Inbound answer from the UI
    pub fn answer_question(&mut self, correct: bool) -> bool {
        let (mut ctx, phases, _, _) = self.split();
        phases.answer(correct, &mut ctx)
    }

    /// Inbound answer by option index
    pub fn submit_answer(&mut self, option: usize) -> bool {
        let (mut ctx, phases, _, _) = self.split();
        phases.submit_answer(option, &mut ctx)
    }

    pub fn dismiss_system_message(&mut self) -> bool {
        self.phases.dismiss_system_message()
    }

    pub fn continue_after_stage_summary(&mut self) -> bool {
        self.phases.continue_after_stage_summary()
    }

    pub fn restart(&mut self) {
        self.reset();
    }

    /// Back to a fresh run. Safe from any phase and idempotent.
    pub fn reset(&mut self) {
        self.phases.reset();
        self.spawner.reset();
        self.world.clear();
        self.motion.reset();
        self.run.reset();
        self.rng = Pcg32::seed_from_u64(self.seed);
        self.events.clear();
        self.held = false;
        self.clock.reset();
        self.throttle.reset();
        self.router.wire_up(&self.world);
        info!("Run reset");
    }

    pub fn snapshot(&self) -> UiSnapshot {
        UiSnapshot::capture(&self.run, &self.motion, &self.phases)
    }

    /// Snapshot at the throttled UI rate, real time
    pub fn poll_snapshot(&mut self, real_dt: f32) -> Option<UiSnapshot> {
        self.throttle.ready(real_dt).then(|| self.snapshot())
    }

    /// Presentation feedback since the last drain
    pub fn drain_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }
}
