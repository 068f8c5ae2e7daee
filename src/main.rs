//! Runner Core headless driver
//!
//! Plays one run through the fixed-timestep accumulator with a simple
//! autopilot and prints the final snapshot as JSON.
//!
//! Usage: `runner-core [tuning.json] [seed] [questions.json]`
//!
//! Pass `-` as the tuning path to keep the shipped tuning.

use std::process::ExitCode;

use runner_core::consts::*;
use runner_core::sim::phase::Dialog;
use runner_core::sim::{EntityKind, MotionState, QuestionBank, Simulation};
use runner_core::{TickInput, Tuning};

/// Rendered frame rate the driver pretends to run at
const FRAME_DT: f32 = 1.0 / 60.0;
/// Give up after this much real time
const MAX_RUN_SECONDS: f32 = 900.0;
/// How far ahead of the avatar a hazard triggers a jump
const JUMP_LOOKAHEAD: f32 = 70.0;
/// Ticks the button stays down per jump
const HOLD_TICKS: u32 = 18;
/// Flight height the autopilot steers toward
const FLIGHT_CRUISE_Y: f32 = 220.0;

/// Plays well enough to see every phase
#[derive(Debug, Default)]
struct Autopilot {
    held_ticks: u32,
}

impl Autopilot {
    fn input(&mut self, sim: &mut Simulation) -> TickInput {
        let mut input = TickInput::default();

        if let Some(correct) = sim.phases().pending_question().map(|q| q.correct) {
            sim.submit_answer(correct);
            return input;
        }
        if matches!(
            sim.phases().dialog(),
            Some(Dialog::Message(_)) | Some(Dialog::Summary(_))
        ) {
            input.tap = true;
            return input;
        }

        let motion = sim.motion();
        match motion.current_state() {
            MotionState::Hanging => input.tap = true,
            MotionState::Flying => {
                let want_up = motion.position().y > FLIGHT_CRUISE_Y;
                if want_up && self.held_ticks == 0 {
                    input.press_start = true;
                    self.held_ticks = 1;
                } else if !want_up && self.held_ticks > 0 {
                    input.press_end = true;
                    self.held_ticks = 0;
                }
                return input;
            }
            _ => {}
        }

        if self.held_ticks > 0 {
            self.held_ticks += 1;
            if self.held_ticks > HOLD_TICKS {
                input.press_end = true;
                self.held_ticks = 0;
            }
            return input;
        }

        if motion.is_grounded() && self.threat_ahead(sim) {
            input.press_start = true;
            self.held_ticks = 1;
        }
        input
    }

    fn threat_ahead(&self, sim: &Simulation) -> bool {
        let front = sim.motion().position().x + AVATAR_WIDTH * 0.5;
        sim.world().iter().any(|e| {
            let jumpable = matches!(
                e.kind,
                EntityKind::Crate | EntityKind::Spikes | EntityKind::Gap | EntityKind::Rooftop
            );
            let low_bird = e.kind == EntityKind::Bird && e.pos.y > GROUND_Y - AVATAR_HEIGHT * 1.5;
            (jumpable || low_bird) && e.left() > front && e.left() - front < JUMP_LOOKAHEAD
        })
    }
}

fn load_tuning(path: Option<&str>) -> Result<Tuning, runner_core::ConfigError> {
    match path {
        Some(path) if path != "-" => {
            log::info!("Loading tuning from {path}");
            Tuning::load(path)
        }
        _ => Ok(Tuning::default()),
    }
}

fn load_questions(path: Option<&str>) -> Result<QuestionBank, runner_core::ConfigError> {
    match path {
        Some(path) => {
            let bank = QuestionBank::load(path)?;
            log::info!("Loaded {} questions from {path}", bank.len());
            Ok(bank)
        }
        None => Ok(QuestionBank::builtin()),
    }
}

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let tuning = match load_tuning(args.first().map(String::as_str)) {
        Ok(tuning) => tuning,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let seed = match args.get(1).map(|s| s.parse::<u64>()) {
        Some(Ok(seed)) => seed,
        Some(Err(e)) => {
            log::error!("Invalid seed: {e}");
            return ExitCode::FAILURE;
        }
        None => 12345,
    };
    let questions = match load_questions(args.get(2).map(String::as_str)) {
        Ok(questions) => questions,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    log::info!("Runner Core (headless) starting, seed {seed}");
    let mut sim = Simulation::with_questions(seed, tuning, questions);
    let mut pilot = Autopilot::default();
    let mut accumulator = 0.0;
    let mut real_time = 0.0;
    let mut last_phase = sim.phases().current_phase();

    while !sim.is_game_over() && real_time < MAX_RUN_SECONDS {
        accumulator += FRAME_DT;
        real_time += FRAME_DT;

        let mut substeps = 0;
        while accumulator >= SIM_DT && substeps < MAX_SUBSTEPS {
            let input = pilot.input(&mut sim);
            sim.tick(SIM_DT, &input);
            accumulator -= SIM_DT;
            substeps += 1;
        }

        for event in sim.drain_events() {
            log::trace!("{event:?}");
        }
        if let Some(snapshot) = sim.poll_snapshot(FRAME_DT) {
            if snapshot.phase != last_phase {
                log::debug!(
                    "{:?} at {}m, {} hearts, {} stars",
                    snapshot.phase,
                    snapshot.distance,
                    snapshot.hearts,
                    snapshot.stars
                );
                last_phase = snapshot.phase;
            }
        }
    }

    let snapshot = sim.snapshot();
    let outcome = match (snapshot.is_game_over, snapshot.is_victory) {
        (true, true) => "victory",
        (true, false) => "defeat",
        _ => "time limit",
    };
    log::info!(
        "Finished after {real_time:.0}s: {}m, stage {}, {outcome}",
        snapshot.distance,
        snapshot.stage
    );
    match serde_json::to_string_pretty(&snapshot) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("Could not encode snapshot: {e}");
            ExitCode::FAILURE
        }
    }
}
