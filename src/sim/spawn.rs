//! Pattern scheduling
//!
//! Decides when the next pattern enters from the right and which one.
//! Selection order: pending chest, queued sequence step, tutorial, flight
//! layouts, filtered zone pool, safe default. The wait after a placement is
//! the placed pattern's own delay, scaled by stage difficulty.

use std::collections::VecDeque;

use log::{debug, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::context::Ctx;
use super::patterns::{
    self, DEFAULT_DELAY, FLIGHT_PATTERNS, Pattern, ROOFTOP_SEQUENCE, SAFE_DEFAULT, TUTORIAL,
};
use super::phase::{PhaseEvent, PhaseStateMachine, SpawnMode};
use super::state::{Entity, EntityKind, RunState, World, Zone};
use crate::consts::*;
use crate::tuning::SpawnTuning;

/// Chance per ordinary pick of starting the rooftop sequence in the market
const ROOFTOP_CHANCE: f64 = 0.15;

/// Name and base delay of whatever was just placed
type Placed = (&'static str, f32);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnScheduler {
    tuning: SpawnTuning,
    /// Seconds until the next pattern
    timer: f32,
    spawned: u32,
    last_pattern: Option<String>,
    last_ends_in_gap: bool,
    /// Remaining rooftop steps, by index
    sequence: VecDeque<usize>,
    chest_pending: bool,
    /// Midpoint distance of the last chest that was queued
    last_chest_mark: Option<f32>,
}

impl SpawnScheduler {
    pub fn new(tuning: SpawnTuning) -> Self {
        let timer = tuning.first_spawn_delay;
        Self {
            tuning,
            timer,
            spawned: 0,
            last_pattern: None,
            last_ends_in_gap: false,
            sequence: VecDeque::new(),
            chest_pending: false,
            last_chest_mark: None,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.tuning.clone());
    }

    pub fn last_pattern(&self) -> Option<&str> {
        self.last_pattern.as_deref()
    }

    pub fn last_ends_in_gap(&self) -> bool {
        self.last_ends_in_gap
    }

    pub fn spawned(&self) -> u32 {
        self.spawned
    }

    pub fn is_chest_pending(&self) -> bool {
        self.chest_pending
    }

    /// Delay before the following pattern, from the base delay of the one just placed
    pub fn next_delay(&self, base: f32, stage: u32, rng: &mut impl Rng) -> f32 {
        let t = &self.tuning;
        let factor = (1.0 - t.difficulty_step * stage.saturating_sub(1) as f32)
            .max(t.min_difficulty_factor);
        let jitter = if t.jitter > 0.0 {
            rng.random_range(0.0..t.jitter)
        } else {
            0.0
        };
        base * factor + jitter
    }

    /// Spawn at most one pattern. Returns the name of what was placed.
    pub fn tick(
        &mut self,
        dt: f32,
        ctx: &mut Ctx,
        phases: &mut PhaseStateMachine,
    ) -> Option<&'static str> {
        // Asked every tick: the phase may have changed since the last one
        let mode = phases.spawn_mode();
        if mode == SpawnMode::Disabled {
            return None;
        }
        self.check_chest_threshold(ctx.run, phases);

        self.timer -= dt;
        if self.timer > 0.0 {
            return None;
        }
        // Let the previous pattern clear the spawn edge first
        if ctx.world.rightmost_edge() > SPAWN_X {
            return None;
        }

        let placed = match mode {
            SpawnMode::FlightOnly => self.spawn_flight(ctx),
            SpawnMode::Ordinary => Some(self.spawn_ordinary(ctx, phases)),
            SpawnMode::Disabled => None,
        };
        let base = placed.map_or(DEFAULT_DELAY, |(_, delay)| delay);
        self.timer = self.next_delay(base, ctx.run.stage(), ctx.rng);
        placed.map(|(name, _)| name)
    }

    /// Queue a chest once distance passes the midpoint between scripted checkpoints
    fn check_chest_threshold(&mut self, run: &RunState, phases: &PhaseStateMachine) {
        let distance = run.distance();
        for pair in phases.checkpoints(run).windows(2) {
            let mid = (pair[0] + pair[1]) * 0.5;
            if distance >= mid && distance < pair[1] && self.last_chest_mark != Some(mid) {
                debug!("Chest queued at {distance:.0}m (midpoint {mid:.0}m)");
                self.last_chest_mark = Some(mid);
                self.chest_pending = true;
            }
        }
    }

    /// Entities that scrolled off while still active. Unconsumed chests come back.
    pub fn on_scrolled_away(&mut self, gone: &[Entity]) {
        if gone.iter().any(|e| e.kind == EntityKind::Chest) {
            debug!("Chest scrolled away unopened, requeued");
            self.chest_pending = true;
        }
    }

    fn spawn_flight(&mut self, ctx: &mut Ctx) -> Option<Placed> {
        if ctx.run.zone() != Zone::Third {
            return None;
        }
        let pattern = &FLIGHT_PATTERNS[ctx.rng.random_range(0..FLIGHT_PATTERNS.len())];
        Some(self.place(pattern, ctx.world))
    }

    fn spawn_ordinary(&mut self, ctx: &mut Ctx, phases: &mut PhaseStateMachine) -> Placed {
        if self.chest_pending && phases.can_start_encounter() {
            let size = EntityKind::Chest.default_size();
            let chest = ctx.world.spawn_on_ground(EntityKind::Chest, SPAWN_X, 0.0, size);
            if phases.notify(PhaseEvent::ChestSpawned { chest }, ctx) {
                self.chest_pending = false;
                self.last_ends_in_gap = false;
                self.last_pattern = Some("chest".to_string());
                return ("chest", DEFAULT_DELAY);
            }
            ctx.world.despawn(chest);
        }

        if let Some(step) = self.sequence.pop_front() {
            return self.place(&ROOFTOP_SEQUENCE[step], ctx.world);
        }

        if let Some(pattern) = TUTORIAL.get(self.spawned as usize) {
            return self.place(pattern, ctx.world);
        }

        let zone = ctx.run.zone();
        if zone == Zone::Second && ctx.rng.random_bool(ROOFTOP_CHANCE) {
            self.sequence.extend(1..ROOFTOP_SEQUENCE.len());
            return self.place(&ROOFTOP_SEQUENCE[0], ctx.world);
        }

        let pattern = self.pick(
            zone,
            ctx.run.stage(),
            phases.is_market_discovered(),
            ctx.world,
            ctx.rng,
        );
        self.place(pattern, ctx.world)
    }

    /// Uniform pick from the zone pool after the contradiction and shop filters
    pub fn pick(
        &self,
        zone: Zone,
        stage: u32,
        market_discovered: bool,
        world: &World,
        rng: &mut impl Rng,
    ) -> &'static Pattern {
        let pool = patterns::pool(zone, stage, market_discovered);
        let picked = self.pick_from(pool, world, rng);
        if std::ptr::eq(picked, &SAFE_DEFAULT) {
            warn!("No pattern fits {zone:?} stage {stage}, using the safe default");
        }
        picked
    }

    /// Filtered uniform pick, or the safe default when nothing survives
    pub fn pick_from(
        &self,
        pool: Vec<&'static Pattern>,
        world: &World,
        rng: &mut impl Rng,
    ) -> &'static Pattern {
        let clearance = self.tuning.shop_clearance;
        let candidates: Vec<&'static Pattern> = pool
            .into_iter()
            .filter(|p| !(self.last_ends_in_gap && p.requires_running_start))
            .filter(|p| {
                !p.has_gap()
                    || !(world.is_near_shop(SPAWN_X, clearance)
                        || world.is_near_shop(SPAWN_X + p.width(), clearance))
            })
            .collect();
        if candidates.is_empty() {
            return &SAFE_DEFAULT;
        }
        candidates[rng.random_range(0..candidates.len())]
    }

    fn place(&mut self, pattern: &'static Pattern, world: &mut World) -> Placed {
        pattern.spawn(world, SPAWN_X);
        debug!("Spawned pattern {}", pattern.name);
        self.spawned += 1;
        self.last_ends_in_gap = pattern.ends_in_gap;
        self.last_pattern = Some(pattern.name.to_string());
        (pattern.name, pattern.delay)
    }
}
