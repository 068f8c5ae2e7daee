//! Avatar motion controller
//!
//! Owns the avatar's physics and its local state machine. Reads the run's
//! scroll speed but never writes run state; damage and pickups are applied
//! by the collision router, scripted states are forced by the phase machine.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::state::RunState;
use crate::consts::*;
use crate::tuning::MotionTuning;

/// Tolerance for "standing on" a surface
const SURFACE_SNAP: f32 = 2.0;

/// After-image spacing while airborne and dust spacing while running
const AFTERIMAGE_INTERVAL: f32 = 0.05;
const DUST_INTERVAL: f32 = 0.12;
const FEEDBACK_LIFE: f32 = 0.25;
const MAX_FEEDBACK: usize = 16;

/// Exactly one of these is active at a time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotionState {
    Running,
    Airborne,
    Hanging,
    Climbing,
    Flying,
    Scripted,
    Struggling,
}

impl MotionState {
    /// States in which the jump button does nothing
    pub fn blocks_jump(&self) -> bool {
        matches!(
            self,
            MotionState::Hanging
                | MotionState::Climbing
                | MotionState::Scripted
                | MotionState::Flying
                | MotionState::Struggling
        )
    }

    /// Movement is driven by a phase, not by the player
    pub fn is_forced(&self) -> bool {
        matches!(self, MotionState::Scripted | MotionState::Struggling)
    }
}

/// Per-tick control input, already folded from press/release edges
#[derive(Debug, Clone, Copy, Default)]
pub struct ControlInput {
    /// Press started this tick
    pub pressed: bool,
    /// Button currently down
    pub held: bool,
}

/// How a supporting surface reacts when landed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurfaceKind {
    Solid,
    Bounce,
}

/// Highest surface at or below the avatar's feet
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Support {
    pub top: f32,
    pub kind: SurfaceKind,
    /// Entity providing the surface, None for the ground
    pub entity: Option<u32>,
}

impl Support {
    pub fn ground(top: f32) -> Self {
        Self {
            top,
            kind: SurfaceKind::Solid,
            entity: None,
        }
    }
}

/// What happened during one advance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MotionReport {
    pub jumped: bool,
    pub landed: bool,
    pub bounced: bool,
    pub climb_finished: bool,
}

/// Non-authoritative visual feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedbackKind {
    AfterImage,
    Dust,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub kind: FeedbackKind,
    pub pos: Vec2,
    pub life: f32,
}

/// The avatar
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotionController {
    tuning: MotionTuning,
    state: MotionState,
    /// Body center
    pos: Vec2,
    vel: Vec2,
    lane_x: f32,
    grounded: bool,
    coyote_timer: f32,
    jump_buffer_timer: f32,
    variable_jump: bool,
    jump_cut_used: bool,
    ledge_top: f32,
    climb_progress: f32,
    climb_timer: f32,
    climb_from_y: f32,
    invulnerable_timer: f32,
    shield_timer: f32,
    flash_timer: f32,
    struggle_time: f32,
    scripted_target_x: Option<f32>,
    feedback_timer: f32,
    #[serde(skip)]
    feedback: Vec<Feedback>,
}

impl MotionController {
    pub fn new(tuning: MotionTuning) -> Self {
        Self {
            tuning,
            state: MotionState::Running,
            pos: Vec2::new(PLAYER_X, GROUND_Y - AVATAR_HEIGHT * 0.5),
            vel: Vec2::ZERO,
            lane_x: PLAYER_X,
            grounded: true,
            coyote_timer: 0.0,
            jump_buffer_timer: 0.0,
            variable_jump: false,
            jump_cut_used: false,
            ledge_top: 0.0,
            climb_progress: 0.0,
            climb_timer: 0.0,
            climb_from_y: 0.0,
            invulnerable_timer: 0.0,
            shield_timer: 0.0,
            flash_timer: 0.0,
            struggle_time: 0.0,
            scripted_target_x: None,
            feedback_timer: 0.0,
            feedback: Vec::with_capacity(MAX_FEEDBACK),
        }
    }

    /// Back to Running on the ground, capabilities locked again
    pub fn reset(&mut self) {
        *self = Self::new(self.tuning.clone());
    }

    pub fn current_state(&self) -> MotionState {
        self.state
    }

    pub fn position_y(&self) -> f32 {
        self.pos.y
    }

    pub fn position(&self) -> Vec2 {
        self.pos
    }

    pub fn velocity(&self) -> Vec2 {
        self.vel
    }

    pub fn feet(&self) -> f32 {
        self.pos.y + AVATAR_HEIGHT * 0.5
    }

    pub fn head(&self) -> f32 {
        self.pos.y - AVATAR_HEIGHT * 0.5
    }

    pub fn aabb(&self) -> crate::Aabb {
        crate::Aabb::from_center(self.pos, Vec2::new(AVATAR_WIDTH, AVATAR_HEIGHT))
    }

    pub fn is_grounded(&self) -> bool {
        self.grounded
    }

    pub fn climb_progress(&self) -> f32 {
        self.climb_progress
    }

    pub fn is_invulnerable(&self) -> bool {
        self.invulnerable_timer > 0.0
    }

    pub fn is_shielded(&self) -> bool {
        self.shield_timer > 0.0
    }

    pub fn is_flashing(&self) -> bool {
        self.flash_timer > 0.0
    }

    pub fn has_variable_jump(&self) -> bool {
        self.variable_jump
    }

    pub fn feedback(&self) -> &[Feedback] {
        &self.feedback
    }

    /// Capability granted at the first stage advance
    pub fn unlock_variable_jump(&mut self) {
        self.variable_jump = true;
    }

    pub fn fell_out_of_bounds(&self) -> bool {
        self.feet() > KILL_Y
    }

    /// Advance one tick. `support` is the highest surface at or below the feet.
    pub fn advance(
        &mut self,
        dt: f32,
        input: ControlInput,
        run: &RunState,
        support: Option<Support>,
    ) -> MotionReport {
        let mut report = MotionReport::default();
        if dt <= 0.0 {
            return report;
        }

        self.invulnerable_timer = (self.invulnerable_timer - dt).max(0.0);
        self.shield_timer = (self.shield_timer - dt).max(0.0);
        self.flash_timer = (self.flash_timer - dt).max(0.0);

        match self.state {
            MotionState::Running | MotionState::Airborne => {
                self.advance_platformer(dt, input, support, &mut report);
                self.return_to_lane(dt);
            }
            MotionState::Hanging => {}
            MotionState::Climbing => self.advance_climb(dt, &mut report),
            MotionState::Flying => {
                self.advance_flight(dt, input);
                self.return_to_lane(dt);
            }
            MotionState::Struggling => self.advance_struggle(dt, support),
            MotionState::Scripted => self.advance_scripted(dt, support, &mut report),
        }

        self.update_feedback(dt, run.speed());
        report
    }

    fn advance_platformer(
        &mut self,
        dt: f32,
        input: ControlInput,
        support: Option<Support>,
        report: &mut MotionReport,
    ) {
        if input.pressed {
            self.jump_buffer_timer = self.tuning.jump_buffer;
        }

        // Windows opened this tick start counting down on the next one
        let mut walked_off = false;
        if self.grounded {
            match support {
                Some(surface) if (self.feet() - surface.top).abs() <= SURFACE_SNAP => {
                    self.set_feet(surface.top);
                    self.vel.y = 0.0;
                    self.coyote_timer = self.tuning.coyote_time;
                }
                _ => {
                    // Walked off an edge: coyote window starts now
                    self.grounded = false;
                    self.state = MotionState::Airborne;
                    walked_off = true;
                }
            }
        }

        if !self.grounded {
            self.integrate_fall(dt, input.held);
            if let Some(surface) = support {
                if self.feet() >= surface.top && self.vel.y >= 0.0 {
                    self.land(surface, report);
                }
            }
        }

        let coyote_open = self.grounded || self.coyote_timer > 0.0;
        let buffer_open = self.jump_buffer_timer > 0.0;
        if coyote_open && buffer_open && !self.state.blocks_jump() {
            self.vel.y = -self.tuning.jump_velocity;
            self.grounded = false;
            self.state = MotionState::Airborne;
            self.coyote_timer = 0.0;
            self.jump_buffer_timer = 0.0;
            self.jump_cut_used = false;
            report.jumped = true;
        }

        if !input.pressed {
            self.jump_buffer_timer = (self.jump_buffer_timer - dt).max(0.0);
        }
        if !self.grounded && !walked_off {
            self.coyote_timer = (self.coyote_timer - dt).max(0.0);
        }
    }

    fn integrate_fall(&mut self, dt: f32, held: bool) {
        self.vel.y = (self.vel.y + self.tuning.gravity * dt).min(self.tuning.max_fall_speed);
        if self.variable_jump && !held && !self.jump_cut_used && self.vel.y < 0.0 {
            self.vel.y = self.vel.y.max(-self.tuning.jump_cut_velocity);
            self.jump_cut_used = true;
        }
        self.pos.y += self.vel.y * dt;
    }

    fn land(&mut self, surface: Support, report: &mut MotionReport) {
        match surface.kind {
            SurfaceKind::Solid => {
                self.land_on(surface.top);
                report.landed = true;
            }
            SurfaceKind::Bounce => {
                self.set_feet(surface.top);
                self.bounce(self.tuning.bounce_velocity);
                report.bounced = true;
            }
        }
    }

    /// Launch upward from a bounce surface
    pub fn bounce(&mut self, velocity: f32) {
        if !matches!(self.state, MotionState::Running | MotionState::Airborne) {
            return;
        }
        self.vel.y = -velocity.abs();
        self.grounded = false;
        self.state = MotionState::Airborne;
        self.coyote_timer = 0.0;
        self.jump_cut_used = true;
    }

    /// Snap the feet onto a surface and stand there
    pub fn land_on(&mut self, top: f32) {
        self.set_feet(top);
        self.vel.y = 0.0;
        self.grounded = true;
        self.coyote_timer = self.tuning.coyote_time;
        if self.state == MotionState::Airborne {
            self.state = MotionState::Running;
        }
    }

    fn set_feet(&mut self, top: f32) {
        self.pos.y = top - AVATAR_HEIGHT * 0.5;
    }

    fn return_to_lane(&mut self, dt: f32) {
        self.pos.x = crate::approach(self.pos.x, self.lane_x, self.tuning.knockback_recovery * dt);
    }

    /// Ledge sensor overlap. Grabs only while falling with the head near the ledge.
    pub fn try_grab_ledge(&mut self, ledge_top: f32) -> bool {
        if !matches!(self.state, MotionState::Running | MotionState::Airborne) {
            return false;
        }
        if self.vel.y <= 0.0 {
            return false;
        }
        if (self.head() - ledge_top).abs() > self.tuning.ledge_tolerance {
            return false;
        }
        self.state = MotionState::Hanging;
        self.vel = Vec2::ZERO;
        self.grounded = false;
        self.ledge_top = ledge_top;
        self.pos.y = ledge_top + AVATAR_HEIGHT * 0.5;
        self.climb_progress = 0.0;
        self.coyote_timer = 0.0;
        self.jump_buffer_timer = 0.0;
        log::debug!("Grabbed ledge at y={ledge_top:.1}");
        true
    }

    /// Tap while hanging. Progress is clamped; reaching 100 starts the climb.
    pub fn add_climb_progress(&mut self, amount: f32) {
        if self.state != MotionState::Hanging {
            return;
        }
        self.climb_progress = (self.climb_progress + amount).clamp(0.0, MAX_CLIMB_PROGRESS);
        if self.climb_progress >= MAX_CLIMB_PROGRESS {
            self.state = MotionState::Climbing;
            self.climb_timer = 0.0;
            self.climb_from_y = self.pos.y;
        }
    }

    /// One tap's worth of climb progress
    pub fn tap_climb(&mut self) {
        self.add_climb_progress(self.tuning.climb_per_tap);
    }

    fn advance_climb(&mut self, dt: f32, report: &mut MotionReport) {
        self.climb_timer += dt;
        let t = (self.climb_timer / self.tuning.climb_duration).min(1.0);
        let to_y = self.ledge_top - AVATAR_HEIGHT * 0.5;
        self.pos.y = self.climb_from_y + (to_y - self.climb_from_y) * t;
        if t >= 1.0 {
            self.state = MotionState::Running;
            self.grounded = true;
            self.vel = Vec2::ZERO;
            self.climb_progress = 0.0;
            self.coyote_timer = self.tuning.coyote_time;
            report.climb_finished = true;
        }
    }

    /// Let go of a ledge whose building is gone
    pub fn release_ledge(&mut self) {
        if matches!(self.state, MotionState::Hanging | MotionState::Climbing) {
            self.state = MotionState::Airborne;
            self.climb_progress = 0.0;
            self.vel = Vec2::ZERO;
        }
    }

    pub fn enter_flight(&mut self) {
        self.state = MotionState::Flying;
        self.grounded = false;
        self.vel = Vec2::ZERO;
        self.climb_progress = 0.0;
    }

    pub fn exit_flight(&mut self) {
        if self.state == MotionState::Flying {
            self.state = MotionState::Airborne;
            self.vel.y = 0.0;
        }
    }

    fn advance_flight(&mut self, dt: f32, input: ControlInput) {
        let t = &self.tuning;
        let accel = if input.held { -t.flight_accel } else { t.flight_accel };
        self.vel.y += accel * dt;
        self.vel.y *= (-t.flight_damping * dt).exp();
        self.vel.y = self.vel.y.clamp(-t.flight_max_speed, t.flight_max_speed);
        self.pos.y += self.vel.y * dt;

        // Soft bounds: clamp, no rebound
        if self.pos.y < t.flight_min_y {
            self.pos.y = t.flight_min_y;
            self.vel.y = 0.0;
        } else if self.pos.y > t.flight_max_y {
            self.pos.y = t.flight_max_y;
            self.vel.y = 0.0;
        }
    }

    pub fn enter_struggle(&mut self) {
        self.state = MotionState::Struggling;
        self.struggle_time = 0.0;
        self.vel = Vec2::ZERO;
    }

    pub fn exit_struggle(&mut self) {
        if self.state == MotionState::Struggling {
            self.state = if self.grounded {
                MotionState::Running
            } else {
                MotionState::Airborne
            };
        }
    }

    fn advance_struggle(&mut self, dt: f32, support: Option<Support>) {
        self.struggle_time += dt;
        let t = &self.tuning;
        let wobble = (self.struggle_time * t.struggle_frequency).sin() * t.struggle_amplitude;
        self.pos.x = t.struggle_lane_x + wobble;
        self.settle(dt, support);
    }

    /// Force the scripted state; the phase machine owns the exit
    pub fn enter_scripted(&mut self) {
        self.state = MotionState::Scripted;
        self.vel.x = 0.0;
        self.climb_progress = 0.0;
        self.jump_buffer_timer = 0.0;
        self.scripted_target_x = None;
    }

    pub fn set_scripted_target(&mut self, x: Option<f32>) {
        self.scripted_target_x = x;
    }

    pub fn exit_scripted(&mut self) {
        if self.state == MotionState::Scripted {
            self.state = if self.grounded {
                MotionState::Running
            } else {
                MotionState::Airborne
            };
            self.scripted_target_x = None;
        }
    }

    fn advance_scripted(&mut self, dt: f32, support: Option<Support>, report: &mut MotionReport) {
        let was_grounded = self.grounded;
        self.settle(dt, support);
        if self.grounded && !was_grounded {
            report.landed = true;
        }
        let target = self.scripted_target_x.unwrap_or(self.lane_x);
        self.pos.x = crate::approach(self.pos.x, target, self.tuning.scripted_walk_speed * dt);
    }

    /// Gravity and landing without jump control
    fn settle(&mut self, dt: f32, support: Option<Support>) {
        match support {
            Some(surface) if self.grounded && (self.feet() - surface.top).abs() <= SURFACE_SNAP => {
                self.set_feet(surface.top);
                self.vel.y = 0.0;
            }
            _ => {
                self.grounded = false;
                self.vel.y = (self.vel.y + self.tuning.gravity * dt).min(self.tuning.max_fall_speed);
                self.pos.y += self.vel.y * dt;
                if let Some(surface) = support {
                    if self.feet() >= surface.top && self.vel.y >= 0.0 {
                        self.set_feet(surface.top);
                        self.vel.y = 0.0;
                        self.grounded = true;
                    }
                }
            }
        }
    }

    /// Returns true if the hit was accepted
    pub fn take_damage(&mut self) -> bool {
        if self.is_invulnerable() || self.is_shielded() {
            return false;
        }
        if matches!(self.state, MotionState::Scripted | MotionState::Climbing) {
            return false;
        }
        self.invulnerable_timer = self.tuning.invulnerability;
        self.flash_timer = self.tuning.flash_duration;
        self.pos.x -= self.tuning.knockback_distance;
        true
    }

    pub fn grant_shield(&mut self, duration: f32) {
        self.shield_timer = self.shield_timer.max(duration);
    }

    fn update_feedback(&mut self, dt: f32, world_speed: f32) {
        for fb in self.feedback.iter_mut() {
            fb.life -= dt;
        }
        self.feedback.retain(|fb| fb.life > 0.0);

        let (kind, interval) = match self.state {
            MotionState::Airborne | MotionState::Flying => {
                (FeedbackKind::AfterImage, AFTERIMAGE_INTERVAL)
            }
            MotionState::Running if world_speed > 0.0 => (FeedbackKind::Dust, DUST_INTERVAL),
            _ => {
                self.feedback_timer = 0.0;
                return;
            }
        };
        self.feedback_timer += dt;
        if self.feedback_timer >= interval {
            self.feedback_timer = 0.0;
            if self.feedback.len() >= MAX_FEEDBACK {
                self.feedback.remove(0);
            }
            let pos = match kind {
                FeedbackKind::AfterImage => self.pos,
                FeedbackKind::Dust => Vec2::new(self.pos.x - AVATAR_WIDTH * 0.5, self.feet()),
            };
            self.feedback.push(Feedback {
                kind,
                pos,
                life: FEEDBACK_LIFE,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 60.0;

    fn ground() -> Option<Support> {
        Some(Support::ground(GROUND_Y))
    }

    fn idle() -> ControlInput {
        ControlInput::default()
    }

    fn press() -> ControlInput {
        ControlInput {
            pressed: true,
            held: true,
        }
    }

    fn controller() -> MotionController {
        MotionController::new(MotionTuning::default())
    }

    /// Tick until grounded again, counting jumps along the way
    fn run_until_landed(mc: &mut MotionController, run: &RunState, max_ticks: usize) -> u32 {
        let mut jumps = 0;
        for _ in 0..max_ticks {
            let report = mc.advance(DT, idle(), run, ground());
            if report.jumped {
                jumps += 1;
            }
            if mc.is_grounded() {
                break;
            }
        }
        jumps
    }

    #[test]
    fn test_jump_from_ground() {
        let run = RunState::new();
        let mut mc = controller();
        mc.advance(DT, idle(), &run, ground());
        let report = mc.advance(DT, press(), &run, ground());
        assert!(report.jumped);
        assert_eq!(mc.current_state(), MotionState::Airborne);
        assert!(mc.velocity().y < 0.0);
    }

    #[test]
    fn test_jump_buffer_fires_once_on_landing() {
        let run = RunState::new();
        let mut mc = controller();
        mc.advance(DT, press(), &run, ground());
        assert_eq!(mc.current_state(), MotionState::Airborne);

        // Fall until just above the ground
        let mut ticks = 0;
        while mc.velocity().y <= 0.0 || mc.feet() < GROUND_Y - 60.0 {
            mc.advance(DT, idle(), &run, ground());
            ticks += 1;
            assert!(ticks < 600, "never came back down");
        }

        // Press ~133ms before landing, nothing held afterwards
        mc.advance(DT, press(), &run, None);
        let mut jumps = 0;
        for _ in 0..7 {
            if mc.advance(DT, idle(), &run, None).jumped {
                jumps += 1;
            }
        }
        assert_eq!(jumps, 0, "no ground, no jump");

        // Land now
        let report = mc.advance(DT, idle(), &run, ground());
        assert!(report.landed || report.jumped);
        assert!(report.jumped, "buffered press honored on landing");

        // The second landing does not jump again
        let jumps = run_until_landed(&mut mc, &run, 600);
        assert_eq!(jumps, 0);
        assert_eq!(mc.current_state(), MotionState::Running);
    }

    /// Airborne after walking off, coyote long gone, `press_lead` ticks before a landing
    fn jumps_when_pressed_before_landing(press_lead: usize) -> bool {
        let run = RunState::new();
        let mut mc = controller();
        mc.advance(SIM_DT, idle(), &run, ground());
        for _ in 0..30 {
            mc.advance(SIM_DT, idle(), &run, None);
        }
        assert_eq!(mc.current_state(), MotionState::Airborne);

        assert!(!mc.advance(SIM_DT, press(), &run, None).jumped);
        for _ in 1..press_lead {
            assert!(!mc.advance(SIM_DT, idle(), &run, None).jumped);
        }
        let floor = Some(Support::ground(mc.feet()));
        let report = mc.advance(SIM_DT, idle(), &run, floor);
        assert!(report.landed || report.jumped);
        report.jumped
    }

    #[test]
    fn test_jump_buffer_covers_full_window_at_sim_rate() {
        // 150ms at 120Hz is 18 ticks
        for lead in 1..=18 {
            assert!(jumps_when_pressed_before_landing(lead), "pressed {lead} ticks early");
        }
        assert!(!jumps_when_pressed_before_landing(20));
    }

    #[test]
    fn test_coyote_covers_full_window_at_sim_rate() {
        // 100ms at 120Hz is 12 ticks after the walk-off tick
        for late in 1..=12 {
            let run = RunState::new();
            let mut mc = controller();
            mc.advance(SIM_DT, idle(), &run, ground());
            mc.advance(SIM_DT, idle(), &run, None);
            for _ in 1..late {
                mc.advance(SIM_DT, idle(), &run, None);
            }
            assert!(mc.advance(SIM_DT, press(), &run, None).jumped, "pressed {late} ticks late");
        }
    }

    #[test]
    fn test_jump_buffer_expires() {
        let run = RunState::new();
        let mut mc = controller();
        mc.advance(DT, press(), &run, ground());
        for _ in 0..5 {
            mc.advance(DT, idle(), &run, None);
        }
        mc.advance(DT, press(), &run, None);
        // 15 ticks = 250ms in the air without ground
        for _ in 0..15 {
            mc.advance(DT, idle(), &run, None);
        }
        let jumps = run_until_landed(&mut mc, &run, 600);
        assert_eq!(jumps, 0);
    }

    #[test]
    fn test_coyote_time_allows_late_jump() {
        let run = RunState::new();
        let mut mc = controller();
        mc.advance(DT, idle(), &run, ground());
        // Ground disappears (gap) for 5 ticks = 83ms
        for _ in 0..5 {
            mc.advance(DT, idle(), &run, None);
        }
        assert_eq!(mc.current_state(), MotionState::Airborne);
        let report = mc.advance(DT, press(), &run, None);
        assert!(report.jumped);

        // No second jump in the air
        let report = mc.advance(DT, press(), &run, None);
        assert!(!report.jumped);
    }

    #[test]
    fn test_coyote_time_expires() {
        let run = RunState::new();
        let mut mc = controller();
        mc.advance(DT, idle(), &run, ground());
        for _ in 0..9 {
            mc.advance(DT, idle(), &run, None);
        }
        let report = mc.advance(DT, press(), &run, None);
        assert!(!report.jumped);
    }

    #[test]
    fn test_variable_jump_needs_capability() {
        let run = RunState::new();

        let mut full = controller();
        full.advance(DT, press(), &run, ground());
        full.advance(DT, idle(), &run, None);
        let uncut = full.velocity().y;
        assert!(uncut < -MotionTuning::default().jump_cut_velocity);

        let mut short = controller();
        short.unlock_variable_jump();
        short.advance(DT, press(), &run, ground());
        short.advance(DT, idle(), &run, None);
        assert!(short.velocity().y >= -MotionTuning::default().jump_cut_velocity - 0.01);
        assert!(short.velocity().y > uncut);
    }

    #[test]
    fn test_ledge_grab_requires_falling_and_tolerance() {
        let run = RunState::new();
        let mut mc = controller();

        // Running on ground, not falling
        assert!(!mc.try_grab_ledge(mc.head()));

        mc.advance(DT, press(), &run, ground());
        // Rising
        assert!(!mc.try_grab_ledge(mc.head()));

        while mc.velocity().y <= 0.0 {
            mc.advance(DT, idle(), &run, None);
        }
        // Too far from the ledge
        assert!(!mc.try_grab_ledge(mc.head() - 100.0));
        let ledge = mc.head() + 5.0;
        assert!(mc.try_grab_ledge(ledge));
        assert_eq!(mc.current_state(), MotionState::Hanging);

        // Hanging freezes physics
        let y = mc.position_y();
        mc.advance(DT, press(), &run, None);
        assert_eq!(mc.position_y(), y);
    }

    #[test]
    fn test_climb_progress_clamps_and_finishes() {
        let run = RunState::new();
        let mut mc = controller();
        mc.advance(DT, press(), &run, ground());
        while mc.velocity().y <= 0.0 {
            mc.advance(DT, idle(), &run, None);
        }
        let ledge = mc.head();
        assert!(mc.try_grab_ledge(ledge));

        mc.add_climb_progress(-50.0);
        assert_eq!(mc.climb_progress(), 0.0);
        mc.add_climb_progress(60.0);
        assert_eq!(mc.current_state(), MotionState::Hanging);
        mc.add_climb_progress(500.0);
        assert_eq!(mc.climb_progress(), MAX_CLIMB_PROGRESS);
        assert_eq!(mc.current_state(), MotionState::Climbing);

        let mut finished = false;
        for _ in 0..120 {
            if mc.advance(DT, idle(), &run, None).climb_finished {
                finished = true;
                break;
            }
        }
        assert!(finished);
        assert_eq!(mc.current_state(), MotionState::Running);
        assert!((mc.feet() - ledge).abs() < 0.01);
    }

    #[test]
    fn test_flight_clamps_to_bounds() {
        let run = RunState::new();
        let tuning = MotionTuning::default();
        let mut mc = controller();
        mc.enter_flight();
        let hold = ControlInput {
            pressed: false,
            held: true,
        };
        for _ in 0..600 {
            mc.advance(DT, hold, &run, None);
            assert!(mc.position_y() >= tuning.flight_min_y);
        }
        assert_eq!(mc.position_y(), tuning.flight_min_y);
        assert_eq!(mc.velocity().y, 0.0);

        for _ in 0..600 {
            mc.advance(DT, idle(), &run, None);
            assert!(mc.position_y() <= tuning.flight_max_y);
        }
        assert_eq!(mc.position_y(), tuning.flight_max_y);

        // Jump presses do nothing in flight
        let report = mc.advance(DT, press(), &run, None);
        assert!(!report.jumped);
        mc.exit_flight();
        assert_eq!(mc.current_state(), MotionState::Airborne);
    }

    #[test]
    fn test_struggle_holds_lane() {
        let run = RunState::new();
        let tuning = MotionTuning::default();
        let mut mc = controller();
        mc.enter_struggle();
        for _ in 0..120 {
            let report = mc.advance(DT, press(), &run, ground());
            assert!(!report.jumped);
            assert!((mc.position().x - tuning.struggle_lane_x).abs() <= tuning.struggle_amplitude + 0.01);
        }
        mc.exit_struggle();
        assert_eq!(mc.current_state(), MotionState::Running);
    }

    #[test]
    fn test_damage_invulnerability_window() {
        let run = RunState::new();
        let mut mc = controller();
        assert!(mc.take_damage());
        assert!(!mc.take_damage());
        for _ in 0..((MotionTuning::default().invulnerability / DT) as usize + 2) {
            mc.advance(DT, idle(), &run, ground());
        }
        assert!(mc.take_damage());
    }

    #[test]
    fn test_shield_blocks_damage() {
        let mut mc = controller();
        mc.grant_shield(5.0);
        assert!(!mc.take_damage());
        mc.enter_scripted();
        assert!(!mc.take_damage());
    }

    #[test]
    fn test_bounce_surface_launches() {
        let run = RunState::new();
        let mut mc = controller();
        mc.advance(DT, press(), &run, ground());
        while mc.velocity().y <= 0.0 {
            mc.advance(DT, idle(), &run, None);
        }
        let pad = Support {
            top: mc.feet() + 1.0,
            kind: SurfaceKind::Bounce,
            entity: Some(7),
        };
        let mut bounced = false;
        for _ in 0..10 {
            if mc.advance(DT, idle(), &run, Some(pad)).bounced {
                bounced = true;
                break;
            }
        }
        assert!(bounced);
        assert!(mc.velocity().y < 0.0);
        assert_eq!(mc.current_state(), MotionState::Airborne);
    }

    #[test]
    fn test_scripted_walks_to_target_and_exits() {
        let run = RunState::new();
        let mut mc = controller();
        mc.enter_scripted();
        mc.set_scripted_target(Some(PLAYER_X + 50.0));
        for _ in 0..120 {
            let report = mc.advance(DT, press(), &run, ground());
            assert!(!report.jumped);
        }
        assert!((mc.position().x - (PLAYER_X + 50.0)).abs() < 0.01);
        mc.exit_scripted();
        assert_eq!(mc.current_state(), MotionState::Running);
    }

    #[test]
    fn test_falls_out_of_bounds_over_gap() {
        let run = RunState::new();
        let mut mc = controller();
        for _ in 0..240 {
            mc.advance(DT, idle(), &run, None);
        }
        assert!(mc.fell_out_of_bounds());
    }
}
