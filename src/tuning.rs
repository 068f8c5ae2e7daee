//! Data-driven game balance
//!
//! Every constant that shapes how the run feels lives here. Partial JSON
//! files are layered over the shipped defaults, so a tuning file only needs
//! the values it changes.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Avatar physics and timing windows (pixels, seconds)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionTuning {
    pub gravity: f32,
    /// Upward launch speed of a jump
    pub jump_velocity: f32,
    /// Upward speed ceiling applied when the jump is released early
    pub jump_cut_velocity: f32,
    pub max_fall_speed: f32,
    /// Grace period after leaving the ground
    pub coyote_time: f32,
    /// Grace period before landing
    pub jump_buffer: f32,
    /// Max distance between avatar top and ledge top for a grab
    pub ledge_tolerance: f32,
    /// Climb progress gained per tap while hanging
    pub climb_per_tap: f32,
    pub climb_duration: f32,
    pub invulnerability: f32,
    pub knockback_distance: f32,
    /// Speed at which a knocked-back avatar returns to its lane
    pub knockback_recovery: f32,
    pub flash_duration: f32,
    pub bounce_velocity: f32,
    pub flight_accel: f32,
    /// Exponential velocity damping per second while flying
    pub flight_damping: f32,
    pub flight_max_speed: f32,
    pub flight_min_y: f32,
    pub flight_max_y: f32,
    pub struggle_lane_x: f32,
    pub struggle_amplitude: f32,
    pub struggle_frequency: f32,
    pub scripted_walk_speed: f32,
}

impl Default for MotionTuning {
    fn default() -> Self {
        Self {
            gravity: 2200.0,
            jump_velocity: 820.0,
            jump_cut_velocity: 320.0,
            max_fall_speed: 1400.0,
            coyote_time: 0.10,
            jump_buffer: 0.15,
            ledge_tolerance: 18.0,
            climb_per_tap: 20.0,
            climb_duration: 0.45,
            invulnerability: 1.2,
            knockback_distance: 40.0,
            knockback_recovery: 120.0,
            flash_duration: 0.3,
            bounce_velocity: 1000.0,
            flight_accel: 1800.0,
            flight_damping: 3.0,
            flight_max_speed: 420.0,
            flight_min_y: 80.0,
            flight_max_y: 400.0,
            struggle_lane_x: 150.0,
            struggle_amplitude: 6.0,
            struggle_frequency: 9.0,
            scripted_walk_speed: 160.0,
        }
    }
}

/// Scroll speed and stage layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldTuning {
    /// Stage 1 scroll speed (pixels/s)
    pub base_speed: f32,
    /// Extra speed per stage as a fraction of base
    pub speed_per_stage: f32,
    /// Stage length in meters
    pub stage_length: f32,
    pub stage_count: u32,
}

impl Default for WorldTuning {
    fn default() -> Self {
        Self {
            base_speed: 320.0,
            speed_per_stage: 0.15,
            stage_length: 1500.0,
            stage_count: 3,
        }
    }
}

impl WorldTuning {
    /// Scroll speed for a stage before phase factors apply
    pub fn stage_speed(&self, stage: u32) -> f32 {
        self.base_speed * (1.0 + self.speed_per_stage * stage.saturating_sub(1) as f32)
    }
}

/// Scripted timeline timings (seconds, meters, speed factors)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseTuning {
    pub intro_duration: f32,
    pub intro_speed: f32,
    /// Meters after the intro before the hazard starts (first zone only)
    pub hazard_trigger_distance: f32,
    pub hazard_onset_duration: f32,
    pub hazard_walk_duration: f32,
    pub hazard_onset_speed: f32,
    pub hazard_walk_speed: f32,
    pub hazard_approach_speed: f32,
    pub shelter_dwell: f32,
    /// Meters inside the second zone before the market is discovered
    pub second_zone_discovery_distance: f32,
    pub second_zone_entry_dwell: f32,
    pub ride_duration: f32,
    pub recovery_duration: f32,
    /// Horizontal gap between avatar and chest that triggers the question
    pub encounter_stop_distance: f32,
    pub post_answer_delay: f32,
    pub reask_delay: f32,
    pub zone_transition_duration: f32,
    pub stage_intro_duration: f32,
    /// Global time scale while a dialog is pending
    pub soft_pause_time_scale: f32,
    pub gate_reward_stars: u32,
    pub chest_reward_stars: u32,
    pub chest_reward_hearts: u8,
}

impl Default for PhaseTuning {
    fn default() -> Self {
        Self {
            intro_duration: 2.0,
            intro_speed: 0.5,
            hazard_trigger_distance: 600.0,
            hazard_onset_duration: 2.0,
            hazard_walk_duration: 4.0,
            hazard_onset_speed: 0.6,
            hazard_walk_speed: 0.3,
            hazard_approach_speed: 0.5,
            shelter_dwell: 3.0,
            second_zone_discovery_distance: 500.0,
            second_zone_entry_dwell: 2.5,
            ride_duration: 10.0,
            recovery_duration: 1.5,
            encounter_stop_distance: 90.0,
            post_answer_delay: 1.2,
            reask_delay: 1.5,
            zone_transition_duration: 3.0,
            stage_intro_duration: 2.0,
            soft_pause_time_scale: 0.02,
            gate_reward_stars: 20,
            chest_reward_stars: 30,
            chest_reward_hearts: 1,
        }
    }
}

/// Pattern cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnTuning {
    pub first_spawn_delay: f32,
    /// Delay reduction per stage as a fraction of a pattern's own delay
    pub difficulty_step: f32,
    /// Floor of the difficulty factor
    pub min_difficulty_factor: f32,
    /// Upper bound of the random extra delay (seconds)
    pub jitter: f32,
    /// Gap patterns are not placed closer than this to a shop
    pub shop_clearance: f32,
}

impl Default for SpawnTuning {
    fn default() -> Self {
        Self {
            first_spawn_delay: 1.2,
            difficulty_step: 0.1,
            min_difficulty_factor: 0.6,
            jitter: 0.15,
            shop_clearance: 220.0,
        }
    }
}

/// Pickup effects
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PickupTuning {
    pub star_value: u32,
    pub heart_value: u8,
    pub shield_duration: f32,
}

impl Default for PickupTuning {
    fn default() -> Self {
        Self {
            star_value: 10,
            heart_value: 1,
            shield_duration: 5.0,
        }
    }
}

/// UI-facing cadence (real time)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiTuning {
    pub snapshot_hz: f32,
    pub guidance_lifetime: f32,
}

impl Default for UiTuning {
    fn default() -> Self {
        Self {
            snapshot_hz: 10.0,
            guidance_lifetime: 3.0,
        }
    }
}

/// Complete balance sheet
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    pub motion: MotionTuning,
    pub world: WorldTuning,
    pub phase: PhaseTuning,
    pub spawn: SpawnTuning,
    pub pickups: PickupTuning,
    pub ui: UiTuning,
}

impl Tuning {
    /// Parse JSON layered over the defaults, then validate
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let tuning: Tuning = serde_json::from_str(json).map_err(|source| ConfigError::Parse {
            what: "tuning",
            source,
        })?;
        tuning.validate()?;
        Ok(tuning)
    }

    /// Load a tuning file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let tuning = Self::from_json_str(&json)?;
        log::info!("Loaded tuning from {}", path.display());
        Ok(tuning)
    }

    /// Reject values the simulation cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let m = &self.motion;
        if m.coyote_time < 0.0 || m.jump_buffer < 0.0 {
            return Err(ConfigError::invalid(
                "motion",
                "coyote_time and jump_buffer must be >= 0",
            ));
        }
        if m.gravity <= 0.0 || m.jump_velocity <= 0.0 {
            return Err(ConfigError::invalid(
                "motion",
                "gravity and jump_velocity must be > 0",
            ));
        }
        if m.flight_min_y >= m.flight_max_y {
            return Err(ConfigError::invalid(
                "motion.flight_min_y",
                format!("{} is not below flight_max_y {}", m.flight_min_y, m.flight_max_y),
            ));
        }
        if m.climb_per_tap <= 0.0 || m.climb_duration <= 0.0 {
            return Err(ConfigError::invalid("motion", "climb values must be > 0"));
        }
        if self.world.stage_count == 0 {
            return Err(ConfigError::invalid("world.stage_count", "must be at least 1"));
        }
        if self.world.base_speed <= 0.0 || self.world.stage_length <= 0.0 {
            return Err(ConfigError::invalid(
                "world",
                "base_speed and stage_length must be > 0",
            ));
        }
        let factor = self.spawn.min_difficulty_factor;
        if !(factor > 0.0 && factor <= 1.0) {
            return Err(ConfigError::invalid(
                "spawn.min_difficulty_factor",
                format!("{factor} is outside (0, 1]"),
            ));
        }
        if self.spawn.first_spawn_delay < 0.0 {
            return Err(ConfigError::invalid("spawn.first_spawn_delay", "must be >= 0"));
        }
        if self.spawn.jitter < 0.0 {
            return Err(ConfigError::invalid("spawn.jitter", "must be >= 0"));
        }
        let p = &self.phase;
        let durations = [
            p.intro_duration,
            p.hazard_onset_duration,
            p.hazard_walk_duration,
            p.shelter_dwell,
            p.second_zone_entry_dwell,
            p.ride_duration,
            p.recovery_duration,
            p.post_answer_delay,
            p.zone_transition_duration,
            p.stage_intro_duration,
        ];
        if durations.iter().any(|d| *d <= 0.0) {
            return Err(ConfigError::invalid("phase", "durations must be > 0"));
        }
        if !(p.soft_pause_time_scale >= 0.0 && p.soft_pause_time_scale < 1.0) {
            return Err(ConfigError::invalid(
                "phase.soft_pause_time_scale",
                "must be in [0, 1)",
            ));
        }
        if self.ui.snapshot_hz <= 0.0 {
            return Err(ConfigError::invalid("ui.snapshot_hz", "must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(Tuning::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let tuning = Tuning::from_json_str(r#"{ "motion": { "coyote_time": 0.08 } }"#)
            .expect("partial tuning parses");
        assert!((tuning.motion.coyote_time - 0.08).abs() < f32::EPSILON);
        assert!((tuning.motion.jump_buffer - 0.15).abs() < f32::EPSILON);
        assert_eq!(tuning.world.stage_count, 3);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = Tuning::from_json_str(r#"{ "spawn": { "min_difficulty_factor": 1.5 } }"#)
            .expect_err("factor above 1 is invalid");
        assert!(matches!(err, ConfigError::Invalid { .. }));

        let err = Tuning::from_json_str("{ not json").expect_err("garbage is rejected");
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = Tuning::load("/definitely/not/here.json").expect_err("missing file");
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_stage_speed_grows_per_stage() {
        let world = WorldTuning::default();
        assert_eq!(world.stage_speed(1), world.base_speed);
        assert!(world.stage_speed(3) > world.stage_speed(2));
    }
}
