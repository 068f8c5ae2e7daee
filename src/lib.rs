//! Runner Core - simulation core of a side-scrolling runner
//!
//! Core modules:
//! - `sim`: Deterministic simulation (motion, scripted phases, spawning, contacts)
//! - `tuning`: Data-driven game balance
//! - `ui`: Read-only snapshot published to the UI collaborator
//! - `error`: Errors raised while loading configuration

pub mod error;
pub mod sim;
pub mod tuning;
pub mod ui;

pub use error::ConfigError;
pub use sim::{Simulation, TickInput};
pub use tuning::Tuning;

use glam::Vec2;

/// Game configuration constants
///
/// Screen space, y grows downward.
pub mod consts {
    /// Fixed simulation timestep (120 Hz)
    pub const SIM_DT: f32 = 1.0 / 120.0;
    /// Maximum substeps per frame to prevent spiral of death
    pub const MAX_SUBSTEPS: u32 = 8;

    /// Viewport dimensions
    pub const SCREEN_WIDTH: f32 = 960.0;
    pub const SCREEN_HEIGHT: f32 = 540.0;
    pub const SCREEN_CENTER_X: f32 = SCREEN_WIDTH / 2.0;

    /// Top of the ground strip
    pub const GROUND_Y: f32 = 460.0;
    /// Feet below this line means the avatar fell out of the world
    pub const KILL_Y: f32 = SCREEN_HEIGHT + 80.0;

    /// Avatar lane and body size
    pub const PLAYER_X: f32 = 180.0;
    pub const AVATAR_WIDTH: f32 = 36.0;
    pub const AVATAR_HEIGHT: f32 = 56.0;

    /// Entities enter here and are culled once fully left of DESPAWN_X
    pub const SPAWN_X: f32 = SCREEN_WIDTH + 60.0;
    pub const DESPAWN_X: f32 = -160.0;

    /// Pixels per reported meter of distance
    pub const PIXELS_PER_METER: f32 = 10.0;

    /// Hearts cap
    pub const MAX_HEARTS: u8 = 5;
    /// Climb progress is a percentage
    pub const MAX_CLIMB_PROGRESS: f32 = 100.0;
}

/// Axis-aligned box built from a center point and full size
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec2,
    pub max: Vec2,
}

impl Aabb {
    #[inline]
    pub fn from_center(center: Vec2, size: Vec2) -> Self {
        let half = size * 0.5;
        Self {
            min: center - half,
            max: center + half,
        }
    }

    #[inline]
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x < other.max.x
            && self.max.x > other.min.x
            && self.min.y < other.max.y
            && self.max.y > other.min.y
    }

    #[inline]
    pub fn overlaps_x(&self, other: &Aabb) -> bool {
        self.min.x < other.max.x && self.max.x > other.min.x
    }
}

/// Move `current` toward `target` by at most `max_delta`
#[inline]
pub fn approach(current: f32, target: f32, max_delta: f32) -> f32 {
    let delta = target - current;
    if delta.abs() <= max_delta {
        target
    } else {
        current + max_delta * delta.signum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aabb_overlap_is_strict() {
        let a = Aabb::from_center(Vec2::new(0.0, 0.0), Vec2::new(10.0, 10.0));
        let touching = Aabb::from_center(Vec2::new(10.0, 0.0), Vec2::new(10.0, 10.0));
        let inside = Aabb::from_center(Vec2::new(4.0, 4.0), Vec2::new(10.0, 10.0));
        assert!(!a.overlaps(&touching));
        assert!(a.overlaps(&inside));
    }

    #[test]
    fn test_approach_stops_at_target() {
        assert_eq!(approach(0.0, 5.0, 2.0), 2.0);
        assert_eq!(approach(4.0, 5.0, 2.0), 5.0);
        assert_eq!(approach(5.0, 1.0, 10.0), 1.0);
    }
}
