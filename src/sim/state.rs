//! Run state, world entities and presentation events
//!
//! `RunState` is the one piece of state every component reads. Each field
//! has exactly one writer (see the setter docs); nothing else mutates it.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::phase::{EncounterKind, Phase};
use crate::Aabb;
use crate::consts::*;

/// Themed macro-region of the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Zone {
    First,
    Second,
    Third,
}

impl Zone {
    pub fn for_stage(stage: u32) -> Self {
        match stage {
            0 | 1 => Zone::First,
            2 => Zone::Second,
            _ => Zone::Third,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Zone::First => "Dune Outskirts",
            Zone::Second => "Spice Market",
            Zone::Third => "Starlit Canyon",
        }
    }
}

/// Authoritative run progress
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    distance: f32,
    speed: f32,
    stage: u32,
    hearts: u8,
    stars: u32,
    is_game_over: bool,
    is_victory: bool,
    /// Scaled seconds since the run started
    elapsed: f32,
    /// Distance and elapsed time when the current stage began
    stage_started_at: (f32, f32),
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunState {
    pub fn new() -> Self {
        Self {
            distance: 0.0,
            speed: 0.0,
            stage: 1,
            hearts: MAX_HEARTS,
            stars: 0,
            is_game_over: false,
            is_victory: false,
            elapsed: 0.0,
            stage_started_at: (0.0, 0.0),
        }
    }

    pub fn distance(&self) -> f32 {
        self.distance
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn stage(&self) -> u32 {
        self.stage
    }

    pub fn zone(&self) -> Zone {
        Zone::for_stage(self.stage)
    }

    pub fn current_zone(&self) -> Zone {
        self.zone()
    }

    /// Meters covered since the current stage began
    pub fn stage_distance(&self) -> f32 {
        self.distance - self.stage_started_at.0
    }

    /// Scaled seconds spent in the current stage
    pub fn stage_elapsed(&self) -> f32 {
        self.elapsed - self.stage_started_at.1
    }

    pub fn stage_started_at(&self) -> f32 {
        self.stage_started_at.0
    }

    pub fn hearts(&self) -> u8 {
        self.hearts
    }

    pub fn stars(&self) -> u32 {
        self.stars
    }

    pub fn is_game_over(&self) -> bool {
        self.is_game_over
    }

    pub fn is_victory(&self) -> bool {
        self.is_victory
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    /// Writer: simulation loop. Negative or non-finite input is ignored.
    pub fn advance_distance(&mut self, meters: f32) {
        if meters.is_finite() && meters > 0.0 {
            self.distance += meters;
        }
    }

    /// Writer: simulation loop
    pub fn set_speed(&mut self, speed: f32) {
        self.speed = if speed.is_finite() { speed.max(0.0) } else { 0.0 };
    }

    /// Writer: simulation loop
    pub fn add_elapsed(&mut self, dt: f32) {
        if dt > 0.0 {
            self.elapsed += dt;
        }
    }

    /// Writer: phase machine only
    pub fn advance_stage(&mut self) -> u32 {
        self.stage += 1;
        self.stage_started_at = (self.distance, self.elapsed);
        self.stage
    }

    /// Writer: collision router. Returns the hearts left.
    pub fn damage(&mut self, amount: u8) -> u8 {
        self.hearts = self.hearts.saturating_sub(amount);
        self.hearts
    }

    /// Writer: collision router and phase rewards. Returns true if hearts changed.
    pub fn heal(&mut self, amount: u8) -> bool {
        let before = self.hearts;
        self.hearts = self.hearts.saturating_add(amount).min(MAX_HEARTS);
        self.hearts != before
    }

    /// Writer: phase machine (shelter reached)
    pub fn restore_hearts(&mut self) {
        self.hearts = MAX_HEARTS;
    }

    /// Writer: collision router and phase rewards
    pub fn add_stars(&mut self, amount: u32) {
        self.stars = self.stars.saturating_add(amount);
    }

    pub fn mark_game_over(&mut self, victory: bool) {
        self.is_game_over = true;
        self.is_victory = victory;
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Everything that can exist in the scrolling world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    // Hazards
    Crate,
    Spikes,
    Bird,
    // Pickups
    Star,
    Heart,
    Shield,
    // One-way platforms
    BouncePad,
    Cart,
    GoodsStack,
    Rooftop,
    /// Grab region at a rooftop's top-left corner
    LedgeSensor,
    /// Missing stretch of ground
    Gap,
    // Scripted objects
    Gate,
    Chest,
    Shelter,
    Carpet,
    Landmark,
    // Scenery
    Shop,
}

impl EntityKind {
    /// Size used when a placement does not give one
    pub fn default_size(&self) -> Vec2 {
        match self {
            EntityKind::Crate => Vec2::new(48.0, 48.0),
            EntityKind::Spikes => Vec2::new(56.0, 24.0),
            EntityKind::Bird => Vec2::new(40.0, 28.0),
            EntityKind::Star | EntityKind::Heart => Vec2::new(28.0, 28.0),
            EntityKind::Shield => Vec2::new(30.0, 30.0),
            EntityKind::BouncePad => Vec2::new(60.0, 16.0),
            EntityKind::Cart => Vec2::new(110.0, 50.0),
            EntityKind::GoodsStack => Vec2::new(90.0, 70.0),
            EntityKind::Rooftop => Vec2::new(260.0, 140.0),
            EntityKind::LedgeSensor => Vec2::new(28.0, 40.0),
            EntityKind::Gap => Vec2::new(120.0, 80.0),
            EntityKind::Gate => Vec2::new(80.0, 200.0),
            EntityKind::Chest => Vec2::new(56.0, 44.0),
            EntityKind::Shelter => Vec2::new(160.0, 150.0),
            EntityKind::Carpet => Vec2::new(90.0, 20.0),
            EntityKind::Landmark => Vec2::new(140.0, 220.0),
            EntityKind::Shop => Vec2::new(150.0, 120.0),
        }
    }

    pub fn is_hazard(&self) -> bool {
        matches!(self, EntityKind::Crate | EntityKind::Spikes | EntityKind::Bird)
    }

    pub fn is_pickup(&self) -> bool {
        matches!(self, EntityKind::Star | EntityKind::Heart | EntityKind::Shield)
    }

    pub fn is_platform(&self) -> bool {
        matches!(
            self,
            EntityKind::BouncePad | EntityKind::Cart | EntityKind::GoodsStack | EntityKind::Rooftop
        )
    }

    /// Objects whose lifetime a phase or encounter owns
    pub fn is_scripted(&self) -> bool {
        matches!(
            self,
            EntityKind::Gate
                | EntityKind::Chest
                | EntityKind::Shelter
                | EntityKind::Carpet
                | EntityKind::Landmark
        )
    }
}

/// A world entity (center position, full size)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: u32,
    pub kind: EntityKind,
    pub pos: Vec2,
    pub size: Vec2,
    /// Own velocity on top of the world scroll
    pub vel: Vec2,
    /// Disabled entities stay in the list until culled but never collide
    pub active: bool,
    /// Pinned entities ignore the world scroll (a carpet being ridden)
    pub pinned: bool,
    /// Seconds alive, drives bird bobbing
    pub age: f32,
    /// Rest height for bobbing entities
    pub base_y: f32,
}

impl Entity {
    pub fn aabb(&self) -> Aabb {
        Aabb::from_center(self.pos, self.size)
    }

    pub fn top(&self) -> f32 {
        self.pos.y - self.size.y * 0.5
    }

    pub fn left(&self) -> f32 {
        self.pos.x - self.size.x * 0.5
    }

    pub fn right(&self) -> f32 {
        self.pos.x + self.size.x * 0.5
    }
}

/// Bird bob amplitude and rate
const BIRD_BOB_AMPLITUDE: f32 = 18.0;
const BIRD_BOB_RATE: f32 = 3.0;

/// Every live entity, sorted by id for deterministic iteration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct World {
    entities: Vec<Entity>,
    next_id: u32,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    pub fn new() -> Self {
        Self {
            entities: Vec::new(),
            next_id: 1,
        }
    }

    /// Spawn an entity. Rooftops bring their ledge sensor along.
    pub fn spawn(&mut self, kind: EntityKind, pos: Vec2, size: Vec2) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.entities.push(Entity {
            id,
            kind,
            pos,
            size,
            vel: Vec2::ZERO,
            active: true,
            pinned: false,
            age: 0.0,
            base_y: pos.y,
        });

        if kind == EntityKind::Rooftop {
            let sensor_size = EntityKind::LedgeSensor.default_size();
            let corner = Vec2::new(pos.x - size.x * 0.5, pos.y - size.y * 0.5);
            let sensor_pos = corner + Vec2::new(0.0, sensor_size.y * 0.25);
            self.spawn(EntityKind::LedgeSensor, sensor_pos, sensor_size);
        }
        id
    }

    /// Spawn resting on the ground, `left_x` being the entity's left edge
    pub fn spawn_on_ground(&mut self, kind: EntityKind, left_x: f32, lift: f32, size: Vec2) -> u32 {
        let pos = Vec2::new(left_x + size.x * 0.5, GROUND_Y - lift - size.y * 0.5);
        self.spawn(kind, pos, size)
    }

    pub fn get(&self, id: u32) -> Option<&Entity> {
        self.entities.iter().find(|e| e.id == id && e.active)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Entity> {
        self.entities.iter_mut().find(|e| e.id == id && e.active)
    }

    /// Liveness check for references held by phases and encounters
    pub fn contains(&self, id: u32) -> bool {
        self.get(id).is_some()
    }

    /// Disable an entity; it is dropped on the next cull. Returns false if it was already gone.
    pub fn despawn(&mut self, id: u32) -> bool {
        match self.get_mut(id) {
            Some(entity) => {
                entity.active = false;
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter().filter(|e| e.active)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.entities.iter_mut().filter(|e| e.active)
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count_kind(&self, kind: EntityKind) -> usize {
        self.iter().filter(|e| e.kind == kind).count()
    }

    /// Move everything left by the world scroll plus its own velocity
    pub fn scroll(&mut self, scroll_px: f32, dt: f32) {
        for entity in self.entities.iter_mut().filter(|e| e.active) {
            entity.age += dt;
            if !entity.pinned {
                entity.pos.x -= scroll_px;
            }
            entity.pos += entity.vel * dt;
            if entity.kind == EntityKind::Bird {
                entity.pos.y = entity.base_y + (entity.age * BIRD_BOB_RATE).sin() * BIRD_BOB_AMPLITUDE;
            }
        }
    }

    /// Drop disabled entities and those fully off-screen left.
    /// Returns the entities that scrolled away while still active.
    pub fn cull(&mut self) -> Vec<Entity> {
        let mut scrolled_away = Vec::new();
        self.entities.retain(|e| {
            if !e.active {
                return false;
            }
            if e.right() < DESPAWN_X {
                scrolled_away.push(e.clone());
                return false;
            }
            true
        });
        scrolled_away
    }

    /// Ground top under `x`, or None over a gap
    pub fn floor_under(&self, x: f32) -> Option<f32> {
        let over_gap = self
            .iter()
            .any(|e| e.kind == EntityKind::Gap && x > e.left() && x < e.right());
        if over_gap { None } else { Some(GROUND_Y) }
    }

    /// Despawn hazards and gaps reaching past `x`. Returns how many went.
    pub fn clear_obstacles_from(&mut self, x: f32) -> usize {
        let mut cleared = 0;
        for entity in self.iter_mut() {
            if (entity.kind.is_hazard() || entity.kind == EntityKind::Gap) && entity.right() > x {
                entity.active = false;
                cleared += 1;
            }
        }
        cleared
    }

    /// Whether a shop storefront is within `radius` of `x`
    pub fn is_near_shop(&self, x: f32, radius: f32) -> bool {
        self.iter().any(|e| {
            e.kind == EntityKind::Shop && (x < e.right() + radius) && (x > e.left() - radius)
        })
    }

    /// Rightmost edge of anything live, used to keep patterns from stacking
    pub fn rightmost_edge(&self) -> f32 {
        self.iter()
            .filter(|e| !e.kind.is_scripted())
            .map(|e| e.right())
            .fold(f32::MIN, f32::max)
    }

    pub fn clear(&mut self) {
        self.entities.clear();
    }

    /// Ensure entities are sorted by ID for deterministic iteration
    pub fn normalize_order(&mut self) {
        self.entities.sort_by_key(|e| e.id);
    }
}

/// Presentation feedback, drained by the renderer/UI each frame.
/// None of these affect gameplay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GameEvent {
    Jumped,
    Landed,
    Bounced,
    DamageTaken { hearts_left: u8 },
    CameraShake { intensity: f32 },
    FloatingText { text: String, pos: Vec2 },
    PickupCollected { kind: EntityKind },
    PhaseChanged { from: Phase, to: Phase },
    QuestionPresented { id: u32 },
    QuestionAnswered { kind: EncounterKind, correct: bool },
    StageAdvanced { stage: u32 },
    GameOver { victory: bool },
}
