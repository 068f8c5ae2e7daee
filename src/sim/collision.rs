//! Contact routing between the avatar and world entities
//!
//! A static rule table maps each entity kind to how contact with it is
//! answered. Platforms are one-way: they only support an avatar whose feet
//! start the tick at or above their top.

use std::collections::HashMap;

use glam::Vec2;
use log::debug;

use super::context::Ctx;
use super::motion::{MotionController, SurfaceKind, Support};
use super::phase::{Phase, PhaseEvent, PhaseStateMachine};
use super::state::{EntityKind, GameEvent, World};
use crate::Aabb;
use crate::consts::*;
use crate::tuning::PickupTuning;

/// How far above the feet a surface may sit and still count as underfoot
const SURFACE_SNAP: f32 = 2.0;

/// Camera shake on an accepted hit
const HIT_SHAKE: f32 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactRule {
    /// One-way platform, solid from above
    Landing,
    /// One-way platform that launches the avatar
    Bounce,
    Hazard,
    Pickup,
    Ledge,
    /// Checked by polling, not by overlap
    Dynamic,
    None,
}

fn default_rule(kind: EntityKind) -> ContactRule {
    match kind {
        EntityKind::Cart | EntityKind::GoodsStack | EntityKind::Rooftop => ContactRule::Landing,
        EntityKind::BouncePad => ContactRule::Bounce,
        EntityKind::Crate | EntityKind::Spikes | EntityKind::Bird => ContactRule::Hazard,
        EntityKind::Star | EntityKind::Heart | EntityKind::Shield => ContactRule::Pickup,
        EntityKind::LedgeSensor => ContactRule::Ledge,
        EntityKind::Carpet => ContactRule::Dynamic,
        EntityKind::Gap
        | EntityKind::Gate
        | EntityKind::Chest
        | EntityKind::Shelter
        | EntityKind::Landmark
        | EntityKind::Shop => ContactRule::None,
    }
}

const ALL_KINDS: [EntityKind; 18] = [
    EntityKind::Crate,
    EntityKind::Spikes,
    EntityKind::Bird,
    EntityKind::Star,
    EntityKind::Heart,
    EntityKind::Shield,
    EntityKind::BouncePad,
    EntityKind::Cart,
    EntityKind::GoodsStack,
    EntityKind::Rooftop,
    EntityKind::LedgeSensor,
    EntityKind::Gap,
    EntityKind::Gate,
    EntityKind::Chest,
    EntityKind::Shelter,
    EntityKind::Carpet,
    EntityKind::Landmark,
    EntityKind::Shop,
];

/// One overlap found this tick
#[derive(Debug, Clone, Copy)]
struct Contact {
    id: u32,
    kind: EntityKind,
    rule: ContactRule,
    pos: Vec2,
    size: Vec2,
}

#[derive(Debug, Clone)]
pub struct CollisionRouter {
    pickups: PickupTuning,
    rules: HashMap<EntityKind, ContactRule>,
    bounds: Aabb,
}

impl CollisionRouter {
    pub fn new(pickups: PickupTuning) -> Self {
        Self {
            pickups,
            rules: HashMap::new(),
            bounds: Aabb {
                min: Vec2::ZERO,
                max: Vec2::ZERO,
            },
        }
    }

    /// Build the rule table and record the playfield. Called once per run.
    pub fn wire_up(&mut self, world: &World) {
        self.rules = ALL_KINDS.iter().map(|k| (*k, default_rule(*k))).collect();
        self.bounds = Aabb {
            min: Vec2::new(DESPAWN_X, -SCREEN_HEIGHT),
            max: Vec2::new(SPAWN_X + SCREEN_WIDTH, KILL_Y),
        };
        debug!(
            "Collision rules wired ({} kinds, {} live entities)",
            self.rules.len(),
            world.len()
        );
    }

    pub fn is_wired(&self) -> bool {
        !self.rules.is_empty()
    }

    pub fn rule_for(&self, kind: EntityKind) -> ContactRule {
        self.rules.get(&kind).copied().unwrap_or(ContactRule::None)
    }

    /// Highest surface at or below the avatar's feet
    pub fn support_under(&self, world: &World, motion: &MotionController) -> Option<Support> {
        let feet = motion.feet();
        let body = motion.aabb();

        // Forced motion walks over gaps
        let floor = if motion.current_state().is_forced() {
            Some(GROUND_Y)
        } else {
            world.floor_under(motion.position().x)
        };
        let mut best = floor
            .filter(|top| *top >= feet - SURFACE_SNAP)
            .map(Support::ground);

        for entity in world.iter() {
            let kind = match self.rule_for(entity.kind) {
                ContactRule::Landing => SurfaceKind::Solid,
                ContactRule::Bounce => SurfaceKind::Bounce,
                _ => continue,
            };
            let top = entity.top();
            if top < feet - SURFACE_SNAP || !body.overlaps_x(&entity.aabb()) {
                continue;
            }
            if best.is_none_or(|b| top < b.top) {
                best = Some(Support {
                    top,
                    kind,
                    entity: Some(entity.id),
                });
            }
        }
        best
    }

    fn contacts(&self, world: &World, body: &Aabb) -> Vec<Contact> {
        world
            .iter()
            .filter(|e| e.aabb().overlaps(&self.bounds))
            .filter(|e| e.aabb().overlaps(body))
            .map(|e| Contact {
                id: e.id,
                kind: e.kind,
                rule: self.rule_for(e.kind),
                pos: e.pos,
                size: e.size,
            })
            .collect()
    }

    /// Answer every overlap this tick
    pub fn resolve(&mut self, ctx: &mut Ctx, phases: &mut PhaseStateMachine) {
        let body = ctx.motion.aabb();
        for contact in self.contacts(ctx.world, &body) {
            match contact.rule {
                ContactRule::Hazard => self.on_hazard(ctx),
                ContactRule::Pickup => self.on_pickup(contact, ctx),
                ContactRule::Ledge => {
                    // Ask the phase first so motion never enters a state it would refuse
                    if !phases.can_enter(ctx.world) {
                        continue;
                    }
                    let ledge_top = contact.pos.y - contact.size.y * 0.25;
                    if ctx.motion.try_grab_ledge(ledge_top) {
                        phases.notify(PhaseEvent::LedgeGrab, ctx);
                    }
                }
                ContactRule::Landing
                | ContactRule::Bounce
                | ContactRule::Dynamic
                | ContactRule::None => {}
            }
        }
    }

    fn on_hazard(&self, ctx: &mut Ctx) {
        if !ctx.motion.take_damage() {
            return;
        }
        let hearts_left = ctx.run.damage(1);
        debug!("Hit, {hearts_left} hearts left");
        ctx.emit(GameEvent::DamageTaken { hearts_left });
        ctx.emit(GameEvent::CameraShake {
            intensity: HIT_SHAKE,
        });
    }

    fn on_pickup(&self, contact: Contact, ctx: &mut Ctx) {
        if !ctx.world.despawn(contact.id) {
            return;
        }
        let text = match contact.kind {
            EntityKind::Star => {
                ctx.run.add_stars(self.pickups.star_value);
                Some(format!("+{}", self.pickups.star_value))
            }
            EntityKind::Heart => ctx
                .run
                .heal(self.pickups.heart_value)
                .then(|| format!("+{} heart", self.pickups.heart_value)),
            EntityKind::Shield => {
                ctx.motion.grant_shield(self.pickups.shield_duration);
                Some("Shield!".to_string())
            }
            _ => None,
        };
        ctx.emit(GameEvent::PickupCollected { kind: contact.kind });
        // Nothing changed, nothing to show
        if let Some(text) = text {
            ctx.emit(GameEvent::FloatingText {
                text,
                pos: contact.pos,
            });
        }
    }

    /// The carpet is tracked by polling: glued under the rider during a ride,
    /// otherwise checked for a first touch
    pub fn poll_dynamic_contacts(&mut self, ctx: &mut Ctx, phases: &mut PhaseStateMachine) {
        if phases.current_phase() == Phase::SpecialRide {
            let Some(carpet) = phases.transient() else {
                return;
            };
            let rider = ctx.motion.position();
            let feet = ctx.motion.feet();
            if let Some(entity) = ctx.world.get_mut(carpet) {
                entity.pos = Vec2::new(rider.x, feet + entity.size.y * 0.5);
            }
            return;
        }

        let body = ctx.motion.aabb();
        let touched = ctx
            .world
            .iter()
            .filter(|e| self.rule_for(e.kind) == ContactRule::Dynamic)
            .find(|e| e.aabb().overlaps(&body))
            .map(|e| e.id);
        if let Some(carpet) = touched {
            if phases.notify(PhaseEvent::CarpetContact { carpet }, ctx) {
                debug!("Boarded carpet {carpet}");
            }
        }
    }
}
