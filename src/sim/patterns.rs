//! Authored obstacle and pickup layouts
//!
//! A pattern is a fixed set of placements spawned together as one
//! scheduling unit. Offsets are measured from the pattern's left edge;
//! `lift` is the height of a placement's bottom above the ground (negative
//! for gaps, which hang below the ground line).

use glam::Vec2;

use super::state::{EntityKind, World, Zone};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub kind: EntityKind,
    pub dx: f32,
    pub lift: f32,
    /// None uses the kind's default size
    pub size: Option<Vec2>,
}

impl Placement {
    pub fn size(&self) -> Vec2 {
        self.size.unwrap_or_else(|| self.kind.default_size())
    }

    /// Vertical extent above the ground line as (bottom, top)
    pub fn band(&self) -> (f32, f32) {
        (self.lift, self.lift + self.size().y)
    }
}

const fn at(kind: EntityKind, dx: f32, lift: f32) -> Placement {
    Placement {
        kind,
        dx,
        lift,
        size: None,
    }
}

const fn gap(dx: f32, width: f32) -> Placement {
    Placement {
        kind: EntityKind::Gap,
        dx,
        lift: -80.0,
        size: Some(Vec2::new(width, 80.0)),
    }
}

const fn star(dx: f32, lift: f32) -> Placement {
    at(EntityKind::Star, dx, lift)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pattern {
    pub name: &'static str,
    pub zones: &'static [Zone],
    pub min_stage: u32,
    /// Only after the market has been discovered
    pub needs_market: bool,
    /// Last thing in the pattern is a gap
    pub ends_in_gap: bool,
    /// Needs full speed on flat ground before it
    pub requires_running_start: bool,
    /// Seconds until the next spawn at stage 1, before difficulty scaling
    pub delay: f32,
    pub placements: &'static [Placement],
}

/// Breathing room after a pattern that does not set its own
pub const DEFAULT_DELAY: f32 = 1.6;

const fn pattern(name: &'static str, zones: &'static [Zone], placements: &'static [Placement]) -> Pattern {
    Pattern {
        name,
        zones,
        min_stage: 1,
        needs_market: false,
        ends_in_gap: false,
        requires_running_start: false,
        delay: DEFAULT_DELAY,
        placements,
    }
}

impl Pattern {
    const fn from_stage(self, min_stage: u32) -> Self {
        Pattern { min_stage, ..self }
    }

    const fn market(self) -> Self {
        Pattern {
            needs_market: true,
            ..self
        }
    }

    const fn ending_in_gap(self) -> Self {
        Pattern {
            ends_in_gap: true,
            ..self
        }
    }

    const fn running_start(self) -> Self {
        Pattern {
            requires_running_start: true,
            ..self
        }
    }

    const fn then_wait(self, delay: f32) -> Self {
        Pattern { delay, ..self }
    }

    pub fn has_gap(&self) -> bool {
        self.placements.iter().any(|p| p.kind == EntityKind::Gap)
    }

    /// Horizontal extent from the left edge
    pub fn width(&self) -> f32 {
        self.placements
            .iter()
            .map(|p| p.dx + p.size().x)
            .fold(0.0, f32::max)
    }

    pub fn is_available(&self, zone: Zone, stage: u32, market_discovered: bool) -> bool {
        self.zones.contains(&zone)
            && stage >= self.min_stage
            && (!self.needs_market || market_discovered)
    }

    /// Place every entity with the pattern's left edge at `origin_x`
    pub fn spawn(&self, world: &mut World, origin_x: f32) -> Vec<u32> {
        self.placements
            .iter()
            .map(|p| world.spawn_on_ground(p.kind, origin_x + p.dx, p.lift, p.size()))
            .collect()
    }
}

const ALL: &[Zone] = &[Zone::First, Zone::Second, Zone::Third];
const FIRST: &[Zone] = &[Zone::First];
const SECOND: &[Zone] = &[Zone::Second];
const THIRD: &[Zone] = &[Zone::Third];
const FIRST_SECOND: &[Zone] = &[Zone::First, Zone::Second];
const SECOND_THIRD: &[Zone] = &[Zone::Second, Zone::Third];

/// The first two spawns of every run, in order
pub static TUTORIAL: [Pattern; 2] = [
    pattern("tutorial_crate", ALL, &[at(EntityKind::Crate, 0.0, 0.0)]).then_wait(2.2),
    pattern(
        "tutorial_crate_pair",
        ALL,
        &[
            at(EntityKind::Crate, 0.0, 0.0),
            star(140.0, 60.0),
            at(EntityKind::Crate, 320.0, 0.0),
        ],
    )
    .then_wait(2.2),
];

/// Used when the filtered pool comes up empty
pub static SAFE_DEFAULT: Pattern = pattern(
    "safe_stars",
    ALL,
    &[star(0.0, 30.0), star(60.0, 30.0), star(120.0, 30.0)],
)
.then_wait(1.2);

/// Ordinary patterns for every zone
pub static CATALOG: &[Pattern] = &[
    pattern("single_crate", FIRST_SECOND, &[at(EntityKind::Crate, 0.0, 0.0)]).then_wait(1.3),
    pattern(
        "double_crate",
        FIRST_SECOND,
        &[at(EntityKind::Crate, 0.0, 0.0), at(EntityKind::Crate, 300.0, 0.0)],
    )
    .then_wait(1.9),
    pattern("spikes", ALL, &[at(EntityKind::Spikes, 0.0, 0.0)]).then_wait(1.3),
    pattern(
        "star_arc",
        FIRST,
        &[
            at(EntityKind::Crate, 60.0, 0.0),
            star(0.0, 90.0),
            star(70.0, 130.0),
            star(140.0, 90.0),
        ],
    ),
    pattern("low_bird", ALL, &[at(EntityKind::Bird, 0.0, 20.0)]).from_stage(2),
    pattern("small_gap", FIRST_SECOND, &[gap(0.0, 100.0)]).ending_in_gap(),
    pattern(
        "crate_then_gap",
        FIRST,
        &[at(EntityKind::Crate, 0.0, 0.0), gap(260.0, 90.0)],
    )
    .ending_in_gap(),
    pattern(
        "spike_run",
        ALL,
        &[at(EntityKind::Spikes, 0.0, 0.0), at(EntityKind::Spikes, 64.0, 0.0)],
    )
    .running_start(),
    pattern("wide_gap", SECOND_THIRD, &[gap(0.0, 170.0)])
        .ending_in_gap()
        .running_start()
        .then_wait(2.0),
    pattern(
        "bounce_stars",
        ALL,
        &[
            at(EntityKind::BouncePad, 0.0, 0.0),
            star(10.0, 240.0),
            star(70.0, 280.0),
            star(130.0, 240.0),
        ],
    ),
    pattern("heart_bonus", ALL, &[at(EntityKind::Heart, 0.0, 80.0)]).then_wait(1.0),
    pattern("shield_pickup", ALL, &[at(EntityKind::Shield, 0.0, 60.0)])
        .from_stage(2)
        .then_wait(1.0),
    pattern(
        "cart",
        SECOND,
        &[
            at(EntityKind::Cart, 0.0, 0.0),
            star(10.0, 80.0),
            star(70.0, 80.0),
        ],
    ),
    pattern(
        "goods_stack",
        SECOND,
        &[at(EntityKind::GoodsStack, 0.0, 0.0), star(30.0, 100.0)],
    ),
    pattern(
        "bird_pair",
        SECOND_THIRD,
        &[at(EntityKind::Bird, 0.0, 20.0), at(EntityKind::Bird, 240.0, 90.0)],
    ),
    pattern(
        "shop_front",
        SECOND,
        &[at(EntityKind::Shop, 0.0, 0.0), star(60.0, 150.0)],
    )
    .market(),
    pattern(
        "stall_gap",
        SECOND,
        &[at(EntityKind::Crate, 0.0, 0.0), gap(240.0, 110.0)],
    )
    .market()
    .ending_in_gap(),
    pattern(
        "canyon_spikes",
        THIRD,
        &[at(EntityKind::Spikes, 0.0, 0.0), at(EntityKind::Crate, 260.0, 0.0)],
    ),
    pattern(
        "bird_flock",
        THIRD,
        &[
            at(EntityKind::Bird, 0.0, 20.0),
            at(EntityKind::Bird, 160.0, 70.0),
            at(EntityKind::Bird, 320.0, 20.0),
        ],
    )
    .then_wait(2.1),
    pattern(
        "pad_over_gap",
        THIRD,
        &[at(EntityKind::BouncePad, 0.0, 0.0), gap(100.0, 160.0)],
    )
    .ending_in_gap(),
    pattern(
        "carpet",
        THIRD,
        &[at(EntityKind::Carpet, 0.0, 30.0), star(20.0, 110.0)],
    )
    .then_wait(2.4),
];

/// Rooftop traversal, always spawned as consecutive steps
pub static ROOFTOP_SEQUENCE: [Pattern; 3] = [
    pattern(
        "rooftop_approach",
        SECOND,
        &[star(0.0, 40.0), star(60.0, 70.0), star(120.0, 100.0)],
    ),
    pattern(
        "rooftop",
        SECOND,
        &[
            at(EntityKind::Rooftop, 0.0, 0.0),
            star(60.0, 170.0),
            star(140.0, 170.0),
        ],
    )
    .then_wait(2.2),
    pattern(
        "rooftop_descent",
        SECOND,
        &[star(0.0, 120.0), star(60.0, 80.0), star(120.0, 40.0)],
    ),
];

/// Layouts for the carpet ride. Stars sit inside the flight band.
pub static FLIGHT_PATTERNS: [Pattern; 5] = [
    pattern(
        "flight_wave",
        THIRD,
        &[
            star(0.0, 120.0),
            star(60.0, 180.0),
            star(120.0, 240.0),
            star(180.0, 180.0),
            star(240.0, 120.0),
            star(300.0, 180.0),
            star(360.0, 240.0),
        ],
    ),
    pattern(
        "flight_parallel_lines",
        THIRD,
        &[
            star(0.0, 110.0),
            star(0.0, 280.0),
            star(70.0, 110.0),
            star(70.0, 280.0),
            star(140.0, 110.0),
            star(140.0, 280.0),
            star(210.0, 110.0),
            star(210.0, 280.0),
        ],
    ),
    pattern(
        "flight_zigzag",
        THIRD,
        &[
            at(EntityKind::Bird, 0.0, 320.0),
            star(60.0, 100.0),
            star(120.0, 200.0),
            star(180.0, 300.0),
            star(240.0, 200.0),
            star(300.0, 100.0),
            at(EntityKind::Bird, 360.0, 320.0),
        ],
    ),
    pattern(
        "flight_ring",
        THIRD,
        &[
            star(0.0, 190.0),
            star(28.0, 120.0),
            star(28.0, 260.0),
            star(96.0, 90.0),
            at(EntityKind::Heart, 96.0, 190.0),
            star(96.0, 290.0),
            star(164.0, 120.0),
            star(164.0, 260.0),
            star(192.0, 190.0),
        ],
    ),
    pattern(
        "flight_ascent",
        THIRD,
        &[
            star(0.0, 60.0),
            star(50.0, 110.0),
            star(100.0, 160.0),
            star(150.0, 210.0),
            star(200.0, 260.0),
            star(250.0, 310.0),
        ],
    ),
];

/// Ordinary patterns a zone/stage may draw from
pub fn pool(zone: Zone, stage: u32, market_discovered: bool) -> Vec<&'static Pattern> {
    CATALOG
        .iter()
        .filter(|p| p.is_available(zone, stage, market_discovered))
        .collect()
}
