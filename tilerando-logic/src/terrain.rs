//! Terrain derivation and interning.
//!
//! A terrain is the movement contract of one tile: a requirement to enter it
//! and a requirement to leave it in each compass direction. Terrains are
//! interned in an arena so that the canonicalizer can compare them by id;
//! two tiles with the same effective movement behavior always carry the same
//! `TerrainId`.

use hashbrown::HashMap;

use tilerando_game::{Capabilities, FlagId};

use crate::requirement::Requirement;
use crate::tile::{Dir, DirMask, DIRMASK_ALL, DIRMASK_NOT_SOUTH, DIRMASK_SOUTH};

pub type TerrainId = usize;

// Effect bits. The low byte matches the game's tile-effects table; the
// builder masks the raw byte down to EFFECT_BITS and ORs in the synthetic
// bits (barrier, swamp, dolphin, slope heights) before terrain lookup.
pub const EFFECT_BARRIER: u16 = 0x01;
pub const EFFECT_FLY: u16 = 0x02;
pub const EFFECT_IMPASSABLE: u16 = 0x04;
pub const EFFECT_SWAMP: u16 = 0x08;
pub const EFFECT_DOLPHIN: u16 = 0x10;
pub const EFFECT_SLOPE: u16 = 0x20;
pub const EFFECT_PAIN: u16 = 0x80;
pub const EFFECT_SLOPE8: u16 = 0x100;
pub const EFFECT_SLOPE9: u16 = 0x200;
/// The raw tile-effect bits that carry movement meaning.
pub const EFFECT_BITS: u16 = EFFECT_FLY | EFFECT_IMPASSABLE | EFFECT_SLOPE | EFFECT_PAIN;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Terrain {
    pub enter: Requirement,
    /// Exit requirement per direction group. Masks are disjoint and cover
    /// all four directions.
    pub exit: Vec<(DirMask, Requirement)>,
    /// Set on the extra copy used for seamless exits, so the canonicalizer
    /// never merges across the transition even though the movement
    /// requirements are unchanged.
    pub seamless: bool,
}

impl Terrain {
    fn open() -> Terrain {
        Terrain {
            enter: Requirement::open(),
            exit: vec![(DIRMASK_ALL, Requirement::open())],
            seamless: false,
        }
    }

    /// The exit requirement in one direction.
    pub fn exit_for(&self, dir: Dir) -> Requirement {
        let mut out = Requirement::closed();
        for (mask, req) in &self.exit {
            if mask & dir.bit() != 0 {
                out = out.or(req);
            }
        }
        out
    }
}

/// Splits the grouped exit list into one requirement per direction.
fn exits_by_dir(terrain: &Terrain) -> [Requirement; 4] {
    [Dir::North, Dir::West, Dir::South, Dir::East].map(|d| terrain.exit_for(d))
}

/// Regroups per-direction requirements, merging directions with equal
/// requirements into one mask. Directions are visited in a fixed order so
/// the grouping is deterministic.
fn group_exits(by_dir: [Requirement; 4]) -> Vec<(DirMask, Requirement)> {
    let mut out: Vec<(DirMask, Requirement)> = Vec::new();
    for (d, req) in by_dir.into_iter().enumerate() {
        match out.iter_mut().find(|(_, r)| *r == req) {
            Some(entry) => entry.0 |= 1 << d,
            None => out.push((1 << d, req)),
        }
    }
    out
}

/// Builds and interns terrains. All constructors are memoized through the
/// interning map, so repeated lookups for the same effects or the same
/// overlay composition return the same id.
pub struct TerrainCatalog {
    arena: Vec<Terrain>,
    interned: HashMap<Terrain, TerrainId>,
    by_effects: HashMap<u16, Option<TerrainId>>,
    caps: Capabilities,
}

impl TerrainCatalog {
    pub fn new(caps: &Capabilities) -> TerrainCatalog {
        TerrainCatalog {
            arena: Vec::new(),
            interned: HashMap::new(),
            by_effects: HashMap::new(),
            caps: caps.clone(),
        }
    }

    pub fn get(&self, id: TerrainId) -> &Terrain {
        &self.arena[id]
    }

    pub fn intern(&mut self, terrain: Terrain) -> TerrainId {
        if let Some(&id) = self.interned.get(&terrain) {
            return id;
        }
        let id = self.arena.len();
        self.arena.push(terrain.clone());
        self.interned.insert(terrain, id);
        id
    }

    /// The terrain for an effect bitmask, or `None` if the tile is
    /// impassable.
    pub fn tile(&mut self, effects: u16) -> Option<TerrainId> {
        if let Some(&id) = self.by_effects.get(&effects) {
            return id;
        }
        let id = self.build_tile(effects).map(|t| self.intern(t));
        self.by_effects.insert(effects, id);
        id
    }

    fn build_tile(&self, effects: u16) -> Option<Terrain> {
        if effects & EFFECT_IMPASSABLE != 0 {
            return None;
        }
        let mut terrain = Terrain::open();
        if effects & (EFFECT_DOLPHIN | EFFECT_FLY) == EFFECT_DOLPHIN | EFFECT_FLY {
            // Deep water: enterable when riding the dolphin or flying. A
            // sloped water tile is a waterfall; going over the edge is free,
            // only swimming up it takes the upgrade.
            if effects & EFFECT_SLOPE != 0 {
                terrain.exit = vec![
                    (
                        DIRMASK_NOT_SOUTH,
                        Requirement::single([self.caps.climb_waterfall]),
                    ),
                    (DIRMASK_SOUTH, Requirement::open()),
                ];
            }
            terrain.enter = Requirement::from_clauses([
                vec![self.caps.currently_riding_dolphin],
                vec![self.caps.flight],
            ]);
        } else {
            // Slopes can be descended freely; climbing depends on height.
            let climb = if effects & EFFECT_SLOPE8 != 0 {
                Some(self.caps.climb_slope8)
            } else if effects & EFFECT_SLOPE9 != 0 {
                Some(self.caps.climb_slope9)
            } else if effects & EFFECT_SLOPE != 0 {
                Some(self.caps.climb_slope10)
            } else {
                None
            };
            if let Some(c) = climb {
                terrain.exit = vec![
                    (DIRMASK_NOT_SOUTH, Requirement::single([c])),
                    (DIRMASK_SOUTH, Requirement::open()),
                ];
            }
            if effects & EFFECT_FLY != 0 {
                terrain.enter = Requirement::single([self.caps.flight]);
            }
        }
        if effects & EFFECT_SWAMP != 0 {
            terrain.enter = terrain.enter.meet(&Requirement::single([self.caps.travel_swamp]));
        }
        if effects & EFFECT_PAIN != 0 {
            terrain.enter = terrain.enter.meet(&Requirement::single([self.caps.cross_pain]));
        }
        if effects & EFFECT_BARRIER != 0 {
            terrain.enter =
                terrain.enter.meet(&Requirement::single([self.caps.shooting_statue]));
        }
        Some(terrain)
    }

    /// A terrain that can never be entered, used as the base form of a tile
    /// that only becomes passable once its map flag is set.
    pub fn closed(&mut self) -> TerrainId {
        self.intern(Terrain {
            enter: Requirement::closed(),
            exit: vec![(DIRMASK_ALL, Requirement::open())],
            seamless: false,
        })
    }

    /// An extra copy of a terrain distinguished only by the seamless bit.
    pub fn seamless(&mut self, id: TerrainId) -> TerrainId {
        let mut terrain = self.arena[id].clone();
        terrain.seamless = true;
        self.intern(terrain)
    }

    /// A push-down blocker (guard, statue): retreating south is free, any
    /// other direction requires the blocker to be absent.
    pub fn statue(&mut self, anti: &Requirement) -> TerrainId {
        let terrain = Terrain {
            enter: Requirement::open(),
            exit: vec![
                (DIRMASK_SOUTH, Requirement::open()),
                (DIRMASK_NOT_SOUTH, anti.clone()),
            ],
            seamless: false,
        };
        self.intern(terrain)
    }

    /// Boss arena terrain, applied to the whole arena screen: moving on in
    /// the forward (south) direction requires the boss's defeat flag. The
    /// Rage variant inverts the gate, since that fight blocks the way back.
    pub fn boss(&mut self, flag: FlagId, rage: bool) -> TerrainId {
        let gated = Requirement::single([flag]);
        let (south, rest) = if rage {
            (Requirement::open(), gated)
        } else {
            (gated, Requirement::open())
        };
        let terrain = Terrain {
            enter: Requirement::open(),
            exit: vec![(DIRMASK_SOUTH, south), (DIRMASK_NOT_SOUTH, rest)],
            seamless: false,
        };
        self.intern(terrain)
    }

    /// A tile whose alternate form is unlocked by a map flag: behaves as
    /// `base`, or as `alt` once the flag is set. A negative flag means the
    /// flag isn't tracked, so the alternate form is reachable outright.
    pub fn flag_gated(&mut self, base: TerrainId, flag: FlagId, alt: TerrainId) -> TerrainId {
        let base = self.arena[base].clone();
        let alt = self.arena[alt].clone();
        let gate = if flag < 0 {
            Requirement::open()
        } else {
            Requirement::single([flag])
        };
        let enter = base.enter.or(&alt.enter.meet(&gate));
        let base_exits = exits_by_dir(&base);
        let alt_exits = exits_by_dir(&alt);
        let mut by_dir = base_exits;
        for (d, alt_exit) in alt_exits.into_iter().enumerate() {
            by_dir[d] = by_dir[d].or(&alt_exit.meet(&gate));
        }
        self.intern(Terrain {
            enter,
            exit: group_exits(by_dir),
            seamless: base.seamless || alt.seamless,
        })
    }

    /// The pairwise AND of two terrains, direction by direction. Used when
    /// an overlay (wall, trigger, boss) lands on a tile that already has
    /// terrain.
    pub fn meet(&mut self, a: TerrainId, b: TerrainId) -> TerrainId {
        if a == b {
            return a;
        }
        let ta = self.arena[a].clone();
        let tb = self.arena[b].clone();
        let enter = ta.enter.meet(&tb.enter);
        let ea = exits_by_dir(&ta);
        let eb = exits_by_dir(&tb);
        let mut by_dir = ea;
        for (d, e) in eb.into_iter().enumerate() {
            by_dir[d] = by_dir[d].meet(&e);
        }
        self.intern(Terrain {
            enter,
            exit: group_exits(by_dir),
            seamless: ta.seamless || tb.seamless,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> TerrainCatalog {
        TerrainCatalog::new(&Capabilities::default())
    }

    #[test]
    fn test_interning_is_by_value() {
        let mut c = catalog();
        let a = c.tile(0);
        let b = c.tile(0);
        assert_eq!(a, b);
        assert!(a.is_some());
        assert_eq!(c.tile(EFFECT_IMPASSABLE), None);
        assert_ne!(c.tile(EFFECT_SWAMP), a);
    }

    #[test]
    fn test_seamless_copy_is_distinct() {
        let mut c = catalog();
        let open = c.tile(0).unwrap();
        let seamless = c.seamless(open);
        assert_ne!(open, seamless);
        assert_eq!(c.seamless(open), seamless);
        assert_eq!(c.get(seamless).enter, c.get(open).enter);
    }

    #[test]
    fn test_deep_water() {
        let mut c = catalog();
        let caps = Capabilities::default();
        let water = c.tile(EFFECT_DOLPHIN | EFFECT_FLY).unwrap();
        let enter = &c.get(water).enter;
        assert_eq!(enter.clauses().len(), 2);
        assert!(enter
            .clauses()
            .contains(&vec![caps.currently_riding_dolphin]));
        assert!(enter.clauses().contains(&vec![caps.flight]));
    }

    #[test]
    fn test_waterfall_gates_upstream_only() {
        let mut c = catalog();
        let caps = Capabilities::default();
        let falls = c.tile(EFFECT_DOLPHIN | EFFECT_FLY | EFFECT_SLOPE).unwrap();
        let t = c.get(falls);
        assert_eq!(
            t.exit_for(Dir::North),
            Requirement::single([caps.climb_waterfall])
        );
        assert_eq!(
            t.exit_for(Dir::East),
            Requirement::single([caps.climb_waterfall])
        );
        assert!(t.exit_for(Dir::South).is_open());
    }

    #[test]
    fn test_slope_gates_everything_but_south() {
        let mut c = catalog();
        let caps = Capabilities::default();
        let slope = c.tile(EFFECT_SLOPE | EFFECT_SLOPE8).unwrap();
        let t = c.get(slope);
        assert_eq!(t.exit_for(Dir::North), Requirement::single([caps.climb_slope8]));
        assert!(t.exit_for(Dir::South).is_open());
    }

    #[test]
    fn test_meet_is_idempotent_via_interning() {
        let mut c = catalog();
        let swamp = c.tile(EFFECT_SWAMP).unwrap();
        let statue = c.statue(&Requirement::single([0x123]));
        let both = c.meet(swamp, statue);
        assert_eq!(c.meet(swamp, statue), both);
        assert_eq!(c.meet(both, statue), both);
    }
}
