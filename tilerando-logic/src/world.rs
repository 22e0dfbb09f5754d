//! The world graph: terrains, checks, canonicalization, and the route
//! fixpoint.
//!
//! Build order matters: all terrains and raw exits are registered first,
//! then overlays (walls, triggers, NPCs, bosses) amend them, and only then
//! does the union-find run, since certain neighbors specifically must not
//! be merged. Routes are propagated last, over canonical tiles only.

use std::collections::VecDeque;

use anyhow::{bail, Context, Result};
use hashbrown::{HashMap, HashSet};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use tilerando_game::{
    BossIdx, BossKind, FlagId, FlagLogic, GameData, ItemId, ItemUse, LocalDialog, Location,
    LocationId, NpcId, ObjectId, ShopKind, SlotId, Spawn, SpawnData, TriggerId, WallKind,
    SCREEN_TILES, SPAWN_TYPE_NPC, SPAWN_TYPE_TRIGGER,
};

use crate::requirement::{Condition, Requirement, RequirementBuilder, Route};
use crate::settings::LogicSettings;
use crate::terrain::{Terrain, TerrainCatalog, TerrainId, EFFECT_BARRIER, EFFECT_BITS,
                     EFFECT_DOLPHIN, EFFECT_FLY, EFFECT_PAIN, EFFECT_SLOPE, EFFECT_SLOPE8,
                     EFFECT_SLOPE9};
use crate::tile::{self, Dir, ScreenId, TileId, TilePair, DIRMASK_ALL, DIR_EXIT_BIT};
use crate::union_find::UnionFind;

/// Placement metadata for one check slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotInfo {
    /// Collecting here can lose the item if the inventory is full.
    pub lossy: bool,
    /// The slot can hold a unique item.
    pub unique: bool,
    /// The slot must never lose items (triggers, boss drops).
    pub prevent_loss: bool,
}

/// Placement metadata for one item.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemInfo {
    pub unique: bool,
    pub losable: bool,
    pub prevent_loss: bool,
}

/// The output of the build: everything the item placement search consumes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LocationList {
    /// Frozen requirement per check condition.
    pub requirements: HashMap<Condition, Requirement>,
    pub slots: HashMap<Condition, SlotInfo>,
    pub items: HashMap<Condition, ItemInfo>,
}

/// Read-only digest of one canonical region, for diagnostics and spoilers.
#[derive(Clone, Debug)]
pub struct AreaData {
    pub id: usize,
    pub tiles: Vec<TileId>,
    pub locations: Vec<LocationId>,
    pub terrain: TerrainId,
    pub routes: Requirement,
    pub checks: Vec<(Condition, Requirement)>,
}

#[derive(Clone, Debug, PartialEq)]
struct Check {
    requirement: Requirement,
    checks: Vec<Condition>,
}

pub struct World<'a> {
    game: &'a GameData,
    settings: &'a LogicSettings,
    catalog: TerrainCatalog,
    /// Terrain per tile. Tiles absent here are impassable.
    terrains: HashMap<TileId, TerrainId>,
    checks: HashMap<TileId, Vec<Check>>,
    slots: HashMap<Condition, SlotInfo>,
    items: HashMap<Condition, ItemInfo>,
    /// Raw one-way exits, without canonicalizing.
    exits: HashMap<TileId, TileId>,
    /// Canonicalized exit pairs that survive the two-way merge.
    exit_pairs: HashSet<TilePair>,
    /// Tiles the player can't stop on: crossing always changes location.
    seamless_exits: HashSet<TileId>,
    tiles: UnionFind,
    /// Direction bitmask per canonical tile pair.
    neighbors: HashMap<TilePair, u8>,
    routes: HashMap<TileId, RequirementBuilder>,
    route_edges: HashMap<TileId, Vec<Route>>,
    requirement_map: HashMap<Condition, RequirementBuilder>,
    chest_requirement: Requirement,
    rage_location: Option<LocationId>,
    /// Location whose exit drops into the lower half of the Rage arena.
    rage_entrance_location: Option<LocationId>,
}

impl<'a> World<'a> {
    /// Builds the full requirement graph for the given world and settings.
    pub fn build(game: &'a GameData, settings: &'a LogicSettings) -> Result<World<'a>> {
        let caps = game.capabilities;
        let chest_requirement = if settings.always_mimics {
            let mut r = Requirement::closed();
            for i in 0..4 {
                if game.mimic_elements & (1 << i) != 0 {
                    r = r.or(&Requirement::single([caps.swords[i]]));
                }
            }
            r
        } else {
            Requirement::open()
        };
        let rage_location = game
            .bosses
            .iter()
            .find(|b| b.kind == BossKind::Rage)
            .and_then(|b| b.location);
        let mut world = World {
            game,
            settings,
            catalog: TerrainCatalog::new(&caps),
            terrains: HashMap::new(),
            checks: HashMap::new(),
            slots: HashMap::new(),
            items: HashMap::new(),
            exits: HashMap::new(),
            exit_pairs: HashSet::new(),
            seamless_exits: HashSet::new(),
            tiles: UnionFind::new(),
            neighbors: HashMap::new(),
            routes: HashMap::new(),
            route_edges: HashMap::new(),
            requirement_map: HashMap::new(),
            chest_requirement,
            rage_location,
            rage_entrance_location: None,
        };

        info!("building logic graph: {} locations", game.locations.len());
        for location in &game.locations {
            if !location.used {
                continue;
            }
            world.process_location(location)?;
        }
        world.add_extra_checks()?;

        world.union_neighbors();
        world.record_exits();
        world.build_neighbors();
        world.add_all_routes()?;

        world.consolidate_checks();
        world.build_requirement_map();
        world.audit();
        Ok(world)
    }

    /// Returns the placement input after the requirement map is built.
    pub fn location_list(&self) -> LocationList {
        LocationList {
            requirements: self
                .requirement_map
                .iter()
                .map(|(&c, b)| (c, b.freeze()))
                .collect(),
            slots: self.slots.clone(),
            items: self.items.clone(),
        }
    }

    /// The frozen route requirement for a check condition, if any route
    /// reaches it.
    pub fn requirement(&self, check: Condition) -> Option<Requirement> {
        self.requirement_map.get(&check).map(|b| b.freeze())
    }

    /// The canonical representative of a tile.
    pub fn canonical(&mut self, t: TileId) -> TileId {
        self.tiles.find(t)
    }

    /// The direction bitmask of the edge between two canonical tiles, or 0
    /// if no edge survived canonicalization.
    pub fn neighbor_mask(&mut self, from: TileId, to: TileId) -> u8 {
        let pair = tile::pair(self.tiles.find(from), self.tiles.find(to));
        self.neighbors.get(&pair).copied().unwrap_or(0)
    }

    /// The canonical entrance tile of a location.
    pub fn entrance(&mut self, location: LocationId, index: usize) -> Result<TileId> {
        let loc = &self.game.locations[location];
        let e = loc
            .entrances
            .get(index)
            .with_context(|| format!("bad entrance {index} in {}", loc.name))?;
        Ok(self.tiles.find(tile::tile(location, e.xt, e.yt)))
    }

    /// Digests the canonical regions for diagnostics and spoiler output.
    pub fn world_data(&mut self) -> Vec<AreaData> {
        let mut areas = Vec::new();
        for set in self.tiles.sets() {
            let canonical = self.tiles.find(set[0]);
            let Some(&terrain) = self.terrains.get(&canonical) else {
                continue;
            };
            let routes = match self.routes.get(&canonical) {
                Some(b) if !b.is_empty() => b.freeze(),
                _ => continue,
            };
            let mut locations: Vec<LocationId> =
                set.iter().map(|&t| tile::location(t)).collect();
            locations.dedup();
            let mut checks = Vec::new();
            if let Some(list) = self.checks.get(&canonical) {
                for check in list {
                    for &c in &check.checks {
                        checks.push((c, check.requirement.clone()));
                    }
                }
            }
            areas.push(AreaData {
                id: areas.len(),
                tiles: set,
                locations,
                terrain,
                routes,
                checks,
            });
        }
        info!("digested {} reachable areas", areas.len());
        areas
    }

    // Location pass: terrains, spawns, item uses.

    fn process_location(&mut self, location: &'a Location) -> Result<()> {
        self.process_location_tiles(location)?;
        for spawn in &location.spawns {
            match spawn.data {
                // Walls were already picked up by the tile pass.
                SpawnData::Wall { .. } => {}
                SpawnData::Trigger { id } => self.process_trigger(location, spawn, id)?,
                SpawnData::Npc { id } => self.process_npc(location, spawn, id)?,
                SpawnData::Boss { boss } => self.process_boss(location, spawn, boss)?,
                SpawnData::Chest { slot } => self.process_chest(location, spawn, slot),
                SpawnData::Monster { object } => self.process_monster(location, spawn, object)?,
                SpawnData::Other { type_code, id } => {
                    let game = self.game;
                    let keyed = game
                        .keyed_spawns
                        .iter()
                        .find(|k| k.type_code == type_code && k.id == id);
                    if let Some(k) = keyed {
                        let t = tile::tile(location.id, spawn.xt, spawn.yt);
                        let req = Requirement::single([k.flag]);
                        self.process_key_use(&tile::screen_hitbox(t), &req)?;
                    }
                }
            }
        }
        // Location-wide item uses attach at the entrance.
        let game = self.game;
        for (item, use_) in game.item_uses_for(!(location.id as i32)) {
            let entrance = self.entrance(location.id, 0)?;
            self.process_item_use(&[entrance], &Requirement::open(), item, use_)?;
        }
        Ok(())
    }

    fn process_location_tiles(&mut self, location: &'a Location) -> Result<()> {
        let game = self.game;
        // Walls come first so the whole screen shares one capability
        // requirement instead of one per wall tile. Shooting statues project
        // a barrier zone over the gallery between them.
        let mut walls: HashMap<ScreenId, u8> = HashMap::new();
        let mut shooting_statues: HashSet<TileId> = HashSet::new();
        for spawn in &location.spawns {
            match spawn.data {
                SpawnData::Wall { kind } => {
                    let t = tile::tile(location.id, spawn.xt, spawn.yt);
                    walls.insert(tile::screen(t), kind);
                }
                SpawnData::Monster { object } => {
                    let statue = game
                        .monsters
                        .get(&object)
                        .map_or(false, |m| m.shooting_statue);
                    if statue {
                        let t = tile::tile(location.id, spawn.xt, spawn.yt);
                        // Only the columns between the two statue rows are
                        // actually covered by the projectiles.
                        let center = tile::screen(t) << 8 | (t & 0xf0);
                        for dx in 4..=0xb {
                            for dy in -3..=3 {
                                shooting_statues.insert(tile::add(center, dy, dx));
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        let tileset = &game.tilesets[location.tileset];
        let effects_table = &game.tile_effects[location.tile_effects];
        for sy in 0..location.height {
            for sx in 0..location.width {
                let screen = &game.screens[location.screens[sy][sx]];
                let screen_id = (location.id as u32) << 8 | (sy as u32) << 4 | sx as u32;
                let screen_pos = ((sy << 4) | sx) as u8;
                let flag = match walls.get(&screen_id) {
                    Some(&kind) => Some(self.wall_capability(kind)?),
                    None => location.screen_flag(screen_pos),
                };
                let logic = if location.is_tower {
                    FlagLogic { assume_true: true, ..FlagLogic::default() }
                } else {
                    flag.map(|f| self.flag_logic(f)).unwrap_or_default()
                };
                if let Some(pit) = location.pits.iter().find(|p| p.from_screen == screen_pos) {
                    let to = (pit.to_location as u32) << 8 | pit.to_screen as u32;
                    self.exits.insert(
                        tile::tile_on_screen(screen_id, 0x88),
                        tile::tile_on_screen(to, 0x88),
                    );
                }
                for t in 0..SCREEN_TILES as u8 {
                    let tid = tile::tile_on_screen(screen_id, t);
                    let mut metatile = screen.tiles[t as usize];
                    if logic.assume_true && metatile < 0x20 {
                        metatile = tileset.alternates[metatile as usize];
                    }
                    let effects = if location.is_shop {
                        0
                    } else {
                        effects_table.effects[metatile as usize] as u16
                    };
                    let barrier = shooting_statues.contains(&tid);
                    let mut terrain = self.make_terrain(location, effects, tid, barrier);
                    if metatile < 0x20
                        && flag.is_some()
                        && !logic.assume_true
                        && !logic.assume_false
                    {
                        let alternate = tileset.alternates[metatile as usize];
                        let alt_effects = if location.is_shop {
                            0
                        } else {
                            effects_table.effects[alternate as usize] as u16
                        };
                        if alternate != metatile {
                            if let Some(alt) =
                                self.make_terrain(location, alt_effects, tid, barrier)
                            {
                                let base = match terrain {
                                    Some(b) => b,
                                    None => self.catalog.closed(),
                                };
                                let gate = if logic.track { flag.unwrap_or(-1) } else { -1 };
                                terrain = Some(self.catalog.flag_gated(base, gate, alt));
                            }
                        }
                    }
                    if let Some(id) = terrain {
                        self.terrains.insert(tid, id);
                    }
                }
            }
        }

        for exit in &location.exits {
            let from = tile::tile(location.id, exit.xt, exit.yt);
            let to = if exit.seamless {
                // Seamless exits keep the tile coordinate and only change
                // the location byte. The player can't stop on one, so the
                // canonicalizer must not merge across it (unless the
                // trigger glitch makes stopping possible after all).
                if !self.settings.assume_trigger_glitch {
                    self.seamless_exits.insert(from);
                }
                if let Some(&previous) = self.terrains.get(&from) {
                    let seamless = self.catalog.seamless(previous);
                    self.terrains.insert(from, seamless);
                }
                tile::with_location(from, exit.dest)
            } else {
                self.entrance(exit.dest, exit.entrance & 0x1f)?
            };
            self.exits.insert(from, to);
            if Some(exit.dest) == self.rage_location {
                let dest = &game.locations[exit.dest];
                if let Some(e) = dest.entrances.get(exit.entrance & 0x1f) {
                    // An entrance in the lower part of the arena lake means
                    // this exit comes in from above the fight.
                    if e.yt > 10 {
                        self.rage_entrance_location = Some(location.id);
                    }
                }
            }
        }
        Ok(())
    }

    /// Derives the effective terrain of one tile from its raw effect byte.
    fn make_terrain(
        &mut self,
        location: &Location,
        effects: u16,
        t: TileId,
        barrier: bool,
    ) -> Option<TerrainId> {
        let mut effects = effects & EFFECT_BITS;
        effects |= location.forced_effects as u16;
        if location.dolphin_upper_half && (t & 0xf0f0) < 0x1030 {
            effects |= EFFECT_DOLPHIN;
        }
        if barrier {
            effects |= EFFECT_BARRIER;
        }
        if effects & EFFECT_DOLPHIN == 0 && effects & EFFECT_SLOPE != 0 {
            // Slope height decides what's climbable: under 6 tiles needs
            // nothing, under 9 needs speed, 9 needs rabbit boots, 10 and
            // up needs flight.
            let mut bottom = t;
            let mut height = 0;
            while self.raw_effects(location, bottom) as u16 & EFFECT_SLOPE != 0 {
                bottom = tile::add(bottom, 1, 0);
                height += 1;
            }
            if height < 6 {
                effects &= !EFFECT_SLOPE;
            } else if height < 9 {
                effects |= EFFECT_SLOPE8;
            } else if height < 10 {
                effects |= EFFECT_SLOPE9;
            }
        }
        if effects & EFFECT_PAIN != 0 {
            // Pain terrain only binds when every neighbor also hurts or
            // requires flight; otherwise a single step crosses it for free.
            for (dy, dx) in [(0, 1), (1, 0), (0, -1), (-1, 0)] {
                let neighbor = self.raw_effects(location, tile::add(t, dy, dx)) as u16;
                if neighbor & (EFFECT_PAIN | EFFECT_FLY) == 0 {
                    effects &= !EFFECT_PAIN;
                    break;
                }
            }
        }
        self.catalog.tile(effects)
    }

    /// The raw effect byte of a tile, or 0 outside the location's grid.
    fn raw_effects(&self, location: &Location, t: TileId) -> u8 {
        if tile::location(t) != location.id {
            return 0;
        }
        let sy = (t >> 12 & 0xf) as usize;
        let sx = (t >> 8 & 0xf) as usize;
        let Some(&screen) = location.screens.get(sy).and_then(|row| row.get(sx)) else {
            return 0;
        };
        let metatile = self.game.screens[screen].tiles[(t & 0xff) as usize];
        self.game.tile_effects[location.tile_effects].effects[metatile as usize]
    }

    // Spawn overlays.

    fn process_trigger(
        &mut self,
        location: &'a Location,
        spawn: &Spawn,
        id: TriggerId,
    ) -> Result<()> {
        let game = self.game;
        let caps = game.capabilities;
        let trigger = game
            .triggers
            .get(&id)
            .with_context(|| format!("missing trigger {id:02x} in {}", location.name))?;
        let requirements = self.filter_requirements(&trigger.conditions);
        let mut anti = self.filter_anti_requirements(&trigger.conditions);

        let t = tile::tile(location.id, spawn.xt, spawn.yt);
        let mut hitbox = tile::trigger_hitbox(location.id, spawn.xt, spawn.yt);

        self.add_check_from_flags(&hitbox, &requirements, &trigger.flags);

        match trigger.action {
            0x19 => {
                // Push-down trigger.
                let special = game.special_triggers;
                if special.rabbit == Some(id) && !self.settings.assume_rabbit_skip {
                    // Widen so the path around the trigger isn't found.
                    hitbox = tile::adjust(&hitbox, &[(0, -1), (0, 1)]);
                } else if special.teleport == Some(id)
                    && !self.settings.assume_teleport_skip
                    && !self.settings.disable_teleport_skip
                {
                    // The trigger guards both halves of the split plain.
                    if let Some((a, b)) = game.teleport_skip_locations {
                        hitbox = tile::at_locations(&hitbox, &[a, b]);
                    }
                }
                if self.settings.assume_trigger_glitch {
                    anti = anti.or(&Requirement::single([caps.trigger_skip]));
                }
                let statue = self.catalog.statue(&anti);
                self.add_terrain(&hitbox, statue);
            }
            0x1d => {
                let boss = trigger
                    .boss
                    .with_context(|| format!("boss trigger {id:02x} without a boss"))?;
                self.add_boss_check(&hitbox, boss, &requirements)?;
            }
            0x08 | 0x0b | 0x0c | 0x0d | 0x0f => {
                self.add_item_grant_checks(&hitbox, &requirements, id)?;
            }
            0x18 => {
                // The practice fight; needs the warp-out skip when limited
                // to charge shots.
                let req = if self.settings.charge_shots_only {
                    requirements.meet(&Requirement::single([caps.stom_skip]))
                } else {
                    requirements.clone()
                };
                self.add_item_check(
                    &hitbox,
                    &req,
                    caps.stom_fight_reward,
                    SlotInfo { lossy: true, unique: true, prevent_loss: false },
                );
            }
            0x1e => {
                // The forge.
                self.add_item_check(
                    &hitbox,
                    &requirements,
                    caps.forge_reward,
                    SlotInfo { lossy: true, unique: true, prevent_loss: false },
                );
            }
            0x1f => self.handle_boat(t, location, &requirements)?,
            0x1b => self.handle_moving_guard(&hitbox, location, &anti),
            // Unrecognized actions register no unlock; the rest of the
            // graph must still build.
            _ => {}
        }

        for (item, use_) in game.item_uses_for((SPAWN_TYPE_TRIGGER as i32) << 8 | id as i32) {
            self.process_item_use(&[t], &Requirement::open(), item, use_)?;
        }
        Ok(())
    }

    fn process_npc(&mut self, location: &'a Location, spawn: &Spawn, id: NpcId) -> Result<()> {
        let game = self.game;
        let npc = game
            .npcs
            .get(id)
            .filter(|n| n.used)
            .with_context(|| format!("unknown npc {id:02x} in {}", location.name))?;
        let spawn_conditions = npc
            .spawn_conditions
            .get(&location.id)
            .map(|v| v.as_slice())
            .unwrap_or(&[]);
        let req = self.filter_requirements(spawn_conditions);

        let t = tile::tile(location.id, spawn.xt, spawn.yt);
        // Some NPCs stand on impassable tiles; checks attach to the nearest
        // walkable neighbor in that case.
        let hitbox = [if self.terrains.contains_key(&t) {
            t
        } else {
            self.walkable_neighbor(t).unwrap_or(t)
        }];

        for (item, use_) in game.item_uses_for((SPAWN_TYPE_NPC as i32) << 8 | id as i32) {
            self.process_item_use(&hitbox, &req, item, use_)?;
        }

        if npc.statue && !self.settings.assume_statue_glitch {
            let anti = self.filter_anti_requirements(spawn_conditions);
            let statue = self.catalog.statue(&anti);
            self.add_terrain(&hitbox, statue);
        }

        if req.is_closed() {
            return Ok(()); // never spawns, no dialog to walk
        }
        let mut conds: Vec<Condition> = req.clauses()[0].clone();

        for d in &npc.global_dialogs {
            let pass = self.flag_logic(!d.condition);
            let block = self.flag_logic(d.condition);
            if pass.assume_false || block.assume_true {
                return Ok(());
            }
            if pass.track {
                if let Some(c) = self.flag_condition(!d.condition) {
                    conds.push(c);
                }
            }
        }

        for d in npc.dialogs(location.id) {
            let mut r = conds.clone();
            let f0 = self.flag_logic(d.condition);
            let f1 = self.flag_logic(!d.condition);
            if f0.track {
                if let Some(c) = self.flag_condition(d.condition) {
                    r.push(c);
                }
            }
            if !f0.assume_false && !f1.assume_true {
                self.process_dialog(&hitbox, &r, d)?;
            }
            // Stop if this dialog can never be gotten past.
            if f0.assume_true || f1.assume_false {
                break;
            }
            if f1.track {
                if let Some(c) = self.flag_condition(!d.condition) {
                    conds.push(c);
                }
            }
        }
        Ok(())
    }

    fn process_dialog(
        &mut self,
        hitbox: &[TileId],
        conds: &[Condition],
        dialog: &LocalDialog,
    ) -> Result<()> {
        let req = Requirement::single(conds.iter().copied());
        self.add_check_from_flags(hitbox, &req, &dialog.flags);

        let info = SlotInfo { lossy: true, unique: true, prevent_loss: false };
        match dialog.action {
            0x08 => self.process_key_use(hitbox, &req)?,
            0x03 | 0x09 | 0x10 | 0x11 | 0x14 | 0x19 | 0x1a => {
                if let Some(slot) = dialog.slot {
                    self.add_item_check(hitbox, &req, 0x100 | slot as Condition, info);
                }
            }
            0x0a => {
                // Drops a chest; a mimic needs a sword to open.
                let req = if self.settings.always_mimics {
                    req.meet(&Requirement::single([self.game.capabilities.sword]))
                } else {
                    req
                };
                if let Some(slot) = dialog.slot {
                    self.add_item_check(hitbox, &req, 0x100 | slot as Condition, info);
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Bosses clobber every tile on their screen and add their drop check.
    fn process_boss(&mut self, location: &'a Location, spawn: &Spawn, boss: BossIdx) -> Result<()> {
        let record = &self.game.bosses[boss];
        let flag = record
            .flag
            .with_context(|| format!("boss {} at {} has no flag", record.name, location.name))?;
        let t = tile::tile(location.id, spawn.xt, spawn.yt);
        let rage = record.kind == BossKind::Rage;
        let terrain = self.catalog.boss(flag, rage);
        let hitbox = tile::screen_hitbox(t);
        self.add_terrain(&hitbox, terrain);
        if record.kind != BossKind::Statue {
            self.add_boss_check(&hitbox, boss, &Requirement::open())?;
        }
        Ok(())
    }

    fn add_boss_check(
        &mut self,
        hitbox: &[TileId],
        boss: BossIdx,
        requirements: &Requirement,
    ) -> Result<()> {
        let record = &self.game.bosses[boss];
        let flag = record
            .flag
            .with_context(|| format!("boss {} has no flag", record.name))?;
        let req = requirements.meet(&self.boss_requirements(boss)?);
        if record.drops_item {
            self.add_item_check(
                hitbox,
                &req,
                flag,
                SlotInfo { lossy: false, unique: true, prevent_loss: false },
            );
        } else {
            self.add_check(hitbox, &req, &[flag]);
        }
        Ok(())
    }

    fn boss_requirements(&self, boss: BossIdx) -> Result<Requirement> {
        let game = self.game;
        let caps = game.capabilities;
        let record = &game.bosses[boss];
        if record.kind == BossKind::Rage {
            // What this boss wants is whatever his first dialog asks for.
            let npc = record
                .npc
                .with_context(|| format!("boss {} has no npc record", record.name))?;
            let dialog = game.npcs[npc]
                .dialogs(record.location.unwrap_or(0))
                .first()
                .with_context(|| format!("boss {} npc has no dialogs", record.name))?;
            return Ok(Requirement::single([dialog.condition]));
        }
        let mut r = RequirementBuilder::new();
        if !self.settings.guarantee_matching_sword {
            r.add_all(&Requirement::single([caps.sword]));
        } else {
            let level = if self.settings.guarantee_sword_magic {
                record.sword_level
            } else {
                1
            };
            let object = record
                .object
                .with_context(|| format!("boss {} has no object", record.name))?;
            let elements = game
                .monsters
                .get(&object)
                .with_context(|| format!("no vulnerability data for boss {}", record.name))?
                .elements;
            for i in 0..4 {
                if elements & (1 << i) != 0 {
                    r.add_all(&self.sword_requirement(i, level));
                }
            }
        }
        // The boss can't be fought if it doesn't spawn.
        let mut extra: Vec<Condition> = Vec::new();
        if let (Some(npc), Some(loc)) = (record.npc, record.location) {
            let conds = game.npcs[npc]
                .spawn_conditions
                .get(&loc)
                .map(|v| v.as_slice())
                .unwrap_or(&[]);
            let spawn_req = self.filter_requirements(conds);
            if let Some(clause) = spawn_req.clauses().first() {
                extra.extend(clause);
            }
        }
        extra.extend(&record.extra_conditions);
        if self.settings.guarantee_refresh {
            extra.push(caps.refresh);
        }
        // The restrict here is what keeps the clause count bounded when a
        // boss is vulnerable to several swords.
        r.restrict(&Requirement::single(extra));
        Ok(r.freeze())
    }

    fn sword_requirement(&self, element: usize, level: u8) -> Requirement {
        let caps = &self.game.capabilities;
        let sword = caps.swords[element];
        match level {
            1 => Requirement::single([sword]),
            3 => Requirement::single([sword, caps.balls[element], caps.bracelets[element]]),
            _ => Requirement::from_clauses([
                vec![sword, caps.balls[element]],
                vec![sword, caps.bracelets[element]],
            ]),
        }
    }

    fn process_chest(&mut self, location: &Location, spawn: &Spawn, slot: SlotId) {
        let game = self.game;
        // Mimic slots hold no check.
        let mapped = game.slots.get(slot as usize).copied().unwrap_or(0xff);
        if mapped >= 0x70 {
            return;
        }
        let unique = if self.settings.preserve_unique_checks {
            game.item_gets
                .get(mapped as usize)
                .and_then(|get| game.items.get(get.item))
                .map_or(false, |item| item.unique)
        } else {
            true
        };
        let t = tile::tile(location.id, spawn.xt, spawn.yt);
        let req = self.chest_requirement.clone();
        self.add_item_check(
            &[t],
            &req,
            0x100 | slot as Condition,
            SlotInfo { lossy: false, unique, prevent_loss: false },
        );
    }

    fn process_monster(
        &mut self,
        location: &'a Location,
        spawn: &Spawn,
        object: ObjectId,
    ) -> Result<()> {
        let game = self.game;
        let caps = game.capabilities;
        let Some(monster) = game.monsters.get(&object) else {
            return Ok(());
        };
        if monster.shooting_statue {
            return Ok(()); // terrain overlay, handled by the tile pass
        }
        if Some(location.id) == self.rage_entrance_location
            && monster.bird
            && self.settings.assume_rage_skip
        {
            // A bird near the arena entrance can knock the player across
            // the blocked passage.
            let entrance = self.entrance(location.id, 0)?;
            self.add_check(&[entrance], &Requirement::open(), &[caps.rage_skip]);
        }
        if !monster.gold_drop {
            return Ok(());
        }
        let hitbox = [tile::tile(location.id, spawn.xt, spawn.yt)];
        let req = if !self.settings.guarantee_matching_sword {
            Requirement::single([caps.sword])
        } else {
            let mut r = Requirement::closed();
            for i in 0..4 {
                if monster.elements & (1 << i) != 0 {
                    r = r.or(&Requirement::single([caps.swords[i]]));
                }
            }
            r
        };
        self.add_check(&hitbox, &req, &[caps.money]);
        Ok(())
    }

    fn process_item_use(
        &mut self,
        hitbox: &[TileId],
        req1: &Requirement,
        item: ItemId,
        use_: &ItemUse,
    ) -> Result<()> {
        let game = self.game;
        let caps = game.capabilities;
        // Trade-ins happen from the nearest walkable tile.
        let mut tiles: Vec<TileId> = Vec::new();
        for &t in hitbox {
            let t = self.walkable_neighbor(t).unwrap_or(t);
            if !tiles.contains(&t) {
                tiles.push(t);
            }
        }
        let mut clause = vec![0x200 | item as Condition];
        let trade = use_
            .trade_npc
            .map_or(false, |n| game.npcs.get(n).map_or(false, |npc| npc.requires_change));
        if trade {
            clause.push(caps.change);
        }
        if item == caps.medical_herb {
            // The dolphin accepts any healing item; buying covers it.
            clause[0] = caps.buy_healing;
        }
        let req = req1.meet(&Requirement::single(clause));
        self.add_check_from_flags(&tiles, &req, &use_.flags);
        match use_.action {
            0x10 => self.process_key_use(&tiles, &req)?,
            0x08 | 0x0b | 0x0c | 0x0d | 0x0f | 0x1c => {
                self.add_item_grant_checks(&tiles, &req, item as u8)?;
            }
            0x02 => {
                if let Some(slot) = use_.slot {
                    self.add_item_check(
                        &tiles,
                        &req,
                        0x100 | slot as Condition,
                        SlotInfo { lossy: true, unique: true, prevent_loss: false },
                    );
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Sets the screen flag of the (single) screen the hitbox covers.
    fn process_key_use(&mut self, hitbox: &[TileId], req: &Requirement) -> Result<()> {
        let game = self.game;
        let mut screens: Vec<ScreenId> = hitbox.iter().map(|&t| tile::screen(t)).collect();
        screens.sort_unstable();
        screens.dedup();
        let &[screen] = &screens[..] else {
            bail!("key use hitbox must cover exactly one screen");
        };
        let location = &game.locations[(screen >> 8) as usize];
        let flag = location
            .screen_flag((screen & 0xff) as u8)
            .with_context(|| format!("no flag on key-use screen in {}", location.name))?;
        self.add_check(hitbox, req, &[flag]);
        Ok(())
    }

    fn handle_moving_guard(&mut self, hitbox: &[TileId], location: &Location, anti: &Requirement) {
        // The guard steps aside only if its trigger never fires; paralysis
        // or the trigger glitch get past it anyway.
        if self.settings.assume_statue_glitch {
            return;
        }
        let caps = self.game.capabilities;
        let mut req = anti.clone();
        for spawn in location.spawns.iter().take(2) {
            if let SpawnData::Npc { id } = spawn.data {
                if self.game.npcs.get(id).map_or(false, |n| n.paralyzable) {
                    req = req.or(&Requirement::single([caps.paralysis]));
                    break;
                }
            }
        }
        if self.settings.assume_trigger_glitch {
            req = req.or(&Requirement::single([caps.trigger_skip]));
        }
        let statue = self.catalog.statue(&req);
        self.add_terrain(hitbox, statue);
    }

    /// Boarding the boat is an edge from the dock, through the westward
    /// exit, to the first walkable tile on the far shore.
    fn handle_boat(
        &mut self,
        t: TileId,
        location: &Location,
        requirements: &Requirement,
    ) -> Result<()> {
        let game = self.game;
        let t0 = self
            .walkable_neighbor(t)
            .with_context(|| format!("no walkable neighbor for boat in {}", location.name))?;
        let (xt, yt) = tile::coords(t);
        let mut boat_exit = None;
        for exit in &location.exits {
            if exit.yt == yt && exit.xt < xt {
                boat_exit = Some(exit);
            }
        }
        let exit = boat_exit.with_context(|| format!("no boat exit in {}", location.name))?;
        let dest = &game.locations[exit.dest];
        let entrance = dest
            .entrances
            .get(exit.entrance & 0x1f)
            .with_context(|| format!("bad boat entrance in {}", dest.name))?;
        let entrance_tile = tile::tile(dest.id, entrance.xt, entrance.yt);
        let mut scan = entrance_tile;
        for _ in 0..0x100 {
            scan = tile::add(scan, 0, -1);
            let Some(t1) = self.walkable_neighbor(scan) else {
                continue;
            };
            let boat = Terrain {
                enter: requirements.clone(),
                exit: vec![(DIRMASK_ALL, Requirement::open())],
                seamless: false,
            };
            let boat = self.catalog.intern(boat);
            self.add_terrain(&[t0], boat);
            self.exits.insert(t0, t1);
            // Also wire the entrance we sailed past, so warping into the
            // destination still finds land.
            self.exits.insert(entrance_tile, t1);
            if let Some(open) = self.catalog.tile(0) {
                self.terrains.insert(entrance_tile, open);
            }
            return Ok(());
        }
        bail!("no landing tile for boat from {}", location.name);
    }

    fn add_item_grant_checks(
        &mut self,
        hitbox: &[TileId],
        req: &Requirement,
        grant: u8,
    ) -> Result<()> {
        let item = self
            .game
            .item_grant(grant)
            .with_context(|| format!("missing item grant for {grant:02x}"))?;
        // Granted items in the upper id range can't be dropped mid-grant.
        let prevent_loss = grant >= 0x80;
        self.add_item_check(
            hitbox,
            req,
            0x100 | item as Condition,
            SlotInfo { lossy: true, unique: true, prevent_loss },
        );
        Ok(())
    }

    // Check and terrain registration.

    fn add_terrain(&mut self, hitbox: &[TileId], terrain: TerrainId) {
        for &t in hitbox {
            // Tiles that were impassable to begin with stay impassable.
            let Some(&previous) = self.terrains.get(&t) else {
                continue;
            };
            let met = self.catalog.meet(previous, terrain);
            self.terrains.insert(t, met);
        }
    }

    fn add_check(&mut self, hitbox: &[TileId], requirement: &Requirement, checks: &[Condition]) {
        if requirement.is_closed() {
            return; // never obtainable under this configuration
        }
        let check = Check { requirement: requirement.clone(), checks: checks.to_vec() };
        for &t in hitbox {
            if !self.terrains.contains_key(&t) {
                continue;
            }
            let list = self.checks.entry(t).or_default();
            if !list.contains(&check) {
                list.push(check.clone());
            }
        }
    }

    fn add_item_check(
        &mut self,
        hitbox: &[TileId],
        requirement: &Requirement,
        check: Condition,
        slot: SlotInfo,
    ) {
        self.add_check(hitbox, requirement, &[check]);
        self.slots.insert(check, slot);
        // Keep the item table in parity with the slot table.
        let game = self.game;
        let idx = (check & 0xff) as usize;
        if let Some(get_idx) = game.slots.get(idx).copied() {
            if let Some(get) = game.item_gets.get(get_idx as usize).copied() {
                let unique = game.items.get(get.item).map_or(false, |i| i.unique);
                self.items.insert(
                    0x200 | get_idx as Condition,
                    ItemInfo {
                        unique,
                        losable: get.losable,
                        prevent_loss: unique || get.prevent_loss,
                    },
                );
                return;
            }
        }
        // Checks outside the slot table (capability rewards) still get a
        // default entry so the tables stay aligned.
        self.items.insert(0x200 | idx as Condition, ItemInfo::default());
    }

    fn add_check_from_flags(
        &mut self,
        hitbox: &[TileId],
        requirement: &Requirement,
        flags: &[FlagId],
    ) {
        let mut checks = Vec::new();
        for &flag in flags {
            if let Some(c) = self.flag_condition(flag) {
                checks.push(c);
            }
        }
        if !checks.is_empty() {
            self.add_check(hitbox, requirement, &checks);
        }
    }

    // Derived checks and routes with no data-table source.

    fn add_extra_checks(&mut self) -> Result<()> {
        let game = self.game;
        let caps = game.capabilities;
        let start = self.entrance(game.start_location, 0)?;
        let open = Requirement::open();
        let money = Requirement::single([caps.money]);

        // Riding requires both the means and the flute.
        self.add_check(
            &[start],
            &Requirement::single([caps.able_to_ride_dolphin, caps.shell_flute]),
            &[caps.currently_riding_dolphin],
        );

        // Quest events wired into game code rather than data tables.
        for extra in &game.extra_checks {
            let entrance = self.entrance(extra.location, 0)?;
            let req = Requirement::from_clauses(extra.requirements.iter().cloned());
            if extra.item {
                self.add_item_check(
                    &[entrance],
                    &req,
                    extra.flag,
                    SlotInfo { lossy: true, unique: true, prevent_loss: false },
                );
            } else {
                self.add_check(&[entrance], &req, &[extra.flag]);
            }
        }

        // Tool shops sell consumable capabilities.
        for shop in &game.shops {
            if !shop.used || shop.kind != ShopKind::Tool {
                continue;
            }
            if game.unreliable_shop_locations.contains(&shop.location) {
                continue;
            }
            let hitbox = [tile::tile_on_screen((shop.location as u32) << 8, 0x88)];
            for &item in &shop.contents {
                if item == caps.medical_herb {
                    self.add_check(&hitbox, &money, &[caps.buy_healing]);
                } else if item == caps.warp_boots {
                    self.add_check(&hitbox, &money, &[caps.buy_warp]);
                }
            }
        }

        // Wall-breaking capabilities from the elemental swords.
        let mut break_reqs: Vec<Requirement> = (0..4)
            .map(|i| Requirement::single([caps.swords[i]]))
            .collect();
        if !self.settings.orbs_optional {
            for (i, req) in break_reqs.iter_mut().enumerate() {
                let upgrade = Requirement::from_clauses([
                    vec![caps.balls[i]],
                    vec![caps.bracelets[i]],
                ]);
                *req = req.meet(&upgrade);
            }
            if self.settings.assume_sword_charge_glitch {
                // Any charged level-2 sword charges every sword.
                let mut level2 = Requirement::closed();
                for req in &break_reqs {
                    level2 = level2.or(req);
                }
                break_reqs = (0..4)
                    .map(|i| {
                        let sword = caps.swords[i];
                        Requirement::from_clauses(level2.iter().map(|c| {
                            if c.contains(&sword) {
                                c.clone()
                            } else {
                                let mut v = vec![sword];
                                v.extend(c);
                                v
                            }
                        }))
                    })
                    .collect();
            }
        }
        let break_targets =
            [caps.break_stone, caps.break_ice, caps.form_bridge, caps.break_iron];
        for (req, &target) in break_reqs.iter().zip(&break_targets) {
            let req = req.clone();
            self.add_check(&[start], &req, &[target]);
        }
        let any_sword = Requirement::from_clauses((0..4).map(|i| vec![caps.swords[i]]));
        self.add_check(&[start], &any_sword, &[caps.sword]);

        // Climbing.
        let flight = Requirement::single([caps.flight]);
        let hops = Requirement::from_clauses([vec![caps.flight], vec![caps.rabbit_boots]]);
        self.add_check(&[start], &flight, &[caps.climb_waterfall, caps.climb_slope10]);
        self.add_check(&[start], &hops, &[caps.climb_slope8]);
        self.add_check(&[start], &hops, &[caps.climb_slope9]);
        if self.settings.leather_boots_give_speed {
            let boots = Requirement::single([caps.leather_boots]);
            self.add_check(&[start], &boots, &[caps.climb_slope8]);
        }
        if self.settings.assume_ghetto_flight {
            let req = Requirement::single([caps.currently_riding_dolphin, caps.rabbit_boots]);
            self.add_check(&[start], &req, &[caps.climb_waterfall]);
        }

        // Hazards.
        let barrier = Requirement::single([caps.barrier]);
        self.add_check(&[start], &barrier, &[caps.shooting_statue]);
        let gas_mask = Requirement::single([caps.gas_mask]);
        self.add_check(&[start], &gas_mask, &[caps.travel_swamp]);
        let pain_gear = if self.settings.gas_mask_for_pain {
            caps.gas_mask
        } else {
            caps.leather_boots
        };
        let pain = Requirement::from_clauses([
            vec![caps.flight],
            vec![caps.rabbit_boots],
            vec![pain_gear],
        ]);
        self.add_check(&[start], &pain, &[caps.cross_pain]);
        if !self.settings.guarantee_barrier {
            // Sustained healing stands in for the barrier spell.
            let req = Requirement::from_clauses([
                vec![caps.money, caps.buy_healing],
                vec![caps.money, caps.shield_ring],
                vec![caps.money, caps.refresh],
            ]);
            self.add_check(&[start], &req, &[caps.shooting_statue]);
        }
        if self.settings.assume_flight_statue_skip {
            // Needs money: the base MP pool isn't enough for a long gallery.
            let req = Requirement::single([caps.money, caps.flight]);
            self.add_check(&[start], &req, &[caps.shooting_statue]);
        }
        if !self.settings.guarantee_gas_mask {
            let req = Requirement::from_clauses([
                vec![caps.money, caps.buy_healing],
                vec![caps.money, caps.refresh],
            ]);
            self.add_check(&[start], &req, &[caps.travel_swamp, caps.cross_pain]);
        }

        if self.settings.fog_lamp_not_required {
            let req = if self.settings.require_healed_dolphin {
                Requirement::single([caps.injured_dolphin])
            } else {
                open.clone()
            };
            self.add_check(&[start], &req, &[caps.able_to_ride_dolphin]);
        }
        if self.settings.assume_wild_warp {
            self.add_check(&[start], &open, &[caps.wild_warp]);
        }
        if self.settings.assume_trigger_glitch {
            self.add_check(&[start], &open, &[caps.trigger_skip]);
            let skip = Requirement::single([caps.trigger_skip]);
            self.add_check(
                &[start],
                &skip,
                &[caps.cross_pain, caps.climb_slope8, caps.climb_slope9],
            );
        }
        if self.settings.charge_shots_only {
            // The fight can be skipped by warping out, but only where the
            // town entrance sits high enough on the screen.
            let buy_warp = Requirement::single([caps.buy_warp]);
            for &loc in &game.town_warp_locations {
                let Some(e) = game.locations[loc].entrances.first() else {
                    continue;
                };
                if e.yt < 6 {
                    let entrance = self.entrance(loc, 0)?;
                    self.add_check(&[entrance], &buy_warp, &[caps.stom_skip]);
                }
            }
        }
        Ok(())
    }

    fn add_extra_routes(&mut self) -> Result<()> {
        let game = self.game;
        let caps = game.capabilities;
        // The game starts at the start location's entrance.
        let start = self.entrance(game.start_location, 0)?;
        self.add_route(Route::new(start, Vec::new()));
        if self.settings.teleport_on_thunder_sword {
            if let Some((loc, entrance)) = game.thunder_warp {
                let t = self.entrance(loc, entrance & 0x1f)?;
                self.add_route(Route::new(t, [caps.swords[3], caps.buy_warp]));
                self.add_route(Route::new(t, [caps.swords[3], caps.teleport]));
            }
        }
        if self.settings.assume_wild_warp {
            for &loc in &game.wild_warp_locations {
                if game.wild_warp_excluded.contains(&loc) {
                    continue;
                }
                let entrance = self.entrance(loc, 0)?;
                // Entrance tiles can carry their own entry requirements
                // (swamp, water); fold them into each warp route.
                let terrain = *self
                    .terrains
                    .get(&entrance)
                    .with_context(|| format!("bad entrance in {}", game.location_name(loc)))?;
                let enter = self.catalog.get(terrain).enter.clone();
                for clause in enter.iter() {
                    let mut deps = vec![caps.wild_warp];
                    deps.extend(clause);
                    self.add_route(Route::new(entrance, deps));
                }
            }
        }
        Ok(())
    }

    // Canonicalization and the neighbor index.

    /// First union pass: adjacent tiles with identical terrain. Processed in
    /// sorted order so canonical representatives are deterministic.
    fn union_neighbors(&mut self) {
        let mut keys: Vec<TileId> = self.terrains.keys().copied().collect();
        keys.sort_unstable();
        for &t in &keys {
            let terrain = self.terrains[&t];
            let east = tile::add(t, 0, 1);
            if self.terrains.get(&east) == Some(&terrain) {
                self.tiles.union(t, east);
            }
            let south = tile::add(t, 1, 0);
            if self.terrains.get(&south) == Some(&terrain) {
                self.tiles.union(t, south);
            }
        }
    }

    /// Second union pass: mutually-reciprocal exit pairs with identical
    /// terrain become intra-area; everything else stays in the exit set.
    fn record_exits(&mut self) {
        let mut raw: Vec<(TileId, TileId)> =
            self.exits.iter().map(|(&from, &to)| (from, to)).collect();
        raw.sort_unstable();
        for (from, to) in raw {
            let pair = tile::pair(self.tiles.find(from), self.tiles.find(to));
            self.exit_pairs.insert(pair);
        }
        let mut pairs: Vec<TilePair> = self.exit_pairs.iter().copied().collect();
        pairs.sort_unstable();
        for pair in pairs {
            if !self.exit_pairs.contains(&pair) {
                continue; // removed as the reverse of an earlier pair
            }
            let (from, to) = tile::split(pair);
            if self.terrains.get(&from) != self.terrains.get(&to) {
                continue;
            }
            let reverse = tile::pair(to, from);
            if self.exit_pairs.contains(&reverse) {
                self.tiles.union(from, to);
                self.exit_pairs.remove(&pair);
                self.exit_pairs.remove(&reverse);
            }
        }
    }

    /// Indexes every canonical tile pair that borders across different
    /// terrain, plus the surviving exits. Must run after all unions.
    fn build_neighbors(&mut self) {
        let mut keys: Vec<TileId> = self.terrains.keys().copied().collect();
        keys.sort_unstable();
        for &t in &keys {
            let terrain = self.terrains[&t];
            let south = tile::add(t, 1, 0);
            if let Some(&other) = self.terrains.get(&south) {
                if other != terrain {
                    self.handle_adjacent(t, south, Dir::North);
                }
            }
            let east = tile::add(t, 0, 1);
            if let Some(&other) = self.terrains.get(&east) {
                if other != terrain {
                    self.handle_adjacent(t, east, Dir::West);
                }
            }
        }
        // Exits use the dedicated exit bit.
        let mut pairs: Vec<TilePair> = self.exit_pairs.iter().copied().collect();
        pairs.sort_unstable();
        for pair in pairs {
            let (from, to) = tile::split(pair);
            if !self.terrains.contains_key(&from) || !self.terrains.contains_key(&to) {
                continue;
            }
            let canonical = tile::pair(self.tiles.find(from), self.tiles.find(to));
            *self.neighbors.entry(canonical).or_insert(0) |= DIR_EXIT_BIT;
        }
    }

    /// `dir` is the direction of travel from `t1` into `t0` (always north or
    /// west, since the scan walks east and south).
    fn handle_adjacent(&mut self, t0: TileId, t1: TileId, dir: Dir) {
        let c0 = self.tiles.find(t0);
        let c1 = self.tiles.find(t1);
        // No pathing through a seamless exit tile: stepping on it leaves.
        if !self.seamless_exits.contains(&t1) {
            *self.neighbors.entry(tile::pair(c1, c0)).or_insert(0) |= dir.bit();
        }
        if !self.seamless_exits.contains(&t0) {
            *self.neighbors.entry(tile::pair(c0, c1)).or_insert(0) |= dir.opposite().bit();
        }
    }

    // The route fixpoint.

    fn add_all_routes(&mut self) -> Result<()> {
        self.add_extra_routes()?;
        let mut edges: Vec<(TilePair, u8)> =
            self.neighbors.iter().map(|(&p, &d)| (p, d)).collect();
        edges.sort_unstable();
        for (pair, dirs) in edges {
            let (c0, c1) = tile::split(pair);
            let t0 = *self.terrains.get(&c0).with_context(|| {
                format!(
                    "missing terrain at {c0:06x} in {}",
                    self.game.location_name(tile::location(c0))
                )
            })?;
            let t1 = *self.terrains.get(&c1).with_context(|| {
                format!(
                    "missing terrain at {c1:06x} in {}",
                    self.game.location_name(tile::location(c1))
                )
            })?;
            let exit = self.catalog.get(t0).exit.clone();
            let enter = self.catalog.get(t1).enter.clone();
            for (mask, exit_req) in exit {
                if mask & dirs == 0 {
                    continue;
                }
                for exit_conds in exit_req.iter() {
                    for enter_conds in enter.iter() {
                        let mut deps = exit_conds.clone();
                        deps.extend(enter_conds);
                        self.add_route_edge(Route::new(c1, deps), c0);
                    }
                }
            }
        }
        info!("route fixpoint done: {} canonical tiles reachable", self.routes.len());
        Ok(())
    }

    /// Adds an edge out of `source`, then re-derives routes through every
    /// clause already known to reach the source.
    fn add_route_edge(&mut self, route: Route, source: TileId) {
        let edges = self.route_edges.entry(source).or_default();
        if !edges.contains(&route) {
            edges.push(route.clone());
        }
        let source_clauses: Vec<Vec<Condition>> = self
            .routes
            .get(&source)
            .map(|b| b.clauses().to_vec())
            .unwrap_or_default();
        for clause in source_clauses {
            let mut deps = clause;
            deps.extend(route.deps.iter().copied());
            self.add_route(Route::new(route.target, deps));
        }
    }

    /// Worklist propagation of one route. Only a builder that actually
    /// gained a clause re-enqueues its outbound edges, so the loop
    /// terminates once every builder saturates.
    fn add_route(&mut self, route: Route) {
        let mut queue = VecDeque::new();
        let mut seen: HashSet<Route> = HashSet::new();
        queue.push_back(route);
        while let Some(r) = queue.pop_front() {
            if !seen.insert(r.clone()) {
                continue;
            }
            let changed = self.routes.entry(r.target).or_default().add_route(&r);
            if !changed {
                continue;
            }
            if let Some(edges) = self.route_edges.get(&r.target) {
                for next in edges {
                    let mut deps = r.deps.clone();
                    deps.extend(next.deps.iter().copied());
                    let follow = Route::new(next.target, deps);
                    if !seen.contains(&follow) {
                        queue.push_back(follow);
                    }
                }
            }
        }
    }

    // Resolution.

    /// Re-keys the check map by canonical tiles only.
    fn consolidate_checks(&mut self) {
        let mut keys: Vec<TileId> = self.checks.keys().copied().collect();
        keys.sort_unstable();
        for t in keys {
            let root = self.tiles.find(t);
            if root == t {
                continue;
            }
            let moved = self.checks.remove(&t).unwrap_or_default();
            let list = self.checks.entry(root).or_default();
            for check in moved {
                if !list.contains(&check) {
                    list.push(check);
                }
            }
        }
    }

    /// Combines each check's local requirement with its tile's route
    /// requirement into the per-condition map.
    fn build_requirement_map(&mut self) {
        let mut tiles: Vec<TileId> = self.checks.keys().copied().collect();
        tiles.sort_unstable();
        for t in tiles {
            let route_clauses: Vec<Vec<Condition>> = self
                .routes
                .get(&t)
                .map(|b| b.clauses().to_vec())
                .unwrap_or_default();
            let checks = self.checks[&t].clone();
            for check in checks {
                for &condition in &check.checks {
                    let builder = self.requirement_map.entry(condition).or_default();
                    for r1 in check.requirement.iter() {
                        for r2 in &route_clauses {
                            let mut clause = r1.clone();
                            clause.extend(r2);
                            builder.add_clause(&clause);
                        }
                    }
                }
            }
        }
    }

    /// Post-build diagnostics: every slot should be reachable somehow.
    fn audit(&self) {
        let mut slots: Vec<Condition> = self.slots.keys().copied().collect();
        slots.sort_unstable();
        for check in slots {
            let reachable = self
                .requirement_map
                .get(&check)
                .map_or(false, |b| !b.is_empty());
            if !reachable {
                warn!("slot {check:03x} ({}) has no route", self.game.flags.name(check));
            }
        }
        // Conditions required somewhere but never produced by any check or
        // item. These don't fail the build: the placement search treats them
        // as unsatisfiable.
        let mut dangling: Vec<Condition> = self
            .requirement_map
            .values()
            .flat_map(|b| b.clauses())
            .flatten()
            .copied()
            .filter(|c| {
                *c >= 0 && !self.requirement_map.contains_key(c) && !self.items.contains_key(c)
            })
            .collect();
        dangling.sort_unstable();
        dangling.dedup();
        for check in dangling {
            warn!("flag {check:03x} ({}) is never set", self.game.flags.name(check));
        }
        info!(
            "requirement map: {} conditions, {} slots, {} items",
            self.requirement_map.len(),
            self.slots.len(),
            self.items.len()
        );
    }

    // Flag plumbing.

    fn flag_logic(&self, id: FlagId) -> FlagLogic {
        self.game.flag(id).map(|f| f.logic).unwrap_or_default()
    }

    /// The canonical condition for a flag, if the flag is tracked.
    fn flag_condition(&self, id: FlagId) -> Option<Condition> {
        let flag = self.game.flag(id)?;
        flag.logic.track.then_some(flag.id)
    }

    /// A single-clause requirement for all of `flags` being met, or CLOSED
    /// if any of them is statically impossible.
    fn filter_requirements(&self, flags: &[FlagId]) -> Requirement {
        let mut conds = Vec::new();
        for &flag in flags {
            if flag < 0 {
                if self.flag_logic(!flag).assume_true {
                    return Requirement::closed();
                }
            } else {
                let logic = self.flag_logic(flag);
                if logic.assume_false {
                    return Requirement::closed();
                }
                if logic.track {
                    if let Some(c) = self.flag_condition(flag) {
                        conds.push(c);
                    }
                }
            }
        }
        Requirement::single(conds)
    }

    /// A requirement for the complemented conditions not being met, or OPEN
    /// if one of them is statically clear.
    fn filter_anti_requirements(&self, flags: &[FlagId]) -> Requirement {
        let mut clauses = Vec::new();
        for &flag in flags {
            if flag >= 0 {
                if self.flag_logic(!flag).assume_false {
                    return Requirement::open();
                }
            } else {
                let logic = self.flag_logic(!flag);
                if logic.assume_true {
                    return Requirement::open();
                }
                if logic.track {
                    if let Some(c) = self.flag_condition(!flag) {
                        clauses.push(vec![c]);
                    }
                }
            }
        }
        Requirement::from_clauses(clauses)
    }

    fn wall_capability(&self, kind: u8) -> Result<FlagId> {
        let caps = &self.game.capabilities;
        let kind = WallKind::try_from(kind)
            .map_err(|_| anyhow::anyhow!("bad wall type {kind:02x}"))?;
        Ok(match kind {
            WallKind::Wind => caps.break_stone,
            WallKind::Fire => caps.break_ice,
            WallKind::Water => caps.form_bridge,
            WallKind::Thunder => caps.break_iron,
        })
    }

    // Walkability, from raw effects (terrain overlays don't matter here).

    fn is_walkable(&self, t: TileId) -> bool {
        let Some(location) = self.game.locations.get(tile::location(t)) else {
            return false;
        };
        self.raw_effects(location, t) as u16 & EFFECT_BITS == 0
    }

    fn walkable_neighbor(&self, t: TileId) -> Option<TileId> {
        if self.is_walkable(t) {
            return Some(t);
        }
        for d in [-1, 1] {
            let vertical = tile::add(t, d, 0);
            if self.is_walkable(vertical) {
                return Some(vertical);
            }
            let horizontal = tile::add(t, 0, d);
            if self.is_walkable(horizontal) {
                return Some(horizontal);
            }
        }
        None
    }
}
