//! Static world data consumed by the logic engine.
//!
//! Everything here is plain data: the ROM/map reader that fills these tables
//! in lives outside this workspace. The logic crate reads these records and
//! never mutates them.

use hashbrown::HashMap;
use num_enum::TryFromPrimitive;
use serde::{Deserialize, Serialize};

pub type LocationId = usize; // Index into GameData.locations (one byte in the map data)
pub type ScreenIdx = usize; // Index into GameData.screens
pub type TilesetIdx = usize; // Index into GameData.tilesets
pub type EffectTableIdx = usize; // Index into GameData.tile_effects
pub type FlagId = i32; // Game flag id; doubles as a logic Condition. Negative = complemented.
pub type NpcId = usize; // Index into GameData.npcs
pub type TriggerId = u8; // Trigger id from the spawn table
pub type BossIdx = usize; // Index into GameData.bosses
pub type ObjectId = usize; // Object (monster) id
pub type ItemId = usize; // Index into GameData.items
pub type SlotId = u8; // Item slot id; the check condition is 0x100 | slot

/// Number of tiles in one screen: 16 columns by 15 rows.
pub const SCREEN_TILES: usize = 240;
pub const SCREEN_WIDTH: u16 = 16;
pub const SCREEN_HEIGHT: u16 = 15;

// Spawn type codes, used to key item-use targets (`type << 8 | id`).
pub const SPAWN_TYPE_NPC: u8 = 1;
pub const SPAWN_TYPE_TRIGGER: u8 = 2;

/// A 16x15 grid of metatile indices.
#[derive(Clone, Debug, Default)]
pub struct Screen {
    pub tiles: Vec<u8>,
}

/// Per-tileset table of alternate metatiles: tiles below 0x20 may swap to
/// `alternates[tile]` once the screen's flag is set (e.g. a tree removed
/// after a quest event).
#[derive(Clone, Debug, Default)]
pub struct Tileset {
    pub alternates: Vec<u8>,
}

/// Movement-effect byte per metatile index.
#[derive(Clone, Debug, Default)]
pub struct TileEffects {
    pub effects: Vec<u8>,
}

/// An entrance position in absolute tile coordinates within the location.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Entrance {
    pub xt: u16,
    pub yt: u16,
}

/// A one-way exit from a tile to another location's entrance. Seamless exits
/// keep the in-screen position and only swap the location (scrolling
/// transitions); they ignore `entrance`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Exit {
    pub xt: u16,
    pub yt: u16,
    pub dest: LocationId,
    pub entrance: usize,
    pub seamless: bool,
}

/// A flag wired to a screen of a location (walls, removable obstacles).
/// `screen` packs the screen row and column as `y << 4 | x`.
#[derive(Clone, Copy, Debug)]
pub struct ScreenFlag {
    pub screen: u8,
    pub flag: FlagId,
}

/// A pit dropping the player from one screen to a screen of another location.
#[derive(Clone, Copy, Debug)]
pub struct Pit {
    pub from_screen: u8,
    pub to_location: LocationId,
    pub to_screen: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum WallKind {
    Wind = 0,
    Fire = 1,
    Water = 2,
    Thunder = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum ShopKind {
    Armor = 0,
    Tool = 1,
    Inn = 2,
    Pawn = 3,
}

/// Type-specific payload of a spawn record.
#[derive(Clone, Debug)]
pub enum SpawnData {
    /// Breakable wall; `kind` selects the element needed to break it.
    Wall { kind: u8 },
    Trigger { id: TriggerId },
    Npc { id: NpcId },
    Boss { boss: BossIdx },
    Chest { slot: SlotId },
    Monster { object: ObjectId },
    /// Anything else (decorations, special objects); `type_code`/`id` are the
    /// raw bytes for the few special cases the logic cares about.
    Other { type_code: u8, id: u8 },
}

/// A spawn record at absolute tile coordinates within its location.
#[derive(Clone, Debug)]
pub struct Spawn {
    pub xt: u16,
    pub yt: u16,
    pub data: SpawnData,
}

#[derive(Clone, Debug)]
pub struct Location {
    pub id: LocationId,
    pub name: String,
    pub used: bool,
    /// Width and height in screens.
    pub width: usize,
    pub height: usize,
    /// Screen grid, indexed `[row][column]`.
    pub screens: Vec<Vec<ScreenIdx>>,
    pub tileset: TilesetIdx,
    pub tile_effects: EffectTableIdx,
    pub exits: Vec<Exit>,
    pub entrances: Vec<Entrance>,
    pub flags: Vec<ScreenFlag>,
    pub pits: Vec<Pit>,
    pub spawns: Vec<Spawn>,
    /// Shop interiors have no meaningful tile effects.
    pub is_shop: bool,
    /// Tower screens are treated as if their screen flags were always set.
    pub is_tower: bool,
    /// Effect bits imposed on every tile regardless of the raw byte
    /// (swamp in the Oak area, dolphin water in the sea locations).
    pub forced_effects: u8,
    /// Only the upper portion of the location is dolphin-navigable
    /// (the underground channel).
    pub dolphin_upper_half: bool,
}

impl Location {
    pub fn screen_flag(&self, screen: u8) -> Option<FlagId> {
        self.flags.iter().find(|f| f.screen == screen).map(|f| f.flag)
    }
}

/// Logic annotations for a flag, from the static flag census.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct FlagLogic {
    /// The flag participates in routing; untracked flags are dropped from
    /// requirements.
    pub track: bool,
    /// Statically known to be set under the current configuration.
    pub assume_true: bool,
    /// Statically known to be clear under the current configuration.
    pub assume_false: bool,
}

#[derive(Clone, Debug)]
pub struct Flag {
    pub id: FlagId,
    pub name: String,
    pub logic: FlagLogic,
}

/// Flag census with alias resolution (several flags are treated as direct
/// aliases of a canonical one, e.g. the per-NPC transform flags).
#[derive(Clone, Debug, Default)]
pub struct FlagTable {
    flags: HashMap<FlagId, Flag>,
    aliases: HashMap<FlagId, FlagId>,
}

impl FlagTable {
    pub fn insert(&mut self, flag: Flag) {
        self.flags.insert(flag.id, flag);
    }

    pub fn alias(&mut self, from: FlagId, to: FlagId) {
        self.aliases.insert(from, to);
    }

    /// Looks up a flag, following at most one alias hop.
    pub fn get(&self, id: FlagId) -> Option<&Flag> {
        let id = *self.aliases.get(&id).unwrap_or(&id);
        self.flags.get(&id)
    }

    pub fn name(&self, id: FlagId) -> &str {
        self.get(id).map(|f| f.name.as_str()).unwrap_or("?")
    }
}

#[derive(Clone, Copy, Debug)]
pub struct GlobalDialog {
    /// Condition to get past the dialog; negative means the complement.
    pub condition: FlagId,
}

#[derive(Clone, Debug)]
pub struct LocalDialog {
    /// Condition to receive this message; negative means the complement.
    pub condition: FlagId,
    /// Flags set by the message.
    pub flags: Vec<FlagId>,
    /// Raw message action code; unrecognized codes yield no check.
    pub action: u8,
    /// Slot granted by item-giving actions, resolved by the provider.
    pub slot: Option<SlotId>,
}

#[derive(Clone, Debug, Default)]
pub struct Npc {
    pub name: String,
    pub used: bool,
    pub spawn_conditions: HashMap<LocationId, Vec<FlagId>>,
    pub global_dialogs: Vec<GlobalDialog>,
    /// Keyed by location id; -1 holds the defaults.
    pub local_dialogs: HashMap<i32, Vec<LocalDialog>>,
    /// Blocks passage while spawned (guards and statues).
    pub statue: bool,
    pub paralyzable: bool,
    /// Trade-ins handed to this NPC need the transform spell.
    pub requires_change: bool,
}

impl Npc {
    pub fn dialogs(&self, location: LocationId) -> &[LocalDialog] {
        self.local_dialogs
            .get(&(location as i32))
            .or_else(|| self.local_dialogs.get(&-1))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Clone, Debug)]
pub struct Trigger {
    pub id: TriggerId,
    /// Spawn conditions; negative means the complement.
    pub conditions: Vec<FlagId>,
    /// Flags set when triggered.
    pub flags: Vec<FlagId>,
    /// Raw message action code.
    pub action: u8,
    /// Boss started by boss-fight trigger actions.
    pub boss: Option<BossIdx>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BossKind {
    Normal,
    /// Rage blocks the waterfall passage; the gating direction is inverted.
    Rage,
    /// Tower statues: terrain only, no item check.
    Statue,
}

#[derive(Clone, Debug)]
pub struct Boss {
    pub name: String,
    pub flag: Option<FlagId>,
    /// Object id for the vulnerability table.
    pub object: Option<ObjectId>,
    /// Sword level needed when sword magic is guaranteed.
    pub sword_level: u8,
    /// Spawn gating, when the boss is backed by an NPC record.
    pub npc: Option<NpcId>,
    pub location: Option<LocationId>,
    pub kind: BossKind,
    /// Conditions beyond the kill itself (quest items needed to fight).
    pub extra_conditions: Vec<FlagId>,
    /// The kill awards an item slot; false for the final boss, whose flag is
    /// tracked but fills no slot.
    pub drops_item: bool,
}

/// Element vulnerability mask and drop info for an object.
#[derive(Clone, Copy, Debug, Default)]
pub struct MonsterData {
    pub gold_drop: bool,
    /// Bit per element the monster is weak to (wind/fire/water/thunder).
    pub elements: u8,
    pub bird: bool,
    /// Projectile-spitting statue: creates a barrier zone instead of a fight.
    pub shooting_statue: bool,
}

#[derive(Clone, Debug)]
pub enum ItemUseKind {
    /// Used on a particular spawn (`type_code << 8 | id`).
    ExpectSpawn { type_code: u8, id: u8 },
    /// Used anywhere in a location.
    AtLocation { location: LocationId },
}

#[derive(Clone, Debug)]
pub struct ItemUse {
    pub kind: ItemUseKind,
    /// Flags set by the use.
    pub flags: Vec<FlagId>,
    /// Raw message action code.
    pub action: u8,
    /// Slot granted by grant-type actions.
    pub slot: Option<SlotId>,
    /// NPC the item is traded to, when the use is a trade-in.
    pub trade_npc: Option<NpcId>,
}

#[derive(Clone, Debug)]
pub struct ItemData {
    pub name: String,
    pub unique: bool,
    pub uses: Vec<ItemUse>,
}

/// One entry of the item-get table: what a slot actually awards.
#[derive(Clone, Copy, Debug)]
pub struct ItemGet {
    pub item: ItemId,
    pub losable: bool,
    /// Must survive a full inventory even when the item itself isn't
    /// unique (the revival statue).
    pub prevent_loss: bool,
}

#[derive(Clone, Debug)]
pub struct ShopData {
    pub location: LocationId,
    pub kind: ShopKind,
    pub contents: Vec<ItemId>,
    pub used: bool,
}

/// A spawn that sets its screen's flag once the key flag is met, without a
/// trigger record (the windmill-blades explosion).
#[derive(Clone, Copy, Debug)]
pub struct KeyedSpawn {
    pub type_code: u8,
    pub id: u8,
    pub flag: FlagId,
}

/// A derived check with no data-table source: reaching `location`'s first
/// entrance with the requirement met yields `flag`. Covers the quest events
/// wired directly into game code (opening the crypt with both bows, the
/// child rescue, assembling the statue).
#[derive(Clone, Debug)]
pub struct ExtraCheck {
    pub location: LocationId,
    /// DNF clauses over flag/item conditions.
    pub requirements: Vec<Vec<FlagId>>,
    pub flag: FlagId,
    /// Item-granting checks also claim a slot (lossy and unique, like boss
    /// drops); the rest only set their flag.
    pub item: bool,
}

/// Trigger ids with special geometry handling in the logic.
#[derive(Clone, Copy, Debug, Default)]
pub struct SpecialTriggers {
    /// Push-down trigger skippable by the rabbit-boots jump.
    pub rabbit: Option<TriggerId>,
    /// Push-down trigger guarding the teleport shortcut.
    pub teleport: Option<TriggerId>,
}

/// Well-known condition ids consumed by the terrain catalog and the derived
/// capability checks. The provider assigns these from its flag census; the
/// defaults follow the vanilla layout.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Capabilities {
    pub flight: FlagId,
    pub currently_riding_dolphin: FlagId,
    pub able_to_ride_dolphin: FlagId,
    pub shell_flute: FlagId,
    pub injured_dolphin: FlagId,
    pub climb_waterfall: FlagId,
    pub climb_slope8: FlagId,
    pub climb_slope9: FlagId,
    pub climb_slope10: FlagId,
    pub travel_swamp: FlagId,
    pub cross_pain: FlagId,
    pub shooting_statue: FlagId,
    pub break_stone: FlagId,
    pub break_ice: FlagId,
    pub form_bridge: FlagId,
    pub break_iron: FlagId,
    pub sword: FlagId,
    /// Per-element sword flags (wind/fire/water/thunder).
    pub swords: [FlagId; 4],
    /// First-tier power upgrades per element.
    pub balls: [FlagId; 4],
    /// Second-tier power upgrades per element.
    pub bracelets: [FlagId; 4],
    pub money: FlagId,
    pub buy_healing: FlagId,
    pub buy_warp: FlagId,
    pub refresh: FlagId,
    pub shield_ring: FlagId,
    pub rabbit_boots: FlagId,
    pub leather_boots: FlagId,
    pub gas_mask: FlagId,
    pub barrier: FlagId,
    pub change: FlagId,
    pub paralysis: FlagId,
    pub teleport: FlagId,
    pub wild_warp: FlagId,
    pub trigger_skip: FlagId,
    pub stom_skip: FlagId,
    pub rage_skip: FlagId,
    pub stom_fight_reward: FlagId,
    pub forge_reward: FlagId,
    /// Item ids matched against tool-shop inventories.
    pub medical_herb: ItemId,
    pub warp_boots: ItemId,
}

impl Default for Capabilities {
    fn default() -> Self {
        // Vanilla-style layout: capability pseudo-flags live in 0x240..,
        // sword/power flags in 0x200.. (item space).
        Capabilities {
            flight: 0x248,
            currently_riding_dolphin: 0x25d,
            able_to_ride_dolphin: 0x25e,
            shell_flute: 0x236,
            injured_dolphin: 0x25f,
            climb_waterfall: 0x240,
            climb_slope8: 0x241,
            climb_slope9: 0x242,
            climb_slope10: 0x243,
            travel_swamp: 0x244,
            cross_pain: 0x245,
            shooting_statue: 0x246,
            break_stone: 0x250,
            break_ice: 0x251,
            form_bridge: 0x252,
            break_iron: 0x253,
            sword: 0x254,
            swords: [0x200, 0x201, 0x202, 0x203],
            balls: [0x205, 0x206, 0x207, 0x208],
            bracelets: [0x209, 0x20a, 0x20b, 0x20c],
            money: 0x255,
            buy_healing: 0x256,
            buy_warp: 0x257,
            refresh: 0x261,
            shield_ring: 0x210,
            rabbit_boots: 0x212,
            leather_boots: 0x213,
            gas_mask: 0x214,
            barrier: 0x258,
            change: 0x259,
            paralysis: 0x25a,
            teleport: 0x25b,
            wild_warp: 0x25c,
            trigger_skip: 0x262,
            stom_skip: 0x263,
            rage_skip: 0x264,
            stom_fight_reward: 0x265,
            forge_reward: 0x266,
            medical_herb: 0x1d,
            warp_boots: 0x1f,
        }
    }
}

/// The full static world: everything the logic engine reads.
#[derive(Clone, Debug, Default)]
pub struct GameData {
    pub locations: Vec<Location>,
    pub screens: Vec<Screen>,
    pub tilesets: Vec<Tileset>,
    pub tile_effects: Vec<TileEffects>,
    pub flags: FlagTable,
    pub capabilities: Capabilities,
    pub npcs: Vec<Npc>,
    pub triggers: HashMap<TriggerId, Trigger>,
    pub bosses: Vec<Boss>,
    pub items: Vec<ItemData>,
    pub item_gets: Vec<ItemGet>,
    /// Chest slot id -> item-get index; indices >= 0x70 are mimics.
    pub slots: Vec<u8>,
    /// Action-grant table: trigger/item id -> item-get id.
    pub grants: Vec<(u8, u8)>,
    pub shops: Vec<ShopData>,
    pub monsters: HashMap<ObjectId, MonsterData>,
    pub special_triggers: SpecialTriggers,
    pub keyed_spawns: Vec<KeyedSpawn>,
    pub extra_checks: Vec<ExtraCheck>,
    /// Shop locations that may themselves be hard to reach; their inventory
    /// is never relied on for capability checks.
    pub unreliable_shop_locations: Vec<LocationId>,
    /// Location pair sharing the teleport trigger geometry (the split plain).
    pub teleport_skip_locations: Option<(LocationId, LocationId)>,
    pub wild_warp_locations: Vec<LocationId>,
    /// Wild-warp targets excluded from logic (can't move after warping in).
    pub wild_warp_excluded: Vec<LocationId>,
    /// Warp target of the thunder-sword teleport: location and entrance.
    pub thunder_warp: Option<(LocationId, usize)>,
    /// Town-warp destinations, used for the fight-skip geometry check.
    pub town_warp_locations: Vec<LocationId>,
    pub start_location: LocationId,
    /// Element bits that can appear on mimics.
    pub mimic_elements: u8,
}

impl GameData {
    pub fn flag(&self, id: FlagId) -> Option<&Flag> {
        self.flags.get(id)
    }

    pub fn location_name(&self, id: LocationId) -> &str {
        self.locations
            .get(id)
            .map(|l| l.name.as_str())
            .unwrap_or("?")
    }

    /// Looks up the item-get granted by a trigger or item-use action.
    pub fn item_grant(&self, id: u8) -> Option<u8> {
        self.grants
            .iter()
            .find(|&&(key, _)| key == id)
            .map(|&(_, value)| value)
    }

    /// Item uses keyed the way spawn records reference them.
    pub fn item_uses_for(&self, key: i32) -> Vec<(ItemId, &ItemUse)> {
        let mut out = Vec::new();
        for (item_id, item) in self.items.iter().enumerate() {
            for use_ in &item.uses {
                let use_key = match use_.kind {
                    ItemUseKind::ExpectSpawn { type_code, id } => {
                        (type_code as i32) << 8 | id as i32
                    }
                    ItemUseKind::AtLocation { location } => !(location as i32),
                };
                if use_key == key {
                    out.push((item_id, use_));
                }
            }
        }
        out
    }
}
