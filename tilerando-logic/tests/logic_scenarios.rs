// End-to-end scenarios over small synthetic maps: a couple of one-screen
// locations wired together with exits, pushed through the full graph build.

use anyhow::Result;

use tilerando_game::{
    Boss, BossKind, Entrance, Exit, ExtraCheck, GameData, ItemData, ItemGet, Location,
    LocationId, Npc, Screen, Spawn, SpawnData, TileEffects, Tileset, SCREEN_TILES,
};
use tilerando_logic::requirement::Requirement;
use tilerando_logic::tile;
use tilerando_logic::{LogicSettings, World};

// Metatile assignments for the synthetic tile-effects table.
const TILE_OPEN: u8 = 0;
const TILE_FLY: u8 = 2;

fn base_game() -> GameData {
    let mut effects = vec![0u8; 0x100];
    effects[1] = 0x04; // impassable
    effects[TILE_FLY as usize] = 0x02;
    GameData {
        screens: Vec::new(),
        tilesets: vec![Tileset { alternates: (0..=0xff).collect() }],
        tile_effects: vec![TileEffects { effects }],
        // Slot 0 is a plain non-unique item.
        items: vec![ItemData { name: "Herb".to_string(), unique: false, uses: Vec::new() }],
        item_gets: vec![ItemGet { item: 0, losable: false, prevent_loss: false }],
        slots: vec![0],
        ..GameData::default()
    }
}

fn uniform_screen(game: &mut GameData, metatile: u8) -> usize {
    game.screens.push(Screen { tiles: vec![metatile; SCREEN_TILES] });
    game.screens.len() - 1
}

// A single walkable column at x=5, walled off everywhere else.
fn corridor_screen(game: &mut GameData) -> usize {
    let mut tiles = vec![1u8; SCREEN_TILES];
    for y in 0..15 {
        tiles[y * 16 + 5] = TILE_OPEN;
    }
    game.screens.push(Screen { tiles });
    game.screens.len() - 1
}

fn add_location(game: &mut GameData, name: &str, screen: usize) -> LocationId {
    let id = game.locations.len();
    game.locations.push(Location {
        id,
        name: name.to_string(),
        used: true,
        width: 1,
        height: 1,
        screens: vec![vec![screen]],
        tileset: 0,
        tile_effects: 0,
        exits: Vec::new(),
        entrances: vec![Entrance { xt: 2, yt: 2 }],
        flags: Vec::new(),
        pits: Vec::new(),
        spawns: Vec::new(),
        is_shop: false,
        is_tower: false,
        forced_effects: 0,
        dolphin_upper_half: false,
    });
    id
}

fn add_exit(game: &mut GameData, from: LocationId, xt: u16, yt: u16, dest: LocationId) {
    game.locations[from].exits.push(Exit { xt, yt, dest, entrance: 0, seamless: false });
}

fn add_chest(game: &mut GameData, location: LocationId, xt: u16, yt: u16, slot: u8) {
    game.locations[location]
        .spawns
        .push(Spawn { xt, yt, data: SpawnData::Chest { slot } });
}

#[test]
fn test_reciprocal_exits_merge_areas() -> Result<()> {
    let mut game = base_game();
    let open = uniform_screen(&mut game, TILE_OPEN);
    let home = add_location(&mut game, "Home", open);
    let field = add_location(&mut game, "Field", open);
    add_exit(&mut game, home, 8, 8, field);
    add_exit(&mut game, field, 2, 2, home);
    game.start_location = home;

    let settings = LogicSettings::default();
    let mut world = World::build(&game, &settings)?;
    // Same terrain on both sides and exits in both directions: one area,
    // and both exit edges are consumed by the merge.
    assert_eq!(
        world.canonical(tile::tile(home, 5, 5)),
        world.canonical(tile::tile(field, 5, 5))
    );
    let out = tile::tile(home, 8, 8);
    let back = tile::tile(field, 2, 2);
    assert_eq!(world.neighbor_mask(out, back), 0);
    assert_eq!(world.neighbor_mask(back, out), 0);
    Ok(())
}

#[test]
fn test_seamless_exit_routes_without_merging() -> Result<()> {
    let mut game = base_game();
    let open = uniform_screen(&mut game, TILE_OPEN);
    let home = add_location(&mut game, "Home", open);
    let field = add_location(&mut game, "Field", open);
    game.locations[home]
        .exits
        .push(Exit { xt: 8, yt: 8, dest: field, entrance: 0, seamless: true });
    add_chest(&mut game, field, 5, 5, 0);
    game.start_location = home;

    let settings = LogicSettings::default();
    let mut world = World::build(&game, &settings)?;
    // The far side stays a separate area, but the transition still routes.
    assert_ne!(
        world.canonical(tile::tile(home, 5, 5)),
        world.canonical(tile::tile(field, 5, 5))
    );
    let req = world.requirement(0x100).expect("chest must be routed");
    assert!(req.is_open(), "got {req:?}");
    Ok(())
}

#[test]
fn test_statue_blocks_northward_passage() -> Result<()> {
    let mut game = base_game();
    let corridor = corridor_screen(&mut game);
    let shrine = add_location(&mut game, "Shrine", corridor);
    game.locations[shrine].entrances[0] = Entrance { xt: 5, yt: 12 };
    // An always-spawned blocker halfway up the corridor.
    game.npcs.push(Npc { name: "Guard".to_string(), used: true, statue: true, ..Npc::default() });
    game.locations[shrine]
        .spawns
        .push(Spawn { xt: 5, yt: 7, data: SpawnData::Npc { id: 0 } });
    game.slots = vec![0, 0];
    add_chest(&mut game, shrine, 5, 2, 0);
    add_chest(&mut game, shrine, 5, 10, 1);
    game.start_location = shrine;

    let settings = LogicSettings::default();
    let world = World::build(&game, &settings)?;
    let south = world.requirement(0x101).expect("south chest must be routed");
    assert!(south.is_open(), "got {south:?}");
    // Retreating south past the statue is free, pushing north never is.
    let north_reachable = world.requirement(0x100).map_or(false, |r| !r.is_closed());
    assert!(!north_reachable);
    Ok(())
}

#[test]
fn test_chest_across_open_exit_is_free() -> Result<()> {
    let mut game = base_game();
    let open = uniform_screen(&mut game, TILE_OPEN);
    let home = add_location(&mut game, "Home", open);
    let field = add_location(&mut game, "Field", open);
    add_exit(&mut game, home, 8, 8, field);
    add_chest(&mut game, field, 5, 5, 0);
    game.start_location = home;

    let settings = LogicSettings::default();
    let world = World::build(&game, &settings)?;
    let req = world.requirement(0x100).expect("chest must be routed");
    assert!(req.is_open(), "got {req:?}");
    Ok(())
}

#[test]
fn test_gated_terrain_propagates_into_route() -> Result<()> {
    let mut game = base_game();
    let open = uniform_screen(&mut game, TILE_OPEN);
    let sky = uniform_screen(&mut game, TILE_FLY);
    let home = add_location(&mut game, "Home", open);
    let aerie = add_location(&mut game, "Aerie", sky);
    add_exit(&mut game, home, 8, 8, aerie);
    add_chest(&mut game, aerie, 5, 5, 0);
    game.start_location = home;

    let settings = LogicSettings::default();
    let world = World::build(&game, &settings)?;
    let flight = game.capabilities.flight;
    let req = world.requirement(0x100).expect("chest must be routed");
    assert_eq!(req, Requirement::single([flight]));
    Ok(())
}

#[test]
fn test_boss_check_requires_a_sword() -> Result<()> {
    let mut game = base_game();
    let open = uniform_screen(&mut game, TILE_OPEN);
    let home = add_location(&mut game, "Home", open);
    let lair = add_location(&mut game, "Lair", open);
    add_exit(&mut game, home, 8, 8, lair);
    let flag = 0x2f0;
    game.bosses.push(Boss {
        name: "Kelbesque".to_string(),
        flag: Some(flag),
        object: None,
        sword_level: 1,
        npc: None,
        location: Some(lair),
        kind: BossKind::Normal,
        extra_conditions: Vec::new(),
        drops_item: true,
    });
    game.locations[lair]
        .spawns
        .push(Spawn { xt: 5, yt: 5, data: SpawnData::Boss { boss: 0 } });
    game.start_location = home;

    let settings = LogicSettings::default();
    let world = World::build(&game, &settings)?;
    let sword = game.capabilities.sword;
    let req = world.requirement(flag).expect("boss must be routed");
    assert_eq!(req, Requirement::single([sword]));
    Ok(())
}

#[test]
fn test_disconnected_chest_is_unreachable() -> Result<()> {
    let mut game = base_game();
    let open = uniform_screen(&mut game, TILE_OPEN);
    let home = add_location(&mut game, "Home", open);
    let island = add_location(&mut game, "Island", open);
    add_chest(&mut game, island, 5, 5, 0);
    game.start_location = home;

    let settings = LogicSettings::default();
    let world = World::build(&game, &settings)?;
    let reachable = world
        .requirement(0x100)
        .map_or(false, |r| !r.is_closed());
    assert!(!reachable);
    Ok(())
}

#[test]
fn test_quest_checks_attach_at_location_entrance() -> Result<()> {
    let mut game = base_game();
    let open = uniform_screen(&mut game, TILE_OPEN);
    let home = add_location(&mut game, "Home", open);
    let field = add_location(&mut game, "Field", open);
    add_exit(&mut game, home, 8, 8, field);
    // A flag check gated on holding two items, and an item-granting one.
    game.extra_checks.push(ExtraCheck {
        location: field,
        requirements: vec![vec![0x200, 0x201]],
        flag: 0x2c0,
        item: false,
    });
    game.extra_checks.push(ExtraCheck {
        location: home,
        requirements: vec![vec![0x202]],
        flag: 0x105,
        item: true,
    });
    game.start_location = home;

    let settings = LogicSettings::default();
    let world = World::build(&game, &settings)?;
    let flag = world.requirement(0x2c0).expect("quest flag must be routed");
    assert_eq!(flag, Requirement::single([0x200, 0x201]));
    let item = world.requirement(0x105).expect("quest item must be routed");
    assert_eq!(item, Requirement::single([0x202]));
    let list = world.location_list();
    assert!(list.slots[&0x105].unique);
    assert!(list.slots[&0x105].lossy);
    Ok(())
}

#[test]
fn test_prevent_loss_override_on_non_unique_item() -> Result<()> {
    let mut game = base_game();
    game.item_gets.push(ItemGet { item: 0, losable: true, prevent_loss: true });
    game.slots = vec![0, 1];
    let open = uniform_screen(&mut game, TILE_OPEN);
    let home = add_location(&mut game, "Home", open);
    add_chest(&mut game, home, 5, 5, 1);
    game.start_location = home;

    let settings = LogicSettings::default();
    let world = World::build(&game, &settings)?;
    let info = world.location_list().items[&0x201];
    assert!(!info.unique);
    assert!(info.losable);
    assert!(info.prevent_loss);
    Ok(())
}

#[test]
fn test_build_is_deterministic() -> Result<()> {
    let mut game = base_game();
    let open = uniform_screen(&mut game, TILE_OPEN);
    let sky = uniform_screen(&mut game, TILE_FLY);
    let home = add_location(&mut game, "Home", open);
    let field = add_location(&mut game, "Field", open);
    let aerie = add_location(&mut game, "Aerie", sky);
    add_exit(&mut game, home, 8, 8, field);
    add_exit(&mut game, field, 2, 2, home);
    add_exit(&mut game, field, 12, 7, aerie);
    add_chest(&mut game, field, 5, 5, 0);
    add_chest(&mut game, aerie, 5, 5, 0);
    game.start_location = home;

    let settings = LogicSettings::default();
    let a = World::build(&game, &settings)?.location_list();
    let b = World::build(&game, &settings)?.location_list();
    assert_eq!(a.requirements, b.requirements);
    assert_eq!(a.slots, b.slots);
    assert_eq!(a.items, b.items);
    Ok(())
}
