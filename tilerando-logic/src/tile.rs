//! Packed tile coordinates and direction masks.
//!
//! A tile id packs location byte, screen row/column nibbles, and in-screen
//! row/column nibbles: `loc << 16 | sy << 12 | sx << 8 | ty << 4 | tx`.
//! Screens are 16 columns by 15 rows, so `ty` never reaches 0xf. Tiles are
//! only ever keys into maps, never allocated as objects.

use tilerando_game::{LocationId, SCREEN_HEIGHT, SCREEN_WIDTH};

pub type TileId = u32;
/// A screen id: `loc << 8 | sy << 4 | sx`.
pub type ScreenId = u32;
/// An ordered pair of tiles, used as an edge key.
pub type TilePair = u64;
/// A bitmask of `Dir` bits.
pub type DirMask = u8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dir {
    North = 0,
    West = 1,
    South = 2,
    East = 3,
}

impl Dir {
    pub fn opposite(self) -> Dir {
        match self {
            Dir::North => Dir::South,
            Dir::West => Dir::East,
            Dir::South => Dir::North,
            Dir::East => Dir::West,
        }
    }

    pub fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

pub const DIRMASK_ALL: u8 = 0xf;
pub const DIRMASK_SOUTH: u8 = 1 << (Dir::South as u8);
pub const DIRMASK_NOT_SOUTH: u8 = DIRMASK_ALL & !DIRMASK_SOUTH;
/// Location exits reuse the north bit as their edge direction.
pub const DIR_EXIT_BIT: u8 = 1 << (Dir::North as u8);

/// Packs a tile from absolute tile coordinates within a location.
pub fn tile(location: LocationId, xt: u16, yt: u16) -> TileId {
    let sy = (yt / SCREEN_HEIGHT) as u32;
    let ty = (yt % SCREEN_HEIGHT) as u32;
    let sx = (xt / SCREEN_WIDTH) as u32;
    let tx = (xt % SCREEN_WIDTH) as u32;
    (location as u32) << 16 | sy << 12 | sx << 8 | ty << 4 | tx
}

/// A tile at the given in-screen position (`pos = ty << 4 | tx`) of a screen.
pub fn tile_on_screen(screen: ScreenId, pos: u8) -> TileId {
    screen << 8 | pos as u32
}

pub fn location(t: TileId) -> LocationId {
    (t >> 16) as LocationId
}

pub fn screen(t: TileId) -> ScreenId {
    t >> 8
}

/// Absolute tile coordinates within the tile's location.
pub fn coords(t: TileId) -> (u16, u16) {
    let sy = (t >> 12 & 0xf) as u16;
    let sx = (t >> 8 & 0xf) as u16;
    let ty = (t >> 4 & 0xf) as u16;
    let tx = (t & 0xf) as u16;
    (sx * SCREEN_WIDTH + tx, sy * SCREEN_HEIGHT + ty)
}

/// Moves a tile by (dy, dx), carrying across screen boundaries. Moving past
/// the edge of the location wraps the screen nibble and lands on a tile that
/// has no registered terrain.
pub fn add(t: TileId, dy: i32, dx: i32) -> TileId {
    let (xt, yt) = coords(t);
    let y = yt as i32 + dy;
    let x = xt as i32 + dx;
    let sy = y.div_euclid(SCREEN_HEIGHT as i32) as u32 & 0xf;
    let ty = y.rem_euclid(SCREEN_HEIGHT as i32) as u32;
    let sx = x.div_euclid(SCREEN_WIDTH as i32) as u32 & 0xf;
    let tx = x.rem_euclid(SCREEN_WIDTH as i32) as u32;
    t & 0xff0000 | sy << 12 | sx << 8 | ty << 4 | tx
}

/// Same in-screen position in another location (seamless transitions).
pub fn with_location(t: TileId, location: LocationId) -> TileId {
    t & 0xffff | (location as u32) << 16
}

pub fn pair(from: TileId, to: TileId) -> TilePair {
    (from as u64) << 32 | to as u64
}

pub fn split(p: TilePair) -> (TileId, TileId) {
    ((p >> 32) as TileId, p as TileId)
}

/// The 2x2 box of tiles a trigger hitbox overlaps. Trigger hitboxes are two
/// tiles wide and one tall but don't line up with the tile grid, so the box
/// extends one tile up and left of the spawn position.
pub fn trigger_hitbox(location: LocationId, xt: u16, yt: u16) -> Vec<TileId> {
    let t = tile(location, xt, yt);
    let mut out = Vec::with_capacity(4);
    for dx in [-1, 0] {
        for dy in [-1, 0] {
            out.push(add(t, dy, dx));
        }
    }
    out
}

/// All 240 tiles of the given tile's screen.
pub fn screen_hitbox(t: TileId) -> Vec<TileId> {
    let s = screen(t);
    let mut out = Vec::with_capacity(240);
    for ty in 0..SCREEN_HEIGHT as u32 {
        for tx in 0..SCREEN_WIDTH as u32 {
            out.push(s << 8 | ty << 4 | tx);
        }
    }
    out
}

/// Replaces a hitbox by copies of itself shifted by each (dy, dx) delta.
pub fn adjust(hitbox: &[TileId], deltas: &[(i32, i32)]) -> Vec<TileId> {
    let mut out = Vec::new();
    for &(dy, dx) in deltas {
        for &t in hitbox {
            let t = add(t, dy, dx);
            if !out.contains(&t) {
                out.push(t);
            }
        }
    }
    out
}

/// Copies a hitbox into each of the given locations.
pub fn at_locations(hitbox: &[TileId], locations: &[LocationId]) -> Vec<TileId> {
    let mut out = Vec::new();
    for &loc in locations {
        for &t in hitbox {
            let t = with_location(t, loc);
            if !out.contains(&t) {
                out.push(t);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_roundtrip() {
        let t = tile(0x42, 35, 31);
        assert_eq!(location(t), 0x42);
        assert_eq!(coords(t), (35, 31));
        // 35 = screen 2, column 3; 31 = screen 2, row 1.
        assert_eq!(t, 0x42_2213);
    }

    #[test]
    fn test_add_within_screen() {
        let t = tile(1, 5, 5);
        assert_eq!(coords(add(t, 1, 0)), (5, 6));
        assert_eq!(coords(add(t, 0, -1)), (4, 5));
    }

    #[test]
    fn test_add_across_screen_boundary() {
        let t = tile(1, 15, 14);
        // Row 14 is the last row of a screen; stepping south enters the
        // screen below. Column 15 likewise carries east.
        assert_eq!(coords(add(t, 1, 0)), (15, 15));
        assert_eq!(coords(add(t, 0, 1)), (16, 14));
        assert_eq!(add(add(t, 1, 1), -1, -1), t);
    }

    #[test]
    fn test_pair_split() {
        let a = tile(1, 2, 3);
        let b = tile(4, 5, 6);
        assert_eq!(split(pair(a, b)), (a, b));
        assert_ne!(pair(a, b), pair(b, a));
    }
}
