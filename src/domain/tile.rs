//! Tile constants and the visual variants derived by autotiling.
//!
//! A cell stores a tile-set id (which material occupies it, `EMPTY` when
//! passable) and a derived tile id selecting one of 16 edge variants in
//! that material's sheet. Sheet slots 16..=19 are corner overlays.

/// Side length of a grid cell in world units. Shared by grid and entities.
pub const CELL: f32 = 64.0;

/// Tile-set id of an empty, passable cell.
pub const EMPTY: i32 = -1;

// ── Derived tile ids ──
//
// "Open" means the neighbour on that side does not share the tile set.
// `below` is row y-1, `above` is row y+1.

pub const TILE_CORNER_ABOVE_WEST: u8 = 0;
pub const TILE_EDGE_ABOVE: u8 = 1;
pub const TILE_CORNER_ABOVE_EAST: u8 = 2;
pub const TILE_EDGE_WEST: u8 = 3;
pub const TILE_CENTER: u8 = 4;
pub const TILE_EDGE_EAST: u8 = 5;
pub const TILE_CORNER_BELOW_WEST: u8 = 6;
pub const TILE_EDGE_BELOW: u8 = 7;
pub const TILE_CORNER_BELOW_EAST: u8 = 8;
pub const TILE_ROW_WEST_END: u8 = 9;
pub const TILE_ROW_MIDDLE: u8 = 10;
pub const TILE_ROW_EAST_END: u8 = 11;
pub const TILE_COLUMN_TOP_END: u8 = 12;
pub const TILE_COLUMN_MIDDLE: u8 = 13;
pub const TILE_COLUMN_BOTTOM_END: u8 = 14;
pub const TILE_SINGLE: u8 = 15;

/// Diagonal corner overlays, drawn on top of the cell's base tile.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Corner {
    /// Slot of this overlay in the tile-set sheet.
    pub fn sheet_index(self) -> u8 {
        match self {
            Corner::TopLeft => 16,
            Corner::TopRight => 17,
            Corner::BottomLeft => 18,
            Corner::BottomRight => 19,
        }
    }

    /// Offset of the overlay's origin from the cell origin, in world units.
    pub fn offset(self) -> (f32, f32) {
        let half = CELL / 2.0;
        match self {
            Corner::TopLeft => (-half, half),
            Corner::TopRight => (half, half),
            Corner::BottomLeft => (-half, -half),
            Corner::BottomRight => (half, -half),
        }
    }
}
