//! The tile grid: a columns × rows array of cells addressed in pixels or
//! in (column, row) pairs.
//!
//! ## Indexing
//!
//! Cells are stored column-major: `index = col * rows + row`. Persisted
//! worlds and every consumer of [`TileGrid::cells`] rely on this order.
//!
//! ## Out-of-range access
//!
//! Pixel lookups clamp to the nearest edge cell instead of failing, so
//! probes just outside the map read the border cell. A zero-sized grid
//! is a valid "no map loaded" state: lookups return `None` and every
//! point counts as blocked.

use super::autotile;
use super::geom::{Rect, Vec2};
use super::tile::{CELL, EMPTY, TILE_CENTER};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Cell {
    pub tile_set_id: i32,
    /// Derived by autotiling; never written by gameplay code.
    pub tile_id: u8,
    pub x: i32,
    pub y: i32,
}

impl Cell {
    pub fn is_blocked(&self) -> bool {
        self.tile_set_id >= 0
    }

    /// Pixel-space rectangle covered by this cell.
    pub fn rect(&self) -> Rect {
        Rect::new(self.x as f32 * CELL, self.y as f32 * CELL, CELL, CELL)
    }
}

#[derive(Clone, Debug)]
pub struct TileGrid {
    columns: usize,
    rows: usize,
    cells: Vec<Cell>,
    bounds: Rect,
    /// Entities whose top edge sinks below this line drown.
    pub water_height: f32,
}

impl Default for TileGrid {
    fn default() -> Self {
        TileGrid::new()
    }
}

impl TileGrid {
    /// An empty 0 × 0 grid.
    pub fn new() -> Self {
        TileGrid {
            columns: 0,
            rows: 0,
            cells: Vec::new(),
            bounds: Rect::default(),
            water_height: 0.0,
        }
    }

    pub fn with_size(columns: usize, rows: usize) -> Self {
        let mut grid = TileGrid::new();
        grid.reset(columns, rows);
        grid
    }

    /// Reallocate to `columns × rows` empty cells. Water is drained.
    pub fn reset(&mut self, columns: usize, rows: usize) {
        self.columns = columns;
        self.rows = rows;
        self.bounds = Rect::new(0.0, 0.0, columns as f32 * CELL, rows as f32 * CELL);
        self.water_height = 0.0;
        self.cells = (0..columns * rows)
            .map(|i| {
                let x = i / rows;
                let y = i - x * rows;
                Cell {
                    tile_set_id: EMPTY,
                    tile_id: TILE_CENTER,
                    x: x as i32,
                    y: y as i32,
                }
            })
            .collect();
    }

    // ── Queries ──

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// `(0, 0, columns * CELL, rows * CELL)`.
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub(crate) fn cells_mut(&mut self) -> &mut [Cell] {
        &mut self.cells
    }

    /// Exact lookup; `None` outside the grid.
    pub fn cell(&self, col: i32, row: i32) -> Option<&Cell> {
        if col < 0 || row < 0 || col as usize >= self.columns || row as usize >= self.rows {
            return None;
        }
        self.cells.get(col as usize * self.rows + row as usize)
    }

    /// Lookup with both coordinates clamped to the nearest edge.
    pub fn cell_clamped(&self, col: i32, row: i32) -> Option<&Cell> {
        if self.is_empty() {
            return None;
        }
        let col = col.clamp(0, self.columns as i32 - 1);
        let row = row.clamp(0, self.rows as i32 - 1);
        self.cell(col, row)
    }

    /// Cell containing the pixel position, clamped to the grid.
    pub fn cell_at(&self, x: f32, y: f32) -> Option<&Cell> {
        let col = if x < 0.0 { 0 } else { (x / CELL) as i32 };
        let row = if y < 0.0 { 0 } else { (y / CELL) as i32 };
        self.cell_clamped(col, row)
    }

    pub fn cell_at_point(&self, p: Vec2) -> Option<&Cell> {
        self.cell_at(p.x, p.y)
    }

    /// Whether the (clamped) cell under a pixel position is solid.
    /// Everything is solid on an empty grid.
    pub fn is_blocked_at(&self, x: f32, y: f32) -> bool {
        self.cell_at(x, y).map_or(true, Cell::is_blocked)
    }

    pub fn is_blocked_point(&self, p: Vec2) -> bool {
        self.is_blocked_at(p.x, p.y)
    }

    /// Cells holding a tile, in storage order.
    pub fn non_empty_cells(&self) -> impl Iterator<Item = &Cell> + '_ {
        self.cells.iter().filter(|c| c.tile_set_id != EMPTY)
    }

    // ── Mutation ──

    /// Set one cell's tile set without re-deriving tile ids. Returns
    /// false when the coordinates are outside the grid. Callers batch
    /// these and then run [`autotile::update_tiles`].
    pub fn set_tile_set(&mut self, col: i32, row: i32, tile_set_id: i32) -> bool {
        if col < 0 || row < 0 || col as usize >= self.columns || row as usize >= self.rows {
            return false;
        }
        let idx = col as usize * self.rows + row as usize;
        match self.cells.get_mut(idx) {
            Some(cell) => {
                cell.tile_set_id = tile_set_id;
                true
            }
            None => false,
        }
    }

    /// Fill every cell overlapping `area` (pixels), then re-derive the
    /// tile ids of the whole grid.
    pub fn set_region(&mut self, area: Rect, tile_set_id: i32) {
        for cell in self.cells.iter_mut() {
            if cell.rect().overlaps(&area) {
                cell.tile_set_id = tile_set_id;
            }
        }
        autotile::update_tiles(self);
    }
}
