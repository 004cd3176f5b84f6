//! Autotiling: derive each cell's visual variant from its neighbours.
//!
//! ## Neighbour comparison
//!
//! A neighbour "matches" when it holds the same tile set. Neighbour
//! coordinates are clamped to the grid, so a cell on the border compares
//! against itself across the edge and reads as connected there. Map
//! content depends on this, so it must not be replaced by "outside is
//! empty". Empty cells never match anything, including other empty
//! cells.
//!
//! ## Rule order
//!
//! Rules run in a fixed order and later matches overwrite earlier ones:
//! east edge, west edge, horizontal interior, horizontal strip, vertical
//! strip. The result depends only on the 8-neighbourhood, so
//! recomputing is idempotent.

use super::grid::TileGrid;
use super::tile::*;

/// `tile_set_id` if the clamped neighbour at `(col, row)` holds the same
/// tile set, otherwise [`EMPTY`].
pub fn compare_neighbor(grid: &TileGrid, tile_set_id: i32, col: i32, row: i32) -> i32 {
    match grid.cell_clamped(col, row) {
        Some(cell) if cell.tile_set_id == tile_set_id => cell.tile_set_id,
        _ => EMPTY,
    }
}

fn matches(grid: &TileGrid, tile_set_id: i32, col: i32, row: i32) -> bool {
    compare_neighbor(grid, tile_set_id, col, row) >= 0
}

/// Visual variant for the cell at `(col, row)`.
pub fn resolve_tile_id(grid: &TileGrid, col: i32, row: i32) -> u8 {
    let id = match grid.cell_clamped(col, row) {
        Some(cell) => cell.tile_set_id,
        None => return TILE_CENTER,
    };

    let east = matches(grid, id, col + 1, row);
    let west = matches(grid, id, col - 1, row);
    let below = matches(grid, id, col, row - 1);
    let above = matches(grid, id, col, row + 1);

    let mut tile = TILE_CENTER;

    if !east {
        if !below { tile = TILE_CORNER_BELOW_EAST; }
        if !above { tile = TILE_CORNER_ABOVE_EAST; }
        if below && above { tile = TILE_EDGE_EAST; }
    }

    if !west {
        if !below { tile = TILE_CORNER_BELOW_WEST; }
        if !above { tile = TILE_CORNER_ABOVE_WEST; }
        if below && above { tile = TILE_EDGE_WEST; }
    }

    if east && west {
        if !below { tile = TILE_EDGE_BELOW; }
        if !above { tile = TILE_EDGE_ABOVE; }
    }

    if !below && !above {
        if !east { tile = TILE_ROW_EAST_END; }
        if !west { tile = TILE_ROW_WEST_END; }
        if east && west { tile = TILE_ROW_MIDDLE; }
    }

    if !east && !west {
        if !above { tile = TILE_COLUMN_TOP_END; }
        if !below { tile = TILE_COLUMN_BOTTOM_END; }
        if below && above { tile = TILE_COLUMN_MIDDLE; }
        if !below && !above { tile = TILE_SINGLE; }
    }

    tile
}

/// Re-derive every cell's tile id.
pub fn update_tiles(grid: &mut TileGrid) {
    let derived: Vec<u8> = grid
        .cells()
        .iter()
        .map(|c| resolve_tile_id(grid, c.x, c.y))
        .collect();
    for (cell, tile_id) in grid.cells_mut().iter_mut().zip(derived) {
        cell.tile_id = tile_id;
    }
}

/// Corner overlays for the cell at `(col, row)`: a matching side
/// neighbour whose diagonal neighbour on that side does not match.
pub fn corners(grid: &TileGrid, col: i32, row: i32) -> Vec<Corner> {
    let mut out = Vec::new();
    let id = match grid.cell_clamped(col, row) {
        Some(cell) => cell.tile_set_id,
        None => return out,
    };

    if matches(grid, id, col + 1, row) {
        if matches(grid, id, col, row - 1) && !matches(grid, id, col + 1, row - 1) {
            out.push(Corner::BottomRight);
        }
        if matches(grid, id, col, row + 1) && !matches(grid, id, col + 1, row + 1) {
            out.push(Corner::TopRight);
        }
    }

    if matches(grid, id, col - 1, row) {
        if matches(grid, id, col, row - 1) && !matches(grid, id, col - 1, row - 1) {
            out.push(Corner::BottomLeft);
        }
        if matches(grid, id, col, row + 1) && !matches(grid, id, col - 1, row + 1) {
            out.push(Corner::TopLeft);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::geom::Rect;

    /// Build a grid from rows of text, top row first. `#` is tile set 0,
    /// `%` is tile set 1, anything else is empty.
    fn grid_from(rows: &[&str]) -> TileGrid {
        let h = rows.len();
        let w = rows[0].len();
        let mut grid = TileGrid::with_size(w, h);
        for (i, line) in rows.iter().enumerate() {
            let row = (h - 1 - i) as i32;
            for (col, ch) in line.chars().enumerate() {
                let id = match ch {
                    '#' => 0,
                    '%' => 1,
                    _ => EMPTY,
                };
                grid.set_tile_set(col as i32, row, id);
            }
        }
        update_tiles(&mut grid);
        grid
    }

    fn tile_at(grid: &TileGrid, col: i32, row: i32) -> u8 {
        grid.cell(col, row).map(|c| c.tile_id).unwrap_or(255)
    }

    // ── compare_neighbor ──

    #[test]
    fn compare_clamps_to_edge() {
        let grid = grid_from(&["#.."]);
        assert_eq!(compare_neighbor(&grid, 0, -5, 0), 0);
        assert_eq!(compare_neighbor(&grid, 0, 0, 9), 0);
        assert_eq!(compare_neighbor(&grid, 0, 1, 0), EMPTY);
    }

    #[test]
    fn empty_cells_never_match() {
        let grid = grid_from(&["..."]);
        assert_eq!(compare_neighbor(&grid, EMPTY, 1, 0), EMPTY);
        assert_eq!(tile_at(&grid, 1, 0), TILE_SINGLE);
    }

    #[test]
    fn compare_on_empty_grid_is_empty() {
        let grid = TileGrid::new();
        assert_eq!(compare_neighbor(&grid, 0, 0, 0), EMPTY);
        assert_eq!(resolve_tile_id(&grid, 0, 0), TILE_CENTER);
        assert!(corners(&grid, 0, 0).is_empty());
    }

    // ── resolve_tile_id ──

    #[test]
    fn horizontal_strip_has_two_ends_and_a_middle() {
        let grid = grid_from(&[
            ".....",
            ".###.",
            ".....",
        ]);
        assert_eq!(tile_at(&grid, 1, 1), TILE_ROW_WEST_END);
        assert_eq!(tile_at(&grid, 2, 1), TILE_ROW_MIDDLE);
        assert_eq!(tile_at(&grid, 3, 1), TILE_ROW_EAST_END);
    }

    #[test]
    fn full_width_strip_reads_as_connected_at_the_border() {
        // A 3 × 1 grid: every out-of-range neighbour clamps back onto a
        // cell of the same tile set, so all four sides match and no end
        // pieces appear. Ends only show where the run meets an empty
        // cell, as in `horizontal_strip_has_two_ends_and_a_middle`.
        let grid = grid_from(&["###"]);
        for col in 0..3 {
            assert_eq!(tile_at(&grid, col, 0), TILE_CENTER);
        }
    }

    #[test]
    fn vertical_strip_has_top_middle_bottom() {
        let grid = grid_from(&[
            "...",
            ".#.",
            ".#.",
            ".#.",
            "...",
        ]);
        assert_eq!(tile_at(&grid, 1, 3), TILE_COLUMN_TOP_END);
        assert_eq!(tile_at(&grid, 1, 2), TILE_COLUMN_MIDDLE);
        assert_eq!(tile_at(&grid, 1, 1), TILE_COLUMN_BOTTOM_END);
    }

    #[test]
    fn isolated_cell_is_single() {
        let grid = grid_from(&[
            "...",
            ".#.",
            "...",
        ]);
        assert_eq!(tile_at(&grid, 1, 1), TILE_SINGLE);
    }

    #[test]
    fn block_edges_and_corners() {
        let grid = grid_from(&[
            ".....",
            ".###.",
            ".###.",
            ".###.",
            ".....",
        ]);
        assert_eq!(tile_at(&grid, 1, 3), TILE_CORNER_ABOVE_WEST);
        assert_eq!(tile_at(&grid, 2, 3), TILE_EDGE_ABOVE);
        assert_eq!(tile_at(&grid, 3, 3), TILE_CORNER_ABOVE_EAST);
        assert_eq!(tile_at(&grid, 1, 2), TILE_EDGE_WEST);
        assert_eq!(tile_at(&grid, 2, 2), TILE_CENTER);
        assert_eq!(tile_at(&grid, 3, 2), TILE_EDGE_EAST);
        assert_eq!(tile_at(&grid, 1, 1), TILE_CORNER_BELOW_WEST);
        assert_eq!(tile_at(&grid, 2, 1), TILE_EDGE_BELOW);
        assert_eq!(tile_at(&grid, 3, 1), TILE_CORNER_BELOW_EAST);
    }

    #[test]
    fn different_tile_sets_do_not_connect() {
        let grid = grid_from(&[
            ".....",
            ".#%#.",
            ".....",
        ]);
        assert_eq!(tile_at(&grid, 1, 1), TILE_SINGLE);
        assert_eq!(tile_at(&grid, 2, 1), TILE_SINGLE);
        assert_eq!(tile_at(&grid, 3, 1), TILE_SINGLE);
    }

    #[test]
    fn recomputing_is_idempotent() {
        let mut grid = grid_from(&[
            "#..#.",
            "##.##",
            ".#%#.",
            "#####",
        ]);
        let before: Vec<u8> = grid.cells().iter().map(|c| c.tile_id).collect();
        update_tiles(&mut grid);
        let after: Vec<u8> = grid.cells().iter().map(|c| c.tile_id).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn set_region_rederives_neighbours() {
        let mut grid = grid_from(&[
            ".....",
            ".#...",
            ".....",
        ]);
        assert_eq!(tile_at(&grid, 1, 1), TILE_SINGLE);
        grid.set_region(Rect::new(128.0, 64.0, 64.0, 64.0), 0);
        assert_eq!(tile_at(&grid, 1, 1), TILE_ROW_WEST_END);
        assert_eq!(tile_at(&grid, 2, 1), TILE_ROW_EAST_END);
    }

    #[test]
    fn tile_id_depends_only_on_neighbourhood() {
        let mut grid = grid_from(&[
            ".......",
            ".##....",
            ".##....",
            ".......",
        ]);
        let before = tile_at(&grid, 1, 2);
        // Far-away edit does not change the block.
        grid.set_region(Rect::new(5.0 * 64.0, 0.0, 64.0, 64.0), 1);
        assert_eq!(tile_at(&grid, 1, 2), before);
    }

    // ── corners ──

    #[test]
    fn inner_corner_of_an_l_shape() {
        // ##
        // #.
        let grid = grid_from(&[
            "....",
            ".##.",
            ".#..",
            "....",
        ]);
        // Cell (1, 2) has east and below matching, diagonal (2, 1) empty.
        assert_eq!(corners(&grid, 1, 2), vec![Corner::BottomRight]);
        assert!(corners(&grid, 2, 2).is_empty());
    }

    #[test]
    fn solid_block_has_no_corner_overlays() {
        let grid = grid_from(&[
            "###",
            "###",
            "###",
        ]);
        for col in 0..3 {
            for row in 0..3 {
                assert!(corners(&grid, col, row).is_empty());
            }
        }
    }

    #[test]
    fn corner_sheet_slots() {
        assert_eq!(Corner::TopLeft.sheet_index(), 16);
        assert_eq!(Corner::BottomRight.sheet_index(), 19);
    }
}
