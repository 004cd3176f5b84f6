//! Movement and collision resolver: single source of truth for how a
//! body moves through the grid and past other entities.
//!
//! ## Probes
//!
//! Each moving axis tests three points on the leading edge (both corners
//! and the midpoint) against the grid. A blocked probe snaps the body to
//! the blocking cell's edge. If the tiles are clear, the swept rectangle
//! is checked against the blocking neighbours in registry order and the
//! first overlap wins (not the closest one).
//!
//! ## Axis order
//!
//! Y resolves first, then X probes from the resolved height. Step sizes
//! are clamped to half a cell so a single call can never skip a cell.
//!
//! ## Post checks
//!
//! After resolution the body is clamped to the map horizontally, drowned
//! below the water line and killed outside the fatal vertical range.
//! Deaths are only *requested* here; the owning entity decides what
//! dying means for it.

use super::entity::{Body, Direction};
use super::geom::{Rect, Vec2};
use super::grid::TileGrid;
use super::tile::CELL;

// ══════════════════════════════════════════════════════════════
// Constants
// ══════════════════════════════════════════════════════════════

/// Largest displacement applied per axis in one `move_body` call.
pub const MAX_STEP: f32 = CELL / 2.0;
/// Jump target value meaning "no jump armed".
pub const JUMP_DISARMED: f32 = -999.0;
pub const GRAVITY: f32 = 1100.0;
pub const MAX_FALL_SPEED: f32 = 600.0;
pub const JUMP_PULL: f32 = 8.0;
pub const JUMP_FORCE_MIN: f32 = 150.0;
pub const JUMP_FORCE_MAX: f32 = 450.0;
/// Horizontal force lost per second.
pub const FORCE_DECAY: f32 = 120.0;
/// Nudge applied to a vertical force of exactly zero.
pub const FALL_EPSILON: f32 = -0.00001;
pub const FADE_RATE: f32 = 7.0;
/// Total growth of a body's neighbour scan area.
pub const SCAN_MARGIN: f32 = CELL;
/// Bodies pushed below this are clamped and killed.
pub const FLOOR_LIMIT: f32 = -CELL * 2.0;

/// What a body moves against: the grid plus the bounds of every
/// blocking neighbour, in registry order, excluding the body itself.
pub struct Surroundings<'a> {
    pub grid: &'a TileGrid,
    pub blockers: &'a [Rect],
}

impl<'a> Surroundings<'a> {
    pub fn new(grid: &'a TileGrid, blockers: &'a [Rect]) -> Self {
        Surroundings { grid, blockers }
    }

    fn first_blocker(&self, swept: &Rect) -> Option<Rect> {
        self.blockers.iter().find(|b| b.overlaps(swept)).copied()
    }

    fn any_blocked(&self, probes: &[Vec2; 3]) -> bool {
        probes.iter().any(|p| self.grid.is_blocked_point(*p))
    }

    /// Cell coordinates under a probe, if the grid has any cells.
    fn cell_coords(&self, p: Vec2) -> Option<(f32, f32)> {
        self.grid.cell_at_point(p).map(|c| (c.x as f32, c.y as f32))
    }
}

// ══════════════════════════════════════════════════════════════
// Mover
// ══════════════════════════════════════════════════════════════

/// Move by `(dx, dy)`. Returns `false` when either axis was snapped or
/// clamped short of the requested displacement.
pub fn move_body(body: &mut Body, dx: f32, dy: f32, env: &Surroundings) -> bool {
    body.direction = Direction::None;

    let dx = dx.clamp(-MAX_STEP, MAX_STEP);
    let dy = dy.clamp(-MAX_STEP, MAX_STEP);

    let blocked_y = if dy > 0.0 {
        move_up(body, dy, env)
    } else if dy < 0.0 {
        move_down(body, dy, env)
    } else {
        false
    };

    let mut blocked_x = if dx > 0.0 {
        move_east(body, dx, env)
    } else if dx < 0.0 {
        move_west(body, dx, env)
    } else {
        false
    };

    let (clamp_x, clamp_y) = limit_to_world(body, env);
    blocked_x |= clamp_x;

    !blocked_x && !(blocked_y || clamp_y)
}

fn move_up(body: &mut Body, dy: f32, env: &Surroundings) -> bool {
    let b = body.bounds;
    let edge = b.top() + dy;
    let probes = [
        Vec2::new(b.x, edge),
        Vec2::new(b.right() - 1.0, edge),
        Vec2::new(b.x + b.width / 2.0, edge),
    ];

    if env.any_blocked(&probes) {
        if let Some((_, row)) = env.cell_coords(probes[0]) {
            body.bounds.y = CELL * row - b.height;
        }
        body.set_vertical_force(0.0);
        return true;
    }

    let swept = Rect::new(b.x, b.y + dy, b.width, b.height);
    if let Some(other) = env.first_blocker(&swept) {
        body.bounds.y = other.y - b.height;
        body.set_vertical_force(0.0);
        return true;
    }

    body.bounds.y += dy;
    body.is_on_ground = false;
    false
}

fn move_down(body: &mut Body, dy: f32, env: &Surroundings) -> bool {
    let b = body.bounds;
    let edge = b.y + dy;
    let probes = [
        Vec2::new(b.x, edge),
        Vec2::new(b.right() - 1.0, edge),
        Vec2::new(b.x + b.width / 2.0, edge),
    ];

    if env.any_blocked(&probes) {
        if let Some((_, row)) = env.cell_coords(probes[0]) {
            body.bounds.y = CELL * (row + 1.0);
        }
        body.is_on_ground = true;
        body.set_vertical_force(0.0);
        return true;
    }

    let swept = Rect::new(b.x, b.y + dy, b.width, b.height);
    if let Some(other) = env.first_blocker(&swept) {
        body.bounds.y = other.top();
        body.is_on_ground = true;
        body.set_vertical_force(0.0);
        return true;
    }

    body.bounds.y += dy;
    body.is_on_ground = false;
    false
}

fn move_east(body: &mut Body, dx: f32, env: &Surroundings) -> bool {
    let b = body.bounds;
    let edge = b.right() + dx;
    let probes = [
        Vec2::new(edge, b.y),
        Vec2::new(edge, b.top() - 1.0),
        Vec2::new(edge, b.y + b.height / 2.0),
    ];

    if env.any_blocked(&probes) {
        if let Some((col, _)) = env.cell_coords(probes[0]) {
            body.bounds.x = CELL * col - b.width;
        }
        return true;
    }

    let swept = Rect::new(b.x + dx, b.y, b.width, b.height);
    if let Some(other) = env.first_blocker(&swept) {
        body.bounds.x = other.x - b.width;
        return true;
    }

    body.bounds.x += dx;
    body.direction = Direction::East;
    false
}

fn move_west(body: &mut Body, dx: f32, env: &Surroundings) -> bool {
    let b = body.bounds;
    let edge = b.x + dx;
    let probes = [
        Vec2::new(edge, b.y),
        Vec2::new(edge, b.top() - 1.0),
        Vec2::new(edge, b.y + b.height / 2.0),
    ];

    if env.any_blocked(&probes) {
        if let Some((col, _)) = env.cell_coords(probes[0]) {
            body.bounds.x = CELL * (col + 1.0);
        }
        return true;
    }

    let swept = Rect::new(b.x + dx, b.y, b.width, b.height);
    if let Some(other) = env.first_blocker(&swept) {
        body.bounds.x = other.right();
        return true;
    }

    body.bounds.x += dx;
    body.direction = Direction::West;
    false
}

/// Water, world edges and fatal heights. Returns `(clamped_x, clamped_y)`.
fn limit_to_world(body: &mut Body, env: &Surroundings) -> (bool, bool) {
    let world = env.grid.bounds();
    let mut clamped_x = false;
    let mut clamped_y = false;

    if body.bounds.top() < env.grid.water_height {
        body.request_death();
    }

    if body.bounds.x < 0.0 {
        body.bounds.x = 0.0;
        clamped_x = true;
    }
    let east_limit = (world.width - body.bounds.width).max(0.0);
    if body.bounds.x > east_limit {
        body.bounds.x = east_limit;
        clamped_x = true;
    }

    if body.bounds.y < FLOOR_LIMIT {
        body.bounds.y = FLOOR_LIMIT;
        clamped_y = true;
        body.request_death();
    }
    if body.bounds.y > world.height + CELL {
        body.request_death();
    }

    (clamped_x, clamped_y)
}

// ══════════════════════════════════════════════════════════════
// Forces
// ══════════════════════════════════════════════════════════════

/// Apply and decay the horizontal force. The move runs even with zero
/// force, which resets `direction` every frame.
pub fn apply_horizontal_force(body: &mut Body, delta: f32, env: &Surroundings) {
    move_body(body, body.horizontal_force * delta, 0.0, env);

    if body.horizontal_force > 0.0 {
        body.horizontal_force = (body.horizontal_force - FORCE_DECAY * delta).max(0.0);
    } else {
        body.horizontal_force = (body.horizontal_force + FORCE_DECAY * delta).min(0.0);
    }
}

/// Jump pull towards an armed target, otherwise gravity.
pub fn apply_vertical_force(body: &mut Body, delta: f32, env: &Surroundings) {
    if body.ignore_gravity {
        return;
    }

    if body.jump_target_y > body.bounds.y {
        body.vertical_force = ((body.jump_target_y - body.bounds.y) * JUMP_PULL)
            .clamp(JUMP_FORCE_MIN, JUMP_FORCE_MAX);
        move_body(body, 0.0, body.vertical_force * delta, env);
        if body.bounds.y >= body.jump_target_y {
            body.set_vertical_force(0.0);
        }
    } else {
        body.vertical_force = (body.vertical_force - GRAVITY * delta).max(-MAX_FALL_SPEED);
        move_body(body, 0.0, body.vertical_force * delta, env);
    }

    if body.vertical_force == 0.0 {
        body.vertical_force = FALL_EPSILON;
    }
}
