//! Entity body: the generic physics and state fields every world object
//! carries. Type-specific logic lives in behaviours (`sim::behavior`);
//! the mover in `physics` is the only code that changes `bounds` during
//! a frame.

use serde::{Deserialize, Serialize};

use super::geom::{Rect, Vec2};
use super::physics::{FADE_RATE, JUMP_DISARMED, SCAN_MARGIN};
use super::tile::CELL;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Direction {
    None,
    East,
    West,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum EntityState {
    Standing,
    Running,
    Jumping,
    Falling,
    Hanging,
    Using,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum HAlign {
    Left,
    Center,
    Right,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum VAlign {
    Top,
    Center,
    Bottom,
}

/// Per-frame player controls, filled in by the input layer.
/// `left`/`right`/`jump` are level-triggered, `use_pressed` is an edge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlayerInput {
    pub left: bool,
    pub right: bool,
    pub jump: bool,
    pub use_pressed: bool,
}

#[derive(Clone, Debug)]
pub struct Body {
    /// Monotonic per world; 0 until the registry assigns one.
    pub id: u32,
    pub name: String,
    pub is_alive: bool,
    /// Fade factor, 0 = invisible.
    pub alpha: f32,
    pub bounds: Rect,
    pub score: i32,

    // ── Movement ──
    pub movement_speed: f32,
    /// Per-frame horizontal step derived from `movement_speed`.
    pub delta_speed: f32,
    pub jump_height: f32,
    pub jump_target_y: f32,
    pub horizontal_force: f32,
    pub vertical_force: f32,
    pub direction: Direction,
    pub state: EntityState,
    pub is_on_ground: bool,
    pub is_blocking_space: bool,
    pub ignore_gravity: bool,

    // ── Orientation ──
    pub h_align: HAlign,
    pub v_align: VAlign,

    // ── Power channel ──
    pub power_id: i32,
    pub is_power_on: bool,
    pub is_power_supported: bool,

    // ── Routine ──
    pub routine_mode: i32,
    /// Wall-clock deadline (ms) used by behaviours; shifted on resume.
    pub routine_timer: u64,

    // ── Frames ──
    pub frame_size: f32,
    pub current_frame: usize,
    pub frame_timer: u64,

    /// Set by the mover on fatal positions; the owning entity routes it
    /// through its behaviour before the frame continues.
    pub(crate) death_requested: bool,
}

impl Body {
    pub fn new(name: &str) -> Self {
        Body {
            id: 0,
            name: name.to_string(),
            is_alive: true,
            alpha: 0.0,
            bounds: Rect::new(0.0, 0.0, CELL, CELL),
            score: 0,
            movement_speed: 0.0,
            delta_speed: 0.0,
            jump_height: 0.0,
            jump_target_y: JUMP_DISARMED,
            horizontal_force: 0.0,
            vertical_force: 0.0,
            direction: Direction::East,
            state: EntityState::Standing,
            is_on_ground: false,
            is_blocking_space: true,
            ignore_gravity: false,
            h_align: HAlign::Center,
            v_align: VAlign::Bottom,
            power_id: 0,
            is_power_on: false,
            is_power_supported: false,
            routine_mode: 0,
            routine_timer: 0,
            frame_size: CELL,
            current_frame: 0,
            frame_timer: 0,
            death_requested: false,
        }
    }

    pub fn with_size(mut self, width: f32, height: f32) -> Self {
        self.bounds.width = width;
        self.bounds.height = height;
        self
    }

    /// Area searched for neighbouring entities each frame.
    pub fn scan_area(&self) -> Rect {
        self.bounds.expanded(SCAN_MARGIN)
    }

    pub fn center(&self) -> Vec2 {
        self.bounds.center()
    }

    /// Place the entity. With `center`, `(x, y)` is the middle of its
    /// frame rather than its bottom-left corner. Always cancels any
    /// pending jump.
    pub fn set_position(&mut self, x: f32, y: f32, center: bool) {
        if center {
            self.bounds.x = x - self.bounds.width / 2.0;
            self.bounds.y = y - self.frame_size / 2.0 + 1.0;
        } else {
            self.bounds.x = x;
            self.bounds.y = y;
        }
        self.set_vertical_force(0.0);
    }

    /// Also disarms the jump target.
    pub fn set_vertical_force(&mut self, force: f32) {
        self.vertical_force = force;
        self.jump_target_y = JUMP_DISARMED;
    }

    pub fn set_horizontal_force(&mut self, force: f32) {
        self.horizontal_force = force;
    }

    /// Arm a jump `height` units above the current position. Only
    /// grounded entities may jump unless `force` is set.
    pub fn jump(&mut self, height: f32, force: bool) {
        if force || self.is_on_ground {
            self.jump_target_y = self.bounds.y + height;
        }
    }

    pub fn jump_default(&mut self) {
        self.jump(self.jump_height, false);
    }

    pub fn request_death(&mut self) {
        self.death_requested = true;
    }

    pub(crate) fn take_death_request(&mut self) -> bool {
        std::mem::replace(&mut self.death_requested, false)
    }

    // ── Per-frame bookkeeping ──

    pub fn update_speed(&mut self, delta: f32) {
        self.delta_speed = self.movement_speed * delta * 10.0;
    }

    /// Derive the motion state from last frame's direction and force.
    pub fn update_state(&mut self) {
        if self.is_on_ground {
            self.state = match self.direction {
                Direction::None => EntityState::Standing,
                Direction::East | Direction::West => EntityState::Running,
            };
        } else if self.vertical_force > 0.0 {
            self.state = EntityState::Jumping;
        } else if self.vertical_force < 0.0 {
            self.state = EntityState::Falling;
        }
    }

    /// Fade in while alive, out while dead.
    pub fn fade(&mut self, delta: f32) {
        if self.is_alive {
            self.alpha = (self.alpha + delta * FADE_RATE).min(1.0);
        } else {
            self.alpha = (self.alpha - delta * FADE_RATE).max(0.0);
        }
    }
}
