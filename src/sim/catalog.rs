//! Built-in entity catalog and the factory that maps type keys to it.
//!
//! ## Keys
//!
//!   `player`         the controllable character
//!   `snail`          ground patrol, turns at ledges and walls
//!   `jumper`         hops whenever it lands
//!   `box`            blocking crate, deadly while falling
//!   `diamond`        collectable, 800 points
//!   `chocolate_bar`  collectable, 100 points
//!   `switch`         flips power on its channel when used
//!   `springboard`    launches falling entities that land on it
//!   `spikes_up`      solid from the sides, deadly from above
//!   `electric_trap`  powered, arcs every other 4 s
//!   `platform`       powered, cycles solid / fading / gone
//!   `treadmill_left` / `treadmill_right`  powered conveyors
//!
//! Keys are stable: world files store them.

use std::collections::HashMap;

use tracing::warn;

use crate::domain::entity::{Body, Direction, EntityState, HAlign, VAlign};
use crate::domain::geom::Vec2;
use crate::domain::tile::CELL;
use crate::error::WorldError;
use crate::sim::behavior::{Behavior, Entity, FrameCtx, WorldSignals};
use crate::sim::event::SoundCue;
use crate::sim::world::WorldState;

// ══════════════════════════════════════════════════════════════
// Factory
// ══════════════════════════════════════════════════════════════

type Constructor = Box<dyn Fn() -> Entity>;

/// Type key → constructor.
pub struct EntityFactory {
    constructors: HashMap<&'static str, Constructor>,
}

impl std::fmt::Debug for EntityFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityFactory")
            .field("keys", &self.keys())
            .finish()
    }
}

impl Default for EntityFactory {
    fn default() -> Self {
        EntityFactory::with_builtin()
    }
}

impl EntityFactory {
    /// A factory with no registered types.
    pub fn empty() -> Self {
        EntityFactory {
            constructors: HashMap::new(),
        }
    }

    pub fn with_builtin() -> Self {
        let mut f = EntityFactory::empty();
        f.register("player", player);
        f.register("snail", snail);
        f.register("jumper", jumper);
        f.register("box", crate_box);
        f.register("diamond", diamond);
        f.register("chocolate_bar", chocolate_bar);
        f.register("switch", switch);
        f.register("springboard", springboard);
        f.register("spikes_up", spikes_up);
        f.register("electric_trap", electric_trap);
        f.register("platform", platform);
        f.register("treadmill_left", treadmill_left);
        f.register("treadmill_right", treadmill_right);
        f
    }

    /// Add or replace a type.
    pub fn register(&mut self, key: &'static str, ctor: impl Fn() -> Entity + 'static) {
        self.constructors.insert(key, Box::new(ctor));
    }

    pub fn contains(&self, key: &str) -> bool {
        self.constructors.contains_key(key)
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<&'static str> {
        let mut keys: Vec<&'static str> = self.constructors.keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    pub fn create(&self, key: &str) -> Result<Entity, WorldError> {
        match self.constructors.get(key) {
            Some(ctor) => Ok(ctor()),
            None => {
                warn!(key, "unknown entity type");
                Err(WorldError::UnknownEntityType(key.to_string()))
            }
        }
    }
}

// ══════════════════════════════════════════════════════════════
// Constructors
// ══════════════════════════════════════════════════════════════

fn body(name: &str, width: f32, height: f32) -> Body {
    Body::new(name).with_size(width, height)
}

pub fn player() -> Entity {
    let mut b = body("Player", 42.0, 84.0);
    b.movement_speed = 22.0;
    b.frame_size = 96.0;
    b.jump_height = Player::MAX_JUMP_HEIGHT;
    b.is_blocking_space = false;
    Entity::new(b, Box::new(Player::new()))
}

pub fn snail() -> Entity {
    let mut b = body("Snail", 62.0, 54.0);
    b.movement_speed = 10.0;
    b.jump_height = 96.0;
    b.is_blocking_space = false;
    Entity::new(b, Box::new(Snail { heading: Direction::East }))
}

pub fn jumper() -> Entity {
    let mut b = body("Jumper", 50.0, 50.0);
    b.movement_speed = 10.0;
    b.jump_height = 180.0;
    b.is_blocking_space = false;
    Entity::new(b, Box::new(Jumper))
}

pub fn crate_box() -> Entity {
    let mut b = body("Box", 64.0, 64.0);
    b.jump_height = 96.0;
    Entity::new(b, Box::new(Crate))
}

fn collectable(name: &str, width: f32, height: f32, score: i32, key: &'static str) -> Entity {
    let mut b = body(name, width, height);
    b.score = score;
    b.ignore_gravity = true;
    b.is_blocking_space = false;
    b.h_align = HAlign::Center;
    b.v_align = VAlign::Center;
    Entity::new(b, Box::new(Collectable { key }))
}

pub fn diamond() -> Entity {
    collectable("Diamond", 64.0, 64.0, 800, "diamond")
}

pub fn chocolate_bar() -> Entity {
    collectable("Chocolate Bar", 46.0, 48.0, 100, "chocolate_bar")
}

pub fn switch() -> Entity {
    let mut b = body("Switch", 42.0, 64.0);
    b.jump_height = 64.0;
    b.is_blocking_space = false;
    b.is_power_supported = true;
    Entity::new(b, Box::new(Switch))
}

pub fn springboard() -> Entity {
    let mut b = body("Springboard", 64.0, 64.0);
    b.jump_height = 64.0;
    b.is_blocking_space = false;
    Entity::new(b, Box::new(Springboard))
}

pub fn spikes_up() -> Entity {
    let mut b = body("Spikes (up)", 50.0, 31.0);
    b.jump_height = 64.0;
    Entity::new(b, Box::new(SpikesUp))
}

pub fn electric_trap() -> Entity {
    let mut b = body("Electric Trap", 60.0, 54.0);
    b.jump_height = 64.0;
    b.is_blocking_space = false;
    b.is_power_supported = true;
    Entity::new(b, Box::new(ElectricTrap::default()))
}

pub fn platform() -> Entity {
    let mut b = body("Platform", 64.0, 64.0);
    b.ignore_gravity = true;
    b.is_power_supported = true;
    Entity::new(b, Box::new(Platform))
}

fn treadmill(name: &str, push: f32, key: &'static str) -> Entity {
    let mut b = body(name, 64.0, 64.0);
    b.is_power_supported = true;
    Entity::new(b, Box::new(Treadmill { push, key }))
}

pub fn treadmill_left() -> Entity {
    treadmill("Treadmill (left)", -Treadmill::PUSH, "treadmill_left")
}

pub fn treadmill_right() -> Entity {
    treadmill("Treadmill (right)", Treadmill::PUSH, "treadmill_right")
}

// ══════════════════════════════════════════════════════════════
// Player
// ══════════════════════════════════════════════════════════════

/// Input-driven character with a variable-height jump and a scripted
/// death: it freezes, then drops off the bottom of the screen.
#[derive(Debug)]
pub struct Player {
    jump_key_down: bool,
    current_jump_height: f32,
    step_timer: u64,
    step_variant: u8,
    death_anim_y: f32,
    death_anim_force: f32,
    last_dir: Direction,
}

impl Player {
    pub const MIN_JUMP_HEIGHT: f32 = 62.0;
    pub const MAX_JUMP_HEIGHT: f32 = 152.0;

    pub const ALIVE: i32 = 0;
    pub const DEATH_INIT: i32 = 1;
    pub const DEATH: i32 = 2;

    const DEATH_DELAY_MS: u64 = 1500;
    const STEP_INTERVAL_MS: u64 = 200;
    const STEP_VARIANTS: u8 = 4;

    pub fn new() -> Self {
        Player {
            jump_key_down: false,
            current_jump_height: 0.0,
            step_timer: 0,
            step_variant: 0,
            death_anim_y: 0.0,
            death_anim_force: 0.0,
            last_dir: Direction::East,
        }
    }

    fn init_death(&mut self, body: &mut Body, ctx: &mut FrameCtx) {
        body.routine_timer = ctx.now_ms() + Self::DEATH_DELAY_MS;
        body.ignore_gravity = true;
        body.routine_mode = Self::DEATH;
        self.death_anim_force = 0.0;
        self.death_anim_y = body.bounds.y;
        ctx.signals.play_ui(SoundCue::Lose);
    }

    fn run_death(&mut self, body: &mut Body, ctx: &mut FrameCtx) {
        if body.routine_timer > ctx.now_ms() {
            return;
        }
        self.death_anim_force += 10.0 * ctx.delta();
        self.death_anim_y -= self.death_anim_force;

        let below_view = ctx.signals.view.y - body.frame_size * 2.0 * ctx.signals.zoom;
        if self.death_anim_y < below_view || self.death_anim_y < -body.frame_size * 2.0 {
            body.is_alive = false;
        }
    }

    fn handle_input(&mut self, body: &mut Body, ctx: &mut FrameCtx) {
        let input = ctx.signals.input;

        if input.right {
            ctx.move_east(body);
        } else if input.left {
            ctx.move_west(body);
        }

        if input.use_pressed {
            for &h in ctx.neighbors() {
                let touching = ctx
                    .neighbor(h)
                    .is_some_and(|o| body.bounds.overlaps(&o.body.bounds));
                if touching {
                    ctx.use_entity(h);
                }
            }
        }

        if input.jump {
            if body.state != EntityState::Jumping {
                self.jump_key_down = true;
                self.current_jump_height = Self::MIN_JUMP_HEIGHT;
                body.jump(Self::MIN_JUMP_HEIGHT, false);
            }
            if self.jump_key_down && self.current_jump_height <= Self::MAX_JUMP_HEIGHT {
                let mut extra = body.vertical_force * ctx.delta();
                if self.current_jump_height + extra > Self::MAX_JUMP_HEIGHT {
                    extra = Self::MAX_JUMP_HEIGHT - self.current_jump_height;
                }
                body.jump_target_y += extra;
                self.current_jump_height += extra;
            }
        } else {
            self.jump_key_down = false;
        }
    }
}

impl Default for Player {
    fn default() -> Self {
        Player::new()
    }
}

impl Behavior for Player {
    fn type_key(&self) -> &'static str {
        "player"
    }

    fn act(&mut self, body: &mut Body, ctx: &mut FrameCtx) {
        if body.routine_mode == Self::DEATH_INIT {
            self.init_death(body, ctx);
        }
        if body.routine_mode == Self::DEATH {
            self.run_death(body, ctx);
        }
        if body.routine_mode == Self::ALIVE {
            self.handle_input(body, ctx);
        }

        let now = ctx.now_ms();
        let running = body.state == EntityState::Running && self.step_timer < now;
        let landing = body.state == EntityState::Falling && body.is_on_ground;
        if running || landing {
            self.step_timer = now + Self::STEP_INTERVAL_MS;
            self.step_variant = (self.step_variant + 1) % Self::STEP_VARIANTS;
            ctx.signals
                .play(SoundCue::PlayerStep(self.step_variant), body.bounds);
        }
    }

    /// Live: start the death sequence once. Editor: die at once.
    fn on_killed(&mut self, body: &mut Body, signals: &mut WorldSignals) {
        if signals.is_live {
            if body.routine_mode == Self::ALIVE {
                body.routine_mode = Self::DEATH_INIT;
                signals.set_state(WorldState::PlayerDies);
            }
        } else {
            body.is_alive = false;
        }
    }

    fn pick_frame(&mut self, body: &mut Body, now_ms: u64) {
        if body.routine_mode != Self::ALIVE {
            body.current_frame = 3;
            return;
        }

        match body.state {
            EntityState::Running => {
                if body.frame_timer < now_ms {
                    body.frame_timer = now_ms + 30;
                    body.current_frame += 1;
                }
                let (first, last) = match body.direction {
                    Direction::West => (22, 35),
                    _ => (8, 21),
                };
                if body.current_frame < first || body.current_frame > last {
                    body.current_frame = first;
                }
            }
            EntityState::Standing => {
                if body.current_frame > 2 {
                    body.current_frame = 0;
                }
                if body.frame_timer < now_ms {
                    body.current_frame = (body.current_frame + 1) % 3;
                    body.frame_timer = now_ms + 1200;
                }
            }
            EntityState::Jumping => {
                body.current_frame = if self.last_dir == Direction::West { 6 } else { 4 };
            }
            EntityState::Falling => {
                body.current_frame = if self.last_dir == Direction::West { 7 } else { 5 };
            }
            EntityState::Hanging | EntityState::Using => {}
        }

        if body.direction != Direction::None {
            self.last_dir = body.direction;
        }
    }

    fn sprite_position(&self, body: &Body) -> Vec2 {
        if body.routine_mode == Self::DEATH {
            Vec2::new(body.bounds.x, self.death_anim_y)
        } else {
            Vec2::new(body.bounds.x, body.bounds.y)
        }
    }
}

// ══════════════════════════════════════════════════════════════
// Creatures
// ══════════════════════════════════════════════════════════════

#[derive(Debug)]
pub struct Snail {
    heading: Direction,
}

impl Behavior for Snail {
    fn type_key(&self) -> &'static str {
        "snail"
    }

    fn act(&mut self, body: &mut Body, ctx: &mut FrameCtx) {
        if !body.is_on_ground {
            return;
        }
        let probe_y = body.bounds.y - CELL / 2.0;
        match self.heading {
            Direction::East => {
                let ground_ahead = ctx.grid.is_blocked_at(body.bounds.right(), probe_y);
                if !ground_ahead || !ctx.move_east(body) {
                    self.heading = Direction::West;
                }
            }
            Direction::West => {
                let ground_ahead = ctx.grid.is_blocked_at(body.bounds.x, probe_y);
                if !ground_ahead || !ctx.move_west(body) {
                    self.heading = Direction::East;
                }
            }
            Direction::None => {}
        }
    }

    fn on_player_collision(&mut self, _body: &mut Body, ctx: &mut FrameCtx) {
        ctx.kill_player();
    }

    fn pick_frame(&mut self, body: &mut Body, _now_ms: u64) {
        match body.direction {
            Direction::East => body.current_frame = 0,
            Direction::West => body.current_frame = 1,
            Direction::None => {}
        }
    }
}

#[derive(Debug)]
pub struct Jumper;

impl Behavior for Jumper {
    fn type_key(&self) -> &'static str {
        "jumper"
    }

    fn act(&mut self, body: &mut Body, _ctx: &mut FrameCtx) {
        if body.is_on_ground {
            body.jump_default();
        }
    }

    fn on_player_collision(&mut self, _body: &mut Body, ctx: &mut FrameCtx) {
        ctx.kill_player();
    }

    fn pick_frame(&mut self, body: &mut Body, _now_ms: u64) {
        body.current_frame = if body.is_on_ground { 0 } else { 1 };
    }
}

// ══════════════════════════════════════════════════════════════
// Items
// ══════════════════════════════════════════════════════════════

#[derive(Debug)]
pub struct Collectable {
    key: &'static str,
}

impl Behavior for Collectable {
    fn type_key(&self) -> &'static str {
        self.key
    }

    fn on_player_collision(&mut self, body: &mut Body, ctx: &mut FrameCtx) {
        body.is_alive = false;
        ctx.signals.add_score(body.score);
        ctx.signals.add_popup(body.score.to_string(), body.center());
        ctx.signals.play_ui(SoundCue::Collect);
    }
}

// ══════════════════════════════════════════════════════════════
// Machines
// ══════════════════════════════════════════════════════════════

#[derive(Debug)]
pub struct Crate;

impl Behavior for Crate {
    fn type_key(&self) -> &'static str {
        "box"
    }

    fn on_player_collision(&mut self, body: &mut Body, ctx: &mut FrameCtx) {
        if body.state == EntityState::Falling {
            ctx.kill_player();
        }
    }
}

#[derive(Debug)]
pub struct Switch;

impl Behavior for Switch {
    fn type_key(&self) -> &'static str {
        "switch"
    }

    /// Flips every entity on this channel, itself included.
    fn on_use(&mut self, body: &mut Body, signals: &mut WorldSignals) -> bool {
        let turning_on = !body.is_power_on;
        signals.toggle_power(body.power_id);
        let (cue, text) = if turning_on {
            (SoundCue::SwitchOn, "on")
        } else {
            (SoundCue::SwitchOff, "off")
        };
        signals.play(cue, body.bounds);
        signals.add_popup(text, body.center());
        true
    }

    fn pick_frame(&mut self, body: &mut Body, _now_ms: u64) {
        body.current_frame = if body.is_power_on { 4 } else { 0 };
    }
}

#[derive(Debug)]
pub struct Springboard;

impl Behavior for Springboard {
    fn type_key(&self) -> &'static str {
        "springboard"
    }

    fn act(&mut self, body: &mut Body, ctx: &mut FrameCtx) {
        let top = body.bounds.top();
        let (left, right) = (body.bounds.x, body.bounds.right());
        let catch_from = top - body.frame_size / 2.0;

        for &h in ctx.neighbors() {
            if h == ctx.me {
                continue;
            }
            let launched = match ctx.neighbor_mut(h) {
                Some(other) => {
                    let o = other.body.bounds;
                    let on_top = o.y >= catch_from && o.y <= top + 4.0;
                    let above = o.right() > left && o.x < right;
                    if on_top && above && other.body.state == EntityState::Falling {
                        other.body.bounds.y = top;
                        let height = other.body.jump_height * 2.5;
                        other.body.jump(height, true);
                        true
                    } else {
                        false
                    }
                }
                None => false,
            };
            if launched {
                body.current_frame = 7;
                ctx.signals.play(SoundCue::Springboard, body.bounds);
            }
        }
    }

    fn pick_frame(&mut self, body: &mut Body, _now_ms: u64) {
        if body.current_frame > 0 {
            body.current_frame -= 1;
        }
    }
}

#[derive(Debug)]
pub struct SpikesUp;

impl Behavior for SpikesUp {
    fn type_key(&self) -> &'static str {
        "spikes_up"
    }

    /// Solid for a player beside the spikes, passable (and deadly) for
    /// one directly above them.
    fn act(&mut self, body: &mut Body, ctx: &mut FrameCtx) {
        if let Some(p) = ctx.player_bounds() {
            if p.overlaps(&body.scan_area()) {
                body.is_blocking_space = p.right() <= body.bounds.x || p.x >= body.bounds.right();
            }
        }
    }

    fn on_player_collision(&mut self, _body: &mut Body, ctx: &mut FrameCtx) {
        ctx.kill_player();
    }
}

#[derive(Debug, Default)]
pub struct ElectricTrap {
    sound_timer: u64,
    sound_variant: u8,
}

impl ElectricTrap {
    pub const ENABLED: i32 = 0;
    pub const DISABLED: i32 = 1;
    const PERIOD_MS: u64 = 4000;
    const SOUND_GAPS_MS: [u64; 5] = [2000, 5000, 8000, 3500, 6500];
}

impl Behavior for ElectricTrap {
    fn type_key(&self) -> &'static str {
        "electric_trap"
    }

    fn act(&mut self, body: &mut Body, ctx: &mut FrameCtx) {
        let now = ctx.now_ms();
        if body.routine_timer == 0 {
            body.routine_timer = now + Self::PERIOD_MS;
        }

        if body.is_power_on && body.routine_mode == Self::ENABLED && self.sound_timer < now {
            let gap = Self::SOUND_GAPS_MS[self.sound_variant as usize % Self::SOUND_GAPS_MS.len()];
            self.sound_timer = now + gap;
            ctx.signals
                .play(SoundCue::ElectricTrap(self.sound_variant % 3), body.bounds);
            self.sound_variant = self.sound_variant.wrapping_add(1);
        }

        if body.is_power_on && body.routine_timer < now {
            body.routine_timer = now + Self::PERIOD_MS;
            body.routine_mode = if body.routine_mode == Self::ENABLED {
                Self::DISABLED
            } else {
                Self::ENABLED
            };
        }

        if !body.is_power_on {
            body.routine_mode = Self::DISABLED;
        }
    }

    fn on_player_collision(&mut self, body: &mut Body, ctx: &mut FrameCtx) {
        if body.routine_mode == Self::ENABLED {
            ctx.kill_player();
        }
    }

    fn pick_frame(&mut self, body: &mut Body, now_ms: u64) {
        if body.routine_mode != Self::ENABLED {
            body.current_frame = 0;
        } else if body.frame_timer < now_ms {
            body.frame_timer = now_ms + 50;
            body.current_frame = if body.current_frame >= 3 { 1 } else { body.current_frame + 1 };
        }
    }
}

#[derive(Debug)]
pub struct Platform;

impl Platform {
    pub const ON: i32 = 0;
    pub const TRANSITION: i32 = 1;
    pub const OFF: i32 = 2;
    const ON_MS: u64 = 5000;
    const TRANSITION_MS: u64 = 3000;
    const OFF_MS: u64 = 5000;
}

impl Behavior for Platform {
    fn type_key(&self) -> &'static str {
        "platform"
    }

    fn act(&mut self, body: &mut Body, ctx: &mut FrameCtx) {
        let now = ctx.now_ms();
        if body.is_power_on {
            if body.routine_timer < now {
                let (mode, hold) = match body.routine_mode {
                    Self::OFF => (Self::ON, Self::ON_MS),
                    Self::ON => (Self::TRANSITION, Self::TRANSITION_MS),
                    _ => (Self::OFF, Self::OFF_MS),
                };
                body.routine_mode = mode;
                body.routine_timer = now + hold;
            }
        } else {
            body.routine_mode = Self::OFF;
        }
        body.is_blocking_space = body.routine_mode != Self::OFF;
    }

    fn update_alpha(&mut self, body: &mut Body, delta: f32) {
        match body.routine_mode {
            Self::ON => body.alpha = (body.alpha + delta * 2.0).min(1.0),
            Self::TRANSITION => body.alpha = (body.alpha - delta).max(0.75),
            _ => body.alpha = (body.alpha - delta).max(0.25),
        }
        if !body.is_power_on {
            body.alpha = 0.04;
        }
    }
}

#[derive(Debug)]
pub struct Treadmill {
    push: f32,
    key: &'static str,
}

impl Treadmill {
    pub const PUSH: f32 = 120.0;
}

impl Behavior for Treadmill {
    fn type_key(&self) -> &'static str {
        self.key
    }

    fn act(&mut self, body: &mut Body, ctx: &mut FrameCtx) {
        if !body.is_power_on {
            return;
        }
        let top = body.bounds.top();
        for &h in ctx.neighbors() {
            if h == ctx.me {
                continue;
            }
            if let Some(other) = ctx.neighbor_mut(h) {
                if other.body.is_on_ground && other.body.bounds.y == top {
                    other.body.set_horizontal_force(self.push);
                }
            }
        }
    }

    fn on_player_collision(&mut self, body: &mut Body, ctx: &mut FrameCtx) {
        if body.state == EntityState::Falling {
            ctx.kill_player();
        }
    }

    fn pick_frame(&mut self, body: &mut Body, now_ms: u64) {
        if body.is_power_on && body.frame_timer < now_ms {
            body.frame_timer = now_ms + 50;
            body.current_frame += 1;
            if body.current_frame > 7 {
                body.current_frame = 2;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::geom::Rect;
    use crate::domain::grid::TileGrid;
    use crate::domain::physics::JUMP_DISARMED;
    use crate::sim::event::GameEvent;
    use crate::sim::registry::{EntityHandle, EntityRegistry};

    /// A floor along row 0 plus a registry and signals to run turns in.
    struct Stage {
        grid: TileGrid,
        reg: EntityRegistry,
        signals: WorldSignals,
        factory: EntityFactory,
    }

    impl Stage {
        fn new(columns: usize, rows: usize) -> Self {
            let mut grid = TileGrid::with_size(columns, rows);
            for col in 0..columns as i32 {
                grid.set_tile_set(col, 0, 0);
            }
            let mut signals = WorldSignals::new();
            signals.now_ms = 1000;
            signals.delta = 0.016;
            signals.view = Rect::new(0.0, 0.0, columns as f32 * CELL, rows as f32 * CELL);
            Stage {
                grid,
                reg: EntityRegistry::new(),
                signals,
                factory: EntityFactory::with_builtin(),
            }
        }

        fn add(&mut self, key: &str, x: f32, y: f32) -> EntityHandle {
            let mut e = self.factory.create(key).expect("builtin key");
            e.body.bounds.x = x;
            e.body.bounds.y = y;
            self.reg.insert(e)
        }

        fn add_player(&mut self, x: f32, y: f32) -> EntityHandle {
            let h = self.add("player", x, y);
            self.reg.set_player(Some(h));
            h
        }

        fn turn(&mut self, h: EntityHandle) {
            let Some(mut actor) = self.reg.take(h) else {
                return;
            };
            let surrounding = self.reg.overlapping(actor.body.scan_area());
            let mut ctx = FrameCtx::new(h, &self.grid, &mut self.reg, &surrounding, &mut self.signals);
            actor.update(&mut ctx);
            self.reg.restore(h, actor);
            for id in self.signals.power_toggles.drain(..) {
                self.reg.toggle_power(id);
            }
        }

        fn frame(&mut self, ms: u64) {
            self.signals.now_ms += ms;
            for h in self.reg.handles() {
                if self.reg.get(h).is_some_and(|e| e.body.is_alive) {
                    self.turn(h);
                }
            }
        }

        fn body(&self, h: EntityHandle) -> Body {
            self.reg.get(h).map(|e| e.body.clone()).expect("entity present")
        }

        fn body_mut(&mut self, h: EntityHandle) -> &mut Body {
            &mut self.reg.get_mut(h).expect("entity present").body
        }
    }

    // ── Factory ──

    #[test]
    fn unknown_key_is_an_error() {
        let f = EntityFactory::with_builtin();
        match f.create("dragon") {
            Err(WorldError::UnknownEntityType(key)) => assert_eq!(key, "dragon"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(!f.contains("dragon"));
    }

    #[test]
    fn every_key_builds_its_own_type() {
        let f = EntityFactory::with_builtin();
        assert_eq!(f.keys().len(), 13);
        for key in f.keys() {
            let e = f.create(key).expect("registered");
            assert_eq!(e.type_key(), key);
            assert!(e.body.is_alive);
            assert_eq!(e.body.id, 0);
        }
    }

    #[test]
    fn register_adds_custom_types() {
        let mut f = EntityFactory::empty();
        assert!(f.create("box").is_err());
        f.register("box", crate_box);
        assert!(f.create("box").is_ok());
    }

    // ── Player ──

    #[test]
    fn player_walks_on_input() {
        let mut st = Stage::new(10, 6);
        let p = st.add_player(128.0, 64.0);
        st.signals.input.right = true;
        st.frame(16);
        let b = st.body(p);
        assert!(b.bounds.x > 128.0);
        st.signals.input.right = false;
        st.signals.input.left = true;
        st.frame(16);
        assert!(st.body(p).bounds.x < b.bounds.x);
    }

    #[test]
    fn held_jump_extends_up_to_the_maximum() {
        let mut st = Stage::new(10, 10);
        let p = st.add_player(128.0, 64.0);
        st.frame(16);
        assert!(st.body(p).is_on_ground);

        st.signals.input.jump = true;
        let mut peak: f32 = 0.0;
        for _ in 0..120 {
            st.frame(16);
            peak = peak.max(st.body(p).bounds.y);
        }
        let held = peak - 64.0;
        assert!(held > Player::MIN_JUMP_HEIGHT + 10.0, "held jump rose {held}");
        assert!(held <= Player::MAX_JUMP_HEIGHT + 4.0, "held jump rose {held}");
    }

    #[test]
    fn tapped_jump_stays_low() {
        let mut st = Stage::new(10, 10);
        let p = st.add_player(128.0, 64.0);
        st.frame(16);
        st.signals.input.jump = true;
        st.frame(16);
        st.signals.input.jump = false;
        let mut peak: f32 = 0.0;
        for _ in 0..120 {
            st.frame(16);
            peak = peak.max(st.body(p).bounds.y);
        }
        assert!(peak - 64.0 < Player::MIN_JUMP_HEIGHT + 10.0);
    }

    #[test]
    fn live_death_runs_a_sequence() {
        let mut st = Stage::new(10, 6);
        let p = st.add_player(128.0, 64.0);
        let snail = st.add("snail", 140.0, 64.0);
        st.frame(16);
        assert_eq!(st.signals.state, WorldState::PlayerDies);
        let b = st.body(p);
        assert!(b.is_alive);
        assert_eq!(b.routine_mode, Player::DEATH_INIT);

        // Next turn starts the sequence and freezes the body.
        st.frame(16);
        let b = st.body(p);
        assert_eq!(b.routine_mode, Player::DEATH);
        assert!(b.ignore_gravity);
        assert_eq!(b.current_frame, 3);
        assert!(st.signals.events.contains(&GameEvent::UiSound { cue: SoundCue::Lose }));

        // Nothing happens during the delay.
        st.frame(1000);
        assert!(st.body(p).is_alive);

        st.body_mut(snail).is_alive = false;
        for _ in 0..200 {
            st.frame(16);
        }
        assert!(!st.body(p).is_alive);
    }

    #[test]
    fn editor_kill_is_immediate() {
        let mut st = Stage::new(10, 6);
        st.signals.is_live = false;
        let p = st.add_player(128.0, 64.0);
        if let Some(e) = st.reg.get_mut(p) {
            e.kill(&mut st.signals);
        }
        assert!(!st.body(p).is_alive);
        assert_eq!(st.signals.state, WorldState::Playing);
    }

    #[test]
    fn use_key_flips_overlapping_switch() {
        let mut st = Stage::new(10, 6);
        let sw = st.add("switch", 128.0, 64.0);
        let lamp = st.add("platform", 400.0, 200.0);
        st.body_mut(sw).power_id = 2;
        st.body_mut(lamp).power_id = 2;
        let p = st.add_player(130.0, 64.0);
        st.signals.input.use_pressed = true;
        st.turn(p);
        assert!(st.body(sw).is_power_on);
        assert!(st.body(lamp).is_power_on);
        assert_eq!(st.signals.popups.last().map(|p| p.text.as_str()), Some("on"));
    }

    // ── Creatures ──

    #[test]
    fn snail_turns_at_ledge() {
        let mut st = Stage::new(10, 6);
        // Remove floor under columns 4 and up.
        for col in 4..10 {
            st.grid.set_tile_set(col, 0, -1);
        }
        let s = st.add("snail", 150.0, 64.0);
        let mut turned = false;
        for _ in 0..200 {
            st.frame(16);
            if st.body(s).direction == Direction::West {
                turned = true;
                break;
            }
        }
        assert!(turned);
        assert!(st.body(s).bounds.right() <= 4.0 * CELL + 2.0);
        assert!(st.body(s).is_on_ground);
    }

    #[test]
    fn snail_kills_touching_player() {
        let mut st = Stage::new(10, 6);
        let s = st.add("snail", 200.0, 64.0);
        let p = st.add_player(210.0, 64.0);
        st.turn(s);
        assert_eq!(st.body(p).routine_mode, Player::DEATH_INIT);
    }

    #[test]
    fn jumper_leaves_the_ground() {
        let mut st = Stage::new(10, 10);
        let j = st.add("jumper", 128.0, 64.0);
        st.frame(16);
        st.frame(16);
        let mut peak: f32 = 0.0;
        for _ in 0..60 {
            st.frame(16);
            peak = peak.max(st.body(j).bounds.y);
        }
        assert!(peak > 150.0);
    }

    // ── Items ──

    #[test]
    fn collecting_scores_once() {
        let mut st = Stage::new(10, 6);
        let d = st.add("diamond", 128.0, 64.0);
        st.add_player(130.0, 64.0);
        st.frame(16);
        assert!(!st.body(d).is_alive);
        assert_eq!(st.signals.score, 800);
        assert_eq!(st.signals.popups.len(), 1);
        assert_eq!(st.signals.popups[0].text, "800");
        st.frame(16);
        assert_eq!(st.signals.score, 800);
    }

    #[test]
    fn collectables_float() {
        let mut st = Stage::new(10, 6);
        let c = st.add("chocolate_bar", 128.0, 200.0);
        st.frame(16);
        assert_eq!(st.body(c).bounds.y, 200.0);
    }

    // ── Machines ──

    #[test]
    fn falling_box_kills_player_resting_box_does_not() {
        let mut st = Stage::new(10, 6);
        let b = st.add("box", 128.0, 64.0);
        let p = st.add_player(140.0, 64.0);
        st.turn(b);
        assert_eq!(st.body(p).routine_mode, Player::ALIVE);

        st.body_mut(b).bounds.y = 120.0;
        st.body_mut(b).vertical_force = -100.0;
        st.body_mut(b).is_on_ground = false;
        st.turn(b);
        assert_eq!(st.body(p).routine_mode, Player::DEATH_INIT);
    }

    #[test]
    fn springboard_launches_falling_entity() {
        let mut st = Stage::new(10, 12);
        let sb = st.add("springboard", 128.0, 64.0);
        let crate_h = st.add("box", 128.0, 140.0);
        st.body_mut(crate_h).state = EntityState::Falling;
        st.body_mut(crate_h).bounds.y = 130.0;
        st.turn(sb);
        let b = st.body(crate_h);
        assert_eq!(b.bounds.y, 128.0);
        assert_eq!(b.jump_target_y, 128.0 + 96.0 * 2.5);
        assert!(st
            .signals
            .events
            .iter()
            .any(|e| matches!(e, GameEvent::Sound { cue: SoundCue::Springboard, .. })));
    }

    #[test]
    fn springboard_ignores_standing_entities() {
        let mut st = Stage::new(10, 12);
        let sb = st.add("springboard", 128.0, 64.0);
        let crate_h = st.add("box", 128.0, 128.0);
        st.body_mut(crate_h).state = EntityState::Standing;
        st.turn(sb);
        assert_eq!(st.body(crate_h).jump_target_y, JUMP_DISARMED);
    }

    #[test]
    fn spikes_block_from_the_side_only() {
        let mut st = Stage::new(10, 6);
        let s = st.add("spikes_up", 200.0, 64.0);
        let p = st.add_player(150.0, 64.0);
        st.turn(s);
        assert!(st.body(s).is_blocking_space);

        st.body_mut(p).bounds.x = 210.0;
        st.body_mut(p).bounds.y = 90.0;
        st.turn(s);
        assert!(!st.body(s).is_blocking_space);
    }

    #[test]
    fn electric_trap_alternates_while_powered() {
        let mut st = Stage::new(10, 6);
        let t = st.add("electric_trap", 300.0, 64.0);
        st.body_mut(t).is_power_on = true;
        st.turn(t);
        let b = st.body(t);
        assert_eq!(b.routine_timer, 1000 + 4000);
        assert_eq!(b.routine_mode, ElectricTrap::ENABLED);

        st.signals.now_ms = 5001;
        st.turn(t);
        assert_eq!(st.body(t).routine_mode, ElectricTrap::DISABLED);
        st.signals.now_ms = 9002;
        st.turn(t);
        assert_eq!(st.body(t).routine_mode, ElectricTrap::ENABLED);

        st.body_mut(t).routine_mode = ElectricTrap::ENABLED;
        st.body_mut(t).is_power_on = false;
        st.turn(t);
        assert_eq!(st.body(t).routine_mode, ElectricTrap::DISABLED);
    }

    #[test]
    fn enabled_trap_kills_player() {
        let mut st = Stage::new(10, 6);
        let t = st.add("electric_trap", 200.0, 64.0);
        let p = st.add_player(210.0, 64.0);
        st.turn(t);
        assert_eq!(st.body(p).routine_mode, Player::ALIVE);
        st.body_mut(t).is_power_on = true;
        st.body_mut(t).routine_mode = ElectricTrap::ENABLED;
        st.body_mut(t).routine_timer = 99_999;
        st.turn(t);
        assert_eq!(st.body(p).routine_mode, Player::DEATH_INIT);
    }

    #[test]
    fn platform_cycles_and_stops_blocking_when_off() {
        let mut st = Stage::new(10, 6);
        let pl = st.add("platform", 300.0, 200.0);
        st.turn(pl);
        assert_eq!(st.body(pl).routine_mode, Platform::OFF);
        assert!(!st.body(pl).is_blocking_space);

        st.body_mut(pl).is_power_on = true;
        st.body_mut(pl).routine_mode = Platform::ON;
        st.turn(pl);
        assert_eq!(st.body(pl).routine_mode, Platform::TRANSITION);
        assert_eq!(st.body(pl).routine_timer, 1000 + 3000);
        assert!(st.body(pl).is_blocking_space);

        st.signals.now_ms = 4001;
        st.turn(pl);
        assert_eq!(st.body(pl).routine_mode, Platform::OFF);
        assert!(!st.body(pl).is_blocking_space);

        st.signals.now_ms = 9002;
        st.turn(pl);
        assert_eq!(st.body(pl).routine_mode, Platform::ON);
    }

    #[test]
    fn platform_alpha_follows_mode() {
        let mut e = platform();
        e.update_alpha(0.1);
        assert_eq!(e.body.alpha, 0.04);
        e.body.is_power_on = true;
        e.body.alpha = 1.0;
        e.body.routine_mode = Platform::TRANSITION;
        for _ in 0..10 {
            e.update_alpha(0.1);
        }
        assert_eq!(e.body.alpha, 0.75);
        e.body.routine_mode = Platform::OFF;
        for _ in 0..10 {
            e.update_alpha(0.1);
        }
        assert_eq!(e.body.alpha, 0.25);
        e.body.routine_mode = Platform::ON;
        for _ in 0..10 {
            e.update_alpha(0.1);
        }
        assert_eq!(e.body.alpha, 1.0);
    }

    #[test]
    fn treadmill_pushes_riders_when_powered() {
        let mut st = Stage::new(10, 6);
        let tm = st.add("treadmill_left", 128.0, 64.0);
        let rider = st.add("box", 128.0, 128.0);
        st.body_mut(rider).is_on_ground = true;
        st.turn(tm);
        assert_eq!(st.body(rider).horizontal_force, 0.0);

        st.body_mut(tm).is_power_on = true;
        st.turn(tm);
        assert_eq!(st.body(rider).horizontal_force, -Treadmill::PUSH);

        let tr = st.add("treadmill_right", 300.0, 64.0);
        let other = st.add("box", 300.0, 128.0);
        st.body_mut(tr).is_power_on = true;
        st.body_mut(other).is_on_ground = true;
        st.turn(tr);
        assert_eq!(st.body(other).horizontal_force, Treadmill::PUSH);
    }
}
