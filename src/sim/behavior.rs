//! Entities and the behaviour seam.
//!
//! ## Shape
//!
//! Every world object is an [`Entity`]: a shared physics [`Body`] plus a
//! boxed [`Behavior`] holding the type-specific logic and private state.
//! Splitting the two lets a behaviour mutate its own body while the
//! frame context borrows the rest of the world.
//!
//! ## Frame context
//!
//! [`FrameCtx`] is everything an entity may touch during its turn: the
//! grid, the other entities (the acting one is taken out of the
//! registry), its neighbour list and the [`WorldSignals`] sink for score,
//! popups, sounds and state changes.
//!
//! ## Deaths
//!
//! Nothing sets `is_alive` on another entity directly. The mover
//! requests a death on the body, other entities call
//! [`FrameCtx::kill`], and both end up in [`Behavior::on_killed`] so the
//! player can run its death sequence instead of vanishing.

use std::fmt;

use tracing::info;

use crate::domain::entity::{Body, PlayerInput};
use crate::domain::geom::{Rect, Vec2};
use crate::domain::grid::TileGrid;
use crate::domain::physics::{self, Surroundings};
use crate::sim::event::{GameEvent, Popup, SoundCue};
use crate::sim::registry::{EntityHandle, EntityRegistry};
use crate::sim::world::WorldState;

// ══════════════════════════════════════════════════════════════
// World signals
// ══════════════════════════════════════════════════════════════

/// Per-frame world inputs and the outputs entities write back.
#[derive(Debug)]
pub struct WorldSignals {
    pub now_ms: u64,
    /// Frame time in seconds.
    pub delta: f32,
    pub is_live: bool,
    pub input: PlayerInput,
    /// Visible world area, for effects tied to the screen edge.
    pub view: Rect,
    pub zoom: f32,
    pub score: i32,
    pub state: WorldState,
    pub popups: Vec<Popup>,
    pub events: Vec<GameEvent>,
    /// Channels to flip once the acting entity's turn is over.
    pub power_toggles: Vec<i32>,
}

impl WorldSignals {
    pub fn new() -> Self {
        WorldSignals {
            now_ms: 0,
            delta: 0.0,
            is_live: true,
            input: PlayerInput::default(),
            view: Rect::default(),
            zoom: 1.0,
            score: 0,
            state: WorldState::Playing,
            popups: Vec::new(),
            events: Vec::new(),
            power_toggles: Vec::new(),
        }
    }

    pub fn add_score(&mut self, amount: i32) {
        self.score += amount;
        self.events.push(GameEvent::ScoreAdded {
            amount,
            total: self.score,
        });
    }

    pub fn add_popup(&mut self, text: impl Into<String>, position: Vec2) {
        self.popups.push(Popup::new(text, position));
    }

    /// Positional sound at `source`.
    pub fn play(&mut self, cue: SoundCue, source: Rect) {
        self.events.push(GameEvent::Sound { cue, source });
    }

    pub fn play_ui(&mut self, cue: SoundCue) {
        self.events.push(GameEvent::UiSound { cue });
    }

    pub fn set_state(&mut self, to: WorldState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        info!(?from, ?to, "world state changed");
        self.events.push(GameEvent::StateChanged { from, to });
    }

    pub fn toggle_power(&mut self, power_id: i32) {
        self.power_toggles.push(power_id);
    }
}

impl Default for WorldSignals {
    fn default() -> Self {
        WorldSignals::new()
    }
}

// ══════════════════════════════════════════════════════════════
// Behaviour trait
// ══════════════════════════════════════════════════════════════

/// Type-specific logic. Every hook has a default so simple objects only
/// override what they need.
pub trait Behavior: fmt::Debug {
    /// Stable factory key, also written to world files.
    fn type_key(&self) -> &'static str;

    /// Runs once per frame after forces are applied.
    fn act(&mut self, _body: &mut Body, _ctx: &mut FrameCtx) {}

    /// Runs when the player's bounds overlap this entity (live mode only).
    fn on_player_collision(&mut self, _body: &mut Body, _ctx: &mut FrameCtx) {}

    /// The player pressed use while overlapping this entity.
    fn on_use(&mut self, _body: &mut Body, _signals: &mut WorldSignals) -> bool {
        true
    }

    fn on_killed(&mut self, body: &mut Body, _signals: &mut WorldSignals) {
        body.is_alive = false;
    }

    fn pick_frame(&mut self, _body: &mut Body, _now_ms: u64) {}

    /// Where the sprite is drawn. Only scripted animations move it off
    /// the bounds.
    fn sprite_position(&self, body: &Body) -> Vec2 {
        Vec2::new(body.bounds.x, body.bounds.y)
    }

    fn update_alpha(&mut self, body: &mut Body, delta: f32) {
        body.fade(delta);
    }
}

// ══════════════════════════════════════════════════════════════
// Entity
// ══════════════════════════════════════════════════════════════

pub struct Entity {
    pub body: Body,
    pub behavior: Box<dyn Behavior>,
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("kind", &self.behavior.type_key())
            .field("id", &self.body.id)
            .field("bounds", &self.body.bounds)
            .finish()
    }
}

impl Entity {
    pub fn new(body: Body, behavior: Box<dyn Behavior>) -> Self {
        Entity { body, behavior }
    }

    pub fn type_key(&self) -> &'static str {
        self.behavior.type_key()
    }

    /// Dead and fully faded out.
    pub fn is_reapable(&self) -> bool {
        !self.body.is_alive && self.body.alpha <= 0.0
    }

    /// One frame of this entity's turn.
    pub fn update(&mut self, ctx: &mut FrameCtx) {
        let Entity { body, behavior } = self;
        let behavior = behavior.as_mut();

        body.update_speed(ctx.signals.delta);
        body.update_state();

        ctx.apply_horizontal_force(body);
        settle_death(body, behavior, ctx);
        ctx.apply_vertical_force(body);
        settle_death(body, behavior, ctx);

        behavior.act(body, ctx);
        settle_death(body, behavior, ctx);

        behavior.pick_frame(body, ctx.signals.now_ms);

        if ctx.signals.is_live && !ctx.is_player() {
            let touching = ctx
                .player_bounds()
                .is_some_and(|p| p.overlaps(&body.bounds));
            if touching {
                behavior.on_player_collision(body, ctx);
                settle_death(body, behavior, ctx);
            }
        }
    }

    pub fn kill(&mut self, signals: &mut WorldSignals) {
        self.behavior.on_killed(&mut self.body, signals);
    }

    pub fn activate(&mut self, signals: &mut WorldSignals) -> bool {
        self.behavior.on_use(&mut self.body, signals)
    }

    pub fn update_alpha(&mut self, delta: f32) {
        self.behavior.update_alpha(&mut self.body, delta);
    }

    pub fn sprite_position(&self) -> Vec2 {
        self.behavior.sprite_position(&self.body)
    }
}

fn settle_death(body: &mut Body, behavior: &mut dyn Behavior, ctx: &mut FrameCtx) {
    let requested = body.take_death_request();
    let by_others = std::mem::replace(&mut ctx.self_kill, false);
    if (requested || by_others) && body.is_alive {
        behavior.on_killed(body, ctx.signals);
    }
}

// ══════════════════════════════════════════════════════════════
// Frame context
// ══════════════════════════════════════════════════════════════

pub struct FrameCtx<'a> {
    pub me: EntityHandle,
    pub grid: &'a TileGrid,
    pub entities: &'a mut EntityRegistry,
    /// Entities overlapping the actor's scan area, in update order.
    pub surrounding: &'a [EntityHandle],
    pub signals: &'a mut WorldSignals,
    self_kill: bool,
}

impl<'a> FrameCtx<'a> {
    pub fn new(
        me: EntityHandle,
        grid: &'a TileGrid,
        entities: &'a mut EntityRegistry,
        surrounding: &'a [EntityHandle],
        signals: &'a mut WorldSignals,
    ) -> Self {
        FrameCtx {
            me,
            grid,
            entities,
            surrounding,
            signals,
            self_kill: false,
        }
    }

    pub fn delta(&self) -> f32 {
        self.signals.delta
    }

    pub fn now_ms(&self) -> u64 {
        self.signals.now_ms
    }

    // ── Movement ──

    fn blockers(&self) -> Vec<Rect> {
        self.surrounding
            .iter()
            .filter(|h| **h != self.me)
            .filter_map(|h| self.entities.get(*h))
            .filter(|e| e.body.is_blocking_space)
            .map(|e| e.body.bounds)
            .collect()
    }

    pub fn move_by(&self, body: &mut Body, dx: f32, dy: f32) -> bool {
        let blockers = self.blockers();
        physics::move_body(body, dx, dy, &Surroundings::new(self.grid, &blockers))
    }

    pub fn move_east(&self, body: &mut Body) -> bool {
        self.move_by(body, body.delta_speed, 0.0)
    }

    pub fn move_west(&self, body: &mut Body) -> bool {
        self.move_by(body, -body.delta_speed, 0.0)
    }

    fn apply_horizontal_force(&self, body: &mut Body) {
        let blockers = self.blockers();
        physics::apply_horizontal_force(body, self.delta(), &Surroundings::new(self.grid, &blockers));
    }

    fn apply_vertical_force(&self, body: &mut Body) {
        let blockers = self.blockers();
        physics::apply_vertical_force(body, self.delta(), &Surroundings::new(self.grid, &blockers));
    }

    // ── Player ──

    pub fn is_player(&self) -> bool {
        self.entities.player() == Some(self.me)
    }

    /// Bounds of the player, unless the player is the acting entity.
    pub fn player_bounds(&self) -> Option<Rect> {
        let player = self.entities.player()?;
        self.entities.get(player).map(|e| e.body.bounds)
    }

    pub fn kill_player(&mut self) {
        if let Some(player) = self.entities.player() {
            self.kill(player);
        }
    }

    // ── Other entities ──

    pub fn neighbors(&self) -> &'a [EntityHandle] {
        self.surrounding
    }

    pub fn neighbor(&self, handle: EntityHandle) -> Option<&Entity> {
        self.entities.get(handle)
    }

    pub fn neighbor_mut(&mut self, handle: EntityHandle) -> Option<&mut Entity> {
        self.entities.get_mut(handle)
    }

    /// Route a kill through the target's behaviour. Killing the acting
    /// entity is settled by its own update.
    pub fn kill(&mut self, handle: EntityHandle) {
        if handle == self.me {
            self.self_kill = true;
            return;
        }
        if let Some(target) = self.entities.get_mut(handle) {
            target.kill(self.signals);
        }
    }

    pub fn use_entity(&mut self, handle: EntityHandle) -> bool {
        if handle == self.me {
            return false;
        }
        match self.entities.get_mut(handle) {
            Some(target) => target.activate(self.signals),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::event::GameEvent;

    #[derive(Debug)]
    struct Walker;

    impl Behavior for Walker {
        fn type_key(&self) -> &'static str {
            "walker"
        }

        fn act(&mut self, body: &mut Body, ctx: &mut FrameCtx) {
            ctx.move_east(body);
        }
    }

    #[derive(Debug, Default)]
    struct Mortal {
        deaths: u32,
    }

    impl Behavior for Mortal {
        fn type_key(&self) -> &'static str {
            "mortal"
        }

        fn on_killed(&mut self, body: &mut Body, _signals: &mut WorldSignals) {
            self.deaths += 1;
            body.is_alive = false;
        }
    }

    fn floor_grid() -> TileGrid {
        let mut grid = TileGrid::with_size(8, 4);
        for col in 0..8 {
            grid.set_tile_set(col, 0, 0);
        }
        grid
    }

    fn entity(behavior: Box<dyn Behavior>, x: f32, y: f32) -> Entity {
        let mut body = Body::new("test").with_size(32.0, 32.0);
        body.movement_speed = 10.0;
        body.bounds.x = x;
        body.bounds.y = y;
        Entity::new(body, behavior)
    }

    fn run_turn(
        reg: &mut EntityRegistry,
        grid: &TileGrid,
        signals: &mut WorldSignals,
        me: EntityHandle,
    ) {
        let Some(mut actor) = reg.take(me) else {
            return;
        };
        let surrounding = reg.overlapping(actor.body.scan_area());
        let mut ctx = FrameCtx::new(me, grid, reg, &surrounding, signals);
        actor.update(&mut ctx);
        reg.restore(me, actor);
    }

    #[test]
    fn walker_moves_and_lands() {
        let grid = floor_grid();
        let mut reg = EntityRegistry::new();
        let me = reg.insert(entity(Box::new(Walker), 64.0, 66.0));
        let mut signals = WorldSignals::new();
        signals.delta = 0.1;
        run_turn(&mut reg, &grid, &mut signals, me);
        let body = reg.get(me).map(|e| e.body.clone()).expect("restored");
        assert_eq!(body.bounds.y, 64.0);
        assert!(body.is_on_ground);
        assert_eq!(body.bounds.x, 74.0);
    }

    #[test]
    fn blocking_neighbour_stops_walker() {
        let grid = floor_grid();
        let mut reg = EntityRegistry::new();
        let me = reg.insert(entity(Box::new(Walker), 64.0, 64.0));
        let mut wall = entity(Box::new(Mortal::default()), 100.0, 64.0);
        wall.body.ignore_gravity = true;
        reg.insert(wall);
        let mut signals = WorldSignals::new();
        signals.delta = 0.1;
        run_turn(&mut reg, &grid, &mut signals, me);
        assert_eq!(reg.get(me).map(|e| e.body.bounds.x), Some(100.0 - 32.0));
    }

    #[test]
    fn fatal_move_routes_through_on_killed() {
        let mut grid = floor_grid();
        grid.water_height = 200.0;
        let mut reg = EntityRegistry::new();
        let me = reg.insert(entity(Box::new(Mortal::default()), 64.0, 64.0));
        let mut signals = WorldSignals::new();
        signals.delta = 0.016;
        run_turn(&mut reg, &grid, &mut signals, me);
        let e = reg.get(me).map(|e| (e.body.is_alive, format!("{:?}", e.behavior)));
        assert_eq!(e, Some((false, "Mortal { deaths: 1 }".to_string())));
    }

    #[test]
    fn kill_on_neighbour_calls_its_hook() {
        let grid = floor_grid();
        let mut reg = EntityRegistry::new();
        let me = reg.insert(entity(Box::new(Walker), 64.0, 64.0));
        let victim = reg.insert(entity(Box::new(Mortal::default()), 200.0, 64.0));
        let mut signals = WorldSignals::new();
        let actor = reg.take(me);
        let surrounding = Vec::new();
        let mut ctx = FrameCtx::new(me, &grid, &mut reg, &surrounding, &mut signals);
        ctx.kill(victim);
        assert!(!ctx.self_kill);
        ctx.kill(me);
        assert!(ctx.self_kill);
        if let Some(actor) = actor {
            reg.restore(me, actor);
        }
        assert_eq!(reg.get(victim).map(|e| e.body.is_alive), Some(false));
    }

    #[test]
    fn set_state_emits_only_on_change() {
        let mut signals = WorldSignals::new();
        signals.set_state(WorldState::Playing);
        assert!(signals.events.is_empty());
        signals.set_state(WorldState::PlayerDies);
        assert_eq!(
            signals.events,
            vec![GameEvent::StateChanged {
                from: WorldState::Playing,
                to: WorldState::PlayerDies
            }]
        );
    }

    #[test]
    fn add_score_accumulates() {
        let mut signals = WorldSignals::new();
        signals.add_score(100);
        signals.add_score(800);
        assert_eq!(signals.score, 900);
        assert_eq!(signals.events.len(), 2);
    }
}
