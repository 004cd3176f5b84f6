/// WorldController: the owner of a running world.
///
/// ## Parts
///
///   - `grid`     the tile map and water height
///   - `level`    title, records, trigger areas, water settings
///   - `entities` the registry, including the player handle
///   - `camera`   zoom, position and follow target
///   - `signals`  score, state, popups and the frame's event queue
///
/// ## Frame
///
/// [`WorldController::update`] reads the clock once and runs the
/// pipeline in `sim::step`: timers, then (unless paused) entities,
/// popups and state transitions, then the camera. Paused frames still
/// ease the zoom.
///
/// ## Live vs editor
///
/// With `is_live` off the world is being edited: the camera is free,
/// nothing wins or loses, and the player dies on contact without its
/// death sequence.

use tracing::{debug, info};

use crate::domain::autotile;
use crate::domain::entity::PlayerInput;
use crate::domain::geom::{Rect, Vec2};
use crate::domain::grid::{Cell, TileGrid};
use crate::domain::tile::CELL;
use crate::sim::behavior::{Entity, WorldSignals};
use crate::sim::camera::Camera;
use crate::sim::clock::{Clock, SystemClock};
use crate::sim::event::{GameEvent, Popup};
use crate::sim::level::LevelInfo;
use crate::sim::registry::{EntityHandle, EntityRegistry};
use crate::sim::step;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum WorldState {
    Playing,
    /// Finish reached; the front end shows the results.
    ViewStats,
    BackToMenu,
    /// The player's death sequence is running.
    PlayerDies,
    /// The front end should reload the world.
    Restart,
}

/// Frame deltas are capped so a stall (debugger, suspended terminal)
/// does not turn into one huge step.
pub const MAX_FRAME_DELTA: f32 = 0.25;

#[derive(Debug)]
pub struct WorldController {
    pub(crate) grid: TileGrid,
    pub(crate) level: LevelInfo,
    pub(crate) entities: EntityRegistry,
    pub(crate) camera: Camera,
    pub(crate) signals: WorldSignals,

    clock: Box<dyn Clock>,
    pub(crate) paused: bool,
    pub(crate) start_ms: u64,
    pub(crate) pause_start_ms: Option<u64>,
    pub(crate) elapsed_ms: u64,
    last_frame_ms: Option<u64>,
    pub(crate) water_offset: f32,
}

impl WorldController {
    pub fn new(clock: Box<dyn Clock>, viewport_w: f32, viewport_h: f32) -> Self {
        let mut world = WorldController {
            grid: TileGrid::new(),
            level: LevelInfo::default(),
            entities: EntityRegistry::new(),
            camera: Camera::new(viewport_w, viewport_h),
            signals: WorldSignals::new(),
            clock,
            paused: false,
            start_ms: 0,
            pause_start_ms: None,
            elapsed_ms: 0,
            last_frame_ms: None,
            water_offset: 0.0,
        };
        world.create_world(0, 0);
        world
    }

    pub fn with_system_clock(viewport_w: f32, viewport_h: f32) -> Self {
        WorldController::new(Box::new(SystemClock::new()), viewport_w, viewport_h)
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    // ══════════════════════════════════════════════════════════════
    // Frame
    // ══════════════════════════════════════════════════════════════

    /// Advance the world by the wall-clock time since the last call.
    pub fn update(&mut self) {
        let now = self.clock.now_ms();
        let delta = match self.last_frame_ms {
            Some(last) => (now.saturating_sub(last) as f32 / 1000.0).min(MAX_FRAME_DELTA),
            None => 0.0,
        };
        self.last_frame_ms = Some(now);

        self.signals.now_ms = now;
        self.signals.delta = delta;
        self.signals.view = self.camera.view_rect();
        self.signals.zoom = self.camera.zoom();

        step::update_timers(self, now);
        if !self.paused {
            step::update_entities(self);
            step::update_popups(self, delta);
            step::update_world_state(self);
        }
        self.water_offset += delta * self.level.water_speed();
        step::update_camera(self, delta);

        // `use` is an edge: it only counts for the frame it arrived in.
        self.signals.input.use_pressed = false;
    }

    // ══════════════════════════════════════════════════════════════
    // World lifecycle
    // ══════════════════════════════════════════════════════════════

    /// Empty world of the given size, ready to play.
    pub fn create_world(&mut self, columns: usize, rows: usize) {
        self.signals.state = WorldState::Playing;
        self.signals.score = 0;
        self.signals.popups.clear();
        self.signals.power_toggles.clear();
        self.level = LevelInfo::default();
        self.reset_timer();
        self.camera.reset_zoom();
        self.camera.set_position(0.1, 0.1);
        self.grid.reset(columns, rows);
        self.entities.clear();
        self.water_offset = 0.0;
        info!(columns, rows, "world created");
    }

    pub fn reset_world(&mut self) {
        self.create_world(0, 0);
    }

    /// Restart every entity's routine from scratch.
    pub fn reset_routines(&mut self) {
        self.entities.reset_routines();
    }

    pub fn reset_timer(&mut self) {
        self.start_ms = self.clock.now_ms();
        self.pause_start_ms = None;
        self.elapsed_ms = self.level.countdown_ms;
    }

    // ══════════════════════════════════════════════════════════════
    // Entities
    // ══════════════════════════════════════════════════════════════

    /// Insert an entity at `(x, y)`; see [`crate::domain::entity::Body::set_position`].
    pub fn add_entity(&mut self, mut entity: Entity, x: f32, y: f32, center: bool) -> EntityHandle {
        entity.body.set_position(x, y, center);
        let key = entity.type_key();
        let handle = self.entities.insert(entity);
        debug!(key, x, y, "entity added");
        handle
    }

    pub fn remove_entity(&mut self, handle: EntityHandle) -> Option<Entity> {
        self.entities.remove(handle)
    }

    /// Remove every entity overlapping `area`. Returns how many went.
    pub fn remove_entities_in_area(&mut self, area: Rect) -> usize {
        let doomed = self.entities.overlapping(area.normalized());
        doomed
            .into_iter()
            .filter(|&h| self.entities.remove(h).is_some())
            .count()
    }

    /// Make an entity the player. It moves to the end of the update
    /// order and the camera snaps to it.
    pub fn set_player(&mut self, handle: Option<EntityHandle>) {
        self.entities.set_player(handle);
        step::update_camera(self, 0.0);
    }

    pub fn player(&self) -> Option<EntityHandle> {
        self.entities.player()
    }

    /// Toggle the editor mark on an entity; `None` clears all marks.
    pub fn mark_entity(&mut self, handle: Option<EntityHandle>) {
        self.entities.toggle_mark(handle);
    }

    pub fn marked_entities(&self) -> Vec<EntityHandle> {
        self.entities.marked()
    }

    pub fn entities_overlapping(&self, area: Rect) -> Vec<EntityHandle> {
        self.entities.overlapping(area.normalized())
    }

    pub fn entity(&self, handle: EntityHandle) -> Option<&Entity> {
        self.entities.get(handle)
    }

    pub fn entity_mut(&mut self, handle: EntityHandle) -> Option<&mut Entity> {
        self.entities.get_mut(handle)
    }

    pub fn entities(&self) -> &EntityRegistry {
        &self.entities
    }

    // ══════════════════════════════════════════════════════════════
    // Grid
    // ══════════════════════════════════════════════════════════════

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    /// Fill every cell touching `area` and re-derive tile ids.
    pub fn set_cell_region(&mut self, area: Rect, tile_set_id: i32) {
        self.grid.set_region(area.normalized(), tile_set_id);
    }

    /// Set a single cell without autotiling; follow up with
    /// [`WorldController::update_tiles`].
    pub fn set_cell(&mut self, col: i32, row: i32, tile_set_id: i32) -> bool {
        self.grid.set_tile_set(col, row, tile_set_id)
    }

    pub fn update_tiles(&mut self) {
        autotile::update_tiles(&mut self.grid);
    }

    /// Cell under a world position, clamped to the grid.
    pub fn cell_at(&self, x: f32, y: f32) -> Option<&Cell> {
        self.grid.cell_at(x, y)
    }

    /// Cells inside the camera view plus a one-cell margin, column by
    /// column.
    pub fn visible_cells(&self) -> Vec<&Cell> {
        let mut visible = vec![];
        let off = self.camera.offset();
        let (vw, vh) = self.camera.view_size();
        let columns = self.grid.columns() as i32;
        let rows = self.grid.rows() as i32;

        let x1 = ((off.x / CELL) as i32).max(0);
        let y1 = ((off.y / CELL) as i32).max(0);
        let x2 = ((vw / CELL) as i32 + x1 + 2).min(columns);
        let y2 = ((vh / CELL) as i32 + y1 + 2).min(rows);

        for x in x1..x2 {
            if x as f32 * CELL > off.x + vw {
                break;
            }
            for y in y1..y2 {
                if y as f32 * CELL > off.y + vh {
                    break;
                }
                if let Some(cell) = self.grid.cell(x, y) {
                    visible.push(cell);
                }
            }
        }
        visible
    }

    pub fn level(&self) -> &LevelInfo {
        &self.level
    }

    pub fn level_mut(&mut self) -> &mut LevelInfo {
        &mut self.level
    }

    pub fn water_height(&self) -> f32 {
        self.grid.water_height
    }

    pub fn set_water_height(&mut self, height: f32) {
        self.grid.water_height = height;
    }

    /// Scroll speed of the water surface for the level's speed id.
    pub fn water_speed(&self) -> f32 {
        self.level.water_speed()
    }

    /// Accumulated horizontal scroll of the water surface texture.
    pub fn water_offset(&self) -> f32 {
        self.water_offset
    }

    // ══════════════════════════════════════════════════════════════
    // Camera
    // ══════════════════════════════════════════════════════════════

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn resize_viewport(&mut self, width: f32, height: f32) {
        self.camera.resize(width, height);
    }

    pub fn zoom_in(&mut self) {
        self.camera.zoom_in();
    }

    pub fn zoom_out(&mut self) {
        self.camera.zoom_out();
    }

    pub fn reset_zoom(&mut self) {
        self.camera.reset_zoom();
    }

    /// Move the camera by a world-space offset. Drops any follow target.
    pub fn pan(&mut self, dx: f32, dy: f32) {
        self.camera.pan(dx, dy);
    }

    pub fn center_camera_on_cell(&mut self, col: i32, row: i32) {
        self.camera.center_on_cell(col, row);
    }

    pub fn set_camera_target(&mut self, target: Option<EntityHandle>) {
        self.camera.set_target(target);
    }

    pub fn project(&self, p: Vec2) -> Vec2 {
        self.camera.project(p)
    }

    pub fn unproject(&self, p: Vec2) -> Vec2 {
        self.camera.unproject(p)
    }

    pub fn project_rect(&self, r: Rect) -> Rect {
        self.camera.project_rect(r)
    }

    pub fn unproject_rect(&self, r: Rect) -> Rect {
        self.camera.unproject_rect(r)
    }

    // ══════════════════════════════════════════════════════════════
    // State
    // ══════════════════════════════════════════════════════════════

    pub fn world_state(&self) -> WorldState {
        self.signals.state
    }

    pub fn set_world_state(&mut self, state: WorldState) {
        self.signals.set_state(state);
    }

    pub fn score(&self) -> i32 {
        self.signals.score
    }

    /// Play time in ms, or the time left when the level has a countdown.
    pub fn elapsed_time(&self) -> u64 {
        self.elapsed_ms
    }

    pub fn is_live(&self) -> bool {
        self.signals.is_live
    }

    pub fn set_live(&mut self, live: bool) {
        self.signals.is_live = live;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn set_player_input(&mut self, input: PlayerInput) {
        self.signals.input = input;
    }

    pub fn popups(&self) -> &[Popup] {
        &self.signals.popups
    }

    /// Take the events emitted since the last call.
    pub fn drain_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.signals.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::catalog::{self, EntityFactory};
    use crate::sim::clock::ManualClock;

    const FRAME_MS: u64 = 16;

    /// 20x10 world with a ground row, driven by a manual clock.
    fn arena() -> (WorldController, ManualClock) {
        let clock = ManualClock::new(1000);
        let mut w = WorldController::new(Box::new(clock.clone()), 640.0, 480.0);
        w.create_world(20, 10);
        w.set_cell_region(Rect::new(0.0, 0.0, 20.0 * CELL, 1.0), 0);
        w.set_live(true);
        (w, clock)
    }

    fn frames(w: &mut WorldController, clock: &ManualClock, n: usize) {
        for _ in 0..n {
            clock.advance(FRAME_MS);
            w.update();
        }
    }

    fn add_player(w: &mut WorldController, x: f32) -> EntityHandle {
        let h = w.add_entity(catalog::player(), x, CELL, false);
        w.set_player(Some(h));
        h
    }

    // ── Lifecycle ──

    #[test]
    fn create_world_starts_fresh() {
        let (mut w, _clock) = arena();
        add_player(&mut w, 100.0);
        w.signals.score = 50;
        w.set_world_state(WorldState::ViewStats);

        w.create_world(4, 3);
        assert_eq!(w.world_state(), WorldState::Playing);
        assert_eq!(w.score(), 0);
        assert!(w.entities().is_empty());
        assert!(w.player().is_none());
        assert_eq!(w.entities().next_id(), 1);
        assert_eq!(w.grid().columns(), 4);
        assert_eq!(w.camera().zoom_step(), crate::sim::camera::DEFAULT_ZOOM_STEP);
    }

    #[test]
    fn zero_sized_world_updates_quietly() {
        let clock = ManualClock::new(5);
        let mut w = WorldController::new(Box::new(clock.clone()), 640.0, 480.0);
        w.set_live(true);
        frames(&mut w, &clock, 10);
        assert!(w.visible_cells().is_empty());
        assert!(w.cell_at(10.0, 10.0).is_none());
        assert_eq!(w.world_state(), WorldState::Playing);
    }

    // ── Timers ──

    #[test]
    fn pause_shifts_routines_and_freezes_elapsed() {
        let (mut w, clock) = arena();
        let trap = w.add_entity(catalog::electric_trap(), 300.0, CELL, false);
        frames(&mut w, &clock, 2);
        let timer_before = w.entity(trap).unwrap().body.routine_timer;
        let elapsed_before = w.elapsed_time();
        assert!(timer_before > 0);

        w.set_paused(true);
        frames(&mut w, &clock, 1);
        clock.advance(2500);
        frames(&mut w, &clock, 1);
        assert_eq!(w.elapsed_time(), elapsed_before);
        w.set_paused(false);
        w.update();

        // Paused from the first paused frame to the resume frame; the
        // frame before the latch was still play time.
        let paused_for = 2500 + FRAME_MS;
        assert_eq!(w.entity(trap).unwrap().body.routine_timer, timer_before + paused_for);
        assert_eq!(w.elapsed_time(), elapsed_before + FRAME_MS);
    }

    #[test]
    fn elapsed_counts_up_without_countdown() {
        let (mut w, clock) = arena();
        w.reset_timer();
        clock.advance(1500);
        w.update();
        assert_eq!(w.elapsed_time(), 1500);
    }

    #[test]
    fn countdown_expiry_restarts() {
        let (mut w, clock) = arena();
        add_player(&mut w, 100.0);
        w.level_mut().countdown_ms = 1000;
        w.reset_timer();

        clock.advance(400);
        w.update();
        assert_eq!(w.elapsed_time(), 600);
        assert_eq!(w.world_state(), WorldState::Playing);

        clock.advance(700);
        w.update();
        assert_eq!(w.elapsed_time(), 0);
        assert_eq!(w.world_state(), WorldState::Restart);
    }

    // ── World state ──

    #[test]
    fn reaching_finish_shows_stats() {
        let (mut w, clock) = arena();
        w.level_mut().finish_area = Rect::new(10.0 * CELL, CELL, CELL, CELL);
        let p = add_player(&mut w, 10.0 * CELL + 10.0);
        frames(&mut w, &clock, 1);
        assert_eq!(w.world_state(), WorldState::ViewStats);
        assert!(w
            .drain_events()
            .contains(&GameEvent::StateChanged { from: WorldState::Playing, to: WorldState::ViewStats }));

        // Stats screen is terminal for the evaluator.
        w.entity_mut(p).unwrap().body.is_alive = false;
        frames(&mut w, &clock, 1);
        assert_eq!(w.world_state(), WorldState::ViewStats);
    }

    #[test]
    fn editor_mode_never_changes_state() {
        let (mut w, clock) = arena();
        w.set_live(false);
        w.level_mut().finish_area = Rect::new(0.0, 0.0, 20.0 * CELL, 10.0 * CELL);
        add_player(&mut w, 100.0);
        frames(&mut w, &clock, 3);
        assert_eq!(w.world_state(), WorldState::Playing);
    }

    #[test]
    fn dead_player_restarts_then_is_reaped() {
        let (mut w, clock) = arena();
        let p = add_player(&mut w, 100.0);
        frames(&mut w, &clock, 30);
        {
            let body = &mut w.entity_mut(p).unwrap().body;
            assert_eq!(body.alpha, 1.0);
            body.is_alive = false;
        }
        frames(&mut w, &clock, 1);
        assert_eq!(w.world_state(), WorldState::Restart);

        frames(&mut w, &clock, 30);
        assert!(w.player().is_none());
        assert!(w.entity(p).is_none());
        assert!(w
            .drain_events()
            .iter()
            .any(|e| matches!(e, GameEvent::EntityReaped { .. })));
    }

    #[test]
    fn collecting_adds_score_and_popup() {
        let (mut w, clock) = arena();
        w.add_entity(catalog::diamond(), 100.0, CELL, false);
        add_player(&mut w, 100.0);
        frames(&mut w, &clock, 1);
        assert_eq!(w.score(), 800);
        assert_eq!(w.popups().len(), 1);
        assert_eq!(w.popups()[0].text, "800");
    }

    #[test]
    fn paused_world_does_not_move_entities() {
        let (mut w, clock) = arena();
        let box_h = w.add_entity(catalog::crate_box(), 300.0, 5.0 * CELL, false);
        w.set_paused(true);
        frames(&mut w, &clock, 10);
        assert_eq!(w.entity(box_h).unwrap().body.bounds.y, 5.0 * CELL);
        w.set_paused(false);
        frames(&mut w, &clock, 10);
        assert!(w.entity(box_h).unwrap().body.bounds.y < 5.0 * CELL);
    }

    // ── Entities ──

    #[test]
    fn remove_in_area_and_overlap_queries() {
        let (mut w, _clock) = arena();
        let factory = EntityFactory::with_builtin();
        let a = w.add_entity(factory.create("diamond").unwrap(), 100.0, 100.0, false);
        w.add_entity(factory.create("diamond").unwrap(), 600.0, 100.0, false);
        assert_eq!(w.entities_overlapping(Rect::new(90.0, 90.0, 20.0, 20.0)), vec![a]);

        // Negative extents are normalized.
        assert_eq!(w.remove_entities_in_area(Rect::new(700.0, 200.0, -650.0, -150.0)), 2);
        assert!(w.entities().is_empty());
    }

    #[test]
    fn marks_follow_update_order_and_clear() {
        let (mut w, _clock) = arena();
        let a = w.add_entity(catalog::diamond(), 100.0, 100.0, false);
        let b = w.add_entity(catalog::diamond(), 200.0, 100.0, false);
        w.mark_entity(Some(b));
        w.mark_entity(Some(a));
        assert_eq!(w.marked_entities(), vec![a, b]);
        w.mark_entity(Some(b));
        assert_eq!(w.marked_entities(), vec![a]);
        w.mark_entity(None);
        assert!(w.marked_entities().is_empty());
    }

    #[test]
    fn set_player_moves_camera() {
        let (mut w, _clock) = arena();
        let p = add_player(&mut w, 8.0 * CELL);
        assert_eq!(w.camera().target(), Some(p));
        let centre = w.entity(p).unwrap().body.bounds.center();
        assert_eq!(w.camera().position().x, centre.x);
    }

    #[test]
    fn use_press_lasts_one_frame() {
        let (mut w, clock) = arena();
        add_player(&mut w, 100.0);
        w.set_player_input(PlayerInput { use_pressed: true, ..PlayerInput::default() });
        frames(&mut w, &clock, 1);
        assert!(!w.signals.input.use_pressed);
    }

    // ── Camera ──

    #[test]
    fn live_camera_stays_inside_world() {
        let (mut w, clock) = arena();
        add_player(&mut w, 10.0);
        frames(&mut w, &clock, 1);
        assert_eq!(w.camera().position(), Vec2::new(320.0, 240.0));
    }

    #[test]
    fn editor_camera_is_free() {
        let (mut w, clock) = arena();
        w.set_live(false);
        w.pan(-500.0, -500.0);
        frames(&mut w, &clock, 1);
        assert!(w.camera().position().x < 0.0);
    }

    #[test]
    fn paused_frames_still_ease_zoom() {
        let (mut w, clock) = arena();
        w.set_paused(true);
        w.zoom_out();
        frames(&mut w, &clock, 200);
        assert_eq!(w.camera().zoom(), w.camera().target_zoom());
    }

    #[test]
    fn visible_cells_cover_the_view() {
        let (mut w, _clock) = arena();
        w.center_camera_on_cell(0, 0);
        let cells = w.visible_cells();
        // View is 640x480 centred on (32, 32): columns 0..=5, rows 0..=4.
        assert!(cells.iter().all(|c| c.x >= 0 && c.y >= 0));
        assert!(cells.iter().any(|c| c.x == 0 && c.y == 0));
        assert!(cells.iter().all(|c| c.x <= 5 && c.y <= 4));
        assert_eq!(cells.len(), 30);
        assert!(cells.iter().any(|c| c.x == 5 && c.y == 4));
    }

    #[test]
    fn water_scrolls_every_frame() {
        let (mut w, clock) = arena();
        w.set_paused(true);
        w.update();
        clock.advance(100);
        w.update();
        assert!((w.water_offset() - 5.0).abs() < 1e-4);
        assert_eq!(w.water_speed(), 50.0);
    }
}
