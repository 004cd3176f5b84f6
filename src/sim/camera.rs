//! Camera: a zoomable orthographic view into the world.
//!
//! `position` is the world point shown at the centre of the viewport.
//! The viewport is measured in screen units and `zoom` is world units
//! per screen unit, so a larger zoom shows more of the world.
//!
//! Zoom moves between fixed steps. Changing the step only sets a target
//! and the actual zoom eases towards it each frame. A follow target and
//! a manually set position are mutually exclusive: any direct position
//! change drops the target.
//!
//! Screen space has its origin in the bottom-left corner, y up.

use crate::domain::geom::{Rect, Vec2};
use crate::domain::tile::CELL;
use crate::sim::registry::EntityHandle;

pub const ZOOM_STEPS: [f32; 9] = [0.5, 0.66666, 1.0, 1.25, 1.66666, 2.5, 3.33333, 5.0, 10.0];
pub const DEFAULT_ZOOM_STEP: usize = 2;
/// Exponential easing rate, relative to the current zoom.
const ZOOM_EASE: f32 = 3.5;

#[derive(Clone, Debug)]
pub struct Camera {
    position: Vec2,
    zoom: f32,
    zoom_step: usize,
    viewport_w: f32,
    viewport_h: f32,
    target: Option<EntityHandle>,
}

impl Camera {
    pub fn new(viewport_w: f32, viewport_h: f32) -> Self {
        Camera {
            position: Vec2::new(0.0, 0.0),
            zoom: ZOOM_STEPS[DEFAULT_ZOOM_STEP],
            zoom_step: DEFAULT_ZOOM_STEP,
            viewport_w,
            viewport_h,
            target: None,
        }
    }

    pub fn resize(&mut self, viewport_w: f32, viewport_h: f32) {
        self.viewport_w = viewport_w;
        self.viewport_h = viewport_h;
    }

    pub fn viewport(&self) -> (f32, f32) {
        (self.viewport_w, self.viewport_h)
    }

    // ── Zoom ──

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn zoom_step(&self) -> usize {
        self.zoom_step
    }

    /// The step value `zoom` is easing towards.
    pub fn target_zoom(&self) -> f32 {
        ZOOM_STEPS[self.zoom_step]
    }

    /// Jump straight to the default step, without easing.
    pub fn reset_zoom(&mut self) {
        self.zoom_step = DEFAULT_ZOOM_STEP;
        self.zoom = ZOOM_STEPS[DEFAULT_ZOOM_STEP];
    }

    pub fn zoom_in(&mut self) {
        if self.zoom_step > 0 {
            self.zoom_step -= 1;
        }
    }

    pub fn zoom_out(&mut self) {
        if self.zoom_step + 1 < ZOOM_STEPS.len() {
            self.zoom_step += 1;
        }
    }

    /// Ease the zoom towards the current step. Never overshoots, so the
    /// step value is a fixed point.
    pub fn update_zoom(&mut self, dt: f32) {
        let goal = self.target_zoom();
        if self.zoom > goal {
            self.zoom = (self.zoom - dt * self.zoom * ZOOM_EASE).max(goal);
        }
        if self.zoom < goal {
            self.zoom = (self.zoom + dt * self.zoom * ZOOM_EASE).min(goal);
        }
    }

    // ── Position / target ──

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn target(&self) -> Option<EntityHandle> {
        self.target
    }

    pub fn set_target(&mut self, target: Option<EntityHandle>) {
        self.target = target;
    }

    /// Centre on a target's bounds. Odd viewport sizes get a half-unit
    /// shift so the image stays pixel aligned.
    pub fn follow(&mut self, bounds: Rect) {
        let even_x = if self.viewport_w % 2.0 != 0.0 { 0.5 } else { 0.0 };
        let even_y = if self.viewport_h % 2.0 != 0.0 { 0.5 } else { 0.0 };
        self.position.x = bounds.x + bounds.width / 2.0 + even_x;
        self.position.y = bounds.y + bounds.height / 2.0 + even_y;
    }

    pub fn set_position(&mut self, x: f32, y: f32) {
        self.target = None;
        self.position = Vec2::new(x, y);
    }

    pub fn pan(&mut self, dx: f32, dy: f32) {
        self.target = None;
        self.position.x += dx;
        self.position.y += dy;
    }

    /// Centre on the middle of a grid cell.
    pub fn center_on_cell(&mut self, col: i32, row: i32) {
        self.set_position(
            col as f32 * CELL + CELL / 2.0,
            row as f32 * CELL + CELL / 2.0,
        );
    }

    /// Keep the view inside `world`. The upper bound wins when the world
    /// is smaller than the view. Leaves the target alone.
    pub fn clamp_to(&mut self, world: Rect) {
        let (w, h) = self.view_size();
        let p = &mut self.position;
        if p.x < w / 2.0 {
            p.x = w / 2.0;
        }
        if p.y < h / 2.0 {
            p.y = h / 2.0;
        }
        if p.x > world.x + world.width - w / 2.0 {
            p.x = world.x + world.width - w / 2.0;
        }
        if p.y > world.y + world.height - h / 2.0 {
            p.y = world.y + world.height - h / 2.0;
        }
    }

    /// Size of the visible world area.
    pub fn view_size(&self) -> (f32, f32) {
        (self.viewport_w * self.zoom, self.viewport_h * self.zoom)
    }

    /// World position of the viewport's bottom-left corner.
    pub fn offset(&self) -> Vec2 {
        let (w, h) = self.view_size();
        Vec2::new(self.position.x - w / 2.0, self.position.y - h / 2.0)
    }

    /// Visible world area.
    pub fn view_rect(&self) -> Rect {
        let o = self.offset();
        let (w, h) = self.view_size();
        Rect::new(o.x, o.y, w, h)
    }

    // ── Projection ──

    pub fn project(&self, p: Vec2) -> Vec2 {
        Vec2::new(
            (p.x - self.position.x) / self.zoom + self.viewport_w / 2.0,
            (p.y - self.position.y) / self.zoom + self.viewport_h / 2.0,
        )
    }

    pub fn unproject(&self, p: Vec2) -> Vec2 {
        Vec2::new(
            (p.x - self.viewport_w / 2.0) * self.zoom + self.position.x,
            (p.y - self.viewport_h / 2.0) * self.zoom + self.position.y,
        )
    }

    /// World rectangle to screen. Always has non-negative extents.
    pub fn project_rect(&self, r: Rect) -> Rect {
        let origin = self.project(Vec2::new(r.x, r.y));
        Rect::new(origin.x, origin.y, r.width / self.zoom, r.height / self.zoom).normalized()
    }

    /// Screen rectangle to world. Always has non-negative extents.
    pub fn unproject_rect(&self, r: Rect) -> Rect {
        let origin = self.unproject(Vec2::new(r.x, r.y));
        Rect::new(origin.x, origin.y, r.width * self.zoom, r.height * self.zoom).normalized()
    }
}
