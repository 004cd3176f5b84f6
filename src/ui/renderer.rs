/// Presentation layer: double-buffered, diff-based terminal renderer.
///
/// How it works:
///   1. Size the camera viewport from the terminal (one column covers
///      `units_per_column` screen units, one row `units_per_row`)
///   2. Build the next frame into the `front` buffer from grid, entities,
///      water and popups, all projected through the camera
///   3. Compare each cell with the `back` buffer (previous frame) and only
///      emit terminal commands for cells that changed
///   4. Swap front/back
///
/// Screen space is y-up, terminal rows are y-down: `ScreenMap` does the flip.

use std::io::{self, BufWriter, Write};
use std::ops::Range;

use crossterm::{
    cursor::{self, MoveTo},
    execute, queue,
    style::{Color, Print, ResetColor, SetBackgroundColor, SetForegroundColor},
    terminal::{self, Clear, ClearType},
};

use tileworld::domain::geom::{Rect, Vec2};
use tileworld::domain::grid::Cell as GridCell;
use tileworld::domain::tile;
use tileworld::sim::behavior::Entity;
use tileworld::sim::records::{format_time, Records};
use tileworld::sim::world::{WorldController, WorldState};

// ── Cell: the unit of the back-buffer ──

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct Cell {
    ch: char,
    fg: Color,
    bg: Color,
}

impl Cell {
    /// Explicit dark background for every "empty" terminal cell, so the
    /// gaps between rows match the cells on VTE terminals.
    const BASE_BG: Color = Color::Rgb { r: 22, g: 22, b: 35 };

    const BLANK: Cell = Cell {
        ch: ' ',
        fg: Color::White,
        bg: Cell::BASE_BG,
    };

    /// Sentinel used to invalidate the back buffer.
    const INVALID: Cell = Cell {
        ch: '?',
        fg: Color::Magenta,
        bg: Color::Magenta,
    };

    fn new(ch: char, fg: Color, bg: Color) -> Self {
        let bg = match bg {
            Color::Reset => Self::BASE_BG,
            other => other,
        };
        Cell { ch, fg, bg }
    }
}

// ── FrameBuffer: a 2D grid of Cells ──

struct FrameBuffer {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
}

impl FrameBuffer {
    fn new(w: usize, h: usize) -> Self {
        FrameBuffer {
            width: w,
            height: h,
            cells: vec![Cell::BLANK; w * h],
        }
    }

    fn resize(&mut self, w: usize, h: usize) {
        if self.width != w || self.height != h {
            self.width = w;
            self.height = h;
            self.cells = vec![Cell::BLANK; w * h];
        }
    }

    fn clear(&mut self) {
        self.cells.fill(Cell::BLANK);
    }

    fn set(&mut self, x: usize, y: usize, cell: Cell) {
        if x < self.width && y < self.height {
            self.cells[y * self.width + x] = cell;
        }
    }

    fn get(&self, x: usize, y: usize) -> Cell {
        if x < self.width && y < self.height {
            self.cells[y * self.width + x]
        } else {
            Cell::BLANK
        }
    }

    /// Recolor the background, keeping glyph and foreground.
    fn tint(&mut self, x: usize, y: usize, bg: Color) {
        if x < self.width && y < self.height {
            self.cells[y * self.width + x].bg = bg;
        }
    }

    fn fill(&mut self, cols: Range<usize>, rows: Range<usize>, cell: Cell) {
        for y in rows {
            for x in cols.clone() {
                self.set(x, y, cell);
            }
        }
    }

    /// Write a string at (x, y). Each char occupies 1 column.
    fn put_str(&mut self, x: usize, y: usize, s: &str, fg: Color, bg: Color) {
        for (i, ch) in s.chars().enumerate() {
            if x + i >= self.width {
                break;
            }
            self.set(x + i, y, Cell::new(ch, fg, bg));
        }
    }

    fn fill_row(&mut self, y: usize, bg: Color) {
        for x in 0..self.width {
            self.set(x, y, Cell::new(' ', Color::White, bg));
        }
    }
}

// ── ScreenMap: screen units to terminal cells ──

/// Maps camera screen space (origin bottom-left, y up) onto the map
/// area of the terminal, which starts at row `top`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScreenMap {
    pub cols: usize,
    pub rows: usize,
    pub top: usize,
    pub units_per_column: f32,
    pub units_per_row: f32,
}

impl ScreenMap {
    /// Viewport size in screen units.
    pub fn viewport(&self) -> (f32, f32) {
        (
            self.cols as f32 * self.units_per_column,
            self.rows as f32 * self.units_per_row,
        )
    }

    /// Terminal (column, row) holding a screen point.
    pub fn point(&self, p: Vec2) -> Option<(usize, usize)> {
        let col = (p.x / self.units_per_column).floor();
        let up = (p.y / self.units_per_row).floor();
        if col < 0.0 || up < 0.0 || col >= self.cols as f32 || up >= self.rows as f32 {
            return None;
        }
        Some((col as usize, self.top + self.rows - 1 - up as usize))
    }

    /// Terminal columns and rows covered by a screen rectangle, clipped to
    /// the map area. Anything with a visible extent covers at least one cell.
    pub fn span(&self, r: Rect) -> Option<(Range<usize>, Range<usize>)> {
        let cols = Self::axis(r.x, r.width, self.units_per_column, self.cols)?;
        let ups = Self::axis(r.y, r.height, self.units_per_row, self.rows)?;
        let bottom = self.top + self.rows;
        Some((cols, bottom - ups.end..bottom - ups.start))
    }

    fn axis(start: f32, len: f32, unit: f32, count: usize) -> Option<Range<usize>> {
        let first = (start / unit).floor().max(0.0);
        let last = ((start + len) / unit).ceil().min(count as f32);
        if len <= 0.0 || first >= last {
            return None;
        }
        Some(first as usize..last as usize)
    }
}

// ── Glyphs ──

const TILE_SET_COLORS: [Color; 2] = [
    Color::Rgb { r: 120, g: 84, b: 52 },
    Color::Rgb { r: 110, g: 110, b: 125 },
];
const GRASS: Color = Color::Rgb { r: 90, g: 170, b: 70 };
const WATER_BG: Color = Color::Rgb { r: 20, g: 60, b: 130 };
const WATER_FG: Color = Color::Rgb { r: 140, g: 190, b: 255 };
const HUD_BG: Color = Color::Rgb { r: 20, g: 20, b: 60 };
const OVERLAY_BG: Color = Color::Rgb { r: 40, g: 40, b: 40 };

/// Tiles whose top edge is open get a lighter surface color.
fn tile_glyph(cell: &GridCell) -> Cell {
    let base = TILE_SET_COLORS
        .get(cell.tile_set_id.max(0) as usize)
        .copied()
        .unwrap_or(Color::Grey);
    let surface = matches!(
        cell.tile_id,
        tile::TILE_CORNER_ABOVE_WEST
            | tile::TILE_EDGE_ABOVE
            | tile::TILE_CORNER_ABOVE_EAST
            | tile::TILE_ROW_WEST_END
            | tile::TILE_ROW_MIDDLE
            | tile::TILE_ROW_EAST_END
            | tile::TILE_COLUMN_TOP_END
            | tile::TILE_SINGLE
    );
    if surface {
        Cell::new('▀', GRASS, base)
    } else {
        Cell::new(' ', base, base)
    }
}

fn entity_glyph(entity: &Entity) -> (char, Color) {
    let powered = entity.body.is_power_on;
    let (ch, fg) = match entity.type_key() {
        "player" => ('@', Color::Yellow),
        "snail" => ('s', Color::Green),
        "jumper" => ('j', Color::Magenta),
        "box" => ('#', Color::Rgb { r: 190, g: 140, b: 80 }),
        "diamond" => ('◆', Color::Cyan),
        "chocolate_bar" => ('▬', Color::Rgb { r: 150, g: 90, b: 50 }),
        "switch" if powered => ('/', Color::Green),
        "switch" => ('\\', Color::Red),
        "springboard" => ('≡', Color::Yellow),
        "spikes_up" => ('^', Color::White),
        "electric_trap" if powered => ('%', Color::Cyan),
        "electric_trap" => ('%', Color::DarkGrey),
        "platform" => ('=', Color::Grey),
        "treadmill_left" => ('<', Color::Grey),
        "treadmill_right" => ('>', Color::Grey),
        _ => ('?', Color::Red),
    };
    if entity.body.alpha < 0.5 {
        (ch, Color::DarkGrey)
    } else {
        (ch, fg)
    }
}

pub fn state_label(state: WorldState) -> &'static str {
    match state {
        WorldState::Playing => "PLAYING",
        WorldState::ViewStats => "FINISHED",
        WorldState::BackToMenu => "MENU",
        WorldState::PlayerDies => "DYING",
        WorldState::Restart => "RESTART",
    }
}

// ── Renderer ──

const HUD_ROW: usize = 0;
const MAP_ROW: usize = 1;
/// HUD above the map, help bar below.
const RESERVED_ROWS: usize = 2;

pub struct Renderer {
    writer: BufWriter<io::Stdout>,
    front: FrameBuffer,
    back: FrameBuffer,
    term_w: usize,
    term_h: usize,
    units_per_column: f32,
    units_per_row: f32,
}

impl Renderer {
    pub fn new(units_per_column: f32, units_per_row: f32) -> Self {
        Renderer {
            writer: BufWriter::with_capacity(16384, io::stdout()),
            front: FrameBuffer::new(0, 0),
            back: FrameBuffer::new(0, 0),
            term_w: 0,
            term_h: 0,
            units_per_column,
            units_per_row,
        }
    }

    pub fn init(&mut self) -> io::Result<()> {
        terminal::enable_raw_mode()?;
        execute!(
            self.writer,
            terminal::EnterAlternateScreen,
            cursor::Hide,
            SetBackgroundColor(Cell::BASE_BG),
            Clear(ClearType::All)
        )?;

        let (tw, th) = terminal::size().unwrap_or((80, 24));
        self.resize(tw as usize, th as usize);
        Ok(())
    }

    pub fn cleanup(&mut self) -> io::Result<()> {
        execute!(
            self.writer,
            ResetColor,
            cursor::Show,
            terminal::LeaveAlternateScreen
        )?;
        terminal::disable_raw_mode()
    }

    fn resize(&mut self, w: usize, h: usize) {
        self.term_w = w;
        self.term_h = h;
        self.front.resize(w, h);
        self.back.resize(w, h);
        // Force full repaint: back differs from front everywhere.
        self.back.cells.fill(Cell::INVALID);
    }

    fn screen_map(&self) -> ScreenMap {
        ScreenMap {
            cols: self.term_w.max(1),
            rows: self.term_h.saturating_sub(RESERVED_ROWS).max(1),
            top: MAP_ROW,
            units_per_column: self.units_per_column,
            units_per_row: self.units_per_row,
        }
    }

    /// Match the camera viewport to the terminal. Call before the world
    /// update so the camera clamps against the size that gets drawn.
    pub fn sync_viewport(&mut self, world: &mut WorldController) -> io::Result<()> {
        let (tw, th) = terminal::size().unwrap_or((80, 24));
        if tw as usize != self.term_w || th as usize != self.term_h {
            self.resize(tw as usize, th as usize);
            queue!(self.writer, SetBackgroundColor(Cell::BASE_BG), Clear(ClearType::All))?;
        }
        let (vw, vh) = self.screen_map().viewport();
        if world.camera().viewport() != (vw, vh) {
            world.resize_viewport(vw, vh);
        }
        Ok(())
    }

    /// Draw one frame. `stats` shows the end-of-run overlay.
    pub fn render(&mut self, world: &WorldController, stats: Option<&Records>) -> io::Result<()> {
        let map = self.screen_map();
        self.front.clear();

        self.compose_tiles(world, &map);
        self.compose_water(world, &map);
        self.compose_entities(world, &map);
        self.compose_popups(world, &map);
        self.compose_hud(world);
        self.compose_help(&map);

        if let Some(records) = stats {
            self.compose_stats_overlay(world, &map, records);
        } else if world.is_paused() {
            self.compose_pause_overlay(world, &map);
        }

        self.flush_diff()?;
        std::mem::swap(&mut self.front, &mut self.back);
        Ok(())
    }

    // ── Diff flush: only write changed cells ──

    fn flush_diff(&mut self) -> io::Result<()> {
        let mut last_fg = Color::White;
        let mut last_bg = Cell::BASE_BG;
        let mut need_move = true;
        let mut last_x: usize = 0;
        let mut last_y: usize = 0;

        // Explicit base colors, never ResetColor: the terminal default may
        // differ from BASE_BG.
        queue!(
            self.writer,
            SetForegroundColor(Color::White),
            SetBackgroundColor(Cell::BASE_BG),
        )?;

        for y in 0..self.front.height {
            for x in 0..self.front.width {
                let cell = self.front.get(x, y);
                if cell == self.back.get(x, y) {
                    need_move = true;
                    continue;
                }

                if need_move || x != last_x + 1 || y != last_y {
                    queue!(self.writer, MoveTo(x as u16, y as u16))?;
                    need_move = false;
                }
                if cell.fg != last_fg {
                    queue!(self.writer, SetForegroundColor(cell.fg))?;
                    last_fg = cell.fg;
                }
                if cell.bg != last_bg {
                    queue!(self.writer, SetBackgroundColor(cell.bg))?;
                    last_bg = cell.bg;
                }
                queue!(self.writer, Print(cell.ch))?;
                last_x = x;
                last_y = y;
            }
        }

        self.writer.flush()
    }

    // ── Compose: build front buffer content ──

    fn compose_tiles(&mut self, world: &WorldController, map: &ScreenMap) {
        for cell in world.visible_cells() {
            if !cell.is_blocked() {
                continue;
            }
            let glyph = tile_glyph(cell);
            if let Some((cols, rows)) = map.span(world.project_rect(cell.rect())) {
                // The surface glyph only belongs on the top row of the tile.
                let top = rows.start;
                for y in rows {
                    let g = if y == top { glyph } else { Cell::new(' ', glyph.bg, glyph.bg) };
                    for x in cols.clone() {
                        self.front.set(x, y, g);
                    }
                }
            }
        }
    }

    fn compose_water(&mut self, world: &WorldController, map: &ScreenMap) {
        let height = world.water_height();
        if height < 1.0 {
            return;
        }
        let surface = world.project(Vec2::new(0.0, height));
        let below = Rect::new(0.0, 0.0, map.viewport().0, surface.y);
        let Some((cols, rows)) = map.span(below) else {
            return;
        };
        let phase = world.water_offset().floor() as usize;
        for y in rows.clone() {
            for x in cols.clone() {
                self.front.tint(x, y, WATER_BG);
            }
        }
        for x in cols {
            let ch = if (x + phase) % 4 == 0 { '≈' } else { '~' };
            self.front.set(x, rows.start, Cell::new(ch, WATER_FG, WATER_BG));
        }
    }

    fn compose_entities(&mut self, world: &WorldController, map: &ScreenMap) {
        let player = world.player();
        let draw = |front: &mut FrameBuffer, entity: &Entity| {
            let (ch, fg) = entity_glyph(entity);
            if let Some((cols, rows)) = map.span(world.project_rect(entity.body.bounds)) {
                for y in rows {
                    for x in cols.clone() {
                        let bg = front.get(x, y).bg;
                        front.set(x, y, Cell::new(ch, fg, bg));
                    }
                }
            }
        };
        for (handle, entity) in world.entities().iter() {
            if Some(handle) != player {
                draw(&mut self.front, entity);
            }
        }
        // Player on top.
        if let Some(entity) = player.and_then(|h| world.entity(h)) {
            draw(&mut self.front, entity);
        }
    }

    fn compose_popups(&mut self, world: &WorldController, map: &ScreenMap) {
        for popup in world.popups() {
            let Some((x, y)) = map.point(world.project(popup.position)) else {
                continue;
            };
            let fg = if popup.alpha > 0.5 { Color::White } else { Color::DarkGrey };
            let len = popup.text.chars().count();
            let x = x.saturating_sub(len / 2);
            for (i, ch) in popup.text.chars().enumerate() {
                let bg = self.front.get(x + i, y).bg;
                self.front.set(x + i, y, Cell::new(ch, fg, bg));
            }
        }
    }

    fn compose_hud(&mut self, world: &WorldController) {
        let level = world.level();
        let time_label = if level.countdown_ms > 0 { "Left" } else { "Time" };
        let hud = format!(
            " {}  Score:{:<7} {}:{}  Zoom:{:.2}  {} ",
            if level.title.is_empty() { "Untitled" } else { &level.title },
            world.score(),
            time_label,
            format_time(world.elapsed_time() as i64),
            world.camera().zoom(),
            state_label(world.world_state()),
        );
        self.front.fill_row(HUD_ROW, HUD_BG);
        self.front.put_str(0, HUD_ROW, &hud, Color::White, HUD_BG);
    }

    fn compose_help(&mut self, map: &ScreenMap) {
        let help_row = map.top + map.rows;
        let help = " ←/→:Walk  ↑/Space:Jump  E:Use  +/-:Zoom  P:Pause  Esc:Quit";
        self.front.put_str(0, help_row, help, Color::DarkGrey, Color::Reset);
    }

    /// Dark box centred on the map area. Returns its top-left corner.
    fn overlay_box(&mut self, map: &ScreenMap, w: usize, h: usize) -> (usize, usize) {
        let box_w = w.min(map.cols);
        let box_h = h.min(map.rows);
        let x = (map.cols - box_w) / 2;
        let y = map.top + (map.rows - box_h) / 2;
        self.front.fill(x..x + box_w, y..y + box_h, Cell::new(' ', Color::White, OVERLAY_BG));
        (x, y)
    }

    fn compose_pause_overlay(&mut self, world: &WorldController, map: &ScreenMap) {
        let hdr = Color::Rgb { r: 255, g: 220, b: 50 };
        let key_c = Color::Rgb { r: 100, g: 200, b: 255 };
        let blink = (world.now_ms() / 500) % 2 == 0;

        let (x, y) = self.overlay_box(map, 30, 6);
        let label = if blink { "▶  PAUSED  ◀" } else { "   PAUSED   " };
        self.front.put_str(x + 9, y + 1, label, hdr, OVERLAY_BG);
        self.front.put_str(x + 2, y + 3, "P    Resume", key_c, OVERLAY_BG);
        self.front.put_str(x + 2, y + 4, "Esc  Quit", key_c, OVERLAY_BG);
    }

    fn compose_stats_overlay(&mut self, world: &WorldController, map: &ScreenMap, records: &Records) {
        let hdr = Color::Rgb { r: 255, g: 220, b: 50 };
        let new_c = Color::Rgb { r: 80, g: 255, b: 80 };
        let key_c = Color::Rgb { r: 100, g: 200, b: 255 };
        let level = world.level();

        let (x, y) = self.overlay_box(map, 36, 9);
        self.front.put_str(x + 2, y + 1, "LEVEL COMPLETE", hdr, OVERLAY_BG);

        let score = format!("Score  {:<8} Best {}", records.score, level.high_score);
        self.front.put_str(x + 2, y + 3, &score, Color::White, OVERLAY_BG);
        if records.new_high_score {
            self.front.put_str(x + 2, y + 4, "New high score!", new_c, OVERLAY_BG);
        }

        let time = format!(
            "Time   {:<8} Best {}",
            format_time(records.time_ms),
            format_time(level.best_time_ms)
        );
        self.front.put_str(x + 2, y + 5, &time, Color::White, OVERLAY_BG);
        if records.new_best_time {
            self.front.put_str(x + 2, y + 6, "New best time!", new_c, OVERLAY_BG);
        }

        self.front.put_str(x + 2, y + 8, "Enter: Play again  Esc: Quit", key_c, OVERLAY_BG);
    }
}
