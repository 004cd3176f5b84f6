/// Level metadata, world discovery and the built-in demo layout.
///
/// ## Sources (priority order):
///   1. `worlds/` directories next to the executable, in the CWD, or in
///      the XDG data dir (`.json` world files, see `sim::save`)
///   2. Built-in embedded layout
///
/// ## Layout format (embedded demo and `build_layout`):
///   One string per row, top row first. Row 0 of the grid is the last
///   string, so the text reads the way the world is drawn.
///
/// ## Legend:
///   '#' = Ground (tile set 0)      '=' = Stone (tile set 1)
///   'P' = Player / start area      'F' = Finish area
///   'd' = Diamond                  'c' = Chocolate bar
///   's' = Snail                    'j' = Jumper
///   'b' = Box                      'o' = Springboard
///   '^' = Spikes                   'e' = Electric trap
///   'S' = Switch                   '_' = Platform
///   '<' = Treadmill (left)         '>' = Treadmill (right)
///   ' ' = Empty

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::geom::Rect;
use crate::domain::tile::CELL;
use crate::error::WorldError;
use crate::sim::catalog::EntityFactory;
use crate::sim::world::WorldController;

/// Water surface scroll speeds, indexed by `LevelInfo::water_speed_id`.
pub const WATER_SPEEDS: [f32; 5] = [150.0, 50.0, 0.0, -50.0, -150.0];
pub const DEFAULT_WATER_SPEED_ID: usize = 1;

/// Scroll speed for a speed id. Out-of-range ids fall back to the default.
pub fn water_speed(id: usize) -> f32 {
    WATER_SPEEDS
        .get(id)
        .copied()
        .unwrap_or(WATER_SPEEDS[DEFAULT_WATER_SPEED_ID])
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub enum Difficulty {
    #[default]
    Easy,
    Medium,
    Hard,
}

/// Descriptive and gameplay metadata stored with every world.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelInfo {
    pub title: String,
    pub creator: String,
    pub difficulty: Difficulty,
    pub high_score: i32,
    /// Best completion time in ms; 0 means none recorded.
    pub best_time_ms: i64,
    /// 0 disables the countdown.
    pub countdown_ms: u64,
    pub background: String,
    pub foreground: String,
    pub environment_sound: String,
    pub water_id: i32,
    pub water_speed_id: usize,
    pub start_area: Rect,
    pub finish_area: Rect,
}

impl Default for LevelInfo {
    fn default() -> Self {
        LevelInfo {
            title: String::new(),
            creator: String::new(),
            difficulty: Difficulty::Easy,
            high_score: 0,
            best_time_ms: 0,
            countdown_ms: 0,
            background: String::new(),
            foreground: String::new(),
            environment_sound: String::new(),
            water_id: 0,
            water_speed_id: DEFAULT_WATER_SPEED_ID,
            start_area: Rect::new(0.0, CELL, CELL, CELL),
            finish_area: Rect::new(0.0, 0.0, CELL, CELL),
        }
    }
}

impl LevelInfo {
    pub fn water_speed(&self) -> f32 {
        water_speed(self.water_speed_id)
    }
}

/// A world file found on disk, as shown in a world list.
#[derive(Clone, Debug)]
pub struct WorldEntry {
    pub path: PathBuf,
    pub info: LevelInfo,
}

// ══════════════════════════════════════════════════════════════
// Discovery
// ══════════════════════════════════════════════════════════════

/// List the world files in `dir`, sorted by file name. Files whose
/// header cannot be read are skipped with a warning.
pub fn scan_worlds(dir: &Path) -> Vec<WorldEntry> {
    let mut found = vec![];
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return found,
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.extension().is_some_and(|e| e == "json") {
            continue;
        }
        match crate::sim::save::read_level_info(&path) {
            Ok(info) => found.push(WorldEntry { path, info }),
            Err(err) => warn!(path = %path.display(), %err, "skipping unreadable world"),
        }
    }

    found.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));
    debug!(dir = %dir.display(), count = found.len(), "scanned worlds");
    found
}

/// Directories that may contain a `worlds/` folder: exe dir, CWD,
/// XDG data home.
pub fn world_search_dirs() -> Vec<PathBuf> {
    let mut dirs = vec![];

    if let Ok(exe) = std::env::current_exe() {
        let resolved = exe.canonicalize().unwrap_or(exe);
        if let Some(parent) = resolved.parent() {
            dirs.push(parent.to_path_buf());
        }
    }

    if let Ok(cwd) = std::env::current_dir() {
        if !dirs.iter().any(|d| d == &cwd) {
            dirs.push(cwd);
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        let xdg = PathBuf::from(&home).join(".local/share/tileworld");
        if xdg.is_dir() && !dirs.iter().any(|d| d == &xdg) {
            dirs.push(xdg);
        }
    }

    if dirs.is_empty() {
        dirs.push(PathBuf::from("."));
    }
    dirs
}

/// Resolve a world name or path. Absolute and existing relative paths
/// win; otherwise `<dir>/<name>` and `<dir>/<name>.json` are tried in
/// `worlds_dir` and each search dir's `worlds/`.
pub fn resolve_world(name: &str, worlds_dir: &Path) -> Option<PathBuf> {
    let direct = PathBuf::from(name);
    if direct.is_file() {
        return Some(direct);
    }

    let mut bases = vec![worlds_dir.to_path_buf()];
    bases.extend(world_search_dirs().into_iter().map(|d| d.join("worlds")));

    for base in bases {
        for candidate in [base.join(name), base.join(format!("{name}.json"))] {
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

// ══════════════════════════════════════════════════════════════
// Text layouts
// ══════════════════════════════════════════════════════════════

/// Build a fresh world from a text layout. Rows are padded to the widest
/// one. Unknown characters are ignored.
pub fn build_layout(
    world: &mut WorldController,
    info: LevelInfo,
    rows: &[&str],
    factory: &EntityFactory,
) -> Result<(), WorldError> {
    let height = rows.len();
    let width = rows.iter().map(|r| r.chars().count()).max().unwrap_or(0);
    world.create_world(width, height);
    *world.level_mut() = info;

    let mut player = None;
    for (line, row) in rows.iter().enumerate() {
        let y = (height - 1 - line) as i32;
        for (x, ch) in row.chars().enumerate() {
            let x = x as i32;
            let px = x as f32 * CELL + CELL / 2.0;
            let py = y as f32 * CELL;
            let key = match ch {
                '#' => {
                    world.set_cell(x, y, 0);
                    continue;
                }
                '=' => {
                    world.set_cell(x, y, 1);
                    continue;
                }
                'P' => {
                    world.level_mut().start_area = Rect::new(x as f32 * CELL, py, CELL, CELL);
                    "player"
                }
                'F' => {
                    world.level_mut().finish_area = Rect::new(x as f32 * CELL, py, CELL, CELL);
                    continue;
                }
                'd' => "diamond",
                'c' => "chocolate_bar",
                's' => "snail",
                'j' => "jumper",
                'b' => "box",
                'o' => "springboard",
                '^' => "spikes_up",
                'e' => "electric_trap",
                'S' => "switch",
                '_' => "platform",
                '<' => "treadmill_left",
                '>' => "treadmill_right",
                _ => continue,
            };

            let entity = factory.create(key)?;
            // Bottom-centre anchoring matches how entities stand on cells.
            let w = entity.body.bounds.width;
            let handle = world.add_entity(entity, px - w / 2.0, py, false);
            if ch == 'P' {
                player = Some(handle);
            }
        }
    }

    world.update_tiles();
    if player.is_some() {
        world.set_player(player);
    }
    world.reset_timer();
    Ok(())
}

/// Load the embedded demo world.
pub fn load_demo(world: &mut WorldController, factory: &EntityFactory) -> Result<(), WorldError> {
    let info = LevelInfo {
        title: "Demo Valley".to_string(),
        creator: "Tile World".to_string(),
        ..LevelInfo::default()
    };
    build_layout(world, info, DEMO_LAYOUT, factory)
}

const DEMO_LAYOUT: &[&str] = &[
    "                                        ",
    "                 d   d                  ",
    "               =======          c c   F ",
    "                                ####### ",
    "          c  ___                        ",
    "         ####       S      e       d    ",
    "   d          <<<<  ##########  ####    ",
    "  ###                                  #",
    "                 j            ^     b  #",
    " P    c   s   o     >>>>   ########### #",
    "######################  ################",
    "######################==################",
];
