/// World files: a versioned JSON snapshot of grid, level and entities.
///
/// ## Layout (in order)
///
///   - `version`, `columns`, `rows`
///   - `level` metadata and `water_height`
///   - `cells`: only non-empty cells, as `(x, y, tile_set_id)`
///   - `entities`: type key plus simulation fields, in update order
///   - `player`: index into `entities`, if any
///   - `next_entity_id`
///
/// Frames, alpha and wall-clock timers are not stored. A loaded world
/// fades its entities back in and restarts every routine.
///
/// ## Writes
///
/// The file is written to `<name>.tmp` next to the target and renamed
/// over it, so a crash never leaves a half-written world behind.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::entity::{Direction, EntityState, HAlign, VAlign};
use crate::domain::geom::Rect;
use crate::domain::tile::EMPTY;
use crate::error::WorldError;
use crate::sim::behavior::Entity;
use crate::sim::catalog::EntityFactory;
use crate::sim::level::LevelInfo;
use crate::sim::world::WorldController;

pub const WORLD_FILE_VERSION: u32 = 1;

// ══════════════════════════════════════════════════════════════
// Schema
// ══════════════════════════════════════════════════════════════

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldFile {
    pub version: u32,
    pub columns: usize,
    pub rows: usize,
    #[serde(default)]
    pub level: LevelInfo,
    #[serde(default)]
    pub water_height: f32,
    pub cells: Vec<CellRecord>,
    pub entities: Vec<EntityRecord>,
    pub player: Option<usize>,
    pub next_entity_id: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CellRecord {
    pub x: i32,
    pub y: i32,
    pub tile_set_id: i32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub kind: String,
    pub id: u32,
    pub name: String,
    pub alive: bool,
    pub bounds: Rect,
    pub score: i32,
    pub movement_speed: f32,
    pub jump_height: f32,
    pub horizontal_force: f32,
    pub vertical_force: f32,
    pub direction: Direction,
    pub state: EntityState,
    pub on_ground: bool,
    pub blocking: bool,
    pub ignore_gravity: bool,
    pub h_align: HAlign,
    pub v_align: VAlign,
    pub power_id: i32,
    pub power_on: bool,
    pub power_supported: bool,
    pub routine_mode: i32,
}

impl EntityRecord {
    fn capture(entity: &Entity) -> Self {
        let b = &entity.body;
        EntityRecord {
            kind: entity.type_key().to_string(),
            id: b.id,
            name: b.name.clone(),
            alive: b.is_alive,
            bounds: b.bounds,
            score: b.score,
            movement_speed: b.movement_speed,
            jump_height: b.jump_height,
            horizontal_force: b.horizontal_force,
            vertical_force: b.vertical_force,
            direction: b.direction,
            state: b.state,
            on_ground: b.is_on_ground,
            blocking: b.is_blocking_space,
            ignore_gravity: b.ignore_gravity,
            h_align: b.h_align,
            v_align: b.v_align,
            power_id: b.power_id,
            power_on: b.is_power_on,
            power_supported: b.is_power_supported,
            routine_mode: b.routine_mode,
        }
    }

    fn instantiate(&self, factory: &EntityFactory) -> Result<Entity, WorldError> {
        let mut entity = factory.create(&self.kind)?;
        let b = &mut entity.body;
        b.id = self.id;
        b.name = self.name.clone();
        b.is_alive = self.alive;
        b.bounds = self.bounds;
        b.score = self.score;
        b.movement_speed = self.movement_speed;
        b.jump_height = self.jump_height;
        b.horizontal_force = self.horizontal_force;
        b.vertical_force = self.vertical_force;
        b.direction = self.direction;
        b.state = self.state;
        b.is_on_ground = self.on_ground;
        b.is_blocking_space = self.blocking;
        b.ignore_gravity = self.ignore_gravity;
        b.h_align = self.h_align;
        b.v_align = self.v_align;
        b.power_id = self.power_id;
        b.is_power_on = self.power_on;
        b.is_power_supported = self.power_supported;
        b.routine_mode = self.routine_mode;
        Ok(entity)
    }
}

/// Just enough of a world file for a world list.
#[derive(Deserialize)]
struct Header {
    version: u32,
    #[serde(default)]
    level: LevelInfo,
}

// ══════════════════════════════════════════════════════════════
// Capture / restore
// ══════════════════════════════════════════════════════════════

pub fn capture(world: &WorldController) -> WorldFile {
    let grid = world.grid();
    let cells = grid
        .non_empty_cells()
        .map(|c| CellRecord {
            x: c.x,
            y: c.y,
            tile_set_id: c.tile_set_id,
        })
        .collect();

    let registry = world.entities();
    let mut entities = Vec::with_capacity(registry.len());
    let mut player = None;
    for (handle, entity) in registry.iter() {
        if registry.player() == Some(handle) {
            player = Some(entities.len());
        }
        entities.push(EntityRecord::capture(entity));
    }

    WorldFile {
        version: WORLD_FILE_VERSION,
        columns: grid.columns(),
        rows: grid.rows(),
        level: world.level().clone(),
        water_height: grid.water_height,
        cells,
        entities,
        player,
        next_entity_id: registry.next_id(),
    }
}

/// Replace the world with the file's contents. The file is checked and
/// every entity is built before anything is touched, so a failed
/// restore leaves the world as it was.
pub fn restore(
    world: &mut WorldController,
    file: &WorldFile,
    factory: &EntityFactory,
) -> Result<(), WorldError> {
    if file.version != WORLD_FILE_VERSION {
        return Err(WorldError::UnsupportedVersion(file.version));
    }
    for c in &file.cells {
        let inside = c.x >= 0 && c.y >= 0 && (c.x as usize) < file.columns && (c.y as usize) < file.rows;
        if !inside {
            return Err(WorldError::CellOutOfRange {
                x: c.x,
                y: c.y,
                columns: file.columns,
                rows: file.rows,
            });
        }
    }
    if let Some(index) = file.player {
        if index >= file.entities.len() {
            return Err(WorldError::PlayerOutOfRange {
                index,
                count: file.entities.len(),
            });
        }
    }
    let entities = file
        .entities
        .iter()
        .map(|r| r.instantiate(factory))
        .collect::<Result<Vec<_>, _>>()?;
    let fallback_player = match file.player {
        Some(_) => None,
        None => Some(factory.create("player")?),
    };

    world.create_world(file.columns, file.rows);
    *world.level_mut() = file.level.clone();
    world.set_water_height(file.water_height);
    for c in &file.cells {
        if c.tile_set_id != EMPTY {
            world.set_cell(c.x, c.y, c.tile_set_id);
        }
    }

    let mut player = None;
    for (index, entity) in entities.into_iter().enumerate() {
        let handle = world.entities.insert(entity);
        if file.player == Some(index) {
            player = Some(handle);
        }
    }
    world.entities.set_next_id(file.next_entity_id);

    // The player always starts a loaded world on the start area.
    let start = world.level().start_area;
    match (player, fallback_player) {
        (Some(handle), _) => {
            if let Some(p) = world.entity_mut(handle) {
                p.body.set_position(start.x, start.y, false);
            }
            world.set_player(Some(handle));
        }
        (None, Some(entity)) => {
            let handle = world.add_entity(entity, start.x, start.y, false);
            world.set_player(Some(handle));
        }
        (None, None) => {}
    }

    world.update_tiles();
    world.reset_timer();
    Ok(())
}

// ══════════════════════════════════════════════════════════════
// Files
// ══════════════════════════════════════════════════════════════

pub fn save_world(path: &Path, world: &WorldController) -> Result<(), WorldError> {
    let file = capture(world);
    let bytes = serde_json::to_vec_pretty(&file)?;
    write_bytes_atomic(path, &bytes).map_err(|e| WorldError::io(path, e))?;
    info!(path = %path.display(), entities = file.entities.len(), "world saved");
    Ok(())
}

/// Load a world file. On any failure the world is reset to an empty
/// one and the error is returned.
pub fn load_world(
    path: &Path,
    world: &mut WorldController,
    factory: &EntityFactory,
) -> Result<(), WorldError> {
    let result = read_world_file(path).and_then(|file| restore(world, &file, factory));
    match &result {
        Ok(()) => info!(
            path = %path.display(),
            title = %world.level().title,
            entities = world.entities().len(),
            "world loaded"
        ),
        Err(err) => {
            warn!(path = %path.display(), %err, "world load failed");
            world.reset_world();
        }
    }
    result
}

pub fn read_world_file(path: &Path) -> Result<WorldFile, WorldError> {
    let bytes = fs::read(path).map_err(|e| WorldError::io(path, e))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Read only the version and level metadata.
pub fn read_level_info(path: &Path) -> Result<LevelInfo, WorldError> {
    let bytes = fs::read(path).map_err(|e| WorldError::io(path, e))?;
    let header: Header = serde_json::from_slice(&bytes)?;
    if header.version != WORLD_FILE_VERSION {
        return Err(WorldError::UnsupportedVersion(header.version));
    }
    Ok(header.level)
}

fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = temp_path_for(path);
    fs::write(&tmp_path, bytes)?;

    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }
    }
    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("world.json");
    let tmp_name = format!("{file_name}.tmp");
    match path.parent() {
        Some(parent) => parent.join(tmp_name),
        None => PathBuf::from(tmp_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tile::CELL;
    use crate::sim::catalog;
    use crate::sim::clock::ManualClock;

    fn world() -> WorldController {
        WorldController::new(Box::new(ManualClock::new(1)), 640.0, 480.0)
    }

    /// 8x5 world: a ground strip, a stone block, a snail, a powered
    /// switch and the player.
    fn sample() -> WorldController {
        let mut w = world();
        w.create_world(8, 5);
        w.level_mut().title = "Sample".into();
        w.level_mut().start_area = Rect::new(2.0 * CELL, CELL, CELL, CELL);
        w.set_water_height(40.0);
        w.set_cell_region(Rect::new(0.0, 0.0, 8.0 * CELL, 1.0), 0);
        w.set_cell_region(Rect::new(5.0 * CELL, CELL, 1.0, 1.0), 1);
        w.add_entity(catalog::snail(), 100.0, CELL, false);
        let s = w.add_entity(catalog::switch(), 300.0, CELL, false);
        w.entity_mut(s).unwrap().body.is_power_on = true;
        w.entity_mut(s).unwrap().body.power_id = 3;
        let p = w.add_entity(catalog::player(), 400.0, CELL, false);
        w.set_player(Some(p));
        w
    }

    // ── Capture ──

    #[test]
    fn capture_lists_only_non_empty_cells() {
        let file = capture(&sample());
        assert_eq!(file.version, WORLD_FILE_VERSION);
        assert_eq!((file.columns, file.rows), (8, 5));
        assert_eq!(file.cells.len(), 9);
        assert!(file.cells.contains(&CellRecord { x: 5, y: 1, tile_set_id: 1 }));
        assert_eq!(file.water_height, 40.0);
    }

    #[test]
    fn capture_records_player_index_and_ids() {
        let file = capture(&sample());
        let kinds: Vec<_> = file.entities.iter().map(|e| e.kind.as_str()).collect();
        assert_eq!(kinds, ["snail", "switch", "player"]);
        assert_eq!(file.player, Some(2));
        assert_eq!(file.next_entity_id, 4);
    }

    // ── Restore ──

    #[test]
    fn file_round_trip_restores_world() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worlds").join("sample.json");
        let original = sample();
        save_world(&path, &original).unwrap();
        assert!(!dir.path().join("worlds").join("sample.json.tmp").exists());

        let mut w = world();
        load_world(&path, &mut w, &EntityFactory::with_builtin()).unwrap();

        assert_eq!(w.level().title, "Sample");
        assert_eq!(w.water_height(), 40.0);
        assert_eq!(w.grid().cell(5, 1).map(|c| c.tile_set_id), Some(1));
        assert_eq!(w.entities().len(), 3);
        assert_eq!(w.entities().next_id(), 4);

        let switch = w.entities().find_by_id(2).and_then(|h| w.entity(h)).unwrap();
        assert_eq!(switch.type_key(), "switch");
        assert!(switch.body.is_power_on);
        assert_eq!(switch.body.power_id, 3);
        assert_eq!(switch.body.alpha, 0.0);

        // Player is moved to the start area.
        let player = w.player().and_then(|h| w.entity(h)).unwrap();
        assert_eq!(player.body.bounds.x, 2.0 * CELL);
        assert_eq!(player.body.bounds.y, CELL);
        assert_eq!(capture(&w).cells, capture(&original).cells);
    }

    #[test]
    fn missing_player_is_created_at_start() {
        let mut file = capture(&sample());
        file.entities.pop();
        file.player = None;
        file.next_entity_id = 3;

        let mut w = world();
        restore(&mut w, &file, &EntityFactory::with_builtin()).unwrap();
        let player = w.player().and_then(|h| w.entity(h)).unwrap();
        assert_eq!(player.type_key(), "player");
        assert_eq!(player.body.id, 3);
        assert_eq!(player.body.bounds.x, 2.0 * CELL);
    }

    #[test]
    fn restore_rejects_bad_files_without_touching_world() {
        let factory = EntityFactory::with_builtin();
        let mut w = sample();
        let good = capture(&w);

        let mut bad = good.clone();
        bad.version = 7;
        assert!(matches!(restore(&mut w, &bad, &factory), Err(WorldError::UnsupportedVersion(7))));

        let mut bad = good.clone();
        bad.cells.push(CellRecord { x: 8, y: 0, tile_set_id: 0 });
        assert!(matches!(
            restore(&mut w, &bad, &factory),
            Err(WorldError::CellOutOfRange { x: 8, y: 0, .. })
        ));

        let mut bad = good.clone();
        bad.player = Some(3);
        assert!(matches!(
            restore(&mut w, &bad, &factory),
            Err(WorldError::PlayerOutOfRange { index: 3, count: 3 })
        ));

        let mut bad = good.clone();
        bad.entities[0].kind = "dragon".into();
        assert!(matches!(restore(&mut w, &bad, &factory), Err(WorldError::UnknownEntityType(_))));

        assert_eq!(w.entities().len(), 3);
        assert_eq!(w.level().title, "Sample");
    }

    #[test]
    fn failed_load_resets_world() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let mut w = sample();
        let err = load_world(&path, &mut w, &EntityFactory::with_builtin()).unwrap_err();
        assert!(matches!(err, WorldError::Format(_)));
        assert!(w.entities().is_empty());
        assert_eq!(w.grid().columns(), 0);

        let err = load_world(&dir.path().join("absent.json"), &mut w, &EntityFactory::with_builtin())
            .unwrap_err();
        assert!(matches!(err, WorldError::Io { .. }));
    }

    #[test]
    fn level_info_reads_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.json");
        save_world(&path, &sample()).unwrap();
        assert_eq!(read_level_info(&path).unwrap().title, "Sample");

        std::fs::write(&path, br#"{"version": 9, "anything": []}"#).unwrap();
        assert!(matches!(read_level_info(&path), Err(WorldError::UnsupportedVersion(9))));
    }

    #[test]
    fn saving_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("w.json");
        std::fs::write(&path, b"old").unwrap();
        save_world(&path, &sample()).unwrap();
        assert!(read_world_file(&path).is_ok());
    }
}
