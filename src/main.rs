/// Terminal preview: plays one world file in the terminal.
///
/// Usage: `tileworld [WORLD]`, where WORLD is a path or a name looked up
/// in the worlds directory. Without one, `general.start_world` from
/// `config.toml` is used, and without that the built-in demo.

mod ui;

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use crossterm::event::KeyCode;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use tileworld::config::{GameConfig, LoggingConfig};
use tileworld::sim::audio;
use tileworld::sim::catalog::EntityFactory;
use tileworld::sim::level;
use tileworld::sim::records::Records;
use tileworld::sim::save;
use tileworld::sim::world::{WorldController, WorldState};
use tileworld::WorldError;
use ui::input::{InputState, KeyBindings};
use ui::renderer::Renderer;

/// Initial viewport until the renderer measures the terminal.
const INITIAL_VIEWPORT: (f32, f32) = (2560.0, 1408.0);

fn main() {
    let config = GameConfig::load();
    init_tracing(&config.logging);
    for warning in &config.load_warnings {
        warn!("config: {warning}");
    }

    let (keys, unknown) = KeyBindings::from_config(&config.controls);
    for name in unknown {
        warn!(key = %name, "unknown key name in config, ignored");
    }

    let factory = EntityFactory::with_builtin();
    let mut world = WorldController::with_system_clock(INITIAL_VIEWPORT.0, INITIAL_VIEWPORT.1);
    let source = world_source(&config);
    if let Err(e) = start_world(&mut world, source.as_deref(), &factory) {
        error!(error = %e, "could not start a world");
        eprintln!("Could not start a world: {e}");
        return;
    }

    let mut renderer = Renderer::new(config.display.units_per_column, config.display.units_per_row);
    if let Err(e) = renderer.init() {
        error!(error = %e, "terminal init failed");
        eprintln!("Terminal init failed: {e}");
        return;
    }

    let mut session = Session {
        world,
        factory,
        source,
        stats: None,
    };
    let result = game_loop(&mut session, &mut renderer, &keys, &config);

    if let Err(e) = renderer.cleanup() {
        error!(error = %e, "terminal cleanup failed");
        eprintln!("Terminal cleanup failed: {e}");
    }
    if let Err(e) = result {
        error!(error = %e, "game loop failed");
        eprintln!("Game error: {e}");
    }

    println!();
    let score = session.stats.map_or(session.world.score(), |r| r.score);
    println!("Final Score: {score}");
}

/// `RUST_LOG` wins over the configured filter. The terminal belongs to
/// the renderer, so output goes to the log file.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let file = match File::create(&logging.file) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Warning: could not open log file {}: {e}", logging.file.display());
            return;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .compact()
        .with_writer(Mutex::new(file))
        .init();
}

// ── World selection ──

struct Session {
    world: WorldController,
    factory: EntityFactory,
    /// World file being played; `None` for the demo.
    source: Option<PathBuf>,
    /// Set while the end-of-run overlay is up.
    stats: Option<Records>,
}

fn world_source(config: &GameConfig) -> Option<PathBuf> {
    let name = std::env::args()
        .nth(1)
        .or_else(|| Some(config.general.start_world.clone()).filter(|s| !s.is_empty()))?;

    let found = level::resolve_world(&name, &config.general.worlds_dir);
    if found.is_none() {
        warn!(world = %name, "world not found, playing the demo");
    }
    found
}

/// Load the world file, or the demo when there is none or it is broken.
fn start_world(
    world: &mut WorldController,
    source: Option<&Path>,
    factory: &EntityFactory,
) -> Result<(), WorldError> {
    let loaded = match source {
        Some(path) => save::load_world(path, world, factory).is_ok(),
        None => false,
    };
    if !loaded {
        level::load_demo(world, factory)?;
    }
    world.set_paused(false);
    world.set_live(true);
    Ok(())
}

// ── Frame loop ──

fn game_loop(
    session: &mut Session,
    renderer: &mut Renderer,
    keys: &KeyBindings,
    config: &GameConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut input = InputState::new();
    let frame_sleep = Duration::from_millis(config.display.frame_sleep_ms);

    loop {
        input.drain_events();
        if input.ctrl_c_pressed() || input.any_pressed(&keys.quit) {
            break;
        }

        if session.stats.is_some() {
            if input.any_pressed(&keys.use_key) || input.was_pressed(KeyCode::Enter) {
                session.stats = None;
                restart(session)?;
            }
        } else {
            handle_controls(&mut session.world, &input, keys);
        }

        renderer.sync_viewport(&mut session.world)?;
        session.world.update();
        play_events(&mut session.world);

        match session.world.world_state() {
            WorldState::Restart => restart(session)?,
            WorldState::ViewStats if session.stats.is_none() => {
                session.stats = Some(finish_run(session));
            }
            WorldState::BackToMenu => break,
            _ => {}
        }

        renderer.render(&session.world, session.stats.as_ref())?;
        thread::sleep(frame_sleep);
    }

    Ok(())
}

fn handle_controls(world: &mut WorldController, input: &InputState, keys: &KeyBindings) {
    if input.any_pressed(&keys.pause) {
        let paused = !world.is_paused();
        world.set_paused(paused);
        info!(paused, "pause toggled");
    }
    if input.any_pressed(&keys.zoom_in) {
        world.zoom_in();
    }
    if input.any_pressed(&keys.zoom_out) {
        world.zoom_out();
    }

    let player_input = if world.is_paused() {
        Default::default()
    } else {
        input.player_input(keys)
    };
    world.set_player_input(player_input);
}

/// No audio backend in the terminal: cues are resolved and logged.
fn play_events(world: &mut WorldController) {
    let events = world.drain_events();
    for cue in audio::mix(&events, world.camera()) {
        debug!(cue = ?cue.cue, volume = cue.volume, pan = cue.pan, "sound");
    }
}

fn restart(session: &mut Session) -> Result<(), WorldError> {
    info!("restarting world");
    start_world(&mut session.world, session.source.as_deref(), &session.factory)
}

/// Evaluate the run and store beaten records. The file is reloaded
/// before saving so the played-through state never reaches disk.
fn finish_run(session: &mut Session) -> Records {
    let world = &mut session.world;
    let records = Records::evaluate(world.level(), world.score(), world.elapsed_time());
    info!(
        score = records.score,
        time_ms = records.time_ms,
        new_high_score = records.new_high_score,
        new_best_time = records.new_best_time,
        "run finished"
    );

    if records.new_high_score || records.new_best_time {
        match session.source.as_deref() {
            Some(path) => {
                let saved = save::load_world(path, world, &session.factory).and_then(|()| {
                    records.apply(world.level_mut());
                    save::save_world(path, world)
                });
                if let Err(e) = saved {
                    error!(path = %path.display(), error = %e, "could not store records");
                }
            }
            None => records.apply(world.level_mut()),
        }
    }

    world.set_paused(true);
    records
}
