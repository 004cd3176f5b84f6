/// External configuration loader for the terminal preview.
///
/// Reads `config.toml` from the executable's directory, the CWD or the
/// XDG data dir. A missing file or missing keys fall back to defaults.
/// Loading never fails: problems are collected in `load_warnings` and
/// logged once tracing is up.

use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "config.toml";

// ── Public Config Struct ──

#[derive(Clone, Debug)]
pub struct GameConfig {
    pub general: GeneralConfig,
    pub display: DisplayConfig,
    pub controls: ControlsConfig,
    pub logging: LoggingConfig,
    /// Non-fatal problems hit while loading.
    pub load_warnings: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct GeneralConfig {
    pub worlds_dir: PathBuf,
    /// World file played when none is given on the command line.
    /// Empty means the built-in demo.
    pub start_world: String,
}

#[derive(Clone, Debug)]
pub struct DisplayConfig {
    pub frame_sleep_ms: u64,
    /// World units covered by one terminal column.
    pub units_per_column: f32,
    /// World units covered by one terminal row.
    pub units_per_row: f32,
}

#[derive(Clone, Debug)]
pub struct ControlsConfig {
    pub left: Vec<String>,
    pub right: Vec<String>,
    pub jump: Vec<String>,
    pub use_key: Vec<String>,
    pub zoom_in: Vec<String>,
    pub zoom_out: Vec<String>,
    pub pause: Vec<String>,
    pub quit: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    pub file: PathBuf,
}

// ── TOML Schema (with serde defaults) ──

#[derive(Deserialize, Debug, Default)]
struct TomlConfig {
    #[serde(default)]
    general: TomlGeneral,
    #[serde(default)]
    display: TomlDisplay,
    #[serde(default)]
    controls: TomlControls,
    #[serde(default)]
    logging: TomlLogging,
}

#[derive(Deserialize, Debug)]
struct TomlGeneral {
    #[serde(default = "default_worlds_dir")]
    worlds_dir: String,
    #[serde(default)]
    start_world: String,
}

#[derive(Deserialize, Debug)]
struct TomlDisplay {
    #[serde(default = "default_frame_sleep")]
    frame_sleep_ms: u64,
    #[serde(default = "default_units_per_column")]
    units_per_column: f32,
    #[serde(default = "default_units_per_row")]
    units_per_row: f32,
}

#[derive(Deserialize, Debug)]
struct TomlControls {
    #[serde(default = "default_left")]
    left: Vec<String>,
    #[serde(default = "default_right")]
    right: Vec<String>,
    #[serde(default = "default_jump")]
    jump: Vec<String>,
    #[serde(default = "default_use", rename = "use")]
    use_key: Vec<String>,
    #[serde(default = "default_zoom_in")]
    zoom_in: Vec<String>,
    #[serde(default = "default_zoom_out")]
    zoom_out: Vec<String>,
    #[serde(default = "default_pause")]
    pause: Vec<String>,
    #[serde(default = "default_quit")]
    quit: Vec<String>,
}

#[derive(Deserialize, Debug)]
struct TomlLogging {
    #[serde(default = "default_filter")]
    filter: String,
    #[serde(default = "default_log_file")]
    file: String,
}

// ── Defaults ──

fn default_worlds_dir() -> String { "worlds".into() }
fn default_frame_sleep() -> u64 { 16 }
fn default_units_per_column() -> f32 { 32.0 }
fn default_units_per_row() -> f32 { 64.0 }   // terminal cells are ~2:1

fn default_left() -> Vec<String> { vec!["Left".into(), "a".into()] }
fn default_right() -> Vec<String> { vec!["Right".into(), "d".into()] }
fn default_jump() -> Vec<String> { vec!["Up".into(), "w".into(), "Space".into()] }
fn default_use() -> Vec<String> { vec!["e".into(), "Enter".into()] }
fn default_zoom_in() -> Vec<String> { vec!["+".into(), "=".into()] }
fn default_zoom_out() -> Vec<String> { vec!["-".into()] }
fn default_pause() -> Vec<String> { vec!["p".into(), "F1".into()] }
fn default_quit() -> Vec<String> { vec!["Esc".into(), "q".into()] }

fn default_filter() -> String { "info".into() }
fn default_log_file() -> String { "tileworld.log".into() }

impl Default for TomlGeneral {
    fn default() -> Self {
        TomlGeneral {
            worlds_dir: default_worlds_dir(),
            start_world: String::new(),
        }
    }
}

impl Default for TomlDisplay {
    fn default() -> Self {
        TomlDisplay {
            frame_sleep_ms: default_frame_sleep(),
            units_per_column: default_units_per_column(),
            units_per_row: default_units_per_row(),
        }
    }
}

impl Default for TomlControls {
    fn default() -> Self {
        TomlControls {
            left: default_left(),
            right: default_right(),
            jump: default_jump(),
            use_key: default_use(),
            zoom_in: default_zoom_in(),
            zoom_out: default_zoom_out(),
            pause: default_pause(),
            quit: default_quit(),
        }
    }
}

impl Default for TomlLogging {
    fn default() -> Self {
        TomlLogging {
            filter: default_filter(),
            file: default_log_file(),
        }
    }
}

// ── Loading ──

impl Default for GameConfig {
    fn default() -> Self {
        GameConfig::from_toml(TomlConfig::default(), &[], vec![])
    }
}

impl GameConfig {
    /// Load config from `config.toml`.
    /// Search order: (1) exe directory, (2) CWD, (3) XDG data dir.
    pub fn load() -> Self {
        let search_dirs = candidate_dirs();
        let mut warnings = vec![];
        let toml_cfg = load_toml(&search_dirs, &mut warnings);
        GameConfig::from_toml(toml_cfg, &search_dirs, warnings)
    }

    /// Parse config text directly. Relative paths resolve against `base`.
    pub fn from_toml_str(text: &str, base: &Path) -> Self {
        let mut warnings = vec![];
        let toml_cfg = parse_toml(text, CONFIG_FILE, &mut warnings);
        GameConfig::from_toml(toml_cfg, &[base.to_path_buf()], warnings)
    }

    fn from_toml(cfg: TomlConfig, search_dirs: &[PathBuf], mut warnings: Vec<String>) -> Self {
        let worlds_dir = resolve_dir(&cfg.general.worlds_dir, search_dirs);

        let mut display = cfg.display;
        if !(display.units_per_column > 0.0) {
            warnings.push(format!(
                "display.units_per_column must be positive, using {}",
                default_units_per_column()
            ));
            display.units_per_column = default_units_per_column();
        }
        if !(display.units_per_row > 0.0) {
            warnings.push(format!(
                "display.units_per_row must be positive, using {}",
                default_units_per_row()
            ));
            display.units_per_row = default_units_per_row();
        }

        GameConfig {
            general: GeneralConfig {
                worlds_dir,
                start_world: cfg.general.start_world,
            },
            display: DisplayConfig {
                frame_sleep_ms: display.frame_sleep_ms,
                units_per_column: display.units_per_column,
                units_per_row: display.units_per_row,
            },
            controls: ControlsConfig {
                left: cfg.controls.left,
                right: cfg.controls.right,
                jump: cfg.controls.jump,
                use_key: cfg.controls.use_key,
                zoom_in: cfg.controls.zoom_in,
                zoom_out: cfg.controls.zoom_out,
                pause: cfg.controls.pause,
                quit: cfg.controls.quit,
            },
            logging: LoggingConfig {
                filter: cfg.logging.filter,
                file: PathBuf::from(cfg.logging.file),
            },
            load_warnings: warnings,
        }
    }
}

/// An absolute path is taken as is. A relative one is looked up in each
/// search dir and falls back to the CWD-relative path.
fn resolve_dir(name: &str, search_dirs: &[PathBuf]) -> PathBuf {
    let path = PathBuf::from(name);
    if path.is_absolute() {
        return path;
    }
    search_dirs
        .iter()
        .map(|d| d.join(name))
        .find(|p| p.is_dir())
        .unwrap_or(path)
}

/// Candidate directories to search: exe dir + CWD + XDG data home (deduplicated).
pub fn candidate_dirs() -> Vec<PathBuf> {
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

/// First readable `config.toml` wins.
fn load_toml(search_dirs: &[PathBuf], warnings: &mut Vec<String>) -> TomlConfig {
    for dir in search_dirs {
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            continue;
        }
        match std::fs::read_to_string(&path) {
            Ok(text) => return parse_toml(&text, &path.display().to_string(), warnings),
            Err(e) => warnings.push(format!("could not read {}: {e}", path.display())),
        }
    }
    TomlConfig::default()
}

fn parse_toml(text: &str, origin: &str, warnings: &mut Vec<String>) -> TomlConfig {
    match toml::from_str::<TomlConfig>(text) {
        Ok(cfg) => cfg,
        Err(e) => {
            warnings.push(format!("{origin} parse error, using default settings: {e}"));
            TomlConfig::default()
        }
    }
}
