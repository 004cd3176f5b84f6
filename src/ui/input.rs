/// Keyboard input for the terminal preview.
///
/// Tracks which keys are currently held down, enabling:
///   - Continuous walking while a direction key is held
///   - Edge-triggered `use` (only fires on the initial press)
///   - Walking and jumping in the same frame
///
/// Honors crossterm Release events when the terminal reports them and
/// falls back to timeout-based release detection when it doesn't.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crossterm::event::{self, poll, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use tileworld::config::ControlsConfig;
use tileworld::domain::entity::PlayerInput;

/// After this duration without a Press/Repeat event, consider the key released.
/// Only used when the terminal doesn't report Release events.
const HOLD_TIMEOUT: Duration = Duration::from_millis(160);

pub struct InputState {
    /// Timestamp of last Press/Repeat event for each key.
    last_active: HashMap<KeyCode, Instant>,

    /// Keys that went from "not held" to "held" during the most recent
    /// drain_events() call.
    fresh_presses: Vec<KeyCode>,

    /// Raw key events collected during drain, for Ctrl+C detection.
    raw_events: Vec<KeyEvent>,

    /// Only true when keyboard enhancement is confirmed working.
    pub honor_release: bool,
}

impl InputState {
    pub fn new() -> Self {
        InputState {
            last_active: HashMap::with_capacity(16),
            fresh_presses: Vec::with_capacity(8),
            raw_events: Vec::with_capacity(8),
            honor_release: false,
        }
    }

    /// Drain all pending terminal events and update key states.
    /// Call this once per frame, before the world update.
    pub fn drain_events(&mut self) {
        self.fresh_presses.clear();
        self.raw_events.clear();

        while poll(Duration::ZERO).unwrap_or(false) {
            if let Ok(Event::Key(key)) = event::read() {
                self.record(key, Instant::now());
            }
        }

        let now = Instant::now();
        self.last_active.retain(|_, t| now.duration_since(*t) < HOLD_TIMEOUT);
    }

    fn record(&mut self, key: KeyEvent, at: Instant) {
        self.raw_events.push(key);
        match key.kind {
            KeyEventKind::Release if self.honor_release => {
                self.last_active.remove(&key.code);
            }
            // Unconfirmed release: let the timeout expire it.
            KeyEventKind::Release => {}
            _ => {
                if !self.is_held(key.code) {
                    self.fresh_presses.push(key.code);
                }
                self.last_active.insert(key.code, at);
            }
        }
    }

    /// Is this key currently held down?
    pub fn is_held(&self, code: KeyCode) -> bool {
        self.last_active
            .get(&code)
            .map(|t| t.elapsed() < HOLD_TIMEOUT)
            .unwrap_or(false)
    }

    pub fn any_held(&self, codes: &[KeyCode]) -> bool {
        codes.iter().any(|c| self.is_held(*c))
    }

    /// Was this key freshly pressed this frame? (edge trigger)
    pub fn was_pressed(&self, code: KeyCode) -> bool {
        self.fresh_presses.contains(&code)
    }

    pub fn any_pressed(&self, codes: &[KeyCode]) -> bool {
        codes.iter().any(|c| self.was_pressed(*c))
    }

    pub fn ctrl_c_pressed(&self) -> bool {
        self.raw_events.iter().any(|k| {
            k.modifiers.contains(KeyModifiers::CONTROL)
                && (k.code == KeyCode::Char('c') || k.code == KeyCode::Char('C'))
        })
    }

    /// Per-frame player input. Walking and jumping follow held keys,
    /// `use` only fires on the frame its key went down.
    pub fn player_input(&self, keys: &KeyBindings) -> PlayerInput {
        PlayerInput {
            left: self.any_held(&keys.left),
            right: self.any_held(&keys.right),
            jump: self.any_held(&keys.jump),
            use_pressed: self.any_pressed(&keys.use_key),
        }
    }
}

// ── Key bindings ──

/// Resolved key lists, one per action.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct KeyBindings {
    pub left: Vec<KeyCode>,
    pub right: Vec<KeyCode>,
    pub jump: Vec<KeyCode>,
    pub use_key: Vec<KeyCode>,
    pub zoom_in: Vec<KeyCode>,
    pub zoom_out: Vec<KeyCode>,
    pub pause: Vec<KeyCode>,
    pub quit: Vec<KeyCode>,
}

impl KeyBindings {
    /// Unknown key names are skipped and returned so the caller can log them.
    pub fn from_config(controls: &ControlsConfig) -> (Self, Vec<String>) {
        let mut unknown = vec![];
        let mut resolve = |names: &[String]| -> Vec<KeyCode> {
            names
                .iter()
                .filter_map(|n| {
                    let key = parse_key(n);
                    if key.is_none() {
                        unknown.push(n.clone());
                    }
                    key
                })
                .collect()
        };
        let keys = KeyBindings {
            left: resolve(&controls.left),
            right: resolve(&controls.right),
            jump: resolve(&controls.jump),
            use_key: resolve(&controls.use_key),
            zoom_in: resolve(&controls.zoom_in),
            zoom_out: resolve(&controls.zoom_out),
            pause: resolve(&controls.pause),
            quit: resolve(&controls.quit),
        };
        (keys, unknown)
    }
}

/// Key name as written in `config.toml`: a single character, a named
/// key (`Left`, `Space`, `Enter`, ...) or a function key (`F1`..`F12`).
/// Named keys are case-insensitive; single characters are not.
pub fn parse_key(name: &str) -> Option<KeyCode> {
    let mut chars = name.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return Some(KeyCode::Char(c));
    }

    let lower = name.to_ascii_lowercase();
    let key = match lower.as_str() {
        "left" => KeyCode::Left,
        "right" => KeyCode::Right,
        "up" => KeyCode::Up,
        "down" => KeyCode::Down,
        "space" => KeyCode::Char(' '),
        "enter" | "return" => KeyCode::Enter,
        "esc" | "escape" => KeyCode::Esc,
        "tab" => KeyCode::Tab,
        "backspace" => KeyCode::Backspace,
        "home" => KeyCode::Home,
        "end" => KeyCode::End,
        "pageup" => KeyCode::PageUp,
        "pagedown" => KeyCode::PageDown,
        _ => {
            let n: u8 = lower.strip_prefix('f')?.parse().ok()?;
            if !(1..=12).contains(&n) {
                return None;
            }
            KeyCode::F(n)
        }
    };
    Some(key)
}
