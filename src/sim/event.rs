/// Events emitted during a simulation frame.
/// The presentation layer drains these for sound and UI feedback.

use crate::domain::geom::{Rect, Vec2};
use crate::sim::world::WorldState;

/// Sound cue identifiers. Playback is not the core's business; it only
/// says which cue fired and where.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SoundCue {
    /// Footstep variant, cycling through a fixed set.
    PlayerStep(u8),
    Lose,
    Collect,
    SwitchOn,
    SwitchOff,
    Springboard,
    /// Crackle variant.
    ElectricTrap(u8),
    /// Menu/UI cue with no world position.
    Ui(&'static str),
}

#[derive(Clone, Debug, PartialEq)]
pub enum GameEvent {
    /// Positional sound at the emitting entity's bounds.
    Sound { cue: SoundCue, source: Rect },
    /// Non-positional sound.
    UiSound { cue: SoundCue },
    ScoreAdded { amount: i32, total: i32 },
    /// Every powered entity on the channel flipped its state.
    PowerToggled { power_id: i32 },
    StateChanged { from: WorldState, to: WorldState },
    EntityReaped { id: u32 },
}

/// Floating score/status text. Rises and fades, removed at zero alpha.
#[derive(Clone, Debug, PartialEq)]
pub struct Popup {
    pub text: String,
    pub position: Vec2,
    pub alpha: f32,
}

impl Popup {
    pub const RISE_SPEED: f32 = 150.0;

    pub fn new(text: impl Into<String>, position: Vec2) -> Self {
        Popup {
            text: text.into(),
            position,
            alpha: 1.0,
        }
    }

    /// Advance one frame. Returns false once fully faded.
    pub fn advance(&mut self, delta: f32) -> bool {
        self.position.y += delta * Self::RISE_SPEED;
        self.alpha -= delta;
        self.alpha > 0.0
    }
}
