//! Positional audio inputs: volume and pan of world sounds relative to
//! the camera, and the ambient water level.
//!
//! Nothing here plays audio. [`mix`] turns a frame's events into
//! [`PlaybackCue`]s a backend can hand to its mixer.

use crate::domain::geom::Rect;
use crate::sim::camera::Camera;
use crate::sim::event::{GameEvent, SoundCue};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaybackCue {
    pub cue: SoundCue,
    /// 0..=1
    pub volume: f32,
    /// Negative is left of the camera. Not clamped: sources off screen
    /// report values beyond ±1.
    pub pan: f32,
}

/// Falls off linearly with distance from the camera centre, faster
/// vertically, and with the square of the zoom.
pub fn entity_volume(camera: &Camera, source: Rect) -> f32 {
    let (vw, vh) = camera.viewport();
    let zoom = camera.zoom();
    let pos = camera.position();
    let c = source.center();

    let vx = (1.0 - ((pos.x - c.x) / (vw / 2.0 * zoom)).abs()).max(0.0);
    let vy = (1.0 - ((pos.y - c.y) / (vh / 1.5 * zoom)).abs()).max(0.0);
    (vx * vy * 2.0 / (zoom * zoom)).clamp(0.0, 1.0)
}

pub fn entity_pan(camera: &Camera, source: Rect) -> f32 {
    let (vw, _) = camera.viewport();
    let x = source.center().x;
    -(camera.position().x - x) / (vw / 2.0 * camera.zoom())
}

/// Water ambience: full once the view's bottom edge reaches the surface,
/// silent 100 units above it. Silent without water.
pub fn water_volume(camera: &Camera, water_height: f32) -> f32 {
    if water_height < 1.0 {
        return 0.0;
    }
    let (_, vh) = camera.viewport();
    let bottom = camera.position().y - vh / 2.0 * camera.zoom();
    ((100.0 - (bottom - water_height)) / 100.0).clamp(0.0, 1.0)
}

/// Sound events to playback cues. Inaudible world sounds are dropped and
/// the collect cue plays at most once per frame.
pub fn mix(events: &[GameEvent], camera: &Camera) -> Vec<PlaybackCue> {
    let mut cues = vec![];
    let mut collected = false;

    for event in events {
        match *event {
            GameEvent::Sound { cue, source } => {
                let volume = entity_volume(camera, source);
                if volume > 0.0 {
                    cues.push(PlaybackCue {
                        cue,
                        volume,
                        pan: entity_pan(camera, source),
                    });
                }
            }
            GameEvent::UiSound { cue } => {
                if cue == SoundCue::Collect {
                    if collected {
                        continue;
                    }
                    collected = true;
                }
                cues.push(PlaybackCue { cue, volume: 1.0, pan: 0.0 });
            }
            _ => {}
        }
    }
    cues
}
