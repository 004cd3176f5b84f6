/// The frame pipeline behind `WorldController::update`.
///
/// Processing order:
///   1. Timers (pause latch, elapsed / countdown)
///   2. Entities, in registry order, then reaping of faded corpses
///   3. Popups
///   4. World state transitions (live worlds only)
///   5. Camera follow, clamp and zoom easing
///
/// Steps 2–4 are skipped while paused. Each entity's turn sees only
/// the entities overlapping its scan area.

use tracing::debug;

use super::behavior::FrameCtx;
use super::event::GameEvent;
use super::world::{WorldController, WorldState};

// ══════════════════════════════════════════════════════════════
// Timers
// ══════════════════════════════════════════════════════════════

/// Latch the pause start while paused. On the first running frame after
/// a pause, push the start time and every routine deadline back by the
/// paused duration so nothing fires early.
pub fn update_timers(world: &mut WorldController, now: u64) {
    if world.paused {
        if world.pause_start_ms.is_none() {
            world.pause_start_ms = Some(now);
        }
        return;
    }

    if let Some(pause_start) = world.pause_start_ms.take() {
        let delay = now.saturating_sub(pause_start);
        world.start_ms += delay;
        world.entities.shift_routine_timers(delay);
        debug!(delay, "resumed after pause");
    }

    let running = now.saturating_sub(world.start_ms);
    world.elapsed_ms = match world.level.countdown_ms {
        0 => running,
        countdown => countdown.saturating_sub(running),
    };
}

// ══════════════════════════════════════════════════════════════
// Entities
// ══════════════════════════════════════════════════════════════

pub fn update_entities(world: &mut WorldController) {
    let delta = world.signals.delta;

    for handle in world.entities.handles() {
        let Some(mut actor) = world.entities.take(handle) else {
            continue;
        };

        if actor.body.is_alive {
            let surrounding = world.entities.overlapping(actor.body.scan_area());
            let mut ctx = FrameCtx::new(
                handle,
                &world.grid,
                &mut world.entities,
                &surrounding,
                &mut world.signals,
            );
            actor.update(&mut ctx);
        }
        actor.update_alpha(delta);

        let reap = actor.is_reapable();
        let id = actor.body.id;
        world.entities.restore(handle, actor);

        let toggles: Vec<i32> = world.signals.power_toggles.drain(..).collect();
        for power_id in toggles {
            world.entities.toggle_power(power_id);
            world.signals.events.push(GameEvent::PowerToggled { power_id });
        }

        if reap {
            world.entities.remove(handle);
            world.signals.events.push(GameEvent::EntityReaped { id });
            debug!(id, "entity reaped");
        }
    }
}

// ══════════════════════════════════════════════════════════════
// Popups
// ══════════════════════════════════════════════════════════════

pub fn update_popups(world: &mut WorldController, delta: f32) {
    world.signals.popups.retain_mut(|p| p.advance(delta));
}

// ══════════════════════════════════════════════════════════════
// World state
// ══════════════════════════════════════════════════════════════

/// Win / lose checks. Only a live world in `Playing` or `PlayerDies`
/// is evaluated; every other state is left to the front end.
pub fn update_world_state(world: &mut WorldController) {
    if !world.signals.is_live {
        return;
    }
    let state = world.signals.state;
    if !matches!(state, WorldState::Playing | WorldState::PlayerDies) {
        return;
    }

    if world.level.countdown_ms > 0 && world.elapsed_ms == 0 {
        world.signals.set_state(WorldState::Restart);
        return;
    }

    let Some(player) = world.entities.player().and_then(|h| world.entities.get(h)) else {
        return;
    };
    if !player.body.is_alive {
        world.signals.set_state(WorldState::Restart);
    } else if state == WorldState::Playing && player.body.bounds.overlaps(&world.level.finish_area) {
        world.signals.set_state(WorldState::ViewStats);
    }
}

// ══════════════════════════════════════════════════════════════
// Camera
// ══════════════════════════════════════════════════════════════

/// In a live world the camera tracks the player and stays inside the
/// grid. Otherwise it follows whatever target it has, if any.
pub fn update_camera(world: &mut WorldController, delta: f32) {
    let player = world.entities.player();
    let live = world.signals.is_live && player.is_some();
    if live {
        world.camera.set_target(player);
    }

    if let Some(target) = world.camera.target() {
        match world.entities.get(target) {
            Some(e) => world.camera.follow(e.body.bounds),
            None => world.camera.set_target(None),
        }
    }

    if live {
        world.camera.clamp_to(world.grid.bounds());
    }
    world.camera.update_zoom(delta);
}
