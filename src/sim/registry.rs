//! Entity registry: a generational arena plus the update order.
//!
//! ## Handles
//!
//! [`EntityHandle`] is a slot index and the generation that slot had
//! when the entity was inserted. Removing an entity bumps the slot's
//! generation, so stale handles (a reaped player, a dead camera target)
//! resolve to `None` instead of aliasing a newer entity.
//!
//! ## Order
//!
//! `order` is the update and draw order. Insertion appends; making an
//! entity the player moves it to the end so it is processed last.
//!
//! ## Turns
//!
//! During its own update an entity is taken out of its slot with
//! [`EntityRegistry::take`] and put back with [`EntityRegistry::restore`].
//! The slot stays reserved, and lookups of the acting entity return
//! `None` for the duration of its turn.

use std::collections::HashSet;

use tracing::debug;

use crate::domain::geom::Rect;
use crate::sim::behavior::Entity;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct EntityHandle {
    index: u32,
    generation: u32,
}

impl EntityHandle {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        EntityHandle { index, generation }
    }

    pub fn index(&self) -> u32 {
        self.index
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    entity: Option<Entity>,
    /// Occupied, even while the entity is taken out for its turn.
    live: bool,
}

#[derive(Debug)]
pub struct EntityRegistry {
    slots: Vec<Slot>,
    free: Vec<u32>,
    order: Vec<EntityHandle>,
    marked: HashSet<EntityHandle>,
    player: Option<EntityHandle>,
    /// Id handed to the next entity inserted without one.
    next_id: u32,
}

impl Default for EntityRegistry {
    fn default() -> Self {
        EntityRegistry::new()
    }
}

impl EntityRegistry {
    pub fn new() -> Self {
        EntityRegistry {
            slots: Vec::new(),
            free: Vec::new(),
            order: Vec::new(),
            marked: HashSet::new(),
            player: None,
            next_id: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Drop every entity and restart ids from 1. Outstanding handles
    /// become stale.
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            if slot.live {
                slot.generation = slot.generation.wrapping_add(1);
            }
            slot.entity = None;
            slot.live = false;
        }
        self.free = (0..self.slots.len() as u32).rev().collect();
        self.order.clear();
        self.marked.clear();
        self.player = None;
        self.next_id = 1;
    }

    // ── Ids ──

    pub fn next_id(&self) -> u32 {
        self.next_id
    }

    /// Restored worlds carry their own counter. Never moves backwards
    /// past an id already in use.
    pub fn set_next_id(&mut self, next_id: u32) {
        let used = self
            .iter()
            .map(|(_, e)| e.body.id)
            .max()
            .map_or(1, |max| max + 1);
        self.next_id = next_id.max(used);
    }

    // ── Insert / remove ──

    /// Append an entity to the update order. An entity without an id
    /// gets the next free one.
    pub fn insert(&mut self, mut entity: Entity) -> EntityHandle {
        if entity.body.id == 0 {
            entity.body.id = self.next_id;
            self.next_id += 1;
        } else if entity.body.id >= self.next_id {
            self.next_id = entity.body.id + 1;
        }

        let handle = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.entity = Some(entity);
                slot.live = true;
                EntityHandle::new(index, slot.generation)
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    entity: Some(entity),
                    live: true,
                });
                EntityHandle::new(index, 0)
            }
        };
        self.order.push(handle);
        handle
    }

    /// Remove an entity. Clears the player and mark references to it.
    pub fn remove(&mut self, handle: EntityHandle) -> Option<Entity> {
        if !self.contains(handle) {
            return None;
        }
        let slot = &mut self.slots[handle.index as usize];
        let entity = slot.entity.take();
        slot.live = false;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.order.retain(|h| *h != handle);
        self.marked.remove(&handle);
        if self.player == Some(handle) {
            self.player = None;
        }
        if let Some(e) = &entity {
            debug!(id = e.body.id, kind = e.behavior.type_key(), "entity removed");
        }
        entity
    }

    // ── Lookup ──

    /// Handle refers to a live slot, even one whose entity is mid-turn.
    pub fn contains(&self, handle: EntityHandle) -> bool {
        self.slots
            .get(handle.index as usize)
            .is_some_and(|s| s.live && s.generation == handle.generation)
    }

    pub fn get(&self, handle: EntityHandle) -> Option<&Entity> {
        self.slots
            .get(handle.index as usize)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.entity.as_ref())
    }

    pub fn get_mut(&mut self, handle: EntityHandle) -> Option<&mut Entity> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.entity.as_mut())
    }

    pub fn find_by_id(&self, id: u32) -> Option<EntityHandle> {
        self.iter().find(|(_, e)| e.body.id == id).map(|(h, _)| h)
    }

    /// Snapshot of the update order.
    pub fn handles(&self) -> Vec<EntityHandle> {
        self.order.clone()
    }

    /// Entities in update order, skipping one that is mid-turn.
    pub fn iter(&self) -> impl Iterator<Item = (EntityHandle, &Entity)> + '_ {
        self.order
            .iter()
            .filter_map(move |h| self.get(*h).map(|e| (*h, e)))
    }

    /// Entities whose bounds strictly overlap `area`, in update order.
    pub fn overlapping(&self, area: Rect) -> Vec<EntityHandle> {
        self.iter()
            .filter(|(_, e)| e.body.bounds.overlaps(&area))
            .map(|(h, _)| h)
            .collect()
    }

    // ── Turns ──

    pub(crate) fn take(&mut self, handle: EntityHandle) -> Option<Entity> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.entity.take())
    }

    pub(crate) fn restore(&mut self, handle: EntityHandle, entity: Entity) {
        if let Some(slot) = self
            .slots
            .get_mut(handle.index as usize)
            .filter(|s| s.generation == handle.generation && s.live)
        {
            slot.entity = Some(entity);
        }
    }

    // ── Player / marks ──

    pub fn player(&self) -> Option<EntityHandle> {
        self.player.filter(|h| self.contains(*h))
    }

    /// Make `handle` the player and move it to the end of the order.
    pub fn set_player(&mut self, handle: Option<EntityHandle>) {
        match handle {
            Some(h) if self.contains(h) => {
                self.order.retain(|o| *o != h);
                self.order.push(h);
                self.player = Some(h);
            }
            Some(_) => {}
            None => self.player = None,
        }
    }

    /// `None` clears every mark; `Some` toggles one entity.
    pub fn toggle_mark(&mut self, handle: Option<EntityHandle>) {
        match handle {
            None => self.marked.clear(),
            Some(h) if self.contains(h) => {
                if !self.marked.remove(&h) {
                    self.marked.insert(h);
                }
            }
            Some(_) => {}
        }
    }

    pub fn is_marked(&self, handle: EntityHandle) -> bool {
        self.marked.contains(&handle)
    }

    pub fn marked(&self) -> Vec<EntityHandle> {
        self.order
            .iter()
            .filter(|h| self.marked.contains(*h))
            .copied()
            .collect()
    }

    // ── Bulk updates ──

    /// Push every routine deadline back by `delay` ms, unset ones included.
    pub fn shift_routine_timers(&mut self, delay: u64) {
        for slot in self.slots.iter_mut() {
            if let Some(e) = slot.entity.as_mut() {
                e.body.routine_timer += delay;
            }
        }
    }

    pub fn reset_routines(&mut self) {
        for slot in self.slots.iter_mut() {
            if let Some(e) = slot.entity.as_mut() {
                e.body.routine_timer = 0;
            }
        }
    }

    /// Flip the power state of every entity on channel `power_id`.
    /// Each entity flips its own state, so mixed channels stay mixed.
    pub fn toggle_power(&mut self, power_id: i32) {
        for slot in self.slots.iter_mut() {
            if let Some(e) = slot.entity.as_mut() {
                if e.body.power_id == power_id {
                    e.body.is_power_on = !e.body.is_power_on;
                }
            }
        }
    }
}
