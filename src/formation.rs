//! Formation choreography: fixed circle slots with sequenced look-at.
//!
//! `enter` hands every NPC a slot on a circle and a Seeking waypoint;
//! the per-tick pass freezes each agent as it arrives and orients it.
//! Orientation reuses the waypoint as a pure facing vector, which the
//! kernel honors for stationary agents. `exit` releases everyone back
//! to flocking and clears all tracking.

use glam::Vec2;

use crate::agent::{AgentId, BehaviorState, PLAYER};
use crate::readback::Snapshot;
use crate::store::InstanceStore;

/// Squared distance at which a slot counts as reached.
const ARRIVE_SQ: f32 = 0.25;
/// Fraction of the world half-extent the circle spans.
const CIRCLE_SCALE: f32 = 0.5;

#[derive(Debug, Default)]
pub struct FormationController {
    active: bool,
    /// Slot per agent id; `None` for the player and unassigned ids.
    slots: Vec<Option<Vec2>>,
    /// Agents still walking to their slot.
    pending: Vec<AgentId>,
    /// Requested look-at target per agent, applied on arrival.
    look_targets: Vec<Option<AgentId>>,
}

impl FormationController {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Assign every NPC a circle slot and start it seeking. Re-entering
    /// while active resets all tracking first, so the call is idempotent
    /// in effect.
    pub fn enter(&mut self, store: &mut InstanceStore) {
        let count = store.count();
        self.slots = vec![None; count as usize];
        self.pending.clear();
        self.look_targets = vec![None; count as usize];
        self.active = true;

        let npcs = count.saturating_sub(1);
        if npcs == 0 {
            return;
        }
        let radius = store.params().world_half * CIRCLE_SCALE;

        for i in 1..count {
            let id = AgentId(i);
            let angle = std::f32::consts::TAU * (i - 1) as f32 / npcs as f32;
            let slot = Vec2::new(angle.cos(), angle.sin()) * radius;

            self.slots[id.index()] = Some(slot);
            self.pending.push(id);
            store.set_waypoint(id, slot.x, slot.y);
            store.set_state(id, BehaviorState::Seeking);
        }
    }

    /// Freeze and orient agents that reached their slot this tick.
    pub fn tick(&mut self, snapshot: &Snapshot, store: &mut InstanceStore) {
        if !self.active {
            return;
        }
        let mut i = 0;
        while i < self.pending.len() {
            let id = self.pending[i];
            let slot = match self.slots[id.index()] {
                Some(slot) => slot,
                None => {
                    self.pending.swap_remove(i);
                    continue;
                }
            };
            let Some(pos) = snapshot.position(id) else {
                i += 1;
                continue;
            };

            if Vec2::new(pos.x, pos.z).distance_squared(slot) < ARRIVE_SQ {
                self.pending.swap_remove(i);
                store.set_state(id, BehaviorState::Frozen);
                match self.look_targets[id.index()] {
                    Some(target) => self.apply_look(id, target, snapshot, store),
                    None => store.set_waypoint(id, 0.0, 0.0),
                }
            } else {
                i += 1;
            }
        }
    }

    /// Orient `source` toward `target`. Takes effect immediately for
    /// arrived agents; for agents still walking it is remembered and
    /// applied on arrival. Facing only, position never changes.
    pub fn look_at(
        &mut self,
        source: AgentId,
        target: AgentId,
        snapshot: &Snapshot,
        store: &mut InstanceStore,
    ) {
        if !self.active || source == PLAYER || !store.contains(source) || !store.contains(target) {
            return;
        }
        self.look_targets[source.index()] = Some(target);
        if !self.pending.contains(&source) {
            self.apply_look(source, target, snapshot, store);
        }
    }

    /// Orient an arrived agent toward the world center.
    pub fn face_center(&mut self, agent: AgentId, store: &mut InstanceStore) {
        if !self.active || !store.contains(agent) || self.pending.contains(&agent) {
            return;
        }
        self.look_targets[agent.index()] = None;
        store.set_waypoint(agent, 0.0, 0.0);
    }

    /// Release every tracked agent back to flocking and clear all state.
    pub fn exit(&mut self, store: &mut InstanceStore) {
        if !self.active {
            return;
        }
        for (i, slot) in self.slots.iter().enumerate() {
            if slot.is_some() {
                store.set_state(AgentId(i as u32), BehaviorState::Flocking);
            }
        }
        self.slots.clear();
        self.pending.clear();
        self.look_targets.clear();
        self.active = false;
    }

    /// Slot assigned to `id`, if the formation is active.
    pub fn slot_of(&self, id: AgentId) -> Option<Vec2> {
        self.slots.get(id.index()).copied().flatten()
    }

    fn apply_look(
        &self,
        source: AgentId,
        target: AgentId,
        snapshot: &Snapshot,
        store: &mut InstanceStore,
    ) {
        if let Some(target_pos) = snapshot.position(target) {
            store.set_waypoint(source, target_pos.x, target_pos.z);
        }
    }
}
