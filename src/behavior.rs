//! CPU behavioral state machine layered over the flocking pass.
//!
//! Consumes the readback snapshot once per tick and drives all scripted
//! state transitions: collision-triggered conversations between NPCs,
//! timed conversation expiry and speaker swapping, explicit chat
//! sessions between the player and a target NPC, and proximity
//! encounter reporting.
//!
//! All timing is wall-clock comparison against the `now_ms` passed into
//! `tick` — nothing here schedules a callback, so disposal can never
//! leave a timer dangling. All entry points ignore invalid agent ids.

use glam::{Vec2, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::agent::{AgentId, BehaviorState, PLAYER};
use crate::events::{EventQueue, SimEvent};
use crate::readback::Snapshot;
use crate::store::InstanceStore;

/// NPC pairs closer than this start a conversation.
pub const COLLISION_RADIUS: f32 = 1.2;
/// Default conversation length.
pub const TALK_DURATION_MS: u64 = 4_000;
/// Cooldown before an agent may trigger a new conversation.
const PAIR_COOLDOWN_MS: u64 = 6_000;
/// Bound on concurrent conversations; caps the pairwise scan's work.
const MAX_ACTIVE_PAIRS: usize = 8;
/// Speaker swap interval bounds.
const SWAP_MIN_MS: u64 = 1_500;
const SWAP_MAX_MS: u64 = 3_500;
/// Player proximity radius for encounter reporting.
pub const ENCOUNTER_RADIUS: f32 = 3.0;
/// Seeking counts as arrived below this distance to the waypoint.
pub const ARRIVE_THRESHOLD: f32 = 0.35;
/// How far from the chat target the player's approach waypoint sits.
const CHAT_STANDOFF: f32 = 0.9;

/// Two agents in a timed mutual conversation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrozenPair {
    pub a: AgentId,
    pub b: AgentId,
    pub expires_at: u64,
    pub speaker: AgentId,
    pub next_swap: u64,
}

impl FrozenPair {
    fn contains(&self, id: AgentId) -> bool {
        self.a == id || self.b == id
    }

    fn partner_of(&self, id: AgentId) -> AgentId {
        if self.a == id {
            self.b
        } else {
            self.a
        }
    }
}

pub struct BehaviorManager {
    pairs: Vec<FrozenPair>,
    cooldown_until: Vec<u64>,
    pending_chat: Option<AgentId>,
    last_encounter: Option<AgentId>,
    rng: StdRng,
}

impl BehaviorManager {
    pub fn new(count: u32) -> Self {
        Self::with_seed(count, rand::random())
    }

    /// Deterministic constructor for tests.
    pub fn with_seed(count: u32, seed: u64) -> Self {
        Self {
            pairs: Vec::new(),
            cooldown_until: vec![0; count as usize],
            pending_chat: None,
            last_encounter: None,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Drop all tracked relationships and resize for a new agent count.
    pub fn reset(&mut self, count: u32) {
        self.pairs.clear();
        self.cooldown_until = vec![0; count as usize];
        self.pending_chat = None;
        self.last_encounter = None;
    }

    /// Advance the state machine one tick against the latest snapshot.
    pub fn tick(
        &mut self,
        snapshot: &Snapshot,
        now_ms: u64,
        store: &mut InstanceStore,
        events: &mut EventQueue,
    ) {
        self.expire_pairs(now_ms, store, events);
        self.swap_speakers(now_ms, store, events);
        self.detect_collisions(snapshot, now_ms, store, events);
        self.check_player_arrival(snapshot, store, events);
        self.report_encounter(snapshot, events);
    }

    // ========== Chat sessions ==========

    /// Begin an explicit chat with `target`: the target freezes facing
    /// the player and the player walks to a standoff point next to it.
    ///
    /// A target that is mid-Seeking (e.g. still walking into a formation
    /// slot) is left alone and the whole request is dropped; see
    /// DESIGN.md for the precedence rule.
    pub fn start_chat(
        &mut self,
        target: AgentId,
        snapshot: &Snapshot,
        store: &mut InstanceStore,
        events: &mut EventQueue,
    ) {
        if target == PLAYER || !store.contains(target) {
            log::debug!("start_chat: ignoring invalid target {}", target);
            return;
        }
        let Some(state) = store.state(target) else { return };
        if state == BehaviorState::Seeking {
            log::debug!("start_chat: {} is mid-walk, dropping request", target);
            return;
        }

        let Some(target_pos) = snapshot.position(target) else { return };
        let Some(player_pos) = snapshot.position(PLAYER) else { return };

        // Pull the target out of any running conversation first.
        if let Some(idx) = self.pairs.iter().position(|p| p.contains(target)) {
            let pair = self.pairs.swap_remove(idx);
            let partner = pair.partner_of(target);
            store.set_state(partner, BehaviorState::Flocking);
            if store.is_speaking(pair.speaker) {
                store.set_speaking(pair.speaker, false);
                events.push(SimEvent::SpeakingChanged(pair.speaker, false));
            }
        }

        store.set_state(target, BehaviorState::Frozen);
        store.set_waypoint(target, player_pos.x, player_pos.z);

        let approach = approach_point(player_pos, target_pos, CHAT_STANDOFF);
        store.set_waypoint(PLAYER, approach.x, approach.y);
        store.set_state(PLAYER, BehaviorState::Seeking);
        self.pending_chat = Some(target);
    }

    /// End a chat session: the target resumes flocking and the player
    /// stays put.
    pub fn end_chat(&mut self, target: AgentId, store: &mut InstanceStore) {
        if !store.contains(target) {
            return;
        }
        if self.pending_chat == Some(target) {
            self.pending_chat = None;
        }
        store.set_state(target, BehaviorState::Flocking);
        if store.state(PLAYER) == Some(BehaviorState::Seeking) {
            store.set_state(PLAYER, BehaviorState::Frozen);
        }
    }

    // ========== Per-tick phases ==========

    fn expire_pairs(&mut self, now_ms: u64, store: &mut InstanceStore, events: &mut EventQueue) {
        let mut i = 0;
        while i < self.pairs.len() {
            if now_ms > self.pairs[i].expires_at {
                let pair = self.pairs.swap_remove(i);
                // Both members leave Talking in the same tick.
                store.set_state(pair.a, BehaviorState::Flocking);
                store.set_state(pair.b, BehaviorState::Flocking);
                events.push(SimEvent::SpeakingChanged(pair.speaker, false));
                self.cooldown_until[pair.a.index()] = now_ms + PAIR_COOLDOWN_MS;
                self.cooldown_until[pair.b.index()] = now_ms + PAIR_COOLDOWN_MS;
            } else {
                i += 1;
            }
        }
    }

    fn swap_speakers(&mut self, now_ms: u64, store: &mut InstanceStore, events: &mut EventQueue) {
        for pair in &mut self.pairs {
            if now_ms < pair.next_swap {
                continue;
            }
            let previous = pair.speaker;
            pair.speaker = pair.partner_of(previous);
            pair.next_swap = now_ms + self.rng.gen_range(SWAP_MIN_MS..SWAP_MAX_MS);

            store.set_speaking(previous, false);
            store.set_speaking(pair.speaker, true);
            events.push(SimEvent::SpeakingChanged(previous, false));
            events.push(SimEvent::SpeakingChanged(pair.speaker, true));
        }
    }

    fn detect_collisions(
        &mut self,
        snapshot: &Snapshot,
        now_ms: u64,
        store: &mut InstanceStore,
        events: &mut EventQueue,
    ) {
        let count = store.count();
        let radius_sq = COLLISION_RADIUS * COLLISION_RADIUS;

        for i in 1..count {
            if self.pairs.len() >= MAX_ACTIVE_PAIRS {
                break;
            }
            let a = AgentId(i);
            if !self.can_pair(a, now_ms, store) {
                continue;
            }
            let Some(pa) = snapshot.position(a) else { continue };

            for j in (i + 1)..count {
                let b = AgentId(j);
                if !self.can_pair(b, now_ms, store) {
                    continue;
                }
                let Some(pb) = snapshot.position(b) else { continue };
                if pa.distance_squared(pb) > radius_sq {
                    continue;
                }

                store.set_state(a, BehaviorState::Talking);
                store.set_state(b, BehaviorState::Talking);
                // Symmetric facing: each looks at the other.
                store.set_waypoint(a, pb.x, pb.z);
                store.set_waypoint(b, pa.x, pa.z);

                let speaker = if self.rng.gen_bool(0.5) { a } else { b };
                store.set_speaking(speaker, true);
                events.push(SimEvent::SpeakingChanged(speaker, true));

                self.pairs.push(FrozenPair {
                    a,
                    b,
                    expires_at: now_ms + TALK_DURATION_MS,
                    speaker,
                    next_swap: now_ms + self.rng.gen_range(SWAP_MIN_MS..SWAP_MAX_MS),
                });
                break;
            }
        }
    }

    fn check_player_arrival(
        &mut self,
        snapshot: &Snapshot,
        store: &mut InstanceStore,
        events: &mut EventQueue,
    ) {
        if store.state(PLAYER) != Some(BehaviorState::Seeking) {
            return;
        }
        let Some(pos) = snapshot.position(PLAYER) else { return };
        let Some(waypoint) = store.waypoint(PLAYER) else { return };

        let dist_sq = Vec2::new(pos.x, pos.z).distance_squared(waypoint);
        if dist_sq >= ARRIVE_THRESHOLD * ARRIVE_THRESHOLD {
            return;
        }

        store.set_state(PLAYER, BehaviorState::Frozen);
        if let Some(target) = self.pending_chat.take() {
            // Nudge the player to face the NPC directly, not the standoff point.
            if let Some(target_pos) = snapshot.position(target) {
                store.set_waypoint(PLAYER, target_pos.x, target_pos.z);
            }
            events.push(SimEvent::ArrivedAtTarget(target));
        }
    }

    fn report_encounter(&mut self, snapshot: &Snapshot, events: &mut EventQueue) {
        let Some(player_pos) = snapshot.position(PLAYER) else { return };

        let mut nearest: Option<(AgentId, f32)> = None;
        for (i, pos) in snapshot.positions().iter().enumerate().skip(1) {
            let d = player_pos.distance_squared(*pos);
            if d <= ENCOUNTER_RADIUS * ENCOUNTER_RADIUS
                && nearest.is_none_or(|(_, best)| d < best)
            {
                nearest = Some((AgentId(i as u32), d));
            }
        }

        let current = nearest.map(|(id, _)| id);
        if current != self.last_encounter {
            self.last_encounter = current;
            events.push(SimEvent::EncounterChanged(current));
        }
    }

    fn can_pair(&self, id: AgentId, now_ms: u64, store: &InstanceStore) -> bool {
        // Ids the manager was not sized for are never pairable.
        store.state(id) == Some(BehaviorState::Flocking)
            && self
                .cooldown_until
                .get(id.index())
                .is_some_and(|&until| now_ms >= until)
            && !self.pairs.iter().any(|p| p.contains(id))
    }

    // ========== Queries ==========

    /// The pair `id` currently belongs to, if any.
    pub fn pair_of(&self, id: AgentId) -> Option<&FrozenPair> {
        self.pairs.iter().find(|p| p.contains(id))
    }

    pub fn active_pairs(&self) -> &[FrozenPair] {
        &self.pairs
    }

    pub fn pending_chat(&self) -> Option<AgentId> {
        self.pending_chat
    }
}

/// Point at `standoff` distance from `target`, on the side facing `from`.
fn approach_point(from: Vec3, target: Vec3, standoff: f32) -> Vec2 {
    let target_xz = Vec2::new(target.x, target.z);
    let from_xz = Vec2::new(from.x, from.z);
    let dir = (from_xz - target_xz).normalize_or_zero();
    if dir == Vec2::ZERO {
        target_xz + Vec2::new(standoff, 0.0)
    } else {
        target_xz + dir * standoff
    }
}
