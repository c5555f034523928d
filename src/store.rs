//! Instance state store: the authoritative per-agent arrays.
//!
//! The store holds the CPU side of every per-agent array (position seeds,
//! velocities, behavior state + waypoint, expression offsets, color, and
//! animation phase) and tracks which entries have been mutated since the
//! last GPU upload. All command APIs mutate here first; the GPU buffers
//! are brought in line right before the next kernel dispatch.
//!
//! Positions and velocities are only *seed* values after initialization:
//! once the kernel is running, the GPU copy is authoritative and the CPU
//! reads positions exclusively through the readback snapshot.
//!
//! Invalid agent ids and out-of-world waypoints are ignored with a debug
//! log. Real-time command plumbing drops stale input instead of erroring.

use glam::{Vec2, Vec3};
use rand::Rng;

use crate::agent::{
    AgentId, BehaviorState, Expression, ExpressionGpu, MotionGpu, PositionGpu, SimParams,
    VelocityGpu, PLAYER,
};

/// Fraction of the world half-extent NPCs spawn within.
const SPAWN_MARGIN: f32 = 0.8;

#[derive(Debug)]
pub struct InstanceStore {
    count: u32,
    params: SimParams,
    positions: Vec<PositionGpu>,
    velocities: Vec<VelocityGpu>,
    motions: Vec<MotionGpu>,
    expressions: Vec<ExpressionGpu>,
    colors: Vec<Vec3>,
    phases: Vec<f32>,
    motion_dirty: Vec<bool>,
    expression_dirty: Vec<bool>,
    any_motion_dirty: bool,
    any_expression_dirty: bool,
}

impl InstanceStore {
    /// Allocate and seed `count` agents inside `±world_half * 0.8`.
    ///
    /// Agent 0 spawns at the origin in Frozen; every other agent gets a
    /// random position, a random cruise-speed velocity, a random color,
    /// and a random animation phase so the crowd never animates in
    /// lock-step.
    pub fn new(count: u32, params: SimParams, rng: &mut impl Rng) -> Self {
        let n = count as usize;
        let mut store = Self {
            count,
            params,
            positions: Vec::with_capacity(n),
            velocities: Vec::with_capacity(n),
            motions: Vec::with_capacity(n),
            expressions: Vec::with_capacity(n),
            colors: Vec::with_capacity(n),
            phases: Vec::with_capacity(n),
            motion_dirty: vec![false; n],
            expression_dirty: vec![false; n],
            any_motion_dirty: false,
            any_expression_dirty: false,
        };

        let spawn_half = params.world_half * SPAWN_MARGIN;
        for i in 0..count {
            let id = AgentId(i);
            let (pos, vel, state) = if id == PLAYER {
                ([0.0, 0.0, 0.0], [0.0, 0.0, 0.0], BehaviorState::Frozen)
            } else {
                let angle = rng.gen_range(0.0..std::f32::consts::TAU);
                (
                    [
                        rng.gen_range(-spawn_half..spawn_half),
                        0.0,
                        rng.gen_range(-spawn_half..spawn_half),
                    ],
                    [
                        angle.cos() * params.speed,
                        0.0,
                        angle.sin() * params.speed,
                    ],
                    BehaviorState::Flocking,
                )
            };

            store.positions.push(PositionGpu { pos, _pad: 0.0 });
            store.velocities.push(VelocityGpu { vel, _pad: 0.0 });
            store.motions.push(MotionGpu {
                state: state.as_u32(),
                speaking: 0,
                waypoint: [0.0, 0.0],
            });
            let (eyes, mouth) = Expression::Neutral.offsets();
            store.expressions.push(ExpressionGpu {
                eyes: eyes.into(),
                mouth: mouth.into(),
            });
            store.colors.push(Vec3::new(
                rng.gen_range(0.2..1.0),
                rng.gen_range(0.2..1.0),
                rng.gen_range(0.2..1.0),
            ));
            store.phases.push(rng.gen_range(0.0..4.0));
        }

        store
    }

    // ========== Commands ==========

    /// Set an agent's waypoint. In Seeking the agent walks there; in
    /// Frozen/Talking it only faces it. Waypoints outside the world
    /// bounds are rejected outright, not clamped.
    pub fn set_waypoint(&mut self, id: AgentId, x: f32, z: f32) {
        if !self.contains(id) {
            log::debug!("set_waypoint: ignoring unknown {}", id);
            return;
        }
        let half = self.params.world_half;
        if x.abs() > half || z.abs() > half || !x.is_finite() || !z.is_finite() {
            log::debug!("set_waypoint: rejecting out-of-world ({x}, {z}) for {}", id);
            return;
        }
        self.motions[id.index()].waypoint = [x, z];
        self.mark_motion_dirty(id);
    }

    /// Transition an agent's behavior state. Setting the current state
    /// is a no-op. Leaving Talking clears the speaking flag.
    pub fn set_state(&mut self, id: AgentId, state: BehaviorState) {
        if !self.contains(id) {
            log::debug!("set_state: ignoring unknown {}", id);
            return;
        }
        let motion = &mut self.motions[id.index()];
        if motion.state == state.as_u32() {
            return;
        }
        if BehaviorState::from_u32(motion.state) == BehaviorState::Talking {
            motion.speaking = 0;
        }
        self.motions[id.index()].state = state.as_u32();
        self.mark_motion_dirty(id);
    }

    /// Toggle the "currently speaking" flag used by animation/visuals.
    /// Reaches the GPU through the motion buffer on the next flush.
    pub fn set_speaking(&mut self, id: AgentId, speaking: bool) {
        if !self.contains(id) {
            return;
        }
        self.motions[id.index()].speaking = speaking as u32;
        self.mark_motion_dirty(id);
    }

    /// Select an agent's facial expression from the atlas table.
    pub fn set_expression(&mut self, id: AgentId, expression: Expression) {
        if !self.contains(id) {
            return;
        }
        let (eyes, mouth) = expression.offsets();
        self.expressions[id.index()] = ExpressionGpu {
            eyes: eyes.into(),
            mouth: mouth.into(),
        };
        self.expression_dirty[id.index()] = true;
        self.any_expression_dirty = true;
    }

    /// Replace the simulation parameters; uploaded before the next dispatch.
    pub fn set_params(&mut self, params: SimParams) {
        self.params = params;
    }

    // ========== Queries ==========

    #[inline]
    pub fn count(&self) -> u32 {
        self.count
    }

    #[inline]
    pub fn contains(&self, id: AgentId) -> bool {
        id.0 < self.count
    }

    #[inline]
    pub fn params(&self) -> SimParams {
        self.params
    }

    pub fn state(&self, id: AgentId) -> Option<BehaviorState> {
        self.motions
            .get(id.index())
            .map(|m| BehaviorState::from_u32(m.state))
    }

    pub fn waypoint(&self, id: AgentId) -> Option<Vec2> {
        self.motions.get(id.index()).map(|m| Vec2::from(m.waypoint))
    }

    pub fn is_speaking(&self, id: AgentId) -> bool {
        self.motions.get(id.index()).is_some_and(|m| m.speaking != 0)
    }

    pub fn color(&self, id: AgentId) -> Option<Vec3> {
        self.colors.get(id.index()).copied()
    }

    /// Per-agent animation phase offset in seconds.
    pub fn phase(&self, id: AgentId) -> Option<f32> {
        self.phases.get(id.index()).copied()
    }

    /// Seed position, only meaningful before the first dispatch.
    pub fn seed_position(&self, id: AgentId) -> Option<Vec3> {
        self.positions.get(id.index()).map(|p| Vec3::from(p.pos))
    }

    // ========== GPU upload handshake ==========

    pub(crate) fn positions_raw(&self) -> &[PositionGpu] {
        &self.positions
    }

    pub(crate) fn velocities_raw(&self) -> &[VelocityGpu] {
        &self.velocities
    }

    pub(crate) fn motions_raw(&self) -> &[MotionGpu] {
        &self.motions
    }

    pub(crate) fn expressions_raw(&self) -> &[ExpressionGpu] {
        &self.expressions
    }

    /// Drain dirty motion entries as `(index, value)` pairs.
    pub(crate) fn take_dirty_motions(&mut self) -> Vec<(u32, MotionGpu)> {
        if !self.any_motion_dirty {
            return Vec::new();
        }
        self.any_motion_dirty = false;
        let motions = &self.motions;
        self.motion_dirty
            .iter_mut()
            .enumerate()
            .filter_map(|(i, dirty)| {
                std::mem::take(dirty).then(|| (i as u32, motions[i]))
            })
            .collect()
    }

    /// Drain dirty expression entries as `(index, value)` pairs.
    pub(crate) fn take_dirty_expressions(&mut self) -> Vec<(u32, ExpressionGpu)> {
        if !self.any_expression_dirty {
            return Vec::new();
        }
        self.any_expression_dirty = false;
        let expressions = &self.expressions;
        self.expression_dirty
            .iter_mut()
            .enumerate()
            .filter_map(|(i, dirty)| {
                std::mem::take(dirty).then(|| (i as u32, expressions[i]))
            })
            .collect()
    }

    fn mark_motion_dirty(&mut self, id: AgentId) {
        self.motion_dirty[id.index()] = true;
        self.any_motion_dirty = true;
    }
}
