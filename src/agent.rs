//! Agent identity, behavior states, simulation parameters, and the
//! GPU-side memory layout of the instance state store.
//!
//! Every agent is identified by a dense integer id. Id 0 is reserved for
//! the player avatar; all other agents are autonomous NPCs.

use std::fmt;

use bytemuck::{Pod, Zeroable};
use glam::Vec2;

/// Identifier of one simulated agent. Dense `0..count`, stable for the
/// lifetime of a configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AgentId(pub u32);

impl AgentId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent#{}", self.0)
    }
}

/// The player-controlled avatar.
pub const PLAYER: AgentId = AgentId(0);

/// Behavioral macro-state of one agent.
///
/// Exactly one state at all times. Transitions happen only through the
/// [`BehaviorManager`](crate::BehaviorManager) and
/// [`FormationController`](crate::FormationController) APIs;
/// the compute kernel reads the state but never changes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum BehaviorState {
    /// Free-roam separation + boundary steering. Initial state for NPCs.
    #[default]
    Flocking = 0,
    /// Stationary, optionally facing a direction. Initial state for the player.
    Frozen = 1,
    /// Scripted walk toward a fixed waypoint.
    Seeking = 2,
    /// Mutually frozen conversation with a paired agent.
    Talking = 3,
}

impl BehaviorState {
    /// Decode from the GPU representation. Unknown values fall back to
    /// Flocking rather than poisoning the state machine.
    #[inline]
    pub fn from_u32(v: u32) -> Self {
        match v {
            1 => BehaviorState::Frozen,
            2 => BehaviorState::Seeking,
            3 => BehaviorState::Talking,
            _ => BehaviorState::Flocking,
        }
    }

    #[inline]
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Whether the kernel holds this agent's position in place.
    #[inline]
    pub fn is_stationary(self) -> bool {
        matches!(self, BehaviorState::Frozen | BehaviorState::Talking)
    }
}

/// Tunable parameters of the flocking pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimParams {
    /// Cruise speed every flocking agent is renormalized to, units/second.
    pub speed: f32,
    /// Radius within which agents repel each other.
    pub separation_radius: f32,
    /// Scale of the separation impulse.
    pub separation_strength: f32,
    /// Half-extent of the world on x and z. Agents past it are steered back.
    pub world_half: f32,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            speed: 1.4,
            separation_radius: 2.0,
            separation_strength: 3.0,
            world_half: 25.0,
        }
    }
}

/// Facial expression selection. A closed enum indexing a fixed atlas
/// table: no string keys anywhere on the hot path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expression {
    #[default]
    Neutral,
    Happy,
    Surprised,
}

impl Expression {
    /// Atlas offsets for (eyes, mouth), in normalized texture coordinates.
    pub fn offsets(self) -> (Vec2, Vec2) {
        const TABLE: [([f32; 2], [f32; 2]); 3] = [
            ([0.0, 0.0], [0.0, 0.0]),
            ([0.25, 0.0], [0.25, 0.0]),
            ([0.5, 0.0], [0.5, 0.25]),
        ];
        let (eyes, mouth) = TABLE[self as usize];
        (Vec2::from(eyes), Vec2::from(mouth))
    }
}

// ---------------------------------------------------------------------------
// GPU memory layout
// ---------------------------------------------------------------------------
//
// The instance state store is four storage buffers indexed by agent id.
// Layouts here must match the WGSL structs emitted by `kernel::build_wgsl`.

/// Position buffer element. The w component is padding; per-agent flags
/// that must reach the GPU live in [`MotionGpu`], which is re-uploaded
/// on change (positions are only seeded once, then GPU-owned).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PositionGpu {
    pub pos: [f32; 3],
    pub _pad: f32,
}

/// Velocity buffer element. The w component is padding.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct VelocityGpu {
    pub vel: [f32; 3],
    pub _pad: f32,
}

/// Behavior buffer element: state, speaking flag, and the waypoint.
///
/// The waypoint doubles as a pure facing vector while the agent is
/// Frozen or Talking; the kernel never translates stationary agents.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MotionGpu {
    pub state: u32,
    pub speaking: u32,
    pub waypoint: [f32; 2],
}

/// Expression buffer element: eyes and mouth atlas offsets.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ExpressionGpu {
    pub eyes: [f32; 2],
    pub mouth: [f32; 2],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_roundtrip() {
        for s in [
            BehaviorState::Flocking,
            BehaviorState::Frozen,
            BehaviorState::Seeking,
            BehaviorState::Talking,
        ] {
            assert_eq!(BehaviorState::from_u32(s.as_u32()), s);
        }
    }

    #[test]
    fn test_unknown_state_decodes_to_flocking() {
        assert_eq!(BehaviorState::from_u32(99), BehaviorState::Flocking);
    }

    #[test]
    fn test_gpu_struct_sizes() {
        // Each element is one 16-byte slot; WGSL array strides depend on it.
        assert_eq!(std::mem::size_of::<PositionGpu>(), 16);
        assert_eq!(std::mem::size_of::<VelocityGpu>(), 16);
        assert_eq!(std::mem::size_of::<MotionGpu>(), 16);
        assert_eq!(std::mem::size_of::<ExpressionGpu>(), 16);
    }
}
