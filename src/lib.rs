//! # Crowd - GPU Crowd Simulation Core
//!
//! Real-time crowd simulation with the hot path on the GPU and all
//! behavioral decisions on the CPU.
//!
//! Every frame a compute kernel integrates all agent positions
//! (separation flocking, boundary steering, waypoint seeking) on the
//! GPU, then an asynchronous readback brings the committed positions
//! back as a CPU snapshot that is at most one frame stale. Conversation
//! pairing, chat sessions, formations, and picking all run against that
//! snapshot and feed their decisions back through small dirty-tracked
//! buffer uploads.
//!
//! ## Quick Start
//!
//! ```ignore
//! use crowd::prelude::*;
//!
//! fn main() -> Result<(), InitError> {
//!     let mut scene = Scene::initialize(load_assets())?;
//!     scene.configure(256, SimParams::default());
//!
//!     scene.subscribe(|event| {
//!         if let SimEvent::EncounterChanged(Some(id)) = event {
//!             println!("player met {id}");
//!         }
//!     });
//!
//!     loop {
//!         scene.tick();
//!         // render with scene.position_buffer() ...
//!     }
//! }
//! ```
//!
//! ## Core Concepts
//!
//! ### Agents
//!
//! Agents are dense integer ids; [`PLAYER`] (id 0) is the avatar, every
//! other agent is an autonomous NPC. Each agent is in exactly one
//! [`BehaviorState`]: `Flocking`, `Frozen`, `Seeking`, or `Talking`.
//!
//! ### Division of labor
//!
//! The kernel integrates positions and never changes behavior state;
//! the CPU changes behavior state and never integrates positions. The
//! CPU-side [`InstanceStore`] is the authority for all commanded state
//! and uploads only the entries that changed.
//!
//! ### Events
//!
//! The scene emits typed [`SimEvent`]s (encounters, speaking changes,
//! chat arrival, performance samples) to listeners registered with
//! [`Scene::subscribe`].
//!
//! ### Animation
//!
//! Skeletal clips are baked at load time into flat matrix buffers and
//! played back by frame index only — [`ClipKind`] is a closed enum, so
//! clip lookup is an array index, never a string key.

mod agent;
mod animation;
mod behavior;
mod camera;
mod error;
mod events;
mod formation;
mod gpu;
mod kernel;
mod picking;
mod readback;
mod scene;
mod store;
mod time;

pub use agent::{AgentId, BehaviorState, Expression, SimParams, PLAYER};
pub use animation::{
    bake, BakedClip, Bone, BoneTrack, Clip, ClipKind, ClipSet, Keyframe, Skeleton, BAKE_FPS,
};
pub use behavior::{
    BehaviorManager, FrozenPair, ARRIVE_THRESHOLD, COLLISION_RADIUS, ENCOUNTER_RADIUS,
    TALK_DURATION_MS,
};
pub use camera::{Camera, Ray};
pub use error::{GpuError, InitError};
pub use events::{EventQueue, EventRegistry, SimEvent};
pub use formation::FormationController;
pub use glam::{Vec2, Vec3};
pub use gpu::{GpuContext, InstanceBuffers};
pub use kernel::{boundary_correction, build_wgsl, KernelParams, WORKGROUP_SIZE};
pub use picking::{ground_point, ray_sphere, HoverAnchor, PickAction, Picker};
pub use readback::{PositionReadback, Snapshot};
pub use scene::{Scene, SceneAssets};
pub use store::InstanceStore;
pub use time::FrameClock;

/// Convenience re-exports for typical callers.
pub mod prelude {
    pub use crate::{
        AgentId, BehaviorState, Clip, ClipKind, Expression, InitError, Scene, SceneAssets,
        SimEvent, SimParams, Skeleton, Vec2, Vec3, PLAYER,
    };
}
