//! Compute kernel source for the per-frame agent update.
//!
//! The kernel is generated as one explicit WGSL string with a fixed
//! branch order: stationary states (Frozen/Talking) short-circuit first,
//! then Seeking, and only agents that fall through to the end receive
//! flocking forces. State transitions never happen here; the kernel
//! reads behavior state, it does not write it.
//!
//! Positions are ping-ponged: separation reads every *other* agent's
//! position from the previous tick's committed buffer, so the pass has
//! no ordering dependency between agents. The one-tick staleness this
//! introduces is an accepted property of the design, not a bug.

use bytemuck::{Pod, Zeroable};

/// Threads per workgroup of the agent update pass.
pub const WORKGROUP_SIZE: u32 = 256;

/// Speed multiplier applied while Seeking.
pub const SEEK_SPEED_FACTOR: f32 = 3.0;

/// Uniform block consumed by the kernel. Layout must match the WGSL
/// `Params` struct below.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct KernelParams {
    pub speed: f32,
    pub separation_radius: f32,
    pub separation_strength: f32,
    pub world_half: f32,
    pub delta_time: f32,
    pub time: f32,
    pub agent_count: u32,
    pub seed: u32,
}

/// Boundary steering along one axis: the signed acceleration pushing an
/// agent at `coord` back toward the center. Zero strictly inside the
/// half-extent; active at exactly the half-extent; the magnitude grows
/// strictly with the overshoot. The WGSL `boundary_correction` below
/// mirrors this exactly.
pub fn boundary_correction(coord: f32, world_half: f32, strength: f32) -> f32 {
    if coord.abs() < world_half {
        return 0.0;
    }
    let overshoot = coord.abs() - world_half + 1.0;
    -coord.signum() * strength * overshoot
}

/// Generate the WGSL source of the agent update kernel.
pub fn build_wgsl() -> String {
    format!(
        r#"struct Params {{
    speed: f32,
    separation_radius: f32,
    separation_strength: f32,
    world_half: f32,
    delta_time: f32,
    time: f32,
    agent_count: u32,
    seed: u32,
}}

struct Motion {{
    state: u32,
    speaking: u32,
    waypoint: vec2<f32>,
}}

const STATE_FLOCKING: u32 = 0u;
const STATE_FROZEN: u32 = 1u;
const STATE_SEEKING: u32 = 2u;
const STATE_TALKING: u32 = 3u;

@group(0) @binding(0)
var<storage, read> positions_in: array<vec4<f32>>;

@group(0) @binding(1)
var<storage, read_write> positions_out: array<vec4<f32>>;

@group(0) @binding(2)
var<storage, read_write> velocities: array<vec4<f32>>;

@group(0) @binding(3)
var<storage, read> motions: array<Motion>;

@group(0) @binding(4)
var<uniform> params: Params;

// Boundary steering along one axis; mirrors the Rust helper of the
// same name. Active at exactly the half-extent, growing strictly with
// the overshoot.
fn boundary_correction(coord: f32) -> f32 {{
    if abs(coord) < params.world_half {{
        return 0.0;
    }}
    let overshoot = abs(coord) - params.world_half + 1.0;
    return -sign(coord) * params.separation_strength * overshoot;
}}

// Deterministic per-agent direction used to revive stalled agents.
fn seed_direction(index: u32) -> vec3<f32> {{
    let h = (index * 747796405u + params.seed) * 2891336453u;
    let angle = f32(h % 6283u) * 0.001;
    return vec3<f32>(cos(angle), 0.0, sin(angle));
}}

@compute @workgroup_size({wg})
fn main(@builtin(global_invocation_id) global_id: vec3<u32>) {{
    let index = global_id.x;
    if index >= params.agent_count {{
        return;
    }}

    let motion = motions[index];
    var pos = positions_in[index].xyz;
    var vel = velocities[index].xyz;

    // Stationary states hold position; the waypoint is a facing vector only.
    if motion.state == STATE_FROZEN || motion.state == STATE_TALKING {{
        positions_out[index] = vec4<f32>(pos, positions_in[index].w);
        return;
    }}

    if motion.state == STATE_SEEKING {{
        let to_target = vec3<f32>(motion.waypoint.x - pos.x, 0.0, motion.waypoint.y - pos.z);
        let dist = length(to_target);
        if dist > 1e-4 {{
            vel = to_target / dist * params.speed * {seek_factor:.1};
        }}
        pos += vel * params.delta_time;
        velocities[index] = vec4<f32>(vel, 0.0);
        positions_out[index] = vec4<f32>(pos, positions_in[index].w);
        return;
    }}

    // Flocking: separation from all neighbors within the radius, reading
    // the previous tick's committed positions.
    var accel = vec3<f32>(0.0, 0.0, 0.0);
    for (var i = 0u; i < params.agent_count; i++) {{
        if i == index {{
            continue;
        }}
        let away = pos - positions_in[i].xyz;
        let dist = length(away);
        if dist < params.separation_radius && dist > 1e-5 {{
            let falloff = 1.0 - dist / params.separation_radius;
            accel += away / dist * params.separation_strength * falloff;
        }}
    }}

    accel.x += boundary_correction(pos.x);
    accel.z += boundary_correction(pos.z);

    vel += accel * params.delta_time;
    vel.y = 0.0;

    // Renormalize to cruise speed; a stalled agent is nudged back onto a
    // seeded heading rather than left stationary.
    let speed = length(vel);
    if speed < 1e-4 {{
        vel = seed_direction(index) * params.speed;
    }} else {{
        vel = vel / speed * params.speed;
    }}

    pos += vel * params.delta_time;

    velocities[index] = vec4<f32>(vel, 0.0);
    positions_out[index] = vec4<f32>(pos, positions_in[index].w);
}}
"#,
        wg = WORKGROUP_SIZE,
        seek_factor = SEEK_SPEED_FACTOR,
    )
}
