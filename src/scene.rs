//! Scene facade: owns every subsystem and runs the per-tick pipeline.
//!
//! Tick order is fixed: clock, dirty-state upload, kernel dispatch,
//! readback request, snapshot consume, behavior, formation, event
//! fan-out. The GPU integrates positions; the CPU layers decisions on
//! top of the (at most one frame stale) snapshot.
//!
//! All commands are fire-and-forget after initialization: bad input is
//! dropped with a debug log, never returned as an error.

use glam::{Vec2, Vec3};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::agent::{AgentId, BehaviorState, Expression, SimParams, PLAYER};
use crate::animation::{bake, BakedClip, Clip, ClipKind, ClipSet, Skeleton, BAKE_FPS};
use crate::behavior::BehaviorManager;
use crate::camera::Camera;
use crate::events::{EventQueue, EventRegistry, SimEvent};
use crate::formation::FormationController;
use crate::gpu::{GpuContext, InstanceBuffers};
use crate::kernel::KernelParams;
use crate::picking::{HoverAnchor, PickAction, Picker};
use crate::readback::{PositionReadback, Snapshot};
use crate::store::InstanceStore;
use crate::time::FrameClock;

const DEFAULT_AGENT_COUNT: u32 = 64;
/// How often a `PerformanceSample` event is emitted.
const PERF_INTERVAL_MS: u64 = 500;

/// Everything the scene needs from the asset pipeline: one skeleton and
/// the raw clips, keyed by kind. Clips are baked during initialization.
pub struct SceneAssets {
    pub skeleton: Skeleton,
    pub clips: Vec<(ClipKind, Clip)>,
}

/// The complete crowd simulation. One instance per world.
pub struct Scene {
    gpu: GpuContext,
    store: InstanceStore,
    buffers: InstanceBuffers,
    readback: PositionReadback,
    snapshot: Snapshot,
    behavior: BehaviorManager,
    formation: FormationController,
    picker: Picker,
    camera: Camera,
    clips: ClipSet,
    clock: FrameClock,
    events: EventQueue,
    registry: EventRegistry,
    rng: StdRng,
    last_perf_ms: u64,
    draw_calls: u32,
    triangles: u32,
}

impl Scene {
    /// Validate and bake the assets, acquire a GPU device, and seed the
    /// default crowd. Fails loud: no partial scene ever starts ticking.
    pub fn initialize(assets: SceneAssets) -> Result<Self, crate::error::InitError> {
        let clips = bake_assets(&assets)?;
        let gpu = GpuContext::new_blocking()?;

        let mut rng = StdRng::from_entropy();
        let params = SimParams::default();
        let store = InstanceStore::new(DEFAULT_AGENT_COUNT, params, &mut rng);
        let buffers = InstanceBuffers::new(&gpu.device, &store);
        let readback = PositionReadback::new(&gpu.device, buffers.positions_size());
        let snapshot = seed_snapshot(&store);

        log::info!(
            "scene initialized: {} agents, world half-extent {}",
            store.count(),
            params.world_half
        );

        Ok(Self {
            snapshot,
            behavior: BehaviorManager::new(store.count()),
            formation: FormationController::new(),
            picker: Picker::new(params.world_half),
            camera: Camera::new(),
            clips,
            clock: FrameClock::new(),
            events: EventQueue::new(),
            registry: EventRegistry::new(),
            rng,
            last_perf_ms: 0,
            draw_calls: 0,
            triangles: 0,
            store,
            buffers,
            readback,
            gpu,
        })
    }

    /// Rebuild the crowd with a new agent count and parameters. All
    /// per-agent state (pairs, formation slots, selection) is dropped;
    /// the device, camera, baked clips, and listeners survive.
    pub fn configure(&mut self, count: u32, params: SimParams) {
        let count = count.max(1);
        self.store = InstanceStore::new(count, params, &mut self.rng);
        self.buffers = InstanceBuffers::new(&self.gpu.device, &self.store);
        self.readback = PositionReadback::new(&self.gpu.device, self.buffers.positions_size());
        self.snapshot = seed_snapshot(&self.store);
        self.behavior.reset(count);
        self.formation = FormationController::new();
        self.picker = Picker::new(params.world_half);
        log::info!("scene reconfigured: {} agents", count);
    }

    /// Advance the simulation one frame.
    pub fn tick(&mut self) {
        let (elapsed, delta) = self.clock.update();
        let now_ms = self.clock.elapsed_ms();

        let params = self.store.params();
        let kernel_params = KernelParams {
            speed: params.speed,
            separation_radius: params.separation_radius,
            separation_strength: params.separation_strength,
            world_half: params.world_half,
            delta_time: delta,
            time: elapsed,
            agent_count: self.store.count(),
            // Varies the stalled-heading hash from frame to frame.
            seed: self.clock.frame() as u32,
        };
        self.buffers
            .flush(&self.gpu.queue, &mut self.store, kernel_params);

        // Consume the previous tick's readback before encoding a new
        // one, so every tick both lands a snapshot and launches a copy.
        self.readback.try_consume(&self.gpu.device, &mut self.snapshot);

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Crowd Tick Encoder"),
            });
        self.buffers.dispatch(&mut encoder);
        self.readback.request(&mut encoder, self.buffers.front_positions());
        self.gpu.queue.submit(Some(encoder.finish()));
        self.readback.begin_map();

        self.behavior
            .tick(&self.snapshot, now_ms, &mut self.store, &mut self.events);
        self.formation.tick(&self.snapshot, &mut self.store);

        if now_ms.saturating_sub(self.last_perf_ms) >= PERF_INTERVAL_MS {
            self.last_perf_ms = now_ms;
            self.events.push(SimEvent::PerformanceSample {
                fps: self.clock.fps(),
                draw_calls: self.draw_calls,
                triangles: self.triangles,
            });
        }

        for event in self.events.drain() {
            self.registry.dispatch(&event);
        }
    }

    /// Tear the scene down. Readbacks are single-in-flight and timers
    /// are plain wall-clock comparisons, so dropping is sufficient; this
    /// exists to make teardown an explicit, logged step.
    pub fn dispose(self) {
        log::info!("scene disposed after {} frames", self.clock.frame());
    }

    // ========== Commands ==========

    pub fn set_waypoint(&mut self, id: AgentId, x: f32, z: f32) {
        self.store.set_waypoint(id, x, z);
    }

    pub fn set_state(&mut self, id: AgentId, state: BehaviorState) {
        self.store.set_state(id, state);
    }

    pub fn set_expression(&mut self, id: AgentId, expression: Expression) {
        self.store.set_expression(id, expression);
    }

    pub fn set_params(&mut self, params: SimParams) {
        self.picker.set_world_half(params.world_half);
        self.store.set_params(params);
    }

    pub fn start_chat(&mut self, target: AgentId) {
        self.behavior
            .start_chat(target, &self.snapshot, &mut self.store, &mut self.events);
    }

    pub fn end_chat(&mut self, target: AgentId) {
        self.behavior.end_chat(target, &mut self.store);
    }

    pub fn formation_enter(&mut self) {
        self.formation.enter(&mut self.store);
    }

    pub fn formation_exit(&mut self) {
        self.formation.exit(&mut self.store);
    }

    pub fn formation_look_at(&mut self, source: AgentId, target: AgentId) {
        self.formation
            .look_at(source, target, &self.snapshot, &mut self.store);
    }

    pub fn formation_face_center(&mut self, agent: AgentId) {
        self.formation.face_center(agent, &mut self.store);
    }

    /// Register a listener for every event the scene emits.
    pub fn subscribe<F>(&mut self, listener: F)
    where
        F: FnMut(&SimEvent) + 'static,
    {
        self.registry.subscribe(listener);
    }

    /// Feed the renderer's frame statistics into the next
    /// `PerformanceSample`.
    pub fn note_render_stats(&mut self, draw_calls: u32, triangles: u32) {
        self.draw_calls = draw_calls;
        self.triangles = triangles;
    }

    // ========== Pointer input ==========

    pub fn pointer_down(&mut self, pixel: Vec2) {
        self.picker.pointer_down(pixel);
    }

    /// Resolve a pointer release. A ground click walks the player there;
    /// selection changes are reflected in [`Scene::selected`].
    pub fn pointer_up(&mut self, pixel: Vec2, viewport: (f32, f32)) -> PickAction {
        let ray = self.camera.screen_ray(pixel, viewport);
        let action = self.picker.pointer_up(pixel, ray, &self.snapshot);
        if let PickAction::MoveTo(p) = action {
            self.store.set_waypoint(PLAYER, p.x, p.y);
            self.store.set_state(PLAYER, BehaviorState::Seeking);
        }
        action
    }

    pub fn hover(&mut self, pixel: Vec2, viewport: (f32, f32)) -> Option<HoverAnchor> {
        let ray = self.camera.screen_ray(pixel, viewport);
        self.picker.hover(ray, &self.snapshot, &self.camera, viewport)
    }

    pub fn clear_selection(&mut self) {
        self.picker.clear_selection();
    }

    // ========== Queries ==========

    #[inline]
    pub fn count(&self) -> u32 {
        self.store.count()
    }

    pub fn position(&self, id: AgentId) -> Option<Vec3> {
        self.snapshot.position(id)
    }

    pub fn behavior_state(&self, id: AgentId) -> Option<BehaviorState> {
        self.store.state(id)
    }

    pub fn is_speaking(&self, id: AgentId) -> bool {
        self.store.is_speaking(id)
    }

    pub fn color(&self, id: AgentId) -> Option<Vec3> {
        self.store.color(id)
    }

    pub fn selected(&self) -> Option<AgentId> {
        self.picker.selected()
    }

    pub fn hovered(&self) -> Option<AgentId> {
        self.picker.hovered()
    }

    /// Current animation frame for `id`: the clip follows the behavior
    /// state and the per-agent phase keeps the crowd out of lock-step.
    pub fn animation_frame(&self, id: AgentId) -> Option<u32> {
        let state = self.store.state(id)?;
        let phase = self.store.phase(id)?;
        Some(self.clips.for_state(state).frame_at(self.clock.elapsed(), phase))
    }

    pub fn clip(&self, kind: ClipKind) -> &BakedClip {
        self.clips.get(kind)
    }

    #[inline]
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    #[inline]
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    #[inline]
    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    #[inline]
    pub fn clock_mut(&mut self) -> &mut FrameClock {
        &mut self.clock
    }

    #[inline]
    pub fn fps(&self) -> f32 {
        self.clock.fps()
    }

    // ========== Renderer interop ==========

    /// Device shared with a renderer drawing the crowd.
    pub fn device(&self) -> &wgpu::Device {
        &self.gpu.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.gpu.queue
    }

    /// Latest committed position buffer, usable as instanced vertex data.
    pub fn position_buffer(&self) -> &wgpu::Buffer {
        self.buffers.front_positions()
    }

    pub fn expression_buffer(&self) -> &wgpu::Buffer {
        self.buffers.expressions()
    }
}

/// Bake and validate the asset clips into the fixed clip table.
fn bake_assets(assets: &SceneAssets) -> Result<ClipSet, crate::error::InitError> {
    use crate::error::InitError;

    let bones = assets.skeleton.bone_count();
    let mut baked: [Option<BakedClip>; 3] = [None, None, None];

    for kind in ClipKind::ALL {
        let clip = assets
            .clips
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, c)| c)
            .ok_or(InitError::MissingClip(kind))?;
        if clip.is_empty() {
            return Err(InitError::EmptyClip(kind));
        }
        if clip.tracks.len() != bones {
            return Err(InitError::TrackMismatch {
                kind,
                bones,
                tracks: clip.tracks.len(),
            });
        }
        baked[kind as usize] = Some(bake(&assets.skeleton, clip, BAKE_FPS));
    }

    let [Some(idle), Some(walk), Some(talk)] = baked else {
        unreachable!("every clip kind was just baked");
    };
    Ok(ClipSet::new(idle, walk, talk))
}

/// Snapshot of the seed positions, used until the first readback lands.
fn seed_snapshot(store: &InstanceStore) -> Snapshot {
    Snapshot::from_positions(
        (0..store.count())
            .filter_map(|i| store.seed_position(AgentId(i)))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{Bone, BoneTrack, Keyframe};
    use glam::{Quat, Vec3};

    fn skeleton() -> Skeleton {
        Skeleton {
            bones: vec![Bone { parent: None }],
        }
    }

    fn clip(duration: f32) -> Clip {
        Clip {
            duration,
            tracks: vec![BoneTrack {
                keys: vec![Keyframe {
                    time: 0.0,
                    translation: Vec3::ZERO,
                    rotation: Quat::IDENTITY,
                    scale: Vec3::ONE,
                }],
            }],
        }
    }

    fn assets() -> SceneAssets {
        SceneAssets {
            skeleton: skeleton(),
            clips: vec![
                (ClipKind::Idle, clip(1.0)),
                (ClipKind::Walk, clip(0.8)),
                (ClipKind::Talk, clip(1.2)),
            ],
        }
    }

    #[test]
    fn test_bake_assets_accepts_complete_set() {
        let clips = bake_assets(&assets()).unwrap();
        assert_eq!(clips.get(ClipKind::Walk).bone_count(), 1);
    }

    #[test]
    fn test_missing_clip_rejected() {
        let mut assets = assets();
        assets.clips.retain(|(k, _)| *k != ClipKind::Talk);
        assert!(matches!(
            bake_assets(&assets),
            Err(crate::error::InitError::MissingClip(ClipKind::Talk))
        ));
    }

    #[test]
    fn test_empty_clip_rejected() {
        let mut assets = assets();
        assets.clips[0].1 = clip(0.0);
        assert!(matches!(
            bake_assets(&assets),
            Err(crate::error::InitError::EmptyClip(ClipKind::Idle))
        ));
    }

    #[test]
    fn test_track_mismatch_rejected() {
        let mut assets = assets();
        assets.skeleton.bones.push(Bone { parent: Some(0) });
        assert!(matches!(
            bake_assets(&assets),
            Err(crate::error::InitError::TrackMismatch { bones: 2, tracks: 1, .. })
        ));
    }
}
