//! Skeletal clip baking and hard-frame playback.
//!
//! A clip is baked once per load: sampled at a fixed rate across its
//! full duration, producing an immutable flat buffer of model-space
//! bone matrices laid out `frame * bone_count + bone`. Playback then
//! reduces to an index computation; there is no inter-frame or
//! inter-clip blending, hard frame selection is the accepted tradeoff.
//!
//! Clip selection is a closed enum over a fixed-size set: Idle while
//! Frozen, Talk while Talking, Walk otherwise. No string keys.

use glam::{Mat4, Quat, Vec3};

use crate::agent::BehaviorState;

/// Sampling rate used when baking, frames per second.
pub const BAKE_FPS: f32 = 60.0;

/// One bone of a skeleton. Bones are stored parent-before-child; the
/// root has no parent.
#[derive(Debug, Clone, Copy)]
pub struct Bone {
    pub parent: Option<u16>,
}

/// Bone hierarchy. Invariant: `bones[i].parent < i` for every non-root.
#[derive(Debug, Clone)]
pub struct Skeleton {
    pub bones: Vec<Bone>,
}

impl Skeleton {
    pub fn bone_count(&self) -> usize {
        self.bones.len()
    }
}

/// One sampled pose of one bone at one point in time.
#[derive(Debug, Clone, Copy)]
pub struct Keyframe {
    pub time: f32,
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Keyframe {
    fn local_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    fn lerp(a: &Keyframe, b: &Keyframe, s: f32) -> Keyframe {
        Keyframe {
            time: a.time + (b.time - a.time) * s,
            translation: a.translation.lerp(b.translation, s),
            rotation: a.rotation.slerp(b.rotation, s),
            scale: a.scale.lerp(b.scale, s),
        }
    }
}

/// Keyframes of one bone, sorted by time, never empty for a valid clip.
#[derive(Debug, Clone, Default)]
pub struct BoneTrack {
    pub keys: Vec<Keyframe>,
}

impl BoneTrack {
    /// Interpolated local pose at `t`, clamped to the track's range.
    fn sample(&self, t: f32) -> Mat4 {
        match self.keys.len() {
            0 => Mat4::IDENTITY,
            1 => self.keys[0].local_matrix(),
            _ => {
                if t <= self.keys[0].time {
                    return self.keys[0].local_matrix();
                }
                let last = &self.keys[self.keys.len() - 1];
                if t >= last.time {
                    return last.local_matrix();
                }
                let next = self.keys.partition_point(|k| k.time <= t);
                let (a, b) = (&self.keys[next - 1], &self.keys[next]);
                let span = (b.time - a.time).max(1e-6);
                Keyframe::lerp(a, b, (t - a.time) / span).local_matrix()
            }
        }
    }
}

/// An unbaked animation clip: one track per skeleton bone.
#[derive(Debug, Clone)]
pub struct Clip {
    pub duration: f32,
    pub tracks: Vec<BoneTrack>,
}

impl Clip {
    pub fn is_empty(&self) -> bool {
        self.duration <= 0.0 || self.tracks.iter().all(|t| t.keys.is_empty())
    }
}

/// A baked clip: immutable flat bone-matrix buffer.
#[derive(Debug, Clone)]
pub struct BakedClip {
    frame_count: u32,
    bone_count: u32,
    duration: f32,
    matrices: Vec<Mat4>,
}

impl BakedClip {
    #[inline]
    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    #[inline]
    pub fn bone_count(&self) -> u32 {
        self.bone_count
    }

    #[inline]
    pub fn duration(&self) -> f32 {
        self.duration
    }

    /// Frame index for `time` plus a per-agent `phase` offset. The
    /// normalized position wraps to `[0, 1)` and the frame clamps to
    /// `frame_count - 1`, so `t = 1 - eps` lands on the last frame.
    pub fn frame_at(&self, time: f32, phase: f32) -> u32 {
        let t = ((time + phase) / self.duration).rem_euclid(1.0);
        ((t * self.frame_count as f32) as u32).min(self.frame_count - 1)
    }

    /// All bone matrices of one frame.
    pub fn frame(&self, frame: u32) -> &[Mat4] {
        let frame = frame.min(self.frame_count - 1) as usize;
        let stride = self.bone_count as usize;
        &self.matrices[frame * stride..(frame + 1) * stride]
    }

    /// One bone matrix: `frame * bone_count + bone`.
    pub fn bone_matrix(&self, frame: u32, bone: u32) -> Mat4 {
        self.frame(frame)[bone.min(self.bone_count - 1) as usize]
    }

    /// Raw flat buffer, for upload into a bone texture/storage buffer.
    pub fn matrices(&self) -> &[Mat4] {
        &self.matrices
    }
}

/// Sample `clip` against `skeleton` at `fps` into a flat matrix buffer.
///
/// Each frame resolves every bone's interpolated local pose, then
/// multiplies down the parent chain (parents precede children, so a
/// single forward pass suffices).
pub fn bake(skeleton: &Skeleton, clip: &Clip, fps: f32) -> BakedClip {
    let bone_count = skeleton.bone_count();
    let frame_count = ((clip.duration * fps).ceil() as u32).max(1);

    let mut matrices = Vec::with_capacity(frame_count as usize * bone_count);
    let mut globals = vec![Mat4::IDENTITY; bone_count];

    for frame in 0..frame_count {
        let t = frame as f32 / fps;
        for (i, bone) in skeleton.bones.iter().enumerate() {
            let local = clip
                .tracks
                .get(i)
                .map(|track| track.sample(t))
                .unwrap_or(Mat4::IDENTITY);
            globals[i] = match bone.parent {
                Some(p) => globals[p as usize] * local,
                None => local,
            };
        }
        matrices.extend_from_slice(&globals);
    }

    BakedClip {
        frame_count,
        bone_count: bone_count as u32,
        duration: clip.duration,
        matrices,
    }
}

// ---------------------------------------------------------------------------
// Clip selection
// ---------------------------------------------------------------------------

/// The closed set of clips every agent cycles between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipKind {
    Idle,
    Walk,
    Talk,
}

impl ClipKind {
    pub const ALL: [ClipKind; 3] = [ClipKind::Idle, ClipKind::Walk, ClipKind::Talk];

    /// Clip used for a behavior macro-state.
    pub fn for_state(state: BehaviorState) -> Self {
        match state {
            BehaviorState::Frozen => ClipKind::Idle,
            BehaviorState::Talking => ClipKind::Talk,
            BehaviorState::Flocking | BehaviorState::Seeking => ClipKind::Walk,
        }
    }
}

/// Fixed-size clip table indexed by [`ClipKind`].
#[derive(Debug, Clone)]
pub struct ClipSet {
    clips: [BakedClip; 3],
}

impl ClipSet {
    pub fn new(idle: BakedClip, walk: BakedClip, talk: BakedClip) -> Self {
        Self {
            clips: [idle, walk, talk],
        }
    }

    #[inline]
    pub fn get(&self, kind: ClipKind) -> &BakedClip {
        &self.clips[kind as usize]
    }

    #[inline]
    pub fn for_state(&self, state: BehaviorState) -> &BakedClip {
        self.get(ClipKind::for_state(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_bone_skeleton() -> Skeleton {
        Skeleton {
            bones: vec![Bone { parent: None }, Bone { parent: Some(0) }],
        }
    }

    fn translation_key(time: f32, x: f32) -> Keyframe {
        Keyframe {
            time,
            translation: Vec3::new(x, 0.0, 0.0),
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }

    fn walk_clip() -> Clip {
        Clip {
            duration: 1.0,
            tracks: vec![
                BoneTrack {
                    keys: vec![translation_key(0.0, 0.0), translation_key(1.0, 6.0)],
                },
                BoneTrack {
                    keys: vec![translation_key(0.0, 1.0)],
                },
            ],
        }
    }

    #[test]
    fn test_bake_layout() {
        let baked = bake(&two_bone_skeleton(), &walk_clip(), BAKE_FPS);
        assert_eq!(baked.frame_count(), 60);
        assert_eq!(baked.bone_count(), 2);
        assert_eq!(baked.matrices().len(), 60 * 2);
    }

    #[test]
    fn test_bake_sample_round_trip() {
        let baked = bake(&two_bone_skeleton(), &walk_clip(), BAKE_FPS);

        // Deterministic on repeated calls.
        for _ in 0..3 {
            assert_eq!(baked.frame_at(0.0, 0.0), 0);
            assert_eq!(
                baked.frame_at(baked.duration() * (1.0 - 1e-4), 0.0),
                baked.frame_count() - 1
            );
        }
    }

    #[test]
    fn test_frame_wraps_past_duration() {
        let baked = bake(&two_bone_skeleton(), &walk_clip(), BAKE_FPS);
        assert_eq!(baked.frame_at(1.0, 0.0), 0);
        assert_eq!(baked.frame_at(2.5, 0.0), baked.frame_at(0.5, 0.0));
    }

    #[test]
    fn test_phase_offsets_select_different_frames() {
        let baked = bake(&two_bone_skeleton(), &walk_clip(), BAKE_FPS);
        assert_ne!(baked.frame_at(0.25, 0.0), baked.frame_at(0.25, 0.4));
    }

    #[test]
    fn test_child_inherits_parent_transform() {
        let baked = bake(&two_bone_skeleton(), &walk_clip(), BAKE_FPS);

        // At the last frame the root has moved nearly the full 6 units;
        // the child is the root's transform plus its local offset of 1.
        let last = baked.frame_count() - 1;
        let root_x = baked.bone_matrix(last, 0).w_axis.x;
        let child_x = baked.bone_matrix(last, 1).w_axis.x;
        assert!((child_x - root_x - 1.0).abs() < 1e-4);
        assert!(root_x > 5.0);
    }

    #[test]
    fn test_clip_kind_per_state() {
        assert_eq!(ClipKind::for_state(BehaviorState::Frozen), ClipKind::Idle);
        assert_eq!(ClipKind::for_state(BehaviorState::Talking), ClipKind::Talk);
        assert_eq!(ClipKind::for_state(BehaviorState::Flocking), ClipKind::Walk);
        assert_eq!(ClipKind::for_state(BehaviorState::Seeking), ClipKind::Walk);
    }

    #[test]
    fn test_single_key_track_is_constant() {
        let skeleton = Skeleton {
            bones: vec![Bone { parent: None }],
        };
        let clip = Clip {
            duration: 0.5,
            tracks: vec![BoneTrack {
                keys: vec![translation_key(0.0, 2.0)],
            }],
        };
        let baked = bake(&skeleton, &clip, BAKE_FPS);
        for frame in 0..baked.frame_count() {
            assert_eq!(baked.bone_matrix(frame, 0).w_axis.x, 2.0);
        }
    }
}
