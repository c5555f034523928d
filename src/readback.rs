//! Asynchronous GPU→CPU position readback.
//!
//! Once per frame the committed position buffer is copied into a staging
//! buffer and mapped. The map completes on a later poll, so the CPU-side
//! snapshot lags the GPU by at most one frame; every CPU consumer
//! (behavior, formation, picking) reads only this snapshot.
//!
//! Exactly one readback is ever in flight. A request arriving while one
//! is outstanding is coalesced, not queued: under frame-rate variance a
//! queue would grow without bound, and the newest positions supersede
//! the older ones anyway. A transient mapping failure keeps the last
//! good snapshot and logs a warning; it never blocks the tick.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use glam::Vec3;

use crate::agent::{AgentId, PositionGpu};

const MAP_IDLE: u8 = 0;
const MAP_PENDING: u8 = 1;
const MAP_READY: u8 = 2;
const MAP_FAILED: u8 = 3;

/// CPU-visible copy of the agent positions, at most one frame stale.
#[derive(Debug, Clone)]
pub struct Snapshot {
    positions: Vec<Vec3>,
    /// Tick index of the readback this snapshot came from.
    pub frame: u64,
}

impl Snapshot {
    pub fn new(count: u32) -> Self {
        Self {
            positions: vec![Vec3::ZERO; count as usize],
            frame: 0,
        }
    }

    /// Build a snapshot directly from positions. Used by tests and by
    /// the scene before the first readback lands.
    pub fn from_positions(positions: Vec<Vec3>) -> Self {
        Self { positions, frame: 0 }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn position(&self, id: AgentId) -> Option<Vec3> {
        self.positions.get(id.index()).copied()
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub(crate) fn write_from_gpu(&mut self, raw: &[PositionGpu]) {
        self.positions.clear();
        self.positions.extend(raw.iter().map(|p| Vec3::from(p.pos)));
        self.frame += 1;
    }
}

pub struct PositionReadback {
    staging: wgpu::Buffer,
    size: u64,
    in_flight: bool,
    copy_encoded: bool,
    map_state: Arc<AtomicU8>,
}

impl PositionReadback {
    pub fn new(device: &wgpu::Device, size: u64) -> Self {
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Position Readback Staging"),
            size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        Self {
            staging,
            size,
            in_flight: false,
            copy_encoded: false,
            map_state: Arc::new(AtomicU8::new(MAP_IDLE)),
        }
    }

    /// Encode a copy of `source` into the staging buffer, unless a
    /// readback is already outstanding (in which case this request is
    /// coalesced into it).
    pub fn request(&mut self, encoder: &mut wgpu::CommandEncoder, source: &wgpu::Buffer) {
        if self.in_flight {
            log::debug!("readback still in flight, coalescing request");
            return;
        }
        encoder.copy_buffer_to_buffer(source, 0, &self.staging, 0, self.size);
        self.copy_encoded = true;
    }

    /// Start the asynchronous map. Call after the encoder carrying the
    /// copy has been submitted.
    pub fn begin_map(&mut self) {
        if !self.copy_encoded {
            return;
        }
        self.copy_encoded = false;
        self.in_flight = true;
        self.map_state.store(MAP_PENDING, Ordering::Release);

        let state = self.map_state.clone();
        self.staging.slice(..).map_async(wgpu::MapMode::Read, move |result| {
            let outcome = if result.is_ok() { MAP_READY } else { MAP_FAILED };
            state.store(outcome, Ordering::Release);
        });
    }

    /// Poll the device and, if the map completed, copy the positions
    /// into `snapshot`. Returns true when the snapshot was refreshed.
    pub fn try_consume(&mut self, device: &wgpu::Device, snapshot: &mut Snapshot) -> bool {
        if !self.in_flight {
            return false;
        }
        device.poll(wgpu::Maintain::Poll);

        match self.map_state.load(Ordering::Acquire) {
            MAP_READY => {
                {
                    let view = self.staging.slice(..).get_mapped_range();
                    let raw: &[PositionGpu] = bytemuck::cast_slice(&view);
                    snapshot.write_from_gpu(raw);
                }
                self.staging.unmap();
                self.in_flight = false;
                self.map_state.store(MAP_IDLE, Ordering::Release);
                true
            }
            MAP_FAILED => {
                // Buffer returns to the unmapped state on failure; the
                // last good snapshot stays in use for this tick.
                log::warn!("position readback failed, reusing previous snapshot");
                self.in_flight = false;
                self.map_state.store(MAP_IDLE, Ordering::Release);
                false
            }
            _ => false,
        }
    }

    /// Whether a readback is currently outstanding.
    #[inline]
    pub fn in_flight(&self) -> bool {
        self.in_flight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_lookup() {
        let snap = Snapshot::from_positions(vec![
            Vec3::ZERO,
            Vec3::new(1.0, 0.0, 2.0),
        ]);
        assert_eq!(snap.position(AgentId(1)), Some(Vec3::new(1.0, 0.0, 2.0)));
        assert_eq!(snap.position(AgentId(2)), None);
    }

    #[test]
    fn test_snapshot_refresh_bumps_frame() {
        let mut snap = Snapshot::new(2);
        assert_eq!(snap.frame, 0);
        let raw = [
            PositionGpu { pos: [3.0, 0.0, 4.0], _pad: 0.0 },
            PositionGpu { pos: [5.0, 0.0, 6.0], _pad: 0.0 },
        ];
        snap.write_from_gpu(&raw);
        assert_eq!(snap.frame, 1);
        assert_eq!(snap.position(AgentId(0)), Some(Vec3::new(3.0, 0.0, 4.0)));
    }
}
