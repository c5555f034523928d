//! Error types for the crowd simulation core.
//!
//! Only initialization is fallible. Every command entry point on a live
//! scene ignores or clamps bad input instead of returning errors, because
//! a real-time tick loop has nothing useful to do with a `Result` from a
//! stale UI command.

use std::fmt;

use crate::animation::ClipKind;

/// Errors that can occur while acquiring the GPU.
#[derive(Debug)]
pub enum GpuError {
    /// No compatible GPU adapter found.
    NoAdapter,
    /// Failed to create GPU device.
    DeviceCreation(wgpu::RequestDeviceError),
    /// Failed to map a buffer for reading.
    BufferMapping(String),
}

impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuError::NoAdapter => write!(f, "No compatible GPU adapter found. Ensure your system has a GPU with WebGPU/Vulkan/Metal/DX12 support."),
            GpuError::DeviceCreation(e) => write!(f, "Failed to create GPU device: {}", e),
            GpuError::BufferMapping(msg) => write!(f, "Failed to map GPU buffer: {}", msg),
        }
    }
}

impl std::error::Error for GpuError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GpuError::DeviceCreation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<wgpu::RequestDeviceError> for GpuError {
    fn from(e: wgpu::RequestDeviceError) -> Self {
        GpuError::DeviceCreation(e)
    }
}

/// Errors that can occur during scene initialization.
///
/// Initialization fails loud and fatal: no partial simulation ever starts.
#[derive(Debug)]
pub enum InitError {
    /// GPU acquisition failed.
    Gpu(GpuError),
    /// A required animation clip was not provided.
    MissingClip(ClipKind),
    /// A provided clip has zero duration or no keyframes.
    EmptyClip(ClipKind),
    /// Clip track count does not match the skeleton bone count.
    TrackMismatch {
        /// Which clip was malformed.
        kind: ClipKind,
        /// Bones in the skeleton.
        bones: usize,
        /// Tracks in the clip.
        tracks: usize,
    },
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::Gpu(e) => write!(f, "GPU error: {}", e),
            InitError::MissingClip(kind) => {
                write!(f, "Required animation clip missing: {:?}", kind)
            }
            InitError::EmptyClip(kind) => {
                write!(f, "Animation clip {:?} has zero duration or no keyframes", kind)
            }
            InitError::TrackMismatch { kind, bones, tracks } => write!(
                f,
                "Clip {:?} has {} tracks but the skeleton has {} bones",
                kind, tracks, bones
            ),
        }
    }
}

impl std::error::Error for InitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InitError::Gpu(e) => Some(e),
            _ => None,
        }
    }
}

impl From<GpuError> for InitError {
    fn from(e: GpuError) -> Self {
        InitError::Gpu(e)
    }
}
