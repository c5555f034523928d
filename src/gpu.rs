//! GPU device acquisition and the device-resident instance buffers.
//!
//! The context is headless: the simulation core never owns a window or
//! surface. A renderer that wants to draw the crowd shares the same
//! device and reads the position/expression buffers as vertex data.

use std::sync::Arc;

use wgpu::util::DeviceExt;

use crate::agent::{ExpressionGpu, MotionGpu};
use crate::error::GpuError;
use crate::kernel::{self, KernelParams, WORKGROUP_SIZE};
use crate::store::InstanceStore;

const ELEM_SIZE: u64 = 16;

pub struct GpuContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
}

impl GpuContext {
    /// Acquire a headless compute-capable device.
    pub async fn new() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("crowd device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await?;

        // A validation error after init must degrade, never crash the loop.
        device.on_uncaptured_error(Box::new(|e| {
            log::warn!("uncaptured GPU error, frame will be skipped: {e}");
        }));

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
        })
    }

    /// Blocking wrapper over [`GpuContext::new`].
    pub fn new_blocking() -> Result<Self, GpuError> {
        pollster::block_on(Self::new())
    }
}

/// Device-side instance state store plus the agent update pipeline.
///
/// Positions are double-buffered: each dispatch reads the previous
/// tick's committed buffer and writes the other, then flips parity, so
/// `front_positions` always names the latest committed tick.
pub struct InstanceBuffers {
    positions: [wgpu::Buffer; 2],
    velocities: wgpu::Buffer,
    motions: wgpu::Buffer,
    expressions: wgpu::Buffer,
    params: wgpu::Buffer,
    bind_groups: [wgpu::BindGroup; 2],
    pipeline: wgpu::ComputePipeline,
    count: u32,
    parity: usize,
}

impl InstanceBuffers {
    /// Build all buffers from the store's seed arrays and compile the
    /// update kernel. Called at init and on every reconfigure.
    pub fn new(device: &wgpu::Device, store: &InstanceStore) -> Self {
        let positions = [
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Agent Positions A"),
                contents: bytemuck::cast_slice(store.positions_raw()),
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::VERTEX
                    | wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::COPY_SRC,
            }),
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Agent Positions B"),
                contents: bytemuck::cast_slice(store.positions_raw()),
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::VERTEX
                    | wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::COPY_SRC,
            }),
        ];

        let velocities = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Agent Velocities"),
            contents: bytemuck::cast_slice(store.velocities_raw()),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        });

        let motions = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Agent Motions"),
            contents: bytemuck::cast_slice(store.motions_raw()),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        });

        let expressions = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Agent Expressions"),
            contents: bytemuck::cast_slice(store.expressions_raw()),
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::VERTEX
                | wgpu::BufferUsages::COPY_DST,
        });

        let params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Kernel Params"),
            size: std::mem::size_of::<KernelParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Agent Update Bind Group Layout"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, false),
                storage_entry(2, false),
                storage_entry(3, true),
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let bind_groups = [
            Self::bind_group(device, &layout, &positions[0], &positions[1], &velocities, &motions, &params),
            Self::bind_group(device, &layout, &positions[1], &positions[0], &velocities, &motions, &params),
        ];

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Agent Update Kernel"),
            source: wgpu::ShaderSource::Wgsl(kernel::build_wgsl().into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Agent Update Pipeline Layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Agent Update Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        Self {
            positions,
            velocities,
            motions,
            expressions,
            params,
            bind_groups,
            pipeline,
            count: store.count(),
            parity: 0,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        pos_in: &wgpu::Buffer,
        pos_out: &wgpu::Buffer,
        velocities: &wgpu::Buffer,
        motions: &wgpu::Buffer,
        params: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Agent Update Bind Group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: pos_in.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: pos_out.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: velocities.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: motions.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 4, resource: params.as_entire_binding() },
            ],
        })
    }

    /// Upload every store entry mutated since the last flush, plus the
    /// kernel parameters. Must run before `dispatch` each tick.
    pub fn flush(&self, queue: &wgpu::Queue, store: &mut InstanceStore, params: KernelParams) {
        for (index, motion) in store.take_dirty_motions() {
            queue.write_buffer(
                &self.motions,
                u64::from(index) * ELEM_SIZE,
                bytemuck::bytes_of::<MotionGpu>(&motion),
            );
        }
        for (index, expression) in store.take_dirty_expressions() {
            queue.write_buffer(
                &self.expressions,
                u64::from(index) * ELEM_SIZE,
                bytemuck::bytes_of::<ExpressionGpu>(&expression),
            );
        }
        queue.write_buffer(&self.params, 0, bytemuck::bytes_of(&params));
    }

    /// Encode one agent update pass and flip the position parity.
    pub fn dispatch(&mut self, encoder: &mut wgpu::CommandEncoder) {
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Agent Update Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.bind_groups[self.parity], &[]);
            pass.dispatch_workgroups(self.count.div_ceil(WORKGROUP_SIZE), 1, 1);
        }
        self.parity ^= 1;
    }

    /// The position buffer holding the latest committed tick.
    pub fn front_positions(&self) -> &wgpu::Buffer {
        &self.positions[self.parity]
    }

    /// The expression buffer, exposed for renderers sharing the device.
    pub fn expressions(&self) -> &wgpu::Buffer {
        &self.expressions
    }

    #[inline]
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Size in bytes of one position readback.
    pub fn positions_size(&self) -> u64 {
        u64::from(self.count) * ELEM_SIZE
    }
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}
