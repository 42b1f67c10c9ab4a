//! Concrete `wgpu` implementation of [`crate::backend::RenderBackend`].
//!
//! `wgpu` doesn't expose explicit command pools, fences, or descriptor
//! pools the way the trait's Vulkan-shaped surface does; this backend
//! maps the trait's handles onto arenas of the nearest `wgpu` object and
//! fences onto `wgpu::SubmissionIndex` + `device.poll`.

use std::borrow::Cow;
use std::collections::HashMap;

use wgpu::util::DeviceExt;

use crate::backend::{
    BufferHandle, CommandBufferHandle, CommandPoolHandle, DescriptorPoolHandle,
    DescriptorSetHandle, DescriptorSetLayoutHandle, FenceHandle, FrameTarget, ImageHandle,
    PipelineHandle, PipelineLayoutHandle, QueryPoolHandle, RenderBackend, SamplerHandle,
};
use crate::error::{CoreError, CoreResult};

const PASSTHROUGH_WGSL: &str = r#"
@vertex
fn vs_main(@builtin(vertex_index) idx: u32) -> @builtin(position) vec4<f32> {
    let x = f32(i32(idx) - 1);
    let y = f32(i32(idx & 1u) * 2 - 1);
    return vec4<f32>(x, y, 0.0, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0, 1.0, 1.0, 1.0);
}
"#;

struct Arena<T> {
    slots: Vec<Option<T>>,
}

impl<T> Arena<T> {
    fn new() -> Self {
        Self { slots: Vec::new() }
    }

    fn insert(&mut self, value: T) -> u64 {
        self.slots.push(Some(value));
        self.slots.len() as u64
    }

    fn get(&self, handle: u64) -> Option<&T> {
        handle
            .checked_sub(1)
            .and_then(|i| self.slots.get(i as usize))
            .and_then(|s| s.as_ref())
    }

    fn remove(&mut self, handle: u64) {
        if let Some(i) = handle.checked_sub(1) {
            if let Some(slot) = self.slots.get_mut(i as usize) {
                *slot = None;
            }
        }
    }
}

pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    frame_counter: u64,

    command_encoders: Arena<wgpu::CommandEncoder>,
    query_pools: Arena<wgpu::QuerySet>,
    images: Arena<wgpu::Texture>,
    buffers: Arena<wgpu::Buffer>,
    samplers: Arena<wgpu::Sampler>,
    descriptor_set_layouts: Arena<wgpu::BindGroupLayout>,
    pipeline_layouts: Arena<wgpu::PipelineLayout>,
    pipelines: Arena<wgpu::RenderPipeline>,
    next_fence: u64,
    fence_submissions: HashMap<FenceHandle, wgpu::SubmissionIndex>,
}

impl WgpuBackend {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self {
            device,
            queue,
            frame_counter: 0,
            command_encoders: Arena::new(),
            query_pools: Arena::new(),
            images: Arena::new(),
            buffers: Arena::new(),
            samplers: Arena::new(),
            descriptor_set_layouts: Arena::new(),
            pipeline_layouts: Arena::new(),
            pipelines: Arena::new(),
            next_fence: 1,
            fence_submissions: HashMap::new(),
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Begins a view occlusion query under `query_pool` at `query_index`,
    /// intended to wrap one draw's render-pass encoding (Section 4.I).
    pub fn begin_occlusion_query<'a>(&self, pass: &mut wgpu::RenderPass<'a>, query_pool: QueryPoolHandle, query_index: u32) {
        if let Some(set) = self.query_pools.get(query_pool) {
            pass.begin_occlusion_query(query_index);
            let _ = set;
        }
    }

    pub fn end_occlusion_query(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.end_occlusion_query();
    }

    /// Resolves a query set's results into a readback buffer and maps it
    /// for a blocking 64-bit read, mirroring the teacher's timestamp
    /// resolve/readback sequence adapted to `QueryType::Occlusion`.
    pub fn read_occlusion_results(&self, query_pool: QueryPoolHandle, count: u32) -> CoreResult<Vec<u64>> {
        let set = self
            .query_pools
            .get(query_pool)
            .ok_or_else(|| CoreError::ResourceError("unknown query pool handle".into()))?;

        let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("occlusion readback"),
            size: (count as u64) * 8,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        encoder.resolve_query_set(set, 0..count, &readback, 0);
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = readback.slice(..);
        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        self.device.poll(wgpu::PollType::Wait);
        rx.recv()
            .map_err(|_| CoreError::QueryError("occlusion readback channel closed".into()))?
            .map_err(|e| CoreError::QueryError(e.to_string()))?;

        let data = slice.get_mapped_range();
        let samples: Vec<u64> = data
            .chunks_exact(8)
            .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
            .collect();
        drop(data);
        readback.unmap();
        Ok(samples)
    }
}

impl RenderBackend for WgpuBackend {
    fn begin_frame(&mut self) -> CoreResult<FrameTarget> {
        let encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame primary"),
            });
        let command_buffer = self.command_encoders.insert(encoder);
        self.frame_counter += 1;
        let fence = self.create_fence()?;
        Ok(FrameTarget {
            command_buffer,
            extent: (0, 0),
            fence,
        })
    }

    fn end_frame(&mut self, target: FrameTarget) -> CoreResult<()> {
        self.submit_primary(target.command_buffer, target.fence)
    }

    fn create_command_pool(&mut self) -> CoreResult<CommandPoolHandle> {
        Ok(self.frame_counter.wrapping_add(1))
    }

    fn destroy_command_pool(&mut self, _pool: CommandPoolHandle) {}

    fn reset_command_pool(&mut self, _pool: CommandPoolHandle) -> CoreResult<()> {
        Ok(())
    }

    fn create_command_buffer(&mut self, _pool: CommandPoolHandle) -> CoreResult<CommandBufferHandle> {
        let encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        Ok(self.command_encoders.insert(encoder))
    }

    fn destroy_command_buffer(&mut self, _pool: CommandPoolHandle, buffer: CommandBufferHandle) {
        self.command_encoders.remove(buffer);
    }

    fn create_query_pool(&mut self, capacity: u32) -> CoreResult<QueryPoolHandle> {
        if capacity == 0 {
            return Err(CoreError::ConfigurationError("query pool capacity must be > 0".into()));
        }
        let set = self.device.create_query_set(&wgpu::QuerySetDescriptor {
            label: Some("occlusion query pool"),
            ty: wgpu::QueryType::Occlusion,
            count: capacity,
        });
        Ok(self.query_pools.insert(set))
    }

    fn destroy_query_pool(&mut self, pool: QueryPoolHandle) {
        self.query_pools.remove(pool);
    }

    fn reset_query_pool(&mut self, _pool: QueryPoolHandle) -> CoreResult<()> {
        // wgpu resolves/resets occlusion query sets implicitly on reuse within
        // a render pass; nothing to do eagerly here.
        Ok(())
    }

    fn create_image(&mut self, width: u32, height: u32) -> CoreResult<ImageHandle> {
        if width == 0 || height == 0 {
            return Err(CoreError::ResourceError("image dimensions must be > 0".into()));
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("core image"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        Ok(self.images.insert(texture))
    }

    fn destroy_image(&mut self, image: ImageHandle) {
        self.images.remove(image);
    }

    fn create_buffer(&mut self, size_bytes: u64) -> CoreResult<BufferHandle> {
        if size_bytes == 0 {
            return Err(CoreError::ResourceError("buffer size must be > 0".into()));
        }
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("core buffer"),
            size: size_bytes,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Ok(self.buffers.insert(buffer))
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(buffer);
    }

    fn create_sampler(&mut self) -> CoreResult<SamplerHandle> {
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor::default());
        Ok(self.samplers.insert(sampler))
    }

    fn destroy_sampler(&mut self, sampler: SamplerHandle) {
        self.samplers.remove(sampler);
    }

    fn create_descriptor_set_layout(&mut self) -> CoreResult<DescriptorSetLayoutHandle> {
        let layout = self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("core descriptor set layout"),
            entries: &[],
        });
        Ok(self.descriptor_set_layouts.insert(layout))
    }

    fn create_descriptor_pool(&mut self, _max_sets: u32) -> CoreResult<DescriptorPoolHandle> {
        // No pool concept in wgpu; bind groups are allocated individually.
        Ok(1)
    }

    fn allocate_descriptor_set(
        &mut self,
        _pool: DescriptorPoolHandle,
        layout: DescriptorSetLayoutHandle,
    ) -> CoreResult<DescriptorSetHandle> {
        self.descriptor_set_layouts
            .get(layout)
            .ok_or_else(|| CoreError::ResourceError("unknown descriptor set layout handle".into()))?;
        // An empty-layout bind group is a placeholder; real resource binding
        // happens at the call site once the layout carries entries.
        Ok(layout)
    }

    fn create_pipeline_layout(&mut self) -> CoreResult<PipelineLayoutHandle> {
        let layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("core pipeline layout"),
            bind_group_layouts: &[],
            push_constant_ranges: &[],
        });
        Ok(self.pipeline_layouts.insert(layout))
    }

    fn create_graphics_pipeline(&mut self, layout: PipelineLayoutHandle) -> CoreResult<PipelineHandle> {
        let pipeline_layout = self
            .pipeline_layouts
            .get(layout)
            .ok_or_else(|| CoreError::ResourceError("unknown pipeline layout handle".into()))?;

        let shader = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("core passthrough shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(PASSTHROUGH_WGSL)),
        });

        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("core graphics pipeline"),
            layout: Some(pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: wgpu::TextureFormat::Rgba8UnormSrgb,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });
        Ok(self.pipelines.insert(pipeline))
    }

    fn create_fence(&mut self) -> CoreResult<FenceHandle> {
        let handle = self.next_fence;
        self.next_fence += 1;
        Ok(handle)
    }

    fn destroy_fence(&mut self, fence: FenceHandle) {
        self.fence_submissions.remove(&fence);
    }

    fn wait_fence(&mut self, fence: FenceHandle) -> CoreResult<()> {
        match self.fence_submissions.get(&fence) {
            Some(submission) => {
                self.device
                    .poll(wgpu::PollType::WaitForSubmissionIndex(submission.clone()));
                Ok(())
            }
            None => {
                self.device.poll(wgpu::PollType::Wait);
                Ok(())
            }
        }
    }

    fn submit_primary(&mut self, buffer: CommandBufferHandle, fence: FenceHandle) -> CoreResult<()> {
        let encoder = self
            .command_encoders
            .remove_and_take(buffer)
            .ok_or_else(|| CoreError::ResourceError("unknown command buffer handle".into()))?;
        let index = self.queue.submit(std::iter::once(encoder.finish()));
        self.fence_submissions.insert(fence, index);
        Ok(())
    }

    fn memory_barrier(&mut self, _command_buffer: CommandBufferHandle, _from_write: bool, _to_read: bool) {
        // wgpu's render/compute pass boundaries insert the required
        // barriers implicitly; there is no standalone barrier call.
    }
}

impl<T> Arena<T> {
    fn remove_and_take(&mut self, handle: u64) -> Option<T> {
        handle
            .checked_sub(1)
            .and_then(|i| self.slots.get_mut(i as usize))
            .and_then(|slot| slot.take())
    }
}
