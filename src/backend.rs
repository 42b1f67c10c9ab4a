//! Backend-facing interface (Section 6): the platform surface the CORE's
//! frame driver requires, plus the frozen push-constant layouts that are
//! the only binary contract it guarantees.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, UVec4, Vec4};

use crate::error::CoreResult;

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct DrawPush {
    pub model: [[f32; 4]; 4],
    pub base_color: [f32; 4],
    pub mode_pad: [u32; 4],
}

impl DrawPush {
    pub fn new(model: Mat4, base_color: Vec4, mode_pad: UVec4) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            base_color: base_color.into(),
            mode_pad: mode_pad.into(),
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ShadowPush {
    pub light_mvp: [[f32; 4]; 4],
}

impl ShadowPush {
    pub fn new(light_mvp: Mat4) -> Self {
        Self {
            light_mvp: light_mvp.to_cols_array_2d(),
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct CameraUbo {
    pub view_proj: [[f32; 4]; 4],
    pub camera_pos: [f32; 4],
    pub light_dir_ws: [f32; 4],
    pub light_view_proj: [[f32; 4]; 4],
    /// `(strength, bias_const, bias_slope, pcf_step)`.
    pub shadow_params: [f32; 4],
    /// `(pcf_radius, 0, 0, 0)`.
    pub shadow_misc: [f32; 4],
}

impl CameraUbo {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        view_proj: Mat4,
        camera_pos: Vec4,
        light_dir_ws: Vec4,
        light_view_proj: Mat4,
        shadow_params: Vec4,
        shadow_misc: Vec4,
    ) -> Self {
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            camera_pos: camera_pos.into(),
            light_dir_ws: light_dir_ws.into(),
            light_view_proj: light_view_proj.to_cols_array_2d(),
            shadow_params: shadow_params.into(),
            shadow_misc: shadow_misc.into(),
        }
    }
}

pub type CommandPoolHandle = u64;
pub type CommandBufferHandle = u64;
pub type QueryPoolHandle = u64;
pub type ImageHandle = u64;
pub type BufferHandle = u64;
pub type SamplerHandle = u64;
pub type DescriptorSetLayoutHandle = u64;
pub type DescriptorPoolHandle = u64;
pub type DescriptorSetHandle = u64;
pub type PipelineLayoutHandle = u64;
pub type PipelineHandle = u64;
pub type FenceHandle = u64;

#[derive(Clone, Copy, Debug)]
pub struct FrameTarget {
    pub command_buffer: CommandBufferHandle,
    pub extent: (u32, u32),
    pub fence: FenceHandle,
}

/// What the CORE's frame driver requires from the platform layer
/// (Section 6, "Backend-facing"). A concrete graphics API implements
/// this trait; the frame state machine (`frame.rs`) is written entirely
/// against it.
pub trait RenderBackend {
    fn begin_frame(&mut self) -> CoreResult<FrameTarget>;
    fn end_frame(&mut self, target: FrameTarget) -> CoreResult<()>;

    fn create_command_pool(&mut self) -> CoreResult<CommandPoolHandle>;
    fn destroy_command_pool(&mut self, pool: CommandPoolHandle);
    fn reset_command_pool(&mut self, pool: CommandPoolHandle) -> CoreResult<()>;

    fn create_command_buffer(&mut self, pool: CommandPoolHandle) -> CoreResult<CommandBufferHandle>;
    fn destroy_command_buffer(&mut self, pool: CommandPoolHandle, buffer: CommandBufferHandle);

    fn create_query_pool(&mut self, capacity: u32) -> CoreResult<QueryPoolHandle>;
    fn destroy_query_pool(&mut self, pool: QueryPoolHandle);
    fn reset_query_pool(&mut self, pool: QueryPoolHandle) -> CoreResult<()>;

    fn create_image(&mut self, width: u32, height: u32) -> CoreResult<ImageHandle>;
    fn destroy_image(&mut self, image: ImageHandle);

    fn create_buffer(&mut self, size_bytes: u64) -> CoreResult<BufferHandle>;
    fn destroy_buffer(&mut self, buffer: BufferHandle);

    fn create_sampler(&mut self) -> CoreResult<SamplerHandle>;
    fn destroy_sampler(&mut self, sampler: SamplerHandle);

    fn create_descriptor_set_layout(&mut self) -> CoreResult<DescriptorSetLayoutHandle>;
    fn create_descriptor_pool(&mut self, max_sets: u32) -> CoreResult<DescriptorPoolHandle>;
    fn allocate_descriptor_set(
        &mut self,
        pool: DescriptorPoolHandle,
        layout: DescriptorSetLayoutHandle,
    ) -> CoreResult<DescriptorSetHandle>;

    fn create_pipeline_layout(&mut self) -> CoreResult<PipelineLayoutHandle>;
    fn create_graphics_pipeline(&mut self, layout: PipelineLayoutHandle) -> CoreResult<PipelineHandle>;

    fn create_fence(&mut self) -> CoreResult<FenceHandle>;
    fn destroy_fence(&mut self, fence: FenceHandle);
    fn wait_fence(&mut self, fence: FenceHandle) -> CoreResult<()>;

    fn submit_primary(&mut self, buffer: CommandBufferHandle, fence: FenceHandle) -> CoreResult<()>;

    /// Optional synchronization-2 style memory barrier. A backend that
    /// cannot express this natively may downgrade to a full pipeline
    /// barrier.
    fn memory_barrier(&mut self, command_buffer: CommandBufferHandle, from_write: bool, to_read: bool);
}

/// Resources one frame-ring slot needs from the backend: a command pool to
/// record into, a query pool sized for the slot's occlusion queries, and
/// the fence that gates the slot's next reuse.
#[derive(Debug)]
pub struct FrameSlotResources {
    pub command_pool: CommandPoolHandle,
    pub query_pool: QueryPoolHandle,
    pub fence: FenceHandle,
}

/// Orchestration-layer setup for one frame-ring slot: wraps the backend's
/// fallible resource creation with `anyhow` context, mirroring how the
/// render graph's resource lookups are wrapped in `.with_context(...)`
/// rather than propagating bare backend errors.
pub fn setup_frame_slot_resources(
    backend: &mut dyn RenderBackend,
    query_capacity: u32,
) -> anyhow::Result<FrameSlotResources> {
    use anyhow::Context;

    let command_pool = backend
        .create_command_pool()
        .context("setting up frame slot: creating command pool")?;
    let query_pool = backend
        .create_query_pool(query_capacity)
        .context("setting up frame slot: creating occlusion query pool")?;
    let fence = backend
        .create_fence()
        .context("setting up frame slot: creating fence")?;

    Ok(FrameSlotResources {
        command_pool,
        query_pool,
        fence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;

    #[test]
    fn push_constant_layouts_match_frozen_sizes() {
        assert_eq!(std::mem::size_of::<DrawPush>(), 64 + 16 + 16);
        assert_eq!(std::mem::size_of::<ShadowPush>(), 64);
        assert_eq!(
            std::mem::size_of::<CameraUbo>(),
            64 + 16 + 16 + 64 + 16 + 16
        );
    }

    #[test]
    fn draw_push_is_plain_old_data() {
        let push = DrawPush::new(Mat4::IDENTITY, Vec4::ONE, UVec4::ZERO);
        let bytes = bytemuck::bytes_of(&push);
        assert_eq!(bytes.len(), std::mem::size_of::<DrawPush>());
    }

    #[test]
    fn camera_ubo_round_trips_matrix_columns() {
        let vp = Mat4::from_translation(glam::Vec3::new(1.0, 2.0, 3.0));
        let ubo = CameraUbo::new(vp, Vec4::ONE, Vec4::ZERO, Mat4::IDENTITY, Vec4::ZERO, Vec4::ZERO);
        assert_eq!(ubo.view_proj, vp.to_cols_array_2d());
    }

    struct MockBackend {
        fail_query_pool: bool,
    }

    impl RenderBackend for MockBackend {
        fn begin_frame(&mut self) -> CoreResult<FrameTarget> {
            Ok(FrameTarget {
                command_buffer: 1,
                extent: (1, 1),
                fence: 1,
            })
        }
        fn end_frame(&mut self, _target: FrameTarget) -> CoreResult<()> {
            Ok(())
        }
        fn create_command_pool(&mut self) -> CoreResult<CommandPoolHandle> {
            Ok(1)
        }
        fn destroy_command_pool(&mut self, _pool: CommandPoolHandle) {}
        fn reset_command_pool(&mut self, _pool: CommandPoolHandle) -> CoreResult<()> {
            Ok(())
        }
        fn create_command_buffer(&mut self, _pool: CommandPoolHandle) -> CoreResult<CommandBufferHandle> {
            Ok(1)
        }
        fn destroy_command_buffer(&mut self, _pool: CommandPoolHandle, _buffer: CommandBufferHandle) {}
        fn create_query_pool(&mut self, _capacity: u32) -> CoreResult<QueryPoolHandle> {
            if self.fail_query_pool {
                Err(CoreError::ResourceError("out of query pool slots".into()))
            } else {
                Ok(2)
            }
        }
        fn destroy_query_pool(&mut self, _pool: QueryPoolHandle) {}
        fn reset_query_pool(&mut self, _pool: QueryPoolHandle) -> CoreResult<()> {
            Ok(())
        }
        fn create_image(&mut self, _width: u32, _height: u32) -> CoreResult<ImageHandle> {
            Ok(1)
        }
        fn destroy_image(&mut self, _image: ImageHandle) {}
        fn create_buffer(&mut self, _size_bytes: u64) -> CoreResult<BufferHandle> {
            Ok(1)
        }
        fn destroy_buffer(&mut self, _buffer: BufferHandle) {}
        fn create_sampler(&mut self) -> CoreResult<SamplerHandle> {
            Ok(1)
        }
        fn destroy_sampler(&mut self, _sampler: SamplerHandle) {}
        fn create_descriptor_set_layout(&mut self) -> CoreResult<DescriptorSetLayoutHandle> {
            Ok(1)
        }
        fn create_descriptor_pool(&mut self, _max_sets: u32) -> CoreResult<DescriptorPoolHandle> {
            Ok(1)
        }
        fn allocate_descriptor_set(
            &mut self,
            _pool: DescriptorPoolHandle,
            _layout: DescriptorSetLayoutHandle,
        ) -> CoreResult<DescriptorSetHandle> {
            Ok(1)
        }
        fn create_pipeline_layout(&mut self) -> CoreResult<PipelineLayoutHandle> {
            Ok(1)
        }
        fn create_graphics_pipeline(&mut self, _layout: PipelineLayoutHandle) -> CoreResult<PipelineHandle> {
            Ok(1)
        }
        fn create_fence(&mut self) -> CoreResult<FenceHandle> {
            Ok(3)
        }
        fn destroy_fence(&mut self, _fence: FenceHandle) {}
        fn wait_fence(&mut self, _fence: FenceHandle) -> CoreResult<()> {
            Ok(())
        }
        fn submit_primary(&mut self, _buffer: CommandBufferHandle, _fence: FenceHandle) -> CoreResult<()> {
            Ok(())
        }
        fn memory_barrier(&mut self, _command_buffer: CommandBufferHandle, _from_write: bool, _to_read: bool) {}
    }

    #[test]
    fn setup_frame_slot_resources_succeeds() {
        let mut backend = MockBackend {
            fail_query_pool: false,
        };
        let resources = setup_frame_slot_resources(&mut backend, 64).unwrap();
        assert_eq!(resources.command_pool, 1);
        assert_eq!(resources.query_pool, 2);
        assert_eq!(resources.fence, 3);
    }

    #[test]
    fn setup_frame_slot_resources_wraps_backend_error_with_context() {
        let mut backend = MockBackend {
            fail_query_pool: true,
        };
        let err = setup_frame_slot_resources(&mut backend, 64).unwrap_err();
        assert!(err.to_string().contains("creating occlusion query pool"));
        assert!(err.chain().any(|e| e.to_string().contains("out of query pool slots")));
    }
}
