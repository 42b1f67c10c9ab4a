//! Visibility pipeline core: geometric culling algebra, scene culling with
//! occlusion hysteresis, light binning, and the shadow/occlusion-query
//! frame orchestration around a multi-threaded command recorder.

pub mod backend;
pub mod binning;
pub mod cell;
pub mod classify;
pub mod config;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod jobs;
pub mod query_ring;
pub mod scene;
pub mod visibility;

mod culling_context;

#[cfg(feature = "wgpu-backend")]
pub mod wgpu_backend;

pub use backend::{
    setup_frame_slot_resources, CameraUbo, DrawPush, FrameSlotResources, FrameTarget, RenderBackend,
    ShadowPush,
};
pub use binning::{
    build_light_bin_culling, build_tile_view_depth_range_from_scene, cull_lights_clustered,
    cull_lights_tiled, cull_lights_tiled_depth_range, gather_light_scene_candidates_for_aabb,
    ndc_x_to_bin, ndc_y_to_bin_top_origin, project_aabb_bounds, view_depth_to_cluster_slice,
    LightBinCullingConfig, LightBinCullingData, ProjectedBounds, TileViewDepthRange,
};
pub use cell::{ConvexCell, ConvexCellKind, MAX_PLANES};
pub use classify::{
    classify, classify_sphere, classify_sphere_soa, classify_with_broad_phase, cull_vs_cell,
    CullClass, CullResult, CullTolerance, PlaneStripes,
};
pub use config::{CullingConfig, LightCullingMode, RenderPathPreset};
pub use culling_context::{
    apply_shadow_query_results, apply_view_query_results, should_use_frustum_visibility_fallback,
    CullingStats, SceneCullingContext,
};
pub use error::{CoreError, CoreResult};
pub use frame::{drive_frame, record_sharded_or_inline, split_into_ranges, FrameRecordCallbacks, FrameRecordStats, FrameState, WorkRange};
pub use geometry::{
    extract_frustum_planes, Aabb, Capsule, Cone, ConeFrustum, ConvexPolyhedron, Cylinder, Frustum,
    FrustumPlaneIndex, HullPoints, Kdop18, Kdop26, Obb, Plane, ShapeVolume, Sphere, SweptCapsule,
    SweptObb,
};
pub use jobs::WorkerPool;
pub use query_ring::{QueryRing, QuerySlot};
pub use scene::{SceneElement, SceneElementSet, StableId};
pub use visibility::{HistoryPolicy, VisibilityEntry, VisibilityHistory};
