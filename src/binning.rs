//! Light binner (Section 4.G): screen-tile, tile-with-depth-range, and
//! clustered 3D binning of light bounding spheres, plus the per-object
//! gather that turns a world AABB into a deduplicated candidate list.

use glam::{Mat4, Vec3, Vec4};

use crate::cell::{ConvexCell, ConvexCellKind};
use crate::classify::{classify_sphere, CullTolerance};
use crate::config::LightCullingMode;
use crate::geometry::{Aabb, Plane, Sphere};
use crate::scene::SceneElementSet;

#[derive(Clone, Copy, Debug)]
pub struct LightBinCullingConfig {
    pub mode: LightCullingMode,
    pub tile_size: u32,
    pub cluster_depth_slices: u32,
    pub z_near: f32,
    pub z_far: f32,
}

impl Default for LightBinCullingConfig {
    fn default() -> Self {
        Self {
            mode: LightCullingMode::None,
            tile_size: 16,
            cluster_depth_slices: 16,
            z_near: 0.1,
            z_far: 1000.0,
        }
    }
}

fn unproject_ndc(ndc: Vec3, inv_view_proj: &Mat4) -> Vec3 {
    let clip = *inv_view_proj * Vec4::new(ndc.x, ndc.y, ndc.z, 1.0);
    Vec3::new(clip.x, clip.y, clip.z) / clip.w
}

fn oriented_plane_from_points(a: Vec3, b: Vec3, c: Vec3, inside: Vec3) -> Plane {
    let mut normal = (b - a).cross(c - a).normalize_or_zero();
    let mut d = -normal.dot(a);
    if normal.dot(inside) + d < 0.0 {
        normal = -normal;
        d = -d;
    }
    Plane::new(normal, d)
}

/// Builds the 6-plane frustum sub-volume cell for screen tile `(tile_x,
/// tile_y)` at NDC depth range `[z_near_ndc, z_far_ndc]`, by unprojecting
/// the tile's 8 corners and orienting each face plane against the cell
/// centroid.
pub fn make_screen_tile_cell(
    tile_x: u32,
    tile_y: u32,
    tile_size: u32,
    viewport_w: u32,
    viewport_h: u32,
    inv_view_proj: &Mat4,
    z_near_ndc: f32,
    z_far_ndc: f32,
    kind: ConvexCellKind,
) -> ConvexCell {
    let w = viewport_w.max(1) as f32;
    let h = viewport_h.max(1) as f32;
    let x0 = (tile_x * tile_size) as f32 / w * 2.0 - 1.0;
    let x1 = ((tile_x + 1) * tile_size).min(viewport_w) as f32 / w * 2.0 - 1.0;
    let y0 = (tile_y * tile_size) as f32 / h * 2.0 - 1.0;
    let y1 = ((tile_y + 1) * tile_size).min(viewport_h) as f32 / h * 2.0 - 1.0;

    let nbl = unproject_ndc(Vec3::new(x0, y0, z_near_ndc), inv_view_proj);
    let nbr = unproject_ndc(Vec3::new(x1, y0, z_near_ndc), inv_view_proj);
    let ntl = unproject_ndc(Vec3::new(x0, y1, z_near_ndc), inv_view_proj);
    let ntr = unproject_ndc(Vec3::new(x1, y1, z_near_ndc), inv_view_proj);
    let fbl = unproject_ndc(Vec3::new(x0, y0, z_far_ndc), inv_view_proj);
    let fbr = unproject_ndc(Vec3::new(x1, y0, z_far_ndc), inv_view_proj);
    let ftl = unproject_ndc(Vec3::new(x0, y1, z_far_ndc), inv_view_proj);
    let ftr = unproject_ndc(Vec3::new(x1, y1, z_far_ndc), inv_view_proj);

    let inside = (nbl + ntr + fbl + ftr) * 0.25;

    let mut cell = ConvexCell::new(kind);
    cell.user_data = glam::UVec4::new(tile_x, tile_y, 0, 0);
    cell.add_plane(oriented_plane_from_points(nbl, nbr, ntr, inside));
    cell.add_plane(oriented_plane_from_points(fbr, fbl, ftl, inside));
    cell.add_plane(oriented_plane_from_points(nbl, ntl, ftl, inside));
    cell.add_plane(oriented_plane_from_points(nbr, fbr, ftr, inside));
    cell.add_plane(oriented_plane_from_points(nbl, fbl, fbr, inside));
    cell.add_plane(oriented_plane_from_points(ntl, ntr, ftr, inside));
    cell
}

fn tiles_for(viewport: u32, tile_size: u32) -> u32 {
    (viewport + tile_size - 1) / tile_size.max(1)
}

/// Pre-filters light spheres against the camera frustum, returning a
/// parallel boolean mask.
fn frustum_prefilter(spheres: &[Sphere], view_proj: &Mat4) -> Vec<bool> {
    let frustum_cell = ConvexCell::from_frustum_planes(view_proj, ConvexCellKind::CameraFrustumPerspective);
    spheres
        .iter()
        .map(|s| classify_sphere(*s, &frustum_cell, CullTolerance::default()) != crate::classify::CullClass::Outside)
        .collect()
}

#[derive(Clone, Debug, Default)]
pub struct TiledLightCullingResult {
    pub tile_light_lists: Vec<Vec<u32>>,
    pub tiles_x: u32,
    pub tiles_y: u32,
}

pub fn cull_lights_tiled(
    spheres: &[Sphere],
    view_proj: &Mat4,
    viewport_w: u32,
    viewport_h: u32,
    tile_size: u32,
) -> TiledLightCullingResult {
    cull_lights_tiled_depth_range(spheres, view_proj, viewport_w, viewport_h, tile_size, None, None)
}

pub fn cull_lights_tiled_depth_range(
    spheres: &[Sphere],
    view_proj: &Mat4,
    viewport_w: u32,
    viewport_h: u32,
    tile_size: u32,
    tile_min_depths: Option<&[f32]>,
    tile_max_depths: Option<&[f32]>,
) -> TiledLightCullingResult {
    let tiles_x = tiles_for(viewport_w, tile_size);
    let tiles_y = tiles_for(viewport_h, tile_size);
    let total = (tiles_x * tiles_y) as usize;
    let mut result = TiledLightCullingResult {
        tile_light_lists: vec![Vec::new(); total],
        tiles_x,
        tiles_y,
    };
    if spheres.is_empty() {
        return result;
    }

    let inv_vp = view_proj.inverse();
    let visible = frustum_prefilter(spheres, view_proj);

    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let tile_index = (ty * tiles_x + tx) as usize;
            let mut z_near_ndc = -1.0f32;
            let mut z_far_ndc = 1.0f32;
            if let Some(mins) = tile_min_depths {
                if let Some(&v) = mins.get(tile_index) {
                    z_near_ndc = v * 2.0 - 1.0;
                }
            }
            if let Some(maxs) = tile_max_depths {
                if let Some(&v) = maxs.get(tile_index) {
                    z_far_ndc = v * 2.0 - 1.0;
                }
            }
            let cell = make_screen_tile_cell(
                tx,
                ty,
                tile_size,
                viewport_w,
                viewport_h,
                &inv_vp,
                z_near_ndc,
                z_far_ndc,
                ConvexCellKind::ScreenTileCell,
            );
            for (li, sphere) in spheres.iter().enumerate() {
                if !visible[li] {
                    continue;
                }
                if classify_sphere(*sphere, &cell, CullTolerance::default()) != crate::classify::CullClass::Outside {
                    result.tile_light_lists[tile_index].push(li as u32);
                }
            }
        }
    }
    result
}

#[derive(Clone, Debug, Default)]
pub struct ClusteredLightCullingResult {
    pub cluster_light_lists: Vec<Vec<u32>>,
    pub clusters_x: u32,
    pub clusters_y: u32,
    pub clusters_z: u32,
}

/// Exponential Z-slice mapping: `z_k = z_near * (z_far/z_near)^(k/N)`.
pub fn cull_lights_clustered(
    spheres: &[Sphere],
    view_proj: &Mat4,
    viewport_w: u32,
    viewport_h: u32,
    tile_size: u32,
    depth_slices: u32,
    z_near: f32,
    z_far: f32,
) -> ClusteredLightCullingResult {
    let clusters_x = tiles_for(viewport_w, tile_size);
    let clusters_y = tiles_for(viewport_h, tile_size);
    let clusters_z = depth_slices.max(1);
    let total = (clusters_x * clusters_y * clusters_z) as usize;
    let mut result = ClusteredLightCullingResult {
        cluster_light_lists: vec![Vec::new(); total],
        clusters_x,
        clusters_y,
        clusters_z,
    };
    if spheres.is_empty() {
        return result;
    }

    let inv_vp = view_proj.inverse();
    let visible = frustum_prefilter(spheres, view_proj);

    let log_ratio = (z_far / z_near).ln();
    let z_range = z_far - z_near;

    for cz in 0..clusters_z {
        let slice_near = z_near * (log_ratio * cz as f32 / clusters_z as f32).exp();
        let slice_far = z_near * (log_ratio * (cz + 1) as f32 / clusters_z as f32).exp();
        let ndc_near = 2.0 * ((slice_near - z_near) / z_range) - 1.0;
        let ndc_far = 2.0 * ((slice_far - z_near) / z_range) - 1.0;

        for ty in 0..clusters_y {
            for tx in 0..clusters_x {
                let cell = make_screen_tile_cell(
                    tx,
                    ty,
                    tile_size,
                    viewport_w,
                    viewport_h,
                    &inv_vp,
                    ndc_near,
                    ndc_far,
                    ConvexCellKind::ClusterCellPerspective,
                );
                let cluster_index = (cz * (clusters_x * clusters_y) + ty * clusters_x + tx) as usize;
                for (li, sphere) in spheres.iter().enumerate() {
                    if !visible[li] {
                        continue;
                    }
                    if classify_sphere(*sphere, &cell, CullTolerance::default()) != crate::classify::CullClass::Outside {
                        result.cluster_light_lists[cluster_index].push(li as u32);
                    }
                }
            }
        }
    }
    result
}

// --- Per-object gather (Section 4.G second paragraph, Section 11.1/11.2) ---

pub fn ndc_x_to_bin(ndc_x: f32, bins_x: u32) -> u32 {
    if bins_x == 0 {
        return 0;
    }
    let u = (ndc_x * 0.5 + 0.5).clamp(0.0, 0.999_999);
    ((u * bins_x as f32) as u32).min(bins_x - 1)
}

pub fn ndc_y_to_bin_top_origin(ndc_y: f32, bins_y: u32) -> u32 {
    if bins_y == 0 {
        return 0;
    }
    let v = (1.0 - (ndc_y * 0.5 + 0.5)).clamp(0.0, 0.999_999);
    ((v * bins_y as f32) as u32).min(bins_y - 1)
}

pub fn view_depth_to_cluster_slice(view_depth: f32, z_near: f32, z_far: f32, slices: u32) -> u32 {
    if slices <= 1 {
        return 0;
    }
    let zn = z_near.max(1e-4);
    let zf = z_far.max(zn + 1e-3);
    let d = view_depth.clamp(zn, zf);
    let log_ratio = (zf / zn).ln();
    if log_ratio <= 1e-6 {
        return 0;
    }
    let t = ((d / zn).ln() / log_ratio).clamp(0.0, 0.999_999);
    ((t * slices as f32) as u32).min(slices - 1)
}

#[derive(Clone, Copy, Debug)]
pub struct ProjectedBounds {
    pub min_x: f32,
    pub max_x: f32,
    pub min_y: f32,
    pub max_y: f32,
    pub min_view_depth: f32,
    pub max_view_depth: f32,
}

/// Projects all 8 AABB corners through `view_proj`/`view`, returning the
/// NDC xy bounds and the view-space Z bounds, or `None` if every corner
/// produced an invalid (`w <= 1e-5`) sample.
pub fn project_aabb_bounds(
    aabb: &Aabb,
    view: &Mat4,
    view_proj: &Mat4,
    z_near: f32,
    z_far: f32,
) -> Option<ProjectedBounds> {
    let mut min_x = 1.0f32;
    let mut max_x = -1.0f32;
    let mut min_y = 1.0f32;
    let mut max_y = -1.0f32;
    let mut min_depth = z_far;
    let mut max_depth = z_near;
    let mut any = false;

    for corner in aabb.corners() {
        let clip = *view_proj * Vec4::new(corner.x, corner.y, corner.z, 1.0);
        if clip.w <= 1e-5 {
            continue;
        }
        let ndc = Vec3::new(clip.x, clip.y, clip.z) / clip.w;
        min_x = min_x.min(ndc.x);
        max_x = max_x.max(ndc.x);
        min_y = min_y.min(ndc.y);
        max_y = max_y.max(ndc.y);

        let view_depth = (*view * Vec4::new(corner.x, corner.y, corner.z, 1.0)).z;
        if view_depth > 1e-5 {
            min_depth = min_depth.min(view_depth);
            max_depth = max_depth.max(view_depth);
        }
        any = true;
    }

    if !any {
        return None;
    }

    min_x = min_x.clamp(-1.0, 1.0);
    max_x = max_x.clamp(-1.0, 1.0);
    min_y = min_y.clamp(-1.0, 1.0);
    max_y = max_y.clamp(-1.0, 1.0);
    if min_x > max_x {
        std::mem::swap(&mut min_x, &mut max_x);
    }
    if min_y > max_y {
        std::mem::swap(&mut min_y, &mut max_y);
    }

    min_depth = min_depth.clamp(z_near, z_far);
    max_depth = max_depth.clamp(z_near, z_far);
    if min_depth > max_depth {
        min_depth = z_near;
        max_depth = z_far;
    }

    Some(ProjectedBounds {
        min_x,
        max_x,
        min_y,
        max_y,
        min_view_depth: min_depth,
        max_view_depth: max_depth,
    })
}

#[derive(Clone, Debug, Default)]
pub struct TileViewDepthRange {
    pub tiles_x: u32,
    pub tiles_y: u32,
    pub min_view_depth: Vec<f32>,
    pub max_view_depth: Vec<f32>,
}

impl TileViewDepthRange {
    pub fn is_valid(&self) -> bool {
        !self.min_view_depth.is_empty() && self.min_view_depth.len() == self.max_view_depth.len()
    }
}

/// Precomputes, per tile, the `[min, max]` view depth of the already
/// frustum-visible scene elements that land in it, for `TiledDepthRange`
/// mode. Tiles touched by nothing default to `[z_near, z_far]`.
pub fn build_tile_view_depth_range_from_scene(
    visible_scene_indices: &[usize],
    scene: &SceneElementSet,
    view: &Mat4,
    view_proj: &Mat4,
    viewport_w: u32,
    viewport_h: u32,
    tile_size: u32,
    z_near: f32,
    z_far: f32,
) -> TileViewDepthRange {
    let mut out = TileViewDepthRange::default();
    if viewport_w == 0 || viewport_h == 0 || tile_size == 0 {
        return out;
    }
    out.tiles_x = tiles_for(viewport_w, tile_size);
    out.tiles_y = tiles_for(viewport_h, tile_size);
    let total = (out.tiles_x * out.tiles_y) as usize;
    out.min_view_depth = vec![z_far; total];
    out.max_view_depth = vec![z_near; total];
    let mut has_depth = vec![false; total];

    for &idx in visible_scene_indices {
        if idx >= scene.size() {
            continue;
        }
        let aabb = scene[idx].geometry.world_aabb();
        let Some(b) = project_aabb_bounds(&aabb, view, view_proj, z_near, z_far) else {
            continue;
        };
        let tx0 = ndc_x_to_bin(b.min_x, out.tiles_x);
        let tx1 = ndc_x_to_bin(b.max_x, out.tiles_x);
        let ty0 = ndc_y_to_bin_top_origin(b.max_y, out.tiles_y);
        let ty1 = ndc_y_to_bin_top_origin(b.min_y, out.tiles_y);
        for ty in ty0..=ty1 {
            for tx in tx0..=tx1 {
                let tile_idx = (ty * out.tiles_x + tx) as usize;
                if tile_idx >= total {
                    continue;
                }
                out.min_view_depth[tile_idx] = out.min_view_depth[tile_idx].min(b.min_view_depth);
                out.max_view_depth[tile_idx] = out.max_view_depth[tile_idx].max(b.max_view_depth);
                has_depth[tile_idx] = true;
            }
        }
    }

    for i in 0..total {
        if !has_depth[i] || out.min_view_depth[i] > out.max_view_depth[i] {
            out.min_view_depth[i] = z_near;
            out.max_view_depth[i] = z_far;
        }
    }
    out
}

#[derive(Clone, Debug, Default)]
pub struct LightBinCullingData {
    pub mode: LightCullingMode,
    pub bins_x: u32,
    pub bins_y: u32,
    pub bins_z: u32,
    pub tile_size: u32,
    pub z_near: f32,
    pub z_far: f32,
    pub fallback_scene_indices: Vec<usize>,
    pub local_to_scene_indices: Vec<usize>,
    pub bin_local_light_lists: Vec<Vec<u32>>,
}

impl LightBinCullingData {
    pub fn has_bins(&self) -> bool {
        !self.bin_local_light_lists.is_empty() && self.bins_x > 0 && self.bins_y > 0 && self.bins_z > 0
    }

    pub fn fallback_candidates(&self) -> &[usize] {
        &self.fallback_scene_indices
    }
}

/// Builds per-bin local light index lists for one frame (Section 4.G).
/// `visible_light_scene_indices` must already be the frustum-pre-filtered
/// survivor set against the light scene.
pub fn build_light_bin_culling(
    visible_light_scene_indices: &[usize],
    light_scene: &SceneElementSet,
    view_proj: &Mat4,
    viewport_w: u32,
    viewport_h: u32,
    cfg: &LightBinCullingConfig,
    tile_depth_range: Option<&TileViewDepthRange>,
) -> LightBinCullingData {
    let mut out = LightBinCullingData {
        mode: cfg.mode,
        tile_size: cfg.tile_size.max(1),
        z_near: cfg.z_near.max(1e-4),
        z_far: 0.0,
        fallback_scene_indices: visible_light_scene_indices.to_vec(),
        ..Default::default()
    };
    out.z_far = cfg.z_far.max(out.z_near + 1e-3);

    if cfg.mode == LightCullingMode::None || visible_light_scene_indices.is_empty() {
        return out;
    }

    let mut spheres = Vec::with_capacity(visible_light_scene_indices.len());
    for &idx in visible_light_scene_indices {
        if idx >= light_scene.size() {
            continue;
        }
        spheres.push(light_scene[idx].geometry.bounding_sphere());
        out.local_to_scene_indices.push(idx);
    }
    if spheres.is_empty() {
        return out;
    }

    match cfg.mode {
        LightCullingMode::Clustered => {
            let clustered = cull_lights_clustered(
                &spheres,
                view_proj,
                viewport_w,
                viewport_h,
                out.tile_size,
                cfg.cluster_depth_slices.max(1),
                out.z_near,
                out.z_far,
            );
            out.bins_x = clustered.clusters_x;
            out.bins_y = clustered.clusters_y;
            out.bins_z = clustered.clusters_z.max(1);
            out.bin_local_light_lists = clustered.cluster_light_lists;
        }
        LightCullingMode::TiledDepthRange => {
            let tiled = match tile_depth_range {
                Some(r) if r.is_valid() && r.tiles_x * r.tiles_y == r.min_view_depth.len() as u32 => {
                    cull_lights_tiled_depth_range(
                        &spheres,
                        view_proj,
                        viewport_w,
                        viewport_h,
                        out.tile_size,
                        Some(&r.min_view_depth),
                        Some(&r.max_view_depth),
                    )
                }
                _ => cull_lights_tiled(&spheres, view_proj, viewport_w, viewport_h, out.tile_size),
            };
            out.bins_x = tiled.tiles_x;
            out.bins_y = tiled.tiles_y;
            out.bins_z = 1;
            out.bin_local_light_lists = tiled.tile_light_lists;
        }
        LightCullingMode::Tiled | LightCullingMode::None => {
            let tiled = cull_lights_tiled(&spheres, view_proj, viewport_w, viewport_h, out.tile_size);
            out.bins_x = tiled.tiles_x;
            out.bins_y = tiled.tiles_y;
            out.bins_z = 1;
            out.bin_local_light_lists = tiled.tile_light_lists;
        }
    }

    out
}

/// Projects `world_aabb` to NDC, determines the covered bin rectangle
/// (and, for clustered mode, the covered Z-slice range), and returns a
/// deduplicated list of candidate scene indices. Falls back to the full
/// pre-filtered survivor set when binning is off or inputs are
/// inconsistent.
pub fn gather_light_scene_candidates_for_aabb(
    data: &LightBinCullingData,
    world_aabb: &Aabb,
    view: &Mat4,
    view_proj: &Mat4,
    scratch: &mut Vec<usize>,
) {
    if !data.has_bins() || data.mode == LightCullingMode::None {
        scratch.clear();
        scratch.extend_from_slice(data.fallback_candidates());
        return;
    }

    let Some(b) = project_aabb_bounds(world_aabb, view, view_proj, data.z_near, data.z_far) else {
        scratch.clear();
        scratch.extend_from_slice(data.fallback_candidates());
        return;
    };

    let tx0 = ndc_x_to_bin(b.min_x, data.bins_x);
    let tx1 = ndc_x_to_bin(b.max_x, data.bins_x);
    let ty0 = ndc_y_to_bin_top_origin(b.max_y, data.bins_y);
    let ty1 = ndc_y_to_bin_top_origin(b.min_y, data.bins_y);

    let (mut tz0, mut tz1) = (0u32, data.bins_z.max(1) - 1);
    if data.mode == LightCullingMode::Clustered && data.bins_z > 1 {
        tz0 = view_depth_to_cluster_slice(b.min_view_depth, data.z_near, data.z_far, data.bins_z);
        tz1 = view_depth_to_cluster_slice(b.max_view_depth, data.z_near, data.z_far, data.bins_z);
        if tz0 > tz1 {
            std::mem::swap(&mut tz0, &mut tz1);
        }
    }

    scratch.clear();
    for tz in tz0..=tz1 {
        for ty in ty0..=ty1 {
            for tx in tx0..=tx1 {
                let bin_idx = (tz * (data.bins_x * data.bins_y) + ty * data.bins_x + tx) as usize;
                let Some(local_list) = data.bin_local_light_lists.get(bin_idx) else {
                    continue;
                };
                for &local_idx in local_list {
                    if let Some(&scene_idx) = data.local_to_scene_indices.get(local_idx as usize) {
                        if !scratch.contains(&scene_idx) {
                            scratch.push(scene_idx);
                        }
                    }
                }
            }
        }
    }
}
