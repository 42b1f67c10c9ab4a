//! Scene culling context (Section 4.F): orchestrates frustum culling,
//! occlusion history, and finalization of the per-frame visible list for
//! one view (main camera or a shadow-casting light).

use glam::Vec3;
use log::{debug, warn};

use crate::cell::ConvexCell;
use crate::classify::{classify_with_broad_phase, CullClass, CullTolerance};
use crate::error::CoreResult;
use crate::query_ring::QueryRing;
use crate::scene::{SceneElementSet, StableId};
use crate::visibility::{HistoryPolicy, VisibilityHistory};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CullingStats {
    pub scene_count: u32,
    pub frustum_visible_count: u32,
    pub visible_count: u32,
    pub occluded_count: u32,
    pub culled_count: u32,
}

impl CullingStats {
    /// Clamps the raw counters into the invariant chain required by
    /// Section 8 property 7: `visible + occluded <= frustum_visible <=
    /// scene_count` and `culled = scene - visible >= 0`.
    pub fn normalize(mut self) -> Self {
        self.visible_count = self.visible_count.min(self.frustum_visible_count);
        self.frustum_visible_count = self.frustum_visible_count.min(self.scene_count);
        self.occluded_count = self.frustum_visible_count.saturating_sub(self.visible_count);
        self.culled_count = self.scene_count.saturating_sub(self.visible_count);
        self
    }
}

pub struct SceneCullingContext {
    history: VisibilityHistory,
    frustum_visible_indices: Vec<usize>,
    visible_indices: Vec<usize>,
    stats: CullingStats,
    last_camera_pos: Option<Vec3>,
    warmup_frames_remaining: u32,
}

impl SceneCullingContext {
    pub fn new(policy: HistoryPolicy) -> Self {
        Self {
            history: VisibilityHistory::new(policy),
            frustum_visible_indices: Vec::new(),
            visible_indices: Vec::new(),
            stats: CullingStats::default(),
            last_camera_pos: None,
            warmup_frames_remaining: 0,
        }
    }

    /// Tracks the camera's position frame to frame. Per spec.md Section 9's
    /// resolved open question, motion is judged per-axis against
    /// `position_threshold` rather than accumulated: once any axis moves
    /// past the threshold in a single frame, `warmup_frames` frames of
    /// occlusion warmup begin and the reference position resets to the
    /// current one. Call once per frame before `finalize_visibility`.
    pub fn note_camera_position(&mut self, camera_pos: Vec3, position_threshold: f32, warmup_frames: u32) {
        let moved = match self.last_camera_pos {
            Some(prev) => {
                let delta = (camera_pos - prev).abs();
                delta.x > position_threshold || delta.y > position_threshold || delta.z > position_threshold
            }
            None => false,
        };
        self.last_camera_pos = Some(camera_pos);
        if moved {
            self.warmup_frames_remaining = warmup_frames;
        } else if self.warmup_frames_remaining > 0 {
            self.warmup_frames_remaining -= 1;
        }
    }

    /// True while occlusion results should be distrusted after a recent
    /// camera move (`occlusion_warmup_after_camera_move`).
    pub fn occlusion_warming_up(&self) -> bool {
        self.warmup_frames_remaining > 0
    }

    pub fn history(&self) -> &VisibilityHistory {
        &self.history
    }

    pub fn frustum_visible_indices(&self) -> &[usize] {
        &self.frustum_visible_indices
    }

    pub fn visible_indices(&self) -> &[usize] {
        &self.visible_indices
    }

    pub fn stats(&self) -> CullingStats {
        self.stats
    }

    /// 1. Classifies every element against `cell`'s planes, marks
    /// `frustum_visible`, resets history for elements that left the
    /// frustum, and prunes history to the currently present ids.
    pub fn run_frustum(&mut self, scene: &mut SceneElementSet, cell: &ConvexCell, tol: CullTolerance) {
        self.run_frustum_inner(scene, cell, tol, false);
    }

    /// Shadow-pass variant of [`Self::run_frustum`]: additionally requires
    /// `casts_shadow`, so a non-caster outside the camera frustum (E6) never
    /// enters the shadow-visible list even if it sits inside the light
    /// frustum.
    pub fn run_frustum_for_shadow(&mut self, scene: &mut SceneElementSet, cell: &ConvexCell, tol: CullTolerance) {
        self.run_frustum_inner(scene, cell, tol, true);
    }

    fn run_frustum_inner(
        &mut self,
        scene: &mut SceneElementSet,
        cell: &ConvexCell,
        tol: CullTolerance,
        require_casts_shadow: bool,
    ) {
        self.frustum_visible_indices.clear();
        let mut active_ids = Vec::with_capacity(scene.size());

        for i in 0..scene.size() {
            let was_frustum_visible = scene[i].frustum_visible;
            let enabled = scene[i].enabled && (!require_casts_shadow || scene[i].casts_shadow);
            let class = if enabled {
                classify_with_broad_phase(&scene[i].geometry, cell, tol, true)
            } else {
                CullClass::Outside
            };
            let now_visible = enabled && class != CullClass::Outside;
            scene[i].frustum_visible = now_visible;

            if now_visible {
                self.frustum_visible_indices.push(i);
                active_ids.push(scene[i].stable_id);
            } else if was_frustum_visible {
                self.history.reset(scene[i].stable_id);
            }
        }

        self.history.prune_to_ids(&active_ids);
        self.stats.scene_count = scene.size() as u32;
        self.stats.frustum_visible_count = self.frustum_visible_indices.len() as u32;
    }

    /// 2. For each `(index, sample_count)` pair, updates history with
    /// `sample_count >= min_visible` and copies the committed flag back
    /// into the element's `occluded` field.
    pub fn apply_occlusion_query_samples(
        &mut self,
        scene: &mut SceneElementSet,
        indices: &[usize],
        samples: &[u32],
        min_visible: u32,
    ) {
        for (&index, &sample_count) in indices.iter().zip(samples.iter()) {
            let id = scene[index].stable_id;
            let occluded = self.history.update(id, sample_count >= min_visible);
            scene[index].occluded = occluded;
        }
    }

    /// 3. Builds the final visible-indices list from the frustum-visible
    /// list, excluding history-occluded elements when `apply_occlusion`
    /// is set, then mirrors the result into `scene[i].visible`.
    pub fn finalize_visibility(&mut self, scene: &mut SceneElementSet, apply_occlusion: bool) {
        let apply_occlusion = apply_occlusion && !self.occlusion_warming_up();
        self.visible_indices.clear();
        for &i in &self.frustum_visible_indices {
            if !apply_occlusion || !scene[i].occluded {
                self.visible_indices.push(i);
            }
        }
        for i in 0..scene.size() {
            scene[i].visible = false;
        }
        for &i in &self.visible_indices {
            scene[i].visible = true;
        }
        self.stats.visible_count = self.visible_indices.len() as u32;
        self.stats = self.stats.normalize();
    }

    /// 4. If occlusion is enabled but no queries produced samples and no
    /// elements survived, falls back to the frustum-visible list.
    pub fn apply_frustum_fallback_if_needed(
        &mut self,
        scene: &mut SceneElementSet,
        enable_occlusion: bool,
        has_depth_attachment: bool,
        query_count: usize,
    ) -> bool {
        let should_fallback = should_use_frustum_visibility_fallback(
            enable_occlusion,
            has_depth_attachment,
            self.frustum_visible_indices.len(),
            query_count,
            self.visible_indices.len(),
        );
        if !should_fallback {
            return false;
        }
        debug!("scene culling: falling back to frustum-visible list (no occlusion samples this frame)");
        self.visible_indices = self.frustum_visible_indices.clone();
        for i in 0..scene.size() {
            scene[i].visible = false;
        }
        for &i in &self.visible_indices {
            scene[i].visible = true;
        }
        self.stats.visible_count = self.visible_indices.len() as u32;
        self.stats = self.stats.normalize();
        true
    }

    pub fn stable_ids_visible(&self, scene: &SceneElementSet) -> Vec<StableId> {
        self.visible_indices
            .iter()
            .map(|&i| scene[i].stable_id)
            .collect()
    }
}

/// Reads `ring`'s view query results for `frame_index` and folds them into
/// `ctx`'s occlusion history. On a failed readback (slot not yet signaled,
/// or fewer raw samples than queries appended), logs `warn!` and leaves
/// history unchanged, per SPEC_FULL §10.1, rather than panicking or
/// silently treating missing results as "occluded".
pub fn apply_view_query_results(
    ctx: &mut SceneCullingContext,
    scene: &mut SceneElementSet,
    ring: &QueryRing,
    frame_index: u64,
    raw_samples: &[u64],
    min_visible: u32,
) -> CoreResult<()> {
    match ring.consume_view_results(frame_index, raw_samples) {
        Ok((indices, samples)) => {
            ctx.apply_occlusion_query_samples(scene, &indices, &samples, min_visible);
            Ok(())
        }
        Err(err) => {
            warn!("view occlusion query readback failed, leaving history unchanged: {err}");
            Err(err)
        }
    }
}

/// Shadow-pass counterpart of [`apply_view_query_results`].
pub fn apply_shadow_query_results(
    ctx: &mut SceneCullingContext,
    scene: &mut SceneElementSet,
    ring: &QueryRing,
    frame_index: u64,
    raw_samples: &[u64],
    min_visible: u32,
) -> CoreResult<()> {
    match ring.consume_shadow_results(frame_index, raw_samples) {
        Ok((indices, samples)) => {
            ctx.apply_occlusion_query_samples(scene, &indices, &samples, min_visible);
            Ok(())
        }
        Err(err) => {
            warn!("shadow occlusion query readback failed, leaving history unchanged: {err}");
            Err(err)
        }
    }
}

/// Idempotent predicate backing `apply_frustum_fallback_if_needed`: fires
/// only when occlusion is on, a depth attachment exists, the frustum pass
/// produced survivors, no queries were issued, and nothing is visible.
pub fn should_use_frustum_visibility_fallback(
    enable_occlusion: bool,
    has_depth_attachment: bool,
    frustum_visible_count: usize,
    query_count: usize,
    visible_count: usize,
) -> bool {
    enable_occlusion
        && has_depth_attachment
        && frustum_visible_count > 0
        && query_count == 0
        && visible_count == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::ConvexCellKind;
    use crate::geometry::{Plane, ShapeVolume, Sphere};
    use crate::scene::SceneElementSet;
    use glam::{Mat4, Vec3};

    fn unit_cube_cell() -> ConvexCell {
        let mut cell = ConvexCell::new(ConvexCellKind::CustomPlaneSetCell);
        cell.add_plane(Plane::new(Vec3::X, 1.0));
        cell.add_plane(Plane::new(-Vec3::X, 1.0));
        cell.add_plane(Plane::new(Vec3::Y, 1.0));
        cell.add_plane(Plane::new(-Vec3::Y, 1.0));
        cell.add_plane(Plane::new(Vec3::Z, 1.0));
        cell.add_plane(Plane::new(-Vec3::Z, 1.0));
        cell
    }

    fn sphere_at(x: f32) -> ShapeVolume {
        ShapeVolume::Sphere(Sphere::new(Vec3::new(x, 0.0, 0.0), 0.1))
    }

    #[test]
    fn empty_scene_all_zero() {
        let mut scene = SceneElementSet::new();
        let mut ctx = SceneCullingContext::new(HistoryPolicy::default());
        let cell = unit_cube_cell();
        ctx.run_frustum(&mut scene, &cell, CullTolerance::default());
        ctx.finalize_visibility(&mut scene, false);
        let stats = ctx.stats();
        assert_eq!(stats.scene_count, 0);
        assert_eq!(stats.frustum_visible_count, 0);
        assert_eq!(stats.visible_count, 0);
        assert_eq!(stats.occluded_count, 0);
        assert_eq!(stats.culled_count, 0);
    }

    #[test]
    fn single_element_inside_frustum() {
        let mut scene = SceneElementSet::new();
        scene.add(sphere_at(0.0), Mat4::IDENTITY, 0);
        let mut ctx = SceneCullingContext::new(HistoryPolicy::default());
        let cell = unit_cube_cell();
        ctx.run_frustum(&mut scene, &cell, CullTolerance::default());
        ctx.finalize_visibility(&mut scene, false);
        let stats = ctx.stats();
        assert_eq!(stats.frustum_visible_count, 1);
        assert_eq!(stats.visible_count, 1);
        assert_eq!(stats.occluded_count, 0);
    }

    // Section 8 property 6: without occlusion, visible == frustum-visible.
    #[test]
    fn without_occlusion_visible_equals_frustum_visible() {
        let mut scene = SceneElementSet::new();
        scene.add(sphere_at(0.0), Mat4::IDENTITY, 0);
        scene.add(sphere_at(100.0), Mat4::IDENTITY, 1);
        let mut ctx = SceneCullingContext::new(HistoryPolicy::default());
        let cell = unit_cube_cell();
        ctx.run_frustum(&mut scene, &cell, CullTolerance::default());
        ctx.finalize_visibility(&mut scene, false);
        assert_eq!(ctx.visible_indices(), ctx.frustum_visible_indices());
    }

    // E5. depth-sorted query fallback.
    #[test]
    fn e5_query_fallback_sequence() {
        let mut scene = SceneElementSet::new();
        scene.add(sphere_at(0.0), Mat4::IDENTITY, 0);
        scene.add(sphere_at(0.1), Mat4::IDENTITY, 1);
        let mut ctx = SceneCullingContext::new(HistoryPolicy {
            hide_confirm_frames: 2,
            show_confirm_frames: 1,
        });
        let cell = unit_cube_cell();

        ctx.run_frustum(&mut scene, &cell, CullTolerance::default());
        ctx.apply_occlusion_query_samples(&mut scene, &[0, 1], &[0, 42], 1);
        ctx.finalize_visibility(&mut scene, true);
        assert!(scene[0].occluded);
        assert!(!scene[1].occluded);

        ctx.run_frustum(&mut scene, &cell, CullTolerance::default());
        ctx.apply_occlusion_query_samples(&mut scene, &[0, 1], &[0, 0], 1);
        ctx.finalize_visibility(&mut scene, true);
        // Second element's first "not visible" sample isn't enough yet (needs 2).
        assert!(!scene[1].occluded);

        ctx.run_frustum(&mut scene, &cell, CullTolerance::default());
        ctx.apply_occlusion_query_samples(&mut scene, &[0, 1], &[0, 0], 1);
        ctx.finalize_visibility(&mut scene, true);
        assert!(scene[1].occluded);
    }

    #[test]
    fn fallback_fires_only_under_exact_conditions() {
        assert!(should_use_frustum_visibility_fallback(true, true, 3, 0, 0));
        assert!(!should_use_frustum_visibility_fallback(false, true, 3, 0, 0));
        assert!(!should_use_frustum_visibility_fallback(true, false, 3, 0, 0));
        assert!(!should_use_frustum_visibility_fallback(true, true, 0, 0, 0));
        assert!(!should_use_frustum_visibility_fallback(true, true, 3, 1, 0));
        assert!(!should_use_frustum_visibility_fallback(true, true, 3, 0, 1));
    }

    #[test]
    fn fallback_is_idempotent() {
        let mut scene = SceneElementSet::new();
        scene.add(sphere_at(0.0), Mat4::IDENTITY, 0);
        let mut ctx = SceneCullingContext::new(HistoryPolicy::default());
        let cell = unit_cube_cell();
        ctx.run_frustum(&mut scene, &cell, CullTolerance::default());
        ctx.apply_occlusion_query_samples(&mut scene, &[], &[], 1);
        ctx.finalize_visibility(&mut scene, true);
        let first = ctx.apply_frustum_fallback_if_needed(&mut scene, true, true, 0);
        let second = ctx.apply_frustum_fallback_if_needed(&mut scene, true, true, 0);
        assert!(first);
        assert!(!second); // visible_count is now > 0, so it won't fire again
        assert_eq!(ctx.visible_indices(), ctx.frustum_visible_indices());
    }

    // E6. Shadow/view separation: a non-caster outside the camera frustum
    // but inside the light frustum is drawn nowhere.
    #[test]
    fn e6_non_caster_outside_view_frustum_is_excluded_from_both_lists() {
        let camera_cell = unit_cube_cell();
        // Light frustum centered 10 units along X, large enough to contain
        // the element even though the camera frustum (the unit cube at the
        // origin) does not.
        let mut light_cell = ConvexCell::new(ConvexCellKind::SpotShadowFrustum);
        light_cell.add_plane(Plane::new(Vec3::X, -5.0));
        light_cell.add_plane(Plane::new(-Vec3::X, 15.0));
        light_cell.add_plane(Plane::new(Vec3::Y, 5.0));
        light_cell.add_plane(Plane::new(-Vec3::Y, 5.0));
        light_cell.add_plane(Plane::new(Vec3::Z, 5.0));
        light_cell.add_plane(Plane::new(-Vec3::Z, 5.0));

        let element = ShapeVolume::Sphere(Sphere::new(Vec3::new(10.0, 0.0, 0.0), 0.1));

        let mut view_scene = SceneElementSet::new();
        let id = view_scene.add(element.clone(), Mat4::IDENTITY, 0);
        view_scene.elements_mut()[0].casts_shadow = false;
        let mut view_ctx = SceneCullingContext::new(HistoryPolicy::default());
        view_ctx.run_frustum(&mut view_scene, &camera_cell, CullTolerance::default());
        view_ctx.finalize_visibility(&mut view_scene, false);
        assert!(view_ctx.visible_indices().is_empty());

        let mut shadow_scene = SceneElementSet::new();
        let shadow_id = shadow_scene.add(element, Mat4::IDENTITY, 0);
        shadow_scene.elements_mut()[0].casts_shadow = false;
        assert_eq!(id, shadow_id);
        let mut shadow_ctx = SceneCullingContext::new(HistoryPolicy::default());
        shadow_ctx.run_frustum_for_shadow(&mut shadow_scene, &light_cell, CullTolerance::default());
        shadow_ctx.finalize_visibility(&mut shadow_scene, false);
        assert!(shadow_ctx.visible_indices().is_empty());
    }

    #[test]
    fn camera_move_triggers_occlusion_warmup() {
        let mut scene = SceneElementSet::new();
        scene.add(sphere_at(0.0), Mat4::IDENTITY, 0);
        let mut ctx = SceneCullingContext::new(HistoryPolicy::default());
        let cell = unit_cube_cell();

        ctx.note_camera_position(Vec3::ZERO, 0.5, 2);
        assert!(!ctx.occlusion_warming_up());

        // Three consecutive zero-sample frames commit the element as occluded
        // (default hide_confirm_frames == 3).
        for _ in 0..3 {
            ctx.run_frustum(&mut scene, &cell, CullTolerance::default());
            ctx.apply_occlusion_query_samples(&mut scene, &[0], &[0], 1);
            ctx.finalize_visibility(&mut scene, true);
        }
        assert!(!scene[0].visible);

        // Camera jumps well past the threshold: warmup begins, occlusion
        // results are distrusted even though the element reads as occluded.
        ctx.note_camera_position(Vec3::new(10.0, 0.0, 0.0), 0.5, 2);
        assert!(ctx.occlusion_warming_up());
        ctx.run_frustum(&mut scene, &cell, CullTolerance::default());
        ctx.apply_occlusion_query_samples(&mut scene, &[0], &[0], 1);
        ctx.finalize_visibility(&mut scene, true);
        assert!(scene[0].visible);
    }

    #[test]
    fn apply_view_query_results_updates_history_on_success() {
        let mut scene = SceneElementSet::new();
        scene.add(sphere_at(0.0), Mat4::IDENTITY, 0);
        scene.add(sphere_at(0.1), Mat4::IDENTITY, 1);
        let mut ctx = SceneCullingContext::new(HistoryPolicy {
            hide_confirm_frames: 1,
            show_confirm_frames: 1,
        });
        let cell = unit_cube_cell();
        ctx.run_frustum(&mut scene, &cell, CullTolerance::default());

        let mut ring = QueryRing::new(1, 4, 4).unwrap();
        {
            let slot = ring.begin_frame(0).unwrap();
            slot.append_view_query(0);
            slot.append_view_query(1);
        }
        ring.mark_fence_signaled(0);

        apply_view_query_results(&mut ctx, &mut scene, &ring, 0, &[0, 42], 1).unwrap();
        ctx.finalize_visibility(&mut scene, true);
        assert!(scene[0].occluded);
        assert!(!scene[1].occluded);
    }

    #[test]
    fn apply_view_query_results_propagates_error_and_leaves_history_unchanged() {
        // This test exercises the mandated warn! log site for a failed
        // occlusion query readback; route it through env_logger so running
        // with RUST_LOG=warn surfaces it instead of the default no-op logger.
        let _ = env_logger::try_init();
        let mut scene = SceneElementSet::new();
        scene.add(sphere_at(0.0), Mat4::IDENTITY, 0);
        let mut ctx = SceneCullingContext::new(HistoryPolicy::default());
        let cell = unit_cube_cell();
        ctx.run_frustum(&mut scene, &cell, CullTolerance::default());

        let mut ring = QueryRing::new(1, 4, 4).unwrap();
        ring.begin_frame(0).unwrap().append_view_query(0);
        // Fence never signaled: readback must fail.
        let result = apply_view_query_results(&mut ctx, &mut scene, &ring, 0, &[7], 1);
        assert!(result.is_err());
        assert!(!ctx.history().is_occluded(scene[0].stable_id));
    }

    #[test]
    fn stats_normalizer_holds_invariant() {
        let stats = CullingStats {
            scene_count: 2,
            frustum_visible_count: 10,
            visible_count: 20,
            occluded_count: 0,
            culled_count: 0,
        }
        .normalize();
        assert!(stats.visible_count <= stats.frustum_visible_count);
        assert!(stats.frustum_visible_count <= stats.scene_count);
        assert_eq!(stats.culled_count, stats.scene_count - stats.visible_count);
    }
}
