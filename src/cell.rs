//! Convex cell: an up-to-16-plane convex region used for frustums, tiles,
//! clusters, and cascades (Section 3, Section 4.B).

use glam::{Mat4, UVec4};

use crate::geometry::{extract_frustum_planes, Aabb, Plane, Sphere};

pub const MAX_PLANES: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConvexCellKind {
    CameraFrustumPerspective,
    CameraFrustumOrthographic,
    CascadeFrustum,
    SpotShadowFrustum,
    PointShadowFaceFrustum,
    ScreenTileCell,
    TileDepthCell,
    ClusterCellPerspective,
    ClusterCellOrthographic,
    ClusterDepthCell,
    PortalClippedCell,
    CustomPlaneSetCell,
}

#[derive(Clone, Debug)]
pub struct ConvexCell {
    pub kind: ConvexCellKind,
    pub planes: Vec<Plane>,
    pub bounds_aabb: Option<Aabb>,
    pub bounds_sphere: Option<Sphere>,
    pub user_data: UVec4,
}

impl ConvexCell {
    pub fn new(kind: ConvexCellKind) -> Self {
        Self {
            kind,
            planes: Vec::with_capacity(6),
            bounds_aabb: None,
            bounds_sphere: None,
            user_data: UVec4::ZERO,
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.planes.is_empty() && self.planes.len() <= MAX_PLANES
    }

    /// Appends a plane, returning `false` (no-op) once `MAX_PLANES` is reached.
    pub fn add_plane(&mut self, plane: Plane) -> bool {
        if self.planes.len() >= MAX_PLANES {
            return false;
        }
        self.planes.push(plane);
        true
    }

    pub fn from_frustum_planes(view_proj: &Mat4, kind: ConvexCellKind) -> Self {
        let frustum = extract_frustum_planes(view_proj);
        let mut cell = ConvexCell::new(kind);
        for p in frustum.planes {
            cell.add_plane(p);
        }
        cell
    }

    pub fn extract_frustum_cell(view_proj: &Mat4) -> Self {
        Self::from_frustum_planes(view_proj, ConvexCellKind::CameraFrustumPerspective)
    }
}
