//! View-frustum plane extraction (Section 4.B) via the Gribb-Hartmann
//! row-sum/row-difference method.

use glam::{Mat4, Vec4};

use super::plane::Plane;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum FrustumPlaneIndex {
    Left = 0,
    Right = 1,
    Bottom = 2,
    Top = 3,
    Near = 4,
    Far = 5,
}

#[derive(Clone, Copy, Debug)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

/// Extracts the six frustum planes from a combined view-projection matrix.
pub fn extract_frustum_planes(view_proj: &Mat4) -> Frustum {
    let m = view_proj.to_cols_array();
    let r0 = Vec4::new(m[0], m[4], m[8], m[12]);
    let r1 = Vec4::new(m[1], m[5], m[9], m[13]);
    let r2 = Vec4::new(m[2], m[6], m[10], m[14]);
    let r3 = Vec4::new(m[3], m[7], m[11], m[15]);

    Frustum {
        planes: [
            Plane::from_vec4(r3 + r0),
            Plane::from_vec4(r3 - r0),
            Plane::from_vec4(r3 + r1),
            Plane::from_vec4(r3 - r1),
            Plane::from_vec4(r3 + r2),
            Plane::from_vec4(r3 - r2),
        ],
    }
}
