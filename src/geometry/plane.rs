//! Oriented planes and the small shared helpers every shape/cell builds on
//! (Section 4.A).

use glam::Vec3;

/// Plane `(n, d)` with "inside" defined by `dot(n, x) + d >= 0`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub d: f32,
}

impl Plane {
    pub fn new(normal: Vec3, d: f32) -> Self {
        Self { normal, d }
    }

    pub fn signed_distance(&self, p: Vec3) -> f32 {
        self.normal.dot(p) + self.d
    }

    /// Normalizes `(n, d)` derived from a clip-space row; falls back to
    /// `+Y` if the row's normal is near-zero length.
    pub fn from_vec4(eq: glam::Vec4) -> Self {
        let n = Vec3::new(eq.x, eq.y, eq.z);
        let len = n.length();
        if len <= 1e-8 {
            return Self {
                normal: Vec3::Y,
                d: eq.w,
            };
        }
        Self {
            normal: n / len,
            d: eq.w / len,
        }
    }

    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        let n = normalize_or(normal, Vec3::Y);
        Self {
            normal: n,
            d: -n.dot(point),
        }
    }
}

/// Normalizes `v`, or returns `fallback` if `v` is near-zero length.
pub fn normalize_or(v: Vec3, fallback: Vec3) -> Vec3 {
    let len = v.length();
    if len <= 1e-8 {
        fallback
    } else {
        v / len
    }
}

/// Solves the 3x3 system formed by three plane equations for their common
/// point. Returns `None` when the planes are parallel (determinant below
/// `eps`).
pub fn intersect_three_planes(a: &Plane, b: &Plane, c: &Plane) -> Option<Vec3> {
    const EPS: f32 = 1e-8;
    let n1 = a.normal;
    let n2 = b.normal;
    let n3 = c.normal;

    let denom = n1.dot(n2.cross(n3));
    if denom.abs() <= EPS {
        return None;
    }

    let p = (n2.cross(n3) * -a.d) + (n3.cross(n1) * -b.d) + (n1.cross(n2) * -c.d);
    Some(p / denom)
}

/// `true` when `p` is on the inside (or boundary, within `eps`) of every plane.
pub fn point_inside_planes(p: Vec3, planes: &[Plane], eps: f32) -> bool {
    planes.iter().all(|pl| pl.signed_distance(p) >= -eps)
}

/// Appends `v` to `out` unless a near-duplicate vertex (within `eps`) is
/// already present. Used by convex-vertex enumeration to dedupe triplet
/// intersections shared by more than three planes.
pub fn append_unique_vertex(out: &mut Vec<Vec3>, v: Vec3, eps: f32) {
    if out.iter().any(|existing| existing.distance(v) <= eps) {
        return;
    }
    out.push(v);
}

/// Enumerates the vertices of the convex region bounded by `planes` by
/// intersecting every triplet and keeping points inside all planes.
pub fn convex_vertices_from_planes(planes: &[Plane], eps: f32) -> Vec<Vec3> {
    let mut verts = Vec::new();
    let n = planes.len();
    for i in 0..n {
        for j in (i + 1)..n {
            for k in (j + 1)..n {
                if let Some(p) = intersect_three_planes(&planes[i], &planes[j], &planes[k]) {
                    if point_inside_planes(p, planes, eps) {
                        append_unique_vertex(&mut verts, p, eps);
                    }
                }
            }
        }
    }
    verts
}
