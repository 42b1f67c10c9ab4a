//! Shape volume primitives (Section 3, Section 4.A).
//!
//! Every variant exposes a support function, a conservative bounding
//! sphere, and (for hull-ish variants) an enumerated vertex set. Dispatch
//! is a single match on the tag rather than virtual calls, keeping the
//! classifier's hot path free of dynamic dispatch (see DESIGN.md).

use glam::Vec3;

use super::plane::{convex_vertices_from_planes, normalize_or, Plane};

#[derive(Clone, Copy, Debug)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
}

impl Sphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self {
            center,
            radius: radius.max(0.0),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    pub fn corners(&self) -> [Vec3; 8] {
        [
            Vec3::new(self.min.x, self.min.y, self.min.z),
            Vec3::new(self.max.x, self.min.y, self.min.z),
            Vec3::new(self.min.x, self.max.y, self.min.z),
            Vec3::new(self.max.x, self.max.y, self.min.z),
            Vec3::new(self.min.x, self.min.y, self.max.z),
            Vec3::new(self.max.x, self.min.y, self.max.z),
            Vec3::new(self.min.x, self.max.y, self.max.z),
            Vec3::new(self.max.x, self.max.y, self.max.z),
        ]
    }

    pub fn bounding_sphere(&self) -> Sphere {
        Sphere::new(self.center(), self.half_extents().length())
    }
}

fn bounding_sphere_from_points(points: &[Vec3]) -> Sphere {
    if points.is_empty() {
        return Sphere::new(Vec3::ZERO, 0.0);
    }
    let mut min = points[0];
    let mut max = points[0];
    for p in points {
        min = min.min(*p);
        max = max.max(*p);
    }
    let center = (min + max) * 0.5;
    let radius = points
        .iter()
        .map(|p| p.distance(center))
        .fold(0.0_f32, f32::max);
    Sphere::new(center, radius)
}

/// Support for a disk: `dot(dir, center) + radius * ||dir - (dir.axis)axis||`.
fn disk_support(dir: Vec3, center: Vec3, axis: Vec3, radius: f32) -> f32 {
    let along = dir.dot(axis);
    let radial = dir - axis * along;
    dir.dot(center) + radius * radial.length()
}

#[derive(Clone, Copy, Debug)]
pub struct Obb {
    pub center: Vec3,
    pub axes: [Vec3; 3],
    pub half_extents: Vec3,
}

impl Obb {
    pub fn new(center: Vec3, axes: [Vec3; 3], half_extents: Vec3) -> Self {
        let axes = [
            normalize_or(axes[0], Vec3::X),
            normalize_or(axes[1], Vec3::Y),
            normalize_or(axes[2], Vec3::Z),
        ];
        Self {
            center,
            axes,
            half_extents: half_extents.max(Vec3::ZERO),
        }
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let mut out = [Vec3::ZERO; 8];
        for i in 0..8 {
            let sx = if i & 1 == 0 { -1.0 } else { 1.0 };
            let sy = if i & 2 == 0 { -1.0 } else { 1.0 };
            let sz = if i & 4 == 0 { -1.0 } else { 1.0 };
            out[i] = self.center
                + self.axes[0] * (sx * self.half_extents.x)
                + self.axes[1] * (sy * self.half_extents.y)
                + self.axes[2] * (sz * self.half_extents.z);
        }
        out
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Capsule {
    pub a: Vec3,
    pub b: Vec3,
    pub radius: f32,
}

#[derive(Clone, Copy, Debug)]
pub struct Cone {
    pub apex: Vec3,
    pub axis: Vec3,
    pub height: f32,
    pub base_radius: f32,
}

impl Cone {
    pub fn base_center(&self) -> Vec3 {
        self.apex + self.axis * self.height
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ConeFrustum {
    pub base_center: Vec3,
    pub axis: Vec3,
    pub height: f32,
    pub bottom_radius: f32,
    pub top_radius: f32,
}

impl ConeFrustum {
    pub fn top_center(&self) -> Vec3 {
        self.base_center + self.axis * self.height
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Cylinder {
    pub center: Vec3,
    pub axis: Vec3,
    pub half_height: f32,
    pub radius: f32,
}

/// An explicit or plane-defined convex hull. At least one of `vertices` or
/// `planes` must be populated; the other half is derived lazily on first
/// use and cached by the caller if desired (Section 3's "missing half is
/// derived lazily" invariant — the CORE does not force eager derivation).
#[derive(Clone, Debug, Default)]
pub struct ConvexPolyhedron {
    pub vertices: Vec<Vec3>,
    pub planes: Vec<Plane>,
}

impl ConvexPolyhedron {
    pub fn from_vertices(vertices: Vec<Vec3>) -> Self {
        Self {
            vertices,
            planes: Vec::new(),
        }
    }

    pub fn from_planes(planes: Vec<Plane>) -> Self {
        Self {
            vertices: Vec::new(),
            planes,
        }
    }

    /// Returns the explicit vertex set, deriving it from `planes` via
    /// triplet intersection when `vertices` is empty.
    pub fn resolved_vertices(&self, eps: f32) -> Vec<Vec3> {
        if !self.vertices.is_empty() {
            self.vertices.clone()
        } else {
            convex_vertices_from_planes(&self.planes, eps)
        }
    }
}

/// 18-direction k-DOP: the 6 axis-aligned pairs plus the 12 diagonal edge
/// directions, stored as `[min, max]` extents along each of the 9 distinct
/// axes.
#[derive(Clone, Copy, Debug)]
pub struct Kdop18 {
    pub min: [f32; 9],
    pub max: [f32; 9],
}

/// 26-direction k-DOP: 9 kDOP18 axes plus the 4 remaining cube-corner
/// diagonals, for 13 distinct axes.
#[derive(Clone, Copy, Debug)]
pub struct Kdop26 {
    pub min: [f32; 13],
    pub max: [f32; 13],
}

pub fn kdop18_axes() -> [Vec3; 9] {
    [
        Vec3::X,
        Vec3::Y,
        Vec3::Z,
        Vec3::new(1.0, 1.0, 0.0).normalize(),
        Vec3::new(1.0, -1.0, 0.0).normalize(),
        Vec3::new(1.0, 0.0, 1.0).normalize(),
        Vec3::new(1.0, 0.0, -1.0).normalize(),
        Vec3::new(0.0, 1.0, 1.0).normalize(),
        Vec3::new(0.0, 1.0, -1.0).normalize(),
    ]
}

pub fn kdop26_axes() -> [Vec3; 13] {
    let mut out = [Vec3::ZERO; 13];
    out[..9].copy_from_slice(&kdop18_axes());
    out[9] = Vec3::new(1.0, 1.0, 1.0).normalize();
    out[10] = Vec3::new(1.0, 1.0, -1.0).normalize();
    out[11] = Vec3::new(1.0, -1.0, 1.0).normalize();
    out[12] = Vec3::new(-1.0, 1.0, 1.0).normalize();
    out
}

impl Kdop18 {
    pub fn from_points(points: &[Vec3]) -> Self {
        let axes = kdop18_axes();
        let mut min = [f32::MAX; 9];
        let mut max = [f32::MIN; 9];
        for p in points {
            for (i, a) in axes.iter().enumerate() {
                let d = a.dot(*p);
                min[i] = min[i].min(d);
                max[i] = max[i].max(d);
            }
        }
        Self { min, max }
    }

    /// Planes bounding the slab along each of the 9 axes (18 half-spaces).
    pub fn planes(&self) -> Vec<Plane> {
        let axes = kdop18_axes();
        let mut out = Vec::with_capacity(18);
        for i in 0..9 {
            out.push(Plane::new(axes[i], -self.min[i]));
            out.push(Plane::new(-axes[i], self.max[i]));
        }
        out
    }
}

impl Kdop26 {
    pub fn from_points(points: &[Vec3]) -> Self {
        let axes = kdop26_axes();
        let mut min = [f32::MAX; 13];
        let mut max = [f32::MIN; 13];
        for p in points {
            for (i, a) in axes.iter().enumerate() {
                let d = a.dot(*p);
                min[i] = min[i].min(d);
                max[i] = max[i].max(d);
            }
        }
        Self { min, max }
    }

    pub fn planes(&self) -> Vec<Plane> {
        let axes = kdop26_axes();
        let mut out = Vec::with_capacity(26);
        for i in 0..13 {
            out.push(Plane::new(axes[i], -self.min[i]));
            out.push(Plane::new(-axes[i], self.max[i]));
        }
        out
    }
}

/// A shape swept linearly between two poses, represented as the convex
/// hull of the start and end pose's defining points.
#[derive(Clone, Copy, Debug)]
pub struct SweptCapsule {
    pub start: Capsule,
    pub end: Capsule,
}

#[derive(Clone, Copy, Debug)]
pub struct SweptObb {
    pub start: Obb,
    pub end: Obb,
}

/// Dense vertex cloud driving a meshlet's (or a meshlet cluster's) culling
/// bounds — both use the same convex-hull-of-points representation, only
/// the population granularity differs upstream.
#[derive(Clone, Debug, Default)]
pub struct HullPoints {
    pub vertices: Vec<Vec3>,
}

#[derive(Clone, Debug)]
pub enum ShapeVolume {
    Sphere(Sphere),
    Aabb(Aabb),
    Obb(Obb),
    Capsule(Capsule),
    Cone(Cone),
    ConeFrustum(ConeFrustum),
    Cylinder(Cylinder),
    ConvexPolyhedron(ConvexPolyhedron),
    Kdop18(Kdop18),
    Kdop26(Kdop26),
    SweptCapsule(SweptCapsule),
    SweptObb(SweptObb),
    MeshletHull(HullPoints),
    ClusterHull(HullPoints),
}

impl ShapeVolume {
    /// `s(dir) = max_{p in V} <dir, p>`.
    pub fn support(&self, dir: Vec3) -> f32 {
        match self {
            ShapeVolume::Sphere(s) => dir.dot(s.center) + s.radius * dir.length(),
            ShapeVolume::Aabb(a) => {
                let c = a.center();
                let he = a.half_extents();
                dir.dot(c) + he.x * dir.x.abs() + he.y * dir.y.abs() + he.z * dir.z.abs()
            }
            ShapeVolume::Obb(o) => {
                dir.dot(o.center)
                    + o.half_extents.x * dir.dot(o.axes[0]).abs()
                    + o.half_extents.y * dir.dot(o.axes[1]).abs()
                    + o.half_extents.z * dir.dot(o.axes[2]).abs()
            }
            ShapeVolume::Capsule(c) => {
                dir.dot(c.a).max(dir.dot(c.b)) + c.radius * dir.length()
            }
            ShapeVolume::Cone(c) => {
                let apex_s = dir.dot(c.apex);
                let base_s = disk_support(dir, c.base_center(), c.axis, c.base_radius);
                apex_s.max(base_s)
            }
            ShapeVolume::ConeFrustum(c) => {
                let bottom = disk_support(dir, c.base_center, c.axis, c.bottom_radius);
                let top = disk_support(dir, c.top_center(), c.axis, c.top_radius);
                bottom.max(top)
            }
            ShapeVolume::Cylinder(c) => {
                let along = dir.dot(c.axis);
                let radial = dir - c.axis * along;
                dir.dot(c.center) + c.half_height * along.abs() + c.radius * radial.length()
            }
            ShapeVolume::ConvexPolyhedron(p) => support_over_points(dir, &p.resolved_vertices(1e-4)),
            ShapeVolume::Kdop18(k) => support_over_points(dir, &convex_vertices_from_planes(&k.planes(), 1e-4)),
            ShapeVolume::Kdop26(k) => support_over_points(dir, &convex_vertices_from_planes(&k.planes(), 1e-4)),
            ShapeVolume::SweptCapsule(s) => {
                let start = ShapeVolume::Capsule(s.start).support(dir);
                let end = ShapeVolume::Capsule(s.end).support(dir);
                start.max(end)
            }
            ShapeVolume::SweptObb(s) => {
                let a: Vec<Vec3> = s.start.corners().into();
                let b: Vec<Vec3> = s.end.corners().into();
                support_over_points(dir, &a).max(support_over_points(dir, &b))
            }
            ShapeVolume::MeshletHull(h) | ShapeVolume::ClusterHull(h) => {
                support_over_points(dir, &h.vertices)
            }
        }
    }

    pub fn bounding_sphere(&self) -> Sphere {
        match self {
            ShapeVolume::Sphere(s) => *s,
            ShapeVolume::Aabb(a) => a.bounding_sphere(),
            ShapeVolume::Obb(o) => Sphere::new(o.center, o.half_extents.length()),
            ShapeVolume::Capsule(c) => {
                let center = (c.a + c.b) * 0.5;
                Sphere::new(center, c.a.distance(c.b) * 0.5 + c.radius)
            }
            ShapeVolume::Cone(c) => {
                let center = c.apex + c.axis * (c.height * 0.5);
                let half = c.height * 0.5;
                Sphere::new(center, (half * half + c.base_radius * c.base_radius).sqrt())
            }
            ShapeVolume::ConeFrustum(c) => {
                let center = (c.base_center + c.top_center()) * 0.5;
                let half = c.height * 0.5;
                let r_bottom = (half * half + c.bottom_radius * c.bottom_radius).sqrt();
                let r_top = (half * half + c.top_radius * c.top_radius).sqrt();
                Sphere::new(center, r_bottom.max(r_top))
            }
            ShapeVolume::Cylinder(c) => {
                Sphere::new(c.center, (c.half_height * c.half_height + c.radius * c.radius).sqrt())
            }
            ShapeVolume::ConvexPolyhedron(p) => bounding_sphere_from_points(&p.resolved_vertices(1e-4)),
            ShapeVolume::Kdop18(k) => bounding_sphere_from_points(&convex_vertices_from_planes(&k.planes(), 1e-4)),
            ShapeVolume::Kdop26(k) => bounding_sphere_from_points(&convex_vertices_from_planes(&k.planes(), 1e-4)),
            ShapeVolume::SweptCapsule(s) => {
                let a = ShapeVolume::Capsule(s.start).bounding_sphere();
                let b = ShapeVolume::Capsule(s.end).bounding_sphere();
                merge_spheres(a, b)
            }
            ShapeVolume::SweptObb(s) => {
                let mut pts: Vec<Vec3> = s.start.corners().into();
                pts.extend(s.end.corners());
                bounding_sphere_from_points(&pts)
            }
            ShapeVolume::MeshletHull(h) | ShapeVolume::ClusterHull(h) => {
                bounding_sphere_from_points(&h.vertices)
            }
        }
    }

    /// Hull-ish variants return `Some(vertices)`; smooth primitives
    /// (sphere, capsule, cone, cone frustum, cylinder) return `None`
    /// since the classifier's support-function test is exact for them.
    pub fn vertices(&self) -> Option<Vec<Vec3>> {
        match self {
            ShapeVolume::Sphere(_)
            | ShapeVolume::Capsule(_)
            | ShapeVolume::Cone(_)
            | ShapeVolume::ConeFrustum(_)
            | ShapeVolume::Cylinder(_) => None,
            ShapeVolume::Aabb(a) => Some(a.corners().into()),
            ShapeVolume::Obb(o) => Some(o.corners().into()),
            ShapeVolume::ConvexPolyhedron(p) => Some(p.resolved_vertices(1e-4)),
            ShapeVolume::Kdop18(k) => Some(convex_vertices_from_planes(&k.planes(), 1e-4)),
            ShapeVolume::Kdop26(k) => Some(convex_vertices_from_planes(&k.planes(), 1e-4)),
            ShapeVolume::SweptCapsule(s) => Some(vec![s.start.a, s.start.b, s.end.a, s.end.b]),
            ShapeVolume::SweptObb(s) => {
                let mut pts: Vec<Vec3> = s.start.corners().into();
                pts.extend(s.end.corners());
                Some(pts)
            }
            ShapeVolume::MeshletHull(h) | ShapeVolume::ClusterHull(h) => Some(h.vertices.clone()),
        }
    }

    /// Exact conservative world AABB, derived generically from the
    /// support function along the three principal axes.
    pub fn world_aabb(&self) -> Aabb {
        let max = Vec3::new(
            self.support(Vec3::X),
            self.support(Vec3::Y),
            self.support(Vec3::Z),
        );
        let min = Vec3::new(
            -self.support(-Vec3::X),
            -self.support(-Vec3::Y),
            -self.support(-Vec3::Z),
        );
        Aabb::new(min, max)
    }
}

fn support_over_points(dir: Vec3, points: &[Vec3]) -> f32 {
    points
        .iter()
        .map(|p| dir.dot(*p))
        .fold(f32::MIN, f32::max)
}

fn merge_spheres(a: Sphere, b: Sphere) -> Sphere {
    let d = a.center.distance(b.center);
    if d + b.radius <= a.radius {
        return a;
    }
    if d + a.radius <= b.radius {
        return b;
    }
    let radius = (d + a.radius + b.radius) * 0.5;
    let center = a.center + (b.center - a.center) * ((radius - a.radius) / d.max(1e-8));
    Sphere::new(center, radius)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sphere_support_along_axis() {
        let s = ShapeVolume::Sphere(Sphere::new(Vec3::ZERO, 2.0));
        assert!((s.support(Vec3::X) - 2.0).abs() < 1e-5);
    }

    #[test]
    fn aabb_support_matches_corner() {
        let a = ShapeVolume::Aabb(Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0)));
        assert!((a.support(Vec3::new(1.0, 1.0, 1.0).normalize()) - 3.0_f32.sqrt()).abs() < 1e-4);
    }

    #[test]
    fn obb_axis_aligned_matches_aabb() {
        let obb = ShapeVolume::Obb(Obb::new(
            Vec3::ZERO,
            [Vec3::X, Vec3::Y, Vec3::Z],
            Vec3::splat(1.0),
        ));
        let aabb = ShapeVolume::Aabb(Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0)));
        for dir in [Vec3::X, Vec3::Y, Vec3::Z, Vec3::new(1.0, 1.0, 1.0).normalize()] {
            assert!((obb.support(dir) - aabb.support(dir)).abs() < 1e-4);
        }
    }

    #[test]
    fn capsule_bounding_sphere_covers_endpoints() {
        let c = ShapeVolume::Capsule(Capsule {
            a: Vec3::new(-1.0, 0.0, 0.0),
            b: Vec3::new(1.0, 0.0, 0.0),
            radius: 0.25,
        });
        let sph = c.bounding_sphere();
        assert!((sph.center).length() < 1e-5);
        assert!((sph.radius - 1.25).abs() < 1e-5);
    }

    #[test]
    fn cone_support_covers_apex_and_base_rim() {
        let c = ShapeVolume::Cone(Cone {
            apex: Vec3::ZERO,
            axis: Vec3::Y,
            height: 2.0,
            base_radius: 1.0,
        });
        assert!((c.support(Vec3::Y) - 2.0).abs() < 1e-4);
        assert!(c.support(Vec3::X) >= 1.0 - 1e-4);
    }

    #[test]
    fn world_aabb_matches_aabb_shape() {
        let a = Aabb::new(Vec3::new(-1.0, -2.0, -3.0), Vec3::new(4.0, 5.0, 6.0));
        let shape = ShapeVolume::Aabb(a);
        let derived = shape.world_aabb();
        assert!((derived.min - a.min).length() < 1e-4);
        assert!((derived.max - a.max).length() < 1e-4);
    }

    #[test]
    fn kdop18_from_box_matches_aabb_extents() {
        let pts = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0)).corners();
        let k = Kdop18::from_points(&pts);
        assert!((k.max[0] - 1.0).abs() < 1e-4);
        assert!((k.min[0] + 1.0).abs() < 1e-4);
    }

    #[test]
    fn swept_obb_hull_covers_both_endpoints() {
        let start = Obb::new(Vec3::ZERO, [Vec3::X, Vec3::Y, Vec3::Z], Vec3::splat(0.5));
        let end = Obb::new(Vec3::new(10.0, 0.0, 0.0), [Vec3::X, Vec3::Y, Vec3::Z], Vec3::splat(0.5));
        let swept = ShapeVolume::SweptObb(SweptObb { start, end });
        assert!(swept.support(Vec3::X) >= 10.5 - 1e-4);
        assert!(swept.support(-Vec3::X) >= 0.5 - 1e-4);
    }
}
