//! The central classification algorithm (Section 4.C): `classify(shape,
//! cell, tol) -> {Outside, Intersecting, Inside}`, its SoA fast path, and
//! batch helpers.

use glam::Vec3;
use log::warn;

use crate::cell::ConvexCell;
use crate::geometry::{Plane, ShapeVolume, Sphere};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CullClass {
    Outside,
    Intersecting,
    Inside,
}

impl CullClass {
    pub fn is_visible(self, include_intersecting: bool) -> bool {
        match self {
            CullClass::Inside => true,
            CullClass::Intersecting => include_intersecting,
            CullClass::Outside => false,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct CullTolerance {
    pub outside_epsilon: f32,
    pub inside_epsilon: f32,
}

impl Default for CullTolerance {
    fn default() -> Self {
        Self {
            outside_epsilon: 1e-5,
            inside_epsilon: 1e-5,
        }
    }
}

/// `classify(shape, cell, tol)`. Degenerate cells (no planes, or more than
/// `MAX_PLANES`) conservatively return `Intersecting` and log a warning.
pub fn classify(shape: &ShapeVolume, cell: &ConvexCell, tol: CullTolerance) -> CullClass {
    if !cell.is_valid() {
        warn!(
            "classify: degenerate cell (plane_count = {}), treating as Intersecting",
            cell.planes.len()
        );
        return CullClass::Intersecting;
    }
    classify_planes(|dir| shape.support(dir), &cell.planes, tol)
}

/// Core plane loop shared by every classify entry point: given a support
/// function and a plane set, returns the ternary classification.
fn classify_planes(support: impl Fn(Vec3) -> f32, planes: &[Plane], tol: CullTolerance) -> CullClass {
    let mut fully_inside = true;
    for p in planes {
        let max_in = support(p.normal) + p.d;
        let min_in = -support(-p.normal) + p.d;
        if max_in < -tol.outside_epsilon {
            return CullClass::Outside;
        }
        if min_in < tol.inside_epsilon {
            fully_inside = false;
        }
    }
    if fully_inside {
        CullClass::Inside
    } else {
        CullClass::Intersecting
    }
}

/// Direct sphere-vs-cell test (no generic support-function indirection);
/// the scalar reference the SoA fast path must match bit-for-bit modulo
/// `tol` (Section 8 property 3).
pub fn classify_sphere(sphere: Sphere, cell: &ConvexCell, tol: CullTolerance) -> CullClass {
    if !cell.is_valid() {
        warn!("classify_sphere: degenerate cell, treating as Intersecting");
        return CullClass::Intersecting;
    }
    classify_sphere_planes(sphere, &cell.planes, tol)
}

fn classify_sphere_planes(sphere: Sphere, planes: &[Plane], tol: CullTolerance) -> CullClass {
    let r = sphere.radius.max(0.0);
    let mut fully_inside = true;
    for p in planes {
        let dist = p.signed_distance(sphere.center);
        if dist < -(r + tol.outside_epsilon) {
            return CullClass::Outside;
        }
        if dist < (r + tol.inside_epsilon) {
            fully_inside = false;
        }
    }
    if fully_inside {
        CullClass::Inside
    } else {
        CullClass::Intersecting
    }
}

/// Planes packed into four aligned stripes `(nx, ny, nz, d)` for a
/// lane-parallel fast path.
#[derive(Clone, Debug, Default)]
pub struct PlaneStripes {
    pub nx: Vec<f32>,
    pub ny: Vec<f32>,
    pub nz: Vec<f32>,
    pub d: Vec<f32>,
}

impl PlaneStripes {
    pub fn from_planes(planes: &[Plane]) -> Self {
        let mut s = PlaneStripes {
            nx: Vec::with_capacity(planes.len()),
            ny: Vec::with_capacity(planes.len()),
            nz: Vec::with_capacity(planes.len()),
            d: Vec::with_capacity(planes.len()),
        };
        for p in planes {
            s.nx.push(p.normal.x);
            s.ny.push(p.normal.y);
            s.nz.push(p.normal.z);
            s.d.push(p.d);
        }
        s
    }

    pub fn len(&self) -> usize {
        self.nx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nx.is_empty()
    }
}

/// SoA fast path: loads four planes at a time, short-circuits on
/// `Outside`, tracks `fully_inside` across the whole stripe set. Must
/// return the same classification as [`classify_sphere`] modulo `tol`.
pub fn classify_sphere_soa(sphere: Sphere, stripes: &PlaneStripes, tol: CullTolerance) -> CullClass {
    if stripes.is_empty() || stripes.len() > crate::cell::MAX_PLANES {
        warn!("classify_sphere_soa: degenerate plane stripes, treating as Intersecting");
        return CullClass::Intersecting;
    }
    let r = sphere.radius.max(0.0);
    let mut fully_inside = true;
    let n = stripes.len();
    let mut i = 0;
    while i < n {
        let lanes = (n - i).min(4);
        for lane in 0..lanes {
            let j = i + lane;
            let dist = stripes.nx[j] * sphere.center.x
                + stripes.ny[j] * sphere.center.y
                + stripes.nz[j] * sphere.center.z
                + stripes.d[j];
            if dist < -(r + tol.outside_epsilon) {
                return CullClass::Outside;
            }
            if dist < (r + tol.inside_epsilon) {
                fully_inside = false;
            }
        }
        i += 4;
    }
    if fully_inside {
        CullClass::Inside
    } else {
        CullClass::Intersecting
    }
}

/// Broad phase + exact refine: classify the conservative bounding sphere
/// first; short-circuit on `Outside`; optionally accept a broad `Inside`
/// without the exact test; otherwise refine with the full classifier.
pub fn classify_with_broad_phase(
    shape: &ShapeVolume,
    cell: &ConvexCell,
    tol: CullTolerance,
    accept_broad_inside: bool,
) -> CullClass {
    let broad = classify_sphere(shape.bounding_sphere(), cell, tol);
    match broad {
        CullClass::Outside => CullClass::Outside,
        CullClass::Inside if accept_broad_inside => CullClass::Inside,
        _ => classify(shape, cell, tol),
    }
}

#[derive(Clone, Debug, Default)]
pub struct CullResult {
    pub classes: Vec<CullClass>,
    pub visible_indices: Vec<usize>,
    pub tested: u64,
    pub outside: u64,
    pub intersecting: u64,
    pub inside: u64,
}

pub fn cull_vs_cell(shapes: &[ShapeVolume], cell: &ConvexCell, tol: CullTolerance) -> CullResult {
    let mut out = CullResult {
        classes: Vec::with_capacity(shapes.len()),
        visible_indices: Vec::new(),
        tested: shapes.len() as u64,
        ..Default::default()
    };
    for (i, shape) in shapes.iter().enumerate() {
        let c = classify_with_broad_phase(shape, cell, tol, true);
        out.classes.push(c);
        match c {
            CullClass::Outside => out.outside += 1,
            CullClass::Intersecting => {
                out.intersecting += 1;
                out.visible_indices.push(i);
            }
            CullClass::Inside => {
                out.inside += 1;
                out.visible_indices.push(i);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::ConvexCellKind;
    use crate::geometry::Aabb;
    use approx::assert_relative_eq;

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

    // E1. axis-aligned box versus unit-cube frustum at origin.
    #[test]
    fn e1_aabb_inside_unit_cube() {
        let cell = unit_cube_cell();
        let shape = ShapeVolume::Aabb(Aabb::new(Vec3::splat(-0.5), Vec3::splat(0.5)));
        assert_eq!(classify(&shape, &cell, CullTolerance::default()), CullClass::Inside);
    }

    // E2. sphere straddling the near plane.
    #[test]
    fn e2_sphere_straddles_plane() {
        let mut cell = ConvexCell::new(ConvexCellKind::CustomPlaneSetCell);
        cell.add_plane(Plane::new(Vec3::Z, 0.0));
        let shape = ShapeVolume::Sphere(crate::geometry::Sphere::new(Vec3::ZERO, 0.5));
        assert_eq!(
            classify(&shape, &cell, CullTolerance::default()),
            CullClass::Intersecting
        );
    }

    #[test]
    fn outside_box_is_outside() {
        let cell = unit_cube_cell();
        let shape = ShapeVolume::Aabb(Aabb::new(Vec3::splat(10.0), Vec3::splat(11.0)));
        assert_eq!(classify(&shape, &cell, CullTolerance::default()), CullClass::Outside);
    }

    #[test]
    fn degenerate_cell_is_intersecting() {
        let cell = ConvexCell::new(ConvexCellKind::CustomPlaneSetCell);
        let shape = ShapeVolume::Sphere(crate::geometry::Sphere::new(Vec3::ZERO, 1.0));
        assert_eq!(classify(&shape, &cell, CullTolerance::default()), CullClass::Intersecting);
    }

    #[test]
    fn monotone_under_plane_removal() {
        // Property 2: removing a plane never turns Intersecting into Outside.
        let mut cell = unit_cube_cell();
        let shape = ShapeVolume::Sphere(crate::geometry::Sphere::new(Vec3::new(1.4, 0.0, 0.0), 0.5));
        let full = classify(&shape, &cell, CullTolerance::default());
        assert_eq!(full, CullClass::Outside);
        cell.planes.remove(0); // drop the +X plane that excluded it
        let reduced = classify(&shape, &cell, CullTolerance::default());
        assert_ne!(reduced, CullClass::Outside);
    }

    #[test]
    fn sphere_scalar_matches_soa_fast_path() {
        let cell = unit_cube_cell();
        let stripes = PlaneStripes::from_planes(&cell.planes);
        let cases = [
            (Vec3::ZERO, 0.1),
            (Vec3::splat(0.9), 0.2),
            (Vec3::new(1.4, 0.0, 0.0), 0.5),
            (Vec3::new(1.0, 0.0, 0.0), 1e-6),
        ];
        for (center, radius) in cases {
            let sphere = Sphere::new(center, radius);
            let scalar = classify_sphere(sphere, &cell, CullTolerance::default());
            let fast = classify_sphere_soa(sphere, &stripes, CullTolerance::default());
            assert_eq!(scalar, fast, "mismatch for center {center:?} radius {radius}");
        }
    }

    #[test]
    fn broad_phase_accepts_inside_without_refine() {
        let cell = unit_cube_cell();
        let shape = ShapeVolume::Sphere(Sphere::new(Vec3::ZERO, 0.2));
        assert_eq!(
            classify_with_broad_phase(&shape, &cell, CullTolerance::default(), true),
            CullClass::Inside
        );
    }

    #[test]
    fn boundary_tie_break_is_interior() {
        let mut cell = ConvexCell::new(ConvexCellKind::CustomPlaneSetCell);
        cell.add_plane(Plane::new(Vec3::X, 0.0));
        let tol = CullTolerance::default();
        // support(+x)+d == inside_eps exactly -> still Inside, not Outside.
        let shape = ShapeVolume::Sphere(Sphere::new(Vec3::new(tol.inside_epsilon, 0.0, 0.0), 0.0));
        assert_ne!(classify(&shape, &cell, tol), CullClass::Outside);
    }

    #[test]
    fn batch_cull_counts_are_consistent() {
        let cell = unit_cube_cell();
        let shapes = vec![
            ShapeVolume::Sphere(Sphere::new(Vec3::ZERO, 0.1)),
            ShapeVolume::Sphere(Sphere::new(Vec3::new(5.0, 0.0, 0.0), 0.1)),
            ShapeVolume::Aabb(Aabb::new(Vec3::splat(-0.9), Vec3::splat(0.9))),
        ];
        let result = cull_vs_cell(&shapes, &cell, CullTolerance::default());
        assert_eq!(result.tested, 3);
        assert_eq!(result.outside + result.intersecting + result.inside, 3);
        assert_relative_eq!(result.visible_indices.len() as f32, 2.0);
    }
}
