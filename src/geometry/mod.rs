pub mod frustum;
pub mod plane;
pub mod shape;

pub use frustum::{extract_frustum_planes, Frustum, FrustumPlaneIndex};
pub use plane::{
    append_unique_vertex, convex_vertices_from_planes, intersect_three_planes, normalize_or,
    point_inside_planes, Plane,
};
pub use shape::{
    Aabb, Capsule, Cone, ConeFrustum, ConvexPolyhedron, Cylinder, HullPoints, Kdop18, Kdop26, Obb,
    ShapeVolume, Sphere, SweptCapsule, SweptObb,
};
