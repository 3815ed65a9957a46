//! Bounding volumes and frustum culling
//!
//! Provides the axis-aligned bounding box, plane and frustum types used to
//! decide which scene nodes reach the main pass.
//!
//! The AABB-vs-frustum test is the standard "positive vertex" test: it never
//! rejects a box that intersects the frustum, but it may accept a box that
//! sits just outside a frustum corner. Exactness would need a full
//! separating-axis test, which the per-frame cost does not justify.

use crate::foundation::math::{utils, Mat4, Vec3};
use crate::render::primitives::Mesh;

/// Axis-Aligned Bounding Box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner of the bounding box
    pub min: Vec3,
    /// Maximum corner of the bounding box
    pub max: Vec3,
}

impl Aabb {
    /// Create a new AABB from min and max points
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Smallest box enclosing all points (`None` when there are none)
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = Vec3>,
    {
        points.into_iter().fold(None, |acc, p| match acc {
            None => Some(Self::new(p, p)),
            Some(b) => Some(Self::new(b.min.inf(&p), b.max.sup(&p))),
        })
    }

    /// The eight corners of the box
    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }

    /// Box enclosing this box after an affine transform
    ///
    /// Transforms the eight corners and takes the component-wise min/max.
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        let corners = self.corners().map(|c| utils::transform_point(matrix, &c));
        let mut out = Self::new(corners[0], corners[0]);
        for c in &corners[1..] {
            out.min = out.min.inf(c);
            out.max = out.max.sup(c);
        }
        out
    }
}

/// World-space bounds of a mesh placed with `world`
///
/// Uses the mesh's cached local box when it has one (8 corner transforms);
/// otherwise transforms every vertex.
pub fn world_bounds(mesh: &Mesh, world: &Mat4) -> Option<Aabb> {
    match mesh.local_bounds() {
        Some(local) => Some(local.transformed(world)),
        None => Aabb::from_points(
            mesh.vertices()
                .iter()
                .map(|v| utils::transform_point(world, &Vec3::from(v.position))),
        ),
    }
}

/// Plane defined by normal and distance from origin
///
/// Points with a non-negative signed distance are on the inside.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Unit normal vector
    pub normal: Vec3,
    /// Signed offset so that `normal · p + distance` is the metric distance
    pub distance: f32,
}

impl Plane {
    /// Create a plane from `a*x + b*y + c*z + d = 0`, normalized by |(a, b, c)|
    pub fn from_coefficients(a: f32, b: f32, c: f32, d: f32) -> Self {
        let normal = Vec3::new(a, b, c);
        let length = normal.norm();
        if length <= f32::EPSILON {
            return Self { normal, distance: d };
        }
        Self {
            normal: normal / length,
            distance: d / length,
        }
    }

    /// Calculate signed distance from plane to point
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(&point) + self.distance
    }
}

/// Index of each frustum plane inside [`Frustum::planes`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrustumSide {
    /// Left clip plane
    Left = 0,
    /// Right clip plane
    Right = 1,
    /// Bottom clip plane
    Bottom = 2,
    /// Top clip plane
    Top = 3,
    /// Near clip plane
    Near = 4,
    /// Far clip plane
    Far = 5,
}

/// Frustum for visibility culling
#[derive(Debug, Clone)]
pub struct Frustum {
    /// Six planes defining the frustum (left, right, bottom, top, near, far)
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Extract frustum planes from a view-projection matrix
    ///
    /// Gribb-Hartmann extraction for column-vector matrices with a `[-1, 1]`
    /// clip depth range: each plane is the fourth row plus or minus one of the
    /// other rows, normalized so distances are metric.
    pub fn from_view_projection(view_projection: &Mat4) -> Self {
        let m = view_projection;
        let r0 = m.row(0);
        let r1 = m.row(1);
        let r2 = m.row(2);
        let r3 = m.row(3);
        let plane = |v: nalgebra::RowVector4<f32>| Plane::from_coefficients(v[0], v[1], v[2], v[3]);

        Self {
            planes: [
                plane(r3 + r0),
                plane(r3 - r0),
                plane(r3 + r1),
                plane(r3 - r1),
                plane(r3 + r2),
                plane(r3 - r2),
            ],
        }
    }

    /// Plane for one side of the frustum
    pub fn plane(&self, side: FrustumSide) -> &Plane {
        &self.planes[side as usize]
    }

    /// Check if an AABB is inside or intersects the frustum
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        // For each plane, check if the AABB is completely outside
        for plane in &self.planes {
            // Corner furthest along the plane normal
            let mut p = aabb.min;
            if plane.normal.x >= 0.0 { p.x = aabb.max.x; }
            if plane.normal.y >= 0.0 { p.y = aabb.max.y; }
            if plane.normal.z >= 0.0 { p.z = aabb.max.z; }

            // If this point is outside the plane, the entire AABB is outside
            if plane.distance_to_point(p) < 0.0 {
                return false;
            }
        }

        // AABB is inside or intersecting the frustum
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{constants::PI, Point3, Quat};
    use approx::assert_relative_eq;

    fn test_frustum() -> Frustum {
        let view = Mat4::look_at_rh(
            &Point3::new(0.0, 0.0, 5.0),
            &Point3::origin(),
            &Vec3::y(),
        );
        let projection = Mat4::new_perspective(16.0 / 9.0, utils::deg_to_rad(60.0), 0.1, 100.0);
        Frustum::from_view_projection(&(projection * view))
    }

    /// Box of half size `half` around `center`
    fn boxed(center: Vec3, half: f32) -> Aabb {
        Aabb::new(center - Vec3::repeat(half), center + Vec3::repeat(half))
    }

    #[test]
    fn test_transformed_box_under_rotation_and_scale() {
        let local = Aabb::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0));
        let rotation = Quat::from_axis_angle(&Vec3::z_axis(), PI / 4.0);
        let world = Mat4::new_translation(&Vec3::new(10.0, 0.0, 0.0))
            * rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(&Vec3::new(2.0, 1.0, 1.0));

        let bounds = local.transformed(&world);
        // Corner (2, 1) rotated 45 degrees reaches x = (2 + 1) / sqrt(2)
        let reach = 3.0 / 2.0_f32.sqrt();
        assert_relative_eq!(bounds.max.x, 10.0 + reach, epsilon = 1e-5);
        assert_relative_eq!(bounds.min.x, 10.0 - reach, epsilon = 1e-5);
        assert_relative_eq!(bounds.max.z, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_world_bounds_matches_vertex_fallback() {
        let mesh = Mesh::cube(1.0);
        let world = Mat4::new_translation(&Vec3::new(1.0, 2.0, 3.0)) * Mat4::new_scaling(0.5);

        let fast = world_bounds(&mesh, &world).unwrap();
        let slow = Aabb::from_points(
            mesh.vertices().iter().map(|v| utils::transform_point(&world, &Vec3::from(v.position))),
        )
        .unwrap();
        assert_relative_eq!(fast.min, slow.min, epsilon = 1e-5);
        assert_relative_eq!(fast.max, slow.max, epsilon = 1e-5);
    }

    #[test]
    fn test_extracted_planes_are_normalized() {
        let frustum = test_frustum();
        for plane in &frustum.planes {
            assert_relative_eq!(plane.normal.norm(), 1.0, epsilon = 1e-5);
        }
        // Camera looks down -Z from z = 5; the near plane sits 0.1 in front of it
        let near = frustum.plane(FrustumSide::Near);
        assert_relative_eq!(near.distance_to_point(Vec3::new(0.0, 0.0, 4.9)), 0.0, epsilon = 1e-3);
        assert_relative_eq!(near.distance_to_point(Vec3::new(0.0, 0.0, 3.9)), 1.0, epsilon = 1e-3);
    }

    #[test]
    fn test_box_outside_one_plane_is_rejected() {
        let frustum = test_frustum();

        // Far to the right, behind the camera, and beyond the far plane
        let right = boxed(Vec3::new(1000.0, 0.0, 0.0), 1.0);
        let behind = boxed(Vec3::new(0.0, 0.0, 20.0), 1.0);
        let beyond = boxed(Vec3::new(0.0, 0.0, -200.0), 1.0);

        assert!(!frustum.intersects_aabb(&right));
        assert!(!frustum.intersects_aabb(&behind));
        assert!(!frustum.intersects_aabb(&beyond));
    }

    #[test]
    fn test_box_containing_camera_is_accepted() {
        let frustum = test_frustum();
        let around_eye = boxed(Vec3::new(0.0, 0.0, 5.0), 0.5);
        assert!(frustum.intersects_aabb(&around_eye));

        let at_origin = Aabb::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0));
        assert!(frustum.intersects_aabb(&at_origin));
    }

    #[test]
    fn test_partially_visible_box_is_accepted() {
        let frustum = test_frustum();
        // Straddles the left edge of the view at the origin's depth
        let edge = boxed(Vec3::new(-5.0, 0.0, 0.0), 1.0);
        assert!(frustum.intersects_aabb(&edge));
    }
}
