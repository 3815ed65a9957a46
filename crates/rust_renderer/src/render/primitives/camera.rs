//! # 3D Camera
//!
//! Perspective camera with lazily cached view and projection matrices.
//!
//! ## Coordinate System
//! Right-handed, Y-up view space looking down -Z. Projection maps depth to the
//! `[-1, 1]` clip range, which is what [`Frustum::from_view_projection`]
//! expects.
//!
//! [`Frustum::from_view_projection`]: crate::scene::Frustum::from_view_projection

use std::cell::Cell;

use crate::foundation::math::{utils, Mat4, Point3, Vec3};
use crate::scene::Frustum;

const DEFAULT_NEAR: f32 = 0.1;
const DEFAULT_FAR: f32 = 1000.0;
const DEFAULT_FOV_DEGREES: f32 = 60.0;

/// Clip distances the perspective projection can be built from
fn valid_clip_planes(near: f32, far: f32) -> bool {
    near.is_finite() && far.is_finite() && near > 0.0 && far > near
}

fn valid_fov(fov_degrees: f32) -> bool {
    fov_degrees.is_finite() && fov_degrees > 0.0 && fov_degrees < 180.0
}

/// Matrices derived from the camera parameters
#[derive(Debug, Clone, Copy)]
struct CameraMatrices {
    view: Mat4,
    projection: Mat4,
    view_projection: Mat4,
}

/// 3D Camera for perspective projection
///
/// Parameters are private so every change goes through a setter that
/// invalidates the cached matrices. Reading a matrix recomputes all three at
/// most once after any number of changes.
#[derive(Debug, Clone)]
pub struct Camera {
    position: Vec3,
    target: Vec3,
    up: Vec3,
    /// Vertical field of view in radians
    fov_y: f32,
    aspect: f32,
    near: f32,
    far: f32,
    cache: Cell<Option<CameraMatrices>>,
}

impl Camera {
    /// Create a new perspective camera looking at the origin with +Y up
    ///
    /// # Arguments
    /// * `position` - Camera position in world space
    /// * `fov_degrees` - Vertical field of view in degrees
    /// * `aspect` - Viewport width / height
    /// * `near` - Distance to near clipping plane (must be > 0)
    /// * `far` - Distance to far clipping plane (must be > near)
    ///
    /// Out-of-range values are replaced by defaults (60°, aspect 1, 0.1..1000)
    /// with a warning.
    pub fn perspective(position: Vec3, fov_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        let fov_degrees = if valid_fov(fov_degrees) {
            fov_degrees
        } else {
            log::warn!("Invalid camera field of view {}, using {}", fov_degrees, DEFAULT_FOV_DEGREES);
            DEFAULT_FOV_DEGREES
        };
        let aspect = if aspect.is_finite() && aspect > 0.0 {
            aspect
        } else {
            log::warn!("Invalid camera aspect ratio {}, using 1.0", aspect);
            1.0
        };
        let (near, far) = if valid_clip_planes(near, far) {
            (near, far)
        } else {
            log::warn!("Invalid camera clip planes {}..{}, using {}..{}", near, far, DEFAULT_NEAR, DEFAULT_FAR);
            (DEFAULT_NEAR, DEFAULT_FAR)
        };

        Self {
            position,
            target: Vec3::zeros(),
            up: Vec3::y(),
            fov_y: utils::deg_to_rad(fov_degrees),
            aspect,
            near,
            far,
            cache: Cell::new(None),
        }
    }

    /// Camera position in world space
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Point the camera looks at
    pub fn target(&self) -> Vec3 {
        self.target
    }

    /// Up vector used to orient the view
    pub fn up(&self) -> Vec3 {
        self.up
    }

    /// Vertical field of view in radians
    pub fn fov_y(&self) -> f32 {
        self.fov_y
    }

    /// Viewport aspect ratio
    pub fn aspect_ratio(&self) -> f32 {
        self.aspect
    }

    /// Near and far clip distances
    pub fn clip_planes(&self) -> (f32, f32) {
        (self.near, self.far)
    }

    /// Normalized direction from the position towards the target
    pub fn forward(&self) -> Vec3 {
        (self.target - self.position)
            .try_normalize(f32::EPSILON)
            .unwrap_or_else(|| -Vec3::z())
    }

    /// Move the camera, keeping its target
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.invalidate();
    }

    /// Point the camera at `target` with the given up vector
    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        self.target = target;
        self.up = up;
        self.invalidate();
        log::trace!("Camera look_at updated - target: {:?}, up: {:?}", target, up);
    }

    /// Update the aspect ratio after a viewport change
    pub fn set_aspect_ratio(&mut self, aspect: f32) {
        if aspect.is_finite() && aspect > 0.0 {
            self.aspect = aspect;
            self.invalidate();
        } else {
            log::warn!("Ignoring invalid camera aspect ratio {}", aspect);
        }
    }

    /// Set the vertical field of view in degrees; values outside (0, 180) are ignored
    pub fn set_fov_degrees(&mut self, fov_degrees: f32) {
        if valid_fov(fov_degrees) {
            self.fov_y = utils::deg_to_rad(fov_degrees);
            self.invalidate();
        } else {
            log::warn!("Ignoring invalid camera field of view {}", fov_degrees);
        }
    }

    /// Set near and far clip distances
    ///
    /// Requires `0 < near < far`; anything else keeps the current planes.
    pub fn set_clip_planes(&mut self, near: f32, far: f32) {
        if valid_clip_planes(near, far) {
            self.near = near;
            self.far = far;
            self.invalidate();
        } else {
            log::warn!("Ignoring invalid camera clip planes {}..{}", near, far);
        }
    }

    /// World-to-view matrix
    pub fn view_matrix(&self) -> Mat4 {
        self.matrices().view
    }

    /// View-to-clip matrix
    pub fn projection_matrix(&self) -> Mat4 {
        self.matrices().projection
    }

    /// `projection * view`
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.matrices().view_projection
    }

    /// Frustum of the current view
    pub fn frustum(&self) -> Frustum {
        Frustum::from_view_projection(&self.view_projection_matrix())
    }

    /// Whether the matrices still need to be recomputed
    pub fn is_dirty(&self) -> bool {
        self.cache.get().is_none()
    }

    fn invalidate(&self) {
        self.cache.set(None);
    }

    fn matrices(&self) -> CameraMatrices {
        if let Some(cached) = self.cache.get() {
            return cached;
        }

        let view = Mat4::look_at_rh(
            &Point3::from(self.position),
            &Point3::from(self.target),
            &self.up,
        );
        let projection = Mat4::new_perspective(self.aspect, self.fov_y, self.near, self.far);
        let matrices = CameraMatrices {
            view,
            projection,
            view_projection: projection * view,
        };
        self.cache.set(Some(matrices));
        matrices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn camera() -> Camera {
        Camera::perspective(Vec3::new(0.0, 0.0, 5.0), 60.0, 16.0 / 9.0, 0.1, 100.0)
    }

    #[test]
    fn test_matrices_are_cached_until_changed() {
        let mut camera = camera();
        assert!(camera.is_dirty());

        let first = camera.view_projection_matrix();
        assert!(!camera.is_dirty());
        assert_eq!(camera.view_projection_matrix(), first);

        camera.set_aspect_ratio(1.0);
        assert!(camera.is_dirty());
        assert_ne!(camera.view_projection_matrix(), first);
    }

    #[test]
    fn test_view_moves_target_to_negative_z() {
        let camera = camera();
        let view = camera.view_matrix();
        let origin_in_view = utils::transform_point(&view, &Vec3::zeros());
        assert_relative_eq!(origin_in_view, Vec3::new(0.0, 0.0, -5.0), epsilon = 1e-5);
    }

    #[test]
    fn test_view_projection_is_projection_times_view() {
        let camera = camera();
        assert_relative_eq!(
            camera.view_projection_matrix(),
            camera.projection_matrix() * camera.view_matrix(),
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_invalid_aspect_is_ignored() {
        let mut camera = camera();
        camera.set_aspect_ratio(0.0);
        assert_relative_eq!(camera.aspect_ratio(), 16.0 / 9.0);
    }

    #[test]
    fn test_invalid_clip_planes_are_ignored() {
        let mut camera = camera();
        let before = camera.projection_matrix();

        camera.set_clip_planes(1.0, 1.0);
        camera.set_clip_planes(0.0, 10.0);
        camera.set_clip_planes(5.0, 2.0);
        camera.set_clip_planes(0.1, f32::NAN);
        camera.set_fov_degrees(0.0);
        assert_eq!(camera.clip_planes(), (0.1, 100.0));
        assert_eq!(camera.projection_matrix(), before);

        camera.set_clip_planes(1.0, 50.0);
        assert_eq!(camera.clip_planes(), (1.0, 50.0));
    }

    #[test]
    fn test_invalid_constructor_values_fall_back_to_defaults() {
        let camera = Camera::perspective(Vec3::new(0.0, 0.0, 5.0), 0.0, 0.0, 3.0, 3.0);
        assert_eq!(camera.clip_planes(), (DEFAULT_NEAR, DEFAULT_FAR));
        assert_relative_eq!(camera.aspect_ratio(), 1.0);
        assert_relative_eq!(camera.fov_y(), utils::deg_to_rad(DEFAULT_FOV_DEGREES));
        assert!(camera.view_projection_matrix().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_forward_points_at_target() {
        let mut camera = camera();
        assert_relative_eq!(camera.forward(), Vec3::new(0.0, 0.0, -1.0));
        camera.look_at(Vec3::new(0.0, 0.0, 10.0), Vec3::y());
        assert_relative_eq!(camera.forward(), Vec3::new(0.0, 0.0, 1.0));
    }
}
