//! Pinhole camera used for primary ray generation

use serde::{Deserialize, Serialize};

use crate::core::types::Vec3;
use crate::math::Ray;

/// Camera with a position, a view direction and a vertical field of view
///
/// Written by the input collaborator and read once per frame during uniform
/// upload. Both happen on the event-loop thread.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    /// World position
    pub position: Vec3,
    /// Normalized view direction
    pub direction: Vec3,
    /// Vertical field of view in radians
    pub fov_y: f32,
}

impl Camera {
    /// Create a new camera; `direction` is normalized
    pub fn new(position: Vec3, direction: Vec3, fov_y_degrees: f32) -> Self {
        Self {
            position,
            direction: direction.normalize_or(-Vec3::Z),
            fov_y: fov_y_degrees.to_radians(),
        }
    }

    /// Point the camera along a new direction
    pub fn set_direction(&mut self, direction: Vec3) {
        self.direction = direction.normalize_or(self.direction);
    }

    /// Orthonormal (right, up, forward) basis
    ///
    /// Must stay in sync with `camera_basis` in `shaders/ray_trace.wgsl`.
    pub fn basis(&self) -> (Vec3, Vec3, Vec3) {
        let forward = self.direction.normalize_or(-Vec3::Z);
        let world_up = if forward.cross(Vec3::Y).length_squared() < 1e-6 {
            Vec3::Z
        } else {
            Vec3::Y
        };
        let right = forward.cross(world_up).normalize();
        let up = right.cross(forward);
        (right, up, forward)
    }

    /// Primary ray through the center of pixel (x, y) of a width x height image
    pub fn primary_ray(&self, x: u32, y: u32, width: u32, height: u32) -> Ray {
        let (right, up, forward) = self.basis();
        let width = width.max(1) as f32;
        let height = height.max(1) as f32;
        let aspect = width / height;
        let tan_half = (self.fov_y * 0.5).tan();

        let ndc_x = ((x as f32 + 0.5) / width) * 2.0 - 1.0;
        let ndc_y = 1.0 - ((y as f32 + 0.5) / height) * 2.0;

        let direction = (forward
            + right * (ndc_x * tan_half * aspect)
            + up * (ndc_y * tan_half))
            .normalize();
        Ray::new(self.position, direction)
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 0.0, 1.0), Vec3::new(0.0, 0.0, -1.0), 60.0)
    }
}
