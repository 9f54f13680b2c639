//! Scene description: camera and the volumes to create at startup

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::core::camera::Camera;

/// One volume to create
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VolumeDesc {
    /// All-empty grid over `min..max`
    Empty { min: Vec3, max: Vec3 },
    /// Solid sphere voxelized into a box of side `2 * radius`
    Sphere { center: Vec3, radius: f32 },
}

/// Initial camera, field of view in degrees
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub position: Vec3,
    pub direction: Vec3,
    pub fov_degrees: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 1.0),
            direction: Vec3::new(0.0, 0.0, -1.0),
            fov_degrees: 60.0,
        }
    }
}

impl CameraConfig {
    pub fn to_camera(&self) -> Camera {
        Camera::new(self.position, self.direction, self.fov_degrees)
    }
}

/// Configuration for a scene
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub camera: CameraConfig,
    pub volumes: Vec<VolumeDesc>,
}

impl Default for SceneConfig {
    /// One sphere of radius 7 twenty units in front of the camera
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            volumes: vec![VolumeDesc::Sphere {
                center: Vec3::new(0.0, 0.0, -20.0),
                radius: 7.0,
            }],
        }
    }
}
