//! Scene state: the volume registry and the camera looking at it

pub mod config;

pub use config::{CameraConfig, SceneConfig, VolumeDesc};

use crate::core::camera::Camera;
use crate::core::types::Result;
use crate::voxel::VoxelVolumeRegistry;

/// Everything a frame renders
///
/// Owned by the renderer and mutated only from the event-loop thread.
#[derive(Clone, Debug, Default)]
pub struct Scene {
    pub registry: VoxelVolumeRegistry,
    pub camera: Camera,
}

impl Scene {
    pub fn new(registry: VoxelVolumeRegistry, camera: Camera) -> Self {
        Self { registry, camera }
    }

    /// Create every configured volume in order
    pub fn from_config(config: &SceneConfig) -> Result<Self> {
        let mut registry = VoxelVolumeRegistry::new();
        for volume in &config.volumes {
            match *volume {
                VolumeDesc::Empty { min, max } => registry.create_empty_volume(min, max)?,
                VolumeDesc::Sphere { center, radius } => registry.create_sphere_volume(center, radius)?,
            };
        }
        log::info!(
            "Scene: {} volume(s), {} voxels",
            registry.len(),
            registry.arena().len()
        );
        Ok(Self::new(registry, config.camera.to_camera()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::Error;
    use glam::Vec3;

    #[test]
    fn test_default_scene() {
        let scene = Scene::from_config(&SceneConfig::default()).unwrap();
        assert_eq!(scene.registry.len(), 1);

        let sphere = &scene.registry.volumes()[0];
        assert_eq!(sphere.bounding_box.min, Vec3::new(-7.0, -7.0, -27.0));
        assert_eq!(sphere.bounding_box.max, Vec3::new(7.0, 7.0, -13.0));
        assert_eq!(scene.camera, Camera::default());
    }

    #[test]
    fn test_volumes_created_in_order() {
        let config = SceneConfig {
            volumes: vec![
                VolumeDesc::Empty {
                    min: Vec3::new(-3.0, -3.0, -10.0),
                    max: Vec3::new(2.0, 2.0, -5.0),
                },
                VolumeDesc::Sphere {
                    center: Vec3::new(10.0, 0.0, -20.0),
                    radius: 2.0,
                },
            ],
            ..Default::default()
        };
        let scene = Scene::from_config(&config).unwrap();

        assert_eq!(scene.registry.volumes()[0].grid_view.extents(), [5, 5, 5]);
        assert_eq!(scene.registry.volumes()[1].grid_view.extents(), [4, 4, 4]);
    }

    #[test]
    fn test_invalid_volume_fails_scene() {
        let config = SceneConfig {
            volumes: vec![VolumeDesc::Empty {
                min: Vec3::ONE,
                max: Vec3::ZERO,
            }],
            ..Default::default()
        };
        assert!(matches!(Scene::from_config(&config), Err(Error::InvalidBounds(_))));
    }
}
