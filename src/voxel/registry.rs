//! Voxel volume registry
//!
//! Owns every volume in the scene together with the grid arena backing them.
//! Volumes are append-only: ids are positions in the sequence and are never
//! reused, so there is no removal.

use rayon::prelude::*;

use crate::core::error::Error;
use crate::core::types::{Result, Vec3};
use crate::math::Aabb;
use crate::voxel::grid::DenseGridArena;
use crate::voxel::volume::{VolumeId, VoxelVolume};

/// Owned set of voxel volumes
#[derive(Clone, Debug, Default)]
pub struct VoxelVolumeRegistry {
    arena: DenseGridArena,
    volumes: Vec<VoxelVolume>,
}

impl VoxelVolumeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a zero-filled volume spanning `min..max`
    ///
    /// Grid extents are `floor(max - min)` per axis, so fractional sizes
    /// truncate. Rejects non-finite corners and `min > max` on any axis.
    pub fn create_empty_volume(&mut self, min: Vec3, max: Vec3) -> Result<VolumeId> {
        let bounding_box = Aabb::new(min, max);
        if !bounding_box.is_valid() {
            return Err(Error::InvalidBounds(format!("min {} max {}", min, max)));
        }

        let size = bounding_box.size().floor();
        if size.max_element() > u32::MAX as f32 {
            return Err(Error::InvalidBounds(format!("volume size {} too large", size)));
        }
        let grid_view = self.arena.allocate(size.x as u32, size.y as u32, size.z as u32, 0)?;

        let id = VolumeId(self.volumes.len() as u32);
        self.volumes.push(VoxelVolume {
            id,
            bounding_box,
            grid_view,
        });

        log::debug!(
            "Created {} over {} .. {} ({}x{}x{} voxels)",
            id, min, max, grid_view.x_extent, grid_view.y_extent, grid_view.z_extent
        );
        Ok(id)
    }

    /// Add a volume and set every voxel to `occupancy(voxel_center)`
    ///
    /// Exhaustive over all voxels; z-slices are filled in parallel.
    pub fn create_volume_with<F>(&mut self, min: Vec3, max: Vec3, occupancy: F) -> Result<VolumeId>
    where
        F: Fn(Vec3) -> i32 + Sync,
    {
        let id = self.create_empty_volume(min, max)?;
        let volume = self.volumes[id.index()];
        let view = volume.grid_view;

        let slice_len = view.x_extent as usize * view.y_extent as usize;
        if slice_len == 0 || view.z_extent == 0 {
            return Ok(id);
        }

        self.arena
            .grid_mut(&view)
            .par_chunks_mut(slice_len)
            .enumerate()
            .for_each(|(z, slice)| {
                for y in 0..view.y_extent {
                    for x in 0..view.x_extent {
                        let offset = x as usize + y as usize * view.x_extent as usize;
                        slice[offset] = occupancy(volume.voxel_center(x, y, z as u32));
                    }
                }
            });

        Ok(id)
    }

    /// Add a volume holding a voxelized sphere
    ///
    /// The box is `center ± radius`; a voxel is occupied (1) when its center
    /// lies within `radius` of `center`, otherwise 0.
    pub fn create_sphere_volume(&mut self, center: Vec3, radius: f32) -> Result<VolumeId> {
        if !(radius.is_finite() && radius >= 0.0) {
            return Err(Error::InvalidBounds(format!("sphere radius {}", radius)));
        }
        let bounds = Aabb::from_center_half_extent(center, Vec3::splat(radius));
        self.create_volume_with(bounds.min, bounds.max, |p| {
            i32::from(p.distance(center) <= radius)
        })
    }

    /// Look up a volume
    pub fn volume(&self, id: VolumeId) -> Result<&VoxelVolume> {
        self.volumes.get(id.index()).ok_or(Error::UnknownVolume(id.0))
    }

    /// Volumes in id order
    pub fn volumes(&self) -> &[VoxelVolume] {
        &self.volumes
    }

    /// Read voxel (x, y, z) of a volume
    pub fn read_voxel(&self, id: VolumeId, x: u32, y: u32, z: u32) -> Result<i32> {
        let view = self.volume(id)?.grid_view;
        self.arena.read(&view, x, y, z)
    }

    /// Write voxel (x, y, z) of a volume
    pub fn write_voxel(&mut self, id: VolumeId, x: u32, y: u32, z: u32, value: i32) -> Result<()> {
        let view = self.volume(id)?.grid_view;
        self.arena.write(&view, x, y, z, value)
    }

    /// The backing grid arena
    pub fn arena(&self) -> &DenseGridArena {
        &self.arena
    }

    /// Number of volumes
    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }

    /// Changes whenever a volume is added or a voxel is written
    pub fn revision(&self) -> u64 {
        self.arena.revision()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_volume_extents_and_contents() {
        let mut registry = VoxelVolumeRegistry::new();
        let id = registry
            .create_empty_volume(Vec3::new(-3.0, -3.0, -10.0), Vec3::new(2.0, 2.0, -5.0))
            .unwrap();

        let volume = registry.volume(id).unwrap();
        assert_eq!(volume.grid_view.extents(), [5, 5, 5]);

        for z in 0..5 {
            for y in 0..5 {
                for x in 0..5 {
                    assert_eq!(registry.read_voxel(id, x, y, z).unwrap(), 0);
                }
            }
        }
    }

    #[test]
    fn test_fractional_extents_truncate() {
        let mut registry = VoxelVolumeRegistry::new();
        let id = registry
            .create_empty_volume(Vec3::ZERO, Vec3::new(2.9, 1.0, 0.5))
            .unwrap();
        assert_eq!(registry.volume(id).unwrap().grid_view.extents(), [2, 1, 0]);
        assert_eq!(registry.arena().len(), 0);
    }

    #[test]
    fn test_sphere_volume() {
        let mut registry = VoxelVolumeRegistry::new();
        let center = Vec3::new(0.0, 0.0, -20.0);
        let id = registry.create_sphere_volume(center, 7.0).unwrap();
        let volume = *registry.volume(id).unwrap();

        assert_eq!(volume.bounding_box.min, Vec3::new(-7.0, -7.0, -27.0));
        assert_eq!(volume.bounding_box.max, Vec3::new(7.0, 7.0, -13.0));
        assert_eq!(volume.voxel_count(), 14 * 14 * 14);

        // Voxel (6, 6, 6) has center (-0.5, -0.5, -20.5), nearest to the sphere center
        assert_eq!(registry.read_voxel(id, 6, 6, 6).unwrap(), 1);
        // Corner voxel center is ~11.26 away
        assert_eq!(registry.read_voxel(id, 0, 0, 0).unwrap(), 0);
    }

    #[test]
    fn test_sphere_fill_matches_distance() {
        let mut registry = VoxelVolumeRegistry::new();
        let center = Vec3::new(1.0, 2.0, 3.0);
        let radius = 4.0;
        let id = registry.create_sphere_volume(center, radius).unwrap();
        let volume = *registry.volume(id).unwrap();

        let mut occupied = 0;
        for z in 0..8 {
            for y in 0..8 {
                for x in 0..8 {
                    let inside = volume.voxel_center(x, y, z).distance(center) <= radius;
                    let value = registry.read_voxel(id, x, y, z).unwrap();
                    assert_eq!(value, i32::from(inside));
                    occupied += value;
                }
            }
        }
        // Between the inscribed cube and the bounding cube
        assert!(occupied > 100 && occupied < 512);
    }

    #[test]
    fn test_ids_are_sequential() {
        let mut registry = VoxelVolumeRegistry::new();
        let a = registry.create_empty_volume(Vec3::ZERO, Vec3::ONE).unwrap();
        let b = registry.create_sphere_volume(Vec3::splat(10.0), 2.0).unwrap();
        let c = registry.create_empty_volume(Vec3::ZERO, Vec3::splat(3.0)).unwrap();
        assert_eq!((a, b, c), (VolumeId(0), VolumeId(1), VolumeId(2)));
        assert_eq!(registry.len(), 3);
        for (i, volume) in registry.volumes().iter().enumerate() {
            assert_eq!(volume.id.index(), i);
        }
    }

    #[test]
    fn test_invalid_bounds_rejected() {
        let mut registry = VoxelVolumeRegistry::new();
        assert!(matches!(
            registry.create_empty_volume(Vec3::ONE, Vec3::ZERO),
            Err(Error::InvalidBounds(_))
        ));
        assert!(matches!(
            registry.create_sphere_volume(Vec3::ZERO, -1.0),
            Err(Error::InvalidBounds(_))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_write_voxel_bumps_revision() {
        let mut registry = VoxelVolumeRegistry::new();
        let id = registry.create_empty_volume(Vec3::ZERO, Vec3::splat(2.0)).unwrap();
        let before = registry.revision();

        registry.write_voxel(id, 1, 1, 1, 1).unwrap();
        assert_eq!(registry.read_voxel(id, 1, 1, 1).unwrap(), 1);
        assert!(registry.revision() > before);

        assert!(matches!(registry.write_voxel(id, 2, 0, 0, 1), Err(Error::OutOfBounds { .. })));
        assert!(matches!(registry.read_voxel(VolumeId(7), 0, 0, 0), Err(Error::UnknownVolume(7))));
    }
}
