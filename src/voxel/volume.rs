//! Voxel volume: a bounding box paired with a dense grid

use crate::core::types::Vec3;
use crate::math::Aabb;
use crate::voxel::grid::GridView;

/// Position of a volume in the registry's append-only sequence
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VolumeId(pub u32);

impl VolumeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for VolumeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "volume#{}", self.0)
    }
}

/// A bounded region of space with a unit-voxel occupancy grid anchored at `bounding_box.min`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VoxelVolume {
    pub id: VolumeId,
    pub bounding_box: Aabb,
    pub grid_view: GridView,
}

impl VoxelVolume {
    /// World-space center of voxel (x, y, z)
    pub fn voxel_center(&self, x: u32, y: u32, z: u32) -> Vec3 {
        self.bounding_box.min + Vec3::new(x as f32, y as f32, z as f32) + Vec3::splat(0.5)
    }

    /// Region actually covered by voxels
    ///
    /// Extents are truncated from the box size, so this can be smaller than
    /// the bounding box on axes with fractional size.
    pub fn grid_bounds(&self) -> Aabb {
        let extents = self.grid_view.extents();
        let size = Vec3::new(extents[0] as f32, extents[1] as f32, extents[2] as f32);
        Aabb::new(self.bounding_box.min, self.bounding_box.min + size)
    }

    /// Number of voxels in the grid
    pub fn voxel_count(&self) -> usize {
        self.grid_view.voxel_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volume(min: Vec3, max: Vec3, extents: [u32; 3]) -> VoxelVolume {
        VoxelVolume {
            id: VolumeId(0),
            bounding_box: Aabb::new(min, max),
            grid_view: GridView {
                start_index: 0,
                x_extent: extents[0],
                y_extent: extents[1],
                z_extent: extents[2],
            },
        }
    }

    #[test]
    fn test_voxel_center() {
        let v = volume(Vec3::new(-7.0, -7.0, -27.0), Vec3::new(7.0, 7.0, -13.0), [14, 14, 14]);
        assert_eq!(v.voxel_center(0, 0, 0), Vec3::new(-6.5, -6.5, -26.5));
        assert_eq!(v.voxel_center(13, 13, 13), Vec3::new(6.5, 6.5, -13.5));
    }

    #[test]
    fn test_grid_bounds_truncates() {
        let v = volume(Vec3::ZERO, Vec3::new(2.5, 3.0, 1.9), [2, 3, 1]);
        assert_eq!(v.grid_bounds(), Aabb::new(Vec3::ZERO, Vec3::new(2.0, 3.0, 1.0)));
        assert_eq!(v.voxel_count(), 6);
    }
}
