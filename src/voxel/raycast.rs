//! CPU ray casting against voxel volumes
//!
//! Mirrors `voxel_intersection` in `shaders/voxel_intersection.wgsl`: clip the
//! ray to the voxel-covered part of a volume's box, then walk unit voxels with
//! a 3D DDA until a non-zero voxel is found. Used for picking and to check the
//! GPU routine against a reference.

use crate::core::types::{UVec3, Vec3};
use crate::math::Ray;
use crate::voxel::grid::DenseGridArena;
use crate::voxel::registry::VoxelVolumeRegistry;
use crate::voxel::volume::{VolumeId, VoxelVolume};

/// Nearest occupied voxel along a ray
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VoxelHit {
    pub volume: VolumeId,
    /// Voxel coordinates inside the volume's grid
    pub voxel: UVec3,
    /// Ray parameter at the entry point of the voxel
    pub t: f32,
    /// Normal of the entered face
    pub normal: Vec3,
    /// Stored voxel value
    pub value: i32,
}

impl VoxelVolumeRegistry {
    /// Nearest occupied voxel hit by `ray` in `[0, t_max]`
    pub fn raycast(&self, ray: &Ray, t_max: f32) -> Option<VoxelHit> {
        let mut nearest: Option<VoxelHit> = None;
        for volume in self.volumes() {
            let limit = nearest.map_or(t_max, |hit| hit.t);
            if let Some(hit) = intersect_volume(self.arena(), volume, ray, 0.0, limit) {
                nearest = Some(hit);
            }
        }
        nearest
    }
}

/// Walk one volume's grid between `t_min` and `t_max`
pub fn intersect_volume(
    arena: &DenseGridArena,
    volume: &VoxelVolume,
    ray: &Ray,
    t_min: f32,
    t_max: f32,
) -> Option<VoxelHit> {
    let view = volume.grid_view;
    if view.voxel_count() == 0 {
        return None;
    }
    let bounds = volume.grid_bounds();
    let (t_enter, t_exit) = ray.intersects_aabb(&bounds)?;
    let t_start = t_enter.max(t_min);
    let t_end = t_exit.min(t_max);
    if t_start > t_end {
        return None;
    }

    let extents = UVec3::from_array(view.extents());
    let local_origin = ray.origin - bounds.min;
    let entry = local_origin + ray.direction * t_start;
    let mut voxel = entry
        .floor()
        .clamp(Vec3::ZERO, (extents - UVec3::ONE).as_vec3())
        .as_uvec3();

    let step = ray.direction.signum();
    let t_delta = ray.inv_direction.abs();
    let boundary = voxel.as_vec3() + step.max(Vec3::ZERO);
    let mut t_next = Vec3::select(
        ray.direction.cmpeq(Vec3::ZERO),
        Vec3::INFINITY,
        (boundary - local_origin) * ray.inv_direction,
    );

    // Entry face: the slab that was crossed last
    let t_near_axes = {
        let t1 = (bounds.min - ray.origin) * ray.inv_direction;
        let t2 = (bounds.max - ray.origin) * ray.inv_direction;
        t1.min(t2)
    };
    let mut axis = max_axis(t_near_axes);
    let mut t = t_start;

    loop {
        let value = arena.grid(&view)[flat(voxel, extents)];
        if value != 0 {
            let mut normal = Vec3::ZERO;
            normal[axis] = -step[axis];
            return Some(VoxelHit {
                volume: volume.id,
                voxel,
                t,
                normal,
                value,
            });
        }

        axis = min_axis(t_next);
        t = t_next[axis];
        if t > t_end {
            return None;
        }
        if step[axis] > 0.0 {
            voxel[axis] += 1;
            if voxel[axis] >= extents[axis] {
                return None;
            }
        } else {
            if voxel[axis] == 0 {
                return None;
            }
            voxel[axis] -= 1;
        }
        t_next[axis] += t_delta[axis];
    }
}

fn flat(voxel: UVec3, extents: UVec3) -> usize {
    voxel.x as usize
        + voxel.y as usize * extents.x as usize
        + voxel.z as usize * extents.x as usize * extents.y as usize
}

fn min_axis(v: Vec3) -> usize {
    if v.x <= v.y && v.x <= v.z {
        0
    } else if v.y <= v.z {
        1
    } else {
        2
    }
}

fn max_axis(v: Vec3) -> usize {
    if v.x >= v.y && v.x >= v.z {
        0
    } else if v.y >= v.z {
        1
    } else {
        2
    }
}
