//! voxray - GPU ray tracing of dense voxel volumes
//!
//! Volumes live in a [`voxel::VoxelVolumeRegistry`] backed by one shared
//! grid arena. Every frame the registry is exported to GPU buffers, a BVH is
//! built over the volumes' bounding boxes, and a compute kernel traces one
//! primary ray per pixel, calling the voxel intersection routine for each
//! candidate volume.

pub mod config;
pub mod core;
pub mod math;
pub mod render;
pub mod scene;
pub mod voxel;
