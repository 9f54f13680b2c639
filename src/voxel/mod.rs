//! Voxel volumes and the dense grid arena backing them

pub mod grid;
pub mod volume;
pub mod registry;
pub mod raycast;

pub use grid::{DenseGridArena, GridView, GpuGridView};
pub use volume::{VolumeId, VoxelVolume};
pub use registry::VoxelVolumeRegistry;
pub use raycast::VoxelHit;
