//! Dense grid arena
//!
//! One flat, append-only store of voxel values shared by every volume. Each
//! volume owns a [`GridView`]: an offset plus extents into the store. Views
//! are never reclaimed, so two views handed out by the same arena never
//! overlap. There are no guard cells between grids, which is why every access
//! goes through a bounds-checked [`DenseGridArena::index`].

use std::ops::Range;

use bytemuck::{Pod, Zeroable};

use crate::core::error::Error;
use crate::core::types::Result;

/// Largest arena the GPU side can address with a u32 start index
pub const MAX_ARENA_LEN: usize = u32::MAX as usize;

/// Window into the arena describing one x-major dense grid
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct GridView {
    pub start_index: usize,
    pub x_extent: u32,
    pub y_extent: u32,
    pub z_extent: u32,
}

impl GridView {
    /// Extents as an array
    pub fn extents(&self) -> [u32; 3] {
        [self.x_extent, self.y_extent, self.z_extent]
    }

    /// Number of voxels covered by the view
    pub fn voxel_count(&self) -> usize {
        self.x_extent as usize * self.y_extent as usize * self.z_extent as usize
    }

    /// Arena range covered by the view
    pub fn range(&self) -> Range<usize> {
        self.start_index..self.start_index + self.voxel_count()
    }

    /// Whether (x, y, z) lies inside the extents
    pub fn contains(&self, x: u32, y: u32, z: u32) -> bool {
        x < self.x_extent && y < self.y_extent && z < self.z_extent
    }

    /// Offset of (x, y, z) relative to `start_index`, without bounds checking
    fn local_offset(&self, x: u32, y: u32, z: u32) -> usize {
        let xe = self.x_extent as usize;
        let ye = self.y_extent as usize;
        x as usize + y as usize * xe + z as usize * xe * ye
    }
}

/// GPU mirror of [`GridView`] (16 bytes, matches `GridView` in WGSL)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct GpuGridView {
    pub start_index: u32,
    pub x_extent: u32,
    pub y_extent: u32,
    pub z_extent: u32,
}

impl From<&GridView> for GpuGridView {
    fn from(view: &GridView) -> Self {
        // Arena length is capped at MAX_ARENA_LEN, so start_index fits
        Self {
            start_index: view.start_index as u32,
            x_extent: view.x_extent,
            y_extent: view.y_extent,
            z_extent: view.z_extent,
        }
    }
}

/// Growable flat store of voxel values
#[derive(Clone, Debug, Default)]
pub struct DenseGridArena {
    values: Vec<i32>,
    /// Bumped on every mutation
    revision: u64,
}

impl DenseGridArena {
    /// Create an empty arena
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a grid of `x * y * z` voxels set to `initial_value`
    pub fn allocate(&mut self, x_extent: u32, y_extent: u32, z_extent: u32, initial_value: i32) -> Result<GridView> {
        let count = (x_extent as usize)
            .checked_mul(y_extent as usize)
            .and_then(|xy| xy.checked_mul(z_extent as usize))
            .filter(|count| self.values.len().saturating_add(*count) <= MAX_ARENA_LEN)
            .ok_or_else(|| Error::InvalidBounds(format!(
                "grid {}x{}x{} does not fit in an arena of {} voxels",
                x_extent, y_extent, z_extent, self.values.len()
            )))?;

        let view = GridView {
            start_index: self.values.len(),
            x_extent,
            y_extent,
            z_extent,
        };
        self.values.resize(self.values.len() + count, initial_value);
        self.revision += 1;

        log::trace!("Arena allocated {} voxels at {}", count, view.start_index);
        Ok(view)
    }

    /// Whether (x, y, z) is inside the view's extents
    pub fn in_bounds(&self, view: &GridView, x: u32, y: u32, z: u32) -> bool {
        view.contains(x, y, z)
    }

    /// Flat arena index of voxel (x, y, z) in `view`
    ///
    /// Fails with [`Error::OutOfBounds`] when any coordinate is outside its
    /// extent; the neighbouring grid would otherwise be read silently.
    pub fn index(&self, view: &GridView, x: u32, y: u32, z: u32) -> Result<usize> {
        if !view.contains(x, y, z) {
            return Err(Error::OutOfBounds { x, y, z, extents: view.extents() });
        }
        debug_assert!(view.range().end <= self.values.len(), "view not issued by this arena");
        Ok(view.start_index + view.local_offset(x, y, z))
    }

    /// Read voxel (x, y, z) of `view`
    pub fn read(&self, view: &GridView, x: u32, y: u32, z: u32) -> Result<i32> {
        let index = self.index(view, x, y, z)?;
        Ok(self.values[index])
    }

    /// Write voxel (x, y, z) of `view`
    pub fn write(&mut self, view: &GridView, x: u32, y: u32, z: u32, value: i32) -> Result<()> {
        let index = self.index(view, x, y, z)?;
        self.values[index] = value;
        self.revision += 1;
        Ok(())
    }

    /// All values of one grid, x-major
    pub fn grid(&self, view: &GridView) -> &[i32] {
        &self.values[view.range()]
    }

    /// Mutable values of one grid, x-major
    pub fn grid_mut(&mut self, view: &GridView) -> &mut [i32] {
        self.revision += 1;
        &mut self.values[view.range()]
    }

    /// Number of voxels stored
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The whole backing store
    pub fn as_slice(&self) -> &[i32] {
        &self.values
    }

    /// Mutation counter
    pub fn revision(&self) -> u64 {
        self.revision
    }
}
