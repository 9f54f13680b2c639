//! GPU storage buffers for volume primitives and the grid arena
//!
//! Every volume becomes one [`PrimitiveRecord`]: its bounding box followed by
//! its grid view. The same buffer feeds the acceleration structure build
//! (bounds) and the intersection routine (grid view). The arena is uploaded
//! verbatim next to it.

use bytemuck::{Pod, Zeroable};

use crate::core::error::Error;
use crate::core::types::Result;
use crate::math::Aabb;
use crate::render::context::capture_device_errors;
use crate::voxel::{GpuGridView, VoxelVolumeRegistry};

/// Bounding box packed as six floats (24 bytes, no vec3 padding)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuBoundingBox {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl From<&Aabb> for GpuBoundingBox {
    fn from(aabb: &Aabb) -> Self {
        Self {
            min: aabb.min.to_array(),
            max: aabb.max.to_array(),
        }
    }
}

/// One exported volume (40 bytes, matches `PrimitiveRecord` in prelude.wgsl)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PrimitiveRecord {
    pub bounding_box: GpuBoundingBox,
    pub grid_view: GpuGridView,
}

/// Byte stride between consecutive records
pub const PRIMITIVE_RECORD_STRIDE: u64 = std::mem::size_of::<PrimitiveRecord>() as u64;
/// Byte offset of the bounding box inside a record
pub const BOUNDING_BOX_OFFSET: u64 = std::mem::offset_of!(PrimitiveRecord, bounding_box) as u64;
/// Byte offset of the grid view inside a record
pub const GRID_VIEW_OFFSET: u64 = std::mem::offset_of!(PrimitiveRecord, grid_view) as u64;

/// One record per volume, in registry order
pub fn export_primitives(registry: &VoxelVolumeRegistry) -> Vec<PrimitiveRecord> {
    registry
        .volumes()
        .iter()
        .map(|volume| PrimitiveRecord {
            bounding_box: GpuBoundingBox::from(&volume.bounding_box),
            grid_view: GpuGridView::from(&volume.grid_view),
        })
        .collect()
}

/// The arena's contents, laid out exactly as the grid views address them
pub fn export_grid_arena(registry: &VoxelVolumeRegistry) -> &[i32] {
    registry.arena().as_slice()
}

/// Capacity a grow-only buffer needs for `needed` bytes
///
/// `None` when `capacity` already fits; `Error::Build` when `needed` exceeds
/// the device's `max` binding size.
pub fn grown_capacity(label: &str, capacity: u64, needed: u64, max: u64) -> Result<Option<u64>> {
    if needed <= capacity {
        return Ok(None);
    }
    if needed > max {
        return Err(Error::Build(format!(
            "{} needs {} bytes, device limit is {}",
            label, needed, max
        )));
    }
    Ok(Some(needed.next_power_of_two().max(StorageBuffer::MIN_SIZE).min(max)))
}

/// Grow-only storage buffer
struct StorageBuffer {
    label: &'static str,
    buffer: wgpu::Buffer,
    capacity: u64,
}

impl StorageBuffer {
    // wgpu rejects zero-sized storage bindings
    const MIN_SIZE: u64 = 64;

    /// Allocate `size` bytes; a device failure becomes `into_error`
    fn allocate(
        device: &wgpu::Device,
        label: &'static str,
        size: u64,
        into_error: fn(String) -> Error,
    ) -> Result<Self> {
        let capacity = size.max(Self::MIN_SIZE);
        let buffer = capture_device_errors(device, into_error, || {
            Ok(device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: capacity,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }))
        })?;
        Ok(Self {
            label,
            buffer,
            capacity,
        })
    }

    fn upload(&self, queue: &wgpu::Queue, bytes: &[u8]) {
        if !bytes.is_empty() {
            queue.write_buffer(&self.buffer, 0, bytes);
        }
    }
}

/// GPU copy of the registry: primitive records and grid arena
pub struct PrimitiveBuffers {
    primitives: StorageBuffer,
    arena: StorageBuffer,
    primitive_count: u32,
    /// Registry revision last uploaded, None before the first sync
    synced_revision: Option<u64>,
    synced_len: usize,
    /// Bumped whenever either buffer is replaced
    generation: u64,
}

impl PrimitiveBuffers {
    pub fn new(device: &wgpu::Device) -> Result<Self> {
        Ok(Self {
            primitives: StorageBuffer::allocate(
                device,
                "primitive_records",
                PRIMITIVE_RECORD_STRIDE,
                Error::Initialization,
            )?,
            arena: StorageBuffer::allocate(device, "grid_arena", 4, Error::Initialization)?,
            primitive_count: 0,
            synced_revision: None,
            synced_len: 0,
            generation: 0,
        })
    }

    /// Whether the registry changed since the last sync
    pub fn is_stale(&self, registry: &VoxelVolumeRegistry) -> bool {
        self.synced_revision != Some(registry.revision()) || self.synced_len != registry.len()
    }

    /// Upload the registry if it changed. Returns true if anything was written.
    ///
    /// Both capacities are checked against the device limit before either
    /// buffer is replaced.
    pub fn sync(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        registry: &VoxelVolumeRegistry,
    ) -> Result<bool> {
        if !self.is_stale(registry) {
            return Ok(false);
        }

        let records = export_primitives(registry);
        let primitive_count = u32::try_from(records.len())
            .map_err(|_| Error::Build(format!("{} primitives exceed u32", records.len())))?;
        let record_bytes: &[u8] = bytemuck::cast_slice(&records);
        let arena_bytes: &[u8] = bytemuck::cast_slice(export_grid_arena(registry));

        let limits = device.limits();
        let max = limits
            .max_buffer_size
            .min(u64::from(limits.max_storage_buffer_binding_size));
        let grow_primitives = grown_capacity(
            self.primitives.label,
            self.primitives.capacity,
            record_bytes.len() as u64,
            max,
        )?;
        let grow_arena = grown_capacity(self.arena.label, self.arena.capacity, arena_bytes.len() as u64, max)?;

        if let Some(capacity) = grow_primitives {
            self.primitives = StorageBuffer::allocate(device, self.primitives.label, capacity, Error::Build)?;
            self.generation += 1;
            log::debug!("Reallocated {}: {} KB", self.primitives.label, capacity / 1024);
        }
        if let Some(capacity) = grow_arena {
            self.arena = StorageBuffer::allocate(device, self.arena.label, capacity, Error::Build)?;
            self.generation += 1;
            log::debug!("Reallocated {}: {} KB", self.arena.label, capacity / 1024);
        }

        self.primitives.upload(queue, record_bytes);
        self.arena.upload(queue, arena_bytes);

        self.primitive_count = primitive_count;
        self.synced_revision = Some(registry.revision());
        self.synced_len = registry.len();

        log::trace!(
            "Synced {} primitives, {} voxels (generation {})",
            primitive_count,
            registry.arena().len(),
            self.generation
        );
        Ok(true)
    }

    pub fn primitive_count(&self) -> u32 {
        self.primitive_count
    }

    /// Identity of the current buffer pair, for bind group invalidation
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn primitive_buffer(&self) -> &wgpu::Buffer {
        &self.primitives.buffer
    }

    pub fn arena_buffer(&self) -> &wgpu::Buffer {
        &self.arena.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Vec3;

    #[test]
    fn test_record_layout() {
        // Must match WGSL struct layout
        assert_eq!(std::mem::size_of::<GpuBoundingBox>(), 24);
        assert_eq!(std::mem::size_of::<PrimitiveRecord>(), 40);
        assert_eq!(PRIMITIVE_RECORD_STRIDE, 40);
        assert_eq!(BOUNDING_BOX_OFFSET, 0);
        assert_eq!(GRID_VIEW_OFFSET, 24);
    }

    #[test]
    fn test_primitive_count_tracks_volumes() {
        let mut registry = VoxelVolumeRegistry::new();
        assert!(export_primitives(&registry).is_empty());

        registry.create_sphere_volume(Vec3::new(0.0, 0.0, -20.0), 7.0).unwrap();
        assert_eq!(export_primitives(&registry).len(), registry.len());

        registry
            .create_empty_volume(Vec3::new(-3.0, -3.0, -10.0), Vec3::new(2.0, 2.0, -5.0))
            .unwrap();
        assert_eq!(export_primitives(&registry).len(), 2);
    }

    #[test]
    fn test_records_follow_registry() {
        let mut registry = VoxelVolumeRegistry::new();
        registry.create_sphere_volume(Vec3::new(0.0, 0.0, -20.0), 7.0).unwrap();
        registry
            .create_empty_volume(Vec3::new(-3.0, -3.0, -10.0), Vec3::new(2.0, 2.0, -5.0))
            .unwrap();

        let records = export_primitives(&registry);
        assert_eq!(records[0].bounding_box.min, [-7.0, -7.0, -27.0]);
        assert_eq!(records[0].bounding_box.max, [7.0, 7.0, -13.0]);
        assert_eq!(records[0].grid_view.start_index, 0);
        assert_eq!(records[0].grid_view.x_extent, 14);

        // Second grid starts right after the sphere's 14^3 voxels
        assert_eq!(records[1].grid_view.start_index, 14 * 14 * 14);
        assert_eq!(records[1].grid_view.x_extent, 5);
        assert_eq!(export_grid_arena(&registry).len(), 14 * 14 * 14 + 125);
    }

    #[test]
    fn test_grown_capacity() {
        assert_eq!(grown_capacity("records", 64, 40, 1 << 20).unwrap(), None);
        assert_eq!(grown_capacity("records", 64, 65, 1 << 20).unwrap(), Some(128));
        assert_eq!(grown_capacity("records", 64, 3000, 4096).unwrap(), Some(4096));
        // Clamped to the limit rather than rounded past it
        assert_eq!(grown_capacity("records", 64, 5000, 6000).unwrap(), Some(6000));
    }

    #[test]
    fn test_grown_capacity_over_limit_is_build_error() {
        let result = grown_capacity("grid_arena", 64, 8193, 8192);
        assert!(matches!(result, Err(Error::Build(ref message)) if message.contains("grid_arena")));
        assert!(result.is_err_and(|e| e.is_frame_local()));
    }

    #[test]
    fn test_record_bytes_start_with_bounds() {
        let record = PrimitiveRecord {
            bounding_box: GpuBoundingBox {
                min: [1.0, 2.0, 3.0],
                max: [4.0, 5.0, 6.0],
            },
            grid_view: GpuGridView {
                start_index: 7,
                x_extent: 1,
                y_extent: 2,
                z_extent: 3,
            },
        };
        let words: &[u32] = bytemuck::cast_slice(std::slice::from_ref(&record));
        assert_eq!(f32::from_bits(words[0]), 1.0);
        assert_eq!(f32::from_bits(words[5]), 6.0);
        assert_eq!(words[6], 7);
        assert_eq!(words[9], 3);
    }
}
