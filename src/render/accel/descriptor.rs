//! Bounding-box geometry description and structure sizing

use bytemuck::{Pod, Zeroable};

use crate::core::error::Error;
use crate::core::types::Result;
use crate::render::buffer::primitive_buffer::{
    GpuBoundingBox, PrimitiveRecord, BOUNDING_BOX_OFFSET, PRIMITIVE_RECORD_STRIDE,
};

/// Structure header (16 bytes, matches `AccelHeader` in WGSL)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct AccelerationStructureHeader {
    pub node_count: u32,
    pub primitive_count: u32,
    /// Function table entry used by every primitive of the geometry
    pub intersection_function_table_offset: u32,
    pub _pad: u32,
}

/// BVH node (32 bytes, matches `BvhNode` in WGSL)
///
/// Interior nodes have `primitive_count == 0` and `left_first` is the index of
/// the left child; the right child follows it. Leaves hold one primitive and
/// `left_first` is its index in the primitive buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuBvhNode {
    pub min: [f32; 3],
    pub left_first: u32,
    pub max: [f32; 3],
    pub primitive_count: u32,
}

impl GpuBvhNode {
    pub fn is_leaf(&self) -> bool {
        self.primitive_count > 0
    }
}

pub const HEADER_SIZE: u64 = std::mem::size_of::<AccelerationStructureHeader>() as u64;
pub const NODE_SIZE: u64 = std::mem::size_of::<GpuBvhNode>() as u64;

/// Describes a stream of procedural bounding-box primitives
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBoxGeometryDescriptor {
    pub primitive_count: u32,
    pub bounding_box_stride: u64,
    pub bounding_box_offset: u64,
    pub primitive_data_stride: u64,
    pub primitive_data_offset: u64,
    pub primitive_data_element_size: u64,
    pub intersection_function_table_offset: u32,
}

impl BoundingBoxGeometryDescriptor {
    /// Geometry over `count` exported [`PrimitiveRecord`]s; the record is both
    /// the bounding box and the primitive data.
    pub fn for_primitive_records(count: u32) -> Self {
        Self {
            primitive_count: count,
            bounding_box_stride: PRIMITIVE_RECORD_STRIDE,
            bounding_box_offset: BOUNDING_BOX_OFFSET,
            primitive_data_stride: PRIMITIVE_RECORD_STRIDE,
            primitive_data_offset: BOUNDING_BOX_OFFSET,
            primitive_data_element_size: std::mem::size_of::<PrimitiveRecord>() as u64,
            intersection_function_table_offset: 0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let box_size = std::mem::size_of::<GpuBoundingBox>() as u64;

        if self.bounding_box_stride != self.primitive_data_stride {
            return Err(Error::Build(format!(
                "bounding box stride {} differs from primitive data stride {}",
                self.bounding_box_stride, self.primitive_data_stride
            )));
        }
        if self.bounding_box_offset != self.primitive_data_offset {
            return Err(Error::Build(format!(
                "bounding box offset {} differs from primitive data offset {}",
                self.bounding_box_offset, self.primitive_data_offset
            )));
        }
        // The build kernel reads records as u32 words
        if self.bounding_box_stride % 4 != 0 || self.bounding_box_offset % 4 != 0 {
            return Err(Error::Build(format!(
                "stride {} and offset {} must be 4-byte aligned",
                self.bounding_box_stride, self.bounding_box_offset
            )));
        }
        if self.bounding_box_offset + box_size > self.bounding_box_stride {
            return Err(Error::Build(format!(
                "bounding box at offset {} overruns stride {}",
                self.bounding_box_offset, self.bounding_box_stride
            )));
        }
        if self.primitive_data_offset + self.primitive_data_element_size > self.primitive_data_stride {
            return Err(Error::Build(format!(
                "primitive data element of {} bytes overruns stride {}",
                self.primitive_data_element_size, self.primitive_data_stride
            )));
        }
        Ok(())
    }
}

/// Buffer sizes needed to build a structure for one descriptor
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccelerationStructureSizes {
    pub structure_size: u64,
    pub build_scratch_size: u64,
}

impl AccelerationStructureSizes {
    /// Validate `descriptor` and compute its sizes
    pub fn query(descriptor: &BoundingBoxGeometryDescriptor) -> Result<Self> {
        descriptor.validate()?;
        let primitives = u64::from(descriptor.primitive_count);
        Ok(Self {
            structure_size: HEADER_SIZE + u64::from(node_count(descriptor.primitive_count).max(1)) * NODE_SIZE,
            build_scratch_size: primitives.max(1) * 4,
        })
    }
}

/// Nodes of a binary tree with one primitive per leaf
pub fn node_count(primitive_count: u32) -> u32 {
    primitive_count.saturating_mul(2).saturating_sub(1)
}
