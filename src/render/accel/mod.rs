//! Acceleration structure over procedural bounding-box primitives

pub mod builder;
pub mod descriptor;

pub use builder::{AccelerationStructure, AccelerationStructureBuilder, BuildParams};
pub use descriptor::{
    AccelerationStructureHeader, AccelerationStructureSizes, BoundingBoxGeometryDescriptor, GpuBvhNode,
};
