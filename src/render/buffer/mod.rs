//! GPU buffer management

pub mod primitive_buffer;
pub mod uniform_ring;

pub use primitive_buffer::{
    export_grid_arena, export_primitives, GpuBoundingBox, PrimitiveBuffers, PrimitiveRecord,
    PRIMITIVE_RECORD_STRIDE,
};
pub use uniform_ring::{CameraUniform, RingLayout, UniformRing, UniformSlot, Uniforms};
