//! Rendering system and GPU interfaces

pub mod accel;
pub mod buffer;
pub mod context;
pub mod frame;
pub mod pipeline;
pub mod renderer;
pub mod texture;

pub use context::{capture_device_errors, GpuContext};
pub use renderer::{FrameOutcome, Renderer};
