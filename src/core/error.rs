//! Error types for the voxray renderer

use thiserror::Error;

/// Main error type for the renderer
#[derive(Debug, Error)]
pub enum Error {
    /// Device, queue, kernel or pipeline creation failed. Fatal for the renderer.
    #[error("Initialization failed: {0}")]
    Initialization(String),

    /// Acceleration structure sizing or allocation failed. Fatal for one frame only.
    #[error("Acceleration structure build failed: {0}")]
    Build(String),

    #[error("Grid index ({x}, {y}, {z}) out of bounds for extents {extents:?}")]
    OutOfBounds {
        x: u32,
        y: u32,
        z: u32,
        extents: [u32; 3],
    },

    #[error("Invalid volume bounds: {0}")]
    InvalidBounds(String),

    #[error("Unknown volume id {0}")]
    UnknownVolume(u32),

    #[error("GPU error: {0}")]
    Gpu(String),

    #[error("Window error: {0}")]
    Window(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),
}

impl Error {
    /// Whether the error only invalidates the current frame
    pub fn is_frame_local(&self) -> bool {
        matches!(self, Error::Build(_))
    }
}
