//! Core type aliases and re-exports

pub use glam::{UVec3, Vec3};

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, crate::core::error::Error>;
