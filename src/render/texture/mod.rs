//! Render textures

pub mod output;

pub use output::{OutputExtent, OutputImage, OUTPUT_FORMAT};
