//! Compute and render pipelines

pub mod blit;
pub mod intersection;

use std::borrow::Cow;

use crate::core::error::Error;
use crate::core::types::Result;
use crate::render::context::capture_device_errors;

pub use blit::BlitPipeline;
pub use intersection::{
    link_kernel_source, FunctionHandle, IntersectionFunction, IntersectionFunctionTable, IntersectionPipeline,
    IntersectionPipelineDescriptor,
};

/// Create a WGSL module and fail with `Error::Initialization` if it doesn't compile
pub fn create_checked_shader_module(
    device: &wgpu::Device,
    label: &str,
    source: Cow<'_, str>,
) -> Result<wgpu::ShaderModule> {
    capture_device_errors(device, Error::Initialization, || {
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source),
        });

        let info = pollster::block_on(module.get_compilation_info());
        let mut errors = Vec::new();
        for message in &info.messages {
            let text = match &message.location {
                Some(location) => format!(
                    "{}:{}: {}",
                    location.line_number, location.line_position, message.message
                ),
                None => message.message.clone(),
            };
            match message.message_type {
                wgpu::CompilationMessageType::Error => errors.push(text),
                wgpu::CompilationMessageType::Warning => log::warn!("{}: {}", label, text),
                wgpu::CompilationMessageType::Info => log::debug!("{}: {}", label, text),
            }
        }

        if !errors.is_empty() {
            return Err(Error::Initialization(format!(
                "shader '{}' failed to compile: {}",
                label,
                errors.join("; ")
            )));
        }
        Ok(module)
    })
}
