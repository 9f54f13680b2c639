//! GPU context management using wgpu

use std::sync::Arc;
use winit::window::Window;
use crate::core::error::Error;

/// GPU rendering context
pub struct GpuContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub surface: wgpu::Surface<'static>,
    pub config: wgpu::SurfaceConfiguration,
}

impl GpuContext {
    /// Create new GPU context from window
    pub async fn new(window: Arc<Window>, vsync: bool) -> Result<Self, Error> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let surface = instance.create_surface(window.clone())
            .map_err(|e| Error::Initialization(format!("Surface creation failed: {}", e)))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| Error::Initialization(format!("No suitable adapter found: {:?}", e)))?;

        let adapter_limits = adapter.limits();

        let device_desc = wgpu::DeviceDescriptor {
            label: Some("voxray_device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits {
                // Arena and primitive buffers grow with the scene
                max_storage_buffer_binding_size: adapter_limits.max_storage_buffer_binding_size,
                max_buffer_size: adapter_limits.max_buffer_size,
                ..Default::default()
            },
            memory_hints: wgpu::MemoryHints::Performance,
            experimental_features: Default::default(),
            trace: Default::default(),
        };

        let (device, queue) = adapter
            .request_device(&device_desc)
            .await
            .map_err(|e| Error::Initialization(format!("Device request failed: {}", e)))?;

        log::info!("Adapter: {} ({:?})", adapter.get_info().name, adapter.get_info().backend);
        log::info!("GPU buffer limits: max_buffer_size={}MB, max_storage_binding={}MB",
            adapter_limits.max_buffer_size / 1024 / 1024,
            adapter_limits.max_storage_buffer_binding_size / 1024 / 1024);

        let size = window.inner_size();
        let capabilities = surface.get_capabilities(&adapter);
        // The output image is linear rgba8; prefer a surface that won't re-encode it
        let format = capabilities
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .or_else(|| capabilities.formats.first().copied())
            .ok_or_else(|| Error::Initialization("Surface reports no formats".into()))?;
        let alpha_mode = capabilities
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: if vsync {
                wgpu::PresentMode::AutoVsync
            } else {
                wgpu::PresentMode::AutoNoVsync
            },
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        surface.configure(&device, &config);

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            surface,
            config,
        })
    }

    /// Resize the surface
    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&self.device, &self.config);
        }
    }

    /// Get current surface texture for rendering
    ///
    /// A lost or outdated surface is reconfigured and acquired once more.
    pub fn get_current_texture(&self) -> Result<wgpu::SurfaceTexture, Error> {
        match self.surface.get_current_texture() {
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.reconfigure();
                self.surface.get_current_texture()
            }
            result => result,
        }
        .map_err(|e| Error::Gpu(e.to_string()))
    }

    /// Reconfigure the surface after it was lost or outdated
    pub fn reconfigure(&self) {
        self.surface.configure(&self.device, &self.config);
    }

    /// Get surface size
    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    /// Get surface format
    pub fn format(&self) -> wgpu::TextureFormat {
        self.config.format
    }
}

/// Run `create` with device validation and out-of-memory errors captured
///
/// Without an open error scope wgpu routes these to its uncaptured-error
/// handler, which panics. A captured error becomes `into_error(message)`; an
/// error returned by `create` itself wins over a captured one.
pub fn capture_device_errors<T>(
    device: &wgpu::Device,
    into_error: fn(String) -> Error,
    create: impl FnOnce() -> Result<T, Error>,
) -> Result<T, Error> {
    let out_of_memory = device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    let validation = device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = create();
    // Scopes pop in reverse push order
    let validation_error = pollster::block_on(validation.pop());
    let out_of_memory_error = pollster::block_on(out_of_memory.pop());
    resolve_captured(value, validation_error.or(out_of_memory_error), into_error)
}

fn resolve_captured<T>(
    value: Result<T, Error>,
    captured: Option<wgpu::Error>,
    into_error: fn(String) -> Error,
) -> Result<T, Error> {
    let value = value?;
    match captured {
        Some(e) => Err(into_error(e.to_string())),
        None => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validation_error(description: &str) -> wgpu::Error {
        wgpu::Error::Validation {
            source: "validation".into(),
            description: description.to_string(),
        }
    }

    #[test]
    fn test_captured_validation_error_becomes_initialization() {
        let result = resolve_captured(Ok(7), Some(validation_error("bad entry point")), Error::Initialization);
        match result {
            Err(Error::Initialization(message)) => assert_eq!(message, "bad entry point"),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_captured_out_of_memory_becomes_build() {
        let captured = wgpu::Error::OutOfMemory { source: "oom".into() };
        let result = resolve_captured(Ok(()), Some(captured), Error::Build);
        assert!(matches!(result, Err(Error::Build(_))));
        assert!(result.is_err_and(|e| e.is_frame_local()));
    }

    #[test]
    fn test_returned_error_wins() {
        let result: Result<(), Error> = resolve_captured(
            Err(Error::Initialization("shader 'x' failed to compile".into())),
            Some(validation_error("invalid module")),
            Error::Build,
        );
        match result {
            Err(Error::Initialization(message)) => assert!(message.contains("failed to compile")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_nothing_captured() {
        assert_eq!(resolve_captured(Ok(3), None, Error::Build).ok(), Some(3));
    }
}
