//! Ray traced output image

use crate::core::error::Error;
use crate::core::types::Result;
use crate::render::context::capture_device_errors;
use crate::render::frame::DispatchSize;

/// Format written by the ray tracing kernel (`rgba8unorm` storage texture)
pub const OUTPUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Size of the output image, never zero on either axis
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutputExtent {
    pub width: u32,
    pub height: u32,
}

impl OutputExtent {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }

    /// Extent to reallocate to for a new drawable size
    ///
    /// `None` for a zero size (minimized window) or an unchanged one.
    pub fn resized(self, width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 || (width == self.width && height == self.height) {
            return None;
        }
        Some(Self { width, height })
    }

    /// One kernel thread per pixel
    pub fn dispatch_size(self) -> DispatchSize {
        DispatchSize::for_output(self.width, self.height)
    }
}

/// Storage texture the kernel writes and the blit pass samples
pub struct OutputImage {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    extent: OutputExtent,
}

impl OutputImage {
    pub fn new(device: &wgpu::Device, extent: OutputExtent) -> Result<Self> {
        let texture = capture_device_errors(device, Error::Initialization, || {
            Ok(device.create_texture(&wgpu::TextureDescriptor {
                label: Some("ray_trace_output"),
                size: wgpu::Extent3d {
                    width: extent.width,
                    height: extent.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: OUTPUT_FORMAT,
                usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            }))
        })?;
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(Self { texture, view, extent })
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn extent(&self) -> OutputExtent {
        self.extent
    }

    pub fn width(&self) -> u32 {
        self.extent.width
    }

    pub fn height(&self) -> u32 {
        self.extent.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::frame::WORKGROUP_SIZE;

    #[test]
    fn test_new_clamps_zero() {
        assert_eq!(OutputExtent::new(0, 0), OutputExtent { width: 1, height: 1 });
    }

    #[test]
    fn test_resize_ignores_zero_and_unchanged() {
        let extent = OutputExtent::new(800, 600);
        assert_eq!(extent.resized(0, 600), None);
        assert_eq!(extent.resized(800, 0), None);
        assert_eq!(extent.resized(800, 600), None);
        assert_eq!(extent.resized(801, 600), Some(OutputExtent::new(801, 600)));
    }

    #[test]
    fn test_dispatch_follows_resize() {
        let extent = OutputExtent::new(800, 600);
        assert_eq!(extent.dispatch_size().grid, [800, 600, 1]);

        let resized = extent.resized(1023, 17).unwrap();
        let dispatch = resized.dispatch_size();
        assert_eq!(dispatch.grid, [1023, 17, 1]);
        assert_eq!(dispatch.workgroups, [128, 3, 1]);
        // Workgroups cover the grid with less than one group of overhang
        for axis in 0..2 {
            let covered = dispatch.workgroups[axis] * WORKGROUP_SIZE[axis];
            assert!(covered >= dispatch.grid[axis]);
            assert!(covered - dispatch.grid[axis] < WORKGROUP_SIZE[axis]);
        }
    }
}
