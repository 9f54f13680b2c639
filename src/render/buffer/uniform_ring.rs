//! Per-frame uniform ring buffer
//!
//! One uniform buffer split into `MAX_FRAMES_IN_FLIGHT` slots, bound with a
//! dynamic offset. Frame `i` (the scheduler's index) writes slot `i mod N`;
//! since at most N frames are in flight, the slot being rewritten is no longer
//! read by the GPU.

use bytemuck::{Pod, Zeroable};

use crate::core::camera::Camera;
use crate::core::error::Error;
use crate::core::types::Result;
use crate::render::context::capture_device_errors;
use crate::render::frame::MAX_FRAMES_IN_FLIGHT;

/// Camera data for GPU (must match `Camera` in ray_trace.wgsl)
/// WGSL vec3 has 16-byte alignment; the trailing scalar fills the gap
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct CameraUniform {
    /// Camera position in world space (12 bytes, offset 0)
    pub position: [f32; 3],
    /// Vertical field of view in radians (4 bytes, offset 12)
    pub fov_y: f32,
    /// Normalized view direction (12 bytes, offset 16)
    pub direction: [f32; 3],
    /// Padding to 32 bytes (offset 28)
    pub _pad: f32,
}

impl CameraUniform {
    pub fn from_camera(camera: &Camera) -> Self {
        Self {
            position: camera.position.to_array(),
            fov_y: camera.fov_y,
            direction: camera.direction.to_array(),
            _pad: 0.0,
        }
    }
}

/// Per-frame uniforms (must match `Uniforms` in ray_trace.wgsl)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Uniforms {
    pub camera: CameraUniform,
    /// Output image size, the exact thread grid of the dispatch
    pub output_size: [u32; 2],
    pub _pad: [u32; 2],
}

impl Uniforms {
    pub fn new(camera: &Camera, width: u32, height: u32) -> Self {
        Self {
            camera: CameraUniform::from_camera(camera),
            output_size: [width, height],
            _pad: [0; 2],
        }
    }
}

/// Slot placement: frame `i` uses slot `i mod slots`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RingLayout {
    slots: usize,
    stride: u64,
}

impl RingLayout {
    pub fn new(slots: usize, stride: u64) -> Self {
        assert!(slots > 0, "ring needs at least one slot");
        Self { slots, stride }
    }

    /// Slot for the frame with scheduler index `frame_index`
    pub fn slot(&self, frame_index: u64) -> UniformSlot {
        let index = (frame_index % self.slots as u64) as usize;
        UniformSlot {
            index,
            offset: (index as u64 * self.stride) as u32,
        }
    }

    /// Total buffer size
    pub fn size(&self) -> u64 {
        self.stride * self.slots as u64
    }
}

/// Slot written for one frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UniformSlot {
    pub index: usize,
    /// Dynamic offset to bind the slot with
    pub offset: u32,
}

/// Round `value` up to a multiple of `alignment`
pub fn align_to(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

/// GPU ring of [`Uniforms`] slots
pub struct UniformRing {
    buffer: wgpu::Buffer,
    layout: RingLayout,
    bind_group_layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
}

impl UniformRing {
    /// Create a ring with `MAX_FRAMES_IN_FLIGHT` slots
    pub fn new(device: &wgpu::Device) -> Result<Self> {
        capture_device_errors(device, Error::Initialization, || Ok(Self::create(device)))
    }

    fn create(device: &wgpu::Device) -> Self {
        let uniform_size = std::mem::size_of::<Uniforms>() as u64;
        let alignment = device.limits().min_uniform_buffer_offset_alignment as u64;
        let layout = RingLayout::new(MAX_FRAMES_IN_FLIGHT, align_to(uniform_size, alignment));

        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("uniform_ring"),
            size: layout.size(),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("uniform_ring_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(uniform_size),
                },
                count: None,
            }],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("uniform_ring_bind_group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(uniform_size),
                }),
            }],
        });

        log::debug!(
            "Uniform ring: {} slots, {} bytes",
            MAX_FRAMES_IN_FLIGHT,
            layout.size()
        );

        Self {
            buffer,
            layout,
            bind_group_layout,
            bind_group,
        }
    }

    /// Write the uniforms of frame `frame_index` into its slot
    pub fn upload(&self, queue: &wgpu::Queue, frame_index: u64, uniforms: &Uniforms) -> UniformSlot {
        let slot = self.layout.slot(frame_index);
        queue.write_buffer(&self.buffer, u64::from(slot.offset), bytemuck::bytes_of(uniforms));
        slot
    }

    pub fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout
    }

    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Vec3;
    use crate::render::frame::FrameScheduler;

    #[test]
    fn test_uniform_sizes() {
        // Must match WGSL struct layout
        assert_eq!(std::mem::size_of::<CameraUniform>(), 32);
        assert_eq!(std::mem::size_of::<Uniforms>(), 48);
    }

    #[test]
    fn test_from_camera() {
        let camera = Camera::new(Vec3::new(1.0, 2.0, 3.0), Vec3::new(0.0, 0.0, -2.0), 90.0);
        let uniforms = Uniforms::new(&camera, 640, 360);

        assert_eq!(uniforms.camera.position, [1.0, 2.0, 3.0]);
        assert_eq!(uniforms.camera.direction, [0.0, 0.0, -1.0]);
        assert!((uniforms.camera.fov_y - std::f32::consts::FRAC_PI_2).abs() < 1e-6);
        assert_eq!(uniforms.output_size, [640, 360]);
    }

    #[test]
    fn test_ring_slots_cycle() {
        let n = MAX_FRAMES_IN_FLIGHT;
        let layout = RingLayout::new(n, 256);
        let visited: Vec<usize> = (0..2 * n as u64 + 1).map(|i| layout.slot(i).index).collect();

        let expected: Vec<usize> = (0..n).chain(0..n).chain(0..1).collect();
        assert_eq!(visited, expected);
        assert_eq!(layout.slot(1).offset, 256);
        assert_eq!(layout.size(), 256 * n as u64);
    }

    #[test]
    fn test_skipped_frames_keep_slots_aligned() {
        let layout = RingLayout::new(MAX_FRAMES_IN_FLIGHT, 256);
        let mut scheduler = FrameScheduler::new(MAX_FRAMES_IN_FLIGHT);
        let mut slots = Vec::new();

        for attempt in 0..8 {
            let frame = scheduler.begin_frame();
            let slot = layout.slot(frame.index());
            // Every third attempt fails after its slot was chosen and is dropped unsubmitted
            if attempt % 3 == 1 {
                drop(frame);
                continue;
            }
            let (submitted, completion) = scheduler.submit(frame);
            assert_eq!(slot.index as u64, submitted.index() % MAX_FRAMES_IN_FLIGHT as u64);
            slots.push(slot.index);
            completion.complete();
        }
        assert_eq!(slots, vec![0, 1, 2, 0, 1]);
    }

    #[test]
    fn test_align_to() {
        assert_eq!(align_to(48, 256), 256);
        assert_eq!(align_to(256, 256), 256);
        assert_eq!(align_to(257, 256), 512);
        assert_eq!(align_to(0, 256), 0);
    }
}
