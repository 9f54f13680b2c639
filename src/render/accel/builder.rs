//! GPU build of the acceleration structure
//!
//! A single-invocation compute pass turns the primitive stream into a BVH:
//! top-down median split on the longest centroid axis, one primitive per
//! leaf. The structure buffer is long-lived and rebuilt in place every frame;
//! the scratch permutation is allocated per build and released once the
//! command buffer retires.

use bytemuck::{Pod, Zeroable};

use crate::core::error::Error;
use crate::core::types::Result;
use crate::render::context::capture_device_errors;
use crate::render::pipeline::create_checked_shader_module;

use super::descriptor::{AccelerationStructureSizes, BoundingBoxGeometryDescriptor};

/// Build kernel parameters (16 bytes, matches `BuildParams` in accel_build.wgsl)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct BuildParams {
    pub primitive_count: u32,
    pub record_stride_words: u32,
    pub bounding_box_offset_words: u32,
    pub intersection_function_table_offset: u32,
}

impl BuildParams {
    pub fn from_descriptor(descriptor: &BoundingBoxGeometryDescriptor) -> Self {
        Self {
            primitive_count: descriptor.primitive_count,
            record_stride_words: (descriptor.bounding_box_stride / 4) as u32,
            bounding_box_offset_words: (descriptor.bounding_box_offset / 4) as u32,
            intersection_function_table_offset: descriptor.intersection_function_table_offset,
        }
    }
}

/// Persistent structure buffer plus the geometry it was last prepared for
pub struct AccelerationStructure {
    buffer: wgpu::Buffer,
    capacity: u64,
    descriptor: BoundingBoxGeometryDescriptor,
    sizes: AccelerationStructureSizes,
    /// Bumped on every reallocation
    generation: u64,
}

impl AccelerationStructure {
    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn descriptor(&self) -> &BoundingBoxGeometryDescriptor {
        &self.descriptor
    }

    pub fn sizes(&self) -> AccelerationStructureSizes {
        self.sizes
    }

    /// Identity of the structure buffer, for bind group invalidation
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Owns the build kernel and the structure it rebuilds
pub struct AccelerationStructureBuilder {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    params_buffer: wgpu::Buffer,
    structure: Option<AccelerationStructure>,
    generation: u64,
}

impl AccelerationStructureBuilder {
    pub fn new(device: &wgpu::Device) -> Result<Self> {
        capture_device_errors(device, Error::Initialization, || Self::create(device))
    }

    fn create(device: &wgpu::Device) -> Result<Self> {
        let shader = create_checked_shader_module(
            device,
            "accel_build_shader",
            include_str!("../../../shaders/accel_build.wgsl").into(),
        )?;

        let storage = |binding, read_only| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("accel_build_layout"),
            entries: &[
                // Build params
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // Primitive records
                storage(1, true),
                // Structure
                storage(2, false),
                // Scratch permutation
                storage(3, false),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("accel_build_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("accel_build_pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("build_main"),
            compilation_options: Default::default(),
            cache: None,
        });

        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("accel_build_params"),
            size: std::mem::size_of::<BuildParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Ok(Self {
            pipeline,
            bind_group_layout,
            params_buffer,
            structure: None,
            generation: 0,
        })
    }

    /// Size the structure for `descriptor`, reusing the current buffer when it is large enough
    pub fn prepare(
        &mut self,
        device: &wgpu::Device,
        descriptor: &BoundingBoxGeometryDescriptor,
    ) -> Result<&AccelerationStructure> {
        let sizes = AccelerationStructureSizes::query(descriptor)?;

        let limits = device.limits();
        let max = limits
            .max_buffer_size
            .min(u64::from(limits.max_storage_buffer_binding_size));
        if sizes.structure_size > max || sizes.build_scratch_size > max {
            return Err(Error::Build(format!(
                "structure for {} primitives needs {} bytes, device limit is {}",
                descriptor.primitive_count, sizes.structure_size, max
            )));
        }

        let reuse = self
            .structure
            .as_ref()
            .is_some_and(|s| s.capacity >= sizes.structure_size);

        let structure = if reuse {
            let structure = self
                .structure
                .as_mut()
                .ok_or_else(|| Error::Build("no structure to reuse".into()))?;
            structure.descriptor = *descriptor;
            structure.sizes = sizes;
            structure
        } else {
            // Grow geometrically so adding volumes one at a time doesn't reallocate every frame
            let capacity = sizes
                .structure_size
                .max(self.structure.as_ref().map_or(0, |s| s.capacity * 2))
                .min(max);
            let buffer = capture_device_errors(device, Error::Build, || {
                Ok(device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("acceleration_structure"),
                    size: capacity,
                    usage: wgpu::BufferUsages::STORAGE,
                    mapped_at_creation: false,
                }))
            })?;
            self.generation += 1;
            log::debug!(
                "Allocated acceleration structure: {} bytes for {} primitives",
                capacity,
                descriptor.primitive_count
            );
            self.structure.insert(AccelerationStructure {
                buffer,
                capacity,
                descriptor: *descriptor,
                sizes,
                generation: self.generation,
            })
        };

        Ok(structure)
    }

    /// Structure from the last successful [`prepare`](Self::prepare)
    pub fn structure(&self) -> Option<&AccelerationStructure> {
        self.structure.as_ref()
    }

    /// Record the build pass over `primitives` into `encoder`
    pub fn encode_build(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        primitives: &wgpu::Buffer,
    ) -> Result<()> {
        let structure = self
            .structure
            .as_ref()
            .ok_or_else(|| Error::Build("encode_build called before prepare".into()))?;

        let params = BuildParams::from_descriptor(&structure.descriptor);
        queue.write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&params));

        let scratch = capture_device_errors(device, Error::Build, || {
            Ok(device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("accel_build_scratch"),
                size: structure.sizes.build_scratch_size,
                usage: wgpu::BufferUsages::STORAGE,
                mapped_at_creation: false,
            }))
        })?;

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("accel_build_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: primitives.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: structure.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: scratch.as_entire_binding(),
                },
            ],
        });

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("accel_build_pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(1, 1, 1);

        Ok(())
    }
}
