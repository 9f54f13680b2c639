//! Ray tracing kernel with linked intersection routines
//!
//! Routines are plain WGSL functions with the signature
//!
//! ```text
//! fn name(ray: Ray, primitive: PrimitiveRecord, t_min: f32, t_max: f32) -> IntersectionResult
//! ```
//!
//! [`link_kernel_source`] concatenates the shared prelude, every routine, a
//! generated `dispatch_intersection` that switches on a routine id, and the
//! kernel. The function table is a storage buffer of routine ids; the
//! geometry's table offset selects the entry its primitives use.

use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt::Write as _;

use wgpu::util::DeviceExt;

use crate::core::error::Error;
use crate::core::types::Result;
use crate::render::accel::AccelerationStructure;
use crate::render::buffer::{PrimitiveBuffers, UniformRing, UniformSlot};
use crate::render::context::capture_device_errors;
use crate::render::frame::DispatchSize;

use super::create_checked_shader_module;

pub const KERNEL_PRELUDE: &str = include_str!("../../../shaders/prelude.wgsl");
pub const RAY_TRACE_KERNEL: &str = include_str!("../../../shaders/ray_trace.wgsl");
pub const RAY_TRACE_ENTRY_POINT: &str = "rt_kernel";
pub const VOXEL_INTERSECTION: &str = "voxel_intersection";

/// Table value for an entry with no routine bound
pub const NO_FUNCTION: u32 = u32::MAX;

const DISPATCH_FUNCTION: &str = "dispatch_intersection";

/// Named WGSL intersection routine
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntersectionFunction {
    pub name: String,
    pub source: Cow<'static, str>,
}

impl IntersectionFunction {
    pub fn new(name: impl Into<String>, source: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }

    /// DDA walk through a volume's dense grid
    pub fn voxel() -> Self {
        Self::new(
            VOXEL_INTERSECTION,
            include_str!("../../../shaders/voxel_intersection.wgsl"),
        )
    }
}

/// Id of a linked routine, its position in the link order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FunctionHandle(pub u32);

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Build the final kernel module from the prelude, `functions` and `kernel`
pub fn link_kernel_source(kernel: &str, functions: &[IntersectionFunction]) -> Result<String> {
    let mut seen = HashSet::new();
    for function in functions {
        if !is_identifier(&function.name) || function.name == DISPATCH_FUNCTION {
            return Err(Error::Initialization(format!(
                "invalid intersection function name '{}'",
                function.name
            )));
        }
        if !seen.insert(function.name.as_str()) {
            return Err(Error::Initialization(format!(
                "intersection function '{}' linked twice",
                function.name
            )));
        }
        if !function.source.contains(&format!("fn {}(", function.name)) {
            return Err(Error::Initialization(format!(
                "intersection function '{}' not found in its source",
                function.name
            )));
        }
    }

    let mut source = String::with_capacity(
        KERNEL_PRELUDE.len() + kernel.len() + functions.iter().map(|f| f.source.len()).sum::<usize>() + 512,
    );
    source.push_str(KERNEL_PRELUDE);
    for function in functions {
        source.push('\n');
        source.push_str(&function.source);
    }

    // Writing to a String cannot fail
    let _ = writeln!(
        source,
        "\nfn {DISPATCH_FUNCTION}(routine: u32, ray: Ray, primitive: PrimitiveRecord, t_min: f32, t_max: f32) -> IntersectionResult {{"
    );
    let _ = writeln!(source, "    switch routine {{");
    for (id, function) in functions.iter().enumerate() {
        let _ = writeln!(
            source,
            "        case {id}u: {{\n            return {}(ray, primitive, t_min, t_max);\n        }}",
            function.name
        );
    }
    let _ = writeln!(source, "        default: {{}}\n    }}\n    return no_intersection();\n}}");

    source.push('\n');
    source.push_str(kernel);
    Ok(source)
}

/// CPU side of the function table: which routine each entry invokes
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntersectionFunctionTable {
    entries: Vec<Option<FunctionHandle>>,
}

impl IntersectionFunctionTable {
    pub fn new(size: usize) -> Self {
        Self {
            entries: vec![None; size],
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn set_function(&mut self, function: FunctionHandle, index: usize) -> Result<()> {
        let size = self.entries.len();
        let entry = self.entries.get_mut(index).ok_or_else(|| {
            Error::Initialization(format!("function table index {index} out of range (size {size})"))
        })?;
        *entry = Some(function);
        Ok(())
    }

    pub fn entry(&self, index: usize) -> Option<FunctionHandle> {
        self.entries.get(index).copied().flatten()
    }

    /// Buffer contents: routine id per entry, [`NO_FUNCTION`] when unbound
    pub fn encode(&self) -> Vec<u32> {
        self.entries
            .iter()
            .map(|entry| entry.map_or(NO_FUNCTION, |handle| handle.0))
            .collect()
    }
}

/// Kernel, routines and table size for [`IntersectionPipeline::new`]
#[derive(Clone, Debug)]
pub struct IntersectionPipelineDescriptor<'a> {
    pub label: &'a str,
    pub kernel_source: &'a str,
    pub entry_point: &'a str,
    pub linked_functions: Vec<IntersectionFunction>,
    pub function_table_size: usize,
}

impl IntersectionPipelineDescriptor<'static> {
    /// Primary ray kernel with the voxel routine and a single-entry table
    pub fn voxel() -> Self {
        Self {
            label: "ray_trace",
            kernel_source: RAY_TRACE_KERNEL,
            entry_point: RAY_TRACE_ENTRY_POINT,
            linked_functions: vec![IntersectionFunction::voxel()],
            function_table_size: 1,
        }
    }
}

/// Buffer identities the scene bind group was built from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SceneBindingKey {
    pub structure: u64,
    pub primitives: u64,
}

impl SceneBindingKey {
    pub fn new(structure: &AccelerationStructure, primitives: &PrimitiveBuffers) -> Self {
        Self {
            structure: structure.generation(),
            primitives: primitives.generation(),
        }
    }
}

/// Compiled ray tracing kernel, its function table and scene bindings
pub struct IntersectionPipeline {
    pipeline: wgpu::ComputePipeline,
    scene_layout: wgpu::BindGroupLayout,
    output_layout: wgpu::BindGroupLayout,
    linked: Vec<String>,
    function_table: IntersectionFunctionTable,
    function_table_buffer: wgpu::Buffer,
    scene_bind_group: Option<(SceneBindingKey, wgpu::BindGroup)>,
}

impl IntersectionPipeline {
    /// Link, compile and create the kernel; every table entry starts unbound
    pub fn new(
        device: &wgpu::Device,
        uniform_layout: &wgpu::BindGroupLayout,
        descriptor: &IntersectionPipelineDescriptor<'_>,
    ) -> Result<Self> {
        if descriptor.function_table_size == 0 {
            return Err(Error::Initialization("function table needs at least one entry".into()));
        }
        capture_device_errors(device, Error::Initialization, || {
            Self::create(device, uniform_layout, descriptor)
        })
    }

    fn create(
        device: &wgpu::Device,
        uniform_layout: &wgpu::BindGroupLayout,
        descriptor: &IntersectionPipelineDescriptor<'_>,
    ) -> Result<Self> {
        let source = link_kernel_source(descriptor.kernel_source, &descriptor.linked_functions)?;
        let shader = create_checked_shader_module(device, descriptor.label, source.into())?;

        let storage = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: true },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        // Structure, primitives, grid arena, function table
        let scene_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("ray_trace_scene_layout"),
            entries: &[storage(0), storage(1), storage(2), storage(3)],
        });

        let output_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("ray_trace_output_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::StorageTexture {
                    access: wgpu::StorageTextureAccess::WriteOnly,
                    format: wgpu::TextureFormat::Rgba8Unorm,
                    view_dimension: wgpu::TextureViewDimension::D2,
                },
                count: None,
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("ray_trace_pipeline_layout"),
            bind_group_layouts: &[uniform_layout, &scene_layout, &output_layout],
            immediate_size: 0,
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(descriptor.label),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some(descriptor.entry_point),
            compilation_options: Default::default(),
            cache: None,
        });

        let function_table = IntersectionFunctionTable::new(descriptor.function_table_size);
        // Zero would select the first linked routine, so unbound entries are written explicitly
        let function_table_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("intersection_function_table"),
            contents: bytemuck::cast_slice(&function_table.encode()),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        });

        log::info!(
            "Ray tracing pipeline created: {} routine(s), {} table entr{}",
            descriptor.linked_functions.len(),
            descriptor.function_table_size,
            if descriptor.function_table_size == 1 { "y" } else { "ies" }
        );

        Ok(Self {
            pipeline,
            scene_layout,
            output_layout,
            linked: descriptor
                .linked_functions
                .iter()
                .map(|f| f.name.clone())
                .collect(),
            function_table,
            function_table_buffer,
            scene_bind_group: None,
        })
    }

    /// Voxel kernel with table entry 0 bound to the voxel routine
    pub fn create_pipeline(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        uniform_layout: &wgpu::BindGroupLayout,
    ) -> Result<Self> {
        let mut pipeline = Self::new(device, uniform_layout, &IntersectionPipelineDescriptor::voxel())?;
        let voxel = pipeline.function_handle(VOXEL_INTERSECTION).ok_or_else(|| {
            Error::Initialization(format!("'{VOXEL_INTERSECTION}' missing from the linked routines"))
        })?;
        pipeline.set_function(queue, voxel, 0)?;
        Ok(pipeline)
    }

    /// Handle of a linked routine by name
    pub fn function_handle(&self, name: &str) -> Option<FunctionHandle> {
        self.linked
            .iter()
            .position(|linked| linked == name)
            .map(|index| FunctionHandle(index as u32))
    }

    /// Bind table entry `index` to `function` and upload the table
    pub fn set_function(&mut self, queue: &wgpu::Queue, function: FunctionHandle, index: usize) -> Result<()> {
        if function.0 as usize >= self.linked.len() {
            return Err(Error::Initialization(format!("unknown function handle {}", function.0)));
        }
        self.function_table.set_function(function, index)?;
        queue.write_buffer(
            &self.function_table_buffer,
            0,
            bytemuck::cast_slice(&self.function_table.encode()),
        );
        Ok(())
    }

    pub fn function_table(&self) -> &IntersectionFunctionTable {
        &self.function_table
    }

    /// Recreate the scene bind group if any bound buffer was replaced. Returns true if rebound.
    pub fn bind_scene(
        &mut self,
        device: &wgpu::Device,
        structure: &AccelerationStructure,
        primitives: &PrimitiveBuffers,
    ) -> bool {
        let key = SceneBindingKey::new(structure, primitives);
        if matches!(&self.scene_bind_group, Some((bound, _)) if *bound == key) {
            return false;
        }

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("ray_trace_scene_bind_group"),
            layout: &self.scene_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: structure.buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: primitives.primitive_buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: primitives.arena_buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: self.function_table_buffer.as_entire_binding(),
                },
            ],
        });

        log::debug!(
            "Scene rebound (structure generation {}, primitive generation {})",
            key.structure,
            key.primitives
        );
        self.scene_bind_group = Some((key, bind_group));
        true
    }

    /// Bind group writing into the output image
    pub fn create_output_bind_group(&self, device: &wgpu::Device, view: &wgpu::TextureView) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("ray_trace_output_bind_group"),
            layout: &self.output_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(view),
            }],
        })
    }

    /// Record the ray tracing dispatch over `size`
    pub fn dispatch(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        uniforms: &UniformRing,
        slot: UniformSlot,
        output: &wgpu::BindGroup,
        size: DispatchSize,
    ) -> Result<()> {
        let (_, scene) = self
            .scene_bind_group
            .as_ref()
            .ok_or_else(|| Error::Build("ray tracing dispatched before the scene was bound".into()))?;

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("ray_trace_pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, uniforms.bind_group(), &[slot.offset]);
        pass.set_bind_group(1, scene, &[]);
        pass.set_bind_group(2, output, &[]);
        pass.dispatch_workgroups(size.workgroups[0], size.workgroups[1], size.workgroups[2]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn routine(name: &str) -> IntersectionFunction {
        IntersectionFunction::new(
            name.to_string(),
            format!(
                "fn {name}(ray: Ray, primitive: PrimitiveRecord, t_min: f32, t_max: f32) -> IntersectionResult {{\n    return no_intersection();\n}}\n"
            ),
        )
    }

    #[test]
    fn test_link_orders_sections() {
        let source = link_kernel_source(RAY_TRACE_KERNEL, &[IntersectionFunction::voxel()]).unwrap();

        let prelude = source.find("struct PrimitiveRecord").unwrap();
        let routine = source.find("fn voxel_intersection(").unwrap();
        let dispatch = source.find("fn dispatch_intersection(").unwrap();
        let kernel = source.find("fn rt_kernel(").unwrap();
        assert!(prelude < routine && routine < dispatch && dispatch < kernel);
        assert!(source.contains("case 0u: {\n            return voxel_intersection(ray, primitive, t_min, t_max);"));
    }

    #[test]
    fn test_link_assigns_ids_in_order() {
        let source = link_kernel_source("", &[routine("first"), routine("second")]).unwrap();
        assert!(source.contains("case 0u: {\n            return first("));
        assert!(source.contains("case 1u: {\n            return second("));
        assert!(source.trim_end().ends_with("return no_intersection();\n}"));
    }

    #[test]
    fn test_link_rejects_duplicates() {
        let result = link_kernel_source("", &[routine("twice"), routine("twice")]);
        assert!(matches!(result, Err(Error::Initialization(_))));
    }

    #[test]
    fn test_link_rejects_missing_routine() {
        let function = IntersectionFunction::new("absent", "fn other() {}");
        assert!(matches!(
            link_kernel_source("", &[function]),
            Err(Error::Initialization(_))
        ));
    }

    #[test]
    fn test_link_rejects_bad_names() {
        for name in ["", "1st", "has space", "dispatch_intersection"] {
            let function = IntersectionFunction::new(name, format!("fn {name}("));
            assert!(link_kernel_source("", &[function]).is_err(), "{name:?} accepted");
        }
    }

    #[test]
    fn test_function_table() {
        let mut table = IntersectionFunctionTable::new(1);
        assert_eq!(table.encode(), vec![NO_FUNCTION]);

        table.set_function(FunctionHandle(0), 0).unwrap();
        assert_eq!(table.entry(0), Some(FunctionHandle(0)));
        assert_eq!(table.encode(), vec![0]);

        assert!(table.set_function(FunctionHandle(0), 1).is_err());
        assert_eq!(table.entry(1), None);
    }

    #[test]
    fn test_fresh_table_is_unbound() {
        let mut table = IntersectionFunctionTable::new(4);
        let bytes: Vec<u8> = bytemuck::cast_slice(&table.encode()).to_vec();
        assert_eq!(bytes.len(), 16);
        assert!(bytes.iter().all(|&b| b == 0xFF), "unbound entries must not read as routine 0");

        table.set_function(FunctionHandle(0), 2).unwrap();
        assert_eq!(table.encode(), vec![NO_FUNCTION, NO_FUNCTION, 0, NO_FUNCTION]);
    }

    #[test]
    fn test_voxel_descriptor() {
        let descriptor = IntersectionPipelineDescriptor::voxel();
        assert_eq!(descriptor.function_table_size, 1);
        assert_eq!(descriptor.linked_functions.len(), 1);
        assert_eq!(descriptor.linked_functions[0].name, VOXEL_INTERSECTION);
        assert!(descriptor.kernel_source.contains("@compute @workgroup_size(8, 8, 1)"));
    }
}
