//! Frame loop: export, build, trace, present
//!
//! Each frame waits for an in-flight slot before the caller acquires a
//! surface texture, brings the GPU copy of the scene up to date, then records
//! the acceleration structure build, the ray tracing dispatch and the blit
//! onto the surface into one command encoder. The queue's work-done callback
//! releases the slot.

use std::collections::VecDeque;

use crate::core::types::Result;
use crate::render::accel::{AccelerationStructureBuilder, BoundingBoxGeometryDescriptor};
use crate::render::buffer::{PrimitiveBuffers, UniformRing, Uniforms};
use crate::render::frame::{DispatchSize, Frame, FrameScheduler, MAX_FRAMES_IN_FLIGHT};
use crate::render::pipeline::{BlitPipeline, IntersectionPipeline};
use crate::render::texture::{OutputExtent, OutputImage};
use crate::scene::Scene;

/// What happened to one call of [`Renderer::render`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Work was handed to the queue
    Submitted { frame_index: u64, slot: usize },
    /// Nothing was submitted this frame; the next one retries
    Skipped(String),
}

/// Owns every GPU resource needed to ray trace a [`Scene`]
pub struct Renderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    scene: Scene,
    scheduler: FrameScheduler,
    uniforms: UniformRing,
    primitives: PrimitiveBuffers,
    builder: AccelerationStructureBuilder,
    intersection: IntersectionPipeline,
    blit: BlitPipeline,
    output: OutputImage,
    output_bind_group: wgpu::BindGroup,
    blit_bind_group: wgpu::BindGroup,
    /// Recent submissions, oldest first; polled while waiting for a slot
    submissions: VecDeque<wgpu::SubmissionIndex>,
}

impl Renderer {
    /// Create every pipeline and buffer; fails with `Error::Initialization`
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        surface_format: wgpu::TextureFormat,
        width: u32,
        height: u32,
        scene: Scene,
    ) -> Result<Self> {
        let uniforms = UniformRing::new(device)?;
        let builder = AccelerationStructureBuilder::new(device)?;
        let intersection = IntersectionPipeline::create_pipeline(device, queue, uniforms.bind_group_layout())?;
        let blit = BlitPipeline::new(device, surface_format)?;

        let output = OutputImage::new(device, OutputExtent::new(width, height))?;
        let output_bind_group = intersection.create_output_bind_group(device, output.view());
        let blit_bind_group = blit.create_bind_group(device, output.view());

        log::info!(
            "Renderer ready: {}x{} output, {} frames in flight",
            output.width(),
            output.height(),
            MAX_FRAMES_IN_FLIGHT
        );

        Ok(Self {
            device: device.clone(),
            queue: queue.clone(),
            scene,
            scheduler: FrameScheduler::new(MAX_FRAMES_IN_FLIGHT),
            uniforms,
            primitives: PrimitiveBuffers::new(device)?,
            builder,
            intersection,
            blit,
            output,
            output_bind_group,
            blit_bind_group,
            submissions: VecDeque::with_capacity(MAX_FRAMES_IN_FLIGHT),
        })
    }

    /// Wait for an in-flight slot
    ///
    /// Blocks while `MAX_FRAMES_IN_FLIGHT` frames are still on the GPU. Call
    /// before acquiring the surface texture; dropping the frame gives the
    /// slot back.
    pub fn begin_frame(&mut self) -> Frame {
        let device = &self.device;
        let submissions = &mut self.submissions;
        self.scheduler.begin_frame_with(|| poll_oldest(device, submissions))
    }

    /// Render `frame` into `target`
    ///
    /// A failed acceleration structure build skips the frame instead of
    /// returning an error.
    pub fn render(&mut self, frame: Frame, target: &wgpu::TextureView) -> Result<FrameOutcome> {
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("frame_encoder"),
        });

        if let Err(e) = self.encode_scene(&mut encoder) {
            if e.is_frame_local() {
                log::warn!("Skipping frame {}: {}", frame.index(), e);
                return Ok(FrameOutcome::Skipped(e.to_string()));
            }
            return Err(e);
        }

        let uniforms = Uniforms::new(&self.scene.camera, self.output.width(), self.output.height());
        let slot = self.uniforms.upload(&self.queue, frame.index(), &uniforms);

        self.intersection.dispatch(
            &mut encoder,
            &self.uniforms,
            slot,
            &self.output_bind_group,
            self.output.extent().dispatch_size(),
        )?;
        self.blit.encode(&mut encoder, target, &self.blit_bind_group);

        let (submitted, completion) = self.scheduler.submit(frame);
        let submission = self.queue.submit(std::iter::once(encoder.finish()));
        self.queue.on_submitted_work_done(move || completion.complete());

        self.submissions.push_back(submission);
        if self.submissions.len() > MAX_FRAMES_IN_FLIGHT {
            self.submissions.pop_front();
        }

        log::trace!(
            "Frame {} submitted (slot {}, {} primitives)",
            submitted.index(),
            slot.index,
            self.primitives.primitive_count()
        );
        Ok(FrameOutcome::Submitted {
            frame_index: submitted.index(),
            slot: slot.index,
        })
    }

    /// Sync exports, size the structure and record its build
    fn encode_scene(&mut self, encoder: &mut wgpu::CommandEncoder) -> Result<()> {
        self.primitives.sync(&self.device, &self.queue, &self.scene.registry)?;

        let descriptor = BoundingBoxGeometryDescriptor::for_primitive_records(self.primitives.primitive_count());
        let structure = self.builder.prepare(&self.device, &descriptor)?;
        self.intersection.bind_scene(&self.device, structure, &self.primitives);

        self.builder
            .encode_build(&self.device, &self.queue, encoder, self.primitives.primitive_buffer())
    }

    /// Reallocate the output image for a new drawable size
    ///
    /// Zero sizes (minimized window) are ignored. In-flight frames are drained
    /// first so no queued work still targets the old image.
    pub fn on_output_size_changed(&mut self, width: u32, height: u32) -> Result<()> {
        let Some(extent) = self.output.extent().resized(width, height) else {
            return Ok(());
        };

        self.wait_idle();
        self.output = OutputImage::new(&self.device, extent)?;
        self.output_bind_group = self.intersection.create_output_bind_group(&self.device, self.output.view());
        self.blit_bind_group = self.blit.create_bind_group(&self.device, self.output.view());
        log::info!("Output resized to {}x{}", width, height);
        Ok(())
    }

    /// Block until every submitted frame has completed
    pub fn wait_idle(&mut self) {
        let device = &self.device;
        let submissions = &mut self.submissions;
        self.scheduler.wait_idle_with(|| poll_oldest(device, submissions));
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn output_size(&self) -> (u32, u32) {
        (self.output.width(), self.output.height())
    }

    /// Thread grid of the next dispatch
    pub fn dispatch_size(&self) -> DispatchSize {
        self.output.extent().dispatch_size()
    }

    /// Frames currently holding an in-flight slot
    pub fn frames_in_flight(&self) -> usize {
        self.scheduler.in_flight()
    }
}

/// Wait on the oldest outstanding submission so completion callbacks fire
fn poll_oldest(device: &wgpu::Device, submissions: &mut VecDeque<wgpu::SubmissionIndex>) {
    let submission_index = submissions.pop_front();
    if let Err(e) = device.poll(wgpu::PollType::Wait {
        submission_index,
        timeout: None,
    }) {
        log::warn!("Device poll failed: {}", e);
    }
}
