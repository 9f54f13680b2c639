//! voxray - ray traced voxel volumes

use std::path::PathBuf;
use std::sync::Arc;

use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowId},
};

use voxray::config::AppConfig;
use voxray::core::{
    camera_controller::StepCameraController,
    error::Error,
    input::InputState,
    logging,
    time::FrameTimer,
};
use voxray::render::{FrameOutcome, GpuContext, Renderer};
use voxray::scene::Scene;

struct App {
    config: AppConfig,
    window: Option<Arc<Window>>,
    gpu: Option<GpuContext>,
    renderer: Option<Renderer>,
    input: InputState,
    controller: StepCameraController,
    timer: FrameTimer,
    skipped_frames: u64,
}

impl App {
    fn new(config: AppConfig) -> Self {
        Self {
            config,
            window: None,
            gpu: None,
            renderer: None,
            input: InputState::new(),
            controller: StepCameraController::default(),
            timer: FrameTimer::new(),
            skipped_frames: 0,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<(), Error> {
        let window_attrs = Window::default_attributes()
            .with_title(self.config.title.as_str())
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));

        let window = Arc::new(
            event_loop
                .create_window(window_attrs)
                .map_err(|e| Error::Window(e.to_string()))?,
        );

        let gpu = pollster::block_on(GpuContext::new(window.clone(), self.config.vsync))?;
        let (width, height) = gpu.size();
        log::info!("Window created: {}x{}", width, height);

        let scene = Scene::from_config(&self.config.scene)?;
        let renderer = Renderer::new(&gpu.device, &gpu.queue, gpu.format(), width, height, scene)?;

        self.window = Some(window);
        self.gpu = Some(gpu);
        self.renderer = Some(renderer);
        Ok(())
    }

    fn render(&mut self) {
        let (Some(gpu), Some(renderer)) = (&self.gpu, &mut self.renderer) else {
            return;
        };

        // Slot first, so a blocked frame doesn't hold a drawable
        let frame = renderer.begin_frame();
        let surface = match gpu.get_current_texture() {
            Ok(surface) => surface,
            Err(e) => {
                log::warn!("Surface error: {}", e);
                return;
            }
        };
        let view = surface.texture.create_view(&wgpu::TextureViewDescriptor::default());

        match renderer.render(frame, &view) {
            Ok(FrameOutcome::Submitted { .. }) => {
                surface.present();
            }
            Ok(FrameOutcome::Skipped(reason)) => {
                self.skipped_frames += 1;
                log::debug!("Frame skipped: {}", reason);
            }
            Err(e) => log::error!("Render failed: {}", e),
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        if let Err(e) = self.init(event_loop) {
            log::error!("Initialization failed: {}", e);
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        self.input.process_event(&event);

        match event {
            WindowEvent::CloseRequested => {
                if let Some(renderer) = &mut self.renderer {
                    renderer.wait_idle();
                }
                log::info!(
                    "Closing after {} frames ({} skipped)",
                    self.timer.frame_count(),
                    self.skipped_frames
                );
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if size.width > 0 && size.height > 0 {
                    if let Some(gpu) = &mut self.gpu {
                        gpu.resize(size.width, size.height);
                    }
                    if let Some(renderer) = &mut self.renderer {
                        if let Err(e) = renderer.on_output_size_changed(size.width, size.height) {
                            log::error!("Resize failed: {}", e);
                            event_loop.exit();
                        }
                    }
                }
            }
            WindowEvent::RedrawRequested => {
                self.timer.tick();

                if let Some(renderer) = &mut self.renderer {
                    if self.controller.update(&mut renderer.scene_mut().camera, &self.input) {
                        log::debug!("Camera at {}", renderer.scene().camera.position);
                    }
                }

                self.render();

                if let Some(window) = &self.window {
                    window.set_title(&format!(
                        "{} - {:.1} FPS | WASD=move, Space/Shift+Space=up/down | skipped {}",
                        self.config.title,
                        self.timer.fps(),
                        self.skipped_frames
                    ));
                }

                self.input.end_frame();
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

/// Parse --config argument from command line
fn parse_config_arg(args: &[String]) -> Option<PathBuf> {
    args.iter()
        .position(|arg| arg == "--config" || arg == "-c")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
}

fn main() {
    logging::init();
    log::info!("voxray starting...");

    let args: Vec<String> = std::env::args().collect();
    let config = match parse_config_arg(&args) {
        Some(path) => match AppConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                log::error!("Failed to load {}: {}", path.display(), e);
                return;
            }
        },
        None => AppConfig::default(),
    };

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            log::error!("Failed to create event loop: {}", e);
            return;
        }
    };

    let mut app = App::new(config);
    if let Err(e) = event_loop.run_app(&mut app) {
        log::error!("Event loop error: {}", e);
    }
}
