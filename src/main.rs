//! Voxsync - voxel placement sandbox

use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{DeviceEvent, DeviceId, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{CursorGrabMode, Window, WindowId},
};

use voxsync::core::{
    camera::Camera,
    camera_controller::FpsCameraController,
    config::SandboxConfig,
    error::Error,
    input::InputState,
    logging,
    time::FrameTimer,
};
use voxsync::debug::{AppDebugHandler, SharedDebugState};
use voxsync::interact::PointerButton;
use voxsync::math::Frustum;
use voxsync::render::{
    buffer::{CameraBuffer, InstanceBuffer},
    context::GpuContext,
    pipeline::{DepthTexture, FrameDraw, VoxelPipeline},
};
use voxsync::session::Session;
use voxsync::sync::MemoryStore;

/// Preview tint for the voxel a removal would hit
const REMOVE_PREVIEW_COLOR: [f32; 4] = [1.0, 0.25, 0.2, 1.0];

struct RenderResources {
    camera_buffer: CameraBuffer,
    instance_buffer: InstanceBuffer,
    pipeline: VoxelPipeline,
    depth: DepthTexture,
}

impl RenderResources {
    fn new(gpu: &GpuContext, config: &SandboxConfig) -> Self {
        let (width, height) = gpu.size();
        let camera_buffer = CameraBuffer::new(&gpu.device);
        let pipeline = VoxelPipeline::new(
            &gpu.device,
            gpu.format(),
            camera_buffer.bind_group_layout(),
            config.ground,
        );
        Self {
            instance_buffer: InstanceBuffer::new(&gpu.device, config.instance_capacity),
            depth: DepthTexture::new(&gpu.device, width, height),
            camera_buffer,
            pipeline,
        }
    }
}

struct App {
    config: SandboxConfig,
    window: Option<Arc<Window>>,
    gpu: Option<GpuContext>,
    resources: Option<RenderResources>,
    camera: Camera,
    controller: FpsCameraController,
    input: InputState,
    timer: FrameTimer,
    cursor_grabbed: bool,
    session: Session,
    debug_state: Arc<StdMutex<SharedDebugState>>,
}

impl App {
    fn new(config: SandboxConfig, session: Session, debug_state: Arc<StdMutex<SharedDebugState>>) -> Self {
        let mut camera = Camera::new(config.camera_start, 70.0, 16.0 / 9.0);
        let mut controller = FpsCameraController::new(config.move_speed, config.mouse_sensitivity);
        controller.look_at(&mut camera, glam::Vec3::new(0.0, config.ground.height, 0.0));

        Self {
            config,
            window: None,
            gpu: None,
            resources: None,
            camera,
            controller,
            input: InputState::new(),
            timer: FrameTimer::new(),
            cursor_grabbed: false,
            session,
            debug_state,
        }
    }

    fn toggle_cursor_grab(&mut self) {
        if let Some(window) = &self.window {
            self.cursor_grabbed = !self.cursor_grabbed;

            if self.cursor_grabbed {
                window.set_cursor_grab(CursorGrabMode::Locked)
                    .or_else(|_| window.set_cursor_grab(CursorGrabMode::Confined))
                    .ok();
                window.set_cursor_visible(false);
            } else {
                window.set_cursor_grab(CursorGrabMode::None).ok();
                window.set_cursor_visible(true);
            }

            self.input.set_mouse_captured(self.cursor_grabbed);
        }
    }

    fn handle_palette_keys(&mut self) {
        if let Some(index) = self.input.digit_just_pressed() {
            if self.session.controller_mut().select_color(index) {
                log::info!("Color: {}", self.session.controller().selected_color());
            }
        }
        if self.input.is_key_just_pressed(KeyCode::KeyQ) {
            self.session.controller_mut().cycle_color(-1);
        }
        if self.input.is_key_just_pressed(KeyCode::KeyE) {
            self.session.controller_mut().cycle_color(1);
        }
    }

    fn update_frame(&mut self) {
        self.input.begin_frame();
        self.timer.tick();
        let dt = self.timer.delta_secs();

        self.handle_palette_keys();
        self.controller.update(&mut self.camera, &self.input, dt);

        {
            let mut ds = self.debug_state.lock().unwrap_or_else(|e| e.into_inner());
            ds.apply_requests(&mut self.session, &mut self.camera, &mut self.controller);
        }

        self.session.update(&self.camera);
        self.render();

        {
            let mut ds = self.debug_state.lock().unwrap_or_else(|e| e.into_inner());
            ds.publish(&self.session, &self.camera, self.timer.fps(), self.timer.stats());
        }

        self.update_title();
        self.input.end_frame();
    }

    fn update_title(&self) {
        let Some(window) = &self.window else { return };
        let target = match self.session.candidate() {
            Some(c) => format!("{}", c.target_cell),
            None => "-".to_string(),
        };
        let status = match self.session.last_error() {
            Some(e) => format!(" | {}", e),
            None => String::new(),
        };
        window.set_title(&format!(
            "Voxsync - {:.1} FPS | {} voxels | {} | target {} | Tab=mouse, 1-9=color, Shift+click=remove{}",
            self.timer.fps(),
            self.session.grid().len(),
            self.session.controller().selected_color(),
            target,
            status,
        ));
    }

    fn preview(&self) -> Option<(glam::IVec3, [f32; 4])> {
        let candidate = self.session.candidate()?;
        if self.input.is_modifier_held() {
            candidate.hovered.map(|h| (h.position, REMOVE_PREVIEW_COLOR))
        } else {
            Some((candidate.target_cell, self.session.controller().selected_color().to_array_f32()))
        }
    }

    fn render(&mut self) {
        let preview = self.preview();
        let Some(gpu) = &self.gpu else { return };
        let Some(resources) = &mut self.resources else { return };

        let output = match gpu.get_current_texture() {
            Ok(t) => t,
            Err(e) => {
                log::warn!("Failed to get surface texture: {}", e);
                gpu.reconfigure();
                return;
            }
        };
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());

        resources.camera_buffer.update(&gpu.queue, &self.camera);
        resources.instance_buffer.upload(&gpu.queue, self.session.instances_mut());

        let frustum = Frustum::from_view_projection(&self.camera.view_projection());
        let draw_batch = self.session.instances().bounds().is_visible(&frustum);

        let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("frame_encoder"),
        });
        resources.pipeline.render(
            &gpu.queue,
            &mut encoder,
            &view,
            &resources.depth,
            resources.camera_buffer.bind_group(),
            FrameDraw {
                instances: &resources.instance_buffer,
                draw_batch,
                preview,
            },
        );
        gpu.queue.submit(std::iter::once(encoder.finish()));
        output.present();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attrs = Window::default_attributes()
            .with_title("Voxsync")
            .with_inner_size(PhysicalSize::new(1280, 720));

        let window = match event_loop.create_window(window_attrs) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                log::error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        let gpu = match pollster::block_on(GpuContext::new(window.clone())) {
            Ok(gpu) => gpu,
            Err(e) => {
                log::error!("Failed to create GPU context: {}", e);
                event_loop.exit();
                return;
            }
        };

        let size = window.inner_size();
        self.camera.set_aspect(size.width as f32, size.height as f32);
        log::info!("Window created: {}x{}", size.width, size.height);

        self.resources = Some(RenderResources::new(&gpu, &self.config));
        self.gpu = Some(gpu);
        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if let Some(edge) = self.input.process_event(&event) {
            if self.cursor_grabbed {
                if let Some(intent) = self.session.handle_pointer(edge) {
                    log::debug!("Pointer intent {:?}", intent);
                }
            } else if edge.pressed && edge.button == PointerButton::Primary {
                // First click only captures the pointer
                self.toggle_cursor_grab();
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                self.session.disconnect();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if size.width > 0 && size.height > 0 {
                    if let Some(gpu) = &mut self.gpu {
                        gpu.resize(size.width, size.height);
                        self.camera.set_aspect(size.width as f32, size.height as f32);
                        if let Some(resources) = &mut self.resources {
                            resources.depth = DepthTexture::new(&gpu.device, size.width, size.height);
                        }
                    }
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state.is_pressed() && !event.repeat {
                    match event.physical_key {
                        PhysicalKey::Code(KeyCode::Escape) => {
                            if self.cursor_grabbed {
                                self.toggle_cursor_grab();
                            } else {
                                self.session.disconnect();
                                event_loop.exit();
                            }
                        }
                        PhysicalKey::Code(KeyCode::Tab) => self.toggle_cursor_grab(),
                        _ => {}
                    }
                }
            }
            WindowEvent::Focused(false) => {
                if self.cursor_grabbed {
                    self.toggle_cursor_grab();
                }
            }
            WindowEvent::RedrawRequested => {
                self.update_frame();
                if let Some(w) = &self.window {
                    w.request_redraw();
                }
            }
            _ => {}
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _device_id: DeviceId, event: DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta } = event {
            self.input.process_mouse_motion(delta);
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

fn main() -> Result<(), Error> {
    logging::init();
    log::info!("Voxsync starting...");

    let args: Vec<String> = std::env::args().collect();
    let config = match parse_config_arg(&args) {
        Some(path) => {
            log::info!("Loading config from: {}", path.display());
            SandboxConfig::load(&path)?
        }
        None => SandboxConfig::default(),
    };

    // Store tasks and the debug server run here; the frame loop only pumps results
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()?;
    let _guard = runtime.enter();

    let store = MemoryStore::new();
    let mut session = Session::new(&config, Arc::new(store), runtime.handle().clone());
    if let Err(e) = session.connect() {
        log::warn!("Running without realtime updates: {}", e);
    }

    let debug_state = Arc::new(StdMutex::new(SharedDebugState::default()));
    let _debug_server = (config.debug_port != 0).then(|| {
        let handler = Arc::new(tokio::sync::Mutex::new(AppDebugHandler::new(debug_state.clone())));
        voxsync_debug::DebugServer::start(handler, config.debug_port)
    });

    let event_loop = EventLoop::new().map_err(|e| Error::Window(e.to_string()))?;
    let mut app = App::new(config, session, debug_state);

    event_loop.run_app(&mut app).map_err(|e| Error::Window(e.to_string()))
}

/// Parse --config argument from command line
fn parse_config_arg(args: &[String]) -> Option<PathBuf> {
    for i in 0..args.len() {
        if args[i] == "--config" || args[i] == "-c" {
            if let Some(path) = args.get(i + 1) {
                return Some(PathBuf::from(path));
            }
        }
    }
    None
}
