//! Particle Engine - Main Entry Point
//!
//! Opens a window, builds the Vulkan stack and runs the compute-driven
//! particle point cloud until the window is closed or Escape is pressed.
//!
//! The first argument names the config file (default `particle-engine.toml`).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowId;

use engine_core::{DEFAULT_LOG_FILTER, EngineConfig, Timer};
use engine_platform::{Surface, SurfaceSource, Window};
use engine_renderer::{FrameInfo, ParticleSystem, Renderer};
use engine_resources::{AssetRegistry, MeshData};
use engine_rhi::device::Device;
use engine_rhi::instance::Instance;
use engine_rhi::physical_device::select_physical_device;
use engine_scene::{Camera, EntityRegistry, GameObject};

const DEFAULT_CONFIG_PATH: &str = "particle-engine.toml";

/// Radians per second the camera orbits the cloud.
const ORBIT_SPEED: f32 = 0.2;

/// Everything that lives between `resumed` and exit.
///
/// Fields drop in declaration order: GPU users first, then the device, the
/// surface, the instance and finally the window.
struct Engine {
    particles: ParticleSystem,
    renderer: Renderer,
    device: Arc<Device>,
    _surface: Surface,
    _instance: Instance,
    window: Window,
    camera: Camera,
    cloud: GameObject,
    orbit_radius: f32,
    timer: Timer,
}

impl Engine {
    fn new(event_loop: &ActiveEventLoop, config: &EngineConfig) -> Result<Self> {
        let window = Window::new(
            event_loop,
            config.window.width,
            config.window.height,
            &config.window.title,
        )
        .context("Failed to create window")?;

        let extensions = window.required_extensions()?;
        let instance = Instance::new(config.vulkan.enable_validation, &extensions)
            .context("Failed to create Vulkan instance")?;
        let surface = window.create_surface(instance.entry(), instance.handle())?;

        let physical_device = select_physical_device(
            instance.handle(),
            surface.handle(),
            surface.loader(),
            config.vulkan.device_selection,
        )?;
        let device = Device::new(&instance, &physical_device)
            .context("Failed to create logical device")?;

        let renderer = Renderer::new(&instance, device.clone(), surface.handle(), &window)
            .context("Failed to create renderer")?;
        let particles = ParticleSystem::new(
            device.clone(),
            renderer.render_pass(),
            &config.particles,
            &config.shaders,
        )
        .context("Failed to create particle system")?;

        let mut entities = EntityRegistry::new();
        let mut meshes = AssetRegistry::new();
        let quad = meshes.load("builtin:quad", MeshData::unit_quad());
        let cloud = GameObject::new(&mut entities).with_mesh(quad);

        let mut camera = Camera::new();
        camera.set_aspect(renderer.aspect_ratio());
        let orbit_radius = (config.particles.range * 3.0).max(2.0);
        camera.orbit(0.0, orbit_radius, orbit_radius * 0.25);

        info!(
            "Initialization complete: {} particles, cloud object {}",
            particles.total_particles(),
            cloud.id()
        );

        Ok(Self {
            particles,
            renderer,
            device,
            _surface: surface,
            _instance: instance,
            window,
            camera,
            cloud,
            orbit_radius,
            timer: Timer::new(),
        })
    }

    fn draw_frame(&mut self) -> Result<()> {
        let frame_time = self.timer.frame_time();

        let Some(command_buffer) = self.renderer.begin_frame(&mut self.window)? else {
            return Ok(());
        };

        self.camera.set_aspect(self.renderer.aspect_ratio());
        self.camera.orbit(
            self.timer.elapsed_secs() * ORBIT_SPEED,
            self.orbit_radius,
            self.orbit_radius * 0.25,
        );

        let frame_index = self.renderer.frame_index();
        let frame_info = FrameInfo {
            frame_index,
            frame_time,
            command_buffer,
            descriptor_set: self.particles.descriptor_set(frame_index),
            view_projection: self.camera.view_projection() * self.cloud.transform.mat4(),
        };

        self.particles.update(&frame_info)?;
        self.particles.dispatch(&frame_info);

        self.renderer.begin_swapchain_render_pass(command_buffer);
        self.particles.render_point_cloud(&frame_info);
        self.renderer.end_swapchain_render_pass(command_buffer);

        self.renderer.end_frame(&mut self.window)?;
        Ok(())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle on shutdown: {}", e);
        }
        info!("Device idle, releasing GPU resources");
    }
}

struct App {
    config: EngineConfig,
    engine: Option<Engine>,
}

impl App {
    fn new(config: EngineConfig) -> Self {
        Self {
            config,
            engine: None,
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.engine.is_some() {
            return;
        }
        match Engine::new(event_loop, &self.config) {
            Ok(engine) => {
                info!("Entering main loop");
                self.engine = Some(engine);
            }
            Err(e) => {
                error!("Initialization failed: {:?}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::KeyboardInput { event, .. }
                if event.state.is_pressed()
                    && event.physical_key == PhysicalKey::Code(KeyCode::Escape) =>
            {
                info!("Escape pressed, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                engine.window.handle_resize(size.width, size.height);
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = engine.draw_frame() {
                    error!("Render error: {:?}", e);
                    event_loop.exit();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(engine) = self.engine.as_ref() else {
            return;
        };
        // Minimized windows block on events instead of spinning.
        if engine.window.is_zero_sized() {
            event_loop.set_control_flow(ControlFlow::Wait);
        } else {
            event_loop.set_control_flow(ControlFlow::Poll);
            engine.window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.engine = None;
    }
}

fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    let loaded = EngineConfig::try_load(&config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;
    let from_file = loaded.is_some();
    let config = loaded.unwrap_or_default();

    engine_core::init_logging_with(config.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER));
    if from_file {
        info!("Loaded config from {}", config_path.display());
    } else {
        info!("No config at {}, using defaults", config_path.display());
    }
    info!("Starting Particle Engine");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    Ok(())
}
