use std::sync::Arc;
use std::time::Instant;

use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::KeyCode;
use winit::window::{Window, WindowAttributes, WindowId};

use crate::config::HostConfig;
use crate::error::AppError;
use crate::gpu::GpuContext;
use crate::host::RenderHost;
use crate::input::Input;
use crate::render::{HeadlessRenderer, WgpuRenderer};
use crate::resize::ViewportSize;
use crate::scenes;

/// Keys `0`–`9` route to home and `/001`–`/009`.
const ROUTE_KEYS: [KeyCode; 10] = [
    KeyCode::Digit0,
    KeyCode::Digit1,
    KeyCode::Digit2,
    KeyCode::Digit3,
    KeyCode::Digit4,
    KeyCode::Digit5,
    KeyCode::Digit6,
    KeyCode::Digit7,
    KeyCode::Digit8,
    KeyCode::Digit9,
];

/// Window and startup settings.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub title: String,
    /// Logical window size.
    pub width: u32,
    pub height: u32,
    /// Path navigated to once the host is up.
    pub route: String,
    /// Render this many frames without a window, then exit.
    pub headless_frames: Option<u32>,
    pub host: HostConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Vitrine".to_string(),
            width: 1280,
            height: 720,
            route: "/".to_string(),
            headless_frames: None,
            host: HostConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn route(mut self, route: impl Into<String>) -> Self {
        self.route = route.into();
        self
    }

    pub fn headless(mut self, frames: u32) -> Self {
        self.headless_frames = Some(frames);
        self
    }

    pub fn host(mut self, host: HostConfig) -> Self {
        self.host = host;
        self
    }
}

/// Open a window and run the built-in scene modules until it closes.
///
/// With [`AppConfig::headless`] set, no window is opened: the host renders
/// the requested number of frames on a 60 Hz clock into a
/// [`HeadlessRenderer`] and returns.
///
/// # Example
/// ```no_run
/// vitrine::run(vitrine::AppConfig::new().title("Ideas").route("/002"))?;
/// # Ok::<(), vitrine::AppError>(())
/// ```
pub fn run(config: AppConfig) -> Result<(), AppError> {
    if let Some(frames) = config.headless_frames {
        return run_headless(&config, frames);
    }

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = VitrineApp {
        config,
        running: None,
        error: None,
    };
    event_loop.run_app(&mut app)?;

    match app.error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn run_headless(config: &AppConfig, frames: u32) -> Result<(), AppError> {
    let renderer = HeadlessRenderer::new(config.width, config.height);
    let viewport = ViewportSize::new(config.width as f32, config.height as f32, 1.0);
    let mut host = RenderHost::new(
        renderer,
        scenes::builtin_registry(),
        viewport,
        config.host.clone(),
    )?;
    let load = host.navigate(&config.route);

    for i in 0..frames {
        host.frame(f64::from(i) / 60.0);
    }

    log::info!(
        "headless run: {frames} frames, mounted {:?}, navigation {:?}, {} overlay layers left",
        host.mounted().map(|id| id.as_str()),
        load.status(),
        host.overlay().len()
    );
    Ok(())
}

struct Running {
    window: Arc<Window>,
    host: RenderHost<WgpuRenderer>,
    input: Input,
    start: Instant,
}

struct VitrineApp {
    config: AppConfig,
    running: Option<Running>,
    /// Startup failure, returned from [`run`] once the loop exits.
    error: Option<AppError>,
}

impl VitrineApp {
    fn start(&self, event_loop: &ActiveEventLoop) -> Result<Running, AppError> {
        let attrs = WindowAttributes::default()
            .with_title(&self.config.title)
            .with_inner_size(LogicalSize::new(self.config.width, self.config.height));
        let window = Arc::new(event_loop.create_window(attrs)?);

        let gpu = GpuContext::new(window.clone())?;
        let renderer = WgpuRenderer::new(gpu);

        let scale = window.scale_factor();
        let viewport = viewport_for(window.inner_size(), scale);
        let mut host = RenderHost::new(
            renderer,
            scenes::builtin_registry(),
            viewport,
            self.config.host.clone(),
        )?;
        host.navigate(&self.config.route);

        let mut input = Input::new();
        input.set_scale_factor(scale);

        Ok(Running {
            window,
            host,
            input,
            start: Instant::now(),
        })
    }
}

fn viewport_for(size: PhysicalSize<u32>, scale_factor: f64) -> ViewportSize {
    let logical: LogicalSize<f32> = size.to_logical(scale_factor);
    ViewportSize::new(logical.width, logical.height, scale_factor as f32)
}

impl ApplicationHandler for VitrineApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.running.is_some() {
            return;
        }
        match self.start(event_loop) {
            Ok(running) => {
                running.window.request_redraw();
                self.running = Some(running);
            }
            Err(err) => {
                log::error!("startup failed: {err}");
                self.error = Some(err);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(Running {
            window,
            host,
            input,
            start,
        }) = &mut self.running
        else {
            return;
        };

        let now = start.elapsed().as_secs_f64();
        input.handle_event(&event, now);

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                let viewport = viewport_for(size, window.scale_factor());
                host.resize(viewport.width, viewport.height, viewport.pixel_ratio);
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                input.set_scale_factor(scale_factor);
                let viewport = viewport_for(window.inner_size(), scale_factor);
                host.resize(viewport.width, viewport.height, viewport.pixel_ratio);
            }
            WindowEvent::RedrawRequested => {
                for (digit, key) in ROUTE_KEYS.iter().enumerate() {
                    if input.key_pressed(*key) {
                        let path = if digit == 0 {
                            "/".to_string()
                        } else {
                            format!("/{digit:03}")
                        };
                        host.navigate(&path);
                    }
                }
                if input.key_pressed(KeyCode::KeyR) {
                    host.reset_view();
                }

                for press in input.presses() {
                    host.pointer_down(press.position);
                    if press.double {
                        host.double_click();
                    }
                }
                if input.drag() != glam::Vec2::ZERO {
                    host.orbit_drag(input.drag());
                }
                if input.scroll() != 0.0 {
                    host.zoom(input.scroll());
                }

                host.frame(now);

                input.begin_frame();
                window.request_redraw();
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headless_run_completes() {
        let config = AppConfig::new()
            .size(160, 120)
            .route("/001")
            .headless(120)
            .host(HostConfig::new().seed(3));
        run(config).unwrap();
    }

    #[test]
    fn viewport_is_logical() {
        let viewport = viewport_for(PhysicalSize::new(1600, 1200), 2.0);
        assert_eq!(viewport.width, 800.0);
        assert_eq!(viewport.height, 600.0);
    }
}
