use std::path::PathBuf;
use std::sync::Arc;

use glam::Vec2;
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::KeyCode;
use winit::window::{Window, WindowAttributes, WindowId};

use crate::config::ProjectConfig;
use crate::error::{Error, Result};
use crate::gpu::GpuContext;
use crate::input::Input;
use crate::record::screenshot_name;
use crate::session::Session;

/// Configuration for the app window.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub vsync: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Tincture".to_string(),
            width: 1280,
            height: 720,
            vsync: true,
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

    pub fn vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }
}

/// Open `project` in a window and run until it is closed.
///
/// Keys: Space play/pause, R restart, Left/Right step (Shift to seek), Tab
/// next pass, F12 screenshot. Dropping an image on the window puts it in
/// channel 0 of the previewed pass.
pub fn run(config: AppConfig, project: ProjectConfig) -> Result<()> {
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = TinctureApp::Pending {
        config,
        project,
        error: None,
    };
    event_loop.run_app(&mut app)?;

    match app {
        TinctureApp::Pending { error, .. } | TinctureApp::Running { error, .. } => {
            error.map_or(Ok(()), Err)
        }
    }
}

enum TinctureApp {
    Pending {
        config: AppConfig,
        project: ProjectConfig,
        error: Option<Error>,
    },
    Running {
        window: Arc<Window>,
        gpu: GpuContext,
        session: Session,
        input: Input,
        error: Option<Error>,
    },
}

impl TinctureApp {
    fn start(
        event_loop: &ActiveEventLoop,
        config: &AppConfig,
        project: &ProjectConfig,
    ) -> Result<(Arc<Window>, GpuContext, Session)> {
        let window_attrs = WindowAttributes::default()
            .with_title(&config.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(config.width, config.height));
        let window = Arc::new(event_loop.create_window(window_attrs)?);
        let gpu = GpuContext::new(window.clone(), config.vsync)?;
        let session = Session::open(&gpu, project, gpu.width(), gpu.height())?;
        Ok((window, gpu, session))
    }
}

impl ApplicationHandler for TinctureApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let TinctureApp::Pending {
            config,
            project,
            error,
        } = self
        else {
            return;
        };

        match Self::start(event_loop, config, project) {
            Ok((window, gpu, session)) => {
                window.request_redraw();
                *self = TinctureApp::Running {
                    window,
                    gpu,
                    session,
                    input: Input::new(),
                    error: None,
                };
            }
            Err(err) => {
                tracing::error!("failed to start: {err}");
                *error = Some(err);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let TinctureApp::Running {
            window,
            gpu,
            session,
            input,
            error,
        } = self
        else {
            return;
        };

        input.handle_event(&event);

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                gpu.resize(size.width, size.height);
                if size.width > 0 && size.height > 0 {
                    session.resize(size.width, size.height);
                }
            }
            WindowEvent::DroppedFile(path) => {
                if let Err(err) = session.drop_file(&path) {
                    tracing::warn!("{err}");
                }
            }
            WindowEvent::RedrawRequested => {
                handle_keys(gpu, session, input);

                let (pw, ph) = session.graph().resolution();
                let mouse = input.mouse(
                    Vec2::new(gpu.width() as f32, gpu.height() as f32),
                    Vec2::new(pw as f32, ph as f32),
                );
                session.frame(gpu, mouse);

                if let Err(err) = present(gpu, session) {
                    tracing::error!("presentation failed: {err}");
                    *error = Some(err);
                    event_loop.exit();
                    return;
                }

                input.begin_frame();
                window.request_redraw();
            }
            _ => {}
        }
    }
}

fn handle_keys(gpu: &GpuContext, session: &mut Session, input: &Input) {
    if input.key_pressed(KeyCode::Space) {
        session.clock_mut().toggle();
    }
    if input.key_pressed(KeyCode::KeyR) {
        session.restart(gpu);
    }
    let shift = input.key_down(KeyCode::ShiftLeft) || input.key_down(KeyCode::ShiftRight);
    for (key, forward) in [(KeyCode::ArrowRight, true), (KeyCode::ArrowLeft, false)] {
        if !input.key_pressed(key) {
            continue;
        }
        if shift {
            session.seek(forward);
        } else {
            session.step(forward);
        }
    }
    if input.key_pressed(KeyCode::Tab) {
        session.select_next();
    }
    if input.key_pressed(KeyCode::F12) {
        let path: PathBuf = screenshot_name();
        if let Err(err) = session.screenshot(gpu, &path) {
            tracing::warn!("screenshot failed: {err}");
        }
    }
}

fn present(gpu: &mut GpuContext, session: &mut Session) -> Result<()> {
    let Some(surface) = &gpu.surface else {
        return Ok(());
    };
    let output = match surface.get_current_texture() {
        Ok(output) => output,
        Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
            let (width, height) = (gpu.width(), gpu.height());
            gpu.resize(width, height);
            return Ok(());
        }
        Err(wgpu::SurfaceError::Timeout) => {
            tracing::debug!("surface timeout, skipping frame");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };
    let view = output
        .texture
        .create_view(&wgpu::TextureViewDescriptor::default());

    let mut encoder = gpu
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Present Encoder"),
        });
    session
        .graph_mut()
        .present(gpu, &mut encoder, &view, gpu.config.format)?;
    gpu.queue.submit(std::iter::once(encoder.finish()));
    output.present();
    Ok(())
}
