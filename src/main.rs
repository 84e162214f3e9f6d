use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use glam::Vec2;
use log::{info, warn};
use pollster::block_on;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::PhysicalKey;
use winit::window::{CursorGrabMode, Window, WindowId};

use vct_renderer::{
    AppContext, FrameAction, FrameInput, FrameRenderer, InputState, KeyCode, NamedKey, Pipeline,
    PreparedScene, Presenter, VctConfig,
};

/// Renders an OBJ scene with voxel cone traced global illumination.
#[derive(Debug, Parser)]
#[command(name = "vct-renderer", version, about)]
struct Cli {
    /// Wavefront OBJ scene; its MTL library is resolved next to it.
    scene: PathBuf,

    /// Directory holding the scene's textures. Defaults to the OBJ's directory.
    #[arg(long, value_name = "DIR")]
    textures: Option<PathBuf>,

    /// TOML configuration file.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Voxel grid resolution, a power of two. Overrides the config file.
    #[arg(long, value_name = "N")]
    voxel_dim: Option<u32>,

    /// Render without a window and print a summary.
    #[arg(long)]
    headless: bool,

    /// Frames rendered in headless mode.
    #[arg(long, value_name = "N", default_value_t = 1)]
    frames: u32,
}

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => VctConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => VctConfig::default(),
    };
    if let Some(dim) = cli.voxel_dim {
        config.voxel.dim = dim;
    }
    config.validate().context("invalid configuration")?;

    let texture_dir = cli.textures.clone().unwrap_or_else(|| {
        cli.scene
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    });
    let prepared = Pipeline::prepare(&config, &cli.scene, &texture_dir)
        .with_context(|| format!("failed to prepare {}", cli.scene.display()))?;
    print_summary(&prepared);

    if cli.headless {
        return run_headless(&prepared, cli.frames);
    }
    match run_interactive(&prepared) {
        Ok(()) => Ok(()),
        Err(err) => {
            if err.downcast_ref::<WindowInitError>().is_some() {
                eprintln!(
                    "{err}. Falling back to --headless mode \
                     (set DISPLAY or install window system libs to enable rendering)."
                );
                run_headless(&prepared, cli.frames)
            } else {
                Err(err)
            }
        }
    }
}

fn print_summary(prepared: &PreparedScene) {
    let stats = prepared.scene.stats();
    println!(
        "Loaded scene with {} batches, {} triangles, {} materials, {} textures",
        stats.batches, stats.triangles, stats.materials, stats.textures
    );
    println!(
        "Voxel grid {dim}x{dim}x{dim}: {} occupied voxels, {} mip levels",
        prepared.grid.occupied_count(),
        prepared.grid.level_count(),
        dim = prepared.grid.dim().get(),
    );
}

fn run_headless(prepared: &PreparedScene, frames: u32) -> Result<()> {
    let mut context = AppContext::new(&prepared.config)?;
    let renderer = FrameRenderer::new(&prepared.config.cones);
    let (width, height) = prepared.config.window.render_size();
    let idle = FrameInput::default();

    for index in 0..frames {
        let dt = context.clock.tick();
        context.process_input(&idle, dt);
        let frame = renderer.render(prepared, &context.camera, width, height);
        println!(
            "Frame {index}: {width}x{height}, mean luminance {:.4}, {} covered pixels",
            frame.mean_luminance(),
            frame.covered_pixels()
        );
    }
    Ok(())
}

fn run_interactive(prepared: &PreparedScene) -> Result<()> {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::new));
    panic::set_hook(default_hook);
    let event_loop = event_loop
        .map_err(|panic| WindowInitError::from_panic("event loop", panic))?
        .map_err(|err| WindowInitError::from_error("event loop", err))?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = AppState {
        prepared,
        context: AppContext::new(&prepared.config)?,
        renderer: FrameRenderer::new(&prepared.config.cones),
        input: InputState::new(),
        presenter: None,
        frames: 0,
        last_error: None,
    };
    event_loop
        .run_app(&mut app)
        .map_err(|err| anyhow!("event loop failed: {err}"))?;

    info!("Rendered {} frames", app.frames);
    if let Some(err) = app.last_error {
        return Err(err);
    }
    Ok(())
}

struct AppState<'a> {
    prepared: &'a PreparedScene,
    context: AppContext,
    renderer: FrameRenderer,
    input: InputState,
    presenter: Option<Presenter>,
    frames: u64,
    last_error: Option<anyhow::Error>,
}

#[derive(Debug)]
struct WindowInitError {
    message: String,
}

impl WindowInitError {
    fn from_panic(stage: &str, panic: Box<dyn Any + Send>) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {}", panic_message(panic)),
        }
    }

    fn from_error(stage: &str, err: impl fmt::Display) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {err}"),
        }
    }
}

impl fmt::Display for WindowInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for WindowInitError {}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(msg) => *msg,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(msg) => (*msg).to_string(),
            Err(_) => "unknown panic".into(),
        },
    }
}

impl AppState<'_> {
    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        self.last_error = Some(err);
        event_loop.exit();
    }

    fn create_presenter(&self, event_loop: &ActiveEventLoop) -> Result<Presenter> {
        let window_config = &self.prepared.config.window;
        let attributes = Window::default_attributes()
            .with_title("vct-renderer")
            .with_inner_size(PhysicalSize::new(window_config.width, window_config.height));
        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .map_err(|err| WindowInitError::from_error("window", err))?,
        );
        if let Err(err) = window
            .set_cursor_grab(CursorGrabMode::Confined)
            .or_else(|_| window.set_cursor_grab(CursorGrabMode::Locked))
        {
            warn!("Cursor grab unavailable: {err}");
        }
        window.set_cursor_visible(false);
        Ok(block_on(Presenter::new(window))?)
    }

    fn handle_keyboard(&self, event: &KeyEvent) {
        let PhysicalKey::Code(code) = event.physical_key else {
            return;
        };
        let Some(keycode) = map_keycode(code) else {
            return;
        };
        match event.state {
            ElementState::Pressed => self.input.set_key_down(keycode),
            ElementState::Released => self.input.set_key_up(keycode),
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let dt = self.context.clock.tick();
        let input = self.input.take_frame();
        if self.context.process_input(&input, dt) == FrameAction::Quit {
            event_loop.exit();
            return;
        }
        let Some(presenter) = self.presenter.as_mut() else {
            return;
        };

        let size = presenter.size();
        let (width, height) = self.prepared.config.window.scaled(size.width, size.height);
        let frame = self
            .renderer
            .render(self.prepared, &self.context.camera, width, height);
        match presenter.present(&frame) {
            Ok(()) => self.frames += 1,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                let size = presenter.window().inner_size();
                presenter.resize(size);
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                self.fail(event_loop, anyhow!("GPU is out of memory"));
            }
            Err(wgpu::SurfaceError::Timeout) => {
                info!("Surface timeout; retrying next frame");
            }
            Err(err) => warn!("Skipping frame: {err}"),
        }
    }
}

impl ApplicationHandler for AppState<'_> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.presenter.is_some() {
            return;
        }
        match self.create_presenter(event_loop) {
            Ok(presenter) => self.presenter = Some(presenter),
            Err(err) => self.fail(event_loop, err),
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if self
            .presenter
            .as_ref()
            .is_some_and(|presenter| presenter.window_id() != window_id)
        {
            return;
        }
        match event {
            WindowEvent::CloseRequested => self.input.request_close(),
            WindowEvent::Resized(size) => {
                if let Some(presenter) = self.presenter.as_mut() {
                    presenter.resize(size);
                }
            }
            WindowEvent::KeyboardInput { event, .. } => self.handle_keyboard(&event),
            WindowEvent::CursorMoved { position, .. } => {
                self.input
                    .set_mouse_position(Vec2::new(position.x as f32, position.y as f32));
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let amount = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(offset) => offset.y as f32 / 20.0,
                };
                self.input.add_scroll(amount);
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(presenter) = self.presenter.as_ref() {
            presenter.window().request_redraw();
        }
    }
}

fn map_keycode(code: winit::keyboard::KeyCode) -> Option<KeyCode> {
    use winit::keyboard::KeyCode as Key;
    Some(match code {
        Key::Space => KeyCode::Named(NamedKey::Space),
        Key::Enter => KeyCode::Named(NamedKey::Enter),
        Key::Tab => KeyCode::Named(NamedKey::Tab),
        Key::ArrowLeft => KeyCode::Named(NamedKey::Left),
        Key::ArrowRight => KeyCode::Named(NamedKey::Right),
        Key::ArrowUp => KeyCode::Named(NamedKey::Up),
        Key::ArrowDown => KeyCode::Named(NamedKey::Down),
        Key::Escape => KeyCode::Named(NamedKey::Escape),
        Key::Backspace => KeyCode::Named(NamedKey::Backspace),
        Key::PageUp => KeyCode::Named(NamedKey::PageUp),
        Key::PageDown => KeyCode::Named(NamedKey::PageDown),
        Key::ShiftLeft => KeyCode::Named(NamedKey::LeftShift),
        Key::ShiftRight => KeyCode::Named(NamedKey::RightShift),
        Key::ControlLeft => KeyCode::Named(NamedKey::LeftCtrl),
        Key::ControlRight => KeyCode::Named(NamedKey::RightCtrl),
        Key::Digit0 => KeyCode::Digit(0),
        Key::Digit1 => KeyCode::Digit(1),
        Key::Digit2 => KeyCode::Digit(2),
        Key::Digit3 => KeyCode::Digit(3),
        Key::Digit4 => KeyCode::Digit(4),
        Key::Digit5 => KeyCode::Digit(5),
        Key::Digit6 => KeyCode::Digit(6),
        Key::Digit7 => KeyCode::Digit(7),
        Key::Digit8 => KeyCode::Digit(8),
        Key::Digit9 => KeyCode::Digit(9),
        Key::KeyA => KeyCode::Character('A'),
        Key::KeyB => KeyCode::Character('B'),
        Key::KeyC => KeyCode::Character('C'),
        Key::KeyD => KeyCode::Character('D'),
        Key::KeyE => KeyCode::Character('E'),
        Key::KeyF => KeyCode::Character('F'),
        Key::KeyG => KeyCode::Character('G'),
        Key::KeyH => KeyCode::Character('H'),
        Key::KeyI => KeyCode::Character('I'),
        Key::KeyJ => KeyCode::Character('J'),
        Key::KeyK => KeyCode::Character('K'),
        Key::KeyL => KeyCode::Character('L'),
        Key::KeyM => KeyCode::Character('M'),
        Key::KeyN => KeyCode::Character('N'),
        Key::KeyO => KeyCode::Character('O'),
        Key::KeyP => KeyCode::Character('P'),
        Key::KeyQ => KeyCode::Character('Q'),
        Key::KeyR => KeyCode::Character('R'),
        Key::KeyS => KeyCode::Character('S'),
        Key::KeyT => KeyCode::Character('T'),
        Key::KeyU => KeyCode::Character('U'),
        Key::KeyV => KeyCode::Character('V'),
        Key::KeyW => KeyCode::Character('W'),
        Key::KeyX => KeyCode::Character('X'),
        Key::KeyY => KeyCode::Character('Y'),
        Key::KeyZ => KeyCode::Character('Z'),
        Key::F1 => KeyCode::Function(1),
        Key::F2 => KeyCode::Function(2),
        Key::F3 => KeyCode::Function(3),
        Key::F4 => KeyCode::Function(4),
        Key::F5 => KeyCode::Function(5),
        Key::F6 => KeyCode::Function(6),
        Key::F7 => KeyCode::Function(7),
        Key::F8 => KeyCode::Function(8),
        Key::F9 => KeyCode::Function(9),
        Key::F10 => KeyCode::Function(10),
        Key::F11 => KeyCode::Function(11),
        Key::F12 => KeyCode::Function(12),
        _ => return None,
    })
}
