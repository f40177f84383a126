// =============================================================================
// BOUNCE - a tiny Vulkan side-scroller
// =============================================================================
//
// A player square under gravity, one enemy at a time sliding in from the
// right, and a ground strip. Everything is drawn as colored quads.
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  App (winit event loop, input, FPS title)                       │
// │    ├── SimulationContext (player, enemies, fixed timestep)      │
// │    ├── SceneComposer (bodies -> vertices + per-quad offsets)    │
// │    └── FrameSynchronizer                                        │
// │          └── DeviceProvider (Vulkan device, swapchain, buffers) │
// └─────────────────────────────────────────────────────────────────┘
//
// FRAME FLOW (one RedrawRequested):
// 1. Advance the simulation by the measured frame time
// 2. Compose the scene
// 3. Rebuild the swapchain if it went stale
// 4. wait fence -> acquire -> reset fence -> upload + record -> submit -> present
//
// =============================================================================

mod backend;
mod config;
mod frame;
mod input;
mod scene;
mod sim;

use anyhow::{Context, Result};
use backend::DeviceProvider;
use config::Config;
use frame::{FrameOutcome, FrameState, FrameSynchronizer};
use input::{Action, KeyBindings};
use scene::SceneComposer;
use sim::SimulationContext;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::PhysicalKey,
    window::{Fullscreen, Window, WindowAttributes},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    // Load configuration from config.toml
    let config = Config::load();

    init_logging(&config)?;
    log::info!("Starting bounce");
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.fullscreen { "fullscreen" } else { "windowed" }
    );
    log::info!("Present mode: {}", config.graphics.present_mode);

    let bindings = KeyBindings::from_config(&config.controls);

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config, bindings);
    event_loop.run_app(&mut app)?;

    match app.fatal.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Initialize logging, optionally piping everything into the log file
fn init_logging(config: &Config) -> Result<()> {
    use env_logger::{Builder, Target};
    use log::LevelFilter;

    let mut builder = Builder::new();
    builder.filter_level(LevelFilter::Info);
    builder.parse_default_env();

    if config.debug.log_to_file {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&config.debug.log_file)
            .with_context(|| format!("Failed to open log file {:?}", config.debug.log_file))?;

        writeln!(file, "=== Bounce Log ===")?;
        writeln!(file, "Started: {:?}", std::time::SystemTime::now())?;
        writeln!(file)?;

        builder.target(Target::Pipe(Box::new(file)));
    }

    builder.init();
    Ok(())
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// Field order matters for Drop: the provider (and with it the device) goes
/// before the window it presents to.
struct App {
    config: Config,
    bindings: KeyBindings,

    provider: Option<DeviceProvider>,
    window: Option<Arc<Window>>,
    is_fullscreen: bool,

    sim: SimulationContext,
    composer: SceneComposer,
    frames: FrameSynchronizer,
    last_tick: Option<Instant>,

    /// First unrecoverable error; ends the event loop
    fatal: Option<anyhow::Error>,

    // FPS tracking
    frame_count: u32,
    last_fps_update: Instant,
    last_frame_time: Instant,
}

impl App {
    fn new(config: Config, bindings: KeyBindings) -> Self {
        let is_fullscreen = config.window.fullscreen;
        let sim = SimulationContext::from_config(&config);
        let now = Instant::now();
        Self {
            config,
            bindings,
            provider: None,
            window: None,
            is_fullscreen,
            sim,
            composer: SceneComposer::with_ground(),
            frames: FrameSynchronizer::new(),
            last_tick: None,
            fatal: None,
            frame_count: 0,
            last_fps_update: now,
            last_frame_time: now,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{:#}", error);
        if self.fatal.is_none() {
            self.fatal = Some(error);
        }
        event_loop.exit();
    }

    // =========================================================================
    // RENDER LOOP
    // =========================================================================

    /// Advance the world and render one frame.
    ///
    /// Ok(true) if an image was presented.
    fn tick(&mut self) -> Result<bool> {
        let now = Instant::now();
        let dt = self
            .last_tick
            .map(|last| now.duration_since(last).as_secs_f32())
            .unwrap_or(0.0);
        self.last_tick = Some(now);

        self.sim.update(dt);
        let scene = self.composer.compose(&self.sim);
        log::trace!("Composed {} quads", scene.quad_count());

        let Some(provider) = self.provider.as_mut() else {
            return Ok(false);
        };

        provider.prepare_frame()?;

        let result = self.frames.run_frame(provider, &scene);
        debug_assert_eq!(self.frames.state(), FrameState::Idle);

        match result {
            Ok(FrameOutcome::Presented { suboptimal, .. }) => {
                // Suboptimal means swapchain still works but should be recreated
                if suboptimal {
                    provider.mark_swapchain_stale();
                }
                Ok(true)
            }
            Ok(FrameOutcome::Skipped(_)) => Ok(false),
            Err(e) if e.is_recoverable() => {
                log::debug!("Swapchain out of date during {}, rebuilding", e.stage());
                provider.mark_swapchain_stale();
                Ok(false)
            }
            Err(e) => {
                let stage = e.stage();
                Err(anyhow::Error::new(e).context(format!("Frame failed in {} stage", stage)))
            }
        }
    }

    // =========================================================================
    // FULLSCREEN TOGGLE
    // =========================================================================

    fn toggle_fullscreen(&mut self) {
        if let Some(ref window) = self.window {
            self.is_fullscreen = !self.is_fullscreen;

            if self.is_fullscreen {
                // Enter fullscreen (use current monitor)
                window.set_fullscreen(Some(Fullscreen::Borderless(None)));
                log::info!("Entered fullscreen mode");
            } else {
                window.set_fullscreen(None);
                log::info!("Exited fullscreen mode");
            }
            // The Resized event that follows marks the swapchain stale
        }
    }

    // =========================================================================
    // FPS TRACKING
    // =========================================================================

    fn update_fps(&mut self) {
        if !self.config.debug.show_fps {
            return;
        }

        let now = Instant::now();
        let frame_time = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;
        self.frame_count += 1;

        // Update title every second
        let elapsed = now.duration_since(self.last_fps_update).as_secs_f32();
        if elapsed >= 1.0 {
            let fps = self.frame_count as f32 / elapsed;

            if let Some(ref window) = self.window {
                let mode = if self.is_fullscreen { "fullscreen" } else { "windowed" };
                window.set_title(&format!(
                    "{} - {:.0} FPS ({:.2}ms) [{}] enemies: {}",
                    self.config.window.title,
                    fps,
                    frame_time * 1000.0,
                    mode,
                    self.sim.enemy_count()
                ));
            }

            self.frame_count = 0;
            self.last_fps_update = now;
        }
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let mut window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_resizable(self.config.window.resizable)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        if self.config.window.fullscreen {
            window_attributes = window_attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                self.fail(event_loop, anyhow::Error::new(e).context("Failed to create window"));
                return;
            }
        };

        match DeviceProvider::new(&window, &self.config) {
            Ok(provider) => self.provider = Some(provider),
            Err(e) => {
                self.fail(event_loop, e.context("Failed to initialize Vulkan"));
                return;
            }
        }

        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                if let Some(ref mut provider) = self.provider {
                    provider.set_surface_extent(size.width, size.height);
                }
            }

            WindowEvent::RedrawRequested => match self.tick() {
                Ok(true) => self.update_fps(),
                Ok(false) => {}
                Err(e) => self.fail(event_loop, e),
            },

            WindowEvent::KeyboardInput { event, .. } => {
                if !event.state.is_pressed() {
                    return;
                }
                let PhysicalKey::Code(key) = event.physical_key else {
                    return;
                };

                match self.bindings.action_for(key) {
                    Some(Action::Jump) => self.sim.jump(),
                    Some(Action::ToggleFullscreen) => self.toggle_fullscreen(),
                    Some(Action::Quit) => {
                        log::info!("{:?} pressed, exiting...", key);
                        event_loop.exit();
                    }
                    None => {}
                }
            }

            _ => {}
        }
    }

    /// Request continuous redraws
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        log::info!(
            "Presented {} frames, skipped {}",
            self.frames.frames_presented(),
            self.frames.frames_skipped()
        );
        // Tear down Vulkan while the window still exists
        self.provider = None;
    }
}
