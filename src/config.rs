// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Every section falls back to defaults, so a partial config.toml only needs
// the values it wants to change. A missing or broken file is not fatal.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use winit::keyboard::KeyCode;

use crate::scene::{MAX_QUADS, MIN_QUADS};

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub physics: PhysicsConfig,
    pub player: PlayerConfig,
    pub enemies: EnemyConfig,
    pub debug: DebugConfig,
    pub controls: ControlsConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Bounce".to_string(),
            width: 800,
            height: 800,
            fullscreen: false,
            resizable: true,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub present_mode: String,
    pub clear_color: [f32; 4],
    /// Sizes the vertex buffer (6 vertices per quad)
    pub max_quads: usize,
    /// Adds a D32 depth attachment
    pub depth_test: bool,
    /// Directory holding quad.vert.spv / quad.frag.spv
    pub shader_dir: PathBuf,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "fifo".to_string(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            max_quads: 64,
            depth_test: true,
            shader_dir: PathBuf::from("shaders"),
        }
    }
}

/// Physics tuning
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Downward acceleration of the player (+y is down)
    pub gravity: f32,
    pub jump_velocity: f32,
    /// Seconds per tick; unset = integrate with the measured frame time
    pub fixed_timestep: Option<f32>,
    /// Frame times above this are clamped
    pub max_frame_dt: f32,
    /// Fixed ticks run per frame at most; the rest is dropped
    pub max_steps_per_frame: u32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: 1.3,
            jump_velocity: 1.2,
            fixed_timestep: None,
            max_frame_dt: 0.1,
            max_steps_per_frame: 8,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            x: -0.8,
            y: -0.5,
            width: 0.2,
            height: 0.2,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EnemyConfig {
    pub enabled: bool,
    /// Fixed RNG seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for EnemyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            seed: None,
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub log_to_file: bool,
    pub log_file: String,
    pub show_fps: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            log_to_file: false,
            log_file: "bounce.log".to_string(),
            show_fps: true,
        }
    }
}

/// Control key bindings, written as winit `KeyCode` names ("KeyE", "Digit5")
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ControlsConfig {
    pub jump_key: KeyCode,
    pub fullscreen_key: KeyCode,
    pub quit_key: KeyCode,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            jump_key: KeyCode::Space,
            fullscreen_key: KeyCode::F11,
            quit_key: KeyCode::Escape,
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path("config.toml").unwrap_or_else(|e| {
            log::warn!("Failed to load config.toml: {:#}. Using defaults.", e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    /// Parse and validate a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.player.width <= 0.0 || self.player.height <= 0.0 {
            anyhow::bail!(
                "player size must be positive, got {}x{}",
                self.player.width,
                self.player.height
            );
        }
        if !(MIN_QUADS..=MAX_QUADS).contains(&self.graphics.max_quads) {
            anyhow::bail!(
                "graphics.max_quads must be within {}..={}, got {}",
                MIN_QUADS,
                MAX_QUADS,
                self.graphics.max_quads
            );
        }
        if !is_positive(self.physics.max_frame_dt) {
            anyhow::bail!(
                "physics.max_frame_dt must be positive, got {}",
                self.physics.max_frame_dt
            );
        }
        if let Some(step) = self.physics.fixed_timestep {
            if !is_positive(step) {
                anyhow::bail!("physics.fixed_timestep must be positive, got {}", step);
            }
        }
        if self.physics.max_steps_per_frame == 0 {
            anyhow::bail!("physics.max_steps_per_frame must be at least 1");
        }
        Ok(())
    }

    /// Get present mode as Vulkan enum
    pub fn get_present_mode(&self) -> ash::vk::PresentModeKHR {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "immediate" => ash::vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => ash::vk::PresentModeKHR::MAILBOX,
            "fifo" => ash::vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => ash::vk::PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to FIFO",
                    self.graphics.present_mode
                );
                ash::vk::PresentModeKHR::FIFO
            }
        }
    }
}

/// Finite and > 0 (rejects NaN)
fn is_positive(value: f32) -> bool {
    value > 0.0 && value.is_finite()
}
