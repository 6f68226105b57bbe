//! Runtime configuration.
//!
//! Configuration is plain TOML:
//!
//! ```toml
//! frame_rate = 60.0
//! max_import_loop_iterations = 1000
//! default_loop_iterations_per_frame = 1
//! max_script_operations = 1000000
//!
//! [stage]
//! width = 480
//! height = 360
//! ```
//!
//! Every field is optional; missing fields take their defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// Frames per second unless configured otherwise.
pub const DEFAULT_FRAME_RATE: f64 = 60.0;

/// Loop iterations allowed outside any thread before giving up.
pub const DEFAULT_MAX_IMPORT_LOOP_ITERATIONS: u64 = 1000;

/// Rhai operations one scripted handler call may run without pausing.
pub const DEFAULT_MAX_SCRIPT_OPERATIONS: u64 = 1_000_000;

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Frames per second driven by the host.
    pub frame_rate: f64,
    /// Cap on top-level loop iterations outside any thread.
    pub max_import_loop_iterations: u64,
    /// Bottom entry of every thread's loop-rate stack (0 = never yield).
    pub default_loop_iterations_per_frame: u32,
    /// Cap on Rhai operations per scripted handler call; a handler that
    /// runs past it fails instead of stalling the frame.
    pub max_script_operations: u64,
    /// Stage geometry.
    pub stage: StageSettings,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            frame_rate: DEFAULT_FRAME_RATE,
            max_import_loop_iterations: DEFAULT_MAX_IMPORT_LOOP_ITERATIONS,
            default_loop_iterations_per_frame: 1,
            max_script_operations: DEFAULT_MAX_SCRIPT_OPERATIONS,
            stage: StageSettings::default(),
        }
    }
}

impl RuntimeConfig {
    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: RuntimeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Load configuration or fall back to defaults, logging why.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path.as_ref()) {
            Ok(config) => config,
            Err(e) => {
                log::warn!(
                    "Using default runtime config ({}): {}",
                    path.as_ref().display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Check the values make sense.
    pub fn validate(&self) -> Result<()> {
        if !(self.frame_rate.is_finite() && self.frame_rate > 0.0) {
            return Err(Error::Config(format!(
                "frame_rate must be a positive number, got {}",
                self.frame_rate
            )));
        }
        if self.max_script_operations == 0 {
            return Err(Error::Config(
                "max_script_operations must be at least 1".to_string(),
            ));
        }
        if self.stage.width == 0 || self.stage.height == 0 {
            return Err(Error::Config("stage size must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Seconds of simulated time one frame stands for.
    pub fn frame_seconds(&self) -> f64 {
        1.0 / self.frame_rate
    }

    /// One frame's time budget.
    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(self.frame_seconds())
    }
}

/// Stage geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageSettings {
    /// Stage width in stage units.
    pub width: u32,
    /// Stage height in stage units.
    pub height: u32,
}

impl Default for StageSettings {
    fn default() -> Self {
        Self {
            width: 480,
            height: 360,
        }
    }
}

impl StageSettings {
    /// Half-width; stage x runs from `-half_width` to `half_width`.
    pub fn half_width(&self) -> f64 {
        f64::from(self.width) / 2.0
    }

    /// Half-height; stage y runs from `-half_height` to `half_height`.
    pub fn half_height(&self) -> f64 {
        f64::from(self.height) / 2.0
    }
}
