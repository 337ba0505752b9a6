//! Probe settings
//!
//! Layered as built-in defaults, then an optional TOML file, then `SENSOR_*`
//! environment variables (`__` separates nested keys, e.g.
//! `SENSOR_SESSION__CAPTURE_TIMEOUT_MS`).

use anyhow::Context;
use config::{Config, Environment, File, FileFormat};
use sensor_hal::sim::SimChip;
use sensor_hal::{FrameSize, PixFormat, SessionConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Chips the simulated board can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoardChip {
    Ov2640,
    Ov5640,
    Gc2145,
    Hm01b0,
    Lepton,
}

impl BoardChip {
    pub fn sim_chip(&self) -> SimChip {
        match self {
            BoardChip::Ov2640 => SimChip::ov2640(),
            BoardChip::Ov5640 => SimChip::ov5640(),
            BoardChip::Gc2145 => SimChip::gc2145(),
            BoardChip::Hm01b0 => SimChip::hm01b0(),
            BoardChip::Lepton => SimChip::lepton(),
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Maximum level (`trace` … `error`)
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub chip: BoardChip,
    pub pixformat: PixFormat,
    pub framesize: FrameSize,
    /// Frames to capture
    pub frames: u32,
    /// Throttled output rate, 0 = as fast as the sensor streams
    pub framerate: u32,
    /// Rate the simulated sensor streams at
    pub sensor_fps: u32,
    /// Write each frame as PNG into this directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_dir: Option<PathBuf>,
    pub log: LogSettings,
    pub session: SessionConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            chip: BoardChip::Ov2640,
            pixformat: PixFormat::Rgb565,
            framesize: FrameSize::Qvga,
            frames: 3,
            framerate: 0,
            sensor_fps: 30,
            save_dir: None,
            log: LogSettings::default(),
            session: SessionConfig::simulation(),
        }
    }
}

impl Settings {
    /// Load settings from the defaults, `path` and the process environment
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        Self::layered(path, environment())
    }

    fn layered(path: Option<&Path>, env: Environment) -> anyhow::Result<Self> {
        let mut builder = Config::builder()
            .add_source(Config::try_from(&Settings::default()).context("encoding default settings")?);
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }

        builder
            .add_source(env)
            .build()
            .and_then(Config::try_deserialize)
            .with_context(|| match path {
                Some(path) => format!("loading settings from {}", path.display()),
                None => "loading settings".to_string(),
            })
    }
}

fn environment() -> Environment {
    Environment::with_prefix("SENSOR")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}
