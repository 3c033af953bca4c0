use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::audio::analysis::MAX_FFT_OUTPUT;
use crate::audio::pcm::SampleEncoding;
use crate::render::VisualizationMode;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub view: ViewConfig,
    #[serde(default)]
    pub camera: CameraConfig,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    #[serde(default)]
    pub encoding: SampleEncoding,
    #[serde(default = "default_target_fps")]
    pub target_fps: u32,
    #[serde(default = "default_history_seconds")]
    pub history_seconds: u32,
    /// Spectrum magnitude drawn at full height
    #[serde(default = "default_max_fft_output")]
    pub max_fft_output: f64,
}

#[derive(Debug, Deserialize)]
pub struct ViewConfig {
    #[serde(default)]
    pub mode: VisualizationMode,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CameraConfig {
    #[serde(default = "default_angle_step")]
    pub angle_step_degrees: f32,
    #[serde(default = "default_distance_step")]
    pub distance_step: f32,
    #[serde(default = "default_draw_distance")]
    pub draw_distance: f32,
}

impl AudioConfig {
    /// Frames kept in the visualization history.
    pub fn history_capacity(&self) -> usize {
        (self.target_fps as usize * self.history_seconds as usize).max(1)
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            encoding: SampleEncoding::default(),
            target_fps: default_target_fps(),
            history_seconds: default_history_seconds(),
            max_fft_output: default_max_fft_output(),
        }
    }
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            mode: VisualizationMode::default(),
            width: default_width(),
            height: default_height(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            angle_step_degrees: default_angle_step(),
            distance_step: default_distance_step(),
            draw_distance: default_draw_distance(),
        }
    }
}

fn default_target_fps() -> u32 { 50 }
fn default_history_seconds() -> u32 { 5 }
fn default_max_fft_output() -> f64 { MAX_FFT_OUTPUT }
fn default_width() -> u32 { 800 }
fn default_height() -> u32 { 600 }
fn default_angle_step() -> f32 { 3.0 }
fn default_distance_step() -> f32 { 0.05 }
fn default_draw_distance() -> f32 { 10.0 }

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// `explicit` if given, else the first existing of `./visualizer.toml`,
/// `~/.config/mp3-visualizer/config.toml` and the platform config dir.
pub fn discover_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("visualizer.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("mp3-visualizer").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("mp3-visualizer").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}
