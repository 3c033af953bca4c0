pub mod camera;
pub mod gpu;
pub mod grid;
pub mod pipeline;
pub mod spectrogram;
pub mod surface;

use std::collections::HashSet;
use std::fmt;

use glam::Mat4;
use serde::Deserialize;

use crate::session::HistorySnapshot;

/// Normalized-coordinate output of one visualization pass, ready for upload.
#[derive(Clone, Debug, PartialEq)]
pub enum Geometry {
    /// Nothing to draw (no frames yet); the target is just cleared.
    Empty,
    /// Two line strips in clip space.
    Lines {
        spectrum: Vec<[f32; 2]>,
        waveform: Vec<[f32; 2]>,
    },
    /// A point cloud in model space plus the camera transform to draw it with.
    Points {
        vertices: Vec<[f32; 3]>,
        view_proj: Mat4,
    },
}

pub trait Visualization {
    /// One-time setup before the first `display`.
    fn init(&mut self) {}

    /// Derive this tick's geometry. Runs on the render thread after the
    /// history lock has been released.
    fn display(&mut self, snapshot: &HistorySnapshot) -> Geometry;

    /// React to the keys held during this tick.
    fn handle_input(&mut self, _keys: &KeyState) {}

    /// How many of the most recent frames `display` wants to see.
    fn frames_wanted(&self) -> usize;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
pub enum VisualizationMode {
    /// Latest spectrum and waveform as line plots
    #[default]
    #[value(name = "2d")]
    #[serde(rename = "2d")]
    TwoD,
    /// Recent spectra as an orbitable point surface
    #[value(name = "3d")]
    #[serde(rename = "3d")]
    ThreeD,
}

impl VisualizationMode {
    pub fn toggle(self) -> Self {
        match self {
            Self::TwoD => Self::ThreeD,
            Self::ThreeD => Self::TwoD,
        }
    }
}

impl fmt::Display for VisualizationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::TwoD => "2D",
            Self::ThreeD => "3D",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CameraKey {
    Left,
    Right,
    Up,
    Down,
    ZoomIn,
    ZoomOut,
}

impl CameraKey {
    pub const ALL: [CameraKey; 6] = [
        CameraKey::Left,
        CameraKey::Right,
        CameraKey::Up,
        CameraKey::Down,
        CameraKey::ZoomIn,
        CameraKey::ZoomOut,
    ];
}

/// Camera keys currently held down, sampled once per render tick.
#[derive(Clone, Debug, Default)]
pub struct KeyState {
    held: HashSet<CameraKey>,
}

impl KeyState {
    pub fn press(&mut self, key: CameraKey) {
        self.held.insert(key);
    }

    pub fn release(&mut self, key: CameraKey) {
        self.held.remove(&key);
    }

    pub fn is_held(&self, key: CameraKey) -> bool {
        self.held.contains(&key)
    }

    pub fn clear(&mut self) {
        self.held.clear();
    }
}

/// Centre frequency in Hz of each of `bins` spectrum bins, given that one
/// analysis frame spans `1 / target_fps` seconds.
pub fn frequency_labels(bins: usize, target_fps: u32) -> Vec<f64> {
    (0..bins).map(|i| (i as u64 * target_fps as u64) as f64).collect()
}

/// Range covered by `labels` measured from zero; a degenerate range counts
/// as 1 so it can always be divided by.
pub fn label_span(labels: &[f64]) -> f64 {
    let (min, max) = labels
        .iter()
        .fold((0.0f64, 0.0f64), |(lo, hi), &l| (lo.min(l), hi.max(l)));
    let span = max - min;
    if span > 0.0 {
        span
    } else {
        1.0
    }
}
