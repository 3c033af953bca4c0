use super::camera::OrbitCamera;
use super::grid::Grid;
use super::{frequency_labels, label_span, Geometry, KeyState, Visualization};
use crate::audio::analysis::MAX_FFT_OUTPUT;
use crate::config::CameraConfig;
use crate::session::HistorySnapshot;

/// The last `depth` spectra as a point cloud: frequency along x, magnitude
/// along y, age along z (most recent frame at z = -1).
pub struct Surface3d {
    camera: OrbitCamera,
    aspect: f32,
    depth: usize,
    target_fps: u32,
    sqrt_max_fft_output: f64,
}

impl Surface3d {
    pub fn new(camera: &CameraConfig, depth: usize, target_fps: u32, max_fft_output: f64) -> Self {
        Self {
            camera: OrbitCamera::new(camera),
            aspect: 1.0,
            depth,
            target_fps,
            sqrt_max_fft_output: max_fft_output.sqrt(),
        }
    }

    #[cfg(test)]
    pub fn camera(&self) -> &OrbitCamera {
        &self.camera
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect;
    }

    /// Grid of `(bin i, frame j)` vertices for every frame whose spectrum has
    /// as many bins as the longest one in `snapshot`.
    pub fn vertices(&self, snapshot: &HistorySnapshot) -> Grid<[f32; 3]> {
        let bins = snapshot
            .frames
            .iter()
            .map(|f| f.spectrum.len())
            .max()
            .unwrap_or(0);
        let depth = snapshot.frames.len();

        let rows: Vec<(usize, &[f64])> = snapshot
            .frames
            .iter()
            .enumerate()
            .filter(|(j, f)| {
                let aligned = f.spectrum.len() == bins;
                if !aligned {
                    log::trace!(
                        "Skipping frame {} with {} bins, expected {}",
                        j,
                        f.spectrum.len(),
                        bins
                    );
                }
                aligned
            })
            .map(|(j, f)| (j, f.spectrum.as_slice()))
            .collect();

        let labels = frequency_labels(bins, self.target_fps);
        let span = label_span(&labels);

        let mut grid = Grid::new(bins, rows.len(), [0.0; 3]);
        for (i, &label) in labels.iter().enumerate() {
            let x = 2.0 * label / span - 1.0;
            for (column, &(j, spectrum)) in rows.iter().enumerate() {
                let y = 2.0 * spectrum[i].sqrt() / self.sqrt_max_fft_output - 1.0;
                let z = 2.0 * j as f64 / depth as f64 - 1.0;
                grid.set(i, column, [x as f32, y as f32, z as f32]);
            }
        }
        grid
    }
}

impl Default for Surface3d {
    fn default() -> Self {
        Self::new(&CameraConfig::default(), 250, 50, MAX_FFT_OUTPUT)
    }
}

impl Visualization for Surface3d {
    fn display(&mut self, snapshot: &HistorySnapshot) -> Geometry {
        if snapshot.is_empty() {
            return Geometry::Empty;
        }
        Geometry::Points {
            vertices: self.vertices(snapshot).into_vec(),
            view_proj: self.camera.view_proj(self.aspect),
        }
    }

    fn handle_input(&mut self, keys: &KeyState) {
        self.camera.handle_input(keys);
    }

    fn frames_wanted(&self) -> usize {
        self.depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::analysis::AnalysisFrame;
    use crate::render::CameraKey;
    use std::sync::Arc;

    fn frame(spectrum: Vec<f64>) -> Arc<AnalysisFrame> {
        Arc::new(AnalysisFrame {
            waveform: vec![0.0; spectrum.len() * 2],
            spectrum,
        })
    }

    fn snapshot(frames: Vec<Arc<AnalysisFrame>>) -> HistorySnapshot {
        HistorySnapshot {
            frames,
            format: None,
        }
    }

    #[test]
    fn grid_covers_every_bin_and_frame() {
        let surface = Surface3d::default();
        let snapshot = snapshot(vec![
            frame(vec![0.0, MAX_FFT_OUTPUT, 0.0]),
            frame(vec![MAX_FFT_OUTPUT / 4.0, 0.0, 0.0]),
        ]);

        let grid = surface.vertices(&snapshot);
        assert_eq!(grid.rows(), 3);
        assert_eq!(grid.cols(), 2);

        // bin 1 of the most recent frame is a full-scale peak
        assert_eq!(*grid.get(1, 0), [0.0, 1.0, -1.0]);
        // bin 0 of the older frame: sqrt(1/4) of full scale
        assert_eq!(*grid.get(0, 1), [-1.0, 0.0, 0.0]);
        assert_eq!(grid.get(2, 1)[0], 1.0);
    }

    #[test]
    fn mismatched_frames_are_skipped() {
        let surface = Surface3d::default();
        let snapshot = snapshot(vec![
            frame(vec![0.0; 4]),
            frame(vec![0.0; 3]),
            frame(vec![0.0; 4]),
        ]);

        let grid = surface.vertices(&snapshot);
        assert_eq!(grid.rows(), 4);
        assert_eq!(grid.cols(), 2);
        // The surviving older frame keeps its place in depth.
        let z = grid.get(0, 1)[2];
        assert!((z - (2.0 * 2.0 / 3.0 - 1.0) as f32).abs() < 1e-6);
    }

    #[test]
    fn single_bin_frames_stay_finite() {
        let surface = Surface3d::default();
        let grid = surface.vertices(&snapshot(vec![frame(vec![9.0])]));
        assert!(grid.as_slice().iter().flatten().all(|c| c.is_finite()));
    }

    #[test]
    fn display_carries_the_camera_transform() {
        let mut surface = Surface3d::default();
        surface.set_aspect(2.0);
        let mut keys = KeyState::default();
        keys.press(CameraKey::Left);
        surface.handle_input(&keys);

        match surface.display(&snapshot(vec![frame(vec![1.0, 2.0])])) {
            Geometry::Points {
                vertices,
                view_proj,
            } => {
                assert_eq!(vertices.len(), 2);
                assert_eq!(view_proj, surface.camera().view_proj(2.0));
            }
            other => panic!("expected points, got {:?}", other),
        }
        assert_eq!(surface.camera().azimuth, -3.0);
    }

    #[test]
    fn empty_snapshot_draws_nothing() {
        let mut surface = Surface3d::default();
        assert_eq!(surface.display(&snapshot(Vec::new())), Geometry::Empty);
        assert_eq!(surface.frames_wanted(), 250);
    }
}
