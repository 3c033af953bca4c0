use super::{frequency_labels, label_span, Geometry, Visualization};
use crate::audio::analysis::{AnalysisFrame, MAX_FFT_OUTPUT};
use crate::audio::pcm::PcmFormat;
use crate::session::HistorySnapshot;

/// Line plots of the most recent frame: spectrum across the whole window,
/// waveform squeezed into the lower half.
pub struct Spectrogram2d {
    target_fps: u32,
    max_fft_output: f64,
}

impl Spectrogram2d {
    pub fn new(target_fps: u32, max_fft_output: f64) -> Self {
        Self {
            target_fps,
            max_fft_output,
        }
    }

    pub fn spectrum_strip(&self, spectrum: &[f64]) -> Vec<[f32; 2]> {
        let labels = frequency_labels(spectrum.len(), self.target_fps);
        let span = label_span(&labels);
        labels
            .iter()
            .zip(spectrum)
            .map(|(&label, &v)| {
                [
                    (2.0 * (label / span - 0.5)) as f32,
                    (v / self.max_fft_output) as f32,
                ]
            })
            .collect()
    }

    pub fn waveform_strip(waveform: &[f64], format: &PcmFormat) -> Vec<[f32; 2]> {
        let span = waveform.len().saturating_sub(1).max(1) as f64;
        waveform
            .iter()
            .enumerate()
            .map(|(i, &v)| {
                [
                    (2.0 * (i as f64 / span - 0.5)) as f32,
                    (format.scale_sample(v) / 4.0 - 0.5) as f32,
                ]
            })
            .collect()
    }

    fn lines(&self, frame: &AnalysisFrame, format: &PcmFormat) -> Geometry {
        Geometry::Lines {
            spectrum: self.spectrum_strip(&frame.spectrum),
            waveform: Self::waveform_strip(&frame.waveform, format),
        }
    }
}

impl Default for Spectrogram2d {
    fn default() -> Self {
        Self::new(50, MAX_FFT_OUTPUT)
    }
}

impl Visualization for Spectrogram2d {
    fn display(&mut self, snapshot: &HistorySnapshot) -> Geometry {
        match (snapshot.latest(), &snapshot.format) {
            (Some(frame), Some(format)) => self.lines(frame, format),
            _ => Geometry::Empty,
        }
    }

    fn frames_wanted(&self) -> usize {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::pcm::SampleEncoding;
    use std::sync::Arc;

    fn format(channels: u16, encoding: SampleEncoding) -> PcmFormat {
        PcmFormat {
            sample_rate: 44_100,
            channels,
            encoding,
        }
    }

    #[test]
    fn spectrum_spans_the_window() {
        let plot = Spectrogram2d::default();
        let strip = plot.spectrum_strip(&[0.0, MAX_FFT_OUTPUT / 2.0, MAX_FFT_OUTPUT]);
        assert_eq!(strip, vec![[-1.0, 0.0], [0.0, 0.5], [1.0, 1.0]]);
    }

    #[test]
    fn single_bin_spectrum_stays_finite() {
        let plot = Spectrogram2d::default();
        let strip = plot.spectrum_strip(&[42.0]);
        assert_eq!(strip.len(), 1);
        assert_eq!(strip[0][0], -1.0);
        assert!(strip[0][1].is_finite());
    }

    #[test]
    fn waveform_sits_in_the_lower_half() {
        let strip = Spectrogram2d::waveform_strip(
            &[0.0, i16::MAX as f64, -(i16::MAX as f64)],
            &format(1, SampleEncoding::S16),
        );
        assert_eq!(strip, vec![[-1.0, -0.5], [0.0, -0.25], [1.0, -0.75]]);
    }

    #[test]
    fn unsigned_silence_is_centred() {
        let strip = Spectrogram2d::waveform_strip(
            &[2.0 * 128.0, 2.0 * 128.0],
            &format(2, SampleEncoding::U8),
        );
        assert!(strip.iter().all(|p| (p[1] + 0.5).abs() < 1e-6));
    }

    #[test]
    fn displays_only_the_latest_frame() {
        let mut plot = Spectrogram2d::default();
        let older = Arc::new(AnalysisFrame {
            waveform: vec![0.0; 8],
            spectrum: vec![0.0; 4],
        });
        let newer = Arc::new(AnalysisFrame {
            waveform: vec![0.0; 6],
            spectrum: vec![0.0; 3],
        });
        let snapshot = HistorySnapshot {
            frames: vec![newer, older],
            format: Some(format(1, SampleEncoding::S16)),
        };

        match plot.display(&snapshot) {
            Geometry::Lines { spectrum, waveform } => {
                assert_eq!(spectrum.len(), 3);
                assert_eq!(waveform.len(), 6);
            }
            other => panic!("expected lines, got {:?}", other),
        }
    }

    #[test]
    fn empty_history_draws_nothing() {
        let mut plot = Spectrogram2d::default();
        let snapshot = HistorySnapshot {
            frames: Vec::new(),
            format: Some(format(1, SampleEncoding::S16)),
        };
        assert_eq!(plot.display(&snapshot), Geometry::Empty);
    }
}
