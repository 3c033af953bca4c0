use std::collections::HashMap;
use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};

/// Largest FFT magnitude expected from typical program material when one
/// analysis frame spans 1/50 s of audio (so bins are 50 Hz apart).
/// Used for display normalization only.
pub const MAX_FFT_OUTPUT: f64 = 11_000_000.0;

/// Distinct transform lengths kept planned at once.
const MAX_CACHED_PLANS: usize = 8;

/// One callback's worth of downmixed samples and their spectrum.
#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisFrame {
    /// Downmixed time-domain samples, in raw sample units summed over channels
    pub waveform: Vec<f64>,
    /// Magnitude per frequency bin, lowest bin first
    pub spectrum: Vec<f64>,
}

/// Real-input DFT magnitudes with plan and buffer reuse.
///
/// The output depends only on the input; the cached plans and buffers exist so
/// the realtime thread stops allocating once it has seen a callback size.
/// Plans are cached as `Arc`s so the analyzer stays `Send`. At most
/// `MAX_CACHED_PLANS` lengths are kept; the cache starts over when full.
pub struct SpectralAnalyzer {
    plans: HashMap<usize, Arc<dyn RealToComplex<f64>>>,
    input: Vec<f64>,
    output: Vec<Complex<f64>>,
    scratch: Vec<Complex<f64>>,
}

impl SpectralAnalyzer {
    pub fn new() -> Self {
        Self {
            plans: HashMap::new(),
            input: Vec::new(),
            output: Vec::new(),
            scratch: Vec::new(),
        }
    }

    fn plan(&mut self, n: usize) -> Arc<dyn RealToComplex<f64>> {
        if !self.plans.contains_key(&n) && self.plans.len() >= MAX_CACHED_PLANS {
            log::debug!("FFT plan cache full, dropping {} plans", self.plans.len());
            self.plans.clear();
        }
        Arc::clone(
            self.plans
                .entry(n)
                .or_insert_with(|| RealFftPlanner::<f64>::new().plan_fft_forward(n)),
        )
    }

    /// Plan the transform and size the buffers for `n`-sample frames, so the
    /// first frame of that length does no planning or allocation.
    pub fn prepare(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        let fft = self.plan(n);
        self.input.reserve(n);
        self.output.reserve(n / 2 + 1);
        self.scratch.reserve(fft.get_scratch_len());
    }

    /// Magnitudes of the `N/2` lowest-frequency bins of `samples`
    /// (a single bin for `N == 1`). Unwindowed and unnormalized.
    ///
    /// Panics on an empty slice.
    pub fn amplitudes(&mut self, samples: &[f64]) -> Vec<f64> {
        assert!(!samples.is_empty(), "spectral analysis of an empty slice");

        let n = samples.len();
        let fft = self.plan(n);

        // The transform uses its input as scratch space.
        self.input.clear();
        self.input.extend_from_slice(samples);
        self.output.clear();
        self.output.resize(n / 2 + 1, Complex::new(0.0, 0.0));
        self.scratch.clear();
        self.scratch
            .resize(fft.get_scratch_len(), Complex::new(0.0, 0.0));

        fft.process_with_scratch(&mut self.input, &mut self.output, &mut self.scratch)
            .expect("FFT buffers are sized from the plan");

        let bins = (n / 2).max(1);
        self.output[..bins].iter().map(|c| c.norm()).collect()
    }

    pub fn analyze(&mut self, waveform: Vec<f64>) -> AnalysisFrame {
        let spectrum = self.amplitudes(&waveform);
        AnalysisFrame { waveform, spectrum }
    }
}

impl Default for SpectralAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot form of [`SpectralAnalyzer::amplitudes`].
#[cfg(test)]
pub fn amplitudes(samples: &[f64]) -> Vec<f64> {
    SpectralAnalyzer::new().amplitudes(samples)
}

/// Index of the largest magnitude, if any.
#[cfg(test)]
pub fn peak_bin(spectrum: &[f64]) -> Option<usize> {
    spectrum
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustfft::FftPlanner;
    use std::f64::consts::PI;

    /// Deterministic pseudo-random samples in [-1, 1).
    fn noise(n: usize, mut seed: u64) -> Vec<f64> {
        (0..n)
            .map(|_| {
                seed = seed
                    .wrapping_mul(6_364_136_223_846_793_005)
                    .wrapping_add(1_442_695_040_888_963_407);
                (seed >> 11) as f64 / (1u64 << 53) as f64 * 2.0 - 1.0
            })
            .collect()
    }

    #[test]
    fn matches_full_complex_transform() {
        for &n in &[2usize, 16, 64, 882, 1024] {
            let samples = noise(n, n as u64);
            let ours = amplitudes(&samples);

            let mut reference: Vec<rustfft::num_complex::Complex<f64>> = samples
                .iter()
                .map(|&s| rustfft::num_complex::Complex::new(s, 0.0))
                .collect();
            FftPlanner::new().plan_fft_forward(n).process(&mut reference);

            assert_eq!(ours.len(), n / 2);
            for (i, (a, b)) in ours.iter().zip(reference.iter()).enumerate() {
                assert!(
                    (a - b.norm()).abs() < 1e-9 * (1.0 + b.norm()),
                    "bin {} of {}: {} vs {}",
                    i,
                    n,
                    a,
                    b.norm()
                );
            }
        }
    }

    #[test]
    fn sine_peaks_at_expected_bin() {
        let rate = 44_100.0;
        let samples: Vec<f64> = (0..4096)
            .map(|i| {
                let v = (2.0 * PI * 440.0 * i as f64 / rate).sin() * 16_000.0;
                (v as i16) as f64
            })
            .collect();

        let spectrum = amplitudes(&samples);
        assert_eq!(spectrum.len(), 2048);
        assert_eq!(peak_bin(&spectrum), Some(41));
    }

    #[test]
    fn single_sample_is_its_absolute_value() {
        assert_eq!(amplitudes(&[-3.5]), vec![3.5]);
    }

    #[test]
    fn odd_lengths_drop_the_upper_half() {
        let spectrum = amplitudes(&noise(7, 3));
        assert_eq!(spectrum.len(), 3);
    }

    #[test]
    fn reuses_plans_across_lengths() {
        let mut analyzer = SpectralAnalyzer::new();
        let a = analyzer.amplitudes(&noise(64, 1));
        let _ = analyzer.amplitudes(&noise(30, 2));
        let b = analyzer.amplitudes(&noise(64, 1));
        assert_eq!(a, b);
        assert_eq!(analyzer.plans.len(), 2);
    }

    #[test]
    fn prepare_plans_ahead_of_the_first_frame() {
        let mut analyzer = SpectralAnalyzer::new();
        analyzer.prepare(882);
        analyzer.prepare(0);
        assert!(analyzer.plans.contains_key(&882));
        assert_eq!(analyzer.plans.len(), 1);
        assert!(analyzer.input.capacity() >= 882);
        assert!(analyzer.output.capacity() >= 442);

        let _ = analyzer.amplitudes(&noise(882, 5));
        assert_eq!(analyzer.plans.len(), 1);
    }

    #[test]
    fn plan_cache_stays_bounded() {
        let mut analyzer = SpectralAnalyzer::new();
        for n in 100..140 {
            let spectrum = analyzer.amplitudes(&noise(n, n as u64));
            assert_eq!(spectrum.len(), n / 2);
            assert!(analyzer.plans.len() <= MAX_CACHED_PLANS);
        }
        assert!(analyzer.plans.contains_key(&139));
    }

    #[test]
    fn analyzer_can_move_to_another_thread() {
        fn assert_send<T: Send>() {}
        assert_send::<SpectralAnalyzer>();
    }

    #[test]
    fn dc_input_lands_in_bin_zero() {
        let spectrum = amplitudes(&[2.0; 8]);
        assert!((spectrum[0] - 16.0).abs() < 1e-12);
        assert!(spectrum[1..].iter().all(|&m| m.abs() < 1e-12));
    }

    #[test]
    #[should_panic(expected = "empty slice")]
    fn empty_input_is_fatal() {
        amplitudes(&[]);
    }
}
