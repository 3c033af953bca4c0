//! The body of the realtime output callback.
//!
//! Each invocation copies the next chunk of the track into the device buffer
//! and turns the same bytes into one analysis frame for the renderer. Nothing
//! in here returns an error or blocks on anything but the history lock.

use std::sync::Arc;

use super::analysis::SpectralAnalyzer;
use super::pcm::{PcmBuffer, PcmFormat};
use crate::session::SharedSession;

pub struct PlaybackClock {
    track: Arc<PcmBuffer>,
    session: Arc<SharedSession>,
    analyzer: SpectralAnalyzer,
}

impl PlaybackClock {
    pub fn new(track: Arc<PcmBuffer>, session: Arc<SharedSession>) -> Self {
        Self {
            track,
            session,
            analyzer: SpectralAnalyzer::new(),
        }
    }

    /// Plan the transform for callbacks of `frames` frames before the
    /// clock is handed to the audio thread.
    pub fn prepare(&mut self, frames: usize) {
        self.analyzer.prepare(frames);
    }

    /// Fill `out` with the next bytes of the track, padding with silence once
    /// the track runs out.
    pub fn fill(&mut self, out: &mut [u8]) {
        let format = *self.track.format();
        let cursor = self.track.processed_bytes();
        let left = self.track.remaining();

        if left == 0 || out.is_empty() {
            format.encoding.fill_silence(out);
            if left == 0 {
                self.session.set_playing(false);
            }
            return;
        }

        let copied = out.len().min(left);
        let chunk = &self.track.bytes()[cursor..cursor + copied];
        out[..copied].copy_from_slice(chunk);
        format.encoding.fill_silence(&mut out[copied..]);

        let waveform = downmix(chunk, &format);
        let frame = self.analyzer.analyze(waveform);
        self.session.push_frame(frame);

        self.track.advance(copied);
        if self.track.processed_bytes() == self.track.len() {
            self.session.signal_finished();
        }
    }
}

/// Sum every interleaved frame of `bytes` across channels.
///
/// Panics if `bytes` does not hold a whole number of frames.
pub fn downmix(bytes: &[u8], format: &PcmFormat) -> Vec<f64> {
    let frame_bytes = format.frame_bytes();
    assert_eq!(
        bytes.len() % frame_bytes,
        0,
        "downmix over a partial frame"
    );

    let width = format.sample_bytes();
    bytes
        .chunks_exact(frame_bytes)
        .map(|frame| {
            frame
                .chunks_exact(width)
                .map(|sample| format.encoding.read(sample))
                .sum()
        })
        .collect()
}
