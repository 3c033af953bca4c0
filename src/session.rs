//! State shared between the realtime audio callback and the render loop.
//!
//! The only thing the two threads exchange is the visualization history,
//! behind one mutex, plus two transport flags that are plain atomics.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::audio::analysis::AnalysisFrame;
use crate::audio::pcm::PcmFormat;

/// Most-recent-first ring of analysis frames, bounded to `capacity`.
///
/// Each entry carries its waveform and spectrum together, so the time-domain
/// and frequency-domain sequences can never drift out of alignment.
#[derive(Debug)]
pub struct VisualizationHistory {
    frames: VecDeque<Arc<AnalysisFrame>>,
    capacity: usize,
}

impl VisualizationHistory {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "visualization history needs room for a frame");
        Self {
            frames: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    pub fn push_front(&mut self, frame: AnalysisFrame) {
        self.frames.push_front(Arc::new(frame));
        self.frames.truncate(self.capacity);
    }

    /// Up to `k` frames, most recent first.
    pub fn latest(&self, k: usize) -> Vec<Arc<AnalysisFrame>> {
        self.frames.iter().take(k).cloned().collect()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Frames copied out of the history for one render tick.
#[derive(Clone, Debug, Default)]
pub struct HistorySnapshot {
    pub frames: Vec<Arc<AnalysisFrame>>,
    /// Format of the track the frames came from, if one is loaded
    pub format: Option<PcmFormat>,
}

impl HistorySnapshot {
    pub fn latest(&self) -> Option<&AnalysisFrame> {
        self.frames.first().map(|f| f.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

pub struct SharedSession {
    history: Mutex<VisualizationHistory>,
    playing: AtomicBool,
    finished: AtomicBool,
}

impl SharedSession {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            history: Mutex::new(VisualizationHistory::new(history_capacity)),
            playing: AtomicBool::new(false),
            finished: AtomicBool::new(false),
        }
    }

    // A panic while holding the lock can't leave the deque half-modified, so
    // a poisoned lock is still safe to use.
    fn history(&self) -> MutexGuard<'_, VisualizationHistory> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push_frame(&self, frame: AnalysisFrame) {
        self.history().push_front(frame);
    }

    pub fn latest(&self, k: usize) -> Vec<Arc<AnalysisFrame>> {
        self.history().latest(k)
    }

    pub fn snapshot(&self, k: usize, format: Option<PcmFormat>) -> HistorySnapshot {
        HistorySnapshot {
            frames: self.latest(k),
            format,
        }
    }

    pub fn clear_history(&self) {
        self.history().clear();
    }

    #[cfg(test)]
    pub fn history_len(&self) -> usize {
        self.history().len()
    }

    #[cfg(test)]
    pub fn history_capacity(&self) -> usize {
        self.history().capacity()
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Release);
    }

    /// Raised by the playback clock when the cursor reaches the end of the track.
    pub fn signal_finished(&self) {
        self.finished.store(true, Ordering::Release);
    }

    /// Consume the finished signal. Returns whether it was raised.
    pub fn take_finished(&self) -> bool {
        self.finished.swap(false, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn frame(tag: f64) -> AnalysisFrame {
        AnalysisFrame {
            waveform: vec![tag; 4],
            spectrum: vec![tag; 2],
        }
    }

    #[test]
    fn history_never_exceeds_capacity() {
        let mut history = VisualizationHistory::new(5);
        for i in 0..23 {
            history.push_front(frame(i as f64));
            assert!(history.len() <= 5);
        }
        assert_eq!(history.len(), 5);
    }

    #[test]
    fn latest_is_most_recent_first() {
        let mut history = VisualizationHistory::new(3);
        for i in 0..4 {
            history.push_front(frame(i as f64));
        }

        let latest = history.latest(10);
        let tags: Vec<f64> = latest.iter().map(|f| f.spectrum[0]).collect();
        assert_eq!(tags, vec![3.0, 2.0, 1.0]);

        assert_eq!(history.latest(1)[0].waveform[0], 3.0);
        assert!(history.latest(0).is_empty());
    }

    #[test]
    fn clear_drops_every_frame() {
        let mut history = VisualizationHistory::new(3);
        history.push_front(frame(1.0));
        history.push_front(frame(2.0));
        history.clear();
        assert!(history.is_empty());
        assert!(history.latest(3).is_empty());
    }

    #[test]
    fn finished_signal_is_consumed_once() {
        let session = SharedSession::new(4);
        assert!(!session.take_finished());
        session.signal_finished();
        assert!(session.take_finished());
        assert!(!session.take_finished());
    }

    #[test]
    fn snapshot_copies_out_frames() {
        let session = SharedSession::new(4);
        session.push_frame(frame(1.0));
        session.push_frame(frame(2.0));

        let snapshot = session.snapshot(1, None);
        session.clear_history();

        assert_eq!(snapshot.frames.len(), 1);
        assert_eq!(snapshot.latest().unwrap().spectrum[0], 2.0);
        assert_eq!(session.history_len(), 0);
    }

    #[test]
    fn concurrent_push_and_clear_keep_the_history_consistent() {
        let session = Arc::new(SharedSession::new(16));
        let writer = {
            let session = Arc::clone(&session);
            thread::spawn(move || {
                for i in 0..2_000 {
                    session.push_frame(frame(i as f64));
                }
            })
        };

        for _ in 0..200 {
            session.clear_history();
            let frames = session.latest(16);
            assert!(frames.len() <= 16);
            assert!(frames.iter().all(|f| f.waveform.len() == 4 && f.spectrum.len() == 2));
        }
        writer.join().unwrap();

        assert!(session.history_len() <= session.history_capacity());
    }
}
