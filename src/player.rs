//! Transport controller: file selection, play/pause, seek, end of track.
//!
//! This is the only place that replaces the PCM buffer or clears the
//! visualization history. It runs on the main thread.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::audio::clock::PlaybackClock;
use crate::audio::decode::{self, DecodeError, DecodeOptions};
use crate::audio::device::{frames_per_callback, AudioDevice, DeviceError};
use crate::audio::pcm::{PcmBuffer, PcmFormat};
use crate::session::{HistorySnapshot, SharedSession};

struct LoadedTrack {
    name: String,
    pcm: Arc<PcmBuffer>,
}

pub struct Player<D: AudioDevice> {
    device: D,
    session: Arc<SharedSession>,
    options: DecodeOptions,
    target_fps: u32,
    track: Option<LoadedTrack>,
    stream: Option<D::Stream>,
}

impl<D: AudioDevice> Player<D> {
    pub fn new(
        device: D,
        session: Arc<SharedSession>,
        options: DecodeOptions,
        target_fps: u32,
    ) -> Self {
        Self {
            device,
            session,
            options,
            target_fps,
            track: None,
            stream: None,
        }
    }

    #[cfg(test)]
    pub fn session(&self) -> &Arc<SharedSession> {
        &self.session
    }

    pub fn is_playing(&self) -> bool {
        self.stream.is_some()
    }

    pub fn has_track(&self) -> bool {
        self.track.is_some()
    }

    pub fn format(&self) -> Option<PcmFormat> {
        self.track.as_ref().map(|t| *t.pcm.format())
    }

    /// Decode `path` and make it the current track, stopped at its start.
    ///
    /// On failure nothing changes: the current track, if any, stays loaded
    /// and keeps playing.
    pub fn select_file(&mut self, path: &Path) -> Result<(), DecodeError> {
        let pcm = decode::decode(path, &self.options)?;

        self.stop();
        self.session.clear_history();
        self.session.take_finished();

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        if pcm.is_empty() {
            log::warn!("{} decoded to an empty track", name);
        }
        log::info!("Loaded {} ({:.1}s)", name, pcm.duration_secs());

        self.track = Some(LoadedTrack {
            name,
            pcm: Arc::new(pcm),
        });
        Ok(())
    }

    pub fn toggle_playback(&mut self) -> Result<(), DeviceError> {
        if self.is_playing() {
            self.stop();
            Ok(())
        } else {
            self.start()
        }
    }

    /// Open the device and start pulling from the current cursor. Does
    /// nothing without a track or while already playing.
    pub fn start(&mut self) -> Result<(), DeviceError> {
        if self.stream.is_some() {
            return Ok(());
        }
        let pcm = match &self.track {
            Some(track) => Arc::clone(&track.pcm),
            None => return Ok(()),
        };

        pcm.align_cursor();
        self.session.take_finished();

        let format = *pcm.format();
        let frames = frames_per_callback(&format, self.target_fps);
        let mut clock = PlaybackClock::new(pcm, Arc::clone(&self.session));
        clock.prepare(frames as usize);

        // Set before the first callback can clear it.
        self.session.set_playing(true);
        match self.device.open(&format, frames, clock) {
            Ok(stream) => {
                self.stream = Some(stream);
                Ok(())
            }
            Err(e) => {
                self.session.set_playing(false);
                Err(e)
            }
        }
    }

    /// Close the device. The cursor stays where the last callback left it.
    pub fn stop(&mut self) {
        // Dropping the stream unregisters the callback before anything else
        // touches the cursor.
        self.stream = None;
        self.session.set_playing(false);
    }

    /// Jump to `seconds` into the track, keeping the play/pause state.
    pub fn seek(&mut self, seconds: f64) -> Result<(), DeviceError> {
        let Some(track) = &self.track else {
            return Ok(());
        };
        let pcm = Arc::clone(&track.pcm);

        let was_playing = self.is_playing();
        self.stop();
        pcm.seek_to(seconds);
        log::debug!("Seek to {:.1}s", pcm.position_secs());

        if was_playing {
            self.start()?;
        }
        Ok(())
    }

    pub fn seek_by(&mut self, delta_secs: f64) -> Result<(), DeviceError> {
        match self.position_secs() {
            Some(position) => self.seek(position + delta_secs),
            None => Ok(()),
        }
    }

    /// Reset transport state once the clock has run off the end of the track.
    pub fn on_track_finished(&mut self) {
        self.stop();
        self.session.clear_history();
        if let Some(track) = self.track.take() {
            log::info!("Finished {}", track.name);
        }
    }

    /// Called once per render tick to act on signals from the audio thread.
    pub fn poll(&mut self) {
        let finished = self.session.take_finished();
        let exhausted = self.stream.is_some() && !self.session.is_playing();
        if finished || exhausted {
            self.on_track_finished();
        }
    }

    pub fn position_secs(&self) -> Option<f64> {
        self.track.as_ref().map(|t| t.pcm.position_secs())
    }

    pub fn snapshot(&self, frames: usize) -> HistorySnapshot {
        self.session.snapshot(frames, self.format())
    }

    pub fn status(&self) -> TransportStatus {
        match &self.track {
            Some(track) => TransportStatus {
                track: Some(track.name.clone()),
                playing: self.is_playing(),
                position_secs: track.pcm.position_secs(),
                duration_secs: track.pcm.duration_secs(),
            },
            None => TransportStatus::default(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransportStatus {
    pub track: Option<String>,
    pub playing: bool,
    pub position_secs: f64,
    pub duration_secs: f64,
}

fn clock_time(secs: f64) -> String {
    let total = secs.max(0.0) as u64;
    format!("{:02}:{:02}", total / 60, total % 60)
}

impl fmt::Display for TransportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.track {
            Some(name) => write!(
                f,
                "{} - {} {}/{}",
                name,
                if self.playing { "PLAY" } else { "PAUSE" },
                clock_time(self.position_secs),
                clock_time(self.duration_secs)
            ),
            None => f.write_str("no file"),
        }
    }
}
