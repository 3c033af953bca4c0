//! Decoded PCM track: interleaved bytes, their format, and the playback cursor.
//!
//! The bytes are immutable once decoded. The cursor is the only thing that
//! moves, and it is atomic so the realtime callback can advance it without
//! taking a lock.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Deserialize;
use symphonia::core::sample::SampleFormat;

use super::decode::DecodeError;

/// Integer sample encodings that have a playback representation.
///
/// Samples are stored native-endian, which is what the output device expects.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleEncoding {
    U8,
    S8,
    U16,
    #[default]
    S16,
    U32,
    S32,
}

impl SampleEncoding {
    pub fn sample_bytes(self) -> usize {
        match self {
            SampleEncoding::U8 | SampleEncoding::S8 => 1,
            SampleEncoding::U16 | SampleEncoding::S16 => 2,
            SampleEncoding::U32 | SampleEncoding::S32 => 4,
        }
    }

    /// Decode one native-endian sample. `bytes` must be exactly one sample wide.
    pub fn read(self, bytes: &[u8]) -> f64 {
        debug_assert_eq!(bytes.len(), self.sample_bytes());
        match self {
            SampleEncoding::U8 => bytes[0] as f64,
            SampleEncoding::S8 => bytes[0] as i8 as f64,
            SampleEncoding::U16 => u16::from_ne_bytes([bytes[0], bytes[1]]) as f64,
            SampleEncoding::S16 => i16::from_ne_bytes([bytes[0], bytes[1]]) as f64,
            SampleEncoding::U32 => {
                u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64
            }
            SampleEncoding::S32 => {
                i32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64
            }
        }
    }

    /// Value of a silent sample: zero for signed encodings, mid-scale for unsigned.
    pub fn equilibrium(self) -> f64 {
        match self {
            SampleEncoding::U8 => 128.0,
            SampleEncoding::U16 => 32_768.0,
            SampleEncoding::U32 => 2_147_483_648.0,
            _ => 0.0,
        }
    }

    /// Largest distance from equilibrium a sample can reach.
    pub fn amplitude(self) -> f64 {
        match self {
            SampleEncoding::S8 => i8::MAX as f64,
            SampleEncoding::S16 => i16::MAX as f64,
            SampleEncoding::S32 => i32::MAX as f64,
            SampleEncoding::U8 => (u8::MAX / 2) as f64,
            SampleEncoding::U16 => (u16::MAX / 2) as f64,
            SampleEncoding::U32 => (u32::MAX / 2) as f64,
        }
    }

    /// Overwrite `out` with silence in this encoding.
    pub fn fill_silence(self, out: &mut [u8]) {
        let silence: [u8; 4] = match self {
            SampleEncoding::U8 => [0x80, 0, 0, 0],
            SampleEncoding::U16 => {
                let [a, b] = 0x8000u16.to_ne_bytes();
                [a, b, 0, 0]
            }
            SampleEncoding::U32 => 0x8000_0000u32.to_ne_bytes(),
            _ => [0; 4],
        };
        let width = self.sample_bytes();
        let mut samples = out.chunks_exact_mut(width);
        for sample in &mut samples {
            sample.copy_from_slice(&silence[..width]);
        }
        samples.into_remainder().fill(0);
    }
}

impl fmt::Display for SampleEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SampleEncoding::U8 => "u8",
            SampleEncoding::S8 => "s8",
            SampleEncoding::U16 => "u16",
            SampleEncoding::S16 => "s16",
            SampleEncoding::U32 => "u32",
            SampleEncoding::S32 => "s32",
        };
        f.write_str(name)
    }
}

impl FromStr for SampleEncoding {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "u8" => Ok(SampleEncoding::U8),
            "s8" | "i8" => Ok(SampleEncoding::S8),
            "u16" => Ok(SampleEncoding::U16),
            "s16" | "i16" => Ok(SampleEncoding::S16),
            "u32" => Ok(SampleEncoding::U32),
            "s32" | "i32" => Ok(SampleEncoding::S32),
            other => Err(DecodeError::UnsupportedEncoding(other.to_string())),
        }
    }
}

impl TryFrom<SampleFormat> for SampleEncoding {
    type Error = DecodeError;

    fn try_from(format: SampleFormat) -> Result<Self, Self::Error> {
        match format {
            SampleFormat::U8 => Ok(SampleEncoding::U8),
            SampleFormat::S8 => Ok(SampleEncoding::S8),
            SampleFormat::U16 => Ok(SampleEncoding::U16),
            SampleFormat::S16 => Ok(SampleEncoding::S16),
            SampleFormat::U32 => Ok(SampleEncoding::U32),
            SampleFormat::S32 => Ok(SampleEncoding::S32),
            other => Err(DecodeError::UnsupportedEncoding(format!("{other:?}"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub encoding: SampleEncoding,
}

impl PcmFormat {
    pub fn sample_bytes(&self) -> usize {
        self.encoding.sample_bytes()
    }

    /// Bytes in one interleaved frame (one sample per channel).
    pub fn frame_bytes(&self) -> usize {
        self.sample_bytes() * self.channels as usize
    }

    pub fn bytes_per_second(&self) -> usize {
        self.frame_bytes() * self.sample_rate as usize
    }

    /// Map a downmixed sample (a sum over all channels) into roughly [-1, 1].
    pub fn scale_sample(&self, value: f64) -> f64 {
        let centre = self.encoding.equilibrium() * self.channels as f64;
        (value - centre) / self.encoding.amplitude()
    }
}

pub struct PcmBuffer {
    bytes: Vec<u8>,
    format: PcmFormat,
    processed_bytes: AtomicUsize,
}

impl PcmBuffer {
    pub fn new(bytes: Vec<u8>, format: PcmFormat) -> Self {
        assert!(
            format.channels == 1 || format.channels == 2,
            "PCM buffer with {} channels",
            format.channels
        );
        assert!(format.sample_rate > 0, "PCM buffer with a zero sample rate");
        assert_eq!(
            bytes.len() % format.frame_bytes(),
            0,
            "PCM buffer length is not a whole number of frames"
        );

        Self {
            bytes,
            format,
            processed_bytes: AtomicUsize::new(0),
        }
    }

    pub fn format(&self) -> &PcmFormat {
        &self.format
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn processed_bytes(&self) -> usize {
        self.processed_bytes.load(Ordering::Acquire)
    }

    pub fn remaining(&self) -> usize {
        self.len() - self.processed_bytes()
    }

    /// Move the cursor forward. Only the playback clock calls this.
    pub(crate) fn advance(&self, bytes: usize) {
        let next = self.processed_bytes() + bytes;
        assert!(next <= self.len(), "playback cursor past the end of the track");
        self.processed_bytes.store(next, Ordering::Release);
    }

    /// Place the cursor at `bytes`, clamped to the track and aligned down to a
    /// frame boundary. Must only be called while no callback is registered.
    pub fn set_processed_bytes(&self, bytes: usize) {
        let frame = self.format.frame_bytes();
        let clamped = bytes.min(self.len());
        self.processed_bytes
            .store(clamped - clamped % frame, Ordering::Release);
    }

    /// Re-align the cursor to a frame boundary before playback resumes.
    pub fn align_cursor(&self) {
        self.set_processed_bytes(self.processed_bytes());
    }

    pub fn seek_to(&self, seconds: f64) {
        let frames = (seconds.max(0.0) * self.format.sample_rate as f64) as usize;
        self.set_processed_bytes(frames.saturating_mul(self.format.frame_bytes()));
    }

    pub fn position_secs(&self) -> f64 {
        self.processed_bytes() as f64 / self.format.bytes_per_second() as f64
    }

    pub fn duration_secs(&self) -> f64 {
        self.len() as f64 / self.format.bytes_per_second() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo_s16(frames: usize) -> PcmBuffer {
        let format = PcmFormat {
            sample_rate: 44_100,
            channels: 2,
            encoding: SampleEncoding::S16,
        };
        PcmBuffer::new(vec![0; frames * format.frame_bytes()], format)
    }

    #[test]
    fn reads_native_endian_samples() {
        assert_eq!(SampleEncoding::S16.read(&(-1234i16).to_ne_bytes()), -1234.0);
        assert_eq!(SampleEncoding::U16.read(&40_000u16.to_ne_bytes()), 40_000.0);
        assert_eq!(SampleEncoding::S8.read(&[0xff]), -1.0);
        assert_eq!(SampleEncoding::U8.read(&[0xff]), 255.0);
        assert_eq!(SampleEncoding::S32.read(&i32::MIN.to_ne_bytes()), i32::MIN as f64);
        assert_eq!(SampleEncoding::U32.read(&u32::MAX.to_ne_bytes()), u32::MAX as f64);
    }

    #[test]
    fn silence_is_mid_scale_for_unsigned() {
        let mut out = [0xaa; 6];
        SampleEncoding::U16.fill_silence(&mut out);
        for sample in out.chunks_exact(2) {
            assert_eq!(SampleEncoding::U16.read(sample), 32_768.0);
        }

        let mut out = [0xaa; 4];
        SampleEncoding::S32.fill_silence(&mut out);
        assert_eq!(out, [0; 4]);

        let mut out = [0; 3];
        SampleEncoding::U8.fill_silence(&mut out);
        assert_eq!(out, [0x80; 3]);
    }

    #[test]
    fn parses_supported_encoding_names() {
        assert_eq!("s16".parse::<SampleEncoding>().unwrap(), SampleEncoding::S16);
        assert_eq!("U8".parse::<SampleEncoding>().unwrap(), SampleEncoding::U8);
        assert!(matches!(
            "s24".parse::<SampleEncoding>(),
            Err(DecodeError::UnsupportedEncoding(_))
        ));
        assert!(matches!(
            SampleEncoding::try_from(SampleFormat::F32),
            Err(DecodeError::UnsupportedEncoding(_))
        ));
    }

    #[test]
    fn scale_sample_centres_unsigned_sums() {
        let format = PcmFormat {
            sample_rate: 8_000,
            channels: 2,
            encoding: SampleEncoding::U8,
        };
        assert_eq!(format.scale_sample(256.0), 0.0);

        let format = PcmFormat {
            sample_rate: 8_000,
            channels: 1,
            encoding: SampleEncoding::S16,
        };
        assert_eq!(format.scale_sample(i16::MAX as f64), 1.0);
    }

    #[test]
    fn seek_aligns_and_clamps_cursor() {
        let track = stereo_s16(44_100 * 2);

        track.seek_to(1.0);
        assert_eq!(track.processed_bytes(), 44_100 * 4);

        track.set_processed_bytes(7);
        assert_eq!(track.processed_bytes(), 4);

        track.seek_to(60.0);
        assert_eq!(track.processed_bytes(), track.len());

        track.seek_to(-3.0);
        assert_eq!(track.processed_bytes(), 0);
    }

    #[test]
    fn reports_position_and_duration() {
        let track = stereo_s16(44_100 * 3);
        assert!((track.duration_secs() - 3.0).abs() < 1e-9);
        track.advance(44_100 * 4);
        assert!((track.position_secs() - 1.0).abs() < 1e-9);
        assert_eq!(track.remaining(), 44_100 * 8);
    }

    #[test]
    #[should_panic]
    fn rejects_partial_frames() {
        let format = PcmFormat {
            sample_rate: 44_100,
            channels: 2,
            encoding: SampleEncoding::S16,
        };
        PcmBuffer::new(vec![0; 6], format);
    }
}
