use std::path::{Path, PathBuf};

use symphonia::core::audio::{AudioBufferRef, RawSample, RawSampleBuffer};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::conv::ConvertibleSample;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

use super::pcm::{PcmBuffer, PcmFormat, SampleEncoding};

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("couldn't read {} as an audio file: {reason}", path.display())]
    OpenFailed { path: PathBuf, reason: String },

    #[error("decoding ended prematurely: {source}")]
    Truncated {
        #[source]
        source: SymphoniaError,
    },

    #[error("sample encoding `{0}` has no playback representation")]
    UnsupportedEncoding(String),
}

#[derive(Clone, Copy, Debug)]
pub struct DecodeOptions {
    /// Encoding every decoded sample is converted to.
    pub encoding: SampleEncoding,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            encoding: SampleEncoding::S16,
        }
    }
}

/// Bookkeeping from one decode run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecodeStats {
    pub chunks: usize,
    pub chunk_bytes: usize,
    pub rejected_packets: usize,
    pub corrupt_packets: usize,
}

pub fn decode(path: &Path, options: &DecodeOptions) -> Result<PcmBuffer, DecodeError> {
    decode_with_stats(path, options).map(|(pcm, _)| pcm)
}

pub fn decode_with_stats(
    path: &Path,
    options: &DecodeOptions,
) -> Result<(PcmBuffer, DecodeStats), DecodeError> {
    let open_failed = |reason: String| DecodeError::OpenFailed {
        path: path.to_path_buf(),
        reason,
    };

    let file = std::fs::File::open(path).map_err(|e| open_failed(e.to_string()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| open_failed(format!("failed to probe audio format ({e})")))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| open_failed("no audio tracks found".into()))?;

    let track_id = track.id;
    // Frame count announced by the container (WAV header, MP3 Xing/Info tag).
    let expected_frames = track.codec_params.n_frames;
    let sample_rate = track
        .codec_params
        .sample_rate
        .filter(|&rate| rate > 0)
        .ok_or_else(|| open_failed("unknown sample rate".into()))?;
    let channels = track
        .codec_params
        .channels
        .map(|c| c.count())
        .ok_or_else(|| open_failed("unknown channel layout".into()))?;
    if !(1..=2).contains(&channels) {
        return Err(open_failed(format!(
            "{channels} channels, only mono and stereo can be played"
        )));
    }

    // Everything after this point is held to the first negotiated format.
    let pcm_format = PcmFormat {
        sample_rate,
        channels: channels as u16,
        encoding: options.encoding,
    };

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| open_failed(format!("failed to create audio decoder ({e})")))?;

    let mut bytes: Vec<u8> = Vec::new();
    let mut stats = DecodeStats::default();
    let mut delivered_frames: u64 = 0;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(source) => return Err(DecodeError::Truncated { source }),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(reason)) => {
                log::debug!("Skipping corrupt packet: {}", reason);
                stats.corrupt_packets += 1;
                delivered_frames += packet.dur;
                continue;
            }
            Err(source) => return Err(DecodeError::Truncated { source }),
        };

        delivered_frames += decoded.frames() as u64;

        let spec = *decoded.spec();
        if spec.rate != sample_rate || spec.channels.count() != channels {
            log::warn!(
                "Rejecting packet in {}Hz/{}ch, track is locked to {}Hz/{}ch",
                spec.rate,
                spec.channels.count(),
                sample_rate,
                channels
            );
            stats.rejected_packets += 1;
            continue;
        }

        let written = match pcm_format.encoding {
            SampleEncoding::U8 => append_interleaved::<u8>(decoded, &mut bytes),
            SampleEncoding::S8 => append_interleaved::<i8>(decoded, &mut bytes),
            SampleEncoding::U16 => append_interleaved::<u16>(decoded, &mut bytes),
            SampleEncoding::S16 => append_interleaved::<i16>(decoded, &mut bytes),
            SampleEncoding::U32 => append_interleaved::<u32>(decoded, &mut bytes),
            SampleEncoding::S32 => append_interleaved::<i32>(decoded, &mut bytes),
        };
        if written > 0 {
            stats.chunks += 1;
            stats.chunk_bytes += written;
        }
    }

    debug_assert_eq!(stats.chunk_bytes, bytes.len());

    // The reader reports a cut-off file the same way as a clean end, so
    // compare against the announced length.
    if let Some(expected) = expected_frames {
        if delivered_frames < expected {
            return Err(DecodeError::Truncated {
                source: SymphoniaError::IoError(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("stream ended after {delivered_frames} of {expected} frames"),
                )),
            });
        }
    }

    log::info!(
        "Decoded audio: {} bytes in {} chunks, {}Hz, {} ch, {}, {:.1}s",
        bytes.len(),
        stats.chunks,
        pcm_format.sample_rate,
        pcm_format.channels,
        pcm_format.encoding,
        bytes.len() as f64 / pcm_format.bytes_per_second() as f64
    );
    if stats.rejected_packets > 0 || stats.corrupt_packets > 0 {
        log::warn!(
            "Dropped {} packets in a foreign format and {} corrupt packets",
            stats.rejected_packets,
            stats.corrupt_packets
        );
    }

    Ok((PcmBuffer::new(bytes, pcm_format), stats))
}

/// Convert one decoded packet to interleaved `S` samples and append the raw
/// bytes. Returns the number of bytes appended.
fn append_interleaved<S>(decoded: AudioBufferRef<'_>, out: &mut Vec<u8>) -> usize
where
    S: RawSample + ConvertibleSample,
{
    let frames = decoded.frames();
    if frames == 0 {
        return 0;
    }

    let mut raw = RawSampleBuffer::<S>::new(frames as u64, *decoded.spec());
    raw.copy_interleaved_ref(decoded);

    let chunk = raw.as_bytes();
    out.extend_from_slice(chunk);
    chunk.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn fixture_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "mp3-visualizer-{}-{}",
            std::process::id(),
            name
        ))
    }

    fn write_sine_wav(name: &str, channels: u16, frames: usize) -> PathBuf {
        let path = fixture_path(name);
        let spec = hound::WavSpec {
            channels,
            sample_rate: 22_050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..frames {
            let value = (2.0 * PI * 440.0 * i as f32 / 22_050.0).sin() * 12_000.0;
            for _ in 0..channels {
                writer.write_sample(value as i16).unwrap();
            }
        }
        writer.finalize().unwrap();
        path
    }

    #[test]
    fn chunk_bytes_add_up_to_buffer_length() {
        let path = write_sine_wav("stereo.wav", 2, 10_000);
        let (pcm, stats) = decode_with_stats(&path, &DecodeOptions::default()).unwrap();
        std::fs::remove_file(&path).ok();

        assert!(stats.chunks > 0);
        assert_eq!(stats.chunk_bytes, pcm.len());
        assert_eq!(pcm.len() % pcm.format().frame_bytes(), 0);
        assert_eq!(pcm.len(), 10_000 * 4);
        assert_eq!(pcm.format().sample_rate, 22_050);
        assert_eq!(pcm.format().channels, 2);
        assert_eq!(pcm.processed_bytes(), 0);
    }

    #[test]
    fn cut_off_file_is_truncated() {
        let full = write_sine_wav("whole.wav", 1, 8_000);
        let bytes = std::fs::read(&full).unwrap();
        std::fs::remove_file(&full).ok();

        let path = fixture_path("half.wav");
        std::fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();
        let result = decode_with_stats(&path, &DecodeOptions::default());
        std::fs::remove_file(&path).ok();

        match result {
            Err(DecodeError::Truncated { source }) => {
                assert!(source.to_string().contains("of 8000 frames"));
            }
            other => panic!("expected Truncated, got {:?}", other.map(|(_, stats)| stats)),
        }
    }

    #[test]
    fn converts_to_the_requested_encoding() {
        let path = write_sine_wav("mono_u8.wav", 1, 4_000);
        let options = DecodeOptions {
            encoding: SampleEncoding::U8,
        };
        let pcm = decode(&path, &options).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(pcm.format().encoding, SampleEncoding::U8);
        assert_eq!(pcm.len(), 4_000);
        // The first sample of the sine is silence, which is mid-scale for u8.
        assert!((pcm.bytes()[0] as i32 - 128).abs() <= 1);
    }

    #[test]
    fn preserves_sample_values_for_s16() {
        let path = write_sine_wav("mono_s16.wav", 1, 2_000);
        let pcm = decode(&path, &DecodeOptions::default()).unwrap();
        std::fs::remove_file(&path).ok();

        let expected = ((2.0 * PI * 440.0 * 10.0 / 22_050.0).sin() * 12_000.0) as i16;
        let sample = SampleEncoding::S16.read(&pcm.bytes()[20..22]);
        assert!((sample - expected as f64).abs() <= 1.0);
    }

    #[test]
    fn missing_file_fails_to_open() {
        let err = decode(&fixture_path("does-not-exist.mp3"), &DecodeOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, DecodeError::OpenFailed { .. }));
    }

    #[test]
    fn garbage_fails_to_open() {
        let path = fixture_path("garbage.mp3");
        std::fs::write(&path, b"definitely not an audio stream").unwrap();
        let result = decode(&path, &DecodeOptions::default());
        std::fs::remove_file(&path).ok();

        assert!(matches!(result, Err(DecodeError::OpenFailed { .. })));
    }

    #[test]
    fn more_than_two_channels_fails_to_open() {
        let path = write_sine_wav("surround.wav", 3, 1_000);
        let result = decode(&path, &DecodeOptions::default());
        std::fs::remove_file(&path).ok();

        assert!(matches!(result, Err(DecodeError::OpenFailed { .. })));
    }
}
