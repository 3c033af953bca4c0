use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;

use super::clock::PlaybackClock;
use super::pcm::{PcmFormat, SampleEncoding};

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no audio output device available")]
    NoOutputDevice,

    #[error("failed to query the output device: {0}")]
    Config(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build audio stream: {0}")]
    Build(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    Play(#[from] cpal::PlayStreamError),
}

/// Something that can play a track by repeatedly calling a [`PlaybackClock`].
///
/// Dropping the returned stream closes the device and drops the clock.
pub trait AudioDevice {
    type Stream;

    fn open(
        &self,
        format: &PcmFormat,
        frames_per_callback: u32,
        clock: PlaybackClock,
    ) -> Result<Self::Stream, DeviceError>;
}

/// Frames requested per callback so that callbacks arrive `target_fps` times
/// a second, kept a multiple of the channel count.
pub fn frames_per_callback(format: &PcmFormat, target_fps: u32) -> u32 {
    let channels = format.channels as u32;
    let frames = format.sample_rate / target_fps.max(1);
    (frames - frames % channels).max(channels)
}

pub fn sample_format(encoding: SampleEncoding) -> cpal::SampleFormat {
    match encoding {
        SampleEncoding::U8 => cpal::SampleFormat::U8,
        SampleEncoding::S8 => cpal::SampleFormat::I8,
        SampleEncoding::U16 => cpal::SampleFormat::U16,
        SampleEncoding::S16 => cpal::SampleFormat::I16,
        SampleEncoding::U32 => cpal::SampleFormat::U32,
        SampleEncoding::S32 => cpal::SampleFormat::I32,
    }
}

/// The default output device of the default cpal host.
pub struct CpalDevice {
    host: cpal::Host,
}

impl CpalDevice {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }
}

impl Default for CpalDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioDevice for CpalDevice {
    type Stream = cpal::Stream;

    fn open(
        &self,
        format: &PcmFormat,
        frames_per_callback: u32,
        mut clock: PlaybackClock,
    ) -> Result<cpal::Stream, DeviceError> {
        let device = self
            .host
            .default_output_device()
            .ok_or(DeviceError::NoOutputDevice)?;

        // Ask for one analysis frame per target display frame when the device
        // allows it; otherwise take whatever it hands out.
        let buffer_size = match device.default_output_config()?.buffer_size() {
            cpal::SupportedBufferSize::Range { min, max }
                if (*min..=*max).contains(&frames_per_callback) =>
            {
                cpal::BufferSize::Fixed(frames_per_callback)
            }
            _ => {
                log::warn!(
                    "Device rejects {} frames per callback, using its default",
                    frames_per_callback
                );
                cpal::BufferSize::Default
            }
        };

        let config = cpal::StreamConfig {
            channels: format.channels,
            sample_rate: cpal::SampleRate(format.sample_rate),
            buffer_size,
        };

        log::info!(
            "Audio output: {} @ {}Hz, {} ch, {}",
            device.name().unwrap_or_else(|_| "unknown".to_string()),
            format.sample_rate,
            format.channels,
            format.encoding
        );

        let stream = device.build_output_stream_raw(
            &config,
            sample_format(format.encoding),
            move |data: &mut cpal::Data, _: &cpal::OutputCallbackInfo| {
                clock.fill(data.bytes_mut());
            },
            |err| log::error!("Audio stream error: {}", err),
            None,
        )?;

        stream.play()?;
        Ok(stream)
    }
}
