use clap::Parser;
use std::path::PathBuf;

use crate::audio::pcm::SampleEncoding;
use crate::render::VisualizationMode;

#[derive(Parser, Debug)]
#[command(name = "mp3-visualizer", about = "MP3 player with live spectrum and waveform plots")]
pub struct Cli {
    /// MP3 file to load on startup (files can also be dropped onto the window)
    pub input: Option<PathBuf>,

    /// Visualization shown first
    #[arg(short, long, value_enum, default_value_t = VisualizationMode::TwoD)]
    pub mode: VisualizationMode,

    /// Analysis frames per second; sets the audio callback size
    #[arg(long, default_value_t = 50)]
    pub fps: u32,

    /// Seconds of spectra kept for the 3D view
    #[arg(long, default_value_t = 5)]
    pub history_seconds: u32,

    /// Sample encoding tracks are decoded to (u8, s8, u16, s16, u32, s32)
    #[arg(long, default_value_t = SampleEncoding::S16)]
    pub encoding: SampleEncoding,

    /// Window width in logical pixels
    #[arg(long, default_value_t = 800)]
    pub width: u32,

    /// Window height in logical pixels
    #[arg(long, default_value_t = 600)]
    pub height: u32,

    /// Config file (default: ./visualizer.toml or ~/.config/mp3-visualizer/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,
}
