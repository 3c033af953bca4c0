mod app;
mod audio;
mod cli;
mod config;
mod player;
mod render;
mod session;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use winit::event_loop::EventLoop;

use app::{App, WindowSettings};
use audio::decode::DecodeOptions;
use audio::device::CpalDevice;
use audio::pcm::SampleEncoding;
use cli::Cli;
use player::Player;
use render::spectrogram::Spectrogram2d;
use render::surface::Surface3d;
use render::VisualizationMode;
use session::SharedSession;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    let mut cfg = config::Config::default();
    if let Some(path) = config::discover_config_path(cli.config.as_deref()) {
        match config::load_config(&path) {
            Ok(loaded) => {
                log::info!("Loaded config from {}", path.display());
                cfg = loaded;
            }
            Err(e) if cli.config.is_some() => return Err(e.into()),
            Err(e) => log::warn!("{}", e),
        }
    }

    // Merge: config values apply only when CLI is at its default
    if cli.mode == VisualizationMode::TwoD { cli.mode = cfg.view.mode; }
    if cli.fps == 50 { cli.fps = cfg.audio.target_fps; }
    if cli.history_seconds == 5 { cli.history_seconds = cfg.audio.history_seconds; }
    if cli.encoding == SampleEncoding::S16 { cli.encoding = cfg.audio.encoding; }
    if cli.width == 800 { cli.width = cfg.view.width; }
    if cli.height == 600 { cli.height = cfg.view.height; }
    cfg.audio.target_fps = cli.fps;
    cfg.audio.history_seconds = cli.history_seconds;

    if cli.fps == 0 {
        anyhow::bail!("--fps must be at least 1");
    }

    let history = cfg.audio.history_capacity();
    log::info!("mp3-visualizer");
    log::info!(
        "{} fps analysis, {} frames of history, decoding to {}",
        cli.fps,
        history,
        cli.encoding
    );

    let session = Arc::new(SharedSession::new(history));
    let player = Player::new(
        CpalDevice::new(),
        session,
        DecodeOptions {
            encoding: cli.encoding,
        },
        cli.fps,
    );
    let spectrogram = Spectrogram2d::new(cli.fps, cfg.audio.max_fft_output);
    let surface = Surface3d::new(&cfg.camera, history, cli.fps, cfg.audio.max_fft_output);

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    let mut app = App::new(
        player,
        spectrogram,
        surface,
        cli.mode,
        WindowSettings {
            width: cli.width,
            height: cli.height,
        },
        cli.input.take(),
    );
    event_loop.run_app(&mut app).context("Event loop error")?;

    match app.take_fatal() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
