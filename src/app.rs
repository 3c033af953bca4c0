use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::ActiveEventLoop;
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowAttributes, WindowId};

use crate::audio::device::CpalDevice;
use crate::player::Player;
use crate::render::gpu::GpuRenderer;
use crate::render::spectrogram::Spectrogram2d;
use crate::render::surface::Surface3d;
use crate::render::{CameraKey, KeyState, Visualization, VisualizationMode};

const SEEK_STEP_SECS: f64 = 5.0;
const APP_NAME: &str = "mp3-visualizer";

pub struct WindowSettings {
    pub width: u32,
    pub height: u32,
}

pub struct App {
    player: Player<CpalDevice>,
    spectrogram: Spectrogram2d,
    surface: Surface3d,
    mode: VisualizationMode,
    keys: KeyState,
    window_settings: WindowSettings,
    pending_file: Option<PathBuf>,
    window: Option<Arc<Window>>,
    renderer: Option<GpuRenderer>,
    title: String,
    last_error: Option<String>,
    fatal: Option<anyhow::Error>,
}

impl App {
    pub fn new(
        player: Player<CpalDevice>,
        spectrogram: Spectrogram2d,
        surface: Surface3d,
        mode: VisualizationMode,
        window_settings: WindowSettings,
        initial_file: Option<PathBuf>,
    ) -> Self {
        Self {
            player,
            spectrogram,
            surface,
            mode,
            keys: KeyState::default(),
            window_settings,
            pending_file: initial_file,
            window: None,
            renderer: None,
            title: String::new(),
            last_error: None,
            fatal: None,
        }
    }

    /// The error that shut the event loop down, if any.
    pub fn take_fatal(&mut self) -> Option<anyhow::Error> {
        self.fatal.take()
    }

    fn init_window(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = WindowAttributes::default()
            .with_title(APP_NAME)
            .with_inner_size(LogicalSize::new(
                self.window_settings.width,
                self.window_settings.height,
            ));

        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .context("Failed to create window")?,
        );
        let renderer = GpuRenderer::new(Arc::clone(&window))?;
        self.surface.set_aspect(renderer.aspect());

        self.spectrogram.init();
        self.surface.init();

        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    fn visualization(&mut self) -> &mut dyn Visualization {
        match self.mode {
            VisualizationMode::TwoD => &mut self.spectrogram,
            VisualizationMode::ThreeD => &mut self.surface,
        }
    }

    fn open_file(&mut self, path: &Path) {
        match self.player.select_file(path) {
            Ok(()) => self.last_error = None,
            Err(e) => {
                log::error!("Could not open {}: {}", path.display(), e);
                self.last_error = Some(e.to_string());
            }
        }
    }

    fn report<E: std::fmt::Display>(&mut self, what: &str, result: Result<(), E>) {
        if let Err(e) = result {
            log::error!("{}: {}", what, e);
            self.last_error = Some(e.to_string());
        }
    }

    fn set_mode(&mut self, mode: VisualizationMode) {
        if self.mode != mode {
            log::info!("Switching to {} view", mode);
            self.mode = mode;
        }
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, event: &KeyEvent) {
        let PhysicalKey::Code(code) = event.physical_key else {
            return;
        };

        if let Some(key) = camera_key(code) {
            match event.state {
                ElementState::Pressed => self.keys.press(key),
                ElementState::Released => self.keys.release(key),
            }
            return;
        }

        if event.state != ElementState::Pressed || event.repeat {
            return;
        }
        match code {
            KeyCode::Space if !self.player.has_track() => {
                self.last_error = Some("no file loaded, drop an MP3 onto the window".into());
            }
            KeyCode::Space => {
                let result = self.player.toggle_playback();
                self.report("Playback failed", result);
            }
            KeyCode::Digit2 => self.set_mode(VisualizationMode::TwoD),
            KeyCode::Digit3 => self.set_mode(VisualizationMode::ThreeD),
            KeyCode::Tab => self.set_mode(self.mode.toggle()),
            KeyCode::BracketLeft => {
                let result = self.player.seek_by(-SEEK_STEP_SECS);
                self.report("Seek failed", result);
            }
            KeyCode::BracketRight => {
                let result = self.player.seek_by(SEEK_STEP_SECS);
                self.report("Seek failed", result);
            }
            KeyCode::Home => {
                let result = self.player.seek(0.0);
                self.report("Seek failed", result);
            }
            KeyCode::Escape => event_loop.exit(),
            _ => {}
        }
    }

    /// One render tick: act on transport signals, then draw.
    fn tick(&mut self) -> Result<()> {
        self.player.poll();

        let keys = self.keys.clone();
        let wanted = self.visualization().frames_wanted();
        let snapshot = self.player.snapshot(wanted);
        let visualization = self.visualization();
        visualization.handle_input(&keys);
        let geometry = visualization.display(&snapshot);

        if let Some(renderer) = &mut self.renderer {
            renderer.draw(&geometry)?;
        }
        self.update_title();
        Ok(())
    }

    fn update_title(&mut self) {
        let mut title = format!("{} [{}] {}", APP_NAME, self.mode, self.player.status());
        if let Some(error) = &self.last_error {
            title.push_str(" | ");
            title.push_str(error);
        }
        if title != self.title {
            if let Some(window) = &self.window {
                window.set_title(&title);
            }
            self.title = title;
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{:#}", error);
        self.fatal = Some(error);
        event_loop.exit();
    }
}

fn camera_key(code: KeyCode) -> Option<CameraKey> {
    match code {
        KeyCode::ArrowLeft => Some(CameraKey::Left),
        KeyCode::ArrowRight => Some(CameraKey::Right),
        KeyCode::ArrowUp => Some(CameraKey::Up),
        KeyCode::ArrowDown => Some(CameraKey::Down),
        KeyCode::Equal | KeyCode::NumpadAdd => Some(CameraKey::ZoomIn),
        KeyCode::Minus | KeyCode::NumpadSubtract => Some(CameraKey::ZoomOut),
        _ => None,
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.init_window(event_loop) {
            self.fail(event_loop, e);
            return;
        }
        if let Some(path) = self.pending_file.take() {
            self.open_file(&path);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                self.player.stop();
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                if let Some(renderer) = &mut self.renderer {
                    renderer.resize(size);
                    self.surface.set_aspect(renderer.aspect());
                }
            }

            WindowEvent::Focused(false) => self.keys.clear(),

            WindowEvent::DroppedFile(path) => self.open_file(&path),

            WindowEvent::KeyboardInput { event, .. } => self.handle_key(event_loop, &event),

            WindowEvent::RedrawRequested => {
                if let Err(e) = self.tick() {
                    self.fail(event_loop, e);
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera_keys_cover_arrows_and_zoom() {
        assert_eq!(camera_key(KeyCode::ArrowUp), Some(CameraKey::Up));
        assert_eq!(camera_key(KeyCode::Equal), Some(CameraKey::ZoomIn));
        assert_eq!(camera_key(KeyCode::Minus), Some(CameraKey::ZoomOut));
        assert_eq!(camera_key(KeyCode::Space), None);
    }
}
