#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;
use particles_wallpaper::clock::FrameClock;
use particles_wallpaper::controller::SurfaceController;
use particles_wallpaper::events::WallpaperEvent;
use particles_wallpaper::loader::BackgroundLoader;
use particles_wallpaper::scene::{Canvas, RenderResult, Scene};
use particles_wallpaper::settings::{Settings, SettingsRepository, SettingsUpdate};
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

#[derive(Default)]
pub struct RecordingScene {
    pub draws: usize,
    pub bounds: Vec<(u32, u32)>,
    pub frame_delay: Duration,
    pub frame_delays: Vec<Duration>,
    pub translations: Vec<f32>,
    pub colors: Vec<u32>,
    pub images: Vec<bool>,
}

impl Scene for RecordingScene {
    fn draw(&mut self, _canvas: &mut Canvas) -> RenderResult {
        self.draws += 1;
        RenderResult::NextFrameIn(self.frame_delay)
    }

    fn set_bounds(&mut self, width: u32, height: u32) {
        self.bounds.push((width, height));
    }

    fn set_frame_delay(&mut self, delay: Duration) {
        self.frame_delay = delay;
        self.frame_delays.push(delay);
    }

    fn translate_x(&mut self, dx: f32) {
        self.translations.push(dx);
    }

    fn set_background_color(&mut self, argb: u32) {
        self.colors.push(argb);
    }

    fn set_background_image(&mut self, image: Option<Arc<RgbaImage>>) {
        self.images.push(image.is_some());
    }
}

#[derive(Default)]
pub struct RecordingLoader {
    pub loads: Vec<(String, u32, u32)>,
    pub clears: usize,
    pub generation: u64,
}

impl BackgroundLoader for RecordingLoader {
    fn load(&mut self, uri: &str, width: u32, height: u32) -> u64 {
        self.loads.push((uri.to_string(), width, height));
        self.generation += 1;
        self.generation
    }

    fn clear(&mut self) {
        self.clears += 1;
        self.generation += 1;
    }

    fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Default)]
pub struct ManualClock {
    pub armed: Vec<Duration>,
    pub pending: Option<Duration>,
}

impl FrameClock for ManualClock {
    fn arm(&mut self, delay: Duration) {
        self.armed.push(delay);
        self.pending = Some(delay);
    }

    fn cancel_all(&mut self) {
        self.pending = None;
    }

    fn is_armed(&self) -> bool {
        self.pending.is_some()
    }
}

pub type TestController = SurfaceController<RecordingScene, RecordingLoader, ManualClock>;

pub struct Harness {
    pub controller: TestController,
    pub settings: SettingsRepository,
    pub events: UnboundedReceiver<WallpaperEvent>,
}

impl Harness {
    /// Must be called from inside a tokio runtime.
    pub fn new(initial: Settings) -> Self {
        let settings = SettingsRepository::new(&initial);
        let (tx, events) = tokio::sync::mpsc::unbounded_channel();
        let controller = SurfaceController::new(
            RecordingScene::default(),
            RecordingLoader::default(),
            ManualClock::default(),
            settings.clone(),
            Handle::current(),
            Arc::new(tx),
        );
        Self {
            controller,
            settings,
            events,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(Settings::default())
    }

    /// Drains queued events and counts render requests.
    pub fn take_render_requests(&mut self) -> usize {
        let mut count = 0;
        while let Ok(event) = self.events.try_recv() {
            if matches!(event, WallpaperEvent::RenderRequested) {
                count += 1;
            }
        }
        count
    }

    /// Waits for the next forwarded settings update and hands it to the controller.
    pub async fn deliver_next_settings(&mut self) -> SettingsUpdate {
        loop {
            let event = timeout(Duration::from_secs(2), self.events.recv())
                .await
                .expect("settings update should be forwarded")
                .expect("event channel open");
            if let WallpaperEvent::Settings(update) = event {
                self.controller.on_settings(update.clone());
                return update;
            }
        }
    }

    pub fn draw(&mut self) -> Option<particles_wallpaper::controller::DrawnFrame> {
        let mut canvas = Canvas::new(1, 1);
        self.controller.on_draw_frame(&mut canvas)
    }
}
