use std::sync::Arc;

use image::RgbaImage;
use tokio::sync::mpsc;

use crate::settings::SettingsUpdate;

/// A decoded background image, tagged with the load that produced it.
#[derive(Debug, Clone)]
pub struct BackgroundReady {
    pub generation: u64,
    pub uri: String,
    pub image: Arc<RgbaImage>,
}

/// Everything that crosses from async tasks back onto the drawing context.
#[derive(Debug, Clone)]
pub enum WallpaperEvent {
    /// Ask the host to call `on_draw_frame` as soon as possible.
    RenderRequested,
    Settings(SettingsUpdate),
    BackgroundReady(BackgroundReady),
    Cancelled,
}

/// Delivery side of the host's event queue.
///
/// Implementations must be callable from any thread; delivery is fire and
/// forget, a closed queue silently drops the event.
pub trait EventSink: Send + Sync + 'static {
    fn post(&self, event: WallpaperEvent);

    /// The render-request primitive.
    fn request_render(&self) {
        self.post(WallpaperEvent::RenderRequested);
    }
}

impl EventSink for mpsc::UnboundedSender<WallpaperEvent> {
    fn post(&self, event: WallpaperEvent) {
        let _ = self.send(event);
    }
}
