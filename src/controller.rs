//! Render-surface controller.
//!
//! The controller is the single authority on whether a frame may be drawn. The
//! host forwards its lifecycle callbacks here; settings and decoded
//! backgrounds come back through the host's event queue, so every scene
//! mutation happens on the drawing context.
//!
//! Legal host sequences:
//!
//! ```text
//! Uninitialized --on_create--> Created --visible--> Visible <--> Hidden
//!       \                         \                    \         /
//!        +-----------------------on_destroy------------> Destroyed
//! ```
//!
//! Callbacks arriving out of order (draw before create, anything after
//! destroy) are ignored rather than reported.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, info, trace};

use crate::clock::FrameClock;
use crate::events::{BackgroundReady, EventSink};
use crate::loader::BackgroundLoader;
use crate::scene::{Canvas, RenderResult, Scene};
use crate::scheduler::SceneScheduler;
use crate::settings::{BackgroundUri, SettingsRepository, SettingsSubscription, SettingsUpdate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceState {
    Uninitialized,
    Created,
    Visible,
    Hidden,
    Destroyed,
}

impl SurfaceState {
    fn is_live(self) -> bool {
        matches!(self, Self::Created | Self::Visible | Self::Hidden)
    }
}

/// Actual surface size plus the scroll room the host asked for.
///
/// `desired_*` is always at least the actual size on each axis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
    pub desired_width: u32,
    pub desired_height: u32,
}

impl Dimensions {
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    fn negotiate(width: u32, height: u32, reported: (u32, u32)) -> Self {
        Self {
            width,
            height,
            desired_width: width.max(reported.0),
            desired_height: height.max(reported.1),
        }
    }
}

/// Last requested background and the state of its load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackgroundTarget {
    pub uri: BackgroundUri,
    /// A load is wanted but waits for valid dimensions.
    pub pending: bool,
    /// Generation of the issued load that has not delivered yet.
    pub in_flight: Option<u64>,
}

/// Outcome of a frame that was actually drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawnFrame {
    /// Present this frame under strict validation; errors are fatal.
    pub validate: bool,
}

/// Latest horizontal offset not yet applied to the scene.
///
/// Translation is absolute, so a newer offset replaces an unapplied one.
#[derive(Debug, Default)]
struct PendingOffset(AtomicU64);

impl PendingOffset {
    const DIRTY: u64 = 1 << 32;

    fn store(&self, dx: f32) {
        self.0
            .store(Self::DIRTY | u64::from(dx.to_bits()), Ordering::Release);
    }

    fn take(&self) -> Option<f32> {
        let packed = self.0.swap(0, Ordering::AcqRel);
        (packed & Self::DIRTY != 0).then(|| f32::from_bits(packed as u32))
    }
}

/// Producer side of the offset handoff; usable from any thread.
#[derive(Clone)]
pub struct OffsetSender(Arc<PendingOffset>);

impl OffsetSender {
    pub fn send(&self, x_pixel_offset: i32) {
        self.0.store(x_pixel_offset as f32);
    }
}

pub struct SurfaceController<S, L, C> {
    scene: S,
    loader: L,
    scheduler: SceneScheduler<C>,
    settings: SettingsRepository,
    runtime: Handle,
    sink: Arc<dyn EventSink>,
    subscription: Option<SettingsSubscription>,
    state: SurfaceState,
    visible: bool,
    dimensions: Dimensions,
    reported_desired: (u32, u32),
    background: BackgroundTarget,
    frame_delay: Duration,
    background_scroll: bool,
    validate_next_frame: bool,
    offset: Arc<PendingOffset>,
}

impl<S, L, C> SurfaceController<S, L, C>
where
    S: Scene,
    L: BackgroundLoader,
    C: FrameClock,
{
    pub fn new(
        scene: S,
        loader: L,
        clock: C,
        settings: SettingsRepository,
        runtime: Handle,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            scene,
            loader,
            scheduler: SceneScheduler::new(clock, sink.clone()),
            settings,
            runtime,
            sink,
            subscription: None,
            state: SurfaceState::Uninitialized,
            visible: false,
            dimensions: Dimensions::default(),
            reported_desired: (0, 0),
            background: BackgroundTarget::default(),
            frame_delay: Duration::ZERO,
            background_scroll: true,
            validate_next_frame: false,
            offset: Arc::default(),
        }
    }

    /// Subscribes to settings and applies their current values.
    pub fn on_create(&mut self) {
        if self.state != SurfaceState::Uninitialized {
            debug!(state = ?self.state, "on_create ignored");
            return;
        }
        self.state = SurfaceState::Created;
        if self.visible {
            self.state = SurfaceState::Visible;
        }

        let (current, subscription) = self.settings.subscribe(&self.runtime, self.sink.clone());
        self.subscription = Some(subscription);
        for update in current {
            self.apply_settings(update);
        }
        info!(dimensions = ?self.dimensions, "surface controller created");
    }

    /// Tears everything down. Safe to call repeatedly or without `on_create`.
    pub fn on_destroy(&mut self) {
        if self.state == SurfaceState::Destroyed {
            return;
        }
        if let Some(mut subscription) = self.subscription.take() {
            subscription.cancel();
        }
        self.scheduler.shutdown();
        self.loader.clear();
        self.background.pending = false;
        self.background.in_flight = None;
        self.visible = false;
        self.state = SurfaceState::Destroyed;
        info!("surface controller destroyed");
    }

    /// Arms strict validation for the next drawn frame.
    pub fn on_surface_created(&mut self) {
        if self.state == SurfaceState::Destroyed {
            return;
        }
        self.validate_next_frame = true;
    }

    /// The drawable went away while the controller lives on.
    pub fn on_surface_destroyed(&mut self) {
        self.on_visibility_changed(false);
    }

    pub fn on_surface_changed(&mut self, width: u32, height: u32) {
        if self.state == SurfaceState::Destroyed {
            return;
        }
        let was_valid = self.dimensions.is_valid();
        self.dimensions = Dimensions::negotiate(width, height, self.reported_desired);
        debug!(dimensions = ?self.dimensions, "surface changed");
        self.apply_bounds();

        if !was_valid && self.dimensions.is_valid() {
            if self.background.pending {
                self.issue_background_load();
            }
            // a render request issued while unsized was dropped by on_draw_frame
            if self.visible && self.state.is_live() {
                self.scheduler.schedule_next_frame(Duration::ZERO);
            }
        }
    }

    pub fn on_desired_size_changed(&mut self, desired_width: u32, desired_height: u32) {
        if self.state == SurfaceState::Destroyed {
            return;
        }
        self.reported_desired = (desired_width, desired_height);
        self.dimensions = Dimensions::negotiate(
            self.dimensions.width,
            self.dimensions.height,
            self.reported_desired,
        );
        debug!(dimensions = ?self.dimensions, "desired size changed");
        self.apply_bounds();
    }

    pub fn on_visibility_changed(&mut self, visible: bool) {
        if self.state == SurfaceState::Destroyed {
            return;
        }
        self.visible = visible;
        if self.state.is_live() {
            self.state = if visible {
                SurfaceState::Visible
            } else {
                SurfaceState::Hidden
            };
        }
        if visible {
            self.scheduler.start();
        } else {
            self.scheduler.stop();
        }
        debug!(visible, state = ?self.state, "visibility changed");
    }

    /// Records a horizontal scroll offset; the latest one is applied right
    /// before the next draw.
    pub fn on_offsets_changed(&mut self, x_pixel_offset: i32) {
        self.offset.store(x_pixel_offset as f32);
    }

    pub fn offsets_sender(&self) -> OffsetSender {
        OffsetSender(self.offset.clone())
    }

    /// Draws one frame into `canvas` if drawing is currently legal.
    pub fn on_draw_frame(&mut self, canvas: &mut Canvas) -> Option<DrawnFrame> {
        if !self.state.is_live() || !self.visible || !self.dimensions.is_valid() {
            trace!(state = ?self.state, visible = self.visible, "draw skipped");
            return None;
        }

        if let Some(dx) = self.offset.take() {
            let dx = if self.background_scroll { dx } else { 0.0 };
            self.scene.translate_x(dx);
        }

        canvas.resize(self.dimensions.width, self.dimensions.height);
        let result = self.scene.draw(canvas);
        let validate = std::mem::take(&mut self.validate_next_frame);
        if let RenderResult::NextFrameIn(delay) = result {
            self.scheduler.schedule_next_frame(delay);
        }
        Some(DrawnFrame { validate })
    }

    pub fn on_settings(&mut self, update: SettingsUpdate) {
        if !self.state.is_live() {
            debug!(state = ?self.state, ?update, "settings update ignored");
            return;
        }
        self.apply_settings(update);
    }

    pub fn on_background_ready(&mut self, ready: BackgroundReady) {
        if !self.state.is_live() {
            return;
        }
        if self.background.in_flight != Some(ready.generation)
            || self.loader.generation() != ready.generation
        {
            debug!(generation = ready.generation, uri = %ready.uri, "stale background dropped");
            return;
        }
        self.background.in_flight = None;
        self.scene.set_background_image(Some(ready.image));
    }

    pub fn state(&self) -> SurfaceState {
        self.state
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    pub fn background(&self) -> &BackgroundTarget {
        &self.background
    }

    pub fn background_uri(&self) -> &BackgroundUri {
        &self.background.uri
    }

    pub fn frame_delay(&self) -> Duration {
        self.frame_delay
    }

    pub fn scene(&self) -> &S {
        &self.scene
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    pub fn scheduler(&self) -> &SceneScheduler<C> {
        &self.scheduler
    }

    fn apply_settings(&mut self, update: SettingsUpdate) {
        match update {
            SettingsUpdate::BackgroundColor(argb) => self.scene.set_background_color(argb),
            SettingsUpdate::BackgroundUri(uri) => self.set_background_uri(uri),
            SettingsUpdate::FrameDelay(delay) => {
                self.frame_delay = delay;
                self.scene.set_frame_delay(delay);
            }
            SettingsUpdate::BackgroundScroll(enabled) => {
                self.background_scroll = enabled;
                if !enabled {
                    self.offset.store(0.0);
                }
            }
        }
    }

    fn set_background_uri(&mut self, uri: BackgroundUri) {
        self.loader.clear();
        self.scene.set_background_image(None);
        self.background = BackgroundTarget {
            pending: !uri.is_none(),
            uri,
            in_flight: None,
        };
        if self.background.pending && self.dimensions.is_valid() {
            self.issue_background_load();
        } else if self.background.pending {
            debug!(uri = %self.background.uri, "background load deferred until surface has a size");
        }
    }

    fn issue_background_load(&mut self) {
        let Dimensions {
            desired_width,
            desired_height,
            ..
        } = self.dimensions;
        let generation = self
            .loader
            .load(self.background.uri.as_str(), desired_width, desired_height);
        debug!(uri = %self.background.uri, generation, "background load issued");
        self.background.pending = false;
        self.background.in_flight = Some(generation);
    }

    fn apply_bounds(&mut self) {
        self.scene
            .set_bounds(self.dimensions.desired_width, self.dimensions.desired_height);
    }
}
