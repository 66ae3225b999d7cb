use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy},
    window::{Fullscreen, Window, WindowAttributes, WindowId},
};

use crate::clock::TokioFrameClock;
use crate::config::Configuration;
use crate::controller::SurfaceController;
use crate::events::{EventSink, WallpaperEvent};
use crate::gpu::{GpuPresenter, PresentOutcome};
use crate::loader::ImageBackgroundLoader;
use crate::particles::ParticleScene;
use crate::scene::Canvas;
use crate::settings::SettingsRepository;

/// Posts events into the winit event loop from any thread.
pub struct ProxySink(Mutex<EventLoopProxy<WallpaperEvent>>);

impl ProxySink {
    pub fn new(proxy: EventLoopProxy<WallpaperEvent>) -> Self {
        Self(Mutex::new(proxy))
    }
}

impl EventSink for ProxySink {
    fn post(&self, event: WallpaperEvent) {
        let Ok(proxy) = self.0.lock() else {
            return;
        };
        if proxy.send_event(event).is_err() {
            trace!("event loop closed; event dropped");
        }
    }
}

type Controller = SurfaceController<ParticleScene, ImageBackgroundLoader, TokioFrameClock>;

struct WallpaperHost {
    cfg: Configuration,
    cancel: CancellationToken,
    controller: Controller,
    window: Option<Arc<Window>>,
    gpu: Option<GpuPresenter>,
    canvas: Canvas,
    fatal: Option<anyhow::Error>,
}

impl WallpaperHost {
    fn ensure_window(&mut self, event_loop: &ActiveEventLoop) -> Option<Arc<Window>> {
        if let Some(window) = self.window.as_ref() {
            return Some(window.clone());
        }

        let mut attrs = WindowAttributes::default().with_title(self.cfg.surface.title.clone());
        if self.cfg.surface.fullscreen {
            attrs = attrs.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }
        match event_loop.create_window(attrs) {
            Ok(window) => {
                let window = Arc::new(window);
                self.window = Some(window.clone());
                Some(window)
            }
            Err(err) => {
                error!(error = %err, "failed to create wallpaper window");
                None
            }
        }
    }

    fn handle_resize(&mut self, size: PhysicalSize<u32>) {
        if let Some(gpu) = self.gpu.as_mut() {
            gpu.resize(size.width, size.height);
        }
        self.controller.on_surface_changed(size.width, size.height);
    }

    /// Maps the cursor position onto a launcher-style scroll offset.
    fn handle_cursor(&mut self, x: f64) {
        let dims = self.controller.dimensions();
        if dims.width == 0 || dims.desired_width <= dims.width {
            return;
        }
        let fraction = (x / f64::from(dims.width)).clamp(0.0, 1.0);
        let offset = -(f64::from(dims.desired_width - dims.width) * fraction);
        self.controller.on_offsets_changed(offset.round() as i32);
    }

    fn draw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(frame) = self.controller.on_draw_frame(&mut self.canvas) else {
            return;
        };
        let Some(gpu) = self.gpu.as_mut() else {
            return;
        };
        match gpu.present(&self.canvas, frame.validate) {
            Ok(PresentOutcome::Reconfigured) => {
                if let Some(window) = self.window.as_ref() {
                    window.request_redraw();
                }
            }
            Ok(PresentOutcome::Presented | PresentOutcome::Skipped) => {}
            Err(err) => {
                error!(error = %err, "first frame failed validation");
                self.fatal = Some(anyhow!(err));
                self.controller.on_destroy();
                event_loop.exit();
            }
        }
    }
}

impl ApplicationHandler<WallpaperEvent> for WallpaperHost {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.cancel.is_cancelled() {
            event_loop.exit();
            return;
        }

        let Some(window) = self.ensure_window(event_loop) else {
            event_loop.exit();
            return;
        };

        if self.gpu.is_none() {
            match GpuPresenter::new(window.clone(), self.cfg.surface.num_samples) {
                Ok(gpu) => {
                    debug!(sample_count = gpu.sample_count(), "gpu presenter ready");
                    self.gpu = Some(gpu);
                }
                Err(err) => {
                    error!(error = ?err, "failed to initialize GPU state");
                    self.fatal = Some(err);
                    event_loop.exit();
                    return;
                }
            }
            self.controller.on_surface_created();
        }

        self.controller.on_create();
        if let Some([w, h]) = self.cfg.surface.desired_size {
            self.controller.on_desired_size_changed(w, h);
        }
        self.handle_resize(window.inner_size());
        self.controller.on_visibility_changed(true);
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        info!("wallpaper surface suspended");
        self.controller.on_surface_destroyed();
        self.gpu = None;
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        if window.id() != window_id {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("wallpaper window close requested");
                self.controller.on_destroy();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => self.handle_resize(size),
            WindowEvent::Occluded(occluded) => {
                self.controller.on_visibility_changed(!occluded);
            }
            WindowEvent::CursorMoved { position, .. } => self.handle_cursor(position.x),
            WindowEvent::RedrawRequested => self.draw(event_loop),
            _ => {}
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: WallpaperEvent) {
        match event {
            WallpaperEvent::RenderRequested => {
                if let Some(window) = self.window.as_ref() {
                    window.request_redraw();
                }
            }
            WallpaperEvent::Settings(update) => self.controller.on_settings(update),
            WallpaperEvent::BackgroundReady(ready) => self.controller.on_background_ready(ready),
            WallpaperEvent::Cancelled => {
                info!("wallpaper received cancellation event");
                self.controller.on_destroy();
                event_loop.exit();
            }
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        debug!("wallpaper event loop exiting");
        self.controller.on_destroy();
    }
}

/// Runs the wallpaper window on the current thread until it closes or
/// `cancel` fires.
pub fn run_windowed(
    cfg: Configuration,
    settings: SettingsRepository,
    cancel: CancellationToken,
    runtime: Handle,
) -> Result<()> {
    let event_loop = EventLoop::<WallpaperEvent>::with_user_event()
        .build()
        .context("failed to build wallpaper event loop")?;
    let proxy = event_loop.create_proxy();
    let sink: Arc<dyn EventSink> = Arc::new(ProxySink::new(proxy));

    let cancel_task = {
        let cancel = cancel.clone();
        let sink = sink.clone();
        runtime.spawn(async move {
            cancel.cancelled().await;
            sink.post(WallpaperEvent::Cancelled);
        })
    };

    let controller = SurfaceController::new(
        ParticleScene::new(cfg.scene.clone()),
        ImageBackgroundLoader::new(runtime.clone(), sink.clone()),
        TokioFrameClock::new(runtime.clone(), sink.clone()),
        settings,
        runtime,
        sink,
    );
    let mut host = WallpaperHost {
        cfg,
        cancel,
        controller,
        window: None,
        gpu: None,
        canvas: Canvas::new(1, 1),
        fatal: None,
    };
    let run_result = event_loop.run_app(&mut host);
    cancel_task.abort();

    run_result.context("wallpaper event loop failed")?;
    match host.fatal.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
