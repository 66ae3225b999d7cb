use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::RgbaImage;
use image::imageops::{self, FilterType};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::events::{BackgroundReady, EventSink, WallpaperEvent};

/// Loads a background image for the scene.
pub trait BackgroundLoader {
    /// Starts loading `uri` sized to cover `width`x`height`. Any load still in
    /// flight is cancelled. Returns the generation tag of the new load.
    fn load(&mut self, uri: &str, width: u32, height: u32) -> u64;

    /// Cancels whatever is in flight; a later result for it is stale.
    fn clear(&mut self);

    /// Generation of the most recent `load` or `clear`.
    fn generation(&self) -> u64;
}

/// Decodes images on the blocking pool and posts them back as
/// [`WallpaperEvent::BackgroundReady`].
pub struct ImageBackgroundLoader {
    runtime: Handle,
    sink: Arc<dyn EventSink>,
    generation: u64,
    in_flight: Option<CancellationToken>,
}

impl ImageBackgroundLoader {
    pub fn new(runtime: Handle, sink: Arc<dyn EventSink>) -> Self {
        Self {
            runtime,
            sink,
            generation: 0,
            in_flight: None,
        }
    }

    fn cancel_in_flight(&mut self) {
        if let Some(cancel) = self.in_flight.take() {
            cancel.cancel();
        }
    }
}

impl BackgroundLoader for ImageBackgroundLoader {
    fn load(&mut self, uri: &str, width: u32, height: u32) -> u64 {
        self.cancel_in_flight();
        self.generation += 1;
        let generation = self.generation;

        let cancel = CancellationToken::new();
        self.in_flight = Some(cancel.clone());
        let sink = self.sink.clone();
        let uri = uri.to_string();
        self.runtime.spawn(async move {
            let decode = {
                let uri = uri.clone();
                tokio::task::spawn_blocking(move || {
                    let path = resolve_path(&uri)?;
                    decode_for_surface(&path, width, height)
                })
            };
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                res = decode => res,
            };
            if cancel.is_cancelled() {
                return;
            }
            match result {
                Ok(Ok(image)) => {
                    info!(%uri, generation, width = image.width(), height = image.height(), "background decoded");
                    sink.post(WallpaperEvent::BackgroundReady(BackgroundReady {
                        generation,
                        uri,
                        image: Arc::new(image),
                    }));
                }
                Ok(Err(err)) => warn!(%uri, error = %err, "failed to load background"),
                Err(err) => warn!(%uri, error = %err, "background decode task failed"),
            }
        });
        generation
    }

    fn clear(&mut self) {
        self.cancel_in_flight();
        self.generation += 1;
    }

    fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for ImageBackgroundLoader {
    fn drop(&mut self) {
        self.cancel_in_flight();
    }
}

/// Maps a background URI onto a local file path.
pub fn resolve_path(uri: &str) -> Result<PathBuf> {
    if let Some(rest) = uri.strip_prefix("file://") {
        return Ok(PathBuf::from(rest));
    }
    if uri.contains("://") {
        return Err(Error::UnsupportedUri(uri.to_string()));
    }
    Ok(PathBuf::from(uri))
}

/// Decodes `path`, applies EXIF orientation, and scales it to cover
/// `width`x`height`, cropping the overflow around the center.
pub fn decode_for_surface(path: &Path, width: u32, height: u32) -> Result<RgbaImage> {
    let img = decode_rgba8_apply_exif(path)?;
    let (width, height) = (width.max(1), height.max(1));
    if img.dimensions() == (width, height) {
        return Ok(img);
    }

    let scale = f64::max(
        f64::from(width) / f64::from(img.width()),
        f64::from(height) / f64::from(img.height()),
    );
    let scaled_w = ((f64::from(img.width()) * scale).ceil() as u32).max(width);
    let scaled_h = ((f64::from(img.height()) * scale).ceil() as u32).max(height);
    let scaled = imageops::resize(&img, scaled_w, scaled_h, FilterType::Triangle);
    let x = (scaled_w - width) / 2;
    let y = (scaled_h - height) / 2;
    Ok(imageops::crop_imm(&scaled, x, y, width, height).to_image())
}

fn decode_rgba8_apply_exif(path: &Path) -> Result<RgbaImage> {
    let img = image::ImageReader::open(path)?
        .with_guessed_format()?
        .decode()?;
    let img = img.to_rgba8();

    Ok(match read_orientation(path).unwrap_or(1) {
        2 => imageops::flip_horizontal(&img),
        3 => imageops::rotate180(&img),
        4 => imageops::flip_vertical(&img),
        5 => imageops::flip_horizontal(&imageops::rotate90(&img)),
        6 => imageops::rotate90(&img),
        7 => imageops::flip_horizontal(&imageops::rotate270(&img)),
        8 => imageops::rotate270(&img),
        _ => img,
    })
}

fn read_orientation(path: &Path) -> Option<u16> {
    let file = File::open(path).ok()?;
    let mut buf = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut buf).ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    let orientation = field.value.get_uint(0)? as u16;
    debug!(orientation, path = %path.display(), "exif orientation");
    Some(orientation)
}
