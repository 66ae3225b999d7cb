use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::events::{EventSink, WallpaperEvent};

/// Sentinel the settings store uses for "no background image".
pub const NO_URI: &str = "none";

/// Background image location, or the "none" sentinel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum BackgroundUri {
    #[default]
    None,
    Uri(String),
}

impl BackgroundUri {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == NO_URI {
            Self::None
        } else {
            Self::Uri(trimmed.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::None => NO_URI,
            Self::Uri(uri) => uri,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl From<String> for BackgroundUri {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl fmt::Display for BackgroundUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User-facing wallpaper settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Settings {
    /// Background fill, ARGB.
    pub background_color: u32,
    pub background_uri: BackgroundUri,
    /// Minimum time between frames, in ms.
    pub frame_delay_ms: u64,
    /// Whether launcher scroll offsets translate the scene.
    pub background_scroll: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            background_color: 0xFF21_2121,
            background_uri: BackgroundUri::None,
            frame_delay_ms: 10,
            background_scroll: true,
        }
    }
}

impl Settings {
    pub fn frame_delay(&self) -> Duration {
        Duration::from_millis(self.frame_delay_ms)
    }
}

/// One emission from one of the settings streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsUpdate {
    BackgroundColor(u32),
    BackgroundUri(BackgroundUri),
    FrameDelay(Duration),
    BackgroundScroll(bool),
}

struct Streams {
    color: watch::Sender<u32>,
    uri: watch::Sender<BackgroundUri>,
    frame_delay: watch::Sender<Duration>,
    scroll: watch::Sender<bool>,
}

/// Reactive settings store. Every stream replays its latest value to new
/// subscribers and only emits again when the value actually changes.
#[derive(Clone)]
pub struct SettingsRepository {
    streams: Arc<Streams>,
}

impl SettingsRepository {
    pub fn new(initial: &Settings) -> Self {
        let (color, _) = watch::channel(initial.background_color);
        let (uri, _) = watch::channel(initial.background_uri.clone());
        let (frame_delay, _) = watch::channel(initial.frame_delay());
        let (scroll, _) = watch::channel(initial.background_scroll);
        Self {
            streams: Arc::new(Streams {
                color,
                uri,
                frame_delay,
                scroll,
            }),
        }
    }

    pub fn set_background_color(&self, argb: u32) {
        replace_if_changed(&self.streams.color, argb);
    }

    pub fn set_background_uri(&self, uri: BackgroundUri) {
        replace_if_changed(&self.streams.uri, uri);
    }

    pub fn set_frame_delay(&self, delay: Duration) {
        replace_if_changed(&self.streams.frame_delay, delay);
    }

    pub fn set_background_scroll(&self, enabled: bool) {
        replace_if_changed(&self.streams.scroll, enabled);
    }

    /// Pushes every field of `settings`; unchanged fields emit nothing.
    pub fn apply(&self, settings: &Settings) {
        self.set_background_color(settings.background_color);
        self.set_background_uri(settings.background_uri.clone());
        self.set_frame_delay(settings.frame_delay());
        self.set_background_scroll(settings.background_scroll);
    }

    pub fn snapshot(&self) -> Settings {
        Settings {
            background_color: *self.streams.color.borrow(),
            background_uri: self.streams.uri.borrow().clone(),
            frame_delay_ms: self.streams.frame_delay.borrow().as_millis() as u64,
            background_scroll: *self.streams.scroll.borrow(),
        }
    }

    /// Subscribes to all streams.
    ///
    /// The current values are returned immediately as a list of updates; later
    /// changes are posted to `sink` from a task on `runtime` until the returned
    /// subscription is cancelled.
    pub fn subscribe(
        &self,
        runtime: &Handle,
        sink: Arc<dyn EventSink>,
    ) -> (Vec<SettingsUpdate>, SettingsSubscription) {
        let mut color = self.streams.color.subscribe();
        let mut uri = self.streams.uri.subscribe();
        let mut frame_delay = self.streams.frame_delay.subscribe();
        let mut scroll = self.streams.scroll.subscribe();

        let current = vec![
            SettingsUpdate::BackgroundColor(*color.borrow_and_update()),
            SettingsUpdate::BackgroundUri(uri.borrow_and_update().clone()),
            SettingsUpdate::FrameDelay(*frame_delay.borrow_and_update()),
            SettingsUpdate::BackgroundScroll(*scroll.borrow_and_update()),
        ];

        let cancel = CancellationToken::new();
        let handle = runtime.spawn({
            let cancel = cancel.clone();
            async move {
                loop {
                    let update = tokio::select! {
                        _ = cancel.cancelled() => break,
                        res = color.changed() => match res {
                            Ok(()) => SettingsUpdate::BackgroundColor(*color.borrow_and_update()),
                            Err(_) => break,
                        },
                        res = uri.changed() => match res {
                            Ok(()) => SettingsUpdate::BackgroundUri(uri.borrow_and_update().clone()),
                            Err(_) => break,
                        },
                        res = frame_delay.changed() => match res {
                            Ok(()) => SettingsUpdate::FrameDelay(*frame_delay.borrow_and_update()),
                            Err(_) => break,
                        },
                        res = scroll.changed() => match res {
                            Ok(()) => SettingsUpdate::BackgroundScroll(*scroll.borrow_and_update()),
                            Err(_) => break,
                        },
                    };
                    debug!(?update, "settings changed");
                    sink.post(WallpaperEvent::Settings(update));
                }
            }
        });

        (
            current,
            SettingsSubscription {
                cancel,
                handle: Some(handle),
            },
        )
    }
}

fn replace_if_changed<T: PartialEq>(tx: &watch::Sender<T>, value: T) {
    tx.send_if_modified(|current| {
        if *current == value {
            false
        } else {
            *current = value;
            true
        }
    });
}

/// Handle to a live settings subscription. Cancelled on drop.
pub struct SettingsSubscription {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl SettingsSubscription {
    /// Stops forwarding updates. Calling it again is a no-op.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_some() && !self.cancel.is_cancelled()
    }
}

impl Drop for SettingsSubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use tokio::time::{sleep, timeout};

    fn sink() -> (Arc<dyn EventSink>, mpsc::UnboundedReceiver<WallpaperEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(tx), rx)
    }

    #[test]
    fn parses_none_sentinel() {
        assert_eq!(BackgroundUri::parse("none"), BackgroundUri::None);
        assert_eq!(BackgroundUri::parse("  "), BackgroundUri::None);
        assert_eq!(
            BackgroundUri::parse("file:///tmp/a.png"),
            BackgroundUri::Uri("file:///tmp/a.png".into())
        );
        assert_eq!(BackgroundUri::None.to_string(), NO_URI);
    }

    #[tokio::test]
    async fn subscribe_replays_latest_values() {
        let repo = SettingsRepository::new(&Settings::default());
        repo.set_background_color(666);
        repo.set_frame_delay(Duration::from_millis(30));

        let (sink, mut rx) = sink();
        let (current, _sub) = repo.subscribe(&Handle::current(), sink);
        assert!(current.contains(&SettingsUpdate::BackgroundColor(666)));
        assert!(current.contains(&SettingsUpdate::FrameDelay(Duration::from_millis(30))));
        assert!(current.contains(&SettingsUpdate::BackgroundUri(BackgroundUri::None)));

        sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err(), "replayed values are not re-posted");
    }

    #[tokio::test]
    async fn forwards_changes_until_cancelled() {
        let repo = SettingsRepository::new(&Settings::default());
        let (sink, mut rx) = sink();
        let (_, mut sub) = repo.subscribe(&Handle::current(), sink);

        repo.set_background_uri(BackgroundUri::parse("file:///bg.png"));
        let event = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("update forwarded")
            .expect("sink open");
        match event {
            WallpaperEvent::Settings(SettingsUpdate::BackgroundUri(uri)) => {
                assert_eq!(uri.as_str(), "file:///bg.png")
            }
            other => panic!("unexpected event: {other:?}"),
        }

        sub.cancel();
        sub.cancel();
        assert!(!sub.is_active());
        repo.set_background_color(1);
        sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unchanged_values_do_not_emit() {
        let repo = SettingsRepository::new(&Settings::default());
        let (sink, mut rx) = sink();
        let (_, _sub) = repo.subscribe(&Handle::current(), sink);

        repo.apply(&Settings::default());
        sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(repo.snapshot(), Settings::default());
    }
}
