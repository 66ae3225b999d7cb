use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::events::EventSink;

/// One-shot timer that requests a render when it fires.
pub trait FrameClock {
    /// Arms the timer for `delay`. Any timer still pending is cancelled first,
    /// so at most one is ever in flight.
    fn arm(&mut self, delay: Duration);

    /// Cancels the pending timer, if any. Safe to call with nothing pending.
    fn cancel_all(&mut self);

    fn is_armed(&self) -> bool;
}

struct PendingTimer {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Frame clock backed by a tokio timer task.
pub struct TokioFrameClock {
    runtime: Handle,
    sink: Arc<dyn EventSink>,
    pending: Option<PendingTimer>,
}

impl TokioFrameClock {
    pub fn new(runtime: Handle, sink: Arc<dyn EventSink>) -> Self {
        Self {
            runtime,
            sink,
            pending: None,
        }
    }
}

impl FrameClock for TokioFrameClock {
    fn arm(&mut self, delay: Duration) {
        self.cancel_all();

        let cancel = CancellationToken::new();
        let handle = self.runtime.spawn({
            let cancel = cancel.clone();
            let sink = self.sink.clone();
            async move {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {}
                    _ = sleep(delay) => {
                        if !cancel.is_cancelled() {
                            trace!(delay_ms = delay.as_millis() as u64, "frame clock fired");
                            sink.request_render();
                        }
                    }
                }
            }
        });
        self.pending = Some(PendingTimer { cancel, handle });
    }

    fn cancel_all(&mut self) {
        if let Some(timer) = self.pending.take() {
            timer.cancel.cancel();
            timer.handle.abort();
        }
    }

    fn is_armed(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|timer| !timer.cancel.is_cancelled() && !timer.handle.is_finished())
    }
}

impl Drop for TokioFrameClock {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::WallpaperEvent;
    use tokio::sync::mpsc;
    use tokio::time::{Instant, timeout};

    fn clock() -> (TokioFrameClock, mpsc::UnboundedReceiver<WallpaperEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (TokioFrameClock::new(Handle::current(), Arc::new(tx)), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_delay() {
        let (mut clock, mut rx) = clock();
        let start = Instant::now();
        clock.arm(Duration::from_millis(16));
        assert!(clock.is_armed());

        let event = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timer should fire")
            .expect("sink open");
        assert!(matches!(event, WallpaperEvent::RenderRequested));
        assert!(start.elapsed() >= Duration::from_millis(16));

        sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());
        assert!(!clock.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_supersedes_pending_timer() {
        let (mut clock, mut rx) = clock();
        clock.arm(Duration::from_millis(50));
        clock.arm(Duration::from_millis(10));

        let first = timeout(Duration::from_secs(1), rx.recv()).await;
        assert!(matches!(first, Ok(Some(WallpaperEvent::RenderRequested))));

        sleep(Duration::from_millis(200)).await;
        assert!(rx.try_recv().is_err(), "superseded timer must not fire");
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_stops_pending_timer() {
        let (mut clock, mut rx) = clock();
        clock.cancel_all();
        clock.arm(Duration::from_millis(10));
        clock.cancel_all();
        assert!(!clock.is_armed());

        sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }
}
