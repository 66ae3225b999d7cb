use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use crate::clock::FrameClock;
use crate::events::EventSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Armed,
}

/// Decides when the next frame is requested.
///
/// Requests are only issued while running; the controller starts the
/// scheduler when the surface becomes visible and stops it when hidden.
/// After [`SceneScheduler::shutdown`] the scheduler stays inert for good.
pub struct SceneScheduler<C> {
    clock: C,
    sink: Arc<dyn EventSink>,
    running: bool,
    inert: bool,
}

impl<C: FrameClock> SceneScheduler<C> {
    pub fn new(clock: C, sink: Arc<dyn EventSink>) -> Self {
        Self {
            clock,
            sink,
            running: false,
            inert: false,
        }
    }

    /// Starts scheduling and requests the next frame right away.
    pub fn start(&mut self) {
        if self.inert {
            debug!("scheduler is shut down; ignoring start");
            return;
        }
        self.running = true;
        self.schedule_next_frame(Duration::ZERO);
    }

    pub fn stop(&mut self) {
        self.running = false;
        self.unschedule_next_frame();
    }

    pub fn shutdown(&mut self) {
        self.stop();
        self.inert = true;
    }

    pub fn schedule_next_frame(&mut self, delay: Duration) {
        if !self.running {
            trace!("scheduler not running; frame request dropped");
            return;
        }
        if delay.is_zero() {
            self.clock.cancel_all();
            self.sink.request_render();
        } else {
            self.clock.arm(delay);
        }
    }

    pub fn unschedule_next_frame(&mut self) {
        self.clock.cancel_all();
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn state(&self) -> SchedulerState {
        if self.clock.is_armed() {
            SchedulerState::Armed
        } else {
            SchedulerState::Idle
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::WallpaperEvent;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct ManualClock {
        armed: Vec<Duration>,
        pending: Option<Duration>,
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

    fn scheduler() -> (
        SceneScheduler<ManualClock>,
        mpsc::UnboundedReceiver<WallpaperEvent>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (SceneScheduler::new(ManualClock::default(), Arc::new(tx)), rx)
    }

    fn render_requests(rx: &mut mpsc::UnboundedReceiver<WallpaperEvent>) -> usize {
        let mut count = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, WallpaperEvent::RenderRequested) {
                count += 1;
            }
        }
        count
    }

    #[test]
    fn ignores_requests_while_stopped() {
        let (mut scheduler, mut rx) = scheduler();
        scheduler.schedule_next_frame(Duration::ZERO);
        scheduler.schedule_next_frame(Duration::from_millis(16));
        assert_eq!(render_requests(&mut rx), 0);
        assert!(scheduler.clock().armed.is_empty());
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[test]
    fn zero_delay_requests_render_immediately() {
        let (mut scheduler, mut rx) = scheduler();
        scheduler.start();
        assert_eq!(render_requests(&mut rx), 1);

        scheduler.schedule_next_frame(Duration::ZERO);
        assert_eq!(render_requests(&mut rx), 1);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert!(scheduler.clock().armed.is_empty());
    }

    #[test]
    fn delayed_frame_arms_clock() {
        let (mut scheduler, mut rx) = scheduler();
        scheduler.start();
        render_requests(&mut rx);

        scheduler.schedule_next_frame(Duration::from_millis(40));
        assert_eq!(scheduler.state(), SchedulerState::Armed);
        assert_eq!(scheduler.clock().armed, vec![Duration::from_millis(40)]);
        assert_eq!(render_requests(&mut rx), 0);

        scheduler.stop();
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert!(!scheduler.is_running());
    }

    #[test]
    fn shutdown_is_permanent() {
        let (mut scheduler, mut rx) = scheduler();
        scheduler.shutdown();
        scheduler.start();
        assert!(!scheduler.is_running());
        assert_eq!(render_requests(&mut rx), 0);

        scheduler.unschedule_next_frame();
        scheduler.shutdown();
    }
}
