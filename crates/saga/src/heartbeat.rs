//! Liveness tracking for long-running activity attempts.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
struct Beat {
    count: u64,
    at: Instant,
}

/// Handle an activity body uses to report that it is still alive.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    tx: Arc<watch::Sender<Beat>>,
}

impl Heartbeat {
    /// Records a liveness signal.
    pub fn signal(&self) {
        self.tx.send_modify(|beat| {
            beat.count += 1;
            beat.at = Instant::now();
        });
    }
}

/// Watches one attempt's heartbeats and notices when they stop.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    timeout: Option<Duration>,
    rx: watch::Receiver<Beat>,
}

impl HeartbeatMonitor {
    /// Starts monitoring. The start time counts as the first signal.
    ///
    /// A `None` or zero timeout disables the monitor.
    pub fn start(timeout: Option<Duration>) -> (Self, Heartbeat) {
        let (tx, rx) = watch::channel(Beat {
            count: 0,
            at: Instant::now(),
        });
        let monitor = Self {
            timeout: timeout.filter(|t| !t.is_zero()),
            rx,
        };
        (monitor, Heartbeat { tx: Arc::new(tx) })
    }

    /// Returns when the last signal (or the start) was recorded.
    pub fn last_signal(&self) -> Instant {
        self.rx.borrow().at
    }

    /// Returns how many signals have been received.
    pub fn signal_count(&self) -> u64 {
        self.rx.borrow().count
    }

    /// Completes once no signal has arrived for a full timeout period,
    /// returning the timeout. Never completes when monitoring is disabled.
    pub async fn stalled(&self) -> Duration {
        let Some(timeout) = self.timeout else {
            return std::future::pending().await;
        };

        loop {
            let seen = *self.rx.borrow();
            tokio::time::sleep_until(seen.at + timeout).await;
            if self.rx.borrow().count == seen.count {
                return timeout;
            }
        }
    }
}
