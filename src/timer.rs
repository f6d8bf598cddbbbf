//! One-shot start-up deadline.
//!
//! The radio task arms the deadline when it starts waiting for the stack
//! to come up, and cancels it once the stack reports "on".  The deadline
//! task ([`StartupDeadline::run`]) does nothing on expiry except set the
//! timeout flag; the radio task's wait loop decides what follows.
//!
//! The flag is set at most once per arm and is only cleared by
//! [`reset`](StartupDeadline::reset) at radio task start.

use core::sync::atomic::{AtomicBool, Ordering};

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant, Timer};

pub struct StartupDeadline {
    expired: AtomicBool,
    armed: Signal<CriticalSectionRawMutex, Instant>,
    cancelled: Signal<CriticalSectionRawMutex, ()>,
}

impl StartupDeadline {
    pub const fn new() -> Self {
        Self {
            expired: AtomicBool::new(false),
            armed: Signal::new(),
            cancelled: Signal::new(),
        }
    }

    /// Clear the flag and drop any pending arm or cancel request.
    pub fn reset(&self) {
        self.expired.store(false, Ordering::Release);
        self.armed.reset();
        self.cancelled.reset();
    }

    /// Start the countdown; returns the absolute deadline.
    pub fn arm(&self, timeout: Duration) -> Instant {
        let at = Instant::now() + timeout;
        self.cancelled.reset();
        self.armed.signal(at);
        at
    }

    /// Stop a pending countdown.  No effect once the deadline has fired.
    pub fn cancel(&self) {
        self.cancelled.signal(());
    }

    /// Whether the deadline fired.
    pub fn expired(&self) -> bool {
        self.expired.load(Ordering::Acquire)
    }

    /// Deadline task body.
    ///
    /// Each arm fires at most once.
    pub async fn run(&self) -> ! {
        loop {
            let at = self.armed.wait().await;
            match select(Timer::at(at), self.cancelled.wait()).await {
                Either::First(()) => {
                    self.expired.store(true, Ordering::Release);
                    warn!("start-up deadline expired");
                }
                Either::Second(()) => debug!("start-up deadline cancelled"),
            }
        }
    }
}

impl Default for StartupDeadline {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;

    /// Drive the deadline task alongside `body` until `body` finishes.
    fn with_deadline_task<F: core::future::Future<Output = ()>>(deadline: &StartupDeadline, body: F) {
        block_on(async {
            match select(deadline.run(), body).await {
                Either::First(never) => never,
                Either::Second(()) => {}
            }
        });
    }

    #[test]
    fn fires_after_timeout() {
        let deadline = StartupDeadline::new();
        with_deadline_task(&deadline, async {
            deadline.arm(Duration::from_millis(10));
            assert!(!deadline.expired());
            Timer::after(Duration::from_millis(40)).await;
        });
        assert!(deadline.expired());
    }

    #[test]
    fn cancel_prevents_firing() {
        let deadline = StartupDeadline::new();
        with_deadline_task(&deadline, async {
            deadline.arm(Duration::from_millis(20));
            Timer::after(Duration::from_millis(5)).await;
            deadline.cancel();
            Timer::after(Duration::from_millis(50)).await;
        });
        assert!(!deadline.expired());
    }

    #[test]
    fn cancel_before_task_observes_arm() {
        let deadline = StartupDeadline::new();
        deadline.arm(Duration::from_millis(10));
        deadline.cancel();
        with_deadline_task(&deadline, async {
            Timer::after(Duration::from_millis(40)).await;
        });
        assert!(!deadline.expired());
    }

    #[test]
    fn flag_survives_cancel_after_expiry() {
        let deadline = StartupDeadline::new();
        with_deadline_task(&deadline, async {
            deadline.arm(Duration::from_millis(5));
            Timer::after(Duration::from_millis(30)).await;
            deadline.cancel();
            Timer::after(Duration::from_millis(5)).await;
        });
        assert!(deadline.expired());
    }

    #[test]
    fn reset_clears_flag() {
        let deadline = StartupDeadline::new();
        with_deadline_task(&deadline, async {
            deadline.arm(Duration::from_millis(5));
            Timer::after(Duration::from_millis(30)).await;
        });
        assert!(deadline.expired());
        deadline.reset();
        assert!(!deadline.expired());
    }

    #[test]
    fn arm_returns_absolute_deadline() {
        let deadline = StartupDeadline::new();
        let before = Instant::now();
        let at = deadline.arm(Duration::from_millis(100));
        assert!(at >= before + Duration::from_millis(100));
    }
}
