//! Periodic timers backed by a dedicated thread.
//!
//! A [`Timer`] invokes its callback every `interval` on its own named thread
//! until it is stopped. Views use one timer each to flush their pending
//! changes, so the callback must be cheap relative to the interval and must
//! not block on the timer itself.
//!
//! # Example
//!
//! ```
//! use horizon_relay_core::Timer;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let ticks = Arc::new(AtomicUsize::new(0));
//! let ticks_clone = ticks.clone();
//! let timer = Timer::new("example", Duration::from_millis(10), move || {
//!     ticks_clone.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! timer.start(true).unwrap();
//! timer.stop(true);
//! assert!(ticks.load(Ordering::SeqCst) >= 1);
//! ```

use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use parking_lot::Mutex;

use crate::error::TimerError;
use crate::logging::span_names;

type TimerCallback = Arc<dyn Fn() + Send + Sync>;

/// Handle to the thread of a running timer.
struct RunningTimer {
    /// Dropping or sending on this wakes the thread and ends the loop.
    stop_sender: Sender<()>,
    handle: JoinHandle<()>,
    thread_id: ThreadId,
}

/// A repeating timer with idempotent start and stop.
pub struct Timer {
    name: String,
    interval: Duration,
    callback: TimerCallback,
    running: Mutex<Option<RunningTimer>>,
}

impl Timer {
    /// Create a stopped timer.
    ///
    /// `name` is used for the thread name and in log output.
    pub fn new<F>(name: impl Into<String>, interval: Duration, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            interval,
            callback: Arc::new(callback),
            running: Mutex::new(None),
        }
    }

    /// The timer's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The tick interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether the timer thread is currently running.
    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Start ticking.
    ///
    /// When `run_immediately` is set, the first tick happens right away on
    /// the timer thread instead of after one interval. Returns `Ok(false)`
    /// if the timer was already running.
    pub fn start(&self, run_immediately: bool) -> Result<bool, TimerError> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Ok(false);
        }

        let (stop_sender, stop_receiver) = bounded::<()>(1);
        let callback = self.callback.clone();
        let interval = self.interval;
        let name = self.name.clone();

        let handle = thread::Builder::new()
            .name(format!("timer-{}", self.name))
            .spawn(move || {
                tracing::debug!(target: "horizon_relay_core::timer", timer = %name, "timer started");
                if run_immediately {
                    callback();
                }
                loop {
                    match stop_receiver.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            let _span = tracing::trace_span!(
                                target: "horizon_relay_core::timer",
                                span_names::TIMER_TICK,
                                timer = %name
                            )
                            .entered();
                            callback();
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                tracing::debug!(target: "horizon_relay_core::timer", timer = %name, "timer stopped");
            })
            .map_err(|e| TimerError::SpawnFailed(e.to_string()))?;

        *running = Some(RunningTimer {
            stop_sender,
            thread_id: handle.thread().id(),
            handle,
        });
        Ok(true)
    }

    /// Stop ticking.
    ///
    /// With `wait` set, blocks until a tick in progress has finished. Waiting
    /// is skipped when called from the timer's own callback. Returns `false`
    /// if the timer was not running.
    pub fn stop(&self, wait: bool) -> bool {
        let Some(running) = self.running.lock().take() else {
            return false;
        };

        let _ = running.stop_sender.try_send(());
        drop(running.stop_sender);

        if wait && thread::current().id() != running.thread_id && running.handle.join().is_err() {
            tracing::error!(target: "horizon_relay_core::timer", timer = %self.name, "timer thread panicked");
        }
        true
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.stop(true);
    }
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .finish()
    }
}

static_assertions::assert_impl_all!(Timer: Send, Sync);
