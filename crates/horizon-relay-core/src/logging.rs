//! Logging facilities for Horizon Relay.
//!
//! Horizon Relay uses the `tracing` crate for instrumentation. Library code
//! never installs a subscriber; the daemon binary does that at startup:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter(EnvFilter::from_default_env())
//!     .init();
//! ```
//!
//! All events are emitted under the targets in [`targets`], so a directive
//! such as `RUST_LOG=horizon_relay::view=debug` shows view flushes without
//! the per-emit signal noise.

use std::time::Instant;

/// Span names used throughout Horizon Relay for tracing.
pub mod span_names {
    /// One flush of a list view.
    pub const VIEW_FLUSH: &str = "horizon_relay::view::flush";
    /// One tick of a periodic timer.
    pub const TIMER_TICK: &str = "horizon_relay::timer::tick";
    /// Dispatch of a single API request.
    pub const API_REQUEST: &str = "horizon_relay::api::request";
}

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Core runtime target.
    pub const CORE: &str = "horizon_relay_core";
    /// Timer system target.
    pub const TIMER: &str = "horizon_relay_core::timer";
    /// Signal/slot system target.
    pub const SIGNAL: &str = "horizon_relay_core::signal";
    /// List view engine target.
    pub const VIEW: &str = "horizon_relay::view";
    /// Item source managers target.
    pub const SOURCE: &str = "horizon_relay::source";
    /// API dispatch target.
    pub const API: &str = "horizon_relay_api";
    /// Socket transport target.
    pub const SERVER: &str = "horizon_relay_api::transport";
}

/// A guard that measures an operation and logs its duration when dropped.
///
/// The operation runs inside an `info`-level span, and the elapsed time is
/// reported at `debug` level under [`targets::CORE`] on drop.
#[derive(Debug)]
pub struct PerfSpan {
    name: &'static str,
    started: Instant,
    #[allow(dead_code)]
    span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Create a new performance span.
    ///
    /// The span will be active until the guard is dropped.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!(target: "horizon_relay::perf", "perf", operation = name);
        Self {
            name,
            started: Instant::now(),
            span: span.entered(),
        }
    }

    /// Time elapsed since the span was opened.
    pub fn elapsed(&self) -> std::time::Duration {
        self.started.elapsed()
    }
}

impl Drop for PerfSpan {
    fn drop(&mut self) {
        tracing::debug!(
            target: "horizon_relay_core",
            operation = self.name,
            elapsed_us = self.started.elapsed().as_micros() as u64,
            "operation finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perf_span_measures() {
        let span = PerfSpan::new("test_operation");
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(span.elapsed() >= std::time::Duration::from_millis(2));
    }
}
