//! Core runtime for Horizon Relay.
//!
//! This crate provides the small runtime the view engine and the API server
//! are built on:
//!
//! - **Signal/Slot System**: Type-safe change notification between managers and views
//! - **Timers**: Periodic callbacks on a dedicated thread
//! - **Logging**: Tracing targets, span names and a timing guard
//!
//! # Signal/Slot Example
//!
//! ```
//! use horizon_relay_core::Signal;
//!
//! let priority_changed = Signal::<(u32, i8)>::new();
//!
//! let conn_id = priority_changed.connect(|(token, priority)| {
//!     println!("Bundle {} now has priority {}", token, priority);
//! });
//!
//! priority_changed.emit((7, 3));
//! priority_changed.disconnect(conn_id);
//! ```

mod error;
pub mod logging;
pub mod signal;
mod timer;

pub use error::TimerError;
pub use logging::PerfSpan;
pub use signal::{ConnectionGuard, ConnectionId, Signal};
pub use timer::Timer;
