//! API Middleware
//!
//! Middleware layers for request timing.

pub mod timing;

pub use timing::{record_timing, LatencyTracker, PROCESS_TIME_HEADER};
