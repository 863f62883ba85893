//! Request timing middleware
//!
//! Every response carries its handling time in `X-Process-Time` (seconds),
//! and the most recent durations are kept for the metrics endpoint.

use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Response header carrying the handling time
pub const PROCESS_TIME_HEADER: &str = "x-process-time";

/// Number of durations retained
const LATENCY_WINDOW: usize = 100;

/// Sliding window of recent request durations
#[derive(Debug, Default)]
pub struct LatencyTracker {
    samples: Mutex<VecDeque<f64>>,
}

impl LatencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, duration: Duration) {
        let mut samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
        if samples.len() == LATENCY_WINDOW {
            samples.pop_front();
        }
        samples.push_back(duration.as_secs_f64());
    }

    /// Recorded durations in seconds, oldest first
    pub fn snapshot(&self) -> Vec<f64> {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect()
    }

    /// Mean duration in seconds, zero when nothing was recorded
    pub fn average(&self) -> f64 {
        let samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().sum::<f64>() / samples.len() as f64
    }
}

/// Time the request, record it and stamp the response
pub async fn record_timing(
    State(tracker): State<Arc<LatencyTracker>>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let mut response = next.run(request).await;
    let elapsed = started.elapsed();

    tracker.record(elapsed);
    if let Ok(value) = HeaderValue::from_str(&elapsed.as_secs_f64().to_string()) {
        response.headers_mut().insert(PROCESS_TIME_HEADER, value);
    }

    response
}
