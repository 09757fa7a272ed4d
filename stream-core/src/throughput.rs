//! Rolling transfer-speed sampling.
//!
//! Each transfer session owns one [`ThroughputMeter`]. Time is passed in by
//! the caller so the meter stays deterministic under test.

use std::time::{Duration, Instant};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Default sampling window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(1);

/// Speed over a sliding window of at least `window`.
///
/// The reported speed only changes once `window` has elapsed since the last
/// sample; between samples the previous figure is repeated.
#[derive(Debug, Clone)]
pub struct ThroughputMeter {
    window: Duration,
    sample_started: Option<Instant>,
    bytes_in_sample: u64,
    current_mbps: f64,
}

impl ThroughputMeter {
    /// Create a meter with the given sampling window.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            sample_started: None,
            bytes_in_sample: 0,
            current_mbps: 0.0,
        }
    }

    /// Record `bytes` transferred at `now` and return the current speed in MB/s.
    pub fn record(&mut self, bytes: u64, now: Instant) -> f64 {
        let started = *self.sample_started.get_or_insert(now);
        self.bytes_in_sample += bytes;

        let elapsed = now.saturating_duration_since(started);
        if elapsed >= self.window && !elapsed.is_zero() {
            self.current_mbps = self.bytes_in_sample as f64 / BYTES_PER_MB / elapsed.as_secs_f64();
            self.sample_started = Some(now);
            self.bytes_in_sample = 0;
        }

        self.current_mbps
    }

    /// Last computed speed in MB/s.
    pub fn mbps(&self) -> f64 {
        self.current_mbps
    }

    /// Last computed speed formatted for display, e.g. `"12.50"`.
    pub fn mbps_string(&self) -> String {
        format!("{:.2}", self.current_mbps)
    }

    /// Forget all samples.
    pub fn reset(&mut self) {
        self.sample_started = None;
        self.bytes_in_sample = 0;
        self.current_mbps = 0.0;
    }
}

impl Default for ThroughputMeter {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

/// Whole-number percentage of `done` over `total`, clamped to `0..=100`.
///
/// An empty file is reported as complete.
pub fn percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = (done as u128 * 100 + total as u128 / 2) / total as u128;
    pct.min(100) as u8
}
