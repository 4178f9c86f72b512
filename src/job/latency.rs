//! Per-job histogram of window durations (external call + write commit).

use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

/// Tracks 1us to 10min at 3 significant figures. Values are microseconds.
pub struct WindowLatency {
    inner: Mutex<Option<hdrhistogram::Histogram<u64>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencySnapshot {
    pub samples: u64,
    pub p50_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub p99_ms: Option<f64>,
}

impl WindowLatency {
    pub fn new() -> Self {
        let histogram = hdrhistogram::Histogram::new_with_bounds(1, 600_000_000, 3).ok();
        Self {
            inner: Mutex::new(histogram),
        }
    }

    pub fn record(&self, d: Duration) {
        let us = d.as_micros().min(u128::from(u64::MAX)) as u64;
        if let Ok(mut guard) = self.inner.lock() {
            if let Some(h) = guard.as_mut() {
                // Windows past the upper bound count as the bound.
                h.saturating_record(us.max(1));
            }
        }
    }

    pub fn snapshot(&self) -> LatencySnapshot {
        let empty = LatencySnapshot {
            samples: 0,
            p50_ms: None,
            p95_ms: None,
            p99_ms: None,
        };
        let Ok(guard) = self.inner.lock() else {
            return empty;
        };
        let Some(h) = guard.as_ref().filter(|h| h.len() > 0) else {
            return empty;
        };
        let ms = |q: f64| Some(h.value_at_quantile(q) as f64 / 1000.0);
        LatencySnapshot {
            samples: h.len(),
            p50_ms: ms(0.5),
            p95_ms: ms(0.95),
            p99_ms: ms(0.99),
        }
    }
}

impl Default for WindowLatency {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_histogram_has_no_percentiles() {
        let l = WindowLatency::new();
        assert_eq!(l.snapshot().samples, 0);
        assert_eq!(l.snapshot().p50_ms, None);
    }

    #[test]
    fn percentiles_are_reported_in_millis() {
        let l = WindowLatency::new();
        for ms in [10, 20, 30, 40, 1000] {
            l.record(Duration::from_millis(ms));
        }
        let s = l.snapshot();
        assert_eq!(s.samples, 5);
        let p50 = s.p50_ms.unwrap();
        assert!((29.0..=31.0).contains(&p50), "p50={p50}");
        assert!(s.p99_ms.unwrap() >= 990.0);
    }

    #[test]
    fn windows_past_the_bound_are_still_counted() {
        let l = WindowLatency::new();
        l.record(Duration::from_secs(20 * 60));
        let s = l.snapshot();
        assert_eq!(s.samples, 1);
        let p50 = s.p50_ms.unwrap();
        assert!((599_000.0..=601_000.0).contains(&p50), "p50={p50}");
    }
}
