//! HDR latency histograms and the quantile maps extracted from them.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hdrhistogram::Histogram;
use hdrhistogram::serialization::{Serializer, V2DeflateSerializer};
use serde::{Deserialize, Serialize};
use crate::core::error::Result;

/// Latencies are recorded in microseconds between 1us and 1s with 3
/// significant figures: 1us resolution up to 1ms, 1ms or better up to 1s.
/// Slower commands are clamped to the upper bound so they are still counted.
pub const LOWEST_LATENCY_US: u64 = 1;
pub const HIGHEST_LATENCY_US: u64 = 1_000_000;
pub const SIGNIFICANT_FIGURES: u8 = 3;

/// `q0, q50, q95, q99, q99.9, q100` in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QuantileMap {
    pub q0: f64,
    pub q50: f64,
    pub q95: f64,
    pub q99: f64,
    pub q999: f64,
    pub q100: f64,
}

#[derive(Debug, Clone)]
pub struct LatencyHistogram {
    inner: Histogram<u64>,
}

impl LatencyHistogram {
    pub fn new() -> Result<Self> {
        let inner = Histogram::new_with_bounds(LOWEST_LATENCY_US, HIGHEST_LATENCY_US, SIGNIFICANT_FIGURES)?;
        Ok(LatencyHistogram { inner })
    }

    /// An empty histogram with the same bounds and precision.
    pub fn empty_like(&self) -> Self {
        LatencyHistogram { inner: Histogram::new_from(&self.inner) }
    }

    pub fn record(&mut self, latency_us: u64) {
        self.inner.saturating_record(latency_us);
    }

    pub fn count(&self) -> u64 {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Latency at `percentile` (0-100) in milliseconds.
    pub fn percentile_ms(&self, percentile: f64) -> f64 {
        if self.inner.is_empty() {
            return 0.0;
        }
        self.inner.value_at_percentile(percentile) as f64 / 1000.0
    }

    /// All zeros when nothing was recorded.
    pub fn quantiles(&self) -> QuantileMap {
        QuantileMap {
            q0: self.percentile_ms(0.0),
            q50: self.percentile_ms(50.0),
            q95: self.percentile_ms(95.0),
            q99: self.percentile_ms(99.0),
            q999: self.percentile_ms(99.9),
            q100: self.percentile_ms(100.0),
        }
    }

    pub fn reset(&mut self) {
        self.inner.reset();
    }

    /// V2 deflate serialisation, base64 encoded. Any HdrHistogram
    /// implementation can decode and merge it.
    pub fn encode(&self) -> Result<String> {
        let mut buf = Vec::new();
        V2DeflateSerializer::new().serialize(&self.inner, &mut buf)?;
        Ok(STANDARD.encode(buf))
    }
}
