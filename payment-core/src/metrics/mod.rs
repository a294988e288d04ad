//! Rolling per-gateway latency/success metrics (spec §4.7), consumed by
//! the router's scoring fallback.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

const WINDOW_CAPACITY: usize = 1000;

struct Sample {
    success: bool,
    latency: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GatewayHealth {
    pub success_rate: f64,
    pub avg_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
    pub sample_count: u64,
}

impl GatewayHealth {
    /// The optimistic default for a gateway with no recorded samples yet,
    /// so a brand-new gateway isn't scored as unhealthy.
    pub fn unknown() -> Self {
        Self {
            success_rate: 1.0,
            avg_latency_ms: 0.0,
            p95_latency_ms: 0.0,
            p99_latency_ms: 0.0,
            sample_count: 0,
        }
    }
}

/// Nearest-rank percentile over an already-sorted slice.
fn percentile(sorted_ms: &[f64], p: f64) -> f64 {
    if sorted_ms.is_empty() {
        return 0.0;
    }
    let rank = (p * sorted_ms.len() as f64).ceil() as usize;
    let idx = rank.saturating_sub(1).min(sorted_ms.len() - 1);
    sorted_ms[idx]
}

#[derive(Default)]
pub struct GatewayMetrics {
    samples: Mutex<VecDeque<Sample>>,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, success: bool, latency: Duration) {
        let mut samples = self.samples.lock().unwrap();
        samples.push_back(Sample { success, latency });
        while samples.len() > WINDOW_CAPACITY {
            samples.pop_front();
        }
    }

    pub fn snapshot(&self) -> GatewayHealth {
        let samples = self.samples.lock().unwrap();
        if samples.is_empty() {
            return GatewayHealth::unknown();
        }

        let successes = samples.iter().filter(|s| s.success).count();
        let mut latencies_ms: Vec<f64> =
            samples.iter().map(|s| s.latency.as_secs_f64() * 1000.0).collect();
        let total_latency_ms: f64 = latencies_ms.iter().sum();
        latencies_ms.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        GatewayHealth {
            success_rate: successes as f64 / samples.len() as f64,
            avg_latency_ms: total_latency_ms / samples.len() as f64,
            p95_latency_ms: percentile(&latencies_ms, 0.95),
            p99_latency_ms: percentile(&latencies_ms, 0.99),
            sample_count: samples.len() as u64,
        }
    }
}
