//! Runtime counters and latency statistics for the scoring service.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Retained latency samples before the oldest half is discarded
const LATENCY_WINDOW: usize = 10_000;

/// Metrics collector for the scoring service
pub struct ServiceMetrics {
    /// Requests answered with a score
    pub requests_scored: AtomicU64,
    /// Requests answered with an error
    pub requests_failed: AtomicU64,
    /// Decision-mode replies with `decision = true`
    pub positive_decisions: AtomicU64,
    errors_by_kind: RwLock<BTreeMap<String, u64>>,
    /// Handling times in microseconds
    latencies: RwLock<Vec<u64>>,
    score_buckets: RwLock<[u64; 10]>,
    start_time: Instant,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            requests_scored: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            positive_decisions: AtomicU64::new(0),
            errors_by_kind: RwLock::new(BTreeMap::new()),
            latencies: RwLock::new(Vec::with_capacity(1000)),
            score_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record a successfully scored request
    pub fn record_score(&self, elapsed: Duration, risk_score: f64, decision: Option<bool>) {
        self.requests_scored.fetch_add(1, Ordering::Relaxed);
        if decision == Some(true) {
            self.positive_decisions.fetch_add(1, Ordering::Relaxed);
        }
        self.record_latency(elapsed);

        let bucket = (risk_score.clamp(0.0, 1.0) * 10.0).min(9.0) as usize;
        if let Ok(mut buckets) = self.score_buckets.write() {
            buckets[bucket] += 1;
        }
    }

    /// Record a request that produced an error response
    pub fn record_error(&self, elapsed: Duration, kind: &str) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
        self.record_latency(elapsed);
        if let Ok(mut by_kind) = self.errors_by_kind.write() {
            *by_kind.entry(kind.to_string()).or_insert(0) += 1;
        }
    }

    fn record_latency(&self, elapsed: Duration) {
        if let Ok(mut times) = self.latencies.write() {
            times.push(elapsed.as_micros() as u64);
            if times.len() > LATENCY_WINDOW {
                times.drain(0..LATENCY_WINDOW / 2);
            }
        }
    }

    pub fn latency_stats(&self) -> LatencyStats {
        let Ok(times) = self.latencies.read() else {
            return LatencyStats::default();
        };
        if times.is_empty() {
            return LatencyStats::default();
        }

        let mut sorted = times.clone();
        sorted.sort_unstable();
        let count = sorted.len();
        let percentile = |q: f64| sorted[((count as f64 * q) as usize).min(count - 1)];

        LatencyStats {
            count: count as u64,
            mean_us: sorted.iter().sum::<u64>() / count as u64,
            p50_us: percentile(0.5),
            p95_us: percentile(0.95),
            p99_us: percentile(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Requests handled per second since startup
    pub fn throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.total_requests() as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn total_requests(&self) -> u64 {
        self.requests_scored.load(Ordering::Relaxed) + self.requests_failed.load(Ordering::Relaxed)
    }

    pub fn score_distribution(&self) -> [u64; 10] {
        self.score_buckets.read().map(|b| *b).unwrap_or_default()
    }

    pub fn errors_by_kind(&self) -> BTreeMap<String, u64> {
        self.errors_by_kind
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    pub fn print_summary(&self) {
        let scored = self.requests_scored.load(Ordering::Relaxed);
        let failed = self.requests_failed.load(Ordering::Relaxed);
        let positives = self.positive_decisions.load(Ordering::Relaxed);
        let latency = self.latency_stats();

        info!(
            scored,
            failed,
            positive_decisions = positives,
            throughput = format!("{:.1} req/s", self.throughput()),
            "Scoring summary"
        );
        info!(
            mean_us = latency.mean_us,
            p50_us = latency.p50_us,
            p95_us = latency.p95_us,
            p99_us = latency.p99_us,
            max_us = latency.max_us,
            "Scoring latency"
        );
        for (kind, count) in self.errors_by_kind() {
            info!(kind = %kind, count, "Errors by kind");
        }

        let distribution = self.score_distribution();
        let total: u64 = distribution.iter().sum();
        for (i, &count) in distribution.iter().enumerate() {
            if count == 0 {
                continue;
            }
            let pct = count as f64 / total as f64 * 100.0;
            info!(
                "  {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                pct,
                "█".repeat(((pct / 5.0) as usize).min(20))
            );
        }
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Latency statistics in microseconds
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LatencyStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Prints a metrics summary on a fixed interval
pub struct MetricsReporter {
    metrics: Arc<ServiceMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<ServiceMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
        // First tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = ServiceMetrics::new();

        metrics.record_score(Duration::from_micros(100), 0.5, None);
        metrics.record_score(Duration::from_micros(300), 0.95, Some(true));
        metrics.record_score(Duration::from_micros(200), 0.05, Some(false));
        metrics.record_error(Duration::from_micros(50), "input_validation");

        assert_eq!(metrics.requests_scored.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.requests_failed.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.positive_decisions.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.total_requests(), 4);
        assert_eq!(metrics.errors_by_kind().get("input_validation"), Some(&1));

        let distribution = metrics.score_distribution();
        assert_eq!(distribution[0], 1);
        assert_eq!(distribution[5], 1);
        assert_eq!(distribution[9], 1);
    }

    #[test]
    fn test_latency_stats() {
        let metrics = ServiceMetrics::new();
        assert_eq!(metrics.latency_stats(), LatencyStats::default());

        for us in 1..=100 {
            metrics.record_score(Duration::from_micros(us), 0.1, None);
        }
        let stats = metrics.latency_stats();
        assert_eq!(stats.count, 100);
        assert_eq!(stats.max_us, 100);
        assert_eq!(stats.p50_us, 51);
        assert_eq!(stats.p99_us, 100);
    }
}
