//! Counters and timings for analysis runs
//!
//! One `AnalysisMetrics` belongs to each driver; workers share it by
//! reference.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub const UNITS_ANALYZED: &str = "units_analyzed";
pub const UNITS_FAILED: &str = "units_failed";
pub const LOOP_ITERATIONS: &str = "loop_iterations";
pub const LOOP_WIDENINGS: &str = "loop_widenings";
pub const RECURSION_CUTOFFS: &str = "recursion_cutoffs";
pub const BUDGET_EXHAUSTIONS: &str = "budget_exhaustions";
pub const RETURN_INFERENCES: &str = "return_inferences";
pub const DIAGNOSTICS: &str = "diagnostics";

pub const UNIT_TIME: &str = "unit";

pub struct AnalysisMetrics {
    timings: RwLock<HashMap<String, Vec<Duration>>>,
    counters: RwLock<HashMap<String, u64>>,
    start_time: Instant,
}

impl AnalysisMetrics {
    pub fn new() -> Self {
        Self {
            timings: RwLock::new(HashMap::new()),
            counters: RwLock::new(HashMap::new()),
            start_time: Instant::now(),
        }
    }

    pub fn record_timing(&self, name: &str, duration: Duration) {
        self.timings.write().entry(name.to_string()).or_default().push(duration);
    }

    pub fn increment(&self, name: &str) {
        self.add(name, 1);
    }

    pub fn add(&self, name: &str, value: u64) {
        if value == 0 {
            return;
        }
        *self.counters.write().entry(name.to_string()).or_default() += value;
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.read().get(name).copied().unwrap_or(0)
    }

    pub fn timing_stats(&self, name: &str) -> Option<TimingStats> {
        self.timings.read().get(name).map(|d| TimingStats::from_durations(d))
    }

    /// Time `f` under `name`
    pub fn time<T>(&self, name: &str, f: impl FnOnce() -> T) -> T {
        let _timer = Timer::new(self, name);
        f()
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn reset(&self) {
        self.timings.write().clear();
        self.counters.write().clear();
    }

    pub fn summary(&self) -> MetricsSummary {
        let timings = self
            .timings
            .read()
            .iter()
            .map(|(name, durations)| (name.clone(), TimingStats::from_durations(durations)))
            .collect();
        MetricsSummary { uptime: self.uptime(), timings, counters: self.counters.read().clone() }
    }
}

impl Default for AnalysisMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TimingStats {
    pub count: usize,
    pub total: Duration,
    pub mean: Duration,
    pub max: Duration,
    pub p95: Duration,
}

impl TimingStats {
    fn from_durations(durations: &[Duration]) -> Self {
        let mut sorted = durations.to_vec();
        sorted.sort();
        let count = sorted.len();
        let total: Duration = sorted.iter().sum();
        let mean = if count == 0 { Duration::ZERO } else { total / count as u32 };
        let max = sorted.last().copied().unwrap_or(Duration::ZERO);
        let p95 = if count == 0 {
            Duration::ZERO
        } else {
            sorted[((count as f64 * 0.95) as usize).min(count - 1)]
        };
        Self { count, total, mean, max, p95 }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub uptime: Duration,
    pub timings: HashMap<String, TimingStats>,
    pub counters: HashMap<String, u64>,
}

impl MetricsSummary {
    pub fn report(&self) -> String {
        let mut lines = vec![format!("uptime: {:.2?}", self.uptime)];

        let mut timings: Vec<_> = self.timings.iter().collect();
        timings.sort_by(|a, b| a.0.cmp(b.0));
        for (name, stats) in timings {
            lines.push(format!(
                "{}: count={} total={:.2?} mean={:.2?} p95={:.2?} max={:.2?}",
                name, stats.count, stats.total, stats.mean, stats.p95, stats.max
            ));
        }

        let mut counters: Vec<_> = self.counters.iter().collect();
        counters.sort();
        for (name, value) in counters {
            lines.push(format!("{}: {}", name, value));
        }

        lines.join("\n")
    }
}

/// Records the elapsed time under `name` when dropped
pub struct Timer<'a> {
    metrics: &'a AnalysisMetrics,
    name: &'a str,
    start: Instant,
}

impl<'a> Timer<'a> {
    pub fn new(metrics: &'a AnalysisMetrics, name: &'a str) -> Self {
        Self { metrics, name, start: Instant::now() }
    }
}

impl Drop for Timer<'_> {
    fn drop(&mut self) {
        self.metrics.record_timing(self.name, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = AnalysisMetrics::new();
        metrics.increment(UNITS_ANALYZED);
        metrics.increment(UNITS_ANALYZED);
        metrics.add(LOOP_ITERATIONS, 7);
        metrics.add(LOOP_WIDENINGS, 0);
        assert_eq!(metrics.counter(UNITS_ANALYZED), 2);
        assert_eq!(metrics.counter(LOOP_ITERATIONS), 7);
        assert!(!metrics.summary().counters.contains_key(LOOP_WIDENINGS));
    }

    #[test]
    fn test_timings() {
        let metrics = AnalysisMetrics::new();
        metrics.record_timing(UNIT_TIME, Duration::from_millis(10));
        metrics.record_timing(UNIT_TIME, Duration::from_millis(30));
        let value = metrics.time(UNIT_TIME, || 5);
        assert_eq!(value, 5);

        let stats = metrics.timing_stats(UNIT_TIME).unwrap();
        assert_eq!(stats.count, 3);
        assert!(stats.max >= Duration::from_millis(30));

        let report = metrics.summary().report();
        assert!(report.contains("unit: count=3"));
    }
}
