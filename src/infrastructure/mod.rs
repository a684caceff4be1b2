//! Runtime plumbing around the analyzer
//!
//! Structured logging setup, counters and timers, and the worker pool that
//! analyzes independent units in parallel.

pub mod logging;
pub mod metrics;
pub mod parallel;

pub use logging::{init_dev_logging, init_logging, init_prod_logging, LogConfig, LogFormat, LogOutput};
pub use metrics::{AnalysisMetrics, MetricsSummary, Timer};
pub use parallel::{ParallelAnalyzer, UnitReport};
