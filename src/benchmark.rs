//! Benchmark module - Loop timing metrics and tracking analysis

pub mod analysis;
pub mod metrics;

pub use analysis::TrackingSummary;
pub use metrics::{MetricsReport, TimingMetrics};
