use hdrhistogram::Histogram;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn new_histogram() -> Histogram<u64> {
    Histogram::new(3).expect("3 significant figures is a supported histogram precision")
}

// ============================================================================
// TIMING METRICS - Per-tick latency and failure accounting
// ============================================================================

#[derive(Clone)]
pub struct TimingMetrics {
    read_hist: Arc<Mutex<Histogram<u64>>>,
    compute_hist: Arc<Mutex<Histogram<u64>>>,
    write_hist: Arc<Mutex<Histogram<u64>>>,
    tick_hist: Arc<Mutex<Histogram<u64>>>,
    // Variation between consecutive tick durations
    last_tick_ns: Arc<AtomicU64>,
    jitter_hist: Arc<Mutex<Histogram<u64>>>,
    ticks: Arc<AtomicU64>,
    read_failures: Arc<AtomicU64>,
    write_failures: Arc<AtomicU64>,
}

impl Default for TimingMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl TimingMetrics {
    pub fn new() -> Self {
        Self {
            read_hist: Arc::new(Mutex::new(new_histogram())),
            compute_hist: Arc::new(Mutex::new(new_histogram())),
            write_hist: Arc::new(Mutex::new(new_histogram())),
            tick_hist: Arc::new(Mutex::new(new_histogram())),
            last_tick_ns: Arc::new(AtomicU64::new(0)),
            jitter_hist: Arc::new(Mutex::new(new_histogram())),
            ticks: Arc::new(AtomicU64::new(0)),
            read_failures: Arc::new(AtomicU64::new(0)),
            write_failures: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn record_read(&self, duration: Duration) {
        self.read_hist.lock().record(duration.as_nanos() as u64).ok();
    }

    pub fn record_compute(&self, duration: Duration) {
        self.compute_hist.lock().record(duration.as_nanos() as u64).ok();
    }

    pub fn record_write(&self, duration: Duration) {
        self.write_hist.lock().record(duration.as_nanos() as u64).ok();
    }

    pub fn record_tick(&self, duration: Duration) {
        let nanos = duration.as_nanos() as u64;
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.tick_hist.lock().record(nanos).ok();

        let last = self.last_tick_ns.swap(nanos, Ordering::Relaxed);
        if last > 0 {
            self.jitter_hist.lock().record(nanos.abs_diff(last)).ok();
        }
    }

    pub fn record_read_failure(&self) {
        self.read_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn report(&self) -> MetricsReport {
        let read = self.read_hist.lock();
        let compute = self.compute_hist.lock();
        let write = self.write_hist.lock();
        let tick = self.tick_hist.lock();
        let jitter = self.jitter_hist.lock();

        MetricsReport {
            ticks: self.ticks.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            read_p50: Duration::from_nanos(read.value_at_quantile(0.5)),
            read_p99: Duration::from_nanos(read.value_at_quantile(0.99)),
            compute_p50: Duration::from_nanos(compute.value_at_quantile(0.5)),
            compute_p99: Duration::from_nanos(compute.value_at_quantile(0.99)),
            write_p50: Duration::from_nanos(write.value_at_quantile(0.5)),
            write_p99: Duration::from_nanos(write.value_at_quantile(0.99)),
            tick_p50: Duration::from_nanos(tick.value_at_quantile(0.5)),
            tick_p99: Duration::from_nanos(tick.value_at_quantile(0.99)),
            jitter_p50: Duration::from_nanos(jitter.value_at_quantile(0.5)),
            jitter_p99: Duration::from_nanos(jitter.value_at_quantile(0.99)),
        }
    }
}

// ============================================================================
// METRICS REPORT - Summary statistics
// ============================================================================

#[derive(Debug, Clone)]
pub struct MetricsReport {
    pub ticks: u64,
    pub read_failures: u64,
    pub write_failures: u64,
    pub read_p50: Duration,
    pub read_p99: Duration,
    pub compute_p50: Duration,
    pub compute_p99: Duration,
    pub write_p50: Duration,
    pub write_p99: Duration,
    pub tick_p50: Duration,
    pub tick_p99: Duration,
    pub jitter_p50: Duration,
    pub jitter_p99: Duration,
}

impl MetricsReport {
    /// Share of ticks that completed both the read and the write.
    pub fn success_ratio(&self) -> f64 {
        if self.ticks == 0 {
            return 1.0;
        }
        let failed = (self.read_failures + self.write_failures).min(self.ticks);
        (self.ticks - failed) as f64 / self.ticks as f64
    }
}
