use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{RegulatorError, RegulatorResult};

// ============================================================================
// SETPOINT CELL - Written by the UI side, read by the loop every tick
// ============================================================================

/// Target voltage shared between threads. Stored as the f64 bit pattern in a
/// single atomic word so a reader can never see half of a write.
#[derive(Clone)]
pub struct SetpointCell {
    bits: Arc<AtomicU64>,
}

impl SetpointCell {
    pub fn new(initial: f64) -> RegulatorResult<Self> {
        check_finite(initial)?;
        Ok(Self {
            bits: Arc::new(AtomicU64::new(initial.to_bits())),
        })
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// Stores a new setpoint and returns the one it replaced.
    pub fn set(&self, value: f64) -> RegulatorResult<f64> {
        check_finite(value)?;
        Ok(f64::from_bits(self.bits.swap(value.to_bits(), Ordering::AcqRel)))
    }
}

impl Default for SetpointCell {
    fn default() -> Self {
        Self {
            bits: Arc::new(AtomicU64::new(0.0_f64.to_bits())),
        }
    }
}

fn check_finite(value: f64) -> RegulatorResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(RegulatorError::Configuration(format!(
            "setpoint must be finite, got {}",
            value
        )))
    }
}

// ============================================================================
// HISTORY BUFFER - Rolling display window
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub sequence: u64,
    pub setpoint: f64,
    pub measured: f64,
}

impl Sample {
    pub fn error(&self) -> f64 {
        self.setpoint - self.measured
    }
}

/// Column view of the history, the shape plotting code wants.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistorySeries {
    pub sequence: Vec<u64>,
    pub setpoint: Vec<f64>,
    pub measured: Vec<f64>,
}

#[derive(Clone)]
pub struct HistoryBuffer {
    entries: Arc<RwLock<VecDeque<Sample>>>,
    capacity: usize,
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> RegulatorResult<Self> {
        if capacity == 0 {
            return Err(RegulatorError::Configuration(
                "history capacity must be > 0".to_string(),
            ));
        }
        Ok(Self {
            entries: Arc::new(RwLock::new(VecDeque::with_capacity(capacity))),
            capacity,
        })
    }

    pub fn push(&self, sample: Sample) {
        let mut entries = self.entries.write();
        entries.push_back(sample);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    pub fn snapshot(&self) -> Vec<Sample> {
        self.entries.read().iter().copied().collect()
    }

    pub fn series(&self) -> HistorySeries {
        let entries = self.entries.read();
        let mut series = HistorySeries {
            sequence: Vec::with_capacity(entries.len()),
            setpoint: Vec::with_capacity(entries.len()),
            measured: Vec::with_capacity(entries.len()),
        };
        for sample in entries.iter() {
            series.sequence.push(sample.sequence);
            series.setpoint.push(sample.setpoint);
            series.measured.push(sample.measured);
        }
        series
    }

    pub fn latest(&self) -> Option<Sample> {
        self.entries.read().back().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}
