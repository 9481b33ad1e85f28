//! Sensor module - Measured-voltage sources

use crate::error::DeviceError;

pub mod generator;

pub use generator::{FaultSwitch, SimulatedMultimeter, SimulatedPlant, SupplyParams};

// ============================================================================
// SAMPLE SOURCE - Capability to read the regulated voltage
// ============================================================================

/// Anything that can report the present supply voltage, e.g. a DMM.
pub trait SampleSource: Send {
    fn read(&mut self) -> Result<f64, DeviceError>;
}

impl<F> SampleSource for F
where
    F: FnMut() -> Result<f64, DeviceError> + Send,
{
    fn read(&mut self) -> Result<f64, DeviceError> {
        self()
    }
}
