//! Actuator module - PID control and auxiliary-output sinks

use log::{error, info};

use crate::error::{DeviceError, RegulatorError, RegulatorResult};
use crate::sensor::SampleSource;

pub mod controller;
pub mod lockin;

pub use controller::PIDController;
pub use lockin::SimulatedLockin;

// ============================================================================
// ACTUATOR SINK - Capability to drive the correction output
// ============================================================================

pub trait ActuatorSink: Send {
    fn write(&mut self, channel: u8, value: f64) -> Result<(), DeviceError>;

    /// Connect-time reachability check. Sinks without one accept.
    fn probe(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }
}

impl<F> ActuatorSink for F
where
    F: FnMut(u8, f64) -> Result<(), DeviceError> + Send,
{
    fn write(&mut self, channel: u8, value: f64) -> Result<(), DeviceError> {
        self(channel, value)
    }
}

// ============================================================================
// HARDWARE - Instrument handles bound at connect time
// ============================================================================

pub struct Hardware {
    pub source: Box<dyn SampleSource>,
    pub sink: Box<dyn ActuatorSink>,
    /// Reading taken while probing the source.
    pub initial_voltage: f64,
}

impl Hardware {
    /// Probes both instruments once; either one unreachable fails the connect.
    pub fn connect(
        mut source: Box<dyn SampleSource>,
        mut sink: Box<dyn ActuatorSink>,
    ) -> RegulatorResult<Self> {
        let initial_voltage = source.read().map_err(|e| {
            error!("[CONNECT] Sample source probe failed: {}", e);
            RegulatorError::Connection(format!("sample source: {}", e))
        })?;
        sink.probe().map_err(|e| {
            error!("[CONNECT] Actuator sink probe failed: {}", e);
            RegulatorError::Connection(format!("actuator sink: {}", e))
        })?;
        info!("[CONNECT] Instruments ready, present voltage {:.4} V", initial_voltage);

        Ok(Self {
            source,
            sink,
            initial_voltage,
        })
    }
}

impl std::fmt::Debug for Hardware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hardware")
            .field("initial_voltage", &self.initial_voltage)
            .finish_non_exhaustive()
    }
}
