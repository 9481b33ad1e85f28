use super::ActuatorSink;
use crate::error::DeviceError;
use crate::sensor::{FaultSwitch, SimulatedPlant};

pub const AUX_CHANNELS: usize = 4;
pub const AUX_MIN_VOLTS: f64 = -10.5;
pub const AUX_MAX_VOLTS: f64 = 10.5;

/// Lock-in amplifier auxiliary outputs; one of them drives the supply.
pub struct SimulatedLockin {
    plant: SimulatedPlant,
    driven_channel: u8,
    outputs: [f64; AUX_CHANNELS],
    faults: FaultSwitch,
}

impl SimulatedLockin {
    pub fn new(plant: SimulatedPlant, driven_channel: u8) -> Self {
        Self {
            plant,
            driven_channel,
            outputs: [0.0; AUX_CHANNELS],
            faults: FaultSwitch::new(),
        }
    }

    pub fn faults(&self) -> FaultSwitch {
        self.faults.clone()
    }

    pub fn output(&self, channel: u8) -> Option<f64> {
        let index = usize::from(channel).checked_sub(1)?;
        self.outputs.get(index).copied()
    }
}

impl ActuatorSink for SimulatedLockin {
    fn write(&mut self, channel: u8, value: f64) -> Result<(), DeviceError> {
        if self.faults.trip() {
            return Err(DeviceError::Unreachable("lock-in did not acknowledge".to_string()));
        }
        let index = usize::from(channel)
            .checked_sub(1)
            .filter(|i| *i < AUX_CHANNELS)
            .ok_or(DeviceError::InvalidChannel(channel))?;
        if !(AUX_MIN_VOLTS..=AUX_MAX_VOLTS).contains(&value) {
            return Err(DeviceError::OutOfRange {
                value,
                min: AUX_MIN_VOLTS,
                max: AUX_MAX_VOLTS,
            });
        }

        self.outputs[index] = value;
        if channel == self.driven_channel {
            self.plant.set_drive(value);
        }
        Ok(())
    }

    fn probe(&mut self) -> Result<(), DeviceError> {
        if self.faults.trip() {
            return Err(DeviceError::Unreachable("lock-in not responding".to_string()));
        }
        Ok(())
    }
}
