use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::SampleSource;
use crate::error::DeviceError;

// ============================================================================
// SUPPLY MODEL - First-order HV supply driven by an auxiliary voltage
// ============================================================================

#[derive(Debug, Clone)]
pub struct SupplyParams {
    /// Steady-state volts out per volt of auxiliary drive.
    pub gain: f64,
    /// Fraction of the remaining gap closed on each read, in (0, 1].
    pub response: f64,
    /// Offset present with zero drive.
    pub offset: f64,
    pub noise_amplitude: f64,
}

impl Default for SupplyParams {
    fn default() -> Self {
        Self {
            gain: 2.0,
            response: 0.2,
            offset: 0.0,
            noise_amplitude: 0.0,
        }
    }
}

struct SupplyModel {
    params: SupplyParams,
    voltage: f64,
    drive: f64,
    rng: StdRng,
}

impl SupplyModel {
    fn step(&mut self) -> f64 {
        let target = self.params.offset + self.params.gain * self.drive;
        self.voltage += (target - self.voltage) * self.params.response;

        let noise = if self.params.noise_amplitude > 0.0 {
            let a = self.params.noise_amplitude;
            self.rng.gen_range(-a..a)
        } else {
            0.0
        };
        self.voltage + noise
    }
}

/// Shared handle on the simulated supply; cloned into each instrument.
#[derive(Clone)]
pub struct SimulatedPlant {
    model: Arc<Mutex<SupplyModel>>,
}

impl SimulatedPlant {
    pub fn new(seed: u64, params: SupplyParams) -> Self {
        let voltage = params.offset;
        Self {
            model: Arc::new(Mutex::new(SupplyModel {
                params,
                voltage,
                drive: 0.0,
                rng: StdRng::seed_from_u64(seed),
            })),
        }
    }

    pub fn voltage(&self) -> f64 {
        self.model.lock().voltage
    }

    pub fn drive(&self) -> f64 {
        self.model.lock().drive
    }

    pub fn set_drive(&self, drive: f64) {
        self.model.lock().drive = drive;
    }

    pub fn sample(&self) -> f64 {
        self.model.lock().step()
    }

    /// Shifts the supply's zero-drive output, e.g. a load change.
    pub fn inject_disturbance(&self, offset_delta: f64) {
        self.model.lock().params.offset += offset_delta;
    }
}

// ============================================================================
// FAULT SWITCH - Makes the next N instrument calls fail
// ============================================================================

#[derive(Clone, Default)]
pub struct FaultSwitch {
    remaining: Arc<AtomicU32>,
}

impl FaultSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, calls: u32) {
        self.remaining.store(calls, Ordering::SeqCst);
    }

    pub fn fail_forever(&self) {
        self.fail_next(u32::MAX);
    }

    pub fn clear(&self) {
        self.fail_next(0);
    }

    /// Consumes one pending fault, if any.
    pub fn trip(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                u32::MAX => Some(u32::MAX),
                n => Some(n - 1),
            })
            .is_ok()
    }
}

// ============================================================================
// SIMULATED MULTIMETER
// ============================================================================

pub struct SimulatedMultimeter {
    plant: SimulatedPlant,
    faults: FaultSwitch,
    reads: u64,
}

impl SimulatedMultimeter {
    pub fn new(plant: SimulatedPlant) -> Self {
        Self {
            plant,
            faults: FaultSwitch::new(),
            reads: 0,
        }
    }

    pub fn faults(&self) -> FaultSwitch {
        self.faults.clone()
    }

    pub fn reads(&self) -> u64 {
        self.reads
    }
}

impl SampleSource for SimulatedMultimeter {
    fn read(&mut self) -> Result<f64, DeviceError> {
        if self.faults.trip() {
            return Err(DeviceError::Unreachable("multimeter timed out".to_string()));
        }
        self.reads += 1;
        Ok(self.plant.sample())
    }
}
