//! Configuration loading and validation

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{RegulatorError, RegulatorResult};

// ============================================================================
// PID SECTION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PidConfig {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub output_min: f64,
    pub output_max: f64,
    pub sample_interval_ms: u64,
    pub anti_windup: bool,
}

impl Default for PidConfig {
    fn default() -> Self {
        Self {
            kp: 0.001,
            ki: 0.001,
            kd: 0.00002,
            output_min: 0.0,
            output_max: 3.01,
            sample_interval_ms: 10,
            anti_windup: true,
        }
    }
}

impl PidConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn validate(&self) -> RegulatorResult<()> {
        for (name, gain) in [("kp", self.kp), ("ki", self.ki), ("kd", self.kd)] {
            if !gain.is_finite() {
                return Err(RegulatorError::Configuration(format!(
                    "{} must be finite, got {}",
                    name, gain
                )));
            }
        }
        if !self.output_min.is_finite() || !self.output_max.is_finite() {
            return Err(RegulatorError::Configuration(
                "output bounds must be finite".to_string(),
            ));
        }
        if self.output_min > self.output_max {
            return Err(RegulatorError::Configuration(format!(
                "output lower bound {} exceeds upper bound {}",
                self.output_min, self.output_max
            )));
        }
        Ok(())
    }
}

// ============================================================================
// CONTROL LOOP SECTION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub tick_interval_ms: u64,
    /// Actuator channel the correction is written to (lock-in AUX output).
    pub aux_channel: u8,
    /// Consecutive failed ticks before the loop stops itself. 0 disables.
    pub max_consecutive_failures: u32,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            aux_channel: 3,
            max_consecutive_failures: 50,
        }
    }
}

impl ControlConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn validate(&self) -> RegulatorResult<()> {
        if self.tick_interval_ms == 0 {
            return Err(RegulatorError::Configuration(
                "tick_interval_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// HISTORY / RUNNER SECTIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { capacity: 100 }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub max_workers: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self { max_workers: 4 }
    }
}

// ============================================================================
// REGULATOR CONFIG - Whole file
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RegulatorConfig {
    pub pid: PidConfig,
    pub control: ControlConfig,
    pub history: HistoryConfig,
    pub runner: RunnerConfig,
}

impl RegulatorConfig {
    pub fn from_toml_str(s: &str) -> RegulatorResult<Self> {
        let config: RegulatorConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> RegulatorResult<()> {
        self.pid.validate()?;
        self.control.validate()?;
        if self.history.capacity == 0 {
            return Err(RegulatorError::Configuration(
                "history capacity must be > 0".to_string(),
            ));
        }
        if self.runner.max_workers == 0 {
            return Err(RegulatorError::Configuration(
                "runner max_workers must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn load_config(path: impl AsRef<Path>) -> RegulatorResult<RegulatorConfig> {
    let s = std::fs::read_to_string(path)?;
    RegulatorConfig::from_toml_str(&s)
}
