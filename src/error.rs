//! Error module - Failure taxonomy for the regulator core

use thiserror::Error;

// ============================================================================
// DEVICE ERROR - Raised by sample sources and actuator sinks
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    #[error("instrument unreachable: {0}")]
    Unreachable(String),

    #[error("value {value} V outside accepted range [{min}, {max}] V")]
    OutOfRange { value: f64, min: f64, max: f64 },

    #[error("channel {0} does not exist")]
    InvalidChannel(u8),
}

// ============================================================================
// REGULATOR ERROR - Crate-wide error
// ============================================================================

#[derive(Error, Debug)]
pub enum RegulatorError {
    /// Instruments could not be reached while connecting.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A single tick's read or write failed. Only surfaced once escalated.
    #[error("Transient I/O error after {failures} consecutive failures: {source}")]
    TransientIo {
        failures: u32,
        #[source]
        source: DeviceError,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type RegulatorResult<T> = Result<T, RegulatorError>;
