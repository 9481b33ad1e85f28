//! IPC module - State shared between the control loop and the user-facing side

pub mod channels;
pub mod shared_resource;

pub use channels::{LoopEvent, LoopEvents, LoopState, StateCell};
pub use shared_resource::{HistoryBuffer, HistorySeries, Sample, SetpointCell};
