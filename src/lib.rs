pub mod sensor;
pub mod actuator;
pub mod ipc;
pub mod benchmark;
pub mod async_impl;
pub mod threaded_impl;
pub mod visualization;
pub mod config;
pub mod error;

pub use actuator::{ActuatorSink, Hardware, PIDController, SimulatedLockin};
pub use async_impl::{AsyncTaskRunner, TaskEvent, TaskFailure, TaskHandle};
pub use benchmark::{MetricsReport, TimingMetrics, TrackingSummary};
pub use config::{load_config, ControlConfig, HistoryConfig, PidConfig, RegulatorConfig, RunnerConfig};
pub use error::{DeviceError, RegulatorError, RegulatorResult};
pub use ipc::{HistoryBuffer, HistorySeries, LoopEvent, LoopEvents, LoopState, Sample, SetpointCell};
pub use sensor::{FaultSwitch, SampleSource, SimulatedMultimeter, SimulatedPlant, SupplyParams};
pub use threaded_impl::ControlLoop;
