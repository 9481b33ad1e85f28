//! Threaded implementation - The control loop's own thread

pub mod control_loop;

pub use control_loop::ControlLoop;
