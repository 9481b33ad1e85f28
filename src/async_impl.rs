//! Async implementation - Background tasks off the user-facing thread

pub mod task_runner;

pub use task_runner::{AsyncTaskRunner, TaskEvent, TaskFailure, TaskHandle};
