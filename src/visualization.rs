//! Visualization module - Display sinks for the history window

pub mod dashboard;

pub use dashboard::render_history_chart;
