use std::time::{Duration, Instant};

use crate::config::PidConfig;
use crate::error::RegulatorResult;

/// PID controller producing a bounded auxiliary-voltage correction.
///
/// Output is rate limited: calls arriving sooner than the minimum sample
/// interval after the last computation return the previous output untouched.
pub struct PIDController {
    // Gains
    kp: f64,
    ki: f64,
    kd: f64,

    // Limits
    output_min: f64,
    output_max: f64,
    sample_interval: Duration,
    anti_windup: bool,

    // State
    setpoint: f64,
    integral: f64,
    prev_error: f64,
    prev_time: Option<Instant>,
    last_output: Option<f64>,
}

impl PIDController {
    pub fn new(config: &PidConfig) -> RegulatorResult<Self> {
        config.validate()?;
        Ok(Self {
            kp: config.kp,
            ki: config.ki,
            kd: config.kd,
            output_min: config.output_min,
            output_max: config.output_max,
            sample_interval: config.sample_interval(),
            anti_windup: config.anti_windup,
            setpoint: 0.0,
            integral: 0.0,
            prev_error: 0.0,
            prev_time: None,
            last_output: None,
        })
    }

    pub fn update(&mut self, measured_value: f64, now: Instant) -> f64 {
        let dt = match self.prev_time {
            Some(prev) => now.saturating_duration_since(prev),
            None => Duration::ZERO,
        };

        if let Some(output) = self.last_output {
            if dt < self.sample_interval {
                return output;
            }
        }
        let dt = dt.as_secs_f64();

        let error = self.setpoint - measured_value;

        self.integral += error * dt;

        let derivative = if dt > 0.0 {
            (error - self.prev_error) / dt
        } else {
            0.0
        };

        let raw = self.kp * error + self.ki * self.integral + self.kd * derivative;
        let output = raw.clamp(self.output_min, self.output_max);

        // Saturated: drop this step's contribution so the integral cannot wind up.
        if self.anti_windup && (raw > self.output_max || raw < self.output_min) {
            self.integral -= error * dt;
        }

        self.prev_error = error;
        self.prev_time = Some(now);
        self.last_output = Some(output);

        output
    }

    pub fn set_setpoint(&mut self, setpoint: f64) {
        self.setpoint = setpoint;
    }

    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    pub fn integral(&self) -> f64 {
        self.integral
    }

    pub fn last_error(&self) -> f64 {
        self.prev_error
    }

    pub fn last_output(&self) -> Option<f64> {
        self.last_output
    }

    pub fn output_limits(&self) -> (f64, f64) {
        (self.output_min, self.output_max)
    }

    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = 0.0;
        self.prev_time = None;
        self.last_output = None;
    }
}
