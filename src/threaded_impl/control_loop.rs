use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::{debug, error, info, trace, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crate::actuator::{Hardware, PIDController};
use crate::benchmark::metrics::TimingMetrics;
use crate::config::{ControlConfig, PidConfig};
use crate::error::{DeviceError, RegulatorError, RegulatorResult};
use crate::ipc::channels::{LoopEvent, LoopEvents, LoopState, StateCell};
use crate::ipc::shared_resource::{HistoryBuffer, Sample, SetpointCell};

const EVENT_BUFFER: usize = 256;

// ============================================================================
// CONTROL LOOP - Idle -> Running -> Stopped
// ============================================================================

/// Periodic read / compute / write / record cycle on a dedicated thread.
///
/// The next tick is scheduled one `tick_interval` after the previous tick
/// completed, so a slow instrument delays later ticks instead of queueing them.
pub struct ControlLoop {
    pid_config: PidConfig,
    control: ControlConfig,
    setpoint: SetpointCell,
    history: HistoryBuffer,
    metrics: TimingMetrics,
    events: LoopEvents,
    state: StateCell,
    ticks: Arc<AtomicU64>,
    stop_tx: Option<Sender<()>>,
    handle: Option<thread::JoinHandle<RegulatorResult<()>>>,
}

impl ControlLoop {
    pub fn new(
        pid_config: PidConfig,
        control: ControlConfig,
        setpoint: SetpointCell,
        history: HistoryBuffer,
        metrics: TimingMetrics,
    ) -> RegulatorResult<Self> {
        pid_config.validate()?;
        control.validate()?;

        Ok(Self {
            pid_config,
            control,
            setpoint,
            history,
            metrics,
            events: LoopEvents::new(EVENT_BUFFER),
            state: StateCell::new(LoopState::Idle),
            ticks: Arc::new(AtomicU64::new(0)),
            stop_tx: None,
            handle: None,
        })
    }

    /// Binds freshly connected instruments and starts ticking.
    pub fn start(&mut self, hardware: Hardware) -> RegulatorResult<()> {
        let current = self.state.get();
        if current != LoopState::Idle {
            return Err(RegulatorError::InvalidState(format!(
                "control loop can only start from Idle, currently {}",
                current
            )));
        }

        let mut pid = PIDController::new(&self.pid_config)?;
        pid.set_setpoint(self.setpoint.get());

        let (stop_tx, stop_rx) = bounded(1);
        let worker = LoopWorker {
            pid,
            hardware,
            control: self.control.clone(),
            setpoint: self.setpoint.clone(),
            history: self.history.clone(),
            metrics: self.metrics.clone(),
            events: self.events.clone(),
            state: self.state.clone(),
            ticks: self.ticks.clone(),
            stop_rx,
        };

        self.state.set(LoopState::Running);
        let handle = thread::Builder::new()
            .name("hv-control-loop".to_string())
            .spawn(move || worker.run());
        let handle = match handle {
            Ok(h) => h,
            Err(e) => {
                self.state.set(LoopState::Idle);
                return Err(e.into());
            }
        };

        info!(
            "[CONTROL] Loop running: every {} ms on AUX {}, output [{}, {}] V",
            self.control.tick_interval_ms,
            self.control.aux_channel,
            self.pid_config.output_min,
            self.pid_config.output_max
        );
        self.events.publish(LoopEvent::StateChanged(LoopState::Running));
        self.stop_tx = Some(stop_tx);
        self.handle = Some(handle);
        Ok(())
    }

    /// Ends the session and returns how the loop thread terminated.
    ///
    /// No tick starts after this returns. A tick caught mid-flight finishes
    /// its instrument call but its result is thrown away.
    pub fn stop(&mut self) -> RegulatorResult<()> {
        // Dropping the sender wakes the loop out of its inter-tick wait.
        self.stop_tx.take();

        let outcome = match self.handle.take() {
            Some(handle) => handle.join().unwrap_or_else(|_| {
                Err(RegulatorError::InvalidState(
                    "control loop thread panicked".to_string(),
                ))
            }),
            None => Ok(()),
        };

        if self.state.get() != LoopState::Stopped {
            self.state.set(LoopState::Stopped);
            self.events.publish(LoopEvent::StateChanged(LoopState::Stopped));
            info!("[CONTROL] Loop stopped after {} ticks", self.ticks());
        }
        outcome
    }

    pub fn state(&self) -> LoopState {
        self.state.get()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    pub fn events(&self) -> &LoopEvents {
        &self.events
    }

    pub fn setpoint(&self) -> &SetpointCell {
        &self.setpoint
    }

    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }
}

impl Drop for ControlLoop {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.stop();
        }
    }
}

// ============================================================================
// LOOP WORKER - Owned by the loop thread
// ============================================================================

enum TickOutcome {
    Completed,
    Failed(DeviceError),
    /// Stop was requested while an instrument call was in flight.
    Discarded,
}

struct LoopWorker {
    pid: PIDController,
    hardware: Hardware,
    control: ControlConfig,
    setpoint: SetpointCell,
    history: HistoryBuffer,
    metrics: TimingMetrics,
    events: LoopEvents,
    state: StateCell,
    ticks: Arc<AtomicU64>,
    stop_rx: Receiver<()>,
}

impl LoopWorker {
    fn run(mut self) -> RegulatorResult<()> {
        let interval = self.control.tick_interval();
        let limit = self.control.max_consecutive_failures;
        let mut tick = 0u64;
        let mut consecutive_failures = 0u32;

        loop {
            if self.stop_requested() {
                break;
            }

            let tick_start = Instant::now();
            let outcome = self.tick(tick);
            if let TickOutcome::Discarded = outcome {
                break;
            }
            self.metrics.record_tick(tick_start.elapsed());
            self.ticks.fetch_add(1, Ordering::AcqRel);
            tick += 1;

            match outcome {
                TickOutcome::Failed(source) => {
                    consecutive_failures += 1;
                    if limit > 0 && consecutive_failures >= limit {
                        return Err(self.escalate(consecutive_failures, source));
                    }
                }
                _ => consecutive_failures = 0,
            }

            match self.stop_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        debug!("[CONTROL] Loop thread exiting after tick #{}", tick);
        Ok(())
    }

    fn tick(&mut self, tick: u64) -> TickOutcome {
        // 1. Read the supply voltage
        let read_start = Instant::now();
        let measured = match self.hardware.source.read() {
            Ok(v) => v,
            Err(_) if self.stop_requested() => return TickOutcome::Discarded,
            Err(e) => {
                self.metrics.record_read_failure();
                warn!("[CONTROL] Tick #{}: read failed, actuation skipped: {}", tick, e);
                self.events.publish(LoopEvent::ReadFailed {
                    tick,
                    message: e.to_string(),
                });
                return TickOutcome::Failed(e);
            }
        };
        self.metrics.record_read(read_start.elapsed());
        if self.stop_requested() {
            return TickOutcome::Discarded;
        }

        // 2-3. Latest setpoint into the controller
        let compute_start = Instant::now();
        let setpoint = self.setpoint.get();
        self.pid.set_setpoint(setpoint);
        let output = self.pid.update(measured, Instant::now());
        self.metrics.record_compute(compute_start.elapsed());

        // 4. Drive the auxiliary output
        let write_start = Instant::now();
        let written = self.hardware.sink.write(self.control.aux_channel, output);
        if self.stop_requested() {
            return TickOutcome::Discarded;
        }

        // 5. Record for display
        self.history.push(Sample {
            sequence: tick,
            setpoint,
            measured,
        });

        match written {
            Ok(()) => {
                self.metrics.record_write(write_start.elapsed());
                trace!(
                    "[CONTROL] Tick #{}: setpoint {:.4} V, measured {:.4} V, aux {:.5} V",
                    tick,
                    setpoint,
                    measured,
                    output
                );
                TickOutcome::Completed
            }
            Err(e) => {
                self.metrics.record_write_failure();
                warn!("[CONTROL] Tick #{}: write of {:.5} V failed: {}", tick, output, e);
                self.events.publish(LoopEvent::WriteFailed {
                    tick,
                    message: e.to_string(),
                });
                TickOutcome::Failed(e)
            }
        }
    }

    fn escalate(&self, failures: u32, source: DeviceError) -> RegulatorError {
        error!(
            "[CONTROL] {} consecutive failed ticks, stopping loop: {}",
            failures, source
        );
        self.events.publish(LoopEvent::Escalated {
            failures,
            message: source.to_string(),
        });
        self.events.publish(LoopEvent::StateChanged(LoopState::Stopped));
        // Observers of Stopped must find both events queued.
        self.state.set(LoopState::Stopped);
        RegulatorError::TransientIo { failures, source }
    }

    fn stop_requested(&self) -> bool {
        matches!(self.stop_rx.try_recv(), Ok(()) | Err(TryRecvError::Disconnected))
    }
}
