use log::{error, info, warn};
use std::time::Duration;

use hv_regulator::visualization::render_history_chart;
use hv_regulator::{
    load_config, AsyncTaskRunner, ControlLoop, Hardware, HistoryBuffer, LoopEvent,
    RegulatorConfig, RegulatorError, RegulatorResult, SetpointCell, SimulatedLockin, SimulatedMultimeter,
    SimulatedPlant, SupplyParams, TaskEvent, TaskFailure, TaskHandle, TimingMetrics, TrackingSummary,
};

const DEFAULT_CONFIG_PATH: &str = "config/regulator.toml";
const RUN_SECONDS: u64 = 12;
/// (second, volts) edits issued as if typed into the setpoint field.
const SETPOINT_SCRIPT: [(u64, f64); 3] = [(0, 500.0), (4, 1200.0), (8, 300.0)];

fn main() {
    let env = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(env).init();

    if let Err(e) = run() {
        error!("[SYSTEM] {}", e);
        std::process::exit(1);
    }
}

fn run() -> RegulatorResult<()> {
    println!("===========================================");
    println!("Starting HV Regulator");
    println!("===========================================\n");

    let path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let cfg = match load_config(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("[CONFIG] Using defaults, could not load {}: {}", path, e);
            RegulatorConfig::default()
        }
    };

    let runner = AsyncTaskRunner::new(cfg.runner.max_workers)?;
    let setpoint = SetpointCell::default();
    let history = HistoryBuffer::new(cfg.history.capacity)?;
    let metrics = TimingMetrics::new();
    let mut control = ControlLoop::new(
        cfg.pid.clone(),
        cfg.control.clone(),
        setpoint.clone(),
        history.clone(),
        metrics.clone(),
    )?;

    // Connect off the user-facing thread
    let plant = SimulatedPlant::new(
        42,
        SupplyParams {
            gain: 1000.0,
            response: 0.3,
            offset: 0.0,
            noise_amplitude: 0.5,
        },
    );
    let aux_channel = cfg.control.aux_channel;
    let connect_plant = plant.clone();
    let hardware = runner
        .submit(move || {
            Hardware::connect(
                Box::new(SimulatedMultimeter::new(connect_plant.clone())),
                Box::new(SimulatedLockin::new(connect_plant, aux_channel)),
            )
        })
        .wait()
        .map_err(|failure| match failure {
            TaskFailure::Failed(e) => e,
            other => RegulatorError::Connection(other.to_string()),
        })?;
    println!("Status: connected, present voltage {:.2} V\n", hardware.initial_voltage);

    control.start(hardware)?;

    let mut script = SETPOINT_SCRIPT.iter().peekable();
    let mut pending: Vec<(f64, TaskHandle<f64>)> = Vec::new();
    for second in 0..RUN_SECONDS {
        while let Some((_, volts)) = script.next_if(|(at, _)| *at == second) {
            let cell = setpoint.clone();
            let volts = *volts;
            pending.push((volts, runner.submit(move || cell.set(volts))));
        }

        std::thread::sleep(Duration::from_secs(1));

        pending.retain(|(volts, handle)| {
            while let Some(event) = handle.try_event() {
                match event {
                    TaskEvent::Succeeded(old) => info!("[UI] Setpoint {:.1} V -> {:.1} V", old, volts),
                    TaskEvent::Failed(e) => warn!("[UI] Setpoint change rejected: {}", e),
                    TaskEvent::Finished => return false,
                }
            }
            true
        });

        for event in control.events().drain() {
            if let LoopEvent::Escalated { failures, message } = event {
                error!("[UI] Loop stopped after {} failures: {}", failures, message);
            }
        }
        if let Some(sample) = history.latest() {
            println!(
                "[{:3}s] Current set point: {:.1} V, current voltage: {:.2} V",
                second + 1,
                sample.setpoint,
                sample.measured
            );
        }
    }

    println!("\n===========================================");
    println!("Run completed - initiating shutdown");
    let outcome = control.stop();
    runner.shutdown(Duration::from_secs(1));

    let report = metrics.report();
    println!("===========================================");
    println!("FINAL RESULTS");
    println!("===========================================");
    println!("Total Ticks: {}", report.ticks);
    println!(
        "Failed reads/writes: {}/{} ({:.1}% clean ticks)",
        report.read_failures,
        report.write_failures,
        report.success_ratio() * 100.0
    );
    println!("Tick P50: {:?}, P99: {:?}", report.tick_p50, report.tick_p99);
    println!("Jitter P50: {:?}, P99: {:?}", report.jitter_p50, report.jitter_p99);
    if let Some(summary) = TrackingSummary::from_samples(&history.snapshot()) {
        println!(
            "Tracking over last {} samples: mean |e| {:.2} V, rms {:.2} V, final {:.2} V",
            summary.samples, summary.mean_abs_error, summary.rms_error, summary.final_error
        );
    }

    if let Err(e) = render_history_chart(&history.series(), "voltage_history.svg") {
        warn!("[SYSTEM] Could not render history chart: {}", e);
    }

    outcome
}
