use hv_regulator::{
    ActuatorSink, AsyncTaskRunner, ControlConfig, ControlLoop, DeviceError, Hardware,
    HistoryBuffer, LoopEvent, LoopEvents, LoopState, PidConfig, RegulatorError, SampleSource, SetpointCell,
    SimulatedLockin, SimulatedMultimeter, SimulatedPlant, SupplyParams, TaskFailure,
    TimingMetrics,
};
use crossbeam::channel::bounded;
use std::thread;
use std::time::{Duration, Instant};

fn pid() -> PidConfig {
    PidConfig {
        kp: 0.1,
        ki: 0.5,
        kd: 0.0,
        output_min: 0.0,
        output_max: 3.01,
        sample_interval_ms: 0,
        anti_windup: true,
    }
}

fn control(max_consecutive_failures: u32) -> ControlConfig {
    ControlConfig {
        tick_interval_ms: 5,
        aux_channel: 3,
        max_consecutive_failures,
    }
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

#[test]
fn disturbance_shifts_supply_voltage() {
    let plant = SimulatedPlant::new(1, SupplyParams { response: 1.0, ..SupplyParams::default() });
    let before = plant.sample();
    plant.inject_disturbance(5.0);
    let after = plant.sample();
    assert!((after - before - 5.0).abs() < 1e-9);
}

#[test]
fn read_faults_skip_actuation_and_loop_keeps_running() {
    let plant = SimulatedPlant::new(2, SupplyParams::default());
    let meter = SimulatedMultimeter::new(plant.clone());
    let faults = meter.faults();
    let hardware =
        Hardware::connect(Box::new(meter), Box::new(SimulatedLockin::new(plant.clone(), 3))).unwrap();
    faults.fail_next(3);

    let history = HistoryBuffer::new(100).unwrap();
    let metrics = TimingMetrics::new();
    let mut control_loop = ControlLoop::new(
        pid(),
        control(10),
        SetpointCell::new(2.0).unwrap(),
        history.clone(),
        metrics.clone(),
    )
    .unwrap();
    control_loop.start(hardware).unwrap();

    assert!(wait_until(Duration::from_secs(2), || history.len() >= 5));
    assert_eq!(control_loop.state(), LoopState::Running);
    control_loop.stop().unwrap();

    let report = metrics.report();
    assert_eq!(report.read_failures, 3);
    assert_eq!(report.write_failures, 0);
    assert_eq!(
        history.snapshot().first().map(|s| s.sequence),
        Some(3),
        "failed reads produce no samples"
    );

    let read_failures = control_loop
        .events()
        .drain()
        .into_iter()
        .filter(|e| matches!(e, LoopEvent::ReadFailed { .. }))
        .count();
    assert_eq!(read_failures, 3);
}

#[test]
fn write_faults_still_record_samples() {
    let plant = SimulatedPlant::new(3, SupplyParams::default());
    let lockin = SimulatedLockin::new(plant.clone(), 3);
    let faults = lockin.faults();
    let hardware =
        Hardware::connect(Box::new(SimulatedMultimeter::new(plant.clone())), Box::new(lockin)).unwrap();
    faults.fail_next(2);

    let history = HistoryBuffer::new(100).unwrap();
    let metrics = TimingMetrics::new();
    let mut control_loop = ControlLoop::new(
        pid(),
        control(10),
        SetpointCell::new(2.0).unwrap(),
        history.clone(),
        metrics.clone(),
    )
    .unwrap();
    control_loop.start(hardware).unwrap();

    assert!(wait_until(Duration::from_secs(2), || history.len() >= 4));
    control_loop.stop().unwrap();

    assert_eq!(metrics.report().write_failures, 2);
    let sequences: Vec<u64> = history.snapshot().iter().map(|s| s.sequence).collect();
    assert_eq!(&sequences[..4], &[0, 1, 2, 3]);
}

#[test]
fn persistent_faults_escalate_to_stopped() {
    let plant = SimulatedPlant::new(4, SupplyParams::default());
    let meter = SimulatedMultimeter::new(plant.clone());
    let faults = meter.faults();
    let hardware =
        Hardware::connect(Box::new(meter), Box::new(SimulatedLockin::new(plant, 3))).unwrap();
    faults.fail_forever();

    let history = HistoryBuffer::new(100).unwrap();
    let mut control_loop = ControlLoop::new(
        pid(),
        control(5),
        SetpointCell::default(),
        history.clone(),
        TimingMetrics::new(),
    )
    .unwrap();
    control_loop.start(hardware).unwrap();

    assert!(wait_until(Duration::from_secs(2), || control_loop.state() == LoopState::Stopped));
    assert!(control_loop
        .events()
        .drain()
        .contains(&LoopEvent::Escalated {
            failures: 5,
            message: DeviceError::Unreachable("multimeter timed out".to_string()).to_string(),
        }));

    match control_loop.stop() {
        Err(RegulatorError::TransientIo { failures, .. }) => assert_eq!(failures, 5),
        other => panic!("expected escalated transient error, got {:?}", other),
    }
    assert!(history.is_empty());
    assert_eq!(control_loop.ticks(), 5, "the escalating tick is counted");
}

#[test]
fn escalation_survives_undrained_event_queue() {
    let failing_source = || -> Result<f64, DeviceError> {
        Err(DeviceError::Unreachable("GPIB bus timeout".to_string()))
    };
    let sink = |_: u8, _: f64| -> Result<(), DeviceError> { Ok(()) };
    let hardware = Hardware {
        source: Box::new(failing_source),
        sink: Box::new(sink),
        initial_voltage: 0.0,
    };

    let metrics = TimingMetrics::new();
    let mut control_loop = ControlLoop::new(
        pid(),
        ControlConfig {
            tick_interval_ms: 1,
            aux_channel: 3,
            max_consecutive_failures: 300,
        },
        SetpointCell::default(),
        HistoryBuffer::new(10).unwrap(),
        metrics.clone(),
    )
    .unwrap();
    control_loop.start(hardware).unwrap();

    // More failures than the event queue holds, and nobody drains it.
    assert!(wait_until(Duration::from_secs(10), || control_loop.state() == LoopState::Stopped));
    let events = control_loop.events().drain();
    let tail = &events[events.len() - 2..];
    assert_eq!(
        tail,
        &[
            LoopEvent::Escalated {
                failures: 300,
                message: DeviceError::Unreachable("GPIB bus timeout".to_string()).to_string(),
            },
            LoopEvent::StateChanged(LoopState::Stopped),
        ]
    );

    assert!(control_loop.stop().is_err());
    assert_eq!(control_loop.ticks(), 300);
    assert_eq!(metrics.report().read_failures, 300);
}

#[test]
fn event_queue_evicts_oldest_when_full() {
    let events = LoopEvents::new(2);
    assert!(events.publish(LoopEvent::StateChanged(LoopState::Running)));
    assert!(events.publish(LoopEvent::ReadFailed { tick: 0, message: "a".to_string() }));
    assert!(!events.publish(LoopEvent::ReadFailed { tick: 1, message: "b".to_string() }));

    assert_eq!(
        events.drain(),
        vec![
            LoopEvent::ReadFailed { tick: 0, message: "a".to_string() },
            LoopEvent::ReadFailed { tick: 1, message: "b".to_string() },
        ]
    );
}

#[test]
fn read_failing_after_stop_is_not_counted() {
    let (in_read_tx, in_read_rx) = bounded::<()>(1);
    let (release_tx, release_rx) = bounded::<()>(1);
    let mut reads = 0u32;
    // The third read parks, then fails once released.
    let source = move || -> Result<f64, DeviceError> {
        reads += 1;
        if reads == 3 {
            in_read_tx.send(()).ok();
            release_rx.recv_timeout(Duration::from_secs(5)).ok();
            return Err(DeviceError::Unreachable("bus reset".to_string()));
        }
        Ok(1.0)
    };
    let sink = |_: u8, _: f64| -> Result<(), DeviceError> { Ok(()) };
    let hardware = Hardware::connect(Box::new(source), Box::new(sink)).unwrap();

    let metrics = TimingMetrics::new();
    let mut control_loop = ControlLoop::new(
        pid(),
        control(10),
        SetpointCell::default(),
        HistoryBuffer::new(10).unwrap(),
        metrics.clone(),
    )
    .unwrap();
    control_loop.start(hardware).unwrap();

    in_read_rx.recv_timeout(Duration::from_secs(2)).expect("loop reached the parked read");
    let stopper = thread::spawn(move || {
        let outcome = control_loop.stop();
        (control_loop, outcome)
    });
    thread::sleep(Duration::from_millis(50));
    release_tx.send(()).unwrap();
    let (control_loop, outcome) = stopper.join().unwrap();

    assert!(outcome.is_ok());
    assert_eq!(metrics.report().read_failures, 0);
    assert!(!control_loop
        .events()
        .drain()
        .iter()
        .any(|e| matches!(e, LoopEvent::ReadFailed { .. })));
}

#[test]
fn escalation_disabled_keeps_loop_running() {
    let failing_source = || -> Result<f64, DeviceError> {
        Err(DeviceError::Unreachable("GPIB bus timeout".to_string()))
    };
    let sink = |_: u8, _: f64| -> Result<(), DeviceError> { Ok(()) };
    let hardware = Hardware {
        source: Box::new(failing_source),
        sink: Box::new(sink),
        initial_voltage: 0.0,
    };

    let mut control_loop = ControlLoop::new(
        pid(),
        control(0),
        SetpointCell::default(),
        HistoryBuffer::new(10).unwrap(),
        TimingMetrics::new(),
    )
    .unwrap();
    control_loop.start(hardware).unwrap();

    assert!(wait_until(Duration::from_secs(2), || control_loop.ticks() >= 20));
    assert_eq!(control_loop.state(), LoopState::Running);
    assert!(control_loop.stop().is_ok());
}

#[test]
fn connect_fails_when_multimeter_unreachable() {
    let plant = SimulatedPlant::new(5, SupplyParams::default());
    let meter = SimulatedMultimeter::new(plant.clone());
    meter.faults().fail_forever();
    let lockin = SimulatedLockin::new(plant, 3);

    let runner = AsyncTaskRunner::new(1).unwrap();
    let outcome = runner
        .submit(move || Hardware::connect(Box::new(meter), Box::new(lockin)))
        .wait();
    assert!(matches!(
        outcome,
        Err(TaskFailure::Failed(RegulatorError::Connection(_)))
    ));
}

#[test]
fn connect_fails_when_lockin_unreachable() {
    let plant = SimulatedPlant::new(5, SupplyParams::default());
    let lockin = SimulatedLockin::new(plant.clone(), 3);
    lockin.faults().fail_forever();
    let meter = SimulatedMultimeter::new(plant);

    let runner = AsyncTaskRunner::new(1).unwrap();
    let outcome = runner
        .submit(move || Hardware::connect(Box::new(meter), Box::new(lockin)))
        .wait();
    match outcome {
        Err(TaskFailure::Failed(RegulatorError::Connection(message))) => {
            assert!(message.contains("actuator sink"), "unexpected message: {}", message)
        }
        other => panic!("expected connection error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn connect_fails_when_sink_probe_fails() {
    struct DeadSink;
    impl ActuatorSink for DeadSink {
        fn write(&mut self, _channel: u8, _value: f64) -> Result<(), DeviceError> {
            Err(DeviceError::Unreachable("no reply".to_string()))
        }
        fn probe(&mut self) -> Result<(), DeviceError> {
            Err(DeviceError::Unreachable("no reply".to_string()))
        }
    }
    let source = || -> Result<f64, DeviceError> { Ok(0.0) };

    let result = Hardware::connect(Box::new(source), Box::new(DeadSink));
    assert!(matches!(result, Err(RegulatorError::Connection(_))));
}

#[test]
fn lockin_rejects_bad_channel_and_range() {
    let plant = SimulatedPlant::new(6, SupplyParams::default());
    let mut lockin = SimulatedLockin::new(plant.clone(), 3);

    assert_eq!(lockin.write(0, 1.0), Err(DeviceError::InvalidChannel(0)));
    assert_eq!(lockin.write(5, 1.0), Err(DeviceError::InvalidChannel(5)));
    assert!(matches!(
        lockin.write(3, 11.0),
        Err(DeviceError::OutOfRange { .. })
    ));

    lockin.write(1, 2.0).unwrap();
    assert_eq!(plant.drive(), 0.0, "only the driven channel moves the supply");
    lockin.write(3, 2.0).unwrap();
    assert_eq!(plant.drive(), 2.0);
    assert_eq!(lockin.output(3), Some(2.0));
}

#[test]
fn multimeter_faults_clear() {
    let plant = SimulatedPlant::new(7, SupplyParams::default());
    let mut meter = SimulatedMultimeter::new(plant);
    let faults = meter.faults();

    faults.fail_forever();
    assert!(meter.read().is_err());
    assert!(meter.read().is_err());
    faults.clear();
    assert!(meter.read().is_ok());
    assert_eq!(meter.reads(), 1);
}
