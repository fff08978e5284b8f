//! Command dispatch through `AppService` against mock adapters.

use rovercam::app::commands::{AppCommand, CalibrationData, Reply, StreamControl};
use rovercam::app::events::AppEvent;
use rovercam::app::registry::{ControlMode, DeviceRegistry};
use rovercam::app::service::AppService;
use rovercam::config::{CameraParams, DriveCalibration, FrameSize, ServoCalibration, SystemConfig};
use rovercam::control::DriveCommand;
use rovercam::error::{ActuatorError, CommandError};
use rovercam::sensors::BatteryStatus;
use rovercam::stream::{SinkHandle, StreamHandle, StreamRequest};

use crate::mock_hw::{MockClock, MockHardware, MockNet, MockNvs, MockSink, NoDelay, RecordingSink};

fn service<'r>(
    registry: &'r DeviceRegistry,
    stream: &'r StreamHandle,
    clock: &MockClock,
) -> AppService<'r, MockClock> {
    AppService::new(SystemConfig::default(), registry, stream, clock.clone())
}

fn sink_handle(id: u32) -> (SinkHandle, std::sync::Arc<std::sync::Mutex<crate::mock_hw::SinkLog>>) {
    let (sink, log) = MockSink::new(id);
    (SinkHandle(Box::new(sink)), log)
}

// ── Drive ─────────────────────────────────────────────────────

#[test]
fn joystick_pivot_spins_wheels_in_opposite_directions() {
    let (registry, stream, clock) = (DeviceRegistry::new(), StreamHandle::new(), MockClock::new());
    let mut app = service(&registry, &stream, &clock);
    let (mut hw, nvs, mut net) = (MockHardware::new(), MockNvs::new(), MockNet::connected());

    let reply = app.handle_command(
        AppCommand::Drive(DriveCommand::Joystick { x: 0.6, y: 0.0 }),
        &mut hw,
        &nvs,
        &mut net,
    );

    assert_eq!(reply, Ok(Reply::Ack("ok")));
    // Left forward, right backward; the mirrored right servo therefore
    // sees the same pulse as the left one.
    assert_eq!(hw.last_pulses(), Some((1806, 1806)));
    assert_eq!(registry.snapshot().control_mode, ControlMode::Joystick);
}

#[test]
fn full_forward_sliders_hit_span_limits() {
    let (registry, stream, clock) = (DeviceRegistry::new(), StreamHandle::new(), MockClock::new());
    let mut app = service(&registry, &stream, &clock);
    let (mut hw, nvs, mut net) = (MockHardware::new(), MockNvs::new(), MockNet::connected());

    app.handle_command(
        AppCommand::Drive(DriveCommand::Sliders { left: 1.0, right: 1.0 }),
        &mut hw,
        &nvs,
        &mut net,
    )
    .unwrap();

    assert_eq!(hw.last_pulses(), Some((2000, 1000)));
    assert_eq!(registry.snapshot().control_mode, ControlMode::Sliders);
}

#[test]
fn drive_refused_while_asleep() {
    let (registry, stream, clock) = (DeviceRegistry::new(), StreamHandle::new(), MockClock::new());
    let mut app = service(&registry, &stream, &clock);
    let (mut hw, nvs, mut net) = (MockHardware::new(), MockNvs::new(), MockNet::connected());
    registry.try_enter_sleep().unwrap();

    let reply = app.handle_command(
        AppCommand::Drive(DriveCommand::Joystick { x: 0.0, y: 1.0 }),
        &mut hw,
        &nvs,
        &mut net,
    );

    assert_eq!(reply, Err(CommandError::Asleep));
    assert!(hw.calls.is_empty(), "no actuator output while asleep");
}

#[test]
fn drive_held_neutral_on_critical_battery() {
    let (registry, stream, clock) = (DeviceRegistry::new(), StreamHandle::new(), MockClock::new());
    let mut app = service(&registry, &stream, &clock);
    let (mut hw, nvs, mut net) = (MockHardware::new(), MockNvs::new(), MockNet::connected());
    registry.set_battery(3.0, BatteryStatus::Critical);

    let reply = app.handle_command(
        AppCommand::Drive(DriveCommand::Joystick { x: 0.3, y: 1.0 }),
        &mut hw,
        &nvs,
        &mut net,
    );

    assert_eq!(reply, Ok(Reply::Ack("ok")));
    assert_eq!(hw.last_pulses(), Some((1500, 1500)));
}

#[test]
fn every_command_counts_as_activity() {
    let (registry, stream, clock) = (DeviceRegistry::new(), StreamHandle::new(), MockClock::new());
    let mut app = service(&registry, &stream, &clock);
    let (mut hw, nvs, mut net) = (MockHardware::new(), MockNvs::new(), MockNet::connected());
    clock.set_ms(42_000);

    app.handle_command(AppCommand::Ping, &mut hw, &nvs, &mut net).unwrap();

    assert_eq!(registry.snapshot().last_activity_ms, 42_000);
}

// ── Illumination / camera ─────────────────────────────────────

#[test]
fn illumination_range_is_checked() {
    let (registry, stream, clock) = (DeviceRegistry::new(), StreamHandle::new(), MockClock::new());
    let mut app = service(&registry, &stream, &clock);
    let (mut hw, nvs, mut net) = (MockHardware::new(), MockNvs::new(), MockNet::connected());

    let bad = app.handle_command(AppCommand::SetIllumination(101), &mut hw, &nvs, &mut net);
    assert!(matches!(bad, Err(CommandError::InvalidArgument(_))));
    assert_eq!(hw.last_illumination(), None);

    let ok = app.handle_command(AppCommand::SetIllumination(40), &mut hw, &nvs, &mut net);
    assert_eq!(ok, Ok(Reply::Ack("ok")));
    assert_eq!(hw.last_illumination(), Some(40));
    assert_eq!(registry.snapshot().illumination, 40);
}

#[test]
fn camera_params_applied_then_persisted() {
    let (registry, stream, clock) = (DeviceRegistry::new(), StreamHandle::new(), MockClock::new());
    let mut app = service(&registry, &stream, &clock);
    let (mut hw, nvs, mut net) = (MockHardware::new(), MockNvs::new(), MockNet::connected());
    let params = CameraParams {
        frame_size: FrameSize::Svga,
        quality: 10,
        brightness: 1,
        ..CameraParams::default()
    };

    let reply = app.handle_command(AppCommand::SetCameraParams(params), &mut hw, &nvs, &mut net);

    assert_eq!(reply, Ok(Reply::Ack("camera_updated")));
    assert_eq!(hw.applied_camera.last(), Some(&params));
    assert_eq!(nvs.saved.borrow().as_ref().map(|c| c.camera), Some(params));
    assert_eq!(app.current_config().camera, params);
}

#[test]
fn rejected_camera_params_are_not_persisted() {
    let (registry, stream, clock) = (DeviceRegistry::new(), StreamHandle::new(), MockClock::new());
    let mut app = service(&registry, &stream, &clock);
    let (mut hw, nvs, mut net) = (MockHardware::new(), MockNvs::new(), MockNet::connected());
    hw.reject_camera = Some("quality");

    let params = CameraParams {
        quality: 20,
        ..CameraParams::default()
    };
    let reply = app.handle_command(AppCommand::SetCameraParams(params), &mut hw, &nvs, &mut net);

    assert_eq!(
        reply,
        Err(CommandError::ApplyFailed(ActuatorError::CameraRejected("quality")))
    );
    assert_eq!(nvs.save_count(), 0);
    assert_eq!(app.current_config().camera, CameraParams::default());
}

#[test]
fn out_of_range_camera_params_never_reach_the_sensor() {
    let (registry, stream, clock) = (DeviceRegistry::new(), StreamHandle::new(), MockClock::new());
    let mut app = service(&registry, &stream, &clock);
    let (mut hw, nvs, mut net) = (MockHardware::new(), MockNvs::new(), MockNet::connected());

    let params = CameraParams {
        quality: 70,
        ..CameraParams::default()
    };
    let reply = app.handle_command(AppCommand::SetCameraParams(params), &mut hw, &nvs, &mut net);

    assert!(matches!(reply, Err(CommandError::InvalidArgument(_))));
    assert!(hw.applied_camera.is_empty());
}

// ── Calibration ───────────────────────────────────────────────

fn custom_calibration() -> CalibrationData {
    CalibrationData {
        drive: DriveCalibration {
            left: ServoCalibration {
                stop_us: 1520,
                deadzone_us: 30,
            },
            right: ServoCalibration {
                stop_us: 1480,
                deadzone_us: 50,
            },
            span_us: 450,
        },
        battery_divider_ratio: 2.2,
    }
}

#[test]
fn calibration_round_trips_through_get_and_set() {
    let (registry, stream, clock) = (DeviceRegistry::new(), StreamHandle::new(), MockClock::new());
    let mut app = service(&registry, &stream, &clock);
    let (mut hw, nvs, mut net) = (MockHardware::new(), MockNvs::new(), MockNet::connected());

    let initial = app.handle_command(AppCommand::GetCalibration, &mut hw, &nvs, &mut net);
    assert_eq!(
        initial,
        Ok(Reply::Calibration(CalibrationData {
            drive: DriveCalibration::default(),
            battery_divider_ratio: 2.0,
        }))
    );

    let cal = custom_calibration();
    let reply = app.handle_command(AppCommand::SetCalibration(cal), &mut hw, &nvs, &mut net);
    assert_eq!(reply, Ok(Reply::Ack("calibration_saved")));

    // New stop pulses take effect immediately.
    assert_eq!(hw.last_pulses(), Some((1520, 1480)));
    assert_eq!(app.calibration(), cal);
    let saved = nvs.saved.borrow().clone().expect("calibration persisted");
    assert_eq!(saved.drive, cal.drive);
    assert!((saved.battery.divider_ratio - 2.2).abs() < f32::EPSILON);
}

#[test]
fn invalid_calibration_is_rejected_without_side_effects() {
    let (registry, stream, clock) = (DeviceRegistry::new(), StreamHandle::new(), MockClock::new());
    let mut app = service(&registry, &stream, &clock);
    let (mut hw, nvs, mut net) = (MockHardware::new(), MockNvs::new(), MockNet::connected());

    let mut narrow = custom_calibration();
    narrow.drive.span_us = 50;
    let reply = app.handle_command(AppCommand::SetCalibration(narrow), &mut hw, &nvs, &mut net);
    assert!(matches!(reply, Err(CommandError::InvalidArgument(_))));

    let mut divider = custom_calibration();
    divider.battery_divider_ratio = 12.0;
    let reply = app.handle_command(AppCommand::SetCalibration(divider), &mut hw, &nvs, &mut net);
    assert!(matches!(reply, Err(CommandError::InvalidArgument(_))));

    assert_eq!(nvs.save_count(), 0);
    assert!(hw.calls.is_empty());
    assert_eq!(app.calibration().drive, DriveCalibration::default());
}

#[test]
fn persist_failure_is_reported() {
    let (registry, stream, clock) = (DeviceRegistry::new(), StreamHandle::new(), MockClock::new());
    let mut app = service(&registry, &stream, &clock);
    let (mut hw, mut nvs, mut net) = (MockHardware::new(), MockNvs::new(), MockNet::connected());
    nvs.fail_saves = true;

    let reply = app.handle_command(AppCommand::SetSleepPref(false), &mut hw, &nvs, &mut net);

    assert_eq!(reply, Err(CommandError::PersistFailed));
}

#[test]
fn reset_restores_factory_calibration_live() {
    let (registry, stream, clock) = (DeviceRegistry::new(), StreamHandle::new(), MockClock::new());
    let mut app = service(&registry, &stream, &clock);
    let (mut hw, nvs, mut net) = (MockHardware::new(), MockNvs::new(), MockNet::connected());

    app.handle_command(AppCommand::SetCalibration(custom_calibration()), &mut hw, &nvs, &mut net)
        .unwrap();
    app.handle_command(AppCommand::SetSleepPref(false), &mut hw, &nvs, &mut net)
        .unwrap();

    let reply = app.handle_command(AppCommand::ResetCalibration, &mut hw, &nvs, &mut net);

    assert_eq!(reply, Ok(Reply::Ack("calibration_reset")));
    assert_eq!(app.calibration().drive, DriveCalibration::default());
    assert!((app.calibration().battery_divider_ratio - 2.0).abs() < f32::EPSILON);
    assert_eq!(hw.last_pulses(), Some((1500, 1500)));
    assert_eq!(hw.applied_camera.last(), Some(&CameraParams::default()));
    assert!(registry.snapshot().sleep_enabled);
    assert_eq!(nvs.saved.borrow().clone(), Some(SystemConfig::default()));
}

// ── Sleep preference / credentials / queries ──────────────────

#[test]
fn sleep_preference_is_stored_and_reported() {
    let (registry, stream, clock) = (DeviceRegistry::new(), StreamHandle::new(), MockClock::new());
    let mut app = service(&registry, &stream, &clock);
    let (mut hw, nvs, mut net) = (MockHardware::new(), MockNvs::new(), MockNet::connected());

    let reply = app.handle_command(AppCommand::SetSleepPref(false), &mut hw, &nvs, &mut net);
    assert_eq!(reply, Ok(Reply::Ack("sleep_pref_saved")));

    let pref = app.handle_command(AppCommand::GetSleepPref, &mut hw, &nvs, &mut net);
    assert_eq!(pref, Ok(Reply::SleepPref { enabled: false }));
    assert!(!registry.snapshot().sleep_enabled);
    assert_eq!(nvs.saved.borrow().as_ref().map(|c| c.sleep.enabled), Some(false));
}

#[test]
fn credentials_are_validated_before_storing() {
    let (registry, stream, clock) = (DeviceRegistry::new(), StreamHandle::new(), MockClock::new());
    let mut app = service(&registry, &stream, &clock);
    let (mut hw, nvs, mut net) = (MockHardware::new(), MockNvs::new(), MockNet::connected());

    for (ssid, password) in [("", "password1"), ("home", "short"), ("caf\u{e9}", "")] {
        let reply = app.handle_command(
            AppCommand::SetNetworkCredentials {
                ssid: ssid.into(),
                password: password.into(),
            },
            &mut hw,
            &nvs,
            &mut net,
        );
        assert!(
            matches!(reply, Err(CommandError::InvalidArgument(_))),
            "{ssid:?}/{password:?} should be rejected"
        );
    }
    assert!(nvs.credentials.borrow().is_none());

    let reply = app.handle_command(
        AppCommand::SetNetworkCredentials {
            ssid: "home".into(),
            password: "correct horse".into(),
        },
        &mut hw,
        &nvs,
        &mut net,
    );
    assert_eq!(reply, Ok(Reply::Ack("credentials_saved")));
    let stored = nvs.credentials.borrow().clone().expect("credentials persisted");
    assert_eq!(stored.ssid.as_str(), "home");
    assert_eq!(net.credentials, Some(stored));
}

#[test]
fn ping_and_full_status() {
    let (registry, stream, clock) = (DeviceRegistry::new(), StreamHandle::new(), MockClock::new());
    let mut app = service(&registry, &stream, &clock);
    let (mut hw, nvs, mut net) = (MockHardware::new(), MockNvs::new(), MockNet::connected());
    registry.set_battery(3.912, BatteryStatus::Ok);

    assert_eq!(
        app.handle_command(AppCommand::Ping, &mut hw, &nvs, &mut net),
        Ok(Reply::Pong)
    );

    let Ok(Reply::Status(status)) =
        app.handle_command(AppCommand::GetFullStatus, &mut hw, &nvs, &mut net)
    else {
        panic!("expected a status reply");
    };
    assert!(status.connected);
    assert_eq!(status.rssi, Some(-55));
    assert!((status.battery_voltage - 3.91).abs() < 1e-4);
    assert!(!status.streaming);
    assert!((status.fps).abs() < f32::EPSILON);
}

// ── Streaming ─────────────────────────────────────────────────

#[test]
fn stream_start_refused_on_critical_battery_closes_sink() {
    let (registry, stream, clock) = (DeviceRegistry::new(), StreamHandle::new(), MockClock::new());
    let mut app = service(&registry, &stream, &clock);
    let (mut hw, nvs, mut net) = (MockHardware::new(), MockNvs::new(), MockNet::connected());
    registry.set_battery(3.0, BatteryStatus::Critical);
    let (handle, log) = sink_handle(7);

    let reply = app.handle_command(
        AppCommand::StreamControl(StreamControl::Start(handle)),
        &mut hw,
        &nvs,
        &mut net,
    );

    assert_eq!(reply, Err(CommandError::BatteryCritical));
    assert!(log.lock().unwrap().closed);
    assert!(stream.try_next().is_none());
    assert!(!registry.is_streaming());
}

#[test]
fn stream_start_is_handed_to_the_worker_mailbox() {
    let (registry, stream, clock) = (DeviceRegistry::new(), StreamHandle::new(), MockClock::new());
    let mut app = service(&registry, &stream, &clock);
    let (mut hw, nvs, mut net) = (MockHardware::new(), MockNvs::new(), MockNet::connected());
    let (handle, log) = sink_handle(7);

    let reply = app.handle_command(
        AppCommand::StreamControl(StreamControl::Start(handle)),
        &mut hw,
        &nvs,
        &mut net,
    );

    assert_eq!(reply, Ok(Reply::Ack("stream_starting")));
    match stream.try_next() {
        Some(StreamRequest::Start(SinkHandle(sink))) => assert_eq!(sink.id(), 7),
        other => panic!("expected a start request, got {other:?}"),
    }
    assert!(!log.lock().unwrap().closed);
}

#[test]
fn full_mailbox_reports_busy_and_closes_sink() {
    let (registry, stream, clock) = (DeviceRegistry::new(), StreamHandle::new(), MockClock::new());
    let mut app = service(&registry, &stream, &clock);
    let (mut hw, nvs, mut net) = (MockHardware::new(), MockNvs::new(), MockNet::connected());

    for id in 1..=2 {
        let (handle, _) = sink_handle(id);
        app.handle_command(
            AppCommand::StreamControl(StreamControl::Start(handle)),
            &mut hw,
            &nvs,
            &mut net,
        )
        .unwrap();
    }
    let (handle, log) = sink_handle(3);
    let reply = app.handle_command(
        AppCommand::StreamControl(StreamControl::Start(handle)),
        &mut hw,
        &nvs,
        &mut net,
    );

    assert_eq!(reply, Err(CommandError::Busy));
    assert!(log.lock().unwrap().closed);
}

#[test]
fn stream_stop_without_session_confirms_immediately() {
    let (registry, stream, clock) = (DeviceRegistry::new(), StreamHandle::new(), MockClock::new());
    let mut app = service(&registry, &stream, &clock);
    let (mut hw, nvs, mut net) = (MockHardware::new(), MockNvs::new(), MockNet::connected());

    let reply = app.handle_command(
        AppCommand::StreamControl(StreamControl::Stop),
        &mut hw,
        &nvs,
        &mut net,
    );

    assert_eq!(reply, Ok(Reply::Ack("stopped")));
    assert!(matches!(stream.try_next(), Some(StreamRequest::Stop)));
}

#[test]
fn stream_stop_cancels_starts_still_in_the_mailbox() {
    let (registry, stream, clock) = (DeviceRegistry::new(), StreamHandle::new(), MockClock::new());
    let mut app = service(&registry, &stream, &clock);
    let (mut hw, nvs, mut net) = (MockHardware::new(), MockNvs::new(), MockNet::connected());

    let mut logs = Vec::new();
    for id in 1..=2 {
        let (handle, log) = sink_handle(id);
        app.handle_command(
            AppCommand::StreamControl(StreamControl::Start(handle)),
            &mut hw,
            &nvs,
            &mut net,
        )
        .unwrap();
        logs.push(log);
    }

    let reply = app.handle_command(
        AppCommand::StreamControl(StreamControl::Stop),
        &mut hw,
        &nvs,
        &mut net,
    );

    assert_eq!(reply, Ok(Reply::Ack("stopped")));
    for log in &logs {
        assert!(log.lock().unwrap().closed, "queued sink released");
    }
    assert!(matches!(stream.try_next(), Some(StreamRequest::Stop)));
    assert!(stream.try_next().is_none());
    assert!(!registry.is_streaming());
}

// ── Housekeeping ──────────────────────────────────────────────

#[test]
fn start_puts_outputs_in_a_known_state() {
    let (registry, stream, clock) = (DeviceRegistry::new(), StreamHandle::new(), MockClock::new());
    let mut app = service(&registry, &stream, &clock);
    let mut hw = MockHardware::new();
    let mut sink = RecordingSink::new();
    clock.set_ms(500);

    app.start(rovercam::app::ports::WakeCause::None, &mut hw, &mut sink);

    assert_eq!(hw.last_pulses(), Some((1500, 1500)));
    assert_eq!(hw.last_illumination(), Some(0));
    assert_eq!(hw.applied_camera, vec![CameraParams::default()]);
    assert!(matches!(sink.events.as_slice(), [AppEvent::Started(_)]));
    assert_eq!(registry.snapshot().last_activity_ms, 500);
}

#[test]
fn critical_battery_transition_neutralises_and_broadcasts() {
    let (registry, stream, clock) = (DeviceRegistry::new(), StreamHandle::new(), MockClock::new());
    let mut app = service(&registry, &stream, &clock);
    let (mut hw, net) = (MockHardware::new(), MockNet::connected());
    let mut sink = RecordingSink::new();
    hw.set_battery_volts(3.0);

    app.tick(&mut hw, &mut NoDelay, &net, &mut sink);

    let changed = sink.events.iter().find_map(|e| match e {
        AppEvent::BatteryChanged(t) => Some(*t),
        _ => None,
    });
    let changed = changed.expect("battery transition emitted");
    assert_eq!(changed.from, BatteryStatus::Ok);
    assert_eq!(changed.to, BatteryStatus::Critical);
    assert_eq!(hw.last_pulses(), Some((1500, 1500)));
    assert_eq!(registry.battery_status(), BatteryStatus::Critical);
    assert_eq!(sink.status_count(), 1);
}

#[test]
fn status_broadcast_follows_interval_and_requests() {
    let (registry, stream, clock) = (DeviceRegistry::new(), StreamHandle::new(), MockClock::new());
    let mut app = service(&registry, &stream, &clock);
    let (mut hw, net) = (MockHardware::new(), MockNet::connected());
    let mut sink = RecordingSink::new();
    hw.set_battery_volts(3.9);

    app.tick(&mut hw, &mut NoDelay, &net, &mut sink);
    assert_eq!(sink.status_count(), 1, "first pass always broadcasts");

    clock.advance_ms(100);
    app.tick(&mut hw, &mut NoDelay, &net, &mut sink);
    assert_eq!(sink.status_count(), 1);

    registry.request_broadcast();
    app.tick(&mut hw, &mut NoDelay, &net, &mut sink);
    assert_eq!(sink.status_count(), 2, "state change triggers an early broadcast");

    clock.advance_ms(2000);
    app.tick(&mut hw, &mut NoDelay, &net, &mut sink);
    assert_eq!(sink.status_count(), 3);
    assert_eq!(app.tick_count(), 4);
}

#[test]
fn ended_stream_sessions_are_reported_on_tick() {
    use rovercam::stream::{StreamEndReason, StreamEnded};

    let (registry, stream, clock) = (DeviceRegistry::new(), StreamHandle::new(), MockClock::new());
    let mut app = service(&registry, &stream, &clock);
    let (mut hw, net) = (MockHardware::new(), MockNet::connected());
    let mut sink = RecordingSink::new();
    let ended = StreamEnded {
        sink: 4,
        reason: StreamEndReason::SinkDisconnected,
        frames: 12,
    };
    registry.post_stream_ended(ended);

    app.tick(&mut hw, &mut NoDelay, &net, &mut sink);

    assert!(sink
        .events
        .iter()
        .any(|e| matches!(e, AppEvent::StreamEnded(ev) if *ev == ended)));
}
