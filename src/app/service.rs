//! Application service: the hexagonal core of the request loop.
//!
//! [`AppService`] owns the drive mixer, the battery monitor and the live
//! settings.  It dispatches inbound commands, runs the periodic
//! housekeeping (battery sampling, stream-event draining, status
//! broadcast) and executes sleep entry.  All I/O flows through port
//! traits injected at call sites.
//!
//! ```text
//!   AppCommand ──▶ ┌──────────────────────────┐ ──▶ ActuatorPort
//!                  │        AppService         │ ──▶ StreamHandle (mailbox)
//! BatteryAdcPort ─▶│ mixer · battery · sleep   │ ──▶ EventSink (status)
//!                  └────────────┬─────────────┘
//!                               ▼
//!                        DeviceRegistry
//! ```

use std::time::Duration;

use embedded_hal::delay::DelayNs;
use log::{debug, info, warn};

use crate::app::ports::{ActuatorPort, BatteryAdcPort, CameraControlPort, ConfigPort, EventSink, NetworkPort, PowerPort, TimePort, WakeCause, WifiCredentials};
use crate::app::registry::{ControlMode, DeviceRegistry};
use crate::app::status::StatusSnapshot;
use crate::config::{validate_drive, SystemConfig};
use crate::control::{DriveCommand, DriveMixer, DriveOutput};
use crate::error::CommandError;
use crate::power::{SleepCycleManager, SleepError};
use crate::sensors::battery::{BatteryMonitor, BatteryStatus};
use crate::stream::{SinkHandle, StreamHandle, StreamRequest};

use super::commands::{AppCommand, CalibrationData, Reply, StreamControl};
use super::events::AppEvent;

// ───────────────────────────────────────────────────────────────
// AppService
// ───────────────────────────────────────────────────────────────

pub struct AppService<'r, T: TimePort> {
    registry: &'r DeviceRegistry,
    stream: &'r StreamHandle,
    clock: T,
    config: SystemConfig,
    mixer: DriveMixer,
    battery: BatteryMonitor,
    sleep: SleepCycleManager,
    last_battery_ms: Option<u64>,
    last_status_ms: Option<u64>,
    tick_count: u64,
}

impl<'r, T: TimePort> AppService<'r, T> {
    /// Construct the service from loaded configuration.
    ///
    /// Does **not** touch hardware; call [`start`](Self::start) next.
    pub fn new(
        config: SystemConfig,
        registry: &'r DeviceRegistry,
        stream: &'r StreamHandle,
        clock: T,
    ) -> Self {
        let mixer = DriveMixer::new(config.drive, config.input_deadzone);
        let battery = BatteryMonitor::new(config.battery);
        let sleep = SleepCycleManager::new(config.sleep);
        Self {
            registry,
            stream,
            clock,
            config,
            mixer,
            battery,
            sleep,
            last_battery_ms: None,
            last_status_ms: None,
            tick_count: 0,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Drive outputs to a known state and seed the registry.
    pub fn start(
        &mut self,
        boot_cause: WakeCause,
        hw: &mut (impl ActuatorPort + CameraControlPort),
        sink: &mut impl EventSink,
    ) {
        let neutral = self.mixer.neutral();
        hw.set_drive_pulses(neutral.left_us, neutral.right_us);
        hw.set_illumination(0);
        if let Err(e) = hw.apply_camera(&self.config.camera) {
            warn!("AppService: stored camera params rejected at boot: {}", e);
        }

        self.registry.set_sleep_enabled(self.config.sleep.enabled);
        self.registry.set_illumination(0);
        self.registry.record_activity(self.clock.uptime_ms());
        self.registry.request_broadcast();

        sink.emit(&AppEvent::Started(boot_cause));
        info!("AppService started (boot wake cause {:?})", boot_cause);
    }

    // ── Per-tick housekeeping ─────────────────────────────────

    /// One request-loop housekeeping pass: battery sampling, stream
    /// events, status broadcast.
    pub fn tick(
        &mut self,
        hw: &mut (impl ActuatorPort + BatteryAdcPort),
        delay: &mut impl DelayNs,
        net: &impl NetworkPort,
        sink: &mut impl EventSink,
    ) {
        self.tick_count += 1;
        let now = self.clock.uptime_ms();

        // 1. Battery
        if due(self.last_battery_ms, now, self.config.battery_sample_interval_ms) {
            self.last_battery_ms = Some(now);
            self.sample_battery(hw, delay, sink);
        }

        // 2. Stream sessions that ended since the last pass
        while let Some(ended) = self.registry.next_stream_event() {
            sink.emit(&AppEvent::StreamEnded(ended));
        }

        // 3. Status broadcast
        let requested = self.registry.take_broadcast_request();
        if requested || due(self.last_status_ms, now, self.config.status_interval_ms) {
            self.last_status_ms = Some(now);
            sink.emit(&AppEvent::Status(self.status(net)));
        }
    }

    fn sample_battery(
        &mut self,
        hw: &mut (impl ActuatorPort + BatteryAdcPort),
        delay: &mut impl DelayNs,
        sink: &mut impl EventSink,
    ) {
        let reading = match self.battery.sample(hw, delay) {
            Ok(r) => r,
            Err(e) => {
                debug!("AppService: battery sample skipped: {}", e);
                return;
            }
        };
        if reading.filtered_voltage > 0.0 {
            self.registry
                .set_battery(reading.filtered_voltage, reading.status);
        }
        let Some(transition) = reading.transition else {
            return;
        };

        info!(
            "battery: {} -> {} ({:.2} V)",
            transition.from.as_str(),
            transition.to.as_str(),
            reading.filtered_voltage
        );
        if transition.entered_critical() {
            let neutral = self.mixer.neutral();
            hw.set_drive_pulses(neutral.left_us, neutral.right_us);
        }
        sink.emit(&AppEvent::BatteryChanged(transition));
        self.registry.request_broadcast();
    }

    // ── Command handling ──────────────────────────────────────

    /// Dispatch one decoded command.  Every command counts as activity.
    pub fn handle_command(
        &mut self,
        cmd: AppCommand,
        hw: &mut (impl ActuatorPort + CameraControlPort),
        settings: &impl ConfigPort,
        net: &mut impl NetworkPort,
    ) -> Result<Reply, CommandError> {
        self.registry.record_activity(self.clock.uptime_ms());
        let name = cmd.name();
        let result = self.dispatch(cmd, hw, settings, net);
        match &result {
            Ok(_) => debug!("cmd {}: ok", name),
            Err(e) => info!("cmd {}: rejected ({})", name, e),
        }
        result
    }

    fn dispatch(
        &mut self,
        cmd: AppCommand,
        hw: &mut (impl ActuatorPort + CameraControlPort),
        settings: &impl ConfigPort,
        net: &mut impl NetworkPort,
    ) -> Result<Reply, CommandError> {
        match cmd {
            AppCommand::Drive(drive) => self.drive(drive, hw).map(|_| Reply::Ack("ok")),

            AppCommand::SetIllumination(percent) => {
                if percent > 100 {
                    return Err(CommandError::InvalidArgument("illumination must be 0-100"));
                }
                hw.set_illumination(percent);
                self.registry.set_illumination(percent);
                self.registry.request_broadcast();
                Ok(Reply::Ack("ok"))
            }

            AppCommand::SetCameraParams(params) => {
                params
                    .validate()
                    .map_err(|_| CommandError::InvalidArgument("camera params out of range"))?;
                hw.apply_camera(&params).map_err(CommandError::ApplyFailed)?;
                self.config.camera = params;
                self.persist(settings)?;
                self.registry.request_broadcast();
                Ok(Reply::Ack("camera_updated"))
            }

            AppCommand::StreamControl(StreamControl::Start(sink)) => self.start_stream(sink),

            AppCommand::StreamControl(StreamControl::Stop) => {
                self.registry.stop_streaming();
                let timeout = Duration::from_millis(u64::from(self.config.stream.stop_timeout_ms));
                let stopped = self.stream.stop_and_wait(timeout);
                self.registry.request_broadcast();
                Ok(Reply::Ack(if stopped { "stopped" } else { "stopping" }))
            }

            AppCommand::GetCalibration => Ok(Reply::Calibration(self.calibration())),

            AppCommand::SetCalibration(cal) => {
                validate_drive(&cal.drive)
                    .map_err(|_| CommandError::InvalidArgument("servo calibration out of range"))?;
                if !(1.0..=10.0).contains(&cal.battery_divider_ratio) {
                    return Err(CommandError::InvalidArgument("divider ratio must be 1.0-10.0"));
                }
                self.apply_calibration(cal, hw);
                self.persist(settings)?;
                Ok(Reply::Ack("calibration_saved"))
            }

            AppCommand::ResetCalibration => {
                let mut defaults = self.config.clone();
                defaults.reset_calibration();
                hw.apply_camera(&defaults.camera)
                    .map_err(CommandError::ApplyFailed)?;
                self.config.camera = defaults.camera;
                self.apply_calibration(
                    CalibrationData {
                        drive: defaults.drive,
                        battery_divider_ratio: defaults.battery.divider_ratio,
                    },
                    hw,
                );
                self.set_sleep_pref(defaults.sleep.enabled);
                self.persist(settings)?;
                self.registry.request_broadcast();
                info!("calibration reset to defaults");
                Ok(Reply::Ack("calibration_reset"))
            }

            AppCommand::GetSleepPref => Ok(Reply::SleepPref {
                enabled: self.registry.snapshot().sleep_enabled,
            }),

            AppCommand::SetSleepPref(enabled) => {
                self.set_sleep_pref(enabled);
                self.persist(settings)?;
                self.registry.request_broadcast();
                Ok(Reply::Ack("sleep_pref_saved"))
            }

            AppCommand::SetNetworkCredentials { ssid, password } => {
                let creds =
                    WifiCredentials::new(&ssid, &password).map_err(CommandError::InvalidArgument)?;
                net.set_credentials(&creds)
                    .map_err(|_| CommandError::InvalidArgument("credentials rejected"))?;
                settings.save_credentials(&creds).map_err(|e| {
                    warn!("AppService: credential save failed: {}", e);
                    CommandError::PersistFailed
                })?;
                Ok(Reply::Ack("credentials_saved"))
            }

            AppCommand::Ping => Ok(Reply::Pong),

            AppCommand::GetFullStatus => Ok(Reply::Status(self.status(net))),
        }
    }

    fn drive(
        &mut self,
        cmd: DriveCommand,
        hw: &mut impl ActuatorPort,
    ) -> Result<DriveOutput, CommandError> {
        let snap = self.registry.snapshot();
        if snap.sleeping {
            return Err(CommandError::Asleep);
        }
        self.registry.set_control_mode(match cmd {
            DriveCommand::Joystick { .. } => ControlMode::Joystick,
            DriveCommand::Sliders { .. } => ControlMode::Sliders,
        });
        let out = self.mixer.process(cmd, snap.battery_status);
        hw.set_drive_pulses(out.left_us, out.right_us);
        if snap.battery_status == BatteryStatus::Critical {
            debug!("drive: battery critical, outputs held neutral");
        }
        Ok(out)
    }

    fn start_stream(&mut self, mut sink: SinkHandle) -> Result<Reply, CommandError> {
        let snap = self.registry.snapshot();
        if snap.battery_status == BatteryStatus::Critical {
            sink.0.close();
            return Err(CommandError::BatteryCritical);
        }
        if snap.sleeping {
            sink.0.close();
            return Err(CommandError::Asleep);
        }
        match self.stream.post(StreamRequest::Start(sink)) {
            Ok(()) => Ok(Reply::Ack("stream_starting")),
            Err(req) => {
                if let StreamRequest::Start(mut sink) = req {
                    sink.0.close();
                }
                Err(CommandError::Busy)
            }
        }
    }

    fn apply_calibration(&mut self, cal: CalibrationData, hw: &mut impl ActuatorPort) {
        self.mixer.set_calibration(cal.drive);
        self.battery.set_divider_ratio(cal.battery_divider_ratio);
        self.config.drive = cal.drive;
        self.config.battery.divider_ratio = cal.battery_divider_ratio;
        let neutral = self.mixer.neutral();
        hw.set_drive_pulses(neutral.left_us, neutral.right_us);
    }

    fn set_sleep_pref(&mut self, enabled: bool) {
        self.config.sleep.enabled = enabled;
        self.registry.set_sleep_enabled(enabled);
    }

    fn persist(&self, settings: &impl ConfigPort) -> Result<(), CommandError> {
        settings.save(&self.config).map_err(|e| {
            warn!("AppService: settings save failed: {}", e);
            CommandError::PersistFailed
        })
    }

    // ── Sleep / OTA ───────────────────────────────────────────

    /// Enter light sleep on behalf of the sleep monitor.  Blocks the
    /// request loop until woken.
    pub fn enter_sleep(
        &mut self,
        hw: &mut impl ActuatorPort,
        power: &mut impl PowerPort,
        net: &mut impl NetworkPort,
        sink: &mut impl EventSink,
    ) -> Result<WakeCause, SleepError> {
        let neutral = self.mixer.neutral();
        let cause = self.sleep.enter_and_wait(
            self.registry,
            hw,
            neutral,
            &self.config.camera,
            power,
            net,
            &self.clock,
            sink,
        )?;
        sink.emit(&AppEvent::Status(self.status(net)));
        self.last_status_ms = Some(self.clock.uptime_ms());
        Ok(cause)
    }

    /// Raised by the update collaborator; refused while asleep.
    pub fn begin_ota(&self) -> Result<(), CommandError> {
        self.registry.begin_ota()
    }

    pub fn end_ota(&self) {
        self.registry.end_ota();
    }

    /// Network collaborator reports station vs. access-point operation.
    pub fn set_ap_mode(&self, ap: bool) {
        self.registry.set_ap_mode(ap);
        self.registry.request_broadcast();
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn status(&self, net: &impl NetworkPort) -> StatusSnapshot {
        StatusSnapshot::assemble(
            &self.registry.snapshot(),
            &self.config.camera,
            net.is_connected(),
            net.rssi(),
        )
    }

    pub fn calibration(&self) -> CalibrationData {
        CalibrationData {
            drive: self.mixer.calibration(),
            battery_divider_ratio: self.battery.divider_ratio(),
        }
    }

    /// Clone of the live configuration.
    pub fn current_config(&self) -> SystemConfig {
        self.config.clone()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }
}

fn due(last: Option<u64>, now: u64, interval_ms: u32) -> bool {
    last.is_none_or(|t| now.saturating_sub(t) >= u64::from(interval_ms))
}
