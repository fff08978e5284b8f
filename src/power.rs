//! Inactivity-driven light sleep.
//!
//! ```text
//!   monitor (every check_interval) ── evaluate() ──▶ Enter ──▶ request loop
//!                                                            enter_and_wait()
//!                                                              │ registry gate
//!                                                              │ arm wake sources
//!                                                              │ neutral, light off
//!                                                              │ Wi-Fi power save
//!                                                              │ status (sleeping)
//!                                                              │ light_sleep() … blocks
//!                                                              ▼
//!                                                            on_wake()
//! ```
//!
//! Entry runs on the request loop because that loop owns the actuators;
//! it blocks the request path until a wake source fires.  The registry
//! re-validates the entry conditions atomically, so a stream or OTA that
//! started between `evaluate` and entry still wins.
//!
//! After an idle timer wake the activity clock is only partially
//! advanced, leaving `timer_wake_grace_ms` until the next sleep instead of
//! a full inactivity timeout.

use log::{debug, info, warn};

use crate::app::commands::{LoopRequest, RequestQueue};
use crate::app::events::AppEvent;
use crate::app::ports::{ActuatorPort, EventSink, NetworkPort, PowerError, PowerPort, TimePort, WakeCause};
use crate::app::registry::{DeviceRegistry, DeviceState, SleepBlocker};
use crate::app::status::StatusSnapshot;
use crate::config::{CameraParams, SleepConfig};
use crate::control::DriveOutput;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepDecision {
    Enter,
    /// Asleep, but the preference was switched off.
    ForceWake,
    Stay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepError {
    Blocked(SleepBlocker),
    Power(PowerError),
}

impl core::fmt::Display for SleepError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Blocked(b) => write!(f, "sleep blocked: {}", b),
            Self::Power(e) => write!(f, "{}", e),
        }
    }
}

pub struct SleepCycleManager {
    cfg: SleepConfig,
}

impl SleepCycleManager {
    pub fn new(cfg: SleepConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &SleepConfig {
        &self.cfg
    }

    /// Pure eligibility decision over one registry snapshot.
    pub fn decide(&self, s: &DeviceState, now_ms: u64) -> SleepDecision {
        if s.sleeping {
            return if s.sleep_enabled {
                SleepDecision::Stay
            } else {
                SleepDecision::ForceWake
            };
        }
        let idle_ms = now_ms.saturating_sub(s.last_activity_ms);
        if s.sleep_enabled
            && !s.streaming
            && !s.ota_active
            && !s.ap_mode
            && idle_ms > self.cfg.inactivity_timeout_ms
        {
            SleepDecision::Enter
        } else {
            SleepDecision::Stay
        }
    }

    pub fn evaluate(&self, registry: &DeviceRegistry, now_ms: u64) -> SleepDecision {
        self.decide(&registry.snapshot(), now_ms)
    }

    /// Leave sleep immediately because the preference was turned off.
    pub fn force_wake(&self, registry: &DeviceRegistry, now_ms: u64) {
        if registry.exit_sleep(WakeCause::ExternalActivity) {
            registry.record_activity(now_ms);
            registry.request_broadcast();
            info!("sleep: preference disabled while asleep, forced wake");
        }
    }

    /// One sleep-monitor pass: post `EnterSleep` to the request loop when
    /// eligible, force a wake when the preference was switched off.
    pub fn monitor_pass(
        &self,
        registry: &DeviceRegistry,
        requests: &RequestQueue,
        now_ms: u64,
    ) -> SleepDecision {
        let decision = self.evaluate(registry, now_ms);
        match decision {
            SleepDecision::Enter => {
                if requests.try_send(LoopRequest::EnterSleep).is_err() {
                    debug!("sleep: request queue full, retry next pass");
                }
            }
            SleepDecision::ForceWake => self.force_wake(registry, now_ms),
            SleepDecision::Stay => {}
        }
        decision
    }

    /// Enter light sleep and block until woken.
    ///
    /// The registry gate and the wake sources are settled before any
    /// output changes; if either refuses, the device stays exactly as it
    /// was and the error is returned.  The status emitted just before
    /// blocking reports `sleeping = true`.
    #[allow(clippy::too_many_arguments)]
    pub fn enter_and_wait(
        &self,
        registry: &DeviceRegistry,
        hw: &mut impl ActuatorPort,
        neutral: DriveOutput,
        camera: &CameraParams,
        power: &mut impl PowerPort,
        net: &mut impl NetworkPort,
        clock: &impl TimePort,
        sink: &mut impl EventSink,
    ) -> Result<WakeCause, SleepError> {
        registry.try_enter_sleep().map_err(SleepError::Blocked)?;

        if let Err(e) = power.arm_wake_sources(self.cfg.periodic_wake_ms) {
            registry.exit_sleep(WakeCause::None);
            warn!("sleep: {}, staying awake", e);
            return Err(SleepError::Power(e));
        }

        hw.set_drive_pulses(neutral.left_us, neutral.right_us);
        hw.set_illumination(0);
        registry.set_illumination(0);
        power.set_wifi_power_save(true);

        info!(
            "sleep: entering light sleep (timer wake every {} ms)",
            self.cfg.periodic_wake_ms
        );
        sink.emit(&AppEvent::SleepEntered);
        sink.emit(&AppEvent::Status(StatusSnapshot::assemble(
            &registry.snapshot(),
            camera,
            net.is_connected(),
            net.rssi(),
        )));

        let cause = power.light_sleep();
        self.on_wake(cause, registry, power, net, clock.uptime_ms());
        sink.emit(&AppEvent::Woke { cause });
        Ok(cause)
    }

    /// Wake bookkeeping.  Public for the boot path, which may start in the
    /// middle of a cycle after a reset.
    pub fn on_wake(
        &self,
        cause: WakeCause,
        registry: &DeviceRegistry,
        power: &mut impl PowerPort,
        net: &mut impl NetworkPort,
        now_ms: u64,
    ) {
        power.set_wifi_power_save(false);
        let was_sleeping = registry.exit_sleep(cause);

        let last = registry.snapshot().last_activity_ms;
        let recent = now_ms.saturating_sub(last) <= self.cfg.recent_activity_window_ms;
        if cause == WakeCause::Timer && !recent && was_sleeping {
            let rewind = self
                .cfg
                .inactivity_timeout_ms
                .saturating_sub(self.cfg.timer_wake_grace_ms);
            registry.set_last_activity(now_ms.saturating_sub(rewind));
            info!(
                "sleep: idle timer wake, eligible again in {} ms",
                self.cfg.timer_wake_grace_ms
            );
        } else {
            registry.record_activity(now_ms);
            info!("sleep: woke ({:?})", cause);
        }

        if !net.is_connected() {
            warn!("sleep: network lost during sleep, reconnecting");
            if let Err(e) = net.reconnect() {
                warn!("sleep: reconnect failed: {}", e);
            }
        }
        registry.request_broadcast();
    }
}
