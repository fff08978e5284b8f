//! One outbound MJPEG session.
//!
//! ```text
//!   Idle ──request_start──▶ Starting ──first part sent──▶ Active
//!    ▲                         │                            │
//!    └──────── Stopping ◀──────┴── stop | sink failure | ───┘
//!                                   battery critical
//! ```
//!
//! The session is owned by the stream worker.  It holds the camera and
//! the bound sink exclusively; the rest of the system talks to it through
//! the [`DeviceRegistry`] flags and the
//! [`StreamHandle`](super::StreamHandle) mailbox.
//!
//! `streaming` in the registry is raised only after the sink accepted the
//! multipart response, and every exit path runs the same teardown: close
//! the sink, clear the flag and FPS, post a [`StreamEnded`] event.

use log::{debug, info, warn};
use serde::Serialize;

use crate::app::ports::{CameraPort, FrameConverter, FrameData, FrameSink, PixelFormat, SinkId, TimePort};
use crate::app::registry::DeviceRegistry;
use crate::config::StreamConfig;
use crate::control::RollingAverage;
use crate::error::CommandError;
use crate::sensors::battery::BatteryStatus;

use super::mjpeg::{self, PartHeader};

/// Frame intervals averaged for the FPS estimate.
pub const FPS_WINDOW: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Active,
    Stopping,
}

/// Why a start request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamError {
    BatteryCritical,
    Asleep,
    /// The sink refused the multipart response head.
    SinkRejected,
}

impl core::fmt::Display for StreamError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::BatteryCritical => write!(f, "battery critical"),
            Self::Asleep => write!(f, "device asleep"),
            Self::SinkRejected => write!(f, "sink rejected stream"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamEndReason {
    /// Explicit stop (command or `streaming` cleared).
    Stopped,
    /// A start on another sink replaced this session.
    Replaced,
    SinkDisconnected,
    WriteFailed,
    BatteryCritical,
    /// No frame delivered within the configured idle timeout.
    IdleTimeout,
}

/// Posted into the registry whenever a session ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StreamEnded {
    pub sink: SinkId,
    pub reason: StreamEndReason,
    pub frames: u32,
}

/// Result of one [`StreamSession::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// No session bound.
    Idle,
    /// One part written.
    Sent,
    /// Camera had nothing ready; retry after the backoff.
    NoFrame,
    /// Frame dropped (unsupported format, conversion failed).
    Skipped,
    /// The session ended during this step.
    Ended(StreamEndReason),
}

/// `1e6 / avg_interval_us` rounded to one decimal, `0` without samples.
pub fn fps_from_interval(avg_interval_us: u32) -> f32 {
    if avg_interval_us == 0 {
        return 0.0;
    }
    let fps = 1_000_000.0_f64 / f64::from(avg_interval_us);
    ((fps * 10.0).round() / 10.0) as f32
}

pub struct StreamSession<'r, C: CameraPort, T: TimePort> {
    registry: &'r DeviceRegistry,
    camera: C,
    clock: T,
    cfg: StreamConfig,
    state: SessionState,
    sink: Option<Box<dyn FrameSink>>,
    converter: Option<Box<dyn FrameConverter>>,
    intervals: RollingAverage<FPS_WINDOW>,
    last_frame_us: Option<u64>,
    /// Session start or last delivered frame, for the idle timeout.
    last_progress_us: u64,
    frames: u32,
    header: PartHeader,
    scratch: Vec<u8>,
}

impl<'r, C: CameraPort, T: TimePort> StreamSession<'r, C, T> {
    pub fn new(registry: &'r DeviceRegistry, camera: C, clock: T, cfg: StreamConfig) -> Self {
        Self {
            registry,
            camera,
            clock,
            cfg,
            state: SessionState::Idle,
            sink: None,
            converter: None,
            intervals: RollingAverage::new(),
            last_frame_us: None,
            last_progress_us: 0,
            frames: 0,
            header: PartHeader::new(),
            scratch: Vec::new(),
        }
    }

    /// Install a conversion stage for non-JPEG sensors.
    pub fn set_converter(&mut self, converter: Box<dyn FrameConverter>) {
        self.converter = Some(converter);
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn sink_id(&self) -> Option<SinkId> {
        self.sink.as_ref().map(|s| s.id())
    }

    pub fn frames(&self) -> u32 {
        self.frames
    }

    pub fn fps(&self) -> f32 {
        if self.intervals.is_empty() {
            return 0.0;
        }
        fps_from_interval(self.intervals.average())
    }

    pub fn config(&self) -> &StreamConfig {
        &self.cfg
    }

    /// Bind `sink` as the session output.
    ///
    /// Same sink already bound: no-op.  Different sink bound: the old
    /// session is torn down (sink closed, [`StreamEnded`] posted) before
    /// the new one starts.  A refused sink is closed before returning.
    pub fn request_start(&mut self, mut sink: Box<dyn FrameSink>) -> Result<SessionState, StreamError> {
        let snap = self.registry.snapshot();
        if snap.battery_status == BatteryStatus::Critical {
            warn!("stream: start refused, battery critical");
            sink.close();
            return Err(StreamError::BatteryCritical);
        }
        if snap.sleeping {
            sink.close();
            return Err(StreamError::Asleep);
        }

        if let Some(current) = self.sink_id() {
            if current == sink.id() {
                debug!("stream: sink {} already bound", current);
                return Ok(self.state);
            }
            info!("stream: sink {} replaces {}", sink.id(), current);
            self.teardown(StreamEndReason::Replaced);
        }

        self.state = SessionState::Starting;
        if !sink.begin(mjpeg::STREAM_CONTENT_TYPE) {
            warn!("stream: sink {} rejected response head", sink.id());
            sink.close();
            self.state = SessionState::Idle;
            return Err(StreamError::SinkRejected);
        }
        if let Err(e) = self.registry.try_start_streaming() {
            sink.close();
            self.state = SessionState::Idle;
            return Err(match e {
                CommandError::Asleep => StreamError::Asleep,
                _ => StreamError::BatteryCritical,
            });
        }

        info!("stream: session started on sink {}", sink.id());
        self.sink = Some(sink);
        self.intervals.reset();
        self.last_frame_us = None;
        self.last_progress_us = self.clock.uptime_us();
        self.frames = 0;
        self.registry.request_broadcast();
        Ok(self.state)
    }

    /// End the bound session, if any.
    pub fn stop(&mut self, reason: StreamEndReason) {
        if self.sink.is_some() {
            self.teardown(reason);
        }
    }

    /// One loop iteration: guard checks, then at most one frame.
    pub fn step(&mut self) -> StepOutcome {
        if self.sink.is_none() {
            return StepOutcome::Idle;
        }

        let snap = self.registry.snapshot();
        if snap.battery_status == BatteryStatus::Critical {
            return self.teardown(StreamEndReason::BatteryCritical);
        }
        if !snap.streaming {
            return self.teardown(StreamEndReason::Stopped);
        }
        if !self.sink.as_ref().is_some_and(|s| s.is_connected()) {
            return self.teardown(StreamEndReason::SinkDisconnected);
        }
        let now = self.clock.uptime_us();
        let idle_limit_us = u64::from(self.cfg.sink_idle_timeout_ms) * 1000;
        if idle_limit_us > 0 && now.saturating_sub(self.last_progress_us) > idle_limit_us {
            return self.teardown(StreamEndReason::IdleTimeout);
        }

        let Some(frame) = self.camera.acquire_frame() else {
            return StepOutcome::NoFrame;
        };
        let sent = self.send_frame(&frame);
        self.camera.release_frame(frame);

        match sent {
            None => StepOutcome::Skipped,
            Some(false) => self.teardown(StreamEndReason::WriteFailed),
            Some(true) => {
                self.on_frame_sent();
                StepOutcome::Sent
            }
        }
    }

    /// `None` when the frame was skipped, else whether the part went out.
    fn send_frame(&mut self, frame: &C::Frame) -> Option<bool> {
        let Some(sink) = self.sink.as_deref_mut() else {
            return Some(false);
        };
        let payload: &[u8] = match frame.format() {
            PixelFormat::Jpeg => frame.bytes(),
            other => {
                let converter = self.converter.as_deref_mut()?;
                if !converter.to_jpeg(frame.bytes(), other, &mut self.scratch) {
                    debug!("stream: {:?} frame conversion failed, skipping", other);
                    return None;
                }
                &self.scratch
            }
        };
        Some(mjpeg::write_part(sink, payload, &mut self.header))
    }

    fn on_frame_sent(&mut self) {
        let now = self.clock.uptime_us();
        if let Some(prev) = self.last_frame_us {
            let interval = now.saturating_sub(prev).min(u64::from(u32::MAX)) as u32;
            self.intervals.push(interval);
        }
        self.last_frame_us = Some(now);
        self.last_progress_us = now;
        self.frames = self.frames.saturating_add(1);
        if self.state == SessionState::Starting {
            self.state = SessionState::Active;
            debug!("stream: first frame delivered");
        }
        self.registry.set_fps(self.fps());
        self.registry.record_activity(now / 1000);
    }

    fn teardown(&mut self, reason: StreamEndReason) -> StepOutcome {
        self.state = SessionState::Stopping;
        let sink_id = match self.sink.take() {
            Some(mut sink) => {
                sink.close();
                sink.id()
            }
            None => 0,
        };
        self.registry.stop_streaming();
        self.registry.post_stream_ended(StreamEnded {
            sink: sink_id,
            reason,
            frames: self.frames,
        });
        info!(
            "stream: session on sink {} ended ({:?}, {} frames)",
            sink_id, reason, self.frames
        );
        self.intervals.reset();
        self.last_frame_us = None;
        self.state = SessionState::Idle;
        StepOutcome::Ended(reason)
    }
}
