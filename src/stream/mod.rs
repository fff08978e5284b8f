//! Video streaming: MJPEG framing, the session state machine and the
//! worker loop that drives it.
//!
//! Other activities never touch the session; they post
//! [`StreamRequest`]s into the shared [`StreamHandle`] mailbox and the
//! worker applies them between frames.

pub mod mjpeg;
pub mod session;

use core::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embedded_hal::delay::DelayNs;
use log::{debug, warn};

use crate::app::ports::{CameraPort, FrameSink, TimePort};

pub use session::{
    SessionState, StepOutcome, StreamEndReason, StreamEnded, StreamError, StreamSession,
};

/// Poll period of an idle worker (ms).
const IDLE_POLL_MS: u32 = 20;
/// Pending requests before posters see `Busy`.
const MAILBOX_DEPTH: usize = 2;

/// Owned transport sink travelling from the dispatcher to the worker.
pub struct SinkHandle(pub Box<dyn FrameSink>);

impl core::fmt::Debug for SinkHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("SinkHandle").field(&self.0.id()).finish()
    }
}

#[derive(Debug)]
pub enum StreamRequest {
    Start(SinkHandle),
    Stop,
}

/// Shared mailbox between the request loop and the stream worker.
pub struct StreamHandle {
    requests: Channel<CriticalSectionRawMutex, StreamRequest, MAILBOX_DEPTH>,
    active: AtomicBool,
}

impl Default for StreamHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamHandle {
    pub const fn new() -> Self {
        Self {
            requests: Channel::new(),
            active: AtomicBool::new(false),
        }
    }

    /// Queue a request.  Hands it back if the mailbox is full.
    pub fn post(&self, req: StreamRequest) -> Result<(), StreamRequest> {
        self.requests.try_send(req).map_err(|e| match e {
            embassy_sync::channel::TrySendError::Full(req) => req,
        })
    }

    pub fn try_next(&self) -> Option<StreamRequest> {
        self.requests.try_receive().ok()
    }

    /// Whether the worker currently holds a session.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    /// Drop queued requests the worker has not taken yet.  Pending
    /// starts close their sinks; returns how many were cancelled.
    pub fn cancel_pending(&self) -> usize {
        let mut cancelled = 0;
        while let Some(req) = self.try_next() {
            if let StreamRequest::Start(SinkHandle(mut sink)) = req {
                debug!("stream: cancelling queued start for sink {}", sink.id());
                sink.close();
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Cancel queued starts, post `Stop` and wait up to `timeout` for the
    /// worker to go idle.  `true` once idle; `false` on timeout (the
    /// worker still observes the cleared `streaming` flag on its next
    /// iteration).
    pub fn stop_and_wait(&self, timeout: Duration) -> bool {
        self.cancel_pending();
        if self.post(StreamRequest::Stop).is_err() {
            debug!("stream: mailbox full, relying on streaming flag");
        }
        let deadline = Instant::now() + timeout;
        while self.is_active() {
            if Instant::now() >= deadline {
                warn!("stream: stop not confirmed within {:?}", timeout);
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        true
    }
}

/// The stream activity: applies mailbox requests, steps the session and
/// paces the loop.
pub struct StreamWorker<'r, C: CameraPort, T: TimePort> {
    session: StreamSession<'r, C, T>,
    handle: &'r StreamHandle,
}

impl<'r, C: CameraPort, T: TimePort> StreamWorker<'r, C, T> {
    pub fn new(session: StreamSession<'r, C, T>, handle: &'r StreamHandle) -> Self {
        Self { session, handle }
    }

    pub fn session(&self) -> &StreamSession<'r, C, T> {
        &self.session
    }

    /// Drain the mailbox, then run one session step.  Returns the step
    /// outcome and the delay (ms) before the next poll.
    pub fn poll_once(&mut self) -> (StepOutcome, u32) {
        while let Some(req) = self.handle.try_next() {
            match req {
                StreamRequest::Start(SinkHandle(sink)) => {
                    if let Err(e) = self.session.request_start(sink) {
                        warn!("stream: start failed: {}", e);
                    }
                }
                StreamRequest::Stop => self.session.stop(StreamEndReason::Stopped),
            }
        }
        self.handle.set_active(self.session.state() != SessionState::Idle);

        let outcome = self.session.step();
        self.handle.set_active(self.session.state() != SessionState::Idle);

        let cfg = self.session.config();
        let delay_ms = match outcome {
            StepOutcome::Idle => IDLE_POLL_MS,
            StepOutcome::Sent | StepOutcome::Skipped => cfg.frame_delay_ms,
            StepOutcome::NoFrame => cfg.no_frame_backoff_ms,
            StepOutcome::Ended(_) => 0,
        };
        (outcome, delay_ms)
    }

    /// Worker thread body.
    pub fn run(&mut self, delay: &mut impl DelayNs) -> ! {
        loop {
            let (_, delay_ms) = self.poll_once();
            if delay_ms > 0 {
                delay.delay_ms(delay_ms);
            }
        }
    }
}
