//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the ESP-IDF logger (UART / USB-CDC in production).  A WebSocket status
//! broadcaster implements the same trait on the transport side.

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Debug, Default)]
pub struct LogEventSink {
    emitted: u32,
}

impl LogEventSink {
    pub fn new() -> Self {
        Self { emitted: 0 }
    }

    /// Events logged since construction.
    pub fn emitted(&self) -> u32 {
        self.emitted
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        self.emitted = self.emitted.wrapping_add(1);
        match event {
            AppEvent::Status(s) => match s.to_json() {
                Ok(json) => info!("STATUS | {}", json),
                Err(e) => warn!("STATUS | serialise failed: {}", e),
            },
            AppEvent::BatteryChanged(t) => {
                info!("BATT | from={} to={}", t.from.as_str(), t.to.as_str());
            }
            AppEvent::StreamEnded(ev) => {
                info!(
                    "STREAM | ended sink={} reason={:?} frames={}",
                    ev.sink, ev.reason, ev.frames
                );
            }
            AppEvent::SleepEntered => {
                info!("SLEEP | entered");
            }
            AppEvent::Woke { cause } => {
                info!("SLEEP | woke cause={:?}", cause);
            }
            AppEvent::CommandResult { id, result } => match result {
                Ok(reply) => match serde_json::to_string(reply) {
                    Ok(json) => info!("CMD | id={} ok reply={}", id, json),
                    Err(_) => info!("CMD | id={} ok", id),
                },
                Err(e) => info!("CMD | id={} err code={} msg={}", id, e.code(), e),
            },
            AppEvent::Started(cause) => {
                info!("START | wake_cause={:?}", cause);
            }
        }
    }
}
