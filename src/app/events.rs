//! Outbound application events.
//!
//! The core emits these through the [`EventSink`](super::ports::EventSink)
//! port.  Adapters on the other side decide what to do with them: log to
//! serial, push the status JSON to connected WebSocket clients, etc.

use crate::app::ports::WakeCause;
use crate::app::status::StatusSnapshot;
use crate::error::CommandError;
use crate::sensors::battery::BatteryTransition;
use crate::stream::StreamEnded;

use super::commands::Reply;

/// Structured events emitted by the application core.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// Status broadcast (periodic or on state change).
    Status(StatusSnapshot),

    /// Battery classification changed.
    BatteryChanged(BatteryTransition),

    /// A stream session ended (reason and frame count).
    StreamEnded(StreamEnded),

    SleepEntered,

    Woke { cause: WakeCause },

    /// Result of a queued command, correlated by request id.
    CommandResult {
        id: u32,
        result: Result<Reply, CommandError>,
    },

    /// The request loop is up (carries the boot wake cause).
    Started(WakeCause),
}
