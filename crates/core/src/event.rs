use serde::Serialize;

use crate::{library::TrackId, transport::Progress, TrackOrigin};

/// Notification for the UI. The engine queues these and the UI drains them;
/// nothing in the core knows how they are rendered.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    TrackLoaded {
        name: String,
        origin: TrackOrigin,
        native_bpm: u32,
    },
    TrackUnloaded,
    DurationKnown {
        seconds: f64,
    },
    Progress(Progress),
    /// Visual metronome flash for a beat whose time has arrived.
    BeatPulse {
        index: u64,
        time_seconds: f64,
        duration_ms: u32,
    },
    PlayStateChanged {
        playing: bool,
    },
    TrackEnded,
    TempoChanged {
        bpm: u32,
        rate: f64,
    },
    MetronomeChanged {
        enabled: bool,
    },
    LoadError {
        message: String,
    },
    SaveSucceeded {
        id: TrackId,
    },
    /// The upload was rejected or not stored; the form may be resubmitted.
    SaveFailed {
        message: String,
    },
    LibraryChanged,
    LibraryError {
        message: String,
    },
}
