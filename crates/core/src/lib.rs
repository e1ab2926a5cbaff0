//! Core engine for the DrumPro practice tool.
//!
//! A single transport plays one backing track at a user-chosen tempo while a
//! look-ahead scheduler lays a metronome click over it. Each module owns a
//! distinct subsystem (clock, tempo, audio output, scheduling, transport,
//! track library) and the [`Controller`] ties them together behind the
//! command and event surface a UI talks to.

pub mod assets;
pub mod audio;
pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod event;
pub mod library;
pub mod tempo;
pub mod timeline;
pub mod transport;

pub use assets::{decode, fetcher_from_config, AssetFetcher, FileFetcher};
pub use audio::{AudioOutput, ClickSound, DecodedBuffer, Mixer, MixerHandle};
pub use clock::{Clock, FrameClock, ManualClock, SystemClock};
pub use config::{AppConfig, AudioConfig, LibraryConfig, MetronomeConfig, TempoConfig};
pub use controller::{Command, Controller};
pub use error::{DrumProError, Result};
pub use event::Event;
pub use library::{
    Preset, SqliteStore, StoredTrack, Track, TrackId, TrackOrigin, TrackStore, PRESETS,
};
pub use tempo::TempoModel;
pub use timeline::{BeatScheduler, ScheduledBeat, LOOKAHEAD_SECONDS};
pub use transport::{format_time, PlaybackSession, Progress, Transport, TransportState};
