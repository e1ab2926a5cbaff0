//! Command entry point for the UI. Owns the single [`Transport`], the track
//! library and the asset source; load and save failures end here and come
//! back to the UI as events.

use crate::{
    assets::{self, AssetFetcher},
    library::{self, StoredTrack, TrackId, TrackStore},
    AudioOutput, DrumProError, Event, PlaybackSession, Preset, Result, Track, TrackOrigin,
    Transport, PRESETS,
};

/// Requests the UI can make of the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play,
    Pause,
    Stop,
    /// Fraction of the track duration, `0.0..=1.0`.
    Seek(f64),
    SetTempo(u32),
    ResetTempo,
    ToggleMetronome,
    /// Percent, `0..=100`.
    SetMusicVolume(u8),
    /// Percent, `0..=100`.
    SetClickVolume(u8),
    SelectTrack(TrackOrigin),
    DeleteTrack(TrackId),
    ClearLibrary,
    UploadTrack {
        name: String,
        /// As typed by the user; validated on upload.
        bpm: String,
        bytes: Vec<u8>,
    },
}

pub struct Controller<O: AudioOutput> {
    transport: Transport<O>,
    store: Box<dyn TrackStore>,
    fetcher: Box<dyn AssetFetcher>,
    events: Vec<Event>,
}

impl<O: AudioOutput> Controller<O> {
    pub fn new(
        transport: Transport<O>,
        store: Box<dyn TrackStore>,
        fetcher: Box<dyn AssetFetcher>,
    ) -> Self {
        Self {
            transport,
            store,
            fetcher,
            events: Vec::new(),
        }
    }

    pub fn transport(&self) -> &Transport<O> {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut Transport<O> {
        &mut self.transport
    }

    pub fn presets(&self) -> &'static [Preset] {
        PRESETS
    }

    pub fn library(&self) -> Result<Vec<StoredTrack>> {
        self.store.list_all()
    }

    /// The track currently loaded, if any.
    pub fn selected(&self) -> Option<TrackOrigin> {
        self.transport.session().map(PlaybackSession::origin)
    }

    /// Applies one command. Errors returned here come from the audio output;
    /// load, save and library failures are reported as events instead.
    pub fn dispatch(&mut self, command: Command) -> Result<()> {
        tracing::debug!(?command, "dispatch");
        match command {
            Command::Play => self.transport.play()?,
            Command::Pause => self.transport.pause()?,
            Command::Stop => self.transport.stop()?,
            Command::Seek(fraction) => self.transport.seek(fraction)?,
            Command::SetTempo(bpm) => {
                self.transport.set_tempo(bpm)?;
            }
            Command::ResetTempo => {
                self.transport.reset_tempo()?;
            }
            Command::ToggleMetronome => {
                self.transport.toggle_metronome();
            }
            Command::SetMusicVolume(percent) => self.transport.set_music_volume(percent)?,
            Command::SetClickVolume(percent) => self.transport.set_click_volume(percent)?,
            Command::SelectTrack(origin) => self.select_track(origin)?,
            Command::DeleteTrack(id) => self.delete_track(id)?,
            Command::ClearLibrary => self.clear_library()?,
            Command::UploadTrack { name, bpm, bytes } => self.upload_track(&name, &bpm, &bytes),
        }
        self.collect();
        Ok(())
    }

    /// Display-refresh hook; see [`Transport::tick`].
    pub fn tick(&mut self) -> Result<()> {
        self.transport.tick()?;
        self.collect();
        Ok(())
    }

    pub fn is_ticking(&self) -> bool {
        self.transport.is_ticking()
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        self.collect();
        std::mem::take(&mut self.events)
    }

    /// Halts the current session before loading the new one, so the old
    /// session's audio and ticks are gone before any loading starts. On
    /// failure the engine is left unloaded.
    pub fn select_track(&mut self, origin: TrackOrigin) -> Result<()> {
        self.transport.unload()?;
        self.collect();

        let loaded = self.fetch_track(origin).and_then(|track| {
            let buffer = assets::decode(&track.audio_bytes)?;
            Ok(PlaybackSession::from_track(&track, buffer))
        });
        match loaded {
            Ok(session) => self.transport.load(session)?,
            Err(err) => {
                tracing::warn!(%origin, error = %err, "could not load track");
                self.emit(Event::LoadError {
                    message: err.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn upload_track(&mut self, name: &str, bpm: &str, bytes: &[u8]) {
        let saved = library::validate_upload(name, bpm, bytes)
            .and_then(|(name, bpm)| self.store.create(&name, bpm, bytes));
        match saved {
            Ok(id) => {
                self.emit(Event::SaveSucceeded { id });
                self.emit(Event::LibraryChanged);
            }
            Err(err) => {
                tracing::warn!(error = %err, "upload rejected");
                self.emit(Event::SaveFailed {
                    message: err.to_string(),
                });
            }
        }
    }

    /// Deleting the loaded track also stops and unloads it. A failed delete
    /// leaves playback untouched.
    pub fn delete_track(&mut self, id: TrackId) -> Result<()> {
        let deleted = self.store.delete_by_id(id);
        if deleted.is_ok() && self.selected() == Some(TrackOrigin::Stored(id)) {
            self.transport.unload()?;
        }
        self.report_library_change(deleted);
        Ok(())
    }

    pub fn clear_library(&mut self) -> Result<()> {
        let cleared = self.store.clear_all();
        if cleared.is_ok() && matches!(self.selected(), Some(TrackOrigin::Stored(_))) {
            self.transport.unload()?;
        }
        self.report_library_change(cleared);
        Ok(())
    }

    fn fetch_track(&self, origin: TrackOrigin) -> Result<Track> {
        match origin {
            TrackOrigin::Preset(index) => {
                let preset = library::preset(index).ok_or_else(|| {
                    DrumProError::AssetNotFound(format!("no preset at index {index}"))
                })?;
                Ok(Track {
                    name: preset.name.to_string(),
                    native_tempo_bpm: preset.bpm,
                    audio_bytes: self.fetcher.fetch(preset.path)?,
                    origin,
                })
            }
            TrackOrigin::Stored(id) => {
                let (entry, audio_bytes) = self.store.load(id)?;
                Ok(Track {
                    name: entry.name,
                    native_tempo_bpm: entry.bpm,
                    audio_bytes,
                    origin,
                })
            }
        }
    }

    fn report_library_change(&mut self, outcome: Result<()>) {
        match outcome {
            Ok(()) => self.emit(Event::LibraryChanged),
            Err(err) => {
                tracing::warn!(error = %err, "library update failed");
                self.emit(Event::LibraryError {
                    message: err.to_string(),
                });
            }
        }
    }

    fn emit(&mut self, event: Event) {
        self.collect();
        self.events.push(event);
    }

    /// Moves transport events into the controller queue, preserving order.
    fn collect(&mut self) {
        let events = self.transport.drain_events();
        self.events.extend(events);
    }
}

impl<O: AudioOutput + std::fmt::Debug> std::fmt::Debug for Controller<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("transport", &self.transport)
            .field("pending_events", &self.events.len())
            .finish()
    }
}
