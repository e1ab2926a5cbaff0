//! Play/pause/stop/seek state machine for the single active track.
//!
//! Musical time is projected from the clock: while playing,
//! `elapsed = offset_at_anchor + (now - anchor) * rate`. Any change of rate
//! re-anchors at the current position, so the projection is exact across
//! any number of tempo changes.

use std::sync::Arc;

use crate::{
    AudioOutput, BeatScheduler, Clock, DecodedBuffer, Event, Result, TempoModel, Track,
    TrackOrigin,
};

pub mod progress;

pub use progress::{elapsed_musical_time, format_time, Progress};

/// Length of the visual flash emitted for each beat.
pub const BEAT_PULSE_MS: u32 = 80;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransportState {
    /// At offset zero.
    Stopped,
    Paused {
        offset: f64,
    },
    Playing {
        /// Clock time the current playing segment started.
        anchor: f64,
        offset_at_anchor: f64,
    },
}

/// The decoded track currently loaded into the transport.
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    name: String,
    origin: TrackOrigin,
    native_tempo_bpm: u32,
    buffer: Arc<DecodedBuffer>,
}

impl PlaybackSession {
    pub fn new(
        name: impl Into<String>,
        origin: TrackOrigin,
        native_tempo_bpm: u32,
        buffer: DecodedBuffer,
    ) -> Self {
        Self {
            name: name.into(),
            origin,
            native_tempo_bpm,
            buffer: Arc::new(buffer),
        }
    }

    pub fn from_track(track: &Track, buffer: DecodedBuffer) -> Self {
        Self::new(
            track.name.clone(),
            track.origin,
            track.native_tempo_bpm,
            buffer,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> TrackOrigin {
        self.origin
    }

    pub fn native_tempo_bpm(&self) -> u32 {
        self.native_tempo_bpm
    }

    pub fn duration_seconds(&self) -> f64 {
        self.buffer.duration_seconds()
    }
}

/// Owns the playback state, the tempo, the metronome and the audio output.
///
/// Nothing here starts a timer: the driver calls [`Transport::tick`] once per
/// display refresh and the transport tells it, through [`Transport::is_ticking`],
/// whether further ticks are wanted.
pub struct Transport<O: AudioOutput> {
    clock: Box<dyn Clock>,
    output: O,
    tempo: TempoModel,
    metronome: BeatScheduler,
    session: Option<PlaybackSession>,
    state: TransportState,
    ticking: bool,
    events: Vec<Event>,
}

impl<O: AudioOutput> Transport<O> {
    pub fn new(
        clock: Box<dyn Clock>,
        output: O,
        tempo: TempoModel,
        metronome: BeatScheduler,
    ) -> Self {
        Self {
            clock,
            output,
            tempo,
            metronome,
            session: None,
            state: TransportState::Stopped,
            ticking: false,
            events: Vec::new(),
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.state, TransportState::Playing { .. })
    }

    /// Whether the driver should keep delivering ticks.
    pub fn is_ticking(&self) -> bool {
        self.ticking
    }

    pub fn session(&self) -> Option<&PlaybackSession> {
        self.session.as_ref()
    }

    pub fn tempo(&self) -> &TempoModel {
        &self.tempo
    }

    pub fn metronome(&self) -> &BeatScheduler {
        &self.metronome
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut O {
        &mut self.output
    }

    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    /// Replaces the current session. The previous one is fully halted first.
    pub fn load(&mut self, session: PlaybackSession) -> Result<()> {
        self.unload()?;
        self.tempo.set_native_tempo(session.native_tempo_bpm);
        let duration = session.duration_seconds();
        tracing::info!(
            name = session.name(),
            origin = %session.origin,
            bpm = session.native_tempo_bpm,
            duration,
            "track loaded"
        );

        self.events.push(Event::TrackLoaded {
            name: session.name.clone(),
            origin: session.origin,
            native_bpm: session.native_tempo_bpm,
        });
        self.events.push(Event::DurationKnown { seconds: duration });
        self.events.push(Event::TempoChanged {
            bpm: self.tempo.current_bpm(),
            rate: self.tempo.playback_rate(),
        });
        self.events.push(Event::Progress(Progress::zero(duration)));
        self.session = Some(session);
        Ok(())
    }

    /// Halts audio and pending ticks, then drops the session.
    pub fn unload(&mut self) -> Result<()> {
        let was_playing = self.is_playing();
        self.halt()?;
        self.state = TransportState::Stopped;
        if was_playing {
            self.events.push(Event::PlayStateChanged { playing: false });
        }
        if let Some(session) = self.session.take() {
            tracing::info!(name = session.name(), "track unloaded");
            self.events.push(Event::TrackUnloaded);
        }
        Ok(())
    }

    /// Starts from the held offset. Without a loaded track this does nothing.
    pub fn play(&mut self) -> Result<()> {
        if self.is_playing() {
            return Ok(());
        }
        let Some(buffer) = self.session.as_ref().map(|session| session.buffer.clone()) else {
            tracing::debug!("play ignored, no track loaded");
            return Ok(());
        };

        let offset = self.elapsed(self.clock.now());
        self.start_at(buffer, offset)?;
        tracing::info!(offset, rate = self.tempo.playback_rate(), "playing");
        self.events.push(Event::PlayStateChanged { playing: true });
        Ok(())
    }

    /// Holds the current position. A track already past its end stops
    /// instead, as it would have on the next tick.
    pub fn pause(&mut self) -> Result<()> {
        if !self.is_playing() {
            return Ok(());
        }
        let offset = self.elapsed(self.clock.now());
        if offset >= self.duration() {
            return self.finish();
        }
        self.halt()?;
        self.state = TransportState::Paused { offset };
        tracing::info!(offset, "paused");
        let progress = Progress::at(offset, self.duration());
        self.events.push(Event::PlayStateChanged { playing: false });
        self.events.push(Event::Progress(progress));
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        let was_playing = self.is_playing();
        self.halt()?;
        self.state = TransportState::Stopped;
        if was_playing {
            tracing::info!("stopped");
            self.events.push(Event::PlayStateChanged { playing: false });
        }
        if self.session.is_some() {
            let progress = Progress::zero(self.duration());
            self.events.push(Event::Progress(progress));
        }
        Ok(())
    }

    /// Moves to `fraction` of the track. A playing transport restarts at the
    /// new offset; otherwise it holds the offset paused.
    pub fn seek(&mut self, fraction: f64) -> Result<()> {
        let Some(buffer) = self.session.as_ref().map(|session| session.buffer.clone()) else {
            return Ok(());
        };
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let offset = fraction * self.duration();
        tracing::info!(fraction, offset, "seek");

        if self.is_playing() {
            self.halt()?;
            self.start_at(buffer, offset)?;
        } else {
            self.state = TransportState::Paused { offset };
        }
        let progress = Progress::at(offset, self.duration());
        self.events.push(Event::Progress(progress));
        Ok(())
    }

    /// Sets the user tempo (clamped) and returns the applied BPM.
    pub fn set_tempo(&mut self, bpm: u32) -> Result<u32> {
        self.retime(|tempo| tempo.set_current_tempo(bpm))
    }

    pub fn reset_tempo(&mut self) -> Result<u32> {
        self.retime(TempoModel::reset_tempo)
    }

    pub fn set_metronome(&mut self, enabled: bool) {
        self.metronome.set_enabled(enabled);
        self.events.push(Event::MetronomeChanged { enabled });
    }

    pub fn toggle_metronome(&mut self) -> bool {
        let enabled = !self.metronome.is_enabled();
        self.set_metronome(enabled);
        enabled
    }

    /// Music volume in percent, `0..=100`.
    pub fn set_music_volume(&mut self, percent: u8) -> Result<()> {
        self.output.set_music_gain(percent_to_gain(percent))
    }

    /// Click volume in percent, `0..=100`.
    pub fn set_click_volume(&mut self, percent: u8) -> Result<()> {
        self.output.set_click_gain(percent_to_gain(percent))
    }

    /// One display-refresh worth of work: end-of-track check, a metronome
    /// scheduling pass, and release of due visual pulses.
    pub fn tick(&mut self) -> Result<()> {
        if !self.ticking {
            return Ok(());
        }
        self.poll_progress()?;
        if !self.ticking {
            return Ok(());
        }

        let now = self.clock.now();
        self.metronome.schedule(now, &self.tempo, &mut self.output)?;
        for beat in self.metronome.due_pulses(now) {
            self.events.push(Event::BeatPulse {
                index: beat.index,
                time_seconds: beat.time_seconds,
                duration_ms: BEAT_PULSE_MS,
            });
        }
        Ok(())
    }

    /// Stops future ticks. A playing transport is paused at its current
    /// position, so it never keeps sounding without a tick loop.
    pub fn cancel(&mut self) -> Result<()> {
        if self.is_playing() {
            self.pause()
        } else {
            self.stop_ticks();
            Ok(())
        }
    }

    /// Current position. Pure: never changes state.
    pub fn progress(&self) -> Progress {
        Progress::at(self.elapsed(self.clock.now()), self.duration())
    }

    /// Like [`Transport::progress`], but stops the transport once the end of
    /// the track has been reached and reports progress to the UI.
    pub fn poll_progress(&mut self) -> Result<Progress> {
        let now = self.clock.now();
        if self.is_playing() && self.elapsed(now) >= self.duration() {
            self.finish()?;
            return Ok(Progress::zero(self.duration()));
        }

        let progress = self.progress();
        if self.is_playing() {
            self.events.push(Event::Progress(progress));
        }
        Ok(progress)
    }

    fn finish(&mut self) -> Result<()> {
        tracing::info!("end of track");
        self.stop()?;
        self.events.push(Event::TrackEnded);
        Ok(())
    }

    fn start_at(&mut self, buffer: Arc<DecodedBuffer>, offset: f64) -> Result<()> {
        if self.output.is_suspended()? {
            self.output.resume()?;
        }
        let rate = self.tempo.playback_rate();
        self.output.start_music(buffer, offset, rate)?;

        let now = self.clock.now();
        self.state = TransportState::Playing {
            anchor: now,
            offset_at_anchor: offset,
        };
        self.metronome.start(now);
        self.ticking = true;
        self.metronome.schedule(now, &self.tempo, &mut self.output)?;
        Ok(())
    }

    /// Quiesces the output and the tick loop so a following start cannot
    /// double-schedule clicks or audio.
    fn halt(&mut self) -> Result<()> {
        self.stop_ticks();
        self.output.stop_music()?;
        self.output.cancel_clicks()
    }

    fn stop_ticks(&mut self) {
        self.ticking = false;
        self.metronome.cancel();
    }

    fn retime(&mut self, change: impl FnOnce(&mut TempoModel) -> u32) -> Result<u32> {
        let now = self.clock.now();
        let offset = self.elapsed(now);
        let bpm = change(&mut self.tempo);
        let rate = self.tempo.playback_rate();

        if self.is_playing() {
            self.state = TransportState::Playing {
                anchor: now,
                offset_at_anchor: offset,
            };
            self.output.set_music_rate(rate)?;
        }
        tracing::debug!(bpm, rate, "tempo changed");
        self.events.push(Event::TempoChanged { bpm, rate });
        Ok(bpm)
    }

    fn elapsed(&self, now: f64) -> f64 {
        elapsed_musical_time(&self.state, self.tempo.playback_rate(), now)
    }

    fn duration(&self) -> f64 {
        self.session
            .as_ref()
            .map(PlaybackSession::duration_seconds)
            .unwrap_or(0.0)
    }
}

fn percent_to_gain(percent: u8) -> f32 {
    percent.min(100) as f32 / 100.0
}

impl<O: AudioOutput + std::fmt::Debug> std::fmt::Debug for Transport<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("state", &self.state)
            .field("tempo", &self.tempo)
            .field("metronome", &self.metronome)
            .field("session", &self.session.as_ref().map(PlaybackSession::name))
            .field("ticking", &self.ticking)
            .field("output", &self.output)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClickSound, ManualClock, Mixer, MixerHandle};

    const EPS: f64 = 1e-9;

    fn transport() -> (Transport<MixerHandle>, ManualClock) {
        let clock = ManualClock::new();
        let output = MixerHandle::new(Mixer::new(48_000, 2, ClickSound::standard(48_000)));
        let transport = Transport::new(
            Box::new(clock.clone()),
            output,
            TempoModel::new(),
            BeatScheduler::default(),
        );
        (transport, clock)
    }

    fn loaded(native_bpm: u32, seconds: f64) -> (Transport<MixerHandle>, ManualClock) {
        let (mut transport, clock) = transport();
        let buffer = DecodedBuffer::silence(seconds, 8_000, 1).unwrap();
        transport
            .load(PlaybackSession::new("Groove", TrackOrigin::Preset(0), native_bpm, buffer))
            .unwrap();
        transport.drain_events();
        (transport, clock)
    }

    fn elapsed(transport: &Transport<MixerHandle>) -> f64 {
        transport.progress().elapsed_seconds
    }

    #[test]
    fn play_without_a_track_is_a_no_op() {
        let (mut transport, _clock) = transport();
        transport.play().unwrap();

        assert_eq!(transport.state(), TransportState::Stopped);
        assert!(!transport.is_ticking());
        assert!(transport.drain_events().is_empty());
    }

    #[test]
    fn play_resumes_a_suspended_output() {
        let (mut transport, _clock) = loaded(90, 10.0);
        assert!(transport.output().is_suspended().unwrap());

        transport.play().unwrap();
        assert!(!transport.output().is_suspended().unwrap());
        assert!(transport.is_ticking());
        assert_eq!(transport.output().music_rate().unwrap(), Some(1.0));
    }

    #[test]
    fn pause_twice_keeps_the_first_offset() {
        let (mut transport, clock) = loaded(90, 10.0);
        transport.play().unwrap();
        clock.advance(3.0);
        transport.pause().unwrap();
        clock.advance(2.0);
        transport.pause().unwrap();

        assert_eq!(transport.state(), TransportState::Paused { offset: 3.0 });
        assert!(!transport.is_ticking());
        assert!(transport.output().music_rate().unwrap().is_none());
    }

    #[test]
    fn resume_continues_from_the_paused_offset() {
        let (mut transport, clock) = loaded(90, 10.0);
        transport.play().unwrap();
        clock.advance(3.0);
        transport.pause().unwrap();
        clock.advance(7.0);
        transport.play().unwrap();

        assert_eq!(
            transport.state(),
            TransportState::Playing {
                anchor: 10.0,
                offset_at_anchor: 3.0
            }
        );
        assert!((transport.output().music_position().unwrap().unwrap() - 3.0).abs() < EPS);
        clock.advance(1.0);
        assert!((elapsed(&transport) - 4.0).abs() < EPS);
    }

    #[test]
    fn seek_while_paused_reports_the_requested_fraction() {
        let (mut transport, _clock) = loaded(90, 12.0);
        for fraction in [0.0, 0.37, 0.5, 1.0] {
            transport.seek(fraction).unwrap();
            assert!((transport.progress().fraction - fraction).abs() < EPS);
        }
        transport.seek(7.0).unwrap();
        assert_eq!(transport.progress().fraction, 1.0);
    }

    #[test]
    fn seek_while_playing_reanchors() {
        let (mut transport, clock) = loaded(90, 10.0);
        transport.play().unwrap();
        clock.advance(1.0);
        transport.seek(0.5).unwrap();

        assert_eq!(
            transport.state(),
            TransportState::Playing {
                anchor: 1.0,
                offset_at_anchor: 5.0
            }
        );
        assert!((transport.output().music_position().unwrap().unwrap() - 5.0).abs() < EPS);
    }

    #[test]
    fn stop_returns_to_zero() {
        let (mut transport, clock) = loaded(90, 10.0);
        transport.play().unwrap();
        clock.advance(4.0);
        transport.stop().unwrap();

        assert_eq!(transport.state(), TransportState::Stopped);
        assert_eq!(transport.progress().fraction, 0.0);
        let events = transport.drain_events();
        assert!(events.contains(&Event::PlayStateChanged { playing: false }));
        assert!(events.contains(&Event::Progress(Progress::zero(10.0))));
    }

    #[test]
    fn reaching_the_end_stops_once() {
        let (mut transport, clock) = loaded(90, 10.0);
        transport.play().unwrap();
        clock.advance(10.0);
        transport.tick().unwrap();
        transport.tick().unwrap();

        assert_eq!(transport.state(), TransportState::Stopped);
        assert!(!transport.is_ticking());
        let ended = transport
            .drain_events()
            .into_iter()
            .filter(|event| *event == Event::TrackEnded)
            .count();
        assert_eq!(ended, 1);
    }

    #[test]
    fn double_tempo_doubles_musical_time() {
        let (mut transport, clock) = loaded(90, 20.0);
        transport.set_tempo(180).unwrap();
        transport.play().unwrap();
        clock.advance(5.0);

        assert!((elapsed(&transport) - 10.0).abs() < EPS);
        assert_eq!(transport.output().music_rate().unwrap(), Some(2.0));
    }

    #[test]
    fn tempo_changes_while_playing_do_not_drift() {
        let (mut transport, clock) = loaded(100, 60.0);
        transport.play().unwrap();

        let mut expected = 0.0;
        for bpm in [200, 50, 150, 100, 300, 40] {
            clock.advance(1.0);
            expected += transport.tempo().playback_rate();
            transport.set_tempo(bpm).unwrap();
            assert!((elapsed(&transport) - expected).abs() < EPS);
        }
        clock.advance(2.0);
        expected += 2.0 * 0.4;
        assert!((elapsed(&transport) - expected).abs() < EPS);
        assert_eq!(transport.output().music_rate().unwrap(), Some(0.4));
    }

    #[test]
    fn reset_tempo_restores_native_rate() {
        let (mut transport, _clock) = loaded(95, 10.0);
        transport.set_tempo(150).unwrap();
        assert_eq!(transport.reset_tempo().unwrap(), 95);
        assert_eq!(transport.tempo().playback_rate(), 1.0);
    }

    #[test]
    fn ticks_emit_pulses_only_while_enabled() {
        let (mut transport, clock) = loaded(120, 10.0);
        transport.set_metronome(true);
        transport.play().unwrap();
        for _ in 0..65 {
            clock.advance(1.0 / 60.0);
            transport.tick().unwrap();
        }

        let pulses: Vec<u64> = transport
            .drain_events()
            .into_iter()
            .filter_map(|event| match event {
                Event::BeatPulse { index, .. } => Some(index),
                _ => None,
            })
            .collect();
        assert_eq!(pulses, vec![0, 1, 2]);
    }

    #[test]
    fn disabling_metronome_keeps_committed_clicks() {
        let (mut transport, clock) = loaded(120, 10.0);
        transport.set_metronome(true);
        transport.play().unwrap();
        clock.advance(0.45);
        transport.tick().unwrap();
        assert_eq!(transport.output().scheduled_clicks().unwrap(), vec![0.0, 0.5]);

        transport.set_metronome(false);
        clock.advance(0.5);
        transport.tick().unwrap();
        assert_eq!(transport.output().scheduled_clicks().unwrap(), vec![0.0, 0.5]);
    }

    #[test]
    fn unloading_cancels_audio_and_ticks() {
        let (mut transport, clock) = loaded(120, 10.0);
        transport.set_metronome(true);
        transport.play().unwrap();
        clock.advance(0.2);
        transport.tick().unwrap();
        transport.unload().unwrap();

        assert!(transport.session().is_none());
        assert!(!transport.is_ticking());
        assert!(transport.output().music_rate().unwrap().is_none());
        assert!(transport.output().scheduled_clicks().unwrap().is_empty());

        transport.drain_events();
        clock.advance(1.0);
        transport.tick().unwrap();
        assert!(transport.drain_events().is_empty());
    }

    #[test]
    fn cancel_while_playing_pauses_in_place() {
        let (mut transport, clock) = loaded(90, 10.0);
        transport.play().unwrap();
        clock.advance(2.0);
        transport.cancel().unwrap();

        assert_eq!(transport.state(), TransportState::Paused { offset: 2.0 });
        assert!(!transport.is_ticking());
        assert!(transport.output().music_rate().unwrap().is_none());

        transport.play().unwrap();
        clock.advance(30.0);
        transport.tick().unwrap();
        assert_eq!(transport.state(), TransportState::Stopped);
        assert!(transport.drain_events().contains(&Event::TrackEnded));
    }

    #[test]
    fn pausing_past_the_end_stops_the_track() {
        let (mut transport, clock) = loaded(90, 10.0);
        transport.play().unwrap();
        clock.advance(12.0);
        transport.pause().unwrap();

        assert_eq!(transport.state(), TransportState::Stopped);
        assert_eq!(transport.progress().elapsed_seconds, 0.0);
        let ended = transport
            .drain_events()
            .into_iter()
            .filter(|event| *event == Event::TrackEnded)
            .count();
        assert_eq!(ended, 1);
    }

    #[test]
    fn resuming_schedules_only_the_new_beat_grid() {
        let (mut transport, clock) = loaded(120, 10.0);
        transport.set_metronome(true);
        transport.play().unwrap();
        clock.advance(0.45);
        transport.tick().unwrap();
        assert_eq!(transport.output().scheduled_clicks().unwrap(), vec![0.0, 0.5]);

        transport.pause().unwrap();
        assert!(transport.output().scheduled_clicks().unwrap().is_empty());

        clock.advance(0.55);
        transport.play().unwrap();
        clock.advance(0.45);
        transport.tick().unwrap();
        assert_eq!(transport.output().scheduled_clicks().unwrap(), vec![1.0, 1.5]);
    }

    #[test]
    fn volume_percent_maps_to_gain() {
        let (mut transport, _clock) = transport();
        transport.set_music_volume(80).unwrap();
        transport.set_click_volume(250).unwrap();
        assert_eq!(transport.output().gains().unwrap(), (0.8, 1.0));
    }
}
