use std::io::Cursor;

use drumpro_core::{
    BeatScheduler, ClickSound, Command, Controller, Event, FileFetcher, ManualClock, Mixer,
    MixerHandle, SqliteStore, TempoModel, TrackOrigin, Transport, TransportState,
};

const EPS: f64 = 1e-6;
const TICK: f64 = 1.0 / 60.0;

fn wav_bytes(seconds: u32, sample_rate: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..seconds * sample_rate {
            writer.write_sample(((i % 64) as i16 - 32) * 100).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

struct Harness {
    controller: Controller<MixerHandle>,
    clock: ManualClock,
    _assets: tempfile::TempDir,
}

impl Harness {
    /// Preset assets are written under a temporary asset root; `Pagode Anos 90`
    /// (index 6, 90 BPM) lasts 10 seconds and `Rock` (index 9) 20 seconds.
    fn new() -> Self {
        let assets = tempfile::tempdir().unwrap();
        let sounds = assets.path().join("sounds");
        std::fs::create_dir_all(&sounds).unwrap();
        std::fs::write(sounds.join("pagode90.mp3"), wav_bytes(10, 8_000)).unwrap();
        std::fs::write(sounds.join("rock140.mp3"), wav_bytes(20, 8_000)).unwrap();

        let clock = ManualClock::new();
        let output = MixerHandle::new(Mixer::new(48_000, 2, ClickSound::standard(48_000)));
        let transport = Transport::new(
            Box::new(clock.clone()),
            output,
            TempoModel::new(),
            BeatScheduler::default(),
        );
        let controller = Controller::new(
            transport,
            Box::new(SqliteStore::in_memory().unwrap()),
            Box::new(FileFetcher::new(assets.path())),
        );
        Self {
            controller,
            clock,
            _assets: assets,
        }
    }

    fn run(&mut self, command: Command) {
        self.controller.dispatch(command).unwrap();
    }

    /// Advances the clock in display-refresh steps, ticking after each one.
    fn play_for(&mut self, seconds: f64) {
        let steps = (seconds / TICK).round() as usize;
        for _ in 0..steps {
            self.clock.advance(TICK);
            self.controller.tick().unwrap();
        }
    }

    fn elapsed(&self) -> f64 {
        self.controller.transport().progress().elapsed_seconds
    }
}

#[test]
fn track_stops_at_its_end() {
    let mut harness = Harness::new();
    harness.run(Command::SelectTrack(TrackOrigin::Preset(6)));
    let session = harness.controller.transport().session().unwrap();
    assert_eq!(session.native_tempo_bpm(), 90);
    assert!((session.duration_seconds() - 10.0).abs() < EPS);

    harness.run(Command::Play);
    harness.play_for(10.1);

    assert_eq!(harness.controller.transport().state(), TransportState::Stopped);
    assert_eq!(harness.elapsed(), 0.0);
    assert!(!harness.controller.is_ticking());
    assert!(harness.controller.drain_events().contains(&Event::TrackEnded));
}

#[test]
fn double_tempo_plays_twice_as_much_music() {
    let mut harness = Harness::new();
    harness.run(Command::SelectTrack(TrackOrigin::Preset(9)));
    harness.run(Command::SetTempo(280));
    assert_eq!(harness.controller.transport().tempo().playback_rate(), 2.0);

    harness.run(Command::Play);
    harness.play_for(5.0);

    assert!((harness.elapsed() - 10.0).abs() < 1e-3);
}

#[test]
fn resume_continues_from_the_pause_point() {
    let mut harness = Harness::new();
    harness.run(Command::SelectTrack(TrackOrigin::Preset(6)));
    harness.run(Command::Play);
    harness.clock.advance(3.0);
    harness.run(Command::Pause);
    assert!((harness.elapsed() - 3.0).abs() < EPS);

    harness.clock.advance(30.0);
    harness.run(Command::Play);
    assert!((harness.elapsed() - 3.0).abs() < EPS);

    harness.play_for(1.0);
    assert!((harness.elapsed() - 4.0).abs() < 1e-3);
}

#[test]
fn deleting_the_playing_track_stops_it() {
    let mut harness = Harness::new();
    harness.run(Command::UploadTrack {
        name: "Shuffle".to_string(),
        bpm: "96".to_string(),
        bytes: wav_bytes(8, 8_000),
    });
    let id = harness.controller.library().unwrap()[0].id;

    harness.run(Command::SelectTrack(TrackOrigin::Stored(id)));
    harness.run(Command::Play);
    harness.play_for(1.0);
    assert!(harness.controller.transport().is_playing());

    harness.run(Command::DeleteTrack(id));

    assert_eq!(harness.controller.transport().state(), TransportState::Stopped);
    assert!(harness.controller.transport().session().is_none());
    assert!(!harness.controller.is_ticking());
    assert!(harness.controller.library().unwrap().is_empty());
    let events = harness.controller.drain_events();
    assert!(events.contains(&Event::TrackUnloaded));
    assert_eq!(events.last(), Some(&Event::LibraryChanged));
}

#[test]
fn enabling_the_metronome_mid_playback_never_clicks_retroactively() {
    let mut harness = Harness::new();
    // Rock at 140 BPM, slowed to 120 for a half-second beat grid.
    harness.run(Command::SelectTrack(TrackOrigin::Preset(9)));
    harness.run(Command::SetTempo(120));
    harness.run(Command::Play);
    harness.play_for(1.05);
    assert!(harness
        .controller
        .transport()
        .output()
        .scheduled_clicks()
        .unwrap()
        .is_empty());

    harness.run(Command::ToggleMetronome);
    harness.play_for(1.0);

    let clicks = harness
        .controller
        .transport()
        .output()
        .scheduled_clicks()
        .unwrap();
    assert!(!clicks.is_empty());
    assert!((clicks[0] - 1.5).abs() < 1e-3);
    assert!(clicks.iter().all(|&at| at > 1.05));

    let pulses: Vec<f64> = harness
        .controller
        .drain_events()
        .into_iter()
        .filter_map(|event| match event {
            Event::BeatPulse { time_seconds, .. } => Some(time_seconds),
            _ => None,
        })
        .collect();
    assert!(!pulses.is_empty());
    assert!(pulses.iter().all(|&at| at > 1.05));
}

#[test]
fn switching_tracks_leaves_nothing_of_the_old_session() {
    let mut harness = Harness::new();
    harness.run(Command::ToggleMetronome);
    harness.run(Command::SelectTrack(TrackOrigin::Preset(6)));
    harness.run(Command::Play);
    harness.run(Command::Seek(0.5));
    harness.play_for(0.6);
    harness.controller.drain_events();

    let switched_at = harness.controller.transport().now();
    harness.run(Command::SelectTrack(TrackOrigin::Preset(9)));
    harness.run(Command::Play);
    harness.play_for(0.6);

    let events = harness.controller.drain_events();
    let unloaded = events
        .iter()
        .position(|event| *event == Event::TrackUnloaded)
        .unwrap();
    let loaded = events
        .iter()
        .position(|event| matches!(event, Event::TrackLoaded { .. }))
        .unwrap();
    assert!(unloaded < loaded);
    assert!(!events[unloaded..loaded]
        .iter()
        .any(|event| matches!(event, Event::BeatPulse { .. } | Event::Progress(_))));
    for event in &events {
        if let Event::BeatPulse { time_seconds, .. } = event {
            assert!(*time_seconds >= switched_at);
        }
    }

    let output = harness.controller.transport().output();
    assert!(output.music_rate().unwrap().is_some());
    assert_eq!(output.music_position().unwrap(), Some(0.0));
    let clicks = output.scheduled_clicks().unwrap();
    assert!(!clicks.is_empty());
    assert!(clicks.iter().all(|&at| at >= switched_at - 1e-6));
}
