use std::{
    io::BufRead,
    path::{Path, PathBuf},
    sync::mpsc,
};

use clap::{Parser, Subcommand};
use drumpro_core::{
    fetcher_from_config, format_time, AppConfig, Clock, Command, Controller, DrumProError, Event,
    Mixer, MixerHandle, SqliteStore, TrackOrigin, TrackStore, Transport, TransportState, PRESETS,
};
use tracing_subscriber::EnvFilter;

mod input;
mod output;

use input::Input;

fn main() -> drumpro_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = cli.load_config()?;

    match cli.command {
        Commands::Presets => run_presets(),
        Commands::Library { action } => run_library(&config, action),
        Commands::Play {
            track,
            bpm,
            metronome,
        } => run_play(&config, track, bpm, metronome),
        Commands::Render {
            track,
            output,
            bpm,
            metronome,
            seconds,
        } => run_render(&config, track, &output, bpm, metronome, seconds),
    }
}

fn run_presets() -> drumpro_core::Result<()> {
    for (index, preset) in PRESETS.iter().enumerate() {
        println!("preset:{index:<3} {:>3} BPM  {}", preset.bpm, preset.name);
    }
    Ok(())
}

fn run_library(config: &AppConfig, action: LibraryAction) -> drumpro_core::Result<()> {
    let mut store = SqliteStore::open(&config.library.database_path)?;
    match action {
        LibraryAction::List => {
            let tracks = store.list_all()?;
            if tracks.is_empty() {
                println!("library is empty");
            }
            for track in tracks {
                println!(
                    "track:{:<4} {:>3} BPM  {}  (added {})",
                    track.id, track.bpm, track.name, track.created_at
                );
            }
        }
        LibraryAction::Add { file, bpm, name } => {
            let name: Vec<&str> = name.as_deref().into_iter().collect();
            let (name, bytes) = input::read_upload(&file.to_string_lossy(), &name)?;
            let (name, bpm) = drumpro_core::library::validate_upload(&name, &bpm, &bytes)?;
            let id = store.create(&name, bpm, &bytes)?;
            println!("added track:{id}");
        }
        LibraryAction::Delete { id } => {
            store.delete_by_id(id)?;
            println!("deleted track:{id}");
        }
        LibraryAction::Clear => {
            store.clear_all()?;
            println!("library cleared");
        }
    }
    Ok(())
}

fn build_controller(
    config: &AppConfig,
    output: MixerHandle,
    clock: Box<dyn Clock>,
) -> drumpro_core::Result<Controller<MixerHandle>> {
    let transport = Transport::new(
        clock,
        output,
        config.tempo.model(),
        config.metronome.scheduler(),
    );
    let store = SqliteStore::open(&config.library.database_path)?;
    Ok(Controller::new(
        transport,
        Box::new(store),
        fetcher_from_config(&config.library),
    ))
}

/// Selects `track` and applies the start-up options. Fails if the track did
/// not load.
fn prepare(
    controller: &mut Controller<MixerHandle>,
    track: TrackOrigin,
    bpm: Option<u32>,
    metronome: bool,
) -> drumpro_core::Result<()> {
    controller.dispatch(Command::SelectTrack(track))?;
    for event in controller.drain_events() {
        if let Event::LoadError { message } = event {
            return Err(DrumProError::msg(message));
        }
        report(&event);
    }
    if let Some(bpm) = bpm {
        controller.dispatch(Command::SetTempo(bpm))?;
    }
    if metronome {
        controller.transport_mut().set_metronome(true);
    }
    Ok(())
}

fn run_play(
    config: &AppConfig,
    track: TrackOrigin,
    bpm: Option<u32>,
    metronome: bool,
) -> drumpro_core::Result<()> {
    let (output, _sink) = output::open(config)?;
    let clock = Box::new(output.clock());
    let mut controller = build_controller(config, output, clock)?;
    prepare(&mut controller, track, bpm, metronome)?;
    controller.dispatch(Command::Play)?;
    println!("{}", input::HELP);

    let (lines_tx, lines) = mpsc::channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if lines_tx.send(line).is_err() {
                break;
            }
        }
    });

    // Without stdin the session runs until the track ends.
    let interval = config.tick_interval();
    let mut interactive = true;
    'session: loop {
        while interactive {
            let line = match lines.try_recv() {
                Ok(line) => line,
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => {
                    interactive = false;
                    break;
                }
            };
            match input::parse(&line) {
                Ok(Some(Input::Command(command))) => controller.dispatch(command)?,
                Ok(Some(Input::Status)) => print_status(&controller),
                Ok(Some(Input::Help)) => println!("{}", input::HELP),
                Ok(Some(Input::Quit)) => break 'session,
                Ok(None) => {}
                Err(err) => eprintln!("{err}"),
            }
        }

        controller.tick()?;
        for event in controller.drain_events() {
            report(&event);
        }
        if !interactive && !controller.is_ticking() {
            break;
        }
        std::thread::sleep(interval);
    }

    controller.dispatch(Command::Stop)?;
    tracing::info!("session closed");
    Ok(())
}

/// Plays `track` against a frame-counting clock as fast as it renders and
/// writes the mix to a 32-bit float WAV file.
fn run_render(
    config: &AppConfig,
    track: TrackOrigin,
    path: &Path,
    bpm: Option<u32>,
    metronome: bool,
    seconds: Option<f64>,
) -> drumpro_core::Result<()> {
    let audio = &config.audio;
    let output = MixerHandle::new(Mixer::new(
        audio.sample_rate,
        audio.channels,
        config.metronome.click_sound(audio.sample_rate),
    ));
    let renderer = output.clone();
    let clock = output.clock();
    let mut controller = build_controller(config, output, Box::new(clock.clone()))?;
    prepare(&mut controller, track, bpm, metronome)?;
    controller.dispatch(Command::Play)?;

    let spec = hound::WavSpec {
        channels: audio.channels,
        sample_rate: audio.sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec).map_err(wav_error)?;
    let limit = seconds.unwrap_or(f64::INFINITY);
    let mut block = vec![0.0_f32; audio.block_size.max(1) * audio.channels as usize];
    tracing::info!(?path, "rendering");

    while controller.is_ticking() && clock.now() < limit {
        renderer.render(&mut block)?;
        for &sample in &block {
            writer.write_sample(sample).map_err(wav_error)?;
        }
        controller.tick()?;
        controller.drain_events();
    }
    writer.finalize().map_err(wav_error)?;
    println!("wrote {} of audio to {}", format_time(clock.now()), path.display());
    Ok(())
}

fn wav_error(err: hound::Error) -> DrumProError {
    DrumProError::msg(format!("could not write WAV output: {err}"))
}

fn print_status(controller: &Controller<MixerHandle>) {
    let transport = controller.transport();
    let Some(session) = transport.session() else {
        println!("no track loaded");
        return;
    };
    let tempo = transport.tempo();
    println!(
        "{} [{}] {} at {} BPM (native {}), metronome {}",
        session.name(),
        match transport.state() {
            TransportState::Playing { .. } => "playing",
            TransportState::Paused { .. } => "paused",
            TransportState::Stopped => "stopped",
        },
        transport.progress().label(),
        tempo.current_bpm(),
        tempo.native_bpm(),
        if transport.metronome().is_enabled() { "on" } else { "off" },
    );
}

fn report(event: &Event) {
    match event {
        Event::TrackLoaded {
            name, native_bpm, ..
        } => println!("loaded {name} ({native_bpm} BPM)"),
        Event::TrackUnloaded => println!("unloaded"),
        Event::PlayStateChanged { playing } => {
            println!("{}", if *playing { "playing" } else { "stopped" })
        }
        Event::TrackEnded => println!("end of track"),
        Event::TempoChanged { bpm, rate } => println!("tempo {bpm} BPM (x{rate:.2})"),
        Event::MetronomeChanged { enabled } => {
            println!("metronome {}", if *enabled { "on" } else { "off" })
        }
        Event::BeatPulse { index, .. } => tracing::trace!(index, "beat"),
        Event::LoadError { message } => eprintln!("could not load track: {message}"),
        Event::SaveSucceeded { id } => println!("saved track:{id}"),
        Event::SaveFailed { message } => eprintln!("could not save track: {message}"),
        Event::LibraryChanged => println!("library updated"),
        Event::LibraryError { message } => eprintln!("library error: {message}"),
        Event::Progress(_) | Event::DurationKnown { .. } => {}
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Drum practice player with tempo control and metronome",
    long_about = None
)]
struct Cli {
    /// JSON configuration file; missing fields take their defaults.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Overrides the track library database location.
    #[arg(long, global = true)]
    database: Option<PathBuf>,
    /// Overrides the directory preset assets are read from.
    #[arg(long, global = true)]
    assets: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn load_config(&self) -> drumpro_core::Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::load(path)?,
            None => AppConfig::default(),
        };
        if let Some(database) = &self.database {
            config.library.database_path = database.clone();
        }
        if let Some(assets) = &self.assets {
            config.library.assets_root = assets.clone();
        }
        Ok(config)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the built-in rhythms.
    Presets,
    /// Manage uploaded tracks.
    Library {
        #[command(subcommand)]
        action: LibraryAction,
    },
    /// Play a track in real time, reading commands from stdin.
    Play {
        /// `preset:N` or `track:ID`.
        #[arg(value_parser = input::track_reference)]
        track: TrackOrigin,
        /// Starting tempo; defaults to the track's native tempo.
        #[arg(long)]
        bpm: Option<u32>,
        /// Start with the metronome on.
        #[arg(short, long)]
        metronome: bool,
    },
    /// Render a track, with tempo and metronome applied, to a WAV file.
    Render {
        /// `preset:N` or `track:ID`.
        #[arg(value_parser = input::track_reference)]
        track: TrackOrigin,
        output: PathBuf,
        #[arg(long)]
        bpm: Option<u32>,
        #[arg(short, long)]
        metronome: bool,
        /// Stop after this many seconds of output.
        #[arg(long)]
        seconds: Option<f64>,
    },
}

#[derive(Subcommand, Debug)]
enum LibraryAction {
    List,
    /// Store an audio file with its native tempo.
    Add {
        file: PathBuf,
        bpm: String,
        #[arg(long)]
        name: Option<String>,
    },
    Delete {
        id: i64,
    },
    Clear,
}
