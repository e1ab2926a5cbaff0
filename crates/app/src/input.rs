//! Line commands read from stdin while playing.

use drumpro_core::{Command, DrumProError, Result, TrackOrigin};

pub const HELP: &str = "\
commands:
  play | pause | stop
  seek <0-100>            jump to a percentage of the track
  tempo <bpm> | reset     change or restore the tempo
  metronome               toggle the click
  volume <music|click> <0-100>
  select <preset:N|track:ID>
  upload <path> <bpm> [name]
  delete <id> | clear
  status | help | quit";

#[derive(Debug, PartialEq)]
pub enum Input {
    Command(Command),
    Status,
    Help,
    Quit,
}

/// Parses one line. Blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<Input>> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let input = match (verb, args.as_slice()) {
        ("play", []) => Input::Command(Command::Play),
        ("pause", []) => Input::Command(Command::Pause),
        ("stop", []) => Input::Command(Command::Stop),
        ("seek", [percent]) => {
            Input::Command(Command::Seek(number::<f64>(percent, "percentage")? / 100.0))
        }
        ("tempo", [bpm]) => Input::Command(Command::SetTempo(number(bpm, "BPM")?)),
        ("reset", []) => Input::Command(Command::ResetTempo),
        ("metronome", []) => Input::Command(Command::ToggleMetronome),
        ("volume", ["music", percent]) => {
            Input::Command(Command::SetMusicVolume(number(percent, "volume")?))
        }
        ("volume", ["click", percent]) => {
            Input::Command(Command::SetClickVolume(number(percent, "volume")?))
        }
        ("select", [reference]) => Input::Command(Command::SelectTrack(reference.parse()?)),
        ("upload", [path, bpm, name @ ..]) => Input::Command(upload(path, bpm, name)?),
        ("delete", [id]) => Input::Command(Command::DeleteTrack(number(id, "track id")?)),
        ("clear", []) => Input::Command(Command::ClearLibrary),
        ("status", []) => Input::Status,
        ("help", []) => Input::Help,
        ("quit" | "exit", []) => Input::Quit,
        _ => {
            return Err(DrumProError::validation(format!(
                "unrecognised command `{}`",
                line.trim()
            )))
        }
    };
    Ok(Some(input))
}

/// Builds an upload from a file on disk.
pub fn upload(path: &str, bpm: &str, name: &[&str]) -> Result<Command> {
    let (name, bytes) = read_upload(path, name)?;
    Ok(Command::UploadTrack {
        name,
        bpm: bpm.to_string(),
        bytes,
    })
}

/// Reads an audio file for upload. The name defaults to the file stem.
pub fn read_upload(path: &str, name: &[&str]) -> Result<(String, Vec<u8>)> {
    let bytes = std::fs::read(path)?;
    let name = if name.is_empty() {
        std::path::Path::new(path)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    } else {
        name.join(" ")
    };
    Ok((name, bytes))
}

fn number<T: std::str::FromStr>(text: &str, what: &str) -> Result<T> {
    text.parse()
        .map_err(|_| DrumProError::validation(format!("`{text}` is not a valid {what}")))
}

/// Parses a `preset:N` or `track:ID` reference given on the command line.
pub fn track_reference(text: &str) -> std::result::Result<TrackOrigin, String> {
    text.parse().map_err(|err: DrumProError| err.to_string())
}
