//! Track source: retrieves raw audio bytes and decodes them for playback.

use std::{
    io::{Cursor, ErrorKind},
    path::PathBuf,
};

use symphonia::core::{
    audio::SampleBuffer,
    codecs::{DecoderOptions, CODEC_TYPE_NULL},
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};

use crate::{config::LibraryConfig, DecodedBuffer, DrumProError, Result};

/// Retrieves the bytes of a preset asset by its catalog path.
pub trait AssetFetcher {
    fn fetch(&self, location: &str) -> Result<Vec<u8>>;
}

/// Reads preset assets from a directory on disk.
#[derive(Debug, Clone)]
pub struct FileFetcher {
    root: PathBuf,
}

impl FileFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AssetFetcher for FileFetcher {
    fn fetch(&self, location: &str) -> Result<Vec<u8>> {
        let path = self.root.join(location);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(DrumProError::AssetNotFound(path.display().to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Downloads preset assets with a blocking HTTP GET.
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    base_url: String,
    client: reqwest::blocking::Client,
}

#[cfg(feature = "http")]
impl HttpFetcher {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::blocking::Client::new(),
        }
    }
}

#[cfg(feature = "http")]
impl AssetFetcher for HttpFetcher {
    fn fetch(&self, location: &str) -> Result<Vec<u8>> {
        let url = format!("{}/{}", self.base_url, location.trim_start_matches('/'));
        let not_found = |reason: String| DrumProError::AssetNotFound(format!("{url}: {reason}"));
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|err| not_found(err.to_string()))?;
        if !response.status().is_success() {
            return Err(not_found(response.status().to_string()));
        }
        let bytes = response.bytes().map_err(|err| not_found(err.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Picks the fetcher described by the library configuration.
pub fn fetcher_from_config(config: &LibraryConfig) -> Box<dyn AssetFetcher> {
    #[cfg(feature = "http")]
    {
        if let Some(base_url) = &config.preset_base_url {
            return Box::new(HttpFetcher::new(base_url.clone()));
        }
    }
    #[cfg(not(feature = "http"))]
    {
        if config.preset_base_url.is_some() {
            tracing::warn!("preset_base_url needs the `http` feature; reading assets from disk");
        }
    }
    Box::new(FileFetcher::new(config.assets_root.clone()))
}

/// Decodes a complete audio file held in memory into interleaved `f32` PCM.
pub fn decode(bytes: &[u8]) -> Result<DecodedBuffer> {
    let source = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());
    let probed = symphonia::default::get_probe()
        .format(
            &Hint::new(),
            source,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(decode_error)?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|track| track.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DrumProError::Decode("no audio track found".to_string()))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut channels = track.codec_params.channels.map(|c| c.count() as u16);
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(decode_error)?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref err)) if err.kind() == ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(err) => return Err(decode_error(err)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(reason)) => {
                tracing::warn!(reason, "skipping undecodable packet");
                continue;
            }
            Err(err) => return Err(decode_error(err)),
        };
        let spec = *decoded.spec();
        sample_rate.get_or_insert(spec.rate);
        channels.get_or_insert(spec.channels.count() as u16);

        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    if samples.is_empty() {
        return Err(DrumProError::Decode("stream contains no audio frames".to_string()));
    }
    let buffer = DecodedBuffer::new(samples, sample_rate.unwrap_or(0), channels.unwrap_or(0))?;
    tracing::debug!(
        sample_rate = buffer.sample_rate(),
        channels = buffer.channels(),
        seconds = buffer.duration_seconds(),
        "decoded audio"
    );
    Ok(buffer)
}

fn decode_error(err: SymphoniaError) -> DrumProError {
    DrumProError::Decode(err.to_string())
}
