use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::{clock::FrameClock, DrumProError, Result};

pub mod mixer;

pub use mixer::Mixer;

pub const CLICK_FREQUENCY_HZ: f32 = 1200.0;
pub const CLICK_DURATION_SECONDS: f32 = 0.08;
/// Gain the click envelope decays to by the end of the pulse.
const CLICK_FLOOR: f32 = 0.001;

/// Interleaved PCM produced by the decoder.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
}

impl DecodedBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Result<Self> {
        if sample_rate == 0 || channels == 0 {
            return Err(DrumProError::Decode(format!(
                "unsupported stream layout ({sample_rate} Hz, {channels} channels)"
            )));
        }
        if samples.len() % channels as usize != 0 {
            return Err(DrumProError::Decode(
                "sample count is not a multiple of the channel count".to_string(),
            ));
        }
        Ok(Self {
            samples,
            sample_rate,
            channels,
        })
    }

    /// Silent buffer of the requested length; handy for tests and previews.
    pub fn silence(seconds: f64, sample_rate: u32, channels: u16) -> Result<Self> {
        let frames = (seconds.max(0.0) * sample_rate as f64).round() as usize;
        Self::new(vec![0.0; frames * channels as usize], sample_rate, channels)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn duration_seconds(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Sample at `frame` for an output `channel`. Mono sources feed every
    /// channel; extra output channels reuse the last source channel.
    pub fn sample(&self, frame: usize, channel: usize) -> f32 {
        if frame >= self.frames() {
            return 0.0;
        }
        let channels = self.channels as usize;
        let channel = channel.min(channels - 1);
        self.samples[frame * channels + channel]
    }
}

/// Pre-rendered metronome pulse: a sine burst with an exponential decay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickSound {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl ClickSound {
    pub fn standard(sample_rate: u32) -> Self {
        Self::generate(sample_rate, CLICK_FREQUENCY_HZ, CLICK_DURATION_SECONDS)
    }

    pub fn generate(sample_rate: u32, frequency_hz: f32, duration_seconds: f32) -> Self {
        let len = (sample_rate as f32 * duration_seconds.max(0.0)).round() as usize;
        let mut samples = Vec::with_capacity(len);
        for i in 0..len {
            let t = i as f32 / sample_rate as f32;
            let envelope = CLICK_FLOOR.powf(t / duration_seconds);
            samples.push((t * frequency_hz * std::f32::consts::TAU).sin() * envelope);
        }
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// The audio hardware as seen by the transport.
///
/// Times are seconds on the output's own timeline, which is the timeline the
/// engine's [`Clock`](crate::Clock) must report.
pub trait AudioOutput {
    fn is_suspended(&self) -> Result<bool>;
    fn resume(&mut self) -> Result<()>;
    /// Starts the single music voice at `offset_seconds` into `buffer`,
    /// replacing any voice that is still sounding.
    fn start_music(&mut self, buffer: Arc<DecodedBuffer>, offset_seconds: f64, rate: f64)
        -> Result<()>;
    fn set_music_rate(&mut self, rate: f64) -> Result<()>;
    fn stop_music(&mut self) -> Result<()>;
    /// Commits a click to start exactly at `at_seconds`.
    fn schedule_click(&mut self, at_seconds: f64) -> Result<()>;
    /// Drops clicks that have not started sounding yet.
    fn cancel_clicks(&mut self) -> Result<()>;
    fn set_music_gain(&mut self, gain: f32) -> Result<()>;
    fn set_click_gain(&mut self, gain: f32) -> Result<()>;
}

/// Shared, thread-safe handle over a [`Mixer`]. One clone is handed to the
/// transport, another to whatever pulls rendered frames (a device callback or
/// an offline renderer).
#[derive(Clone)]
pub struct MixerHandle {
    shared: Arc<Mutex<Mixer>>,
    clock: FrameClock,
    sample_rate: u32,
    channels: u16,
}

impl MixerHandle {
    pub fn new(mixer: Mixer) -> Self {
        let clock = mixer.clock();
        let sample_rate = mixer.sample_rate();
        let channels = mixer.channels();
        Self {
            shared: Arc::new(Mutex::new(mixer)),
            clock,
            sample_rate,
            channels,
        }
    }

    /// Clock that follows the frames this mixer has rendered.
    pub fn clock(&self) -> FrameClock {
        self.clock.clone()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Fills an interleaved output block.
    pub fn render(&self, out: &mut [f32]) -> Result<()> {
        self.lock()?.render(out);
        Ok(())
    }

    pub fn suspend(&self) -> Result<()> {
        self.lock()?.set_suspended(true);
        Ok(())
    }

    /// Start times, in seconds, of clicks that are committed but not yet sounding.
    pub fn scheduled_clicks(&self) -> Result<Vec<f64>> {
        Ok(self.lock()?.scheduled_clicks())
    }

    pub fn music_rate(&self) -> Result<Option<f64>> {
        Ok(self.lock()?.music_rate())
    }

    pub fn music_position(&self) -> Result<Option<f64>> {
        Ok(self.lock()?.music_position())
    }

    pub fn gains(&self) -> Result<(f32, f32)> {
        let mixer = self.lock()?;
        Ok((mixer.music_gain(), mixer.click_gain()))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Mixer>> {
        self.shared
            .lock()
            .map_err(|_| DrumProError::Audio("mixer has been poisoned".to_string()))
    }
}

impl AudioOutput for MixerHandle {
    fn is_suspended(&self) -> Result<bool> {
        Ok(self.lock()?.is_suspended())
    }

    fn resume(&mut self) -> Result<()> {
        self.lock()?.set_suspended(false);
        Ok(())
    }

    fn start_music(
        &mut self,
        buffer: Arc<DecodedBuffer>,
        offset_seconds: f64,
        rate: f64,
    ) -> Result<()> {
        self.lock()?.start_music(buffer, offset_seconds, rate);
        Ok(())
    }

    fn set_music_rate(&mut self, rate: f64) -> Result<()> {
        self.lock()?.set_music_rate(rate);
        Ok(())
    }

    fn stop_music(&mut self) -> Result<()> {
        self.lock()?.stop_music();
        Ok(())
    }

    fn schedule_click(&mut self, at_seconds: f64) -> Result<()> {
        self.lock()?.schedule_click(at_seconds);
        Ok(())
    }

    fn cancel_clicks(&mut self) -> Result<()> {
        self.lock()?.cancel_clicks();
        Ok(())
    }

    fn set_music_gain(&mut self, gain: f32) -> Result<()> {
        self.lock()?.set_music_gain(gain);
        Ok(())
    }

    fn set_click_gain(&mut self, gain: f32) -> Result<()> {
        self.lock()?.set_click_gain(gain);
        Ok(())
    }
}

impl std::fmt::Debug for MixerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MixerHandle")
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .finish()
    }
}
