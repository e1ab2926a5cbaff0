use std::{
    collections::VecDeque,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use super::{ClickSound, DecodedBuffer};
use crate::clock::FrameClock;

/// Software renderer for one music voice plus metronome clicks.
///
/// The music voice is resampled by linear interpolation, so changing its rate
/// changes pitch along with speed. Clicks start on the exact frame they were
/// scheduled for regardless of block boundaries.
pub struct Mixer {
    sample_rate: u32,
    channels: u16,
    frames: Arc<AtomicU64>,
    suspended: bool,
    voice: Option<Voice>,
    /// Start frames of committed clicks, ascending.
    pending_clicks: VecDeque<u64>,
    /// Read positions into `click_sound` for clicks currently sounding.
    sounding_clicks: Vec<usize>,
    click_sound: ClickSound,
    music_gain: f32,
    click_gain: f32,
}

struct Voice {
    buffer: Arc<DecodedBuffer>,
    /// Read position in source frames.
    position: f64,
    rate: f64,
}

impl Voice {
    fn step(&self, output_rate: u32) -> f64 {
        self.rate * self.buffer.sample_rate() as f64 / output_rate as f64
    }

    fn sample(&self, channel: usize) -> f32 {
        let index = self.position.floor();
        let frac = (self.position - index) as f32;
        let index = index as usize;
        let a = self.buffer.sample(index, channel);
        let b = self.buffer.sample(index + 1, channel);
        a + (b - a) * frac
    }

    fn finished(&self) -> bool {
        self.position >= self.buffer.frames() as f64
    }
}

impl Mixer {
    /// Creates a suspended mixer at unity gain.
    pub fn new(sample_rate: u32, channels: u16, click_sound: ClickSound) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            channels: channels.max(1),
            frames: Arc::new(AtomicU64::new(0)),
            suspended: true,
            voice: None,
            pending_clicks: VecDeque::new(),
            sounding_clicks: Vec::new(),
            click_sound,
            music_gain: 1.0,
            click_gain: 1.0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn clock(&self) -> FrameClock {
        FrameClock::new(self.frames.clone(), self.sample_rate)
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn set_suspended(&mut self, suspended: bool) {
        self.suspended = suspended;
    }

    pub fn start_music(&mut self, buffer: Arc<DecodedBuffer>, offset_seconds: f64, rate: f64) {
        let position = offset_seconds.max(0.0) * buffer.sample_rate() as f64;
        self.voice = Some(Voice {
            buffer,
            position,
            rate: rate.max(f64::MIN_POSITIVE),
        });
    }

    pub fn set_music_rate(&mut self, rate: f64) {
        if let Some(voice) = self.voice.as_mut() {
            voice.rate = rate.max(f64::MIN_POSITIVE);
        }
    }

    pub fn stop_music(&mut self) {
        self.voice = None;
    }

    pub fn music_rate(&self) -> Option<f64> {
        self.voice.as_ref().map(|voice| voice.rate)
    }

    /// Position of the music voice in seconds of source material.
    pub fn music_position(&self) -> Option<f64> {
        self.voice
            .as_ref()
            .map(|voice| voice.position / voice.buffer.sample_rate() as f64)
    }

    pub fn schedule_click(&mut self, at_seconds: f64) {
        let frame = (at_seconds.max(0.0) * self.sample_rate as f64).round() as u64;
        let index = self.pending_clicks.partition_point(|&pending| pending <= frame);
        self.pending_clicks.insert(index, frame);
    }

    pub fn cancel_clicks(&mut self) {
        self.pending_clicks.clear();
    }

    pub fn scheduled_clicks(&self) -> Vec<f64> {
        self.pending_clicks
            .iter()
            .map(|&frame| frame as f64 / self.sample_rate as f64)
            .collect()
    }

    pub fn music_gain(&self) -> f32 {
        self.music_gain
    }

    pub fn click_gain(&self) -> f32 {
        self.click_gain
    }

    pub fn set_music_gain(&mut self, gain: f32) {
        self.music_gain = gain.clamp(0.0, 1.0);
    }

    pub fn set_click_gain(&mut self, gain: f32) {
        self.click_gain = gain.clamp(0.0, 1.0);
    }

    /// Renders interleaved frames into `out` and advances the mixer clock.
    /// A suspended mixer writes silence and leaves its clock untouched.
    pub fn render(&mut self, out: &mut [f32]) {
        if self.suspended {
            out.fill(0.0);
            return;
        }

        let channels = self.channels as usize;
        let start = self.frames.load(Ordering::Acquire);
        let step = self.voice.as_ref().map(|voice| voice.step(self.sample_rate));
        let click_samples = &self.click_sound.samples;
        let mut rendered = 0_u64;

        for frame in out.chunks_mut(channels) {
            let now = start + rendered;
            while self.pending_clicks.front().is_some_and(|&at| at <= now) {
                self.pending_clicks.pop_front();
                self.sounding_clicks.push(0);
            }

            let mut click = 0.0;
            self.sounding_clicks.retain_mut(|position| {
                if let Some(sample) = click_samples.get(*position) {
                    click += sample;
                }
                *position += 1;
                *position < click_samples.len()
            });

            for (channel, slot) in frame.iter_mut().enumerate() {
                let music = self
                    .voice
                    .as_ref()
                    .map(|voice| voice.sample(channel))
                    .unwrap_or(0.0);
                *slot = music * self.music_gain + click * self.click_gain;
            }

            if let Some(step) = step {
                let finished = match self.voice.as_mut() {
                    Some(voice) => {
                        voice.position += step;
                        voice.finished()
                    }
                    None => false,
                };
                if finished {
                    self.voice = None;
                }
            }
            rendered += 1;
        }

        self.frames.fetch_add(rendered, Ordering::AcqRel);
    }
}

impl fmt::Debug for Mixer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mixer")
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("frames", &self.frames.load(Ordering::Relaxed))
            .field("suspended", &self.suspended)
            .field("music_rate", &self.music_rate())
            .field("pending_clicks", &self.pending_clicks.len())
            .field("sounding_clicks", &self.sounding_clicks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Clock;

    fn ramp(frames: usize, sample_rate: u32) -> Arc<DecodedBuffer> {
        let samples = (0..frames).map(|i| i as f32).collect();
        Arc::new(DecodedBuffer::new(samples, sample_rate, 1).unwrap())
    }

    fn running_mixer(sample_rate: u32) -> Mixer {
        let click = ClickSound {
            samples: vec![1.0, 0.5],
            sample_rate,
        };
        let mut mixer = Mixer::new(sample_rate, 1, click);
        mixer.set_suspended(false);
        mixer
    }

    #[test]
    fn double_rate_skips_every_other_frame() {
        let mut mixer = running_mixer(10);
        mixer.start_music(ramp(20, 10), 0.0, 2.0);

        let mut out = [0.0_f32; 4];
        mixer.render(&mut out);
        assert_eq!(out, [0.0, 2.0, 4.0, 6.0]);
    }

    #[test]
    fn half_rate_interpolates_between_frames() {
        let mut mixer = running_mixer(10);
        mixer.start_music(ramp(20, 10), 0.5, 0.5);

        let mut out = [0.0_f32; 3];
        mixer.render(&mut out);
        assert_eq!(out, [5.0, 5.5, 6.0]);
    }

    #[test]
    fn clicks_start_on_their_exact_frame() {
        let mut mixer = running_mixer(10);
        mixer.schedule_click(0.6);
        mixer.schedule_click(0.3);
        assert_eq!(mixer.scheduled_clicks(), vec![0.3, 0.6]);

        let mut out = [0.0_f32; 8];
        mixer.render(&mut out);
        assert_eq!(out, [0.0, 0.0, 0.0, 1.0, 0.5, 0.0, 1.0, 0.5]);
        assert!(mixer.scheduled_clicks().is_empty());
    }

    #[test]
    fn gains_scale_each_bus() {
        let mut mixer = running_mixer(10);
        mixer.start_music(Arc::new(DecodedBuffer::new(vec![1.0; 10], 10, 1).unwrap()), 0.0, 1.0);
        mixer.set_music_gain(0.25);
        mixer.set_click_gain(0.0);
        mixer.schedule_click(0.0);

        let mut out = [0.0_f32; 1];
        mixer.render(&mut out);
        assert_eq!(out, [0.25]);
    }

    #[test]
    fn voice_ends_with_its_buffer() {
        let mut mixer = running_mixer(10);
        mixer.start_music(ramp(3, 10), 0.0, 1.0);

        let mut out = [0.0_f32; 5];
        mixer.render(&mut out);
        assert!(mixer.music_rate().is_none());
        assert!((mixer.clock().now() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn cancel_keeps_sounding_clicks() {
        let mut mixer = running_mixer(10);
        mixer.schedule_click(0.0);
        mixer.schedule_click(0.5);

        let mut out = [0.0_f32; 1];
        mixer.render(&mut out);
        mixer.cancel_clicks();
        mixer.render(&mut out);
        assert_eq!(out, [0.5]);
        assert!(mixer.scheduled_clicks().is_empty());
    }
}
