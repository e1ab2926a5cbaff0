//! Pulls rendered frames out of the shared mixer in real time.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use drumpro_core::{AppConfig, Mixer, MixerHandle, Result};

/// Keeps frames flowing out of the mixer until dropped.
pub enum Sink {
    /// Renders into a scratch buffer and throws the audio away, paced by the
    /// wall clock. Used when no audio device is compiled in.
    Silent(SilentSink),
    #[cfg(feature = "device")]
    Device(cpal::Stream),
}

/// Opens the output: the default audio device when the `device` feature is
/// built, a paced silent sink otherwise.
pub fn open(config: &AppConfig) -> Result<(MixerHandle, Sink)> {
    #[cfg(feature = "device")]
    {
        device::open(config)
    }
    #[cfg(not(feature = "device"))]
    {
        let audio = &config.audio;
        let mixer = Mixer::new(
            audio.sample_rate,
            audio.channels,
            config.metronome.click_sound(audio.sample_rate),
        );
        let handle = MixerHandle::new(mixer);
        let sink = SilentSink::spawn(handle.clone(), audio.block_size)?;
        Ok((handle, Sink::Silent(sink)))
    }
}

pub struct SilentSink {
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl SilentSink {
    pub fn spawn(mixer: MixerHandle, block_size: usize) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let worker = std::thread::Builder::new()
            .name("drumpro-silent-sink".to_string())
            .spawn(move || pace(mixer, block_size.max(1), flag))?;
        tracing::info!("no audio device, rendering to a silent sink");
        Ok(Self {
            running,
            worker: Some(worker),
        })
    }
}

impl Drop for SilentSink {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn pace(mixer: MixerHandle, block_size: usize, running: Arc<AtomicBool>) {
    let sample_rate = mixer.sample_rate() as f64;
    let channels = mixer.channels() as usize;
    let mut block = vec![0.0_f32; block_size * channels];
    let started = Instant::now();
    let mut rendered: u64 = 0;

    while running.load(Ordering::Relaxed) {
        let due = (started.elapsed().as_secs_f64() * sample_rate) as u64;
        while rendered + block_size as u64 <= due {
            if let Err(err) = mixer.render(&mut block) {
                tracing::error!(error = %err, "silent sink stopped");
                return;
            }
            rendered += block_size as u64;
        }
        std::thread::sleep(Duration::from_secs_f64(block_size as f64 / sample_rate / 2.0));
    }
}

#[cfg(feature = "device")]
mod device {
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use drumpro_core::DrumProError;

    use super::*;

    pub fn open(config: &AppConfig) -> Result<(MixerHandle, Sink)> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| DrumProError::Audio("no audio output device available".into()))?;
        let supported = device
            .default_output_config()
            .map_err(|err| DrumProError::Audio(err.to_string()))?;
        if supported.sample_format() != cpal::SampleFormat::F32 {
            return Err(DrumProError::Audio(format!(
                "unsupported sample format {:?}",
                supported.sample_format()
            )));
        }
        let stream_config: cpal::StreamConfig = supported.into();
        let sample_rate = stream_config.sample_rate.0;
        let channels = stream_config.channels;
        tracing::info!(
            device = %device.name().unwrap_or_else(|_| "unknown".into()),
            sample_rate,
            channels,
            "opening audio device"
        );

        let handle = MixerHandle::new(Mixer::new(
            sample_rate,
            channels,
            config.metronome.click_sound(sample_rate),
        ));
        let callback_handle = handle.clone();
        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if callback_handle.render(data).is_err() {
                        data.fill(0.0);
                    }
                },
                |err| tracing::error!(error = %err, "audio stream error"),
                None,
            )
            .map_err(|err| DrumProError::Audio(err.to_string()))?;
        stream
            .play()
            .map_err(|err| DrumProError::Audio(err.to_string()))?;
        Ok((handle, Sink::Device(stream)))
    }
}
