use serde::{Deserialize, Serialize};

pub const DEFAULT_MIN_BPM: u32 = 40;
pub const DEFAULT_MAX_BPM: u32 = 300;

/// Native and user-selected tempo of the loaded track.
///
/// The playback rate and the beat interval are derived on every call, so a
/// reader never sees a value that predates the last tempo change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TempoModel {
    native_bpm: u32,
    current_bpm: u32,
    min_bpm: u32,
    max_bpm: u32,
}

impl Default for TempoModel {
    fn default() -> Self {
        Self::with_range(DEFAULT_MIN_BPM, DEFAULT_MAX_BPM)
    }
}

impl TempoModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a model whose user tempo is clamped to `min_bpm..=max_bpm`.
    pub fn with_range(min_bpm: u32, max_bpm: u32) -> Self {
        let min_bpm = min_bpm.max(1);
        let max_bpm = max_bpm.max(min_bpm);
        let native = 120.clamp(min_bpm, max_bpm);
        Self {
            native_bpm: native,
            current_bpm: native,
            min_bpm,
            max_bpm,
        }
    }

    /// Called on track load. The current tempo follows the native one.
    pub fn set_native_tempo(&mut self, bpm: u32) {
        self.native_bpm = bpm.max(1);
        self.current_bpm = self.native_bpm;
    }

    /// Sets the user tempo, clamped to the valid range. Returns the applied value.
    pub fn set_current_tempo(&mut self, bpm: u32) -> u32 {
        self.current_bpm = bpm.clamp(self.min_bpm, self.max_bpm);
        self.current_bpm
    }

    pub fn reset_tempo(&mut self) -> u32 {
        self.current_bpm = self.native_bpm;
        self.current_bpm
    }

    pub fn native_bpm(&self) -> u32 {
        self.native_bpm
    }

    pub fn current_bpm(&self) -> u32 {
        self.current_bpm
    }

    pub fn range(&self) -> (u32, u32) {
        (self.min_bpm, self.max_bpm)
    }

    /// `current / native`; both are kept above zero so this is always positive.
    pub fn playback_rate(&self) -> f64 {
        self.current_bpm as f64 / self.native_bpm as f64
    }

    /// Seconds between two clicks at the current tempo.
    pub fn beat_interval(&self) -> f64 {
        60.0 / self.current_bpm as f64
    }
}
