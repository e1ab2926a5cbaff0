use serde::Serialize;

use super::TransportState;

/// Playback position as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Progress {
    pub elapsed_seconds: f64,
    pub duration_seconds: f64,
    /// `elapsed / duration`, in `0.0..=1.0`.
    pub fraction: f64,
}

impl Progress {
    pub fn at(elapsed_seconds: f64, duration_seconds: f64) -> Self {
        let duration_seconds = duration_seconds.max(0.0);
        let elapsed_seconds = elapsed_seconds.clamp(0.0, duration_seconds);
        let fraction = if duration_seconds > 0.0 {
            elapsed_seconds / duration_seconds
        } else {
            0.0
        };
        Self {
            elapsed_seconds,
            duration_seconds,
            fraction,
        }
    }

    pub fn zero(duration_seconds: f64) -> Self {
        Self::at(0.0, duration_seconds)
    }

    /// `elapsed / total` as `m:ss / m:ss`.
    pub fn label(&self) -> String {
        format!(
            "{} / {}",
            format_time(self.elapsed_seconds),
            format_time(self.duration_seconds)
        )
    }
}

/// Musical time elapsed in `state` at wall time `now`.
///
/// While playing, the rate is treated as constant since the anchor; the
/// transport re-anchors whenever the rate changes.
pub fn elapsed_musical_time(state: &TransportState, rate: f64, now: f64) -> f64 {
    match *state {
        TransportState::Stopped => 0.0,
        TransportState::Paused { offset } => offset,
        TransportState::Playing {
            anchor,
            offset_at_anchor,
        } => offset_at_anchor + (now - anchor).max(0.0) * rate,
    }
}

/// Formats seconds as `m:ss`.
pub fn format_time(seconds: f64) -> String {
    let total = if seconds.is_finite() {
        seconds.max(0.0).floor() as u64
    } else {
        0
    };
    format!("{}:{:02}", total / 60, total % 60)
}
