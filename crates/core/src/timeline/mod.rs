use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::{AudioOutput, Result, TempoModel};

/// How far ahead of the clock a scheduling pass commits clicks.
pub const LOOKAHEAD_SECONDS: f64 = 0.1;

/// A beat boundary on the clock's timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduledBeat {
    pub time_seconds: f64,
    /// Beats counted since playback last started.
    pub index: u64,
}

/// Look-ahead metronome scheduler.
///
/// Each pass walks `next_beat_time` forward until it leaves the look-ahead
/// window, committing a click to the audio output for every beat it crosses
/// while enabled. The beat interval is read from the [`TempoModel`] on every
/// step, so a tempo change only affects beats that have not been committed.
/// Visual pulses are held here and released by [`BeatScheduler::due_pulses`]
/// once their beat time has been reached.
#[derive(Debug)]
pub struct BeatScheduler {
    lookahead: f64,
    enabled: bool,
    running: bool,
    next_beat_time: f64,
    next_index: u64,
    pending_pulses: VecDeque<ScheduledBeat>,
}

impl Default for BeatScheduler {
    fn default() -> Self {
        Self::new(LOOKAHEAD_SECONDS)
    }
}

impl BeatScheduler {
    pub fn new(lookahead_seconds: f64) -> Self {
        Self {
            lookahead: lookahead_seconds.max(0.0),
            enabled: false,
            running: false,
            next_beat_time: 0.0,
            next_index: 0,
            pending_pulses: VecDeque::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enables or disables clicks. Clicks already committed keep sounding.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn toggle(&mut self) -> bool {
        self.enabled = !self.enabled;
        self.enabled
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn next_beat_time(&self) -> f64 {
        self.next_beat_time
    }

    pub fn lookahead(&self) -> f64 {
        self.lookahead
    }

    /// Anchors the beat grid at `now`.
    pub fn start(&mut self, now: f64) {
        self.next_beat_time = now;
        self.next_index = 0;
        self.pending_pulses.clear();
        self.running = true;
    }

    /// Stops advancing and forgets visual pulses that have not fired.
    pub fn cancel(&mut self) {
        self.running = false;
        self.pending_pulses.clear();
    }

    /// Runs one look-ahead pass and returns the beats committed as clicks.
    ///
    /// Beats that already lie in the past when the pass reaches them (a
    /// stalled driver) advance the grid without producing a click.
    pub fn schedule<O>(
        &mut self,
        now: f64,
        tempo: &TempoModel,
        output: &mut O,
    ) -> Result<Vec<ScheduledBeat>>
    where
        O: AudioOutput + ?Sized,
    {
        let mut committed = Vec::new();
        if !self.running {
            return Ok(committed);
        }

        while self.next_beat_time < now + self.lookahead {
            let beat = ScheduledBeat {
                time_seconds: self.next_beat_time,
                index: self.next_index,
            };
            if self.enabled && beat.time_seconds >= now {
                output.schedule_click(beat.time_seconds)?;
                self.pending_pulses.push_back(beat);
                committed.push(beat);
            }
            self.next_beat_time += tempo.beat_interval();
            self.next_index += 1;
        }

        if !committed.is_empty() {
            tracing::debug!(
                clicks = committed.len(),
                next_beat = self.next_beat_time,
                bpm = tempo.current_bpm(),
                "scheduled metronome clicks"
            );
        }
        Ok(committed)
    }

    /// Pops visual pulses whose beat time is at or before `now`.
    pub fn due_pulses(&mut self, now: f64) -> Vec<ScheduledBeat> {
        let mut due = Vec::new();
        while self
            .pending_pulses
            .front()
            .is_some_and(|pulse| pulse.time_seconds <= now)
        {
            if let Some(pulse) = self.pending_pulses.pop_front() {
                due.push(pulse);
            }
        }
        due
    }
}
