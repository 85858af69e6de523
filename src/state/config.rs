// src/state/config.rs
//
// Playback timing and tuning.

use std::time::Duration;

use crate::error::ConfigError;

/// Settings for one transport.
///
/// The defaults are the values the player has always shipped with; hosts
/// normally only touch the polling interval and the loop flag.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackConfig {
    /// How far ahead of the playhead notes are handed to the graph.
    pub lookahead_seconds: f64,

    /// Cadence at which the scheduler is polled.
    pub poll_interval: Duration,

    /// Gap between a (re)start request and the first audible beat.
    pub resume_offset_seconds: f64,

    /// Start delay for notes already sounding at the playhead.
    pub immediate_offset_seconds: f64,

    /// Tolerance for "reached the end of the score".
    pub end_epsilon_beats: f64,

    /// Longest note the resume search looks back for.
    pub max_sustain_beats: f64,

    pub min_tempo: f64,
    pub max_tempo: f64,

    /// Restart at beat 0 when the end is reached.
    pub loop_enabled: bool,

    /// Vibrato and tremolo depth multiplier, 0..=2.
    pub expressiveness: f32,

    /// Time constant of the fade applied when voices are cut short.
    pub force_stop_time_constant: f64,

    /// Oscillators stop this long after a force-stop.
    pub force_stop_delay: f64,

    /// Seed for per-voice vibrato rate variation.
    pub vibrato_seed: u64,
}

pub const MAX_EXPRESSIVENESS: f32 = 2.0;

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            lookahead_seconds: 0.5,
            poll_interval: Duration::from_millis(20),
            resume_offset_seconds: 0.05,
            immediate_offset_seconds: 0.01,
            end_epsilon_beats: 1e-4,
            max_sustain_beats: 4.0,
            min_tempo: 40.0,
            max_tempo: 100.0,
            loop_enabled: true,
            expressiveness: 1.0,
            force_stop_time_constant: 0.01,
            force_stop_delay: 0.04,
            vibrato_seed: 0x5eed_cafe,
        }
    }
}

impl PlaybackConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("lookahead_seconds", self.lookahead_seconds)?;
        positive("poll_interval", self.poll_interval.as_secs_f64())?;
        positive("max_sustain_beats", self.max_sustain_beats)?;
        positive("force_stop_time_constant", self.force_stop_time_constant)?;
        non_negative("resume_offset_seconds", self.resume_offset_seconds)?;
        non_negative("immediate_offset_seconds", self.immediate_offset_seconds)?;
        non_negative("end_epsilon_beats", self.end_epsilon_beats)?;
        non_negative("force_stop_delay", self.force_stop_delay)?;

        if !(self.min_tempo.is_finite()
            && self.max_tempo.is_finite()
            && self.min_tempo > 0.0
            && self.min_tempo <= self.max_tempo)
        {
            return Err(ConfigError::InvalidTempoRange {
                min: self.min_tempo,
                max: self.max_tempo,
            });
        }

        let poll_seconds = self.poll_interval.as_secs_f64();
        if self.lookahead_seconds <= poll_seconds {
            return Err(ConfigError::LookaheadTooShort {
                lookahead_seconds: self.lookahead_seconds,
                poll_seconds,
            });
        }

        Ok(())
    }

    /// Clamp a requested tempo into the supported range.
    ///
    /// Only non-finite or non-positive requests are errors.
    pub fn clamp_tempo(&self, bpm: f64) -> Result<f64, ConfigError> {
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(ConfigError::InvalidTempo(bpm));
        }
        Ok(bpm.clamp(self.min_tempo, self.max_tempo))
    }

    #[inline]
    pub fn clamp_expressiveness(amount: f32) -> f32 {
        if amount.is_nan() {
            return 0.0;
        }
        amount.clamp(0.0, MAX_EXPRESSIVENESS)
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { name, value })
    }
}

// Zero offsets are allowed (tests schedule exactly at `now`).
fn non_negative(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { name, value })
    }
}
