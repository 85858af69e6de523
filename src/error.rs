//! Error types for score loading, playback configuration and the synthesis
//! graph capability.
//!
//! - `ScoreError` - malformed score data, rejected at load time
//! - `ConfigError` - invalid playback settings (including tempo), rejected at set time
//! - `GraphError` - failures reported by a synthesis graph implementation
//!
//! Only the first two ever reach callers. Graph errors raised while tearing
//! a voice down are swallowed by the voice registry; a voice that cannot be
//! built is dropped with a warning.

use thiserror::Error;

use crate::graph::NodeId;

#[derive(Error, Debug)]
pub enum ScoreError {
    /// The score document is not valid JSON or does not have the expected shape.
    #[error("Invalid score document: {0}")]
    Json(#[from] serde_json::Error),

    /// A note has a negative/non-finite start or a non-positive duration.
    #[error("Invalid note #{index}: {message}")]
    InvalidNote { index: usize, message: String },

    /// A note starts after the end of the score.
    #[error("Note #{index} starts at beat {start_beat}, after the end of the score ({total_beats})")]
    NoteAfterEnd {
        index: usize,
        start_beat: f64,
        total_beats: f64,
    },

    /// A note's pitch lies outside the declared pitch range.
    #[error("Note #{index} has pitch {pitch} outside the score range {min}..={max}")]
    PitchOutOfRange {
        index: usize,
        pitch: u8,
        min: u8,
        max: u8,
    },

    /// Part tags are 1, 2 or 3.
    #[error("Unknown part {0} (expected 1, 2 or 3)")]
    UnknownPart(u8),

    #[error("Total beats must be positive and finite, got {0}")]
    InvalidTotalBeats(f64),

    #[error("Score tempo must be positive and finite, got {0}")]
    InvalidTempo(f64),

    #[error("Invalid pitch range {min}..={max}")]
    InvalidPitchRange { min: u8, max: u8 },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Tempo requests must be positive and finite. Values inside that
    /// domain are clamped to the supported range instead of rejected.
    #[error("Tempo must be positive and finite, got {0}")]
    InvalidTempo(f64),

    #[error("Tempo range {min}..={max} is invalid")]
    InvalidTempoRange { min: f64, max: f64 },

    #[error("{name} must be positive and finite, got {value}")]
    NonPositive { name: &'static str, value: f64 },

    /// The look-ahead window has to cover at least one polling period,
    /// otherwise notes can start before the scheduler sees them.
    #[error("Look-ahead ({lookahead_seconds}s) must exceed the polling period ({poll_seconds}s)")]
    LookaheadTooShort {
        lookahead_seconds: f64,
        poll_seconds: f64,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Synthesis graph is not ready")]
    NotReady,

    #[error("Unknown node {0}")]
    UnknownNode(NodeId),

    #[error("Node {0} is already disconnected")]
    AlreadyDisconnected(NodeId),

    #[error("Node {node}: {message}")]
    InvalidState { node: NodeId, message: &'static str },

    /// Failure reported by a host-provided graph (browser or native).
    #[error("Host graph error: {0}")]
    Host(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_offending_value() {
        let err = ScoreError::PitchOutOfRange {
            index: 3,
            pitch: 90,
            min: 48,
            max: 84,
        };
        assert_eq!(
            err.to_string(),
            "Note #3 has pitch 90 outside the score range 48..=84"
        );

        let err = ConfigError::LookaheadTooShort {
            lookahead_seconds: 0.01,
            poll_seconds: 0.02,
        };
        assert_eq!(
            err.to_string(),
            "Look-ahead (0.01s) must exceed the polling period (0.02s)"
        );
    }

    #[test]
    fn test_json_errors_convert() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: ScoreError = parse.unwrap_err().into();
        assert!(matches!(err, ScoreError::Json(_)));
    }
}
