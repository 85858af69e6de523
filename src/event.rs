// src/event.rs

use crate::voice::VoiceId;

/// ===============================
/// Scheduler output
/// ===============================

/// One note handed to the synthesizer during a scheduler pass.
///
/// These records:
/// - are produced at most once per note per pass over the score
/// - carry device times, not beats
/// - are informational (the voice is already scheduled in the graph)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteTrigger {
    /// Index into the sorted notes.
    pub index: usize,

    /// Device time the voice starts.
    pub start_time: f64,

    /// Shortened length in beats when resuming inside the note.
    pub duration_override: Option<f64>,

    /// `None` if the graph rejected the voice.
    pub voice: Option<VoiceId>,
}

impl NoteTrigger {
    #[inline]
    pub fn is_truncated(&self) -> bool {
        self.duration_override.is_some()
    }
}

/// What a scheduler pass ended with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not running; nothing was done.
    Idle,

    /// Running; more of the score remains.
    Continue,

    /// Reached the end and restarted at beat 0.
    Looped,

    /// Reached the end and stopped.
    Finished,
}

/// Result of one scheduler pass.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub triggered: Vec<NoteTrigger>,
    pub outcome: TickOutcome,
}

impl TickReport {
    pub fn idle() -> Self {
        Self {
            triggered: Vec::new(),
            outcome: TickOutcome::Idle,
        }
    }
}
