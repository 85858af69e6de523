// src/lib.rs
//
// Library entry point for Rust, FFI (iOS/Swift) and wasm consumers.

mod bridge;
mod clock;
mod controller;
mod envelope;
mod error;
mod event;
mod note_index;
mod scheduler;
mod score;
mod state;
mod synth;
mod transport;
mod voice;
mod voice_registry;

pub mod graph;

#[cfg(feature = "ios")]
pub mod ffi;

#[cfg(feature = "web")]
pub mod wasm;

// Re-export key types for Rust consumers
pub use bridge::{PlayerHandle, spawn_player};
pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::TransportController;
pub use envelope::{GAIN_FLOOR, NoteEnvelope};
pub use error::{ConfigError, GraphError, ScoreError};
pub use event::{NoteTrigger, TickOutcome, TickReport};
pub use note_index::NoteIndex;
pub use scheduler::{Scheduler, SchedulerState};
pub use score::{DEFAULT_SCORE_TEMPO, Note, Part, Score, midi_to_hz, midi_to_label};
pub use state::{Command, PlaybackConfig, PlaybackReadback, PlaybackSession, TransportState};
pub use synth::{VoiceSynthesizer, sounding_seconds};
pub use transport::{
    BEATS_PER_BAR, PlaybackAnchor, TimeMapper, beats_for_seconds, format_bar_beat, format_clock,
    seconds_for_beats,
};
pub use voice::{Voice, VoiceId, VoiceNodes};
pub use voice_registry::VoiceRegistry;
