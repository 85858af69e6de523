// Commands from a UI (or any caller) to the transport.
//
// Commands are the ONLY way a threaded player's transport can be mutated.
// They are queued and applied on the playback thread, in order.

/// A transport command.
///
/// Commands are:
/// - Immutable once created
/// - Applied in the order they were sent
/// - Independent of any particular UI
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    // ═══════════════════════════════════════════
    // Transport
    // ═══════════════════════════════════════════
    /// Start (or resume) playback from the current position.
    Play,

    /// Stop scheduling and keep the position.
    Pause,

    /// Play if paused, pause if playing.
    TogglePlayback,

    /// Pause and rewind to the start of the score.
    Stop,

    /// Seek to a position in beats.
    Seek { beat: f64 },

    /// Seek to a position in seconds at the current tempo.
    SeekSeconds { seconds: f64 },

    // ═══════════════════════════════════════════
    // Settings
    // ═══════════════════════════════════════════
    /// Set tempo in BPM (clamped to the supported range).
    SetTempo { bpm: f64 },

    /// Enable or disable looping at the end of the score.
    SetLoop { enabled: bool },

    /// Vibrato/tremolo amount for voices triggered from now on.
    SetExpressiveness { amount: f32 },
}
