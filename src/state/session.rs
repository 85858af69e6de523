// src/state/session.rs
//
// Playback session state.
//
// One PlaybackSession exists per transport. It replaces the ambient
// globals a browser player would keep (playing flag, anchor, active voice
// set, audio context) with a single owned value.

use crate::graph::SynthesisGraph;
use crate::transport::{PlaybackAnchor, TimeMapper, format_bar_beat, format_clock};
use crate::voice_registry::VoiceRegistry;

use super::PlaybackConfig;

/// Transport state visible to the UI.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportState {
    /// Current tempo in BPM, always inside the configured range.
    pub tempo: f64,

    /// Whether the scheduler is running.
    pub is_playing: bool,

    /// Restart at beat 0 when the end is reached.
    pub loop_enabled: bool,

    /// Position snapshot in beats (authoritative while paused).
    pub current_beat: f64,

    /// Scan cursor into the sorted notes.
    pub next_scan_index: usize,
}

impl TransportState {
    pub fn new(tempo: f64, loop_enabled: bool) -> Self {
        Self {
            tempo,
            is_playing: false,
            loop_enabled,
            current_beat: 0.0,
            next_scan_index: 0,
        }
    }
}

/// Everything a transport mutates while it plays.
///
/// This struct:
/// - owns the synthesis graph and the voices built inside it
/// - holds the current anchor (only meaningful while playing)
/// - is only ever touched from one execution context
#[derive(Debug)]
pub struct PlaybackSession<G> {
    pub transport: TransportState,

    pub anchor: PlaybackAnchor,

    pub voices: VoiceRegistry,

    pub graph: G,

    /// Applied to voices triggered from now on.
    pub expressiveness: f32,
}

impl<G: SynthesisGraph> PlaybackSession<G> {
    pub fn new(graph: G, tempo: f64, config: &PlaybackConfig) -> Self {
        Self {
            transport: TransportState::new(tempo, config.loop_enabled),
            anchor: PlaybackAnchor::default(),
            voices: VoiceRegistry::new(
                config.force_stop_time_constant,
                config.force_stop_delay,
            ),
            graph,
            expressiveness: PlaybackConfig::clamp_expressiveness(config.expressiveness),
        }
    }

    /// Time mapper for the current anchor and tempo.
    #[inline]
    pub fn mapper(&self, total_beats: f64) -> TimeMapper {
        TimeMapper::new(self.anchor, self.transport.tempo, total_beats)
    }
}

/// Read-only transport state for UI display.
///
/// Produced on demand by the controller, or published by the threaded
/// player after every poll.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlaybackReadback {
    /// Current position in beats.
    pub beat: f64,

    pub tempo: f64,

    pub total_beats: f64,

    pub playing: bool,

    pub loop_enabled: bool,

    /// Voices that have not been cleaned up yet.
    pub active_voices: usize,
}

impl PlaybackReadback {
    /// Elapsed clock, e.g. `00:12`.
    pub fn elapsed(&self) -> String {
        format_clock(self.beat, self.tempo)
    }

    /// Score length on the clock at the current tempo.
    pub fn duration(&self) -> String {
        format_clock(self.total_beats, self.tempo)
    }

    /// `Bar n, Beat x.xx`
    pub fn bar_beat(&self) -> String {
        format_bar_beat(self.beat)
    }

    /// One-line status, e.g. `00:12 / 01:36 | Bar 6, Beat 1.00`.
    pub fn status_line(&self) -> String {
        format!("{} / {} | {}", self.elapsed(), self.duration(), self.bar_beat())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::RecordingGraph;

    #[test]
    fn test_new_session_is_stopped_at_zero() {
        let config = PlaybackConfig::default();
        let session = PlaybackSession::new(RecordingGraph::new(), 72.0, &config);
        assert!(!session.transport.is_playing);
        assert_eq!(session.transport.current_beat, 0.0);
        assert_eq!(session.transport.tempo, 72.0);
        assert!(session.transport.loop_enabled);
        assert_eq!(session.voices.active_count(), 0);
    }

    #[test]
    fn test_status_line() {
        let readback = PlaybackReadback {
            beat: 20.0,
            tempo: 100.0,
            total_beats: 160.0,
            playing: true,
            loop_enabled: false,
            active_voices: 3,
        };
        assert_eq!(readback.elapsed(), "00:12");
        assert_eq!(readback.duration(), "01:36");
        assert_eq!(readback.status_line(), "00:12 / 01:36 | Bar 6, Beat 1.00");
    }
}
