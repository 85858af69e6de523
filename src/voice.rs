use crate::graph::NodeId;
use crate::score::Note;

pub type VoiceId = u64;

/// Graph nodes owned by one voice.
///
/// Layout: three oscillators (fundamental, slightly detuned copy and an
/// octave overtone behind its own gain) feed a lowpass filter and an
/// amplitude gain. Two LFOs with depth gains modulate pitch (vibrato) and
/// amplitude (tremolo).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceNodes {
    pub fundamental: NodeId,
    pub detuned: NodeId,
    pub overtone: NodeId,
    pub overtone_gain: NodeId,
    pub vibrato_lfo: NodeId,
    pub vibrato_depth: NodeId,
    pub tremolo_lfo: NodeId,
    pub tremolo_depth: NodeId,
    pub filter: NodeId,
    pub amp: NodeId,
}

impl VoiceNodes {
    /// Build from node ids in the order returned by [`all`](Self::all).
    pub fn from_ids(ids: [NodeId; 10]) -> Self {
        let [
            fundamental,
            detuned,
            overtone,
            overtone_gain,
            vibrato_lfo,
            vibrato_depth,
            tremolo_lfo,
            tremolo_depth,
            filter,
            amp,
        ] = ids;
        Self {
            fundamental,
            detuned,
            overtone,
            overtone_gain,
            vibrato_lfo,
            vibrato_depth,
            tremolo_lfo,
            tremolo_depth,
            filter,
            amp,
        }
    }

    pub fn all(&self) -> [NodeId; 10] {
        [
            self.fundamental,
            self.detuned,
            self.overtone,
            self.overtone_gain,
            self.vibrato_lfo,
            self.vibrato_depth,
            self.tremolo_lfo,
            self.tremolo_depth,
            self.filter,
            self.amp,
        ]
    }

    /// Source nodes that need start/stop scheduling.
    pub fn oscillators(&self) -> [NodeId; 5] {
        [
            self.fundamental,
            self.detuned,
            self.overtone,
            self.vibrato_lfo,
            self.tremolo_lfo,
        ]
    }
}

/// A voice represents one sounding occurrence of a note.
///
/// Voices do NOT render audio.
/// They hold the graph handles needed to stop and release it.
#[derive(Debug, Clone)]
pub struct Voice {
    pub id: VoiceId,
    pub note: Note,
    /// Device time the oscillators start.
    pub start_time: f64,
    /// Device time the oscillators were scheduled to stop.
    pub stop_time: f64,
    pub nodes: VoiceNodes,
    /// Set once a force-stop has been issued.
    pub stopping: bool,
}

impl Voice {
    #[inline]
    pub fn has_started(&self, now: f64) -> bool {
        now >= self.start_time
    }
}
