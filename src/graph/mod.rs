//! The synthesis graph capability the playback core drives.
//!
//! The core never renders audio. It describes each voice as a small
//! topology of oscillators, gains and a filter, schedules parameter
//! automation and start/stop times against the device clock, and asks to
//! be told when a voice's main oscillator has finished. Whatever implements
//! [`SynthesisGraph`] (a browser audio context, a native host, or the
//! in-memory [`RecordingGraph`]) executes those commands on its own audio
//! thread.
//!
//! All calls are fire-and-forget: none of them block waiting for audio.
//! Every time argument shares the time domain of the [`Clock`](crate::clock::Clock)
//! the controller was built with.

mod recording;

pub use recording::{GraphCall, RecordingGraph};

use std::sync::mpsc::Sender;

use crate::error::GraphError;
use crate::voice::VoiceId;

/// Handle to a node inside the host graph.
pub type NodeId = u32;

// ═══════════════════════════════════════════════════════════════════
// Node vocabulary
// ═══════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Triangle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    Lowpass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Oscillator(Waveform),
    Gain,
    Filter(FilterType),
}

impl NodeKind {
    /// Short name used when talking to script hosts.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Oscillator(Waveform::Sine) => "sine",
            NodeKind::Oscillator(Waveform::Triangle) => "triangle",
            NodeKind::Gain => "gain",
            NodeKind::Filter(FilterType::Lowpass) => "lowpass",
        }
    }

    #[inline]
    pub fn is_oscillator(&self) -> bool {
        matches!(self, NodeKind::Oscillator(_))
    }
}

/// Automatable parameter of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    /// Oscillator or filter frequency (Hz)
    Frequency,
    /// Linear gain
    Gain,
    /// Filter resonance
    Q,
}

impl Param {
    pub fn as_str(&self) -> &'static str {
        match self {
            Param::Frequency => "frequency",
            Param::Gain => "gain",
            Param::Q => "Q",
        }
    }
}

/// Where a node's output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// Audio input of another node.
    Input(NodeId),

    /// Modulates a parameter of another node (added to its value).
    Param(NodeId, Param),

    /// The shared dry + reverb effects bus owned by the host.
    EffectsBus,
}

/// One timestamped automation command on a parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Automation {
    /// Jump to `value` at `time`.
    SetValue { value: f32, time: f64 },

    /// Ramp linearly from the previous point, reaching `value` at `time`.
    LinearRamp { value: f32, time: f64 },

    /// Approach `target` exponentially from `time`.
    SetTarget {
        target: f32,
        time: f64,
        time_constant: f64,
    },

    /// Drop every pending point at or after `from`.
    Cancel { from: f64 },
}

impl Automation {
    pub fn time(&self) -> f64 {
        match *self {
            Automation::SetValue { time, .. }
            | Automation::LinearRamp { time, .. }
            | Automation::SetTarget { time, .. } => time,
            Automation::Cancel { from } => from,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════
// Completion
// ═══════════════════════════════════════════════════════════════════

/// One-shot notification that a voice has played out.
///
/// Handed to the graph with [`SynthesisGraph::on_natural_end`]. The graph
/// calls [`complete`](Self::complete) once the watched node has stopped;
/// the voice registry drains these and runs its cleanup. Completing a
/// voice that was already cleaned up is harmless.
#[derive(Debug)]
pub struct CompletionToken {
    voice: VoiceId,
    tx: Sender<VoiceId>,
}

impl CompletionToken {
    pub(crate) fn new(voice: VoiceId, tx: Sender<VoiceId>) -> Self {
        Self { voice, tx }
    }

    pub fn voice(&self) -> VoiceId {
        self.voice
    }

    pub fn complete(self) {
        // Registry gone means playback was torn down; nothing to clean.
        let _ = self.tx.send(self.voice);
    }
}

// ═══════════════════════════════════════════════════════════════════
// Capability
// ═══════════════════════════════════════════════════════════════════

/// Synthesis graph driven by the voice synthesizer.
///
/// Implementations:
/// - execute commands asynchronously on their own audio thread
/// - report readiness (no output device yet means not ready)
/// - may reject calls on nodes that have already finished
pub trait SynthesisGraph {
    /// Whether an output is available. Until it is, the core treats
    /// scheduling as a no-op.
    fn is_ready(&self) -> bool;

    fn create_node(&mut self, kind: NodeKind) -> Result<NodeId, GraphError>;

    fn connect(&mut self, source: NodeId, destination: Destination) -> Result<(), GraphError>;

    /// Disconnect every output of `node` and release it.
    fn disconnect(&mut self, node: NodeId) -> Result<(), GraphError>;

    fn automate(&mut self, node: NodeId, param: Param, automation: Automation)
    -> Result<(), GraphError>;

    fn start_at(&mut self, node: NodeId, time: f64) -> Result<(), GraphError>;

    /// Schedule a stop. A later call replaces an earlier stop time.
    fn stop_at(&mut self, node: NodeId, time: f64) -> Result<(), GraphError>;

    /// Ask to be notified when an oscillator stops on its own schedule.
    fn on_natural_end(&mut self, node: NodeId, token: CompletionToken) -> Result<(), GraphError>;

    /// Schedule a sequence of automation points on one parameter.
    fn schedule_envelope(
        &mut self,
        node: NodeId,
        param: Param,
        points: &[Automation],
    ) -> Result<(), GraphError> {
        for point in points {
            self.automate(node, param, *point)?;
        }
        Ok(())
    }
}
