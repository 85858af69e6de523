// src/synth.rs
//
// Builds one voice per note inside the synthesis graph.

use log::{debug, warn};

use crate::envelope::NoteEnvelope;
use crate::error::GraphError;
use crate::graph::{
    Automation, Destination, FilterType, NodeId, NodeKind, Param, SynthesisGraph, Waveform,
};
use crate::score::{Note, midi_to_hz};
use crate::state::PlaybackSession;
use crate::transport::seconds_for_beats;
use crate::voice::{Voice, VoiceId, VoiceNodes};

// ═══════════════════════════════════════════════════════════════════
// Voice shape
// ═══════════════════════════════════════════════════════════════════

/// Notes are shortened slightly so repeated pitches stay distinct.
const LEGATO: f64 = 0.985;
const MIN_DURATION_SECONDS: f64 = 0.03;
/// Oscillators keep running past the envelope so the release is not clipped.
const STOP_TAIL_SECONDS: f64 = 0.06;

const DETUNE_RATIO: f32 = 1.002;
const OVERTONE_RATIO: f32 = 2.0;
const OVERTONE_GAIN: f32 = 0.08;

const VIBRATO_BASE_HZ: f32 = 5.0;
/// Vibrato depth as a fraction of the fundamental.
const VIBRATO_DEPTH: f32 = 0.006;
const TREMOLO_HZ: f32 = 3.5;
const TREMOLO_DEPTH: f32 = 0.06;

const CUTOFF_RATIO: f32 = 4.0;
const MAX_CUTOFF_HZ: f32 = 8000.0;
const FILTER_Q: f32 = 0.7;

/// Node kinds in [`VoiceNodes::from_ids`] order.
const LAYOUT: [NodeKind; 10] = [
    NodeKind::Oscillator(Waveform::Sine),     // fundamental
    NodeKind::Oscillator(Waveform::Sine),     // detuned
    NodeKind::Oscillator(Waveform::Triangle), // overtone
    NodeKind::Gain,                           // overtone gain
    NodeKind::Oscillator(Waveform::Sine),     // vibrato LFO
    NodeKind::Gain,                           // vibrato depth
    NodeKind::Oscillator(Waveform::Sine),     // tremolo LFO
    NodeKind::Gain,                           // tremolo depth
    NodeKind::Filter(FilterType::Lowpass),
    NodeKind::Gain, // amplitude
];

/// Effective sounding length of a note, in seconds.
#[inline]
pub fn sounding_seconds(beats: f64, tempo: f64) -> f64 {
    (seconds_for_beats(beats, tempo) * LEGATO).max(MIN_DURATION_SECONDS)
}

/// Turns notes into scheduled voices.
///
/// This struct:
/// - owns nothing in the graph (voices are handed to the registry)
/// - carries the random state used to vary vibrato rates between voices
pub struct VoiceSynthesizer {
    rng_state: u64,
}

impl VoiceSynthesizer {
    pub fn new(seed: u64) -> Self {
        Self { rng_state: seed }
    }

    /// Uniform in [0, 1).
    fn next_random(&mut self) -> f32 {
        self.rng_state = self
            .rng_state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((self.rng_state >> 40) as f32) / ((1u64 << 24) as f32)
    }

    /// Schedule one note to sound from `start_time`.
    ///
    /// `duration_override` replaces the note's length in beats (used when
    /// resuming in the middle of a note). Returns `None` without touching
    /// the graph when it is not ready or the duration is not positive, and
    /// `None` after releasing any partially built nodes when the graph
    /// rejects a call.
    pub fn trigger<G: SynthesisGraph>(
        &mut self,
        session: &mut PlaybackSession<G>,
        note: &Note,
        start_time: f64,
        duration_override: Option<f64>,
    ) -> Option<VoiceId> {
        if !session.graph.is_ready() {
            return None;
        }

        let beats = duration_override.unwrap_or(note.duration_beats);
        if beats.is_nan() || beats <= 0.0 {
            return None;
        }

        let duration = sounding_seconds(beats, session.transport.tempo);
        let stop_time = start_time + duration + STOP_TAIL_SECONDS;
        let vibrato_rate = VIBRATO_BASE_HZ + self.next_random();

        let nodes = match create_nodes(&mut session.graph) {
            Ok(nodes) => nodes,
            Err(err) => {
                warn!("note {} at {start_time:.3}: could not create voice: {err}", note.pitch);
                return None;
            }
        };

        let id = session.voices.allocate_id();
        let shape = VoiceShape {
            note,
            start_time,
            duration,
            stop_time,
            vibrato_rate,
            expressiveness: session.expressiveness,
        };
        let token = session.voices.completion_token(id);
        let built = wire(&mut session.graph, &nodes, &shape)
            .and_then(|()| session.graph.on_natural_end(nodes.fundamental, token));

        if let Err(err) = built {
            warn!("note {} at {start_time:.3}: voice build failed: {err}", note.pitch);
            release(&mut session.graph, &nodes.all());
            return None;
        }

        debug!(
            "voice {id}: pitch {} part {} at {start_time:.3} for {duration:.3}s",
            note.pitch,
            note.part.number()
        );
        session.voices.insert(Voice {
            id,
            note: *note,
            start_time,
            stop_time,
            nodes,
            stopping: false,
        });
        Some(id)
    }
}

struct VoiceShape<'a> {
    note: &'a Note,
    start_time: f64,
    duration: f64,
    stop_time: f64,
    vibrato_rate: f32,
    expressiveness: f32,
}

fn create_nodes<G: SynthesisGraph>(graph: &mut G) -> Result<VoiceNodes, GraphError> {
    let mut ids = [0 as NodeId; 10];
    for (i, kind) in LAYOUT.iter().enumerate() {
        match graph.create_node(*kind) {
            Ok(id) => ids[i] = id,
            Err(err) => {
                release(graph, &ids[..i]);
                return Err(err);
            }
        }
    }
    Ok(VoiceNodes::from_ids(ids))
}

fn release<G: SynthesisGraph>(graph: &mut G, nodes: &[NodeId]) {
    for &node in nodes {
        let _ = graph.disconnect(node);
    }
}

fn set<G: SynthesisGraph>(
    graph: &mut G,
    node: NodeId,
    param: Param,
    value: f32,
    time: f64,
) -> Result<(), GraphError> {
    graph.automate(node, param, Automation::SetValue { value, time })
}

fn wire<G: SynthesisGraph>(
    graph: &mut G,
    n: &VoiceNodes,
    shape: &VoiceShape<'_>,
) -> Result<(), GraphError> {
    let t = shape.start_time;
    let freq = midi_to_hz(shape.note.pitch);

    // Sources
    set(graph, n.fundamental, Param::Frequency, freq, t)?;
    set(graph, n.detuned, Param::Frequency, freq * DETUNE_RATIO, t)?;
    set(graph, n.overtone, Param::Frequency, freq * OVERTONE_RATIO, t)?;
    set(graph, n.overtone_gain, Param::Gain, OVERTONE_GAIN, t)?;

    // Modulation
    set(graph, n.vibrato_lfo, Param::Frequency, shape.vibrato_rate, t)?;
    set(graph, n.vibrato_depth, Param::Gain, freq * VIBRATO_DEPTH * shape.expressiveness, t)?;
    set(graph, n.tremolo_lfo, Param::Frequency, TREMOLO_HZ, t)?;
    set(graph, n.tremolo_depth, Param::Gain, TREMOLO_DEPTH * shape.expressiveness, t)?;

    // Tone
    set(graph, n.filter, Param::Frequency, (freq * CUTOFF_RATIO).min(MAX_CUTOFF_HZ), t)?;
    set(graph, n.filter, Param::Q, FILTER_Q, t)?;

    let envelope = NoteEnvelope::new(t, shape.duration, shape.note.part.base_gain());
    graph.schedule_envelope(n.amp, Param::Gain, &envelope.points())?;

    graph.connect(n.fundamental, Destination::Input(n.filter))?;
    graph.connect(n.detuned, Destination::Input(n.filter))?;
    graph.connect(n.overtone, Destination::Input(n.overtone_gain))?;
    graph.connect(n.overtone_gain, Destination::Input(n.filter))?;
    graph.connect(n.vibrato_lfo, Destination::Input(n.vibrato_depth))?;
    graph.connect(n.vibrato_depth, Destination::Param(n.fundamental, Param::Frequency))?;
    graph.connect(n.vibrato_depth, Destination::Param(n.detuned, Param::Frequency))?;
    graph.connect(n.tremolo_lfo, Destination::Input(n.tremolo_depth))?;
    graph.connect(n.tremolo_depth, Destination::Param(n.amp, Param::Gain))?;
    graph.connect(n.filter, Destination::Input(n.amp))?;
    graph.connect(n.amp, Destination::EffectsBus)?;

    for osc in n.oscillators() {
        graph.start_at(osc, t)?;
        graph.stop_at(osc, shape.stop_time)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::GAIN_FLOOR;
    use crate::graph::{CompletionToken, RecordingGraph};
    use crate::score::Part;
    use crate::state::PlaybackConfig;

    fn session(tempo: f64) -> PlaybackSession<RecordingGraph> {
        PlaybackSession::new(RecordingGraph::new(), tempo, &PlaybackConfig::default())
    }

    fn value_at(graph: &RecordingGraph, node: NodeId, param: Param) -> f32 {
        match graph.automation(node, param).first() {
            Some(Automation::SetValue { value, .. }) => *value,
            other => panic!("no value on {node} {param:?}: {other:?}"),
        }
    }

    #[test]
    fn test_trigger_builds_full_voice() {
        let mut s = session(60.0);
        let mut synth = VoiceSynthesizer::new(1);
        let note = Note::new(0.0, 2.0, 69, Part::Second);

        let id = synth.trigger(&mut s, &note, 1.0, None).unwrap();
        let voice = s.voices.get(id).unwrap().clone();
        let n = voice.nodes;

        assert_eq!(s.graph.node_count(), 10);
        assert!((voice.stop_time - (1.0 + 2.0 * 0.985 + 0.06)).abs() < 1e-9);
        assert_eq!(s.graph.kind(n.overtone), Some(NodeKind::Oscillator(Waveform::Triangle)));
        assert_eq!(s.graph.kind(n.filter), Some(NodeKind::Filter(FilterType::Lowpass)));

        assert_eq!(value_at(&s.graph, n.fundamental, Param::Frequency), 440.0);
        assert!((value_at(&s.graph, n.detuned, Param::Frequency) - 440.88).abs() < 1e-3);
        assert_eq!(value_at(&s.graph, n.overtone, Param::Frequency), 880.0);
        assert_eq!(value_at(&s.graph, n.filter, Param::Frequency), 1760.0);
        assert!((value_at(&s.graph, n.vibrato_depth, Param::Gain) - 2.64).abs() < 1e-4);
        let rate = value_at(&s.graph, n.vibrato_lfo, Param::Frequency);
        assert!((5.0..6.0).contains(&rate), "{rate}");

        for osc in n.oscillators() {
            assert_eq!(s.graph.start_time(osc), Some(1.0));
            assert_eq!(s.graph.stop_time(osc), Some(voice.stop_time));
        }

        assert_eq!(
            s.graph.destinations(n.vibrato_depth),
            vec![
                Destination::Param(n.fundamental, Param::Frequency),
                Destination::Param(n.detuned, Param::Frequency),
            ]
        );
        assert_eq!(s.graph.destinations(n.amp), vec![Destination::EffectsBus]);

        let env = s.graph.automation(n.amp, Param::Gain);
        assert_eq!(env.len(), 4);
        assert!(matches!(env[1], Automation::LinearRamp { value, .. } if value == Part::Second.base_gain()));
        assert!(matches!(env[3], Automation::LinearRamp { value, .. } if value == GAIN_FLOOR));
    }

    #[test]
    fn test_cutoff_is_capped() {
        let mut s = session(60.0);
        let mut synth = VoiceSynthesizer::new(1);
        let id = synth
            .trigger(&mut s, &Note::new(0.0, 1.0, 108, Part::First), 0.0, None)
            .unwrap();
        let filter = s.voices.get(id).unwrap().nodes.filter;
        assert_eq!(value_at(&s.graph, filter, Param::Frequency), MAX_CUTOFF_HZ);
    }

    #[test]
    fn test_duration_override_and_minimum() {
        let mut s = session(100.0);
        let mut synth = VoiceSynthesizer::new(1);
        let note = Note::new(0.0, 4.0, 60, Part::Third);

        let id = synth.trigger(&mut s, &note, 0.0, Some(0.01)).unwrap();
        let stop = s.voices.get(id).unwrap().stop_time;
        assert!((stop - (MIN_DURATION_SECONDS + STOP_TAIL_SECONDS)).abs() < 1e-9);

        assert_eq!(synth.trigger(&mut s, &note, 0.0, Some(0.0)), None);
        assert_eq!(synth.trigger(&mut s, &note, 0.0, Some(-1.0)), None);
        assert_eq!(s.voices.active_count(), 1);
    }

    #[test]
    fn test_not_ready_graph_is_untouched() {
        let mut s = PlaybackSession::new(RecordingGraph::not_ready(), 60.0, &PlaybackConfig::default());
        let mut synth = VoiceSynthesizer::new(1);
        assert_eq!(synth.trigger(&mut s, &Note::new(0.0, 1.0, 60, Part::First), 0.0, None), None);
        assert!(s.graph.calls().is_empty());
    }

    #[test]
    fn test_zero_expressiveness_silences_modulation() {
        let mut s = session(60.0);
        s.expressiveness = 0.0;
        let mut synth = VoiceSynthesizer::new(1);
        let id = synth
            .trigger(&mut s, &Note::new(0.0, 1.0, 60, Part::First), 0.0, None)
            .unwrap();
        let n = s.voices.get(id).unwrap().nodes;
        assert_eq!(value_at(&s.graph, n.vibrato_depth, Param::Gain), 0.0);
        assert_eq!(value_at(&s.graph, n.tremolo_depth, Param::Gain), 0.0);
    }

    #[test]
    fn test_random_stays_in_unit_range() {
        let mut synth = VoiceSynthesizer::new(42);
        for _ in 0..1000 {
            let r = synth.next_random();
            assert!((0.0..1.0).contains(&r));
        }
    }

    /// Graph that refuses node creation after a fixed number of nodes.
    struct LimitedGraph {
        inner: RecordingGraph,
        remaining: usize,
    }

    impl SynthesisGraph for LimitedGraph {
        fn is_ready(&self) -> bool {
            self.inner.is_ready()
        }
        fn create_node(&mut self, kind: NodeKind) -> Result<NodeId, GraphError> {
            if self.remaining == 0 {
                return Err(GraphError::Host("out of nodes".into()));
            }
            self.remaining -= 1;
            self.inner.create_node(kind)
        }
        fn connect(&mut self, source: NodeId, destination: Destination) -> Result<(), GraphError> {
            self.inner.connect(source, destination)
        }
        fn disconnect(&mut self, node: NodeId) -> Result<(), GraphError> {
            self.inner.disconnect(node)
        }
        fn automate(
            &mut self,
            node: NodeId,
            param: Param,
            automation: Automation,
        ) -> Result<(), GraphError> {
            self.inner.automate(node, param, automation)
        }
        fn start_at(&mut self, node: NodeId, time: f64) -> Result<(), GraphError> {
            self.inner.start_at(node, time)
        }
        fn stop_at(&mut self, node: NodeId, time: f64) -> Result<(), GraphError> {
            self.inner.stop_at(node, time)
        }
        fn on_natural_end(&mut self, node: NodeId, token: CompletionToken) -> Result<(), GraphError> {
            self.inner.on_natural_end(node, token)
        }
    }

    #[test]
    fn test_partial_creation_is_released() {
        let graph = LimitedGraph {
            inner: RecordingGraph::new(),
            remaining: 6,
        };
        let mut s = PlaybackSession::new(graph, 60.0, &PlaybackConfig::default());
        let mut synth = VoiceSynthesizer::new(1);

        assert_eq!(synth.trigger(&mut s, &Note::new(0.0, 1.0, 60, Part::First), 0.0, None), None);
        assert_eq!(s.graph.inner.node_count(), 6);
        assert_eq!(s.graph.inner.live_nodes(), 0);
        assert_eq!(s.voices.active_count(), 0);
    }
}
