// src/voice_registry.rs

use std::collections::BTreeMap;
use std::sync::mpsc::{self, Receiver, Sender};

use log::{debug, trace};

use crate::envelope::fade_out;
use crate::graph::{CompletionToken, Param, SynthesisGraph};
use crate::voice::{Voice, VoiceId};

/// Tracks every voice whose nodes are still alive in the graph.
///
/// Responsibilities:
/// - hand out voice ids and completion tokens
/// - route natural-end notifications to a single cleanup path
/// - cut voices short on stop, seek and tempo changes
///
/// Does NOT:
/// - decide when notes play (that is the scheduler)
/// - build voice topologies (that is the synthesizer)
#[derive(Debug)]
pub struct VoiceRegistry {
    voices: BTreeMap<VoiceId, Voice>,
    next_id: VoiceId,
    completion_tx: Sender<VoiceId>,
    completion_rx: Receiver<VoiceId>,

    /// Fade time constant for force-stopped voices.
    fade_time_constant: f64,

    /// Delay between a force-stop and the oscillators stopping.
    stop_delay: f64,
}

impl VoiceRegistry {
    pub fn new(fade_time_constant: f64, stop_delay: f64) -> Self {
        let (completion_tx, completion_rx) = mpsc::channel();
        Self {
            voices: BTreeMap::new(),
            next_id: 0,
            completion_tx,
            completion_rx,
            fade_time_constant,
            stop_delay,
        }
    }

    /// Reserve an id for a voice about to be built.
    pub fn allocate_id(&mut self) -> VoiceId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Token the graph fires when `voice` plays out.
    pub fn completion_token(&self, voice: VoiceId) -> CompletionToken {
        CompletionToken::new(voice, self.completion_tx.clone())
    }

    pub fn insert(&mut self, voice: Voice) {
        self.voices.insert(voice.id, voice);
    }

    // ───────────────────────────────────────────────────────────────
    // Teardown
    // ───────────────────────────────────────────────────────────────

    /// Clean up every voice whose completion has fired.
    ///
    /// Returns the number of voices actually removed.
    pub fn reap<G: SynthesisGraph>(&mut self, graph: &mut G) -> usize {
        let mut removed = 0;
        while let Ok(id) = self.completion_rx.try_recv() {
            if self.cleanup(id, graph) {
                removed += 1;
            }
        }
        removed
    }

    /// The one teardown path: forget the voice and disconnect its nodes.
    ///
    /// Safe to call any number of times; only the first call for an id
    /// does anything. Returns whether the voice was still active.
    pub fn cleanup<G: SynthesisGraph>(&mut self, id: VoiceId, graph: &mut G) -> bool {
        let Some(voice) = self.voices.remove(&id) else {
            return false;
        };

        for node in voice.nodes.all() {
            if let Err(err) = graph.disconnect(node) {
                trace!("voice {id}: disconnect ignored: {err}");
            }
        }
        debug!("voice {id} cleaned up (pitch {})", voice.note.pitch);
        true
    }

    /// Cut one voice short at `now`.
    ///
    /// A voice that has not started yet is stopped and cleaned up at once.
    /// A sounding voice fades to silence and its oscillators stop shortly
    /// after; cleanup then follows its completion. Returns false if the
    /// voice is unknown or already fading.
    pub fn force_stop<G: SynthesisGraph>(&mut self, id: VoiceId, graph: &mut G, now: f64) -> bool {
        let Some(voice) = self.voices.get_mut(&id) else {
            return false;
        };

        if !voice.has_started(now) {
            for node in voice.nodes.oscillators() {
                if let Err(err) = graph.stop_at(node, now) {
                    trace!("voice {id}: stop ignored: {err}");
                }
            }
            return self.cleanup(id, graph);
        }

        if voice.stopping {
            return false;
        }
        voice.stopping = true;

        let fade = fade_out(now, self.fade_time_constant);
        if let Err(err) = graph.schedule_envelope(voice.nodes.amp, Param::Gain, &fade) {
            trace!("voice {id}: fade ignored: {err}");
        }

        // Never push a stop later than the one already scheduled.
        let stop_time = (now + self.stop_delay).min(voice.stop_time);
        for node in voice.nodes.oscillators() {
            if let Err(err) = graph.stop_at(node, stop_time) {
                trace!("voice {id}: stop ignored: {err}");
            }
        }
        voice.stop_time = stop_time;
        true
    }

    /// Cut every active voice short. Returns how many were affected.
    pub fn force_stop_all<G: SynthesisGraph>(&mut self, graph: &mut G, now: f64) -> usize {
        let ids: Vec<VoiceId> = self.voices.keys().copied().collect();
        let stopped = ids
            .into_iter()
            .filter(|&id| self.force_stop(id, graph, now))
            .count();
        if stopped > 0 {
            debug!("force-stopped {stopped} voice(s) at {now:.3}");
        }
        stopped
    }

    // ───────────────────────────────────────────────────────────────
    // Inspection
    // ───────────────────────────────────────────────────────────────

    /// Number of voices not yet cleaned up.
    #[inline]
    pub fn active_count(&self) -> usize {
        self.voices.len()
    }

    #[inline]
    pub fn is_active(&self, id: VoiceId) -> bool {
        self.voices.contains_key(&id)
    }

    pub fn get(&self, id: VoiceId) -> Option<&Voice> {
        self.voices.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Voice> + '_ {
        self.voices.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Automation, NodeKind, RecordingGraph, Waveform};
    use crate::score::{Note, Part};
    use crate::voice::VoiceNodes;

    // Minimal voice: real oscillators so start/stop behave like the synth's.
    fn spawn(registry: &mut VoiceRegistry, graph: &mut RecordingGraph, start: f64, stop: f64) -> VoiceId {
        let mut ids = [0; 10];
        for (i, slot) in ids.iter_mut().enumerate() {
            let kind = if matches!(i, 0 | 1 | 2 | 4 | 6) {
                NodeKind::Oscillator(Waveform::Sine)
            } else {
                NodeKind::Gain
            };
            *slot = graph.create_node(kind).unwrap();
        }
        let nodes = VoiceNodes::from_ids(ids);
        for osc in nodes.oscillators() {
            graph.start_at(osc, start).unwrap();
            graph.stop_at(osc, stop).unwrap();
        }

        let id = registry.allocate_id();
        graph
            .on_natural_end(nodes.fundamental, registry.completion_token(id))
            .unwrap();
        registry.insert(Voice {
            id,
            note: Note::new(0.0, 1.0, 60, Part::First),
            start_time: start,
            stop_time: stop,
            nodes,
            stopping: false,
        });
        id
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        let mut graph = RecordingGraph::new();
        let mut registry = VoiceRegistry::new(0.01, 0.04);
        let id = spawn(&mut registry, &mut graph, 0.0, 1.0);
        assert_eq!(graph.live_nodes(), 10);

        assert!(registry.cleanup(id, &mut graph));
        assert!(!registry.cleanup(id, &mut graph));
        assert_eq!(registry.active_count(), 0);
        assert_eq!(graph.live_nodes(), 0);
    }

    #[test]
    fn test_natural_end_and_manual_cleanup_count_once() {
        let mut graph = RecordingGraph::new();
        let mut registry = VoiceRegistry::new(0.01, 0.04);
        let a = spawn(&mut registry, &mut graph, 0.0, 1.0);
        let _b = spawn(&mut registry, &mut graph, 0.0, 5.0);

        assert_eq!(graph.advance_to(1.0), 1);
        // Cleanup already happened through another route.
        assert!(registry.cleanup(a, &mut graph));
        assert_eq!(registry.reap(&mut graph), 0);
        assert_eq!(registry.active_count(), 1);
    }

    #[test]
    fn test_reap_cleans_completed_voices() {
        let mut graph = RecordingGraph::new();
        let mut registry = VoiceRegistry::new(0.01, 0.04);
        spawn(&mut registry, &mut graph, 0.0, 1.0);
        spawn(&mut registry, &mut graph, 0.0, 2.0);

        graph.advance_to(1.5);
        assert_eq!(registry.reap(&mut graph), 1);
        assert_eq!(registry.active_count(), 1);

        graph.advance_to(2.0);
        assert_eq!(registry.reap(&mut graph), 1);
        assert_eq!(registry.active_count(), 0);
        assert_eq!(graph.live_nodes(), 0);
    }

    #[test]
    fn test_force_stop_pending_voice_is_removed_immediately() {
        let mut graph = RecordingGraph::new();
        let mut registry = VoiceRegistry::new(0.01, 0.04);
        let id = spawn(&mut registry, &mut graph, 2.0, 3.0);

        assert!(registry.force_stop(id, &mut graph, 1.0));
        assert!(!registry.is_active(id));
        assert_eq!(graph.live_nodes(), 0);
    }

    #[test]
    fn test_force_stop_sounding_voice_fades_then_completes() {
        let mut graph = RecordingGraph::new();
        let mut registry = VoiceRegistry::new(0.01, 0.04);
        let id = spawn(&mut registry, &mut graph, 0.0, 10.0);
        let nodes = registry.get(id).unwrap().nodes;

        assert!(registry.force_stop(id, &mut graph, 1.0));
        // Second request is a no-op while fading.
        assert!(!registry.force_stop(id, &mut graph, 1.01));
        assert!(registry.is_active(id));

        let gain = graph.automation(nodes.amp, Param::Gain);
        assert_eq!(gain[0], Automation::Cancel { from: 1.0 });
        assert!(matches!(gain[1], Automation::SetTarget { time, .. } if time == 1.0));
        assert_eq!(graph.stop_time(nodes.fundamental), Some(1.04));

        graph.advance_to(1.04);
        assert_eq!(registry.reap(&mut graph), 1);
        assert!(!registry.is_active(id));
    }

    #[test]
    fn test_force_stop_after_cleanup_is_a_no_op() {
        let mut graph = RecordingGraph::new();
        let mut registry = VoiceRegistry::new(0.01, 0.04);
        let cleaned = spawn(&mut registry, &mut graph, 0.0, 1.0);
        let reaped = spawn(&mut registry, &mut graph, 0.0, 2.0);
        let sounding = spawn(&mut registry, &mut graph, 0.0, 8.0);

        assert!(registry.cleanup(cleaned, &mut graph));
        graph.advance_to(2.0);
        assert_eq!(registry.reap(&mut graph), 1);
        assert_eq!(registry.active_count(), 1);

        let calls = graph.calls().len();
        assert!(!registry.force_stop(cleaned, &mut graph, 3.0));
        assert!(!registry.force_stop(reaped, &mut graph, 3.0));
        assert_eq!(registry.active_count(), 1);
        assert!(registry.is_active(sounding));
        // Released nodes are never touched again.
        assert_eq!(graph.calls().len(), calls);
    }

    #[test]
    fn test_force_stop_all_swallows_graph_errors() {
        let mut graph = RecordingGraph::new();
        let mut registry = VoiceRegistry::new(0.01, 0.04);
        spawn(&mut registry, &mut graph, 0.0, 1.0);
        spawn(&mut registry, &mut graph, 0.0, 4.0);

        // First voice has ended in the graph but its completion is unread,
        // so stopping it again is rejected by the graph.
        graph.advance_to(1.0);
        assert_eq!(registry.force_stop_all(&mut graph, 2.0), 2);

        graph.advance_to(2.04);
        assert_eq!(registry.reap(&mut graph), 2);
        assert_eq!(registry.active_count(), 0);
    }
}
