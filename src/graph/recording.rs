// src/graph/recording.rs
//
// In-memory synthesis graph.
//
// Records every command it receives and simulates node lifetimes against
// explicitly advanced time. Used by the dry-run player and by tests; it
// produces no sound.

use std::collections::HashMap;

use crate::error::GraphError;

use super::{Automation, CompletionToken, Destination, NodeId, NodeKind, Param, SynthesisGraph};

/// A command received by the recording graph.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphCall {
    Create {
        node: NodeId,
        kind: NodeKind,
    },
    Connect {
        source: NodeId,
        destination: Destination,
    },
    Disconnect {
        node: NodeId,
    },
    Automate {
        node: NodeId,
        param: Param,
        automation: Automation,
    },
    Start {
        node: NodeId,
        time: f64,
    },
    Stop {
        node: NodeId,
        time: f64,
    },
}

#[derive(Debug)]
struct RecordedNode {
    kind: NodeKind,
    start: Option<f64>,
    stop: Option<f64>,
    released: bool,
    ended: bool,
}

/// Synthesis graph that records commands instead of rendering.
///
/// Oscillators "end" when [`advance_to`](Self::advance_to) passes their
/// stop time, which fires any completion tokens registered on them. Calls
/// that a real audio graph would reject (disconnecting twice, stopping an
/// oscillator that already ended) return errors here as well.
#[derive(Debug)]
pub struct RecordingGraph {
    ready: bool,
    next_id: NodeId,
    nodes: HashMap<NodeId, RecordedNode>,
    calls: Vec<GraphCall>,
    watchers: Vec<(NodeId, CompletionToken)>,
}

impl RecordedNode {
    /// A stopped oscillator that has not reached its stop time yet.
    fn awaiting_end(&self) -> bool {
        self.kind.is_oscillator() && self.stop.is_some() && !self.ended
    }
}

impl RecordingGraph {
    pub fn new() -> Self {
        Self {
            ready: true,
            next_id: 0,
            nodes: HashMap::new(),
            calls: Vec::new(),
            watchers: Vec::new(),
        }
    }

    /// A graph whose output device is not available yet.
    pub fn not_ready() -> Self {
        Self {
            ready: false,
            ..Self::new()
        }
    }

    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    // ───────────────────────────────────────────────────────────────
    // Simulation
    // ───────────────────────────────────────────────────────────────

    /// Advance simulated time, ending every oscillator whose stop time has
    /// passed and firing the completions watching them. Released nodes with
    /// nothing left to simulate are forgotten.
    ///
    /// Returns the number of completions fired.
    pub fn advance_to(&mut self, time: f64) -> usize {
        for node in self.nodes.values_mut() {
            if !node.ended && node.stop.is_some_and(|stop| stop <= time) {
                node.ended = true;
            }
        }

        let nodes = &self.nodes;
        let (finished, pending): (Vec<_>, Vec<_>) = self
            .watchers
            .drain(..)
            .partition(|(node, _)| nodes.get(node).is_none_or(|n| n.ended));
        self.watchers = pending;

        let fired = finished.len();
        for (_, token) in finished {
            token.complete();
        }

        self.nodes.retain(|_, n| !n.released || n.awaiting_end());
        fired
    }

    // ───────────────────────────────────────────────────────────────
    // Inspection
    // ───────────────────────────────────────────────────────────────

    pub fn calls(&self) -> &[GraphCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Nodes created and not yet disconnected.
    pub fn live_nodes(&self) -> usize {
        self.nodes.values().filter(|n| !n.released).count()
    }

    /// Nodes still tracked, released or not.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn kind(&self, node: NodeId) -> Option<NodeKind> {
        self.nodes.get(&node).map(|n| n.kind)
    }

    pub fn start_time(&self, node: NodeId) -> Option<f64> {
        self.nodes.get(&node).and_then(|n| n.start)
    }

    pub fn stop_time(&self, node: NodeId) -> Option<f64> {
        self.nodes.get(&node).and_then(|n| n.stop)
    }

    pub fn is_released(&self, node: NodeId) -> bool {
        self.nodes.get(&node).is_some_and(|n| n.released)
    }

    /// Automation points scheduled on one parameter, in call order.
    pub fn automation(&self, node: NodeId, param: Param) -> Vec<Automation> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                GraphCall::Automate {
                    node: n,
                    param: p,
                    automation,
                } if *n == node && *p == param => Some(*automation),
                _ => None,
            })
            .collect()
    }

    /// Connections made from `source`, in call order.
    pub fn destinations(&self, source: NodeId) -> Vec<Destination> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                GraphCall::Connect {
                    source: s,
                    destination,
                } if *s == source => Some(*destination),
                _ => None,
            })
            .collect()
    }

    fn live_node(&mut self, node: NodeId) -> Result<&mut RecordedNode, GraphError> {
        match self.nodes.get_mut(&node) {
            None => Err(GraphError::UnknownNode(node)),
            Some(n) if n.released => Err(GraphError::AlreadyDisconnected(node)),
            Some(n) => Ok(n),
        }
    }

    fn oscillator(&mut self, node: NodeId) -> Result<&mut RecordedNode, GraphError> {
        let n = self.live_node(node)?;
        if !n.kind.is_oscillator() {
            return Err(GraphError::InvalidState {
                node,
                message: "not a source node",
            });
        }
        Ok(n)
    }
}

impl Default for RecordingGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SynthesisGraph for RecordingGraph {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn create_node(&mut self, kind: NodeKind) -> Result<NodeId, GraphError> {
        if !self.ready {
            return Err(GraphError::NotReady);
        }
        let node = self.next_id;
        self.next_id += 1;
        self.nodes.insert(
            node,
            RecordedNode {
                kind,
                start: None,
                stop: None,
                released: false,
                ended: false,
            },
        );
        self.calls.push(GraphCall::Create { node, kind });
        Ok(node)
    }

    fn connect(&mut self, source: NodeId, destination: Destination) -> Result<(), GraphError> {
        self.live_node(source)?;
        match destination {
            Destination::Input(target) | Destination::Param(target, _) => {
                self.live_node(target)?;
            }
            Destination::EffectsBus => {}
        }
        self.calls.push(GraphCall::Connect {
            source,
            destination,
        });
        Ok(())
    }

    fn disconnect(&mut self, node: NodeId) -> Result<(), GraphError> {
        self.live_node(node)?.released = true;
        self.calls.push(GraphCall::Disconnect { node });
        Ok(())
    }

    fn automate(
        &mut self,
        node: NodeId,
        param: Param,
        automation: Automation,
    ) -> Result<(), GraphError> {
        self.live_node(node)?;
        self.calls.push(GraphCall::Automate {
            node,
            param,
            automation,
        });
        Ok(())
    }

    fn start_at(&mut self, node: NodeId, time: f64) -> Result<(), GraphError> {
        let n = self.oscillator(node)?;
        if n.start.is_some() {
            return Err(GraphError::InvalidState {
                node,
                message: "already started",
            });
        }
        n.start = Some(time);
        self.calls.push(GraphCall::Start { node, time });
        Ok(())
    }

    fn stop_at(&mut self, node: NodeId, time: f64) -> Result<(), GraphError> {
        let n = self.oscillator(node)?;
        if n.start.is_none() {
            return Err(GraphError::InvalidState {
                node,
                message: "stopped before start was scheduled",
            });
        }
        if n.ended {
            return Err(GraphError::InvalidState {
                node,
                message: "already ended",
            });
        }
        n.stop = Some(time);
        self.calls.push(GraphCall::Stop { node, time });
        Ok(())
    }

    fn on_natural_end(&mut self, node: NodeId, token: CompletionToken) -> Result<(), GraphError> {
        self.oscillator(node)?;
        self.watchers.push((node, token));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;
    use crate::graph::Waveform;

    #[test]
    fn test_nodes_end_when_time_passes_stop() {
        let (tx, rx) = mpsc::channel();
        let mut graph = RecordingGraph::new();
        let osc = graph
            .create_node(NodeKind::Oscillator(Waveform::Sine))
            .unwrap();
        graph.start_at(osc, 1.0).unwrap();
        graph.stop_at(osc, 2.0).unwrap();
        graph
            .on_natural_end(osc, CompletionToken::new(7, tx))
            .unwrap();

        assert_eq!(graph.advance_to(1.5), 0);
        assert!(rx.try_recv().is_err());

        assert_eq!(graph.advance_to(2.0), 1);
        assert_eq!(rx.try_recv().unwrap(), 7);

        // An ended oscillator can no longer be stopped.
        assert!(matches!(
            graph.stop_at(osc, 3.0),
            Err(GraphError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_rejects_double_disconnect_and_unready_creation() {
        let mut graph = RecordingGraph::new();
        let gain = graph.create_node(NodeKind::Gain).unwrap();
        graph.disconnect(gain).unwrap();
        assert_eq!(
            graph.disconnect(gain),
            Err(GraphError::AlreadyDisconnected(gain))
        );
        assert_eq!(graph.live_nodes(), 0);

        let mut unready = RecordingGraph::not_ready();
        assert_eq!(
            unready.create_node(NodeKind::Gain),
            Err(GraphError::NotReady)
        );
    }

    #[test]
    fn test_released_nodes_are_forgotten_once_ended() {
        let mut graph = RecordingGraph::new();
        let osc = graph
            .create_node(NodeKind::Oscillator(Waveform::Sine))
            .unwrap();
        let gain = graph.create_node(NodeKind::Gain).unwrap();
        let kept = graph.create_node(NodeKind::Gain).unwrap();
        graph.start_at(osc, 0.0).unwrap();
        graph.stop_at(osc, 2.0).unwrap();
        graph.disconnect(osc).unwrap();
        graph.disconnect(gain).unwrap();

        // The oscillator still has a stop ahead of it.
        graph.advance_to(1.0);
        assert_eq!(graph.node_count(), 2);
        assert!(graph.is_released(osc));
        assert_eq!(graph.kind(gain), None);

        graph.advance_to(2.0);
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.kind(kept), Some(NodeKind::Gain));
        assert_eq!(graph.live_nodes(), 1);
        assert_eq!(graph.disconnect(osc), Err(GraphError::UnknownNode(osc)));
    }

    #[test]
    fn test_schedule_envelope_records_points_in_order() {
        let mut graph = RecordingGraph::new();
        let gain = graph.create_node(NodeKind::Gain).unwrap();
        let points = [
            Automation::SetValue {
                value: 0.0,
                time: 1.0,
            },
            Automation::LinearRamp {
                value: 0.5,
                time: 1.1,
            },
        ];
        graph
            .schedule_envelope(gain, Param::Gain, &points)
            .unwrap();
        assert_eq!(graph.automation(gain, Param::Gain), points.to_vec());
    }
}
