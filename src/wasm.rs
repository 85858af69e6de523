//! WebAssembly bindings via wasm-bindgen for browser integration.
//!
//! This module is only compiled when the `web` feature is enabled.
//!
//! The browser owns the AudioContext. JavaScript implements a small
//! [`AudioGraphHost`] object over it (node creation, connections, param
//! automation, start/stop, ended callbacks); the player drives that object
//! and never touches Web Audio directly.
//!
//! # Usage
//!
//! Build with wasm-pack:
//! ```bash
//! wasm-pack build --target web --features web
//! ```
//!
//! # JavaScript Example
//!
//! ```javascript
//! import init, { scoreplay_init, ScorePlayer } from './scoreplay.js';
//!
//! await init();
//! scoreplay_init();
//!
//! const host = new AudioGraphHost(audioContext, effectsBus);
//! const player = new ScorePlayer(scoreJson, host, true);
//! host.onVoiceEnded = (voice) => player.voice_ended(voice);
//!
//! player.play();
//! setInterval(() => player.tick(), player.poll_interval_ms());
//! ```

use std::rc::Rc;

use wasm_bindgen::prelude::*;

use crate::clock::Clock;
use crate::controller::TransportController;
use crate::error::GraphError;
use crate::graph::{Automation, CompletionToken, Destination, NodeId, NodeKind, Param, SynthesisGraph};
use crate::score::{Part, Score, midi_to_label};
use crate::state::{PlaybackConfig, PlaybackReadback};

// ═══════════════════════════════════════════════════════════════════════════
// Initialization
// ═══════════════════════════════════════════════════════════════════════════

/// Initialize the wasm module. Call this once before using any other functions.
/// Sets up panic hooks and console logging.
#[wasm_bindgen]
pub fn scoreplay_init() {
    console_error_panic_hook::set_once();
    console_log::init_with_level(log::Level::Debug).ok();
}

// ═══════════════════════════════════════════════════════════════════════════
// Host graph
// ═══════════════════════════════════════════════════════════════════════════

#[wasm_bindgen]
extern "C" {
    /// Audio graph implemented in JavaScript on top of an AudioContext.
    pub type AudioGraphHost;

    #[wasm_bindgen(method, js_name = isReady)]
    fn is_ready(this: &AudioGraphHost) -> bool;

    #[wasm_bindgen(method, js_name = currentTime)]
    fn current_time(this: &AudioGraphHost) -> f64;

    #[wasm_bindgen(method, catch, js_name = createNode)]
    fn create_node(this: &AudioGraphHost, kind: &str) -> Result<u32, JsValue>;

    /// `param` is empty to connect to the node's input.
    #[wasm_bindgen(method, catch)]
    fn connect(this: &AudioGraphHost, source: u32, target: u32, param: &str) -> Result<(), JsValue>;

    #[wasm_bindgen(method, catch, js_name = connectToBus)]
    fn connect_to_bus(this: &AudioGraphHost, source: u32) -> Result<(), JsValue>;

    #[wasm_bindgen(method, catch)]
    fn disconnect(this: &AudioGraphHost, node: u32) -> Result<(), JsValue>;

    /// `kind` is one of `set`, `linear`, `target`, `cancel`.
    #[wasm_bindgen(method, catch)]
    fn automate(
        this: &AudioGraphHost,
        node: u32,
        param: &str,
        kind: &str,
        value: f32,
        time: f64,
        time_constant: f64,
    ) -> Result<(), JsValue>;

    #[wasm_bindgen(method, catch, js_name = startAt)]
    fn start_at(this: &AudioGraphHost, node: u32, time: f64) -> Result<(), JsValue>;

    #[wasm_bindgen(method, catch, js_name = stopAt)]
    fn stop_at(this: &AudioGraphHost, node: u32, time: f64) -> Result<(), JsValue>;

    /// The host calls `ScorePlayer.voice_ended(voice)` once `node` ends.
    #[wasm_bindgen(method, catch, js_name = watchEnded)]
    fn watch_ended(this: &AudioGraphHost, node: u32, voice: f64) -> Result<(), JsValue>;
}

fn host_error(err: JsValue) -> GraphError {
    GraphError::Host(err.as_string().unwrap_or_else(|| format!("{err:?}")))
}

/// [`SynthesisGraph`] backed by the JavaScript host.
struct JsGraph {
    host: Rc<AudioGraphHost>,
}

impl SynthesisGraph for JsGraph {
    fn is_ready(&self) -> bool {
        self.host.is_ready()
    }

    fn create_node(&mut self, kind: NodeKind) -> Result<NodeId, GraphError> {
        self.host.create_node(kind.as_str()).map_err(host_error)
    }

    fn connect(&mut self, source: NodeId, destination: Destination) -> Result<(), GraphError> {
        let result = match destination {
            Destination::Input(target) => self.host.connect(source, target, ""),
            Destination::Param(target, param) => self.host.connect(source, target, param.as_str()),
            Destination::EffectsBus => self.host.connect_to_bus(source),
        };
        result.map_err(host_error)
    }

    fn disconnect(&mut self, node: NodeId) -> Result<(), GraphError> {
        self.host.disconnect(node).map_err(host_error)
    }

    fn automate(
        &mut self,
        node: NodeId,
        param: Param,
        automation: Automation,
    ) -> Result<(), GraphError> {
        let (kind, value, time, time_constant) = match automation {
            Automation::SetValue { value, time } => ("set", value, time, 0.0),
            Automation::LinearRamp { value, time } => ("linear", value, time, 0.0),
            Automation::SetTarget {
                target,
                time,
                time_constant,
            } => ("target", target, time, time_constant),
            Automation::Cancel { from } => ("cancel", 0.0, from, 0.0),
        };
        self.host
            .automate(node, param.as_str(), kind, value, time, time_constant)
            .map_err(host_error)
    }

    fn start_at(&mut self, node: NodeId, time: f64) -> Result<(), GraphError> {
        self.host.start_at(node, time).map_err(host_error)
    }

    fn stop_at(&mut self, node: NodeId, time: f64) -> Result<(), GraphError> {
        self.host.stop_at(node, time).map_err(host_error)
    }

    fn on_natural_end(&mut self, node: NodeId, token: CompletionToken) -> Result<(), GraphError> {
        // Completion comes back through ScorePlayer::voice_ended.
        self.host
            .watch_ended(node, token.voice() as f64)
            .map_err(host_error)
    }
}

/// The AudioContext's clock.
struct JsClock {
    host: Rc<AudioGraphHost>,
}

impl Clock for JsClock {
    fn now(&self) -> f64 {
        self.host.current_time()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Readback Data
// ═══════════════════════════════════════════════════════════════════════════

/// Transport state for UI displays.
#[wasm_bindgen]
#[derive(Clone, Copy, Default)]
pub struct ScoreReadback {
    /// Current position in beats.
    pub beat: f64,
    /// Current tempo in BPM.
    pub tempo: f64,
    /// Score length in beats.
    pub total_beats: f64,
    /// Whether the transport is playing.
    pub playing: bool,
    /// Whether the score loops at the end.
    pub loop_enabled: bool,
    /// Number of voices still alive in the graph.
    pub active_voices: u32,
}

impl From<PlaybackReadback> for ScoreReadback {
    fn from(r: PlaybackReadback) -> Self {
        Self {
            beat: r.beat,
            tempo: r.tempo,
            total_beats: r.total_beats,
            playing: r.playing,
            loop_enabled: r.loop_enabled,
            active_voices: r.active_voices as u32,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Player
// ═══════════════════════════════════════════════════════════════════════════

/// Score player driving a JavaScript audio graph.
///
/// Everything runs on the page's main thread; call `tick` from a timer at
/// `poll_interval_ms`.
#[wasm_bindgen]
pub struct ScorePlayer {
    inner: TransportController<JsGraph, JsClock>,
}

#[wasm_bindgen]
impl ScorePlayer {
    /// Load a score document and bind it to a host graph.
    #[wasm_bindgen(constructor)]
    pub fn new(
        score_json: &str,
        host: AudioGraphHost,
        loop_enabled: bool,
    ) -> Result<ScorePlayer, JsValue> {
        let score = Score::from_json(score_json).map_err(|e| JsValue::from_str(&e.to_string()))?;
        let host = Rc::new(host);
        let config = PlaybackConfig {
            loop_enabled,
            ..Default::default()
        };
        let inner = TransportController::new(
            &score,
            JsGraph {
                host: Rc::clone(&host),
            },
            JsClock { host },
            config,
        )
        .map_err(|e| JsValue::from_str(&e.to_string()))?;
        Ok(ScorePlayer { inner })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transport
    // ─────────────────────────────────────────────────────────────────────────

    /// Start playback. Returns the number of notes scheduled right away.
    pub fn play(&mut self) -> u32 {
        self.inner.play().triggered.len() as u32
    }

    pub fn pause(&mut self) {
        self.inner.pause();
    }

    pub fn toggle(&mut self) {
        self.inner.toggle();
    }

    /// Pause and rewind to the start.
    pub fn stop(&mut self) {
        self.inner.stop();
    }

    pub fn seek(&mut self, beat: f64) {
        self.inner.seek(beat);
    }

    pub fn seek_seconds(&mut self, seconds: f64) {
        self.inner.seek_seconds(seconds);
    }

    /// Set tempo. Returns the clamped tempo actually applied.
    pub fn set_tempo(&mut self, bpm: f64) -> Result<f64, JsValue> {
        self.inner
            .set_tempo(bpm)
            .map(|(tempo, _)| tempo)
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    pub fn set_loop(&mut self, enabled: bool) {
        self.inner.set_loop(enabled);
    }

    pub fn set_expressiveness(&mut self, amount: f32) {
        self.inner.set_expressiveness(amount);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Polling
    // ─────────────────────────────────────────────────────────────────────────

    /// Run one scheduler pass. Returns the number of notes scheduled.
    pub fn tick(&mut self) -> u32 {
        self.inner.poll().triggered.len() as u32
    }

    /// Called by the host when a voice's oscillator has ended.
    pub fn voice_ended(&mut self, voice: f64) -> bool {
        self.inner.voice_ended(voice as u64)
    }

    pub fn poll_interval_ms(&self) -> u32 {
        self.inner.config().poll_interval.as_millis() as u32
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Readback
    // ─────────────────────────────────────────────────────────────────────────

    pub fn readback(&self) -> ScoreReadback {
        self.inner.readback().into()
    }

    /// e.g. `00:12 / 01:36 | Bar 6, Beat 1.00`
    pub fn status_line(&self) -> String {
        self.inner.readback().status_line()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Display helpers
// ═══════════════════════════════════════════════════════════════════════════

/// Note name for a MIDI pitch, e.g. `C4`.
#[wasm_bindgen]
pub fn midi_label(pitch: u8) -> String {
    midi_to_label(pitch)
}

/// Fill colour for a part number (1..=3), for piano-roll rendering.
#[wasm_bindgen]
pub fn part_fill(part: u8) -> Option<String> {
    Part::try_from(part).ok().map(|p| p.colors().0.to_string())
}

/// Stroke colour for a part number (1..=3).
#[wasm_bindgen]
pub fn part_stroke(part: u8) -> Option<String> {
    Part::try_from(part).ok().map(|p| p.colors().1.to_string())
}
