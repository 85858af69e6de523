// C-compatible FFI bindings for Swift/iOS integration.
//
// The host app owns the audio graph (AVAudioEngine or similar) and exposes
// it through a table of C callbacks. The player is single-threaded: the
// host calls `scoreplay_player_poll` from one timer at
// `scoreplay_player_poll_interval_ms`, and every other call on the same
// player must come from that same thread.
//
// Safety requirements:
// - All pointers must be non-null unless documented otherwise
// - All handles must be created by this module and not fabricated
// - String parameters must be valid null-terminated UTF-8
// - Caller must call the corresponding _destroy function for each _create

use std::ffi::{CStr, c_char, c_void};

use crate::clock::Clock;
use crate::controller::TransportController;
use crate::error::GraphError;
use crate::graph::{
    Automation, CompletionToken, Destination, FilterType, NodeId, NodeKind, Param, SynthesisGraph,
    Waveform,
};
use crate::score::Score;
use crate::state::{PlaybackConfig, PlaybackReadback};

use log::{LevelFilter, error, info};
use oslog::OsLogger;

// Logger subsystem identifier
const LOG_SUBSYSTEM: &str = "com.scoreplay.engine";

// ═══════════════════════════════════════════════════════════════════════════
// Logger Initialization
// ═══════════════════════════════════════════════════════════════════════════

/// Initialize the oslog logger.
///
/// Call once at application startup, before creating a player. Log output
/// appears in Console.app and Xcode's debug console.
#[unsafe(no_mangle)]
pub extern "C" fn scoreplay_init_logger() {
    OsLogger::new(LOG_SUBSYSTEM)
        .level_filter(LevelFilter::Debug)
        .init()
        .ok();
}

// ═══════════════════════════════════════════════════════════════════════════
// Host graph callbacks
// ═══════════════════════════════════════════════════════════════════════════

// Node kinds passed to `create_node`.
pub const SCOREPLAY_NODE_SINE: u32 = 0;
pub const SCOREPLAY_NODE_TRIANGLE: u32 = 1;
pub const SCOREPLAY_NODE_GAIN: u32 = 2;
pub const SCOREPLAY_NODE_LOWPASS: u32 = 3;

// Parameters passed to `connect` and `automate`.
pub const SCOREPLAY_PARAM_FREQUENCY: i32 = 0;
pub const SCOREPLAY_PARAM_GAIN: i32 = 1;
pub const SCOREPLAY_PARAM_Q: i32 = 2;
/// `connect` param value meaning "the node's audio input".
pub const SCOREPLAY_CONNECT_INPUT: i32 = -1;
/// `connect` target meaning "the shared effects bus".
pub const SCOREPLAY_EFFECTS_BUS: u32 = u32::MAX;

// Automation kinds passed to `automate`.
pub const SCOREPLAY_AUTOMATION_SET: u32 = 0;
pub const SCOREPLAY_AUTOMATION_LINEAR: u32 = 1;
pub const SCOREPLAY_AUTOMATION_TARGET: u32 = 2;
pub const SCOREPLAY_AUTOMATION_CANCEL: u32 = 3;

/// Audio graph implemented by the host.
///
/// Every callback receives `context` as its first argument and returns
/// `false` on failure. Times are seconds on the same clock `current_time`
/// reports.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ScoreplayGraphCallbacks {
    pub context: *mut c_void,
    pub is_ready: extern "C" fn(context: *mut c_void) -> bool,
    pub current_time: extern "C" fn(context: *mut c_void) -> f64,
    pub create_node: extern "C" fn(context: *mut c_void, kind: u32, out_node: *mut u32) -> bool,
    pub connect: extern "C" fn(context: *mut c_void, source: u32, target: u32, param: i32) -> bool,
    pub disconnect: extern "C" fn(context: *mut c_void, node: u32) -> bool,
    pub automate: extern "C" fn(
        context: *mut c_void,
        node: u32,
        param: i32,
        kind: u32,
        value: f32,
        time: f64,
        time_constant: f64,
    ) -> bool,
    pub start_at: extern "C" fn(context: *mut c_void, node: u32, time: f64) -> bool,
    pub stop_at: extern "C" fn(context: *mut c_void, node: u32, time: f64) -> bool,
    /// The host calls `scoreplay_player_voice_ended(player, voice)` once
    /// `node` has ended.
    pub watch_ended: extern "C" fn(context: *mut c_void, node: u32, voice: u64) -> bool,
}

fn node_kind_code(kind: NodeKind) -> u32 {
    match kind {
        NodeKind::Oscillator(Waveform::Sine) => SCOREPLAY_NODE_SINE,
        NodeKind::Oscillator(Waveform::Triangle) => SCOREPLAY_NODE_TRIANGLE,
        NodeKind::Gain => SCOREPLAY_NODE_GAIN,
        NodeKind::Filter(FilterType::Lowpass) => SCOREPLAY_NODE_LOWPASS,
    }
}

fn param_code(param: Param) -> i32 {
    match param {
        Param::Frequency => SCOREPLAY_PARAM_FREQUENCY,
        Param::Gain => SCOREPLAY_PARAM_GAIN,
        Param::Q => SCOREPLAY_PARAM_Q,
    }
}

fn check(ok: bool, what: &str) -> Result<(), GraphError> {
    if ok {
        Ok(())
    } else {
        Err(GraphError::Host(format!("{what} failed")))
    }
}

struct NativeGraph {
    callbacks: ScoreplayGraphCallbacks,
}

impl SynthesisGraph for NativeGraph {
    fn is_ready(&self) -> bool {
        (self.callbacks.is_ready)(self.callbacks.context)
    }

    fn create_node(&mut self, kind: NodeKind) -> Result<NodeId, GraphError> {
        let mut node: u32 = 0;
        let ok =
            (self.callbacks.create_node)(self.callbacks.context, node_kind_code(kind), &mut node);
        check(ok, "create_node")?;
        Ok(node)
    }

    fn connect(&mut self, source: NodeId, destination: Destination) -> Result<(), GraphError> {
        let (target, param) = match destination {
            Destination::Input(target) => (target, SCOREPLAY_CONNECT_INPUT),
            Destination::Param(target, param) => (target, param_code(param)),
            Destination::EffectsBus => (SCOREPLAY_EFFECTS_BUS, SCOREPLAY_CONNECT_INPUT),
        };
        check(
            (self.callbacks.connect)(self.callbacks.context, source, target, param),
            "connect",
        )
    }

    fn disconnect(&mut self, node: NodeId) -> Result<(), GraphError> {
        check((self.callbacks.disconnect)(self.callbacks.context, node), "disconnect")
    }

    fn automate(
        &mut self,
        node: NodeId,
        param: Param,
        automation: Automation,
    ) -> Result<(), GraphError> {
        let (kind, value, time, time_constant) = match automation {
            Automation::SetValue { value, time } => (SCOREPLAY_AUTOMATION_SET, value, time, 0.0),
            Automation::LinearRamp { value, time } => (SCOREPLAY_AUTOMATION_LINEAR, value, time, 0.0),
            Automation::SetTarget {
                target,
                time,
                time_constant,
            } => (SCOREPLAY_AUTOMATION_TARGET, target, time, time_constant),
            Automation::Cancel { from } => (SCOREPLAY_AUTOMATION_CANCEL, 0.0, from, 0.0),
        };
        let ok = (self.callbacks.automate)(
            self.callbacks.context,
            node,
            param_code(param),
            kind,
            value,
            time,
            time_constant,
        );
        check(ok, "automate")
    }

    fn start_at(&mut self, node: NodeId, time: f64) -> Result<(), GraphError> {
        check((self.callbacks.start_at)(self.callbacks.context, node, time), "start_at")
    }

    fn stop_at(&mut self, node: NodeId, time: f64) -> Result<(), GraphError> {
        check((self.callbacks.stop_at)(self.callbacks.context, node, time), "stop_at")
    }

    fn on_natural_end(&mut self, node: NodeId, token: CompletionToken) -> Result<(), GraphError> {
        // Completion comes back through scoreplay_player_voice_ended.
        check(
            (self.callbacks.watch_ended)(self.callbacks.context, node, token.voice()),
            "watch_ended",
        )
    }
}

struct NativeClock {
    callbacks: ScoreplayGraphCallbacks,
}

impl Clock for NativeClock {
    fn now(&self) -> f64 {
        (self.callbacks.current_time)(self.callbacks.context)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Opaque Handle Types
// ═══════════════════════════════════════════════════════════════════════════

/// Opaque handle to a score player.
pub struct ScoreplayPlayer {
    inner: TransportController<NativeGraph, NativeClock>,
}

// ═══════════════════════════════════════════════════════════════════════════
// FFI Result Types
// ═══════════════════════════════════════════════════════════════════════════

/// Transport state for UI displays.
#[repr(C)]
pub struct ScoreplayReadback {
    pub beat: f64,
    pub tempo: f64,
    pub total_beats: f64,
    pub active_voices: u32,
    pub playing: bool,
    pub loop_enabled: bool,
}

impl From<PlaybackReadback> for ScoreplayReadback {
    fn from(r: PlaybackReadback) -> Self {
        Self {
            beat: r.beat,
            tempo: r.tempo,
            total_beats: r.total_beats,
            active_voices: r.active_voices as u32,
            playing: r.playing,
            loop_enabled: r.loop_enabled,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Player Lifecycle
// ═══════════════════════════════════════════════════════════════════════════

/// Create a player for a JSON score document.
///
/// Returns NULL (and logs the reason) if the score or settings are invalid.
///
/// # Safety
/// - `score_json` must be a valid null-terminated UTF-8 string
/// - `callbacks` must point to a valid callback table whose `context`
///   outlives the player
#[unsafe(no_mangle)]
pub unsafe extern "C" fn scoreplay_player_create(
    score_json: *const c_char,
    callbacks: *const ScoreplayGraphCallbacks,
    loop_enabled: bool,
) -> *mut ScoreplayPlayer {
    if score_json.is_null() || callbacks.is_null() {
        error!("scoreplay_player_create: null argument");
        return std::ptr::null_mut();
    }

    let source = match unsafe { CStr::from_ptr(score_json) }.to_str() {
        Ok(source) => source,
        Err(e) => {
            error!("scoreplay_player_create: score is not UTF-8: {e}");
            return std::ptr::null_mut();
        }
    };
    let score = match Score::from_json(source) {
        Ok(score) => score,
        Err(e) => {
            error!("scoreplay_player_create: {e}");
            return std::ptr::null_mut();
        }
    };

    let callbacks = unsafe { *callbacks };
    let config = PlaybackConfig {
        loop_enabled,
        ..Default::default()
    };
    match TransportController::new(&score, NativeGraph { callbacks }, NativeClock { callbacks }, config) {
        Ok(inner) => {
            info!("scoreplay_player_create: {} notes", score.notes().len());
            Box::into_raw(Box::new(ScoreplayPlayer { inner }))
        }
        Err(e) => {
            error!("scoreplay_player_create: {e}");
            std::ptr::null_mut()
        }
    }
}

/// Destroy a player, cutting any sounding voices first.
///
/// # Safety
/// `player` must be a valid pointer returned by `scoreplay_player_create`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn scoreplay_player_destroy(player: *mut ScoreplayPlayer) {
    if !player.is_null() {
        let mut player = unsafe { Box::from_raw(player) };
        player.inner.stop();
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Player - Transport
// ═══════════════════════════════════════════════════════════════════════════

/// Start playback.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn scoreplay_player_play(player: *mut ScoreplayPlayer) {
    if player.is_null() {
        return;
    }
    unsafe { (*player).inner.play() };
}

/// Pause, keeping the position.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn scoreplay_player_pause(player: *mut ScoreplayPlayer) {
    if player.is_null() {
        return;
    }
    unsafe { (*player).inner.pause() };
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn scoreplay_player_toggle(player: *mut ScoreplayPlayer) {
    if player.is_null() {
        return;
    }
    unsafe { (*player).inner.toggle() };
}

/// Pause and rewind to the start.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn scoreplay_player_stop(player: *mut ScoreplayPlayer) {
    if player.is_null() {
        return;
    }
    unsafe { (*player).inner.stop() };
}

/// Seek to a position in beats.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn scoreplay_player_seek(player: *mut ScoreplayPlayer, beat: f64) {
    if player.is_null() {
        return;
    }
    unsafe { (*player).inner.seek(beat) };
}

/// Seek to a position in seconds at the current tempo.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn scoreplay_player_seek_seconds(player: *mut ScoreplayPlayer, seconds: f64) {
    if player.is_null() {
        return;
    }
    unsafe { (*player).inner.seek_seconds(seconds) };
}

/// Set tempo in BPM.
///
/// Returns the clamped tempo actually applied, or a negative value if the
/// request was rejected.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn scoreplay_player_set_tempo(player: *mut ScoreplayPlayer, bpm: f64) -> f64 {
    if player.is_null() {
        return -1.0;
    }
    match unsafe { (*player).inner.set_tempo(bpm) } {
        Ok((tempo, _)) => tempo,
        Err(e) => {
            error!("scoreplay_player_set_tempo: {e}");
            -1.0
        }
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn scoreplay_player_set_loop(player: *mut ScoreplayPlayer, enabled: bool) {
    if player.is_null() {
        return;
    }
    unsafe { (*player).inner.set_loop(enabled) };
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn scoreplay_player_set_expressiveness(
    player: *mut ScoreplayPlayer,
    amount: f32,
) {
    if player.is_null() {
        return;
    }
    unsafe { (*player).inner.set_expressiveness(amount) };
}

// ═══════════════════════════════════════════════════════════════════════════
// Player - Polling
// ═══════════════════════════════════════════════════════════════════════════

/// Run one scheduler pass. Returns the number of notes scheduled.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn scoreplay_player_poll(player: *mut ScoreplayPlayer) -> u32 {
    if player.is_null() {
        return 0;
    }
    unsafe { (*player).inner.poll() }.triggered.len() as u32
}

/// Report that a voice watched with `watch_ended` has finished.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn scoreplay_player_voice_ended(
    player: *mut ScoreplayPlayer,
    voice: u64,
) -> bool {
    if player.is_null() {
        return false;
    }
    unsafe { (*player).inner.voice_ended(voice) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn scoreplay_player_poll_interval_ms(player: *const ScoreplayPlayer) -> u32 {
    if player.is_null() {
        return PlaybackConfig::default().poll_interval.as_millis() as u32;
    }
    unsafe { (*player).inner.config() }.poll_interval.as_millis() as u32
}

// ═══════════════════════════════════════════════════════════════════════════
// Player - Readback
// ═══════════════════════════════════════════════════════════════════════════

/// Current transport state.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn scoreplay_player_readback(
    player: *const ScoreplayPlayer,
) -> ScoreplayReadback {
    if player.is_null() {
        return PlaybackReadback::default().into();
    }
    unsafe { (*player).inner.readback() }.into()
}
