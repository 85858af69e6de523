// src/controller.rs
//
// Transport control surface.
//
// The TransportController owns the playback session and is the only thing
// that starts, stops or re-anchors the scheduler. Every public operation
// here is what a UI button, a CLI flag or a host binding ends up calling.

use log::{debug, info, warn};

use crate::clock::Clock;
use crate::error::ConfigError;
use crate::event::TickReport;
use crate::graph::SynthesisGraph;
use crate::scheduler::Scheduler;
use crate::score::{Note, Score};
use crate::state::{Command, PlaybackConfig, PlaybackReadback, PlaybackSession};
use crate::synth::VoiceSynthesizer;
use crate::transport::beats_for_seconds;
use crate::voice::VoiceId;

/// Plays one score through one synthesis graph.
///
/// This runs on a single execution context and coordinates between:
/// - PlaybackSession (transport state, voices, graph)
/// - Scheduler (beats -> device time, look-ahead scanning)
/// - VoiceSynthesizer (note -> voice)
/// - the device clock
pub struct TransportController<G, C> {
    session: PlaybackSession<G>,
    scheduler: Scheduler,
    synth: VoiceSynthesizer,
    clock: C,
    config: PlaybackConfig,
}

impl<G: SynthesisGraph, C: Clock> TransportController<G, C> {
    /// Build a stopped transport at beat 0.
    ///
    /// The initial tempo is the score's tempo, rounded and clamped to the
    /// supported range.
    pub fn new(
        score: &Score,
        graph: G,
        clock: C,
        config: PlaybackConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let tempo = config.clamp_tempo(score.tempo().round())?;

        info!(
            "transport ready: {} notes, {} beats, {tempo} bpm",
            score.notes().len(),
            score.total_beats()
        );

        let scheduler = Scheduler::new(score, &config);
        let outlasting = scheduler.notes().outlasting_resume_window();
        if outlasting > 0 {
            warn!(
                "{outlasting} note(s) longer than {} beats (longest {}): \
                 resuming inside one will not replay it",
                config.max_sustain_beats,
                score.longest_note()
            );
        }

        Ok(Self {
            session: PlaybackSession::new(graph, tempo, &config),
            scheduler,
            synth: VoiceSynthesizer::new(config.vibrato_seed),
            clock,
            config,
        })
    }

    // ═════════════════════════════════════════════════════════════════
    // Transport
    // ═════════════════════════════════════════════════════════════════

    /// Start playback from the current position.
    ///
    /// A transport parked at the end of the score starts over from beat 0.
    /// Without a ready graph this is a no-op; call again once it is.
    pub fn play(&mut self) -> TickReport {
        if self.scheduler.is_running() {
            return TickReport::idle();
        }
        if !self.session.graph.is_ready() {
            info!("play deferred: synthesis graph not ready");
            return TickReport::idle();
        }

        let total = self.scheduler.total_beats();
        let mut from = self.session.transport.current_beat;
        if from >= total - self.config.end_epsilon_beats {
            from = 0.0;
        }

        info!("play from beat {from:.2} at {} bpm", self.session.transport.tempo);
        let now = self.clock.now();
        self.scheduler
            .start(&mut self.session, &mut self.synth, from, now)
    }

    /// Stop scheduling and keep the position.
    pub fn pause(&mut self) {
        if !self.scheduler.is_running() {
            return;
        }
        let now = self.clock.now();
        self.scheduler.stop(&mut self.session, now);
        info!("pause at beat {:.2}", self.session.transport.current_beat);
    }

    pub fn toggle(&mut self) -> TickReport {
        if self.scheduler.is_running() {
            self.pause();
            TickReport::idle()
        } else {
            self.play()
        }
    }

    /// Pause and rewind to the start of the score.
    pub fn stop(&mut self) {
        let now = self.clock.now();
        self.scheduler.stop(&mut self.session, now);
        self.session.transport.current_beat = 0.0;
        self.session.transport.next_scan_index = 0;
        info!("stop");
    }

    /// Move the playhead.
    ///
    /// While playing the scheduler restarts at the target; while paused only
    /// the stored position changes. Non-finite targets are ignored.
    pub fn seek(&mut self, beat: f64) -> TickReport {
        if !beat.is_finite() {
            debug!("seek to {beat} ignored");
            return TickReport::idle();
        }
        let target = beat.clamp(0.0, self.scheduler.total_beats());
        info!("seek to beat {target:.2}");

        if self.scheduler.is_running() {
            let now = self.clock.now();
            return self
                .scheduler
                .start(&mut self.session, &mut self.synth, target, now);
        }

        self.session.transport.current_beat = target;
        self.session.transport.next_scan_index = self.scheduler.notes().find_resume_index(target);
        TickReport::idle()
    }

    /// Seek to a clock position at the current tempo.
    pub fn seek_seconds(&mut self, seconds: f64) -> TickReport {
        self.seek(beats_for_seconds(seconds, self.session.transport.tempo))
    }

    /// Change the tempo, clamped to the supported range.
    ///
    /// While playing, the current beat is kept and the scheduler restarts
    /// under the new tempo, so nothing scheduled under the old anchor plays
    /// twice. Returns the tempo actually applied and the restart's first
    /// pass (idle when paused or unchanged).
    pub fn set_tempo(&mut self, bpm: f64) -> Result<(f64, TickReport), ConfigError> {
        let tempo = self.config.clamp_tempo(bpm)?;
        if tempo == self.session.transport.tempo {
            return Ok((tempo, TickReport::idle()));
        }

        info!("tempo {} -> {tempo} bpm", self.session.transport.tempo);
        if !self.scheduler.is_running() {
            self.session.transport.tempo = tempo;
            return Ok((tempo, TickReport::idle()));
        }

        let now = self.clock.now();
        let beat = self.scheduler.position(&self.session, now);
        self.session.transport.tempo = tempo;
        let report = self
            .scheduler
            .start(&mut self.session, &mut self.synth, beat, now);
        Ok((tempo, report))
    }

    pub fn set_loop(&mut self, enabled: bool) {
        if self.session.transport.loop_enabled != enabled {
            info!("loop {}", if enabled { "on" } else { "off" });
        }
        self.session.transport.loop_enabled = enabled;
    }

    /// Vibrato and tremolo depth for voices triggered from now on.
    pub fn set_expressiveness(&mut self, amount: f32) {
        self.session.expressiveness = PlaybackConfig::clamp_expressiveness(amount);
        debug!("expressiveness {}", self.session.expressiveness);
    }

    /// Apply a queued command.
    pub fn apply(&mut self, command: Command) -> Result<TickReport, ConfigError> {
        let report = match command {
            Command::Play => self.play(),
            Command::Pause => {
                self.pause();
                TickReport::idle()
            }
            Command::TogglePlayback => self.toggle(),
            Command::Stop => {
                self.stop();
                TickReport::idle()
            }
            Command::Seek { beat } => self.seek(beat),
            Command::SeekSeconds { seconds } => self.seek_seconds(seconds),
            Command::SetTempo { bpm } => self.set_tempo(bpm)?.1,
            Command::SetLoop { enabled } => {
                self.set_loop(enabled);
                TickReport::idle()
            }
            Command::SetExpressiveness { amount } => {
                self.set_expressiveness(amount);
                TickReport::idle()
            }
        };
        Ok(report)
    }

    // ═════════════════════════════════════════════════════════════════
    // Polling
    // ═════════════════════════════════════════════════════════════════

    /// One scheduler pass. Call every `config().poll_interval`.
    pub fn poll(&mut self) -> TickReport {
        let now = self.clock.now();
        self.scheduler.tick(&mut self.session, &mut self.synth, now)
    }

    /// A host reports that a voice's main oscillator has stopped.
    ///
    /// Returns whether the voice was still active.
    pub fn voice_ended(&mut self, voice: VoiceId) -> bool {
        self.session.voices.cleanup(voice, &mut self.session.graph)
    }

    // ═════════════════════════════════════════════════════════════════
    // Readout
    // ═════════════════════════════════════════════════════════════════

    /// Playhead in beats.
    pub fn current_position(&self) -> f64 {
        self.scheduler.position(&self.session, self.clock.now())
    }

    pub fn readback(&self) -> PlaybackReadback {
        PlaybackReadback {
            beat: self.current_position(),
            tempo: self.session.transport.tempo,
            total_beats: self.scheduler.total_beats(),
            playing: self.session.transport.is_playing,
            loop_enabled: self.session.transport.loop_enabled,
            active_voices: self.session.voices.active_count(),
        }
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.session.transport.is_playing
    }

    #[inline]
    pub fn tempo(&self) -> f64 {
        self.session.transport.tempo
    }

    #[inline]
    pub fn total_beats(&self) -> f64 {
        self.scheduler.total_beats()
    }

    /// A note of the score by its sorted index.
    pub fn note(&self, index: usize) -> Option<&Note> {
        self.scheduler.notes().get(index)
    }

    pub fn session(&self) -> &PlaybackSession<G> {
        &self.session
    }

    pub fn graph(&self) -> &G {
        &self.session.graph
    }

    pub fn graph_mut(&mut self) -> &mut G {
        &mut self.session.graph
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }
}
