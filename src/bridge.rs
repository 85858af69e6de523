//! Threaded player: a transport running on its own thread.
//!
//! This module provides the host form for multi-threaded callers (native
//! apps, the CLI). One dedicated thread owns the [`TransportController`]
//! and is the only context that ever touches the session, so the core
//! needs no locks.
//!
//! # Architecture
//!
//! - **Caller** owns a [`PlayerHandle`] and sends [`Command`]s
//! - **Playback thread** applies commands in order, polls the scheduler
//!   at the configured cadence and publishes a [`PlaybackReadback`]
//! - Communication uses MPSC channels for commands and errors and atomics
//!   for readback
//!
//! # Usage
//!
//! ```ignore
//! let controller = TransportController::new(&score, graph, SystemClock::new(), config)?;
//! let player = spawn_player(controller)?;
//!
//! player.play();
//! player.set_tempo(72.0);
//! println!("{}", player.readback().status_line());
//! ```

use std::io;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
    mpsc::{self, Receiver, RecvTimeoutError, Sender},
};
use std::thread::{self, JoinHandle};

use log::{debug, warn};

use crate::clock::Clock;
use crate::controller::TransportController;
use crate::error::ConfigError;
use crate::graph::SynthesisGraph;
use crate::state::{Command, PlaybackReadback};

/// Lock-free shared state for playback -> caller readback.
///
/// f64 values are stored as bits (no AtomicF64 in std).
struct SharedReadback {
    beat_bits: AtomicU64,
    tempo_bits: AtomicU64,
    total_beats_bits: AtomicU64,
    active_voices: AtomicU64,
    playing: AtomicBool,
    loop_enabled: AtomicBool,
}

impl SharedReadback {
    fn new(initial: &PlaybackReadback) -> Self {
        let shared = Self {
            beat_bits: AtomicU64::new(0),
            tempo_bits: AtomicU64::new(0),
            total_beats_bits: AtomicU64::new(0),
            active_voices: AtomicU64::new(0),
            playing: AtomicBool::new(false),
            loop_enabled: AtomicBool::new(false),
        };
        shared.store(initial);
        shared
    }

    fn store(&self, readback: &PlaybackReadback) {
        self.beat_bits
            .store(readback.beat.to_bits(), Ordering::Relaxed);
        self.tempo_bits
            .store(readback.tempo.to_bits(), Ordering::Relaxed);
        self.total_beats_bits
            .store(readback.total_beats.to_bits(), Ordering::Relaxed);
        self.active_voices
            .store(readback.active_voices as u64, Ordering::Relaxed);
        self.loop_enabled
            .store(readback.loop_enabled, Ordering::Relaxed);
        self.playing.store(readback.playing, Ordering::Release);
    }

    fn load(&self) -> PlaybackReadback {
        let playing = self.playing.load(Ordering::Acquire);
        PlaybackReadback {
            beat: f64::from_bits(self.beat_bits.load(Ordering::Relaxed)),
            tempo: f64::from_bits(self.tempo_bits.load(Ordering::Relaxed)),
            total_beats: f64::from_bits(self.total_beats_bits.load(Ordering::Relaxed)),
            playing,
            loop_enabled: self.loop_enabled.load(Ordering::Relaxed),
            active_voices: self.active_voices.load(Ordering::Relaxed) as usize,
        }
    }
}

/// Handle to a transport running on its own thread.
///
/// All methods are safe to call from any thread that owns the handle.
/// Dropping the handle stops playback (cutting every voice) and joins the
/// playback thread.
pub struct PlayerHandle {
    /// Channel to send commands to the playback thread.
    command_tx: Sender<Command>,

    /// Rejected commands, reported back.
    error_rx: Receiver<ConfigError>,

    /// Shared readback state (written by the playback thread).
    readback: Arc<SharedReadback>,

    shutdown: Arc<AtomicBool>,

    thread: Option<JoinHandle<()>>,
}

/// Move a controller onto a new playback thread.
pub fn spawn_player<G, C>(mut controller: TransportController<G, C>) -> io::Result<PlayerHandle>
where
    G: SynthesisGraph + Send + 'static,
    C: Clock + Send + 'static,
{
    let (command_tx, command_rx) = mpsc::channel();
    let (error_tx, error_rx) = mpsc::channel();
    let readback = Arc::new(SharedReadback::new(&controller.readback()));
    let shutdown = Arc::new(AtomicBool::new(false));

    let thread = {
        let readback = Arc::clone(&readback);
        let shutdown = Arc::clone(&shutdown);
        thread::Builder::new()
            .name("scoreplay-transport".into())
            .spawn(move || {
                run_player(&mut controller, &command_rx, &error_tx, &readback, &shutdown);
            })?
    };

    Ok(PlayerHandle {
        command_tx,
        error_rx,
        readback,
        shutdown,
        thread: Some(thread),
    })
}

// ═══════════════════════════════════════════════════════════════════
// Playback thread
// ═══════════════════════════════════════════════════════════════════

fn run_player<G: SynthesisGraph, C: Clock>(
    controller: &mut TransportController<G, C>,
    command_rx: &Receiver<Command>,
    error_tx: &Sender<ConfigError>,
    readback: &SharedReadback,
    shutdown: &AtomicBool,
) {
    let poll_interval = controller.config().poll_interval;
    debug!("playback thread started, polling every {poll_interval:?}");

    while !shutdown.load(Ordering::Acquire) {
        match command_rx.recv_timeout(poll_interval) {
            Ok(command) => {
                if let Err(err) = controller.apply(command) {
                    warn!("command rejected: {err}");
                    let _ = error_tx.send(err);
                }
                // Apply everything queued before the next pass.
                while let Ok(command) = command_rx.try_recv() {
                    if let Err(err) = controller.apply(command) {
                        warn!("command rejected: {err}");
                        let _ = error_tx.send(err);
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        controller.poll();
        readback.store(&controller.readback());
    }

    // Leave nothing sounding behind.
    controller.stop();
    readback.store(&controller.readback());
    debug!("playback thread stopped");
}

// ═══════════════════════════════════════════════════════════════════
// PlayerHandle - caller API
// ═══════════════════════════════════════════════════════════════════

impl PlayerHandle {
    /// Queue a command. Returns false if the playback thread has exited.
    pub fn send(&self, command: Command) -> bool {
        self.command_tx.send(command).is_ok()
    }

    pub fn play(&self) {
        self.send(Command::Play);
    }

    pub fn pause(&self) {
        self.send(Command::Pause);
    }

    pub fn toggle(&self) {
        self.send(Command::TogglePlayback);
    }

    pub fn stop(&self) {
        self.send(Command::Stop);
    }

    pub fn seek(&self, beat: f64) {
        self.send(Command::Seek { beat });
    }

    pub fn seek_seconds(&self, seconds: f64) {
        self.send(Command::SeekSeconds { seconds });
    }

    pub fn set_tempo(&self, bpm: f64) {
        self.send(Command::SetTempo { bpm });
    }

    pub fn set_loop(&self, enabled: bool) {
        self.send(Command::SetLoop { enabled });
    }

    pub fn set_expressiveness(&self, amount: f32) {
        self.send(Command::SetExpressiveness { amount });
    }

    /// Latest published transport state.
    pub fn readback(&self) -> PlaybackReadback {
        self.readback.load()
    }

    /// Errors from commands the transport rejected since the last call.
    pub fn poll_errors(&self) -> Vec<ConfigError> {
        self.error_rx.try_iter().collect()
    }

    /// Stop playback and wait for the playback thread to exit.
    pub fn shutdown(mut self) {
        self.join();
    }

    fn join(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("playback thread panicked");
            }
        }
    }
}

impl Drop for PlayerHandle {
    fn drop(&mut self) {
        self.join();
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::clock::ManualClock;
    use crate::graph::RecordingGraph;
    use crate::score::{Note, Part, Score};
    use crate::state::PlaybackConfig;

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    fn spawn(clock: &ManualClock) -> PlayerHandle {
        let score = Score::new(
            vec![Note::new(0.0, 4.0, 60, Part::First)],
            8.0,
            60.0,
            (21, 108),
        )
        .unwrap();
        let config = PlaybackConfig {
            poll_interval: Duration::from_millis(5),
            ..Default::default()
        };
        let controller =
            TransportController::new(&score, RecordingGraph::new(), clock.clone(), config)
                .unwrap();
        spawn_player(controller).unwrap()
    }

    #[test]
    fn test_commands_reach_playback_thread() {
        let clock = ManualClock::new(0.0);
        let player = spawn(&clock);

        let initial = player.readback();
        assert!(!initial.playing);
        assert_eq!(initial.total_beats, 8.0);
        assert_eq!(initial.tempo, 60.0);

        player.play();
        assert!(wait_for(|| player.readback().playing));
        assert!(wait_for(|| player.readback().active_voices == 1));

        clock.set(1.05);
        assert!(wait_for(|| (player.readback().beat - 1.0).abs() < 1e-9));

        player.set_tempo(150.0);
        assert!(wait_for(|| player.readback().tempo == 100.0));

        player.pause();
        assert!(wait_for(|| !player.readback().playing));
    }

    #[test]
    fn test_rejected_commands_are_reported() {
        let clock = ManualClock::new(0.0);
        let player = spawn(&clock);

        player.set_tempo(-5.0);
        let mut errors = Vec::new();
        assert!(wait_for(|| {
            errors.extend(player.poll_errors());
            !errors.is_empty()
        }));
        assert_eq!(errors, vec![ConfigError::InvalidTempo(-5.0)]);
        assert_eq!(player.readback().tempo, 60.0);
    }

    #[test]
    fn test_shutdown_stops_playback() {
        let clock = ManualClock::new(0.0);
        let player = spawn(&clock);
        player.play();
        assert!(wait_for(|| player.readback().playing));

        let readback = Arc::clone(&player.readback);
        player.shutdown();
        let last = readback.load();
        assert!(!last.playing);
        assert_eq!(last.beat, 0.0);
    }
}
