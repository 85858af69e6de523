// src/main.rs
//
// Dry-run player: plays a score against the in-memory graph on a simulated
// clock and prints every note as it is scheduled.

use std::path::PathBuf;
use std::{env, fs, process};

use anyhow::Context;
use clap::Parser;
use log::LevelFilter;

use scoreplay::graph::RecordingGraph;
use scoreplay::{
    Clock, ManualClock, PlaybackConfig, Score, TickOutcome, TransportController, format_bar_beat,
    midi_to_label, sounding_seconds,
};

/// Short three-part phrase used when no score is given.
const DEMO_SCORE: &str = r#"{
    "notes": [
        [0, 2, 67, 1], [2, 1, 69, 1], [3, 1, 71, 1], [4, 4, 72, 1],
        [0, 4, 60, 2], [4, 4, 64, 2],
        [0, 8, 48, 3]
    ],
    "totalBeats": 8,
    "tempo": 84,
    "midiRange": [36, 96]
}"#;

/// Logging is controlled with RUST_LOG; see docs for the env_logger crate.
/// If RUST_LOG is not set, the log level defaults to Info.
#[derive(Parser)]
#[command(version, about, long_about = None, verbatim_doc_comment)]
struct Cli {
    /// Score document (JSON). A short built-in phrase plays if omitted.
    score: Option<PathBuf>,

    /// Tempo in BPM (clamped to the supported range)
    #[arg(long)]
    tempo: Option<f64>,

    /// Start position in beats
    #[arg(long, default_value_t = 0.0)]
    from: f64,

    /// Number of times to loop back to the start before stopping
    #[arg(long, default_value_t = 0)]
    loops: u32,
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut log_builder = env_logger::builder();
    if env::var("RUST_LOG").is_err() {
        log_builder.filter_level(LevelFilter::Info);
    }
    log_builder.init();

    let source = match &cli.score {
        Some(path) => fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?,
        None => DEMO_SCORE.to_string(),
    };
    let score = Score::from_json(&source)?;

    let config = PlaybackConfig {
        loop_enabled: cli.loops > 0,
        ..Default::default()
    };
    let poll = config.poll_interval.as_secs_f64();
    let clock = ManualClock::new(0.0);
    let mut player =
        TransportController::new(&score, RecordingGraph::new(), clock.clone(), config)?;

    if let Some(bpm) = cli.tempo {
        player.set_tempo(bpm)?;
    }
    player.seek(cli.from);

    let mut loops_left = cli.loops;
    let mut voices = 0usize;
    let mut report = player.play();
    loop {
        for trigger in &report.triggered {
            let Some(note) = player.note(trigger.index).copied() else {
                continue;
            };
            voices += usize::from(trigger.voice.is_some());
            let beats = trigger.duration_override.unwrap_or(note.duration_beats);
            println!(
                "{:>8.3}s  {:<20}  {:>4}  part {}  {:.3}s{}",
                trigger.start_time,
                format_bar_beat(note.start_beat),
                midi_to_label(note.pitch),
                note.part.number(),
                sounding_seconds(beats, player.tempo()),
                if trigger.is_truncated() { "  (resumed)" } else { "" }
            );
        }

        match report.outcome {
            TickOutcome::Finished | TickOutcome::Idle => break,
            TickOutcome::Looped => {
                println!("--- loop ---");
                loops_left = loops_left.saturating_sub(1);
                if loops_left == 0 {
                    player.set_loop(false);
                }
            }
            TickOutcome::Continue => {}
        }

        // Only node lifetimes matter here; drop the command log as it grows.
        player.graph_mut().clear_calls();
        clock.advance(poll);
        player.graph_mut().advance_to(clock.now());
        report = player.poll();
    }

    // Let the last releases ring out so every voice is cleaned up.
    let tail = clock.now() + 1.0;
    while clock.now() < tail {
        clock.advance(poll);
        player.graph_mut().advance_to(clock.now());
        player.poll();
    }

    let readback = player.readback();
    println!(
        "{} | {voices} voice(s), {} still active, {} graph node(s) live",
        readback.status_line(),
        readback.active_voices,
        player.graph().live_nodes()
    );
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e}");
        process::exit(2);
    }
}
