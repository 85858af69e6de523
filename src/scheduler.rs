// src/scheduler.rs

use log::{debug, trace};

use crate::event::{NoteTrigger, TickOutcome, TickReport};
use crate::graph::SynthesisGraph;
use crate::note_index::NoteIndex;
use crate::score::Score;
use crate::state::{PlaybackConfig, PlaybackSession};
use crate::synth::VoiceSynthesizer;
use crate::transport::{PlaybackAnchor, TimeMapper};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
}

/// Hands upcoming notes to the synthesizer a short window ahead of the
/// playhead.
///
/// Polling is coarse (tens of milliseconds) but every voice is scheduled
/// against the device clock, so timing stays sample accurate as long as
/// the look-ahead window covers at least one polling period.
///
/// This struct:
/// - owns the scan state machine (`Idle -> Running -> Idle`)
/// - never schedules a note twice between two restarts
/// - never moves the scan cursor backwards except on an explicit restart
pub struct Scheduler {
    state: SchedulerState,
    notes: NoteIndex,
    total_beats: f64,

    lookahead_seconds: f64,
    resume_offset_seconds: f64,
    immediate_offset_seconds: f64,
    end_epsilon_beats: f64,
}

impl Scheduler {
    pub fn new(score: &Score, config: &PlaybackConfig) -> Self {
        Self {
            state: SchedulerState::Idle,
            notes: NoteIndex::new(score, config.max_sustain_beats),
            total_beats: score.total_beats(),
            lookahead_seconds: config.lookahead_seconds,
            resume_offset_seconds: config.resume_offset_seconds,
            immediate_offset_seconds: config.immediate_offset_seconds,
            end_epsilon_beats: config.end_epsilon_beats,
        }
    }

    // -------------------------------
    // MARK: Lifecycle
    // -------------------------------

    /// (Re)start playback at `from_beat`.
    ///
    /// Cuts every sounding voice, re-anchors so `from_beat` plays a short
    /// moment from now, rewinds the cursor to the resume index and runs the
    /// first pass immediately.
    pub fn start<G: SynthesisGraph>(
        &mut self,
        session: &mut PlaybackSession<G>,
        synth: &mut VoiceSynthesizer,
        from_beat: f64,
        now: f64,
    ) -> TickReport {
        session.voices.force_stop_all(&mut session.graph, now);
        self.rebase(session, from_beat, now);
        self.state = SchedulerState::Running;
        session.transport.is_playing = true;
        self.tick(session, synth, now)
    }

    /// One polling pass.
    pub fn tick<G: SynthesisGraph>(
        &mut self,
        session: &mut PlaybackSession<G>,
        synth: &mut VoiceSynthesizer,
        now: f64,
    ) -> TickReport {
        // Voices cut short by a stop still complete after it.
        session.voices.reap(&mut session.graph);

        if self.state == SchedulerState::Idle {
            return TickReport::idle();
        }

        // Deferred readiness: keep the cursor where it is until there is
        // somewhere to send voices.
        if !session.graph.is_ready() {
            return TickReport {
                triggered: Vec::new(),
                outcome: TickOutcome::Continue,
            };
        }

        let position = self.position(session, now);
        session.transport.current_beat = position;

        if position >= self.total_beats - self.end_epsilon_beats {
            if !session.transport.loop_enabled {
                self.finish(session, now);
                return TickReport {
                    triggered: Vec::new(),
                    outcome: TickOutcome::Finished,
                };
            }

            debug!("end of score at {now:.3}, looping to beat 0");
            session.voices.force_stop_all(&mut session.graph, now);
            self.rebase(session, 0.0, now);
            let position = self.position(session, now);
            return TickReport {
                triggered: self.scan(session, synth, position, now),
                outcome: TickOutcome::Looped,
            };
        }

        TickReport {
            triggered: self.scan(session, synth, position, now),
            outcome: TickOutcome::Continue,
        }
    }

    /// Stop scheduling, keep the position and cut every voice.
    pub fn stop<G: SynthesisGraph>(&mut self, session: &mut PlaybackSession<G>, now: f64) {
        if self.state == SchedulerState::Running {
            session.transport.current_beat = self.position(session, now);
        }
        self.state = SchedulerState::Idle;
        session.transport.is_playing = false;
        session.voices.force_stop_all(&mut session.graph, now);
    }

    // -------------------------------
    // MARK: Position
    // -------------------------------

    /// Live position while running, the stored snapshot otherwise.
    ///
    /// The timeline is pinned to the anchor beat until the anchor time
    /// arrives, so a restart does not read slightly before its target.
    pub fn position<G>(&self, session: &PlaybackSession<G>, now: f64) -> f64 {
        match self.state {
            SchedulerState::Running => {
                let mapper =
                    TimeMapper::new(session.anchor, session.transport.tempo, self.total_beats);
                mapper.beat_at(now.max(session.anchor.device_time))
            }
            SchedulerState::Idle => session.transport.current_beat,
        }
    }

    fn rebase<G>(&self, session: &mut PlaybackSession<G>, beat: f64, now: f64) {
        let beat = if beat.is_nan() {
            0.0
        } else {
            beat.clamp(0.0, self.total_beats)
        };
        session.anchor = PlaybackAnchor::new(beat, now + self.resume_offset_seconds);
        session.transport.current_beat = beat;
        session.transport.next_scan_index = self.notes.find_resume_index(beat);
    }

    fn finish<G: SynthesisGraph>(&mut self, session: &mut PlaybackSession<G>, now: f64) {
        debug!("end of score at {now:.3}, stopping");
        self.state = SchedulerState::Idle;
        session.transport.is_playing = false;
        session.transport.current_beat = self.total_beats;
        session.voices.force_stop_all(&mut session.graph, now);
    }

    // -------------------------------
    // MARK: Scan
    // -------------------------------

    /// Schedule every unvisited note starting inside the look-ahead window.
    fn scan<G: SynthesisGraph>(
        &self,
        session: &mut PlaybackSession<G>,
        synth: &mut VoiceSynthesizer,
        position: f64,
        now: f64,
    ) -> Vec<NoteTrigger> {
        let mapper = session.mapper(self.total_beats);
        let horizon = position + mapper.beats_for_seconds(self.lookahead_seconds);
        let mut cursor = session.transport.next_scan_index;
        let mut triggered = Vec::new();

        while let Some(&note) = self.notes.get(cursor) {
            if note.start_beat > horizon {
                break;
            }
            let index = cursor;
            cursor += 1;

            let end = note.end_beat();
            if end <= position {
                continue;
            }

            let (start_time, duration_override) = if note.start_beat >= position {
                (mapper.time_for_beat(note.start_beat), None)
            } else {
                (now + self.immediate_offset_seconds, Some(end - position))
            };

            let voice = synth.trigger(session, &note, start_time, duration_override);
            triggered.push(NoteTrigger {
                index,
                start_time,
                duration_override,
                voice,
            });
        }

        if !triggered.is_empty() {
            trace!(
                "scan {position:.3}..{horizon:.3}: {} note(s), cursor {} -> {cursor}",
                triggered.len(),
                session.transport.next_scan_index
            );
        }
        session.transport.next_scan_index = cursor;
        triggered
    }

    // -------------------------------
    // MARK: Accessors
    // -------------------------------

    #[inline]
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.state == SchedulerState::Running
    }

    #[inline]
    pub fn total_beats(&self) -> f64 {
        self.total_beats
    }

    #[inline]
    pub fn notes(&self) -> &NoteIndex {
        &self.notes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::RecordingGraph;
    use crate::score::{Note, Part};

    struct Rig {
        scheduler: Scheduler,
        session: PlaybackSession<RecordingGraph>,
        synth: VoiceSynthesizer,
    }

    fn rig(notes: Vec<Note>, total: f64, tempo: f64, loop_enabled: bool) -> Rig {
        let score = Score::new(notes, total, tempo, (21, 108)).unwrap();
        let config = PlaybackConfig {
            loop_enabled,
            ..Default::default()
        };
        Rig {
            scheduler: Scheduler::new(&score, &config),
            session: PlaybackSession::new(RecordingGraph::new(), tempo, &config),
            synth: VoiceSynthesizer::new(7),
        }
    }

    impl Rig {
        fn start(&mut self, beat: f64, now: f64) -> TickReport {
            self.scheduler
                .start(&mut self.session, &mut self.synth, beat, now)
        }

        fn tick(&mut self, now: f64) -> TickReport {
            self.session.graph.advance_to(now);
            self.scheduler.tick(&mut self.session, &mut self.synth, now)
        }
    }

    fn note(start: f64, dur: f64) -> Note {
        Note::new(start, dur, 60, Part::First)
    }

    #[test]
    fn test_resume_inside_note_truncates() {
        for seek in [1.0, 2.5, 3.99] {
            let mut r = rig(vec![note(0.0, 4.0), note(6.0, 1.0)], 8.0, 60.0, false);
            let report = r.start(seek, 10.0);

            assert_eq!(report.triggered.len(), 1, "seek {seek}");
            let t = report.triggered[0];
            assert_eq!(t.index, 0);
            assert!((t.start_time - 10.01).abs() < 1e-9);
            let remaining = t.duration_override.unwrap();
            assert!((remaining - (4.0 - seek)).abs() < 1e-9, "seek {seek}: {remaining}");
        }
    }

    #[test]
    fn test_notes_fully_past_are_skipped() {
        let mut r = rig(vec![note(0.0, 1.0), note(1.0, 1.0), note(3.0, 1.0)], 8.0, 60.0, false);
        let report = r.start(2.8, 0.0);
        let indices: Vec<usize> = report.triggered.iter().map(|t| t.index).collect();
        assert_eq!(indices, vec![2]);
        assert_eq!(report.triggered[0].duration_override, None);
        // Beat 3 is 0.2 beats after the anchor beat.
        assert!((report.triggered[0].start_time - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_each_note_fires_once_per_pass() {
        let notes: Vec<Note> = (0..32).map(|i| note(i as f64 * 0.5, 0.75)).collect();
        let mut r = rig(notes, 16.0, 100.0, false);

        let mut seen = vec![0usize; 32];
        let mut report = r.start(0.0, 0.0);
        let mut now = 0.0;
        let mut last_cursor = 0;
        loop {
            for t in &report.triggered {
                seen[t.index] += 1;
            }
            assert!(r.session.transport.next_scan_index >= last_cursor);
            last_cursor = r.session.transport.next_scan_index;
            if report.outcome == TickOutcome::Finished {
                break;
            }
            now += 0.02;
            report = r.tick(now);
        }

        assert!(seen.iter().all(|&n| n == 1), "{seen:?}");
        assert!(!r.session.transport.is_playing);
        assert_eq!(r.session.transport.current_beat, 16.0);
    }

    #[test]
    fn test_notes_scheduled_ahead_of_their_start() {
        let mut r = rig(vec![note(2.0, 1.0)], 4.0, 60.0, false);
        r.start(0.0, 0.0);

        let mut now = 0.0;
        let trigger = loop {
            now += 0.02;
            let report = r.tick(now);
            if let Some(t) = report.triggered.first() {
                break *t;
            }
        };
        // Beat 2 sounds at anchor (0.05) + 2 s; picked up no later than
        // half a second before.
        assert!((trigger.start_time - 2.05).abs() < 1e-9);
        assert!(trigger.start_time - now <= 0.5 + 1e-9);
        assert!(trigger.start_time - now >= 0.5 - 0.02 - 1e-9);
    }

    #[test]
    fn test_loop_wraps_to_first_note() {
        let mut r = rig(vec![note(0.0, 1.0), note(1.0, 1.0)], 2.0, 60.0, true);
        r.start(0.0, 0.0);

        let mut now = 0.0;
        let report = loop {
            now += 0.02;
            let report = r.tick(now);
            if report.outcome == TickOutcome::Looped {
                break report;
            }
            assert!(now < 5.0, "never looped");
        };

        assert!(r.scheduler.is_running());
        assert_eq!(report.triggered[0].index, 0);
        assert!((report.triggered[0].start_time - (now + 0.05)).abs() < 1e-9);
        assert_eq!(r.session.anchor.beat, 0.0);
        // Cursor restarted from the resume index for beat 0 and advanced
        // past what the first pass scheduled.
        assert_eq!(r.scheduler.notes().find_resume_index(0.0), 0);
        assert_eq!(r.session.transport.next_scan_index, report.triggered.len());
    }

    #[test]
    fn test_start_at_total_beats_schedules_nothing() {
        let mut r = rig(vec![note(0.0, 1.0), note(3.0, 1.0)], 4.0, 60.0, false);
        let report = r.start(4.0, 1.0);
        assert!(report.triggered.is_empty());
        assert_eq!(report.outcome, TickOutcome::Finished);
        assert!(!r.scheduler.is_running());
        assert_eq!(r.session.transport.current_beat, 4.0);
    }

    #[test]
    fn test_unready_graph_keeps_cursor() {
        let mut r = rig(vec![note(0.0, 1.0)], 4.0, 60.0, false);
        r.session.graph.set_ready(false);
        let report = r.start(0.0, 0.0);
        assert!(report.triggered.is_empty());
        assert_eq!(report.outcome, TickOutcome::Continue);
        assert_eq!(r.session.transport.next_scan_index, 0);

        r.session.graph.set_ready(true);
        let report = r.tick(0.02);
        assert_eq!(report.triggered.len(), 1);
        assert_eq!(r.session.transport.next_scan_index, 1);
    }

    #[test]
    fn test_stop_snapshots_position_and_cuts_voices() {
        let mut r = rig(vec![note(0.0, 4.0), note(0.25, 4.0)], 8.0, 60.0, false);
        r.start(0.0, 0.0);
        assert_eq!(r.session.voices.active_count(), 2);

        r.tick(1.05);
        r.scheduler.stop(&mut r.session, 1.05);
        assert!((r.session.transport.current_beat - 1.0).abs() < 1e-9);
        assert!(!r.session.transport.is_playing);
        assert_eq!(r.tick(1.2).outcome, TickOutcome::Idle);

        r.session.graph.advance_to(1.1);
        r.session.voices.reap(&mut r.session.graph);
        assert_eq!(r.session.voices.active_count(), 0);
    }

    #[test]
    fn test_restart_removes_pending_voices() {
        let mut r = rig(vec![note(0.0, 1.0), note(0.2, 1.0)], 8.0, 60.0, false);
        r.start(0.0, 0.0);
        assert_eq!(r.session.voices.active_count(), 2);

        // Neither voice has started yet; restarting drops them outright.
        let report = r.start(4.0, 0.01);
        assert!(report.triggered.is_empty());
        assert_eq!(r.session.voices.active_count(), 0);
        assert_eq!(r.session.graph.live_nodes(), 0);
    }

    #[test]
    fn test_duration_scales_with_tempo() {
        let mut slow = rig(vec![note(0.0, 2.0)], 4.0, 50.0, false);
        let mut fast = rig(vec![note(0.0, 2.0)], 4.0, 100.0, false);
        let a = slow.start(0.0, 0.0).triggered[0].voice.unwrap();
        let b = fast.start(0.0, 0.0).triggered[0].voice.unwrap();

        let span = |r: &Rig, id| {
            let v = r.session.voices.get(id).unwrap();
            v.stop_time - v.start_time
        };
        // Sounding part (without the fixed release tail) halves.
        let slow_len = span(&slow, a) - 0.06;
        let fast_len = span(&fast, b) - 0.06;
        assert!((slow_len / fast_len - 2.0).abs() < 1e-9);
        assert_eq!(slow.session.voices.get(a).unwrap().note.start_beat, 0.0);
    }
}
