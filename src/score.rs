// src/score.rs
//
// The precomputed score: notes, parts and the document loader.
//
// A Score is validated and sorted exactly once, when it is built. Nothing
// downstream mutates it; the note index and scheduler only read it.

use std::cmp::Ordering;

use serde::Deserialize;

use crate::error::ScoreError;

/// Tempo used when a score document does not declare one.
pub const DEFAULT_SCORE_TEMPO: f64 = 100.0;

// ═══════════════════════════════════════════════════════════════════
// Part
// ═══════════════════════════════════════════════════════════════════

/// The voice tag a note belongs to.
///
/// Closed set of three parts. Each carries its own loudness tier and the
/// colours a piano-roll view uses for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Part {
    First,
    Second,
    Third,
}

impl Part {
    /// Peak envelope gain for notes of this part.
    #[inline]
    pub fn base_gain(self) -> f32 {
        match self {
            Part::First => 0.2,
            Part::Second => 0.18,
            Part::Third => 0.17,
        }
    }

    /// (fill, stroke) colours for rendering.
    pub fn colors(self) -> (&'static str, &'static str) {
        match self {
            Part::First => ("#bcded7", "#89b4ad"),
            Part::Second => ("#d2d5ee", "#9ba1c8"),
            Part::Third => ("#ebe3c5", "#baa97a"),
        }
    }

    /// Number used for this part in score documents.
    pub fn number(self) -> u8 {
        match self {
            Part::First => 1,
            Part::Second => 2,
            Part::Third => 3,
        }
    }
}

impl TryFrom<u8> for Part {
    type Error = ScoreError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Part::First),
            2 => Ok(Part::Second),
            3 => Ok(Part::Third),
            other => Err(ScoreError::UnknownPart(other)),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════
// Note
// ═══════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Note {
    pub start_beat: f64,
    pub duration_beats: f64,
    /// MIDI note number.
    pub pitch: u8,
    pub part: Part,
}

impl Note {
    pub fn new(start_beat: f64, duration_beats: f64, pitch: u8, part: Part) -> Self {
        Self {
            start_beat,
            duration_beats,
            pitch,
            part,
        }
    }

    #[inline]
    pub fn end_beat(&self) -> f64 {
        self.start_beat + self.duration_beats
    }

    /// Total order used to sort a score: start, part, pitch, duration.
    fn sort_key_cmp(&self, other: &Self) -> Ordering {
        self.start_beat
            .total_cmp(&other.start_beat)
            .then(self.part.cmp(&other.part))
            .then(self.pitch.cmp(&other.pitch))
            .then(self.duration_beats.total_cmp(&other.duration_beats))
    }
}

/// Equal-tempered frequency for a MIDI note (A4 = 69 = 440 Hz).
#[inline]
pub fn midi_to_hz(pitch: u8) -> f32 {
    440.0 * 2.0_f32.powf((pitch as f32 - 69.0) / 12.0)
}

/// Scientific pitch name, e.g. 60 -> "C4", 66 -> "F#4".
pub fn midi_to_label(pitch: u8) -> String {
    const NAMES: [&str; 12] = [
        "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
    ];
    let octave = (pitch / 12) as i32 - 1;
    format!("{}{}", NAMES[(pitch % 12) as usize], octave)
}

// ═══════════════════════════════════════════════════════════════════
// Score
// ═══════════════════════════════════════════════════════════════════

/// A validated, sorted score.
#[derive(Debug, Clone)]
pub struct Score {
    notes: Vec<Note>,
    total_beats: f64,
    tempo: f64,
    pitch_range: (u8, u8),
}

impl Score {
    /// Validate and sort a set of notes.
    ///
    /// Notes are sorted with a stable sort on (start, part, pitch,
    /// duration). Malformed values are rejected, never coerced.
    pub fn new(
        mut notes: Vec<Note>,
        total_beats: f64,
        tempo: f64,
        pitch_range: (u8, u8),
    ) -> Result<Self, ScoreError> {
        if !total_beats.is_finite() || total_beats <= 0.0 {
            return Err(ScoreError::InvalidTotalBeats(total_beats));
        }
        if !tempo.is_finite() || tempo <= 0.0 {
            return Err(ScoreError::InvalidTempo(tempo));
        }
        let (min, max) = pitch_range;
        if min > max {
            return Err(ScoreError::InvalidPitchRange { min, max });
        }

        for (index, note) in notes.iter().enumerate() {
            if !note.start_beat.is_finite() || note.start_beat < 0.0 {
                return Err(ScoreError::InvalidNote {
                    index,
                    message: format!("start beat {} is not a non-negative number", note.start_beat),
                });
            }
            if !note.duration_beats.is_finite() || note.duration_beats <= 0.0 {
                return Err(ScoreError::InvalidNote {
                    index,
                    message: format!("duration {} is not positive", note.duration_beats),
                });
            }
            if note.start_beat > total_beats {
                return Err(ScoreError::NoteAfterEnd {
                    index,
                    start_beat: note.start_beat,
                    total_beats,
                });
            }
            if note.pitch < min || note.pitch > max {
                return Err(ScoreError::PitchOutOfRange {
                    index,
                    pitch: note.pitch,
                    min,
                    max,
                });
            }
        }

        notes.sort_by(Note::sort_key_cmp);

        Ok(Self {
            notes,
            total_beats,
            tempo,
            pitch_range,
        })
    }

    /// Parse a score document.
    ///
    /// ```json
    /// { "notes": [[0, 2, 60, 1]], "totalBeats": 2, "tempo": 60, "midiRange": [48, 84] }
    /// ```
    ///
    /// Each note is `[start_beat, duration_beats, pitch, part]`. A missing
    /// tempo falls back to `DEFAULT_SCORE_TEMPO`.
    pub fn from_json(source: &str) -> Result<Self, ScoreError> {
        let doc: ScoreDocument = serde_json::from_str(source)?;
        let notes = doc
            .notes
            .into_iter()
            .map(|(start, duration, pitch, part)| {
                Ok(Note::new(start, duration, pitch, Part::try_from(part)?))
            })
            .collect::<Result<Vec<_>, ScoreError>>()?;

        Self::new(
            notes,
            doc.total_beats,
            doc.tempo.unwrap_or(DEFAULT_SCORE_TEMPO),
            (doc.midi_range[0], doc.midi_range[1]),
        )
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn total_beats(&self) -> f64 {
        self.total_beats
    }

    /// Tempo declared by the score document.
    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    pub fn pitch_range(&self) -> (u8, u8) {
        self.pitch_range
    }

    /// Longest note duration in the score, in beats.
    pub fn longest_note(&self) -> f64 {
        self.notes
            .iter()
            .map(|n| n.duration_beats)
            .fold(0.0, f64::max)
    }
}

/// On-disk shape of a score document.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScoreDocument {
    notes: Vec<(f64, f64, u8, u8)>,
    total_beats: f64,
    #[serde(default)]
    tempo: Option<f64>,
    midi_range: [u8; 2],
}
