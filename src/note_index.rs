// src/note_index.rs
//
// Read-only, start-sorted view over the score's notes.

use std::sync::Arc;

use crate::score::{Note, Score};

/// Fast "first note at or after beat X" lookup.
///
/// Used by the scheduler to pick a scan cursor after a seek, tempo change
/// or loop restart without rescanning from the top of the score.
///
/// Known limitation: resuming only backs up `max_sustain_beats`. A note
/// longer than that which started earlier is not replayed on resume.
#[derive(Debug, Clone)]
pub struct NoteIndex {
    notes: Arc<[Note]>,
    max_sustain_beats: f64,
}

impl NoteIndex {
    pub fn new(score: &Score, max_sustain_beats: f64) -> Self {
        Self {
            notes: score.notes().into(),
            max_sustain_beats,
        }
    }

    /// Insertion point for `beat`: every note before it starts strictly
    /// before `beat`.
    #[inline]
    pub fn index_of_first_note_at_or_after(&self, beat: f64) -> usize {
        self.notes.partition_point(|n| n.start_beat < beat)
    }

    /// Scan cursor for resuming at `beat`, backed up far enough to catch
    /// notes still sounding at that beat.
    #[inline]
    pub fn find_resume_index(&self, beat: f64) -> usize {
        self.index_of_first_note_at_or_after((beat - self.max_sustain_beats).max(0.0))
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&Note> {
        self.notes.get(index)
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn max_sustain_beats(&self) -> f64 {
        self.max_sustain_beats
    }

    /// Notes too long to be found again by [`find_resume_index`](Self::find_resume_index).
    pub fn outlasting_resume_window(&self) -> usize {
        self.notes
            .iter()
            .filter(|n| n.duration_beats > self.max_sustain_beats)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::Part;

    fn index() -> NoteIndex {
        let notes = [0.0, 0.0, 1.0, 2.5, 6.0, 6.0, 9.0]
            .iter()
            .map(|&start| Note::new(start, 1.0, 60, Part::First))
            .collect();
        let score = Score::new(notes, 12.0, 90.0, (48, 84)).unwrap();
        NoteIndex::new(&score, 4.0)
    }

    #[test]
    fn test_first_note_at_or_after() {
        let idx = index();
        assert_eq!(idx.index_of_first_note_at_or_after(0.0), 0);
        assert_eq!(idx.index_of_first_note_at_or_after(0.5), 2);
        assert_eq!(idx.index_of_first_note_at_or_after(1.0), 2);
        assert_eq!(idx.index_of_first_note_at_or_after(6.0), 4);
        assert_eq!(idx.index_of_first_note_at_or_after(6.1), 6);
        assert_eq!(idx.index_of_first_note_at_or_after(100.0), 7);
    }

    #[test]
    fn test_resume_index_backs_up_by_max_sustain() {
        let idx = index();
        // 7.0 - 4.0 = 3.0 -> first note at or after 3.0 is the one at 6.0
        assert_eq!(idx.find_resume_index(7.0), 4);
        // 5.0 - 4.0 = 1.0
        assert_eq!(idx.find_resume_index(5.0), 2);
        // never backs up below zero
        assert_eq!(idx.find_resume_index(2.0), 0);
    }

    #[test]
    fn test_counts_notes_outlasting_resume_window() {
        assert_eq!(index().outlasting_resume_window(), 0);

        let notes = vec![
            Note::new(0.0, 6.0, 60, Part::First),
            Note::new(1.0, 4.0, 62, Part::Second),
            Note::new(2.0, 4.5, 64, Part::Third),
        ];
        let score = Score::new(notes, 8.0, 90.0, (48, 84)).unwrap();
        assert_eq!(NoteIndex::new(&score, 4.0).outlasting_resume_window(), 2);
        assert_eq!(NoteIndex::new(&score, 8.0).outlasting_resume_window(), 0);
    }

    #[test]
    fn test_empty_index() {
        let score = Score::new(vec![], 4.0, 90.0, (48, 84)).unwrap();
        let idx = NoteIndex::new(&score, 4.0);
        assert!(idx.is_empty());
        assert_eq!(idx.find_resume_index(2.0), 0);
        assert!(idx.get(0).is_none());
    }
}
