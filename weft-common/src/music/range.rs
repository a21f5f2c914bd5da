//! Note ranges

use serde::{Deserialize, Serialize};
use std::fmt;

use super::note::Note;

/// The low..high span of a set of notes.
///
/// Empty when built from zero parseable notes (e.g. a purely percussive
/// instrument), in which case both bounds are None.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NoteRange {
    pub low: Option<Note>,
    pub high: Option<Note>,
}

impl NoteRange {
    /// Build a range from note texts, skipping atonal entries.
    pub fn from_texts<'a>(texts: impl IntoIterator<Item = &'a str>) -> Self {
        let mut range = Self::default();
        for text in texts {
            if let Some(note) = Note::parse(text) {
                range.include(note);
            }
        }
        range
    }

    /// Widen the range to include `note`.
    pub fn include(&mut self, note: Note) {
        match self.low {
            Some(low) if note.semitones() >= low.semitones() => {}
            _ => self.low = Some(note),
        }
        match self.high {
            Some(high) if note.semitones() <= high.semitones() => {}
            _ => self.high = Some(note),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.low.is_none()
    }

    /// The same range shifted by whole octaves.
    pub fn shift_octaves(&self, n: i32) -> Self {
        Self {
            low: self.low.map(|note| note.shift_octaves(n)),
            high: self.high.map(|note| note.shift_octaves(n)),
        }
    }
}

impl fmt::Display for NoteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.low, self.high) {
            (Some(low), Some(high)) => write!(f, "{low}-{high}"),
            _ => write!(f, "-"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_from_texts_skipping_atonal() {
        let range = NoteRange::from_texts(["C4", "X", "G2", "E5"]);
        assert_eq!(range.low, Note::parse("G2"));
        assert_eq!(range.high, Note::parse("E5"));

        let empty = NoteRange::from_texts(["X", "kick"]);
        assert!(empty.is_empty());
    }

    #[test]
    fn octave_shift_moves_both_bounds() {
        let range = NoteRange::from_texts(["C2", "C4"]).shift_octaves(2);
        assert_eq!(range.low, Note::parse("C4"));
        assert_eq!(range.high, Note::parse("C6"));
    }
}
