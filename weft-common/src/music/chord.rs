//! Chord names with slash roots

use serde::{Deserialize, Serialize};
use std::fmt;

use super::note::PitchClass;

/// A chord identified by its display name, e.g. "Cm7", "F#maj7/A#".
///
/// The engine only needs the root and the optional slash root; chord
/// quality stays inside the name and is matched textually.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chord {
    pub name: String,
    pub root: PitchClass,
    pub slash_root: Option<PitchClass>,
}

impl Chord {
    /// Parse a chord name. Returns None when no pitch letter leads it.
    pub fn parse(name: &str) -> Option<Self> {
        let trimmed = name.trim();
        let (root, _) = PitchClass::parse_prefix(trimmed)?;
        let slash_root = trimmed
            .split_once('/')
            .and_then(|(_, after)| PitchClass::parse_prefix(after))
            .map(|(pc, _)| pc);
        Some(Self {
            name: trimmed.to_string(),
            root,
            slash_root,
        })
    }

    /// The sounding bass: slash root when present, else the root.
    pub fn slash_root_pitch_class(&self) -> PitchClass {
        self.slash_root.unwrap_or(self.root)
    }
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_root_and_slash_root() {
        let plain = Chord::parse("Cm7").unwrap();
        assert_eq!(plain.root, PitchClass::C);
        assert_eq!(plain.slash_root, None);
        assert_eq!(plain.slash_root_pitch_class(), PitchClass::C);

        let slashed = Chord::parse("F#maj7/A#").unwrap();
        assert_eq!(slashed.root, PitchClass::Fs);
        assert_eq!(slashed.slash_root_pitch_class(), PitchClass::As);

        assert_eq!(Chord::parse("?!"), None);
    }

    #[test]
    fn sus_chords_keep_their_plain_root() {
        assert_eq!(Chord::parse("Csus4").unwrap().root, PitchClass::C);
        assert_eq!(Chord::parse("Asus2").unwrap().root, PitchClass::A);
        assert_eq!(Chord::parse("F#sus4").unwrap().root, PitchClass::Fs);
    }
}
