//! Musical keys

use serde::{Deserialize, Serialize};
use std::fmt;

use super::note::PitchClass;

/// Major or minor mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyMode {
    Major,
    Minor,
}

/// A key: root pitch class plus mode, parsed from names like
/// "C", "F# minor", "Bbm", "G Major".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    pub root: PitchClass,
    pub mode: KeyMode,
}

impl Key {
    pub fn new(root: PitchClass, mode: KeyMode) -> Self {
        Self { root, mode }
    }

    /// Parse a key name. Returns None when no pitch letter leads the text.
    pub fn parse(name: &str) -> Option<Self> {
        let (root, consumed) = PitchClass::parse_prefix(name)?;
        let rest = name[consumed..].trim().to_ascii_lowercase();
        let mode = if rest == "m" || rest.starts_with("min") {
            KeyMode::Minor
        } else {
            KeyMode::Major
        };
        Some(Self { root, mode })
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            KeyMode::Major => write!(f, "{}", self.root),
            KeyMode::Minor => write!(f, "{} minor", self.root),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_major_and_minor() {
        assert_eq!(Key::parse("C"), Some(Key::new(PitchClass::C, KeyMode::Major)));
        assert_eq!(
            Key::parse("F# minor"),
            Some(Key::new(PitchClass::Fs, KeyMode::Minor))
        );
        assert_eq!(Key::parse("Bbm"), Some(Key::new(PitchClass::As, KeyMode::Minor)));
        assert_eq!(Key::parse("G Major"), Some(Key::new(PitchClass::G, KeyMode::Major)));
        assert_eq!(Key::parse(""), None);
    }
}
