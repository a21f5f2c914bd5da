//! Pitch classes and octave-qualified notes

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the twelve chromatic pitch classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PitchClass {
    C,
    Cs,
    D,
    Ds,
    E,
    F,
    Fs,
    G,
    Gs,
    A,
    As,
    B,
}

impl PitchClass {
    /// Semitone value above C, 0..=11.
    pub fn value(self) -> i32 {
        match self {
            PitchClass::C => 0,
            PitchClass::Cs => 1,
            PitchClass::D => 2,
            PitchClass::Ds => 3,
            PitchClass::E => 4,
            PitchClass::F => 5,
            PitchClass::Fs => 6,
            PitchClass::G => 7,
            PitchClass::Gs => 8,
            PitchClass::A => 9,
            PitchClass::As => 10,
            PitchClass::B => 11,
        }
    }

    /// Pitch class for a semitone value (any integer; wrapped mod 12).
    pub fn of_value(value: i32) -> Self {
        match value.rem_euclid(12) {
            0 => PitchClass::C,
            1 => PitchClass::Cs,
            2 => PitchClass::D,
            3 => PitchClass::Ds,
            4 => PitchClass::E,
            5 => PitchClass::F,
            6 => PitchClass::Fs,
            7 => PitchClass::G,
            8 => PitchClass::Gs,
            9 => PitchClass::A,
            10 => PitchClass::As,
            _ => PitchClass::B,
        }
    }

    /// Parse a pitch class from the head of `text`: a letter A-G followed
    /// by any run of `#`/`s` (sharp) or `b` (flat) accidentals. An `s`
    /// that begins a "sus" quality (as in "Csus4") is not an accidental.
    /// Returns the class and the number of bytes consumed, or None for
    /// atonal text (e.g. percussive "X").
    pub fn parse_prefix(text: &str) -> Option<(Self, usize)> {
        let trimmed = text.trim_start();
        let leading = text.len() - trimmed.len();
        let mut chars = trimmed.char_indices();
        let (_, letter) = chars.next()?;
        let base = match letter.to_ascii_uppercase() {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return None,
        };
        let mut value = base;
        let mut consumed = letter.len_utf8();
        for (i, c) in chars {
            match c {
                '#' => value += 1,
                's' if !trimmed[i..].starts_with("sus") => value += 1,
                'b' => value -= 1,
                _ => {
                    consumed = i;
                    return Some((Self::of_value(value), leading + consumed));
                }
            }
            consumed = i + c.len_utf8();
        }
        Some((Self::of_value(value), leading + consumed))
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PitchClass::C => "C",
            PitchClass::Cs => "C#",
            PitchClass::D => "D",
            PitchClass::Ds => "D#",
            PitchClass::E => "E",
            PitchClass::F => "F",
            PitchClass::Fs => "F#",
            PitchClass::G => "G",
            PitchClass::Gs => "G#",
            PitchClass::A => "A",
            PitchClass::As => "A#",
            PitchClass::B => "B",
        };
        write!(f, "{s}")
    }
}

/// Signed semitone delta from one pitch class to another along the
/// nearest path: result is in -5..=6.
pub fn delta_semitones(from: PitchClass, to: PitchClass) -> i32 {
    let d = (to.value() - from.value()).rem_euclid(12);
    if d > 6 {
        d - 12
    } else {
        d
    }
}

/// An octave-qualified note, e.g. C4 or F#2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Note {
    pub class: PitchClass,
    pub octave: i8,
}

impl Note {
    pub fn new(class: PitchClass, octave: i8) -> Self {
        Self { class, octave }
    }

    /// Parse e.g. "C4", "F#3", "Bb2", "Ds-1". Returns None for atonal
    /// text (no pitch letter or no octave digit).
    pub fn parse(text: &str) -> Option<Self> {
        let (class, consumed) = PitchClass::parse_prefix(text)?;
        let rest = text[consumed..].trim();
        let octave: i8 = rest.parse().ok()?;
        Some(Self { class, octave })
    }

    /// Absolute semitone index (C0 = 0; may be negative).
    pub fn semitones(self) -> i32 {
        self.octave as i32 * 12 + self.class.value()
    }

    /// The note `n` octaves away (negative shifts down).
    pub fn shift_octaves(self, n: i32) -> Self {
        Self {
            class: self.class,
            octave: (self.octave as i32 + n) as i8,
        }
    }

    /// The note `n` semitones away.
    pub fn shift_semitones(self, n: i32) -> Self {
        let total = self.semitones() + n;
        Self {
            class: PitchClass::of_value(total),
            octave: total.div_euclid(12) as i8,
        }
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.class, self.octave)
    }
}
