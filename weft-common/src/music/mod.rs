//! Music theory primitives
//!
//! Just enough pitch arithmetic for content selection: pitch classes,
//! octave-qualified notes, keys, chord names with slash roots, and note
//! ranges. The engine reasons in semitones and octaves; it never touches
//! audio.

mod chord;
mod key;
mod note;
mod range;

pub use chord::Chord;
pub use key::{Key, KeyMode};
pub use note::{delta_semitones, Note, PitchClass};
pub use range::NoteRange;
