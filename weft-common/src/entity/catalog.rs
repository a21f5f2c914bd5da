//! Read-only catalog (hub content)
//!
//! The catalog is the library of musical building blocks the Fabricator
//! selects from: programs with sequences, bindings, voices, tracks,
//! patterns and events; instruments with audios; memes throughout. It is
//! loaded once and never mutated by the engine.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::chain::{BindingTarget, ChainBinding};
use crate::error::{Error, Result};
use crate::music::NoteRange;

/// Musical role a program plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProgramType {
    Macro,
    Main,
    Rhythm,
    Detail,
}

/// Instrument family; also the voicing type on chords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstrumentType {
    Percussive,
    Bass,
    Pad,
    Sticky,
    Stripe,
    Stab,
}

impl InstrumentType {
    /// The pitched families that chord voicings are written for.
    pub const PITCHED: [InstrumentType; 5] = [
        InstrumentType::Bass,
        InstrumentType::Pad,
        InstrumentType::Sticky,
        InstrumentType::Stripe,
        InstrumentType::Stab,
    ];
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Library {
    pub id: Uuid,
    pub account_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub id: Uuid,
    pub library_id: Uuid,
    pub kind: ProgramType,
    pub name: String,
    pub key: String,
    pub tempo: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramMeme {
    pub id: Uuid,
    pub program_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramSequence {
    pub id: Uuid,
    pub program_id: Uuid,
    pub name: String,
    pub key: String,
    pub total: u32,
    pub tempo: f64,
}

/// Binds a sequence into its program's macro/main ordering at an offset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramSequenceBinding {
    pub id: Uuid,
    pub program_id: Uuid,
    pub sequence_id: Uuid,
    pub offset: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramSequenceBindingMeme {
    pub id: Uuid,
    pub binding_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramSequenceChord {
    pub id: Uuid,
    pub sequence_id: Uuid,
    pub position: f64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramSequenceChordVoicing {
    pub id: Uuid,
    pub chord_id: Uuid,
    pub instrument_type: InstrumentType,
    /// CSV of note texts
    pub notes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramVoice {
    pub id: Uuid,
    pub program_id: Uuid,
    pub kind: InstrumentType,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramVoiceTrack {
    pub id: Uuid,
    pub voice_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramSequencePattern {
    pub id: Uuid,
    pub sequence_id: Uuid,
    pub voice_id: Uuid,
    pub name: String,
    pub total: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramSequencePatternEvent {
    pub id: Uuid,
    pub pattern_id: Uuid,
    pub track_id: Uuid,
    /// Beat position within the pattern
    pub position: f64,
    /// Beats
    pub duration: f64,
    /// Note text; "X" for atonal events
    pub note: String,
    pub velocity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    pub id: Uuid,
    pub library_id: Uuid,
    pub kind: InstrumentType,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentMeme {
    pub id: Uuid,
    pub instrument_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentAudio {
    pub id: Uuid,
    pub instrument_id: Uuid,
    pub name: String,
    pub waveform_key: String,
    /// Note text; "X" for unpitched hits
    pub note: String,
    pub start: f64,
    pub length: f64,
    pub tempo: f64,
    pub volume: f64,
}

/// The read-only content store, with the lookup surface the Fabricator
/// consumes. Populated by `add_*` calls at load time.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    libraries: HashMap<Uuid, Library>,
    programs: HashMap<Uuid, Program>,
    program_memes: Vec<ProgramMeme>,
    sequences: HashMap<Uuid, ProgramSequence>,
    bindings: HashMap<Uuid, ProgramSequenceBinding>,
    binding_memes: Vec<ProgramSequenceBindingMeme>,
    sequence_chords: HashMap<Uuid, ProgramSequenceChord>,
    chord_voicings: Vec<ProgramSequenceChordVoicing>,
    voices: HashMap<Uuid, ProgramVoice>,
    tracks: HashMap<Uuid, ProgramVoiceTrack>,
    patterns: HashMap<Uuid, ProgramSequencePattern>,
    events: Vec<ProgramSequencePatternEvent>,
    instruments: HashMap<Uuid, Instrument>,
    instrument_memes: Vec<InstrumentMeme>,
    audios: HashMap<Uuid, InstrumentAudio>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Load-time population
    // ------------------------------------------------------------------

    pub fn add_library(&mut self, library: Library) {
        self.libraries.insert(library.id, library);
    }

    pub fn add_program(&mut self, program: Program) {
        self.programs.insert(program.id, program);
    }

    pub fn add_program_meme(&mut self, meme: ProgramMeme) {
        self.program_memes.push(meme);
    }

    pub fn add_sequence(&mut self, sequence: ProgramSequence) {
        self.sequences.insert(sequence.id, sequence);
    }

    pub fn add_binding(&mut self, binding: ProgramSequenceBinding) {
        self.bindings.insert(binding.id, binding);
    }

    pub fn add_binding_meme(&mut self, meme: ProgramSequenceBindingMeme) {
        self.binding_memes.push(meme);
    }

    pub fn add_sequence_chord(&mut self, chord: ProgramSequenceChord) {
        self.sequence_chords.insert(chord.id, chord);
    }

    pub fn add_chord_voicing(&mut self, voicing: ProgramSequenceChordVoicing) {
        self.chord_voicings.push(voicing);
    }

    pub fn add_voice(&mut self, voice: ProgramVoice) {
        self.voices.insert(voice.id, voice);
    }

    pub fn add_track(&mut self, track: ProgramVoiceTrack) {
        self.tracks.insert(track.id, track);
    }

    pub fn add_pattern(&mut self, pattern: ProgramSequencePattern) {
        self.patterns.insert(pattern.id, pattern);
    }

    pub fn add_event(&mut self, event: ProgramSequencePatternEvent) {
        self.events.push(event);
    }

    pub fn add_instrument(&mut self, instrument: Instrument) {
        self.instruments.insert(instrument.id, instrument);
    }

    pub fn add_instrument_meme(&mut self, meme: InstrumentMeme) {
        self.instrument_memes.push(meme);
    }

    pub fn add_audio(&mut self, audio: InstrumentAudio) {
        self.audios.insert(audio.id, audio);
    }

    // ------------------------------------------------------------------
    // Direct lookups
    // ------------------------------------------------------------------

    pub fn program(&self, id: Uuid) -> Result<&Program> {
        self.programs
            .get(&id)
            .ok_or_else(|| Error::NotFound(format!("program {id}")))
    }

    pub fn sequence(&self, id: Uuid) -> Result<&ProgramSequence> {
        self.sequences
            .get(&id)
            .ok_or_else(|| Error::NotFound(format!("program sequence {id}")))
    }

    pub fn binding(&self, id: Uuid) -> Result<&ProgramSequenceBinding> {
        self.bindings
            .get(&id)
            .ok_or_else(|| Error::NotFound(format!("sequence binding {id}")))
    }

    pub fn voice(&self, id: Uuid) -> Result<&ProgramVoice> {
        self.voices
            .get(&id)
            .ok_or_else(|| Error::NotFound(format!("program voice {id}")))
    }

    pub fn track(&self, id: Uuid) -> Result<&ProgramVoiceTrack> {
        self.tracks
            .get(&id)
            .ok_or_else(|| Error::NotFound(format!("voice track {id}")))
    }

    pub fn instrument(&self, id: Uuid) -> Result<&Instrument> {
        self.instruments
            .get(&id)
            .ok_or_else(|| Error::NotFound(format!("instrument {id}")))
    }

    pub fn audio(&self, id: Uuid) -> Result<&InstrumentAudio> {
        self.audios
            .get(&id)
            .ok_or_else(|| Error::NotFound(format!("instrument audio {id}")))
    }

    // ------------------------------------------------------------------
    // Scoped reads
    // ------------------------------------------------------------------

    /// Programs a chain may draw from, per its bindings: everything in a
    /// bound library plus any directly-bound program.
    pub fn programs_bound(&self, bindings: &[ChainBinding], kind: ProgramType) -> Vec<&Program> {
        self.programs
            .values()
            .filter(|p| p.kind == kind && Self::is_bound(bindings, p.library_id, p.id, BindingTarget::Program))
            .collect()
    }

    /// Instruments a chain may draw from, per its bindings.
    pub fn instruments_bound(
        &self,
        bindings: &[ChainBinding],
        kind: InstrumentType,
    ) -> Vec<&Instrument> {
        self.instruments
            .values()
            .filter(|i| {
                i.kind == kind && Self::is_bound(bindings, i.library_id, i.id, BindingTarget::Instrument)
            })
            .collect()
    }

    fn is_bound(bindings: &[ChainBinding], library_id: Uuid, entity_id: Uuid, direct: BindingTarget) -> bool {
        bindings.iter().any(|b| match b.target {
            BindingTarget::Library => b.target_id == library_id,
            t if t == direct => b.target_id == entity_id,
            _ => false,
        })
    }

    pub fn sequences_of_program(&self, program_id: Uuid) -> Vec<&ProgramSequence> {
        self.sequences
            .values()
            .filter(|s| s.program_id == program_id)
            .collect()
    }

    /// Sorted, distinct sequence-binding offsets of a program.
    pub fn available_offsets(&self, program_id: Uuid) -> Vec<u32> {
        let mut offsets: Vec<u32> = self
            .bindings
            .values()
            .filter(|b| b.program_id == program_id)
            .map(|b| b.offset)
            .collect();
        offsets.sort_unstable();
        offsets.dedup();
        offsets
    }

    /// All bindings of a program at one offset.
    pub fn bindings_at_offset(&self, program_id: Uuid, offset: u32) -> Vec<&ProgramSequenceBinding> {
        self.bindings
            .values()
            .filter(|b| b.program_id == program_id && b.offset == offset)
            .collect()
    }

    /// Program-level meme names.
    pub fn memes_of_program(&self, program_id: Uuid) -> Vec<String> {
        self.program_memes
            .iter()
            .filter(|m| m.program_id == program_id)
            .map(|m| m.name.clone())
            .collect()
    }

    /// Meme names in effect at a sequence binding: the program's memes
    /// plus the binding's own.
    pub fn memes_of_binding(&self, binding: &ProgramSequenceBinding) -> Vec<String> {
        let mut memes = self.memes_of_program(binding.program_id);
        memes.extend(
            self.binding_memes
                .iter()
                .filter(|m| m.binding_id == binding.id)
                .map(|m| m.name.clone()),
        );
        memes
    }

    pub fn memes_of_instrument(&self, instrument_id: Uuid) -> Vec<String> {
        self.instrument_memes
            .iter()
            .filter(|m| m.instrument_id == instrument_id)
            .map(|m| m.name.clone())
            .collect()
    }

    pub fn voices_of_program(&self, program_id: Uuid) -> Vec<&ProgramVoice> {
        self.voices
            .values()
            .filter(|v| v.program_id == program_id)
            .collect()
    }

    pub fn tracks_of_voice(&self, voice_id: Uuid) -> Vec<&ProgramVoiceTrack> {
        self.tracks
            .values()
            .filter(|t| t.voice_id == voice_id)
            .collect()
    }

    pub fn patterns_of(&self, sequence_id: Uuid, voice_id: Uuid) -> Vec<&ProgramSequencePattern> {
        self.patterns
            .values()
            .filter(|p| p.sequence_id == sequence_id && p.voice_id == voice_id)
            .collect()
    }

    /// Events of a pattern, ascending by position.
    pub fn events_of_pattern(&self, pattern_id: Uuid) -> Vec<&ProgramSequencePatternEvent> {
        let mut events: Vec<&ProgramSequencePatternEvent> = self
            .events
            .iter()
            .filter(|e| e.pattern_id == pattern_id)
            .collect();
        events.sort_by(|a, b| a.position.total_cmp(&b.position));
        events
    }

    /// Chords of a sequence, ascending by position.
    pub fn chords_of_sequence(&self, sequence_id: Uuid) -> Vec<&ProgramSequenceChord> {
        let mut chords: Vec<&ProgramSequenceChord> = self
            .sequence_chords
            .values()
            .filter(|c| c.sequence_id == sequence_id)
            .collect();
        chords.sort_by(|a, b| a.position.total_cmp(&b.position));
        chords
    }

    pub fn voicings_of_chord(&self, chord_id: Uuid) -> Vec<&ProgramSequenceChordVoicing> {
        self.chord_voicings
            .iter()
            .filter(|v| v.chord_id == chord_id)
            .collect()
    }

    pub fn audios_of_instrument(&self, instrument_id: Uuid) -> Vec<&InstrumentAudio> {
        self.audios
            .values()
            .filter(|a| a.instrument_id == instrument_id)
            .collect()
    }

    /// The pitch range spanned by an instrument's audio notes; empty for
    /// purely percussive instruments.
    pub fn range_of_instrument(&self, instrument_id: Uuid) -> NoteRange {
        NoteRange::from_texts(
            self.audios
                .values()
                .filter(|a| a.instrument_id == instrument_id)
                .map(|a| a.note.as_str()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(target: BindingTarget, target_id: Uuid) -> ChainBinding {
        ChainBinding {
            id: Uuid::new_v4(),
            chain_id: Uuid::new_v4(),
            target,
            target_id,
        }
    }

    #[test]
    fn library_binding_exposes_programs() {
        let mut catalog = Catalog::new();
        let library_id = Uuid::new_v4();
        let program = Program {
            id: Uuid::new_v4(),
            library_id,
            kind: ProgramType::Main,
            name: "Main A".into(),
            key: "C".into(),
            tempo: 120.0,
        };
        let program_id = program.id;
        catalog.add_program(program);

        let by_library = catalog.programs_bound(&[binding(BindingTarget::Library, library_id)], ProgramType::Main);
        assert_eq!(by_library.len(), 1);

        let by_program = catalog.programs_bound(&[binding(BindingTarget::Program, program_id)], ProgramType::Main);
        assert_eq!(by_program.len(), 1);

        let unbound = catalog.programs_bound(&[binding(BindingTarget::Library, Uuid::new_v4())], ProgramType::Main);
        assert!(unbound.is_empty());

        // Bound, but wrong type
        let wrong_type = catalog.programs_bound(&[binding(BindingTarget::Library, library_id)], ProgramType::Macro);
        assert!(wrong_type.is_empty());
    }

    #[test]
    fn offsets_are_sorted_and_distinct() {
        let mut catalog = Catalog::new();
        let program_id = Uuid::new_v4();
        for offset in [2u32, 0, 1, 1] {
            catalog.add_binding(ProgramSequenceBinding {
                id: Uuid::new_v4(),
                program_id,
                sequence_id: Uuid::new_v4(),
                offset,
            });
        }
        assert_eq!(catalog.available_offsets(program_id), vec![0, 1, 2]);
    }

    #[test]
    fn binding_memes_include_program_memes() {
        let mut catalog = Catalog::new();
        let program_id = Uuid::new_v4();
        let binding = ProgramSequenceBinding {
            id: Uuid::new_v4(),
            program_id,
            sequence_id: Uuid::new_v4(),
            offset: 0,
        };
        catalog.add_program_meme(ProgramMeme {
            id: Uuid::new_v4(),
            program_id,
            name: "EARTH".into(),
        });
        catalog.add_binding_meme(ProgramSequenceBindingMeme {
            id: Uuid::new_v4(),
            binding_id: binding.id,
            name: "WIND".into(),
        });
        catalog.add_binding(binding.clone());

        let memes = catalog.memes_of_binding(&binding);
        assert!(memes.contains(&"EARTH".to_string()));
        assert!(memes.contains(&"WIND".to_string()));
    }
}
