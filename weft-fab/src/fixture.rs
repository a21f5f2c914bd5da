//! Demonstration catalog, shared by the work-loop binary and the
//! integration tests
//!
//! One library holding two macro programs, two main programs with bound
//! sequences, chords and voicings, a rhythm program with a percussive
//! voice, and three instruments with audios.

use uuid::Uuid;

use weft_common::entity::catalog::{
    Catalog, Instrument, InstrumentAudio, InstrumentMeme, InstrumentType, Library, Program,
    ProgramMeme, ProgramSequence, ProgramSequenceBinding, ProgramSequenceChord,
    ProgramSequenceChordVoicing, ProgramSequencePattern, ProgramSequencePatternEvent, ProgramType,
    ProgramVoice, ProgramVoiceTrack,
};

/// A built demo catalog with the ids callers need to bind a chain.
pub struct DemoContent {
    pub catalog: Catalog,
    pub library_id: Uuid,
    pub account_id: Uuid,
}

/// Build the demonstration catalog.
pub fn demo_content() -> DemoContent {
    let mut b = Builder::new();

    // Macro programs
    let overture = b.program(ProgramType::Macro, "Overture", "C", 120.0, &["EARTH"]);
    let ovr_a = b.sequence(overture, "Opening", "C", 0, 120.0);
    b.bind(overture, ovr_a, 0);
    let ovr_b = b.sequence(overture, "Rising", "G", 0, 120.0);
    b.bind(overture, ovr_b, 1);

    let nightfall = b.program(ProgramType::Macro, "Nightfall", "A minor", 110.0, &["FIRE"]);
    let night_a = b.sequence(nightfall, "Dusk", "A minor", 0, 110.0);
    b.bind(nightfall, night_a, 0);

    // Main programs
    let daybreak = b.program(ProgramType::Main, "Daybreak", "C", 120.0, &["EARTH"]);
    let day_a = b.sequence(daybreak, "Verse", "C", 16, 120.0);
    b.bind(daybreak, day_a, 0);
    b.chord_with_voicings(day_a, 0.0, "C", "C2, G2", "C4, E4, G4");
    b.chord_with_voicings(day_a, 8.0, "G", "G1, D2", "G3, B3, D4");
    let day_b = b.sequence(daybreak, "Chorus", "G", 16, 124.0);
    b.bind(daybreak, day_b, 1);
    b.chord_with_voicings(day_b, 0.0, "G", "G1, D2", "G3, B3, D4");
    b.chord_with_voicings(day_b, 8.0, "C/G", "G1, C2", "C4, E4, G4");

    let moonrise = b.program(ProgramType::Main, "Moonrise", "A minor", 110.0, &["FIRE"]);
    let moon_a = b.sequence(moonrise, "Drift", "A minor", 16, 110.0);
    b.bind(moonrise, moon_a, 0);
    b.chord_with_voicings(moon_a, 0.0, "Am", "A1, E2", "A3, C4, E4");
    b.chord_with_voicings(moon_a, 8.0, "F", "F1, C2", "F3, A3, C4");

    // Rhythm program with one percussive voice
    let pulse = b.program(ProgramType::Rhythm, "Pulse", "C", 120.0, &["EARTH"]);
    let pulse_seq = b.sequence(pulse, "Straight", "C", 4, 120.0);
    let drums = b.voice(pulse, InstrumentType::Percussive, "Drums");
    let kick = b.track(drums, "KICK");
    let snare = b.track(drums, "SNARE");
    let beat = b.pattern(pulse_seq, drums, "Four on the floor", 4);
    b.event(beat, kick, 0.0, 1.0, "X", 1.0);
    b.event(beat, snare, 1.0, 1.0, "X", 0.8);
    b.event(beat, kick, 2.0, 1.0, "X", 1.0);
    b.event(beat, snare, 3.0, 1.0, "X", 0.8);

    // Instruments
    let drums_inst = b.instrument(InstrumentType::Percussive, "808 Drums", &["EARTH"]);
    b.audio(drums_inst, "Kick Long", "X", 1.0);
    b.audio(drums_inst, "Snare Tight", "X", 0.9);

    let bass = b.instrument(InstrumentType::Bass, "Moog Bass", &["EARTH"]);
    for note in ["C1", "E1", "G1", "A1", "C2", "D2", "E2", "F2", "G2", "C3"] {
        b.audio(bass, &format!("Bass {note}"), note, 1.0);
    }

    let pad = b.instrument(InstrumentType::Pad, "Warm Pad", &["FIRE"]);
    for note in ["C3", "E3", "F3", "G3", "A3", "B3", "C4", "D4", "E4", "G4", "C5"] {
        b.audio(pad, &format!("Pad {note}"), note, 0.7);
    }

    DemoContent {
        catalog: b.catalog,
        library_id: b.library_id,
        account_id: b.account_id,
    }
}

struct Builder {
    catalog: Catalog,
    library_id: Uuid,
    account_id: Uuid,
}

impl Builder {
    fn new() -> Self {
        let mut catalog = Catalog::new();
        let library_id = Uuid::new_v4();
        let account_id = Uuid::new_v4();
        catalog.add_library(Library {
            id: library_id,
            account_id,
            name: "Demo".into(),
        });
        Self {
            catalog,
            library_id,
            account_id,
        }
    }

    fn program(&mut self, kind: ProgramType, name: &str, key: &str, tempo: f64, memes: &[&str]) -> Uuid {
        let id = Uuid::new_v4();
        self.catalog.add_program(Program {
            id,
            library_id: self.library_id,
            kind,
            name: name.into(),
            key: key.into(),
            tempo,
        });
        for meme in memes {
            self.catalog.add_program_meme(ProgramMeme {
                id: Uuid::new_v4(),
                program_id: id,
                name: (*meme).into(),
            });
        }
        id
    }

    fn sequence(&mut self, program_id: Uuid, name: &str, key: &str, total: u32, tempo: f64) -> Uuid {
        let id = Uuid::new_v4();
        self.catalog.add_sequence(ProgramSequence {
            id,
            program_id,
            name: name.into(),
            key: key.into(),
            total,
            tempo,
        });
        id
    }

    fn bind(&mut self, program_id: Uuid, sequence_id: Uuid, offset: u32) {
        self.catalog.add_binding(ProgramSequenceBinding {
            id: Uuid::new_v4(),
            program_id,
            sequence_id,
            offset,
        });
    }

    fn chord_with_voicings(&mut self, sequence_id: Uuid, position: f64, name: &str, bass: &str, pad: &str) {
        let chord_id = Uuid::new_v4();
        self.catalog.add_sequence_chord(ProgramSequenceChord {
            id: chord_id,
            sequence_id,
            position,
            name: name.into(),
        });
        self.catalog.add_chord_voicing(ProgramSequenceChordVoicing {
            id: Uuid::new_v4(),
            chord_id,
            instrument_type: InstrumentType::Bass,
            notes: bass.into(),
        });
        self.catalog.add_chord_voicing(ProgramSequenceChordVoicing {
            id: Uuid::new_v4(),
            chord_id,
            instrument_type: InstrumentType::Pad,
            notes: pad.into(),
        });
    }

    fn voice(&mut self, program_id: Uuid, kind: InstrumentType, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.catalog.add_voice(ProgramVoice {
            id,
            program_id,
            kind,
            name: name.into(),
        });
        id
    }

    fn track(&mut self, voice_id: Uuid, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.catalog.add_track(ProgramVoiceTrack {
            id,
            voice_id,
            name: name.into(),
        });
        id
    }

    fn pattern(&mut self, sequence_id: Uuid, voice_id: Uuid, name: &str, total: u32) -> Uuid {
        let id = Uuid::new_v4();
        self.catalog.add_pattern(ProgramSequencePattern {
            id,
            sequence_id,
            voice_id,
            name: name.into(),
            total,
        });
        id
    }

    fn event(&mut self, pattern_id: Uuid, track_id: Uuid, position: f64, duration: f64, note: &str, velocity: f64) {
        self.catalog.add_event(ProgramSequencePatternEvent {
            id: Uuid::new_v4(),
            pattern_id,
            track_id,
            position,
            duration,
            note: note.into(),
            velocity,
        });
    }

    fn instrument(&mut self, kind: InstrumentType, name: &str, memes: &[&str]) -> Uuid {
        let id = Uuid::new_v4();
        self.catalog.add_instrument(Instrument {
            id,
            library_id: self.library_id,
            kind,
            name: name.into(),
        });
        for meme in memes {
            self.catalog.add_instrument_meme(InstrumentMeme {
                id: Uuid::new_v4(),
                instrument_id: id,
                name: (*meme).into(),
            });
        }
        id
    }

    fn audio(&mut self, instrument_id: Uuid, name: &str, note: &str, volume: f64) {
        self.catalog.add_audio(InstrumentAudio {
            id: Uuid::new_v4(),
            instrument_id,
            name: name.into(),
            waveform_key: format!("instrument-{instrument_id}-{}", name.replace(' ', "-").to_lowercase()),
            note: note.into(),
            start: 0.0,
            length: 2.0,
            tempo: 120.0,
            volume,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_common::entity::chain::{BindingTarget, ChainBinding};

    #[test]
    fn demo_catalog_is_fully_bound_through_its_library() {
        let content = demo_content();
        let binding = ChainBinding {
            id: Uuid::new_v4(),
            chain_id: Uuid::new_v4(),
            target: BindingTarget::Library,
            target_id: content.library_id,
        };
        let bindings = [binding];
        for kind in [ProgramType::Macro, ProgramType::Main, ProgramType::Rhythm] {
            assert!(
                !content.catalog.programs_bound(&bindings, kind).is_empty(),
                "{kind:?}"
            );
        }
        for kind in [InstrumentType::Percussive, InstrumentType::Bass, InstrumentType::Pad] {
            assert!(
                !content.catalog.instruments_bound(&bindings, kind).is_empty(),
                "{kind:?}"
            );
        }
    }

    #[test]
    fn main_sequences_carry_chords_and_voicings() {
        let content = demo_content();
        let mains = content.catalog.programs_bound(
            &[ChainBinding {
                id: Uuid::new_v4(),
                chain_id: Uuid::new_v4(),
                target: BindingTarget::Library,
                target_id: content.library_id,
            }],
            ProgramType::Main,
        );
        for program in mains {
            for sequence in content.catalog.sequences_of_program(program.id) {
                let chords = content.catalog.chords_of_sequence(sequence.id);
                assert!(!chords.is_empty(), "sequence {} lacks chords", sequence.name);
                for chord in chords {
                    assert!(!content.catalog.voicings_of_chord(chord.id).is_empty());
                }
            }
        }
    }
}
