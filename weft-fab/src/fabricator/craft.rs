//! The selection pass: macro & main program choices, rhythm, and detail
//! coverage
//!
//! Each phase stages its output on the workbench. A failure to resolve
//! one piece of content (no bound program, no matching audio) is logged
//! and recorded as a Warning message on the segment, and the pass moves
//! on; only infrastructure errors abort.

use chrono::Duration;
use tracing::warn;
use uuid::Uuid;

use weft_common::entity::catalog::{
    Instrument, InstrumentAudio, InstrumentType, Program, ProgramSequence, ProgramSequenceBinding,
    ProgramSequencePattern, ProgramSequencePatternEvent, ProgramType,
};
use weft_common::entity::segment::{
    SegmentChoice, SegmentChoiceArrangement, SegmentChoiceArrangementPick, SegmentChord,
    SegmentChordVoicing, SegmentMeme, SegmentMessageType, SegmentState, SegmentType,
};
use weft_common::music::{delta_semitones, Chord, Key, Note, NoteRange};
use weft_common::{Error, Result};

use super::Fabricator;
use crate::isometry::MemeIsometry;
use crate::selection::Chooser;

/// Note text used for unpitched picks.
const ATONAL: &str = "X";

impl Fabricator {
    /// Run the full selection pass, then mark the segment Crafted.
    pub fn craft(&mut self) -> Result<()> {
        self.craft_macro_main()?;
        self.craft_rhythm()?;
        self.craft_detail()?;

        let mut segment = self.workbench.segment().clone();
        segment.state = SegmentState::Crafted;
        self.workbench.put_segment(segment);
        Ok(())
    }

    // ==================================================================
    // Macro & main
    // ==================================================================

    /// Choose the macro and main programs with their sequence bindings,
    /// then derive the segment's key, total, tempo, delta and end
    /// instant from the main sequence, and copy its chords and voicings.
    fn craft_macro_main(&mut self) -> Result<()> {
        let kind = self.segment_type()?;

        let (macro_program, macro_offset) = self.choose_macro(kind)?;
        let macro_binding = self.choose_binding(macro_program.id, macro_offset)?;
        for name in self.catalog.clone().memes_of_binding(&macro_binding) {
            self.stage_meme(name);
        }
        self.report("macro_program", macro_program.name.clone());
        self.stage_choice(SegmentChoice {
            id: Uuid::new_v4(),
            segment_id: self.workbench.segment().id,
            program_type: ProgramType::Macro,
            program_id: Some(macro_program.id),
            sequence_binding_id: Some(macro_binding.id),
            instrument_id: None,
            transpose: 0,
        });

        let (main_program, main_offset, delta) = self.choose_main(kind)?;
        let main_binding = self.choose_binding(main_program.id, main_offset)?;
        let sequence = self.catalog.clone().sequence(main_binding.sequence_id)?.clone();
        for name in self.catalog.clone().memes_of_binding(&main_binding) {
            self.stage_meme(name);
        }
        self.report("main_program", main_program.name.clone());
        let transpose = main_transpose(&main_program, &sequence);
        self.stage_choice(SegmentChoice {
            id: Uuid::new_v4(),
            segment_id: self.workbench.segment().id,
            program_type: ProgramType::Main,
            program_id: Some(main_program.id),
            sequence_binding_id: Some(main_binding.id),
            instrument_id: None,
            transpose,
        });

        self.apply_main_sequence(&main_program, &sequence, delta)
    }

    /// Resolve the macro program and binding offset for this segment
    /// type. Continue and NextMain stay on the previous macro binding;
    /// NextMacro advances to the next offset, or to a fresh meme-affine
    /// program when the previous macro is exhausted.
    fn choose_macro(&mut self, kind: SegmentType) -> Result<(Program, u32)> {
        if kind != SegmentType::Initial {
            if let Some(choice) = self.retrospective.previous_choice_of_type(ProgramType::Macro) {
                if let (Some(program_id), Some(binding_id)) =
                    (choice.program_id, choice.sequence_binding_id)
                {
                    let catalog = self.catalog.clone();
                    let program = catalog.program(program_id)?.clone();
                    let offset = catalog.binding(binding_id)?.offset;
                    match kind {
                        SegmentType::Continue | SegmentType::NextMain => {
                            return Ok((program, offset));
                        }
                        SegmentType::NextMacro => {
                            let next = catalog
                                .available_offsets(program_id)
                                .into_iter()
                                .find(|&o| o > offset);
                            if let Some(next) = next {
                                return Ok((program, next));
                            }
                            // fall through: previous macro exhausted
                        }
                        _ => {}
                    }
                }
            }
        }

        let isometry = self.meme_isometry_of_previous();
        let program = self.choose_program(ProgramType::Macro, &isometry)?;
        let offset = self.first_offset(program.id)?;
        Ok((program, offset))
    }

    /// Resolve the main program, binding offset, and run delta. Continue
    /// advances the previous main program one offset and grows the
    /// delta; every other type starts a fresh run on a meme-affine
    /// program.
    fn choose_main(&mut self, kind: SegmentType) -> Result<(Program, u32, u32)> {
        if kind == SegmentType::Continue {
            let choice = self
                .retrospective
                .previous_choice_of_type(ProgramType::Main)
                .ok_or_else(|| Error::Fatal("continue segment lacks a previous main choice".into()))?;
            let (program_id, binding_id) = match (choice.program_id, choice.sequence_binding_id) {
                (Some(p), Some(b)) => (p, b),
                _ => return Err(Error::Fatal("previous main choice lacks program binding".into())),
            };
            let catalog = self.catalog.clone();
            let program = catalog.program(program_id)?.clone();
            let offset = catalog.binding(binding_id)?.offset;
            let next = catalog
                .available_offsets(program_id)
                .into_iter()
                .find(|&o| o > offset)
                .ok_or_else(|| Error::Fatal("continue segment has no next main offset".into()))?;
            let delta = self
                .retrospective
                .previous_segment()
                .map(|s| s.delta + 1)
                .unwrap_or(0);
            return Ok((program, next, delta));
        }

        let isometry = self.meme_isometry_of_segment();
        let program = self.choose_program(ProgramType::Main, &isometry)?;
        let offset = self.first_offset(program.id)?;
        Ok((program, offset, 0))
    }

    /// Weighted-random program choice among the chain's bound programs
    /// of one type, biased by meme affinity.
    fn choose_program(&mut self, kind: ProgramType, isometry: &MemeIsometry) -> Result<Program> {
        let catalog = self.catalog.clone();
        let mut chooser = Chooser::new();
        for program in catalog.programs_bound(&self.bindings, kind) {
            let affinity = isometry.score(catalog.memes_of_program(program.id)) as f64;
            let score = affinity + self.random.noise();
            chooser.add(program.clone(), score);
        }
        chooser
            .take()
            .ok_or_else(|| Error::NotFound(format!("no {kind:?} program bound to chain")))
    }

    fn first_offset(&self, program_id: Uuid) -> Result<u32> {
        self.catalog
            .available_offsets(program_id)
            .first()
            .copied()
            .ok_or_else(|| Error::NotFound(format!("program {program_id} has no sequence bindings")))
    }

    /// Weighted-random binding among those at one program offset.
    fn choose_binding(&mut self, program_id: Uuid, offset: u32) -> Result<ProgramSequenceBinding> {
        let catalog = self.catalog.clone();
        let mut chooser = Chooser::new();
        for binding in catalog.bindings_at_offset(program_id, offset) {
            chooser.add_noise(binding.clone(), &mut self.random);
        }
        chooser.take().ok_or_else(|| {
            Error::NotFound(format!("program {program_id} has no binding at offset {offset}"))
        })
    }

    /// Write the main sequence's musical parameters onto the segment and
    /// copy its chords and voicings into the staging cache.
    fn apply_main_sequence(
        &mut self,
        program: &Program,
        sequence: &ProgramSequence,
        delta: u32,
    ) -> Result<()> {
        let mut segment = self.workbench.segment().clone();
        segment.key = if sequence.key.is_empty() {
            program.key.clone()
        } else {
            sequence.key.clone()
        };
        segment.total = sequence.total;
        segment.tempo = if sequence.tempo > 0.0 {
            sequence.tempo
        } else {
            program.tempo
        };
        segment.delta = delta;
        self.workbench.put_segment(segment);

        let length = self.seconds_at_position(f64::from(sequence.total))?;
        let mut segment = self.workbench.segment().clone();
        segment.end_at =
            Some(segment.begin_at + Duration::milliseconds((length * 1000.0).round() as i64));
        let segment_id = segment.id;
        let total = segment.total;
        self.workbench.put_segment(segment);

        let catalog = self.catalog.clone();
        for chord in catalog.chords_of_sequence(sequence.id) {
            if chord.position >= f64::from(total) {
                continue;
            }
            let staged = SegmentChord {
                id: Uuid::new_v4(),
                segment_id,
                position: chord.position,
                name: chord.name.clone(),
            };
            let chord_id = staged.id;
            self.workbench.add_chord(staged);
            for voicing in catalog.voicings_of_chord(chord.id) {
                self.workbench.add_voicing(SegmentChordVoicing {
                    id: Uuid::new_v4(),
                    segment_id,
                    chord_id,
                    instrument_type: voicing.instrument_type,
                    notes: voicing.notes.clone(),
                });
            }
        }
        Ok(())
    }

    // ==================================================================
    // Rhythm
    // ==================================================================

    /// Choose a rhythm program and realize each of its voices: one
    /// arrangement per voice with a meme-affine instrument, and one pick
    /// per pattern event, repeating the pattern across the segment.
    fn craft_rhythm(&mut self) -> Result<()> {
        let isometry = self.meme_isometry_of_segment();
        let program = match self.choose_program(ProgramType::Rhythm, &isometry) {
            Ok(program) => program,
            Err(Error::NotFound(detail)) => {
                self.warn_skip("rhythm", &detail);
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        self.report("rhythm_program", program.name.clone());

        let catalog = self.catalog.clone();
        let mut sequences = Chooser::new();
        for sequence in catalog.sequences_of_program(program.id) {
            sequences.add_noise(sequence.clone(), &mut self.random);
        }
        let sequence = match sequences.take() {
            Some(sequence) => sequence,
            None => {
                self.warn_skip("rhythm", &format!("program {} has no sequences", program.name));
                return Ok(());
            }
        };

        let choice = SegmentChoice {
            id: Uuid::new_v4(),
            segment_id: self.workbench.segment().id,
            program_type: ProgramType::Rhythm,
            program_id: Some(program.id),
            sequence_binding_id: None,
            instrument_id: None,
            transpose: 0,
        };
        let choice_id = choice.id;
        self.stage_choice(choice);

        for voice in catalog.voices_of_program(program.id) {
            let instrument = match self.choose_instrument(voice.kind, &isometry) {
                Some(instrument) => instrument,
                None => {
                    self.warn_skip(
                        "rhythm",
                        &format!("no {:?} instrument bound for voice {}", voice.kind, voice.name),
                    );
                    continue;
                }
            };
            let arrangement = SegmentChoiceArrangement {
                id: Uuid::new_v4(),
                segment_id: self.workbench.segment().id,
                choice_id,
                voice_id: Some(voice.id),
                instrument_id: instrument.id,
            };
            let arrangement_id = arrangement.id;
            self.workbench.add_arrangement(arrangement);

            let mut patterns = Chooser::new();
            for pattern in catalog.patterns_of(sequence.id, voice.id) {
                patterns.add_noise(pattern.clone(), &mut self.random);
            }
            let pattern = match patterns.take() {
                Some(pattern) => pattern,
                None => {
                    self.warn_skip(
                        "rhythm",
                        &format!("voice {} has no pattern in sequence {}", voice.name, sequence.name),
                    );
                    continue;
                }
            };

            if let Err(e) = self.arrange_pattern(arrangement_id, &instrument, voice.kind, &pattern) {
                self.warn_skip("rhythm", &format!("voice {}: {e}", voice.name));
            }
        }
        Ok(())
    }

    /// Lay one pattern's events across the segment, repeating the
    /// pattern until the segment's total beats are covered.
    fn arrange_pattern(
        &mut self,
        arrangement_id: Uuid,
        instrument: &Instrument,
        kind: InstrumentType,
        pattern: &ProgramSequencePattern,
    ) -> Result<()> {
        if pattern.total == 0 {
            return Err(Error::Validation(format!("pattern {} has zero total", pattern.name)));
        }
        let catalog = self.catalog.clone();
        let events: Vec<_> = catalog
            .events_of_pattern(pattern.id)
            .into_iter()
            .cloned()
            .collect();
        let segment_total = f64::from(self.workbench.segment().total);
        let source_range = NoteRange::from_texts(events.iter().map(|e| e.note.as_str()));
        let target_range = catalog.range_of_instrument(instrument.id);

        let mut base = 0.0;
        while base < segment_total {
            for event in &events {
                let position = base + event.position;
                if position >= segment_total {
                    continue;
                }
                let track = catalog.track(event.track_id)?.name.clone();
                let result = if kind == InstrumentType::Percussive || Note::parse(&event.note).is_none() {
                    self.pick_percussive(arrangement_id, instrument, &track, position, event)
                } else {
                    self.pick_pitched(
                        arrangement_id,
                        instrument,
                        kind,
                        &track,
                        position,
                        event,
                        &source_range,
                        &target_range,
                    )
                };
                if let Err(e) = result {
                    self.warn_skip("pick", &format!("track {track} at {position}: {e}"));
                }
            }
            base += f64::from(pattern.total);
        }
        Ok(())
    }

    /// Percussive pick: audio chosen by fuzzy track-name match, reused
    /// through continuity memory.
    fn pick_percussive(
        &mut self,
        arrangement_id: Uuid,
        instrument: &Instrument,
        track: &str,
        position: f64,
        event: &ProgramSequencePatternEvent,
    ) -> Result<()> {
        let catalog = self.catalog.clone();
        let audio = match self.preferred_audio(track, ATONAL) {
            Some(id) => catalog.audio(id)?.clone(),
            None => {
                let mut chooser = Chooser::new();
                for audio in catalog.audios_of_instrument(instrument.id) {
                    let similarity = strsim::jaro_winkler(
                        &track.to_lowercase(),
                        &audio.name.to_lowercase(),
                    );
                    chooser.add(audio.clone(), similarity);
                }
                let audio = chooser.take().ok_or_else(|| {
                    Error::NotFound(format!("instrument {} has no audios", instrument.name))
                })?;
                self.remember_audio(track, ATONAL, audio.id);
                audio
            }
        };
        self.stage_pick(arrangement_id, &audio, track, position, event.duration, ATONAL, event.velocity)
    }

    /// Pitched pick: the event note octave-shifted into the instrument's
    /// range and transposed toward the chord at its position, realized
    /// by the audio nearest that note.
    #[allow(clippy::too_many_arguments)]
    fn pick_pitched(
        &mut self,
        arrangement_id: Uuid,
        instrument: &Instrument,
        kind: InstrumentType,
        track: &str,
        position: f64,
        event: &ProgramSequencePatternEvent,
        source_range: &NoteRange,
        target_range: &NoteRange,
    ) -> Result<()> {
        let note = Note::parse(&event.note)
            .ok_or_else(|| Error::Validation(format!("unparseable note {:?}", event.note)))?;
        let shift = self.octave_shift(kind, source_range, target_range);
        let transpose = match self.chord_at(position) {
            Some(chord) => {
                let key = Key::parse(&self.workbench.segment().key);
                match (key, Chord::parse(&chord.name)) {
                    (Some(key), Some(chord)) => self.target_shift(&key, &chord),
                    _ => 0,
                }
            }
            None => 0,
        };
        let note = note.shift_octaves(shift).shift_semitones(transpose);
        let note_text = note.to_string();

        let audio = self.resolve_pitched_audio(instrument, track, &note_text)?;
        self.stage_pick(
            arrangement_id,
            &audio,
            track,
            position,
            event.duration,
            &note_text,
            event.velocity,
        )
    }

    /// Audio for a pitched note: continuity memory first, then exact
    /// note match, then the audio whose note is nearest in semitones.
    fn resolve_pitched_audio(
        &mut self,
        instrument: &Instrument,
        track: &str,
        note_text: &str,
    ) -> Result<InstrumentAudio> {
        let catalog = self.catalog.clone();
        if let Some(id) = self.preferred_audio(track, note_text) {
            return Ok(catalog.audio(id)?.clone());
        }
        let target = Note::parse(note_text)
            .ok_or_else(|| Error::Validation(format!("unparseable note {note_text:?}")))?;
        let mut exact = Chooser::new();
        let mut nearest: Option<(i32, InstrumentAudio)> = None;
        for audio in catalog.audios_of_instrument(instrument.id) {
            let audio_note = match Note::parse(&audio.note) {
                Some(note) => note,
                None => continue,
            };
            if audio_note == target {
                exact.add_noise(audio.clone(), &mut self.random);
            }
            let distance = (audio_note.semitones() - target.semitones()).abs();
            match &nearest {
                Some((best, _)) if *best <= distance => {}
                _ => nearest = Some((distance, audio.clone())),
            }
        }
        let audio = exact
            .take()
            .or(nearest.map(|(_, audio)| audio))
            .ok_or_else(|| {
                Error::NotFound(format!("instrument {} has no pitched audios", instrument.name))
            })?;
        self.remember_audio(track, note_text, audio.id);
        Ok(audio)
    }

    // ==================================================================
    // Detail
    // ==================================================================

    /// Cover each pitched voicing type present on the segment's chords:
    /// one instrument-only choice and arrangement per type, with chord
    /// note picks routed through continuity memory.
    fn craft_detail(&mut self) -> Result<()> {
        let isometry = self.meme_isometry_of_segment();
        for kind in InstrumentType::PITCHED {
            let chords: Vec<SegmentChord> =
                self.workbench.chords().into_iter().cloned().collect();
            let voiced: Vec<(SegmentChord, SegmentChordVoicing)> = chords
                .into_iter()
                .filter_map(|chord| {
                    self.workbench
                        .voicing_of(chord.id, kind)
                        .cloned()
                        .map(|voicing| (chord, voicing))
                })
                .collect();
            if voiced.is_empty() {
                continue;
            }

            let instrument = match self.choose_instrument(kind, &isometry) {
                Some(instrument) => instrument,
                None => {
                    self.warn_skip("detail", &format!("no {kind:?} instrument bound"));
                    continue;
                }
            };
            let choice = SegmentChoice {
                id: Uuid::new_v4(),
                segment_id: self.workbench.segment().id,
                program_type: ProgramType::Detail,
                program_id: None,
                sequence_binding_id: None,
                instrument_id: Some(instrument.id),
                transpose: 0,
            };
            let choice_id = choice.id;
            self.stage_choice(choice);
            let arrangement = SegmentChoiceArrangement {
                id: Uuid::new_v4(),
                segment_id: self.workbench.segment().id,
                choice_id,
                voice_id: None,
                instrument_id: instrument.id,
            };
            let arrangement_id = arrangement.id;
            self.workbench.add_arrangement(arrangement);

            let segment_total = f64::from(self.workbench.segment().total);
            for (i, (chord, voicing)) in voiced.iter().enumerate() {
                let until = voiced
                    .get(i + 1)
                    .map(|(next, _)| next.position)
                    .unwrap_or(segment_total);
                if let Err(e) = self.pick_voicing(
                    arrangement_id,
                    &instrument,
                    kind,
                    chord,
                    voicing,
                    until - chord.position,
                ) {
                    self.warn_skip("detail", &format!("chord {} for {kind:?}: {e}", chord.name));
                }
            }
        }
        Ok(())
    }

    /// Realize one chord voicing: notes from continuity memory when this
    /// (type, chord) was voiced before, else the voicing's notes shifted
    /// into the instrument's range; one pick per note, sustained until
    /// the next chord.
    fn pick_voicing(
        &mut self,
        arrangement_id: Uuid,
        instrument: &Instrument,
        kind: InstrumentType,
        chord: &SegmentChord,
        voicing: &SegmentChordVoicing,
        duration_beats: f64,
    ) -> Result<()> {
        let track = format!("{kind:?}");
        let notes = match self.preferred_notes(&track, &chord.name) {
            Some(notes) => notes.clone(),
            None => {
                let catalog = self.catalog.clone();
                let voicing_notes: Vec<&str> = voicing
                    .notes
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect();
                let source_range = NoteRange::from_texts(voicing_notes.iter().copied());
                let target_range = catalog.range_of_instrument(instrument.id);
                let shift = self.octave_shift(kind, &source_range, &target_range);
                let notes: Vec<String> = voicing_notes
                    .iter()
                    .filter_map(|text| Note::parse(text))
                    .map(|note| note.shift_octaves(shift).to_string())
                    .collect();
                if notes.is_empty() {
                    return Err(Error::Validation(format!(
                        "voicing of chord {} has no parseable notes",
                        chord.name
                    )));
                }
                self.remember_notes(&track, &chord.name, notes.clone());
                notes
            }
        };

        for note_text in &notes {
            let audio = self.resolve_pitched_audio(instrument, &track, note_text)?;
            self.stage_pick(
                arrangement_id,
                &audio,
                &track,
                chord.position,
                duration_beats,
                note_text,
                1.0,
            )?;
        }
        Ok(())
    }

    // ==================================================================
    // Shared helpers
    // ==================================================================

    /// Weighted-random instrument choice among the chain's bound
    /// instruments of one type, biased by meme affinity.
    fn choose_instrument(&mut self, kind: InstrumentType, isometry: &MemeIsometry) -> Option<Instrument> {
        let catalog = self.catalog.clone();
        let mut chooser = Chooser::new();
        for instrument in catalog.instruments_bound(&self.bindings, kind) {
            let affinity = isometry.score(catalog.memes_of_instrument(instrument.id)) as f64;
            chooser.add(instrument.clone(), affinity + self.random.noise());
        }
        chooser.take()
    }

    /// Convert a (position, duration) in beats to a pick in seconds and
    /// stage it.
    fn stage_pick(
        &mut self,
        arrangement_id: Uuid,
        audio: &InstrumentAudio,
        track: &str,
        position: f64,
        duration_beats: f64,
        note: &str,
        velocity: f64,
    ) -> Result<()> {
        let start = self.seconds_at_position(position)?;
        let end = self.seconds_at_position(position + duration_beats)?;
        self.workbench.add_pick(SegmentChoiceArrangementPick {
            id: Uuid::new_v4(),
            segment_id: self.workbench.segment().id,
            arrangement_id,
            audio_id: audio.id,
            track_name: track.to_string(),
            start_seconds: start,
            length_seconds: (end - start).max(0.0),
            note: note.to_string(),
            amplitude: velocity * audio.volume,
        });
        Ok(())
    }

    fn stage_choice(&mut self, choice: SegmentChoice) {
        self.workbench.add_choice(choice);
    }

    fn stage_meme(&mut self, name: String) {
        let segment_id = self.workbench.segment().id;
        self.workbench.add_meme(SegmentMeme {
            id: Uuid::new_v4(),
            segment_id,
            name,
        });
    }

    fn report(&mut self, key: &str, value: String) {
        self.workbench.report(key, value);
    }

    /// Record a non-fatal content-resolution failure and move on.
    fn warn_skip(&mut self, phase: &str, detail: &str) {
        warn!(phase, detail, "content resolution skipped");
        self.workbench
            .add_message(SegmentMessageType::Warning, format!("{phase}: {detail}"));
    }
}

/// Main-choice transposition: the delta from the program's written key
/// to the bound sequence's key.
fn main_transpose(program: &Program, sequence: &ProgramSequence) -> i32 {
    let program_key = Key::parse(&program.key);
    let sequence_key = Key::parse(if sequence.key.is_empty() {
        &program.key
    } else {
        &sequence.key
    });
    match (program_key, sequence_key) {
        (Some(p), Some(s)) => delta_semitones(p.root, s.root),
        _ => 0,
    }
}
