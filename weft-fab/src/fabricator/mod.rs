//! Fabricator: one segment's content-selection orchestrator
//!
//! Constructed fresh per fabrication attempt with a retrospective
//! lookback and a workbench staging cache; never shared or reused
//! concurrently. The craft pass (see `craft`) populates the workbench;
//! `done()` finalizes the segment type and commits.

mod craft;
mod retrospective;
mod workbench;

pub use retrospective::Retrospective;
pub use workbench::Workbench;

use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use weft_common::config::FabricationConfig;
use weft_common::entity::catalog::{Catalog, InstrumentType, ProgramType};
use weft_common::entity::chain::{Chain, ChainBinding};
use weft_common::entity::segment::{Segment, SegmentChord, SegmentType};
use weft_common::music::{delta_semitones, Chord, Key, NoteRange, PitchClass};
use weft_common::store::EntityStore;
use weft_common::Result;

use crate::isometry::MemeIsometry;
use crate::selection::RandomSource;
use crate::time_computer::TimeComputer;

/// Octave-shift search bounds: +10 down to -10, in that order. The
/// descending order is part of the algorithm's observable tie-break
/// behavior; do not re-derive.
const OCTAVE_SHIFT_SEARCH: std::ops::RangeInclusive<i32> = -10..=10;

pub struct Fabricator {
    pub(crate) catalog: Arc<Catalog>,
    pub(crate) config: FabricationConfig,
    pub(crate) chain: Chain,
    pub(crate) bindings: Vec<ChainBinding>,
    pub(crate) retrospective: Retrospective,
    pub(crate) workbench: Workbench,
    pub(crate) random: RandomSource,
    segment_type: Option<SegmentType>,
    chord_cache: HashMap<u64, Option<SegmentChord>>,
    shift_cache: HashMap<(InstrumentType, String, String), i32>,
    /// (event track, chord name) → previously-chosen note set
    preferred_notes: HashMap<(String, String), Vec<String>>,
    /// (event track, note) → previously-chosen instrument audio
    preferred_audios: HashMap<(String, String), Uuid>,
}

impl Fabricator {
    /// Construct a fabricator for one segment template: loads the
    /// chain's bindings and config overrides, builds the retrospective
    /// lookback and the workbench, and seeds continuity memory from the
    /// retrospective's picks.
    pub fn new(
        store: Arc<EntityStore>,
        catalog: Arc<Catalog>,
        base_config: &FabricationConfig,
        chain: Chain,
        segment: Segment,
        random: RandomSource,
    ) -> Result<Self> {
        let config = base_config.with_overrides(&store.config_of_chain(chain.id)?)?;
        let bindings = store.bindings_of_chain(chain.id)?;
        let retrospective = Retrospective::build(&store, &catalog, chain.id, segment.offset)?;
        let workbench = Workbench::new(store, config.clone(), segment)?;

        let (preferred_notes, preferred_audios) = continuity_memory(&retrospective);

        Ok(Self {
            catalog,
            config,
            chain,
            bindings,
            retrospective,
            workbench,
            random,
            segment_type: None,
            chord_cache: HashMap::new(),
            shift_cache: HashMap::new(),
            preferred_notes,
            preferred_audios,
        })
    }

    pub fn workbench(&self) -> &Workbench {
        &self.workbench
    }

    pub fn retrospective(&self) -> &Retrospective {
        &self.retrospective
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    // ------------------------------------------------------------------
    // Segment type determination
    // ------------------------------------------------------------------

    /// Determine this segment's type; computed once and memoized.
    ///
    /// Initial at offset 0. Continue while the previous main choice has
    /// another sequence-binding offset available and delta growth stays
    /// within `main_program_length_max_delta`. NextMain while the
    /// previous macro choice has at least two more offsets. NextMacro
    /// otherwise.
    pub fn segment_type(&mut self) -> Result<SegmentType> {
        if let Some(kind) = self.segment_type {
            return Ok(kind);
        }
        let kind = self.determine_segment_type()?;
        self.segment_type = Some(kind);
        Ok(kind)
    }

    fn determine_segment_type(&self) -> Result<SegmentType> {
        if self.workbench.segment().offset == 0 {
            return Ok(SegmentType::Initial);
        }
        let previous = match self.retrospective.previous_segment() {
            Some(previous) => previous,
            None => return Ok(SegmentType::Initial),
        };

        if let Some(main_choice) = self.retrospective.previous_choice_of_type(ProgramType::Main) {
            if let (Some(program_id), Some(binding_id)) =
                (main_choice.program_id, main_choice.sequence_binding_id)
            {
                let offset = self.catalog.binding(binding_id)?.offset;
                let has_next = self
                    .catalog
                    .available_offsets(program_id)
                    .iter()
                    .any(|&o| o > offset);
                let delta_ok = previous.delta + 1 <= self.config.main_program_length_max_delta;
                if has_next && delta_ok {
                    return Ok(SegmentType::Continue);
                }
            }
        }

        if let Some(macro_choice) = self.retrospective.previous_choice_of_type(ProgramType::Macro) {
            if let (Some(program_id), Some(binding_id)) =
                (macro_choice.program_id, macro_choice.sequence_binding_id)
            {
                let offset = self.catalog.binding(binding_id)?.offset;
                let remaining = self
                    .catalog
                    .available_offsets(program_id)
                    .iter()
                    .filter(|&&o| o > offset)
                    .count();
                if remaining >= 2 {
                    return Ok(SegmentType::NextMain);
                }
            }
        }

        Ok(SegmentType::NextMacro)
    }

    // ------------------------------------------------------------------
    // Meme affinity
    // ------------------------------------------------------------------

    /// Isometry seeded with the previous segment's memes; biases macro
    /// and main continuations toward thematic consistency.
    pub fn meme_isometry_of_previous(&self) -> MemeIsometry {
        MemeIsometry::of(self.retrospective.previous_memes())
    }

    /// Isometry seeded with the memes staged so far for this segment.
    pub fn meme_isometry_of_segment(&self) -> MemeIsometry {
        MemeIsometry::of(self.workbench.memes().iter().map(|m| m.name.clone()))
    }

    // ------------------------------------------------------------------
    // Octave shift
    // ------------------------------------------------------------------

    /// Octave shift moving `source` (content range) into `target`
    /// (instrument range). Percussive instruments always shift 0.
    /// Cached by (type, source, target).
    pub fn octave_shift(
        &mut self,
        kind: InstrumentType,
        source: &NoteRange,
        target: &NoteRange,
    ) -> i32 {
        if kind == InstrumentType::Percussive {
            return 0;
        }
        let cache_key = (kind, source.to_string(), target.to_string());
        if let Some(&shift) = self.shift_cache.get(&cache_key) {
            return shift;
        }
        let shift = compute_octave_shift(kind, source, target);
        self.shift_cache.insert(cache_key, shift);
        shift
    }

    // ------------------------------------------------------------------
    // Target shift
    // ------------------------------------------------------------------

    /// Semitone delta from a key's root to a chord's slash root; used to
    /// transpose selected content toward the active harmonic context.
    pub fn target_shift(&self, key: &Key, chord: &Chord) -> i32 {
        delta_semitones(key.root, chord.slash_root_pitch_class())
    }

    // ------------------------------------------------------------------
    // Chord at position
    // ------------------------------------------------------------------

    /// The latest staged chord at or before `position` (step function),
    /// falling back to a chord derived from the segment key when no
    /// chord lies at or before the position. Memoized per position.
    pub fn chord_at(&mut self, position: f64) -> Option<SegmentChord> {
        let cache_key = position.to_bits();
        if let Some(cached) = self.chord_cache.get(&cache_key) {
            return cached.clone();
        }
        let found = self
            .workbench
            .chords()
            .into_iter()
            .filter(|c| c.position <= position)
            .last()
            .cloned()
            .or_else(|| self.key_fallback_chord());
        self.chord_cache.insert(cache_key, found.clone());
        found
    }

    fn key_fallback_chord(&self) -> Option<SegmentChord> {
        let segment = self.workbench.segment();
        let root = Key::parse(&segment.key).map(|k| k.root).unwrap_or(PitchClass::C);
        Some(SegmentChord {
            id: Uuid::new_v4(),
            segment_id: segment.id,
            position: 0.0,
            name: root.to_string(),
        })
    }

    // ------------------------------------------------------------------
    // Time
    // ------------------------------------------------------------------

    /// Elapsed seconds from segment start at a beat position, on the
    /// linear tempo ramp from the previous segment's tempo to this one's.
    pub fn seconds_at_position(&self, position: f64) -> Result<f64> {
        let segment = self.workbench.segment();
        let from_tempo = self
            .retrospective
            .previous_segment()
            .map(|s| s.tempo)
            .filter(|&t| t > 0.0)
            .unwrap_or(segment.tempo);
        let computer = TimeComputer::new(segment.total, from_tempo, segment.tempo)?;
        Ok(computer.seconds_at_position(position))
    }

    // ------------------------------------------------------------------
    // Continuity memory
    // ------------------------------------------------------------------

    /// Notes previously chosen for this (track, chord) key, if any.
    pub fn preferred_notes(&self, track: &str, chord_name: &str) -> Option<&Vec<String>> {
        self.preferred_notes
            .get(&(track.to_string(), chord_name.to_string()))
    }

    pub fn remember_notes(&mut self, track: &str, chord_name: &str, notes: Vec<String>) {
        self.preferred_notes
            .entry((track.to_string(), chord_name.to_string()))
            .or_insert(notes);
    }

    /// Instrument audio previously chosen for this (track, note) key.
    pub fn preferred_audio(&self, track: &str, note: &str) -> Option<Uuid> {
        self.preferred_audios
            .get(&(track.to_string(), note.to_string()))
            .copied()
    }

    pub fn remember_audio(&mut self, track: &str, note: &str, audio_id: Uuid) {
        self.preferred_audios
            .entry((track.to_string(), note.to_string()))
            .or_insert(audio_id);
    }

    // ------------------------------------------------------------------
    // Finalization
    // ------------------------------------------------------------------

    /// Set the segment's final type, then commit the workbench.
    pub fn done(&mut self) -> Result<()> {
        let kind = self.segment_type()?;
        let mut segment = self.workbench.segment().clone();
        segment.kind = kind;
        self.workbench.put_segment(segment);
        self.workbench.done()
    }
}

/// Octave-shift search per the fixed procedure: scan +10 down to -10.
///
/// Bass keeps the shift with the smallest non-negative semitone delta
/// between target.low and the shifted source low. Other pitched types
/// keep the smallest-magnitude shift whose shifted source range contains
/// the target (shifted low at or below target low, shifted high at or
/// above target high), falling back to the shift that lands the source
/// low closest to the target low.
fn compute_octave_shift(kind: InstrumentType, source: &NoteRange, target: &NoteRange) -> i32 {
    let (source_low, target_low) = match (source.low, target.low) {
        (Some(s), Some(t)) => (s, t),
        _ => return 0,
    };

    if kind == InstrumentType::Bass {
        let mut best: Option<(i32, i32)> = None; // (delta, shift)
        for shift in OCTAVE_SHIFT_SEARCH.rev() {
            let delta = target_low.semitones() - source_low.shift_octaves(shift).semitones();
            if delta >= 0 {
                match best {
                    Some((best_delta, _)) if best_delta <= delta => {}
                    _ => best = Some((delta, shift)),
                }
            }
        }
        return best.map(|(_, shift)| shift).unwrap_or(0);
    }

    let source_high = source.high.unwrap_or(source_low);
    let target_high = target.high.unwrap_or(target_low);

    let mut contained: Option<i32> = None;
    let mut nearest: Option<(i32, i32)> = None; // (distance, shift)
    for shift in OCTAVE_SHIFT_SEARCH.rev() {
        let low = source_low.shift_octaves(shift).semitones();
        let high = source_high.shift_octaves(shift).semitones();
        if target_low.semitones() - low >= 0 && target_high.semitones() - high <= 0 {
            match contained {
                Some(best) if best.abs() <= shift.abs() => {}
                _ => contained = Some(shift),
            }
        }
        let distance = (target_low.semitones() - low).abs();
        match nearest {
            Some((best_distance, _)) if best_distance <= distance => {}
            _ => nearest = Some((distance, shift)),
        }
    }
    contained
        .or(nearest.map(|(_, shift)| shift))
        .unwrap_or(0)
}

/// Build the two continuity maps from retrospective picks:
/// (track, chord name) → note set, and (track, note) → audio.
///
/// A pick's chord is recovered by mapping its start seconds back to a
/// beat position with its segment's own tempo; chords are coarse enough
/// within a segment for this to be robust.
fn continuity_memory(
    retrospective: &Retrospective,
) -> (
    HashMap<(String, String), Vec<String>>,
    HashMap<(String, String), Uuid>,
) {
    let mut notes: HashMap<(String, String), Vec<String>> = HashMap::new();
    let mut audios: HashMap<(String, String), Uuid> = HashMap::new();

    for pick in retrospective.picks() {
        audios
            .entry((pick.track_name.clone(), pick.note.clone()))
            .or_insert(pick.audio_id);

        let segment = match retrospective.segment(pick.segment_id) {
            Some(segment) if segment.tempo > 0.0 => segment,
            _ => continue,
        };
        let beat = pick.start_seconds * segment.tempo / 60.0;
        let chord_name = retrospective
            .chords_of_segment(segment.id)
            .into_iter()
            .filter(|c| c.position <= beat)
            .last()
            .map(|c| c.name.clone());
        if let Some(chord_name) = chord_name {
            notes
                .entry((pick.track_name.clone(), chord_name))
                .or_default()
                .push(pick.note.clone());
        }
    }
    (notes, audios)
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_common::music::Note;

    fn range(low: &str, high: &str) -> NoteRange {
        NoteRange::from_texts([low, high])
    }

    #[test]
    fn empty_source_range_shifts_zero() {
        let shift = compute_octave_shift(InstrumentType::Bass, &NoteRange::default(), &range("C1", "C2"));
        assert_eq!(shift, 0);
    }

    #[test]
    fn bass_two_octaves_below_shifts_up_two() {
        // Source low C1, target low C3: +2 octaves lands exactly, the
        // smallest non-negative delta
        let shift = compute_octave_shift(InstrumentType::Bass, &range("C1", "C2"), &range("C3", "C4"));
        assert_eq!(shift, 2);
    }

    #[test]
    fn bass_never_overshoots_target_low() {
        // D shifted +2 octaves would land above C3, so +1 is kept
        let shift = compute_octave_shift(InstrumentType::Bass, &range("D1", "D2"), &range("C3", "C4"));
        assert_eq!(shift, 1);
    }

    #[test]
    fn pitched_shift_contains_target_range() {
        let shift = compute_octave_shift(InstrumentType::Pad, &range("C1", "C4"), &range("C3", "C5"));
        let low = Note::parse("C1").unwrap().shift_octaves(shift).semitones();
        let high = Note::parse("C4").unwrap().shift_octaves(shift).semitones();
        assert!(low <= Note::parse("C3").unwrap().semitones());
        assert!(high >= Note::parse("C5").unwrap().semitones());
    }

    #[test]
    fn pitched_narrow_source_falls_back_to_nearest_low() {
        // One-note source can never contain a full octave target; the
        // fallback lands its low as close to the target low as possible
        let shift = compute_octave_shift(InstrumentType::Stab, &range("C1", "C1"), &range("C4", "C5"));
        assert_eq!(shift, 3);
    }
}
