//! Segment retrospective: read-only lookback over prior segments
//!
//! Built once per Fabricator construction. For a first segment it is
//! empty. Otherwise it loads the immediately-previous segment and, when
//! that segment's main choice sits N offsets into its program's
//! sequence-binding order, the whole run of N prior segments, with all
//! their sub-entities. Continuity-preserving selection reads from here.

use std::sync::Arc;
use uuid::Uuid;

use weft_common::entity::catalog::{Catalog, ProgramType};
use weft_common::entity::segment::{
    Segment, SegmentChoice, SegmentChoiceArrangementPick, SegmentChord, SegmentMeme,
};
use weft_common::store::EntityStore;
use weft_common::Result;

/// Immutable lookback cache over prior segments of one chain.
pub struct Retrospective {
    segments: Vec<Segment>,
    previous_segment: Option<Segment>,
    choices: Vec<SegmentChoice>,
    picks: Vec<SegmentChoiceArrangementPick>,
    chords: Vec<SegmentChord>,
    memes: Vec<SegmentMeme>,
}

impl Retrospective {
    /// Load the lookback window for a segment about to be fabricated at
    /// `current_offset`.
    pub fn build(
        store: &Arc<EntityStore>,
        catalog: &Catalog,
        chain_id: Uuid,
        current_offset: u32,
    ) -> Result<Self> {
        if current_offset == 0 {
            return Ok(Self::empty());
        }

        let previous = match store.segment_at_offset(chain_id, current_offset - 1)? {
            Some(segment) => segment,
            None => return Ok(Self::empty()),
        };

        // Default window: just the previous segment
        let mut from_offset = current_offset - 1;

        // If the previous segment has a main choice N offsets into its
        // program, widen to the full run since that main sequence was
        // last bound.
        let previous_choices = store.choices_of_segments(&[previous.id])?;
        let main_choice = previous_choices
            .iter()
            .find(|c| c.program_type == ProgramType::Main);
        if let Some(choice) = main_choice {
            if let Some(binding_id) = choice.sequence_binding_id {
                let binding_offset = catalog.binding(binding_id)?.offset;
                if binding_offset > 0 {
                    from_offset = current_offset.saturating_sub(binding_offset);
                }
            }
        }

        let mut segments = Vec::new();
        for offset in from_offset..current_offset {
            if let Some(segment) = store.segment_at_offset(chain_id, offset)? {
                segments.push(segment);
            }
        }
        let ids: Vec<Uuid> = segments.iter().map(|s| s.id).collect();

        Ok(Self {
            choices: store.choices_of_segments(&ids)?,
            picks: store.picks_of_segments(&ids)?,
            chords: store.chords_of_segments(&ids)?,
            memes: store.memes_of_segments(&ids)?,
            previous_segment: Some(previous),
            segments,
        })
    }

    fn empty() -> Self {
        Self {
            segments: Vec::new(),
            previous_segment: None,
            choices: Vec::new(),
            picks: Vec::new(),
            chords: Vec::new(),
            memes: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.previous_segment.is_none()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn segment(&self, id: Uuid) -> Option<&Segment> {
        self.segments.iter().find(|s| s.id == id)
    }

    pub fn previous_segment(&self) -> Option<&Segment> {
        self.previous_segment.as_ref()
    }

    /// The previous segment's choice of a given program type.
    pub fn previous_choice_of_type(&self, kind: ProgramType) -> Option<&SegmentChoice> {
        let previous = self.previous_segment.as_ref()?;
        self.choices
            .iter()
            .find(|c| c.segment_id == previous.id && c.program_type == kind)
    }

    pub fn choices(&self) -> &[SegmentChoice] {
        &self.choices
    }

    pub fn picks(&self) -> &[SegmentChoiceArrangementPick] {
        &self.picks
    }

    /// Chords of one retrospective segment, ascending by position.
    pub fn chords_of_segment(&self, segment_id: Uuid) -> Vec<&SegmentChord> {
        let mut chords: Vec<&SegmentChord> = self
            .chords
            .iter()
            .filter(|c| c.segment_id == segment_id)
            .collect();
        chords.sort_by(|a, b| a.position.total_cmp(&b.position));
        chords
    }

    /// Meme names of the previous segment.
    pub fn previous_memes(&self) -> Vec<String> {
        match &self.previous_segment {
            Some(previous) => self
                .memes
                .iter()
                .filter(|m| m.segment_id == previous.id)
                .map(|m| m.name.clone())
                .collect(),
            None => Vec::new(),
        }
    }
}
