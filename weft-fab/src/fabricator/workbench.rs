//! Segment workbench: per-pass mutable staging cache
//!
//! Everything a fabrication pass produces is staged here and committed
//! atomically by `done()`. The workbench pre-loads any sub-entities
//! already persisted for the segment so a reverted segment can be
//! recrafted in place.

use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use weft_common::access::Access;
use weft_common::config::FabricationConfig;
use weft_common::entity::catalog::{InstrumentType, ProgramType};
use weft_common::entity::segment::{
    Segment, SegmentChoice, SegmentChoiceArrangement, SegmentChoiceArrangementPick, SegmentChord,
    SegmentChordVoicing, SegmentMeme, SegmentMessage, SegmentMessageType,
};
use weft_common::store::EntityStore;
use weft_common::Result;

use crate::segment_manager::SegmentManager;

/// Mutable staging cache for one segment's in-progress sub-entities.
pub struct Workbench {
    store: Arc<EntityStore>,
    config: FabricationConfig,
    segment: Segment,
    choices: Vec<SegmentChoice>,
    arrangements: Vec<SegmentChoiceArrangement>,
    picks: Vec<SegmentChoiceArrangementPick>,
    chords: Vec<SegmentChord>,
    voicings: Vec<SegmentChordVoicing>,
    memes: Vec<SegmentMeme>,
    messages: Vec<SegmentMessage>,
    report: BTreeMap<String, String>,
}

impl Workbench {
    /// Open a workbench on a segment, pre-loading anything already
    /// persisted for it.
    pub fn new(store: Arc<EntityStore>, config: FabricationConfig, segment: Segment) -> Result<Self> {
        let ids = [segment.id];
        Ok(Self {
            choices: store.choices_of_segments(&ids)?,
            arrangements: store.arrangements_of_segments(&ids)?,
            picks: store.picks_of_segments(&ids)?,
            chords: store.chords_of_segments(&ids)?,
            voicings: store.voicings_of_segments(&ids)?,
            memes: store.memes_of_segments(&ids)?,
            messages: Vec::new(),
            report: BTreeMap::new(),
            store,
            config,
            segment,
        })
    }

    // ------------------------------------------------------------------
    // Segment access (explicit-update pattern)
    // ------------------------------------------------------------------

    pub fn segment(&self) -> &Segment {
        &self.segment
    }

    /// Replace the staged segment. Local mutation is only visible to
    /// subsequent reads after an explicit put; never rely on aliasing.
    pub fn put_segment(&mut self, segment: Segment) {
        self.segment = segment;
    }

    // ------------------------------------------------------------------
    // Staging
    // ------------------------------------------------------------------

    pub fn add_choice(&mut self, choice: SegmentChoice) -> &SegmentChoice {
        self.choices.push(choice);
        self.choices.last().expect("just pushed")
    }

    pub fn add_arrangement(&mut self, arrangement: SegmentChoiceArrangement) -> &SegmentChoiceArrangement {
        self.arrangements.push(arrangement);
        self.arrangements.last().expect("just pushed")
    }

    pub fn add_pick(&mut self, pick: SegmentChoiceArrangementPick) {
        self.picks.push(pick);
    }

    pub fn add_chord(&mut self, chord: SegmentChord) -> &SegmentChord {
        self.chords.push(chord);
        self.chords.last().expect("just pushed")
    }

    pub fn add_voicing(&mut self, voicing: SegmentChordVoicing) {
        self.voicings.push(voicing);
    }

    /// Stage a meme; silently ignored when one of the same normalized
    /// name is already staged.
    pub fn add_meme(&mut self, meme: SegmentMeme) {
        let normalized = SegmentMeme::normalize(&meme.name);
        if self.memes.iter().any(|m| SegmentMeme::normalize(&m.name) == normalized) {
            return;
        }
        self.memes.push(SegmentMeme {
            name: normalized,
            ..meme
        });
    }

    pub fn add_message(&mut self, kind: SegmentMessageType, body: impl Into<String>) {
        self.messages.push(SegmentMessage {
            id: Uuid::new_v4(),
            segment_id: self.segment.id,
            kind,
            body: body.into(),
        });
    }

    /// Record a key/value line in the diagnostic report map, serialized
    /// into one message at `done()`.
    pub fn report(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.report.insert(key.into(), value.into());
    }

    // ------------------------------------------------------------------
    // Reads over staged content
    // ------------------------------------------------------------------

    pub fn choices(&self) -> &[SegmentChoice] {
        &self.choices
    }

    pub fn choice_of_type(&self, kind: ProgramType) -> Option<&SegmentChoice> {
        self.choices.iter().find(|c| c.program_type == kind)
    }

    /// Staged chords, ascending by position.
    pub fn chords(&self) -> Vec<&SegmentChord> {
        let mut chords: Vec<&SegmentChord> = self.chords.iter().collect();
        chords.sort_by(|a, b| a.position.total_cmp(&b.position));
        chords
    }

    pub fn voicing_of(&self, chord_id: Uuid, kind: InstrumentType) -> Option<&SegmentChordVoicing> {
        self.voicings
            .iter()
            .find(|v| v.chord_id == chord_id && v.instrument_type == kind)
    }

    pub fn memes(&self) -> &[SegmentMeme] {
        &self.memes
    }

    pub fn picks(&self) -> &[SegmentChoiceArrangementPick] {
        &self.picks
    }

    // ------------------------------------------------------------------
    // Commit
    // ------------------------------------------------------------------

    /// Commit the pass: serialize the report map into one Debug message,
    /// persist the segment through the segment manager (transition
    /// guard applies), then persist sub-entities parents-before-children
    /// in the fixed order messages, memes, chords, voicings, choices,
    /// arrangements, picks.
    pub fn done(&mut self) -> Result<()> {
        if !self.report.is_empty() {
            let body = serde_json::to_string(&self.report)?;
            self.add_message(SegmentMessageType::Debug, body);
            self.report.clear();
        }

        let manager = SegmentManager::new(self.store.clone(), self.config.clone());
        manager.update(&Access::internal(), self.segment.clone())?;

        for message in &self.messages {
            self.store.put_message(message.clone())?;
        }
        for meme in &self.memes {
            self.store.put_meme(meme.clone())?;
        }
        for chord in &self.chords {
            self.store.put_chord(chord.clone())?;
        }
        for voicing in &self.voicings {
            self.store.put_voicing(voicing.clone())?;
        }
        for choice in &self.choices {
            self.store.put_choice(choice.clone())?;
        }
        for arrangement in &self.arrangements {
            self.store.put_arrangement(arrangement.clone())?;
        }
        for pick in &self.picks {
            self.store.put_pick(pick.clone())?;
        }
        self.messages.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use weft_common::entity::chain::{Chain, ChainState, ChainType};
    use weft_common::entity::segment::SegmentState;

    fn bench() -> (Workbench, Arc<EntityStore>) {
        let store = Arc::new(EntityStore::new());
        let chain = Chain {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            kind: ChainType::Production,
            state: ChainState::Fabricate,
            name: "test".into(),
            start_at: Utc::now(),
            stop_at: None,
            embed_key: None,
        };
        store.put_chain(chain.clone()).unwrap();
        let segment = store
            .insert_segment_if_absent(Segment::template(chain.id, 0, Utc::now()))
            .unwrap();
        let workbench = Workbench::new(store.clone(), FabricationConfig::default(), segment).unwrap();
        (workbench, store)
    }

    #[test]
    fn meme_dedup_by_normalized_name() {
        let (mut workbench, _) = bench();
        let segment_id = workbench.segment().id;
        for name in ["cool", "COOL", " Cool "] {
            workbench.add_meme(SegmentMeme {
                id: Uuid::new_v4(),
                segment_id,
                name: name.into(),
            });
        }
        assert_eq!(workbench.memes().len(), 1);
        assert_eq!(workbench.memes()[0].name, "COOL");
    }

    #[test]
    fn done_persists_report_as_one_message() {
        let (mut workbench, store) = bench();
        let segment_id = workbench.segment().id;
        workbench.report("macro_program", "Overture");
        workbench.report("main_program", "Daybreak");
        workbench.done().unwrap();

        let messages = store.messages_of_segments(&[segment_id]).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].kind, SegmentMessageType::Debug);
        let body: BTreeMap<String, String> = serde_json::from_str(&messages[0].body).unwrap();
        assert_eq!(body.get("macro_program").map(String::as_str), Some("Overture"));

        // Report map was cleared; a second done adds nothing
        workbench.done().unwrap();
        assert_eq!(store.messages_of_segments(&[segment_id]).unwrap().len(), 1);
    }

    #[test]
    fn done_persists_staged_entities() {
        let (mut workbench, store) = bench();
        let segment_id = workbench.segment().id;
        workbench.add_meme(SegmentMeme {
            id: Uuid::new_v4(),
            segment_id,
            name: "EARTH".into(),
        });
        workbench.add_chord(SegmentChord {
            id: Uuid::new_v4(),
            segment_id,
            position: 0.0,
            name: "C".into(),
        });
        workbench.done().unwrap();

        assert_eq!(store.memes_of_segments(&[segment_id]).unwrap().len(), 1);
        assert_eq!(store.chords_of_segments(&[segment_id]).unwrap().len(), 1);
    }

    #[test]
    fn done_respects_segment_transition_guard() {
        let (mut workbench, _) = bench();
        let mut segment = workbench.segment().clone();
        segment.state = SegmentState::Dubbed; // Planned -> Dubbed is off-graph
        workbench.put_segment(segment);
        assert!(workbench.done().is_err());
    }
}
