//! In-memory entity store
//!
//! Reference implementation of the storage contract the engine consumes:
//! typed put/get/get-all/delete, parent-scoped reads, atomic
//! insert-if-absent for the segment offset-exclusivity invariant, and
//! cascading deletes. One lock guards the whole store so multi-row
//! operations (cascades, exclusivity checks) are atomic; a real backend
//! would supply the same guarantees at the database layer.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use crate::entity::chain::{Chain, ChainBinding, ChainConfigItem, ChainState};
use crate::entity::segment::{
    Segment, SegmentChoice, SegmentChoiceArrangement, SegmentChoiceArrangementPick, SegmentChord,
    SegmentChordVoicing, SegmentMeme, SegmentMessage, SegmentState,
};
use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct StoreInner {
    chains: HashMap<Uuid, Chain>,
    chain_bindings: HashMap<Uuid, ChainBinding>,
    chain_config_items: HashMap<Uuid, ChainConfigItem>,
    segments: HashMap<Uuid, Segment>,
    /// (chain_id, offset) → segment id; the offset-exclusivity index
    segment_slots: HashMap<(Uuid, u32), Uuid>,
    choices: HashMap<Uuid, SegmentChoice>,
    arrangements: HashMap<Uuid, SegmentChoiceArrangement>,
    picks: HashMap<Uuid, SegmentChoiceArrangementPick>,
    chords: HashMap<Uuid, SegmentChord>,
    voicings: HashMap<Uuid, SegmentChordVoicing>,
    memes: HashMap<Uuid, SegmentMeme>,
    messages: HashMap<Uuid, SegmentMessage>,
}

/// Thread-safe in-memory entity store.
#[derive(Debug, Default)]
pub struct EntityStore {
    inner: RwLock<StoreInner>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, StoreInner>> {
        self.inner
            .read()
            .map_err(|_| Error::Fatal("entity store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, StoreInner>> {
        self.inner
            .write()
            .map_err(|_| Error::Fatal("entity store lock poisoned".into()))
    }

    // ------------------------------------------------------------------
    // Chains
    // ------------------------------------------------------------------

    /// Insert or replace a chain.
    pub fn put_chain(&self, chain: Chain) -> Result<()> {
        self.write()?.chains.insert(chain.id, chain);
        Ok(())
    }

    pub fn chain(&self, id: Uuid) -> Result<Chain> {
        self.read()?
            .chains
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("chain {id}")))
    }

    pub fn chain_by_embed_key(&self, embed_key: &str) -> Result<Chain> {
        self.read()?
            .chains
            .values()
            .find(|c| c.embed_key.as_deref() == Some(embed_key))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("chain with embed key {embed_key:?}")))
    }

    pub fn all_chains(&self) -> Result<Vec<Chain>> {
        Ok(self.read()?.chains.values().cloned().collect())
    }

    pub fn chains_in_state(&self, state: ChainState) -> Result<Vec<Chain>> {
        Ok(self
            .read()?
            .chains
            .values()
            .filter(|c| c.state == state)
            .cloned()
            .collect())
    }

    /// Whether any chain other than `exclude` already holds this embed key.
    pub fn embed_key_taken(&self, embed_key: &str, exclude: Option<Uuid>) -> Result<bool> {
        Ok(self.read()?.chains.values().any(|c| {
            c.embed_key.as_deref() == Some(embed_key) && Some(c.id) != exclude
        }))
    }

    /// Delete a chain, cascading to its bindings, config items, and
    /// segments (with all segment sub-entities).
    pub fn delete_chain(&self, id: Uuid) -> Result<()> {
        let mut inner = self.write()?;
        if inner.chains.remove(&id).is_none() {
            return Err(Error::NotFound(format!("chain {id}")));
        }
        inner.chain_bindings.retain(|_, b| b.chain_id != id);
        inner.chain_config_items.retain(|_, c| c.chain_id != id);
        let segment_ids: Vec<Uuid> = inner
            .segments
            .values()
            .filter(|s| s.chain_id == id)
            .map(|s| s.id)
            .collect();
        for segment_id in segment_ids {
            delete_segment_locked(&mut inner, segment_id, false)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Chain bindings & config items
    // ------------------------------------------------------------------

    pub fn put_chain_binding(&self, binding: ChainBinding) -> Result<()> {
        self.write()?.chain_bindings.insert(binding.id, binding);
        Ok(())
    }

    pub fn bindings_of_chain(&self, chain_id: Uuid) -> Result<Vec<ChainBinding>> {
        Ok(self
            .read()?
            .chain_bindings
            .values()
            .filter(|b| b.chain_id == chain_id)
            .cloned()
            .collect())
    }

    pub fn delete_chain_binding(&self, id: Uuid) -> Result<()> {
        self.write()?
            .chain_bindings
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("chain binding {id}")))
    }

    pub fn put_chain_config_item(&self, item: ChainConfigItem) -> Result<()> {
        self.write()?.chain_config_items.insert(item.id, item);
        Ok(())
    }

    pub fn config_of_chain(&self, chain_id: Uuid) -> Result<Vec<ChainConfigItem>> {
        Ok(self
            .read()?
            .chain_config_items
            .values()
            .filter(|c| c.chain_id == chain_id)
            .cloned()
            .collect())
    }

    // ------------------------------------------------------------------
    // Segments
    // ------------------------------------------------------------------

    /// Atomic insert-if-absent on the (chain_id, offset) slot.
    ///
    /// This rejection is the sole concurrency-safety mechanism for the
    /// "append next segment" race: a double-scheduled attempt fails
    /// cleanly with a `Validation` error instead of duplicating.
    pub fn insert_segment_if_absent(&self, segment: Segment) -> Result<Segment> {
        let mut inner = self.write()?;
        let slot = (segment.chain_id, segment.offset);
        if inner.segment_slots.contains_key(&slot) {
            return Err(Error::Validation(format!(
                "segment already exists at chain {} offset {}",
                segment.chain_id, segment.offset
            )));
        }
        inner.segment_slots.insert(slot, segment.id);
        inner.segments.insert(segment.id, segment.clone());
        Ok(segment)
    }

    /// Replace an existing segment row. The slot index is untouched:
    /// chain_id and offset are immutable and enforced by the manager.
    pub fn put_segment(&self, segment: Segment) -> Result<()> {
        let mut inner = self.write()?;
        if !inner.segments.contains_key(&segment.id) {
            return Err(Error::NotFound(format!("segment {}", segment.id)));
        }
        inner.segments.insert(segment.id, segment);
        Ok(())
    }

    pub fn segment(&self, id: Uuid) -> Result<Segment> {
        self.read()?
            .segments
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("segment {id}")))
    }

    pub fn segment_at_offset(&self, chain_id: Uuid, offset: u32) -> Result<Option<Segment>> {
        let inner = self.read()?;
        Ok(inner
            .segment_slots
            .get(&(chain_id, offset))
            .and_then(|id| inner.segments.get(id))
            .cloned())
    }

    /// All segments of a chain, ascending by offset.
    pub fn segments_of_chain(&self, chain_id: Uuid) -> Result<Vec<Segment>> {
        let mut segments: Vec<Segment> = self
            .read()?
            .segments
            .values()
            .filter(|s| s.chain_id == chain_id)
            .cloned()
            .collect();
        segments.sort_by_key(|s| s.offset);
        Ok(segments)
    }

    pub fn last_segment(&self, chain_id: Uuid) -> Result<Option<Segment>> {
        Ok(self
            .read()?
            .segments
            .values()
            .filter(|s| s.chain_id == chain_id)
            .max_by_key(|s| s.offset)
            .cloned())
    }

    pub fn last_segment_in_state(
        &self,
        chain_id: Uuid,
        state: SegmentState,
    ) -> Result<Option<Segment>> {
        Ok(self
            .read()?
            .segments
            .values()
            .filter(|s| s.chain_id == chain_id && s.state == state)
            .max_by_key(|s| s.offset)
            .cloned())
    }

    pub fn segments_in_state(&self, chain_id: Uuid, state: SegmentState) -> Result<Vec<Segment>> {
        let mut segments: Vec<Segment> = self
            .read()?
            .segments
            .values()
            .filter(|s| s.chain_id == chain_id && s.state == state)
            .cloned()
            .collect();
        segments.sort_by_key(|s| s.offset);
        Ok(segments)
    }

    /// Delete a segment and all its sub-entities, messages included.
    pub fn delete_segment(&self, id: Uuid) -> Result<()> {
        let mut inner = self.write()?;
        delete_segment_locked(&mut inner, id, false)
    }

    /// Delete a segment's sub-entities only. With `keep_messages`, the
    /// diagnostic trail survives (the revert contract).
    pub fn delete_segment_children(&self, segment_id: Uuid, keep_messages: bool) -> Result<()> {
        let mut inner = self.write()?;
        delete_children_locked(&mut inner, segment_id, keep_messages);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Segment sub-entities
    // ------------------------------------------------------------------

    pub fn put_choice(&self, choice: SegmentChoice) -> Result<()> {
        self.write()?.choices.insert(choice.id, choice);
        Ok(())
    }

    pub fn put_arrangement(&self, arrangement: SegmentChoiceArrangement) -> Result<()> {
        self.write()?.arrangements.insert(arrangement.id, arrangement);
        Ok(())
    }

    pub fn put_pick(&self, pick: SegmentChoiceArrangementPick) -> Result<()> {
        self.write()?.picks.insert(pick.id, pick);
        Ok(())
    }

    pub fn put_chord(&self, chord: SegmentChord) -> Result<()> {
        self.write()?.chords.insert(chord.id, chord);
        Ok(())
    }

    pub fn put_voicing(&self, voicing: SegmentChordVoicing) -> Result<()> {
        self.write()?.voicings.insert(voicing.id, voicing);
        Ok(())
    }

    pub fn put_meme(&self, meme: SegmentMeme) -> Result<()> {
        self.write()?.memes.insert(meme.id, meme);
        Ok(())
    }

    pub fn put_message(&self, message: SegmentMessage) -> Result<()> {
        self.write()?.messages.insert(message.id, message);
        Ok(())
    }

    pub fn choices_of_segments(&self, segment_ids: &[Uuid]) -> Result<Vec<SegmentChoice>> {
        Ok(scoped(&self.read()?.choices, segment_ids, |c| c.segment_id))
    }

    pub fn arrangements_of_segments(
        &self,
        segment_ids: &[Uuid],
    ) -> Result<Vec<SegmentChoiceArrangement>> {
        Ok(scoped(&self.read()?.arrangements, segment_ids, |a| a.segment_id))
    }

    pub fn picks_of_segments(
        &self,
        segment_ids: &[Uuid],
    ) -> Result<Vec<SegmentChoiceArrangementPick>> {
        Ok(scoped(&self.read()?.picks, segment_ids, |p| p.segment_id))
    }

    pub fn chords_of_segments(&self, segment_ids: &[Uuid]) -> Result<Vec<SegmentChord>> {
        Ok(scoped(&self.read()?.chords, segment_ids, |c| c.segment_id))
    }

    pub fn voicings_of_segments(&self, segment_ids: &[Uuid]) -> Result<Vec<SegmentChordVoicing>> {
        Ok(scoped(&self.read()?.voicings, segment_ids, |v| v.segment_id))
    }

    pub fn memes_of_segments(&self, segment_ids: &[Uuid]) -> Result<Vec<SegmentMeme>> {
        Ok(scoped(&self.read()?.memes, segment_ids, |m| m.segment_id))
    }

    pub fn messages_of_segments(&self, segment_ids: &[Uuid]) -> Result<Vec<SegmentMessage>> {
        Ok(scoped(&self.read()?.messages, segment_ids, |m| m.segment_id))
    }
}

fn scoped<T: Clone>(map: &HashMap<Uuid, T>, parent_ids: &[Uuid], parent_of: impl Fn(&T) -> Uuid) -> Vec<T> {
    map.values()
        .filter(|v| parent_ids.contains(&parent_of(v)))
        .cloned()
        .collect()
}

fn delete_children_locked(inner: &mut StoreInner, segment_id: Uuid, keep_messages: bool) {
    inner.choices.retain(|_, c| c.segment_id != segment_id);
    inner.arrangements.retain(|_, a| a.segment_id != segment_id);
    inner.picks.retain(|_, p| p.segment_id != segment_id);
    inner.chords.retain(|_, c| c.segment_id != segment_id);
    inner.voicings.retain(|_, v| v.segment_id != segment_id);
    inner.memes.retain(|_, m| m.segment_id != segment_id);
    if !keep_messages {
        inner.messages.retain(|_, m| m.segment_id != segment_id);
    }
}

fn delete_segment_locked(inner: &mut StoreInner, id: Uuid, keep_messages: bool) -> Result<()> {
    let segment = inner
        .segments
        .remove(&id)
        .ok_or_else(|| Error::NotFound(format!("segment {id}")))?;
    inner.segment_slots.remove(&(segment.chain_id, segment.offset));
    delete_children_locked(inner, id, keep_messages);
    Ok(())
}
