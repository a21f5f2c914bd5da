//! Segment lifecycle management
//!
//! Owns segment creation (offset-slot exclusivity), legal state
//! transitions, revert, destroy, and the windowed reads downstream
//! consumers use. All mutation outside the Fabricator's own pass goes
//! through here.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use weft_common::access::Access;
use weft_common::config::FabricationConfig;
use weft_common::entity::chain::Chain;
use weft_common::entity::segment::{Segment, SegmentState};
use weft_common::payload::Payload;
use weft_common::store::EntityStore;
use weft_common::{Error, Result};

use crate::keys;

/// Segment DAO logic over the entity store.
pub struct SegmentManager {
    store: Arc<EntityStore>,
    config: FabricationConfig,
}

impl SegmentManager {
    pub fn new(store: Arc<EntityStore>, config: FabricationConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    fn readable_chain(&self, access: &Access, chain_id: Uuid) -> Result<Chain> {
        let chain = self.store.chain(chain_id)?;
        access.require_account(chain.account_id)?;
        Ok(chain)
    }

    /// Create a segment from a template: new id, forced initial state,
    /// atomic insert-if-absent on (chain_id, offset).
    pub fn create(&self, access: &Access, template: Segment) -> Result<Segment> {
        self.readable_chain(access, template.chain_id)?;
        let segment = Segment {
            id: Uuid::new_v4(),
            state: SegmentState::Planned,
            ..template
        };
        let created = self.store.insert_segment_if_absent(segment)?;
        debug!(
            segment = %created.id,
            chain = %created.chain_id,
            offset = created.offset,
            "created segment"
        );
        Ok(created)
    }

    pub fn read(&self, access: &Access, id: Uuid) -> Result<Segment> {
        let segment = self.store.segment(id)?;
        self.readable_chain(access, segment.chain_id)?;
        Ok(segment)
    }

    pub fn read_at_offset(&self, access: &Access, chain_id: Uuid, offset: u32) -> Result<Option<Segment>> {
        self.readable_chain(access, chain_id)?;
        self.store.segment_at_offset(chain_id, offset)
    }

    pub fn read_last(&self, access: &Access, chain_id: Uuid) -> Result<Option<Segment>> {
        self.readable_chain(access, chain_id)?;
        self.store.last_segment(chain_id)
    }

    /// The last segment that reached the terminal success state.
    pub fn read_last_dubbed(&self, access: &Access, chain_id: Uuid) -> Result<Option<Segment>> {
        self.readable_chain(access, chain_id)?;
        self.store.last_segment_in_state(chain_id, SegmentState::Dubbed)
    }

    pub fn read_in_state(&self, access: &Access, chain_id: Uuid, state: SegmentState) -> Result<Vec<Segment>> {
        self.readable_chain(access, chain_id)?;
        self.store.segments_in_state(chain_id, state)
    }

    /// Offset-window read, capped at `limit_segment_read_size`.
    pub fn read_many_from_offset(
        &self,
        access: &Access,
        chain_id: Uuid,
        from_offset: u32,
    ) -> Result<Vec<Segment>> {
        self.readable_chain(access, chain_id)?;
        Ok(self
            .store
            .segments_of_chain(chain_id)?
            .into_iter()
            .filter(|s| s.offset >= from_offset)
            .take(self.config.limit_segment_read_size)
            .collect())
    }

    /// Time-window read bounded by the play buffer: segments beginning
    /// before `from_instant + play_buffer_ahead` and ending after
    /// `from_instant - play_buffer_delay`. Capped like the offset window.
    pub fn read_many_from_instant(
        &self,
        access: &Access,
        chain_id: Uuid,
        from_instant: DateTime<Utc>,
    ) -> Result<Vec<Segment>> {
        self.readable_chain(access, chain_id)?;
        let ahead = from_instant + Duration::seconds(self.config.play_buffer_ahead_seconds);
        let behind = from_instant - Duration::seconds(self.config.play_buffer_delay_seconds);
        Ok(self
            .store
            .segments_of_chain(chain_id)?
            .into_iter()
            .filter(|s| s.begin_at <= ahead && s.end_at.map(|e| e >= behind).unwrap_or(true))
            .take(self.config.limit_segment_read_size)
            .collect())
    }

    /// Update a segment: id, chain_id, and offset are immutable; the
    /// state change must be on the transition graph.
    pub fn update(&self, access: &Access, updated: Segment) -> Result<Segment> {
        let existing = self.store.segment(updated.id)?;
        self.readable_chain(access, existing.chain_id)?;
        if updated.chain_id != existing.chain_id {
            return Err(Error::Validation(format!(
                "segment {} chain_id is immutable",
                existing.id
            )));
        }
        if updated.offset != existing.offset {
            return Err(Error::Validation(format!(
                "segment {} offset is immutable",
                existing.id
            )));
        }
        existing.state.require_transition(updated.state)?;
        self.store.put_segment(updated.clone())?;
        Ok(updated)
    }

    /// Revert a segment early in its lifecycle: destroy all sub-entities
    /// except messages, then re-apply the update. Used to retry
    /// fabrication after a failure while preserving diagnostics.
    pub fn revert(&self, access: &Access, segment: Segment) -> Result<Segment> {
        let existing = self.store.segment(segment.id)?;
        self.readable_chain(access, existing.chain_id)?;
        if !existing.state.is_revertible() {
            return Err(Error::Validation(format!(
                "segment {} in state {} cannot be reverted",
                existing.id, existing.state
            )));
        }
        self.store.delete_segment_children(existing.id, true)?;
        debug!(segment = %existing.id, "reverted segment, messages kept");
        self.update(access, segment)
    }

    /// Destroy a segment and all its sub-entities, messages included.
    pub fn destroy(&self, access: &Access, id: Uuid) -> Result<()> {
        let segment = self.store.segment(id)?;
        self.readable_chain(access, segment.chain_id)?;
        self.store.delete_segment(id)
    }

    /// Metadata export: segments from an offset with all their
    /// sub-entities included and per-segment artifact links.
    pub fn read_many_payload(
        &self,
        access: &Access,
        chain_id: Uuid,
        from_offset: u32,
    ) -> Result<Payload> {
        let segments = self.read_many_from_offset(access, chain_id, from_offset)?;
        let ids: Vec<Uuid> = segments.iter().map(|s| s.id).collect();

        let mut payload = Payload::many(&segments)?;
        payload.include(&self.store.choices_of_segments(&ids)?)?;
        payload.include(&self.store.arrangements_of_segments(&ids)?)?;
        payload.include(&self.store.picks_of_segments(&ids)?)?;
        payload.include(&self.store.chords_of_segments(&ids)?)?;
        payload.include(&self.store.voicings_of_segments(&ids)?)?;
        payload.include(&self.store.memes_of_segments(&ids)?)?;
        payload.include(&self.store.messages_of_segments(&ids)?)?;

        for segment in &segments {
            payload.link(
                format!("waveform-{}", segment.offset),
                keys::with_extension(&segment.storage_key, &self.config.output_container),
            );
            payload.link(
                format!("metadata-{}", segment.offset),
                keys::with_extension(&segment.storage_key, "json"),
            );
        }
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_common::entity::chain::{ChainState, ChainType};

    fn harness() -> (SegmentManager, Access, Uuid) {
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
        let chain_id = chain.id;
        store.put_chain(chain).unwrap();
        let manager = SegmentManager::new(store, FabricationConfig::default());
        (manager, Access::internal(), chain_id)
    }

    #[test]
    fn create_forces_planned_and_new_id() {
        let (manager, access, chain_id) = harness();
        let mut template = Segment::template(chain_id, 0, Utc::now());
        template.state = SegmentState::Dubbed;
        let template_id = template.id;
        let created = manager.create(&access, template).unwrap();
        assert_eq!(created.state, SegmentState::Planned);
        assert_ne!(created.id, template_id);
    }

    #[test]
    fn duplicate_offset_is_rejected() {
        let (manager, access, chain_id) = harness();
        manager
            .create(&access, Segment::template(chain_id, 0, Utc::now()))
            .unwrap();
        let err = manager
            .create(&access, Segment::template(chain_id, 0, Utc::now()))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn update_rejects_chain_and_offset_changes() {
        let (manager, access, chain_id) = harness();
        let segment = manager
            .create(&access, Segment::template(chain_id, 0, Utc::now()))
            .unwrap();

        let mut moved = segment.clone();
        moved.chain_id = Uuid::new_v4();
        assert!(matches!(manager.update(&access, moved), Err(Error::Validation(_))));

        let mut shifted = segment;
        shifted.offset = 5;
        assert!(matches!(manager.update(&access, shifted), Err(Error::Validation(_))));
    }

    #[test]
    fn update_guards_state_transitions() {
        let (manager, access, chain_id) = harness();
        let segment = manager
            .create(&access, Segment::template(chain_id, 0, Utc::now()))
            .unwrap();

        let mut jumped = segment.clone();
        jumped.state = SegmentState::Dubbed;
        assert!(manager.update(&access, jumped).is_err());

        let mut crafting = segment;
        crafting.state = SegmentState::Crafting;
        assert!(manager.update(&access, crafting).is_ok());
    }

    #[test]
    fn revert_keeps_messages_only() {
        let (manager, access, chain_id) = harness();
        let segment = manager
            .create(&access, Segment::template(chain_id, 0, Utc::now()))
            .unwrap();
        let store = manager.store().clone();
        store
            .put_meme(weft_common::entity::segment::SegmentMeme {
                id: Uuid::new_v4(),
                segment_id: segment.id,
                name: "COOL".into(),
            })
            .unwrap();
        store
            .put_message(weft_common::entity::segment::SegmentMessage {
                id: Uuid::new_v4(),
                segment_id: segment.id,
                kind: weft_common::entity::segment::SegmentMessageType::Warning,
                body: "diagnostic".into(),
            })
            .unwrap();

        manager.revert(&access, segment.clone()).unwrap();
        assert!(store.memes_of_segments(&[segment.id]).unwrap().is_empty());
        assert_eq!(store.messages_of_segments(&[segment.id]).unwrap().len(), 1);
    }

    #[test]
    fn revert_rejected_late_in_lifecycle() {
        let (manager, access, chain_id) = harness();
        let mut segment = manager
            .create(&access, Segment::template(chain_id, 0, Utc::now()))
            .unwrap();
        for state in [SegmentState::Crafting, SegmentState::Crafted] {
            segment.state = state;
            segment = manager.update(&access, segment).unwrap();
        }
        assert!(matches!(
            manager.revert(&access, segment),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn offset_window_is_capped() {
        let (manager, access, chain_id) = harness();
        let limit = FabricationConfig::default().limit_segment_read_size;
        for offset in 0..(limit as u32 + 5) {
            manager
                .create(&access, Segment::template(chain_id, offset, Utc::now()))
                .unwrap();
        }
        let window = manager.read_many_from_offset(&access, chain_id, 0).unwrap();
        assert_eq!(window.len(), limit);
        assert_eq!(window[0].offset, 0);
    }

    #[test]
    fn foreign_account_is_denied() {
        let (manager, _, chain_id) = harness();
        let outsider = Access::user(vec![Uuid::new_v4()], vec![weft_common::access::UserRole::Artist]);
        let err = manager
            .create(&outsider, Segment::template(chain_id, 0, Utc::now()))
            .unwrap_err();
        assert!(matches!(err, Error::Privilege(_)));
    }
}
