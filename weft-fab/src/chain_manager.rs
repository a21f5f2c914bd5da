//! Chain lifecycle management and segment scheduling
//!
//! Owns chain creation/update/state transitions, the
//! next-segment-or-complete scheduling decision consumed by the external
//! work loop, and stall detection with revival. Revival is the system's
//! coarse-grained retry primitive: a stuck chain is failed and a fresh
//! one (new id, preserved embed key and bindings) takes over.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use weft_common::access::{Access, UserRole};
use weft_common::config::FabricationConfig;
use weft_common::entity::chain::{Chain, ChainBinding, ChainConfigItem, ChainState, ChainType};
use weft_common::entity::segment::{Segment, SegmentState};
use weft_common::events::{Notification, NotificationBus};
use weft_common::payload::Payload;
use weft_common::store::EntityStore;
use weft_common::{Error, Result};

use crate::keys;

/// Outcome of one scheduling query.
#[derive(Debug, Clone)]
pub enum SchedulingDecision {
    /// Nothing to do right now (open tail, too far ahead, or complete)
    NoAction,
    /// Build this Pending-type segment template next
    BuildSegment(Segment),
}

/// Parameters for creating a chain.
#[derive(Debug, Clone)]
pub struct ChainCreate {
    pub account_id: Uuid,
    pub kind: ChainType,
    pub name: String,
    pub start_at: DateTime<Utc>,
    pub stop_at: Option<DateTime<Utc>>,
    pub embed_key: Option<String>,
}

/// Chain DAO logic over the entity store.
pub struct ChainManager {
    store: Arc<EntityStore>,
    config: FabricationConfig,
    bus: NotificationBus,
}

impl ChainManager {
    pub fn new(store: Arc<EntityStore>, config: FabricationConfig, bus: NotificationBus) -> Self {
        Self { store, config, bus }
    }

    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    // ------------------------------------------------------------------
    // CRUD
    // ------------------------------------------------------------------

    /// Create a chain; always starts Draft.
    ///
    /// Production requires the Engineer role on the account and an unused
    /// embed key. Preview forces `start_at = now`, caps `stop_at`, and
    /// never carries an embed key.
    pub fn create(&self, access: &Access, params: ChainCreate) -> Result<Chain> {
        access.require_account(params.account_id)?;
        let mut chain = Chain {
            id: Uuid::new_v4(),
            account_id: params.account_id,
            kind: params.kind,
            state: ChainState::Draft,
            name: params.name,
            start_at: params.start_at,
            stop_at: params.stop_at,
            embed_key: None,
        };
        match params.kind {
            ChainType::Production => {
                access.require_role(params.account_id, UserRole::Engineer)?;
                if let Some(raw) = params.embed_key.as_deref() {
                    chain.embed_key = Some(self.claim_embed_key(raw, None)?);
                }
            }
            ChainType::Preview => {
                let now = Utc::now();
                chain.start_at = now;
                chain.stop_at = Some(self.preview_cap(now, params.stop_at));
            }
        }
        self.store.put_chain(chain.clone())?;
        Ok(chain)
    }

    pub fn read(&self, access: &Access, id: Uuid) -> Result<Chain> {
        let chain = self.store.chain(id)?;
        access.require_account(chain.account_id)?;
        Ok(chain)
    }

    /// Read by the public embed-key alias.
    pub fn read_by_embed_key(&self, embed_key: &str) -> Result<Chain> {
        let key = Chain::normalize_embed_key(embed_key)?;
        self.store.chain_by_embed_key(&key)
    }

    pub fn read_all(&self, access: &Access) -> Result<Vec<Chain>> {
        Ok(self
            .store
            .all_chains()?
            .into_iter()
            .filter(|c| access.has_account(c.account_id))
            .collect())
    }

    /// Update a chain. Type is immutable; embed-key uniqueness and the
    /// preview cap are re-validated; `start_at` freezes once the chain
    /// has any segment; state changes ride the transition table.
    pub fn update(&self, access: &Access, updated: Chain) -> Result<Chain> {
        let existing = self.read(access, updated.id)?;
        let mut updated = updated;
        if updated.kind != existing.kind {
            return Err(Error::Validation(format!(
                "chain {} type is immutable",
                existing.id
            )));
        }
        if updated.embed_key != existing.embed_key {
            updated.embed_key = match updated.embed_key.as_deref() {
                Some(raw) => Some(self.claim_embed_key(raw, Some(existing.id))?),
                None => None,
            };
        }
        if existing.kind == ChainType::Preview {
            updated.embed_key = None;
            updated.stop_at = Some(self.preview_cap(existing.start_at, updated.stop_at));
        }
        if updated.start_at != existing.start_at
            && self.store.last_segment(existing.id)?.is_some()
        {
            return Err(Error::Validation(format!(
                "chain {} start_at is immutable once segments exist",
                existing.id
            )));
        }
        if updated.state != existing.state {
            self.validate_transition(&existing, updated.state)?;
        }
        self.store.put_chain(updated.clone())?;
        if updated.state != existing.state {
            self.notify_transition(&updated);
        }
        Ok(updated)
    }

    /// Apply a state transition; off-graph edges fail with a privilege
    /// error and leave state unchanged.
    pub fn update_state(&self, access: &Access, id: Uuid, next: ChainState) -> Result<Chain> {
        let mut chain = self.read(access, id)?;
        self.validate_transition(&chain, next)?;
        chain.state = next;
        self.store.put_chain(chain.clone())?;
        self.notify_transition(&chain);
        Ok(chain)
    }

    /// Destroy a chain and everything under it. A chain that still has
    /// segments requires a top-level capability.
    pub fn destroy(&self, access: &Access, id: Uuid) -> Result<()> {
        let chain = self.read(access, id)?;
        if !access.is_top_level && self.store.last_segment(chain.id)?.is_some() {
            return Err(Error::Privilege(format!(
                "chain {} still has segments; only a top-level capability may destroy it",
                chain.id
            )));
        }
        self.store.delete_chain(id)
    }

    /// Metadata export: one chain with its bindings included.
    pub fn read_payload(&self, access: &Access, id: Uuid) -> Result<Payload> {
        let chain = self.read(access, id)?;
        let bindings = self.store.bindings_of_chain(chain.id)?;
        let mut payload = Payload::one(&chain)?;
        payload.include(&bindings)?;
        if let Some(key) = &chain.embed_key {
            payload.link("embed", format!("/embed/{key}"));
        }
        Ok(payload)
    }

    // ------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------

    /// The scheduling core: decide whether to build the chain's next
    /// segment, complete the chain, or do nothing.
    ///
    /// `segment_begin_before` throttles lookahead: no template is issued
    /// whose predecessor begins after it. `chain_stop_complete_before`
    /// throttles completion the same way.
    pub fn build_next_segment_or_complete(
        &self,
        access: &Access,
        chain: &Chain,
        segment_begin_before: DateTime<Utc>,
        chain_stop_complete_before: DateTime<Utc>,
    ) -> Result<SchedulingDecision> {
        access.require_account(chain.account_id)?;

        let last = match self.store.last_segment(chain.id)? {
            None => {
                // Empty chain: first segment starts at the chain start
                return Ok(self.template_at(chain, 0, chain.start_at));
            }
            Some(last) => last,
        };

        // An open tail means a fabrication pass is (or should be) in
        // flight; never double-schedule.
        let end_at = match last.end_at {
            None => return Ok(SchedulingDecision::NoAction),
            Some(end_at) => end_at,
        };

        if last.begin_at > segment_begin_before {
            return Ok(SchedulingDecision::NoAction);
        }

        if let Some(stop_at) = chain.stop_at {
            if end_at > stop_at {
                // Completion candidate; build nothing either way
                if stop_at < chain_stop_complete_before && last.state == SegmentState::Dubbed {
                    self.update_state(access, chain.id, ChainState::Complete)?;
                    info!(chain = %chain.id, "chain complete");
                }
                return Ok(SchedulingDecision::NoAction);
            }
        }

        Ok(self.template_at(chain, last.offset + 1, end_at))
    }

    fn template_at(&self, chain: &Chain, offset: u32, begin_at: DateTime<Utc>) -> SchedulingDecision {
        let mut template = Segment::template(chain.id, offset, begin_at);
        template.storage_key = keys::segment_storage_key(chain, begin_at);
        SchedulingDecision::BuildSegment(template)
    }

    // ------------------------------------------------------------------
    // Revival
    // ------------------------------------------------------------------

    /// Revive a production chain stuck in Fabricate: fail the prior chain
    /// (clearing its embed key), then stand up a fresh chain reusing its
    /// config, bindings, and embed key, advanced straight to Fabricate.
    ///
    /// The caller is expected to destroy the prior chain afterwards.
    pub fn revive(&self, access: &Access, prior_chain_id: Uuid) -> Result<Chain> {
        let prior = self.read(access, prior_chain_id)?;
        if prior.kind != ChainType::Production {
            return Err(Error::Validation(format!(
                "cannot revive {} chain {}",
                match prior.kind {
                    ChainType::Preview => "preview",
                    ChainType::Production => "production",
                },
                prior.id
            )));
        }
        if prior.state != ChainState::Fabricate {
            return Err(Error::Validation(format!(
                "cannot revive chain {} in state {}",
                prior.id, prior.state
            )));
        }

        let embed_key = prior.embed_key.clone();
        let mut failed = prior.clone();
        failed.state = ChainState::Failed;
        failed.embed_key = None;
        self.store.put_chain(failed.clone())?;
        self.notify_transition(&failed);

        let mut revived = Chain {
            id: Uuid::new_v4(),
            account_id: prior.account_id,
            kind: ChainType::Production,
            state: ChainState::Draft,
            name: prior.name.clone(),
            start_at: Utc::now(),
            stop_at: prior.stop_at,
            embed_key,
        };
        self.store.put_chain(revived.clone())?;

        for binding in self.store.bindings_of_chain(prior.id)? {
            self.store.put_chain_binding(ChainBinding {
                id: Uuid::new_v4(),
                chain_id: revived.id,
                target: binding.target,
                target_id: binding.target_id,
            })?;
        }
        for item in self.store.config_of_chain(prior.id)? {
            self.store.put_chain_config_item(ChainConfigItem {
                id: Uuid::new_v4(),
                chain_id: revived.id,
                key: item.key,
                value: item.value,
            })?;
        }

        revived = self.update_state(access, revived.id, ChainState::Ready)?;
        revived = self.update_state(access, revived.id, ChainState::Fabricate)?;

        self.bus.emit(Notification::ChainRevived {
            prior_chain_id: prior.id,
            new_chain_id: revived.id,
            message: format!("Revived chain {} as {}", prior.id, revived.id),
            timestamp: Utc::now(),
        });
        info!(prior = %prior.id, revived = %revived.id, "revived chain");
        Ok(revived)
    }

    /// Sweep for stalled chains and revive them, destroying the
    /// originals. Idempotent under repeated or overlapping invocation: a
    /// chain already revived is no longer in Fabricate, so a second sweep
    /// finds nothing to act on. Per-chain failures are isolated.
    pub fn check_and_revive_all(&self) -> Result<Vec<(Uuid, Uuid)>> {
        let access = Access::internal();
        let now = Utc::now();
        let start_horizon = now - Duration::seconds(self.config.chain_revive_threshold_start_seconds);
        let head_horizon = now - Duration::seconds(self.config.chain_revive_threshold_head_seconds);

        let mut revived_pairs = Vec::new();
        for chain in self.store.chains_in_state(ChainState::Fabricate)? {
            if chain.kind != ChainType::Production || chain.start_at > start_horizon {
                continue;
            }
            match self.has_fresh_output(chain.id, head_horizon) {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    warn!(chain = %chain.id, "stall check failed: {e}");
                    continue;
                }
            }
            match self
                .revive(&access, chain.id)
                .and_then(|new_chain| self.destroy(&access, chain.id).map(|_| new_chain))
            {
                Ok(new_chain) => revived_pairs.push((chain.id, new_chain.id)),
                Err(e) => warn!(chain = %chain.id, "revival failed: {e}"),
            }
        }
        Ok(revived_pairs)
    }

    fn has_fresh_output(&self, chain_id: Uuid, head_horizon: DateTime<Utc>) -> Result<bool> {
        Ok(self
            .store
            .last_segment_in_state(chain_id, SegmentState::Dubbed)?
            .and_then(|s| s.end_at)
            .map(|end| end > head_horizon)
            .unwrap_or(false))
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn validate_transition(&self, chain: &Chain, next: ChainState) -> Result<()> {
        chain.state.require_transition(next)?;
        if chain.state == ChainState::Draft && next == ChainState::Ready {
            let bindings = self.store.bindings_of_chain(chain.id)?;
            if bindings.is_empty() {
                return Err(Error::Validation(format!(
                    "chain {} must be bound to at least one Library/Program/Instrument",
                    chain.id
                )));
            }
        }
        Ok(())
    }

    fn notify_transition(&self, chain: &Chain) {
        match chain.state {
            ChainState::Fabricate => self.bus.emit(Notification::ChainFabricating {
                chain_id: chain.id,
                message: format!("Chain {} ({}) is now fabricating", chain.id, chain.name),
                timestamp: Utc::now(),
            }),
            ChainState::Failed => self.bus.emit(Notification::ChainFailed {
                chain_id: chain.id,
                message: format!("Chain {} ({}) failed", chain.id, chain.name),
                timestamp: Utc::now(),
            }),
            _ => {}
        }
    }

    fn claim_embed_key(&self, raw: &str, exclude: Option<Uuid>) -> Result<String> {
        let key = Chain::normalize_embed_key(raw)?;
        if self.store.embed_key_taken(&key, exclude)? {
            return Err(Error::Validation(format!("embed key {key:?} is already in use")));
        }
        Ok(key)
    }

    fn preview_cap(&self, start_at: DateTime<Utc>, requested: Option<DateTime<Utc>>) -> DateTime<Utc> {
        let cap = start_at + Duration::seconds(self.config.preview_length_max_seconds);
        match requested {
            Some(stop_at) if stop_at < cap => stop_at,
            _ => cap,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (ChainManager, Access, Uuid) {
        let store = Arc::new(EntityStore::new());
        let manager = ChainManager::new(store, FabricationConfig::default(), NotificationBus::new(16));
        let account_id = Uuid::new_v4();
        (manager, Access::internal(), account_id)
    }

    fn production(account_id: Uuid, embed_key: Option<&str>) -> ChainCreate {
        ChainCreate {
            account_id,
            kind: ChainType::Production,
            name: "test".into(),
            start_at: Utc::now(),
            stop_at: None,
            embed_key: embed_key.map(String::from),
        }
    }

    #[test]
    fn create_starts_draft() {
        let (manager, access, account_id) = manager();
        let chain = manager.create(&access, production(account_id, None)).unwrap();
        assert_eq!(chain.state, ChainState::Draft);
    }

    #[test]
    fn production_requires_engineer_role() {
        let (manager, _, account_id) = manager();
        let artist = Access::user(vec![account_id], vec![UserRole::Artist]);
        let err = manager.create(&artist, production(account_id, None)).unwrap_err();
        assert!(matches!(err, Error::Privilege(_)));

        let engineer = Access::user(vec![account_id], vec![UserRole::Engineer]);
        assert!(manager.create(&engineer, production(account_id, None)).is_ok());
    }

    #[test]
    fn duplicate_embed_key_rejected() {
        let (manager, access, account_id) = manager();
        manager
            .create(&access, production(account_id, Some("myalias")))
            .unwrap();
        let err = manager
            .create(&access, production(account_id, Some("MyAlias")))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn preview_is_capped_and_keyless() {
        let (manager, access, account_id) = manager();
        let far_future = Utc::now() + Duration::days(30);
        let chain = manager
            .create(
                &access,
                ChainCreate {
                    account_id,
                    kind: ChainType::Preview,
                    name: "preview".into(),
                    start_at: Utc::now() - Duration::days(1),
                    stop_at: Some(far_future),
                    embed_key: Some("sneaky".into()),
                },
            )
            .unwrap();
        assert!(chain.embed_key.is_none());
        let max_stop = chain.start_at
            + Duration::seconds(FabricationConfig::default().preview_length_max_seconds);
        assert!(chain.stop_at.unwrap() <= max_stop);
    }

    #[test]
    fn chain_type_is_immutable() {
        let (manager, access, account_id) = manager();
        let mut chain = manager.create(&access, production(account_id, None)).unwrap();
        chain.kind = ChainType::Preview;
        assert!(matches!(manager.update(&access, chain), Err(Error::Validation(_))));
    }

    #[test]
    fn draft_to_ready_requires_binding() {
        let (manager, access, account_id) = manager();
        let chain = manager.create(&access, production(account_id, None)).unwrap();

        let err = manager
            .update_state(&access, chain.id, ChainState::Ready)
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("must be bound"));
        // State unchanged
        assert_eq!(manager.read(&access, chain.id).unwrap().state, ChainState::Draft);

        manager
            .store()
            .put_chain_binding(ChainBinding {
                id: Uuid::new_v4(),
                chain_id: chain.id,
                target: weft_common::entity::chain::BindingTarget::Library,
                target_id: Uuid::new_v4(),
            })
            .unwrap();
        assert!(manager.update_state(&access, chain.id, ChainState::Ready).is_ok());
    }

    #[test]
    fn off_graph_transition_is_privilege_error() {
        let (manager, access, account_id) = manager();
        let chain = manager.create(&access, production(account_id, None)).unwrap();
        let err = manager
            .update_state(&access, chain.id, ChainState::Complete)
            .unwrap_err();
        assert!(matches!(err, Error::Privilege(_)));
        assert_eq!(manager.read(&access, chain.id).unwrap().state, ChainState::Draft);
    }

    #[test]
    fn fabricate_entry_emits_notification() {
        let (manager, access, account_id) = manager();
        let mut rx = {
            let bus = NotificationBus::new(16);
            let manager = ChainManager::new(manager.store().clone(), FabricationConfig::default(), bus.clone());
            let chain = manager.create(&access, production(account_id, None)).unwrap();
            manager
                .store()
                .put_chain_binding(ChainBinding {
                    id: Uuid::new_v4(),
                    chain_id: chain.id,
                    target: weft_common::entity::chain::BindingTarget::Library,
                    target_id: Uuid::new_v4(),
                })
                .unwrap();
            manager.update_state(&access, chain.id, ChainState::Ready).unwrap();
            let rx = bus.subscribe();
            manager
                .update_state(&access, chain.id, ChainState::Fabricate)
                .unwrap();
            rx
        };
        assert!(matches!(
            rx.try_recv().unwrap(),
            Notification::ChainFabricating { .. }
        ));
    }
}
