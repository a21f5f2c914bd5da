//! Chain entities: the Chain itself, its catalog bindings, and its
//! per-chain config rows

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Production chains run indefinitely; preview chains are time-capped
/// auditions with no public embed key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainType {
    Production,
    Preview,
}

/// Chain lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainState {
    Draft,
    Ready,
    Fabricate,
    Complete,
    Failed,
}

impl ChainState {
    /// The fixed transition table. Self-loops are explicit so a no-op
    /// update re-asserting the current state passes the guard.
    pub fn can_transition_to(self, next: ChainState) -> bool {
        use ChainState::*;
        matches!(
            (self, next),
            (Draft, Draft)
                | (Draft, Ready)
                | (Ready, Draft)
                | (Ready, Ready)
                | (Ready, Fabricate)
                | (Fabricate, Fabricate)
                | (Fabricate, Failed)
                | (Fabricate, Complete)
                | (Complete, Complete)
                | (Failed, Failed)
        )
    }

    /// Guard a requested transition; off-graph edges are a privilege
    /// error and leave state unchanged at the caller.
    pub fn require_transition(self, next: ChainState) -> Result<()> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(Error::Privilege(format!(
                "chain cannot transition from {self} to {next}"
            )))
        }
    }
}

impl fmt::Display for ChainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChainState::Draft => "Draft",
            ChainState::Ready => "Ready",
            ChainState::Fabricate => "Fabricate",
            ChainState::Complete => "Complete",
            ChainState::Failed => "Failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ChainState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(ChainState::Draft),
            "ready" => Ok(ChainState::Ready),
            "fabricate" => Ok(ChainState::Fabricate),
            "complete" => Ok(ChainState::Complete),
            "failed" => Ok(ChainState::Failed),
            other => Err(Error::Validation(format!("unknown chain state {other:?}"))),
        }
    }
}

/// One continuous run of scheduled music production.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chain {
    pub id: Uuid,
    pub account_id: Uuid,
    pub kind: ChainType,
    pub state: ChainState,
    pub name: String,
    pub start_at: DateTime<Utc>,
    pub stop_at: Option<DateTime<Utc>>,
    /// Public unique alias, usable in place of the id. Never set on
    /// preview chains.
    pub embed_key: Option<String>,
}

impl Chain {
    /// Normalize an embed key: trimmed, lowercased, `[a-z0-9]+` only.
    pub fn normalize_embed_key(raw: &str) -> Result<String> {
        let key = raw.trim().to_ascii_lowercase();
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::Validation(format!(
                "embed key {raw:?} must be non-empty and alphanumeric"
            )));
        }
        Ok(key)
    }
}

/// What kind of catalog entity a chain is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BindingTarget {
    Library,
    Program,
    Instrument,
}

/// A chain's binding to a catalog scope it may draw content from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainBinding {
    pub id: Uuid,
    pub chain_id: Uuid,
    pub target: BindingTarget,
    pub target_id: Uuid,
}

/// One key/value tunable override scoped to a chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfigItem {
    pub id: Uuid,
    pub chain_id: Uuid,
    pub key: String,
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_table_matches_graph() {
        use ChainState::*;
        assert!(Draft.can_transition_to(Ready));
        assert!(Ready.can_transition_to(Draft));
        assert!(Ready.can_transition_to(Fabricate));
        assert!(Fabricate.can_transition_to(Complete));
        assert!(Fabricate.can_transition_to(Failed));

        assert!(!Draft.can_transition_to(Fabricate));
        assert!(!Complete.can_transition_to(Fabricate));
        assert!(!Failed.can_transition_to(Draft));
        assert!(!Fabricate.can_transition_to(Ready));
    }

    #[test]
    fn self_loops_are_legal() {
        use ChainState::*;
        for state in [Draft, Ready, Fabricate, Complete, Failed] {
            assert!(state.can_transition_to(state), "{state} self-loop");
        }
    }

    #[test]
    fn embed_key_normalization() {
        assert_eq!(Chain::normalize_embed_key("  CoolAmbience1 ").unwrap(), "coolambience1");
        assert!(Chain::normalize_embed_key("has space").is_err());
        assert!(Chain::normalize_embed_key("").is_err());
    }

    #[test]
    fn state_round_trips_through_strings() {
        for state in [
            ChainState::Draft,
            ChainState::Ready,
            ChainState::Fabricate,
            ChainState::Complete,
            ChainState::Failed,
        ] {
            let parsed: ChainState = state.to_string().parse().unwrap();
            assert_eq!(parsed, state);
        }
    }
}
