//! Segment entities: the Segment and all sub-entities produced for it
//! during one fabrication pass

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::catalog::{InstrumentType, ProgramType};
use crate::error::{Error, Result};

/// How a segment relates to the one before it.
///
/// `Pending` is the scheduler's template type; the Fabricator resolves it
/// to one of the other four during its pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentType {
    Pending,
    Initial,
    Continue,
    NextMain,
    NextMacro,
}

/// Segment lifecycle state.
///
/// Planned → Crafting → Crafted → Dubbing → Dubbed, with Failed reachable
/// from every non-terminal state and self-loops allowed everywhere (an
/// update that does not change state must pass the guard).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentState {
    Planned,
    Crafting,
    Crafted,
    Dubbing,
    Dubbed,
    Failed,
}

impl SegmentState {
    pub fn can_transition_to(self, next: SegmentState) -> bool {
        use SegmentState::*;
        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (Planned, Crafting)
                | (Crafting, Crafted)
                | (Crafted, Dubbing)
                | (Dubbing, Dubbed)
                | (Planned, Failed)
                | (Crafting, Failed)
                | (Crafted, Failed)
                | (Dubbing, Failed)
        )
    }

    pub fn require_transition(self, next: SegmentState) -> Result<()> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(Error::transition("segment", self, next))
        }
    }

    /// Whether a segment in this state may still be reverted (sub-entities
    /// cleared for a retry).
    pub fn is_revertible(self) -> bool {
        matches!(self, SegmentState::Planned | SegmentState::Crafting)
    }
}

impl fmt::Display for SegmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SegmentState::Planned => "Planned",
            SegmentState::Crafting => "Crafting",
            SegmentState::Crafted => "Crafted",
            SegmentState::Dubbing => "Dubbing",
            SegmentState::Dubbed => "Dubbed",
            SegmentState::Failed => "Failed",
        };
        write!(f, "{s}")
    }
}

/// One fixed-length scheduled unit of music within a chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub id: Uuid,
    /// Immutable after create
    pub chain_id: Uuid,
    /// Ordinal position in the chain; immutable after create
    pub offset: u32,
    pub kind: SegmentType,
    pub state: SegmentState,
    pub begin_at: DateTime<Utc>,
    /// None while the segment is the chain's open tail
    pub end_at: Option<DateTime<Utc>>,
    /// Key name of the harmonic context, e.g. "C minor"
    pub key: String,
    /// Total beats in this segment
    pub total: u32,
    /// Tempo at the end of this segment, BPM
    pub tempo: f64,
    /// Address for externally persisted artifacts (no extension)
    pub storage_key: String,
    /// Ordinal position within the current main-program run
    pub delta: u32,
}

impl Segment {
    /// A Pending-type template at the given slot, as returned by the
    /// scheduler. Content fields are zeroed; the Fabricator fills them.
    pub fn template(chain_id: Uuid, offset: u32, begin_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            chain_id,
            offset,
            kind: SegmentType::Pending,
            state: SegmentState::Planned,
            begin_at,
            end_at: None,
            key: String::new(),
            total: 0,
            tempo: 0.0,
            storage_key: String::new(),
            delta: 0,
        }
    }
}

/// A selection of one program (or instrument) for a musical role within a
/// segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentChoice {
    pub id: Uuid,
    pub segment_id: Uuid,
    pub program_type: ProgramType,
    pub program_id: Option<Uuid>,
    /// Set for sequence-bound (macro/main) choices
    pub sequence_binding_id: Option<Uuid>,
    /// Set for instrument-backed (rhythm/detail) choices
    pub instrument_id: Option<Uuid>,
    /// Semitone transposition applied to this choice's content
    pub transpose: i32,
}

/// Concrete realization of a choice on one voice with one instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentChoiceArrangement {
    pub id: Uuid,
    pub segment_id: Uuid,
    pub choice_id: Uuid,
    /// Program voice realized; None for instrument-only (detail) coverage
    pub voice_id: Option<Uuid>,
    pub instrument_id: Uuid,
}

/// One picked instrument-audio note within an arrangement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentChoiceArrangementPick {
    pub id: Uuid,
    pub segment_id: Uuid,
    pub arrangement_id: Uuid,
    pub audio_id: Uuid,
    /// Name of the event track this pick realizes
    pub track_name: String,
    /// Seconds from segment start
    pub start_seconds: f64,
    pub length_seconds: f64,
    /// Note text, e.g. "C4"; atonal picks carry "X"
    pub note: String,
    pub amplitude: f64,
}

/// Harmonic content at a beat position within the segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentChord {
    pub id: Uuid,
    pub segment_id: Uuid,
    /// Beat position, ascending within the segment
    pub position: f64,
    pub name: String,
}

/// Per-instrument-type note set for one segment chord.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentChordVoicing {
    pub id: Uuid,
    pub segment_id: Uuid,
    pub chord_id: Uuid,
    pub instrument_type: InstrumentType,
    /// CSV of note texts
    pub notes: String,
}

/// A thematic tag attached to a segment; at most one per normalized name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentMeme {
    pub id: Uuid,
    pub segment_id: Uuid,
    pub name: String,
}

impl SegmentMeme {
    /// Normalized form used for the at-most-one-per-name rule.
    pub fn normalize(name: &str) -> String {
        name.trim().to_ascii_uppercase()
    }
}

/// Diagnostic severity of a segment message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentMessageType {
    Debug,
    Info,
    Warning,
    Error,
}

/// Diagnostic record attached to a segment; survives revert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentMessage {
    pub id: Uuid,
    pub segment_id: Uuid,
    pub kind: SegmentMessageType,
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_walk_is_legal() {
        use SegmentState::*;
        let walk = [Planned, Crafting, Crafted, Dubbing, Dubbed];
        for pair in walk.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn terminal_states_admit_no_exit() {
        use SegmentState::*;
        for next in [Planned, Crafting, Crafted, Dubbing] {
            assert!(!Dubbed.can_transition_to(next));
            assert!(!Failed.can_transition_to(next));
        }
        assert!(Dubbed.can_transition_to(Dubbed));
    }

    #[test]
    fn skipping_states_is_rejected() {
        use SegmentState::*;
        assert!(!Planned.can_transition_to(Crafted));
        assert!(!Crafting.can_transition_to(Dubbed));
        assert!(!Crafted.can_transition_to(Dubbed));
    }

    #[test]
    fn meme_names_normalize() {
        assert_eq!(SegmentMeme::normalize(" cool "), "COOL");
        assert_eq!(SegmentMeme::normalize("Cool"), SegmentMeme::normalize("COOL"));
    }

    #[test]
    fn template_is_planned_pending() {
        let t = Segment::template(Uuid::new_v4(), 3, Utc::now());
        assert_eq!(t.kind, SegmentType::Pending);
        assert_eq!(t.state, SegmentState::Planned);
        assert!(t.end_at.is_none());
    }
}
