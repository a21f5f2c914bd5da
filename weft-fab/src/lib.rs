//! # WEFT Fabrication Engine
//!
//! Procedurally composes continuous streams of music (chains) by
//! scheduling fixed-length segments and filling each with content
//! selected from a read-only catalog.
//!
//! - `chain_manager`: chain lifecycle, next-segment-or-complete
//!   scheduling, stall detection and revival
//! - `segment_manager`: segment lifecycle, offset exclusivity, windowed
//!   reads, revert
//! - `fabricator`: one segment's content selection (with its
//!   retrospective lookback and workbench staging cache)
//! - `isometry`: stemming-based meme affinity scoring
//! - `selection`: noise-scored weighted random selection
//! - `time_computer`: tempo-ramp time integration
//! - `keys`: deterministic storage-key derivation

pub mod chain_manager;
pub mod fabricator;
pub mod fixture;
pub mod isometry;
pub mod keys;
pub mod segment_manager;
pub mod selection;
pub mod time_computer;

pub use chain_manager::{ChainManager, SchedulingDecision};
pub use fabricator::{Fabricator, Retrospective, Workbench};
pub use isometry::MemeIsometry;
pub use selection::{Chooser, RandomSource};
