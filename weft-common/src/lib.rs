//! # WEFT Common Library
//!
//! Shared code for the WEFT fabrication engine including:
//! - Entity model (Chain, Segment, and their sub-entities)
//! - Read-only catalog types (programs, instruments, sequences)
//! - Music theory primitives (pitch class, note, key, chord, range)
//! - Error taxonomy
//! - Access-control capability
//! - Configuration loading
//! - In-memory entity store (the storage contract's reference impl)
//! - Notification bus
//! - Payload export shape

pub mod access;
pub mod config;
pub mod entity;
pub mod error;
pub mod events;
pub mod music;
pub mod payload;
pub mod store;

pub use error::{Error, Result};
