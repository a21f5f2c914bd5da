//! Entity model
//!
//! Chain and Segment families are mutable engine-owned records; catalog
//! types are read-only content the Fabricator selects from.

pub mod catalog;
pub mod chain;
pub mod segment;
