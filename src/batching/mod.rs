//! # Batching
//!
//! Groups incoming submissions into numbered, size- and time-bounded batches
//! stored in the object store.

pub mod assembler;
pub mod repository;
pub mod rotation;

pub use assembler::{BatchAssembler, Placement};
pub use repository::{BatchRepository, PlacementTarget};
pub use rotation::{
    decide_rotation, BatchStats, RotationDecision, RotationPolicy, RotationReason,
};
