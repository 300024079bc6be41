//! # cutflow-core
//!
//! The Selection Cutflow Engine.
//!
//! Applies an ordered, branching sequence of named boolean cuts to a
//! columnar batch of events. Each cut step consumes the cumulative mask of
//! an explicitly declared parent step; steps may split into named
//! categories (channels). For chosen steps the engine captures snapshots of
//! the surviving events and accumulates a cutflow of raw and weighted
//! counts.
//!
//! ## Layout
//!
//! - `batch`: columnar [`EventBatch`] with scalar fields and object collections
//! - `mask` / `graph`: [`Mask`] composition along the [`StepGraph`]
//! - `snapshot` / `cutflow`: the outputs of a run
//! - `selector`: hook-based lifecycle ([`Selector`], [`SelectionHooks`])
//! - `objects`: object-level filtering, reindexing and the correction contract
//! - `formats` / `export`: binary persistence and selection fingerprints
//!
//! ## Architectural Constraints
//!
//! - No file I/O, no async, no global state
//! - One selector run owns its graph, snapshots and cutflow; nothing is shared
//!   across batches
//! - Every invariant violation is returned as a [`CutflowError`]

// =============================================================================
// MODULES
// =============================================================================

pub mod batch;
pub mod cutflow;
pub mod export;
pub mod formats;
pub mod graph;
pub mod mask;
pub mod objects;
pub mod primitives;
pub mod selector;
pub mod snapshot;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types
// =============================================================================

pub use batch::{Collection, EventBatch, Field, Values};
pub use primitives::{INCLUSIVE_CATEGORY, REINDEX_SENTINEL, ROOT_STEP};
pub use types::{CutflowError, Result};

// =============================================================================
// RE-EXPORTS: Selection Engine
// =============================================================================

pub use cutflow::{Cutflow, CutflowAccumulator, CutflowRecords, CutflowRow, Weighting};
pub use graph::{Step, StepGraph};
pub use mask::{Mask, compose};
pub use objects::{
    CrossReference, ObjectCorrection, ObjectSelection, reindex, reindex_jagged, select_objects,
    select_objects_with_references,
};
pub use selector::{RunOutput, SelectionContext, SelectionHooks, Selector, SelectorState};
pub use snapshot::{Snapshot, SnapshotOptions, SnapshotStore};

// =============================================================================
// RE-EXPORTS: Formats and Fingerprints
// =============================================================================

pub use export::selection_checksum;
#[cfg(feature = "crypto-hash")]
pub use export::selection_crypto_hash;
pub use formats::{PersistenceHeader, run_output_from_bytes, run_output_to_bytes};
