//! # Engine Primitives
//!
//! Fixed labels and format constants of the selection engine.
//! These are compiled into the binary and are immutable at runtime.

/// Label of the implicit root step.
///
/// The root is always declared and its cumulative mask is "true for every
/// row in the batch" at the start of event selection.
pub const ROOT_STEP: &str = "init";

/// Category label used for cutflow rows of uncategorized steps.
pub const INCLUSIVE_CATEGORY: &str = "inclusive";

/// Marker written by reindexing for references to removed objects.
pub const REINDEX_SENTINEL: i64 = -1;

/// Magic bytes for the run output binary format header.
pub const MAGIC_BYTES: &[u8; 4] = b"CTFL";

/// Current serialization format version.
///
/// Increment this when making breaking changes to the serialization format.
pub const FORMAT_VERSION: u8 = 1;
