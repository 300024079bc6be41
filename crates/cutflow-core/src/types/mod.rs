//! # Core Type Definitions
//!
//! Error taxonomy shared by every engine module.
//!
//! ## Propagation Policy
//!
//! - Every invariant violation is fatal to the current batch's run
//! - Variants carry the step label, category key or field path involved
//! - Collaborator errors never pass through this enum; they travel in the
//!   hook's own error type (see [`crate::selector::SelectionHooks`])

use crate::selector::SelectorState;
use thiserror::Error;

/// Convenience alias used throughout the engine.
pub type Result<T, E = CutflowError> = std::result::Result<T, E>;

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors raised by the selection engine.
///
/// - No silent failures, never downgraded to warnings
/// - The engine never panics; every error is returned to the driver
#[derive(Debug, Error)]
pub enum CutflowError {
    /// A step with this label was already declared in the current run.
    #[error("Step already declared: '{label}'")]
    DuplicateStep { label: String },

    /// A step referenced a parent that was never declared.
    #[error("Unknown parent '{parent}' for step '{label}'")]
    UnknownParent { label: String, parent: String },

    /// A lookup referenced a step that does not exist.
    #[error("Unknown step: '{0}'")]
    UnknownStep(String),

    /// Category sets of a step and its parent (or a request) do not match.
    #[error("Category mismatch at step '{step}': expected {expected:?}, found {found:?}")]
    CategoryMismatch {
        step: String,
        expected: Vec<String>,
        found: Vec<String>,
    },

    /// A mask, weight or field does not have the batch's length.
    #[error("Shape mismatch in {context}: expected {expected} entries, found {found}")]
    ShapeMismatch {
        context: String,
        expected: usize,
        found: usize,
    },

    /// A step operation was attempted before `init_selection`.
    #[error("Selection not initialized: call init_selection before {operation}")]
    NotInitialized { operation: &'static str },

    /// `init_selection` was called more than once in a run.
    #[error("Selection already initialized for this run")]
    AlreadyInitialized,

    /// A lifecycle operation was invoked in the wrong state.
    #[error("Invalid selector state for {operation}: {state}")]
    InvalidState {
        operation: &'static str,
        state: SelectorState,
    },

    /// A snapshot with this name already exists in the run.
    #[error("Snapshot already exists: '{0}'")]
    DuplicateSnapshot(String),

    /// The step already has rows in the run's cutflow.
    #[error("Cutflow already recorded for step '{step}'")]
    AlreadyRecorded { step: String },

    /// A weight used as a divisor is zero.
    #[error("Weight field '{field}' is zero for event {event}")]
    ZeroWeight { field: String, event: usize },

    /// The requested field path does not exist in the batch.
    #[error("Field not found: '{0}'")]
    FieldNotFound(String),

    /// The field exists but holds a different kind of data.
    #[error("Field '{field}' has type {found}, expected {expected}")]
    FieldTypeMismatch {
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    /// The batch violates its alignment invariants.
    #[error("Malformed batch: {0}")]
    MalformedBatch(String),

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// An I/O error occurred (driver side).
    #[error("I/O error: {0}")]
    IoError(String),

    /// The selection configuration is invalid (driver side).
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CutflowError {
    /// Build a shape mismatch for a step, optionally scoped to a category.
    pub(crate) fn shape(step: &str, category: Option<&str>, expected: usize, found: usize) -> Self {
        let context = match category {
            Some(cat) => format!("step '{}' category '{}'", step, cat),
            None => format!("step '{}'", step),
        };
        Self::ShapeMismatch {
            context,
            expected,
            found,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
