//! # Object Helpers
//!
//! Object-level operations used during pre-selection:
//!
//! - [`ObjectCorrection`]: the contract for calibration collaborators
//! - [`select_objects`]: narrow a collection, keeping per-event association
//! - [`reindex`]: remap integer cross-references into a filtered collection
//!
//! References are event-local: a value `k` in event `e` points to the k-th
//! object of the target collection in the same event.

use crate::batch::{EventBatch, Values};
use crate::mask::count_true;
use crate::primitives::REINDEX_SENTINEL;
use crate::types::{CutflowError, Result};
use serde::{Deserialize, Serialize};

// =============================================================================
// CORRECTION CONTRACT
// =============================================================================

/// A collaborator that derives corrected object fields.
///
/// Implementations take the batch by value and return the corrected batch.
/// Their errors are their own; the engine only requires that engine errors
/// can be lifted into them.
pub trait ObjectCorrection {
    type Config;
    type Error: From<CutflowError>;

    /// Apply the correction to the objects of `object`.
    fn correct(
        &self,
        batch: EventBatch,
        object: &str,
        config: &Self::Config,
    ) -> std::result::Result<EventBatch, Self::Error>;
}

// =============================================================================
// OBJECT SELECTION
// =============================================================================

/// Object counts before and after an object-level filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSelection {
    pub collection: String,
    pub before: usize,
    pub after: usize,
}

impl ObjectSelection {
    /// Fraction of objects kept. `None` if the collection was empty.
    #[must_use]
    pub fn efficiency(&self) -> Option<f64> {
        (self.before > 0).then(|| self.after as f64 / self.before as f64)
    }
}

/// Keep the objects of `collection` whose `keep` entry is true.
///
/// Every field of the collection is narrowed together. The event count is
/// unchanged.
pub fn select_objects(
    mut batch: EventBatch,
    collection: &str,
    keep: &[bool],
) -> Result<(EventBatch, ObjectSelection)> {
    let source = batch.collection(collection)?;
    let before = source.n_objects();
    let filtered = source.filter_objects(keep)?;
    let after = filtered.n_objects();
    batch.insert_collection(collection, filtered)?;

    let selection = ObjectSelection {
        collection: collection.to_string(),
        before,
        after,
    };
    match selection.efficiency() {
        Some(efficiency) => {
            tracing::debug!(collection, before, after, efficiency, "object selection");
        }
        None => tracing::warn!(collection, "object selection on empty collection"),
    }
    Ok((batch, selection))
}

// =============================================================================
// CROSS-REFERENCES
// =============================================================================

/// An integer field of one collection pointing into another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossReference {
    /// Collection holding the references.
    pub collection: String,
    /// Per-object integer field with event-local indices.
    pub field: String,
    /// Remove referencing objects whose target was removed.
    #[serde(default)]
    pub drop_dangling: bool,
}

/// Remap references into a collection filtered by `keep`.
///
/// Kept targets get their new position; removed, negative or out-of-range
/// references become [`REINDEX_SENTINEL`].
#[must_use]
pub fn reindex(references: &[i64], keep: &[bool]) -> Vec<i64> {
    let positions = new_positions(keep);
    references.iter().map(|&r| lookup(&positions, r)).collect()
}

/// Event-by-event [`reindex`] over jagged references and a jagged keep mask.
///
/// Both offset arrays must describe the same events, and `keep` must cover
/// every target object.
pub fn reindex_jagged(
    reference_offsets: &[usize],
    references: &[i64],
    target_offsets: &[usize],
    keep: &[bool],
) -> Result<Vec<i64>> {
    if reference_offsets.len() != target_offsets.len() {
        return Err(CutflowError::ShapeMismatch {
            context: "reference events".to_string(),
            expected: target_offsets.len().saturating_sub(1),
            found: reference_offsets.len().saturating_sub(1),
        });
    }
    let n_targets = target_offsets.last().copied().unwrap_or(0);
    if keep.len() != n_targets {
        return Err(CutflowError::ShapeMismatch {
            context: "reindex keep mask".to_string(),
            expected: n_targets,
            found: keep.len(),
        });
    }

    let mut out = Vec::with_capacity(references.len());
    for (event, (refs, targets)) in reference_offsets
        .windows(2)
        .zip(target_offsets.windows(2))
        .enumerate()
    {
        let kept = keep
            .get(targets[0]..targets[1])
            .ok_or_else(|| CutflowError::MalformedBatch(format!("target offsets of event {}", event)))?;
        let event_refs = references
            .get(refs[0]..refs[1])
            .ok_or_else(|| CutflowError::ShapeMismatch {
                context: format!("references of event {}", event),
                expected: refs[1],
                found: references.len(),
            })?;
        let positions = new_positions(kept);
        out.extend(event_refs.iter().map(|&r| lookup(&positions, r)));
    }
    Ok(out)
}

fn new_positions(keep: &[bool]) -> Vec<i64> {
    let mut next = 0i64;
    keep.iter()
        .map(|&k| {
            if k {
                next += 1;
                next - 1
            } else {
                REINDEX_SENTINEL
            }
        })
        .collect()
}

fn lookup(positions: &[i64], reference: i64) -> i64 {
    usize::try_from(reference)
        .ok()
        .and_then(|i| positions.get(i).copied())
        .unwrap_or(REINDEX_SENTINEL)
}

/// Filter `collection` and rewrite every reference into it.
///
/// Returns the object selection of the target first, followed by one
/// selection per reference that dropped dangling objects.
pub fn select_objects_with_references(
    batch: EventBatch,
    collection: &str,
    keep: &[bool],
    references: &[CrossReference],
) -> Result<(EventBatch, Vec<ObjectSelection>)> {
    let target_offsets = batch.collection(collection)?.offsets().to_vec();
    let (mut batch, selection) = select_objects(batch, collection, keep)?;
    let mut selections = vec![selection];

    for reference in references {
        let source = batch.collection(&reference.collection)?;
        let path = format!("{}.{}", reference.collection, reference.field);
        let values = source
            .field(&reference.field)
            .ok_or_else(|| CutflowError::FieldNotFound(path.clone()))?;
        let indices = values.as_int().ok_or_else(|| CutflowError::FieldTypeMismatch {
            field: path.clone(),
            expected: "int",
            found: values.kind(),
        })?;

        let remapped = reindex_jagged(source.offsets(), indices, &target_offsets, keep)?;
        let valid: Vec<bool> = remapped.iter().map(|&r| r != REINDEX_SENTINEL).collect();
        let dangling = valid.len() - count_true(&valid);
        if dangling > 0 {
            tracing::debug!(reference = %path, dangling, "references to removed objects");
        }

        batch.add_to_collection(&reference.collection, &reference.field, Values::Int(remapped))?;
        if reference.drop_dangling {
            let (narrowed, dropped) = select_objects(batch, &reference.collection, &valid)?;
            batch = narrowed;
            selections.push(dropped);
        }
    }
    Ok((batch, selections))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::Collection;

    fn tau_batch() -> EventBatch {
        // Event 0: two taus, event 1: one tau
        let taus = Collection::from_counts(&[2, 1])
            .with_field("pt", Values::Float(vec![40.0, 12.0, 25.0]))
            .expect("tau pt");
        // Tau products referencing taus by event-local index
        let prods = Collection::from_counts(&[3, 2])
            .with_field("tauIdx", Values::Int(vec![0, 1, 1, 0, -1]))
            .expect("tauIdx");
        EventBatch::new(2)
            .with_collection("Tau", taus)
            .expect("Tau")
            .with_collection("TauProd", prods)
            .expect("TauProd")
    }

    #[test]
    fn reindex_single_event() {
        assert_eq!(reindex(&[0, 1, 2, -1], &[true, false, true]), vec![0, -1, 1, -1]);
    }

    #[test]
    fn reindex_out_of_range_is_sentinel() {
        assert_eq!(reindex(&[3, 7], &[true, true]), vec![-1, -1]);
    }

    #[test]
    fn reindex_jagged_checks_shapes() {
        // keep shorter than the target objects
        assert!(matches!(
            reindex_jagged(&[0, 1], &[0], &[0, 3], &[true]),
            Err(CutflowError::ShapeMismatch { expected: 3, found: 1, .. })
        ));
        // event counts differ
        assert!(matches!(
            reindex_jagged(&[0, 1, 2], &[0, 0], &[0, 1], &[true]),
            Err(CutflowError::ShapeMismatch { expected: 1, found: 2, .. })
        ));
        // references shorter than their offsets claim
        assert!(reindex_jagged(&[0, 2], &[0], &[0, 1], &[true]).is_err());

        assert_eq!(
            reindex_jagged(&[0, 2, 3], &[1, 0, 0], &[0, 2, 3], &[false, true, true]).expect("reindex"),
            vec![0, -1, 0]
        );
    }

    #[test]
    fn select_objects_keeps_event_association() {
        let keep = [true, false, true];
        let (batch, selection) = select_objects(tau_batch(), "Tau", &keep).expect("select");

        let taus = batch.collection("Tau").expect("Tau");
        assert_eq!(taus.counts(), vec![1, 1]);
        assert_eq!(taus.field("pt"), Some(&Values::Float(vec![40.0, 25.0])));
        assert_eq!((selection.before, selection.after), (3, 2));
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn efficiency_of_empty_collection() {
        let selection = ObjectSelection {
            collection: "Muon".to_string(),
            before: 0,
            after: 0,
        };
        assert_eq!(selection.efficiency(), None);
    }

    #[test]
    fn references_are_rewritten_per_event() {
        let keep = [true, false, true];
        let reference = CrossReference {
            collection: "TauProd".to_string(),
            field: "tauIdx".to_string(),
            drop_dangling: false,
        };
        let (batch, selections) =
            select_objects_with_references(tau_batch(), "Tau", &keep, &[reference]).expect("select");

        let prods = batch.collection("TauProd").expect("TauProd");
        assert_eq!(prods.field("tauIdx"), Some(&Values::Int(vec![0, -1, -1, 0, -1])));
        assert_eq!(selections.len(), 1);
    }

    #[test]
    fn dangling_references_can_be_dropped() {
        let keep = [true, false, true];
        let reference = CrossReference {
            collection: "TauProd".to_string(),
            field: "tauIdx".to_string(),
            drop_dangling: true,
        };
        let (batch, selections) =
            select_objects_with_references(tau_batch(), "Tau", &keep, &[reference]).expect("select");

        let prods = batch.collection("TauProd").expect("TauProd");
        assert_eq!(prods.counts(), vec![1, 1]);
        assert_eq!(prods.field("tauIdx"), Some(&Values::Int(vec![0, 0])));
        assert_eq!(selections[1].collection, "TauProd");
        assert_eq!((selections[1].before, selections[1].after), (5, 2));
    }

    #[test]
    fn non_integer_reference_field_fails() {
        let reference = CrossReference {
            collection: "Tau".to_string(),
            field: "pt".to_string(),
            drop_dangling: false,
        };
        let keep = [true; 3];
        let err = select_objects_with_references(tau_batch(), "Tau", &keep, &[reference])
            .expect_err("type mismatch");
        assert!(matches!(err, CutflowError::FieldTypeMismatch { expected: "int", .. }));
    }
}
