//! # Mask Composer
//!
//! Event masks and their composition along the step tree.
//!
//! A [`Mask`] is either one boolean per event (`Simple`) or a mapping from
//! category name to one boolean per event (`Categorized`). Category order is
//! declaration order and is the order used for reporting.
//!
//! [`compose`] turns a step's own mask and its parent's cumulative mask into
//! the step's cumulative mask. All four layout combinations are matched
//! exhaustively.

use crate::types::{CutflowError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

// =============================================================================
// MASK
// =============================================================================

/// A per-event selection, optionally split by category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mask {
    /// One boolean per event.
    Simple(Vec<bool>),
    /// One boolean per event for each category, in declaration order.
    Categorized(IndexMap<String, Vec<bool>>),
}

impl From<Vec<bool>> for Mask {
    fn from(mask: Vec<bool>) -> Self {
        Mask::Simple(mask)
    }
}

impl From<IndexMap<String, Vec<bool>>> for Mask {
    fn from(masks: IndexMap<String, Vec<bool>>) -> Self {
        Mask::Categorized(masks)
    }
}

impl Mask {
    /// The mask that keeps every event.
    #[must_use]
    pub fn all(n_events: usize) -> Self {
        Mask::Simple(vec![true; n_events])
    }

    /// Build a categorized mask from `(category, mask)` pairs.
    ///
    /// Later duplicates of a category replace earlier ones but keep the
    /// first position.
    pub fn categorized<K, I>(categories: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Vec<bool>)>,
    {
        Mask::Categorized(categories.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    #[must_use]
    pub fn is_categorized(&self) -> bool {
        matches!(self, Mask::Categorized(_))
    }

    /// Category names in declaration order. Empty for simple masks.
    #[must_use]
    pub fn categories(&self) -> Vec<&str> {
        match self {
            Mask::Simple(_) => Vec::new(),
            Mask::Categorized(map) => map.keys().map(String::as_str).collect(),
        }
    }

    /// The mask of one category.
    #[must_use]
    pub fn category(&self, name: &str) -> Option<&[bool]> {
        match self {
            Mask::Simple(_) => None,
            Mask::Categorized(map) => map.get(name).map(Vec::as_slice),
        }
    }

    /// Events selected by the mask, OR-ed across categories.
    #[must_use]
    pub fn inclusive(&self, n_events: usize) -> Vec<bool> {
        match self {
            Mask::Simple(mask) => mask.clone(),
            Mask::Categorized(map) => map
                .values()
                .fold(vec![false; n_events], |acc, m| or(&acc, m)),
        }
    }

    /// Events selected by any of the requested categories.
    ///
    /// Fails with `CategoryMismatch` if the mask is simple or a requested
    /// category does not exist.
    pub fn union_of<S: AsRef<str>>(&self, step: &str, requested: &[S], n_events: usize) -> Result<Vec<bool>> {
        let mismatch = || CutflowError::CategoryMismatch {
            step: step.to_string(),
            expected: self.categories().iter().map(|c| c.to_string()).collect(),
            found: requested.iter().map(|c| c.as_ref().to_string()).collect(),
        };
        let Mask::Categorized(map) = self else {
            return Err(mismatch());
        };
        let mut union = vec![false; n_events];
        for name in requested {
            let mask = map.get(name.as_ref()).ok_or_else(mismatch)?;
            union = or(&union, mask);
        }
        Ok(union)
    }

    /// Verify that every per-event vector has `n_events` entries.
    pub fn check_len(&self, step: &str, n_events: usize) -> Result<()> {
        match self {
            Mask::Simple(mask) if mask.len() != n_events => {
                Err(CutflowError::shape(step, None, n_events, mask.len()))
            }
            Mask::Simple(_) => Ok(()),
            Mask::Categorized(map) => {
                for (cat, mask) in map {
                    if mask.len() != n_events {
                        return Err(CutflowError::shape(step, Some(cat), n_events, mask.len()));
                    }
                }
                Ok(())
            }
        }
    }
}

// =============================================================================
// COMPOSITION
// =============================================================================

/// Compute a step's cumulative mask from its parent's cumulative mask.
///
/// | parent      | own         | result                                  |
/// |-------------|-------------|-----------------------------------------|
/// | Simple      | Simple      | elementwise AND                         |
/// | Simple      | Categorized | parent broadcast into each category     |
/// | Categorized | Categorized | AND per key; key sets must be identical |
/// | Categorized | Simple      | own AND-ed into every category          |
pub fn compose(step: &str, parent: &Mask, own: &Mask, n_events: usize) -> Result<Mask> {
    parent.check_len(step, n_events)?;
    own.check_len(step, n_events)?;

    let composed = match (parent, own) {
        (Mask::Simple(p), Mask::Simple(o)) => Mask::Simple(and(p, o)),
        (Mask::Simple(p), Mask::Categorized(o)) => Mask::Categorized(
            o.iter()
                .map(|(cat, m)| (cat.clone(), and(p, m)))
                .collect(),
        ),
        (Mask::Categorized(p), Mask::Categorized(o)) => {
            let same_keys = p.len() == o.len() && p.keys().all(|k| o.contains_key(k));
            if !same_keys {
                return Err(CutflowError::CategoryMismatch {
                    step: step.to_string(),
                    expected: p.keys().cloned().collect(),
                    found: o.keys().cloned().collect(),
                });
            }
            Mask::Categorized(
                p.iter()
                    .map(|(cat, pm)| (cat.clone(), and(pm, &o[cat])))
                    .collect(),
            )
        }
        (Mask::Categorized(p), Mask::Simple(o)) => Mask::Categorized(
            p.iter()
                .map(|(cat, pm)| (cat.clone(), and(pm, o)))
                .collect(),
        ),
    };
    Ok(composed)
}

// =============================================================================
// ELEMENTWISE HELPERS
// =============================================================================

/// Elementwise AND of two equal-length masks.
#[must_use]
pub fn and(a: &[bool], b: &[bool]) -> Vec<bool> {
    a.iter().zip(b).map(|(&x, &y)| x && y).collect()
}

/// Elementwise OR of two equal-length masks.
#[must_use]
pub fn or(a: &[bool], b: &[bool]) -> Vec<bool> {
    a.iter().zip(b).map(|(&x, &y)| x || y).collect()
}

/// Elementwise negation.
#[must_use]
pub fn not(a: &[bool]) -> Vec<bool> {
    a.iter().map(|&x| !x).collect()
}

/// Number of true entries.
#[must_use]
pub fn count_true(mask: &[bool]) -> usize {
    mask.iter().filter(|&&x| x).count()
}

/// Positions of true entries, ascending.
#[must_use]
pub fn true_indices(mask: &[bool]) -> Vec<usize> {
    mask.iter()
        .enumerate()
        .filter_map(|(i, &x)| x.then_some(i))
        .collect()
}

// =============================================================================
// JAGGED REDUCTIONS
// =============================================================================

/// Number of passing objects per event.
#[must_use]
pub fn count_per_event(offsets: &[usize], keep: &[bool]) -> Vec<usize> {
    offsets
        .windows(2)
        .map(|w| count_true(&keep[w[0]..w[1]]))
        .collect()
}

/// Events with at least one passing object.
#[must_use]
pub fn any_per_event(offsets: &[usize], keep: &[bool]) -> Vec<bool> {
    offsets
        .windows(2)
        .map(|w| keep[w[0]..w[1]].iter().any(|&k| k))
        .collect()
}

/// Events whose objects all pass. Events without objects pass.
#[must_use]
pub fn all_per_event(offsets: &[usize], keep: &[bool]) -> Vec<bool> {
    offsets
        .windows(2)
        .map(|w| keep[w[0]..w[1]].iter().all(|&k| k))
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================
