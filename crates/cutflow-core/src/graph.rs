//! # Step Graph
//!
//! The tree of named selection steps for one run.
//!
//! Every step except the implicit root has exactly one parent, referenced
//! by label. Steps are stored in declaration order; the root is always at
//! position 0 and keeps every event.

use crate::mask::{Mask, compose, count_true};
use crate::primitives::ROOT_STEP;
use crate::types::{CutflowError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// STEP
// =============================================================================

/// A declared selection step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    label: String,
    parent: Option<String>,
    index: usize,
    own: Mask,
    cumulative: Mask,
}

impl Step {
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Parent label. `None` only for the root.
    #[must_use]
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Declaration position (root = 0).
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// The step's own predicate, as declared.
    #[must_use]
    pub fn own(&self) -> &Mask {
        &self.own
    }

    /// Own predicate AND-ed with every ancestor's.
    #[must_use]
    pub fn cumulative(&self) -> &Mask {
        &self.cumulative
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Surviving event count per category (or for the single inclusive
    /// pseudo-category), in declaration order.
    #[must_use]
    pub fn counts(&self) -> Vec<(Option<&str>, usize)> {
        match &self.cumulative {
            Mask::Simple(mask) => vec![(None, count_true(mask))],
            Mask::Categorized(map) => map
                .iter()
                .map(|(cat, mask)| (Some(cat.as_str()), count_true(mask)))
                .collect(),
        }
    }
}

// =============================================================================
// STEP GRAPH
// =============================================================================

/// The step tree of a single selection run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepGraph {
    n_events: usize,
    /// Steps in declaration order; the root is at position 0.
    steps: Vec<Step>,
    /// Reverse lookup: label -> position in `steps`.
    index: BTreeMap<String, usize>,
}

impl StepGraph {
    /// Start a graph for a batch of `n_events` events.
    #[must_use]
    pub fn init(n_events: usize) -> Self {
        let root = Step {
            label: ROOT_STEP.to_string(),
            parent: None,
            index: 0,
            own: Mask::all(n_events),
            cumulative: Mask::all(n_events),
        };
        let mut index = BTreeMap::new();
        index.insert(ROOT_STEP.to_string(), 0);
        Self {
            n_events,
            steps: vec![root],
            index,
        }
    }

    /// Declare a step under `parent` and compute its cumulative mask.
    ///
    /// # Errors
    ///
    /// - `DuplicateStep` if `label` is already declared (including the root)
    /// - `UnknownParent` if `parent` was not declared before
    /// - `ShapeMismatch` / `CategoryMismatch` from mask composition
    pub fn declare_step(&mut self, label: &str, mask: Mask, parent: &str) -> Result<&Step> {
        if self.index.contains_key(label) {
            return Err(CutflowError::DuplicateStep {
                label: label.to_string(),
            });
        }
        let parent_pos = *self
            .index
            .get(parent)
            .ok_or_else(|| CutflowError::UnknownParent {
                label: label.to_string(),
                parent: parent.to_string(),
            })?;

        let cumulative = compose(label, &self.steps[parent_pos].cumulative, &mask, self.n_events)?;
        let position = self.steps.len();
        let step = Step {
            label: label.to_string(),
            parent: Some(parent.to_string()),
            index: position,
            own: mask,
            cumulative,
        };

        tracing::debug!(step = label, parent, counts = ?step.counts(), "declared selection step");

        self.index.insert(label.to_string(), position);
        self.steps.push(step);
        Ok(&self.steps[position])
    }

    /// Number of events the graph was initialised for.
    #[must_use]
    pub fn n_events(&self) -> usize {
        self.n_events
    }

    /// Number of steps, root included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True when only the root exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.len() == 1
    }

    #[must_use]
    pub fn contains(&self, label: &str) -> bool {
        self.index.contains_key(label)
    }

    /// Look up a step by label.
    pub fn step(&self, label: &str) -> Result<&Step> {
        self.index
            .get(label)
            .map(|&pos| &self.steps[pos])
            .ok_or_else(|| CutflowError::UnknownStep(label.to_string()))
    }

    /// Cumulative mask of a step.
    pub fn cumulative(&self, label: &str) -> Result<&Mask> {
        self.step(label).map(Step::cumulative)
    }

    /// Parent of a step; `None` for the root.
    pub fn parent_of(&self, label: &str) -> Result<Option<&Step>> {
        match self.step(label)?.parent() {
            Some(parent) => self.step(parent).map(Some),
            None => Ok(None),
        }
    }

    /// The chain from the root down to `label`, root first.
    pub fn ancestry(&self, label: &str) -> Result<Vec<&Step>> {
        let mut chain = Vec::new();
        let mut current = Some(self.step(label)?);
        while let Some(step) = current {
            chain.push(step);
            current = match step.parent() {
                Some(parent) => Some(self.step(parent)?),
                None => None,
            };
        }
        chain.reverse();
        Ok(chain)
    }

    /// Direct children of a step, in declaration order.
    pub fn children(&self, label: &str) -> Result<Vec<&Step>> {
        self.step(label)?;
        Ok(self
            .steps
            .iter()
            .filter(|s| s.parent() == Some(label))
            .collect())
    }

    /// All steps in declaration order, root first.
    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter()
    }

    /// Categories of the most recently declared categorized step.
    #[must_use]
    pub fn categories(&self) -> Option<Vec<&str>> {
        self.steps
            .iter()
            .rev()
            .find(|s| s.cumulative.is_categorized())
            .map(|s| s.cumulative.categories())
    }
}

// =============================================================================
// TESTS
// =============================================================================
