//! # Snapshot Store
//!
//! Named, immutable captures of the batch at a chosen step.
//!
//! A snapshot is a pure function of (batch, step graph, step, categories):
//! it computes the surviving row indices and derives a new batch from them.
//! The source batch is never mutated and no incremental state is kept, so
//! capturing twice yields identical rows.

use crate::batch::EventBatch;
use crate::cutflow::Weighting;
use crate::export::selection_checksum;
use crate::graph::StepGraph;
use crate::mask::{Mask, true_indices};
use crate::types::{CutflowError, Result};
use indexmap::IndexMap;
use indexmap::map::Entry;
use serde::{Deserialize, Serialize};

// =============================================================================
// OPTIONS
// =============================================================================

/// How a snapshot is taken.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotOptions {
    /// Restrict a categorized step to these categories. `None` keeps every
    /// event selected by any category.
    pub categories: Option<Vec<String>>,
    /// Also record the cutflow for every step from the root to this step.
    pub save_cutflow: bool,
    /// Weights used when `save_cutflow` is set.
    pub weighting: Weighting,
}

impl SnapshotOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = Some(categories.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn save_cutflow(mut self, weighting: Weighting) -> Self {
        self.save_cutflow = true;
        self.weighting = weighting;
        self
    }
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// An immutable capture of the batch rows surviving a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    name: String,
    step: String,
    /// Categories the selection was built from (empty for simple steps).
    categories: Vec<String>,
    /// Indices of the surviving rows in the source batch, ascending.
    rows: Vec<usize>,
    /// Per-category membership of each surviving row.
    membership: IndexMap<String, Vec<bool>>,
    events: EventBatch,
}

impl Snapshot {
    /// Capture the rows of `batch` surviving `step`.
    ///
    /// # Errors
    ///
    /// - `UnknownStep` if the step was not declared
    /// - `ShapeMismatch` if the batch is not the one the graph was built for
    /// - `CategoryMismatch` if categories are requested from a simple step
    ///   or a requested category does not exist
    pub fn capture(
        name: &str,
        batch: &EventBatch,
        graph: &StepGraph,
        step: &str,
        categories: Option<&[String]>,
    ) -> Result<Self> {
        let n_events = graph.n_events();
        if batch.len() != n_events {
            return Err(CutflowError::ShapeMismatch {
                context: format!("snapshot '{}' of step '{}'", name, step),
                expected: n_events,
                found: batch.len(),
            });
        }

        let cumulative = graph.cumulative(step)?;
        let (selected, chosen) = match (cumulative, categories) {
            (Mask::Simple(_), None) => (cumulative.inclusive(n_events), Vec::new()),
            (Mask::Categorized(map), None) => {
                (cumulative.inclusive(n_events), map.keys().cloned().collect())
            }
            (_, Some(requested)) => {
                let mut unique: Vec<String> = Vec::with_capacity(requested.len());
                for cat in requested {
                    if !unique.contains(cat) {
                        unique.push(cat.clone());
                    }
                }
                (cumulative.union_of(step, unique.as_slice(), n_events)?, unique)
            }
        };

        let rows = true_indices(&selected);
        let membership = chosen
            .iter()
            .filter_map(|cat| {
                cumulative
                    .category(cat)
                    .map(|mask| (cat.clone(), rows.iter().map(|&r| mask[r]).collect()))
            })
            .collect();
        let events = batch.take_rows(&rows)?;

        tracing::debug!(snapshot = name, step, rows = rows.len(), "captured snapshot");

        Ok(Self {
            name: name.to_string(),
            step: step.to_string(),
            categories: chosen,
            rows,
            membership,
            events,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Label of the step that produced the snapshot.
    #[must_use]
    pub fn step(&self) -> &str {
        &self.step
    }

    #[must_use]
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Source row index of each snapshot row.
    #[must_use]
    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    /// Which snapshot rows belong to `category`.
    #[must_use]
    pub fn membership(&self, category: &str) -> Option<&[bool]> {
        self.membership.get(category).map(Vec::as_slice)
    }

    /// The narrowed, read-only batch.
    #[must_use]
    pub fn events(&self) -> &EventBatch {
        &self.events
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Deterministic fingerprint of the row selection.
    #[must_use]
    pub fn checksum(&self) -> u64 {
        selection_checksum(&self.step, &self.rows)
    }

    /// BLAKE3 fingerprint of the row selection.
    #[cfg(feature = "crypto-hash")]
    #[must_use]
    pub fn crypto_hash(&self) -> String {
        crate::export::selection_crypto_hash(&self.step, &self.rows)
    }
}

// =============================================================================
// STORE
// =============================================================================

/// Snapshots of one run, keyed by name in creation order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotStore {
    snapshots: IndexMap<String, Snapshot>,
}

impl SnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a snapshot. Names are unique within a run.
    pub fn insert(&mut self, snapshot: Snapshot) -> Result<&Snapshot> {
        match self.snapshots.entry(snapshot.name().to_string()) {
            Entry::Occupied(entry) => Err(CutflowError::DuplicateSnapshot(entry.key().clone())),
            Entry::Vacant(entry) => Ok(entry.insert(snapshot)),
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Snapshot> {
        self.snapshots.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.snapshots.contains_key(name)
    }

    /// Snapshots in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Snapshot> {
        self.snapshots.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::Values;
    use crate::primitives::ROOT_STEP;

    fn setup() -> (EventBatch, StepGraph) {
        let batch = EventBatch::new(5)
            .with_scalar("event", Values::Int(vec![100, 101, 102, 103, 104]))
            .expect("event");
        let mut graph = StepGraph::init(5);
        graph
            .declare_step("A", Mask::Simple(vec![true, true, true, true, false]), ROOT_STEP)
            .expect("A");
        graph
            .declare_step(
                "Chan",
                Mask::categorized([
                    ("ee", vec![true, false, false, false, true]),
                    ("mumu", vec![false, false, true, false, false]),
                ]),
                "A",
            )
            .expect("Chan");
        (batch, graph)
    }

    #[test]
    fn simple_step_snapshot() {
        let (batch, graph) = setup();
        let snap = Snapshot::capture("stepA", &batch, &graph, "A", None).expect("snapshot");

        assert_eq!(snap.rows(), &[0, 1, 2, 3]);
        assert!(snap.categories().is_empty());
        assert_eq!(snap.events().len(), 4);
        assert_eq!(snap.step(), "A");
    }

    #[test]
    fn categorized_snapshot_is_inclusive_or() {
        let (batch, graph) = setup();
        let snap = Snapshot::capture("stepChan", &batch, &graph, "Chan", None).expect("snapshot");

        // Event 4 passes "ee" on its own but fails step A
        assert_eq!(snap.rows(), &[0, 2]);
        assert_eq!(snap.categories(), &["ee".to_string(), "mumu".to_string()]);
        assert_eq!(snap.membership("ee"), Some(&[true, false][..]));
        assert_eq!(snap.membership("mumu"), Some(&[false, true][..]));
        assert_eq!(
            snap.events().scalar("event").expect("event"),
            &Values::Int(vec![100, 102])
        );
    }

    #[test]
    fn requested_categories_are_unioned() {
        let (batch, graph) = setup();
        let only = vec!["mumu".to_string()];
        let snap = Snapshot::capture("mumu", &batch, &graph, "Chan", Some(&only)).expect("snapshot");
        assert_eq!(snap.rows(), &[2]);
        assert_eq!(snap.membership("ee"), None);
    }

    #[test]
    fn repeated_category_requests_collapse() {
        let (batch, graph) = setup();
        let twice = vec!["mumu".to_string(), "ee".to_string(), "mumu".to_string()];
        let snap = Snapshot::capture("both", &batch, &graph, "Chan", Some(&twice)).expect("snapshot");
        assert_eq!(snap.categories(), &["mumu".to_string(), "ee".to_string()]);
        assert!(snap.membership("mumu").is_some());
    }

    #[test]
    fn invalid_category_requests_fail() {
        let (batch, graph) = setup();
        let unknown = vec!["tautau".to_string()];
        assert!(matches!(
            Snapshot::capture("x", &batch, &graph, "Chan", Some(&unknown)),
            Err(CutflowError::CategoryMismatch { .. })
        ));
        let some = vec!["ee".to_string()];
        assert!(matches!(
            Snapshot::capture("x", &batch, &graph, "A", Some(&some)),
            Err(CutflowError::CategoryMismatch { .. })
        ));
    }

    #[test]
    fn wrong_batch_length_fails() {
        let (_, graph) = setup();
        let other = EventBatch::new(3);
        assert!(matches!(
            Snapshot::capture("x", &other, &graph, "A", None),
            Err(CutflowError::ShapeMismatch { expected: 5, found: 3, .. })
        ));
    }

    #[test]
    fn capture_is_reproducible() {
        let (batch, graph) = setup();
        let first = Snapshot::capture("s", &batch, &graph, "Chan", None).expect("first");
        let second = Snapshot::capture("s", &batch, &graph, "Chan", None).expect("second");
        assert_eq!(first, second);
        assert_eq!(first.checksum(), second.checksum());
    }

    #[test]
    fn store_rejects_duplicate_names() {
        let (batch, graph) = setup();
        let mut store = SnapshotStore::new();
        store
            .insert(Snapshot::capture("s", &batch, &graph, "A", None).expect("capture"))
            .expect("insert");
        let err = store
            .insert(Snapshot::capture("s", &batch, &graph, "Chan", None).expect("capture"))
            .expect_err("duplicate");
        assert!(matches!(err, CutflowError::DuplicateSnapshot(ref n) if n == "s"));
        assert_eq!(store.len(), 1);
    }
}
