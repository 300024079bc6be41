//! # Cutflow Accumulator
//!
//! Raw and weighted event counts per step and category.
//!
//! Recording is explicit: only steps a caller asks for get rows, so the
//! reporting granularity can be coarser than the cut granularity. Rows are
//! kept in step-declaration order, then category-declaration order.

use crate::batch::{EventBatch, Field};
use crate::graph::Step;
use crate::mask::Mask;
use crate::primitives::INCLUSIVE_CATEGORY;
use crate::types::{CutflowError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// WEIGHTING
// =============================================================================

/// How per-event weights are obtained for weighted counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Weighting {
    /// Every event weighs 1.0.
    #[default]
    Unit,
    /// A single weight field.
    Field(String),
    /// The product of the `multiply` fields divided by the `divide` fields.
    Product {
        multiply: Vec<String>,
        #[serde(default)]
        divide: Vec<String>,
    },
}

impl Weighting {
    /// Product of `fields`, with nothing divided out.
    pub fn product<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Weighting::Product {
            multiply: fields.into_iter().map(Into::into).collect(),
            divide: Vec::new(),
        }
    }

    /// Resolve per-event weights from the batch. `None` means unit weights.
    ///
    /// Per-object weight fields (scale factors) are reduced to one weight
    /// per event by taking the product over the event's objects. A divisor
    /// that is zero for some event is a `ZeroWeight` error.
    pub fn resolve(&self, batch: &EventBatch) -> Result<Option<Vec<f64>>> {
        let (multiply, divide): (&[String], &[String]) = match self {
            Weighting::Unit => return Ok(None),
            Weighting::Field(name) => (std::slice::from_ref(name), &[]),
            Weighting::Product { multiply, divide } => (multiply, divide),
        };
        let mut weights = vec![1.0; batch.len()];
        for name in multiply {
            for (w, f) in weights.iter_mut().zip(event_weights(batch, name)?) {
                *w *= f;
            }
        }
        for name in divide {
            for (event, (w, f)) in weights.iter_mut().zip(event_weights(batch, name)?).enumerate() {
                if f == 0.0 {
                    return Err(CutflowError::ZeroWeight {
                        field: name.clone(),
                        event,
                    });
                }
                *w /= f;
            }
        }
        Ok(Some(weights))
    }
}

fn event_weights(batch: &EventBatch, path: &str) -> Result<Vec<f64>> {
    match batch.field(path)? {
        Field::Scalar(values) => Ok(values.to_f64()),
        Field::Jagged { offsets, values } => {
            let flat = values.to_f64();
            Ok(offsets
                .windows(2)
                .map(|w| flat[w[0]..w[1]].iter().product())
                .collect())
        }
    }
}

// =============================================================================
// CUTFLOW ROW
// =============================================================================

/// Counts surviving one step in one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CutflowRow {
    pub step: String,
    /// Parent step, used for relative efficiencies. `None` for the root.
    pub parent: Option<String>,
    /// Category label, or `inclusive` for uncategorized steps.
    pub category: String,
    pub raw: u64,
    pub weighted: f64,
    pub weighted_sq: f64,
}

impl CutflowRow {
    /// Count the entries of `mask`, optionally weighted.
    ///
    /// `weights` must have the mask's length when given.
    pub fn from_mask(step: &Step, category: &str, mask: &[bool], weights: Option<&[f64]>) -> Result<Self> {
        let mut raw = 0u64;
        let mut weighted = 0.0;
        let mut weighted_sq = 0.0;
        let mut tally = |w: f64| {
            raw += 1;
            weighted += w;
            weighted_sq += w * w;
        };
        match weights {
            Some(ws) if ws.len() != mask.len() => {
                return Err(CutflowError::ShapeMismatch {
                    context: format!("weights for step '{}'", step.label()),
                    expected: mask.len(),
                    found: ws.len(),
                });
            }
            Some(ws) => mask
                .iter()
                .zip(ws)
                .filter(|(pass, _)| **pass)
                .for_each(|(_, &w)| tally(w)),
            None => mask.iter().filter(|pass| **pass).for_each(|_| tally(1.0)),
        }
        Ok(Self {
            step: step.label().to_string(),
            parent: step.parent().map(str::to_string),
            category: category.to_string(),
            raw,
            weighted,
            weighted_sq,
        })
    }

    /// Statistical uncertainty on the weighted count.
    #[must_use]
    pub fn uncertainty(&self) -> f64 {
        self.weighted_sq.sqrt()
    }

    fn absorb(&mut self, other: &CutflowRow) {
        self.raw += other.raw;
        self.weighted += other.weighted;
        self.weighted_sq += other.weighted_sq;
    }
}

// =============================================================================
// CUTFLOW
// =============================================================================

/// One ordered cutflow record set of a run (or of several merged runs).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cutflow {
    rows: Vec<CutflowRow>,
}

impl Cutflow {
    #[must_use]
    pub fn rows(&self) -> &[CutflowRow] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row for a (step, category) pair.
    #[must_use]
    pub fn get(&self, step: &str, category: &str) -> Option<&CutflowRow> {
        self.rows
            .iter()
            .find(|r| r.step == step && r.category == category)
    }

    /// Weighted efficiency of a row relative to its parent step.
    ///
    /// Uses the parent's row in the same category, falling back to the
    /// parent's inclusive row when categories were born at this step.
    /// `None` if the parent was not recorded or has zero weight.
    #[must_use]
    pub fn efficiency(&self, row: &CutflowRow) -> Option<f64> {
        let parent = row.parent.as_deref()?;
        let reference = self
            .get(parent, &row.category)
            .or_else(|| self.get(parent, INCLUSIVE_CATEGORY))?;
        (reference.weighted != 0.0).then(|| row.weighted / reference.weighted)
    }

    /// Sum another cutflow into this one, matching rows by (step, category).
    ///
    /// A row unknown to `self` goes after the other rows of its step, or
    /// else after the last row below its parent, so shards that recorded
    /// different steps still merge in declaration order.
    pub fn merge(&mut self, other: &Cutflow) {
        for row in &other.rows {
            match self
                .rows
                .iter_mut()
                .find(|r| r.step == row.step && r.category == row.category)
            {
                Some(existing) => existing.absorb(row),
                None => {
                    let at = self.insertion_point(row);
                    self.rows.insert(at, row.clone());
                }
            }
        }
    }

    fn insertion_point(&self, row: &CutflowRow) -> usize {
        if let Some(last) = self.rows.iter().rposition(|r| r.step == row.step) {
            return last + 1;
        }
        let Some(parent) = row.parent.as_deref() else {
            return 0;
        };
        self.rows
            .iter()
            .rposition(|r| self.descends_from(&r.step, parent))
            .map_or(self.rows.len(), |last| last + 1)
    }

    /// Whether `step` is `ancestor` or lies below it, following the parents
    /// recorded in this cutflow.
    fn descends_from(&self, step: &str, ancestor: &str) -> bool {
        let mut current = Some(step);
        for _ in 0..=self.rows.len() {
            match current {
                Some(label) if label == ancestor => return true,
                Some(label) => {
                    current = self
                        .rows
                        .iter()
                        .find(|r| r.step == label)
                        .and_then(|r| r.parent.as_deref());
                }
                None => return false,
            }
        }
        false
    }
}

// =============================================================================
// RECORD SETS
// =============================================================================

/// Every cutflow record set of a run.
///
/// `run` holds the steps recorded explicitly by the selection. Each snapshot
/// taken with `save_cutflow` owns a separate set covering its ancestry, so
/// sets recorded with different weightings never overwrite each other.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CutflowRecords {
    run: Cutflow,
    snapshots: IndexMap<String, Cutflow>,
}

impl CutflowRecords {
    /// Explicitly recorded steps.
    #[must_use]
    pub fn run(&self) -> &Cutflow {
        &self.run
    }

    /// Record set saved with a snapshot.
    #[must_use]
    pub fn snapshot(&self, name: &str) -> Option<&Cutflow> {
        self.snapshots.get(name)
    }

    /// Snapshot record sets in the order they were taken.
    pub fn snapshots(&self) -> impl Iterator<Item = (&str, &Cutflow)> {
        self.snapshots.iter().map(|(name, cutflow)| (name.as_str(), cutflow))
    }

    /// Total number of rows across all sets.
    #[must_use]
    pub fn total_rows(&self) -> usize {
        self.run.len() + self.snapshots.values().map(Cutflow::len).sum::<usize>()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_rows() == 0
    }

    /// Sum another run's records into these, set by set.
    pub fn merge(&mut self, other: &CutflowRecords) {
        self.run.merge(&other.run);
        for (name, cutflow) in &other.snapshots {
            self.snapshots.entry(name.clone()).or_default().merge(cutflow);
        }
    }
}

// =============================================================================
// ACCUMULATOR
// =============================================================================

/// Rows of one record set, keyed by step declaration index.
#[derive(Debug, Clone, Default)]
struct RecordSet {
    entries: BTreeMap<usize, Vec<CutflowRow>>,
}

impl RecordSet {
    fn record(&mut self, step: &Step, weights: Option<&[f64]>) -> Result<()> {
        if self.entries.contains_key(&step.index()) {
            return Err(CutflowError::AlreadyRecorded {
                step: step.label().to_string(),
            });
        }
        let rows = match step.cumulative() {
            Mask::Simple(mask) => vec![CutflowRow::from_mask(step, INCLUSIVE_CATEGORY, mask, weights)?],
            Mask::Categorized(map) => map
                .iter()
                .map(|(cat, mask)| CutflowRow::from_mask(step, cat, mask, weights))
                .collect::<Result<Vec<_>>>()?,
        };
        tracing::debug!(step = step.label(), rows = rows.len(), "recorded cutflow");
        self.entries.insert(step.index(), rows);
        Ok(())
    }

    fn finish(self) -> Cutflow {
        Cutflow {
            rows: self.entries.into_values().flatten().collect(),
        }
    }
}

/// Collects cutflow rows during a run.
#[derive(Debug, Clone, Default)]
pub struct CutflowAccumulator {
    run: RecordSet,
    snapshots: IndexMap<String, RecordSet>,
}

impl CutflowAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record counts for a step's cumulative mask in the run's set.
    ///
    /// A step can be recorded once; a second call is `AlreadyRecorded`.
    pub fn record(&mut self, step: &Step, weights: Option<&[f64]>) -> Result<()> {
        self.run.record(step, weights)
    }

    /// Record `steps` into a new set owned by `snapshot`.
    ///
    /// Nothing is stored if any step fails.
    pub fn record_snapshot(&mut self, snapshot: &str, steps: &[&Step], weights: Option<&[f64]>) -> Result<()> {
        if self.snapshots.contains_key(snapshot) {
            return Err(CutflowError::DuplicateSnapshot(snapshot.to_string()));
        }
        let mut set = RecordSet::default();
        for step in steps {
            set.record(step, weights)?;
        }
        self.snapshots.insert(snapshot.to_string(), set);
        Ok(())
    }

    /// Whether a step (by declaration index) is in the run's set.
    #[must_use]
    pub fn is_recorded(&self, index: usize) -> bool {
        self.run.entries.contains_key(&index)
    }

    /// Freeze the accumulated rows.
    #[must_use]
    pub fn finish(self) -> CutflowRecords {
        CutflowRecords {
            run: self.run.finish(),
            snapshots: self
                .snapshots
                .into_iter()
                .map(|(name, set)| (name, set.finish()))
                .collect(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{Collection, Values};
    use crate::graph::StepGraph;
    use crate::primitives::ROOT_STEP;

    fn two_step_graph() -> StepGraph {
        let mut graph = StepGraph::init(4);
        graph
            .declare_step("A", Mask::Simple(vec![true, true, true, false]), ROOT_STEP)
            .expect("A");
        graph
            .declare_step(
                "B",
                Mask::categorized([("x", vec![true, false, false, false]), ("y", vec![false, true, true, true])]),
                "A",
            )
            .expect("B");
        graph
    }

    #[test]
    fn unit_weights_equal_raw_count() {
        let graph = two_step_graph();
        let mut acc = CutflowAccumulator::new();
        acc.record(graph.step("A").expect("A"), None).expect("record");
        let cutflow = acc.finish().run().clone();

        let row = cutflow.get("A", INCLUSIVE_CATEGORY).expect("row");
        assert_eq!(row.raw, 3);
        assert_eq!(row.weighted, 3.0);
        assert_eq!(row.weighted_sq, 3.0);
    }

    #[test]
    fn rows_follow_declaration_order_not_recording_order() {
        let graph = two_step_graph();
        let mut acc = CutflowAccumulator::new();
        acc.record(graph.step("B").expect("B"), None).expect("B");
        acc.record(graph.step(ROOT_STEP).expect("root"), None).expect("root");
        acc.record(graph.step("A").expect("A"), None).expect("A");
        let cutflow = acc.finish().run().clone();

        let order: Vec<_> = cutflow
            .rows()
            .iter()
            .map(|r| (r.step.as_str(), r.category.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                (ROOT_STEP, INCLUSIVE_CATEGORY),
                ("A", INCLUSIVE_CATEGORY),
                ("B", "x"),
                ("B", "y")
            ]
        );
    }

    #[test]
    fn rerecording_a_run_step_is_rejected() {
        let graph = two_step_graph();
        let step = graph.step("A").expect("A");
        let mut acc = CutflowAccumulator::new();
        acc.record(step, Some(&[2.0; 4][..])).expect("first");
        let err = acc.record(step, None).expect_err("second");
        assert!(matches!(err, CutflowError::AlreadyRecorded { ref step } if step == "A"));

        // The first record survives
        let records = acc.finish();
        assert_eq!(records.run().len(), 1);
        assert_eq!(records.run().rows()[0].weighted, 6.0);
    }

    #[test]
    fn snapshot_sets_keep_their_own_weighting() {
        let graph = two_step_graph();
        let ancestry = graph.ancestry("B").expect("ancestry");
        let mut acc = CutflowAccumulator::new();
        acc.record(graph.step("A").expect("A"), Some(&[2.0; 4][..])).expect("run");
        acc.record_snapshot("unit", &ancestry, None).expect("unit");
        acc.record_snapshot("half", &ancestry, Some(&[0.5; 4][..])).expect("half");
        let records = acc.finish();

        assert_eq!(records.run().get("A", INCLUSIVE_CATEGORY).expect("A").weighted, 6.0);
        let unit = records.snapshot("unit").expect("unit");
        let half = records.snapshot("half").expect("half");
        assert_eq!(unit.len(), 4);
        assert_eq!(unit.get("A", INCLUSIVE_CATEGORY).expect("A").weighted, 3.0);
        assert_eq!(half.get("A", INCLUSIVE_CATEGORY).expect("A").weighted, 1.5);
        assert_eq!(half.get("B", "y").expect("y").weighted_sq, 0.5);
        assert_eq!(records.total_rows(), 9);
    }

    #[test]
    fn failed_snapshot_set_is_not_stored() {
        let graph = two_step_graph();
        let ancestry = graph.ancestry("B").expect("ancestry");
        let mut acc = CutflowAccumulator::new();
        assert!(acc.record_snapshot("bad", &ancestry, Some(&[1.0; 2][..])).is_err());
        acc.record_snapshot("bad", &ancestry, None).expect("retry");
        assert!(matches!(
            acc.record_snapshot("bad", &ancestry, None),
            Err(CutflowError::DuplicateSnapshot(_))
        ));
    }

    #[test]
    fn weights_length_checked() {
        let graph = two_step_graph();
        let mut acc = CutflowAccumulator::new();
        let err = acc
            .record(graph.step("A").expect("A"), Some(&[1.0; 3][..]))
            .expect_err("shape");
        assert!(matches!(err, CutflowError::ShapeMismatch { expected: 4, found: 3, .. }));
    }

    #[test]
    fn efficiency_uses_inclusive_parent_when_categories_are_born() {
        let graph = two_step_graph();
        let mut acc = CutflowAccumulator::new();
        acc.record(graph.step("A").expect("A"), None).expect("A");
        acc.record(graph.step("B").expect("B"), None).expect("B");
        let cutflow = acc.finish().run().clone();

        let y = cutflow.get("B", "y").expect("y");
        let eff = cutflow.efficiency(y).expect("efficiency");
        assert!((eff - 2.0 / 3.0).abs() < 1e-12);
        let root_row = CutflowRow::from_mask(graph.step(ROOT_STEP).expect("root"), INCLUSIVE_CATEGORY, &[true], None)
            .expect("root row");
        assert_eq!(cutflow.efficiency(&root_row), None);
    }

    #[test]
    fn merge_sums_matching_rows() {
        let graph = two_step_graph();
        let mut acc = CutflowAccumulator::new();
        acc.record(graph.step("B").expect("B"), None).expect("B");
        let mut total = acc.finish().run().clone();
        let shard = total.clone();
        total.merge(&shard);

        assert_eq!(total.len(), 2);
        assert_eq!(total.get("B", "y").expect("y").raw, 4);
        assert_eq!(total.get("B", "x").expect("x").weighted, 2.0);
    }

    #[test]
    fn jagged_weights_multiply_per_event() {
        let sf = Collection::from_counts(&[2, 0, 1])
            .with_field("sf", Values::Float(vec![0.5, 0.8, 1.1]))
            .expect("sf");
        let batch = EventBatch::new(3)
            .with_scalar("genWeight", Values::Float(vec![2.0, 3.0, -1.0]))
            .expect("gen")
            .with_collection("Muon", sf)
            .expect("muon");

        let weights = Weighting::product(["genWeight", "Muon.sf"])
            .resolve(&batch)
            .expect("resolve")
            .expect("weights");
        assert_eq!(weights.len(), 3);
        assert!((weights[0] - 0.8).abs() < 1e-12);
        assert!((weights[1] - 3.0).abs() < 1e-12);
        assert!((weights[2] + 1.1).abs() < 1e-12);

        assert_eq!(Weighting::Unit.resolve(&batch).expect("unit"), None);
        assert!(Weighting::Field("missing".into()).resolve(&batch).is_err());
    }

    #[test]
    fn mismatched_weights_are_an_error_not_a_panic() {
        let graph = two_step_graph();
        let step = graph.step("A").expect("A");
        let err = CutflowRow::from_mask(step, INCLUSIVE_CATEGORY, &[true, true], Some(&[1.0][..]))
            .expect_err("short weights");
        assert!(matches!(err, CutflowError::ShapeMismatch { expected: 2, found: 1, .. }));
    }

    #[test]
    fn reject_weights_divide_out() {
        let sf = Collection::from_counts(&[2, 0])
            .with_field("sf", Values::Float(vec![0.5, 0.8]))
            .expect("sf");
        let batch = EventBatch::new(2)
            .with_scalar("genWeight", Values::Float(vec![2.0, 3.0]))
            .expect("gen")
            .with_scalar("prefire", Values::Float(vec![0.5, 0.0]))
            .expect("prefire")
            .with_collection("Muon", sf)
            .expect("muon");

        let weighting = Weighting::Product {
            multiply: vec!["genWeight".into()],
            divide: vec!["Muon.sf".into()],
        };
        let weights = weighting.resolve(&batch).expect("resolve").expect("weights");
        // 2.0 / (0.5 * 0.8), and an empty event divides by 1.0
        assert!((weights[0] - 5.0).abs() < 1e-12);
        assert!((weights[1] - 3.0).abs() < 1e-12);

        let zero = Weighting::Product {
            multiply: vec!["genWeight".into()],
            divide: vec!["prefire".into()],
        };
        assert!(matches!(
            zero.resolve(&batch),
            Err(CutflowError::ZeroWeight { ref field, event: 1 }) if field == "prefire"
        ));
    }

    #[test]
    fn merge_places_new_steps_under_their_parent() {
        let mut graph = two_step_graph();
        graph
            .declare_step("C", Mask::Simple(vec![true, false, false, false]), "A")
            .expect("C");

        let mut first = CutflowAccumulator::new();
        for label in [ROOT_STEP, "A", "B"] {
            first.record(graph.step(label).expect("step"), None).expect("record");
        }
        let mut second = CutflowAccumulator::new();
        for label in [ROOT_STEP, "A", "C"] {
            second.record(graph.step(label).expect("step"), None).expect("record");
        }
        let mut merged = second.finish().run().clone();
        merged.merge(first.finish().run());

        let order: Vec<_> = merged
            .rows()
            .iter()
            .map(|r| (r.step.as_str(), r.category.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                (ROOT_STEP, INCLUSIVE_CATEGORY),
                ("A", INCLUSIVE_CATEGORY),
                ("C", INCLUSIVE_CATEGORY),
                ("B", "x"),
                ("B", "y")
            ]
        );
        assert_eq!(merged.get("A", INCLUSIVE_CATEGORY).expect("A").raw, 6);

        // A shard that only recorded a deep step still nests it
        let mut lone = CutflowAccumulator::new();
        lone.record(graph.step("B").expect("B"), None).expect("B");
        let mut base = CutflowAccumulator::new();
        for label in [ROOT_STEP, "A", "C"] {
            base.record(graph.step(label).expect("step"), None).expect("record");
        }
        let mut merged = base.finish().run().clone();
        merged.merge(lone.finish().run());
        let steps: Vec<_> = merged.rows().iter().map(|r| r.step.as_str()).collect();
        assert_eq!(steps, vec![ROOT_STEP, "A", "C", "B", "B"]);
    }
}
