//! # Property-Based Tests
//!
//! Invariants of mask composition, snapshots and cutflow arithmetic over
//! random event masks.

use cutflow_core::mask::count_true;
use cutflow_core::{
    CutflowAccumulator, EventBatch, INCLUSIVE_CATEGORY, Mask, REINDEX_SENTINEL, ROOT_STEP, Snapshot,
    StepGraph, Values, reindex,
};
use proptest::collection::vec;
use proptest::prelude::*;

/// Three independent masks over the same number of events.
fn three_masks() -> impl Strategy<Value = (Vec<bool>, Vec<bool>, Vec<bool>)> {
    (1usize..64).prop_flat_map(|n| {
        (
            vec(any::<bool>(), n),
            vec(any::<bool>(), n),
            vec(any::<bool>(), n),
        )
    })
}

fn implies(child: &[bool], parent: &[bool]) -> bool {
    child.iter().zip(parent).all(|(&c, &p)| !c || p)
}

/// root -> A -> B (categorized x/y) -> C (simple)
fn build_graph(a: &[bool], b: &[bool], c: &[bool]) -> StepGraph {
    let n = a.len();
    let mut graph = StepGraph::init(n);
    graph
        .declare_step("A", Mask::Simple(a.to_vec()), ROOT_STEP)
        .expect("A");
    let y: Vec<bool> = b.iter().map(|&x| !x).collect();
    graph
        .declare_step("B", Mask::categorized([("x", b.to_vec()), ("y", y)]), "A")
        .expect("B");
    graph
        .declare_step("C", Mask::Simple(c.to_vec()), "B")
        .expect("C");
    graph
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// A child's cumulative mask implies its parent's, per category.
    #[test]
    fn child_implies_parent((a, b, c) in three_masks()) {
        let n = a.len();
        let graph = build_graph(&a, &b, &c);

        let root = graph.cumulative(ROOT_STEP).expect("root").inclusive(n);
        let step_a = graph.cumulative("A").expect("A").inclusive(n);
        prop_assert!(implies(&step_a, &root));

        for cat in ["x", "y"] {
            let in_b = graph.cumulative("B").expect("B").category(cat).expect("cat").to_vec();
            let in_c = graph.cumulative("C").expect("C").category(cat).expect("cat").to_vec();
            prop_assert!(implies(&in_b, &step_a));
            prop_assert!(implies(&in_c, &in_b));
        }
    }

    /// Counts never grow from parent to child.
    #[test]
    fn monotonic_shrinkage((a, b, c) in three_masks()) {
        let graph = build_graph(&a, &b, &c);
        for step in graph.steps() {
            let Some(parent) = graph.parent_of(step.label()).expect("parent") else {
                continue;
            };
            let parent_counts = parent.counts();
            for (category, count) in step.counts() {
                let reference = parent_counts
                    .iter()
                    .find(|(c, _)| *c == category)
                    .or_else(|| parent_counts.first())
                    .map(|(_, n)| *n)
                    .expect("parent count");
                prop_assert!(count <= reference);
            }
        }
    }

    /// Overlapping categories each respect their own shrinkage.
    #[test]
    fn overlapping_categories_shrink((a, b, c) in three_masks()) {
        let n = a.len();
        let mut graph = StepGraph::init(n);
        graph.declare_step("A", Mask::Simple(a.clone()), ROOT_STEP).expect("A");
        graph
            .declare_step("B", Mask::categorized([("p", b.clone()), ("q", c.clone())]), "A")
            .expect("B");

        let passing_a = count_true(&a);
        for (_, count) in graph.step("B").expect("B").counts() {
            prop_assert!(count <= passing_a);
        }
    }

    /// Capturing the same step twice yields identical snapshots.
    #[test]
    fn snapshot_idempotent((a, b, c) in three_masks()) {
        let n = a.len();
        let batch = EventBatch::new(n)
            .with_scalar("idx", Values::Int((0..n as i64).collect()))
            .expect("idx");
        let graph = build_graph(&a, &b, &c);

        let first = Snapshot::capture("s", &batch, &graph, "C", None).expect("first");
        let second = Snapshot::capture("s", &batch, &graph, "C", None).expect("second");
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.checksum(), second.checksum());
        prop_assert_eq!(first.events().len(), first.rows().len());
    }

    /// With unit weights the weighted sum and sum of squares equal the raw count.
    #[test]
    fn unit_weights_match_raw((a, b, c) in three_masks()) {
        let graph = build_graph(&a, &b, &c);
        let mut acc = CutflowAccumulator::new();
        for step in graph.steps() {
            acc.record(step, None).expect("record");
        }
        for row in acc.finish().run().rows() {
            prop_assert_eq!(row.weighted, row.raw as f64);
            prop_assert_eq!(row.weighted_sq, row.raw as f64);
        }
    }

    /// Merging a cutflow with itself doubles every count.
    #[test]
    fn merge_doubles((a, b, c) in three_masks(), w in 0.1f64..5.0) {
        let n = a.len();
        let weights = vec![w; n];
        let graph = build_graph(&a, &b, &c);
        let mut acc = CutflowAccumulator::new();
        acc.record(graph.step("A").expect("A"), Some(weights.as_slice())).expect("A");
        let cutflow = acc.finish().run().clone();

        let mut merged = cutflow.clone();
        merged.merge(&cutflow);
        let single = cutflow.get("A", INCLUSIVE_CATEGORY).expect("single");
        let double = merged.get("A", INCLUSIVE_CATEGORY).expect("double");
        prop_assert_eq!(double.raw, 2 * single.raw);
        prop_assert!((double.weighted - 2.0 * single.weighted).abs() < 1e-9);
    }

    /// No surviving reference points past the kept objects.
    #[test]
    fn reindex_never_dangles(
        keep in vec(any::<bool>(), 0..16),
        refs in vec(-2i64..20, 0..32)
    ) {
        let kept = count_true(&keep) as i64;
        for (old, new) in refs.iter().zip(reindex(&refs, &keep)) {
            if new == REINDEX_SENTINEL {
                continue;
            }
            prop_assert!(new < kept);
            let old = usize::try_from(*old).expect("non-negative");
            prop_assert!(keep[old]);
        }
    }
}
