//! # Selector Lifecycle
//!
//! Drives one batch through pre-selection and event selection.
//!
//! ```text
//! Created --pre_select--> PreSelecting --select--> Selecting --> Done
//!                              |                       |
//!                              +------- error ---------+--> Failed
//! ```
//!
//! Analysis-specific logic plugs in through [`SelectionHooks`]. The
//! event-selection hook receives a fresh [`SelectionContext`] that owns the
//! run's step graph, snapshots and cutflow. Nothing survives between runs.

use crate::batch::EventBatch;
use crate::cutflow::{CutflowAccumulator, CutflowRecords, Weighting};
use crate::graph::{Step, StepGraph};
use crate::mask::Mask;
use crate::snapshot::{Snapshot, SnapshotOptions, SnapshotStore};
use crate::types::{CutflowError, Result};
use serde::{Deserialize, Serialize};

// =============================================================================
// STATE
// =============================================================================

/// Lifecycle state of a [`Selector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SelectorState {
    Created,
    PreSelecting,
    Selecting,
    Done,
    /// A hook or engine error aborted the run. Only `reset` leaves this state.
    Failed,
}

impl SelectorState {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            SelectorState::Created => "Created",
            SelectorState::PreSelecting => "PreSelecting",
            SelectorState::Selecting => "Selecting",
            SelectorState::Done => "Done",
            SelectorState::Failed => "Failed",
        }
    }

    /// Check if the run is over, successfully or not.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, SelectorState::Done | SelectorState::Failed)
    }
}

impl std::fmt::Display for SelectorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// HOOKS
// =============================================================================

/// Analysis-specific selection logic.
///
/// `Error` is the hook's own error type. Engine errors are lifted into it
/// with `From`, so collaborator errors reach the driver unchanged.
pub trait SelectionHooks {
    type Error: From<CutflowError>;

    /// Object-level cleaning and corrections. Defaults to pass-through.
    fn pre_selection(&mut self, events: EventBatch) -> std::result::Result<EventBatch, Self::Error> {
        Ok(events)
    }

    /// Declare steps, request snapshots and cutflow records, and return the
    /// final batch.
    fn event_selection(
        &mut self,
        events: EventBatch,
        ctx: &mut SelectionContext,
    ) -> std::result::Result<EventBatch, Self::Error>;
}

// =============================================================================
// SELECTION CONTEXT
// =============================================================================

/// Per-run state handed to [`SelectionHooks::event_selection`].
#[derive(Debug, Default)]
pub struct SelectionContext {
    graph: Option<StepGraph>,
    snapshots: SnapshotStore,
    cutflow: CutflowAccumulator,
}

impl SelectionContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the step graph for `events`. Must be called exactly once.
    pub fn init_selection(&mut self, events: &EventBatch) -> Result<()> {
        if self.graph.is_some() {
            return Err(CutflowError::AlreadyInitialized);
        }
        tracing::debug!(events = events.len(), "selection initialized");
        self.graph = Some(StepGraph::init(events.len()));
        Ok(())
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.graph.is_some()
    }

    /// Declare a step under `parent` (use [`crate::ROOT_STEP`] for the root).
    pub fn add_selection_step(
        &mut self,
        label: &str,
        mask: impl Into<Mask>,
        parent: &str,
    ) -> Result<&Step> {
        self.graph
            .as_mut()
            .ok_or(CutflowError::NotInitialized {
                operation: "add_selection_step",
            })?
            .declare_step(label, mask.into(), parent)
    }

    pub fn graph(&self) -> Result<&StepGraph> {
        self.graph.as_ref().ok_or(CutflowError::NotInitialized { operation: "graph" })
    }

    /// Cumulative mask of a declared step.
    pub fn cumulative(&self, label: &str) -> Result<&Mask> {
        self.graph()?.cumulative(label)
    }

    /// Record the cutflow rows of one step in the run's record set.
    ///
    /// Each step can be recorded once per run.
    pub fn record_cutflow(&mut self, events: &EventBatch, step: &str, weighting: &Weighting) -> Result<()> {
        let graph = self.graph.as_ref().ok_or(CutflowError::NotInitialized {
            operation: "record_cutflow",
        })?;
        let weights = weighting.resolve(events)?;
        self.cutflow.record(graph.step(step)?, weights.as_deref())
    }

    /// Capture a named snapshot of `events` at `step`.
    ///
    /// With `save_cutflow`, every step from the root down to `step` is
    /// recorded into a record set owned by this snapshot.
    pub fn make_snapshot(
        &mut self,
        events: &EventBatch,
        step: &str,
        name: &str,
        options: &SnapshotOptions,
    ) -> Result<&Snapshot> {
        let graph = self.graph.as_ref().ok_or(CutflowError::NotInitialized {
            operation: "make_snapshot",
        })?;
        if self.snapshots.contains(name) {
            return Err(CutflowError::DuplicateSnapshot(name.to_string()));
        }
        let snapshot = Snapshot::capture(name, events, graph, step, options.categories.as_deref())?;

        if options.save_cutflow {
            let weights = options.weighting.resolve(events)?;
            let ancestry = graph.ancestry(step)?;
            self.cutflow.record_snapshot(name, &ancestry, weights.as_deref())?;
        }
        self.snapshots.insert(snapshot)
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    fn finish(self, final_batch: EventBatch) -> Result<RunOutput> {
        let graph = self.graph.ok_or(CutflowError::NotInitialized {
            operation: "event_selection",
        })?;
        Ok(RunOutput {
            final_batch,
            graph,
            snapshots: self.snapshots,
            cutflow: self.cutflow.finish(),
        })
    }
}

// =============================================================================
// RUN OUTPUT
// =============================================================================

/// Everything a completed run produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutput {
    pub final_batch: EventBatch,
    pub graph: StepGraph,
    pub snapshots: SnapshotStore,
    pub cutflow: CutflowRecords,
}

// =============================================================================
// SELECTOR
// =============================================================================

/// Runs [`SelectionHooks`] over one batch at a time.
#[derive(Debug)]
pub struct Selector<H: SelectionHooks> {
    hooks: H,
    state: SelectorState,
}

impl<H: SelectionHooks> Selector<H> {
    #[must_use]
    pub fn new(hooks: H) -> Self {
        Self {
            hooks,
            state: SelectorState::Created,
        }
    }

    #[must_use]
    pub fn state(&self) -> SelectorState {
        self.state
    }

    #[must_use]
    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }

    fn expect_state(&self, operation: &'static str, expected: SelectorState) -> std::result::Result<(), H::Error> {
        if self.state == expected {
            Ok(())
        } else {
            Err(CutflowError::InvalidState {
                operation,
                state: self.state,
            }
            .into())
        }
    }

    fn transition(&mut self, next: SelectorState) {
        tracing::debug!(from = %self.state, to = %next, "selector transition");
        self.state = next;
    }

    /// Run the pre-selection hook on the raw batch.
    pub fn pre_select(&mut self, raw: EventBatch) -> std::result::Result<EventBatch, H::Error> {
        self.expect_state("pre_select", SelectorState::Created)?;
        self.transition(SelectorState::PreSelecting);
        self.hooks.pre_selection(raw).inspect_err(|_| {
            self.state = SelectorState::Failed;
        })
    }

    /// Run the event-selection hook and collect the run's output.
    pub fn select(&mut self, events: EventBatch) -> std::result::Result<RunOutput, H::Error> {
        self.expect_state("select", SelectorState::PreSelecting)?;
        self.transition(SelectorState::Selecting);

        let mut ctx = SelectionContext::new();
        let output = match self.hooks.event_selection(events, &mut ctx) {
            Ok(final_batch) => ctx.finish(final_batch).map_err(H::Error::from),
            Err(err) => Err(err),
        };
        match output {
            Ok(output) => {
                self.transition(SelectorState::Done);
                Ok(output)
            }
            Err(err) => {
                self.transition(SelectorState::Failed);
                Err(err)
            }
        }
    }

    /// `pre_select` followed by `select`.
    pub fn run(&mut self, raw: EventBatch) -> std::result::Result<RunOutput, H::Error> {
        let events = self.pre_select(raw)?;
        self.select(events)
    }

    /// Return to `Created` so the selector can process another batch.
    pub fn reset(&mut self) {
        self.transition(SelectorState::Created);
    }
}

// =============================================================================
// TESTS
// =============================================================================
