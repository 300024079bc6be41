//! # Config-Driven Selection
//!
//! [`ConfiguredSelection`] turns a [`SelectionConfig`] into
//! [`SelectionHooks`]: corrections and object cleaning in pre-selection,
//! then the configured step tree and snapshots in event selection.

use crate::config::{CorrectionConfig, ObjectConfig, SelectionConfig, StepConfig, event_mask};
use cutflow_core::mask::{and, count_true};
use cutflow_core::{
    CutflowError, EventBatch, Mask, ObjectCorrection, RunOutput, SelectionContext, SelectionHooks,
    Selector, SnapshotOptions, Values, select_objects_with_references,
};

// =============================================================================
// CORRECTIONS
// =============================================================================

/// Multiplies a per-object field by a constant factor into a new field.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearScale;

impl ObjectCorrection for LinearScale {
    type Config = CorrectionConfig;
    type Error = CutflowError;

    fn correct(
        &self,
        mut batch: EventBatch,
        object: &str,
        config: &CorrectionConfig,
    ) -> Result<EventBatch, CutflowError> {
        let path = format!("{}.{}", object, config.field);
        let values = batch
            .collection(object)?
            .field(&config.field)
            .ok_or_else(|| CutflowError::FieldNotFound(path.clone()))?;
        if values.as_bool().is_some() {
            return Err(CutflowError::FieldTypeMismatch {
                field: path,
                expected: "float",
                found: values.kind(),
            });
        }
        let corrected: Vec<f64> = values.to_f64().into_iter().map(|v| v * config.factor).collect();
        batch.add_to_collection(object, &config.output, Values::Float(corrected))?;

        tracing::debug!(
            collection = object,
            field = %config.field,
            output = %config.output,
            factor = config.factor,
            "applied linear correction"
        );
        Ok(batch)
    }
}

// =============================================================================
// HOOKS
// =============================================================================

/// Selection hooks driven entirely by a [`SelectionConfig`].
#[derive(Debug, Clone)]
pub struct ConfiguredSelection {
    config: SelectionConfig,
}

impl ConfiguredSelection {
    #[must_use]
    pub fn new(config: SelectionConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &SelectionConfig {
        &self.config
    }

    /// Object keep mask of `object`, with the number of objects surviving
    /// after each successive cut.
    fn object_keep(events: &EventBatch, object: &ObjectConfig) -> Result<(Vec<bool>, Vec<usize>), CutflowError> {
        let collection = events.collection(&object.collection)?;
        let total = collection.n_objects();
        let mut keep = vec![true; total];
        let mut surviving = Vec::with_capacity(object.cuts.len());
        for cut in &object.cuts {
            let values = collection.field(&cut.field).ok_or_else(|| {
                CutflowError::FieldNotFound(format!("{}.{}", object.collection, cut.field))
            })?;
            keep = and(&keep, &cut.apply(values));
            let kept = count_true(&keep);
            tracing::debug!(
                collection = %object.collection,
                field = %cut.field,
                op = ?cut.op,
                value = cut.value,
                kept,
                total,
                "object cut"
            );
            surviving.push(kept);
        }
        Ok((keep, surviving))
    }

    fn clean_objects(events: EventBatch, object: &ObjectConfig) -> Result<EventBatch, CutflowError> {
        let (keep, _) = Self::object_keep(&events, object)?;
        let (events, selections) =
            select_objects_with_references(events, &object.collection, &keep, &object.references)?;
        for selection in &selections {
            tracing::info!(
                collection = %selection.collection,
                before = selection.before,
                after = selection.after,
                "object cleaning"
            );
        }
        Ok(events)
    }

    fn step_mask(&self, step: &StepConfig, events: &EventBatch) -> Result<Mask, CutflowError> {
        let own = event_mask(&step.cuts, events)?;
        if !step.categorized {
            return Ok(Mask::Simple(own));
        }
        let mut categories = Vec::with_capacity(self.config.categories.len());
        for category in &self.config.categories {
            let mask = and(&own, &event_mask(&category.cuts, events)?);
            categories.push((category.name.clone(), mask));
        }
        Ok(Mask::categorized(categories))
    }
}

impl SelectionHooks for ConfiguredSelection {
    type Error = CutflowError;

    fn pre_selection(&mut self, mut events: EventBatch) -> Result<EventBatch, CutflowError> {
        for correction in &self.config.corrections {
            events = LinearScale.correct(events, &correction.collection, correction)?;
        }
        for object in &self.config.objects {
            events = Self::clean_objects(events, object)?;
        }
        Ok(events)
    }

    fn event_selection(
        &mut self,
        events: EventBatch,
        ctx: &mut SelectionContext,
    ) -> Result<EventBatch, CutflowError> {
        ctx.init_selection(&events)?;

        for step in &self.config.steps {
            let mask = self.step_mask(step, &events)?;
            ctx.add_selection_step(&step.label, mask, &step.parent)?;
        }

        for snapshot in &self.config.snapshots {
            let mut options = SnapshotOptions::new();
            if let Some(categories) = &snapshot.categories {
                options = options.categories(categories.iter().cloned());
            }
            if snapshot.save_cutflow {
                options = options.save_cutflow(snapshot.weighting());
            }
            let taken = ctx.make_snapshot(&events, &snapshot.step, &snapshot.name, &options)?;
            tracing::info!(snapshot = %snapshot.name, step = %snapshot.step, events = taken.len(), "snapshot taken");
        }

        // The final batch holds the events surviving the last declared step.
        match self.config.steps.last() {
            Some(last) => {
                let keep = ctx.cumulative(&last.label)?.inclusive(events.len());
                events.filter_rows(&keep)
            }
            None => Ok(events),
        }
    }
}

/// Run a configured selection over one batch.
pub fn run_selection(events: EventBatch, config: SelectionConfig) -> Result<RunOutput, CutflowError> {
    Selector::new(ConfiguredSelection::new(config)).run(events)
}

// =============================================================================
// TESTS
// =============================================================================
