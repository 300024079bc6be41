//! # Selection Configuration
//!
//! TOML description of a selection: object corrections, object-level cuts,
//! channel definitions, the step tree and the snapshots to take.
//!
//! ```toml
//! [[corrections]]
//! collection = "Muon"
//! field = "pt"
//! output = "corr_pt"
//! factor = 1.02
//!
//! [[objects]]
//! collection = "Muon"
//! cuts = [{ field = "corr_pt", op = ">", value = 10.0 },
//!         { field = "eta", op = "<", value = 2.4, abs = true }]
//!
//! [[categories]]
//! name = "mumu"
//! cuts = [{ field = "Muon.corr_pt", op = ">", value = 0.0, reduce = { count = 2 } }]
//!
//! [[steps]]
//! label = "trigger"
//! cuts = [{ field = "HLT_IsoMu24", op = "==", value = 1.0 }]
//!
//! [[steps]]
//! label = "channel"
//! parent = "trigger"
//! categorized = true
//!
//! [[snapshots]]
//! name = "final"
//! step = "channel"
//! save_cutflow = true
//! weights = ["genWeight"]
//! ```

use cutflow_core::mask::{all_per_event, and, any_per_event, count_per_event};
use cutflow_core::{CrossReference, CutflowError, EventBatch, Field, ROOT_STEP, Values, Weighting};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// =============================================================================
// CONFIG TYPES
// =============================================================================

/// A complete selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelectionConfig {
    #[serde(default)]
    pub corrections: Vec<CorrectionConfig>,
    #[serde(default)]
    pub objects: Vec<ObjectConfig>,
    #[serde(default)]
    pub categories: Vec<CategoryConfig>,
    #[serde(default)]
    pub steps: Vec<StepConfig>,
    #[serde(default)]
    pub snapshots: Vec<SnapshotConfig>,
}

/// Linear scale correction: `output = field * factor` per object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CorrectionConfig {
    pub collection: String,
    pub field: String,
    pub output: String,
    pub factor: f64,
}

/// Object-level cleaning of one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObjectConfig {
    pub collection: String,
    /// Per-object cuts on fields of `collection`, AND-ed together.
    #[serde(default)]
    pub cuts: Vec<CutConfig>,
    /// References into `collection` to rewrite after filtering.
    #[serde(default)]
    pub references: Vec<CrossReference>,
}

/// A named channel: event-level cuts AND-ed together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CategoryConfig {
    pub name: String,
    pub cuts: Vec<CutConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepConfig {
    pub label: String,
    #[serde(default = "root_step")]
    pub parent: String,
    #[serde(default)]
    pub cuts: Vec<CutConfig>,
    /// Split into the configured categories.
    #[serde(default)]
    pub categorized: bool,
}

fn root_step() -> String {
    ROOT_STEP.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotConfig {
    pub name: String,
    pub step: String,
    #[serde(default)]
    pub categories: Option<Vec<String>>,
    #[serde(default)]
    pub save_cutflow: bool,
    /// Weight fields multiplied together. Empty means unit weights.
    #[serde(default)]
    pub weights: Vec<String>,
    /// Weight fields divided out of the product.
    #[serde(default)]
    pub reject_weights: Vec<String>,
}

impl SnapshotConfig {
    #[must_use]
    pub fn weighting(&self) -> Weighting {
        match (self.weights.as_slice(), self.reject_weights.as_slice()) {
            ([], []) => Weighting::Unit,
            ([single], []) => Weighting::Field(single.clone()),
            (multiply, divide) => Weighting::Product {
                multiply: multiply.to_vec(),
                divide: divide.to_vec(),
            },
        }
    }
}

// =============================================================================
// CUTS
// =============================================================================

/// Comparison operator of a cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CutOp {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
}

impl CutOp {
    #[must_use]
    pub fn apply(self, lhs: f64, rhs: f64) -> bool {
        match self {
            CutOp::Lt => lhs < rhs,
            CutOp::Le => lhs <= rhs,
            CutOp::Gt => lhs > rhs,
            CutOp::Ge => lhs >= rhs,
            CutOp::Eq => lhs == rhs,
            CutOp::Ne => lhs != rhs,
        }
    }
}

/// How per-object results become one result per event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reduce {
    /// At least one object passes.
    Any,
    /// Every object passes (events without objects pass).
    All,
    /// At least this many objects pass.
    Count(usize),
}

/// A single comparison against a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CutConfig {
    pub field: String,
    pub op: CutOp,
    pub value: f64,
    /// Compare the absolute value.
    #[serde(default)]
    pub abs: bool,
    /// Required for per-object fields in event-level cuts.
    #[serde(default)]
    pub reduce: Option<Reduce>,
}

impl CutConfig {
    /// Evaluate the comparison on every value.
    #[must_use]
    pub fn apply(&self, values: &Values) -> Vec<bool> {
        values
            .to_f64()
            .into_iter()
            .map(|v| {
                let v = if self.abs { v.abs() } else { v };
                self.op.apply(v, self.value)
            })
            .collect()
    }

    /// One result per event. Per-object fields are reduced with `reduce`.
    pub fn event_mask(&self, batch: &EventBatch) -> Result<Vec<bool>, CutflowError> {
        match (batch.field(&self.field)?, self.reduce) {
            (Field::Scalar(values), None) => Ok(self.apply(values)),
            (Field::Scalar(_), Some(_)) => Err(CutflowError::Config(format!(
                "cut on scalar field '{}' cannot have a reduce",
                self.field
            ))),
            (Field::Jagged { .. }, None) => Err(CutflowError::Config(format!(
                "cut on per-object field '{}' needs a reduce (any, all or count)",
                self.field
            ))),
            (Field::Jagged { offsets, values }, Some(reduce)) => {
                let passing = self.apply(values);
                Ok(match reduce {
                    Reduce::Any => any_per_event(offsets, &passing),
                    Reduce::All => all_per_event(offsets, &passing),
                    Reduce::Count(k) => count_per_event(offsets, &passing)
                        .into_iter()
                        .map(|n| n >= k)
                        .collect(),
                })
            }
        }
    }
}

/// AND of several event-level cuts. No cuts keeps every event.
pub fn event_mask(cuts: &[CutConfig], batch: &EventBatch) -> Result<Vec<bool>, CutflowError> {
    let mut mask = vec![true; batch.len()];
    for cut in cuts {
        mask = and(&mask, &cut.event_mask(batch)?);
    }
    Ok(mask)
}

// =============================================================================
// LOADING AND VALIDATION
// =============================================================================

impl SelectionConfig {
    /// Parse and validate a TOML selection.
    pub fn from_toml_str(contents: &str) -> Result<Self, CutflowError> {
        let config: SelectionConfig =
            toml::from_str(contents).map_err(|e| CutflowError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that do not need a batch.
    ///
    /// Parent links and snapshot steps are checked by the engine itself when
    /// the run declares them.
    pub fn validate(&self) -> Result<(), CutflowError> {
        for correction in &self.corrections {
            if !correction.factor.is_finite() {
                return Err(CutflowError::Config(format!(
                    "correction factor for '{}.{}' is not finite",
                    correction.collection, correction.field
                )));
            }
        }

        for object in &self.objects {
            if object.cuts.iter().any(|c| c.reduce.is_some() || c.field.contains('.')) {
                return Err(CutflowError::Config(format!(
                    "object cuts on '{}' take plain field names without reduce",
                    object.collection
                )));
            }
        }

        let mut names = BTreeSet::new();
        for category in &self.categories {
            if !names.insert(category.name.as_str()) {
                return Err(CutflowError::Config(format!(
                    "category '{}' defined twice",
                    category.name
                )));
            }
        }

        for step in &self.steps {
            if step.label.is_empty() {
                return Err(CutflowError::Config("step with empty label".to_string()));
            }
            if step.categorized && self.categories.is_empty() {
                return Err(CutflowError::Config(format!(
                    "step '{}' is categorized but no categories are defined",
                    step.label
                )));
            }
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
