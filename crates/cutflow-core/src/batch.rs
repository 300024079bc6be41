//! # Event Batch
//!
//! Columnar container of N events.
//!
//! - Scalar fields hold one value per event.
//! - Object collections (e.g. `Muon`) hold a variable number of objects per
//!   event. All per-object fields of a collection share one offsets array:
//!   event `i` owns objects `offsets[i]..offsets[i + 1]`.
//!
//! Field paths are `name` for scalars and `Collection.field` for per-object
//! fields. A batch is never reordered; row selection produces a new batch.

use crate::types::{CutflowError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::ops::Range;

// =============================================================================
// VALUES
// =============================================================================

/// A typed, flat sequence of values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Values {
    Float(Vec<f64>),
    Int(Vec<i64>),
    Bool(Vec<bool>),
}

impl Values {
    /// Number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Values::Float(v) => v.len(),
            Values::Int(v) => v.len(),
            Values::Bool(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Type name used in error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Values::Float(_) => "float",
            Values::Int(_) => "int",
            Values::Bool(_) => "bool",
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<&[f64]> {
        match self {
            Values::Float(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&[i64]> {
        match self {
            Values::Int(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<&[bool]> {
        match self {
            Values::Bool(v) => Some(v),
            _ => None,
        }
    }

    /// Numeric view of the values. Booleans map to 0.0 / 1.0.
    #[must_use]
    pub fn to_f64(&self) -> Vec<f64> {
        match self {
            Values::Float(v) => v.clone(),
            Values::Int(v) => v.iter().map(|&x| x as f64).collect(),
            Values::Bool(v) => v.iter().map(|&b| if b { 1.0 } else { 0.0 }).collect(),
        }
    }

    /// Gather values at the given positions.
    ///
    /// An out-of-range position is a `ShapeMismatch`.
    pub fn take(&self, positions: &[usize]) -> Result<Values> {
        if let Some(&bad) = positions.iter().find(|&&i| i >= self.len()) {
            return Err(CutflowError::ShapeMismatch {
                context: format!("value position {}", bad),
                expected: self.len(),
                found: bad + 1,
            });
        }
        Ok(match self {
            Values::Float(v) => Values::Float(positions.iter().map(|&i| v[i]).collect()),
            Values::Int(v) => Values::Int(positions.iter().map(|&i| v[i]).collect()),
            Values::Bool(v) => Values::Bool(positions.iter().map(|&i| v[i]).collect()),
        })
    }

    /// Keep the values whose `keep` entry is true.
    pub fn filter(&self, keep: &[bool]) -> Result<Values> {
        fn pick<T: Copy>(v: &[T], keep: &[bool]) -> Vec<T> {
            v.iter()
                .zip(keep)
                .filter_map(|(x, &k)| k.then_some(*x))
                .collect()
        }
        if keep.len() != self.len() {
            return Err(CutflowError::ShapeMismatch {
                context: "value selection mask".to_string(),
                expected: self.len(),
                found: keep.len(),
            });
        }
        Ok(match self {
            Values::Float(v) => Values::Float(pick(v, keep)),
            Values::Int(v) => Values::Int(pick(v, keep)),
            Values::Bool(v) => Values::Bool(pick(v, keep)),
        })
    }
}

// =============================================================================
// FIELD VIEW
// =============================================================================

/// Borrowed view of a field, tagged by layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Field<'a> {
    /// One value per event.
    Scalar(&'a Values),
    /// Variable-length values per event, delimited by `offsets`.
    Jagged {
        offsets: &'a [usize],
        values: &'a Values,
    },
}

// =============================================================================
// OBJECT COLLECTION
// =============================================================================

/// A per-event, variable-length list of objects with named per-object fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CollectionRepr")]
pub struct Collection {
    /// Event boundaries: `offsets.len() == n_events + 1`.
    offsets: Vec<usize>,
    fields: IndexMap<String, Values>,
}

#[derive(Deserialize)]
struct CollectionRepr {
    offsets: Vec<usize>,
    fields: IndexMap<String, Values>,
}

impl TryFrom<CollectionRepr> for Collection {
    type Error = CutflowError;

    fn try_from(repr: CollectionRepr) -> Result<Self> {
        let mut collection = Collection::new(repr.offsets)?;
        for (name, values) in repr.fields {
            collection.insert_field(name, values)?;
        }
        Ok(collection)
    }
}

impl Collection {
    /// Create an empty collection from event offsets.
    ///
    /// Offsets must start at 0 and be non-decreasing.
    pub fn new(offsets: Vec<usize>) -> Result<Self> {
        if offsets.first() != Some(&0) {
            return Err(CutflowError::MalformedBatch(
                "collection offsets must start at 0".to_string(),
            ));
        }
        if offsets.windows(2).any(|w| w[1] < w[0]) {
            return Err(CutflowError::MalformedBatch(
                "collection offsets must be non-decreasing".to_string(),
            ));
        }
        Ok(Self {
            offsets,
            fields: IndexMap::new(),
        })
    }

    /// Create an empty collection from per-event object counts.
    #[must_use]
    pub fn from_counts(counts: &[usize]) -> Self {
        let mut offsets = Vec::with_capacity(counts.len() + 1);
        offsets.push(0);
        let mut total = 0;
        for &c in counts {
            total += c;
            offsets.push(total);
        }
        Self {
            offsets,
            fields: IndexMap::new(),
        }
    }

    /// Builder variant of [`Collection::insert_field`].
    pub fn with_field(mut self, name: impl Into<String>, values: Values) -> Result<Self> {
        self.insert_field(name, values)?;
        Ok(self)
    }

    /// Insert or replace a per-object field. Its length must equal the
    /// total number of objects.
    pub fn insert_field(&mut self, name: impl Into<String>, values: Values) -> Result<()> {
        let name = name.into();
        if values.len() != self.n_objects() {
            return Err(CutflowError::ShapeMismatch {
                context: format!("object field '{}'", name),
                expected: self.n_objects(),
                found: values.len(),
            });
        }
        self.fields.insert(name, values);
        Ok(())
    }

    #[must_use]
    pub fn n_events(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Total number of objects across all events.
    #[must_use]
    pub fn n_objects(&self) -> usize {
        self.offsets.last().copied().unwrap_or(0)
    }

    #[must_use]
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// Object positions belonging to `event`. `None` past the last event.
    #[must_use]
    pub fn event_range(&self, event: usize) -> Option<Range<usize>> {
        let start = *self.offsets.get(event)?;
        let end = *self.offsets.get(event + 1)?;
        Some(start..end)
    }

    /// Number of objects in each event.
    #[must_use]
    pub fn counts(&self) -> Vec<usize> {
        self.offsets.windows(2).map(|w| w[1] - w[0]).collect()
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Values> {
        self.fields.get(name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Keep the objects whose `keep` entry is true, preserving event
    /// association. `keep` has one entry per object.
    pub fn filter_objects(&self, keep: &[bool]) -> Result<Collection> {
        if keep.len() != self.n_objects() {
            return Err(CutflowError::ShapeMismatch {
                context: "object selection mask".to_string(),
                expected: self.n_objects(),
                found: keep.len(),
            });
        }
        let counts: Vec<usize> = self
            .offsets
            .windows(2)
            .map(|w| keep[w[0]..w[1]].iter().filter(|&&k| k).count())
            .collect();
        let mut out = Collection::from_counts(&counts);
        for (name, values) in &self.fields {
            out.fields.insert(name.clone(), values.filter(keep)?);
        }
        Ok(out)
    }

    /// Select events (rows) of the collection, in the given order.
    pub fn take_events(&self, rows: &[usize]) -> Result<Collection> {
        let mut positions = Vec::new();
        let mut counts = Vec::with_capacity(rows.len());
        for &row in rows {
            let range = self.event_range(row).ok_or_else(|| CutflowError::ShapeMismatch {
                context: format!("collection row {}", row),
                expected: self.n_events(),
                found: row + 1,
            })?;
            counts.push(range.len());
            positions.extend(range);
        }
        let mut out = Collection::from_counts(&counts);
        for (name, values) in &self.fields {
            out.fields.insert(name.clone(), values.take(&positions)?);
        }
        Ok(out)
    }
}

// =============================================================================
// EVENT BATCH
// =============================================================================

/// A columnar batch of events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "EventBatchRepr")]
pub struct EventBatch {
    n_events: usize,
    scalars: IndexMap<String, Values>,
    collections: IndexMap<String, Collection>,
}

#[derive(Deserialize)]
struct EventBatchRepr {
    n_events: usize,
    #[serde(default)]
    scalars: IndexMap<String, Values>,
    #[serde(default)]
    collections: IndexMap<String, Collection>,
}

impl TryFrom<EventBatchRepr> for EventBatch {
    type Error = CutflowError;

    fn try_from(repr: EventBatchRepr) -> Result<Self> {
        let mut batch = EventBatch::new(repr.n_events);
        for (name, values) in repr.scalars {
            batch.insert_scalar(name, values)?;
        }
        for (name, collection) in repr.collections {
            batch.insert_collection(name, collection)?;
        }
        Ok(batch)
    }
}

impl EventBatch {
    /// Create an empty batch of `n_events` events.
    #[must_use]
    pub fn new(n_events: usize) -> Self {
        Self {
            n_events,
            scalars: IndexMap::new(),
            collections: IndexMap::new(),
        }
    }

    /// Number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.n_events
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.n_events == 0
    }

    /// Builder variant of [`EventBatch::insert_scalar`].
    pub fn with_scalar(mut self, name: impl Into<String>, values: Values) -> Result<Self> {
        self.insert_scalar(name, values)?;
        Ok(self)
    }

    /// Builder variant of [`EventBatch::insert_collection`].
    pub fn with_collection(mut self, name: impl Into<String>, collection: Collection) -> Result<Self> {
        self.insert_collection(name, collection)?;
        Ok(self)
    }

    /// Insert or replace a scalar field.
    pub fn insert_scalar(&mut self, name: impl Into<String>, values: Values) -> Result<()> {
        let name = name.into();
        if name.contains('.') {
            return Err(CutflowError::MalformedBatch(format!(
                "scalar field name '{}' must not contain '.'",
                name
            )));
        }
        if values.len() != self.n_events {
            return Err(CutflowError::ShapeMismatch {
                context: format!("scalar field '{}'", name),
                expected: self.n_events,
                found: values.len(),
            });
        }
        self.scalars.insert(name, values);
        Ok(())
    }

    /// Insert or replace an object collection.
    pub fn insert_collection(&mut self, name: impl Into<String>, collection: Collection) -> Result<()> {
        let name = name.into();
        if collection.n_events() != self.n_events {
            return Err(CutflowError::ShapeMismatch {
                context: format!("collection '{}'", name),
                expected: self.n_events,
                found: collection.n_events(),
            });
        }
        self.collections.insert(name, collection);
        Ok(())
    }

    /// Attach a per-object field to an existing collection.
    pub fn add_to_collection(&mut self, collection: &str, field: impl Into<String>, values: Values) -> Result<()> {
        self.collections
            .get_mut(collection)
            .ok_or_else(|| CutflowError::FieldNotFound(collection.to_string()))?
            .insert_field(field, values)
    }

    /// Look up a field by path.
    pub fn field(&self, path: &str) -> Result<Field<'_>> {
        match path.split_once('.') {
            Some((coll, name)) => {
                let collection = self.collection(coll)?;
                let values = collection
                    .field(name)
                    .ok_or_else(|| CutflowError::FieldNotFound(path.to_string()))?;
                Ok(Field::Jagged {
                    offsets: collection.offsets(),
                    values,
                })
            }
            None => self.scalar(path).map(Field::Scalar),
        }
    }

    /// Check whether a field path resolves.
    #[must_use]
    pub fn has_field(&self, path: &str) -> bool {
        self.field(path).is_ok()
    }

    pub fn scalar(&self, name: &str) -> Result<&Values> {
        self.scalars
            .get(name)
            .ok_or_else(|| CutflowError::FieldNotFound(name.to_string()))
    }

    /// Scalar boolean field (e.g. trigger or filter flags).
    pub fn flag(&self, name: &str) -> Result<&[bool]> {
        let values = self.scalar(name)?;
        values.as_bool().ok_or_else(|| CutflowError::FieldTypeMismatch {
            field: name.to_string(),
            expected: "bool",
            found: values.kind(),
        })
    }

    pub fn collection(&self, name: &str) -> Result<&Collection> {
        self.collections
            .get(name)
            .ok_or_else(|| CutflowError::FieldNotFound(name.to_string()))
    }

    pub fn scalar_names(&self) -> impl Iterator<Item = &str> {
        self.scalars.keys().map(String::as_str)
    }

    pub fn collection_names(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }

    /// Derive a new batch holding only the given rows, in order.
    pub fn take_rows(&self, rows: &[usize]) -> Result<EventBatch> {
        if let Some(&bad) = rows.iter().find(|&&r| r >= self.n_events) {
            return Err(CutflowError::ShapeMismatch {
                context: format!("row index {}", bad),
                expected: self.n_events,
                found: bad + 1,
            });
        }
        let scalars = self
            .scalars
            .iter()
            .map(|(name, values)| values.take(rows).map(|v| (name.clone(), v)))
            .collect::<Result<IndexMap<_, _>>>()?;
        let collections = self
            .collections
            .iter()
            .map(|(name, coll)| coll.take_events(rows).map(|c| (name.clone(), c)))
            .collect::<Result<IndexMap<_, _>>>()?;
        Ok(EventBatch {
            n_events: rows.len(),
            scalars,
            collections,
        })
    }

    /// Derive a new batch holding the rows where `keep` is true.
    pub fn filter_rows(&self, keep: &[bool]) -> Result<EventBatch> {
        if keep.len() != self.n_events {
            return Err(CutflowError::ShapeMismatch {
                context: "row selection mask".to_string(),
                expected: self.n_events,
                found: keep.len(),
            });
        }
        self.take_rows(&crate::mask::true_indices(keep))
    }
}

// =============================================================================
// TESTS
// =============================================================================
