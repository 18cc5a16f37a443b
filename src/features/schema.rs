//! Feature schema and the schema-bound vector/matrix types

use crate::error::ArtifactError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Canonical ordered list of columns a model was trained on.
///
/// Immutable once built. The `run_id` ties the schema to the training run
/// (and therefore the model) that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "SchemaFile", into = "SchemaFile")]
pub struct FeatureSchema {
    run_id: Uuid,
    created_at: DateTime<Utc>,
    columns: Vec<String>,
    index: HashMap<String, usize>,
}

/// On-disk representation of a schema
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SchemaFile {
    run_id: Uuid,
    created_at: DateTime<Utc>,
    columns: Vec<String>,
}

impl FeatureSchema {
    /// Build a schema, rejecting empty, blank or duplicated column names
    pub fn new(run_id: Uuid, columns: Vec<String>) -> Result<Self, ArtifactError> {
        Self::build(run_id, Utc::now(), columns)
    }

    fn build(
        run_id: Uuid,
        created_at: DateTime<Utc>,
        columns: Vec<String>,
    ) -> Result<Self, ArtifactError> {
        if columns.is_empty() {
            return Err(ArtifactError::Invalid(
                "feature schema has no columns".to_string(),
            ));
        }

        let mut index = HashMap::with_capacity(columns.len());
        for (position, name) in columns.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(ArtifactError::Invalid(format!(
                    "feature schema column {position} has a blank name"
                )));
            }
            if index.insert(name.clone(), position).is_some() {
                return Err(ArtifactError::Invalid(format!(
                    "feature schema lists `{name}` more than once"
                )));
            }
        }

        Ok(Self {
            run_id,
            created_at,
            columns,
            index,
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Column names in model order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Position of a column in the schema
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }
}

impl PartialEq for FeatureSchema {
    fn eq(&self, other: &Self) -> bool {
        self.run_id == other.run_id && self.columns == other.columns
    }
}

impl TryFrom<SchemaFile> for FeatureSchema {
    type Error = ArtifactError;

    fn try_from(file: SchemaFile) -> Result<Self, Self::Error> {
        Self::build(file.run_id, file.created_at, file.columns)
    }
}

impl From<FeatureSchema> for SchemaFile {
    fn from(schema: FeatureSchema) -> Self {
        Self {
            run_id: schema.run_id,
            created_at: schema.created_at,
            columns: schema.columns,
        }
    }
}

/// Numeric values laid out exactly in schema order.
///
/// Only the schema aligner produces these, so a vector always has
/// `schema.len()` entries.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    values: Vec<f64>,
}

impl FeatureVector {
    pub(crate) fn from_aligned(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Look up a value by column name
    pub fn get(&self, schema: &FeatureSchema, name: &str) -> Option<f64> {
        schema
            .position(name)
            .and_then(|position| self.values.get(position).copied())
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }
}

/// Row-major batch of feature rows sharing one width
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    n_features: usize,
    rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    /// Empty matrix for rows of `n_features` columns
    pub fn new(n_features: usize) -> Self {
        Self {
            n_features,
            rows: Vec::new(),
        }
    }

    /// Build from raw rows; all rows must have the same width
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, ArtifactError> {
        let n_features = rows.first().map(Vec::len).unwrap_or(0);
        if let Some((i, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != n_features)
        {
            return Err(ArtifactError::Invalid(format!(
                "row {i} has {} columns, expected {n_features}",
                row.len()
            )));
        }
        Ok(Self { n_features, rows })
    }

    /// Batch of aligned vectors
    pub fn from_vectors(schema: &FeatureSchema, vectors: Vec<FeatureVector>) -> Self {
        let mut matrix = Self::new(schema.len());
        for vector in vectors {
            matrix.push(vector);
        }
        matrix
    }

    /// Append an aligned vector
    pub fn push(&mut self, vector: FeatureVector) {
        self.push_row(vector.into_values());
    }

    /// Append a raw row produced inside the crate (resampling)
    pub(crate) fn push_row(&mut self, row: Vec<f64>) {
        debug_assert_eq!(row.len(), self.n_features, "row width mismatch");
        self.rows.push(row);
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.rows[i]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.rows.iter().map(Vec::as_slice)
    }

    /// New matrix holding the given rows, in the given order
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            n_features: self.n_features,
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }
}
