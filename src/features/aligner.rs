//! Schema alignment: reshape engineered columns into the model's exact layout

use crate::features::engineer::EngineeredRecord;
use crate::features::schema::{FeatureSchema, FeatureVector};

/// What alignment had to do to make a record fit the schema
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignmentReport {
    /// Record columns the schema does not know (discarded)
    pub dropped: Vec<String>,
    /// Schema columns the record did not provide (left at 0)
    pub defaulted: Vec<String>,
}

/// Aligns engineered records against one schema.
///
/// Alignment is total: the output always has `schema.len()` entries in
/// schema order. Unknown columns are dropped and missing ones stay at 0,
/// which turns an absent or unseen author category into an all-zero one-hot.
#[derive(Debug, Clone, Copy)]
pub struct SchemaAligner<'a> {
    schema: &'a FeatureSchema,
}

impl<'a> SchemaAligner<'a> {
    pub fn new(schema: &'a FeatureSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &FeatureSchema {
        self.schema
    }

    /// Align a record to the schema
    pub fn align(&self, record: &EngineeredRecord) -> FeatureVector {
        let mut values = vec![0.0; self.schema.len()];
        for (name, value) in record.iter() {
            if let Some(position) = self.schema.position(name) {
                values[position] = value;
            }
        }
        FeatureVector::from_aligned(values)
    }

    /// Align a record and describe the columns that were dropped or defaulted
    pub fn align_with_report(&self, record: &EngineeredRecord) -> (FeatureVector, AlignmentReport) {
        let mut report = AlignmentReport::default();
        let mut seen = vec![false; self.schema.len()];
        let mut values = vec![0.0; self.schema.len()];

        for (name, value) in record.iter() {
            match self.schema.position(name) {
                Some(position) => {
                    values[position] = value;
                    seen[position] = true;
                }
                None => report.dropped.push(name.to_string()),
            }
        }

        report.defaulted = self
            .schema
            .columns()
            .iter()
            .zip(&seen)
            .filter(|(_, seen)| !**seen)
            .map(|(name, _)| name.clone())
            .collect();

        (FeatureVector::from_aligned(values), report)
    }

    /// Align a batch of records
    pub fn align_batch(&self, records: &[EngineeredRecord]) -> Vec<FeatureVector> {
        records.iter().map(|r| self.align(r)).collect()
    }
}
