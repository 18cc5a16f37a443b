//! Feature engineering for pull request records.
//!
//! Turns a [`RawRecord`] into named numeric columns. The same transformation
//! runs at training time and at scoring time, so it must stay a pure function
//! of its input.

use crate::types::record::{
    AuthorAssociation, RawRecord, FIELD_FILES_CHANGED, FIELD_LINES_ADDED, FIELD_LINES_DELETED,
};
use std::collections::BTreeSet;

pub const CHANGE_SIZE: &str = "change_size";
pub const ADD_DELETE_RATIO: &str = "add_delete_ratio";
pub const AUTHOR_PREFIX: &str = "author_";

/// Added to the deletion count in `add_delete_ratio`.
///
/// This is a smoothing constant that keeps the ratio finite for pure
/// additions; the result is not a probability.
pub const RATIO_SMOOTHING: f64 = 1.0;

/// One-hot column name for an author association
pub fn author_column(association: &AuthorAssociation) -> String {
    format!("{AUTHOR_PREFIX}{}", association.as_str())
}

/// Engineered columns of a single record, in a deterministic order
#[derive(Debug, Clone, PartialEq)]
pub struct EngineeredRecord {
    columns: Vec<(String, f64)>,
}

impl EngineeredRecord {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, value)| *value)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), *value))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Which optional input columns a training dataset actually provided
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceColumns {
    /// Dataset carried a `files_changed` column
    pub files_changed: bool,
    /// Additional numeric columns, in dataset order
    pub extra: Vec<String>,
}

/// Stateless transformer from raw records to engineered columns
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureEngineer;

impl FeatureEngineer {
    pub fn new() -> Self {
        Self
    }

    /// Engineer a single record.
    ///
    /// Column order: counts, extra columns (by name), author one-hot,
    /// `change_size`, `add_delete_ratio`. An absent association yields no
    /// author columns at all.
    pub fn engineer(&self, record: &RawRecord) -> EngineeredRecord {
        let added = record.lines_added as f64;
        let deleted = record.lines_deleted as f64;

        let mut columns = Vec::with_capacity(6 + record.extra.len());
        columns.push((FIELD_LINES_ADDED.to_string(), added));
        columns.push((FIELD_LINES_DELETED.to_string(), deleted));
        columns.push((FIELD_FILES_CHANGED.to_string(), record.files_changed as f64));

        for (name, value) in &record.extra {
            if !is_engineered_name(name) {
                columns.push((name.clone(), *value));
            }
        }

        if let Some(association) = &record.author_association {
            columns.push((author_column(association), 1.0));
        }

        columns.push((CHANGE_SIZE.to_string(), added + deleted));
        columns.push((ADD_DELETE_RATIO.to_string(), added / (deleted + RATIO_SMOOTHING)));

        EngineeredRecord { columns }
    }

    /// Engineer a batch of records
    pub fn engineer_batch(&self, records: &[RawRecord]) -> Vec<EngineeredRecord> {
        records.iter().map(|r| self.engineer(r)).collect()
    }

    /// Derive the schema column list for a training dataset.
    ///
    /// Counts first, then extra numeric columns in dataset order, then one
    /// `author_<VALUE>` column per observed association (sorted), then the
    /// derived columns.
    pub fn schema_columns(&self, source: &SourceColumns, records: &[RawRecord]) -> Vec<String> {
        let mut columns = vec![FIELD_LINES_ADDED.to_string(), FIELD_LINES_DELETED.to_string()];
        if source.files_changed {
            columns.push(FIELD_FILES_CHANGED.to_string());
        }
        columns.extend(
            source
                .extra
                .iter()
                .filter(|name| !is_engineered_name(name))
                .cloned(),
        );

        let authors: BTreeSet<String> = records
            .iter()
            .filter_map(|r| r.author_association.as_ref())
            .map(author_column)
            .collect();
        columns.extend(authors);

        columns.push(CHANGE_SIZE.to_string());
        columns.push(ADD_DELETE_RATIO.to_string());
        columns
    }

    /// Whether `column` is derived from the count/author fields rather than
    /// passed through from `extra`
    pub fn produces(&self, column: &str) -> bool {
        is_engineered_name(column)
    }
}

/// Names owned by the engineer; extra columns may not shadow them
fn is_engineered_name(name: &str) -> bool {
    matches!(
        name,
        FIELD_LINES_ADDED | FIELD_LINES_DELETED | FIELD_FILES_CHANGED | CHANGE_SIZE | ADD_DELETE_RATIO
    ) || name.starts_with(AUTHOR_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_derived_columns() {
        let engineer = FeatureEngineer::new();
        let record = RawRecord::new(10, 5, 2);

        let engineered = engineer.engineer(&record);
        assert_eq!(engineered.get(CHANGE_SIZE), Some(15.0));
        assert!((engineered.get(ADD_DELETE_RATIO).unwrap() - 10.0 / 6.0).abs() < 1e-12);
        assert_eq!(engineered.get(FIELD_FILES_CHANGED), Some(2.0));
        assert!(engineered.names().all(|n| !n.starts_with(AUTHOR_PREFIX)));
    }

    #[test]
    fn test_ratio_with_no_deletions_is_finite() {
        let engineered = FeatureEngineer::new().engineer(&RawRecord::new(42, 0, 1));
        assert_eq!(engineered.get(ADD_DELETE_RATIO), Some(42.0));
    }

    #[test]
    fn test_author_one_hot() {
        let record = RawRecord::new(1, 1, 1).with_author(AuthorAssociation::Member);
        let engineered = FeatureEngineer::new().engineer(&record);

        assert_eq!(engineered.get("author_MEMBER"), Some(1.0));
        assert_eq!(engineered.get("author_OWNER"), None);
    }

    #[test]
    fn test_extra_columns_cannot_shadow_engineered_ones() {
        let record = RawRecord::new(3, 1, 1)
            .with_extra(CHANGE_SIZE, 999.0)
            .with_extra("review_comments", 4.0);
        let engineered = FeatureEngineer::new().engineer(&record);

        assert_eq!(engineered.get(CHANGE_SIZE), Some(4.0));
        assert_eq!(engineered.get("review_comments"), Some(4.0));
        assert_eq!(engineered.names().filter(|n| *n == CHANGE_SIZE).count(), 1);
    }

    #[test]
    fn test_schema_columns_order() {
        let records = vec![
            RawRecord::new(1, 1, 1).with_author(AuthorAssociation::Owner),
            RawRecord::new(1, 1, 1).with_author(AuthorAssociation::Contributor),
            RawRecord::new(1, 1, 1),
        ];
        let source = SourceColumns {
            files_changed: true,
            extra: vec!["commits".to_string()],
        };

        let columns = FeatureEngineer::new().schema_columns(&source, &records);
        assert_eq!(
            columns,
            vec![
                "lines_added",
                "lines_deleted",
                "files_changed",
                "commits",
                "author_CONTRIBUTOR",
                "author_OWNER",
                "change_size",
                "add_delete_ratio",
            ]
        );
    }

    fn arb_record() -> impl Strategy<Value = RawRecord> {
        (
            0u64..100_000,
            0u64..100_000,
            0u64..1_000,
            proptest::option::of("[A-Z_]{1,12}"),
        )
            .prop_map(|(added, deleted, files, author)| {
                let mut record = RawRecord::new(added, deleted, files);
                record.author_association = author.and_then(|a| AuthorAssociation::parse(&a));
                record
            })
    }

    proptest! {
        #[test]
        fn prop_engineering_is_deterministic(record in arb_record()) {
            let engineer = FeatureEngineer::new();
            prop_assert_eq!(engineer.engineer(&record), engineer.engineer(&record));
        }

        #[test]
        fn prop_derived_columns_are_finite(record in arb_record()) {
            let engineered = FeatureEngineer::new().engineer(&record);
            prop_assert!(engineered.iter().all(|(_, v)| v.is_finite()));
            prop_assert_eq!(
                engineered.get(CHANGE_SIZE),
                Some((record.lines_added + record.lines_deleted) as f64)
            );
        }
    }
}
