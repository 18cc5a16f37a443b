//! Labelled training data read from CSV

use crate::error::TrainingError;
use crate::features::SourceColumns;
use crate::types::record::{
    AuthorAssociation, Label, RawRecord, FIELD_AUTHOR_ASSOCIATION, FIELD_FILES_CHANGED,
    FIELD_LINES_ADDED, FIELD_LINES_DELETED, NON_FEATURE_FIELDS,
};
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

pub const FIELD_BUILD_STATUS: &str = "build_status";

/// Records, labels and the shape of the source columns
#[derive(Debug, Clone)]
pub struct Dataset {
    records: Vec<RawRecord>,
    labels: Vec<Label>,
    source: SourceColumns,
}

/// Per-class row counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ClassCounts {
    pub success: usize,
    pub failure: usize,
}

impl ClassCounts {
    pub fn of(labels: &[Label]) -> Self {
        let failure = labels.iter().filter(|l| l.is_failure()).count();
        Self {
            success: labels.len() - failure,
            failure,
        }
    }

    pub fn total(&self) -> usize {
        self.success + self.failure
    }

    pub fn minority(&self) -> usize {
        self.success.min(self.failure)
    }

    pub fn get(&self, label: Label) -> usize {
        match label {
            Label::Success => self.success,
            Label::Failure => self.failure,
        }
    }
}

impl Dataset {
    /// Build an in-memory dataset. Needs at least one row of each class.
    pub fn new(
        records: Vec<RawRecord>,
        labels: Vec<Label>,
        source: SourceColumns,
    ) -> Result<Self, TrainingError> {
        if records.len() != labels.len() {
            return Err(TrainingError::Data(format!(
                "{} records but {} labels",
                records.len(),
                labels.len()
            )));
        }
        if records.is_empty() {
            return Err(TrainingError::Data("dataset is empty".to_string()));
        }
        let counts = ClassCounts::of(&labels);
        if counts.minority() == 0 {
            return Err(TrainingError::Data(format!(
                "dataset holds a single class ({} success, {} failure)",
                counts.success, counts.failure
            )));
        }
        Ok(Self {
            records,
            labels,
            source,
        })
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, TrainingError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| {
            TrainingError::Data(format!("cannot open dataset {}: {e}", path.display()))
        })?;
        let dataset = Self::from_reader(file)?;
        info!(
            path = %path.display(),
            rows = dataset.len(),
            extra_columns = dataset.source.extra.len(),
            "Dataset loaded"
        );
        Ok(dataset)
    }

    /// Parse CSV with a header row.
    ///
    /// Blank numeric cells read as 0. Additional columns are kept only when
    /// every non-blank cell is numeric.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, TrainingError> {
        let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let headers = csv.headers()?.clone();

        let column = |name: &str| headers.iter().position(|h| h == name);
        let required = |name: &str| {
            column(name).ok_or_else(|| TrainingError::Data(format!("dataset has no `{name}` column")))
        };
        let added_col = required(FIELD_LINES_ADDED)?;
        let deleted_col = required(FIELD_LINES_DELETED)?;
        let status_col = required(FIELD_BUILD_STATUS)?;
        let files_col = column(FIELD_FILES_CHANGED);
        let author_col = column(FIELD_AUTHOR_ASSOCIATION);

        let rows = csv.records().collect::<Result<Vec<_>, _>>()?;

        let mut extra_cols = Vec::new();
        for (idx, name) in headers.iter().enumerate() {
            let known = [
                FIELD_LINES_ADDED,
                FIELD_LINES_DELETED,
                FIELD_FILES_CHANGED,
                FIELD_AUTHOR_ASSOCIATION,
            ];
            if known.contains(&name) || NON_FEATURE_FIELDS.contains(&name) {
                continue;
            }
            let numeric = rows.iter().all(|row| {
                row.get(idx)
                    .map(|cell| cell.is_empty() || cell.parse::<f64>().is_ok_and(f64::is_finite))
                    .unwrap_or(true)
            });
            if numeric {
                extra_cols.push((idx, name.to_string()));
            } else {
                warn!(column = %name, "Dropping non-numeric dataset column");
            }
        }

        let mut records = Vec::with_capacity(rows.len());
        let mut labels = Vec::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            let line = i + 2;
            let cell = |idx: usize| row.get(idx).unwrap_or("");

            let status = parse_number(cell(status_col), FIELD_BUILD_STATUS, line)?;
            let label = Label::from_status(status).ok_or_else(|| {
                TrainingError::Data(format!(
                    "line {line}: `{FIELD_BUILD_STATUS}` must be 0 or 1, got {status}"
                ))
            })?;

            let mut record = RawRecord::new(
                parse_count(cell(added_col), FIELD_LINES_ADDED, line)?,
                parse_count(cell(deleted_col), FIELD_LINES_DELETED, line)?,
                match files_col {
                    Some(idx) => parse_count(cell(idx), FIELD_FILES_CHANGED, line)?,
                    None => 0,
                },
            );
            record.author_association = author_col.and_then(|idx| AuthorAssociation::parse(cell(idx)));
            for (idx, name) in &extra_cols {
                record
                    .extra
                    .insert(name.clone(), parse_number(cell(*idx), name, line)?);
            }

            records.push(record);
            labels.push(label);
        }

        let source = SourceColumns {
            files_changed: files_col.is_some(),
            extra: extra_cols.into_iter().map(|(_, name)| name).collect(),
        };
        Self::new(records, labels, source)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[RawRecord] {
        &self.records
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn source(&self) -> &SourceColumns {
        &self.source
    }

    pub fn class_counts(&self) -> ClassCounts {
        ClassCounts::of(&self.labels)
    }
}

fn parse_number(cell: &str, column: &str, line: usize) -> Result<f64, TrainingError> {
    if cell.is_empty() {
        return Ok(0.0);
    }
    cell.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| TrainingError::Data(format!("line {line}: `{column}` is not a number: {cell:?}")))
}

fn parse_count(cell: &str, column: &str, line: usize) -> Result<u64, TrainingError> {
    let value = parse_number(cell, column, line)?;
    if value < 0.0 || value.fract() != 0.0 {
        return Err(TrainingError::Data(format!(
            "line {line}: `{column}` must be a non-negative integer, got {value}"
        )));
    }
    Ok(value as u64)
}
