//! Train/held-out partitioning

use super::dataset::ClassCounts;
use crate::error::TrainingError;
use crate::features::FeatureMatrix;
use crate::types::Label;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Rows used for fitting. Resampling may grow or reweight this partition.
#[derive(Debug, Clone)]
pub struct TrainingPartition {
    pub features: FeatureMatrix,
    pub labels: Vec<Label>,
}

impl TrainingPartition {
    pub fn class_counts(&self) -> ClassCounts {
        ClassCounts::of(&self.labels)
    }
}

/// Rows reserved for evaluation. Read-only once split off.
#[derive(Debug, Clone)]
pub struct HeldOutPartition {
    features: FeatureMatrix,
    labels: Vec<Label>,
}

impl HeldOutPartition {
    pub fn features(&self) -> &FeatureMatrix {
        &self.features
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn class_counts(&self) -> ClassCounts {
        ClassCounts::of(&self.labels)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitMode {
    Stratified,
    /// Minority class too small to appear on both sides
    Unstratified,
}

#[derive(Debug, Clone)]
pub struct DataSplit {
    pub train: TrainingPartition,
    pub test: HeldOutPartition,
    pub mode: SplitMode,
}

/// Seeded splitter; stratifies on the label whenever the minority class allows it
#[derive(Debug, Clone, Copy)]
pub struct Splitter {
    test_size: f64,
    seed: u64,
}

impl Splitter {
    pub fn new(test_size: f64, seed: u64) -> Self {
        Self { test_size, seed }
    }

    pub fn split(&self, features: &FeatureMatrix, labels: &[Label]) -> Result<DataSplit, TrainingError> {
        let n = labels.len();
        if features.n_rows() != n {
            return Err(TrainingError::Data(format!(
                "{} feature rows but {n} labels",
                features.n_rows()
            )));
        }
        if n < 2 {
            return Err(TrainingError::Data(format!(
                "need at least 2 rows to split, got {n}"
            )));
        }
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(TrainingError::Data(format!(
                "test_size must be in (0, 1), got {}",
                self.test_size
            )));
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let counts = ClassCounts::of(labels);

        let (mut train_idx, mut test_idx, mode) = if counts.minority() < 2 {
            warn!(
                success = counts.success,
                failure = counts.failure,
                "Minority class has fewer than 2 rows, falling back to an unstratified split"
            );
            let mut all: Vec<usize> = (0..n).collect();
            all.shuffle(&mut rng);
            let n_test = self.test_count(n);
            let train = all.split_off(n_test);
            (train, all, SplitMode::Unstratified)
        } else {
            let mut train = Vec::with_capacity(n);
            let mut test = Vec::new();
            for class in [Label::Success, Label::Failure] {
                let mut members: Vec<usize> =
                    (0..n).filter(|&i| labels[i] == class).collect();
                members.shuffle(&mut rng);
                let n_test = self.test_count(members.len());
                train.extend_from_slice(&members[n_test..]);
                test.extend_from_slice(&members[..n_test]);
            }
            (train, test, SplitMode::Stratified)
        };
        train_idx.sort_unstable();
        test_idx.sort_unstable();

        let split = DataSplit {
            train: TrainingPartition {
                features: features.select(&train_idx),
                labels: train_idx.iter().map(|&i| labels[i]).collect(),
            },
            test: HeldOutPartition {
                features: features.select(&test_idx),
                labels: test_idx.iter().map(|&i| labels[i]).collect(),
            },
            mode,
        };

        info!(
            mode = ?split.mode,
            train_rows = split.train.labels.len(),
            test_rows = split.test.len(),
            test_failures = split.test.class_counts().failure,
            "Data split"
        );
        Ok(split)
    }

    /// At least one held-out row, never the whole group
    fn test_count(&self, group: usize) -> usize {
        let wanted = (group as f64 * self.test_size).round() as usize;
        wanted.max(1).min(group.saturating_sub(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    /// Shared sink for formatted log lines
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    fn data(n: usize, failures: usize) -> (FeatureMatrix, Vec<Label>) {
        let rows = (0..n).map(|i| vec![i as f64]).collect();
        let labels = (0..n)
            .map(|i| if i < failures { Label::Failure } else { Label::Success })
            .collect();
        (FeatureMatrix::from_rows(rows).unwrap(), labels)
    }

    #[test]
    fn test_stratified_split_keeps_class_ratio() {
        let (features, labels) = data(100, 10);
        let split = Splitter::new(0.2, 42).split(&features, &labels).unwrap();

        assert_eq!(split.mode, SplitMode::Stratified);
        assert_eq!(split.test.len(), 20);
        assert_eq!(split.test.class_counts().failure, 2);
        assert_eq!(split.train.class_counts().failure, 8);
    }

    #[test]
    fn test_partitions_are_disjoint_and_complete() {
        let (features, labels) = data(37, 6);
        let split = Splitter::new(0.3, 7).split(&features, &labels).unwrap();

        let mut seen: Vec<f64> = split
            .train
            .features
            .rows()
            .chain(split.test.features().rows())
            .map(|row| row[0])
            .collect();
        seen.sort_by(f64::total_cmp);
        let expected: Vec<f64> = (0..37).map(|i| i as f64).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_split_is_seeded() {
        let (features, labels) = data(50, 12);
        let a = Splitter::new(0.2, 42).split(&features, &labels).unwrap();
        let b = Splitter::new(0.2, 42).split(&features, &labels).unwrap();
        assert_eq!(a.test.features(), b.test.features());
    }

    #[test]
    fn test_single_minority_row_falls_back_to_unstratified() {
        let (features, labels) = data(20, 1);
        let split = Splitter::new(0.2, 42).split(&features, &labels).unwrap();

        assert_eq!(split.mode, SplitMode::Unstratified);
        assert_eq!(split.test.len(), 4);
        assert_eq!(split.train.labels.len(), 16);
    }

    #[test]
    fn test_unstratified_fallback_is_logged() {
        let (features, labels) = data(20, 1);
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            Splitter::new(0.2, 42).split(&features, &labels).unwrap();
        });

        let output = logs.contents();
        assert!(output.contains("WARN"), "{output}");
        assert!(
            output.contains("falling back to an unstratified split"),
            "{output}"
        );
    }

    #[test]
    fn test_stratified_split_logs_no_warning() {
        let (features, labels) = data(40, 8);
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            Splitter::new(0.2, 42).split(&features, &labels).unwrap();
        });

        assert!(!logs.contents().contains("WARN"));
    }

    #[test]
    fn test_rejects_degenerate_inputs() {
        let (features, labels) = data(1, 1);
        assert!(Splitter::new(0.2, 42).split(&features, &labels).is_err());

        let (features, labels) = data(10, 3);
        assert!(Splitter::new(1.0, 42).split(&features, &labels).is_err());
    }
}
