// --- File: src/metrics/base.rs ---

//! Module defining the abstract interface (trait) for online metrics.
//!
//! An online metric consumes a stream of batches. Each batch goes through one
//! `compute` + `update` cycle; `accumulate` reads the summary over everything
//! folded in since the last `reset`.

use super::export::ExportError;
use super::validation::into_batch;
use ndarray::{ArrayD, ArrayView1, ArrayView2};
use thiserror::Error;

/// Predictions for one batch: `(batch_size, num_categories)`, rows are
/// probability distributions.
pub type PredictionBatch<'a> = ArrayView2<'a, f32>;

/// Ground-truth class indices for one batch: `(batch_size,)`.
pub type TargetBatch<'a> = ArrayView1<'a, usize>;

/// Errors raised while validating or processing a batch.
///
/// Every variant signals a caller error; none of them is transient.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetricError {
    #[error("Type mismatch for '{argument}': expected {expected}, got {actual}.")]
    TypeMismatch {
        argument: &'static str,
        expected: String,
        actual: String,
    },

    #[error("pred and target don't match: pred has {pred} rows, target has {target}.")]
    ShapeMismatch { pred: usize, target: usize },

    #[error("Prediction {value} at [{row}, {col}] is outside the probability range [0, 1].")]
    RangeViolation { row: usize, col: usize, value: f32 },

    #[error("Prediction row {row} sums to {sum}, probabilities must sum up to 1.")]
    SumViolation { row: usize, sum: f32 },

    #[error("Target class {class} at index {index} is out of range for {num_classes} categories.")]
    InvalidTarget {
        index: usize,
        class: usize,
        num_classes: usize,
    },

    #[error("Expected predictions over {expected} categories, got {actual}.")]
    CategoryMismatch { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, MetricError>;

/// Lifecycle state of a metric instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricState {
    /// Nothing folded in since construction or the last `reset`.
    Fresh,
    /// At least one batch has been folded into the accumulator.
    Accumulating,
}

/// Base trait for all online classification metrics.
///
/// Implementors own their accumulator state. `compute` validates a batch and
/// stores its statistic as pending, `update` folds the pending statistic in,
/// `accumulate` reports the summary without touching the state.
pub trait OnlineMetric: Send + Sync {
    /// Per-batch value and summary value type.
    type Output: Clone;

    /// Returns the name of the metric.
    fn name(&self) -> &str;

    /// Resets the accumulator and drops any pending batch statistic.
    fn reset(&mut self);

    /// Validates the batch and derives its value.
    ///
    /// On error nothing is stored and the accumulator stays untouched.
    fn compute(&mut self, pred: PredictionBatch<'_>, target: TargetBatch<'_>)
        -> Result<Self::Output>;

    /// Folds the pending batch statistic into the accumulator, counted `n` times.
    ///
    /// Without a pending statistic this is a no-op. Counts saturate at
    /// `u64::MAX` rather than wrapping.
    fn update(&mut self, n: usize);

    /// Returns the summary over all batches folded in since the last reset.
    fn accumulate(&self) -> Self::Output;

    /// Returns the current lifecycle state.
    fn state(&self) -> MetricState;

    /// Exports figures or reports of the metric. Does nothing by default.
    fn export(&self) -> std::result::Result<(), ExportError> {
        Ok(())
    }

    /// Runs one full batch cycle: `compute`, then `update(1)`.
    ///
    /// Returns the same value `compute` would have returned for the batch.
    fn call(&mut self, pred: PredictionBatch<'_>, target: TargetBatch<'_>) -> Result<Self::Output> {
        let current = self.compute(pred, target)?;
        self.update(1);
        Ok(current)
    }

    /// Same as [`OnlineMetric::call`] for dynamically shaped inputs.
    ///
    /// The container check happens at runtime here, see
    /// [`check_type`](super::validation::check_type).
    fn call_dyn(&mut self, pred: &ArrayD<f32>, target: &ArrayD<f32>) -> Result<Self::Output> {
        let (pred, target) = into_batch(pred, target)?;
        self.call(pred.view(), target.view())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::validation::check_match;
    use ndarray::{array, Array1};

    /// Counts rows seen, enough to drive the provided trait methods.
    #[derive(Default)]
    struct RowCounter {
        rows: usize,
        pending: Option<usize>,
        updates: usize,
    }

    impl OnlineMetric for RowCounter {
        type Output = usize;

        fn name(&self) -> &str {
            "RowCounter"
        }

        fn reset(&mut self) {
            self.rows = 0;
            self.pending = None;
            self.updates = 0;
        }

        fn compute(&mut self, pred: PredictionBatch<'_>, target: TargetBatch<'_>) -> Result<usize> {
            check_match(pred, target)?;
            self.pending = Some(pred.nrows());
            Ok(pred.nrows())
        }

        fn update(&mut self, n: usize) {
            if let Some(rows) = self.pending.take() {
                self.rows += rows * n;
                if n > 0 {
                    self.updates += 1;
                }
            }
        }

        fn accumulate(&self) -> usize {
            self.rows
        }

        fn state(&self) -> MetricState {
            if self.updates == 0 {
                MetricState::Fresh
            } else {
                MetricState::Accumulating
            }
        }
    }

    #[test]
    fn test_call_runs_compute_then_update() {
        let mut counter = RowCounter::default();
        let pred = array![[0.7f32, 0.3], [0.1, 0.9]];
        let target = array![0usize, 1];

        assert_eq!(counter.state(), MetricState::Fresh);
        let value = counter.call(pred.view(), target.view()).unwrap();

        assert_eq!(value, 2);
        assert_eq!(counter.accumulate(), 2);
        assert_eq!(counter.state(), MetricState::Accumulating);
    }

    #[test]
    fn test_call_propagates_validation_error() {
        let mut counter = RowCounter::default();
        let pred = array![[0.5f32, 0.5]];
        let target: Array1<usize> = array![0, 1];

        let err = counter.call(pred.view(), target.view()).unwrap_err();
        assert_eq!(err, MetricError::ShapeMismatch { pred: 1, target: 2 });
        assert_eq!(counter.state(), MetricState::Fresh);
    }

    #[test]
    fn test_call_dyn_checks_container() {
        let mut counter = RowCounter::default();
        let pred = ArrayD::from_shape_vec(ndarray::IxDyn(&[4]), vec![0.1, 0.2, 0.3, 0.4]).unwrap();
        let target = ArrayD::from_shape_vec(ndarray::IxDyn(&[4]), vec![0.0, 1.0, 1.0, 0.0]).unwrap();

        let err = counter.call_dyn(&pred, &target).unwrap_err();
        assert!(matches!(err, MetricError::TypeMismatch { argument: "pred", .. }));
    }

    #[test]
    fn test_default_export_is_noop() {
        let counter = RowCounter::default();
        assert!(counter.export().is_ok());
    }

    #[test]
    fn test_error_messages() {
        let err = MetricError::ShapeMismatch { pred: 2, target: 3 };
        assert_eq!(
            err.to_string(),
            "pred and target don't match: pred has 2 rows, target has 3."
        );
    }
}
