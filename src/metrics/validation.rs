// --- File: src/metrics/validation.rs ---

//! Input validation shared by all metric variants.
//!
//! The typed API (`PredictionBatch` / `TargetBatch`) already guarantees the
//! container type at compile time. `check_type` and `into_batch` cover the
//! dynamic boundary, where tensors arrive as `ArrayD<f32>` from the runtime.

use super::base::{MetricError, PredictionBatch, Result, TargetBatch};
use ndarray::{Array1, Array2, ArrayD, Ix2};
use serde::{Deserialize, Serialize};

/// Slack allowed above 1.0 when summing a probability row.
///
/// Softmax outputs in f32 regularly land a few ulps above 1.
pub const SUM_TOLERANCE: f32 = 1e-5;

/// Which optional checks a metric runs inside `compute`.
///
/// Shape matching is always performed. Range and sum checks are opt-in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Every prediction must lie in [0, 1].
    pub check_range: bool,
    /// Every prediction row must sum to at most `1 + sum_tolerance`.
    pub check_sum: bool,
    pub sum_tolerance: f32,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            check_range: false,
            check_sum: false,
            sum_tolerance: SUM_TOLERANCE,
        }
    }
}

impl ValidationConfig {
    /// Enables both the range and the sum checks.
    pub fn strict() -> Self {
        Self {
            check_range: true,
            check_sum: true,
            ..Self::default()
        }
    }

    pub fn with_sum_tolerance(mut self, sum_tolerance: f32) -> Self {
        self.sum_tolerance = sum_tolerance;
        self
    }
}

/// Checks that dynamic inputs are the designated containers.
///
/// `pred` must be 2-D `(batch_size, num_categories)`, `target` must be 1-D and
/// hold finite non-negative integral class indices.
pub fn check_type(pred: &ArrayD<f32>, target: &ArrayD<f32>) -> Result<()> {
    if pred.ndim() != 2 {
        return Err(MetricError::TypeMismatch {
            argument: "pred",
            expected: "2-D array (batch_size, num_categories)".to_string(),
            actual: format!("{}-D array of shape {:?}", pred.ndim(), pred.shape()),
        });
    }
    if target.ndim() != 1 {
        return Err(MetricError::TypeMismatch {
            argument: "target",
            expected: "1-D array (batch_size,)".to_string(),
            actual: format!("{}-D array of shape {:?}", target.ndim(), target.shape()),
        });
    }
    if let Some((index, value)) = target
        .iter()
        .enumerate()
        .find(|(_, v)| !v.is_finite() || **v < 0.0 || v.fract() != 0.0)
    {
        return Err(MetricError::TypeMismatch {
            argument: "target",
            expected: "non-negative integer class indices".to_string(),
            actual: format!("{} at index {}", value, index),
        });
    }
    Ok(())
}

/// Checks that `pred` and `target` describe the same number of samples.
pub fn check_match(pred: PredictionBatch<'_>, target: TargetBatch<'_>) -> Result<()> {
    if pred.nrows() != target.len() {
        return Err(MetricError::ShapeMismatch {
            pred: pred.nrows(),
            target: target.len(),
        });
    }
    Ok(())
}

/// Checks that every prediction lies in [0, 1]. NaN is out of range.
pub fn check_pred_range(pred: PredictionBatch<'_>) -> Result<()> {
    match pred
        .indexed_iter()
        .find(|(_, v)| !(0.0..=1.0).contains(*v))
    {
        Some(((row, col), &value)) => Err(MetricError::RangeViolation { row, col, value }),
        None => Ok(()),
    }
}

/// Checks that every prediction row sums to at most 1 (within [`SUM_TOLERANCE`]).
pub fn check_pred_sum(pred: PredictionBatch<'_>) -> Result<()> {
    check_pred_sum_with_tolerance(pred, SUM_TOLERANCE)
}

/// Same as [`check_pred_sum`] with an explicit tolerance.
pub fn check_pred_sum_with_tolerance(pred: PredictionBatch<'_>, tolerance: f32) -> Result<()> {
    for (row, values) in pred.rows().into_iter().enumerate() {
        let sum = values.sum();
        // Negated comparison so that a NaN sum fails as well.
        if !(sum <= 1.0 + tolerance) {
            return Err(MetricError::SumViolation { row, sum });
        }
    }
    Ok(())
}

/// Runs the checks every `compute` starts with.
pub fn check_batch(
    pred: PredictionBatch<'_>,
    target: TargetBatch<'_>,
    config: &ValidationConfig,
) -> Result<()> {
    check_match(pred, target)?;
    if config.check_range {
        check_pred_range(pred)?;
    }
    if config.check_sum {
        check_pred_sum_with_tolerance(pred, config.sum_tolerance)?;
    }
    Ok(())
}

/// Checks that every target index addresses one of `num_classes` categories.
pub fn check_targets(target: TargetBatch<'_>, num_classes: usize) -> Result<()> {
    match target.iter().enumerate().find(|(_, &c)| c >= num_classes) {
        Some((index, &class)) => Err(MetricError::InvalidTarget {
            index,
            class,
            num_classes,
        }),
        None => Ok(()),
    }
}

/// Converts dynamic inputs into an owned, typed batch after [`check_type`].
pub fn into_batch(pred: &ArrayD<f32>, target: &ArrayD<f32>) -> Result<(Array2<f32>, Array1<usize>)> {
    check_type(pred, target)?;

    let pred = pred
        .view()
        .into_dimensionality::<Ix2>()
        .map_err(|e| MetricError::TypeMismatch {
            argument: "pred",
            expected: "2-D array (batch_size, num_categories)".to_string(),
            actual: e.to_string(),
        })?
        .to_owned();
    let target = target.iter().map(|&v| v as usize).collect::<Array1<usize>>();

    Ok((pred, target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, IxDyn};

    fn dyn_array(shape: &[usize], values: Vec<f32>) -> ArrayD<f32> {
        ArrayD::from_shape_vec(IxDyn(shape), values).unwrap()
    }

    #[test]
    fn test_single_valid_row_passes_all_checks() {
        let pred = array![[0.7f32, 0.3]];
        let target = array![0usize];

        assert!(check_match(pred.view(), target.view()).is_ok());
        assert!(check_pred_range(pred.view()).is_ok());
        assert!(check_pred_sum(pred.view()).is_ok());

        let dyn_pred = dyn_array(&[1, 2], vec![0.7, 0.3]);
        let dyn_target = dyn_array(&[1], vec![0.0]);
        assert!(check_type(&dyn_pred, &dyn_target).is_ok());
    }

    #[test]
    fn test_check_match_rejects_different_batch_sizes() {
        let pred = Array2::<f32>::zeros((2, 3));
        let target = Array1::<usize>::zeros(3);

        assert_eq!(
            check_match(pred.view(), target.view()),
            Err(MetricError::ShapeMismatch { pred: 2, target: 3 })
        );
    }

    #[test]
    fn test_check_pred_range_reports_first_violation() {
        let pred = array![[1.2f32, -0.2]];

        assert_eq!(
            check_pred_range(pred.view()),
            Err(MetricError::RangeViolation {
                row: 0,
                col: 0,
                value: 1.2
            })
        );
    }

    #[test]
    fn test_check_pred_range_rejects_nan() {
        let pred = array![[0.5f32, f32::NAN]];
        assert!(matches!(
            check_pred_range(pred.view()),
            Err(MetricError::RangeViolation { row: 0, col: 1, .. })
        ));
    }

    #[test]
    fn test_check_pred_sum_checks_every_row() {
        let pred = array![[0.5f32, 0.5], [0.8, 0.6]];

        match check_pred_sum(pred.view()) {
            Err(MetricError::SumViolation { row, sum }) => {
                assert_eq!(row, 1);
                assert!((sum - 1.4).abs() < 1e-6);
            }
            other => panic!("expected SumViolation, got {:?}", other),
        }
    }

    #[test]
    fn test_check_pred_sum_tolerates_rounding() {
        let pred = array![[0.1f32, 0.2, 0.3, 0.4 + 2e-6]];
        assert!(check_pred_sum(pred.view()).is_ok());
        assert!(check_pred_sum_with_tolerance(pred.view(), 0.0).is_err());
    }

    #[test]
    fn test_check_type_rejects_wrong_rank() {
        let flat = dyn_array(&[4], vec![0.1, 0.2, 0.3, 0.4]);
        let target = dyn_array(&[4], vec![0.0, 1.0, 1.0, 0.0]);
        let err = check_type(&flat, &target).unwrap_err();
        assert!(matches!(err, MetricError::TypeMismatch { argument: "pred", .. }));

        let pred = dyn_array(&[2, 2], vec![0.1, 0.9, 0.8, 0.2]);
        let one_hot = dyn_array(&[2, 2], vec![0.0, 1.0, 1.0, 0.0]);
        let err = check_type(&pred, &one_hot).unwrap_err();
        assert!(matches!(err, MetricError::TypeMismatch { argument: "target", .. }));
    }

    #[test]
    fn test_check_type_rejects_non_integral_targets() {
        let pred = dyn_array(&[2, 2], vec![0.1, 0.9, 0.8, 0.2]);

        for bad in [0.5f32, -1.0, f32::NAN, f32::INFINITY] {
            let target = dyn_array(&[2], vec![1.0, bad]);
            assert!(matches!(
                check_type(&pred, &target),
                Err(MetricError::TypeMismatch { argument: "target", .. })
            ));
        }
    }

    #[test]
    fn test_check_batch_honours_config() {
        let pred = array![[0.9f32, 0.9]];
        let target = array![1usize];

        assert!(check_batch(pred.view(), target.view(), &ValidationConfig::default()).is_ok());
        assert!(matches!(
            check_batch(pred.view(), target.view(), &ValidationConfig::strict()),
            Err(MetricError::SumViolation { row: 0, .. })
        ));
    }

    #[test]
    fn test_check_targets() {
        let target = array![0usize, 2, 3];
        assert!(check_targets(target.view(), 4).is_ok());
        assert_eq!(
            check_targets(target.view(), 3),
            Err(MetricError::InvalidTarget {
                index: 2,
                class: 3,
                num_classes: 3
            })
        );
    }

    #[test]
    fn test_into_batch_converts() {
        let pred = dyn_array(&[2, 3], vec![0.2, 0.3, 0.5, 0.6, 0.3, 0.1]);
        let target = dyn_array(&[2], vec![2.0, 0.0]);

        let (pred, target) = into_batch(&pred, &target).unwrap();
        assert_eq!(pred.dim(), (2, 3));
        assert_eq!(target, array![2usize, 0]);
    }

    #[test]
    fn test_validation_config_deserializes_with_defaults() {
        let config: ValidationConfig = serde_json::from_str(r#"{ "check_range": true }"#).unwrap();
        assert!(config.check_range);
        assert!(!config.check_sum);
        assert_eq!(config.sum_tolerance, SUM_TOLERANCE);
    }
}
