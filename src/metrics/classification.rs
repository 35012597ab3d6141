// --- File: src/metrics/classification.rs ---

//! Online metrics for classification tasks.
//!
//! Two kinds of variants live here:
//! - iterable metrics (`Accuracy`), whose per-batch value is directly the metric;
//! - statistic metrics (`ConfusionMatrix`, `PrecisionRecallCurve`), whose
//!   per-batch value is an intermediate statistic folded into the accumulator.

use super::base::{MetricError, MetricState, OnlineMetric, PredictionBatch, Result, TargetBatch};
use super::export::{write_report, ExportConfig, ExportError};
use super::validation::{check_batch, check_targets, ValidationConfig};
use ndarray::{Array2, ArrayView1};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

fn state_from_updates(updates: usize) -> MetricState {
    if updates == 0 {
        MetricState::Fresh
    } else {
        MetricState::Accumulating
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Sum of counts that sticks at `u64::MAX` instead of overflowing.
fn saturating_sum<'a, I>(counts: I) -> u64
where
    I: IntoIterator<Item = &'a u64>,
{
    counts.into_iter().fold(0u64, |acc, &c| acc.saturating_add(c))
}

/// Index of the largest score; the first one wins on ties, NaN never wins.
fn argmax(row: ArrayView1<'_, f32>) -> usize {
    let mut best = 0;
    let mut best_score = f32::NEG_INFINITY;
    for (i, &score) in row.iter().enumerate() {
        if score > best_score {
            best = i;
            best_score = score;
        }
    }
    best
}

/// Number of classes ranked above `class`: higher score, or equal score and lower index.
///
/// A NaN target score ranks last, so the sample is never correct.
fn rank_of(row: ArrayView1<'_, f32>, class: usize) -> usize {
    let score = row[class];
    if score.is_nan() {
        return usize::MAX;
    }
    row.iter()
        .enumerate()
        .filter(|&(c, &s)| s > score || (s == score && c < class))
        .count()
}

fn check_categories(pred: PredictionBatch<'_>, expected: usize) -> Result<()> {
    if pred.ncols() != expected {
        return Err(MetricError::CategoryMismatch {
            expected,
            actual: pred.ncols(),
        });
    }
    Ok(())
}

/// Correct-prediction counts for one batch, one slot per k.
#[derive(Debug, Clone, PartialEq)]
struct TopKCounts {
    correct: Vec<u64>,
    total: u64,
}

/// Top-k accuracy for multi-class classification.
///
/// A sample is correct for `k` if its target class is among the `k` highest
/// scores of its prediction row. Both `compute` and `accumulate` return a map
/// `k -> accuracy`; a fresh instance reports `0.0` for every k.
#[derive(Debug, Clone)]
pub struct Accuracy {
    topk: Vec<usize>,
    correct: Vec<u64>,
    total: u64,
    pending: Option<TopKCounts>,
    updates: usize,
    validation: ValidationConfig,
    export: Option<ExportConfig>,
}

impl Accuracy {
    /// Plain (top-1) accuracy.
    pub fn new() -> Self {
        Self::with_topk(&[1])
    }

    /// Accuracy for each k in `topk`. Duplicates are dropped.
    pub fn with_topk(topk: &[usize]) -> Self {
        assert!(
            !topk.is_empty() && topk.iter().all(|&k| k > 0),
            "topk must be a non-empty set of positive integers"
        );
        let mut topk = topk.to_vec();
        topk.sort_unstable();
        topk.dedup();

        Self {
            correct: vec![0; topk.len()],
            topk,
            total: 0,
            pending: None,
            updates: 0,
            validation: ValidationConfig::default(),
            export: None,
        }
    }

    pub fn with_validation(mut self, validation: ValidationConfig) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_export(mut self, export: ExportConfig) -> Self {
        self.export = Some(export);
        self
    }

    pub fn topk(&self) -> &[usize] {
        &self.topk
    }

    /// Number of samples folded in since the last reset.
    pub fn total(&self) -> u64 {
        self.total
    }

    fn scores(&self, correct: &[u64], total: u64) -> BTreeMap<usize, f64> {
        self.topk
            .iter()
            .zip(correct)
            .map(|(&k, &c)| (k, ratio(c, total)))
            .collect()
    }

    pub fn report(&self) -> AccuracyReport {
        AccuracyReport {
            scores: self.accumulate(),
            samples: self.total,
        }
    }
}

impl Default for Accuracy {
    fn default() -> Self {
        Self::new()
    }
}

impl OnlineMetric for Accuracy {
    type Output = BTreeMap<usize, f64>;

    fn name(&self) -> &str {
        "Accuracy"
    }

    fn reset(&mut self) {
        self.correct.iter_mut().for_each(|c| *c = 0);
        self.total = 0;
        self.pending = None;
        self.updates = 0;
    }

    fn compute(&mut self, pred: PredictionBatch<'_>, target: TargetBatch<'_>) -> Result<Self::Output> {
        check_batch(pred, target, &self.validation)?;
        check_targets(target, pred.ncols())?;

        let mut counts = TopKCounts {
            correct: vec![0; self.topk.len()],
            total: target.len() as u64,
        };
        for (row, &class) in pred.rows().into_iter().zip(target.iter()) {
            let rank = rank_of(row, class);
            for (slot, &k) in counts.correct.iter_mut().zip(&self.topk) {
                if rank < k {
                    *slot += 1;
                }
            }
        }

        let current = self.scores(&counts.correct, counts.total);
        self.pending = Some(counts);
        Ok(current)
    }

    fn update(&mut self, n: usize) {
        let Some(counts) = self.pending.take() else {
            log::warn!("{}: update() without a preceding compute(), nothing to fold", self.name());
            return;
        };
        if n == 0 {
            log::debug!("{}: update(0), batch discarded", self.name());
            return;
        }

        let n = n as u64;
        for (acc, c) in self.correct.iter_mut().zip(counts.correct) {
            *acc = acc.saturating_add(c.saturating_mul(n));
        }
        self.total = self.total.saturating_add(counts.total.saturating_mul(n));
        self.updates += 1;
    }

    fn accumulate(&self) -> Self::Output {
        self.scores(&self.correct, self.total)
    }

    fn state(&self) -> MetricState {
        state_from_updates(self.updates)
    }

    fn export(&self) -> std::result::Result<(), ExportError> {
        match &self.export {
            Some(config) => write_report(config, self.name(), &self.report()).map(|_| ()),
            None => {
                log::debug!("{}: no export configured", self.name());
                Ok(())
            }
        }
    }
}

/// Exported summary of [`Accuracy`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccuracyReport {
    pub scores: BTreeMap<usize, f64>,
    pub samples: u64,
}

impl fmt::Display for AccuracyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (k, score) in &self.scores {
            writeln!(f, "top-{}: {:.4}", k, score)?;
        }
        write!(f, "samples: {}", self.samples)
    }
}

/// Confusion matrix for multi-class classification.
///
/// Rows are actual classes, columns predicted classes (argmax of the
/// prediction row). `compute` returns the batch's own matrix, `accumulate`
/// the matrix over all folded batches; a fresh instance reports all zeros.
#[derive(Debug, Clone)]
pub struct ConfusionMatrix {
    num_classes: usize,
    matrix: Array2<u64>, // [actual][predicted]
    pending: Option<Array2<u64>>,
    updates: usize,
    validation: ValidationConfig,
    export: Option<ExportConfig>,
}

impl ConfusionMatrix {
    pub fn new(num_classes: usize) -> Self {
        assert!(num_classes > 0, "num_classes must be positive");
        Self {
            num_classes,
            matrix: Array2::zeros((num_classes, num_classes)),
            pending: None,
            updates: 0,
            validation: ValidationConfig::default(),
            export: None,
        }
    }

    pub fn with_validation(mut self, validation: ValidationConfig) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_export(mut self, export: ExportConfig) -> Self {
        self.export = Some(export);
        self
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Total number of samples folded in.
    pub fn total(&self) -> u64 {
        saturating_sum(&self.matrix)
    }

    /// Number of samples per actual class.
    pub fn support(&self) -> Vec<u64> {
        self.matrix.rows().into_iter().map(|row| saturating_sum(&row)).collect()
    }

    pub fn accuracy(&self) -> f64 {
        ratio(saturating_sum(&self.matrix.diag()), self.total())
    }

    /// TP / (TP + FP) for each class.
    pub fn precision_per_class(&self) -> Vec<f64> {
        self.matrix
            .columns()
            .into_iter()
            .enumerate()
            .map(|(c, column)| ratio(column[c], saturating_sum(&column)))
            .collect()
    }

    /// TP / (TP + FN) for each class.
    pub fn recall_per_class(&self) -> Vec<f64> {
        self.matrix
            .rows()
            .into_iter()
            .enumerate()
            .map(|(c, row)| ratio(row[c], saturating_sum(&row)))
            .collect()
    }

    pub fn f1_per_class(&self) -> Vec<f64> {
        self.precision_per_class()
            .into_iter()
            .zip(self.recall_per_class())
            .map(|(p, r)| if p + r == 0.0 { 0.0 } else { 2.0 * p * r / (p + r) })
            .collect()
    }

    /// Unweighted mean of the per-class F1 scores.
    pub fn macro_f1(&self) -> f64 {
        self.f1_per_class().iter().sum::<f64>() / self.num_classes as f64
    }

    pub fn report(&self) -> ClassificationReport {
        let precision = self.precision_per_class();
        let recall = self.recall_per_class();
        let f1 = self.f1_per_class();
        let support = self.support();

        let classes = (0..self.num_classes)
            .map(|class| ClassScores {
                class,
                precision: precision[class],
                recall: recall[class],
                f1: f1[class],
                support: support[class],
            })
            .collect();

        ClassificationReport {
            classes,
            accuracy: self.accuracy(),
            macro_f1: self.macro_f1(),
            total: self.total(),
            matrix: self.matrix.rows().into_iter().map(|row| row.to_vec()).collect(),
        }
    }
}

impl OnlineMetric for ConfusionMatrix {
    type Output = Array2<u64>;

    fn name(&self) -> &str {
        "ConfusionMatrix"
    }

    fn reset(&mut self) {
        self.matrix.fill(0);
        self.pending = None;
        self.updates = 0;
    }

    fn compute(&mut self, pred: PredictionBatch<'_>, target: TargetBatch<'_>) -> Result<Self::Output> {
        check_batch(pred, target, &self.validation)?;
        check_categories(pred, self.num_classes)?;
        check_targets(target, self.num_classes)?;

        let mut batch = Array2::<u64>::zeros((self.num_classes, self.num_classes));
        for (row, &actual) in pred.rows().into_iter().zip(target.iter()) {
            batch[[actual, argmax(row)]] += 1;
        }

        self.pending = Some(batch.clone());
        Ok(batch)
    }

    fn update(&mut self, n: usize) {
        let Some(batch) = self.pending.take() else {
            log::warn!("{}: update() without a preceding compute(), nothing to fold", self.name());
            return;
        };
        if n == 0 {
            log::debug!("{}: update(0), batch discarded", self.name());
            return;
        }

        let n = n as u64;
        self.matrix.zip_mut_with(&batch, |acc, &b| *acc = acc.saturating_add(b.saturating_mul(n)));
        self.updates += 1;
    }

    fn accumulate(&self) -> Self::Output {
        self.matrix.clone()
    }

    fn state(&self) -> MetricState {
        state_from_updates(self.updates)
    }

    fn export(&self) -> std::result::Result<(), ExportError> {
        match &self.export {
            Some(config) => write_report(config, self.name(), &self.report()).map(|_| ()),
            None => {
                log::debug!("{}: no export configured", self.name());
                Ok(())
            }
        }
    }
}

/// Scores of a single class in a [`ClassificationReport`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassScores {
    pub class: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: u64,
}

/// Per-class precision / recall / F1 derived from a [`ConfusionMatrix`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationReport {
    pub classes: Vec<ClassScores>,
    pub accuracy: f64,
    pub macro_f1: f64,
    pub total: u64,
    pub matrix: Vec<Vec<u64>>,
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>8} {:>10} {:>10} {:>10} {:>10}", "class", "precision", "recall", "f1-score", "support")?;
        for s in &self.classes {
            writeln!(
                f,
                "{:>8} {:>10.4} {:>10.4} {:>10.4} {:>10}",
                s.class, s.precision, s.recall, s.f1, s.support
            )?;
        }
        writeln!(f)?;
        writeln!(f, "accuracy: {:.4} ({} samples)", self.accuracy, self.total)?;
        writeln!(f, "macro f1: {:.4}", self.macro_f1)?;
        writeln!(f)?;
        writeln!(f, "confusion matrix [actual][predicted]:")?;
        for row in &self.matrix {
            let cells: Vec<String> = row.iter().map(|c| format!("{:>6}", c)).collect();
            writeln!(f, "{}", cells.join(""))?;
        }
        Ok(())
    }
}

/// One-vs-rest TP / FP / FN counts, indexed `[class][threshold]`.
#[derive(Debug, Clone, PartialEq)]
struct CurveCounts {
    true_positives: Array2<u64>,
    false_positives: Array2<u64>,
    false_negatives: Array2<u64>,
}

impl CurveCounts {
    fn zeros(num_classes: usize, num_thresholds: usize) -> Self {
        Self {
            true_positives: Array2::zeros((num_classes, num_thresholds)),
            false_positives: Array2::zeros((num_classes, num_thresholds)),
            false_negatives: Array2::zeros((num_classes, num_thresholds)),
        }
    }

    fn fill(&mut self, value: u64) {
        self.true_positives.fill(value);
        self.false_positives.fill(value);
        self.false_negatives.fill(value);
    }

    fn add_scaled(&mut self, other: &CurveCounts, n: u64) {
        self.true_positives
            .zip_mut_with(&other.true_positives, |acc, &v| *acc = acc.saturating_add(v.saturating_mul(n)));
        self.false_positives
            .zip_mut_with(&other.false_positives, |acc, &v| *acc = acc.saturating_add(v.saturating_mul(n)));
        self.false_negatives
            .zip_mut_with(&other.false_negatives, |acc, &v| *acc = acc.saturating_add(v.saturating_mul(n)));
    }

    fn curve(&self, thresholds: &[f32]) -> PrCurve {
        let (num_classes, num_thresholds) = self.true_positives.dim();
        let mut precision = vec![vec![0.0; num_thresholds]; num_classes];
        let mut recall = vec![vec![0.0; num_thresholds]; num_classes];

        for c in 0..num_classes {
            for t in 0..num_thresholds {
                let tp = self.true_positives[[c, t]];
                let predicted = tp + self.false_positives[[c, t]];
                let actual = tp + self.false_negatives[[c, t]];
                // No positive predictions: precision is vacuously perfect.
                precision[c][t] = if predicted == 0 { 1.0 } else { ratio(tp, predicted) };
                recall[c][t] = ratio(tp, actual);
            }
        }

        PrCurve {
            thresholds: thresholds.to_vec(),
            precision,
            recall,
        }
    }
}

/// One-vs-rest precision/recall curve over evenly spaced thresholds.
///
/// For class `c` and threshold `t`, a sample is predicted positive when
/// `pred[c] >= t`. A fresh instance reports precision `1.0` and recall `0.0`
/// at every point.
#[derive(Debug, Clone)]
pub struct PrecisionRecallCurve {
    num_classes: usize,
    thresholds: Vec<f32>,
    counts: CurveCounts,
    pending: Option<CurveCounts>,
    updates: usize,
    validation: ValidationConfig,
    export: Option<ExportConfig>,
}

impl PrecisionRecallCurve {
    /// `num_thresholds` evenly spaced thresholds from 0 to 1 inclusive.
    pub fn new(num_classes: usize, num_thresholds: usize) -> Self {
        assert!(num_classes > 0, "num_classes must be positive");
        assert!(num_thresholds >= 2, "at least two thresholds are required");

        let step = (num_thresholds - 1) as f32;
        let thresholds = (0..num_thresholds).map(|i| i as f32 / step).collect();

        Self {
            num_classes,
            thresholds,
            counts: CurveCounts::zeros(num_classes, num_thresholds),
            pending: None,
            updates: 0,
            validation: ValidationConfig::default(),
            export: None,
        }
    }

    pub fn with_validation(mut self, validation: ValidationConfig) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_export(mut self, export: ExportConfig) -> Self {
        self.export = Some(export);
        self
    }

    pub fn thresholds(&self) -> &[f32] {
        &self.thresholds
    }
}

impl OnlineMetric for PrecisionRecallCurve {
    type Output = PrCurve;

    fn name(&self) -> &str {
        "PrecisionRecallCurve"
    }

    fn reset(&mut self) {
        self.counts.fill(0);
        self.pending = None;
        self.updates = 0;
    }

    fn compute(&mut self, pred: PredictionBatch<'_>, target: TargetBatch<'_>) -> Result<Self::Output> {
        check_batch(pred, target, &self.validation)?;
        check_categories(pred, self.num_classes)?;
        check_targets(target, self.num_classes)?;

        let mut batch = CurveCounts::zeros(self.num_classes, self.thresholds.len());
        for (row, &actual) in pred.rows().into_iter().zip(target.iter()) {
            for (c, &score) in row.iter().enumerate() {
                for (t, &threshold) in self.thresholds.iter().enumerate() {
                    match (score >= threshold, c == actual) {
                        (true, true) => batch.true_positives[[c, t]] += 1,
                        (true, false) => batch.false_positives[[c, t]] += 1,
                        (false, true) => batch.false_negatives[[c, t]] += 1,
                        (false, false) => {}
                    }
                }
            }
        }

        let current = batch.curve(&self.thresholds);
        self.pending = Some(batch);
        Ok(current)
    }

    fn update(&mut self, n: usize) {
        let Some(batch) = self.pending.take() else {
            log::warn!("{}: update() without a preceding compute(), nothing to fold", self.name());
            return;
        };
        if n == 0 {
            log::debug!("{}: update(0), batch discarded", self.name());
            return;
        }

        self.counts.add_scaled(&batch, n as u64);
        self.updates += 1;
    }

    fn accumulate(&self) -> Self::Output {
        self.counts.curve(&self.thresholds)
    }

    fn state(&self) -> MetricState {
        state_from_updates(self.updates)
    }

    fn export(&self) -> std::result::Result<(), ExportError> {
        match &self.export {
            Some(config) => write_report(config, self.name(), &self.accumulate()).map(|_| ()),
            None => {
                log::debug!("{}: no export configured", self.name());
                Ok(())
            }
        }
    }
}

/// Precision and recall per class and threshold, indexed `[class][threshold]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrCurve {
    pub thresholds: Vec<f32>,
    pub precision: Vec<Vec<f64>>,
    pub recall: Vec<Vec<f64>>,
}

impl PrCurve {
    /// Step-wise area under each class curve, walking thresholds from high to low.
    pub fn average_precision(&self) -> Vec<f64> {
        self.precision
            .iter()
            .zip(&self.recall)
            .map(|(precision, recall)| {
                let mut ap = 0.0;
                let mut prev_recall = 0.0;
                for (p, r) in precision.iter().zip(recall).rev() {
                    ap += (r - prev_recall) * p;
                    prev_recall = *r;
                }
                ap
            })
            .collect()
    }

    /// Mean of [`PrCurve::average_precision`] over classes.
    pub fn mean_average_precision(&self) -> f64 {
        let ap = self.average_precision();
        if ap.is_empty() {
            0.0
        } else {
            ap.iter().sum::<f64>() / ap.len() as f64
        }
    }
}

impl fmt::Display for PrCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (class, ap) in self.average_precision().iter().enumerate() {
            writeln!(f, "class {}: AP {:.4}", class, ap)?;
            writeln!(f, "{:>10} {:>10} {:>10}", "threshold", "precision", "recall")?;
            for (t, threshold) in self.thresholds.iter().enumerate() {
                writeln!(
                    f,
                    "{:>10.3} {:>10.4} {:>10.4}",
                    threshold, self.precision[class][t], self.recall[class][t]
                )?;
            }
        }
        write!(f, "mAP: {:.4}", self.mean_average_precision())
    }
}
