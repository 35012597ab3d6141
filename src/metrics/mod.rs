// --- File: src/metrics/mod.rs ---

//! Online metrics for evaluating classification models batch by batch.
//!
//! Every metric implements [`OnlineMetric`]:
//! - **reset**: clears the accumulator;
//! - **compute**: validates one batch and derives its value;
//! - **update**: folds that batch into the accumulator;
//! - **accumulate**: reports the summary since the last reset;
//! - **export** (optional): writes a report to disk.
//!
//! # Usage example
//!
//! ```rust
//! use ndarray::array;
//! use rustyasg_metrics::metrics::{Accuracy, OnlineMetric};
//!
//! let mut accuracy = Accuracy::with_topk(&[1, 2]);
//! let pred = array![[0.7f32, 0.2, 0.1], [0.1, 0.3, 0.6]];
//! let target = array![0usize, 1];
//!
//! // compute + update(1) in one go
//! let batch = accuracy.call(pred.view(), target.view())?;
//! assert_eq!(batch[&1], 0.5);
//! assert_eq!(accuracy.accumulate()[&2], 1.0);
//! # Ok::<(), rustyasg_metrics::metrics::MetricError>(())
//! ```

pub mod base;
pub mod classification;
pub mod export;
pub mod validation;

pub use base::{MetricError, MetricState, OnlineMetric, PredictionBatch, TargetBatch};
pub use classification::{
    Accuracy, AccuracyReport, ClassScores, ClassificationReport, ConfusionMatrix, PrCurve,
    PrecisionRecallCurve,
};
pub use export::{ExportConfig, ExportError, ExportFormat};
pub use validation::{
    check_batch, check_match, check_pred_range, check_pred_sum, check_type, into_batch,
    ValidationConfig,
};
