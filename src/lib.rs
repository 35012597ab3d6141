//! # RustyASG Metrics: online classification metrics
//!
//! Metrics that consume model predictions batch by batch, fold per-batch
//! statistics into an accumulator and report a summary on demand.
//!
//! ## Usage Example
//!
//! ```no_run
//! use ndarray::array;
//! use rustyasg_metrics::metrics::{ConfusionMatrix, ExportConfig, OnlineMetric};
//!
//! // 1. Create the metric (already in its reset state)
//! let mut cm = ConfusionMatrix::new(2).with_export(ExportConfig::new("reports"));
//!
//! // 2. Feed batches: (batch_size, num_categories) probabilities + class indices
//! let pred = array![[0.9f32, 0.1], [0.4, 0.6]];
//! let target = array![0usize, 0];
//! cm.call(pred.view(), target.view())?;
//!
//! // 3. Read the summary and write the report
//! println!("{}", cm.report());
//! cm.export()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod metrics;
