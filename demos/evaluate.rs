//! Evaluation loop over synthetic softmax outputs.
//!
//! Run with: `cargo run --example evaluate -- [output_dir]`
//! When an output directory is given, every metric writes its report there.

use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustyasg_metrics::metrics::{
    Accuracy, ConfusionMatrix, ExportConfig, ExportFormat, OnlineMetric, PrecisionRecallCurve,
    ValidationConfig,
};
use std::error::Error;

const NUM_CLASSES: usize = 4;
const BATCH_SIZE: usize = 32;
const NUM_BATCHES: usize = 10;

/// A fake classifier: the true class gets a boost before the softmax.
fn fake_batch(rng: &mut StdRng) -> (Array2<f32>, Array1<usize>) {
    let target: Array1<usize> = (0..BATCH_SIZE)
        .map(|_| rng.random_range(0..NUM_CLASSES))
        .collect();

    let mut logits = Array2::<f32>::zeros((BATCH_SIZE, NUM_CLASSES));
    for (mut row, &class) in logits.rows_mut().into_iter().zip(target.iter()) {
        for (c, logit) in row.iter_mut().enumerate() {
            *logit = rng.random::<f32>() * 2.0 + if c == class { 1.5 } else { 0.0 };
        }
        let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }

    (logits, target)
}

fn main() -> Result<(), Box<dyn Error>> {
    let output_dir = std::env::args().nth(1);
    let mut rng = StdRng::seed_from_u64(42);

    let mut accuracy = Accuracy::with_topk(&[1, 2]).with_validation(ValidationConfig::strict());
    let mut confusion = ConfusionMatrix::new(NUM_CLASSES);
    let mut pr_curve = PrecisionRecallCurve::new(NUM_CLASSES, 21);

    if let Some(dir) = &output_dir {
        accuracy = accuracy.with_export(ExportConfig::new(dir));
        confusion =
            confusion.with_export(ExportConfig::new(dir).with_format(ExportFormat::Text));
        pr_curve = pr_curve.with_export(ExportConfig::new(dir));
    }

    println!("--- Evaluating {} batches of {} samples ---", NUM_BATCHES, BATCH_SIZE);
    for step in 0..NUM_BATCHES {
        let (pred, target) = fake_batch(&mut rng);

        let batch_acc = accuracy.call(pred.view(), target.view())?;
        confusion.call(pred.view(), target.view())?;
        pr_curve.call(pred.view(), target.view())?;

        println!(
            "Batch {:<2} top-1: {:.4}  top-2: {:.4}",
            step + 1,
            batch_acc[&1],
            batch_acc[&2]
        );
    }

    println!("\n--- Accumulated ---");
    for (k, value) in accuracy.accumulate() {
        println!("top-{} accuracy: {:.4}", k, value);
    }
    println!("\n{}", confusion.report());
    println!("mAP: {:.4}", pr_curve.accumulate().mean_average_precision());

    if let Some(dir) = &output_dir {
        accuracy.export()?;
        confusion.export()?;
        pr_curve.export()?;
        println!("\nReports written to {}", dir);
    }

    Ok(())
}
