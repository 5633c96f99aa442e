use anyhow::Result;
use colored::*;

use rusty_gaze::record::RunRecord;
use rusty_gaze::regression::{RegressionEngine, RegressionMethod};
use rusty_gaze::types::{FeatureVector, Point2D};

#[derive(Debug, Default)]
struct MethodStats {
    errors: Vec<f64>,
    failures: usize,
}

impl MethodStats {
    fn mean(&self) -> f64 {
        if self.errors.is_empty() {
            f64::NAN
        } else {
            self.errors.iter().sum::<f64>() / self.errors.len() as f64
        }
    }

    fn max(&self) -> f64 {
        self.errors.iter().cloned().fold(0.0, f64::max)
    }
}

/// Leave-one-out: train on every sample but `i`, predict `i`.
fn leave_one_out(inputs: &[FeatureVector], outputs: &[Point2D], method: RegressionMethod) -> MethodStats {
    let mut stats = MethodStats::default();
    for i in 0..inputs.len() {
        let train_in: Vec<FeatureVector> =
            inputs.iter().enumerate().filter(|(j, _)| *j != i).map(|(_, x)| x.clone()).collect();
        let train_out: Vec<Point2D> = outputs.iter().enumerate().filter(|(j, _)| *j != i).map(|(_, y)| *y).collect();

        match RegressionEngine::train(&train_in, &train_out) {
            Ok(engine) => stats.errors.push(engine.predict(&inputs[i], method).distance(&outputs[i])),
            Err(_) => stats.failures += 1,
        }
    }
    stats
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: analyze_calibration <run_json>");
        return Ok(());
    }

    let record = RunRecord::load(&args[1])?;
    println!("Analyzing run {}", record.run_id);
    println!("Samples: {}", record.samples.len());
    if record.samples.len() < 6 {
        println!("{}", "Need at least 6 samples (rerun with --dump-samples)".yellow());
        return Ok(());
    }

    if let Some(report) = &record.report {
        println!(
            "Recorded validation: {:.1}px mean over {} points",
            report.mean_error_px,
            report.entries.len()
        );
    }

    let inputs: Vec<FeatureVector> = record.samples.iter().map(|s| s.features.clone()).collect();
    let outputs: Vec<Point2D> = record.samples.iter().map(|s| s.target()).collect();

    println!("--------------------------------------------------");
    println!("{:<8} | {:>10} | {:>10} | {:>8}", "Method", "Mean (px)", "Max (px)", "Failed");
    println!("{}", "-".repeat(50));
    for method in [RegressionMethod::Ridge, RegressionMethod::Hybrid, RegressionMethod::Tps] {
        let stats = leave_one_out(&inputs, &outputs, method);
        println!(
            "{:<8} | {:>10.1} | {:>10.1} | {:>8}",
            method.as_str(),
            stats.mean(),
            stats.max(),
            stats.failures
        );
    }
    println!("--------------------------------------------------");

    Ok(())
}
