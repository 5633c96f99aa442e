//! Outlier rejection for the samples captured at one calibration target.
//!
//! TRIM_TAILS ranks on a single reference dimension (the horizontal pupil
//! offset) while STD_DEV uses whole-vector distance. Both policies keep the
//! surviving samples in their original capture order.

use serde::{Deserialize, Serialize};

use crate::features::REFERENCE_INDEX;
use crate::types::FeatureVector;

/// Buffers smaller than this are passed through untouched.
pub const MIN_CLEAN_SAMPLES: usize = 5;

const MAX_TRIM_FRACTION: f64 = 0.45;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutlierMethod {
    None,
    TrimTails,
    #[default]
    StdDev,
}

/// Returns the subsequence of `buffer` that survives `method`.
///
/// `threshold` is a per-tail fraction for TRIM_TAILS (clamped to
/// `[0, 0.45]`) and a sigma multiplier for STD_DEV.
pub fn clean(buffer: &[FeatureVector], method: OutlierMethod, threshold: f64) -> Vec<FeatureVector> {
    if buffer.len() < MIN_CLEAN_SAMPLES {
        return buffer.to_vec();
    }
    let keep = match method {
        OutlierMethod::None => return buffer.to_vec(),
        OutlierMethod::TrimTails => trim_tails(buffer, threshold),
        OutlierMethod::StdDev => within_std_dev(buffer, threshold),
    };
    buffer
        .iter()
        .zip(keep)
        .filter_map(|(sample, kept)| kept.then(|| sample.clone()))
        .collect()
}

fn trim_tails(buffer: &[FeatureVector], threshold: f64) -> Vec<bool> {
    let n = buffer.len();
    let fraction = if threshold.is_finite() {
        threshold.clamp(0.0, MAX_TRIM_FRACTION)
    } else {
        0.0
    };
    let drop = (n as f64 * fraction).floor() as usize;

    let reference = |i: usize| buffer[i].get(REFERENCE_INDEX).unwrap_or(0.0);
    let mut order: Vec<usize> = (0..n).collect();
    // Stable sort: ties keep capture order so the trim is deterministic.
    order.sort_by(|&a, &b| reference(a).total_cmp(&reference(b)));

    let mut keep = vec![false; n];
    for &i in &order[drop..n - drop] {
        keep[i] = true;
    }
    keep
}

fn within_std_dev(buffer: &[FeatureVector], threshold: f64) -> Vec<bool> {
    let Some(center) = average(buffer) else {
        return vec![true; buffer.len()];
    };
    let distances: Vec<f64> = buffer.iter().map(|s| s.distance(&center)).collect();
    let n = distances.len() as f64;
    let mean = distances.iter().sum::<f64>() / n;
    let variance = distances.iter().map(|d| (d - mean) * (d - mean)).sum::<f64>() / n;
    let limit = mean + threshold * variance.sqrt();

    distances.iter().map(|&d| d <= limit).collect()
}

/// Component-wise arithmetic mean. `None` for an empty buffer.
pub fn average(buffer: &[FeatureVector]) -> Option<FeatureVector> {
    let first = buffer.first()?;
    let mut sum = vec![0.0; first.len()];
    for sample in buffer {
        for (acc, v) in sum.iter_mut().zip(sample.as_slice()) {
            *acc += v;
        }
    }
    let n = buffer.len() as f64;
    Some(FeatureVector::new(sum.into_iter().map(|v| v / n).collect()))
}
