use serde::{Deserialize, Serialize};

use crate::types::{Point2D, ValidationMeasurement};

/// Mean validation error below this many pixels counts as good accuracy.
pub const GOOD_ACCURACY_PX: f64 = 250.0;

const HISTOGRAM_EDGES: [f64; 4] = [50.0, 100.0, 200.0, 500.0];
const HISTOGRAM_LABELS: [&str; 5] = ["0-50px", "50-100px", "100-200px", "200-500px", "500px+"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub range: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub target: Point2D,
    pub predicted: Point2D,
    pub error_px: f64,
}

/// Outcome of the VALIDATION phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyReport {
    pub mean_error_px: f64,
    pub good: bool,
    pub std_dev_px: f64,
    pub max_error_px: f64,
    pub histogram: Vec<HistogramBin>,
    pub entries: Vec<ReportEntry>,
}

impl AccuracyReport {
    pub fn from_measurements(measurements: &[ValidationMeasurement], threshold_px: f64) -> Self {
        let entries: Vec<ReportEntry> = measurements
            .iter()
            .map(|m| ReportEntry { target: m.target, predicted: m.predicted, error_px: m.error() })
            .collect();

        let mut counts = [0usize; 5];
        let mut total = 0.0;
        let mut total_sq = 0.0;
        let mut max_error = 0.0f64;
        for e in &entries {
            total += e.error_px;
            total_sq += e.error_px * e.error_px;
            max_error = max_error.max(e.error_px);
            let bucket = HISTOGRAM_EDGES.iter().position(|&edge| e.error_px < edge).unwrap_or(4);
            counts[bucket] += 1;
        }

        let (mean, std_dev) = if entries.is_empty() {
            (f64::INFINITY, 0.0)
        } else {
            let n = entries.len() as f64;
            let mean = total / n;
            let variance = (total_sq / n - mean * mean).max(0.0);
            (mean, variance.sqrt())
        };

        let histogram = HISTOGRAM_LABELS
            .iter()
            .zip(counts)
            .map(|(label, count)| HistogramBin { range: label.to_string(), count })
            .collect();

        Self {
            mean_error_px: mean,
            good: mean < threshold_px,
            std_dev_px: std_dev,
            max_error_px: max_error,
            histogram,
            entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(err_x: f64) -> ValidationMeasurement {
        ValidationMeasurement {
            predicted: Point2D::new(100.0 + err_x, 100.0),
            target: Point2D::new(100.0, 100.0),
        }
    }

    #[test]
    fn test_summary_metrics() {
        let report = AccuracyReport::from_measurements(&[m(10.0), m(30.0), m(120.0), m(600.0)], GOOD_ACCURACY_PX);
        assert!((report.mean_error_px - 190.0).abs() < 1e-9);
        assert!(report.good);
        assert_eq!(report.max_error_px, 600.0);
        let counts: Vec<usize> = report.histogram.iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![2, 0, 1, 0, 1]);
    }

    #[test]
    fn test_threshold_is_strict() {
        let report = AccuracyReport::from_measurements(&[m(250.0)], GOOD_ACCURACY_PX);
        assert!(!report.good);
        assert_eq!(report.std_dev_px, 0.0);
    }

    #[test]
    fn test_empty_is_not_good() {
        let report = AccuracyReport::from_measurements(&[], GOOD_ACCURACY_PX);
        assert!(!report.good);
        assert!(report.entries.is_empty());
    }
}
