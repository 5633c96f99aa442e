use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// A point on screen, in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub const ZERO: Point2D = Point2D { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point2D) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Point2D {
    type Output = Point2D;
    fn add(self, rhs: Point2D) -> Point2D {
        Point2D::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point2D {
    type Output = Point2D;
    fn sub(self, rhs: Point2D) -> Point2D {
        Point2D::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// Fixed-length numeric encoding of one frame's eye/head geometry.
///
/// Immutable once built; the length is fixed by the feature scheme and must
/// match between training and prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.0.get(index).copied()
    }

    pub fn distance(&self, other: &FeatureVector) -> f64 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt()
    }
}

impl From<Vec<f64>> for FeatureVector {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

/// Screen size the calibration targets are scaled against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Maps a percentage position onto the viewport.
    pub fn to_screen(&self, x_percent: f64, y_percent: f64) -> Point2D {
        Point2D::new(
            x_percent / 100.0 * self.width,
            y_percent / 100.0 * self.height,
        )
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(1920.0, 1080.0)
    }
}

/// A calibration target. `id` is a label only; identity is the position in
/// the phase's sequence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    pub id: u32,
    pub x: f64,
    pub y: f64,
}

impl CalibrationPoint {
    pub const fn new(id: u32, x: f64, y: f64) -> Self {
        Self { id, x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CalibrationPhase {
    InitialMapping,
    FineTuning,
    Validation,
}

impl CalibrationPhase {
    /// Phases run strictly in this order.
    pub fn next(self) -> Option<CalibrationPhase> {
        match self {
            Self::InitialMapping => Some(Self::FineTuning),
            Self::FineTuning => Some(Self::Validation),
            Self::Validation => None,
        }
    }

    pub fn collects_training_data(self) -> bool {
        !matches!(self, Self::Validation)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InitialMapping => "initial-mapping",
            Self::FineTuning => "fine-tuning",
            Self::Validation => "validation",
        }
    }
}

impl fmt::Display for CalibrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ground-truth pair gathered during INITIAL_MAPPING / FINE_TUNING.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSample {
    pub screen_x: f64,
    pub screen_y: f64,
    pub features: FeatureVector,
}

impl TrainingSample {
    pub fn target(&self) -> Point2D {
        Point2D::new(self.screen_x, self.screen_y)
    }
}

/// One VALIDATION point outcome. Never fed back into training.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationMeasurement {
    pub predicted: Point2D,
    pub target: Point2D,
}

impl ValidationMeasurement {
    pub fn error(&self) -> f64 {
        self.predicted.distance(&self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewport_scaling() {
        let vp = Viewport::new(1000.0, 500.0);
        assert_eq!(vp.to_screen(50.0, 50.0), Point2D::new(500.0, 250.0));
        assert_eq!(vp.to_screen(10.0, 90.0), Point2D::new(100.0, 450.0));
    }

    #[test]
    fn test_phase_order() {
        assert_eq!(CalibrationPhase::InitialMapping.next(), Some(CalibrationPhase::FineTuning));
        assert_eq!(CalibrationPhase::FineTuning.next(), Some(CalibrationPhase::Validation));
        assert_eq!(CalibrationPhase::Validation.next(), None);
        assert!(!CalibrationPhase::Validation.collects_training_data());
    }

    #[test]
    fn test_feature_distance() {
        let a = FeatureVector::new(vec![1.0, 0.0, 0.0]);
        let b = FeatureVector::new(vec![1.0, 3.0, 4.0]);
        assert!((a.distance(&b) - 5.0).abs() < 1e-12);
    }
}
