use serde::{Deserialize, Serialize};

use crate::types::FeatureVector;

// =========================================================================
// Feature Scheme
// =========================================================================
// [0]    bias (always 1.0)
// [1..5] left dx, left dy, right dx, right dy  (normalized pupil offsets, -1..1)
// [5]    radius of the mean offset
// [6]    product of the mean offset components
// [7..9] head yaw / 90, head pitch / 90       (only with head pose)

pub const BIAS_INDEX: usize = 0;

/// Dimension sorted on by TRIM_TAILS: the first non-bias feature (left eye
/// horizontal offset).
pub const REFERENCE_INDEX: usize = 1;

/// The two eyes' relative pupil-offset pairs. Thin-plate splines work in
/// this subspace only.
pub const REDUCED_RANGE: std::ops::Range<usize> = 1..5;
pub const REDUCED_DIM: usize = 4;

const HEAD_POSE_SCALE: f64 = 90.0;

/// Which optional terms the upstream extractor appends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureLayout {
    pub head_pose: bool,
}

impl FeatureLayout {
    pub fn len(&self) -> usize {
        if self.head_pose {
            9
        } else {
            7
        }
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl Default for FeatureLayout {
    fn default() -> Self {
        Self { head_pose: true }
    }
}

/// Per-frame eye geometry as delivered by the landmark service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EyeGeometry {
    pub left_offset: (f64, f64),
    pub right_offset: (f64, f64),
    /// Yaw / pitch in degrees.
    pub head_pose: Option<(f64, f64)>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureBuilder {
    layout: FeatureLayout,
}

impl FeatureBuilder {
    pub fn new(layout: FeatureLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> FeatureLayout {
        self.layout
    }

    pub fn build(&self, eyes: &EyeGeometry) -> FeatureVector {
        let (lx, ly) = eyes.left_offset;
        let (rx, ry) = eyes.right_offset;
        let ax = (lx + rx) / 2.0;
        let ay = (ly + ry) / 2.0;

        let mut values = Vec::with_capacity(self.layout.len());
        values.push(1.0);
        values.extend_from_slice(&[lx, ly, rx, ry]);
        values.push((ax * ax + ay * ay).sqrt());
        values.push(ax * ay);

        if self.layout.head_pose {
            // Missing pose is treated as facing the screen.
            let (yaw, pitch) = eyes.head_pose.unwrap_or((0.0, 0.0));
            values.push(yaw / HEAD_POSE_SCALE);
            values.push(pitch / HEAD_POSE_SCALE);
        }

        FeatureVector::new(values)
    }
}

/// Projects a full feature vector onto the reduced TPS subspace.
/// Returns `None` when the vector is too short to carry both eyes.
pub fn reduce(features: &FeatureVector) -> Option<[f64; REDUCED_DIM]> {
    let slice = features.as_slice().get(REDUCED_RANGE)?;
    let mut out = [0.0; REDUCED_DIM];
    out.copy_from_slice(slice);
    Some(out)
}
