//! Synthetic subject for running the full pipeline without a camera.
//!
//! The eye model maps screen position to pupil offsets with a small
//! non-linear disagreement between the two eyes, then adds Gaussian
//! jitter, occasional blinks and occasional wild frames. Seeded, so runs
//! are reproducible.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::features::{EyeGeometry, FeatureBuilder, FeatureLayout};
use crate::session::FrameInput;
use crate::types::{Point2D, Viewport};

const EPSILON: f64 = 1e-12;
/// Screen fraction from centre that maps to a unit pupil offset.
const OFFSET_SPAN: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SubjectProfile {
    pub seed: u64,
    /// Std dev of per-frame pupil jitter, in offset units.
    pub noise: f64,
    pub blink_rate: f64,
    pub outlier_rate: f64,
    pub head_pose: bool,
}

impl Default for SubjectProfile {
    fn default() -> Self {
        Self { seed: 42, noise: 0.01, blink_rate: 0.02, outlier_rate: 0.03, head_pose: true }
    }
}

#[derive(Debug, Clone)]
pub struct SyntheticSubject {
    profile: SubjectProfile,
    viewport: Viewport,
    builder: FeatureBuilder,
    rng: ChaCha8Rng,
    gaze: Point2D,
}

impl SyntheticSubject {
    pub fn new(profile: SubjectProfile, viewport: Viewport) -> Self {
        Self {
            builder: FeatureBuilder::new(FeatureLayout { head_pose: profile.head_pose }),
            rng: ChaCha8Rng::seed_from_u64(profile.seed),
            gaze: Point2D::new(viewport.width / 2.0, viewport.height / 2.0),
            profile,
            viewport,
        }
    }

    pub fn profile(&self) -> &SubjectProfile {
        &self.profile
    }

    pub fn gaze(&self) -> Point2D {
        self.gaze
    }

    pub fn look_at(&mut self, target: Point2D) {
        self.gaze = target;
    }

    /// Noise-free geometry for the current gaze point.
    pub fn eye_geometry(&self) -> EyeGeometry {
        let u = (self.gaze.x / self.viewport.width - 0.5) / OFFSET_SPAN;
        let v = (self.gaze.y / self.viewport.height - 0.5) / OFFSET_SPAN;
        EyeGeometry {
            left_offset: (u, v),
            right_offset: (0.95 * u + 0.1 * u * v, 0.9 * v + 0.1 * u * u),
            head_pose: Some((4.0 * u, 3.0 * v)),
        }
    }

    pub fn frame(&mut self, timestamp_ms: f64) -> FrameInput {
        let blinking = self.rng.gen::<f64>() < self.profile.blink_rate;
        let mut eyes = self.eye_geometry();

        let n = self.profile.noise;
        eyes.left_offset.0 += n * self.sample_normal();
        eyes.left_offset.1 += n * self.sample_normal();
        eyes.right_offset.0 += n * self.sample_normal();
        eyes.right_offset.1 += n * self.sample_normal();

        if self.rng.gen::<f64>() < self.profile.outlier_rate {
            // Landmark glitch: both pupils jump the same way.
            let jump = self.rng.gen_range(0.5..1.0) * if self.rng.gen::<bool>() { 1.0 } else { -1.0 };
            eyes.left_offset.0 += jump;
            eyes.right_offset.0 += jump;
        }

        FrameInput { timestamp_ms, features: self.builder.build(&eyes), blinking }
    }

    fn sample_normal(&mut self) -> f64 {
        let u1: f64 = self.rng.gen::<f64>().max(EPSILON);
        let u2: f64 = self.rng.gen();
        (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
    }
}

/// Slow elliptical sweep around the screen centre, used for the tracking
/// part of a simulated run.
pub fn orbit(viewport: &Viewport, t_sec: f64) -> Point2D {
    let t = t_sec * 0.8;
    Point2D::new(
        viewport.width / 2.0 + t.cos() * viewport.width * 0.3,
        viewport.height / 2.0 + t.sin() * viewport.height * 0.3,
    )
}
