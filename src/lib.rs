pub mod args;
pub mod calibration;
pub mod cleaner;
pub mod config;
pub mod error;
pub mod features;
pub mod layout;
pub mod matrix;
pub mod record;
pub mod regression;
pub mod report;
pub mod session;
pub mod simulation;
pub mod smoothing;
pub mod timer;
pub mod types;

#[cfg(test)]
mod regression_tests;

pub use calibration::{CalibrationController, CalibrationEvent, CalibrationSettings, CalibrationSpeed};
pub use error::{CalibrationError, RegressionError};
pub use regression::{RegressionEngine, RegressionMethod};
pub use report::AccuracyReport;
pub use session::{FrameInput, GazeSession, SessionMode, SessionUpdate};
pub use smoothing::{FilterConfig, GazeSmoother, SmoothingMethod};
pub use types::{FeatureVector, Point2D, Viewport};
