use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::calibration::{CalibrationController, CalibrationEvent, CalibrationSettings};
use crate::regression::{RegressionEngine, RegressionMethod};
use crate::report::AccuracyReport;
use crate::smoothing::{FilterConfig, GazeSmoother};
use crate::types::{FeatureVector, Point2D, Viewport};

/// One feature frame from the upstream landmark extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameInput {
    pub timestamp_ms: f64,
    pub features: FeatureVector,
    #[serde(default)]
    pub blinking: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionMode {
    /// No usable model yet, or the last calibration aborted.
    NeedsCalibration,
    Calibrating,
    Tracking,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GazeOutput {
    pub timestamp_ms: f64,
    pub raw: Point2D,
    pub smoothed: Point2D,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    Calibration(CalibrationEvent),
    Gaze(GazeOutput),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub frames: u64,
    pub blinks_skipped: u64,
    pub gaze_points: u64,
}

// ===== Session =====

/// Routes frames to calibration or live tracking and owns the model handoff
/// between the two.
#[derive(Debug)]
pub struct GazeSession {
    controller: CalibrationController,
    engine: RegressionEngine,
    smoother: GazeSmoother,
    regression_method: RegressionMethod,
    mode: SessionMode,
    last_report: Option<AccuracyReport>,
    stats: SessionStats,
}

impl GazeSession {
    pub fn new(settings: CalibrationSettings, filter: FilterConfig, viewport: Viewport) -> Self {
        Self {
            regression_method: settings.regression_method,
            controller: CalibrationController::new(settings, viewport),
            engine: RegressionEngine::new(),
            smoother: GazeSmoother::new(filter),
            mode: SessionMode::NeedsCalibration,
            last_report: None,
            stats: SessionStats::default(),
        }
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn controller(&self) -> &CalibrationController {
        &self.controller
    }

    pub fn engine(&self) -> &RegressionEngine {
        &self.engine
    }

    pub fn last_report(&self) -> Option<&AccuracyReport> {
        self.last_report.as_ref()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn filter_config(&self) -> &FilterConfig {
        self.smoother.config()
    }

    /// Most recent smoothed gaze point, `None` right after a reset.
    pub fn last_smoothed(&self) -> Option<Point2D> {
        self.smoother.last_output()
    }

    /// Live filter changes keep the smoother's history.
    pub fn update_filter_config(&mut self, config: FilterConfig) {
        self.smoother.update_config(config);
    }

    pub fn set_regression_method(&mut self, method: RegressionMethod) {
        self.regression_method = method;
        let mut settings = *self.controller.settings();
        settings.regression_method = method;
        self.controller.update_settings(settings);
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.controller.set_viewport(viewport);
    }

    /// Tracking stops until the new calibration validates.
    pub fn start_calibration(&mut self, now_ms: f64) -> Vec<SessionUpdate> {
        self.mode = SessionMode::Calibrating;
        self.controller
            .start(now_ms)
            .into_iter()
            .map(SessionUpdate::Calibration)
            .collect()
    }

    pub fn abort_calibration(&mut self) {
        if self.mode == SessionMode::Calibrating {
            self.controller.abort();
            if self.engine.is_ready() {
                // Filter history predates the recalibration attempt.
                self.smoother.reset();
                self.mode = SessionMode::Tracking;
            } else {
                self.mode = SessionMode::NeedsCalibration;
            }
        }
    }

    /// Advances calibration windows without a frame.
    pub fn tick(&mut self, now_ms: f64) -> Vec<SessionUpdate> {
        if self.mode != SessionMode::Calibrating {
            return Vec::new();
        }
        let events = self.controller.tick(now_ms);
        self.absorb(events)
    }

    pub fn process(&mut self, frame: &FrameInput) -> Vec<SessionUpdate> {
        self.stats.frames += 1;
        if frame.blinking {
            self.stats.blinks_skipped += 1;
            return self.tick(frame.timestamp_ms);
        }

        match self.mode {
            SessionMode::Calibrating => {
                let events = self.controller.process_frame(&frame.features, frame.timestamp_ms);
                self.absorb(events)
            }
            SessionMode::Tracking => self.track(frame).map(SessionUpdate::Gaze).into_iter().collect(),
            SessionMode::NeedsCalibration => Vec::new(),
        }
    }

    fn track(&mut self, frame: &FrameInput) -> Option<GazeOutput> {
        if !self.engine.is_ready() {
            return None;
        }
        let raw = self.engine.predict(&frame.features, self.regression_method);
        if !raw.is_finite() {
            debug!("Dropping non-finite prediction at {:.0}ms", frame.timestamp_ms);
            return None;
        }
        let smoothed = self.smoother.smooth(raw, frame.timestamp_ms);
        self.stats.gaze_points += 1;
        Some(GazeOutput { timestamp_ms: frame.timestamp_ms, raw, smoothed })
    }

    fn absorb(&mut self, events: Vec<CalibrationEvent>) -> Vec<SessionUpdate> {
        for event in &events {
            match event {
                CalibrationEvent::ValidationCompleted(report) => {
                    self.engine = self.controller.take_engine();
                    self.smoother.reset();
                    self.last_report = Some(report.clone());
                    self.mode = SessionMode::Tracking;
                    info!("Tracking with {} model", self.regression_method.as_str());
                }
                CalibrationEvent::Aborted(err) => {
                    warn!("Calibration must be restarted: {}", err);
                    self.engine = RegressionEngine::new();
                    self.mode = SessionMode::NeedsCalibration;
                }
                _ => {}
            }
        }
        events.into_iter().map(SessionUpdate::Calibration).collect()
    }
}
