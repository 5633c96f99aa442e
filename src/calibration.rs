use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::mem;
use tracing::{debug, error, info, warn};

use crate::cleaner::{self, OutlierMethod};
use crate::error::CalibrationError;
use crate::layout::{self, DEFAULT_EDGE_MARGIN};
use crate::regression::{RegressionEngine, RegressionMethod};
use crate::report::{AccuracyReport, GOOD_ACCURACY_PX};
use crate::timer::{WindowEvent, WindowKind, WindowScheduler};
use crate::types::{
    CalibrationPhase, CalibrationPoint, FeatureVector, Point2D, TrainingSample, ValidationMeasurement,
    Viewport,
};

pub const BASE_PREP_MS: f64 = 800.0;
pub const BASE_CAPTURE_MS: f64 = 1200.0;

/// Points with fewer clean samples than this are captured again.
pub const MIN_POINT_SAMPLES: usize = 5;
/// Fewer accumulated samples than this at a phase boundary is fatal.
pub const MIN_TRAINING_SAMPLES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CalibrationSpeed {
    Fast,
    #[default]
    Normal,
    Slow,
}

impl CalibrationSpeed {
    pub fn multiplier(&self) -> f64 {
        match self {
            Self::Fast => 0.5,
            Self::Normal => 1.0,
            Self::Slow => 1.5,
        }
    }

    pub fn prep_ms(&self) -> f64 {
        BASE_PREP_MS * self.multiplier()
    }

    pub fn capture_ms(&self) -> f64 {
        BASE_CAPTURE_MS * self.multiplier()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CalibrationSettings {
    pub speed: CalibrationSpeed,
    pub outlier_method: OutlierMethod,
    pub outlier_threshold: f64,
    /// Predictor used for the VALIDATION phase.
    pub regression_method: RegressionMethod,
    /// Percent inset of the FINE_TUNING grid from the screen edges.
    pub edge_margin: f64,
    pub accuracy_threshold_px: f64,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            speed: CalibrationSpeed::Normal,
            outlier_method: OutlierMethod::StdDev,
            outlier_threshold: 2.0,
            regression_method: RegressionMethod::Hybrid,
            edge_margin: DEFAULT_EDGE_MARGIN,
            accuracy_threshold_px: GOOD_ACCURACY_PX,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowStage {
    Prep,
    Capture,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationState {
    Idle,
    Running {
        phase: CalibrationPhase,
        point_index: usize,
        stage: WindowStage,
    },
    Complete(AccuracyReport),
    Aborted(CalibrationError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationEvent {
    PointStarted { phase: CalibrationPhase, index: usize, target: Point2D },
    CaptureStarted { phase: CalibrationPhase, index: usize },
    /// Too few clean samples; the same point runs again.
    PointRetried { phase: CalibrationPhase, index: usize, kept: usize },
    PointCompleted { phase: CalibrationPhase, index: usize, kept: usize },
    PhaseCompleted { phase: CalibrationPhase, training_samples: usize },
    ValidationCompleted(AccuracyReport),
    /// Fatal; the caller must restart calibration.
    Aborted(CalibrationError),
}

/// Three-phase calibration state machine.
///
/// Driven by frame timestamps: `process_frame` / `tick` fire whatever
/// window deadlines have passed before acting on the frame. Owns the
/// training accumulator and the regression engine for one session.
#[derive(Debug)]
pub struct CalibrationController {
    settings: CalibrationSettings,
    viewport: Viewport,
    state: CalibrationState,
    points: Vec<CalibrationPoint>,
    scheduler: WindowScheduler,
    buffer: Vec<FeatureVector>,
    samples: Vec<TrainingSample>,
    validation: Vec<ValidationMeasurement>,
    engine: RegressionEngine,
    retries: usize,
}

impl CalibrationController {
    pub fn new(settings: CalibrationSettings, viewport: Viewport) -> Self {
        Self {
            settings,
            viewport,
            state: CalibrationState::Idle,
            points: Vec::new(),
            scheduler: WindowScheduler::new(),
            buffer: Vec::new(),
            samples: Vec::new(),
            validation: Vec::new(),
            engine: RegressionEngine::new(),
            retries: 0,
        }
    }

    pub fn settings(&self) -> &CalibrationSettings {
        &self.settings
    }

    /// Takes effect from the next window onwards.
    pub fn update_settings(&mut self, settings: CalibrationSettings) {
        self.settings = settings;
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    pub fn state(&self) -> &CalibrationState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, CalibrationState::Running { .. })
    }

    pub fn phase(&self) -> Option<CalibrationPhase> {
        match self.state {
            CalibrationState::Running { phase, .. } => Some(phase),
            _ => None,
        }
    }

    pub fn current_point(&self) -> Option<&CalibrationPoint> {
        match self.state {
            CalibrationState::Running { point_index, .. } => self.points.get(point_index),
            _ => None,
        }
    }

    pub fn current_target(&self) -> Option<Point2D> {
        self.current_point().map(|p| self.viewport.to_screen(p.x, p.y))
    }

    /// Frames captured so far for the current point.
    pub fn captured(&self) -> usize {
        self.buffer.len()
    }

    pub fn training_samples(&self) -> &[TrainingSample] {
        &self.samples
    }

    pub fn validation_measurements(&self) -> &[ValidationMeasurement] {
        &self.validation
    }

    pub fn engine(&self) -> &RegressionEngine {
        &self.engine
    }

    /// Hands the trained engine to the caller, leaving an untrained one.
    pub fn take_engine(&mut self) -> RegressionEngine {
        mem::take(&mut self.engine)
    }

    pub fn retries(&self) -> usize {
        self.retries
    }

    /// (Re)starts from INITIAL_MAPPING, discarding everything collected.
    pub fn start(&mut self, now_ms: f64) -> Vec<CalibrationEvent> {
        self.reset_session();
        info!(
            "Calibration started (speed {:?}, outliers {:?} @ {})",
            self.settings.speed, self.settings.outlier_method, self.settings.outlier_threshold
        );
        let mut events = Vec::new();
        self.enter_phase(CalibrationPhase::InitialMapping, now_ms, &mut events);
        events
    }

    /// Stops immediately; pending windows are cancelled and data dropped.
    pub fn abort(&mut self) {
        if self.is_running() {
            info!("Calibration aborted by caller");
        }
        self.reset_session();
    }

    pub fn tick(&mut self, now_ms: f64) -> Vec<CalibrationEvent> {
        let mut events = Vec::new();
        self.advance(now_ms, &mut events);
        events
    }

    pub fn process_frame(&mut self, features: &FeatureVector, now_ms: f64) -> Vec<CalibrationEvent> {
        let mut events = Vec::new();
        self.advance(now_ms, &mut events);
        if let CalibrationState::Running { stage: WindowStage::Capture, .. } = self.state {
            self.buffer.push(features.clone());
        }
        events
    }

    // =====================================================================
    // Internals
    // =====================================================================

    fn reset_session(&mut self) {
        self.scheduler.cancel();
        self.state = CalibrationState::Idle;
        self.points.clear();
        self.buffer.clear();
        self.samples.clear();
        self.validation.clear();
        self.engine = RegressionEngine::new();
        self.retries = 0;
    }

    fn advance(&mut self, now_ms: f64, events: &mut Vec<CalibrationEvent>) {
        while let Some(event) = self.scheduler.poll(now_ms) {
            if !self.scheduler.is_current(&event.token) {
                debug!("Dropping stale window event {:?}", event.token);
                continue;
            }
            self.handle(event, now_ms, events);
        }
    }

    fn handle(&mut self, event: WindowEvent, now_ms: f64, events: &mut Vec<CalibrationEvent>) {
        let CalibrationState::Running { phase, point_index, .. } = self.state else {
            return;
        };
        if event.token.phase != phase || event.token.point_index != point_index {
            return;
        }

        match event.kind {
            WindowKind::PrepElapsed => {
                self.buffer.clear();
                self.state = CalibrationState::Running { phase, point_index, stage: WindowStage::Capture };
                events.push(CalibrationEvent::CaptureStarted { phase, index: point_index });
            }
            WindowKind::CaptureElapsed => {
                // Follow-ups chain from the due time unless the caller stalled past a
                // whole window; then they restart from now so missed windows are not replayed.
                let window_ms = self.settings.speed.prep_ms() + self.settings.speed.capture_ms();
                let anchor = if now_ms - event.due_ms > window_ms { now_ms } else { event.due_ms };
                if anchor != event.due_ms {
                    debug!("{} point {}: {:.0}ms late, re-anchoring", phase, point_index, now_ms - event.due_ms);
                }
                self.finish_point(phase, point_index, anchor, events);
            }
        }
    }

    fn enter_phase(&mut self, phase: CalibrationPhase, now_ms: f64, events: &mut Vec<CalibrationEvent>) {
        self.points = layout::points_for(phase, self.settings.edge_margin);
        self.begin_point(phase, 0, now_ms, events);
    }

    fn begin_point(
        &mut self,
        phase: CalibrationPhase,
        index: usize,
        now_ms: f64,
        events: &mut Vec<CalibrationEvent>,
    ) {
        self.buffer.clear();
        self.state = CalibrationState::Running { phase, point_index: index, stage: WindowStage::Prep };
        let speed = self.settings.speed;
        self.scheduler.arm(phase, index, now_ms, speed.prep_ms(), speed.capture_ms());

        let target = self
            .points
            .get(index)
            .map(|p| self.viewport.to_screen(p.x, p.y))
            .unwrap_or_default();
        events.push(CalibrationEvent::PointStarted { phase, index, target });
    }

    fn finish_point(
        &mut self,
        phase: CalibrationPhase,
        index: usize,
        now_ms: f64,
        events: &mut Vec<CalibrationEvent>,
    ) {
        let captured = mem::take(&mut self.buffer);
        let cleaned = cleaner::clean(&captured, self.settings.outlier_method, self.settings.outlier_threshold);
        let kept = cleaned.len();

        let representative = match cleaner::average(&cleaned) {
            Some(avg) if kept >= MIN_POINT_SAMPLES => avg,
            _ => {
                warn!(
                    "{} point {}: {} of {} samples usable, retrying",
                    phase,
                    index,
                    kept,
                    captured.len()
                );
                self.retries += 1;
                events.push(CalibrationEvent::PointRetried { phase, index, kept });
                self.begin_point(phase, index, now_ms, events);
                return;
            }
        };

        let Some(point) = self.points.get(index).copied() else {
            return;
        };
        let target = self.viewport.to_screen(point.x, point.y);

        if phase.collects_training_data() {
            self.samples.push(TrainingSample {
                screen_x: target.x,
                screen_y: target.y,
                features: representative,
            });
        } else {
            let predicted = self.engine.predict(&representative, self.settings.regression_method);
            self.validation.push(ValidationMeasurement { predicted, target });
        }
        events.push(CalibrationEvent::PointCompleted { phase, index, kept });

        if index + 1 < self.points.len() {
            self.begin_point(phase, index + 1, now_ms, events);
        } else {
            self.complete_phase(phase, now_ms, events);
        }
    }

    fn complete_phase(&mut self, phase: CalibrationPhase, now_ms: f64, events: &mut Vec<CalibrationEvent>) {
        if !phase.collects_training_data() {
            self.scheduler.cancel();
            let report = AccuracyReport::from_measurements(&self.validation, self.settings.accuracy_threshold_px);
            info!(
                "Validation complete: mean error {:.1}px ({})",
                report.mean_error_px,
                if report.good { "good" } else { "poor" }
            );
            self.state = CalibrationState::Complete(report.clone());
            events.push(CalibrationEvent::ValidationCompleted(report));
            return;
        }

        if self.samples.len() < MIN_TRAINING_SAMPLES {
            self.fail(CalibrationError::InsufficientTrainingSamples { count: self.samples.len() }, events);
            return;
        }

        let inputs: Vec<FeatureVector> = self.samples.iter().map(|s| s.features.clone()).collect();
        let outputs: Vec<Point2D> = self.samples.iter().map(TrainingSample::target).collect();
        match RegressionEngine::train(&inputs, &outputs) {
            Ok(engine) => self.engine = engine,
            Err(e) => {
                self.fail(CalibrationError::Regression(e), events);
                return;
            }
        }

        info!(
            "Phase {} complete: {} training samples, tps ready: {}",
            phase,
            self.samples.len(),
            self.engine.is_tps_ready()
        );
        events.push(CalibrationEvent::PhaseCompleted { phase, training_samples: self.samples.len() });

        if let Some(next) = phase.next() {
            self.enter_phase(next, now_ms, events);
        }
    }

    fn fail(&mut self, err: CalibrationError, events: &mut Vec<CalibrationEvent>) {
        error!("Calibration aborted: {}", err);
        self.reset_session();
        self.state = CalibrationState::Aborted(err.clone());
        events.push(CalibrationEvent::Aborted(err));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegressionError;

    const FRAME_MS: f64 = 25.0;

    fn viewport() -> Viewport {
        Viewport::new(1920.0, 1080.0)
    }

    /// Noise-free eye model, unit offsets at the 10%/90% edges, with a
    /// slight right-eye curvature.
    fn features_for(target: Point2D) -> FeatureVector {
        let u = (target.x / 1920.0 - 0.5) / 0.4;
        let v = (target.y / 1080.0 - 0.5) / 0.4;
        let lx = u;
        let ly = v;
        let rx = 0.95 * u + 0.1 * u * v;
        let ry = 0.9 * v + 0.1 * u * u;
        let ax = (lx + rx) / 2.0;
        let ay = (ly + ry) / 2.0;
        FeatureVector::new(vec![1.0, lx, ly, rx, ry, (ax * ax + ay * ay).sqrt(), ax * ay])
    }

    /// Feeds frames looking at the current target until `until_ms`.
    fn run(ctrl: &mut CalibrationController, from_ms: f64, until_ms: f64) -> (f64, Vec<CalibrationEvent>) {
        let mut t = from_ms;
        let mut events = Vec::new();
        while t < until_ms {
            let target = ctrl.current_target().unwrap_or_default();
            events.extend(ctrl.process_frame(&features_for(target), t));
            t += FRAME_MS;
        }
        (t, events)
    }

    fn fast_settings() -> CalibrationSettings {
        CalibrationSettings { speed: CalibrationSpeed::Fast, ..CalibrationSettings::default() }
    }

    #[test]
    fn test_speed_multipliers() {
        assert_eq!(CalibrationSpeed::Fast.prep_ms(), 400.0);
        assert_eq!(CalibrationSpeed::Normal.capture_ms(), 1200.0);
        assert_eq!(CalibrationSpeed::Slow.prep_ms(), 1200.0);
        assert_eq!(CalibrationSpeed::Slow.capture_ms(), 1800.0);
    }

    #[test]
    fn test_start_enters_initial_mapping() {
        let mut ctrl = CalibrationController::new(CalibrationSettings::default(), viewport());
        let events = ctrl.start(0.0);
        assert_eq!(
            events,
            vec![CalibrationEvent::PointStarted {
                phase: CalibrationPhase::InitialMapping,
                index: 0,
                target: Point2D::new(960.0, 540.0),
            }]
        );
        assert_eq!(ctrl.phase(), Some(CalibrationPhase::InitialMapping));
    }

    #[test]
    fn test_prep_window_collects_nothing() {
        let mut ctrl = CalibrationController::new(CalibrationSettings::default(), viewport());
        ctrl.start(0.0);
        run(&mut ctrl, 0.0, 790.0);
        assert_eq!(ctrl.captured(), 0);

        let events = ctrl.process_frame(&features_for(Point2D::new(960.0, 540.0)), 800.0);
        assert!(events.contains(&CalibrationEvent::CaptureStarted {
            phase: CalibrationPhase::InitialMapping,
            index: 0
        }));
        assert_eq!(ctrl.captured(), 1);
    }

    #[test]
    fn test_point_retried_without_samples() {
        let mut ctrl = CalibrationController::new(CalibrationSettings::default(), viewport());
        ctrl.start(0.0);
        // No frames at all: capture window ends empty.
        let events = ctrl.tick(2000.0);
        assert!(events.contains(&CalibrationEvent::PointRetried {
            phase: CalibrationPhase::InitialMapping,
            index: 0,
            kept: 0
        }));
        assert_eq!(ctrl.retries(), 1);
        assert!(ctrl.training_samples().is_empty());
        assert!(matches!(
            ctrl.state(),
            CalibrationState::Running { point_index: 0, stage: WindowStage::Prep, .. }
        ));

        // Restarted windows run from the old capture deadline.
        let (_, events) = run(&mut ctrl, 2000.0, 4001.0);
        assert!(events.iter().any(|e| matches!(e, CalibrationEvent::PointCompleted { index: 0, .. })));
        assert_eq!(ctrl.training_samples().len(), 1);
    }

    #[test]
    fn test_long_stall_costs_one_retry() {
        let mut ctrl = CalibrationController::new(CalibrationSettings::default(), viewport());
        ctrl.start(0.0);
        let target = ctrl.current_target().unwrap();
        assert!(ctrl.process_frame(&features_for(target), 10.0).is_empty());

        // An hour without frames: the missed windows are not replayed.
        let resumed = 3_600_000.0;
        let events = ctrl.process_frame(&features_for(target), resumed);
        assert_eq!(
            events,
            vec![
                CalibrationEvent::CaptureStarted { phase: CalibrationPhase::InitialMapping, index: 0 },
                CalibrationEvent::PointRetried { phase: CalibrationPhase::InitialMapping, index: 0, kept: 0 },
                CalibrationEvent::PointStarted { phase: CalibrationPhase::InitialMapping, index: 0, target },
            ]
        );
        assert_eq!(ctrl.retries(), 1);
        assert!(matches!(
            ctrl.state(),
            CalibrationState::Running { point_index: 0, stage: WindowStage::Prep, .. }
        ));

        // The retried point gets a full window measured from the resume time.
        let (_, events) = run(&mut ctrl, resumed, resumed + 1975.0);
        assert!(!events.iter().any(|e| matches!(e, CalibrationEvent::PointCompleted { .. })));
        let (_, events) = run(&mut ctrl, resumed + 1975.0, resumed + 2001.0);
        assert!(events.iter().any(|e| matches!(e, CalibrationEvent::PointCompleted { index: 0, .. })));
        assert_eq!(ctrl.retries(), 1);
        assert_eq!(ctrl.training_samples().len(), 1);
    }

    #[test]
    fn test_retry_keeps_previous_points() {
        let mut ctrl = CalibrationController::new(CalibrationSettings::default(), viewport());
        ctrl.start(0.0);
        let (t, _) = run(&mut ctrl, 0.0, 2001.0);
        assert_eq!(ctrl.training_samples().len(), 1);

        // Point 1 gets only three frames.
        let target = ctrl.current_target().unwrap();
        for i in 0..3 {
            ctrl.process_frame(&features_for(target), t + 850.0 + i as f64 * FRAME_MS);
        }
        let events = ctrl.tick(t + 2100.0);
        assert!(events.contains(&CalibrationEvent::PointRetried {
            phase: CalibrationPhase::InitialMapping,
            index: 1,
            kept: 3
        }));
        assert_eq!(ctrl.training_samples().len(), 1);
    }

    #[test]
    fn test_abort_cancels_pending_windows() {
        let mut ctrl = CalibrationController::new(CalibrationSettings::default(), viewport());
        ctrl.start(0.0);
        run(&mut ctrl, 0.0, 1500.0);
        ctrl.abort();
        assert!(ctrl.tick(1e7).is_empty());
        assert_eq!(ctrl.state(), &CalibrationState::Idle);
        assert_eq!(ctrl.captured(), 0);
    }

    #[test]
    fn test_restart_discards_stale_timers() {
        let mut ctrl = CalibrationController::new(CalibrationSettings::default(), viewport());
        ctrl.start(0.0);
        run(&mut ctrl, 0.0, 1000.0);
        // Restart mid-capture; the original capture deadline (2000) must not fire.
        ctrl.start(1000.0);
        let events = ctrl.tick(2100.0);
        assert_eq!(
            events,
            vec![CalibrationEvent::CaptureStarted { phase: CalibrationPhase::InitialMapping, index: 0 }]
        );
        assert_eq!(ctrl.retries(), 0);
        assert!(matches!(
            ctrl.state(),
            CalibrationState::Running { point_index: 0, stage: WindowStage::Capture, .. }
        ));
    }

    #[test]
    fn test_initial_mapping_trains_engine() {
        let mut ctrl = CalibrationController::new(fast_settings(), viewport());
        ctrl.start(0.0);
        let (_, events) = run(&mut ctrl, 0.0, 5.0 * 1000.0 + 1.0);

        assert!(events.contains(&CalibrationEvent::PhaseCompleted {
            phase: CalibrationPhase::InitialMapping,
            training_samples: 5
        }));
        assert_eq!(ctrl.phase(), Some(CalibrationPhase::FineTuning));
        assert!(ctrl.engine().is_ready());

        for sample in ctrl.training_samples() {
            let p = ctrl.engine().predict(&sample.features, RegressionMethod::Ridge);
            assert!(p.distance(&sample.target()) < 5.0, "ridge error {:.2}", p.distance(&sample.target()));
        }
    }

    #[test]
    fn test_full_session_reports_accuracy() {
        let mut ctrl = CalibrationController::new(fast_settings(), viewport());
        ctrl.start(0.0);
        // 25 points at 1s each
        let (_, events) = run(&mut ctrl, 0.0, 25.0 * 1000.0 + 1.0);

        let report = events
            .iter()
            .find_map(|e| match e {
                CalibrationEvent::ValidationCompleted(r) => Some(r.clone()),
                _ => None,
            })
            .expect("validation did not complete");
        assert_eq!(report.entries.len(), 4);
        assert!(report.good);
        assert!(report.mean_error_px < 20.0, "mean error {:.2}", report.mean_error_px);
        assert_eq!(ctrl.training_samples().len(), 21);
        assert!(matches!(ctrl.state(), CalibrationState::Complete(_)));

        // Terminal: nothing else fires.
        assert!(ctrl.tick(1e9).is_empty());
    }

    #[test]
    fn test_training_failure_is_fatal() {
        let mut ctrl = CalibrationController::new(fast_settings(), viewport());
        ctrl.start(0.0);
        let mut t = 0.0;
        let mut events = Vec::new();
        while t < 5001.0 {
            let target = ctrl.current_target().unwrap_or_default();
            let mut f = features_for(target).as_slice().to_vec();
            // The centre point reports a shorter vector than the rest.
            if ctrl.current_point().map(|p| p.id) == Some(1) {
                f.truncate(5);
            }
            events.extend(ctrl.process_frame(&FeatureVector::new(f), t));
            t += FRAME_MS;
        }

        assert!(events.iter().any(|e| matches!(
            e,
            CalibrationEvent::Aborted(CalibrationError::Regression(RegressionError::DimensionMismatch { .. }))
        )));
        assert!(matches!(ctrl.state(), CalibrationState::Aborted(_)));
        assert!(ctrl.training_samples().is_empty());
        assert!(!ctrl.engine().is_ready());
    }
}
