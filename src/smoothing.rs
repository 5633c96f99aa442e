use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::f64::consts::PI;
use tracing::debug;

use crate::types::Point2D;

/// Used when two frames arrive with the same (or a decreasing) timestamp.
const FALLBACK_DT: f64 = 1.0 / 60.0;
const DERIVATIVE_CUTOFF: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SmoothingMethod {
    None,
    #[value(alias = "ma")]
    MovingAverage,
    #[default]
    OneEuro,
    Kalman,
}

impl SmoothingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::MovingAverage => "moving-average",
            Self::OneEuro => "one-euro",
            Self::Kalman => "kalman",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FilterConfig {
    pub method: SmoothingMethod,
    pub min_cutoff: f64,
    pub beta: f64,
    pub ma_window: usize,
    pub kalman_q: f64,
    pub kalman_r: f64,
    /// Pixels between a raw point and the last output that count as a saccade.
    pub saccade_threshold: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            method: SmoothingMethod::OneEuro,
            min_cutoff: 1.0,
            beta: 0.007,
            ma_window: 5,
            kalman_q: 0.01,
            kalman_r: 0.1,
            saccade_threshold: 150.0,
        }
    }
}

// =========================================================================
// One-Euro
// =========================================================================

fn smoothing_factor(cutoff: f64, dt: f64) -> f64 {
    let tau = 1.0 / (2.0 * PI * cutoff);
    1.0 / (1.0 + tau / dt)
}

#[derive(Debug, Clone)]
pub struct OneEuroFilter {
    min_cutoff: f64,
    beta: f64,
    state: Option<OneEuroState>,
}

#[derive(Debug, Clone, Copy)]
struct OneEuroState {
    value: f64,
    velocity: f64,
    timestamp: f64,
}

impl OneEuroFilter {
    pub fn new(min_cutoff: f64, beta: f64) -> Self {
        Self { min_cutoff, beta, state: None }
    }

    pub fn set_params(&mut self, min_cutoff: f64, beta: f64) {
        self.min_cutoff = min_cutoff;
        self.beta = beta;
    }

    /// `timestamp` is in seconds.
    pub fn filter(&mut self, value: f64, timestamp: f64) -> f64 {
        let Some(prev) = self.state else {
            self.state = Some(OneEuroState { value, velocity: 0.0, timestamp });
            return value;
        };

        let dt = match timestamp - prev.timestamp {
            dt if dt > 0.0 => dt,
            _ => FALLBACK_DT,
        };

        let raw_velocity = (value - prev.value) / dt;
        let a_d = smoothing_factor(DERIVATIVE_CUTOFF, dt);
        let velocity = prev.velocity + a_d * (raw_velocity - prev.velocity);

        let cutoff = self.min_cutoff + self.beta * velocity.abs();
        let a = smoothing_factor(cutoff, dt);
        let filtered = prev.value + a * (value - prev.value);

        self.state = Some(OneEuroState { value: filtered, velocity, timestamp });
        filtered
    }

    pub fn reset(&mut self) {
        self.state = None;
    }
}

// =========================================================================
// Moving average
// =========================================================================

#[derive(Debug, Clone)]
pub struct MovingAverageFilter {
    window: usize,
    values: VecDeque<f64>,
}

impl MovingAverageFilter {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self { window, values: VecDeque::with_capacity(window + 1) }
    }

    pub fn set_window(&mut self, window: usize) {
        self.window = window.max(1);
        while self.values.len() > self.window {
            self.values.pop_front();
        }
    }

    pub fn filter(&mut self, value: f64) -> f64 {
        self.values.push_back(value);
        while self.values.len() > self.window {
            self.values.pop_front();
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn reset(&mut self) {
        self.values.clear();
    }
}

// =========================================================================
// Kalman (scalar, steady state)
// =========================================================================

#[derive(Debug, Clone)]
pub struct KalmanFilter {
    q: f64,
    r: f64,
    x: f64,
    p: f64,
    gain: f64,
    initialized: bool,
}

impl KalmanFilter {
    pub fn new(q: f64, r: f64) -> Self {
        Self { q, r, x: 0.0, p: 1.0, gain: 0.0, initialized: false }
    }

    pub fn set_noise(&mut self, q: f64, r: f64) {
        self.q = q;
        self.r = r;
    }

    pub fn filter(&mut self, z: f64) -> f64 {
        if !self.initialized {
            self.x = z;
            self.p = 1.0;
            self.initialized = true;
            return z;
        }
        self.p += self.q;
        self.gain = self.p / (self.p + self.r);
        self.x += self.gain * (z - self.x);
        self.p *= 1.0 - self.gain;
        self.x
    }

    /// Gain used by the most recent update.
    pub fn gain(&self) -> f64 {
        self.gain
    }

    pub fn reset(&mut self) {
        self.x = 0.0;
        self.p = 1.0;
        self.gain = 0.0;
        self.initialized = false;
    }
}

// =========================================================================
// GazeSmoother
// =========================================================================

/// Per-axis filter pair for every method. Only the configured method is
/// fed; the others keep whatever state they had.
#[derive(Debug, Clone)]
struct FilterBank {
    one_euro: [OneEuroFilter; 2],
    moving_average: [MovingAverageFilter; 2],
    kalman: [KalmanFilter; 2],
}

impl FilterBank {
    fn new(config: &FilterConfig) -> Self {
        Self {
            one_euro: [
                OneEuroFilter::new(config.min_cutoff, config.beta),
                OneEuroFilter::new(config.min_cutoff, config.beta),
            ],
            moving_average: [
                MovingAverageFilter::new(config.ma_window),
                MovingAverageFilter::new(config.ma_window),
            ],
            kalman: [
                KalmanFilter::new(config.kalman_q, config.kalman_r),
                KalmanFilter::new(config.kalman_q, config.kalman_r),
            ],
        }
    }

    fn apply_params(&mut self, config: &FilterConfig) {
        for f in &mut self.one_euro {
            f.set_params(config.min_cutoff, config.beta);
        }
        for f in &mut self.moving_average {
            f.set_window(config.ma_window);
        }
        for f in &mut self.kalman {
            f.set_noise(config.kalman_q, config.kalman_r);
        }
    }

    fn reset(&mut self, method: SmoothingMethod) {
        match method {
            SmoothingMethod::None => {}
            SmoothingMethod::OneEuro => self.one_euro.iter_mut().for_each(OneEuroFilter::reset),
            SmoothingMethod::MovingAverage => {
                self.moving_average.iter_mut().for_each(MovingAverageFilter::reset)
            }
            SmoothingMethod::Kalman => self.kalman.iter_mut().for_each(KalmanFilter::reset),
        }
    }

    fn reset_all(&mut self) {
        self.reset(SmoothingMethod::OneEuro);
        self.reset(SmoothingMethod::MovingAverage);
        self.reset(SmoothingMethod::Kalman);
    }
}

/// Live-tracking noise suppression with saccade snapping.
#[derive(Debug, Clone)]
pub struct GazeSmoother {
    config: FilterConfig,
    bank: FilterBank,
    last_output: Option<Point2D>,
    saccades: u64,
}

impl GazeSmoother {
    pub fn new(config: FilterConfig) -> Self {
        Self { bank: FilterBank::new(&config), config, last_output: None, saccades: 0 }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Applies new parameters in place. Switching method restarts only the
    /// newly selected filter.
    pub fn update_config(&mut self, config: FilterConfig) {
        let switched = config.method != self.config.method;
        self.bank.apply_params(&config);
        self.config = config;
        if switched {
            self.bank.reset(config.method);
        }
    }

    /// `timestamp_ms` is the frame's monotonic timestamp.
    pub fn smooth(&mut self, raw: Point2D, timestamp_ms: f64) -> Point2D {
        if let Some(last) = self.last_output {
            let jump = raw.distance(&last);
            if jump > self.config.saccade_threshold {
                self.saccades += 1;
                match self.config.method {
                    SmoothingMethod::MovingAverage | SmoothingMethod::Kalman => {
                        debug!("Saccade of {:.0}px, resetting {} filter", jump, self.config.method.as_str());
                        self.bank.reset(self.config.method);
                    }
                    // One-Euro widens its own cutoff on fast motion.
                    SmoothingMethod::OneEuro | SmoothingMethod::None => {}
                }
            }
        }

        let t = timestamp_ms / 1000.0;
        let out = match self.config.method {
            SmoothingMethod::None => raw,
            SmoothingMethod::OneEuro => Point2D::new(
                self.bank.one_euro[0].filter(raw.x, t),
                self.bank.one_euro[1].filter(raw.y, t),
            ),
            SmoothingMethod::MovingAverage => Point2D::new(
                self.bank.moving_average[0].filter(raw.x),
                self.bank.moving_average[1].filter(raw.y),
            ),
            SmoothingMethod::Kalman => Point2D::new(
                self.bank.kalman[0].filter(raw.x),
                self.bank.kalman[1].filter(raw.y),
            ),
        };

        self.last_output = Some(out);
        out
    }

    pub fn last_output(&self) -> Option<Point2D> {
        self.last_output
    }

    /// Saccades seen since the last reset.
    pub fn saccade_count(&self) -> u64 {
        self.saccades
    }

    /// Clears every filter and the output history.
    pub fn reset(&mut self) {
        self.bank.reset_all();
        self.last_output = None;
        self.saccades = 0;
    }
}

impl Default for GazeSmoother {
    fn default() -> Self {
        Self::new(FilterConfig::default())
    }
}
