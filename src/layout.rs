use crate::types::{CalibrationPhase, CalibrationPoint};

pub const DEFAULT_EDGE_MARGIN: f64 = 10.0;

/// Center plus the four edge midpoints.
pub const INITIAL_MAPPING_POINTS: [CalibrationPoint; 5] = [
    CalibrationPoint::new(1, 50.0, 50.0),
    CalibrationPoint::new(2, 50.0, 10.0),
    CalibrationPoint::new(3, 90.0, 50.0),
    CalibrationPoint::new(4, 50.0, 90.0),
    CalibrationPoint::new(5, 10.0, 50.0),
];

/// Interior points of the four diagonal quadrants.
pub const VALIDATION_POINTS: [CalibrationPoint; 4] = [
    CalibrationPoint::new(1, 30.0, 30.0),
    CalibrationPoint::new(2, 70.0, 30.0),
    CalibrationPoint::new(3, 30.0, 70.0),
    CalibrationPoint::new(4, 70.0, 70.0),
];

/// 4x4 grid spanning `[margin, 100 - margin]` on both axes, row-major.
pub fn fine_tuning_points(edge_margin: f64) -> Vec<CalibrationPoint> {
    let margin = edge_margin.clamp(0.0, 45.0);
    let step = (100.0 - 2.0 * margin) / 3.0;
    let mut points = Vec::with_capacity(16);
    for row in 0..4 {
        for col in 0..4 {
            points.push(CalibrationPoint::new(
                (row * 4 + col + 1) as u32,
                margin + col as f64 * step,
                margin + row as f64 * step,
            ));
        }
    }
    points
}

pub fn points_for(phase: CalibrationPhase, edge_margin: f64) -> Vec<CalibrationPoint> {
    match phase {
        CalibrationPhase::InitialMapping => INITIAL_MAPPING_POINTS.to_vec(),
        CalibrationPhase::FineTuning => fine_tuning_points(edge_margin),
        CalibrationPhase::Validation => VALIDATION_POINTS.to_vec(),
    }
}
