#[cfg(test)]
mod tests {
    use crate::error::RegressionError;
    use crate::regression::{
        HybridModel, RegressionEngine, RegressionMethod, RegressionModel, RidgeModel, TpsModel,
        RIDGE_LAMBDA,
    };
    use crate::types::{FeatureVector, Point2D};
    use clap::ValueEnum;
    use proptest::prelude::*;

    // =========================================================================
    // Fixtures
    // Feature layout: [1, lx, ly, rx, ry, r, ax*ay]
    // =========================================================================

    fn eye_features(lx: f64, ly: f64, rx: f64, ry: f64) -> FeatureVector {
        let ax = (lx + rx) / 2.0;
        let ay = (ly + ry) / 2.0;
        FeatureVector::new(vec![1.0, lx, ly, rx, ry, (ax * ax + ay * ay).sqrt(), ax * ay])
    }

    /// Five-point cross with unit pupil offsets and a linear screen mapping.
    fn cross_dataset() -> (Vec<FeatureVector>, Vec<Point2D>) {
        let offsets = [(0.0, 0.0), (0.0, -1.0), (1.0, 0.0), (0.0, 1.0), (-1.0, 0.0)];
        let inputs = offsets.iter().map(|&(x, y)| eye_features(x, y, x, y)).collect();
        let outputs = offsets
            .iter()
            .map(|&(x, y)| Point2D::new(960.0 + 768.0 * x, 540.0 + 432.0 * y))
            .collect();
        (inputs, outputs)
    }

    /// A 3x3 grid where the two eyes disagree slightly and non-linearly, so
    /// the reduced 4-d points are not affinely degenerate.
    fn grid_dataset() -> (Vec<FeatureVector>, Vec<Point2D>) {
        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        for j in 0..3 {
            for i in 0..3 {
                let u = i as f64 - 1.0;
                let v = j as f64 - 1.0;
                let lx = 0.30 * u + 0.02 * v;
                let ly = 0.25 * v + 0.01 * u;
                let rx = 0.28 * u - 0.015 * v + 0.05 * u * v;
                let ry = 0.24 * v + 0.04 * u * u;
                inputs.push(eye_features(lx, ly, rx, ry));
                outputs.push(Point2D::new(960.0 + 800.0 * u, 540.0 + 450.0 * v));
            }
        }
        (inputs, outputs)
    }

    // =========================================================================
    // Ridge
    // =========================================================================

    #[test]
    fn test_ridge_fits_cross_within_bias() {
        let (inputs, outputs) = cross_dataset();
        let model = RidgeModel::fit(&inputs, &outputs, RIDGE_LAMBDA).unwrap();
        for (x, target) in inputs.iter().zip(&outputs) {
            let err = model.predict(x).distance(target);
            assert!(err < 5.0, "ridge error {:.3}px at {:?}", err, target);
        }
    }

    #[test]
    fn test_ridge_dimension_mismatch_predicts_zero() {
        let (inputs, outputs) = cross_dataset();
        let model = RidgeModel::fit(&inputs, &outputs, RIDGE_LAMBDA).unwrap();
        assert_eq!(model.predict(&FeatureVector::new(vec![1.0, 0.5])), Point2D::ZERO);
    }

    #[test]
    fn test_ridge_rejects_non_finite_input() {
        let (mut inputs, outputs) = cross_dataset();
        inputs[2] = FeatureVector::new(vec![f64::NAN; 7]);
        assert_eq!(
            RidgeModel::fit(&inputs, &outputs, RIDGE_LAMBDA),
            Err(RegressionError::SingularMatrix)
        );
    }

    #[test]
    fn test_ridge_rejects_ragged_inputs() {
        let (mut inputs, outputs) = cross_dataset();
        inputs[1] = FeatureVector::new(vec![1.0, 0.0]);
        assert!(matches!(
            RidgeModel::fit(&inputs, &outputs, RIDGE_LAMBDA),
            Err(RegressionError::DimensionMismatch { .. })
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_ridge_reproduces_full_rank_targets(
            weights in prop::collection::vec(-500.0f64..500.0, 6),
            jitter in prop::collection::vec(-0.1f64..0.1, 30),
        ) {
            // 10 samples in 3-d (bias + 2 features): full column rank.
            let inputs: Vec<FeatureVector> = (0..10)
                .map(|i| {
                    let a = (i % 4) as f64 - 1.5 + jitter[i];
                    let b = (i / 4) as f64 - 1.0 + jitter[10 + i];
                    FeatureVector::new(vec![1.0, a, b])
                })
                .collect();
            let outputs: Vec<Point2D> = inputs
                .iter()
                .map(|f| {
                    let s = f.as_slice();
                    Point2D::new(
                        weights[0] + weights[1] * s[1] + weights[2] * s[2],
                        weights[3] + weights[4] * s[1] + weights[5] * s[2],
                    )
                })
                .collect();

            let model = RidgeModel::fit(&inputs, &outputs, RIDGE_LAMBDA).unwrap();
            for (x, t) in inputs.iter().zip(&outputs) {
                prop_assert!(model.predict(x).distance(t) < 2.0);
            }
        }
    }

    // =========================================================================
    // TPS
    // =========================================================================

    #[test]
    fn test_tps_requires_five_points() {
        let (inputs, outputs) = grid_dataset();
        for n in 0..5 {
            let result = TpsModel::fit(&inputs[..n], &outputs[..n]);
            assert!(result.is_err(), "TPS trained with {} points", n);
        }
        assert_eq!(
            TpsModel::fit(&inputs[..4], &outputs[..4]),
            Err(RegressionError::InsufficientSamples { needed: 5, got: 4 })
        );
    }

    #[test]
    fn test_tps_stable_on_grid() {
        let (inputs, outputs) = grid_dataset();
        let model = TpsModel::fit(&inputs, &outputs).unwrap();
        assert_eq!(model.weights().rows(), inputs.len() + 5);
        assert!(model.weights().is_finite());

        // Smoothing spline: close to, not exactly on, the targets.
        for (x, t) in inputs.iter().zip(&outputs) {
            let p = model.predict(x);
            assert!(p.is_finite());
            assert!(p.distance(t) < 100.0, "tps error {:.2} at {:?}", p.distance(t), t);
        }
    }

    #[test]
    fn test_tps_wrong_length_query_predicts_zero() {
        let (inputs, outputs) = grid_dataset();
        let model = TpsModel::fit(&inputs, &outputs).unwrap();
        assert_eq!(model.dim(), 7);

        // Long enough to reduce, but not the trained layout.
        let mut with_pose = inputs[4].as_slice().to_vec();
        with_pose.extend_from_slice(&[0.1, -0.1]);
        assert_eq!(model.predict(&FeatureVector::new(with_pose)), Point2D::ZERO);
        assert_eq!(model.predict(&FeatureVector::new(inputs[4].as_slice()[..5].to_vec())), Point2D::ZERO);
        assert_ne!(model.predict(&inputs[4]), Point2D::ZERO);
    }

    #[test]
    fn test_tps_degenerate_points_fail() {
        // Both eyes identical and moving along one line: P is rank deficient.
        let inputs: Vec<_> = (0..6).map(|i| eye_features(i as f64 * 0.1, 0.0, i as f64 * 0.1, 0.0)).collect();
        let outputs: Vec<_> = (0..6).map(|i| Point2D::new(i as f64 * 100.0, 0.0)).collect();
        assert_eq!(TpsModel::fit(&inputs, &outputs), Err(RegressionError::SingularMatrix));
    }

    #[test]
    fn test_tps_short_vectors_rejected() {
        let inputs: Vec<_> = (0..6).map(|i| FeatureVector::new(vec![1.0, i as f64])).collect();
        let outputs = vec![Point2D::ZERO; 6];
        assert!(matches!(
            TpsModel::fit(&inputs, &outputs),
            Err(RegressionError::DimensionMismatch { .. })
        ));
    }

    // =========================================================================
    // Hybrid & engine
    // =========================================================================

    #[test]
    fn test_hybrid_survives_tps_failure() {
        let (inputs, outputs) = grid_dataset();
        let model = HybridModel::fit(&inputs[..4], &outputs[..4]).unwrap();
        assert!(model.tps().is_none());
        assert_eq!(model.residuals().len(), 4);
    }

    #[test]
    fn test_hybrid_snaps_to_training_targets() {
        let (inputs, outputs) = grid_dataset();
        let model = HybridModel::fit(&inputs, &outputs).unwrap();
        for (x, t) in inputs.iter().zip(&outputs) {
            // Zero-distance neighbour dominates the residual average.
            assert!(model.predict(x).distance(t) < 1.0);
        }
    }

    #[test]
    fn test_hybrid_residuals_are_actual_minus_ridge() {
        let (inputs, outputs) = grid_dataset();
        let model = HybridModel::fit(&inputs, &outputs).unwrap();
        for (r, (x, t)) in model.residuals().iter().zip(inputs.iter().zip(&outputs)) {
            let expected = *t - model.ridge().predict(x);
            assert!((r.error.x - expected.x).abs() < 1e-9);
            assert!((r.error.y - expected.y).abs() < 1e-9);
        }
    }

    #[test]
    fn test_untrained_engine_predicts_zero() {
        let engine = RegressionEngine::new();
        let x = eye_features(0.1, 0.1, 0.1, 0.1);
        for method in [RegressionMethod::Ridge, RegressionMethod::Hybrid, RegressionMethod::Tps] {
            assert_eq!(engine.predict(&x, method), Point2D::ZERO);
        }
        assert!(!engine.is_ready());
    }

    #[test]
    fn test_downgrade_tps_to_hybrid() {
        let (inputs, outputs) = grid_dataset();
        let engine = RegressionEngine::train(&inputs[..4], &outputs[..4]).unwrap();
        assert!(!engine.is_tps_ready());
        let selected = engine.select(RegressionMethod::Tps).unwrap();
        assert_eq!(selected.method(), RegressionMethod::Hybrid);
        assert!(matches!(engine.select(RegressionMethod::Ridge), Some(RegressionModel::Ridge(_))));
    }

    #[test]
    fn test_tps_selected_when_ready() {
        let (inputs, outputs) = grid_dataset();
        let engine = RegressionEngine::train(&inputs, &outputs).unwrap();
        assert!(engine.is_tps_ready());
        assert!(engine.is_hybrid_ready());
        assert_eq!(engine.select(RegressionMethod::Tps).unwrap().method(), RegressionMethod::Tps);
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!(RegressionMethod::from_str("TPS", true), Ok(RegressionMethod::Tps));
        assert_eq!(RegressionMethod::from_str("ridge", false), Ok(RegressionMethod::Ridge));
        assert!(RegressionMethod::from_str("svr", true).is_err());
    }
}
