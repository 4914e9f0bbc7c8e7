use approx::assert_abs_diff_eq;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rstest::rstest;
use stoch_math::BoxConstraints;
use stochvol::gpo::{
    expected_improvement, GaussianProcess, GaussianProcessOptimizer, GpoSettings, PreSampling,
};
use stochvol::SvError;

fn quadratic_settings() -> GpoSettings {
    GpoSettings {
        initial_params: vec![0.0, 0.0],
        lower_bounds: vec![-1.0, -1.0],
        upper_bounds: vec![1.0, 1.0],
        pre_iterations: 15,
        max_iterations: 30,
        jittering_std: 0.01,
        hyper_interval: 10,
        acquisition_candidates: 200,
        verbose: false,
        ..GpoSettings::default()
    }
}

fn quadratic(theta: &[f64]) -> f64 {
    -(theta[0] - 0.3).powi(2) - (theta[1] + 0.2).powi(2)
}

#[test]
fn test_default_settings() {
    let s = GpoSettings::default();
    assert_eq!(s.initial_params, vec![0.20, 0.95, 0.14, 1.90]);
    assert_eq!(s.lower_bounds, vec![-2.0, 0.80, 0.05, 1.00]);
    assert_eq!(s.upper_bounds, vec![2.0, 1.0, 1.0, 2.0]);
    assert_eq!(s.pre_iterations, 100);
    assert_eq!(s.max_iterations, 150);
    assert_eq!(s.jittering_std, 0.1);
    assert_eq!(s.pre_sampling, PreSampling::LatinHypercube);
    assert_eq!(s.hyper_interval, 50);
    assert!(!s.estimate_th_hat_every_iteration);
    assert!(!s.estimate_hessian_every_iteration);
    assert!(s.validate().is_ok());
}

#[rstest]
#[case::initial_outside(GpoSettings { initial_params: vec![0.2, 0.5, 0.14, 1.9], ..GpoSettings::default() })]
#[case::inverted_bounds(GpoSettings { lower_bounds: vec![2.0, 0.8, 0.05, 1.0], upper_bounds: vec![-2.0, 1.0, 1.0, 2.0], ..GpoSettings::default() })]
#[case::length_mismatch(GpoSettings { lower_bounds: vec![-2.0, 0.8], ..GpoSettings::default() })]
#[case::too_few_pre_iterations(GpoSettings { pre_iterations: 1, ..GpoSettings::default() })]
#[case::max_below_pre(GpoSettings { max_iterations: 50, ..GpoSettings::default() })]
#[case::negative_jitter(GpoSettings { jittering_std: -0.1, ..GpoSettings::default() })]
fn test_invalid_settings(#[case] settings: GpoSettings) {
    assert!(matches!(
        GaussianProcessOptimizer::new(settings),
        Err(SvError::InvalidParameter(_))
    ));
}

#[test]
fn test_gaussian_process_fits_smooth_function() {
    let bounds = BoxConstraints::new(vec![-1.0, -1.0], vec![1.0, 1.0]).unwrap();
    let mut rng = StdRng::seed_from_u64(1);
    let xs = stoch_math::optimize::latin_hypercube(40, &bounds, &mut rng);
    let ys: Vec<f64> = xs.iter().map(|x| quadratic(x)).collect();

    let mut gp = GaussianProcess::new(bounds);
    gp.fit(&xs, &ys).unwrap();
    let lml_before = gp.log_marginal_likelihood().unwrap();
    let lml_after = gp.optimize_hyperparameters().unwrap();
    assert!(lml_after >= lml_before - 1e-6);
    assert_eq!(gp.n_points(), 40);

    let (mean, var) = gp.predict(&[0.3, -0.2]).unwrap();
    assert_abs_diff_eq!(mean, 0.0, epsilon = 0.1);
    assert!(var >= 0.0);
}

#[test]
fn test_gaussian_process_rejects_bad_training_data() {
    let bounds = BoxConstraints::new(vec![0.0], vec![1.0]).unwrap();
    let mut gp = GaussianProcess::new(bounds);
    assert!(gp.fit(&[vec![0.5]], &[1.0]).is_err());
    assert!(gp.fit(&[vec![0.1], vec![0.5]], &[1.0, f64::NAN]).is_err());
    assert!(gp.fit(&[vec![0.1, 0.2], vec![0.5, 0.3]], &[1.0, 2.0]).is_err());
}

#[test]
fn test_maximize_quadratic() {
    let optimizer = GaussianProcessOptimizer::new(quadratic_settings()).unwrap();
    let mut rng = StdRng::seed_from_u64(7);

    let out = optimizer
        .maximize(|theta| Ok(quadratic(theta)), &mut rng)
        .unwrap();

    assert_eq!(out.iterations, 30);
    assert_eq!(out.evaluations.len(), 30);
    assert_eq!(out.evaluations[0].0, vec![0.0, 0.0]);
    assert_abs_diff_eq!(out.th_hat[0], 0.3, epsilon = 0.1);
    assert_abs_diff_eq!(out.th_hat[1], -0.2, epsilon = 0.1);
    assert!(out.max_mean > -0.05);

    for (theta, _) in &out.evaluations {
        assert!(theta.iter().all(|v| (-1.0..=1.0).contains(v)));
    }

    assert_eq!(out.hessian.nrows(), 2);
    assert!(out.hessian[(0, 0)] < 0.0);
    assert!(out.hessian[(1, 1)] < 0.0);
    assert!(out.covariance.is_some());
}

#[test]
fn test_maximize_with_uniform_pre_sampling_and_every_iteration_estimates() {
    let settings = GpoSettings {
        pre_sampling: PreSampling::Uniform,
        estimate_th_hat_every_iteration: true,
        estimate_hessian_every_iteration: true,
        max_iterations: 20,
        ..quadratic_settings()
    };
    let optimizer = GaussianProcessOptimizer::new(settings).unwrap();
    let mut rng = StdRng::seed_from_u64(8);

    let out = optimizer
        .maximize(|theta| Ok(quadratic(theta)), &mut rng)
        .unwrap();
    assert_eq!(out.iterations, 20);
    assert_abs_diff_eq!(out.th_hat[0], 0.3, epsilon = 0.15);
}

#[test]
fn test_maximize_tolerates_non_finite_values() {
    let optimizer = GaussianProcessOptimizer::new(quadratic_settings()).unwrap();
    let mut rng = StdRng::seed_from_u64(9);

    let out = optimizer
        .maximize(
            |theta| {
                if theta[0] < -0.5 {
                    Ok(f64::NEG_INFINITY)
                } else {
                    Ok(quadratic(theta))
                }
            },
            &mut rng,
        )
        .unwrap();

    assert!(out.th_hat.iter().all(|v| v.is_finite()));
    assert!(out.th_hat[0] > -0.5);
}

#[test]
fn test_maximize_propagates_objective_errors() {
    let optimizer = GaussianProcessOptimizer::new(quadratic_settings()).unwrap();
    let mut rng = StdRng::seed_from_u64(10);
    let mut calls = 0;

    let result = optimizer.maximize(
        |_| {
            calls += 1;
            if calls == 5 {
                Err(SvError::ModelError("filter failed".to_string()))
            } else {
                Ok(0.0)
            }
        },
        &mut rng,
    );

    assert!(matches!(result, Err(SvError::ModelError(_))));
}

#[test]
fn test_maximize_fails_when_nothing_is_finite() {
    let optimizer = GaussianProcessOptimizer::new(quadratic_settings()).unwrap();
    let mut rng = StdRng::seed_from_u64(11);
    let result = optimizer.maximize(|_| Ok(f64::NAN), &mut rng);
    assert!(matches!(result, Err(SvError::ConvergenceError(_))));
}

#[test]
fn test_expected_improvement_prefers_higher_mean() {
    let low = expected_improvement(0.0, 0.25, 0.5, 0.01);
    let high = expected_improvement(1.0, 0.25, 0.5, 0.01);
    assert!(high > low);
    assert!(low > 0.0);
}
