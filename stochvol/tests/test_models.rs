use approx::assert_relative_eq;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rstest::rstest;
use stochvol::models::{HwsvAlphaModel, ObservationTransform, StateSpaceModel, SvParameters};
use stochvol::SvError;

fn default_params() -> SvParameters {
    SvParameters {
        mu: 0.20,
        phi: 0.95,
        sigma_v: 0.14,
        alpha: 1.90,
    }
}

#[test]
fn test_parameter_layout() {
    let p = default_params();
    assert_eq!(p.to_vec(), vec![0.20, 0.95, 0.14, 1.90]);
    assert_eq!(SvParameters::from_slice(&p.to_vec()).unwrap(), p);
    assert!(SvParameters::from_slice(&[0.1, 0.2]).is_err());

    let model = HwsvAlphaModel::new(p).unwrap();
    assert_eq!(model.n_params(), 4);
    assert_eq!(model.parameter_names(), vec!["mu", "phi", "sigma_v", "alpha"]);
    assert_eq!(model.params(), p.to_vec());
}

#[rstest]
#[case(0.2, 1.05, 0.14, 1.9)]
#[case(0.2, -1.0, 0.14, 1.9)]
#[case(0.2, 0.95, 0.0, 1.9)]
#[case(0.2, 0.95, 0.14, 2.5)]
#[case(0.2, 0.95, 0.14, 0.0)]
#[case(f64::NAN, 0.95, 0.14, 1.9)]
fn test_invalid_parameters_rejected(
    #[case] mu: f64,
    #[case] phi: f64,
    #[case] sigma_v: f64,
    #[case] alpha: f64,
) {
    let result = HwsvAlphaModel::new(SvParameters {
        mu,
        phi,
        sigma_v,
        alpha,
    });
    assert!(matches!(result, Err(SvError::InvalidParameter(_))));
}

#[test]
fn test_set_params_validates_and_keeps_old_values() {
    let mut model = HwsvAlphaModel::new(default_params()).unwrap();
    assert!(model.set_params(&[0.0, 0.5, 0.3, 1.5]).is_ok());
    assert_eq!(model.params(), vec![0.0, 0.5, 0.3, 1.5]);

    assert!(model.set_params(&[0.0, 0.5, -0.3, 1.5]).is_err());
    assert_eq!(model.params(), vec![0.0, 0.5, 0.3, 1.5]);
}

#[test]
fn test_observation_transform() {
    let model = HwsvAlphaModel::new(default_params()).unwrap();
    assert_eq!(model.transform(), ObservationTransform::Arctan);
    assert_relative_eq!(model.transform_observation(1.0), std::f64::consts::FRAC_PI_4);
    assert!(model.transform_observation(1e12) < std::f64::consts::FRAC_PI_2 + 1e-12);

    let raw = model.with_transform(ObservationTransform::None);
    assert_eq!(raw.transform_observation(3.5), 3.5);
}

#[test]
fn test_log_prior() {
    let model = HwsvAlphaModel::new(default_params()).unwrap();
    assert!(model.log_prior().is_finite());

    // alpha at or below one has no prior mass
    let heavy = HwsvAlphaModel::new(SvParameters {
        alpha: 1.0,
        ..default_params()
    })
    .unwrap();
    assert_eq!(heavy.log_prior(), f64::NEG_INFINITY);

    let mut far = default_params();
    far.phi = 0.5;
    let far_model = HwsvAlphaModel::new(far).unwrap();
    assert!(far_model.log_prior() < model.log_prior());
}

#[test]
fn test_fixed_initial_state() {
    let model = HwsvAlphaModel::new(default_params())
        .unwrap()
        .with_initial_state(-1.5);
    assert_eq!(model.fixed_initial_state(), -1.5);
}

#[test]
fn test_simulate_lengths_and_seeding() {
    let model = HwsvAlphaModel::new(default_params()).unwrap();

    let mut rng = StdRng::seed_from_u64(3);
    let (states, observations) = model.simulate(250, &mut rng);
    assert_eq!(states.len(), 250);
    assert_eq!(observations.len(), 250);

    let mut rng = StdRng::seed_from_u64(3);
    let (again, _) = model.simulate(250, &mut rng);
    assert_eq!(states, again);
}

#[test]
fn test_propagate_mean_reversion() {
    let model = HwsvAlphaModel::new(SvParameters {
        mu: 0.0,
        phi: 0.5,
        sigma_v: 0.1,
        alpha: 2.0,
    })
    .unwrap();
    let mut rng = StdRng::seed_from_u64(11);

    let n = 20_000;
    let mean = (0..n).map(|_| model.propagate(2.0, &mut rng)).sum::<f64>() / n as f64;
    assert!((mean - 1.0).abs() < 0.01);
}

#[test]
fn test_gaussian_limit_observation_variance() {
    // alpha = 2 gives N(0, 2) innovations
    let model = HwsvAlphaModel::new(SvParameters {
        mu: 0.0,
        phi: 0.9,
        sigma_v: 0.1,
        alpha: 2.0,
    })
    .unwrap();
    let mut rng = StdRng::seed_from_u64(5);

    let n = 50_000;
    let var = (0..n)
        .map(|_| model.simulate_observation(0.0, &mut rng).powi(2))
        .sum::<f64>()
        / n as f64;
    assert!((var - 2.0).abs() < 0.1);
}
