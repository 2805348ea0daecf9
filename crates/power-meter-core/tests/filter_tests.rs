use core::f32::consts::PI;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use power_meter_core::icd::{FilterConfig, OrientationState};
use power_meter_core::{
    circular_subtract, normalize_angle, CoreError, OrientationFilter,
    SharedOrientation,
};

const EPS: f32 = 1e-4;

// ---------------------------------------------------------------------------
// Angle helpers
// ---------------------------------------------------------------------------

#[test]
fn normalize_stays_in_half_open_range() {
    let mut theta = -50.0f32;
    while theta < 50.0 {
        let n = normalize_angle(theta);
        assert!(n > -PI && n <= PI, "{theta} -> {n}");
        theta += 0.137;
    }
}

#[test]
fn normalize_maps_both_pi_to_pi() {
    assert_eq!(normalize_angle(PI), PI);
    assert_eq!(normalize_angle(-PI), PI);
    assert_eq!(normalize_angle(0.0), 0.0);
}

#[test]
fn normalize_is_periodic() {
    for theta in [-3.0f32, -1.0, 0.25, 2.5] {
        for k in -3..=3 {
            let shifted = theta + k as f32 * 2.0 * PI;
            assert!(
                (normalize_angle(shifted) - theta).abs() < EPS,
                "{theta} + {k} * 2pi"
            );
        }
    }
}

#[test]
fn normalize_handles_many_revolutions() {
    let n = normalize_angle(1.0e6);
    assert!(n > -PI && n <= PI);
    assert!(normalize_angle(f32::INFINITY).is_nan());
    assert!(normalize_angle(f32::NAN).is_nan());
}

#[test]
fn circular_subtract_identity_and_bounds() {
    for a in [-3.0f32, -0.5, 0.0, 1.0, 3.1] {
        assert!(circular_subtract(a, a).abs() < EPS);
        for b in [-3.1f32, -2.0, 0.0, 0.7, 3.0] {
            let d = circular_subtract(a, b);
            assert!(d > -PI && d <= PI, "{a} - {b} = {d}");
        }
    }
}

#[test]
fn circular_subtract_takes_short_way_round() {
    let d = circular_subtract(-PI + 0.1, PI - 0.1);
    assert!((d - 0.2).abs() < EPS);
    let d = circular_subtract(PI - 0.1, -PI + 0.1);
    assert!((d + 0.2).abs() < EPS);
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

#[test]
fn converges_at_constant_velocity() {
    let mut filter = OrientationFilter::new(&FilterConfig::default());
    let velocity = 5.0f32;

    for i in 1..=500u64 {
        let t = i * 10_000;
        let angle = normalize_angle(velocity * t as f32 * 1e-6);
        filter
            .update(OrientationState::new(angle, velocity), t)
            .unwrap();
    }

    let state = filter.state();
    let expected = normalize_angle(velocity * 5.0);
    assert!(circular_subtract(state.angle, expected).abs() < 0.01);
    assert!((state.angular_velocity - velocity).abs() < 0.01);
    assert_eq!(filter.last_update(), Some(5_000_000));

    let p = filter.covariance();
    assert!(p[0][0] > 0.0 && p[1][1] > 0.0);
    assert_eq!(p[0][1], p[1][0]);
    assert!(p[0][0] < 1.0 && p[1][1] < 1.0);
}

#[test]
fn predict_projects_backwards_for_earlier_timestamps() {
    let mut filter = OrientationFilter::new(&FilterConfig::default());
    filter.reset(OrientationState::new(0.0, 2.0), [[0.1, 0.0], [0.0, 0.1]]);
    filter.update(OrientationState::new(0.0, 2.0), 1_000_000).unwrap();

    let (state, _) = filter.predict(900_000);
    assert!((circular_subtract(state.angle, filter.state().angle) + 0.2).abs() < 0.01);
}

#[test]
fn reset_clears_last_update() {
    let mut filter = OrientationFilter::new(&FilterConfig::default());
    filter.update(OrientationState::new(1.0, 1.0), 20_000).unwrap();
    filter.reset(OrientationState::new(4.0, 0.0), [[1.0, 0.0], [0.0, 1.0]]);

    assert_eq!(filter.last_update(), None);
    assert!((filter.state().angle - normalize_angle(4.0)).abs() < EPS);
}

#[test]
fn first_update_after_reset_does_not_project_from_boot() {
    let config = FilterConfig::default();
    let mut filter = OrientationFilter::new(&config);
    filter.update(OrientationState::new(0.3, 0.0), 10_000).unwrap();
    filter.reset(config.x0, config.p0);

    let z = OrientationState::new(1.0, 2.0);
    assert_eq!(filter.update(z, 600_000_000), Ok(()));
    assert!((filter.state().angle - z.angle).abs() < 1e-3);
    assert!((filter.state().angular_velocity - z.angular_velocity).abs() < 1e-3);
    assert_eq!(filter.last_update(), Some(600_000_000));
}

#[test]
fn late_first_update_after_construction() {
    let mut filter = OrientationFilter::new(&FilterConfig::default());
    let z = OrientationState::new(1.0, 2.0);

    assert_eq!(filter.update(z, 3_600_000_000), Ok(()));
    assert!((filter.state().angle - z.angle).abs() < 1e-3);
    assert!((filter.state().angular_velocity - z.angular_velocity).abs() < 1e-3);

    // From here on time counts again.
    let (state, _) = filter.predict(3_600_500_000);
    assert!(circular_subtract(state.angle, z.angle + 1.0).abs() < 0.01);
}

#[test]
fn predict_guards_degenerate_covariance() {
    let config = FilterConfig::default();
    let mut filter = OrientationFilter::new(&config);
    filter.reset(
        OrientationState::new(0.5, 1.0),
        [[f32::NAN, 0.0], [0.0, 1.0]],
    );

    let (state, p) = filter.predict(10_000);
    assert_eq!(p, config.p0);
    assert!(state.angle.is_finite());

    filter.reset(
        OrientationState::new(0.5, f32::INFINITY),
        [[1.0, 0.0], [0.0, 1.0]],
    );
    let (state, p) = filter.predict(10_000);
    assert_eq!(state, config.x0);
    assert_eq!(p, config.p0);
}

#[test]
fn degenerate_covariance_is_reset() {
    let config = FilterConfig::default();
    let mut filter = OrientationFilter::new(&config);
    filter.reset(
        OrientationState::new(0.5, 1.0),
        [[f32::NAN, 0.0], [0.0, 1.0]],
    );

    assert_eq!(
        filter.update(OrientationState::new(0.5, 1.0), 10_000),
        Err(CoreError::FilterReset)
    );
    assert_eq!(filter.covariance(), config.p0);
    assert!(filter.state().angle.is_finite());
    assert!(filter.state().angular_velocity.is_finite());

    // Usable again afterwards.
    assert_eq!(filter.update(OrientationState::new(0.6, 1.0), 20_000), Ok(()));
}

#[test]
fn non_finite_state_falls_back_to_initial() {
    let config = FilterConfig::default();
    let mut filter = OrientationFilter::new(&config);
    filter.reset(
        OrientationState::new(f32::NAN, 0.0),
        [[1.0, 0.0], [0.0, 1.0]],
    );

    assert!(filter.update(OrientationState::new(0.0, 0.0), 10_000).is_err());
    assert_eq!(filter.state(), config.x0);
    assert_eq!(filter.covariance(), config.p0);
}

#[test]
fn shared_orientation_matches_plain_filter() {
    let config = FilterConfig::default();
    let shared = SharedOrientation::<CriticalSectionRawMutex>::new(&config);
    let mut plain = OrientationFilter::new(&config);

    for i in 1..=50u64 {
        let t = i * 10_000;
        let z = OrientationState::new(normalize_angle(t as f32 * 3e-6), 3.0);
        let state = shared.update(z, t).unwrap();
        plain.update(z, t).unwrap();
        assert_eq!(state, plain.state());
    }

    assert_eq!(shared.covariance(), plain.covariance());
    assert_eq!(shared.predict(600_000), plain.predict(600_000));
}

#[test]
fn shared_orientation_restart_forgets_time_and_state() {
    let config = FilterConfig::default();
    let shared = SharedOrientation::<CriticalSectionRawMutex>::new(&config);
    for i in 1..=20u64 {
        let t = i * 10_000;
        shared.update(OrientationState::new(0.0, 0.0), t).unwrap();
    }

    shared.restart();
    assert_eq!(shared.state(), config.x0);
    assert_eq!(shared.covariance(), config.p0);

    let z = OrientationState::new(-2.0, 4.0);
    let state = shared.update(z, 900_000_000).unwrap();
    assert!((state.angle - z.angle).abs() < 1e-3);
    assert!((state.angular_velocity - z.angular_velocity).abs() < 1e-3);
}
