use embassy_futures::poll_once;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use power_meter_core::icd::{
    CalibrationParameters, MeterConfig, OrientationState, Side,
    OFFSET_COMPENSATION_SAMPLES,
};
use power_meter_core::{MeterState, StrainChannel, TemperatureSlot};

fn meter() -> MeterState<NoopRawMutex> {
    let mut config = MeterConfig::default();
    config.strain[Side::Left.index()] = CalibrationParameters {
        offset: 0,
        coefficient: 0.01,
        temperature_test_point: 20.0,
        temperature_coefficient: 0.0,
    };
    MeterState::new(&config)
}

fn constant(raw: u32) -> impl FnOnce(bool) -> Result<u32, ()> {
    move |_| Ok(raw)
}

/// Pins the orientation estimate to `at` at time zero.
fn spin_at(state: &MeterState<NoopRawMutex>, at: OrientationState) {
    state.orientation.reset(at, [[1.0, 0.0], [0.0, 1.0]]);
    state.orientation.update(at, 0).unwrap();
}

// ---------------------------------------------------------------------------
// Self calibration and offset compensation
// ---------------------------------------------------------------------------

#[test]
fn start_requests_self_calibration_once() {
    let state = meter();
    let mut channel = StrainChannel::new(Side::Left, &state);
    channel.start();

    let mut seen = Vec::new();
    for t in [1_000, 2_000, 3_000] {
        channel
            .handle_ready(t, |cal| {
                seen.push(cal);
                Ok::<_, ()>(0)
            })
            .unwrap();
    }
    assert_eq!(seen, [true, false, false]);
}

#[test]
fn failed_read_keeps_self_calibration_pending() {
    let state = meter();
    let mut channel = StrainChannel::new(Side::Left, &state);
    channel.start();

    assert!(channel.handle_ready(1_000, |_| Err("pin")).is_err());
    assert!(channel.adc_calibration_pending());
    channel.handle_ready(2_000, constant(5)).unwrap();
    assert!(!channel.adc_calibration_pending());
}

#[test]
fn offset_compensation_converges_to_constant_reading() {
    let state = meter();
    let mut channel = StrainChannel::new(Side::Left, &state);
    state.calibration[Side::Left.index()].set_offset(42);

    state.begin_offset_calibration();
    let r = 123_457;
    for i in 0..OFFSET_COMPENSATION_SAMPLES as u64 {
        assert!(i == 0 || channel.is_calibrating());
        channel.handle_ready(1_000 * (i + 1), constant(r)).unwrap();
    }

    assert!(!channel.is_calibrating());
    assert_eq!(state.calibration[Side::Left.index()].get().offset, r);
    assert!(state.outbox.high_speed(Side::Left).is_empty());

    channel.handle_ready(500_000, constant(r)).unwrap();
    let sample = state.outbox.high_speed(Side::Left).try_receive().unwrap();
    assert_eq!(sample.raw, r);
    assert_eq!(sample.torque, 0.0);
}

#[test]
fn offset_request_is_per_side_and_idempotent() {
    let state = meter();
    let mut left = StrainChannel::new(Side::Left, &state);
    let mut right = StrainChannel::new(Side::Right, &state);

    state.begin_offset_calibration();
    state.begin_offset_calibration();

    left.handle_ready(1_000, constant(10)).unwrap();
    right.handle_ready(1_000, constant(10)).unwrap();
    assert!(left.is_calibrating());
    assert!(right.is_calibrating());

    // Restarting midway discards the partial sum.
    left.begin_offset_calibration();
    for i in 0..OFFSET_COMPENSATION_SAMPLES as u64 {
        left.handle_ready(2_000 + i, constant(300)).unwrap();
    }
    assert_eq!(state.calibration[Side::Left.index()].get().offset, 300);
    assert!(right.is_calibrating());
}

// ---------------------------------------------------------------------------
// Torque, energy and rotation boundaries
// ---------------------------------------------------------------------------

#[test]
fn high_speed_sample_uses_prediction_and_calibration() {
    let state = meter();
    spin_at(&state, OrientationState::new(0.0, 10.0));
    state.temperatures.store(TemperatureSlot::Left, 35.0);
    let mut channel = StrainChannel::new(Side::Left, &state);

    channel.handle_ready(100_000, constant(2_000)).unwrap();

    let sample = state.outbox.high_speed(Side::Left).try_receive().unwrap();
    assert_eq!(sample.base.timestamp, 100_000);
    assert!((sample.base.orientation.angle - 1.0).abs() < 1e-5);
    assert_eq!(sample.base.orientation.angular_velocity, 10.0);
    assert!((sample.torque - 20.0).abs() < 1e-4);
    assert!((sample.power() - 200.0).abs() < 1e-2);
}

#[test]
fn average_power_over_rotation() {
    let state = meter();
    spin_at(&state, OrientationState::new(0.0, 10.0));
    let mut channel = StrainChannel::new(Side::Left, &state);

    // 10 Nm at 10 rad/s.
    state.rotations.record(500);
    channel.handle_ready(1_000, constant(1_000)).unwrap();
    assert_eq!(channel.average_power(), 0.0);

    for t in (2_000..=101_000).step_by(1_000) {
        channel.handle_ready(t, constant(1_000)).unwrap();
    }
    state.rotations.record(101_000);
    channel.handle_timeout(101_000);

    assert!((channel.average_power() - 100.0).abs() < 0.1);
}

#[test]
fn timeout_still_closes_rotation() {
    let state = meter();
    let mut left = StrainChannel::new(Side::Left, &state);
    let mut right = StrainChannel::new(Side::Right, &state);

    left.handle_timeout(1_000);
    assert!(poll_once(state.low_speed.wait_both()).is_pending());

    state.rotations.record(2_000);
    left.handle_timeout(3_000);
    right.handle_timeout(3_000);
    assert!(poll_once(state.low_speed.wait_both()).is_ready());

    // Nothing new until the next rotation.
    left.handle_timeout(4_000);
    right.handle_timeout(4_000);
    assert!(poll_once(state.low_speed.wait_both()).is_pending());
}

#[test]
fn calibration_still_tracks_rotations() {
    let state = meter();
    let mut channel = StrainChannel::new(Side::Left, &state);
    state.begin_offset_calibration();

    channel.handle_ready(1_000, constant(7)).unwrap();
    state.rotations.record(1_500);
    channel.handle_ready(2_000, constant(7)).unwrap();
    state.low_speed.report(Side::Right, 0.0);

    assert!(channel.is_calibrating());
    assert!(poll_once(state.low_speed.wait_both()).is_ready());
}
