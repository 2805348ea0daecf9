use core::future::{pending, ready};

use embassy_futures::poll_once;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use power_meter_core::icd::{MeterConfig, Side};
use power_meter_core::{
    DataReady, EnableGate, LowSpeedAggregator, MeterState, RotationSnapshot,
};

fn rotation() -> RotationSnapshot {
    RotationSnapshot {
        count: 7,
        last_duration: 666_000,
        last_timestamp: Some(4_200_000),
    }
}

// ---------------------------------------------------------------------------
// Low-speed barrier
// ---------------------------------------------------------------------------

#[futures_test::test]
async fn waits_for_both_sides() {
    let aggregator = LowSpeedAggregator::<NoopRawMutex>::new();

    aggregator.report(Side::Left, 120.0);
    assert!(poll_once(aggregator.wait_both()).is_pending());

    aggregator.report(Side::Right, 80.0);
    assert_eq!(aggregator.wait_both().await, [120.0, 80.0]);
    assert!(poll_once(aggregator.wait_both()).is_pending());
}

#[futures_test::test]
async fn repeated_report_keeps_latest_power() {
    let aggregator = LowSpeedAggregator::<NoopRawMutex>::new();

    aggregator.report(Side::Left, 1.0);
    aggregator.report(Side::Left, 2.0);
    aggregator.report(Side::Right, 3.0);
    assert_eq!(aggregator.wait_both().await, [2.0, 3.0]);
}

#[futures_test::test]
async fn sample_from_both_reports() {
    let aggregator = LowSpeedAggregator::<NoopRawMutex>::new();
    aggregator.report(Side::Left, 100.0);
    aggregator.report(Side::Right, 300.0);

    let sample = aggregator.next_sample(rotation, pending::<()>()).await;
    assert_eq!(sample.rotation_count, 7);
    assert_eq!(sample.last_rotation_duration, 666_000);
    assert_eq!(sample.timestamp, 4_200_000);
    assert_eq!(sample.power, 400.0);
    assert_eq!(sample.balance, 75.0);
}

#[futures_test::test]
async fn timeout_reports_idle_crank() {
    let aggregator = LowSpeedAggregator::<NoopRawMutex>::new();
    aggregator.report(Side::Left, 100.0);

    let sample = aggregator.next_sample(rotation, ready(())).await;
    assert_eq!(sample.power, 0.0);
    assert_eq!(sample.balance, 50.0);
    assert_eq!(sample.rotation_count, 7);

    // The left report survives the timeout.
    aggregator.report(Side::Right, 50.0);
    assert_eq!(aggregator.wait_both().await, [100.0, 50.0]);
}

#[test]
fn zero_power_is_balanced() {
    let sample =
        LowSpeedAggregator::<NoopRawMutex>::build(&rotation(), Some([0.0, 0.0]));
    assert_eq!(sample.power, 0.0);
    assert_eq!(sample.balance, 50.0);

    let sample = LowSpeedAggregator::<NoopRawMutex>::build(
        &RotationSnapshot::default(),
        None,
    );
    assert_eq!(sample.timestamp, 0);
    assert_eq!(sample.cadence(), 0.0);
}

// ---------------------------------------------------------------------------
// Interrupt handoff and enable gate
// ---------------------------------------------------------------------------

#[futures_test::test]
async fn data_ready_keeps_latest_timestamp() {
    let ready = DataReady::<NoopRawMutex>::new();
    assert!(ready.try_take().is_none());

    ready.notify(10);
    assert_eq!(ready.wait().await, 10);
    assert_eq!(ready.overwritten(), 0);

    ready.notify(20);
    ready.notify(30);
    assert_eq!(ready.overwritten(), 1);
    assert_eq!(ready.try_take(), Some(30));
    assert!(poll_once(ready.wait()).is_pending());
}

#[futures_test::test]
async fn data_ready_counts_only_unconsumed_overwrites() {
    let ready = DataReady::<NoopRawMutex>::new();
    for t in 1..=5u64 {
        ready.notify(t * 100);
        assert_eq!(ready.try_take(), Some(t * 100));
    }
    assert_eq!(ready.overwritten(), 0);

    ready.notify(600);
    assert_eq!(ready.wait().await, 600);
    ready.notify(700);
    ready.notify(800);
    ready.notify(900);
    assert_eq!(ready.overwritten(), 2);
    assert_eq!(ready.wait().await, 900);
    assert!(ready.try_take().is_none());
}

#[futures_test::test]
async fn gate_parks_until_enabled() {
    let gate = EnableGate::<NoopRawMutex, 2>::new();
    let mut receiver = gate.receiver().unwrap();
    let _second = gate.receiver().unwrap();
    assert!(gate.receiver().is_none());

    assert!(!receiver.is_enabled());
    assert!(poll_once(receiver.wait_enabled()).is_pending());
    receiver.wait_disabled().await;

    gate.set(true);
    receiver.wait_enabled().await;
    assert!(receiver.is_enabled());
}

#[futures_test::test]
async fn per_side_captures_are_independent() {
    let ready: [DataReady<NoopRawMutex>; 2] =
        [DataReady::new(), DataReady::new()];

    ready[Side::Left.index()].notify(1_000);
    ready[Side::Right.index()].notify(1_040);
    ready[Side::Left.index()].notify(13_500);

    // The stamp taken at the edge is what the channel sees, however late it
    // gets to run.
    assert_eq!(ready[Side::Right.index()].wait().await, 1_040);
    assert_eq!(ready[Side::Left.index()].wait().await, 13_500);
    assert_eq!(ready[Side::Left.index()].overwritten(), 1);
    assert_eq!(ready[Side::Right.index()].overwritten(), 0);
}

#[futures_test::test]
async fn amplifier_power_is_separate_from_enable() {
    let state = MeterState::<NoopRawMutex>::new(&MeterConfig::default());
    let mut amplifiers = state.amplifiers.receiver().unwrap();
    let mut gate = state.gate.receiver().unwrap();

    state.set_enabled(true);
    gate.wait_enabled().await;
    assert!(poll_once(amplifiers.wait_enabled()).is_pending());

    state.amplifiers.set(true);
    amplifiers.wait_enabled().await;

    state.amplifiers.set(false);
    assert!(gate.is_enabled());
    assert!(!amplifiers.is_enabled());
}

#[futures_test::test]
async fn meter_offset_request_reaches_channels() {
    let state = MeterState::<NoopRawMutex>::new(&MeterConfig::default());
    let mut channel = power_meter_core::StrainChannel::new(Side::Right, &state);

    assert!(!channel.is_calibrating());
    state.begin_offset_calibration();
    channel.handle_ready(1_000, |_| Ok::<_, ()>(0)).unwrap();
    assert!(channel.is_calibrating());
}
