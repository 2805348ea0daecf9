use crate::prelude::*;

/// No rotation within this time reports the crank as idle.
const LOW_SPEED_TIMEOUT: Duration = Duration::from_secs(3);

/// Emits one [`icd::LowSpeedSample`] per crank rotation, or an idle sample
/// when the crank stops.
#[embassy_executor::task]
pub async fn low_speed_task(meter: &'static Meter) {
    let mut gate = unwrap!(meter.gate.receiver());
    loop {
        gate.wait_enabled().await;
        let sample = meter
            .low_speed
            .next_sample(
                || meter.rotations.snapshot(),
                Timer::after(LOW_SPEED_TIMEOUT),
            )
            .await;
        trace!(
            "Low speed: {} W, balance {}, {} rpm",
            sample.power,
            sample.balance,
            sample.cadence()
        );
        let _ = meter.outbox.low_speed.push(sample);
    }
}
