use crate::prelude::*;

/// Switches the strain amplifiers with the enable gate.
///
/// The strain channels only start once the reset sequence has completed, so
/// their first read can carry the self calibration request.
#[embassy_executor::task]
pub async fn power_control_task(
    meter: &'static Meter,
    resources: &'static mut AmpPowerResources,
) {
    let mut power = resources.configure();
    let mut gate = unwrap!(meter.gate.receiver());
    loop {
        gate.wait_enabled().await;
        power.power_up().await;
        meter.amplifiers.set(true);
        info!("Strain amplifiers powered up");

        gate.wait_disabled().await;
        meter.amplifiers.set(false);
        power.power_down();
        info!("Strain amplifiers powered down");
    }
}
