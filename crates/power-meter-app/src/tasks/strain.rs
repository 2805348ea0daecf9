use crate::prelude::*;
use embassy_futures::join::join;
use embassy_nrf::gpio::{AnyPin, Input, Pull};
use embassy_nrf::Peri;
use embassy_time::with_timeout;
use power_meter_core::{Acquired, StrainChannel};

/// A conversion is due every 12.5 ms; this long without one means the
/// amplifier is off or stuck.
const STRAIN_TIMEOUT: Duration = Duration::from_millis(100);

/// Stamps every DOUT/DRDY falling edge of one amplifier and hands it to
/// [`strain_task`].
#[embassy_executor::task(pool_size = 2)]
pub async fn strain_irq_task(side: Side, drdy: Peri<'static, AnyPin>) {
    let mut drdy = Input::new(drdy, Pull::None);
    let ready = &STRAIN_READY[side.index()];
    loop {
        drdy.wait_for_falling_edge().await;
        ready.notify(now_micros());
    }
}

/// Acquisition loop of one crank arm.
///
/// The read is clocked out as soon as the capture arrives, the processing of
/// that sample then overlaps the wait for the next conversion.
#[embassy_executor::task(pool_size = 2)]
pub async fn strain_task(
    side: Side,
    meter: &'static Meter,
    resources: &'static mut AmpChannelResources,
) {
    let mut channel = StrainChannel::new(side, meter);
    let mut gate = unwrap!(meter.gate.receiver());
    let mut amplifiers = unwrap!(meter.amplifiers.receiver());
    let ready = &STRAIN_READY[side.index()];
    // Kept for the lifetime of the task, the DRDY handle shares its pin.
    let mut amp = resources.configure();

    loop {
        gate.wait_enabled().await;
        amplifiers.wait_enabled().await;
        // Powered and reset, the next conversion carries the calibration.
        channel.start();
        // Edges while the amplifier was off carry no data.
        let _ = ready.try_take();
        info!("Strain channel {:?} running", side);

        let mut pending: Option<Acquired> = None;
        while gate.is_enabled() && amplifiers.is_enabled() {
            let (captured, ()) = join(
                with_timeout(STRAIN_TIMEOUT, ready.wait()),
                async {
                    if let Some(acquired) = pending.take() {
                        channel.process(acquired);
                    }
                },
            )
            .await;

            match captured {
                Ok(timestamp) => {
                    let read = |calibrate| amp.read(calibrate);
                    match channel.acquire(timestamp, read) {
                        Ok(acquired) => pending = Some(acquired),
                        Err(_e) => {
                            warn!("Strain read on {:?} failed: {:?}", side, _e)
                        }
                    }
                }
                Err(_) => channel.handle_timeout(now_micros()),
            }
        }

        if let Some(acquired) = pending.take() {
            channel.process(acquired);
        }
        info!("Strain channel {:?} parked", side);
    }
}
