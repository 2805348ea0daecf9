use crate::prelude::*;
use embassy_futures::select::{select, select4, Either, Either4};
use embassy_nrf::interrupt::InterruptExt;
use embassy_nrf::peripherals::{P0_20, UARTE0};
use embassy_nrf::{bind_interrupts, interrupt, uarte, Peri};
use power_meter_icd::{Frame, MAX_FRAME_LEN};

bind_interrupts!(struct UarteIrqs {
    UARTE0 => uarte::InterruptHandler<embassy_nrf::peripherals::UARTE0>;
});

/// Drains the outbox and writes every sample as a COBS framed postcard
/// message.
#[embassy_executor::task]
pub async fn transport_task(
    meter: &'static Meter,
    uarte: Peri<'static, UARTE0>,
    tx: Peri<'static, P0_20>,
) {
    let mut config = uarte::Config::default();
    config.parity = uarte::Parity::EXCLUDED;
    config.baudrate = uarte::Baudrate::BAUD1M;
    interrupt::UARTE0.set_priority(interrupt::Priority::P3);
    let mut uart = uarte::UarteTx::new(uarte, UarteIrqs, tx, config);

    let outbox = &meter.outbox;
    let mut buf = [0u8; MAX_FRAME_LEN];
    loop {
        let frame = match select4(
            outbox.low_speed.receive(),
            outbox.housekeeping.receive(),
            select(
                outbox.high_speed(Side::Left).receive(),
                outbox.high_speed(Side::Right).receive(),
            ),
            outbox.imu.receive(),
        )
        .await
        {
            Either4::First(sample) => Frame::LowSpeed(sample),
            Either4::Second(sample) => Frame::Housekeeping(sample),
            Either4::Third(Either::First(sample)) => {
                Frame::HighSpeed(Side::Left, sample)
            }
            Either4::Third(Either::Second(sample)) => {
                Frame::HighSpeed(Side::Right, sample)
            }
            Either4::Fourth(sample) => Frame::Imu(sample),
        };

        match postcard::to_slice_cobs(&frame, &mut buf) {
            Ok(encoded) => {
                if let Err(_e) = uart.write(encoded).await {
                    warn!("Transport write failed: {:?}", _e);
                }
            }
            Err(_e) => error!("Failed to encode frame: {:?}", _e),
        }
    }
}
