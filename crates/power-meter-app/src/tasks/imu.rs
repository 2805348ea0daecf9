use crate::prelude::*;
use embassy_futures::select::{select, Either};
use embassy_nrf::gpio::{Input, Pull};
use embassy_nrf::peripherals::P0_01;
use embassy_nrf::Peri;
use embassy_time::with_timeout;
use icm_42670::{AccelRange, Config, FifoPacket, GyroRange};
use power_meter_core::{OrientationUpdater, RawImuEvent};
use power_meter_icd::{ImuSettings, IMU_SAMPLE_RATE_HZ};

/// Longest expected gap between two IMU interrupts.
const IMU_TIMEOUT: Duration = Duration::from_secs(1);
const IMU_PERIOD_US: u64 = 1_000_000 / IMU_SAMPLE_RATE_HZ as u64;
const INIT_ATTEMPTS: usize = 5;

/// Stamps every IMU INT1 rising edge and hands it to [`imu_task`].
#[embassy_executor::task]
pub async fn imu_irq_task(irq: Peri<'static, P0_01>) {
    let mut int1 = Input::new(irq, Pull::None);
    loop {
        int1.wait_for_rising_edge().await;
        IMU_READY.notify(now_micros());
    }
}

/// Drains the IMU FIFO on every interrupt and feeds the orientation filter.
#[embassy_executor::task]
pub async fn imu_task(
    meter: &'static Meter,
    bus_resources: &'static mut Spi3BusResources,
    imu_resources: &'static mut ImuResources,
    settings: ImuSettings,
) {
    let bus = bus_resources.get_bus::<CriticalSectionRawMutex>();
    let mut imu = imu_resources.configure(&bus);

    let mut connected = false;
    for i in 0..INIT_ATTEMPTS {
        match imu.init().await {
            Ok(()) => {
                connected = true;
                break;
            }
            Err(_e) => {
                warn!("Retry connection attempt {:?} to IMU: {:?}", i, _e);
                Timer::after_millis(1000).await;
            }
        }
    }
    if !connected {
        error!("IMU not detected, orientation unavailable");
        return;
    }

    let config = imu_config(&settings);
    let settings = ImuSettings {
        accel_range_g: config.accel_range.g(),
        gyro_range_dps: config.gyro_range.dps(),
        ..settings
    };
    let mut updater = OrientationUpdater::new(meter, &settings);
    let mut gate = unwrap!(meter.gate.receiver());

    loop {
        gate.wait_enabled().await;
        if let Err(_e) = imu.start(config).await {
            error!("Failed to start IMU: {:?}", _e);
            Timer::after(IMU_TIMEOUT).await;
            continue;
        }
        // Anything captured while stopped is stale, and so is the estimate.
        let _ = IMU_READY.try_take();
        meter.orientation.restart();
        info!("IMU streaming");

        loop {
            match select(
                gate.wait_disabled(),
                with_timeout(IMU_TIMEOUT, IMU_READY.wait()),
            )
            .await
            {
                Either::First(()) => break,
                Either::Second(Err(_)) => {
                    warn!(
                        "No IMU interrupt within {} ms",
                        IMU_TIMEOUT.as_millis()
                    );
                }
                Either::Second(Ok(timestamp)) => match imu.read_fifo().await {
                    Ok(packets) => {
                        let count = packets.len();
                        for (i, packet) in packets.iter().enumerate() {
                            // The interrupt marks the newest packet.
                            let age = (count - 1 - i) as u64 * IMU_PERIOD_US;
                            let event = raw_event(
                                packet,
                                timestamp.saturating_sub(age),
                            );
                            let _ = updater.handle_event(&event);
                        }
                    }
                    Err(_e) => warn!("IMU read failed: {:?}", _e),
                },
            }
        }

        if let Err(_e) = imu.stop().await {
            warn!("Failed to stop IMU: {:?}", _e);
        }
        info!("IMU stopped");
    }
}

/// Smallest driver ranges covering the configured ones.
fn imu_config(settings: &ImuSettings) -> Config {
    Config {
        accel_range: AccelRange::covering(settings.accel_range_g),
        gyro_range: GyroRange::covering(settings.gyro_range_dps),
        ..Config::default()
    }
}

fn raw_event(packet: &FifoPacket, timestamp: u64) -> RawImuEvent {
    RawImuEvent {
        timestamp,
        accel: packet.accel,
        gyro: packet.gyro,
        temperature: packet.temperature,
        accel_valid: packet.accel_valid(),
        gyro_valid: packet.gyro_valid(),
    }
}
