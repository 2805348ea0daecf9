use crate::prelude::*;
use embassy_embedded_hal::shared_bus::asynch::i2c::I2cDevice;
use embassy_nrf::peripherals::{P0_02, SAADC};
use embassy_nrf::saadc::{
    self, ChannelConfig, Config, Gain, Input as _, Reference, Saadc,
};
use embassy_nrf::interrupt::InterruptExt;
use embassy_nrf::{bind_interrupts, interrupt, Peri};
use embedded_hal_async::i2c::I2c;
use power_meter_core::{battery_millivolts, p3t1755_celsius, TemperatureSlot};
use power_meter_icd::HousekeepingSample;

const HOUSEKEEPING_PERIOD: Duration = Duration::from_secs(5);

/// P3T1755 strain gauge temperature sensors, one per crank arm.
const LEFT_SENSOR_ADDRESS: u8 = 0x48;
const RIGHT_SENSOR_ADDRESS: u8 = 0x49;

mod p3t1755 {
    pub const TEMPERATURE: u8 = 0x00;
    pub const CONFIG: u8 = 0x01;
    /// Shutdown plus a single conversion.
    pub const ONE_SHOT: u8 = 0x81;
    pub const CONVERSION_MS: u64 = 12;
}

/// A temperature sensor kept in shutdown between one-shot conversions.
struct P3t1755<I> {
    i2c: I,
    address: u8,
}

impl<I: I2c> P3t1755<I> {
    fn new(i2c: I, address: u8) -> Self {
        Self { i2c, address }
    }

    async fn read_celsius(&mut self) -> Result<f32, I::Error> {
        self.i2c
            .write(self.address, &[p3t1755::CONFIG, p3t1755::ONE_SHOT])
            .await?;
        Timer::after_millis(p3t1755::CONVERSION_MS).await;
        let mut register = [0u8; 2];
        self.i2c
            .write_read(self.address, &[p3t1755::TEMPERATURE], &mut register)
            .await?;
        Ok(p3t1755_celsius(register))
    }
}

/// Reads the crank arm temperatures and the battery every
/// [`HOUSEKEEPING_PERIOD`].
///
/// The strain channels pick up the temperatures from the cache; the IMU die
/// temperature is already kept current by the IMU task.
#[embassy_executor::task]
pub async fn housekeeping_task(
    meter: &'static Meter,
    bus_resources: &'static mut Twim1BusResources,
    battery: Peri<'static, P0_02>,
    adc: Peri<'static, SAADC>,
) {
    let bus = bus_resources.get_bus::<NoopRawMutex>();
    let mut left = P3t1755::new(I2cDevice::new(&bus), LEFT_SENSOR_ADDRESS);
    let mut right = P3t1755::new(I2cDevice::new(&bus), RIGHT_SENSOR_ADDRESS);

    // Full scale is VDD.
    let mut channel_cfg =
        ChannelConfig::single_ended(battery.degrade_saadc());
    channel_cfg.reference = Reference::VDD1_4;
    channel_cfg.gain = Gain::GAIN1_4;
    interrupt::SAADC.set_priority(interrupt::Priority::P3);
    bind_interrupts!(struct BatteryIrqs {SAADC => saadc::InterruptHandler;});
    let mut saadc =
        Saadc::new(adc, BatteryIrqs, Config::default(), [channel_cfg]);
    saadc.calibrate().await;

    let mut gate = unwrap!(meter.gate.receiver());
    let mut buf = [0i16; 1];
    loop {
        gate.wait_enabled().await;

        let temperatures = &meter.temperatures;
        let reading = left.read_celsius().await;
        temperatures.store_result(TemperatureSlot::Left, reading);
        let reading = right.read_celsius().await;
        temperatures.store_result(TemperatureSlot::Right, reading);

        saadc.sample(&mut buf).await;
        let battery_mv = battery_millivolts(buf[0].max(0) as u16);

        let sample = HousekeepingSample {
            timestamp: now_micros(),
            temperatures: temperatures.all(),
            battery_mv,
        };
        debug!(
            "Housekeeping: {} degC, {} mV",
            sample.average_strain_temperature(),
            battery_mv
        );
        let _ = meter.outbox.housekeeping.push(sample);

        Timer::after(HOUSEKEEPING_PERIOD).await;
    }
}
