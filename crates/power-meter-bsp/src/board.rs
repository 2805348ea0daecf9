use embassy_nrf::gpio::AnyPin;
use embassy_nrf::interrupt::Priority;
use embassy_nrf::peripherals::{
    self, P0_01, P0_02, P0_20, P1_04, SAADC, UARTE0, WDT,
};
use embassy_nrf::Peri;

/// Chip select of the IMU. The data ready line is handed out separately as
/// [`PowerMeterBoard::imu_irq`] so it can be watched from its own task.
pub struct ImuResources {
    pub cs: Peri<'static, peripherals::P0_11>,
}

pub struct Spi3BusResources {
    pub sclk: Peri<'static, peripherals::P0_15>,
    pub mosi: Peri<'static, peripherals::P0_14>,
    pub miso: Peri<'static, peripherals::P0_16>,
    pub spim: Peri<'static, peripherals::SPI3>,
}

/// Bus shared by the two crank arm temperature sensors.
pub struct Twim1BusResources {
    pub twim: Peri<'static, peripherals::TWISPI1>,
    pub sda: Peri<'static, peripherals::P0_04>,
    pub scl: Peri<'static, peripherals::P0_06>,
}

/// Serial lines of one ADS1232 strain amplifier.
pub struct AmpChannelResources {
    /// DOUT/DRDY, falls when a conversion is ready.
    pub dout: Peri<'static, AnyPin>,
    pub sclk: Peri<'static, AnyPin>,
}

/// Lines shared by both strain amplifiers.
pub struct AmpPowerResources {
    /// PDWN of both ADS1232.
    pub pwdn: Peri<'static, peripherals::P1_03>,
    /// Enables the bridge excitation and amplifier supply.
    pub supply: Peri<'static, peripherals::P1_01>,
}

/// Represents all the peripherals and pins available on the power meter.
pub struct PowerMeterBoard {
    /// User button, active low.
    pub button: Peri<'static, P1_04>,
    /// IMU INT1, rising edge on FIFO watermark.
    pub imu_irq: Peri<'static, P0_01>,
    /// Battery voltage divider (AIN0).
    pub battery: Peri<'static, P0_02>,
    /// Sample stream output.
    pub uart_tx: Peri<'static, P0_20>,
    /// Peripherals for the IMU.
    pub imu_resources: ImuResources,
    /// Peripherals for SPI 3 bus.
    pub spi3_bus_resources: Spi3BusResources,
    /// Peripherals for I2C bus.
    pub twim1_bus_resources: Twim1BusResources,
    /// Left crank arm amplifier.
    pub amp_left: AmpChannelResources,
    /// Right crank arm amplifier.
    pub amp_right: AmpChannelResources,
    pub amp_power: AmpPowerResources,
    /// Watchdog Timer.
    pub wdt: Peri<'static, WDT>,
    /// Successive Approximation Analog-to-Digital Converter.
    pub saadc: Peri<'static, SAADC>,
    /// UART (Universal Asynchronous Receiver-Transmitter) 0.
    pub uarte0: Peri<'static, UARTE0>,
}

impl Default for PowerMeterBoard {
    fn default() -> Self {
        let mut config = embassy_nrf::config::Config::default();
        config.gpiote_interrupt_priority = Priority::P2;
        config.time_interrupt_priority = Priority::P2;
        Self::new(config)
    }
}

impl PowerMeterBoard {
    /// Create a new instance based on HAL configuration
    pub fn new(config: embassy_nrf::config::Config) -> Self {
        let p = embassy_nrf::init(config);

        Self {
            button: p.P1_04,
            imu_irq: p.P0_01,
            battery: p.P0_02,
            uart_tx: p.P0_20,
            imu_resources: ImuResources { cs: p.P0_11 },
            spi3_bus_resources: Spi3BusResources {
                sclk: p.P0_15,
                mosi: p.P0_14,
                miso: p.P0_16,
                spim: p.SPI3,
            },
            twim1_bus_resources: Twim1BusResources {
                twim: p.TWISPI1,
                sda: p.P0_04,
                scl: p.P0_06,
            },
            amp_left: AmpChannelResources {
                dout: p.P0_13.into(),
                sclk: p.P0_17.into(),
            },
            amp_right: AmpChannelResources {
                dout: p.P0_24.into(),
                sclk: p.P0_25.into(),
            },
            amp_power: AmpPowerResources { pwdn: p.P1_03, supply: p.P1_01 },
            wdt: p.WDT,
            saadc: p.SAADC,
            uarte0: p.UARTE0,
        }
    }
}
