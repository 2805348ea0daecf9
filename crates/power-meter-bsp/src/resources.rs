use crate::board::{
    AmpChannelResources, AmpPowerResources, ImuResources, Spi3BusResources,
    Twim1BusResources,
};
use ads1232::Ads1232;
use embassy_embedded_hal::shared_bus::asynch::spi::SpiDevice;
use embassy_nrf::{
    bind_interrupts,
    gpio::{AnyPin, Input, Level, Output, OutputDrive, Pin as _, Pull},
    interrupt::{self, InterruptExt},
    peripherals, spim, twim, Peri,
};
use embassy_sync::{blocking_mutex::raw::RawMutex, mutex::Mutex};
use embassy_time::Timer;
use icm_42670::Icm42670;

/// Time for the bridge supply to settle before the amplifiers are reset.
const SUPPLY_SETTLE_MS: u64 = 5;

pub type Imu<'a, 'b, MutexType> = Icm42670<
    SpiDevice<'a, MutexType, spim::Spim<'b>, Output<'a>>,
    embassy_time::Delay,
>;

pub type Amplifier<'a> = Ads1232<Input<'a>, Output<'a>, embassy_time::Delay>;

bind_interrupts!(struct SpiIrq {
    SPIM3 => spim::InterruptHandler<peripherals::SPI3>;
});

bind_interrupts!(struct TwimIrqs {
    TWISPI1 => twim::InterruptHandler<peripherals::TWISPI1>;
});

impl ImuResources {
    pub fn configure<'a, 'b, MutexType: RawMutex>(
        &'a mut self,
        bus: &'a Mutex<MutexType, spim::Spim<'b>>,
    ) -> Imu<'a, 'b, MutexType> {
        let cs =
            Output::new(self.cs.reborrow(), Level::High, OutputDrive::Standard);
        Icm42670::new(SpiDevice::new(bus, cs), embassy_time::Delay)
    }
}

impl AmpChannelResources {
    /// Builds the amplifier driver with SCLK parked low.
    pub fn configure(&mut self) -> Amplifier<'_> {
        let dout = Input::new(self.dout.reborrow(), Pull::None);
        let sclk = Output::new(
            self.sclk.reborrow(),
            Level::Low,
            OutputDrive::Standard,
        );
        Ads1232::new(dout, sclk, embassy_time::Delay)
    }

    /// A second handle on DOUT for stamping its falling edge.
    ///
    /// Both handles keep the pin an input without pull. The amplifier built
    /// by [`configure`](Self::configure) must stay alive while this one is
    /// in use, dropping it disconnects the input buffer.
    pub fn drdy(&self) -> Peri<'static, AnyPin> {
        let pin_port = self.dout.port() as u8 * 32 + self.dout.pin();
        // SAFETY: Neither handle changes the direction or the pull of the
        // pin, and only the DRDY handle configures edge sensing.
        unsafe { AnyPin::steal(pin_port) }
    }
}

/// Supply switch and shared PDWN line of the strain amplifiers.
pub struct AmpPower<'a> {
    pwdn: Output<'a>,
    supply: Output<'a>,
}

impl AmpPowerResources {
    /// Takes control of the power lines, leaving the amplifiers off.
    pub fn configure(&mut self) -> AmpPower<'_> {
        AmpPower {
            pwdn: Output::new(
                self.pwdn.reborrow(),
                Level::Low,
                OutputDrive::Standard,
            ),
            supply: Output::new(
                self.supply.reborrow(),
                Level::Low,
                OutputDrive::Standard,
            ),
        }
    }
}

impl AmpPower<'_> {
    /// Switches the supply on and runs the PDWN reset sequence.
    pub async fn power_up(&mut self) {
        self.supply.set_high();
        Timer::after_millis(SUPPLY_SETTLE_MS).await;
        // GPIO writes cannot fail on this chip.
        let _ =
            ads1232::reset_sequence(&mut self.pwdn, &mut embassy_time::Delay);
    }

    pub fn power_down(&mut self) {
        let _ = ads1232::power_down(&mut self.pwdn);
        self.supply.set_low();
    }
}

impl Twim1BusResources {
    pub fn get_bus<'a, MutexType: RawMutex>(
        &'a mut self,
    ) -> Mutex<MutexType, twim::Twim<'a>> {
        let config = twim::Config::default();
        interrupt::TWISPI1.set_priority(interrupt::Priority::P3);
        static RAM_BUFFER: static_cell::ConstStaticCell<[u8; 32]> =
            static_cell::ConstStaticCell::new([0; 32]);

        Mutex::new(twim::Twim::new(
            self.twim.reborrow(),
            TwimIrqs,
            self.sda.reborrow(),
            self.scl.reborrow(),
            config,
            RAM_BUFFER.take(),
        ))
    }
}

impl Spi3BusResources {
    pub fn get_bus<'a, MutexType: RawMutex>(
        &'a mut self,
    ) -> Mutex<MutexType, spim::Spim<'a>> {
        let mut config = spim::Config::default();
        config.mode = spim::MODE_3;
        config.frequency = spim::Frequency::M8;
        config.mosi_drive = OutputDrive::HighDrive;
        config.sck_drive = OutputDrive::HighDrive;
        interrupt::SPIM3.set_priority(interrupt::Priority::P3);
        Mutex::new(spim::Spim::new(
            self.spim.reborrow(),
            SpiIrq,
            self.sclk.reborrow(),
            self.miso.reborrow(),
            self.mosi.reborrow(),
            config,
        ))
    }
}
