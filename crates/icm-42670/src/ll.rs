//! Low level register and interface definitions
use embedded_hal::spi::Operation;
use embedded_hal_async::{delay, spi};

/// Set on the register address for a read access.
const READ_FLAG: u8 = 0x80;
/// Settle time after an indirect register write.
const MREG_DELAY_US: u32 = 10;

/// Bank 0 user registers.
pub mod reg {
    pub const MCLK_RDY: u8 = 0x00;
    pub const SIGNAL_PATH_RESET: u8 = 0x02;
    pub const INT_CONFIG: u8 = 0x06;
    pub const TEMP_DATA1: u8 = 0x09;
    pub const PWR_MGMT0: u8 = 0x1F;
    pub const GYRO_CONFIG0: u8 = 0x20;
    pub const ACCEL_CONFIG0: u8 = 0x21;
    pub const FIFO_CONFIG1: u8 = 0x28;
    pub const FIFO_CONFIG2: u8 = 0x29;
    pub const FIFO_CONFIG3: u8 = 0x2A;
    pub const INT_SOURCE0: u8 = 0x2B;
    pub const INT_STATUS: u8 = 0x3A;
    pub const FIFO_COUNTH: u8 = 0x3D;
    pub const FIFO_DATA: u8 = 0x3F;
    pub const WHO_AM_I: u8 = 0x75;
    pub const BLK_SEL_W: u8 = 0x79;
    pub const MADDR_W: u8 = 0x7A;
    pub const M_W: u8 = 0x7B;
}

/// Registers in the MREG1 indirect bank.
pub mod mreg1 {
    pub const FIFO_CONFIG5: u8 = 0x01;
}

pub const WHO_AM_I_VALUE: u8 = 0x67;

// SIGNAL_PATH_RESET
pub const SOFT_RESET_DEVICE_CONFIG: u8 = 1 << 4;
pub const FIFO_FLUSH: u8 = 1 << 2;

// MCLK_RDY
pub const MCLK_READY: u8 = 1 << 3;

// INT_CONFIG: pulsed, push-pull, active high.
pub const INT1_PUSH_PULL: u8 = 1 << 1;
pub const INT1_ACTIVE_HIGH: u8 = 1 << 0;

// PWR_MGMT0
pub const PWR_IDLE: u8 = 1 << 4;
pub const GYRO_MODE_LN: u8 = 0b11 << 2;
pub const ACCEL_MODE_LN: u8 = 0b11;

// FIFO_CONFIG1
pub const FIFO_BYPASS: u8 = 1 << 0;

// INT_SOURCE0 and INT_STATUS
pub const FIFO_THS: u8 = 1 << 2;
pub const FIFO_FULL: u8 = 1 << 1;

// FIFO_CONFIG5
pub const FIFO_ACCEL_EN: u8 = 1 << 0;
pub const FIFO_GYRO_EN: u8 = 1 << 1;
pub const FIFO_WM_GT_TH: u8 = 1 << 5;

/// Selects the full scale range.
pub const fn fs_sel(bits: u8) -> u8 {
    (bits & 0b11) << 5
}

#[derive(Debug)]
pub struct DeviceInterface<SPI, D> {
    pub spi: SPI,
    pub(crate) delay: D,
}

impl<SPI: spi::SpiDevice, D: delay::DelayNs> DeviceInterface<SPI, D> {
    pub fn new(spi: SPI, delay: D) -> Self {
        Self { spi, delay }
    }

    pub async fn read_registers(
        &mut self,
        reg: u8,
        buf: &mut [u8],
    ) -> Result<(), SPI::Error> {
        self.spi
            .transaction(&mut [
                Operation::Write(&[reg | READ_FLAG]),
                Operation::Read(buf),
            ])
            .await
    }

    pub async fn read_register(&mut self, reg: u8) -> Result<u8, SPI::Error> {
        let mut buf = [0];
        self.read_registers(reg, &mut buf).await?;
        Ok(buf[0])
    }

    pub async fn write_register(
        &mut self,
        reg: u8,
        val: u8,
    ) -> Result<(), SPI::Error> {
        self.spi.write(&[reg, val]).await
    }

    pub async fn modify_register<F>(
        &mut self,
        reg: u8,
        f: F,
    ) -> Result<(), SPI::Error>
    where
        F: FnOnce(u8) -> u8,
    {
        let value = self.read_register(reg).await?;
        self.write_register(reg, f(value)).await
    }

    /// Writes a register in the MREG1 bank. The oscillator must be running,
    /// see [`PWR_IDLE`].
    pub async fn write_mreg1(
        &mut self,
        address: u8,
        val: u8,
    ) -> Result<(), SPI::Error> {
        self.write_register(reg::BLK_SEL_W, 0x00).await?;
        self.write_register(reg::MADDR_W, address).await?;
        self.write_register(reg::M_W, val).await?;
        self.delay.delay_us(MREG_DELAY_US).await;
        Ok(())
    }

    pub async fn delay_us(&mut self, us: u32) {
        self.delay.delay_us(us).await;
    }
}
