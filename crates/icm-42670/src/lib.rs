#![no_std]

use bitflags::bitflags;
use embedded_hal_async::{delay, spi};
use heapless::Vec;

pub mod ll;
use ll::reg;

/// Bytes in one FIFO packet with accel, gyro, temperature and timestamp.
pub const PACKET_LEN: usize = 16;
/// Packets drained by one [`Icm42670::read_fifo`] call.
pub const MAX_PACKETS: usize = 8;
/// Marks a sample the sensor could not produce.
const INVALID_SAMPLE: i16 = i16::MIN;

#[derive(derive_more::From, Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<SpiError> {
    Spi(SpiError),
    #[from(ignore)]
    InvalidWhoAmI(u8),
    /// The FIFO filled up and samples were lost. It has been flushed.
    #[from(ignore)]
    FifoOverflow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AccelRange {
    G16 = 0,
    G8 = 1,
    G4 = 2,
    G2 = 3,
}

impl AccelRange {
    pub fn g(self) -> f32 {
        match self {
            AccelRange::G16 => 16.0,
            AccelRange::G8 => 8.0,
            AccelRange::G4 => 4.0,
            AccelRange::G2 => 2.0,
        }
    }

    /// Smallest range that covers `g`, saturating at 16 g.
    pub fn covering(g: f32) -> Self {
        [AccelRange::G2, AccelRange::G4, AccelRange::G8]
            .into_iter()
            .find(|range| g <= range.g())
            .unwrap_or(AccelRange::G16)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GyroRange {
    Dps2000 = 0,
    Dps1000 = 1,
    Dps500 = 2,
    Dps250 = 3,
}

impl GyroRange {
    pub fn dps(self) -> f32 {
        match self {
            GyroRange::Dps2000 => 2000.0,
            GyroRange::Dps1000 => 1000.0,
            GyroRange::Dps500 => 500.0,
            GyroRange::Dps250 => 250.0,
        }
    }

    /// Smallest range that covers `dps`, saturating at 2000 dps.
    pub fn covering(dps: f32) -> Self {
        [GyroRange::Dps250, GyroRange::Dps500, GyroRange::Dps1000]
            .into_iter()
            .find(|range| dps <= range.dps())
            .unwrap_or(GyroRange::Dps2000)
    }
}

/// Output data rate for the low noise modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Odr {
    Hz1600 = 5,
    Hz800 = 6,
    Hz400 = 7,
    Hz200 = 8,
    Hz100 = 9,
    Hz50 = 10,
    Hz25 = 11,
    Hz12_5 = 12,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    pub accel_range: AccelRange,
    pub gyro_range: GyroRange,
    pub odr: Odr,
    /// Packets in the FIFO before the interrupt fires. 1 gives an interrupt
    /// per sample.
    pub watermark: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            accel_range: AccelRange::G4,
            gyro_range: GyroRange::Dps2000,
            odr: Odr::Hz100,
            watermark: 1,
        }
    }
}

bitflags! {
    /// FIFO packet header byte flags
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct FifoHeader: u8 {
        /// FIFO is empty, the rest of the packet is meaningless.
        const MSG        = 0b1000_0000;
        /// Packet contains accelerometer data.
        const ACCEL      = 0b0100_0000;
        /// Packet contains gyroscope data.
        const GYRO       = 0b0010_0000;
        /// 20 byte high resolution packet.
        const HIRES      = 0b0001_0000;
        const TMST_FSYNC = 0b0000_1100;
        /// Accel ODR changed since the last accel packet.
        const ODR_ACCEL  = 0b0000_0010;
        /// Gyro ODR changed since the last gyro packet.
        const ODR_GYRO   = 0b0000_0001;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for FifoHeader {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "FifoHeader({=u8:#x})", self.bits())
    }
}

/// One decoded FIFO packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FifoPacket {
    pub header: FifoHeader,
    pub accel: [i16; 3],
    pub gyro: [i16; 3],
    /// Die temperature, 0.5 degC per LSB around 25 degC.
    pub temperature: i8,
    pub timestamp: u16,
}

impl FifoPacket {
    /// Decodes a 16 byte packet. Returns `None` for the empty marker.
    pub fn parse(bytes: &[u8; PACKET_LEN]) -> Option<Self> {
        let header = FifoHeader::from_bits_retain(bytes[0]);
        if header.contains(FifoHeader::MSG) {
            return None;
        }

        let word = |i: usize| i16::from_be_bytes([bytes[i], bytes[i + 1]]);
        Some(Self {
            header,
            accel: [word(1), word(3), word(5)],
            gyro: [word(7), word(9), word(11)],
            temperature: bytes[13] as i8,
            timestamp: u16::from_be_bytes([bytes[14], bytes[15]]),
        })
    }

    pub fn accel_valid(&self) -> bool {
        self.header.contains(FifoHeader::ACCEL)
            && !self.accel.contains(&INVALID_SAMPLE)
    }

    pub fn gyro_valid(&self) -> bool {
        self.header.contains(FifoHeader::GYRO)
            && !self.gyro.contains(&INVALID_SAMPLE)
    }

    pub fn temperature_celsius(&self) -> f32 {
        self.temperature as f32 / 2.0 + 25.0
    }
}

pub struct Icm42670<SPI, D> {
    pub device: ll::DeviceInterface<SPI, D>,
    config: Config,
}

impl<SPI: spi::SpiDevice, D: delay::DelayNs> Icm42670<SPI, D> {
    pub fn new(spi: SPI, delay: D) -> Self {
        Self {
            device: ll::DeviceInterface::new(spi, delay),
            config: Config::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Resets the device configuration and checks it answers.
    pub async fn init(&mut self) -> Result<(), Error<SPI::Error>> {
        self.device
            .write_register(
                reg::SIGNAL_PATH_RESET,
                ll::SOFT_RESET_DEVICE_CONFIG,
            )
            .await?;
        self.device.delay_us(1_000).await;

        let who_am_i = self.device.read_register(reg::WHO_AM_I).await?;
        if who_am_i != ll::WHO_AM_I_VALUE {
            return Err(Error::InvalidWhoAmI(who_am_i));
        }

        self.device
            .write_register(
                reg::INT_CONFIG,
                ll::INT1_PUSH_PULL | ll::INT1_ACTIVE_HIGH,
            )
            .await?;
        Ok(())
    }

    /// Streams accel and gyro samples into the FIFO and raises INT1 when
    /// `config.watermark` packets are waiting.
    pub async fn start(
        &mut self,
        config: Config,
    ) -> Result<(), Error<SPI::Error>> {
        // MREG access needs the oscillator running.
        self.device.write_register(reg::PWR_MGMT0, ll::PWR_IDLE).await?;
        for _ in 0..10 {
            let ready = self.device.read_register(reg::MCLK_RDY).await?;
            if ready & ll::MCLK_READY != 0 {
                break;
            }
            self.device.delay_us(100).await;
        }

        self.device
            .write_mreg1(
                ll::mreg1::FIFO_CONFIG5,
                ll::FIFO_WM_GT_TH | ll::FIFO_GYRO_EN | ll::FIFO_ACCEL_EN,
            )
            .await?;

        let [wm_high, wm_low] = config.watermark.min(0x0fff).to_be_bytes();
        self.device.write_register(reg::FIFO_CONFIG2, wm_low).await?;
        self.device.write_register(reg::FIFO_CONFIG3, wm_high).await?;
        // Stream mode, not bypassed.
        self.device.write_register(reg::FIFO_CONFIG1, 0).await?;

        self.device
            .write_register(
                reg::GYRO_CONFIG0,
                ll::fs_sel(config.gyro_range as u8) | config.odr as u8,
            )
            .await?;
        self.device
            .write_register(
                reg::ACCEL_CONFIG0,
                ll::fs_sel(config.accel_range as u8) | config.odr as u8,
            )
            .await?;

        self.flush().await?;
        self.device
            .write_register(reg::INT_SOURCE0, ll::FIFO_THS)
            .await?;
        self.device
            .write_register(
                reg::PWR_MGMT0,
                ll::GYRO_MODE_LN | ll::ACCEL_MODE_LN,
            )
            .await?;
        // Gyro start up time.
        self.device.delay_us(45_000).await;

        self.config = config;
        Ok(())
    }

    /// Turns both sensors off and silences INT1.
    pub async fn stop(&mut self) -> Result<(), Error<SPI::Error>> {
        self.device.write_register(reg::INT_SOURCE0, 0).await?;
        self.device.write_register(reg::PWR_MGMT0, 0).await?;
        self.device
            .write_register(reg::FIFO_CONFIG1, ll::FIFO_BYPASS)
            .await?;
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<(), Error<SPI::Error>> {
        self.device
            .write_register(reg::SIGNAL_PATH_RESET, ll::FIFO_FLUSH)
            .await?;
        self.device.delay_us(2).await;
        Ok(())
    }

    /// Bytes currently held in the FIFO.
    pub async fn fifo_count(&mut self) -> Result<u16, Error<SPI::Error>> {
        let mut count = [0u8; 2];
        self.device
            .read_registers(reg::FIFO_COUNTH, &mut count)
            .await?;
        Ok(u16::from_be_bytes(count))
    }

    /// Drains up to [`MAX_PACKETS`] packets from the FIFO.
    pub async fn read_fifo(
        &mut self,
    ) -> Result<Vec<FifoPacket, MAX_PACKETS>, Error<SPI::Error>> {
        let mut packets = Vec::new();

        let status = self.device.read_register(reg::INT_STATUS).await?;
        if status & ll::FIFO_FULL != 0 {
            self.flush().await?;
            return Err(Error::FifoOverflow);
        }

        let available = self.fifo_count().await? as usize / PACKET_LEN;
        let count = available.min(MAX_PACKETS);
        if count == 0 {
            return Ok(packets);
        }

        let mut buf = [0u8; PACKET_LEN * MAX_PACKETS];
        let buf = &mut buf[..count * PACKET_LEN];
        self.device.read_registers(reg::FIFO_DATA, buf).await?;

        for chunk in buf.chunks_exact(PACKET_LEN) {
            let Ok(bytes) = <&[u8; PACKET_LEN]>::try_from(chunk) else {
                break;
            };
            match FifoPacket::parse(bytes) {
                Some(packet) => {
                    // Capacity matches the number of chunks.
                    let _ = packets.push(packet);
                }
                None => break,
            }
        }
        Ok(packets)
    }
}
