#![cfg_attr(not(feature = "use-std"), no_std)]

use postcard_schema::Schema;
use serde::{Deserialize, Serialize};

mod config;
pub use config::*;

mod samples;
pub use samples::*;

// Constants
pub const OFFSET_COMPENSATION_SAMPLES: u16 = 200;
pub const INVALID_TEMPERATURE: f32 = -1000.0;
pub const SUPPLY_MILLIVOLTS: u32 = 3300;
pub const GRAVITY: f32 = 9.81;
pub const IMU_SAMPLE_RATE_HZ: u16 = 100;
pub const IMU_ACCEL_RANGE_G: f32 = 4.0;
pub const IMU_GYRO_RANGE_DPS: f32 = 2000.0;

/// Mechanical side of the crank a strain channel is mounted on.
#[derive(
    Debug, PartialEq, Eq, Serialize, Deserialize, Schema, Clone, Copy,
)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Side {
    Left = 0,
    Right = 1,
}

impl Side {
    pub const ALL: [Side; 2] = [Side::Left, Side::Right];

    pub const fn index(self) -> usize {
        self as usize
    }

    /// Bit used when reporting fresh data for this side.
    pub const fn bit(self) -> u8 {
        2 << (self as u8)
    }
}

impl TryFrom<u8> for Side {
    type Error = &'static str;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Side::Left),
            1 => Ok(Side::Right),
            _ => Err("Invalid side"),
        }
    }
}

/// One message on the outgoing data link.
#[derive(Debug, PartialEq, Serialize, Deserialize, Schema, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Frame {
    Housekeeping(HousekeepingSample),
    LowSpeed(LowSpeedSample),
    HighSpeed(Side, HighSpeedSample),
    Imu(ImuSample),
}

/// Largest encoded [`Frame`] including COBS overhead.
pub const MAX_FRAME_LEN: usize = 64;
