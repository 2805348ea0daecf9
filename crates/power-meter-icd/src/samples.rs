use postcard_schema::Schema;
use serde::{Deserialize, Serialize};

use crate::INVALID_TEMPERATURE;

const RAD_PER_SEC_TO_RPM: f32 = 60.0 / (2.0 * core::f32::consts::PI);

/// Crank angle and angular velocity.
#[derive(
    Debug, Default, PartialEq, Serialize, Deserialize, Schema, Clone, Copy,
)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OrientationState {
    /// Radians, in (-pi, pi].
    pub angle: f32,
    /// Radians per second.
    pub angular_velocity: f32,
}

impl OrientationState {
    pub const fn new(angle: f32, angular_velocity: f32) -> Self {
        Self { angle, angular_velocity }
    }
}

/// Fields shared by every per-sample record.
#[derive(
    Debug, Default, PartialEq, Serialize, Deserialize, Schema, Clone, Copy,
)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BaseSample {
    /// Microseconds since boot.
    pub timestamp: u64,
    pub orientation: OrientationState,
}

impl BaseSample {
    /// Instantaneous cadence in revolutions per minute.
    pub fn cadence(&self) -> f32 {
        self.orientation.angular_velocity * RAD_PER_SEC_TO_RPM
    }
}

/// One strain reading aligned to the predicted crank position.
#[derive(
    Debug, Default, PartialEq, Serialize, Deserialize, Schema, Clone, Copy,
)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HighSpeedSample {
    pub base: BaseSample,
    pub raw: u32,
    /// Newton metres.
    pub torque: f32,
}

impl HighSpeedSample {
    /// Instantaneous power in watts.
    pub fn power(&self) -> f32 {
        self.base.orientation.angular_velocity * self.torque
    }
}

#[derive(
    Debug, Default, PartialEq, Serialize, Deserialize, Schema, Clone, Copy,
)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ImuSample {
    pub base: BaseSample,
    /// m/s^2, x and y corrected for centripetal acceleration.
    pub accel: [f32; 3],
    /// rad/s
    pub gyro: [f32; 3],
}

/// Sent once per detected rotation, or on timeout when the crank is idle.
#[derive(
    Debug, Default, PartialEq, Serialize, Deserialize, Schema, Clone, Copy,
)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LowSpeedSample {
    pub rotation_count: u32,
    /// Microseconds.
    pub last_rotation_duration: u32,
    /// Time of the last completed rotation.
    pub timestamp: u64,
    /// Total of both sides in watts.
    pub power: f32,
    /// Percentage contributed by the right side.
    pub balance: f32,
}

impl LowSpeedSample {
    /// Cadence over the last rotation in revolutions per minute.
    pub fn cadence(&self) -> f32 {
        if self.last_rotation_duration != 0 {
            60e6 / self.last_rotation_duration as f32
        } else {
            0.0
        }
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Schema, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HousekeepingSample {
    pub timestamp: u64,
    /// Left strain gauge, right strain gauge and IMU, degrees C.
    pub temperatures: [f32; 3],
    pub battery_mv: u32,
}

impl Default for HousekeepingSample {
    fn default() -> Self {
        Self {
            timestamp: 0,
            temperatures: [INVALID_TEMPERATURE; 3],
            battery_mv: 0,
        }
    }
}

impl HousekeepingSample {
    pub fn average_strain_temperature(&self) -> f32 {
        (self.temperatures[0] + self.temperatures[1]) / 2.0
    }
}
