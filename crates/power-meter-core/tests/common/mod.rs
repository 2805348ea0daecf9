#![allow(dead_code)]

use core::f32::consts::PI;

use power_meter_core::icd::{GRAVITY, IMU_ACCEL_RANGE_G, IMU_GYRO_RANGE_DPS};
use power_meter_core::RawImuEvent;

pub const IMU_PERIOD_US: u64 = 10_000;

const ACCEL_LSB: f32 = IMU_ACCEL_RANGE_G * GRAVITY / 32767.0;
const GYRO_LSB: f32 = IMU_GYRO_RANGE_DPS * PI / 180.0 / 32767.0;

/// Builds the event an IMU at crank angle `phi` turning at `omega` would
/// report. Gravity is laid out so the measured crank angle equals `phi`.
pub fn imu_event(timestamp: u64, phi: f32, omega: f32) -> RawImuEvent {
    let raw_accel = |v: f32| (v / ACCEL_LSB).round() as i16;
    RawImuEvent {
        timestamp,
        accel: [
            raw_accel(GRAVITY * phi.cos()),
            raw_accel(-GRAVITY * phi.sin()),
            0,
        ],
        gyro: [0, 0, (omega / GYRO_LSB).round() as i16],
        temperature: 0,
        accel_valid: true,
        gyro_valid: true,
    }
}
