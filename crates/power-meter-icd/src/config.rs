use postcard_schema::Schema;
use serde::{Deserialize, Serialize};

use crate::OrientationState;

/// Row-major 2x2 matrix.
pub type Mat2 = [[f32; 2]; 2];

/// Strain gauge calibration for one side.
#[derive(Debug, PartialEq, Serialize, Deserialize, Schema, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalibrationParameters {
    /// Raw ADC counts at zero load.
    pub offset: u32,
    /// Nm per count.
    pub coefficient: f32,
    /// Temperature the coefficient was measured at, degrees C.
    pub temperature_test_point: f32,
    /// Fractional change per degree C.
    pub temperature_coefficient: f32,
}

impl Default for CalibrationParameters {
    fn default() -> Self {
        Self {
            offset: 0,
            coefficient: 1.0,
            temperature_test_point: 20.0,
            temperature_coefficient: 0.0,
        }
    }
}

/// Orientation filter tuning. Fixed for the lifetime of a filter instance.
#[derive(Debug, PartialEq, Serialize, Deserialize, Schema, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FilterConfig {
    /// Process (environment) noise covariance.
    pub q: Mat2,
    /// Measurement noise covariance.
    pub r: Mat2,
    pub x0: OrientationState,
    /// Initial and low-confidence covariance.
    pub p0: Mat2,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            q: [[0.002, 0.0], [0.0, 0.1]],
            r: [[100.0, 0.0], [0.0, 0.01]],
            x0: OrientationState::new(0.0, 0.0),
            p0: [[1e6, 0.0], [0.0, 1e6]],
        }
    }
}

/// IMU processing settings.
#[derive(Debug, PartialEq, Serialize, Deserialize, Schema, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ImuSettings {
    /// Emit every Nth sample. Zero or negative disables IMU samples.
    pub decimation: i8,
    /// Mounting radius of the IMU along x and y, metres.
    pub offsets: [f32; 2],
    pub accel_range_g: f32,
    pub gyro_range_dps: f32,
}

impl Default for ImuSettings {
    fn default() -> Self {
        Self {
            decimation: 1,
            offsets: [0.0, 0.0],
            accel_range_g: crate::IMU_ACCEL_RANGE_G,
            gyro_range_dps: crate::IMU_GYRO_RANGE_DPS,
        }
    }
}

#[derive(
    Debug, Default, PartialEq, Serialize, Deserialize, Schema, Clone, Copy,
)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MeterConfig {
    pub filter: FilterConfig,
    pub strain: [CalibrationParameters; 2],
    pub imu: ImuSettings,
}
