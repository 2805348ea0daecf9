//! IMU event processing: orientation updates and rotation detection.

use core::f32::consts::{FRAC_PI_2, FRAC_PI_3, PI};

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::housekeeping::TemperatureSlot;
use crate::icd::{
    BaseSample, ImuSample, ImuSettings, OrientationState, GRAVITY,
};
use crate::{CoreError, MeterState};

const FULL_SCALE: f32 = 32767.0;

/// One decoded IMU FIFO record, stamped with the interrupt capture time.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawImuEvent {
    /// Microseconds since boot, captured in the interrupt.
    pub timestamp: u64,
    pub accel: [i16; 3],
    pub gyro: [i16; 3],
    /// Raw die temperature, 0.5 degC per LSB around 25 degC.
    pub temperature: i8,
    pub accel_valid: bool,
    pub gyro_valid: bool,
}

/// One of three 120 degree crank sectors used for rotation hysteresis.
///
/// The +-60 degree boundaries are calibrated constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Sector {
    Trailing = 0,
    Middle = 1,
    Leading = 2,
}

impl Sector {
    pub fn from_angle(angle: f32) -> Self {
        if angle < -FRAC_PI_3 {
            Sector::Trailing
        } else if angle < FRAC_PI_3 {
            Sector::Middle
        } else {
            Sector::Leading
        }
    }
}

/// Tilt angle of the gravity vector in the sensor's x/y plane.
pub fn angle_from_acceleration(x: f32, y: f32) -> f32 {
    if x != 0.0 {
        let angle = libm::atanf(y / x);
        if x > 0.0 {
            angle
        } else if y >= 0.0 {
            PI + angle
        } else {
            -PI + angle
        }
    } else if y >= 0.0 {
        FRAC_PI_2
    } else {
        -FRAC_PI_2
    }
}

/// Converts raw readings to SI units for a given full-scale range.
#[derive(Debug, Clone, Copy)]
struct Scale {
    accel: f32,
    gyro: f32,
}

impl Scale {
    fn new(settings: &ImuSettings) -> Self {
        Self {
            accel: settings.accel_range_g * GRAVITY / FULL_SCALE,
            gyro: settings.gyro_range_dps * PI / 180.0 / FULL_SCALE,
        }
    }

    fn accel(&self, raw: i16) -> f32 {
        raw as f32 * self.accel
    }

    fn gyro(&self, raw: i16) -> f32 {
        raw as f32 * self.gyro
    }
}

/// Drives the orientation filter and rotation counter from IMU events.
pub struct OrientationUpdater<'a, M: RawMutex> {
    state: &'a MeterState<M>,
    scale: Scale,
    offsets: [f32; 2],
    decimation: i8,
    send_count: u8,
    last_sector: Sector,
    armed: bool,
}

impl<'a, M: RawMutex> OrientationUpdater<'a, M> {
    pub fn new(state: &'a MeterState<M>, settings: &ImuSettings) -> Self {
        Self {
            state,
            scale: Scale::new(settings),
            offsets: settings.offsets,
            decimation: settings.decimation,
            send_count: 0,
            last_sector: Sector::Trailing,
            armed: false,
        }
    }

    /// Processes one IMU event and returns the updated orientation.
    ///
    /// Invalid events are logged and dropped without touching any state.
    pub fn handle_event(
        &mut self,
        event: &RawImuEvent,
    ) -> Result<OrientationState, CoreError> {
        if !(event.accel_valid && event.gyro_valid) {
            warn!("Accel or gyro data invalid");
            return Err(CoreError::InvalidImuSample);
        }

        let z_gyro = self.scale.gyro(event.gyro[2]);
        let x_accel = correct_centripetal(
            self.scale.accel(event.accel[0]),
            self.offsets[0],
            z_gyro,
        );
        let y_accel = correct_centripetal(
            self.scale.accel(event.accel[1]),
            self.offsets[1],
            z_gyro,
        );

        self.state.temperatures.store(
            TemperatureSlot::Imu,
            event.temperature as f32 / 2.0 + 25.0,
        );

        let theta = angle_from_acceleration(x_accel, y_accel);
        let measurement = OrientationState::new(-theta, z_gyro);
        let orientation =
            match self.state.orientation.update(measurement, event.timestamp) {
                Ok(orientation) => orientation,
                Err(_) => self.state.orientation.state(),
            };

        if self.should_emit() {
            let sample = ImuSample {
                base: BaseSample { timestamp: event.timestamp, orientation },
                accel: [x_accel, y_accel, self.scale.accel(event.accel[2])],
                gyro: [
                    self.scale.gyro(event.gyro[0]),
                    self.scale.gyro(event.gyro[1]),
                    z_gyro,
                ],
            };
            let _ = self.state.outbox.imu.push(sample);
        }

        self.track_rotation(orientation.angle, event.timestamp);
        Ok(orientation)
    }

    fn should_emit(&mut self) -> bool {
        if self.decimation <= 0 {
            return false;
        }
        self.send_count = self.send_count.saturating_add(1);
        if self.send_count >= self.decimation as u8 {
            self.send_count = 0;
            true
        } else {
            false
        }
    }

    /// Arms on the trailing to middle crossing and counts a rotation on the
    /// leading to trailing crossing while armed.
    fn track_rotation(&mut self, angle: f32, timestamp: u64) {
        let sector = Sector::from_angle(angle);
        if sector == Sector::Middle && self.last_sector == Sector::Trailing {
            self.armed = true;
        }
        if self.armed
            && sector == Sector::Trailing
            && self.last_sector == Sector::Leading
        {
            self.armed = false;
            let snapshot = self.state.rotations.record(timestamp);
            trace!(
                "Rotation {} took {} us",
                snapshot.count,
                snapshot.last_duration
            );
        }
        self.last_sector = sector;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn last_sector(&self) -> Sector {
        self.last_sector
    }
}

fn correct_centripetal(reading: f32, radius: f32, velocity: f32) -> f32 {
    reading + radius * velocity * velocity
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn angle_quadrants() {
        assert!((angle_from_acceleration(1.0, 1.0) - PI / 4.0).abs() < 1e-6);
        assert!(
            (angle_from_acceleration(-1.0, 1.0) - 3.0 * PI / 4.0).abs() < 1e-6
        );
        assert!(
            (angle_from_acceleration(-1.0, -1.0) + 3.0 * PI / 4.0).abs() < 1e-6
        );
        assert!((angle_from_acceleration(1.0, -1.0) + PI / 4.0).abs() < 1e-6);
    }

    #[test]
    fn angle_on_y_axis_uses_sign_of_y() {
        assert_eq!(angle_from_acceleration(0.0, 3.0), FRAC_PI_2);
        assert_eq!(angle_from_acceleration(0.0, 0.0), FRAC_PI_2);
        assert_eq!(angle_from_acceleration(0.0, -3.0), -FRAC_PI_2);
    }

    #[test]
    fn sector_boundaries() {
        assert_eq!(Sector::from_angle(-PI), Sector::Trailing);
        assert_eq!(Sector::from_angle(-FRAC_PI_3), Sector::Middle);
        assert_eq!(Sector::from_angle(0.0), Sector::Middle);
        assert_eq!(Sector::from_angle(FRAC_PI_3), Sector::Leading);
        assert_eq!(Sector::from_angle(PI), Sector::Leading);
    }

    #[test]
    fn scaling_full_range() {
        let scale = Scale::new(&ImuSettings::default());
        assert!((scale.accel(32767) - 4.0 * GRAVITY).abs() < 1e-4);
        assert!((scale.gyro(32767) - 2000.0 * PI / 180.0).abs() < 1e-4);
    }
}
