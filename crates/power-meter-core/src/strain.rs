//! Strain gauge acquisition for one crank arm.
//!
//! A reading is split into [`StrainChannel::acquire`], which has to run right
//! after the data ready edge, and [`StrainChannel::process`], which may run
//! after the next edge wait has been armed.

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::icd::{
    BaseSample, CalibrationParameters, HighSpeedSample, OrientationState,
    Side, INVALID_TEMPERATURE, OFFSET_COMPENSATION_SAMPLES,
};
use crate::MeterState;

const SECONDS_PER_MICRO: f32 = 1e-6;

/// Temperature compensated torque in Nm for a raw amplifier reading.
///
/// Returns exactly zero when `raw` equals the calibrated offset. An invalid
/// temperature disables compensation.
pub fn torque(
    raw: u32,
    calibration: &CalibrationParameters,
    temperature: f32,
) -> f32 {
    let counts = raw.wrapping_sub(calibration.offset) as i32;
    let delta = if temperature == INVALID_TEMPERATURE {
        0.0
    } else {
        temperature - calibration.temperature_test_point
    };
    counts as f32
        * calibration.coefficient
        * (1.0 - calibration.temperature_coefficient * delta)
}

/// Calibration parameters for one side, replaceable while running.
pub struct SharedCalibration<M: RawMutex> {
    inner: Mutex<M, Cell<CalibrationParameters>>,
}

impl<M: RawMutex> SharedCalibration<M> {
    pub const fn new(parameters: CalibrationParameters) -> Self {
        Self { inner: Mutex::new(Cell::new(parameters)) }
    }

    pub fn get(&self) -> CalibrationParameters {
        self.inner.lock(|cell| cell.get())
    }

    pub fn set(&self, parameters: CalibrationParameters) {
        self.inner.lock(|cell| cell.set(parameters));
    }

    pub fn set_offset(&self, offset: u32) {
        self.inner.lock(|cell| {
            let mut parameters = cell.get();
            parameters.offset = offset;
            cell.set(parameters);
        });
    }
}

/// A raw reading with the crank position predicted for its capture time.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Acquired {
    pub timestamp: u64,
    pub orientation: OrientationState,
    pub raw: u32,
}

pub struct StrainChannel<'a, M: RawMutex> {
    side: Side,
    state: &'a MeterState<M>,
    /// Next read clocks the amplifier's self calibration.
    adc_calibration: bool,
    offset_steps: u16,
    offset_sum: u64,
    /// Joules since `segment_start`.
    energy: f32,
    segment_start: Option<u64>,
    last_sample: Option<u64>,
    last_rotation: u32,
    average_power: f32,
}

impl<'a, M: RawMutex> StrainChannel<'a, M> {
    pub fn new(side: Side, state: &'a MeterState<M>) -> Self {
        Self {
            side,
            state,
            adc_calibration: false,
            offset_steps: 0,
            offset_sum: 0,
            energy: 0.0,
            segment_start: None,
            last_sample: None,
            last_rotation: state.rotations.rotation_count(),
            average_power: 0.0,
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Called whenever the amplifier has just been powered up.
    pub fn start(&mut self) {
        self.adc_calibration = true;
    }

    /// Starts averaging the next readings into a new zero offset.
    ///
    /// Restarts from scratch if a compensation is already running.
    pub fn begin_offset_calibration(&mut self) {
        info!("Offset compensation started on {:?}", self.side);
        self.adc_calibration = true;
        self.offset_steps = OFFSET_COMPENSATION_SAMPLES;
        self.offset_sum = 0;
        self.state.calibration[self.side.index()].set_offset(0);
    }

    pub fn is_calibrating(&self) -> bool {
        self.offset_steps > 0
    }

    /// Needs self calibration clocks on the next read.
    pub fn adc_calibration_pending(&self) -> bool {
        self.adc_calibration
    }

    /// Average power over the last completed rotation, in watts.
    pub fn average_power(&self) -> f32 {
        self.average_power
    }

    /// Time critical half of a reading: predict the crank position for
    /// `timestamp` and clock the sample out of the amplifier.
    ///
    /// `read` receives whether the amplifier self calibration should be
    /// triggered. The request is only cleared once a read succeeds.
    pub fn acquire<E>(
        &mut self,
        timestamp: u64,
        read: impl FnOnce(bool) -> Result<u32, E>,
    ) -> Result<Acquired, E> {
        if self.state.take_offset_request(self.side) {
            self.begin_offset_calibration();
        }

        let (orientation, _) = self.state.orientation.predict(timestamp);
        let raw = read(self.adc_calibration)?;
        self.adc_calibration = false;

        Ok(Acquired { timestamp, orientation, raw })
    }

    pub fn process(&mut self, acquired: Acquired) {
        if self.offset_steps > 0 {
            self.accumulate_offset(acquired.raw);
            self.check_rotation(acquired.timestamp);
            return;
        }

        let calibration = self.state.calibration[self.side.index()].get();
        let temperature = self.state.temperatures.get(self.side.into());
        let torque = torque(acquired.raw, &calibration, temperature);

        let sample = HighSpeedSample {
            base: BaseSample {
                timestamp: acquired.timestamp,
                orientation: acquired.orientation,
            },
            raw: acquired.raw,
            torque,
        };
        let _ = self.state.outbox.high_speed(self.side).push(sample);

        self.check_rotation(acquired.timestamp);

        if let Some(last) = self.last_sample {
            let dt = acquired.timestamp.saturating_sub(last) as f32
                * SECONDS_PER_MICRO;
            self.energy += acquired.orientation.angular_velocity * torque * dt;
        }
        self.last_sample = Some(acquired.timestamp);
    }

    pub fn handle_ready<E>(
        &mut self,
        timestamp: u64,
        read: impl FnOnce(bool) -> Result<u32, E>,
    ) -> Result<(), E> {
        let acquired = self.acquire(timestamp, read)?;
        self.process(acquired);
        Ok(())
    }

    /// No reading arrived in time. Rotations are still closed out so the
    /// low-speed report is not held up by a stalled amplifier.
    pub fn handle_timeout(&mut self, now: u64) {
        debug!("Strain timeout on {:?}", self.side);
        self.check_rotation(now);
    }

    fn accumulate_offset(&mut self, raw: u32) {
        self.offset_sum += raw as u64;
        self.offset_steps -= 1;
        let offset = self.offset_sum / OFFSET_COMPENSATION_SAMPLES as u64;
        self.state.calibration[self.side.index()].set_offset(offset as u32);
        // Readings taken while compensating carry no usable torque.
        self.last_sample = None;

        if self.offset_steps == 0 {
            info!("Offset compensation on {:?} done: {}", self.side, offset);
        }
    }

    fn check_rotation(&mut self, now: u64) {
        let count = self.state.rotations.rotation_count();
        if count == self.last_rotation {
            return;
        }

        self.average_power = match self.segment_start {
            Some(start) if now > start => {
                self.energy / ((now - start) as f32 * SECONDS_PER_MICRO)
            }
            _ => 0.0,
        };
        self.energy = 0.0;
        self.segment_start = Some(now);
        self.last_rotation = count;

        trace!(
            "Rotation {} on {:?}: {} W",
            count,
            self.side,
            self.average_power
        );
        self.state.low_speed.report(self.side, self.average_power);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calibration() -> CalibrationParameters {
        CalibrationParameters {
            offset: 1000,
            coefficient: 0.01,
            temperature_test_point: 20.0,
            temperature_coefficient: 0.002,
        }
    }

    #[test]
    fn torque_is_zero_at_offset() {
        for t in [-20.0, 0.0, 20.0, 45.0, INVALID_TEMPERATURE] {
            assert_eq!(torque(1000, &calibration(), t), 0.0);
        }
    }

    #[test]
    fn torque_sign_follows_raw() {
        assert!((torque(1100, &calibration(), 20.0) - 1.0).abs() < 1e-6);
        assert!((torque(900, &calibration(), 20.0) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn temperature_compensation() {
        // 10 degC above the test point with 0.2 %/degC.
        assert!((torque(1100, &calibration(), 30.0) - 0.98).abs() < 1e-5);
        let uncompensated =
            torque(1100, &calibration(), INVALID_TEMPERATURE);
        assert!((uncompensated - 1.0).abs() < 1e-6);
    }
}
