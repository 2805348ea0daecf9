#![no_std]
//! Measurement core of a crank based bicycle power meter.
//!
//! Fuses IMU samples into a crank angle and angular velocity estimate, counts
//! complete rotations, and turns raw strain gauge readings from the two crank
//! arms into torque and per-rotation average power. Everything here is
//! hardware independent; the firmware supplies timestamps, raw readings and
//! the bounded channels samples are pushed into.

// This must go first so the logging macros are visible to the other modules.
mod fmt;

mod error;
mod filter;
mod gate;
mod housekeeping;
mod low_speed;
mod ready;
mod rotation;
mod sink;
mod strain;
mod updater;

pub use error::CoreError;
pub use filter::{
    circular_subtract, normalize_angle, OrientationFilter, SharedOrientation,
};
pub use gate::{EnableGate, GateReceiver};
pub use housekeeping::{
    battery_millivolts, p3t1755_celsius, TemperatureCache, TemperatureSlot,
    P3T1755_LSB_CELSIUS,
};
pub use low_speed::LowSpeedAggregator;
pub use ready::DataReady;
pub use rotation::{RotationAggregator, RotationSnapshot};
pub use sink::{
    Outbox, SampleSink, HIGH_SPEED_CAPACITY, HOUSEKEEPING_CAPACITY,
    IMU_CAPACITY, LOW_SPEED_CAPACITY, SEND_RETRIES,
};
pub use strain::{torque, Acquired, SharedCalibration, StrainChannel};
pub use updater::{
    angle_from_acceleration, OrientationUpdater, RawImuEvent, Sector,
};

pub use power_meter_icd as icd;

use embassy_sync::blocking_mutex::raw::RawMutex;
use icd::{MeterConfig, Side};
use portable_atomic::{AtomicBool, Ordering};

/// Number of acquisition tasks that park on the [`EnableGate`].
pub const GATE_RECEIVERS: usize = 6;
/// The strain channels wait on [`MeterState::amplifiers`].
pub const AMPLIFIER_RECEIVERS: usize = 2;

/// All state shared between the IMU task, the two strain channels, the
/// low-speed task and the transport.
pub struct MeterState<M: RawMutex> {
    pub orientation: SharedOrientation<M>,
    pub rotations: RotationAggregator<M>,
    pub calibration: [SharedCalibration<M>; 2],
    pub temperatures: TemperatureCache<M>,
    pub low_speed: LowSpeedAggregator<M>,
    pub outbox: Outbox<M>,
    pub gate: EnableGate<M, GATE_RECEIVERS>,
    /// Set once the amplifiers are powered and reset, cleared before they
    /// are switched off.
    pub amplifiers: EnableGate<M, AMPLIFIER_RECEIVERS>,
    offset_requests: [AtomicBool; 2],
}

impl<M: RawMutex> MeterState<M> {
    pub fn new(config: &MeterConfig) -> Self {
        Self {
            orientation: SharedOrientation::new(&config.filter),
            rotations: RotationAggregator::new(),
            calibration: [
                SharedCalibration::new(config.strain[Side::Left.index()]),
                SharedCalibration::new(config.strain[Side::Right.index()]),
            ],
            temperatures: TemperatureCache::new(),
            low_speed: LowSpeedAggregator::new(),
            outbox: Outbox::new(),
            gate: EnableGate::new(),
            amplifiers: EnableGate::new(),
            offset_requests: [AtomicBool::new(false), AtomicBool::new(false)],
        }
    }

    /// Starts strain offset compensation on both sides.
    ///
    /// Must only be called while no force is applied to the cranks. Calling it
    /// again before the channels pick it up has no further effect.
    pub fn begin_offset_calibration(&self) {
        info!("Offset compensation requested");
        for flag in self.offset_requests.iter() {
            flag.store(true, Ordering::Release);
        }
    }

    pub(crate) fn take_offset_request(&self, side: Side) -> bool {
        self.offset_requests[side.index()].swap(false, Ordering::AcqRel)
    }

    /// Applies the enable gate to the data path.
    pub fn set_enabled(&self, enabled: bool) {
        self.outbox.set_accepting(enabled);
        self.gate.set(enabled);
    }
}
