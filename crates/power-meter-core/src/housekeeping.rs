use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::icd::{Side, INVALID_TEMPERATURE, SUPPLY_MILLIVOLTS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TemperatureSlot {
    Left = 0,
    Right = 1,
    Imu = 2,
}

impl From<Side> for TemperatureSlot {
    fn from(side: Side) -> Self {
        match side {
            Side::Left => TemperatureSlot::Left,
            Side::Right => TemperatureSlot::Right,
        }
    }
}

/// Last good temperature for each sensor, in degrees C.
///
/// Readers never wait on a sensor; a failed read simply leaves the previous
/// value in place.
pub struct TemperatureCache<M: RawMutex> {
    values: Mutex<M, Cell<[f32; 3]>>,
}

impl<M: RawMutex> TemperatureCache<M> {
    pub const fn new() -> Self {
        Self { values: Mutex::new(Cell::new([INVALID_TEMPERATURE; 3])) }
    }

    pub fn store(&self, slot: TemperatureSlot, celsius: f32) {
        self.values.lock(|values| {
            let mut current = values.get();
            current[slot as usize] = celsius;
            values.set(current);
        });
    }

    /// Records the outcome of a sensor read, keeping the old value on error.
    pub fn store_result<E>(
        &self,
        slot: TemperatureSlot,
        reading: Result<f32, E>,
    ) -> Option<f32> {
        match reading {
            Ok(celsius) => {
                self.store(slot, celsius);
                Some(celsius)
            }
            Err(_) => {
                warn!(
                    "Temperature read failed for {:?}, keeping last value",
                    slot
                );
                None
            }
        }
    }

    pub fn get(&self, slot: TemperatureSlot) -> f32 {
        self.values.lock(|values| values.get()[slot as usize])
    }

    pub fn all(&self) -> [f32; 3] {
        self.values.lock(|values| values.get())
    }
}

impl<M: RawMutex> Default for TemperatureCache<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolution of the P3T1755 temperature register.
pub const P3T1755_LSB_CELSIUS: f32 = 0.0625;

/// Converts the two byte P3T1755 temperature register to degrees C.
///
/// The result is a left aligned 12-bit two's complement value.
pub fn p3t1755_celsius(register: [u8; 2]) -> f32 {
    (i16::from_be_bytes(register) >> 4) as f32 * P3T1755_LSB_CELSIUS
}

/// Converts a 12-bit ADC reading of the battery rail to millivolts.
pub fn battery_millivolts(raw: u16) -> u32 {
    (raw.min(0x0fff) as u32 * SUPPLY_MILLIVOLTS) >> 12
}
