use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;

/// Consistent copy of the rotation counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RotationSnapshot {
    pub count: u32,
    /// Microseconds. Zero until two rotations have been seen.
    pub last_duration: u32,
    pub last_timestamp: Option<u64>,
}

/// Rotation count and timing, written by the IMU path and read by the strain
/// channels and the low-speed reporter. Only reset by a reboot.
pub struct RotationAggregator<M: RawMutex> {
    inner: Mutex<M, Cell<RotationSnapshot>>,
}

impl<M: RawMutex> RotationAggregator<M> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(Cell::new(RotationSnapshot {
                count: 0,
                last_duration: 0,
                last_timestamp: None,
            })),
        }
    }

    /// Records a completed rotation at `timestamp` (microseconds).
    pub fn record(&self, timestamp: u64) -> RotationSnapshot {
        self.inner.lock(|cell| {
            let mut snapshot = cell.get();
            snapshot.count = snapshot.count.wrapping_add(1);
            snapshot.last_duration = snapshot
                .last_timestamp
                .map(|last| {
                    timestamp.saturating_sub(last).min(u32::MAX as u64) as u32
                })
                .unwrap_or(0);
            snapshot.last_timestamp = Some(timestamp);
            cell.set(snapshot);
            snapshot
        })
    }

    pub fn rotation_count(&self) -> u32 {
        self.inner.lock(|cell| cell.get().count)
    }

    pub fn snapshot(&self) -> RotationSnapshot {
        self.inner.lock(|cell| cell.get())
    }
}

impl<M: RawMutex> Default for RotationAggregator<M> {
    fn default() -> Self {
        Self::new()
    }
}
