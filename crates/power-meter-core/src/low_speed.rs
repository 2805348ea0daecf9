use core::cell::Cell;
use core::future::Future;

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;

use crate::icd::{LowSpeedSample, Side};
use crate::rotation::RotationSnapshot;

const BOTH_SIDES: u8 = Side::Left.bit() | Side::Right.bit();

#[derive(Debug, Default, Clone, Copy)]
struct Reports {
    bits: u8,
    powers: [f32; 2],
}

/// Barrier collecting one fresh average power from each side per rotation.
pub struct LowSpeedAggregator<M: RawMutex> {
    reports: Mutex<M, Cell<Reports>>,
    signal: Signal<M, ()>,
}

impl<M: RawMutex> LowSpeedAggregator<M> {
    pub const fn new() -> Self {
        Self {
            reports: Mutex::new(Cell::new(Reports {
                bits: 0,
                powers: [0.0; 2],
            })),
            signal: Signal::new(),
        }
    }

    /// Called by a strain channel when it completes a rotation.
    pub fn report(&self, side: Side, average_power: f32) {
        self.reports.lock(|cell| {
            let mut reports = cell.get();
            reports.bits |= side.bit();
            reports.powers[side.index()] = average_power;
            cell.set(reports);
        });
        self.signal.signal(());
    }

    fn take_if_complete(&self) -> Option<[f32; 2]> {
        self.reports.lock(|cell| {
            let mut reports = cell.get();
            if reports.bits & BOTH_SIDES != BOTH_SIDES {
                return None;
            }
            reports.bits = 0;
            cell.set(reports);
            Some(reports.powers)
        })
    }

    /// Waits until both sides have reported since the last success.
    ///
    /// Bits from one side are kept across cancellation, so wrapping this in a
    /// timeout does not lose a report.
    pub async fn wait_both(&self) -> [f32; 2] {
        loop {
            if let Some(powers) = self.take_if_complete() {
                return powers;
            }
            self.signal.wait().await;
        }
    }

    /// Produces the next low-speed sample, or the idle sample if `timeout`
    /// finishes first.
    pub async fn next_sample<T: Future>(
        &self,
        rotation: impl FnOnce() -> RotationSnapshot,
        timeout: T,
    ) -> LowSpeedSample {
        let powers = match select(self.wait_both(), timeout).await {
            Either::First(powers) => Some(powers),
            Either::Second(_) => {
                debug!("No rotation within timeout");
                None
            }
        };
        Self::build(&rotation(), powers)
    }

    /// Combines the rotation counters with the per-side powers. `None` means
    /// the crank is idle.
    pub fn build(
        rotation: &RotationSnapshot,
        powers: Option<[f32; 2]>,
    ) -> LowSpeedSample {
        let (power, balance) = match powers {
            Some([left, right]) => {
                let total = left + right;
                let balance = if total != 0.0 {
                    100.0 * right / total
                } else {
                    50.0
                };
                (total, balance)
            }
            None => (0.0, 50.0),
        };
        LowSpeedSample {
            rotation_count: rotation.count,
            last_rotation_duration: rotation.last_duration,
            timestamp: rotation.last_timestamp.unwrap_or(0),
            power,
            balance,
        }
    }
}

impl<M: RawMutex> Default for LowSpeedAggregator<M> {
    fn default() -> Self {
        Self::new()
    }
}
