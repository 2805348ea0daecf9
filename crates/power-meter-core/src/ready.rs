use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;

#[derive(Debug, Default, Clone, Copy)]
struct Slot {
    pending: Option<u64>,
    overwritten: u32,
}

/// Interrupt to task handoff carrying the capture timestamp.
///
/// This is a single slot: if the interrupt fires again before the task has
/// consumed the previous value, the newer timestamp replaces it and the
/// overwrite is counted. It is not a queue.
pub struct DataReady<M: RawMutex> {
    slot: Mutex<M, Cell<Slot>>,
    signal: Signal<M, ()>,
}

impl<M: RawMutex> DataReady<M> {
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(Cell::new(Slot {
                pending: None,
                overwritten: 0,
            })),
            signal: Signal::new(),
        }
    }

    /// Publishes a capture timestamp (microseconds). Safe to call from the
    /// highest priority context.
    pub fn notify(&self, timestamp: u64) {
        self.slot.lock(|cell| {
            let mut slot = cell.get();
            if slot.pending.replace(timestamp).is_some() {
                slot.overwritten = slot.overwritten.wrapping_add(1);
            }
            cell.set(slot);
        });
        self.signal.signal(());
    }

    /// Waits for the next timestamp.
    pub async fn wait(&self) -> u64 {
        loop {
            if let Some(timestamp) = self.try_take() {
                return timestamp;
            }
            self.signal.wait().await;
        }
    }

    pub fn try_take(&self) -> Option<u64> {
        self.slot.lock(|cell| {
            let mut slot = cell.get();
            let timestamp = slot.pending.take();
            cell.set(slot);
            timestamp
        })
    }

    /// Number of timestamps replaced before they were consumed.
    pub fn overwritten(&self) -> u32 {
        self.slot.lock(|cell| cell.get().overwritten)
    }
}

impl<M: RawMutex> Default for DataReady<M> {
    fn default() -> Self {
        Self::new()
    }
}
