use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::watch::{Receiver, Watch};

/// Enable/disable switch owned by the device state machine.
///
/// Acquisition tasks each hold a [`GateReceiver`] and park on it while the
/// meter is disabled.
pub struct EnableGate<M: RawMutex, const N: usize> {
    watch: Watch<M, bool, N>,
}

impl<M: RawMutex, const N: usize> EnableGate<M, N> {
    pub const fn new() -> Self {
        Self { watch: Watch::new_with(false) }
    }

    pub fn set(&self, enabled: bool) {
        self.watch.sender().send(enabled);
    }

    pub fn is_enabled(&self) -> bool {
        self.watch.try_get().unwrap_or(false)
    }

    /// Returns `None` once all `N` receivers have been handed out.
    pub fn receiver(&self) -> Option<GateReceiver<'_, M, N>> {
        self.watch.receiver().map(GateReceiver)
    }
}

impl<M: RawMutex, const N: usize> Default for EnableGate<M, N> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct GateReceiver<'a, M: RawMutex, const N: usize>(
    Receiver<'a, M, bool, N>,
);

impl<M: RawMutex, const N: usize> GateReceiver<'_, M, N> {
    /// Returns immediately if already enabled.
    pub async fn wait_enabled(&mut self) {
        self.0.get_and(|enabled| *enabled).await;
    }

    /// Returns immediately if already disabled.
    pub async fn wait_disabled(&mut self) {
        self.0.get_and(|enabled| !*enabled).await;
    }

    pub fn is_enabled(&mut self) -> bool {
        self.0.try_get().unwrap_or(false)
    }
}
