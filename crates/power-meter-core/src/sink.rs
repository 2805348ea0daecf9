//! Bounded hand-off from the acquisition tasks to the transport.
//!
//! Producers never wait here. A full channel drops the sample and counts it,
//! so a slow consumer cannot stall the hardware timed paths.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::{Channel, TrySendError};
use portable_atomic::{AtomicBool, AtomicU32, Ordering};

use crate::icd::{
    HighSpeedSample, HousekeepingSample, ImuSample, LowSpeedSample, Side,
};
use crate::CoreError;

pub const HOUSEKEEPING_CAPACITY: usize = 4;
pub const LOW_SPEED_CAPACITY: usize = 8;
pub const HIGH_SPEED_CAPACITY: usize = 64;
pub const IMU_CAPACITY: usize = 32;
/// Attempts made before a sample is dropped.
pub const SEND_RETRIES: usize = 3;

pub struct SampleSink<M: RawMutex, T, const N: usize> {
    channel: Channel<M, T, N>,
    accepting: AtomicBool,
    dropped: AtomicU32,
}

impl<M: RawMutex, T, const N: usize> SampleSink<M, T, N> {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
            accepting: AtomicBool::new(true),
            dropped: AtomicU32::new(0),
        }
    }

    /// Queues `sample` without blocking.
    ///
    /// Retries a bounded number of times, then drops the sample.
    pub fn push(&self, sample: T) -> Result<(), CoreError> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(CoreError::Disabled);
        }

        let mut sample = sample;
        for _ in 0..SEND_RETRIES {
            match self.channel.try_send(sample) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(returned)) => {
                    sample = returned;
                    core::hint::spin_loop();
                }
            }
        }

        let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        warn!("Channel full, sample dropped ({} total)", dropped);
        Err(CoreError::ChannelFull)
    }

    pub async fn receive(&self) -> T {
        self.channel.receive().await
    }

    pub fn try_receive(&self) -> Option<T> {
        self.channel.try_receive().ok()
    }

    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }

    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::Release);
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }
}

impl<M: RawMutex, T, const N: usize> Default for SampleSink<M, T, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// One sink per sample kind, high speed split per side.
pub struct Outbox<M: RawMutex> {
    pub housekeeping: SampleSink<M, HousekeepingSample, HOUSEKEEPING_CAPACITY>,
    pub low_speed: SampleSink<M, LowSpeedSample, LOW_SPEED_CAPACITY>,
    pub high_speed: [SampleSink<M, HighSpeedSample, HIGH_SPEED_CAPACITY>; 2],
    pub imu: SampleSink<M, ImuSample, IMU_CAPACITY>,
}

impl<M: RawMutex> Outbox<M> {
    pub const fn new() -> Self {
        Self {
            housekeeping: SampleSink::new(),
            low_speed: SampleSink::new(),
            high_speed: [SampleSink::new(), SampleSink::new()],
            imu: SampleSink::new(),
        }
    }

    pub fn high_speed(
        &self,
        side: Side,
    ) -> &SampleSink<M, HighSpeedSample, HIGH_SPEED_CAPACITY> {
        &self.high_speed[side.index()]
    }

    pub fn set_accepting(&self, accepting: bool) {
        self.housekeeping.set_accepting(accepting);
        self.low_speed.set_accepting(accepting);
        for sink in self.high_speed.iter() {
            sink.set_accepting(accepting);
        }
        self.imu.set_accepting(accepting);
    }

    /// Total samples dropped across every sink.
    pub fn dropped(&self) -> u32 {
        self.housekeeping.dropped()
            + self.low_speed.dropped()
            + self.high_speed.iter().map(|s| s.dropped()).sum::<u32>()
            + self.imu.dropped()
    }
}

impl<M: RawMutex> Default for Outbox<M> {
    fn default() -> Self {
        Self::new()
    }
}
