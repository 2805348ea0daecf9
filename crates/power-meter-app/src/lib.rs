#![no_std]
//! Firmware for the crank power meter.
//!
//! The IMU runs on the high priority interrupt executor, the two strain
//! channels on the medium one, and aggregation, housekeeping and transport in
//! thread mode. Everything shares one [`Meter`].

// This must go first so the logging macros are visible to the other modules.
mod fmt;

pub mod events;
pub mod tasks;

use embassy_executor::{InterruptExecutor, SendSpawner};
use embassy_nrf::interrupt;
use embassy_nrf::interrupt::{InterruptExt, Priority};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};
use power_meter_core::{DataReady, MeterState};
use static_cell::StaticCell;

pub const HW_VERSION: &str = env!("HW_VERSION");
pub const FW_VERSION: &str = env!("FW_VERSION");

pub type MeterMutex = CriticalSectionRawMutex;
pub type Meter = MeterState<MeterMutex>;

/// IMU INT1 capture timestamps, in microseconds since boot.
pub static IMU_READY: DataReady<MeterMutex> = DataReady::new();

/// DOUT/DRDY capture timestamps per crank arm, indexed by
/// [`Side`](power_meter_icd::Side).
pub static STRAIN_READY: [DataReady<MeterMutex>; 2] =
    [DataReady::new(), DataReady::new()];

/// Microseconds since boot, the time base of every sample.
pub fn now_micros() -> u64 {
    embassy_time::Instant::now().as_micros()
}

/// Device level controls used by the orchestrator.
#[derive(Clone, Copy)]
pub struct PowerMeter {
    pub meter: &'static Meter,
}

impl PowerMeter {
    pub fn new(meter: &'static Meter) -> Self {
        Self { meter }
    }

    pub fn enable(&self) {
        info!("Measurement enabled");
        self.meter.set_enabled(true);
    }

    pub fn disable(&self) {
        info!("Measurement disabled");
        self.meter.set_enabled(false);
    }

    pub fn toggle(&self) {
        if self.meter.gate.is_enabled() {
            self.disable();
        } else {
            self.enable();
        }
    }

    /// Zeroes both strain channels. No force may be on the cranks.
    pub fn offset_compensate(&self) {
        if !self.meter.gate.is_enabled() {
            info!("Offset compensation will start once enabled");
        }
        self.meter.begin_offset_calibration();
    }
}

// Statics
static EXECUTOR_HIGH: InterruptExecutor = InterruptExecutor::new();
static EXECUTOR_MED: InterruptExecutor = InterruptExecutor::new();

const EVENT_CAPACITY: usize = 10;
pub type EventMutexType = CriticalSectionRawMutex;
pub type EventChannel = Channel<EventMutexType, events::Event, EVENT_CAPACITY>;
pub type EventSender =
    Sender<'static, EventMutexType, events::Event, EVENT_CAPACITY>;
pub type EventReceiver =
    Receiver<'static, EventMutexType, events::Event, EVENT_CAPACITY>;
static EVENT_CHANNEL: StaticCell<EventChannel> = StaticCell::new();

pub fn init_event_channel() -> (EventSender, EventReceiver) {
    let channel = EVENT_CHANNEL.init(Channel::new());
    (channel.sender(), channel.receiver())
}

// Interrupt executors
#[interrupt]
unsafe fn EGU0_SWI0() {
    EXECUTOR_MED.on_interrupt()
}

#[interrupt]
unsafe fn EGU1_SWI1() {
    EXECUTOR_HIGH.on_interrupt()
}

/// Starts the interrupt executors, returning the medium and high priority
/// spawners.
pub fn init_executors() -> (SendSpawner, SendSpawner) {
    // Strain channels: EGU0_SWI0, priority level 7
    interrupt::EGU0_SWI0.set_priority(Priority::P7);
    let medium_prio_spawner = EXECUTOR_MED.start(interrupt::EGU0_SWI0);

    // IMU: EGU1_SWI1, priority level 6
    interrupt::EGU1_SWI1.set_priority(Priority::P6);
    let high_prio_spawner = EXECUTOR_HIGH.start(interrupt::EGU1_SWI1);
    (medium_prio_spawner, high_prio_spawner)
}

pub mod prelude {
    pub use super::{
        events::*, init_event_channel, init_executors, now_micros, tasks::*,
        EventReceiver, EventSender, Meter, MeterMutex, PowerMeter, FW_VERSION,
        HW_VERSION, IMU_READY, STRAIN_READY,
    };
    pub use embassy_executor::Spawner;
    pub use embassy_sync::blocking_mutex::raw::{
        CriticalSectionRawMutex, NoopRawMutex,
    };
    pub use embassy_time::{Duration, Timer};

    pub use power_meter_bsp::{
        AmpChannelResources, AmpPowerResources, ImuResources, PowerMeterBoard,
        Spi3BusResources, Twim1BusResources,
    };
    pub use power_meter_core::MeterState;
    pub use power_meter_icd::{self as icd, MeterConfig, Side};
}
