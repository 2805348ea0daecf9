#![no_std]
#![no_main]

use embassy_executor::Spawner;
use static_cell::StaticCell;

#[cfg(feature = "defmt")]
use defmt_rtt as _;
#[cfg(feature = "defmt")]
use panic_probe as _;
#[cfg(not(feature = "defmt"))]
use panic_reset as _;

use power_meter_app::prelude::*;

static METER: StaticCell<Meter> = StaticCell::new();
static SPI3_BUS_RESOURCES: StaticCell<Spi3BusResources> = StaticCell::new();
static IMU_RESOURCES: StaticCell<ImuResources> = StaticCell::new();
static TWIM1_BUS_RESOURCES: StaticCell<Twim1BusResources> = StaticCell::new();
static AMP_LEFT: StaticCell<AmpChannelResources> = StaticCell::new();
static AMP_RIGHT: StaticCell<AmpChannelResources> = StaticCell::new();
static AMP_POWER: StaticCell<AmpPowerResources> = StaticCell::new();

// Application main entry point. The spawner can be used to start async tasks.
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    #[cfg(feature = "defmt")]
    defmt::info!("Power meter {} on {}", FW_VERSION, HW_VERSION);

    let board = PowerMeterBoard::default();
    spawner.must_spawn(watchdog_task(board.wdt));

    // Calibration lives with the external configuration store; until it
    // delivers, the factory defaults apply.
    let config = MeterConfig::default();
    let meter: &'static Meter = METER.init(MeterState::new(&config));

    let (sender, receiver) = init_event_channel();
    let (medium_prio_spawner, high_prio_spawner) = init_executors();

    high_prio_spawner.must_spawn(imu_irq_task(board.imu_irq));
    high_prio_spawner.must_spawn(imu_task(
        meter,
        SPI3_BUS_RESOURCES.init(board.spi3_bus_resources),
        IMU_RESOURCES.init(board.imu_resources),
        config.imu,
    ));

    let amp_left = AMP_LEFT.init(board.amp_left);
    let amp_right = AMP_RIGHT.init(board.amp_right);
    high_prio_spawner
        .must_spawn(strain_irq_task(Side::Left, amp_left.drdy()));
    high_prio_spawner
        .must_spawn(strain_irq_task(Side::Right, amp_right.drdy()));

    medium_prio_spawner.must_spawn(strain_task(Side::Left, meter, amp_left));
    medium_prio_spawner.must_spawn(strain_task(Side::Right, meter, amp_right));

    spawner.must_spawn(power_control_task(
        meter,
        AMP_POWER.init(board.amp_power),
    ));
    spawner.must_spawn(low_speed_task(meter));
    spawner.must_spawn(housekeeping_task(
        meter,
        TWIM1_BUS_RESOURCES.init(board.twim1_bus_resources),
        board.battery,
        board.saadc,
    ));
    spawner.must_spawn(transport_task(meter, board.uarte0, board.uart_tx));
    spawner.must_spawn(button_task(board.button.into(), sender));
    spawner.must_spawn(orchestrate(receiver, PowerMeter::new(meter)));

    // Measure from boot; the button or the host can disable it again.
    sender.send(Event::Enable).await;
}
