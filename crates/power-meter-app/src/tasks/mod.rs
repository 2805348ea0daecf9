use crate::events::ButtonPress;
use crate::prelude::*;
use embassy_nrf::gpio::{AnyPin, Input, Pull};
use embassy_nrf::peripherals::WDT;
use embassy_nrf::wdt;
use embassy_nrf::wdt::Watchdog;
use embassy_nrf::Peri;
use embassy_time::with_timeout;

pub mod housekeeping;
pub mod imu;
pub mod low_speed;
pub mod power_control;
pub mod strain;
pub mod transport;

// Re-exports
pub use housekeeping::*;
pub use imu::*;
pub use low_speed::*;
pub use power_control::*;
pub use strain::*;
pub use transport::*;

// Keeps our system alive
#[embassy_executor::task]
pub async fn watchdog_task(wdt: Peri<'static, WDT>) {
    let Some(wdt_config) = wdt::Config::try_new(&wdt) else {
        error!("Watchdog configuration locked, waiting for reset");
        loop {
            cortex_m::asm::wfe();
        }
    };
    let (_wdt, [mut handle]) = match Watchdog::try_new(wdt, wdt_config) {
        Ok(x) => x,
        Err(_) => {
            // Already running with a different handle count, wait it out.
            loop {
                cortex_m::asm::wfe();
            }
        }
    };
    loop {
        handle.pet();
        Timer::after(Duration::from_secs(2)).await;
    }
}

/// Short press toggles measurement, a long hold starts offset compensation.
#[embassy_executor::task]
pub async fn button_task(btn_pin: Peri<'static, AnyPin>, sender: EventSender) {
    const HOLD_DELAY: u64 = 3000;

    let mut button = Input::new(btn_pin, Pull::Up);

    loop {
        button.wait_for_falling_edge().await;
        if with_timeout(
            Duration::from_millis(HOLD_DELAY),
            button.wait_for_rising_edge(),
        )
        .await
        .is_err()
        {
            info!("Hold detected");
            sender.send(ButtonPress::Hold.into()).await;
            button.wait_for_rising_edge().await;
        } else {
            info!("Single click detected");
            sender.send(ButtonPress::Single.into()).await;
        }
    }
}
