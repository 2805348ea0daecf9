use crate::prelude::*;
use derive_more::From;

#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ButtonPress {
    Single,
    Hold,
}

#[derive(Debug, From)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    #[from]
    ButtonPress(ButtonPress),
    Enable,
    Disable,
    OffsetCompensate,
}

#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EventError {
    InvalidConversion(u8),
}

impl TryFrom<u8> for Event {
    type Error = EventError;
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Event::Enable),
            1 => Ok(Event::Disable),
            2 => Ok(Event::OffsetCompensate),
            _ => Err(EventError::InvalidConversion(value)),
        }
    }
}

#[embassy_executor::task]
pub async fn orchestrate(receiver: EventReceiver, power_meter: PowerMeter) {
    loop {
        let event = receiver.receive().await;
        debug!("Received event {:?}", event);
        match event {
            Event::ButtonPress(ButtonPress::Single) => power_meter.toggle(),
            Event::ButtonPress(ButtonPress::Hold) | Event::OffsetCompensate => {
                power_meter.offset_compensate()
            }
            Event::Enable => power_meter.enable(),
            Event::Disable => power_meter.disable(),
        }
    }
}
