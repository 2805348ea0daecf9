#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<PinE> {
    Pin(PinE),
    /// DOUT was still high, no conversion result is waiting.
    NotReady,
}

impl<E: core::fmt::Display> core::fmt::Display for Error<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Pin(err) => write!(f, "GPIO error: {}", err),
            Error::NotReady => write!(f, "ADS1232 not ready"),
        }
    }
}
