#![no_std]

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal_async::digital::Wait;

pub use crate::errors::Error;

pub mod errors;

/// Bits in one conversion result.
pub const DATA_BITS: u8 = 24;
/// Two extra clocks after the data start an offset self calibration.
pub const CALIBRATION_BITS: u8 = DATA_BITS + 2;
/// Minimum PDWN pulse and settle time around a reset.
pub const RESET_PULSE_US: u32 = 26;
/// SCLK half period.
const SCLK_HALF_PERIOD_US: u32 = 1;

/// Powers the amplifier up through a PDWN high, low, high sequence.
///
/// Needed after every supply power up so the internal state is reset.
pub fn reset_sequence<P, D>(pwdn: &mut P, delay: &mut D) -> Result<(), P::Error>
where
    P: OutputPin,
    D: DelayNs,
{
    pwdn.set_high()?;
    delay.delay_us(RESET_PULSE_US);
    pwdn.set_low()?;
    delay.delay_us(RESET_PULSE_US);
    pwdn.set_high()
}

pub fn power_down<P: OutputPin>(pwdn: &mut P) -> Result<(), P::Error> {
    pwdn.set_low()
}

/// One ADS1232 channel: its DOUT/DRDY input and SCLK output.
///
/// Several channels may share a PDWN line, so that pin is driven through the
/// free functions instead of being owned here.
pub struct Ads1232<DOUT, SCLK, D> {
    dout: DOUT,
    sclk: SCLK,
    delay: D,
}

impl<E, DOUT, SCLK, D> Ads1232<DOUT, SCLK, D>
where
    DOUT: InputPin<Error = E> + Wait<Error = E>,
    SCLK: OutputPin<Error = E>,
    D: DelayNs,
{
    pub fn new(dout: DOUT, sclk: SCLK, delay: D) -> Self {
        Self { dout, sclk, delay }
    }

    /// Parks SCLK low. Holding it high for more than 100 us powers the
    /// amplifier down.
    pub fn init(&mut self) -> Result<(), Error<E>> {
        self.sclk.set_low().map_err(Error::Pin)
    }

    pub fn is_ready(&mut self) -> Result<bool, Error<E>> {
        self.dout.is_low().map_err(Error::Pin)
    }

    /// Waits for DOUT/DRDY to fall, which marks a new conversion result.
    pub async fn wait_ready(&mut self) -> Result<(), Error<E>> {
        self.dout.wait_for_falling_edge().await.map_err(Error::Pin)
    }

    /// Clocks out one conversion result, MSB first.
    ///
    /// With `self_calibration` set two extra clocks are sent, which starts an
    /// offset calibration in the amplifier; the two bits clocked in with
    /// them are discarded. Must be called right after DOUT falls, the result
    /// is only valid until the next conversion completes.
    pub fn read(&mut self, self_calibration: bool) -> Result<u32, Error<E>> {
        if !self.is_ready()? {
            return Err(Error::NotReady);
        }

        let clocks = if self_calibration {
            CALIBRATION_BITS
        } else {
            DATA_BITS
        };

        let mut raw = 0u32;
        for _ in 0..clocks {
            self.sclk.set_high().map_err(Error::Pin)?;
            self.delay.delay_us(SCLK_HALF_PERIOD_US);
            let bit = self.dout.is_high().map_err(Error::Pin)?;
            raw = (raw << 1) | bit as u32;
            self.sclk.set_low().map_err(Error::Pin)?;
            self.delay.delay_us(SCLK_HALF_PERIOD_US);
        }

        if self_calibration {
            raw >>= CALIBRATION_BITS - DATA_BITS;
        }
        Ok(raw)
    }

    pub fn release(self) -> (DOUT, SCLK, D) {
        (self.dout, self.sclk, self.delay)
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use core::cell::Cell;
    use core::convert::Infallible;
    use embedded_hal::digital::ErrorType;
    use std::rc::Rc;
    use std::vec::Vec;

    /// Serial output of the amplifier. Bit `n` of the stream is presented
    /// after the `n + 1`th rising SCLK edge; before the first edge DOUT shows
    /// `ready`.
    struct MockDout {
        stream: Vec<bool>,
        edges: Rc<Cell<usize>>,
        ready: bool,
        falling_edges: usize,
    }

    struct MockSclk {
        edges: Rc<Cell<usize>>,
        high: bool,
    }

    struct NoDelay;

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    impl ErrorType for MockDout {
        type Error = Infallible;
    }

    impl ErrorType for MockSclk {
        type Error = Infallible;
    }

    impl InputPin for MockDout {
        fn is_high(&mut self) -> Result<bool, Self::Error> {
            Ok(match self.edges.get() {
                0 => !self.ready,
                n => self.stream.get(n - 1).copied().unwrap_or(true),
            })
        }

        fn is_low(&mut self) -> Result<bool, Self::Error> {
            self.is_high().map(|high| !high)
        }
    }

    impl Wait for MockDout {
        async fn wait_for_high(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }

        async fn wait_for_low(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }

        async fn wait_for_rising_edge(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }

        async fn wait_for_falling_edge(&mut self) -> Result<(), Self::Error> {
            self.falling_edges += 1;
            Ok(())
        }

        async fn wait_for_any_edge(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    impl OutputPin for MockSclk {
        fn set_low(&mut self) -> Result<(), Self::Error> {
            self.high = false;
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            if !self.high {
                self.edges.set(self.edges.get() + 1);
            }
            self.high = true;
            Ok(())
        }
    }

    fn bits(value: u32, count: u8) -> Vec<bool> {
        (0..count).rev().map(|i| value >> i & 1 == 1).collect()
    }

    fn amplifier(
        stream: Vec<bool>,
        ready: bool,
    ) -> (Ads1232<MockDout, MockSclk, NoDelay>, Rc<Cell<usize>>) {
        let edges = Rc::new(Cell::new(0));
        let dout = MockDout {
            stream,
            edges: edges.clone(),
            ready,
            falling_edges: 0,
        };
        let sclk = MockSclk { edges: edges.clone(), high: true };
        (Ads1232::new(dout, sclk, NoDelay), edges)
    }

    #[test]
    fn reads_24_bits_msb_first() {
        let (mut adc, edges) = amplifier(bits(0xABCDEF, 24), true);
        adc.init().unwrap();
        assert_eq!(adc.read(false).unwrap(), 0xABCDEF);
        assert_eq!(edges.get(), 24);

        let (_, sclk, _) = adc.release();
        assert!(!sclk.high);
    }

    #[test]
    fn self_calibration_sends_two_extra_clocks() {
        let mut stream = bits(0x123456, 24);
        stream.extend([true, true]);
        let (mut adc, edges) = amplifier(stream, true);
        adc.init().unwrap();

        assert_eq!(adc.read(true).unwrap(), 0x123456);
        assert_eq!(edges.get(), 26);
    }

    #[test]
    fn not_ready_sends_no_clocks() {
        let (mut adc, edges) = amplifier(bits(0, 24), false);
        adc.init().unwrap();

        assert!(matches!(adc.read(false), Err(Error::NotReady)));
        assert_eq!(edges.get(), 0);
    }

    #[futures_test::test]
    async fn waits_for_falling_edge() {
        let (mut adc, _) = amplifier(bits(0, 24), true);
        adc.wait_ready().await.unwrap();
        adc.wait_ready().await.unwrap();

        let (dout, _, _) = adc.release();
        assert_eq!(dout.falling_edges, 2);
    }

    #[test]
    fn reset_pulses_pwdn() {
        struct Pwdn(Vec<bool>);

        impl ErrorType for Pwdn {
            type Error = Infallible;
        }

        impl OutputPin for Pwdn {
            fn set_low(&mut self) -> Result<(), Self::Error> {
                self.0.push(false);
                Ok(())
            }

            fn set_high(&mut self) -> Result<(), Self::Error> {
                self.0.push(true);
                Ok(())
            }
        }

        let mut pwdn = Pwdn(Vec::new());
        reset_sequence(&mut pwdn, &mut NoDelay).unwrap();
        assert_eq!(pwdn.0, [true, false, true]);

        power_down(&mut pwdn).unwrap();
        assert_eq!(pwdn.0.last(), Some(&false));
    }
}
