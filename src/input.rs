//! Hardware the probes are driven through: an analog input and a clock.

use core::marker::PhantomData;

use embedded_hal::adc::{Channel, OneShot};

use crate::SensorError;

/// Something that can convert the voltage on an analog pin to a raw code.
pub trait AnalogInput {
    /// Read pin `pin`, returning a code in `[0, full_scale)`.
    fn read(&mut self, pin: u8) -> Result<u16, SensorError>;
}

impl<T: AnalogInput + ?Sized> AnalogInput for &mut T {
    fn read(&mut self, pin: u8) -> Result<u16, SensorError> {
        (**self).read(pin)
    }
}

/// Monotonic time, in milliseconds. All interval gating is measured against this.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

impl<T: Clock + ?Sized> Clock for &T {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

/// Drives a blocking `embedded_hal` one-shot ADC over a set of channel pins
/// of the same type. Pin number `n` in `AnalogInput::read` selects `pins[n]`.
pub struct OneShotInput<D, ADC, P, const N: usize> {
    adc: D,
    pins: [P; N],
    _adc: PhantomData<ADC>,
}

impl<D, ADC, P, const N: usize> OneShotInput<D, ADC, P, N>
where
    D: OneShot<ADC, u16, P>,
    P: Channel<ADC>,
{
    pub fn new(adc: D, pins: [P; N]) -> Self {
        Self {
            adc,
            pins,
            _adc: PhantomData,
        }
    }

    /// Release the ADC and pins.
    pub fn free(self) -> (D, [P; N]) {
        (self.adc, self.pins)
    }
}

impl<D, ADC, P, const N: usize> AnalogInput for OneShotInput<D, ADC, P, N>
where
    D: OneShot<ADC, u16, P>,
    P: Channel<ADC>,
{
    fn read(&mut self, pin: u8) -> Result<u16, SensorError> {
        let channel = self
            .pins
            .get_mut(pin as usize)
            .ok_or(SensorError::NoSuchPin)?;

        block!(self.adc.read(channel)).map_err(|_| SensorError::Bus)
    }
}
