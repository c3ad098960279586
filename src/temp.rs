//! Water temperature, from an analog sensor with a 10mV/°C output and a 600mV
//! offset. This is the compensation reference for the EC and TDS probes.

use log::debug;

use crate::{voltage_from_adc, AdcConfig, AnalogInput, Probe, Sampler, SensorError, Timing};

const TEMP_SAMPLES: usize = 5;
pub const TEMP_TIMING: Timing = Timing::new(100, 1_000);

/// Reported until the first window completes, so compensation is a no-op.
const T_INITIAL: f32 = 25.;

/// Temperature in °C, from sensor voltage in Volts.
pub fn temp_from_voltage(V: f32) -> f32 {
    100. * V - 60.
}

pub struct TemperatureProbe {
    sampler: Sampler<TEMP_SAMPLES>,
    adc: AdcConfig,
    T: f32,
}

impl TemperatureProbe {
    pub fn new(pin: u8, adc: AdcConfig) -> Self {
        Self {
            sampler: Sampler::new(pin, TEMP_TIMING),
            adc,
            T: T_INITIAL,
        }
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.sampler = Sampler::new(self.sampler.pin(), timing);
        self
    }
}

impl Probe for TemperatureProbe {
    fn update<A: AnalogInput + ?Sized>(
        &mut self,
        input: &mut A,
        now_ms: u64,
        _temperature_c: f32,
    ) -> Result<(), SensorError> {
        if let Some(avg) = self.sampler.poll(input, now_ms)? {
            self.T = temp_from_voltage(voltage_from_adc(avg, &self.adc));
            debug!("Temperature: {}°C", self.T);
        }
        Ok(())
    }

    /// °C
    fn value(&self) -> f32 {
        self.T
    }
}
