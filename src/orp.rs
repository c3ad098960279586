//! Oxidation-reduction potential.

use log::debug;

use crate::{voltage_from_adc, AdcConfig, AnalogInput, Probe, Sampler, SensorError, Timing};

const ORP_SAMPLES: usize = 20;
pub const ORP_TIMING: Timing = Timing::new(20, 800);

/// ORP in mV, from probe voltage `V` and ADC reference voltage `vref`, both in
/// Volts. The probe board biases its output relative to `vref`.
pub fn orp_from_voltage(V: f32, vref: f32, offset: f32) -> f32 {
    (30. * vref * 1_000. - 75. * V * 1_000.) / 75. - offset
}

pub struct OrpProbe {
    sampler: Sampler<ORP_SAMPLES>,
    adc: AdcConfig,
    offset: f32,
    orp: f32,
}

impl OrpProbe {
    pub fn new(pin: u8, adc: AdcConfig) -> Self {
        Self {
            sampler: Sampler::new(pin, ORP_TIMING),
            adc,
            offset: 0.,
            orp: 0.,
        }
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.sampler = Sampler::new(self.sampler.pin(), timing);
        self
    }

    pub fn offset(&self) -> f32 {
        self.offset
    }

    /// mV subtracted from every reading, eg to zero the probe against a
    /// reference solution. Kept in memory only.
    pub fn set_offset(&mut self, offset: f32) {
        self.offset = offset;
    }
}

impl Probe for OrpProbe {
    fn update<A: AnalogInput + ?Sized>(
        &mut self,
        input: &mut A,
        now_ms: u64,
        _temperature_c: f32,
    ) -> Result<(), SensorError> {
        if let Some(avg) = self.sampler.poll(input, now_ms)? {
            let V = voltage_from_adc(avg, &self.adc);
            self.orp = orp_from_voltage(V, self.adc.vref, self.offset);
            debug!("ORP: {}mV", self.orp);
        }
        Ok(())
    }

    /// mV
    fn value(&self) -> f32 {
        self.orp
    }
}
