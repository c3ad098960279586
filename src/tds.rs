//! Total dissolved solids, derived from conductivity with a cubic fit to probe
//! voltage. Calibrated against a known-ppm reference solution.

use embedded_storage::Storage;
use log::{debug, info};

use crate::{
    calibration::{CalMode, CalibrationSession, Response, Step, Target},
    storage::{PersistentField, TDS_K_ADDR},
    voltage_from_adc, AdcConfig, AnalogInput, Probe, Sampler, SensorError, Timing,
};

const TDS_SAMPLES: usize = 20;
pub const TDS_TIMING: Timing = Timing::new(40, 800);

/// ppm per µS/cm.
const TDS_FACTOR: f32 = 0.5;
/// ppm; 1413µS/cm at 25°C.
const REFERENCE_PPM_DEFAULT: f32 = 707.;

// Accepted calibration ranges, exclusive.
const RAW_EC_MAX: f32 = 2_000.;
const K_MIN: f32 = 0.25;
const K_MAX: f32 = 4.;

/// Uncalibrated conductivity at probe voltage `V`, in µS/cm.
fn ec_poly(V: f32) -> f32 {
    133.42 * V * V * V - 255.86 * V * V + 857.39 * V
}

fn compensation(temperature_c: f32) -> f32 {
    1. + 0.02 * (temperature_c - 25.)
}

/// Returns `(tds, ec25)`: TDS in ppm, and conductivity compensated to 25°C in
/// µS/cm.
pub fn tds_from_voltage(V: f32, k: f32, temperature_c: f32) -> (f32, f32) {
    let ec25 = ec_poly(V) * k / compensation(temperature_c);
    (ec25 * TDS_FACTOR, ec25)
}

pub struct TdsProbe {
    sampler: Sampler<TDS_SAMPLES>,
    adc: AdcConfig,
    k_field: PersistentField<f32>,
    k: f32,
    reference_ppm: f32,
    voltage: f32,
    tds: f32,
    ec25: f32,
    session: CalibrationSession<f32>,
}

impl TdsProbe {
    pub fn new(pin: u8, adc: AdcConfig) -> Self {
        Self {
            sampler: Sampler::new(pin, TDS_TIMING),
            adc,
            k_field: PersistentField::new(TDS_K_ADDR, 1.),
            k: 1.,
            reference_ppm: REFERENCE_PPM_DEFAULT,
            voltage: 0.,
            tds: 0.,
            ec25: 0.,
            session: CalibrationSession::new(),
        }
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.sampler = Sampler::new(self.sampler.pin(), timing);
        self
    }

    /// Calibrate against a solution of `ppm` at 25°C, instead of 707ppm.
    pub fn with_reference(mut self, ppm: f32) -> Self {
        self.reference_ppm = ppm;
        self
    }

    /// Conductivity compensated to 25°C, in µS/cm.
    pub fn ec_value(&self) -> f32 {
        self.ec25
    }

    pub fn k_value(&self) -> f32 {
        self.k
    }

    pub fn voltage(&self) -> f32 {
        self.voltage
    }

    pub fn session(&self) -> &CalibrationSession<f32> {
        &self.session
    }

    /// The k value that would make the current reading match the reference
    /// solution, if it's plausible.
    fn fit_k(&self, temperature_c: f32) -> Option<f32> {
        let raw = self.reference_ppm / TDS_FACTOR * compensation(temperature_c);
        let k = raw / ec_poly(self.voltage);

        if raw > 0. && raw < RAW_EC_MAX && k > K_MIN && k < K_MAX {
            Some(k)
        } else {
            None
        }
    }
}

impl Probe for TdsProbe {
    fn setup<S: Storage>(&mut self, store: &mut S) -> Result<(), SensorError> {
        self.k = self.k_field.read(store)?;
        debug!("TDS k: {}", self.k);
        Ok(())
    }

    fn update<A: AnalogInput + ?Sized>(
        &mut self,
        input: &mut A,
        now_ms: u64,
        temperature_c: f32,
    ) -> Result<(), SensorError> {
        if let Some(avg) = self.sampler.poll(input, now_ms)? {
            self.voltage = voltage_from_adc(avg, &self.adc);
            let (tds, ec25) = tds_from_voltage(self.voltage, self.k, temperature_c);
            self.tds = tds;
            self.ec25 = ec25;
            debug!("TDS: {}ppm ({}V)", tds, self.voltage);
        }
        Ok(())
    }

    /// ppm
    fn value(&self) -> f32 {
        self.tds
    }

    fn calibration<S: Storage>(
        &mut self,
        mode: CalMode,
        temperature_c: f32,
        store: &mut S,
    ) -> Result<Option<Response>, SensorError> {
        let fitted = self.fit_k(temperature_c);
        let step = self.session.advance(mode, || fitted);

        if let Step::Commit(k) = step {
            self.k_field.write(store, k)?;
            self.k = k;
            info!("Saved TDS k: {}", k);
        }
        Ok(step.response(Target::Tds, |k| Response::TdsConfirmed { k }))
    }
}
