//! Electrical conductivity probe, with temperature compensation and a
//! single-point calibration in 1.413mS/cm buffer solution.

use embedded_storage::Storage;
use log::{debug, info};

use crate::{
    calibration::{CalMode, CalibrationSession, Response, Step, Target},
    storage::{PersistentField, EC_FACTOR_ADDR},
    AdcConfig, AnalogInput, Probe, Sampler, SensorError, Timing,
};

const EC_SAMPLES: usize = 5;
pub const EC_TIMING: Timing = Timing::new(25, 700);

/// Conductivity of the calibration buffer at 25°C, in mS/cm.
const BUFFER_EC: f32 = 1.413;

// Accepted compensation factors, exclusive.
const FACTOR_MIN: f32 = 0.;
const FACTOR_MAX: f32 = 1.15;

// Compensated probe voltage limits, in mV. Outside of these, the reading is
// pinned to the range end.
const V_MIN: f32 = 150.;
const V_MAX: f32 = 3_300.;
/// mS/cm reported above `V_MAX`.
const EC_MAX: f32 = 20.;

/// Ratio of conductivity at `temperature_c` to conductivity at 25°C.
pub fn temperature_coefficient(temperature_c: f32) -> f32 {
    1. + 0.0185 * (temperature_c - 25.)
}

/// Conductivity from compensated probe voltage, in mV. Returns
/// `(value, raw)` in mS/cm: `raw` is before the calibration factor is applied.
pub fn conductivity(V_comp: f32, factor: f32) -> (f32, f32) {
    if V_comp < V_MIN {
        return (0., 0.);
    }
    if V_comp > V_MAX {
        return (EC_MAX, EC_MAX);
    }

    // Piecewise fit, in µS/cm, for the 1-3, 3-10 and 10-20mS/cm ranges.
    let uS = if V_comp <= 448. {
        6.84 * V_comp - 64.32
    } else if V_comp <= 1_457. {
        6.98 * V_comp - 127.
    } else {
        5.3 * V_comp + 2_278.
    };

    (uS / factor / 1_000., uS / 1_000.)
}

pub struct EcProbe {
    sampler: Sampler<EC_SAMPLES>,
    adc: AdcConfig,
    factor_field: PersistentField<f32>,
    factor: f32,
    ec: f32,
    ec_raw: f32,
    session: CalibrationSession<f32>,
}

impl EcProbe {
    pub fn new(pin: u8, adc: AdcConfig) -> Self {
        Self {
            sampler: Sampler::new(pin, EC_TIMING),
            adc,
            factor_field: PersistentField::new(EC_FACTOR_ADDR, 1.),
            factor: 1.,
            ec: 0.,
            ec_raw: 0.,
            session: CalibrationSession::new(),
        }
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.sampler = Sampler::new(self.sampler.pin(), timing);
        self
    }

    /// Conductivity before the calibration factor, in mS/cm.
    pub fn raw_value(&self) -> f32 {
        self.ec_raw
    }

    /// The calibration factor in use.
    pub fn factor(&self) -> f32 {
        self.factor
    }

    pub fn session(&self) -> &CalibrationSession<f32> {
        &self.session
    }
}

impl Probe for EcProbe {
    fn setup<S: Storage>(&mut self, store: &mut S) -> Result<(), SensorError> {
        self.factor = self.factor_field.read(store)?;
        debug!("EC factor: {}", self.factor);
        Ok(())
    }

    fn update<A: AnalogInput + ?Sized>(
        &mut self,
        input: &mut A,
        now_ms: u64,
        temperature_c: f32,
    ) -> Result<(), SensorError> {
        if let Some(avg) = self.sampler.poll(input, now_ms)? {
            let mV = avg * self.adc.vref * 1_000. / self.adc.full_scale;
            let V_comp = mV / temperature_coefficient(temperature_c);

            let (ec, raw) = conductivity(V_comp, self.factor);
            self.ec = ec;
            self.ec_raw = raw;
            debug!("EC: {}mS/cm ({}mV at {}°C)", ec, mV, temperature_c);
        }
        Ok(())
    }

    /// mS/cm
    fn value(&self) -> f32 {
        self.ec
    }

    fn calibration<S: Storage>(
        &mut self,
        mode: CalMode,
        _temperature_c: f32,
        store: &mut S,
    ) -> Result<Option<Response>, SensorError> {
        let raw = self.ec_raw;
        let step = self.session.advance(mode, || {
            let factor = raw / BUFFER_EC;
            (factor > FACTOR_MIN && factor < FACTOR_MAX).then_some(factor)
        });

        if let Step::Commit(factor) = step {
            self.factor_field.write(store, factor)?;
            self.factor = factor;
            info!("Saved EC factor: {}", factor);
        }
        Ok(step.response(Target::Ec, |factor| Response::EcConfirmed { factor }))
    }
}
