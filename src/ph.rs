//! pH probe: windowed voltage to pH, with neutral (7.0) and acid (4.0) buffer
//! voltages calibrated in the field.

use embedded_storage::Storage;
use log::{debug, info};
use num_traits::float::FloatCore; // Required to take absolute value in `no_std`.

use crate::{
    calibration::{CalMode, CalibrationSession, Response, Step, Target},
    storage::{PersistentField, PH_ACID_ADDR, PH_NEUTRAL_ADDR},
    voltage_from_adc, AdcConfig, AnalogInput, Probe, Sampler, SensorError, Timing,
};

const PH_SAMPLES: usize = 5;
pub const PH_TIMING: Timing = Timing::new(30, 150);

/// pH per Volt of the linear model.
const PH_SLOPE: f32 = 3.5;

// Probe voltages in standard buffers at 25°C, used until calibrated.
const NEUTRAL_V_DEFAULT: f32 = 2.0;
const ACID_V_DEFAULT: f32 = 1.14;

// A confirm reading in one of these (exclusive) windows identifies the buffer
// the probe is sitting in.
const NEUTRAL_WINDOW: (f32, f32) = (1.7, 2.7);
const ACID_WINDOW: (f32, f32) = (0.7, 1.7);

#[derive(Debug, Clone, Copy, PartialEq, Default)]
/// How voltage maps to pH.
pub enum PhModel {
    /// `3.5 * V + offset`.
    #[default]
    Linear,
    /// The line through the calibrated (neutral V, 7.0) and (acid V, 4.0)
    /// points, plus offset.
    TwoPoint,
}

#[derive(Debug, Clone, Copy, PartialEq)]
/// A confirmed buffer reading, in Volts.
pub enum PhBuffer {
    /// pH 7.0
    Neutral(f32),
    /// pH 4.0
    Acid(f32),
}

impl PhBuffer {
    /// Identify the buffer from the probe voltage, if it's in either window.
    pub fn from_voltage(V: f32) -> Option<Self> {
        if V > NEUTRAL_WINDOW.0 && V < NEUTRAL_WINDOW.1 {
            Some(Self::Neutral(V))
        } else if V > ACID_WINDOW.0 && V < ACID_WINDOW.1 {
            Some(Self::Acid(V))
        } else {
            None
        }
    }

    /// Nominal pH of the buffer solution.
    pub fn ph(&self) -> f32 {
        match self {
            Self::Neutral(_) => 7.,
            Self::Acid(_) => 4.,
        }
    }
}

/// Convert probe voltage to pH.
pub fn ph_from_voltage(V: f32, model: PhModel, offset: f32, neutral_V: f32, acid_V: f32) -> f32 {
    match model {
        PhModel::Linear => PH_SLOPE * V + offset,
        PhModel::TwoPoint => {
            // Coincident points don't define a line.
            if FloatCore::abs(neutral_V - acid_V) < f32::EPSILON {
                return PH_SLOPE * V + offset;
            }
            // a is the slope, pH / V.
            let a = (7. - 4.) / (neutral_V - acid_V);
            let b = 7. - a * neutral_V;
            a * V + b + offset
        }
    }
}

pub struct PhProbe {
    sampler: Sampler<PH_SAMPLES>,
    adc: AdcConfig,
    model: PhModel,
    neutral_field: PersistentField<f32>,
    acid_field: PersistentField<f32>,
    neutral_V: f32,
    acid_V: f32,
    // In-memory adjustment only; never persisted.
    offset: f32,
    voltage: f32,
    pH: f32,
    session: CalibrationSession<PhBuffer>,
}

impl PhProbe {
    pub fn new(pin: u8, adc: AdcConfig) -> Self {
        Self {
            sampler: Sampler::new(pin, PH_TIMING),
            adc,
            model: PhModel::Linear,
            neutral_field: PersistentField::new(PH_NEUTRAL_ADDR, NEUTRAL_V_DEFAULT),
            acid_field: PersistentField::new(PH_ACID_ADDR, ACID_V_DEFAULT),
            neutral_V: NEUTRAL_V_DEFAULT,
            acid_V: ACID_V_DEFAULT,
            offset: 0.,
            voltage: 0.,
            pH: 0.,
            session: CalibrationSession::new(),
        }
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.sampler = Sampler::new(self.sampler.pin(), timing);
        self
    }

    pub fn with_model(mut self, model: PhModel) -> Self {
        self.model = model;
        self
    }

    /// Probe voltage behind the last reported pH, in Volts.
    pub fn voltage(&self) -> f32 {
        self.voltage
    }

    pub fn neutral_voltage(&self) -> f32 {
        self.neutral_V
    }

    pub fn acid_voltage(&self) -> f32 {
        self.acid_V
    }

    pub fn offset(&self) -> f32 {
        self.offset
    }

    /// Shift readings by `offset` pH. Not persisted.
    pub fn set_offset(&mut self, offset: f32) {
        self.offset = offset;
    }

    pub fn session(&self) -> &CalibrationSession<PhBuffer> {
        &self.session
    }

    fn commit<S: Storage>(&mut self, store: &mut S, buffer: PhBuffer) -> Result<(), SensorError> {
        match buffer {
            PhBuffer::Neutral(V) => {
                self.neutral_field.write(store, V)?;
                self.neutral_V = V;
            }
            PhBuffer::Acid(V) => {
                self.acid_field.write(store, V)?;
                self.acid_V = V;
            }
        }
        info!("Saved pH calibration: {:?}", buffer);
        Ok(())
    }
}

impl Probe for PhProbe {
    fn setup<S: Storage>(&mut self, store: &mut S) -> Result<(), SensorError> {
        self.neutral_V = self.neutral_field.read(store)?;
        self.acid_V = self.acid_field.read(store)?;
        debug!("pH neutral: {}V, acid: {}V", self.neutral_V, self.acid_V);
        Ok(())
    }

    fn update<A: AnalogInput + ?Sized>(
        &mut self,
        input: &mut A,
        now_ms: u64,
        _temperature_c: f32,
    ) -> Result<(), SensorError> {
        if let Some(avg) = self.sampler.poll(input, now_ms)? {
            self.voltage = voltage_from_adc(avg, &self.adc);
            self.pH = ph_from_voltage(
                self.voltage,
                self.model,
                self.offset,
                self.neutral_V,
                self.acid_V,
            );
            debug!("pH: {} ({}V)", self.pH, self.voltage);
        }
        Ok(())
    }

    fn value(&self) -> f32 {
        self.pH
    }

    fn calibration<S: Storage>(
        &mut self,
        mode: CalMode,
        _temperature_c: f32,
        store: &mut S,
    ) -> Result<Option<Response>, SensorError> {
        let V = self.voltage;
        let step = self.session.advance(mode, || PhBuffer::from_voltage(V));

        if let Step::Commit(buffer) = step {
            self.commit(store, buffer)?;
        }
        Ok(step.response(Target::Ph, Response::PhConfirmed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{assert_close, FakeAdc, MemStore};
    use crate::SessionState;

    const PIN: u8 = 2;

    /// Poll every 5ms, up to and including `until_ms`.
    fn run(probe: &mut PhProbe, adc: &FakeAdc, from_ms: u64, until_ms: u64) {
        let mut input = adc;
        for now in (from_ms..=until_ms).step_by(5) {
            probe.update(&mut input, now, 25.).unwrap();
        }
    }

    fn probe_at(code: u16) -> (PhProbe, FakeAdc) {
        let adc = FakeAdc::new();
        adc.set(PIN, code);
        let mut probe = PhProbe::new(PIN, AdcConfig::default());
        run(&mut probe, &adc, 0, 150);
        (probe, adc)
    }

    #[test]
    fn linear_model() {
        assert_close(ph_from_voltage(2.0, PhModel::Linear, 0., 2.0, 1.14), 7.0, 1e-6);
        assert_close(ph_from_voltage(2.0, PhModel::Linear, -0.2, 2.0, 1.14), 6.8, 1e-6);
    }

    #[test]
    fn two_point_model() {
        assert_close(ph_from_voltage(2.0, PhModel::TwoPoint, 0., 2.0, 1.0), 7.0, 1e-5);
        assert_close(ph_from_voltage(1.0, PhModel::TwoPoint, 0., 2.0, 1.0), 4.0, 1e-5);
        assert_close(ph_from_voltage(1.5, PhModel::TwoPoint, 0., 2.0, 1.0), 5.5, 1e-5);
        // Degenerate calibration falls back to the linear model.
        assert_close(ph_from_voltage(1.5, PhModel::TwoPoint, 0., 1.5, 1.5), 5.25, 1e-5);
    }

    #[test]
    fn buffer_windows() {
        assert_eq!(PhBuffer::from_voltage(2.0), Some(PhBuffer::Neutral(2.0)));
        assert_eq!(PhBuffer::from_voltage(1.2), Some(PhBuffer::Acid(1.2)));
        // Bounds are exclusive.
        assert_eq!(PhBuffer::from_voltage(1.7), None);
        assert_eq!(PhBuffer::from_voltage(2.7), None);
        assert_eq!(PhBuffer::from_voltage(0.7), None);
        assert_eq!(PhBuffer::from_voltage(3.0), None);
    }

    #[test]
    fn reading_updates_per_window() {
        let adc = FakeAdc::new();
        adc.set(PIN, 400);
        let mut probe = PhProbe::new(PIN, AdcConfig::default());

        run(&mut probe, &adc, 0, 145);
        assert_eq!(probe.value(), 0.);

        run(&mut probe, &adc, 150, 150);
        assert_eq!(probe.voltage(), 1.953_125);
        assert_close(probe.value(), 3.5 * 1.953_125, 1e-5);
    }

    #[test]
    fn setup_heals_erased_store() {
        let mut store = MemStore::erased();
        let mut probe = PhProbe::new(PIN, AdcConfig::default());
        probe.setup(&mut store).unwrap();

        assert_eq!(store.f32_at(PH_NEUTRAL_ADDR), 2.0);
        assert_eq!(store.f32_at(PH_ACID_ADDR), 1.14);
        assert_eq!(probe.neutral_voltage(), 2.0);
    }

    #[test]
    fn setup_loads_stored_voltages() {
        let mut store = MemStore::erased();
        store.set_f32(PH_NEUTRAL_ADDR, 1.95);
        store.set_f32(PH_ACID_ADDR, 1.05);
        let mut probe = PhProbe::new(PIN, AdcConfig::default());
        probe.setup(&mut store).unwrap();

        assert_eq!(probe.neutral_voltage(), 1.95);
        assert_eq!(probe.acid_voltage(), 1.05);
        assert_eq!(store.writes, 0);
    }

    #[test]
    fn calibrate_neutral() {
        let mut store = MemStore::erased();
        let (mut probe, _adc) = probe_at(400); // 1.953125V
        probe.setup(&mut store).unwrap();

        let r = probe.calibration(CalMode::Enter, 25., &mut store).unwrap();
        assert_eq!(r, Some(Response::Entered(Target::Ph)));

        let r = probe.calibration(CalMode::Confirm, 25., &mut store).unwrap();
        assert_eq!(r, Some(Response::PhConfirmed(PhBuffer::Neutral(1.953_125))));
        // Staged, not yet saved.
        assert_eq!(store.f32_at(PH_NEUTRAL_ADDR), 2.0);
        assert_eq!(probe.neutral_voltage(), 2.0);

        let r = probe.calibration(CalMode::Exit, 25., &mut store).unwrap();
        assert_eq!(r, Some(Response::Saved(Target::Ph)));
        assert_eq!(store.f32_at(PH_NEUTRAL_ADDR), 1.953_125);
        assert_eq!(store.f32_at(PH_ACID_ADDR), 1.14);
        assert_eq!(probe.neutral_voltage(), 1.953_125);
        assert_eq!(probe.session().state(), SessionState::Idle);
    }

    #[test]
    fn calibrate_acid() {
        let mut store = MemStore::erased();
        let (mut probe, _adc) = probe_at(250); // 1.220703125V
        probe.setup(&mut store).unwrap();

        probe.calibration(CalMode::Enter, 25., &mut store).unwrap();
        probe.calibration(CalMode::Confirm, 25., &mut store).unwrap();
        probe.calibration(CalMode::Exit, 25., &mut store).unwrap();

        assert_eq!(store.f32_at(PH_ACID_ADDR), 1.220_703_1);
        assert_eq!(store.f32_at(PH_NEUTRAL_ADDR), 2.0);
    }

    #[test]
    fn rejected_buffer_is_not_saved() {
        let mut store = MemStore::erased();
        let (mut probe, _adc) = probe_at(700); // 3.4V
        probe.setup(&mut store).unwrap();
        let before = store.bytes;

        probe.calibration(CalMode::Enter, 25., &mut store).unwrap();
        let r = probe.calibration(CalMode::Confirm, 25., &mut store).unwrap();
        assert_eq!(r, Some(Response::ConfirmFailed(Target::Ph)));
        let r = probe.calibration(CalMode::Exit, 25., &mut store).unwrap();
        assert_eq!(r, Some(Response::NotSaved(Target::Ph)));

        assert_eq!(store.bytes, before);
    }

    #[test]
    fn confirm_uses_current_reading() {
        let mut store = MemStore::erased();
        let (mut probe, adc) = probe_at(700);
        probe.setup(&mut store).unwrap();
        probe.calibration(CalMode::Enter, 25., &mut store).unwrap();
        assert_eq!(
            probe.calibration(CalMode::Confirm, 25., &mut store).unwrap(),
            Some(Response::ConfirmFailed(Target::Ph))
        );

        // Operator moves the probe to the acid buffer, waits, and retries.
        adc.set(PIN, 250);
        run(&mut probe, &adc, 155, 300);
        assert_eq!(
            probe.calibration(CalMode::Confirm, 25., &mut store).unwrap(),
            Some(Response::PhConfirmed(PhBuffer::Acid(1.220_703_1)))
        );
    }

    #[test]
    fn offset_is_not_persisted() {
        let mut store = MemStore::erased();
        let (mut probe, adc) = probe_at(400);
        probe.setup(&mut store).unwrap();
        let before = store.bytes;

        probe.set_offset(0.5);
        run(&mut probe, &adc, 155, 300);
        assert_close(probe.value(), 3.5 * 1.953_125 + 0.5, 1e-5);
        assert_eq!(store.bytes, before);
    }
}
