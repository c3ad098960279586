//! Owns every probe and the hardware they share, and routes operator commands
//! to the probe they name.

use embedded_hal::serial;
use embedded_storage::Storage;
use log::warn;

use crate::{
    calibration::{CalMode, Response, Target},
    command::{parse, LineReader},
    ec::{EcProbe, EC_TIMING},
    orp::{OrpProbe, ORP_TIMING},
    ph::{PhModel, PhProbe, PH_TIMING},
    tds::{TdsProbe, TDS_TIMING},
    temp::{TemperatureProbe, TEMP_TIMING},
    AdcConfig, AnalogInput, Clock, Probe, SensorError, Timing,
};

pub const SENSOR_COUNT: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Hub slots. The discriminant is the index used by `value_by_index`.
pub enum SensorKind {
    Ph = 0,
    Temperature = 1,
    Tds = 2,
    Ec = 3,
    Orp = 4,
}

impl SensorKind {
    pub const ALL: [Self; SENSOR_COUNT] = [
        Self::Ph,
        Self::Temperature,
        Self::Tds,
        Self::Ec,
        Self::Orp,
    ];

    pub fn from_index(i: usize) -> Option<Self> {
        Self::ALL.get(i).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

impl From<Target> for SensorKind {
    fn from(target: Target) -> Self {
        match target {
            Target::Ph => Self::Ph,
            Target::Tds => Self::Tds,
            Target::Ec => Self::Ec,
        }
    }
}

/// One of the hub's probes.
pub enum Sensor {
    Ph(PhProbe),
    Temperature(TemperatureProbe),
    Tds(TdsProbe),
    Ec(EcProbe),
    Orp(OrpProbe),
}

impl Sensor {
    pub fn kind(&self) -> SensorKind {
        match self {
            Self::Ph(_) => SensorKind::Ph,
            Self::Temperature(_) => SensorKind::Temperature,
            Self::Tds(_) => SensorKind::Tds,
            Self::Ec(_) => SensorKind::Ec,
            Self::Orp(_) => SensorKind::Orp,
        }
    }
}

impl Probe for Sensor {
    fn setup<S: Storage>(&mut self, store: &mut S) -> Result<(), SensorError> {
        match self {
            Self::Ph(p) => p.setup(store),
            Self::Temperature(p) => p.setup(store),
            Self::Tds(p) => p.setup(store),
            Self::Ec(p) => p.setup(store),
            Self::Orp(p) => p.setup(store),
        }
    }

    fn update<A: AnalogInput + ?Sized>(
        &mut self,
        input: &mut A,
        now_ms: u64,
        temperature_c: f32,
    ) -> Result<(), SensorError> {
        match self {
            Self::Ph(p) => p.update(input, now_ms, temperature_c),
            Self::Temperature(p) => p.update(input, now_ms, temperature_c),
            Self::Tds(p) => p.update(input, now_ms, temperature_c),
            Self::Ec(p) => p.update(input, now_ms, temperature_c),
            Self::Orp(p) => p.update(input, now_ms, temperature_c),
        }
    }

    fn value(&self) -> f32 {
        match self {
            Self::Ph(p) => p.value(),
            Self::Temperature(p) => p.value(),
            Self::Tds(p) => p.value(),
            Self::Ec(p) => p.value(),
            Self::Orp(p) => p.value(),
        }
    }

    fn calibration<S: Storage>(
        &mut self,
        mode: CalMode,
        temperature_c: f32,
        store: &mut S,
    ) -> Result<Option<Response>, SensorError> {
        match self {
            Self::Ph(p) => p.calibration(mode, temperature_c, store),
            Self::Temperature(p) => p.calibration(mode, temperature_c, store),
            Self::Tds(p) => p.calibration(mode, temperature_c, store),
            Self::Ec(p) => p.calibration(mode, temperature_c, store),
            Self::Orp(p) => p.calibration(mode, temperature_c, store),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Analog pin of each probe.
pub struct Pins {
    pub ph: u8,
    pub tds: u8,
    pub ec: u8,
    pub orp: u8,
    pub temperature: u8,
}

impl Default for Pins {
    fn default() -> Self {
        Self {
            ph: 2,
            tds: 1,
            ec: 0,
            orp: 3,
            temperature: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Sample and report cadence of each probe.
pub struct Timings {
    pub ph: Timing,
    pub tds: Timing,
    pub ec: Timing,
    pub orp: Timing,
    pub temperature: Timing,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            ph: PH_TIMING,
            tds: TDS_TIMING,
            ec: EC_TIMING,
            orp: ORP_TIMING,
            temperature: TEMP_TIMING,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HubConfig {
    pub adc: AdcConfig,
    pub pins: Pins,
    pub timing: Timings,
    pub ph_model: PhModel,
}

/// Drives the probes off shared hardware. Call `update` and `calibrate` from
/// the main loop, as often as possible; both return promptly.
pub struct SensorHub<A, C, R, S> {
    input: A,
    clock: C,
    serial: R,
    store: S,
    lines: LineReader,
    sensors: [Sensor; SENSOR_COUNT],
    config: HubConfig,
}

impl<A, C, R, S> SensorHub<A, C, R, S>
where
    A: AnalogInput,
    C: Clock,
    R: serial::Read<u8>,
    S: Storage,
{
    pub fn new(input: A, clock: C, serial: R, store: S) -> Self {
        Self::with_config(input, clock, serial, store, HubConfig::default())
    }

    pub fn with_config(input: A, clock: C, serial: R, store: S, config: HubConfig) -> Self {
        let HubConfig {
            adc,
            pins,
            timing,
            ph_model,
        } = config;

        // Ordered by `SensorKind`.
        let sensors = [
            Sensor::Ph(
                PhProbe::new(pins.ph, adc)
                    .with_model(ph_model)
                    .with_timing(timing.ph),
            ),
            Sensor::Temperature(
                TemperatureProbe::new(pins.temperature, adc).with_timing(timing.temperature),
            ),
            Sensor::Tds(TdsProbe::new(pins.tds, adc).with_timing(timing.tds)),
            Sensor::Ec(EcProbe::new(pins.ec, adc).with_timing(timing.ec)),
            Sensor::Orp(OrpProbe::new(pins.orp, adc).with_timing(timing.orp)),
        ];

        Self {
            input,
            clock,
            serial,
            store,
            lines: LineReader::new(),
            sensors,
            config,
        }
    }

    /// Load calibration constants, repairing erased storage.
    pub fn setup(&mut self) -> Result<(), SensorError> {
        for sensor in self.sensors.iter_mut() {
            if let Err(e) = sensor.setup(&mut self.store) {
                warn!("{:?} setup failed: {}", sensor.kind(), e);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Give every probe a chance to sample and report. A failing input doesn't
    /// stop the other probes; the last error is returned.
    pub fn update(&mut self) -> Result<(), SensorError> {
        let now = self.clock.now_ms();
        let mut result = Ok(());

        for kind in SensorKind::ALL {
            // Probes after the temperature probe see this tick's temperature.
            let T = self.temperature();
            if let Err(e) = self.sensors[kind.index()].update(&mut self.input, now, T) {
                warn!("{:?} update failed: {}", kind, e);
                result = Err(e);
            }
        }
        result
    }

    /// Handle at most one operator command, if a complete line has arrived.
    /// Returns the report for the operator.
    pub fn calibrate(&mut self) -> Result<Option<Response>, SensorError> {
        let now = self.clock.now_ms();
        let line = match self.lines.poll(&mut self.serial, now)? {
            Some(l) if !l.is_empty() => l,
            _ => return Ok(None),
        };

        let response = match parse(&line) {
            Some((target, mode)) => {
                let T = self.temperature();
                let sensor = &mut self.sensors[SensorKind::from(target).index()];
                sensor.calibration(mode, T, &mut self.store).map_err(|e| {
                    warn!("{:?} calibration failed: {}", target, e);
                    e
                })?
            }
            None => Some(Response::CommandError(None)),
        };

        if let Some(r) = &response {
            r.log();
        }
        Ok(response)
    }

    /// Last value of the probe at `i`, in `SensorKind` order; 0 if there's
    /// no such probe.
    pub fn value_by_index(&self, i: usize) -> f64 {
        self.sensors.get(i).map(|s| s.value() as f64).unwrap_or(0.)
    }

    pub fn value(&self, kind: SensorKind) -> f32 {
        self.sensors[kind.index()].value()
    }

    /// The compensation reference, in °C.
    pub fn temperature(&self) -> f32 {
        self.value(SensorKind::Temperature)
    }

    pub fn sensor(&self, kind: SensorKind) -> &Sensor {
        &self.sensors[kind.index()]
    }

    pub fn sensor_mut(&mut self, kind: SensorKind) -> &mut Sensor {
        &mut self.sensors[kind.index()]
    }

    pub fn sensors(&self) -> &[Sensor; SENSOR_COUNT] {
        &self.sensors
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Return the hardware: input, clock, serial port, and store.
    pub fn release(self) -> (A, C, R, S) {
        (self.input, self.clock, self.serial, self.store)
    }
}
