//! Sampling, temperature compensation and field calibration for analog
//! water-quality probes: pH, electrical conductivity (EC), total dissolved
//! solids (TDS), ORP and temperature.
//!
//! Each probe collects raw ADC codes into a fixed-size window, converts the
//! windowed average into physical units on its own report cadence, and
//! (for pH, EC and TDS) can be recalibrated in the field with a short text
//! protocol. Calibration constants live in any `embedded_storage::Storage`
//! (EEPROM, emulated-EEPROM flash page, etc), and survive power cycles.
//!
//! Hardware is injected: an `AnalogInput` (use `OneShotInput` to wrap any
//! `embedded_hal::adc::OneShot` driver), a millisecond `Clock`, an
//! `embedded_hal::serial::Read<u8>` for operator commands, and the store.
//!
//! Example main loop:
//! ```ignore
//! use watermonitor::{SensorHub, SensorKind};
//!
//! let mut hub = SensorHub::new(adc, clock, serial, eeprom);
//! hub.setup().unwrap();
//!
//! loop {
//!     hub.update().ok();
//!
//!     // Operators send eg `ENTEREC`, then `CALEC` with the probe in
//!     // 1.413mS/cm buffer solution, then `EXITEC` to save.
//!     if let Ok(Some(response)) = hub.calibrate() {
//!         writeln!(console, "{}", response).ok();
//!     }
//!
//!     let pH = hub.value(SensorKind::Ph);
//!     let ec = hub.value_by_index(3); // mS/cm
//! }
//! ```

#![cfg_attr(not(test), no_std)]
#![allow(non_snake_case, clippy::needless_doctest_main)]

#[macro_use(block)]
extern crate nb;

use core::fmt;

use embedded_storage::Storage;

mod calibration;
mod command;
mod ec;
mod hub;
mod input;
mod orp;
mod ph;
mod storage;
mod tds;
mod temp;
mod window;

#[cfg(test)]
mod fakes;

pub use calibration::{CalMode, CalibrationSession, Response, SessionState, Step, Target};
pub use command::{parse, Line, LineReader, LINE_CAPACITY, RECEIVE_TIMEOUT_MS};
pub use ec::{conductivity, temperature_coefficient, EcProbe};
pub use hub::{HubConfig, Pins, Sensor, SensorHub, SensorKind, Timings, SENSOR_COUNT};
pub use input::{AnalogInput, Clock, OneShotInput};
pub use orp::{orp_from_voltage, OrpProbe};
pub use ph::{ph_from_voltage, PhBuffer, PhModel, PhProbe};
pub use storage::{
    Persist, PersistentField, EC_FACTOR_ADDR, ERASED, PH_ACID_ADDR, PH_NEUTRAL_ADDR, TDS_K_ADDR,
};
pub use tds::{tds_from_voltage, TdsProbe};
pub use temp::{temp_from_voltage, TemperatureProbe};
pub use window::{Gate, Sampler, SamplingWindow, Timing};

/// Errors from the collaborators behind a probe. Calibration rejections and
/// unknown commands are not errors; they're reported as a `Response`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SensorError {
    /// The ADC or serial driver reported a failure.
    Bus,
    /// An ADC read was requested on a pin the input doesn't have.
    NoSuchPin,
    /// Reading or writing the calibration store failed.
    Storage,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus => f.write_str("bus error"),
            Self::NoSuchPin => f.write_str("no such analog pin"),
            Self::Storage => f.write_str("calibration storage error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
/// Describes the converter behind an `AnalogInput`.
pub struct AdcConfig {
    /// Reference voltage, in Volts.
    pub vref: f32,
    /// Number of codes across the reference range, eg 1024 for a 10-bit ADC.
    pub full_scale: f32,
}

impl AdcConfig {
    pub const fn new(vref: f32, full_scale: f32) -> Self {
        Self { vref, full_scale }
    }
}

impl Default for AdcConfig {
    /// 10-bit converter referenced to 5V.
    fn default() -> Self {
        Self::new(5.0, 1_024.)
    }
}

/// Convert a (possibly averaged) ADC code to voltage, in Volts.
pub fn voltage_from_adc(code: f32, adc: &AdcConfig) -> f32 {
    code * adc.vref / adc.full_scale
}

/// The capability set shared by every probe the hub drives.
pub trait Probe {
    /// Load calibration constants from the store. Fields that have never been
    /// written are repaired with their defaults. Calling this twice is harmless.
    fn setup<S: Storage>(&mut self, _store: &mut S) -> Result<(), SensorError> {
        Ok(())
    }

    /// Take a sample if the sample interval has elapsed, and recompute the
    /// physical value if the report interval has. `temperature_c` is the
    /// current compensation reference.
    fn update<A: AnalogInput + ?Sized>(
        &mut self,
        input: &mut A,
        now_ms: u64,
        temperature_c: f32,
    ) -> Result<(), SensorError>;

    /// The last computed value, in the probe's physical unit.
    fn value(&self) -> f32;

    /// Advance the probe's calibration session. Probes without calibration
    /// ignore every mode.
    fn calibration<S: Storage>(
        &mut self,
        _mode: CalMode,
        _temperature_c: f32,
        _store: &mut S,
    ) -> Result<Option<Response>, SensorError> {
        Ok(None)
    }
}
