//! Fixed-width records for calibration constants, stored at known offsets of
//! an `embedded_storage::Storage` (usually an EEPROM).
//!
//! A freshly erased part reads back as all `0xFF`. Reading a field in that
//! state yields its default, and writes the default back, so the store never
//! stays erased after the first `setup`. Writes aren't journaled: losing power
//! mid-write can leave a torn value.

use embedded_storage::{ReadStorage, Storage};
use log::debug;

use crate::SensorError;

/// Byte value of erased storage.
pub const ERASED: u8 = 0xFF;

// Layout. Each value is a 4-byte little-endian IEEE-754 float.
/// pH probe voltage in pH 7.0 buffer.
pub const PH_NEUTRAL_ADDR: u32 = 0;
/// pH probe voltage in pH 4.0 buffer.
pub const PH_ACID_ADDR: u32 = 4;
/// EC compensation factor.
pub const EC_FACTOR_ADDR: u32 = 8;
/// TDS k value.
pub const TDS_K_ADDR: u32 = 16;

/// The widest type we store.
const MAX_WIDTH: usize = 8;

/// A value with a fixed, platform-independent byte encoding.
pub trait Persist: Copy {
    /// Encoded size in bytes. At most 8.
    const WIDTH: usize;

    /// Write exactly `WIDTH` bytes into `buf`.
    fn encode(&self, buf: &mut [u8]);

    /// Read from exactly `WIDTH` bytes.
    fn decode(buf: &[u8]) -> Self;
}

impl Persist for f32 {
    const WIDTH: usize = 4;

    fn encode(&self, buf: &mut [u8]) {
        buf.copy_from_slice(&self.to_bits().to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        let mut bytes = [0; 4];
        bytes.copy_from_slice(buf);
        f32::from_bits(u32::from_le_bytes(bytes))
    }
}

/// A typed value at a fixed address, with the default used on erased storage.
///
/// Note that a value encoding to all `0xFF` bytes (one particular NaN for `f32`)
/// is indistinguishable from erased storage.
#[derive(Debug, Clone, Copy)]
pub struct PersistentField<T> {
    address: u32,
    default: T,
}

impl<T: Persist> PersistentField<T> {
    pub const fn new(address: u32, default: T) -> Self {
        Self { address, default }
    }

    pub fn address(&self) -> u32 {
        self.address
    }

    pub fn default_value(&self) -> T {
        self.default
    }

    /// Read the value. If the field is erased, store and return the default.
    pub fn read<S: Storage>(&self, store: &mut S) -> Result<T, SensorError> {
        let mut buf = [0; MAX_WIDTH];
        let buf = &mut buf[..T::WIDTH];

        store
            .read(self.address, buf)
            .map_err(|_| SensorError::Storage)?;

        if buf.iter().all(|b| *b == ERASED) {
            debug!("Field at {} is erased; writing its default", self.address);
            self.write(store, self.default)?;
            return Ok(self.default);
        }

        Ok(T::decode(buf))
    }

    pub fn write<S: Storage>(&self, store: &mut S, value: T) -> Result<(), SensorError> {
        let mut buf = [0; MAX_WIDTH];
        let buf = &mut buf[..T::WIDTH];
        value.encode(buf);

        store
            .write(self.address, buf)
            .map_err(|_| SensorError::Storage)
    }
}
