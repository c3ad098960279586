//! Stand-ins for the hardware, used by the unit tests.

use core::cell::{Cell, RefCell};
use std::collections::VecDeque;

use embedded_hal::serial;
use embedded_storage::{ReadStorage, Storage};

use crate::{AnalogInput, Clock, Persist, SensorError};

pub const STORE_SIZE: usize = 64;

#[derive(Debug)]
pub struct OutOfRange;

/// EEPROM image, starting fully erased.
pub struct MemStore {
    pub bytes: [u8; STORE_SIZE],
    pub writes: usize,
    /// Rejects every write while set.
    pub locked: Cell<bool>,
}

impl MemStore {
    pub fn erased() -> Self {
        Self {
            bytes: [crate::ERASED; STORE_SIZE],
            writes: 0,
            locked: Cell::new(false),
        }
    }

    pub fn f32_at(&self, addr: u32) -> f32 {
        let a = addr as usize;
        f32::decode(&self.bytes[a..a + 4])
    }

    pub fn set_f32(&mut self, addr: u32, value: f32) {
        let a = addr as usize;
        value.encode(&mut self.bytes[a..a + 4]);
    }
}

impl ReadStorage for MemStore {
    type Error = OutOfRange;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), OutOfRange> {
        let start = offset as usize;
        let end = start + bytes.len();
        if end > STORE_SIZE {
            return Err(OutOfRange);
        }
        bytes.copy_from_slice(&self.bytes[start..end]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        STORE_SIZE
    }
}

impl Storage for MemStore {
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), OutOfRange> {
        let start = offset as usize;
        let end = start + bytes.len();
        if end > STORE_SIZE || self.locked.get() {
            return Err(OutOfRange);
        }
        self.bytes[start..end].copy_from_slice(bytes);
        self.writes += 1;
        Ok(())
    }
}

/// Analog pins held at fixed codes.
pub struct FakeAdc {
    pub codes: RefCell<[u16; 8]>,
    pub broken_pin: Cell<Option<u8>>,
}

impl FakeAdc {
    pub fn new() -> Self {
        Self {
            codes: RefCell::new([0; 8]),
            broken_pin: Cell::new(None),
        }
    }

    pub fn set(&self, pin: u8, code: u16) {
        self.codes.borrow_mut()[pin as usize] = code;
    }
}

impl AnalogInput for &FakeAdc {
    fn read(&mut self, pin: u8) -> Result<u16, SensorError> {
        if self.broken_pin.get() == Some(pin) {
            return Err(SensorError::Bus);
        }
        self.codes
            .borrow()
            .get(pin as usize)
            .copied()
            .ok_or(SensorError::NoSuchPin)
    }
}

pub struct FakeClock(pub Cell<u64>);

impl FakeClock {
    pub fn new() -> Self {
        Self(Cell::new(0))
    }

    pub fn advance(&self, ms: u64) {
        self.0.set(self.0.get() + ms);
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> u64 {
        self.0.get()
    }
}

/// Serial port with a queue of received bytes.
pub struct FakeSerial {
    pub rx: RefCell<VecDeque<u8>>,
    pub broken: Cell<bool>,
}

impl FakeSerial {
    pub fn new() -> Self {
        Self {
            rx: RefCell::new(VecDeque::new()),
            broken: Cell::new(false),
        }
    }

    pub fn send(&self, text: &str) {
        self.rx.borrow_mut().extend(text.bytes());
    }
}

impl serial::Read<u8> for &FakeSerial {
    type Error = ();

    fn read(&mut self) -> nb::Result<u8, ()> {
        if self.broken.get() {
            return Err(nb::Error::Other(()));
        }
        self.rx
            .borrow_mut()
            .pop_front()
            .ok_or(nb::Error::WouldBlock)
    }
}

pub fn assert_close(actual: f32, expected: f32, tol: f32) {
    assert!(
        (actual - expected).abs() <= tol,
        "{} is not within {} of {}",
        actual,
        tol,
        expected
    );
}
