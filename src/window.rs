//! Windowed averaging of raw samples, and the interval gates that pace sampling
//! and reporting.
//!
//! Sampling runs at a fast cadence to average out noise; the physical value is
//! recomputed on a slower report cadence, from the last *complete* window.

use crate::{AnalogInput, SensorError};

/// Ring buffer of the last `N` raw samples. The average only changes when the
/// buffer wraps, so it updates every `N` samples, never from a partial window.
#[derive(Debug, Clone)]
pub struct SamplingWindow<const N: usize> {
    samples: [u16; N],
    index: usize,
    average: f32,
    primed: bool,
}

impl<const N: usize> SamplingWindow<N> {
    pub const fn new() -> Self {
        Self {
            samples: [0; N],
            index: 0,
            average: 0.,
            primed: false,
        }
    }

    /// Record a sample. Callers are responsible for the sample interval.
    pub fn push(&mut self, raw: u16) {
        self.samples[self.index] = raw;
        self.index += 1;

        if self.index == N {
            self.index = 0;
            let sum: u32 = self.samples.iter().map(|s| *s as u32).sum();
            self.average = sum as f32 / N as f32;
            self.primed = true;
        }
    }

    /// Average of the last complete window; 0 before the first one.
    pub fn average(&self) -> f32 {
        self.average
    }

    /// Whether at least one window has completed.
    pub fn is_primed(&self) -> bool {
        self.primed
    }
}

impl<const N: usize> Default for SamplingWindow<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Opens once at least `period_ms` has passed since it last opened.
#[derive(Debug, Clone, Copy)]
pub struct Gate {
    period_ms: u64,
    last_ms: u64,
}

impl Gate {
    pub const fn new(period_ms: u64) -> Self {
        Self {
            period_ms,
            last_ms: 0,
        }
    }

    pub fn period_ms(&self) -> u64 {
        self.period_ms
    }

    /// Returns true, and restarts the interval, if it has elapsed.
    pub fn ready(&mut self, now_ms: u64) -> bool {
        if now_ms.saturating_sub(self.last_ms) >= self.period_ms {
            self.last_ms = now_ms;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Sample and report cadence for a probe, in milliseconds.
pub struct Timing {
    pub sample_interval_ms: u64,
    pub report_interval_ms: u64,
}

impl Timing {
    pub const fn new(sample_interval_ms: u64, report_interval_ms: u64) -> Self {
        Self {
            sample_interval_ms,
            report_interval_ms,
        }
    }
}

/// A probe's acquisition front end: one analog pin, its window, and both gates.
#[derive(Debug, Clone)]
pub struct Sampler<const N: usize> {
    pin: u8,
    window: SamplingWindow<N>,
    sample: Gate,
    report: Gate,
}

impl<const N: usize> Sampler<N> {
    pub const fn new(pin: u8, timing: Timing) -> Self {
        Self {
            pin,
            window: SamplingWindow::new(),
            sample: Gate::new(timing.sample_interval_ms),
            report: Gate::new(timing.report_interval_ms),
        }
    }

    pub fn pin(&self) -> u8 {
        self.pin
    }

    pub fn window(&self) -> &SamplingWindow<N> {
        &self.window
    }

    /// Sample if due. Returns the window average when a report is due and a
    /// complete window is available.
    pub fn poll<A: AnalogInput + ?Sized>(
        &mut self,
        input: &mut A,
        now_ms: u64,
    ) -> Result<Option<f32>, SensorError> {
        if self.sample.ready(now_ms) {
            let raw = input.read(self.pin)?;
            self.window.push(raw);
        }

        if self.report.ready(now_ms) && self.window.is_primed() {
            return Ok(Some(self.window.average()));
        }
        Ok(None)
    }
}
