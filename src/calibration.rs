//! The enter / confirm / exit calibration protocol shared by the pH, EC and
//! TDS probes.
//!
//! Each probe owns one `CalibrationSession`. The session only tracks where the
//! operator is in the protocol and what value is staged; validating a reading
//! and persisting the staged value is up to the probe. Sessions of different
//! probes are independent: two probes may be entered at once.

use core::fmt;

use log::{info, warn};

use crate::ph::PhBuffer;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Protocol step requested by the operator.
pub enum CalMode {
    /// No recognised step. An error if a session is active.
    Noop = 0,
    /// Start (or restart) a session.
    Enter = 1,
    /// Check the current reading against the reference solution, and stage it.
    Confirm = 2,
    /// Save a staged value and leave, or leave without saving.
    Exit = 3,
}

impl From<u8> for CalMode {
    fn from(mode: u8) -> Self {
        match mode {
            1 => Self::Enter,
            2 => Self::Confirm,
            3 => Self::Exit,
            _ => Self::Noop,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    /// Entered, with nothing confirmed yet.
    Entered,
    /// Entered, and the last confirm attempt staged a value.
    Confirmed,
    /// Entered, and the last confirm attempt was rejected.
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq)]
/// What a call to `CalibrationSession::advance` did.
pub enum Step<P> {
    /// Nothing to do: the session is idle.
    Ignored,
    Entered,
    /// The reading was accepted and staged.
    Confirmed(P),
    /// The reading was outside every accepted window.
    Rejected,
    /// Exit with a staged value: the probe must persist it.
    Commit(P),
    /// Exit with nothing staged.
    Abandoned,
    /// Unrecognised step during an active session.
    CommandError,
}

impl<P> Step<P> {
    /// The operator-facing report for this step. `confirmed` builds the
    /// report for an accepted reading.
    pub fn response(self, target: Target, confirmed: impl FnOnce(P) -> Response) -> Option<Response> {
        match self {
            Step::Ignored => None,
            Step::Entered => Some(Response::Entered(target)),
            Step::Confirmed(staged) => Some(confirmed(staged)),
            Step::Rejected => Some(Response::ConfirmFailed(target)),
            Step::Commit(_) => Some(Response::Saved(target)),
            Step::Abandoned => Some(Response::NotSaved(target)),
            Step::CommandError => Some(Response::CommandError(Some(target))),
        }
    }
}

/// Protocol state of one probe. `P` is the staged calibration value.
#[derive(Debug, Clone)]
pub struct CalibrationSession<P> {
    state: SessionState,
    pending: Option<P>,
}

impl<P: Copy> CalibrationSession<P> {
    pub const fn new() -> Self {
        Self {
            state: SessionState::Idle,
            pending: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn pending(&self) -> Option<P> {
        self.pending
    }

    pub fn is_active(&self) -> bool {
        self.state != SessionState::Idle
    }

    /// Apply `mode`. `validate` is only called for a confirm during an active
    /// session; it returns the value to stage, or `None` to reject.
    pub fn advance<F>(&mut self, mode: CalMode, validate: F) -> Step<P>
    where
        F: FnOnce() -> Option<P>,
    {
        match (mode, self.state) {
            // Re-entering restarts the session, dropping anything staged.
            (CalMode::Enter, _) => {
                self.state = SessionState::Entered;
                self.pending = None;
                Step::Entered
            }
            (_, SessionState::Idle) => Step::Ignored,
            (CalMode::Noop, _) => Step::CommandError,
            (CalMode::Confirm, _) => match validate() {
                Some(staged) => {
                    self.state = SessionState::Confirmed;
                    self.pending = Some(staged);
                    Step::Confirmed(staged)
                }
                None => {
                    self.state = SessionState::Failed;
                    self.pending = None;
                    Step::Rejected
                }
            },
            (CalMode::Exit, state) => {
                let pending = self.pending.take();
                self.state = SessionState::Idle;
                match (state, pending) {
                    (SessionState::Confirmed, Some(staged)) => Step::Commit(staged),
                    _ => Step::Abandoned,
                }
            }
        }
    }
}

impl<P: Copy> Default for CalibrationSession<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Probe families that accept calibration commands.
pub enum Target {
    Ph,
    Tds,
    Ec,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ph => "PH",
            Self::Tds => "TDS",
            Self::Ec => "EC",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
/// A report for the operator. `Display` renders the console text.
pub enum Response {
    Entered(Target),
    /// pH reading matched a buffer window and was staged.
    PhConfirmed(PhBuffer),
    /// EC compensation factor staged.
    EcConfirmed { factor: f32 },
    /// TDS k value staged.
    TdsConfirmed { k: f32 },
    ConfirmFailed(Target),
    Saved(Target),
    NotSaved(Target),
    /// Unrecognised command. `None` if it didn't name a probe at all.
    CommandError(Option<Target>),
}

impl Response {
    /// Log a report; hub-level so every probe's transitions show up the same way.
    pub(crate) fn log(&self) {
        match self {
            Self::CommandError(_) => warn!("{}", self),
            _ => info!("{}", self),
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entered(target) => {
                writeln!(f, ">>>Enter {} Calibration Mode<<<", target)?;
                match target {
                    Target::Ph => f.write_str(
                        ">>>Please put the probe into the 4.0 or 7.0 standard buffer solution<<<",
                    ),
                    Target::Ec => f.write_str(
                        ">>>Please put the probe into the 1.413ms/cm buffer solution<<<",
                    ),
                    Target::Tds => f.write_str(
                        ">>>Please put the probe into the standard buffer solution : 707ppm(1413us/cm)@25^c <<<",
                    ),
                }
            }
            Self::PhConfirmed(buffer) => write!(
                f,
                ">>>Buffer Solution:{:.1},Send EXITPH to Save and Exit<<<",
                buffer.ph()
            ),
            Self::EcConfirmed { factor } => write!(
                f,
                ">>>Confirm Successful,Factor:{:.3},Send EXITEC to Save and Exit<<<",
                factor
            ),
            Self::TdsConfirmed { k } => write!(
                f,
                ">>>TDS Confirm Successful,K:{:.2},Send EXITTDS to Save and Exit<<<",
                k
            ),
            Self::ConfirmFailed(Target::Ph) => f.write_str(">>>Buffer Solution Error Try Again<<<"),
            Self::ConfirmFailed(Target::Ec) => f.write_str(">>>Confirm Failed,Try Again<<<"),
            Self::ConfirmFailed(Target::Tds) => f.write_str(">>>TDS Confirm Failed,Try Again<<<"),
            Self::Saved(Target::Tds) => f.write_str(
                ">>>TDS Calibration Successful,K Value Saved,Exit TDS Calibration Mode<<<",
            ),
            Self::NotSaved(Target::Tds) => {
                f.write_str(">>>TDS Calibration Failed,Exit TDS Calibration Mode<<<")
            }
            Self::Saved(target) => write!(
                f,
                ">>>Calibration Successful,Exit {} Calibration Mode<<<",
                target
            ),
            Self::NotSaved(target) => write!(
                f,
                ">>>Calibration Failed,Exit {} Calibration Mode<<<",
                target
            ),
            Self::CommandError(Some(Target::Ph)) => f.write_str(">>>Command Error<<<"),
            Self::CommandError(Some(Target::Ec)) => f.write_str(">>>EC Command Error<<<"),
            Self::CommandError(Some(Target::Tds)) => f.write_str("TDS Command Error"),
            // A line naming no probe at all.
            Self::CommandError(None) => f.write_str(">>>Arduino Command Error<<<"),
        }
    }
}
