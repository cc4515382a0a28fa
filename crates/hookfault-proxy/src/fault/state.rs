//! Process-wide simulated status and delay.

use super::{validate_delay, validate_status};
use crate::error::ControlError;
use parking_lot::RwLock;

/// Values read by one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultSnapshot {
    pub status: u16,
    pub delay_ms: u64,
}

impl Default for FaultSnapshot {
    fn default() -> Self {
        Self {
            status: 200,
            delay_ms: 0,
        }
    }
}

/// Shared fault configuration, mutated only by the control endpoints.
///
/// Last write wins. There is no isolation across one request: the delay and
/// the status are read at different points, so a change made while a request
/// is waiting out its delay can apply to that request's fault check.
#[derive(Debug, Default)]
pub struct FaultState {
    current: RwLock<FaultSnapshot>,
}

impl FaultState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_initial(status: u16, delay_ms: u64) -> Result<Self, ControlError> {
        validate_status(status)?;
        validate_delay(delay_ms)?;
        Ok(Self {
            current: RwLock::new(FaultSnapshot { status, delay_ms }),
        })
    }

    /// Replace the simulated status. On error the previous value is kept.
    pub fn set_status(&self, code: u16) -> Result<(), ControlError> {
        validate_status(code)?;
        self.current.write().status = code;
        Ok(())
    }

    /// Replace the simulated delay. On error the previous value is kept.
    pub fn set_delay(&self, delay_ms: u64) -> Result<(), ControlError> {
        validate_delay(delay_ms)?;
        self.current.write().delay_ms = delay_ms;
        Ok(())
    }

    pub fn snapshot(&self) -> FaultSnapshot {
        *self.current.read()
    }
}
