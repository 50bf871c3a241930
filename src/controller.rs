use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ControllerError;

/// Operating mode of the feed axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    Normal,
    Caution,
    Stop,
}

impl Mode {
    /// Normalised feed rate commanded in this mode.
    pub fn speed(self) -> f64 {
        match self {
            Mode::Normal => 1.0,
            Mode::Caution => 0.5,
            Mode::Stop => 0.0,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Normal => "Normal",
            Mode::Caution => "Caution",
            Mode::Stop => "Stop",
        };
        f.pad(name)
    }
}

/// Control output for one step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub mode: Mode,
    /// Normalised feed rate in `[0, 1]`.
    pub speed: f64,
}

impl From<Mode> for Decision {
    fn from(mode: Mode) -> Self {
        Self { mode, speed: mode.speed() }
    }
}

/// Maps posterior uncertainty to a feed decision with two fixed thresholds.
///
/// Below `safe` the axis runs at full speed, between `safe` and `2 * safe` it
/// slows to half speed, at or above `2 * safe` it stops. There is no
/// hysteresis: every call depends only on its argument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Controller {
    safe: f64,
    critical: f64,
}

impl Controller {
    /// # Errors
    ///
    /// Returns [`ControllerError::InvalidConfiguration`] unless `safe_threshold`
    /// is positive and finite.
    pub fn new(safe_threshold: f64) -> Result<Self, ControllerError> {
        if !(safe_threshold.is_finite() && safe_threshold > 0.0) {
            return Err(ControllerError::InvalidConfiguration(format!(
                "safe threshold must be positive, got {safe_threshold}"
            )));
        }
        Ok(Self {
            safe: safe_threshold,
            critical: 2.0 * safe_threshold,
        })
    }

    pub fn decide(&self, uncertainty: f64) -> Decision {
        // NaN fails both comparisons and lands on Stop.
        let mode = if uncertainty < self.safe {
            Mode::Normal
        } else if uncertainty < self.critical {
            Mode::Caution
        } else {
            Mode::Stop
        };
        Decision::from(mode)
    }

    pub fn safe_threshold(&self) -> f64 {
        self.safe
    }

    pub fn critical_threshold(&self) -> f64 {
        self.critical
    }
}
