//! Fix accuracy gate.
//!
//! Classifies each position sample as usable, degraded or lost. The gate is a
//! total function of the fix and a threshold: every input maps to exactly one
//! status.

use serde::{Deserialize, Serialize};

use crate::{validate_threshold, Fix, Result};

/// Default accuracy threshold in meters.
pub const DEFAULT_ACCURACY_THRESHOLD: f64 = 10.0;

/// Quality of the latest fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum FixStatus {
    /// Fix present and accurate enough for geofence decisions
    Usable,
    /// Fix present but accuracy above the threshold
    Degraded,
    /// No fix available
    Lost,
}

/// Whether the "start" action may be offered to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum GateReadiness {
    NoSignal,
    LowAccuracy,
    Ready,
}

impl GateReadiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, GateReadiness::Ready)
    }

    /// Label for the start button.
    pub fn label(&self) -> &'static str {
        match self {
            GateReadiness::NoSignal => "Loading GPS… (no signal)",
            GateReadiness::LowAccuracy => "Loading GPS… (accuracy too low)",
            GateReadiness::Ready => "Start Track",
        }
    }
}

impl From<FixStatus> for GateReadiness {
    fn from(status: FixStatus) -> Self {
        match status {
            FixStatus::Lost => GateReadiness::NoSignal,
            FixStatus::Degraded => GateReadiness::LowAccuracy,
            FixStatus::Usable => GateReadiness::Ready,
        }
    }
}

/// Accuracy gate with a fixed threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixGate {
    threshold_meters: f64,
}

impl Default for FixGate {
    fn default() -> Self {
        Self {
            threshold_meters: DEFAULT_ACCURACY_THRESHOLD,
        }
    }
}

impl FixGate {
    /// Create a gate. Negative or non-finite thresholds are rejected.
    pub fn new(threshold_meters: f64) -> Result<Self> {
        Ok(Self {
            threshold_meters: validate_threshold("accuracy_threshold_meters", threshold_meters)?,
        })
    }

    pub fn threshold_meters(&self) -> f64 {
        self.threshold_meters
    }

    /// Classify a fix. A fix whose accuracy equals the threshold is usable.
    pub fn classify(&self, fix: Option<&Fix>) -> FixStatus {
        match fix {
            None => FixStatus::Lost,
            Some(f) if f.accuracy > self.threshold_meters => FixStatus::Degraded,
            Some(_) => FixStatus::Usable,
        }
    }

    pub fn readiness(&self, fix: Option<&Fix>) -> GateReadiness {
        self.classify(fix).into()
    }
}
