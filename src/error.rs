//! Unified error handling for the anchor-watch library.
//!
//! Lost signal, low accuracy and geofence breaches are *not* errors: they are
//! evaluation outcomes delivered to the alert sink. This type only covers
//! inputs rejected at the API boundary, which are never silently clamped.

use thiserror::Error;

/// Unified error type for anchor-watch operations.
#[derive(Debug, Clone, PartialEq, Error)]
#[cfg_attr(feature = "ffi", derive(uniffi::Error))]
pub enum WatchError {
    /// Latitude/longitude out of range or not finite
    #[error("Invalid coordinate ({latitude}, {longitude})")]
    InvalidCoordinate { latitude: f64, longitude: f64 },
    /// Geofence radius negative or not finite
    #[error("Invalid radius {radius}m, must be a finite value >= 0")]
    InvalidRadius { radius: f64 },
    /// Fix accuracy negative or not finite
    #[error("Invalid accuracy {accuracy}m, must be a finite value >= 0")]
    InvalidAccuracy { accuracy: f64 },
    /// Anchor-relative command issued before an anchor was placed
    #[error("No anchor has been placed")]
    NoAnchor,
    /// The position source has not produced a fix yet
    #[error("GPS location not available yet")]
    NoFix,
    /// The latest fix is too inaccurate to place an anchor on
    #[error("GPS accuracy {accuracy}m is above the {threshold}m threshold")]
    FixTooInaccurate { accuracy: f64, threshold: f64 },
    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },
    /// A polling task could not be started
    #[error("Scheduler error: {message}")]
    Scheduler { message: String },
}

/// Result type alias for anchor-watch operations.
pub type Result<T> = std::result::Result<T, WatchError>;

/// Extension trait for converting Option to WatchError.
pub trait OptionExt<T> {
    /// Convert Option to Result with a missing-anchor error.
    fn ok_or_no_anchor(self) -> Result<T>;

    /// Convert Option to Result with a missing-fix error.
    fn ok_or_no_fix(self) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_no_anchor(self) -> Result<T> {
        self.ok_or(WatchError::NoAnchor)
    }

    fn ok_or_no_fix(self) -> Result<T> {
        self.ok_or(WatchError::NoFix)
    }
}
