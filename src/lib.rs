//! # Anchor Watch
//!
//! Anchor drift detection and geofenced track recording from noisy GPS fixes.
//!
//! This library provides:
//! - A fix-accuracy gate (usable / degraded / lost)
//! - An anchor geofence state machine with debounced alerts
//! - A jitter-filtered track colored by inside/outside the geofence
//! - Independent cancellable polling loops tying it all together
//!
//! ## Features
//!
//! - **`ffi`** - Enable FFI bindings for mobile platforms (iOS/Android)
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use anchor_watch::{DriftMonitor, Fix, GpsPoint, LatestFix, WatchConfig, WatchEvent};
//! use std::sync::mpsc;
//!
//! let fixes = LatestFix::new();
//! let (tx, rx) = mpsc::channel::<WatchEvent>();
//! let mut monitor = DriftMonitor::new(WatchConfig::default(), fixes.clone(), tx).unwrap();
//!
//! monitor.set_anchor(GpsPoint::new(10.0, 20.0), 50.0).unwrap();
//!
//! // ~100m north of the anchor with a good fix
//! fixes.update(Fix::new(GpsPoint::new(10.0009, 20.0), 5.0, 0)).unwrap();
//! monitor.drift_tick_at(0);
//!
//! assert!(matches!(rx.try_recv(), Ok(WatchEvent::Alert { .. })));
//! ```

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

// Unified error handling
pub mod error;
pub use error::{OptionExt, Result, WatchError};

// Geographic utilities (distance, bearing, geofence outline)
pub mod geo_utils;

// Fix accuracy gate
pub mod fix_gate;
pub use fix_gate::{FixGate, FixStatus, GateReadiness};

// Geofence state machine
pub mod anchor_watch;
pub use anchor_watch::{AlertKind, AlertState, AnchorWatch, WatchEvent, WatchStatus};

// Track recording
pub mod track;
pub use track::{TrackPoint, TrackRecorder, TrackSegment};

// Boundary contracts with the platform layer
pub mod source;
pub use source::{AlertSink, EventQueue, LatestFix, PositionSource, RenderListener};

// Periodic polling loops
pub mod scheduler;
pub use scheduler::{PeriodicTask, PollScheduler, PollTask};

// Serialized state owner
pub mod monitor;
pub use monitor::{start_polling, DriftMonitor, RenderFeed, SharedMonitor};

// FFI bindings for mobile platforms (iOS/Android)
#[cfg(feature = "ffi")]
pub mod ffi;

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!();

/// Initialize logging for Android (only used in FFI)
#[cfg(all(feature = "ffi", target_os = "android"))]
pub(crate) fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("AnchorWatchRust"),
    );
}

#[cfg(all(feature = "ffi", not(target_os = "android")))]
pub(crate) fn init_logging() {
    // No-op on non-Android platforms
}

/// Current wall-clock time as Unix epoch milliseconds.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use anchor_watch::GpsPoint;
/// let point = GpsPoint::new(54.3233, 10.1228); // Kiel
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }

    /// Return the point if valid, otherwise an `InvalidCoordinate` error.
    pub fn validated(self) -> Result<Self> {
        if self.is_valid() {
            Ok(self)
        } else {
            Err(WatchError::InvalidCoordinate {
                latitude: self.latitude,
                longitude: self.longitude,
            })
        }
    }
}

/// A single position sample reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Fix {
    pub position: GpsPoint,
    /// Horizontal accuracy radius in meters
    pub accuracy: f64,
    /// Unix timestamp in milliseconds
    pub timestamp: i64,
}

impl Fix {
    /// Create a new fix.
    pub fn new(position: GpsPoint, accuracy: f64, timestamp: i64) -> Self {
        Self {
            position,
            accuracy,
            timestamp,
        }
    }

    /// Check the coordinate and accuracy, returning the fix unchanged if both are sane.
    pub fn validated(self) -> Result<Self> {
        self.position.validated()?;
        if !self.accuracy.is_finite() || self.accuracy < 0.0 {
            return Err(WatchError::InvalidAccuracy {
                accuracy: self.accuracy,
            });
        }
        Ok(self)
    }
}

/// The user-placed anchor and the radius it may drift within.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Anchor {
    pub position: GpsPoint,
    pub radius_meters: f64,
}

impl Anchor {
    /// Create a validated anchor.
    pub fn new(position: GpsPoint, radius_meters: f64) -> Result<Self> {
        Ok(Self {
            position: position.validated()?,
            radius_meters: validate_radius(radius_meters)?,
        })
    }

    /// Distance in meters from the anchor to `point`.
    pub fn distance_to(&self, point: &GpsPoint) -> f64 {
        geo_utils::distance_meters(&self.position, point)
    }

    /// Whether `point` lies within the geofence (boundary inclusive).
    pub fn contains(&self, point: &GpsPoint) -> bool {
        self.distance_to(point) <= self.radius_meters
    }
}

/// Reject negative or non-finite radii.
pub(crate) fn validate_radius(radius: f64) -> Result<f64> {
    if radius.is_finite() && radius >= 0.0 {
        Ok(radius)
    } else {
        Err(WatchError::InvalidRadius { radius })
    }
}

/// Reject negative or non-finite distance thresholds.
pub(crate) fn validate_threshold(name: &str, value: f64) -> Result<f64> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(WatchError::Config {
            message: format!("{} must be a finite value >= 0, got {}", name, value),
        })
    }
}

/// Configuration for the drift monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[serde(default)]
pub struct WatchConfig {
    /// Fixes with accuracy above this are degraded (inclusive threshold).
    /// Default: 10.0 meters
    pub accuracy_threshold_meters: f64,

    /// Radius used for a new anchor until the user changes it.
    /// Default: 50.0 meters
    pub default_radius_meters: f64,

    /// Track points closer than this to the previous one are dropped as jitter.
    /// Default: 1.0 meter
    pub jitter_threshold_meters: f64,

    /// Vertices in the rendered geofence outline.
    /// Default: 36
    pub circle_segments: u32,

    /// Period of the start-readiness check.
    /// Default: 1000 ms
    pub gate_interval_ms: u64,

    /// Period of the drift check.
    /// Default: 5000 ms
    pub drift_interval_ms: u64,

    /// Period of track sampling.
    /// Default: 10000 ms
    pub track_interval_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            accuracy_threshold_meters: fix_gate::DEFAULT_ACCURACY_THRESHOLD,
            default_radius_meters: anchor_watch::DEFAULT_RADIUS_METERS,
            jitter_threshold_meters: track::DEFAULT_JITTER_THRESHOLD,
            circle_segments: geo_utils::DEFAULT_CIRCLE_SEGMENTS,
            gate_interval_ms: 1_000,
            drift_interval_ms: 5_000,
            track_interval_ms: 10_000,
        }
    }
}

impl WatchConfig {
    /// Check every field, returning the first problem found.
    pub fn validate(&self) -> Result<()> {
        let distances = [
            ("accuracy_threshold_meters", self.accuracy_threshold_meters),
            ("default_radius_meters", self.default_radius_meters),
            ("jitter_threshold_meters", self.jitter_threshold_meters),
        ];
        for (name, value) in distances {
            validate_threshold(name, value)?;
        }

        let intervals = [
            ("gate_interval_ms", self.gate_interval_ms),
            ("drift_interval_ms", self.drift_interval_ms),
            ("track_interval_ms", self.track_interval_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(WatchError::Config {
                    message: format!("{} must be greater than 0", name),
                });
            }
        }

        Ok(())
    }

    /// Parse a JSON configuration. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: WatchConfig = serde_json::from_str(json).map_err(|e| WatchError::Config {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }
}

// ============================================================================
// Tests
// ============================================================================
