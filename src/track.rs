//! Track recording.
//!
//! Builds the polyline of visited positions while the anchor watch runs.
//! Sampling is based on raw positional continuity: a point is recorded when
//! the position moved more than the jitter threshold since the last recorded
//! point, regardless of fix accuracy.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::geo_utils::{distance_meters, polyline_length};
use crate::{validate_threshold, Anchor, GpsPoint, Result};

/// Default minimum movement in meters between two recorded points.
pub const DEFAULT_JITTER_THRESHOLD: f64 = 1.0;

/// A recorded position and whether it was inside the geofence at the time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct TrackPoint {
    pub position: GpsPoint,
    pub inside_geofence: bool,
}

/// A contiguous run of track points sharing one color.
///
/// Consecutive segments share their boundary point so the drawn polyline
/// stays connected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct TrackSegment {
    pub inside_geofence: bool,
    pub points: Vec<GpsPoint>,
}

/// Jitter-filtered track of visited positions.
#[derive(Debug, Clone)]
pub struct TrackRecorder {
    points: Vec<TrackPoint>,
    jitter_threshold_meters: f64,
}

impl Default for TrackRecorder {
    fn default() -> Self {
        Self {
            points: Vec::new(),
            jitter_threshold_meters: DEFAULT_JITTER_THRESHOLD,
        }
    }
}

impl TrackRecorder {
    /// Create an empty recorder. Negative or non-finite thresholds are rejected.
    pub fn new(jitter_threshold_meters: f64) -> Result<Self> {
        Ok(Self {
            points: Vec::new(),
            jitter_threshold_meters: validate_threshold(
                "jitter_threshold_meters",
                jitter_threshold_meters,
            )?,
        })
    }

    /// Drop every recorded point.
    pub fn reset(&mut self) {
        debug!("[TrackRecorder] Reset ({} points dropped)", self.points.len());
        self.points.clear();
    }

    /// Start a fresh track whose first point is the anchor position.
    pub fn restart_from(&mut self, anchor: &Anchor) {
        self.points.clear();
        self.points.push(TrackPoint {
            position: anchor.position,
            inside_geofence: true,
        });
        debug!("[TrackRecorder] Restarted from anchor");
    }

    /// Record `position` if it moved far enough from the last point.
    ///
    /// Returns the appended point, or `None` when the position is absent or
    /// within the jitter threshold.
    pub fn accept(
        &mut self,
        position: Option<GpsPoint>,
        anchor: Option<&Anchor>,
    ) -> Option<TrackPoint> {
        let position = position?;

        let moved = self
            .points
            .last()
            .map(|last| distance_meters(&last.position, &position))
            .unwrap_or(f64::INFINITY);
        if moved <= self.jitter_threshold_meters {
            return None;
        }

        let point = TrackPoint {
            position,
            inside_geofence: anchor.map_or(true, |a| a.contains(&position)),
        };
        self.points.push(point);
        debug!(
            "[TrackRecorder] Point #{} recorded ({})",
            self.points.len(),
            if point.inside_geofence { "inside" } else { "outside" }
        );
        Some(point)
    }

    pub fn points(&self) -> &[TrackPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last(&self) -> Option<&TrackPoint> {
        self.points.last()
    }

    /// Split the track into contiguous same-color runs.
    pub fn segments(&self) -> Vec<TrackSegment> {
        let mut segments: Vec<TrackSegment> = Vec::new();

        for point in &self.points {
            match segments.last_mut() {
                Some(current) if current.inside_geofence == point.inside_geofence => {
                    current.points.push(point.position);
                }
                Some(current) => {
                    // Start the new run at the last point of the previous one
                    let joint = current.points.last().copied();
                    segments.push(TrackSegment {
                        inside_geofence: point.inside_geofence,
                        points: joint.into_iter().chain([point.position]).collect(),
                    });
                }
                None => segments.push(TrackSegment {
                    inside_geofence: point.inside_geofence,
                    points: vec![point.position],
                }),
            }
        }

        segments
    }

    /// Length of the recorded track in meters.
    pub fn length_meters(&self) -> f64 {
        let positions: Vec<GpsPoint> = self.points.iter().map(|p| p.position).collect();
        polyline_length(&positions)
    }
}
