//! # Anchor Watch
//!
//! The geofence state machine. Holds the anchor and its radius, consumes the
//! latest fix on every drift tick and decides whether the vessel is clear,
//! has drifted outside the radius, or can no longer be located reliably.
//!
//! ## Debounce
//!
//! Alerts fire once per episode: entering `Alerting(kind)` from any other
//! state emits exactly one [`WatchEvent::Alert`], staying there emits nothing,
//! and returning to `Clear` emits a single [`WatchEvent::Cleared`]. Switching
//! directly between two alert kinds counts as a new episode.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::fix_gate::{FixGate, FixStatus};
use crate::geo_utils::bearing_degrees;
use crate::{validate_radius, Anchor, Fix, GpsPoint, OptionExt, Result};

/// Radius given to an anchor when the user has not chosen one.
pub const DEFAULT_RADIUS_METERS: f64 = 50.0;

/// Why the watch is alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum AlertKind {
    /// No fix available
    SignalLost,
    /// Fix accuracy above the gate threshold
    LowAccuracy,
    /// Usable fix farther from the anchor than the radius
    OutsideRadius,
}

impl AlertKind {
    /// Short user-facing message.
    pub fn message(&self) -> &'static str {
        match self {
            AlertKind::SignalLost => "GPS signal lost!",
            AlertKind::LowAccuracy => "GPS accuracy too low!",
            AlertKind::OutsideRadius => "Boat is outside the safety radius!",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Event delivered to the alert sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum WatchEvent {
    /// A new alert episode started
    Alert {
        kind: AlertKind,
        /// Unix timestamp in milliseconds of the tick that raised it
        occurred_at: i64,
        /// Distance from the anchor, when a fix was available
        distance_meters: Option<f64>,
        /// Bearing from the anchor to the fix, when outside the radius
        bearing_degrees: Option<f64>,
        /// Accuracy of the fix, when one was available
        accuracy_meters: Option<f64>,
    },
    /// The alert episode ended
    Cleared { occurred_at: i64 },
}

impl WatchEvent {
    pub fn occurred_at(&self) -> i64 {
        match self {
            WatchEvent::Alert { occurred_at, .. } | WatchEvent::Cleared { occurred_at } => {
                *occurred_at
            }
        }
    }

    pub fn alert_kind(&self) -> Option<AlertKind> {
        match self {
            WatchEvent::Alert { kind, .. } => Some(*kind),
            WatchEvent::Cleared { .. } => None,
        }
    }
}

/// Observable state of the watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum WatchStatus {
    NoAnchor,
    Clear,
    Alerting { kind: AlertKind },
}

/// Alert bookkeeping for the current anchor.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AlertState {
    alerting: Option<AlertKind>,
    last_alert_kind: Option<AlertKind>,
    last_alert_at: Option<i64>,
}

impl AlertState {
    /// Kind of the ongoing episode, `None` when clear.
    pub fn alerting(&self) -> Option<AlertKind> {
        self.alerting
    }

    pub fn last_alert_kind(&self) -> Option<AlertKind> {
        self.last_alert_kind
    }

    pub fn last_alert_at(&self) -> Option<i64> {
        self.last_alert_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum WatchState {
    NoAnchor,
    Anchored { anchor: Anchor, alert: AlertState },
}

/// Outcome of evaluating one fix against the anchor.
struct Assessment {
    target: Option<AlertKind>,
    distance_meters: Option<f64>,
    bearing_degrees: Option<f64>,
    accuracy_meters: Option<f64>,
}

/// Geofence state machine.
#[derive(Debug, Clone)]
pub struct AnchorWatch {
    state: WatchState,
    /// Radius applied to the next placement; tracks the anchored radius too
    pending_radius: f64,
}

impl Default for AnchorWatch {
    fn default() -> Self {
        Self {
            state: WatchState::NoAnchor,
            pending_radius: DEFAULT_RADIUS_METERS,
        }
    }
}

impl AnchorWatch {
    /// Create a watch with no anchor and the given default radius.
    pub fn new(default_radius_meters: f64) -> Result<Self> {
        Ok(Self {
            state: WatchState::NoAnchor,
            pending_radius: validate_radius(default_radius_meters)?,
        })
    }

    // ========================================================================
    // User Commands
    // ========================================================================

    /// Place (or replace) the anchor. Resets the alert state.
    pub fn set_anchor(&mut self, position: GpsPoint, radius_meters: f64) -> Result<()> {
        let anchor = Anchor::new(position, radius_meters)?;
        info!(
            "[AnchorWatch] Anchor set at ({:.6}, {:.6}) radius {:.0}m",
            position.latitude, position.longitude, radius_meters
        );
        self.pending_radius = radius_meters;
        self.state = WatchState::Anchored {
            anchor,
            alert: AlertState::default(),
        };
        Ok(())
    }

    /// Change the radius in place. Without an anchor, the value is kept for
    /// the next placement.
    pub fn update_radius(&mut self, radius_meters: f64) -> Result<()> {
        let radius = validate_radius(radius_meters)?;
        self.pending_radius = radius;
        if let WatchState::Anchored { anchor, .. } = &mut self.state {
            anchor.radius_meters = radius;
            debug!("[AnchorWatch] Radius updated to {:.0}m", radius);
        }
        Ok(())
    }

    /// Move the anchor in place (drag). Alert state is kept.
    pub fn update_anchor_position(&mut self, position: GpsPoint) -> Result<()> {
        let position = position.validated()?;
        let anchor = match &mut self.state {
            WatchState::Anchored { anchor, .. } => Some(anchor),
            WatchState::NoAnchor => None,
        }
        .ok_or_no_anchor()?;
        anchor.position = position;
        debug!(
            "[AnchorWatch] Anchor moved to ({:.6}, {:.6})",
            position.latitude, position.longitude
        );
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn anchor(&self) -> Option<&Anchor> {
        match &self.state {
            WatchState::Anchored { anchor, .. } => Some(anchor),
            WatchState::NoAnchor => None,
        }
    }

    pub fn alert_state(&self) -> Option<&AlertState> {
        match &self.state {
            WatchState::Anchored { alert, .. } => Some(alert),
            WatchState::NoAnchor => None,
        }
    }

    /// Current radius: the anchor's, or the one the next anchor will get.
    pub fn radius_meters(&self) -> f64 {
        self.anchor()
            .map(|a| a.radius_meters)
            .unwrap_or(self.pending_radius)
    }

    pub fn status(&self) -> WatchStatus {
        match &self.state {
            WatchState::NoAnchor => WatchStatus::NoAnchor,
            WatchState::Anchored { alert, .. } => match alert.alerting {
                Some(kind) => WatchStatus::Alerting { kind },
                None => WatchStatus::Clear,
            },
        }
    }

    // ========================================================================
    // Evaluation
    // ========================================================================

    /// Evaluate the latest fix. Returns the event to deliver, if any.
    pub fn evaluate(&mut self, gate: &FixGate, fix: Option<&Fix>, now: i64) -> Option<WatchEvent> {
        let assessment = match &self.state {
            WatchState::NoAnchor => return None,
            WatchState::Anchored { anchor, .. } => assess(anchor, gate, fix),
        };
        let WatchState::Anchored { alert, .. } = &mut self.state else {
            return None;
        };

        match (alert.alerting, assessment.target) {
            (current, Some(kind)) if current == Some(kind) => {
                debug!("[AnchorWatch] Still alerting: {:?}", kind);
                None
            }
            (_, Some(kind)) => {
                alert.alerting = Some(kind);
                alert.last_alert_kind = Some(kind);
                alert.last_alert_at = Some(now);
                warn!(
                    "[AnchorWatch] {} (distance {:?}m, accuracy {:?}m)",
                    kind, assessment.distance_meters, assessment.accuracy_meters
                );
                Some(WatchEvent::Alert {
                    kind,
                    occurred_at: now,
                    distance_meters: assessment.distance_meters,
                    bearing_degrees: assessment.bearing_degrees,
                    accuracy_meters: assessment.accuracy_meters,
                })
            }
            (Some(previous), None) => {
                alert.alerting = None;
                info!("[AnchorWatch] Cleared after {:?}", previous);
                Some(WatchEvent::Cleared { occurred_at: now })
            }
            (None, None) => {
                debug!("[AnchorWatch] Clear, distance {:?}m", assessment.distance_meters);
                None
            }
        }
    }
}

fn assess(anchor: &Anchor, gate: &FixGate, fix: Option<&Fix>) -> Assessment {
    let accuracy_meters = fix.map(|f| f.accuracy);
    let distance_meters = fix.map(|f| anchor.distance_to(&f.position));

    let target = match (gate.classify(fix), distance_meters) {
        (FixStatus::Lost, _) | (FixStatus::Usable, None) => Some(AlertKind::SignalLost),
        (FixStatus::Degraded, _) => Some(AlertKind::LowAccuracy),
        (FixStatus::Usable, Some(d)) if d > anchor.radius_meters => Some(AlertKind::OutsideRadius),
        (FixStatus::Usable, Some(_)) => None,
    };

    let bearing_degrees = match (target, fix) {
        (Some(AlertKind::OutsideRadius), Some(f)) => {
            Some(bearing_degrees(&anchor.position, &f.position))
        }
        _ => None,
    };

    Assessment {
        target,
        distance_meters,
        bearing_degrees,
        accuracy_meters,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_utils::distance_meters;
    use crate::WatchError;

    const ANCHOR: GpsPoint = GpsPoint {
        latitude: 10.0,
        longitude: 20.0,
    };

    fn usable(position: GpsPoint) -> Fix {
        Fix::new(position, 5.0, 0)
    }

    fn anchored(radius: f64) -> AnchorWatch {
        let mut watch = AnchorWatch::new(50.0).unwrap();
        watch.set_anchor(ANCHOR, radius).unwrap();
        watch
    }

    fn alert_count(events: &[Option<WatchEvent>], kind: AlertKind) -> usize {
        events
            .iter()
            .flatten()
            .filter(|e| e.alert_kind() == Some(kind))
            .count()
    }

    #[test]
    fn test_no_anchor_never_alerts() {
        let mut watch = AnchorWatch::new(50.0).unwrap();
        let gate = FixGate::default();
        assert_eq!(watch.evaluate(&gate, None, 0), None);
        assert_eq!(watch.status(), WatchStatus::NoAnchor);
        assert!(watch.anchor().is_none());
    }

    #[test]
    fn test_set_anchor_starts_clear() {
        let watch = anchored(50.0);
        assert_eq!(watch.status(), WatchStatus::Clear);
        assert_eq!(watch.alert_state(), Some(&AlertState::default()));
        assert_eq!(watch.radius_meters(), 50.0);
    }

    #[test]
    fn test_signal_lost_debounced() {
        let mut watch = anchored(50.0);
        let gate = FixGate::default();
        let events: Vec<_> = (0..3).map(|t| watch.evaluate(&gate, None, t)).collect();

        assert_eq!(alert_count(&events, AlertKind::SignalLost), 1);
        assert!(events[0].is_some());
        assert!(events[1].is_none() && events[2].is_none());
        assert_eq!(
            watch.status(),
            WatchStatus::Alerting {
                kind: AlertKind::SignalLost
            }
        );
        assert_eq!(watch.alert_state().unwrap().last_alert_at(), Some(0));
    }

    #[test]
    fn test_same_kind_fires_again_after_clear() {
        let mut watch = anchored(50.0);
        let gate = FixGate::default();
        let inside = usable(ANCHOR);

        let events = vec![
            watch.evaluate(&gate, None, 1),
            watch.evaluate(&gate, Some(&inside), 2),
            watch.evaluate(&gate, None, 3),
        ];

        assert_eq!(alert_count(&events, AlertKind::SignalLost), 2);
        assert_eq!(events[1], Some(WatchEvent::Cleared { occurred_at: 2 }));
        assert_eq!(watch.alert_state().unwrap().last_alert_at(), Some(3));
    }

    #[test]
    fn test_kind_change_is_new_episode() {
        let mut watch = anchored(50.0);
        let gate = FixGate::default();
        let poor = Fix::new(ANCHOR, 40.0, 0);

        let first = watch.evaluate(&gate, None, 1);
        let second = watch.evaluate(&gate, Some(&poor), 2);
        let third = watch.evaluate(&gate, Some(&poor), 3);

        assert_eq!(first.and_then(|e| e.alert_kind()), Some(AlertKind::SignalLost));
        match second {
            Some(WatchEvent::Alert {
                kind,
                accuracy_meters,
                ..
            }) => {
                assert_eq!(kind, AlertKind::LowAccuracy);
                assert_eq!(accuracy_meters, Some(40.0));
            }
            other => panic!("expected low accuracy alert, got {:?}", other),
        }
        assert!(third.is_none());
        assert_eq!(
            watch.alert_state().unwrap().last_alert_kind(),
            Some(AlertKind::LowAccuracy)
        );
    }

    #[test]
    fn test_geofence_boundary_is_inclusive() {
        let gate = FixGate::default();
        let fix_position = GpsPoint::new(10.0003, 20.0002);
        let d = distance_meters(&ANCHOR, &fix_position);

        let mut watch = anchored(d);
        assert_eq!(watch.evaluate(&gate, Some(&usable(fix_position)), 0), None);
        assert_eq!(watch.status(), WatchStatus::Clear);

        let mut watch = anchored(d - 0.01);
        let event = watch.evaluate(&gate, Some(&usable(fix_position)), 0);
        assert_eq!(
            event.and_then(|e| e.alert_kind()),
            Some(AlertKind::OutsideRadius)
        );
    }

    #[test]
    fn test_outside_alert_reports_distance_and_bearing() {
        let mut watch = anchored(50.0);
        let gate = FixGate::default();
        let east = GpsPoint::new(10.0, 20.001);

        match watch.evaluate(&gate, Some(&usable(east)), 7) {
            Some(WatchEvent::Alert {
                kind,
                occurred_at,
                distance_meters,
                bearing_degrees,
                ..
            }) => {
                assert_eq!(kind, AlertKind::OutsideRadius);
                assert_eq!(occurred_at, 7);
                assert!(distance_meters.unwrap() > 100.0);
                assert!((bearing_degrees.unwrap() - 90.0).abs() < 0.1);
            }
            other => panic!("expected outside alert, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_radius_alerts_on_any_drift() {
        let mut watch = anchored(0.0);
        let gate = FixGate::default();

        assert_eq!(watch.evaluate(&gate, Some(&usable(ANCHOR)), 0), None);
        let nudged = GpsPoint::new(10.000001, 20.0);
        assert!(watch.evaluate(&gate, Some(&usable(nudged)), 1).is_some());
    }

    #[test]
    fn test_radius_update_keeps_alert_state() {
        let mut watch = anchored(50.0);
        let gate = FixGate::default();
        let away = usable(GpsPoint::new(10.0009, 20.0));

        assert!(watch.evaluate(&gate, Some(&away), 0).is_some());
        watch.update_radius(500.0).unwrap();
        assert_eq!(
            watch.status(),
            WatchStatus::Alerting {
                kind: AlertKind::OutsideRadius
            }
        );
        assert_eq!(
            watch.evaluate(&gate, Some(&away), 1),
            Some(WatchEvent::Cleared { occurred_at: 1 })
        );
    }

    #[test]
    fn test_drag_moves_anchor_in_place() {
        let mut watch = anchored(50.0);
        let gate = FixGate::default();
        let away = GpsPoint::new(10.0009, 20.0);

        assert!(watch.evaluate(&gate, Some(&usable(away)), 0).is_some());
        watch.update_anchor_position(away).unwrap();
        assert_eq!(watch.anchor().unwrap().position, away);
        assert_eq!(
            watch.evaluate(&gate, Some(&usable(away)), 1),
            Some(WatchEvent::Cleared { occurred_at: 1 })
        );
    }

    #[test]
    fn test_set_anchor_resets_alert_state() {
        let mut watch = anchored(50.0);
        let gate = FixGate::default();

        assert!(watch.evaluate(&gate, None, 0).is_some());
        watch.set_anchor(ANCHOR, 50.0).unwrap();
        assert_eq!(watch.status(), WatchStatus::Clear);
        // Fresh episode after the reset
        assert!(watch.evaluate(&gate, None, 1).is_some());
    }

    #[test]
    fn test_commands_validate_input() {
        let mut watch = AnchorWatch::new(50.0).unwrap();

        assert_eq!(
            watch.update_anchor_position(ANCHOR),
            Err(WatchError::NoAnchor)
        );
        assert!(matches!(
            watch.set_anchor(GpsPoint::new(95.0, 0.0), 50.0),
            Err(WatchError::InvalidCoordinate { .. })
        ));
        assert_eq!(
            watch.set_anchor(ANCHOR, -3.0),
            Err(WatchError::InvalidRadius { radius: -3.0 })
        );
        assert!(watch.update_radius(f64::NAN).is_err());
        assert!(AnchorWatch::new(-1.0).is_err());

        // Failed commands leave the state untouched
        assert_eq!(watch.status(), WatchStatus::NoAnchor);
        assert_eq!(watch.radius_meters(), 50.0);
    }

    #[test]
    fn test_drag_rejects_invalid_coordinate() {
        let mut watch = anchored(50.0);

        assert_eq!(
            watch.update_anchor_position(GpsPoint::new(91.0, 20.0)),
            Err(WatchError::InvalidCoordinate {
                latitude: 91.0,
                longitude: 20.0
            })
        );
        assert!(watch
            .update_anchor_position(GpsPoint::new(10.0, f64::NAN))
            .is_err());
        assert_eq!(watch.anchor().unwrap().position, ANCHOR);
    }

    #[test]
    fn test_default_watch() {
        let watch = AnchorWatch::default();
        assert_eq!(watch.status(), WatchStatus::NoAnchor);
        assert_eq!(watch.radius_meters(), DEFAULT_RADIUS_METERS);
    }

    #[test]
    fn test_radius_before_anchor_is_pending() {
        let mut watch = AnchorWatch::new(50.0).unwrap();
        watch.update_radius(120.0).unwrap();
        assert_eq!(watch.radius_meters(), 120.0);
        assert!(watch.anchor().is_none());
    }
}
