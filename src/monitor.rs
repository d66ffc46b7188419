//! # Drift Monitor
//!
//! The single owner of all watch state. Combines the fix gate, the anchor
//! watch and the track recorder with the platform's position source and alert
//! sink, and exposes the user commands and the three tick entry points.
//!
//! ## Concurrency
//!
//! Polling loops run on separate threads, so the monitor is shared as a
//! [`SharedMonitor`] (`Arc<Mutex<_>>`). Every tick and every command takes the
//! lock for its whole duration, which serializes all state changes.
//!
//! Inside [`with_monitor`] the alert sink and render listener are not called
//! directly: events and render feeds are queued while the lock is held and
//! delivered once it is released, so a callback may call back into the
//! monitor. A monitor used without sharing delivers immediately.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::fix_gate::{FixGate, FixStatus, GateReadiness};
use crate::geo_utils::circle_polygon;
use crate::scheduler::{PollScheduler, PollTask};
use crate::source::{AlertSink, PositionSource, RenderListener};
use crate::track::{TrackPoint, TrackRecorder, TrackSegment};
use crate::{
    now_millis, Anchor, AnchorWatch, GpsPoint, OptionExt, Result, WatchConfig, WatchError,
    WatchEvent, WatchStatus,
};

/// Everything the map needs to draw the anchor, geofence and track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct RenderFeed {
    pub anchor: Option<Anchor>,
    /// Geofence outline, empty without an anchor
    pub geofence: Vec<GpsPoint>,
    pub track: Vec<TrackPoint>,
    /// Track split into inside/outside color runs
    pub segments: Vec<TrackSegment>,
    pub track_length_meters: f64,
}

/// Monitor shared between the polling threads and the command caller.
pub type SharedMonitor = Arc<Mutex<DriftMonitor>>;

/// A notification raised by a tick or command.
enum Notice {
    Event(WatchEvent),
    Render(RenderFeed),
}

/// Notices collected under the lock, with the receivers to deliver them to.
struct Outbox {
    sink: Arc<dyn AlertSink>,
    listener: Option<Arc<dyn RenderListener>>,
    notices: Vec<Notice>,
}

impl Outbox {
    fn deliver(self) {
        for notice in self.notices {
            match notice {
                Notice::Event(event) => self.sink.on_event(&event),
                Notice::Render(feed) => {
                    if let Some(listener) = &self.listener {
                        listener.on_render(&feed);
                    }
                }
            }
        }
    }
}

/// Serialized owner of gate, anchor watch and track state.
pub struct DriftMonitor {
    config: WatchConfig,
    gate: FixGate,
    watch: AnchorWatch,
    track: TrackRecorder,
    readiness: GateReadiness,

    // Platform collaborators
    source: Box<dyn PositionSource>,
    sink: Arc<dyn AlertSink>,
    render_listener: Option<Arc<dyn RenderListener>>,

    // Set while a `with_monitor` closure runs
    deferred: bool,
    pending: Vec<Notice>,
}

impl DriftMonitor {
    /// Create a monitor with no anchor placed.
    pub fn new(
        config: WatchConfig,
        source: impl PositionSource + 'static,
        sink: impl AlertSink + 'static,
    ) -> Result<Self> {
        config.validate()?;
        let gate = FixGate::new(config.accuracy_threshold_meters)?;
        let watch = AnchorWatch::new(config.default_radius_meters)?;
        let track = TrackRecorder::new(config.jitter_threshold_meters)?;
        Ok(Self::assemble(config, gate, watch, track, source, sink))
    }

    /// Create a monitor with the default configuration.
    pub fn with_defaults(
        source: impl PositionSource + 'static,
        sink: impl AlertSink + 'static,
    ) -> Self {
        Self::assemble(
            WatchConfig::default(),
            FixGate::default(),
            AnchorWatch::default(),
            TrackRecorder::default(),
            source,
            sink,
        )
    }

    fn assemble(
        config: WatchConfig,
        gate: FixGate,
        watch: AnchorWatch,
        track: TrackRecorder,
        source: impl PositionSource + 'static,
        sink: impl AlertSink + 'static,
    ) -> Self {
        Self {
            config,
            gate,
            watch,
            track,
            readiness: GateReadiness::NoSignal,
            source: Box::new(source),
            sink: Arc::new(sink),
            render_listener: None,
            deferred: false,
            pending: Vec::new(),
        }
    }

    /// Attach a listener notified whenever the render feed changes.
    pub fn with_render_listener(mut self, listener: impl RenderListener + 'static) -> Self {
        self.set_render_listener(listener);
        self
    }

    pub fn set_render_listener(&mut self, listener: impl RenderListener + 'static) {
        self.render_listener = Some(Arc::new(listener));
    }

    /// Replace the alert sink.
    pub fn set_alert_sink(&mut self, sink: impl AlertSink + 'static) {
        self.sink = Arc::new(sink);
    }

    pub fn into_shared(self) -> SharedMonitor {
        Arc::new(Mutex::new(self))
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    // ========================================================================
    // User Commands
    // ========================================================================

    /// Place (or replace) the anchor. Clears the track and the alert state.
    pub fn set_anchor(&mut self, position: GpsPoint, radius_meters: f64) -> Result<()> {
        self.watch.set_anchor(position, radius_meters)?;
        self.track.reset();
        self.publish_render();
        Ok(())
    }

    /// Place the anchor at the latest fix using the current radius.
    ///
    /// Fails with `NoFix` without a fix and `FixTooInaccurate` when the fix
    /// does not pass the accuracy gate.
    pub fn place_anchor_at_current_fix(&mut self) -> Result<Anchor> {
        let fix = self.source.latest_fix().ok_or_no_fix()?;
        if self.gate.classify(Some(&fix)) != FixStatus::Usable {
            return Err(WatchError::FixTooInaccurate {
                accuracy: fix.accuracy,
                threshold: self.gate.threshold_meters(),
            });
        }
        self.set_anchor(fix.position, self.watch.radius_meters())?;
        self.watch.anchor().copied().ok_or_no_anchor()
    }

    /// Change the geofence radius without touching the track or alert state.
    pub fn update_radius(&mut self, radius_meters: f64) -> Result<()> {
        self.watch.update_radius(radius_meters)?;
        if self.watch.anchor().is_some() {
            self.publish_render();
        }
        Ok(())
    }

    /// Move the anchor (drag) without touching the track or alert state.
    pub fn update_anchor_position(&mut self, position: GpsPoint) -> Result<()> {
        self.watch.update_anchor_position(position)?;
        self.publish_render();
        Ok(())
    }

    /// Restart the track with the anchor position as its first point.
    pub fn start_new_track(&mut self) -> Result<()> {
        let anchor = self.watch.anchor().copied().ok_or_no_anchor()?;
        self.track.restart_from(&anchor);
        info!("[DriftMonitor] Started new track from anchor");
        self.publish_render();
        Ok(())
    }

    // ========================================================================
    // Ticks
    // ========================================================================

    /// Re-evaluate whether the start action is available.
    pub fn gate_tick(&mut self) -> GateReadiness {
        let fix = self.source.latest_fix();
        let readiness = self.gate.readiness(fix.as_ref());
        if readiness != self.readiness {
            info!("[DriftMonitor] Readiness changed: {}", readiness.label());
            self.readiness = readiness;
        }
        readiness
    }

    /// Evaluate drift against the latest fix, notifying the sink on episode changes.
    pub fn drift_tick(&mut self) -> Option<WatchEvent> {
        self.drift_tick_at(now_millis())
    }

    /// [`drift_tick`](Self::drift_tick) with an explicit tick time.
    pub fn drift_tick_at(&mut self, now: i64) -> Option<WatchEvent> {
        let fix = self.source.latest_fix();
        let event = self.watch.evaluate(&self.gate, fix.as_ref(), now);
        if let Some(e) = &event {
            self.notify(Notice::Event(e.clone()));
        }
        event
    }

    /// Sample the raw position into the track.
    pub fn track_tick(&mut self) -> Option<TrackPoint> {
        let position = self.source.latest_fix().map(|f| f.position);
        let point = self.track.accept(position, self.watch.anchor());
        if point.is_some() {
            self.publish_render();
        }
        point
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn status(&self) -> WatchStatus {
        self.watch.status()
    }

    pub fn anchor(&self) -> Option<Anchor> {
        self.watch.anchor().copied()
    }

    pub fn radius_meters(&self) -> f64 {
        self.watch.radius_meters()
    }

    /// Readiness computed by the last gate tick.
    pub fn readiness(&self) -> GateReadiness {
        self.readiness
    }

    pub fn track(&self) -> &TrackRecorder {
        &self.track
    }

    /// Info line shown under the map, e.g. `Radius: 50 m | Accuracy: 5 m`.
    pub fn status_line(&self) -> String {
        let accuracy = self.source.latest_fix().map_or(0.0, |f| f.accuracy);
        format!(
            "Radius: {} m | Accuracy: {} m",
            self.watch.radius_meters() as i64,
            accuracy as i64
        )
    }

    pub fn render_feed(&self) -> RenderFeed {
        let anchor = self.watch.anchor().copied();
        let geofence = anchor
            .map(|a| circle_polygon(&a.position, a.radius_meters, self.config.circle_segments))
            .unwrap_or_default();

        RenderFeed {
            anchor,
            geofence,
            track: self.track.points().to_vec(),
            segments: self.track.segments(),
            track_length_meters: self.track.length_meters(),
        }
    }

    /// Render feed as JSON. Returns `"{}"` if serialization fails.
    pub fn render_feed_json(&self) -> String {
        serde_json::to_string(&self.render_feed()).unwrap_or_else(|_| "{}".to_string())
    }

    fn publish_render(&mut self) {
        if self.render_listener.is_some() {
            let feed = self.render_feed();
            debug!(
                "[DriftMonitor] Render feed: {} track points, {} segments",
                feed.track.len(),
                feed.segments.len()
            );
            self.notify(Notice::Render(feed));
        }
    }

    fn notify(&mut self, notice: Notice) {
        if self.deferred {
            self.pending.push(notice);
        } else {
            self.outbox(vec![notice]).deliver();
        }
    }

    fn outbox(&self, notices: Vec<Notice>) -> Outbox {
        Outbox {
            sink: Arc::clone(&self.sink),
            listener: self.render_listener.clone(),
            notices,
        }
    }
}

/// Run `f` with exclusive access to a shared monitor.
///
/// Events and render feeds raised by `f` are delivered after the lock is
/// released. A panic in an earlier holder does not wedge the monitor: the
/// poisoned lock is recovered.
pub fn with_monitor<F, R>(monitor: &SharedMonitor, f: F) -> R
where
    F: FnOnce(&mut DriftMonitor) -> R,
{
    let (result, outbox) = {
        let mut guard: MutexGuard<'_, DriftMonitor> =
            monitor.lock().unwrap_or_else(PoisonError::into_inner);
        guard.deferred = true;
        let result = f(&mut guard);
        guard.deferred = false;
        let notices = std::mem::take(&mut guard.pending);
        (result, guard.outbox(notices))
    };
    outbox.deliver();
    result
}

/// Start the three polling loops on `scheduler` with the monitor's periods.
pub fn start_polling(monitor: &SharedMonitor, scheduler: &mut PollScheduler) -> Result<()> {
    let config = with_monitor(monitor, |m| m.config().clone());

    let shared = Arc::clone(monitor);
    scheduler.start(
        PollTask::Gate,
        Duration::from_millis(config.gate_interval_ms),
        move || {
            with_monitor(&shared, |m| m.gate_tick());
        },
    )?;

    let shared = Arc::clone(monitor);
    scheduler.start(
        PollTask::Drift,
        Duration::from_millis(config.drift_interval_ms),
        move || {
            with_monitor(&shared, |m| m.drift_tick());
        },
    )?;

    let shared = Arc::clone(monitor);
    scheduler.start(
        PollTask::Track,
        Duration::from_millis(config.track_interval_ms),
        move || {
            with_monitor(&shared, |m| m.track_tick());
        },
    )?;

    Ok(())
}
