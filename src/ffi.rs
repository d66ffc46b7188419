//! FFI bindings for mobile platforms (iOS/Android).
//!
//! This module provides the UniFFI bindings that expose the drift monitor to
//! Kotlin and Swift. The platform pushes location updates into a process-wide
//! monitor and receives alerts either through a registered callback or by
//! draining the event queue. All FFI functions are prefixed with `watch_`.

use std::sync::{Mutex, PoisonError};

use log::info;
use once_cell::sync::Lazy;

use crate::monitor::with_monitor;
use crate::{
    init_logging, start_polling, Anchor, AlertSink, DriftMonitor, EventQueue, Fix, GateReadiness,
    GpsPoint, LatestFix, PollScheduler, RenderFeed, RenderListener, SharedMonitor, WatchConfig,
    WatchError, WatchEvent, WatchStatus,
};

// ============================================================================
// Callback Interfaces (for real-time updates to mobile)
// ============================================================================

/// Callback interface for alert events.
/// Implement this in Kotlin/Swift to start and stop the alarm.
#[uniffi::export(callback_interface)]
pub trait AlertCallback: Send + Sync {
    /// Called once when an alert episode starts and once when it clears.
    fn on_event(&self, event: WatchEvent);
}

/// Callback interface for map updates.
#[uniffi::export(callback_interface)]
pub trait RenderCallback: Send + Sync {
    /// Called after each recorded track point and each anchor/radius change.
    fn on_render(&self, feed: RenderFeed);
}

/// Forwards events to the platform callback.
struct CallbackSink {
    callback: Box<dyn AlertCallback>,
}

impl AlertSink for CallbackSink {
    fn on_event(&self, event: &WatchEvent) {
        self.callback.on_event(event.clone());
    }
}

struct CallbackRenderer {
    callback: Box<dyn RenderCallback>,
}

impl RenderListener for CallbackRenderer {
    fn on_render(&self, feed: &RenderFeed) {
        self.callback.on_render(feed.clone());
    }
}

// ============================================================================
// Global Singleton
// ============================================================================

/// Latest fix pushed by the platform location listener.
static FIXES: Lazy<LatestFix> = Lazy::new(LatestFix::new);

/// Events waiting to be drained by the platform when no callback is registered.
static EVENTS: Lazy<EventQueue> = Lazy::new(EventQueue::new);

/// Global monitor instance.
pub static MONITOR: Lazy<SharedMonitor> =
    Lazy::new(|| DriftMonitor::with_defaults(FIXES.clone(), EVENTS.clone()).into_shared());

static SCHEDULER: Lazy<Mutex<PollScheduler>> = Lazy::new(|| Mutex::new(PollScheduler::new()));

fn with_scheduler<F, R>(f: F) -> R
where
    F: FnOnce(&mut PollScheduler) -> R,
{
    let mut scheduler = SCHEDULER.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut scheduler)
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Initialize the monitor (call once at app startup).
#[uniffi::export]
pub fn watch_init() {
    init_logging();
    Lazy::force(&MONITOR);
    info!("[AnchorWatch] Initialized");
}

/// Replace the configuration. Resets the anchor, track and callbacks, so call
/// it before registering callbacks.
#[uniffi::export]
pub fn watch_configure(config: WatchConfig) -> Result<(), WatchError> {
    init_logging();
    let monitor = DriftMonitor::new(config, FIXES.clone(), EVENTS.clone())?;
    with_monitor(&MONITOR, |m| *m = monitor);
    info!("[AnchorWatch] Configuration replaced");
    Ok(())
}

/// Start the gate, drift and track polling loops.
#[uniffi::export]
pub fn watch_start_polling() -> Result<(), WatchError> {
    with_scheduler(|s| start_polling(&MONITOR, s))
}

/// Stop all polling loops. No tick runs after this returns.
#[uniffi::export]
pub fn watch_stop_polling() {
    with_scheduler(|s| s.stop_all());
}

/// Deliver events to `callback` instead of the event queue. Callbacks run
/// after the monitor lock is released and may call any `watch_*` function
/// except `watch_stop_polling`.
#[uniffi::export]
pub fn watch_set_alert_callback(callback: Box<dyn AlertCallback>) {
    with_monitor(&MONITOR, |m| m.set_alert_sink(CallbackSink { callback }));
}

#[uniffi::export]
pub fn watch_set_render_callback(callback: Box<dyn RenderCallback>) {
    with_monitor(&MONITOR, |m| m.set_render_listener(CallbackRenderer { callback }));
}

// ============================================================================
// Position Updates
// ============================================================================

/// Push a location update from the platform listener.
#[uniffi::export]
pub fn watch_push_fix(
    latitude: f64,
    longitude: f64,
    accuracy: f64,
    timestamp: i64,
) -> Result<(), WatchError> {
    let fix = Fix::new(GpsPoint::new(latitude, longitude), accuracy, timestamp);
    FIXES.update(fix)
}

/// Report that the platform lost its location fix.
#[uniffi::export]
pub fn watch_clear_fix() {
    FIXES.clear();
}

// ============================================================================
// User Commands
// ============================================================================

#[uniffi::export]
pub fn watch_set_anchor(
    latitude: f64,
    longitude: f64,
    radius_meters: f64,
) -> Result<(), WatchError> {
    with_monitor(&MONITOR, |m| {
        m.set_anchor(GpsPoint::new(latitude, longitude), radius_meters)
    })
}

/// Place the anchor at the current position with the current radius.
#[uniffi::export]
pub fn watch_place_anchor_here() -> Result<Anchor, WatchError> {
    with_monitor(&MONITOR, |m| m.place_anchor_at_current_fix())
}

#[uniffi::export]
pub fn watch_update_radius(radius_meters: f64) -> Result<(), WatchError> {
    with_monitor(&MONITOR, |m| m.update_radius(radius_meters))
}

#[uniffi::export]
pub fn watch_update_anchor_position(latitude: f64, longitude: f64) -> Result<(), WatchError> {
    with_monitor(&MONITOR, |m| {
        m.update_anchor_position(GpsPoint::new(latitude, longitude))
    })
}

#[uniffi::export]
pub fn watch_start_new_track() -> Result<(), WatchError> {
    with_monitor(&MONITOR, |m| m.start_new_track())
}

// ============================================================================
// Queries
// ============================================================================

/// Remove and return all queued events. Empty while an alert callback is registered.
#[uniffi::export]
pub fn watch_take_events() -> Vec<WatchEvent> {
    EVENTS.drain()
}

#[uniffi::export]
pub fn watch_status() -> WatchStatus {
    with_monitor(&MONITOR, |m| m.status())
}

/// Readiness of the start action, evaluated now.
#[uniffi::export]
pub fn watch_readiness() -> GateReadiness {
    with_monitor(&MONITOR, |m| m.gate_tick())
}

/// Label for the start button matching the current readiness.
#[uniffi::export]
pub fn watch_readiness_label() -> String {
    watch_readiness().label().to_string()
}

/// Info line, e.g. "Radius: 50 m | Accuracy: 5 m".
#[uniffi::export]
pub fn watch_status_line() -> String {
    with_monitor(&MONITOR, |m| m.status_line())
}

#[uniffi::export]
pub fn watch_render_feed() -> RenderFeed {
    with_monitor(&MONITOR, |m| m.render_feed())
}

/// Render feed as JSON (anchor, geofence outline, track and segments).
#[uniffi::export]
pub fn watch_render_feed_json() -> String {
    with_monitor(&MONITOR, |m| m.render_feed_json())
}
