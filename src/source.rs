//! Boundary contracts with the platform layer.
//!
//! The monitor polls a [`PositionSource`] for the latest fix, reports alert
//! episodes to an [`AlertSink`] and optionally pushes the render feed to a
//! [`RenderListener`]. The platform owns the GPS receiver, the alarm sound and
//! the map; the core only sees these traits.
//!
//! Sinks and listeners are shared with the thread that delivers notifications
//! after the monitor lock is released, so they must be `Sync`.

use std::collections::VecDeque;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use log::{debug, warn};

use crate::monitor::RenderFeed;
use crate::{Fix, Result, WatchEvent};

/// Non-blocking access to the most recent position sample.
pub trait PositionSource: Send {
    /// The latest known fix, or `None` if none was ever obtained (or the
    /// platform reported the signal as lost).
    fn latest_fix(&self) -> Option<Fix>;
}

/// Receiver of alert-episode events.
pub trait AlertSink: Send + Sync {
    fn on_event(&self, event: &WatchEvent);
}

/// Receiver of geometry changes for the map.
pub trait RenderListener: Send + Sync {
    fn on_render(&self, feed: &RenderFeed);
}

// ============================================================================
// Position Sources
// ============================================================================

/// Shared "latest value" cell written by the platform's location callback.
///
/// Cloning yields another handle to the same cell.
#[derive(Debug, Clone, Default)]
pub struct LatestFix {
    inner: Arc<RwLock<Option<Fix>>>,
}

impl LatestFix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new fix. Malformed fixes are rejected and the previous value kept.
    pub fn update(&self, fix: Fix) -> Result<()> {
        let fix = fix.validated()?;
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(fix);
        Ok(())
    }

    /// Forget the current fix (signal lost).
    pub fn clear(&self) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn get(&self) -> Option<Fix> {
        *self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PositionSource for LatestFix {
    fn latest_fix(&self) -> Option<Fix> {
        self.get()
    }
}

impl<F> PositionSource for F
where
    F: Fn() -> Option<Fix> + Send,
{
    fn latest_fix(&self) -> Option<Fix> {
        self()
    }
}

// ============================================================================
// Alert Sinks
// ============================================================================

impl<F> AlertSink for F
where
    F: Fn(&WatchEvent) + Send + Sync,
{
    fn on_event(&self, event: &WatchEvent) {
        self(event)
    }
}

impl AlertSink for Sender<WatchEvent> {
    fn on_event(&self, event: &WatchEvent) {
        if self.send(event.clone()).is_err() {
            warn!("[AlertSink] Receiver dropped, event discarded: {:?}", event);
        }
    }
}

/// Default number of events an [`EventQueue`] holds before dropping the oldest.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Drainable event buffer for consumers that poll instead of being called back.
///
/// Bounded: once full, each new event evicts the oldest one.
#[derive(Debug, Clone)]
pub struct EventQueue {
    inner: Arc<Mutex<VecDeque<WatchEvent>>>,
    capacity: usize,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a queue holding at most `capacity` events (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::new())),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Remove and return all queued events, oldest first.
    pub fn drain(&self) -> Vec<WatchEvent> {
        let mut queue = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AlertSink for EventQueue {
    fn on_event(&self, event: &WatchEvent) {
        debug!("[EventQueue] Queued {:?}", event.alert_kind());
        let mut queue = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if queue.len() >= self.capacity {
            if let Some(dropped) = queue.pop_front() {
                warn!("[EventQueue] Full, dropped oldest event: {:?}", dropped);
            }
        }
        queue.push_back(event.clone());
    }
}

impl<F> RenderListener for F
where
    F: Fn(&RenderFeed) + Send + Sync,
{
    fn on_render(&self, feed: &RenderFeed) {
        self(feed)
    }
}
