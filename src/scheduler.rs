//! # Poll Scheduler
//!
//! Drives the three polling loops (start readiness, drift check, track
//! sampling). Each loop is a [`PeriodicTask`]: a named ticker thread that
//! waits on a stop channel with a timeout, so cancellation wakes it
//! immediately instead of waiting out the period.
//!
//! A tick that is already running when `stop` is called completes, `stop`
//! then joins the thread; no tick starts after `stop` returns. Do not call
//! `stop` from inside a tick of the same task, or while holding a lock that
//! the tick needs.

use std::fmt;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::{Result, WatchError};

/// The independent polling loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollTask {
    /// Start readiness (accuracy gate), 1 s by default
    Gate,
    /// Anchor drift check, 5 s by default
    Drift,
    /// Track sampling, 10 s by default
    Track,
}

impl PollTask {
    pub const ALL: [PollTask; 3] = [PollTask::Gate, PollTask::Drift, PollTask::Track];

    pub fn name(&self) -> &'static str {
        match self {
            PollTask::Gate => "gate",
            PollTask::Drift => "drift",
            PollTask::Track => "track",
        }
    }
}

impl fmt::Display for PollTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A cancellable fixed-period ticker running on its own thread.
#[derive(Debug)]
pub struct PeriodicTask {
    name: String,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Spawn a ticker calling `tick` every `period`, first after one period.
    ///
    /// Deadlines advance by one period per tick, so short delays do not shift
    /// later ticks. After a tick overruns by more than a period (for example
    /// while waiting on the monitor lock), one tick runs immediately and the
    /// missed ones are skipped.
    pub fn spawn<F>(name: &str, period: Duration, mut tick: F) -> Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        if period.is_zero() {
            return Err(WatchError::Scheduler {
                message: format!("{} task period must be greater than 0", name),
            });
        }

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let thread_name = format!("anchor-watch-{}", name);
        let task_name = name.to_string();

        let handle = thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                let mut deadline = Instant::now() + period;
                loop {
                    let wait = deadline.saturating_duration_since(Instant::now());
                    match stop_rx.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => {
                            tick();
                            deadline = (deadline + period).max(Instant::now());
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("[PollScheduler] {} ticker exited", task_name);
            })
            .map_err(|e| WatchError::Scheduler {
                message: format!("failed to spawn {} ticker: {}", name, e),
            })?;

        Ok(Self {
            name: name.to_string(),
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the ticker and wait for it to exit. Idempotent.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            // Send fails only if the thread already exited
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The three polling loops, each independently startable and stoppable.
#[derive(Debug, Default)]
pub struct PollScheduler {
    gate: Option<PeriodicTask>,
    drift: Option<PeriodicTask>,
    track: Option<PeriodicTask>,
}

impl PollScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, task: PollTask) -> &mut Option<PeriodicTask> {
        match task {
            PollTask::Gate => &mut self.gate,
            PollTask::Drift => &mut self.drift,
            PollTask::Track => &mut self.track,
        }
    }

    /// Start `task`, replacing it if it is already running.
    pub fn start<F>(&mut self, task: PollTask, period: Duration, tick: F) -> Result<()>
    where
        F: FnMut() + Send + 'static,
    {
        self.stop(task);
        let ticker = PeriodicTask::spawn(task.name(), period, tick)?;
        *self.slot(task) = Some(ticker);
        info!("[PollScheduler] Started {} task every {:?}", task, period);
        Ok(())
    }

    /// Stop `task`. Returns whether it was running.
    pub fn stop(&mut self, task: PollTask) -> bool {
        match self.slot(task).take() {
            Some(mut ticker) => {
                ticker.stop();
                info!("[PollScheduler] Stopped {} task", task);
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&mut self) {
        for task in PollTask::ALL {
            self.stop(task);
        }
    }

    pub fn is_running(&self, task: PollTask) -> bool {
        let slot = match task {
            PollTask::Gate => &self.gate,
            PollTask::Drift => &self.drift,
            PollTask::Track => &self.track,
        };
        slot.as_ref().is_some_and(PeriodicTask::is_running)
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        self.stop_all();
    }
}
