//! Tokio drivers for the walk tracker and the collectible manager.
//!
//! Both subsystems are plain state machines; this module owns the suspension points
//! that drive them: the position subscription, the duration ticker, the initial-fix
//! timeout and the spawn/sweep intervals. Every task is held by a handle and aborted
//! on `stop()` or drop, which also drops the position watch and thereby unsubscribes.
//!
//! Must be used from within a tokio runtime.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::StreamExt;
use log::{debug, info, warn};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::{CollectibleManager, PositionError, PositionSource, PositionWatch, WalkTrack, WalkTracker};

fn lock(tracker: &Mutex<WalkTracker>) -> MutexGuard<'_, WalkTracker> {
    tracker.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Walk session
// ============================================================================

/// A [`WalkTracker`] wired to a [`PositionSource`] and a duration ticker.
pub struct WalkSession {
    tracker: Arc<Mutex<WalkTracker>>,
    source: Arc<dyn PositionSource>,
    task: Option<JoinHandle<()>>,
}

impl WalkSession {
    pub fn new(tracker: WalkTracker, source: Arc<dyn PositionSource>) -> Self {
        Self {
            tracker: Arc::new(Mutex::new(tracker)),
            source,
            task: None,
        }
    }

    /// Subscribe to the source and begin a fresh walk.
    ///
    /// Returns false, with the error readable through [`error`](Self::error), if the
    /// source refuses the subscription. Also returns false without subscribing while a
    /// persistent error (permission denied, no location capability) is on record;
    /// [`reset`](Self::reset) clears it once the cause is fixed. Calling this while
    /// tracking restarts the walk.
    pub fn start(&mut self) -> bool {
        self.halt();

        let (options, tick_every) = {
            let mut tracker = lock(&self.tracker);
            if let Some(error) = tracker.error().filter(PositionError::is_persistent) {
                warn!("[WalkSession] Not starting: {} (reset to retry)", error);
                tracker.stop();
                return false;
            }
            let config = tracker.config();
            (config.position.clone(), Duration::from_millis(config.tick_interval_ms))
        };

        let watch = match self.source.watch(&options) {
            Ok(watch) => watch,
            Err(error) => {
                warn!("[WalkSession] Could not subscribe to positions: {}", error);
                let mut tracker = lock(&self.tracker);
                tracker.reset();
                tracker.on_position_error(error);
                return false;
            }
        };

        lock(&self.tracker).start();
        let acquisition_timeout = Duration::from_millis(options.timeout_ms);
        self.task = Some(tokio::spawn(drive_walk(
            Arc::clone(&self.tracker),
            watch,
            tick_every,
            acquisition_timeout,
        )));
        info!("[WalkSession] Tracking started");
        true
    }

    /// Unsubscribe, cancel the ticker and freeze the stats. Idempotent.
    pub fn stop(&mut self) {
        self.halt();
        lock(&self.tracker).stop();
    }

    /// Stop and zero everything.
    pub fn reset(&mut self) {
        self.halt();
        lock(&self.tracker).reset();
    }

    pub fn is_tracking(&self) -> bool {
        lock(&self.tracker).is_tracking()
    }

    pub fn stats(&self) -> WalkTrack {
        lock(&self.tracker).stats()
    }

    pub fn error(&self) -> Option<PositionError> {
        lock(&self.tracker).error()
    }

    fn halt(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("[WalkSession] Driver task aborted");
        }
    }
}

impl Drop for WalkSession {
    fn drop(&mut self) {
        self.halt();
    }
}

async fn drive_walk(
    tracker: Arc<Mutex<WalkTracker>>,
    mut watch: PositionWatch,
    tick_every: Duration,
    acquisition_timeout: Duration,
) {
    let mut ticker = time::interval_at(Instant::now() + tick_every, tick_every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let first_fix_deadline = time::sleep(acquisition_timeout);
    tokio::pin!(first_fix_deadline);

    let mut awaiting_first_fix = true;
    let mut stream_open = true;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                lock(&tracker).tick();
            }

            _ = &mut first_fix_deadline, if awaiting_first_fix => {
                awaiting_first_fix = false;
                warn!("[WalkSession] No fix within {:?}", acquisition_timeout);
                lock(&tracker).on_position_error(PositionError::Timeout);
            }

            event = watch.next(), if stream_open => match event {
                Some(Ok(sample)) => {
                    awaiting_first_fix = false;
                    lock(&tracker).on_position(sample);
                }
                Some(Err(error)) => {
                    lock(&tracker).on_position_error(error);
                }
                None => {
                    // Duration keeps ticking even with no more fixes
                    debug!("[WalkSession] Position stream ended");
                    stream_open = false;
                }
            },
        }
    }
}

// ============================================================================
// Collectible scheduler
// ============================================================================

/// Periodic regeneration and expiry sweeps for a [`CollectibleManager`].
pub struct CollectibleScheduler {
    task: Option<JoinHandle<()>>,
}

impl CollectibleScheduler {
    /// Generate immediately, then every `regeneration_interval_ms`; sweep every
    /// `sweep_interval_ms`.
    pub fn start(manager: Arc<CollectibleManager>) -> Self {
        let task = tokio::spawn(drive_collectibles(manager));
        Self { task: Some(task) }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("[CollectibleScheduler] Stopped");
        }
    }
}

impl Drop for CollectibleScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn drive_collectibles(manager: Arc<CollectibleManager>) {
    let config = manager.config();
    let regenerate_every = Duration::from_millis(config.regeneration_interval_ms);
    let sweep_every = Duration::from_millis(config.sweep_interval_ms);

    // First tick fires immediately: spawn on start
    let mut regenerate = time::interval(regenerate_every);
    let mut sweep = time::interval_at(Instant::now() + sweep_every, sweep_every);
    regenerate.set_missed_tick_behavior(MissedTickBehavior::Delay);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = regenerate.tick() => {
                manager.generate();
            }
            _ = sweep.tick() => {
                let removed = manager.sweep_expired();
                if removed > 0 {
                    info!("[CollectibleScheduler] Swept {} expired collectibles", removed);
                }
            }
        }
    }
}
