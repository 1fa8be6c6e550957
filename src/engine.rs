//! Multi-session host.
//!
//! A [`WalkEngine`] keeps one independent [`WalkTracker`] per walking session and one
//! [`CollectibleManager`] shared by everyone. It owns no timers: the host pushes
//! fixes as they arrive and calls [`WalkEngine::tick_all`] once per tick interval.
//! This is the state behind the FFI layer, and the shape a server variant would use.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info};
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::walk::SampleOutcome;
use crate::{
    Clock, CollectibleConfig, CollectibleManager, PositionError, PositionSample, Result,
    SystemClock, WalkConfig, WalkTrack, WalkTracker,
};

pub struct WalkEngine {
    walk_config: WalkConfig,
    clock: Arc<dyn Clock>,
    sessions: HashMap<String, WalkTracker>,
    collectibles: Arc<CollectibleManager>,
}

impl Default for WalkEngine {
    fn default() -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let collectibles = CollectibleManager::new(CollectibleConfig::default(), Arc::clone(&clock));
        Self {
            walk_config: WalkConfig::default(),
            clock,
            sessions: HashMap::new(),
            collectibles: Arc::new(collectibles),
        }
    }
}

impl WalkEngine {
    /// Build an engine on the system clock after validating both configs.
    pub fn new(walk_config: WalkConfig, collectible_config: CollectibleConfig) -> Result<Self> {
        Self::with_clock(walk_config, collectible_config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        walk_config: WalkConfig,
        collectible_config: CollectibleConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let collectibles = CollectibleManager::new(collectible_config, Arc::clone(&clock));
        Self::with_collectibles(walk_config, Arc::new(collectibles), clock)
    }

    /// Use an existing (possibly seeded or shared) collectible manager.
    pub fn with_collectibles(
        walk_config: WalkConfig,
        collectibles: Arc<CollectibleManager>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        walk_config.validate()?;
        collectibles.config().validate()?;
        Ok(Self {
            walk_config,
            clock,
            sessions: HashMap::new(),
            collectibles,
        })
    }

    pub fn collectibles(&self) -> &Arc<CollectibleManager> {
        &self.collectibles
    }

    pub fn walk_config(&self) -> &WalkConfig {
        &self.walk_config
    }

    /// Start (or restart) the walk for `session_id`.
    pub fn start_walk(&mut self, session_id: &str) {
        let tracker = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| WalkTracker::new(self.walk_config.clone(), Arc::clone(&self.clock)));
        tracker.start();
        info!("[WalkEngine] Session {} started ({} sessions)", session_id, self.sessions.len());
    }

    /// Feed a fix to one session. `None` if the session does not exist.
    pub fn push_position(&mut self, session_id: &str, sample: PositionSample) -> Option<SampleOutcome> {
        match self.sessions.get_mut(session_id) {
            Some(tracker) => Some(tracker.on_position(sample)),
            None => {
                debug!("[WalkEngine] Sample for unknown session {}", session_id);
                None
            }
        }
    }

    /// Record an acquisition error for one session. Returns false for unknown sessions.
    pub fn report_position_error(&mut self, session_id: &str, error: PositionError) -> bool {
        match self.sessions.get_mut(session_id) {
            Some(tracker) => {
                tracker.on_position_error(error);
                true
            }
            None => false,
        }
    }

    /// Advance duration for every session.
    pub fn tick_all(&mut self) {
        #[cfg(feature = "parallel")]
        self.sessions.par_iter_mut().for_each(|(_, tracker)| tracker.tick());

        #[cfg(not(feature = "parallel"))]
        self.sessions.values_mut().for_each(|tracker| tracker.tick());
    }

    /// Stop a session but keep its stats readable. Returns false for unknown sessions.
    pub fn stop_walk(&mut self, session_id: &str) -> bool {
        match self.sessions.get_mut(session_id) {
            Some(tracker) => {
                tracker.stop();
                true
            }
            None => false,
        }
    }

    /// Discard a session entirely, returning its final stats.
    pub fn reset_walk(&mut self, session_id: &str) -> Option<WalkTrack> {
        let mut tracker = self.sessions.remove(session_id)?;
        let last = tracker.stats();
        tracker.reset();
        debug!("[WalkEngine] Session {} reset", session_id);
        Some(last)
    }

    pub fn walk_stats(&self, session_id: &str) -> Option<WalkTrack> {
        self.sessions.get(session_id).map(WalkTracker::stats)
    }

    pub fn walk_error(&self, session_id: &str) -> Option<PositionError> {
        self.sessions.get(session_id).and_then(WalkTracker::error)
    }

    /// Number of sessions currently tracking.
    pub fn active_walks(&self) -> usize {
        self.sessions.values().filter(|t| t.is_tracking()).count()
    }
}
