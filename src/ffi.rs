//! FFI exports for the mobile apps.
//!
//! One process-wide [`WalkEngine`] sits behind a mutex. The host owns GPS and timers:
//! it pushes fixes with [`walk_push_position`], calls [`walk_tick_all`] every tick
//! interval, and calls [`collectibles_generate`] / [`collectibles_sweep`] on its own
//! schedule.

use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};
use once_cell::sync::Lazy;

use crate::{
    init_logging, Collectible, CollectibleConfig, GpsPoint, NearbyCollectible, PositionError,
    PositionSample, SampleOutcome, WalkConfig, WalkEngine, WalkTrack,
};

static ENGINE: Lazy<Mutex<WalkEngine>> = Lazy::new(|| Mutex::new(WalkEngine::default()));

fn with_engine<T>(f: impl FnOnce(&mut WalkEngine) -> T) -> T {
    let mut engine: MutexGuard<'_, WalkEngine> = ENGINE.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut engine)
}

// ============================================================================
// Configuration
// ============================================================================

/// Replace the global engine. Existing walks and collectibles are discarded.
/// Returns false (and keeps the old engine) if either config is invalid.
#[uniffi::export]
pub fn configure_engine(walk_config: WalkConfig, collectible_config: CollectibleConfig) -> bool {
    init_logging();
    match WalkEngine::new(walk_config, collectible_config) {
        Ok(engine) => {
            with_engine(|current| *current = engine);
            info!("[WalkEngineRust] Engine reconfigured");
            true
        }
        Err(e) => {
            warn!("[WalkEngineRust] Rejected configuration: {}", e);
            false
        }
    }
}

#[uniffi::export]
pub fn default_walk_config() -> WalkConfig {
    WalkConfig::default()
}

#[uniffi::export]
pub fn default_collectible_config() -> CollectibleConfig {
    CollectibleConfig::default()
}

// ============================================================================
// Walks
// ============================================================================

#[uniffi::export]
pub fn walk_start(session_id: String) {
    init_logging();
    with_engine(|engine| engine.start_walk(&session_id));
}

/// Feed one fix. Returns true if it added distance (or anchored the walk).
#[uniffi::export]
pub fn walk_push_position(session_id: String, sample: PositionSample) -> bool {
    init_logging();
    let outcome = with_engine(|engine| engine.push_position(&session_id, sample));
    debug!("[WalkEngineRust] {} <- {:?}", session_id, outcome);
    matches!(outcome, Some(SampleOutcome::First | SampleOutcome::Accepted { .. }))
}

#[uniffi::export]
pub fn walk_report_error(session_id: String, error: PositionError) -> bool {
    init_logging();
    with_engine(|engine| engine.report_position_error(&session_id, error))
}

#[uniffi::export]
pub fn walk_tick_all() {
    init_logging();
    with_engine(WalkEngine::tick_all);
}

#[uniffi::export]
pub fn walk_stop(session_id: String) -> bool {
    init_logging();
    with_engine(|engine| engine.stop_walk(&session_id))
}

#[uniffi::export]
pub fn walk_reset(session_id: String) -> Option<WalkTrack> {
    init_logging();
    with_engine(|engine| engine.reset_walk(&session_id))
}

#[uniffi::export]
pub fn walk_stats(session_id: String) -> Option<WalkTrack> {
    init_logging();
    with_engine(|engine| engine.walk_stats(&session_id))
}

#[uniffi::export]
pub fn walk_error(session_id: String) -> Option<PositionError> {
    init_logging();
    with_engine(|engine| engine.walk_error(&session_id))
}

// ============================================================================
// Collectibles
// ============================================================================

#[uniffi::export]
pub fn collectibles_generate() -> u32 {
    init_logging();
    with_engine(|engine| engine.collectibles().generate() as u32)
}

#[uniffi::export]
pub fn collectibles_sweep() -> u32 {
    init_logging();
    with_engine(|engine| engine.collectibles().sweep_expired() as u32)
}

#[uniffi::export]
pub fn collectibles_active() -> Vec<Collectible> {
    init_logging();
    with_engine(|engine| engine.collectibles().active_set())
}

#[uniffi::export]
pub fn collectibles_nearby(latitude: f64, longitude: f64, radius_meters: f64) -> Vec<NearbyCollectible> {
    init_logging();
    let user = GpsPoint::new(latitude, longitude);
    with_engine(|engine| engine.collectibles().nearby_with_distance(&user, radius_meters))
}

/// Both coordinates or neither. `None` for a position with only one coordinate.
fn requested_position(latitude: Option<f64>, longitude: Option<f64>) -> Option<Option<GpsPoint>> {
    match (latitude, longitude) {
        (Some(lat), Some(lng)) => Some(Some(GpsPoint::new(lat, lng))),
        (None, None) => Some(None),
        _ => None,
    }
}

/// Collect by id. Pass the user's position to enforce the collect radius.
/// Supplying only one coordinate fails the collection.
#[uniffi::export]
pub fn collectibles_collect(id: String, latitude: Option<f64>, longitude: Option<f64>) -> Option<Collectible> {
    init_logging();
    let Some(user) = requested_position(latitude, longitude) else {
        warn!("[WalkEngineRust] collect({}) with a partial position, refusing", id);
        return None;
    };
    let result = with_engine(|engine| engine.collectibles().collect(&id, user.as_ref()));
    if let Some(ref c) = result {
        info!("[WalkEngineRust] Collected {} ({:?}, +{})", c.id, c.kind, c.value);
    }
    result
}

#[uniffi::export]
pub fn collectibles_collected_ids() -> Vec<String> {
    init_logging();
    let mut ids: Vec<String> = with_engine(|engine| engine.collectibles().collected_ids().into_iter().collect());
    ids.sort();
    ids
}

#[uniffi::export]
pub fn collectibles_total_value() -> u64 {
    init_logging();
    with_engine(|engine| engine.collectibles().total_collected_value())
}
