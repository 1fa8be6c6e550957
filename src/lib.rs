//! # Walk Engine
//!
//! Real-time walk tracking and proximity rewards for a dog-walking app.
//!
//! This library provides:
//! - A noise-tolerant walk accumulator (distance, duration, average and max speed)
//! - A self-renewing population of map-anchored collectibles with proximity-gated,
//!   at-most-once collection
//! - Optional tokio drivers for the position subscription and the periodic timers
//!
//! ## Features
//!
//! - **`runtime`** (default) - tokio-driven [`WalkSession`] and [`CollectibleScheduler`]
//! - **`parallel`** - Tick many walk sessions in parallel with rayon
//! - **`serde`** - Serialize/deserialize all data and config types
//! - **`ffi`** - Enable FFI bindings for mobile platforms (iOS/Android)
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use walk_engine::{ManualClock, PositionSample, WalkConfig, WalkTracker};
//!
//! let clock = Arc::new(ManualClock::new(0));
//! let mut tracker = WalkTracker::new(WalkConfig::default(), clock.clone());
//! tracker.start();
//!
//! tracker.on_position(PositionSample::new(55.7558, 37.6173, 0));
//! clock.set(10_000);
//! tracker.on_position(PositionSample::new(55.7559, 37.6173, 10_000));
//!
//! let stats = tracker.stats();
//! assert!((stats.distance_meters - 11.1).abs() < 1.0);
//! assert!((stats.max_speed_kmh - 4.0).abs() < 0.1);
//! ```

// Unified error handling
pub mod error;
pub use error::{EngineError, PositionError, Result};

// Injectable wall clock
pub mod clock;
pub use clock::{Clock, ManualClock, SystemClock};

// Geographic utilities (distance, bearing, envelopes)
pub mod geo_utils;

// Position Source abstraction
pub mod source;
pub use source::{ChannelPositionSource, PositionEvent, PositionOptions, PositionSource, PositionWatch};

// Walk distance/speed accumulation
pub mod walk;
pub use walk::{SampleOutcome, WalkConfig, WalkTrack, WalkTracker};

// Collectible lifecycle
pub mod collectibles;
pub use collectibles::{
    default_spawn_zones, Collectible, CollectibleConfig, CollectibleManager, CollectibleType,
    NearbyCollectible, Rarity, SpawnZone,
};

// Multi-session host
pub mod engine;
pub use engine::WalkEngine;

// Timer and subscription drivers
#[cfg(feature = "runtime")]
pub mod runtime;
#[cfg(feature = "runtime")]
pub use runtime::{CollectibleScheduler, WalkSession};

#[cfg(feature = "ffi")]
mod ffi;

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!();

/// Initialize logging for Android (only used in FFI)
#[cfg(all(feature = "ffi", target_os = "android"))]
fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("WalkEngineRust"),
    );
}

#[cfg(all(feature = "ffi", not(target_os = "android")))]
fn init_logging() {
    // No-op on non-Android platforms
}

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use walk_engine::GpsPoint;
/// let point = GpsPoint::new(55.7558, 37.6173); // Moscow
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
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
}

/// One fix delivered by a position source.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PositionSample {
    pub latitude: f64,
    pub longitude: f64,
    /// Reported horizontal accuracy (meters), when the device provides one
    pub accuracy_meters: Option<f64>,
    /// Unix timestamp in milliseconds
    pub timestamp_ms: i64,
}

impl PositionSample {
    /// Create a sample without an accuracy estimate.
    pub fn new(latitude: f64, longitude: f64, timestamp_ms: i64) -> Self {
        Self { latitude, longitude, accuracy_meters: None, timestamp_ms }
    }

    pub fn with_accuracy(mut self, accuracy_meters: f64) -> Self {
        self.accuracy_meters = Some(accuracy_meters);
        self
    }

    pub fn point(&self) -> GpsPoint {
        GpsPoint::new(self.latitude, self.longitude)
    }
}

/// Bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from GPS points.
    pub fn from_points(points: &[GpsPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lng = f64::MAX;
        let mut max_lng = f64::MIN;

        for p in points {
            min_lat = min_lat.min(p.latitude);
            max_lat = max_lat.max(p.latitude);
            min_lng = min_lng.min(p.longitude);
            max_lng = max_lng.max(p.longitude);
        }

        Some(Self { min_lat, max_lat, min_lng, max_lng })
    }
}

// ============================================================================
// Tests
// ============================================================================
