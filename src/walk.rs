//! Walk distance and speed accumulation.
//!
//! A [`WalkTracker`] turns a noisy, intermittent stream of [`PositionSample`]s into a
//! [`WalkTrack`] summary. Every sample is kept in the trajectory, but only deltas
//! shorter than `max_segment_meters` add distance, and only speeds strictly between
//! 0 and `max_speed_kmh` can raise the max speed.
//!
//! The tracker is a plain owned value with no timers of its own: the host (or
//! [`WalkSession`](crate::WalkSession)) feeds it samples and calls [`WalkTracker::tick`]
//! once per `tick_interval_ms` so the duration stays live between fixes.

use std::sync::Arc;

use log::{debug, info, warn};

use crate::error::{ensure_positive, EngineError, Result};
use crate::geo_utils::{haversine_distance, polyline_length};
use crate::{Bounds, Clock, GpsPoint, PositionError, PositionOptions, PositionSample};

/// Tuning for the walk accumulator.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WalkConfig {
    /// Deltas at or above this distance are treated as GPS jumps and add nothing.
    /// Default: 100.0 meters
    pub max_segment_meters: f64,

    /// Speeds at or above this are sensor glitches and never become the max speed.
    /// Default: 50.0 km/h
    pub max_speed_kmh: f64,

    /// Period of the duration ticker. Default: 1000 ms
    pub tick_interval_ms: u64,

    /// Ignore fixes whose reported accuracy is worse than this for distance purposes.
    /// Default: None (accuracy is not used)
    pub max_accuracy_meters: Option<f64>,

    /// Options used when subscribing to the position source.
    pub position: PositionOptions,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            max_segment_meters: 100.0,
            max_speed_kmh: 50.0,
            tick_interval_ms: 1_000,
            max_accuracy_meters: None,
            position: PositionOptions::default(),
        }
    }
}

impl WalkConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_positive("max_segment_meters", self.max_segment_meters)?;
        ensure_positive("max_speed_kmh", self.max_speed_kmh)?;
        if let Some(limit) = self.max_accuracy_meters {
            ensure_positive("max_accuracy_meters", limit)?;
        }
        if self.tick_interval_ms == 0 {
            return Err(EngineError::InvalidConfig("tick_interval_ms must be non-zero".into()));
        }
        if self.position.timeout_ms == 0 {
            return Err(EngineError::InvalidConfig("position.timeout_ms must be non-zero".into()));
        }
        Ok(())
    }
}

/// Snapshot of a walk.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WalkTrack {
    /// Accumulated distance from accepted deltas only
    pub distance_meters: f64,
    /// Whole seconds since the walk started
    pub duration_seconds: u64,
    pub average_speed_kmh: f64,
    pub max_speed_kmh: f64,
    /// Every sample received while tracking, in arrival order (jumps included)
    pub points: Vec<PositionSample>,
    pub start_timestamp_ms: Option<i64>,
}

impl WalkTrack {
    /// Length of the raw trajectory through every retained point, jumps included.
    pub fn path_length_meters(&self) -> f64 {
        let points: Vec<GpsPoint> = self.points.iter().map(|s| s.point()).collect();
        polyline_length(&points)
    }

    /// Bounding box of the trajectory, for fitting the map.
    pub fn bounds(&self) -> Option<Bounds> {
        let points: Vec<GpsPoint> = self.points.iter().map(|s| s.point()).collect();
        Bounds::from_points(&points)
    }
}

/// What happened to a sample handed to [`WalkTracker::on_position`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleOutcome {
    /// Not tracking; the sample was dropped.
    Ignored,
    /// First usable fix of the session; becomes the reference point.
    First,
    /// Delta counted towards distance.
    Accepted { meters: f64 },
    /// Delta too large; counted nothing but the reference moved here.
    Jump { meters: f64 },
    /// Reported accuracy too poor; kept in the trajectory only.
    LowAccuracy,
    /// Non-finite or out-of-range coordinates; kept in the trajectory only.
    Invalid,
}

/// Stateful walk accumulator. One per walking session, never shared.
pub struct WalkTracker {
    config: WalkConfig,
    clock: Arc<dyn Clock>,
    track: WalkTrack,
    last_accepted: Option<PositionSample>,
    error: Option<PositionError>,
    tracking: bool,
}

impl WalkTracker {
    pub fn new(config: WalkConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            track: WalkTrack::default(),
            last_accepted: None,
            error: None,
            tracking: false,
        }
    }

    pub fn config(&self) -> &WalkConfig {
        &self.config
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    /// Read-only copy of the current walk.
    pub fn stats(&self) -> WalkTrack {
        self.track.clone()
    }

    pub fn track(&self) -> &WalkTrack {
        &self.track
    }

    /// Last acquisition error, cleared by the next processed sample.
    pub fn error(&self) -> Option<PositionError> {
        self.error
    }

    /// Begin a new walk. Calling this while already tracking discards the old walk.
    pub fn start(&mut self) {
        if self.tracking {
            debug!("[WalkTracker] start() while tracking, beginning a fresh walk");
        }
        let now = self.clock.now_ms();
        self.track = WalkTrack {
            start_timestamp_ms: Some(now),
            ..WalkTrack::default()
        };
        self.last_accepted = None;
        self.error = None;
        self.tracking = true;
        info!("[WalkTracker] Walk started at {}", now);
    }

    /// Stop reacting to samples and ticks. Stats stay readable. Idempotent.
    pub fn stop(&mut self) {
        if !self.tracking {
            return;
        }
        self.refresh_duration();
        self.tracking = false;
        info!(
            "[WalkTracker] Walk stopped: {:.0}m in {}s ({} points)",
            self.track.distance_meters,
            self.track.duration_seconds,
            self.track.points.len()
        );
    }

    /// Stop and forget everything, including the trajectory.
    pub fn reset(&mut self) {
        self.tracking = false;
        self.track = WalkTrack::default();
        self.last_accepted = None;
        self.error = None;
        debug!("[WalkTracker] Reset");
    }

    /// Recompute duration and average speed from the clock.
    pub fn tick(&mut self) {
        if self.tracking {
            self.refresh_duration();
        }
    }

    /// Record an acquisition failure. Tracking continues with whatever fixes arrive.
    pub fn on_position_error(&mut self, error: PositionError) {
        warn!("[WalkTracker] Position error: {}", error);
        self.error = Some(error);
    }

    /// Process one fix.
    pub fn on_position(&mut self, sample: PositionSample) -> SampleOutcome {
        if !self.tracking {
            debug!("[WalkTracker] Ignoring sample at {}: not tracking", sample.timestamp_ms);
            return SampleOutcome::Ignored;
        }

        self.error = None;
        self.track.points.push(sample);

        let outcome = if !sample.point().is_valid() {
            debug!("[WalkTracker] Invalid coordinates ({}, {})", sample.latitude, sample.longitude);
            SampleOutcome::Invalid
        } else if self.is_too_inaccurate(&sample) {
            debug!(
                "[WalkTracker] Accuracy {:?}m worse than limit, not counting distance",
                sample.accuracy_meters
            );
            SampleOutcome::LowAccuracy
        } else {
            let outcome = match self.last_accepted {
                None => SampleOutcome::First,
                Some(prev) => self.measure(&prev, &sample),
            };
            // Even a jump becomes the new reference, so one bad fix cannot strand the trail
            self.last_accepted = Some(sample);
            outcome
        };

        self.refresh_duration();
        outcome
    }

    fn is_too_inaccurate(&self, sample: &PositionSample) -> bool {
        match (self.config.max_accuracy_meters, sample.accuracy_meters) {
            (Some(limit), Some(accuracy)) => accuracy > limit,
            _ => false,
        }
    }

    fn measure(&mut self, prev: &PositionSample, sample: &PositionSample) -> SampleOutcome {
        let meters = haversine_distance(&prev.point(), &sample.point());

        if meters >= self.config.max_segment_meters {
            debug!("[WalkTracker] GPS jump of {:.1}m rejected", meters);
            return SampleOutcome::Jump { meters };
        }

        self.track.distance_meters += meters;

        let dt_seconds = (sample.timestamp_ms - prev.timestamp_ms) as f64 / 1000.0;
        if dt_seconds > 0.0 {
            let speed_kmh = meters / dt_seconds * 3.6;
            if speed_kmh > 0.0 && speed_kmh < self.config.max_speed_kmh {
                self.track.max_speed_kmh = self.track.max_speed_kmh.max(speed_kmh);
            } else if speed_kmh >= self.config.max_speed_kmh {
                debug!("[WalkTracker] Implausible speed {:.1} km/h ignored", speed_kmh);
            }
        }

        SampleOutcome::Accepted { meters }
    }

    fn refresh_duration(&mut self) {
        let Some(start) = self.track.start_timestamp_ms else {
            return;
        };
        let elapsed_ms = (self.clock.now_ms() - start).max(0);
        self.track.duration_seconds = (elapsed_ms / 1000) as u64;
        self.track.average_speed_kmh = if self.track.duration_seconds > 0 {
            (self.track.distance_meters / 1000.0) / (self.track.duration_seconds as f64 / 3600.0)
        } else {
            0.0
        };
    }
}
