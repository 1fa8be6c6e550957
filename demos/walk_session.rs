//! A simulated walk through central Moscow with collectibles along the way.
//!
//! Run with: cargo run --example walk_session

use std::sync::Arc;
use std::time::Duration;

use walk_engine::geo_utils::destination_point;
use walk_engine::{
    ChannelPositionSource, CollectibleConfig, CollectibleManager, CollectibleScheduler, GpsPoint,
    PositionError, PositionSample, SystemClock, WalkConfig, WalkSession, WalkTracker,
};

#[tokio::main]
async fn main() {
    let clock = Arc::new(SystemClock);
    let source = Arc::new(ChannelPositionSource::new());

    let config = WalkConfig {
        tick_interval_ms: 200,
        ..WalkConfig::default()
    };
    let mut session = WalkSession::new(WalkTracker::new(config, clock.clone()), source.clone());

    let manager = Arc::new(CollectibleManager::with_seed(CollectibleConfig::default(), clock.clone(), 42));
    let mut scheduler = CollectibleScheduler::start(Arc::clone(&manager));
    tokio::time::sleep(Duration::from_millis(50)).await;

    println!("Walk Session Example\n");
    println!("{} collectibles spawned:", manager.active_count());
    for c in manager.active_set() {
        println!("   {:<40} {:?} ({:?}, {} pts)", c.id, c.kind, c.rarity, c.value);
    }
    println!();

    if !session.start() {
        println!("Could not start tracking: {:?}", session.error());
        return;
    }

    // Head north from Red Square at a brisk walking pace, one fix per "step"
    let mut position = GpsPoint::new(55.7539, 37.6208);
    let started = now_ms();
    for step in 0..20 {
        let timestamp_ms = started + step * 250;
        source.push(PositionSample::new(position.latitude, position.longitude, timestamp_ms));

        if step == 10 {
            // A single wild fix 2 km away, then a lost signal
            let jump = destination_point(&position, 90.0, 2_000.0);
            source.push(PositionSample::new(jump.latitude, jump.longitude, timestamp_ms + 10));
            source.push_error(PositionError::PositionUnavailable);
        }

        position = destination_point(&position, 0.0, 1.5);
        tokio::time::sleep(Duration::from_millis(250)).await;
    }

    session.stop();
    let stats = session.stats();
    println!("1. Walk stats:");
    println!("   Distance: {:.1}m", stats.distance_meters);
    println!("   Duration: {}s", stats.duration_seconds);
    println!("   Average speed: {:.2} km/h", stats.average_speed_kmh);
    println!("   Max speed: {:.2} km/h", stats.max_speed_kmh);
    println!("   Points recorded: {}\n", stats.points.len());

    // Walk over to the closest zone and try to pick something up
    let zone = &manager.config().zones[0];
    let user = GpsPoint::new(zone.latitude, zone.longitude);
    println!("2. Nearby {} (within 500m):", zone.name);
    for found in manager.nearby_with_distance(&user, 500.0) {
        println!("   {} at {:.0}m", found.collectible.id, found.distance_meters);
    }

    if let Some(target) = manager.nearby(&user, 500.0).into_iter().next() {
        match manager.collect(&target.id, Some(&user)) {
            Some(c) => println!("   Collected {} for {} points", c.id, c.value),
            None => println!("   {} is out of reach ({}m radius)", target.id, manager.config().collect_radius_meters),
        }
        let spot = GpsPoint::new(target.latitude, target.longitude);
        if let Some(c) = manager.collect(&target.id, Some(&spot)) {
            println!("   Walked closer and collected {} for {} points", c.id, c.value);
        }
        // Already collected
        assert!(manager.collect(&target.id, Some(&spot)).is_none());
    }
    println!("   Total collected value: {}", manager.total_collected_value());

    scheduler.stop();
}

fn now_ms() -> i64 {
    use walk_engine::Clock;
    SystemClock.now_ms()
}
