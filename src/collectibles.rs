//! Collectible lifecycle: spawn, expiry, proximity and collection.
//!
//! A [`CollectibleManager`] owns a time-bounded set of rewards anchored near fixed
//! [`SpawnZone`]s. Every regeneration replaces the whole set; a periodic sweep drops
//! anything past its expiry. Collection is at most once per collectible, enforced
//! with a compare-and-swap on a per-item flag, so the manager can be shared across
//! threads behind an `Arc`.
//!
//! ## State machine
//!
//! ```text
//! Spawned ──collect()──▶ Collected   (terminal)
//!    └────sweep, expires_at_ms <= now──▶ Expired  (terminal, removed)
//! ```
//!
//! Visibility (`nearby`) and interaction (`collect`) use different radii: an item can
//! be listed from further away than `collect_radius_meters` but not collected.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rstar::{RTree, RTreeObject, AABB};

use crate::error::{ensure_positive, EngineError, Result};
use crate::geo_utils::{haversine_distance, jitter, search_envelope};
use crate::{Clock, GpsPoint};

// ============================================================================
// Types
// ============================================================================

/// Kind of reward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CollectibleType {
    Bone,
    YarnBall,
    Treat,
    Toy,
    GoldenBone,
}

impl CollectibleType {
    /// In cumulative-threshold order, most common first.
    pub const ALL: [CollectibleType; 5] = [
        CollectibleType::Bone,
        CollectibleType::YarnBall,
        CollectibleType::Treat,
        CollectibleType::Toy,
        CollectibleType::GoldenBone,
    ];

    pub fn rarity(self) -> Rarity {
        match self {
            Self::Bone => Rarity::Common,
            Self::YarnBall => Rarity::Rare,
            Self::Treat | Self::Toy => Rarity::Epic,
            Self::GoldenBone => Rarity::Legendary,
        }
    }

    /// Reward units credited on collection.
    pub fn value(self) -> u32 {
        match self {
            Self::Bone => 10,
            Self::YarnBall => 25,
            Self::Treat => 50,
            Self::Toy => 75,
            Self::GoldenBone => 200,
        }
    }

    /// Probability of this type on a single spawn draw.
    pub fn spawn_weight(self) -> f64 {
        match self {
            Self::Bone => 0.50,
            Self::YarnBall => 0.25,
            Self::Treat => 0.15,
            Self::Toy => 0.08,
            Self::GoldenBone => 0.02,
        }
    }

    /// Weighted draw: one uniform roll in [0, 1) against cumulative thresholds.
    pub fn sample<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let roll: f64 = rng.gen();
        let mut cumulative = 0.0;
        for kind in Self::ALL {
            cumulative += kind.spawn_weight();
            if roll < cumulative {
                return kind;
            }
        }
        // Float rounding can leave the final threshold a hair under 1.0
        Self::GoldenBone
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Rarity {
    Common,
    Rare,
    Epic,
    Legendary,
}

/// A time-limited reward anchored on the map.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Collectible {
    pub id: String,
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub kind: CollectibleType,
    pub latitude: f64,
    pub longitude: f64,
    pub value: u32,
    pub rarity: Rarity,
    pub expires_at_ms: i64,
    pub collected: bool,
}

impl Collectible {
    /// Create an uncollected item; value and rarity come from `kind`.
    pub fn new(id: impl Into<String>, kind: CollectibleType, point: GpsPoint, expires_at_ms: i64) -> Self {
        Self {
            id: id.into(),
            kind,
            latitude: point.latitude,
            longitude: point.longitude,
            value: kind.value(),
            rarity: kind.rarity(),
            expires_at_ms,
            collected: false,
        }
    }

    pub fn point(&self) -> GpsPoint {
        GpsPoint::new(self.latitude, self.longitude)
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at_ms <= now_ms
    }
}

/// A collectible with its distance from the querying user.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NearbyCollectible {
    pub collectible: Collectible,
    pub distance_meters: f64,
}

/// Named anchor around which collectibles spawn.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpawnZone {
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl SpawnZone {
    pub fn new(id: impl Into<String>, name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self { id: id.into(), name: name.into(), latitude, longitude }
    }

    pub fn point(&self) -> GpsPoint {
        GpsPoint::new(self.latitude, self.longitude)
    }
}

/// Parks and squares in central Moscow.
pub fn default_spawn_zones() -> Vec<SpawnZone> {
    vec![
        SpawnZone::new("red-square", "Red Square", 55.7539, 37.6208),
        SpawnZone::new("zaryadye", "Zaryadye Park", 55.7512, 37.6289),
        SpawnZone::new("gorky-park", "Gorky Park", 55.7298, 37.6010),
        SpawnZone::new("patriarch-ponds", "Patriarch Ponds", 55.7636, 37.5929),
        SpawnZone::new("hermitage-garden", "Hermitage Garden", 55.7704, 37.6093),
        SpawnZone::new("sokolniki", "Sokolniki Park", 55.7925, 37.6770),
    ]
}

/// Configuration for spawning and collection.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CollectibleConfig {
    /// One collectible spawns near each zone per regeneration.
    pub zones: Vec<SpawnZone>,

    /// Lifetime of a spawned collectible. Default: 900000 ms (15 minutes)
    pub lifetime_ms: u64,

    /// Period between full regenerations. Default: 900000 ms (15 minutes)
    pub regeneration_interval_ms: u64,

    /// Period between expiry sweeps. Default: 60000 ms (1 minute)
    pub sweep_interval_ms: u64,

    /// Maximum user distance for a collection to succeed. Default: 50.0 meters
    pub collect_radius_meters: f64,

    /// Maximum random offset from the zone anchor, per axis.
    /// Default: 0.0005 degrees (~55 meters)
    pub jitter_degrees: f64,
}

impl Default for CollectibleConfig {
    fn default() -> Self {
        Self {
            zones: default_spawn_zones(),
            lifetime_ms: 15 * 60 * 1_000,
            regeneration_interval_ms: 15 * 60 * 1_000,
            sweep_interval_ms: 60 * 1_000,
            collect_radius_meters: 50.0,
            jitter_degrees: 0.0005,
        }
    }
}

impl CollectibleConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_positive("collect_radius_meters", self.collect_radius_meters)?;
        if !(self.jitter_degrees.is_finite() && self.jitter_degrees >= 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "jitter_degrees must be a non-negative number, got {}",
                self.jitter_degrees
            )));
        }
        for (name, value) in [
            ("lifetime_ms", self.lifetime_ms),
            ("regeneration_interval_ms", self.regeneration_interval_ms),
            ("sweep_interval_ms", self.sweep_interval_ms),
        ] {
            if value == 0 {
                return Err(EngineError::InvalidConfig(format!("{} must be non-zero", name)));
            }
        }
        if let Some(zone) = self.zones.iter().find(|z| !z.point().is_valid()) {
            return Err(EngineError::InvalidConfig(format!("spawn zone {} has invalid coordinates", zone.id)));
        }
        Ok(())
    }
}

// ============================================================================
// Active set
// ============================================================================

struct Slot {
    collectible: Collectible,
    collected: AtomicBool,
}

impl Slot {
    fn is_collected(&self) -> bool {
        self.collected.load(Ordering::Acquire)
    }

    fn snapshot(&self) -> Collectible {
        let mut collectible = self.collectible.clone();
        collectible.collected = self.is_collected();
        collectible
    }
}

/// Slot position for the spatial index, keyed by index into `ActiveSet::slots`.
struct IndexedSlot {
    idx: usize,
    lat: f64,
    lng: f64,
}

impl RTreeObject for IndexedSlot {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.lng, self.lat])
    }
}

struct ActiveSet {
    slots: Vec<Slot>,
    by_id: HashMap<String, usize>,
    index: RTree<IndexedSlot>,
}

impl ActiveSet {
    fn build(slots: Vec<Slot>) -> Self {
        let by_id = slots
            .iter()
            .enumerate()
            .map(|(i, s)| (s.collectible.id.clone(), i))
            .collect();
        let indexed = slots
            .iter()
            .enumerate()
            .map(|(i, s)| IndexedSlot {
                idx: i,
                lat: s.collectible.latitude,
                lng: s.collectible.longitude,
            })
            .collect();
        Self { slots, by_id, index: RTree::bulk_load(indexed) }
    }
}

// ============================================================================
// Manager
// ============================================================================

/// Owner of the active collectible population.
pub struct CollectibleManager {
    config: CollectibleConfig,
    clock: Arc<dyn Clock>,
    rng: Mutex<StdRng>,
    active: RwLock<ActiveSet>,
    collected_ids: Mutex<HashSet<String>>,
    total_value: AtomicU64,
    next_seq: AtomicU64,
}

impl CollectibleManager {
    /// Create an empty manager with an entropy-seeded RNG. Call [`generate`](Self::generate)
    /// (or run a [`CollectibleScheduler`](crate::CollectibleScheduler)) to populate it.
    pub fn new(config: CollectibleConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_rng(config, clock, StdRng::from_entropy())
    }

    /// Create a manager whose spawns are reproducible.
    pub fn with_seed(config: CollectibleConfig, clock: Arc<dyn Clock>, seed: u64) -> Self {
        Self::with_rng(config, clock, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: CollectibleConfig, clock: Arc<dyn Clock>, rng: StdRng) -> Self {
        Self {
            config,
            clock,
            rng: Mutex::new(rng),
            active: RwLock::new(ActiveSet::build(Vec::new())),
            collected_ids: Mutex::new(HashSet::new()),
            total_value: AtomicU64::new(0),
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CollectibleConfig {
        &self.config
    }

    fn read_active(&self) -> RwLockReadGuard<'_, ActiveSet> {
        self.active.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_active(&self) -> RwLockWriteGuard<'_, ActiveSet> {
        self.active.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_ledger(&self) -> MutexGuard<'_, HashSet<String>> {
        self.collected_ids.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn one collectible per zone and replace the whole active set.
    ///
    /// Returns the number spawned.
    pub fn generate(&self) -> usize {
        let now = self.clock.now_ms();
        let lifetime_ms = i64::try_from(self.config.lifetime_ms).unwrap_or(i64::MAX);
        let expires_at_ms = now.saturating_add(lifetime_ms);

        let batch: Vec<Collectible> = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            self.config
                .zones
                .iter()
                .map(|zone| {
                    let kind = CollectibleType::sample(&mut *rng);
                    let point = jitter(&zone.point(), self.config.jitter_degrees, &mut *rng);
                    let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                    Collectible::new(format!("{}-{}-{}", zone.id, now, seq), kind, point, expires_at_ms)
                })
                .collect()
        };

        let count = batch.len();
        let legendary = batch.iter().filter(|c| c.rarity == Rarity::Legendary).count();
        self.replace_active_set(batch);
        info!(
            "[CollectibleManager] Spawned {} collectibles ({} legendary), expiring at {}",
            count, legendary, expires_at_ms
        );
        count
    }

    /// Replace the active set wholesale. Items keep their `collected` flag.
    pub fn replace_active_set(&self, collectibles: Vec<Collectible>) {
        let slots = collectibles
            .into_iter()
            .map(|c| Slot {
                collected: AtomicBool::new(c.collected),
                collectible: c,
            })
            .collect();
        *self.write_active() = ActiveSet::build(slots);
    }

    /// Drop every collectible whose expiry has passed, collected or not.
    ///
    /// Returns the number removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let mut active = self.write_active();

        let expired = active.slots.iter().filter(|s| s.collectible.is_expired(now)).count();
        if expired == 0 {
            return 0;
        }

        let kept: Vec<Slot> = std::mem::take(&mut active.slots)
            .into_iter()
            .filter(|s| !s.collectible.is_expired(now))
            .collect();
        *active = ActiveSet::build(kept);
        debug!("[CollectibleManager] Swept {} expired, {} remain", expired, active.slots.len());
        expired
    }

    /// Snapshot of everything currently active, including collected items.
    pub fn active_set(&self) -> Vec<Collectible> {
        self.read_active().slots.iter().map(Slot::snapshot).collect()
    }

    pub fn active_count(&self) -> usize {
        self.read_active().slots.len()
    }

    pub fn get(&self, id: &str) -> Option<Collectible> {
        let active = self.read_active();
        active.by_id.get(id).map(|&i| active.slots[i].snapshot())
    }

    /// Uncollected, unexpired collectibles within `radius_meters`, closest first.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use walk_engine::{geo_utils, Collectible, CollectibleConfig, CollectibleManager,
    ///                   CollectibleType, GpsPoint, ManualClock};
    ///
    /// let manager = CollectibleManager::new(CollectibleConfig::default(), Arc::new(ManualClock::new(0)));
    /// let user = GpsPoint::new(55.7558, 37.6173);
    /// manager.replace_active_set(vec![
    ///     Collectible::new("far", CollectibleType::Toy, geo_utils::destination_point(&user, 0.0, 80.0), 60_000),
    ///     Collectible::new("near", CollectibleType::Bone, geo_utils::destination_point(&user, 0.0, 40.0), 60_000),
    /// ]);
    ///
    /// let found = manager.nearby_with_distance(&user, 100.0);
    /// assert_eq!(found[0].collectible.id, "near");
    /// assert_eq!(found[1].collectible.id, "far");
    /// ```
    pub fn nearby_with_distance(&self, user: &GpsPoint, radius_meters: f64) -> Vec<NearbyCollectible> {
        if !user.is_valid() || !radius_meters.is_finite() {
            return Vec::new();
        }
        let now = self.clock.now_ms();

        let guard = self.read_active();
        let active: &ActiveSet = &guard;
        let mut found: Vec<NearbyCollectible> = search_envelope(user, radius_meters)
            .iter()
            .map(|b| AABB::from_corners([b.min_lng, b.min_lat], [b.max_lng, b.max_lat]))
            .flat_map(|bounds| active.index.locate_in_envelope_intersecting(&bounds).collect::<Vec<_>>())
            .map(|entry| &active.slots[entry.idx])
            .filter(|slot| !slot.is_collected() && !slot.collectible.is_expired(now))
            .filter_map(|slot| {
                let distance_meters = haversine_distance(user, &slot.collectible.point());
                (distance_meters <= radius_meters).then(|| NearbyCollectible {
                    collectible: slot.snapshot(),
                    distance_meters,
                })
            })
            .collect();

        found.sort_by(|a, b| a.distance_meters.total_cmp(&b.distance_meters));
        found
    }

    /// Same as [`nearby_with_distance`](Self::nearby_with_distance) without the distances.
    pub fn nearby(&self, user: &GpsPoint, radius_meters: f64) -> Vec<Collectible> {
        self.nearby_with_distance(user, radius_meters)
            .into_iter()
            .map(|n| n.collectible)
            .collect()
    }

    /// Try to collect `id`.
    ///
    /// Succeeds only if the item exists, is unexpired, is not yet collected and, when
    /// `user` is given, lies within `collect_radius_meters`. On success the item is
    /// marked collected and its pre-collection snapshot is returned. Every failure is
    /// a silent `None` with no state change.
    pub fn collect(&self, id: &str, user: Option<&GpsPoint>) -> Option<Collectible> {
        let now = self.clock.now_ms();
        let active = self.read_active();

        let Some(&idx) = active.by_id.get(id) else {
            debug!("[CollectibleManager] collect({}): unknown id", id);
            return None;
        };
        let slot = &active.slots[idx];

        if slot.collectible.is_expired(now) {
            debug!("[CollectibleManager] collect({}): expired", id);
            return None;
        }

        if let Some(user) = user {
            let distance = haversine_distance(user, &slot.collectible.point());
            // NaN distance must fail
            if !user.is_valid() || !(distance <= self.config.collect_radius_meters) {
                debug!(
                    "[CollectibleManager] collect({}): {:.1}m away, limit {:.0}m",
                    id, distance, self.config.collect_radius_meters
                );
                return None;
            }
        }

        if slot
            .collected
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("[CollectibleManager] collect({}): already collected", id);
            return None;
        }

        self.lock_ledger().insert(slot.collectible.id.clone());
        self.total_value.fetch_add(u64::from(slot.collectible.value), Ordering::Relaxed);
        info!(
            "[CollectibleManager] Collected {} ({:?}, +{})",
            id, slot.collectible.kind, slot.collectible.value
        );

        Some(slot.collectible.clone())
    }

    /// Ids of everything collected through this manager, across regenerations.
    pub fn collected_ids(&self) -> HashSet<String> {
        self.lock_ledger().clone()
    }

    /// Sum of values of all successful collections.
    pub fn total_collected_value(&self) -> u64 {
        self.total_value.load(Ordering::Relaxed)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_utils::destination_point;
    use crate::ManualClock;

    const FIFTEEN_MINUTES: i64 = 15 * 60 * 1_000;

    fn user() -> GpsPoint {
        GpsPoint::new(55.7558, 37.6173)
    }

    fn manager_at(now_ms: i64) -> (CollectibleManager, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(now_ms));
        let manager = CollectibleManager::with_seed(CollectibleConfig::default(), clock.clone(), 42);
        (manager, clock)
    }

    fn placed(id: &str, meters: f64, expires_at_ms: i64) -> Collectible {
        Collectible::new(id, CollectibleType::Bone, destination_point(&user(), 90.0, meters), expires_at_ms)
    }

    #[test]
    fn test_type_table() {
        assert_eq!(CollectibleType::Bone.rarity(), Rarity::Common);
        assert_eq!(CollectibleType::YarnBall.rarity(), Rarity::Rare);
        assert_eq!(CollectibleType::Treat.rarity(), Rarity::Epic);
        assert_eq!(CollectibleType::Toy.rarity(), Rarity::Epic);
        assert_eq!(CollectibleType::GoldenBone.rarity(), Rarity::Legendary);

        let total: f64 = CollectibleType::ALL.iter().map(|k| k.spawn_weight()).sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(CollectibleType::GoldenBone.value() > CollectibleType::Bone.value());
    }

    #[test]
    fn test_spawn_distribution() {
        let mut rng = StdRng::seed_from_u64(2024);
        let mut counts: HashMap<Rarity, usize> = HashMap::new();
        let draws = 10_000;
        for _ in 0..draws {
            *counts.entry(CollectibleType::sample(&mut rng).rarity()).or_default() += 1;
        }

        let share = |r: Rarity| *counts.get(&r).unwrap_or(&0) as f64 / draws as f64;
        assert!((share(Rarity::Common) - 0.50).abs() < 0.02);
        assert!((share(Rarity::Rare) - 0.25).abs() < 0.02);
        assert!((share(Rarity::Epic) - 0.23).abs() < 0.02);
        assert!((share(Rarity::Legendary) - 0.02).abs() < 0.01);
    }

    #[test]
    fn test_generate_spawns_one_per_zone_near_anchor() {
        let (manager, _clock) = manager_at(1_000);
        let count = manager.generate();
        let zones = default_spawn_zones();
        assert_eq!(count, zones.len());

        let active = manager.active_set();
        let ids: HashSet<&str> = active.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids.len(), zones.len());

        for (collectible, zone) in active.iter().zip(zones.iter()) {
            assert!(collectible.id.starts_with(&zone.id));
            assert!((collectible.latitude - zone.latitude).abs() <= 0.0005);
            assert!((collectible.longitude - zone.longitude).abs() <= 0.0005);
            assert_eq!(collectible.expires_at_ms, 1_000 + FIFTEEN_MINUTES);
            assert_eq!(collectible.value, collectible.kind.value());
            assert_eq!(collectible.rarity, collectible.kind.rarity());
            assert!(!collectible.collected);
        }
    }

    #[test]
    fn test_generate_replaces_previous_set() {
        let (manager, clock) = manager_at(0);
        manager.generate();
        let first: HashSet<String> = manager.active_set().into_iter().map(|c| c.id).collect();

        clock.set(FIFTEEN_MINUTES);
        manager.generate();
        let second: HashSet<String> = manager.active_set().into_iter().map(|c| c.id).collect();

        assert_eq!(second.len(), first.len());
        assert!(first.is_disjoint(&second));
    }

    #[test]
    fn test_sweep_removes_expired_regardless_of_collection() {
        let (manager, clock) = manager_at(0);
        manager.replace_active_set(vec![
            placed("short", 10.0, 60_000),
            placed("collected-short", 10.0, 60_000),
            placed("long", 10.0, 120_000),
        ]);
        assert!(manager.collect("collected-short", None).is_some());

        clock.set(59_999);
        assert_eq!(manager.sweep_expired(), 0);
        assert_eq!(manager.active_count(), 3);

        clock.set(60_000);
        assert_eq!(manager.sweep_expired(), 2);
        let remaining: Vec<String> = manager.active_set().into_iter().map(|c| c.id).collect();
        assert_eq!(remaining, vec!["long".to_string()]);

        // Lookups still work after the index is rebuilt
        assert_eq!(manager.nearby(&user(), 50.0).len(), 1);
        assert!(manager.collect("long", Some(&user())).is_some());
    }

    #[test]
    fn test_proximity_example() {
        let (manager, _clock) = manager_at(0);
        manager.replace_active_set(vec![placed("near", 40.0, 60_000), placed("far", 80.0, 60_000)]);

        let found = manager.nearby(&user(), 50.0);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "near");

        assert!(manager.collect("far", Some(&user())).is_none());
        assert!(!manager.get("far").unwrap().collected);
        assert!(manager.collect("near", Some(&user())).is_some());
    }

    #[test]
    fn test_visible_but_not_collectible() {
        let (manager, _clock) = manager_at(0);
        manager.replace_active_set(vec![placed("mid", 70.0, 60_000)]);

        assert_eq!(manager.nearby(&user(), 100.0).len(), 1);
        assert!(manager.collect("mid", Some(&user())).is_none());

        // Walking closer makes it collectible
        let closer = destination_point(&user(), 90.0, 30.0);
        assert!(manager.collect("mid", Some(&closer)).is_some());
    }

    #[test]
    fn test_nearby_sorted_by_distance() {
        let (manager, _clock) = manager_at(0);
        manager.replace_active_set(vec![
            placed("thirty", 30.0, 60_000),
            placed("ten", 10.0, 60_000),
            placed("twenty", 20.0, 60_000),
        ]);

        let found = manager.nearby_with_distance(&user(), 50.0);
        let ids: Vec<&str> = found.iter().map(|n| n.collectible.id.as_str()).collect();
        assert_eq!(ids, vec!["ten", "twenty", "thirty"]);
        assert!(found.windows(2).all(|w| w[0].distance_meters <= w[1].distance_meters));
        assert!((found[0].distance_meters - 10.0).abs() < 0.01);
    }

    #[test]
    fn test_expired_excluded_even_if_uncollected() {
        let (manager, clock) = manager_at(0);
        manager.replace_active_set(vec![placed("stale", 5.0, 60_000), placed("fresh", 5.0, 120_000)]);

        clock.set(60_000);
        let found = manager.nearby(&user(), 50.0);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "fresh");
        assert!(manager.collect("stale", Some(&user())).is_none());
        assert!(manager.collect("stale", None).is_none());
    }

    #[test]
    fn test_back_to_back_collect() {
        let (manager, _clock) = manager_at(0);
        manager.replace_active_set(vec![Collectible::new("here", CollectibleType::Treat, user(), 60_000)]);

        let first = manager.collect("here", Some(&user()));
        let second = manager.collect("here", Some(&user()));

        let snapshot = first.unwrap();
        assert!(!snapshot.collected);
        assert_eq!(snapshot.value, 50);
        assert!(second.is_none());

        assert!(manager.get("here").unwrap().collected);
        assert!(manager.collected_ids().contains("here"));
        assert_eq!(manager.total_collected_value(), 50);
        assert!(manager.nearby(&user(), 50.0).is_empty());
    }

    #[test]
    fn test_concurrent_collect_succeeds_once() {
        let (manager, _clock) = manager_at(0);
        manager.replace_active_set(vec![Collectible::new("prize", CollectibleType::GoldenBone, user(), 60_000)]);

        let manager = &manager;
        let successes = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(move || manager.collect("prize", Some(&user())).is_some()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).filter(|ok| *ok).count()
        });

        assert_eq!(successes, 1);
        assert_eq!(manager.total_collected_value(), 200);
    }

    #[test]
    fn test_collect_unknown_id() {
        let (manager, _clock) = manager_at(0);
        manager.generate();
        assert!(manager.collect("nope", None).is_none());
        assert!(manager.collected_ids().is_empty());
    }

    #[test]
    fn test_collect_without_position_skips_distance_check() {
        let (manager, _clock) = manager_at(0);
        manager.replace_active_set(vec![placed("far", 5_000.0, 60_000)]);
        assert!(manager.collect("far", None).is_some());
    }

    #[test]
    fn test_ledger_survives_regeneration() {
        let (manager, clock) = manager_at(0);
        manager.generate();
        let id = manager.active_set()[0].id.clone();
        assert!(manager.collect(&id, None).is_some());

        clock.set(FIFTEEN_MINUTES);
        manager.generate();
        assert!(manager.get(&id).is_none());
        assert!(manager.collected_ids().contains(&id));
        assert!(manager.collect(&id, None).is_none());
    }

    #[test]
    fn test_collect_rejects_non_finite_position() {
        let (manager, _clock) = manager_at(0);
        manager.replace_active_set(vec![Collectible::new("prize", CollectibleType::GoldenBone, user(), 60_000)]);

        assert!(manager.collect("prize", Some(&GpsPoint::new(f64::NAN, f64::NAN))).is_none());
        assert!(manager.collect("prize", Some(&GpsPoint::new(55.7558, f64::INFINITY))).is_none());
        assert!(manager.collect("prize", Some(&GpsPoint::new(120.0, 37.6173))).is_none());
        assert!(!manager.get("prize").unwrap().collected);
        assert_eq!(manager.total_collected_value(), 0);

        assert!(manager.nearby(&GpsPoint::new(f64::NAN, 37.6173), 50.0).is_empty());
        assert!(manager.collect("prize", Some(&user())).is_some());
    }

    #[test]
    fn test_nearby_matches_collect_near_pole() {
        let (manager, _clock) = manager_at(0);
        let here = GpsPoint::new(89.9, 10.0);
        let east = destination_point(&here, 90.0, 40.0);
        assert!((east.longitude - here.longitude).abs() > 0.2);
        manager.replace_active_set(vec![Collectible::new("polar", CollectibleType::Treat, east, 60_000)]);

        let found = manager.nearby_with_distance(&here, 50.0);
        assert_eq!(found.len(), 1);
        assert!((found[0].distance_meters - 40.0).abs() < 0.01);
        assert!(manager.collect("polar", Some(&here)).is_some());
    }

    #[test]
    fn test_nearby_across_antimeridian() {
        let (manager, _clock) = manager_at(0);
        let here = GpsPoint::new(-16.5, 179.9999);
        manager.replace_active_set(vec![
            Collectible::new("fiji", CollectibleType::Toy, GpsPoint::new(-16.5, -179.9999), 60_000),
            Collectible::new("too-far", CollectibleType::Bone, GpsPoint::new(-16.5, -179.999), 60_000),
        ]);

        let found = manager.nearby_with_distance(&here, 50.0);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].collectible.id, "fiji");
        assert!((found[0].distance_meters - 21.3).abs() < 0.1);
        assert!(manager.collect("fiji", Some(&here)).is_some());
    }

    #[test]
    fn test_huge_lifetime_never_expires() {
        let clock = Arc::new(ManualClock::new(1_000));
        let config = CollectibleConfig { lifetime_ms: u64::MAX, ..CollectibleConfig::default() };
        assert!(config.validate().is_ok());
        let manager = CollectibleManager::with_seed(config, clock, 1);
        manager.generate();

        assert!(manager.active_set().iter().all(|c| c.expires_at_ms == i64::MAX));
        assert_eq!(manager.sweep_expired(), 0);
        assert_eq!(manager.nearby(&GpsPoint::new(55.7539, 37.6208), 200.0).len(), 1);
    }

    #[test]
    fn test_seeded_managers_spawn_identically() {
        let clock = Arc::new(ManualClock::new(0));
        let a = CollectibleManager::with_seed(CollectibleConfig::default(), clock.clone(), 7);
        let b = CollectibleManager::with_seed(CollectibleConfig::default(), clock, 7);
        a.generate();
        b.generate();
        assert_eq!(a.active_set(), b.active_set());
    }

    #[test]
    fn test_config_validation() {
        assert!(CollectibleConfig::default().validate().is_ok());
        assert!(CollectibleConfig { collect_radius_meters: 0.0, ..Default::default() }.validate().is_err());
        assert!(CollectibleConfig { jitter_degrees: -0.1, ..Default::default() }.validate().is_err());
        assert!(CollectibleConfig { sweep_interval_ms: 0, ..Default::default() }.validate().is_err());

        let mut config = CollectibleConfig::default();
        config.zones.push(SpawnZone::new("bad", "Nowhere", 95.0, 0.0));
        assert!(config.validate().is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_collectible_json_shape() {
        let c = Collectible::new("red-square-0-0", CollectibleType::GoldenBone, GpsPoint::new(55.7539, 37.6208), 900_000);
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["type"], "GoldenBone");
        assert_eq!(json["rarity"], "legendary");
        assert_eq!(json["value"], 200);

        let back: Collectible = serde_json::from_value(json).unwrap();
        assert_eq!(back, c);
    }
}
