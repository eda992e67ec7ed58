use super::{RegionalPrior, StorePopulation};
use crate::data::{IncomeBracket, Locality, SizeCategory, Store, StoreId};
use crate::error::Result;
use dashmap::DashMap;
use demand_math::GeoPoint;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Cohort a cached prior is shared across
///
/// Stores that share a grid cell of about a kilometre and the same attributes
/// resolve one prior, measured from the cell centre. A store that itself
/// contributes to the category gets a key of its own so its pattern is left
/// out of its prior.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PriorKey {
    pub state: String,
    pub cell: (i32, i32),
    pub locality: Locality,
    pub size: SizeCategory,
    pub income: IncomeBracket,
    pub category: String,
    /// Set when the requesting store is one of the category's contributors
    pub contributor: Option<StoreId>,
    radius_m: u64,
}

impl PriorKey {
    pub fn for_store(store: &Store, category: &str, radius_km: f64, population: &StorePopulation) -> Self {
        let category = category.to_lowercase();
        let cell = |deg: f64| (deg * CELLS_PER_DEGREE).round() as i32;
        Self {
            state: store.region.state.to_lowercase(),
            cell: (cell(store.location.lat), cell(store.location.lon)),
            locality: store.locality,
            size: store.size,
            income: store.income,
            contributor: population
                .contributes(&store.id, &category)
                .then(|| store.id.clone()),
            category,
            radius_m: (radius_km * 1000.0).round().max(0.0) as u64,
        }
    }

    pub fn radius_km(&self) -> f64 {
        self.radius_m as f64 / 1000.0
    }

    pub fn cell_centre(&self) -> GeoPoint {
        GeoPoint::new(
            self.cell.0 as f64 / CELLS_PER_DEGREE,
            self.cell.1 as f64 / CELLS_PER_DEGREE,
        )
    }

    /// `store` moved to the cell centre, which every store sharing this key
    /// resolves its prior from. Invalid locations are left for validation.
    pub fn anchor(&self, store: &Store) -> Store {
        let mut anchored = store.clone();
        if store.location.is_valid() {
            anchored.location = self.cell_centre();
        }
        anchored
    }
}

const CELLS_PER_DEGREE: f64 = 100.0;

#[derive(Debug, Clone)]
struct CachedPrior {
    prior: Arc<RegionalPrior>,
    computed_at: Instant,
    generation: u64,
}

#[derive(Debug, Default)]
struct Slot {
    entry: RwLock<Option<CachedPrior>>,
    // Held only while recomputing; concurrent callers wait here for the result.
    refresh: Mutex<()>,
}

impl Slot {
    fn fresh(&self, ttl: Duration, generation: u64) -> Option<Arc<RegionalPrior>> {
        self.entry
            .read()
            .as_ref()
            .filter(|c| c.generation == generation && c.computed_at.elapsed() < ttl)
            .map(|c| Arc::clone(&c.prior))
    }
}

/// TTL cache of regional priors with single-flight recomputation per key
#[derive(Debug)]
pub struct PriorCache {
    ttl: Duration,
    slots: DashMap<PriorKey, Arc<Slot>>,
    recomputations: AtomicU64,
}

impl PriorCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: DashMap::new(),
            recomputations: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached prior for `key`, computing it at most once at a time
    ///
    /// An entry is reused while it is younger than the TTL and was computed
    /// against the same population `generation`.
    pub fn get_or_compute<F>(&self, key: &PriorKey, generation: u64, compute: F) -> Result<Arc<RegionalPrior>>
    where
        F: FnOnce() -> Result<RegionalPrior>,
    {
        let slot = self.slot(key);
        if let Some(prior) = slot.fresh(self.ttl, generation) {
            return Ok(prior);
        }

        let _guard = slot.refresh.lock();
        // Another caller may have finished while we waited.
        if let Some(prior) = slot.fresh(self.ttl, generation) {
            debug!(category = %key.category, cell = ?key.cell, "prior filled by concurrent caller");
            return Ok(prior);
        }

        let started = Instant::now();
        let prior = Arc::new(compute()?);
        self.recomputations.fetch_add(1, Ordering::Relaxed);
        info!(
            category = %key.category,
            cell = ?key.cell,
            scope = %prior.scope,
            contributors = prior.contributing_stores,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "regional prior recomputed"
        );
        *slot.entry.write() = Some(CachedPrior {
            prior: Arc::clone(&prior),
            computed_at: Instant::now(),
            generation,
        });
        Ok(prior)
    }

    fn slot(&self, key: &PriorKey) -> Arc<Slot> {
        if let Some(slot) = self.slots.get(key) {
            return Arc::clone(slot.value());
        }
        // The shard guard is dropped at the end of this statement.
        Arc::clone(self.slots.entry(key.clone()).or_default().value())
    }

    /// Cached prior without recomputation, if still fresh
    pub fn peek(&self, key: &PriorKey, generation: u64) -> Option<Arc<RegionalPrior>> {
        self.slots
            .get(key)
            .and_then(|slot| slot.fresh(self.ttl, generation))
    }

    pub fn invalidate(&self, key: &PriorKey) {
        self.slots.remove(key);
    }

    /// Drop every cached prior for one state
    pub fn invalidate_state(&self, state: &str) {
        let state = state.to_lowercase();
        self.slots.retain(|key, _| key.state != state);
    }

    pub fn clear(&self) {
        self.slots.clear();
    }

    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.value().entry.read().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys currently tracked, including ones whose computation failed
    pub fn tracked_keys(&self) -> usize {
        self.slots.len()
    }

    /// Number of computations performed since creation
    pub fn recomputations(&self) -> u64 {
        self.recomputations.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::test_support::store_at;
    use crate::prior::{DemandPattern, PriorScope};
    use std::sync::Barrier;
    use std::thread;

    fn prior() -> RegionalPrior {
        RegionalPrior {
            category: "snacks".to_string(),
            scope: PriorScope::National,
            pattern: DemandPattern::flat(3.0),
            contributing_stores: 0,
            confidence: 0.1,
            attempts: Vec::new(),
        }
    }

    fn key() -> PriorKey {
        PriorKey::for_store(&store_at("s", 19.0, 72.8), "Snacks", 5.0, &StorePopulation::new())
    }

    #[test]
    fn second_lookup_hits_cache() {
        let cache = PriorCache::new(Duration::from_secs(60));
        cache.get_or_compute(&key(), 1, || Ok(prior())).unwrap();
        cache.get_or_compute(&key(), 1, || panic!("should be cached")).unwrap();
        assert_eq!(cache.recomputations(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn generation_change_and_ttl_force_recompute() {
        let cache = PriorCache::new(Duration::from_secs(60));
        cache.get_or_compute(&key(), 1, || Ok(prior())).unwrap();
        cache.get_or_compute(&key(), 2, || Ok(prior())).unwrap();
        assert_eq!(cache.recomputations(), 2);

        let expired = PriorCache::new(Duration::ZERO);
        expired.get_or_compute(&key(), 1, || Ok(prior())).unwrap();
        expired.get_or_compute(&key(), 1, || Ok(prior())).unwrap();
        assert_eq!(expired.recomputations(), 2);
    }

    #[test]
    fn invalidate_state_clears_matching_entries() {
        let cache = PriorCache::new(Duration::from_secs(60));
        cache.get_or_compute(&key(), 1, || Ok(prior())).unwrap();
        cache.invalidate_state("MAHARASHTRA");
        assert!(cache.peek(&key(), 1).is_none());
        assert_eq!(cache.tracked_keys(), 0);
    }

    #[test]
    fn invalidated_keys_are_not_retained() {
        let cache = PriorCache::new(Duration::from_secs(60));
        let population = StorePopulation::new();
        for i in 0..50 {
            let store = store_at(&format!("s{}", i), 19.0 + i as f64 * 0.05, 72.8);
            let key = PriorKey::for_store(&store, "snacks", 5.0, &population);
            cache.get_or_compute(&key, 1, || Ok(prior())).unwrap();
            cache.invalidate(&key);
        }
        assert_eq!(cache.tracked_keys(), 0);
        assert!(cache.is_empty());

        cache.get_or_compute(&key(), 1, || Ok(prior())).unwrap();
        assert_eq!(cache.tracked_keys(), 1);
        cache.get_or_compute(&key(), 1, || panic!("should be cached")).unwrap();
    }

    #[test]
    fn nearby_stores_share_a_key_unless_they_contribute() {
        let mut population = StorePopulation::new();
        let member = store_at("member", 19.0001, 72.8001);
        population.upsert_store(
            member.clone(),
            std::collections::HashMap::from([("snacks".to_string(), DemandPattern::flat(4.0))]),
        );
        let a = PriorKey::for_store(&store_at("a", 19.0002, 72.8), "snacks", 5.0, &population);
        let b = PriorKey::for_store(&store_at("b", 18.9998, 72.8003), "Snacks", 5.0, &population);
        let own = PriorKey::for_store(&member, "snacks", 5.0, &population);
        assert_eq!(a, b);
        assert_ne!(a, own);
        assert_eq!(own.contributor.as_deref(), Some("member"));
        assert_eq!(a.anchor(&store_at("a", 19.0002, 72.8)).location, a.cell_centre());
    }

    #[test]
    fn failed_compute_is_not_cached() {
        let cache = PriorCache::new(Duration::from_secs(60));
        let err = cache.get_or_compute(&key(), 1, || {
            Err(crate::error::ForecastError::PriorUnavailable {
                category: "snacks".to_string(),
            })
        });
        assert!(err.is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn concurrent_callers_share_one_recompute() {
        let cache = Arc::new(PriorCache::new(Duration::from_secs(60)));
        let barrier = Arc::new(Barrier::new(16));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    cache
                        .get_or_compute(&key(), 7, || {
                            thread::sleep(Duration::from_millis(50));
                            Ok(prior())
                        })
                        .unwrap()
                })
            })
            .collect();
        let results: Vec<Arc<RegionalPrior>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(cache.recomputations(), 1);
        assert!(results.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }
}
