use approx::assert_relative_eq;
use forecast_demand::data::{AdminRegion, IncomeBracket, Locality, SizeCategory, Store};
use forecast_demand::prior::{PriorCache, PriorKey, StorePopulation};
use forecast_demand::{DemandPattern, GeoPoint, PriorScope, RegionalPriorEngine};
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

fn pune() -> GeoPoint {
    GeoPoint::new(18.5204, 73.8567)
}

fn grocery(id: &str, location: GeoPoint) -> Store {
    Store::new(
        id,
        location,
        AdminRegion::new("Maharashtra", "Pune", "411001"),
        Locality::Urban,
        SizeCategory::Small,
        IncomeBracket::LowerMiddle,
    )
}

fn snacks(mean: f64) -> HashMap<String, DemandPattern> {
    HashMap::from([("snacks".to_string(), DemandPattern::flat(mean))])
}

#[test]
fn test_sparse_neighbourhood_escalates_to_state() {
    let mut population = StorePopulation::new();
    population.upsert_store(grocery("near", pune().offset_km(2.0, 0.0)), snacks(14.0));
    population.upsert_store(grocery("satara", pune().offset_km(-100.0, 0.0)), snacks(9.0));
    population.upsert_store(grocery("ahmednagar", pune().offset_km(100.0, 30.0)), snacks(11.0));

    let target = grocery("new-store", pune());
    let prior = RegionalPriorEngine::default()
        .calculate_regional_prior(&population, &target, "snacks", 5.0)
        .unwrap();

    assert_eq!(
        prior.scope,
        PriorScope::State {
            state: "Maharashtra".to_string()
        }
    );
    assert_eq!(prior.contributing_stores, 3);
    assert_relative_eq!(prior.pattern.mean_daily_demand, 11.0);
    assert!(!prior.is_local());
    assert_eq!(prior.attempts.len(), 3);
}

#[test]
fn test_prior_is_never_absent_with_national_seed() {
    let mut population = StorePopulation::new();
    population.set_national_pattern("Dairy", DemandPattern::flat(30.0));
    let remote = Store::new(
        "leh-01",
        GeoPoint::new(34.1526, 77.5771),
        AdminRegion::new("Ladakh", "Leh", "194101"),
        Locality::Rural,
        SizeCategory::Large,
        IncomeBracket::High,
    );
    let prior = RegionalPriorEngine::default()
        .calculate_regional_prior(&population, &remote, "dairy", 5.0)
        .unwrap();
    assert_eq!(prior.scope, PriorScope::National);
    assert_relative_eq!(prior.pattern.mean_daily_demand, 30.0);
    assert!(prior.confidence > 0.0);
}

#[test]
fn test_unresolvable_store_is_rejected() {
    let mut population = StorePopulation::new();
    population.set_national_pattern("snacks", DemandPattern::flat(5.0));
    let mut store = grocery("x", pune());
    store.region.state.clear();
    let err = RegionalPriorEngine::default()
        .calculate_regional_prior(&population, &store, "snacks", 5.0)
        .unwrap_err();
    assert!(err.is_validation());
}

#[test]
fn test_concurrent_onboarding_computes_prior_once() {
    let mut population = StorePopulation::new();
    for (i, km) in [1.0, 2.0, 3.0].iter().enumerate() {
        population.upsert_store(grocery(&format!("n{}", i), pune().offset_km(*km, 0.0)), snacks(10.0));
    }
    let population = Arc::new(population);
    let engine = Arc::new(RegionalPriorEngine::default());
    let cache = Arc::new(PriorCache::new(Duration::from_secs(3600)));
    let computed = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let (population, engine, cache, computed, barrier) = (
                Arc::clone(&population),
                Arc::clone(&engine),
                Arc::clone(&cache),
                Arc::clone(&computed),
                Arc::clone(&barrier),
            );
            thread::spawn(move || {
                let store = grocery(&format!("onboard-{}", i), pune());
                let key = PriorKey::for_store(&store, "snacks", 5.0, &population);
                barrier.wait();
                cache
                    .get_or_compute(&key, population.generation(), || {
                        computed.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(20));
                        engine.calculate_regional_prior(&population, &store, "snacks", 5.0)
                    })
                    .unwrap()
            })
        })
        .collect();

    let priors: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(computed.load(Ordering::SeqCst), 1);
    assert_eq!(cache.recomputations(), 1);
    assert!(priors.iter().all(|p| Arc::ptr_eq(p, &priors[0])));
}

#[test]
fn test_population_change_invalidates_cached_prior() {
    let cache = PriorCache::new(Duration::from_secs(3600));
    let engine = RegionalPriorEngine::default();
    let mut population = StorePopulation::new();
    population.set_national_pattern("snacks", DemandPattern::flat(5.0));
    let store = grocery("s", pune());
    let key = PriorKey::for_store(&store, "snacks", 5.0, &population);

    let first = cache
        .get_or_compute(&key, population.generation(), || {
            engine.calculate_regional_prior(&population, &store, "snacks", 5.0)
        })
        .unwrap();
    assert_relative_eq!(first.pattern.mean_daily_demand, 5.0);

    population.set_national_pattern("snacks", DemandPattern::flat(8.0));
    assert!(cache.peek(&key, population.generation()).is_none());
    let second = cache
        .get_or_compute(&key, population.generation(), || {
            engine.calculate_regional_prior(&population, &store, "snacks", 5.0)
        })
        .unwrap();
    assert_relative_eq!(second.pattern.mean_daily_demand, 8.0);
    assert_eq!(cache.recomputations(), 2);
}
