use super::{DemandPattern, PriorScope, RegionalPrior, ScopeAttempt};
use crate::config::PriorConfig;
use crate::data::{DemandSeries, ProductCatalog, SalesHistory, Store, StoreId};
use crate::error::{ForecastError, Result};
use crate::features::ContextFeatureBuilder;
use demand_math::stats;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
struct Member {
    store: Store,
    patterns: HashMap<String, DemandPattern>,
}

/// Stores whose per-category patterns feed regional priors
///
/// Every mutation bumps [`generation`](Self::generation), which cached priors
/// are checked against.
#[derive(Debug, Clone, Default)]
pub struct StorePopulation {
    members: BTreeMap<StoreId, Member>,
    national: HashMap<String, DemandPattern>,
    generation: u64,
}

impl StorePopulation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn store(&self, id: &str) -> Option<&Store> {
        self.members.get(id).map(|m| &m.store)
    }

    /// True when `id` has a pattern of its own for `category`
    pub fn contributes(&self, id: &str, category: &str) -> bool {
        self.members
            .get(id)
            .is_some_and(|m| m.patterns.contains_key(&category.to_lowercase()))
    }

    /// Insert or replace a store and its category patterns
    pub fn upsert_store(&mut self, store: Store, patterns: HashMap<String, DemandPattern>) {
        let patterns = patterns
            .into_iter()
            .map(|(category, p)| (category.to_lowercase(), p))
            .collect();
        self.members.insert(store.id.clone(), Member { store, patterns });
        self.generation += 1;
    }

    /// Replace a store's attributes, keeping any patterns it already has
    pub fn update_store(&mut self, store: Store) {
        match self.members.get_mut(&store.id) {
            Some(member) => member.store = store,
            None => {
                self.members.insert(
                    store.id.clone(),
                    Member {
                        store,
                        patterns: HashMap::new(),
                    },
                );
            }
        }
        self.generation += 1;
    }

    pub fn remove_store(&mut self, id: &str) -> bool {
        let removed = self.members.remove(id).is_some();
        if removed {
            self.generation += 1;
        }
        removed
    }

    /// Seed the national fallback for a category
    pub fn set_national_pattern(&mut self, category: &str, pattern: DemandPattern) {
        self.national.insert(category.to_lowercase(), pattern);
        self.generation += 1;
    }

    pub fn national_pattern(&self, category: &str) -> Option<&DemandPattern> {
        self.national.get(category)
    }

    /// Estimate and upsert the category patterns of one store from its history
    ///
    /// Only categories with at least `min_days` days of own history contribute.
    pub fn observe_store(
        &mut self,
        store: Store,
        history: &SalesHistory,
        catalog: &ProductCatalog,
        builder: &ContextFeatureBuilder,
        min_days: u32,
    ) -> Result<()> {
        let patterns = match (history.first_date(), history.last_date()) {
            (Some(start), Some(end)) if history.days_of_data() >= min_days => {
                let categories: BTreeSet<&str> = history
                    .skus()
                    .filter_map(|sku| catalog.category_of(sku))
                    .collect();
                let mut patterns = HashMap::new();
                for category in categories {
                    let rows = history.category_daily(catalog, category, start, end);
                    let series = DemandSeries::from_daily(&rows, builder, &store)?;
                    patterns.insert(category.to_string(), DemandPattern::estimate(&series)?);
                }
                patterns
            }
            _ => HashMap::new(),
        };
        self.upsert_store(store, patterns);
        Ok(())
    }

    fn contributors<'a>(&'a self, category: &'a str) -> impl Iterator<Item = (&'a Store, &'a DemandPattern)> + 'a {
        self.members
            .values()
            .filter_map(move |m| m.patterns.get(category).map(|p| (&m.store, p)))
    }
}

#[derive(Debug, Clone)]
struct Contributor<'a> {
    pattern: &'a DemandPattern,
    weight: f64,
}

/// Resolves regional priors over a [`StorePopulation`]
#[derive(Debug, Clone, Default)]
pub struct RegionalPriorEngine {
    config: PriorConfig,
}

impl RegionalPriorEngine {
    pub fn new(config: PriorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PriorConfig {
        &self.config
    }

    /// Similarity of `other` to `target` at `distance_km` inside `radius_km`
    ///
    /// Geographic weight decays linearly to `edge_distance_weight` at the radius;
    /// with no radius (state or national scope) the edge weight applies.
    pub fn similarity(&self, target: &Store, other: &Store, distance_km: Option<f64>, radius_km: Option<f64>) -> f64 {
        let c = &self.config;
        let geo = match (distance_km, radius_km) {
            (Some(d), Some(r)) if r > 0.0 => 1.0 - (1.0 - c.edge_distance_weight) * (d / r).clamp(0.0, 1.0),
            _ => c.edge_distance_weight,
        };
        let locality = if target.locality == other.locality {
            1.0
        } else {
            c.locality_mismatch_factor
        };
        let size = (1.0 - c.size_step_penalty * (target.size.rank() - other.size.rank()).abs() as f64).max(0.0);
        let income =
            (1.0 - c.income_step_penalty * (target.income.rank() - other.income.rank()).abs() as f64).max(0.0);
        geo * locality * size * income
    }

    /// Median weight of a comparable store, never below `min_similarity`
    fn contributor_weight(
        &self,
        target: &Store,
        other: &Store,
        distance_km: Option<f64>,
        radius_km: Option<f64>,
    ) -> f64 {
        self.similarity(target, other, distance_km, radius_km)
            .max(self.config.min_similarity)
    }

    /// Resolve the prior for `store` and `category`, starting at `radius_km`
    ///
    /// Escalates local -> expanded local -> state -> national and only fails
    /// when no national data exists for the category.
    pub fn calculate_regional_prior(
        &self,
        population: &StorePopulation,
        store: &Store,
        category: &str,
        radius_km: f64,
    ) -> Result<RegionalPrior> {
        if category.trim().is_empty() {
            return Err(ForecastError::validation("category must not be empty"));
        }
        if !store.region.is_resolvable() || !store.location.is_valid() {
            return Err(ForecastError::validation(format!(
                "store '{}' has no resolvable location",
                store.id
            )));
        }
        let category = category.to_lowercase();
        let min = self.config.min_contributing_stores;
        let mut attempts = Vec::new();

        let mut radii = vec![radius_km];
        if self.config.expanded_radius_km > radius_km {
            radii.push(self.config.expanded_radius_km);
        }
        for radius in radii {
            let local = self.local_contributors(population, store, &category, radius);
            let scope = PriorScope::Local { radius_km: radius };
            attempts.push(ScopeAttempt {
                scope: scope.clone(),
                comparable_stores: local.len(),
            });
            if local.len() >= min {
                return self.aggregate(&category, scope, &local, attempts);
            }
            debug!(
                store_id = %store.id,
                category = %category,
                radius_km = radius,
                comparable = local.len(),
                "too few comparable stores within radius"
            );
        }

        let state = &store.region.state;
        let in_state: Vec<Contributor> = population
            .contributors(&category)
            .filter(|(s, _)| s.id != store.id && s.region.state.eq_ignore_ascii_case(state))
            .map(|(s, p)| Contributor {
                pattern: p,
                weight: self.contributor_weight(store, s, None, None),
            })
            .collect();
        let scope = PriorScope::State { state: state.clone() };
        attempts.push(ScopeAttempt {
            scope: scope.clone(),
            comparable_stores: in_state.len(),
        });
        if in_state.len() >= min {
            return self.aggregate(&category, scope, &in_state, attempts);
        }

        let national: Vec<Contributor> = population
            .contributors(&category)
            .filter(|(s, _)| s.id != store.id)
            .map(|(s, p)| Contributor {
                pattern: p,
                weight: self.contributor_weight(store, s, None, None),
            })
            .collect();
        attempts.push(ScopeAttempt {
            scope: PriorScope::National,
            comparable_stores: national.len(),
        });
        warn!(
            store_id = %store.id,
            category = %category,
            contributors = national.len(),
            "regional prior escalated to national scope"
        );

        if national.len() >= min {
            return self.aggregate(&category, PriorScope::National, &national, attempts);
        }
        if let Some(seeded) = population.national_pattern(&category) {
            return Ok(RegionalPrior {
                category: category.clone(),
                scope: PriorScope::National,
                pattern: seeded.clone(),
                contributing_stores: 0,
                confidence: SEEDED_NATIONAL_CONFIDENCE,
                attempts,
            });
        }
        if !national.is_empty() {
            return self.aggregate(&category, PriorScope::National, &national, attempts);
        }
        Err(ForecastError::PriorUnavailable { category })
    }

    fn local_contributors<'a>(
        &self,
        population: &'a StorePopulation,
        store: &Store,
        category: &'a str,
        radius_km: f64,
    ) -> Vec<Contributor<'a>> {
        population
            .contributors(category)
            .filter(|(s, _)| s.id != store.id)
            .filter_map(|(s, p)| {
                let d = store.location.distance_km(&s.location);
                if d > radius_km {
                    return None;
                }
                Some(Contributor {
                    pattern: p,
                    weight: self.contributor_weight(store, s, Some(d), Some(radius_km)),
                })
            })
            .collect()
    }

    fn aggregate(
        &self,
        category: &str,
        scope: PriorScope,
        contributors: &[Contributor],
        attempts: Vec<ScopeAttempt>,
    ) -> Result<RegionalPrior> {
        let weights: Vec<f64> = contributors.iter().map(|c| c.weight.max(MIN_WEIGHT)).collect();
        let component = |f: &dyn Fn(&DemandPattern) -> f64| -> Result<f64> {
            let values: Vec<f64> = contributors.iter().map(|c| f(c.pattern)).collect();
            Ok(stats::weighted_median(&values, &weights)?)
        };

        let mut pattern = DemandPattern::flat(component(&|p: &DemandPattern| p.mean_daily_demand)?);
        for i in 0..7 {
            pattern.day_of_week[i] = component(&|p: &DemandPattern| p.day_of_week[i])?;
        }
        for i in 0..12 {
            pattern.month_of_year[i] = component(&|p: &DemandPattern| p.month_of_year[i])?;
        }
        pattern.monsoon_multiplier = component(&|p: &DemandPattern| p.monsoon_multiplier)?;
        pattern.salary_cycle_multiplier = component(&|p: &DemandPattern| p.salary_cycle_multiplier)?;

        let festivals: BTreeSet<&String> = contributors
            .iter()
            .flat_map(|c| c.pattern.festival_multipliers.keys())
            .collect();
        for name in festivals {
            let (values, w): (Vec<f64>, Vec<f64>) = contributors
                .iter()
                .zip(&weights)
                .filter_map(|(c, w)| c.pattern.festival_multiplier(name).map(|m| (m, *w)))
                .unzip();
            pattern
                .festival_multipliers
                .insert(name.clone(), stats::weighted_median(&values, &w)?);
        }

        let means: Vec<f64> = contributors.iter().map(|c| c.pattern.mean_daily_demand).collect();
        let confidence = self.confidence(&means);

        debug!(
            category = %category,
            scope = %scope,
            contributors = contributors.len(),
            confidence,
            "regional prior resolved"
        );
        Ok(RegionalPrior {
            category: category.to_string(),
            scope,
            pattern,
            contributing_stores: contributors.len(),
            confidence,
            attempts,
        })
    }

    /// Count factor `n / (n + half)` damped by the relative IQR of store levels
    fn confidence(&self, means: &[f64]) -> f64 {
        let n = means.len() as f64;
        let count_factor = n / (n + self.config.confidence_half_count);
        let dispersion = match (stats::iqr(means), stats::median(means)) {
            (Ok(spread), Ok(mid)) if means.len() >= 2 && mid > 0.0 => spread / mid,
            _ => 0.0,
        };
        (count_factor / (1.0 + dispersion)).clamp(0.0, 1.0)
    }
}

const MIN_WEIGHT: f64 = 1e-6;
const SEEDED_NATIONAL_CONFIDENCE: f64 = 0.1;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::test_support::store_at;
    use crate::data::{AdminRegion, IncomeBracket, Locality, SizeCategory};
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;

    fn pattern(mean: f64) -> HashMap<String, DemandPattern> {
        HashMap::from([("snacks".to_string(), DemandPattern::flat(mean))])
    }

    fn target() -> Store {
        store_at("target", 19.0760, 72.8777)
    }

    fn neighbour(id: &str, north_km: f64) -> Store {
        let loc = target().location.offset_km(north_km, 0.0);
        store_at(id, loc.lat, loc.lon)
    }

    #[test]
    fn three_close_stores_resolve_locally_with_median() {
        let mut population = StorePopulation::new();
        population.upsert_store(neighbour("a", 1.0), pattern(10.0));
        population.upsert_store(neighbour("b", 2.0), pattern(12.0));
        population.upsert_store(neighbour("c", 3.0), pattern(100.0));

        let prior = RegionalPriorEngine::default()
            .calculate_regional_prior(&population, &target(), "Snacks", 5.0)
            .unwrap();
        assert_eq!(prior.scope, PriorScope::Local { radius_km: 5.0 });
        assert_eq!(prior.contributing_stores, 3);
        assert_relative_eq!(prior.pattern.mean_daily_demand, 12.0);
        assert!(prior.confidence > 0.0 && prior.confidence < 1.0);
    }

    #[test]
    fn dissimilar_stores_inside_radius_still_resolve_locally() {
        let mut small_urban = target();
        small_urban.locality = Locality::Urban;
        small_urban.size = SizeCategory::Small;
        small_urban.income = IncomeBracket::Low;

        let mut population = StorePopulation::new();
        for (id, km, mean) in [("r1", 1.5, 6.0), ("r2", 2.0, 9.0), ("r3", 2.5, 30.0)] {
            let mut s = neighbour(id, km);
            s.locality = Locality::Rural;
            s.size = SizeCategory::Large;
            s.income = IncomeBracket::High;
            population.upsert_store(s, pattern(mean));
        }

        let engine = RegionalPriorEngine::default();
        let prior = engine
            .calculate_regional_prior(&population, &small_urban, "snacks", 5.0)
            .unwrap();
        assert_eq!(prior.scope, PriorScope::Local { radius_km: 5.0 });
        assert_eq!(prior.contributing_stores, 3);
        assert_eq!(prior.attempts.len(), 1);
        assert_relative_eq!(prior.pattern.mean_daily_demand, 9.0);

        let far_rural = population.store("r3").unwrap();
        assert!(engine.similarity(&small_urban, far_rural, Some(2.5), Some(5.0)) < engine.config().min_similarity);
    }

    #[test]
    fn single_neighbour_escalates_to_state() {
        let mut population = StorePopulation::new();
        population.upsert_store(neighbour("near", 2.0), pattern(10.0));
        for (i, km) in [40.0, 60.0, 80.0].iter().enumerate() {
            population.upsert_store(neighbour(&format!("far{}", i), *km), pattern(8.0));
        }

        let prior = RegionalPriorEngine::default()
            .calculate_regional_prior(&population, &target().with_days_of_data(10), "snacks", 5.0)
            .unwrap();
        assert_eq!(
            prior.scope,
            PriorScope::State {
                state: "Maharashtra".to_string()
            }
        );
        assert_eq!(prior.contributing_stores, 4);
        let tried: Vec<usize> = prior.attempts.iter().map(|a| a.comparable_stores).collect();
        assert_eq!(tried, vec![1, 1, 4]);
    }

    #[test]
    fn falls_back_to_seeded_national_pattern() {
        let mut population = StorePopulation::new();
        let mut elsewhere = neighbour("ka", 1.0);
        elsewhere.region = AdminRegion::new("Karnataka", "Bengaluru", "560001");
        population.upsert_store(elsewhere, pattern(5.0));
        population.set_national_pattern("snacks", DemandPattern::flat(7.0));

        let prior = RegionalPriorEngine::default()
            .calculate_regional_prior(&population, &target(), "snacks", 0.5)
            .unwrap();
        assert_eq!(prior.scope, PriorScope::National);
        assert_relative_eq!(prior.pattern.mean_daily_demand, 7.0);
        assert_eq!(prior.contributing_stores, 0);
    }

    #[test]
    fn empty_category_data_is_prior_unavailable() {
        let err = RegionalPriorEngine::default()
            .calculate_regional_prior(&StorePopulation::new(), &target(), "snacks", 5.0)
            .unwrap_err();
        assert!(matches!(err, ForecastError::PriorUnavailable { .. }));
    }

    #[test]
    fn similarity_penalises_distance_and_attributes() {
        let engine = RegionalPriorEngine::default();
        let a = target();
        let mut rural = neighbour("r", 1.0);
        rural.locality = Locality::Rural;
        assert_relative_eq!(engine.similarity(&a, &a, Some(0.0), Some(5.0)), 1.0);
        assert_relative_eq!(engine.similarity(&a, &a, Some(5.0), Some(5.0)), 0.5);
        assert!(engine.similarity(&a, &rural, Some(1.0), Some(5.0)) < engine.similarity(&a, &a, Some(1.0), Some(5.0)));
    }

    #[test]
    fn update_store_keeps_patterns() {
        let mut population = StorePopulation::new();
        population.upsert_store(neighbour("a", 1.0), pattern(6.0));
        let g = population.generation();
        let mut moved = neighbour("a", 1.2);
        moved.size = SizeCategory::Large;
        population.update_store(moved);
        assert!(population.generation() > g);
        assert!(population.contributes("a", "Snacks"));
        assert_eq!(population.store("a").map(|s| s.size), Some(SizeCategory::Large));
    }

    #[test]
    fn mutations_bump_generation() {
        let mut population = StorePopulation::new();
        let g0 = population.generation();
        population.upsert_store(neighbour("a", 1.0), pattern(1.0));
        assert!(population.generation() > g0);
        let g1 = population.generation();
        assert!(!population.remove_store("missing"));
        assert_eq!(population.generation(), g1);
    }
}
