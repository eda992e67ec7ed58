//! Event-aware adjustment of a base forecast
//!
//! Events come from the local-event feed. Each detected event is checked
//! against the hard proximity cutoff, scored per product category from a
//! prior table blended with recorded outcomes, and, when the score clears the
//! gate, applied multiplicatively to the forecast.

use crate::config::EventConfig;
use crate::data::Store;
use crate::error::{ForecastError, Result};
use crate::features::ContextFeatures;
use crate::forecast::Forecast;
use crate::prior::DemandPattern;
use chrono::{DateTime, NaiveDate, Utc};
use demand_math::GeoPoint;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::debug;

/// Category key matching every category in the prior table
const ANY_CATEGORY: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    CricketMatch,
    Festival,
    Bandh,
    MonsoonAlert,
    Wedding,
    Rally,
    Exam,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventType::CricketMatch => "cricket_match",
            EventType::Festival => "festival",
            EventType::Bandh => "bandh",
            EventType::MonsoonAlert => "monsoon_alert",
            EventType::Wedding => "wedding",
            EventType::Rally => "rally",
            EventType::Exam => "exam",
        };
        f.write_str(name)
    }
}

/// A local event as delivered by the event feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub name: String,
    pub event_type: EventType,
    pub location: GeoPoint,
    /// First day of the event window (inclusive)
    pub start: NaiveDate,
    /// Last day of the event window (inclusive)
    pub end: NaiveDate,
    pub impact_radius_km: f64,
    #[serde(default)]
    pub estimated_attendance: Option<u32>,
    /// Festival name used to look up the regional festival multiplier
    #[serde(default)]
    pub festival: Option<String>,
}

impl Event {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        event_type: EventType,
        location: GeoPoint,
        start: NaiveDate,
        end: NaiveDate,
        impact_radius_km: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            event_type,
            location,
            start,
            end,
            impact_radius_km,
            estimated_attendance: None,
            festival: None,
        }
    }

    pub fn with_attendance(mut self, attendance: u32) -> Self {
        self.estimated_attendance = Some(attendance);
        self
    }

    pub fn with_festival(mut self, festival: impl Into<String>) -> Self {
        self.festival = Some(festival.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.end < self.start {
            return Err(ForecastError::validation(format!(
                "event '{}' ends before it starts",
                self.id
            )));
        }
        if !self.location.is_valid() {
            return Err(ForecastError::validation(format!(
                "event '{}' has an invalid location",
                self.id
            )));
        }
        if !self.impact_radius_km.is_finite() || self.impact_radius_km < 0.0 {
            return Err(ForecastError::validation(format!(
                "event '{}' has an invalid impact radius {}",
                self.id, self.impact_radius_km
            )));
        }
        Ok(())
    }

    /// Whether the event window overlaps `[start, end]`
    pub fn intersects(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.start <= end && start <= self.end
    }

    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        self.intersects(date, date)
    }
}

/// One event with its distance from the queried location
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedEvent {
    pub event: Event,
    pub distance_km: f64,
}

/// Snapshot of the local-event feed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventFeed {
    pub events: Vec<Event>,
    #[serde(default)]
    pub fetched_at: Option<DateTime<Utc>>,
}

impl EventFeed {
    /// Build a feed, rejecting malformed events
    pub fn new(events: Vec<Event>) -> Result<Self> {
        for event in &events {
            event.validate()?;
        }
        Ok(Self {
            events,
            fetched_at: Some(Utc::now()),
        })
    }

    /// Events whose impact radius covers `location` and whose window
    /// intersects `[start, end]`, nearest first
    pub fn detect_events(&self, location: &GeoPoint, start: NaiveDate, end: NaiveDate) -> Vec<DetectedEvent> {
        let mut detected: Vec<DetectedEvent> = self
            .events
            .iter()
            .filter(|e| e.intersects(start, end))
            .filter_map(|e| {
                let distance_km = location.distance_km(&e.location);
                (distance_km <= e.impact_radius_km).then(|| DetectedEvent {
                    event: e.clone(),
                    distance_km,
                })
            })
            .collect();
        detected.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        detected
    }
}

/// Linear decay from 1 at the event to 0 at `cutoff_km`
pub fn proximity_factor(distance_km: f64, cutoff_km: f64) -> f64 {
    if cutoff_km <= 0.0 || !distance_km.is_finite() {
        return 0.0;
    }
    (1.0 - distance_km / cutoff_km).clamp(0.0, 1.0)
}

/// When, relative to the event, the forecast day falls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventPhase {
    During,
    /// Days of stockpiling ahead of a bandh
    Lead { days_before: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
enum PhaseKind {
    During,
    Lead,
}

impl From<EventPhase> for PhaseKind {
    fn from(phase: EventPhase) -> Self {
        match phase {
            EventPhase::During => PhaseKind::During,
            EventPhase::Lead { .. } => PhaseKind::Lead,
        }
    }
}

/// Distance bands inside the cutoff within which outcomes are pooled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProximityBand {
    Adjacent,
    Near,
    Edge,
}

impl ProximityBand {
    pub fn of(distance_km: f64) -> Self {
        if distance_km < 0.5 {
            ProximityBand::Adjacent
        } else if distance_km < 1.0 {
            ProximityBand::Near
        } else {
            ProximityBand::Edge
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactDirection {
    Uplift,
    Suppression,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImpactScore {
    /// Strength in [0, 1]
    pub score: f64,
    pub direction: ImpactDirection,
    /// Expected demand multiplier the score was normalised from
    pub multiplier: f64,
}

impl ImpactScore {
    pub fn none() -> Self {
        Self {
            score: 0.0,
            direction: ImpactDirection::Uplift,
            multiplier: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct OutcomeKey {
    event_type: EventType,
    phase: PhaseKind,
    band: ProximityBand,
}

#[derive(Debug, Clone, Copy, Default)]
struct OutcomeStats {
    sum: f64,
    count: u32,
}

/// Event-outcome correlations per event type, phase, category and proximity
///
/// Before any outcome has been recorded the model answers from its prior
/// table; each recorded outcome then pulls the estimate toward the observed
/// average with `prior_strength` pseudo-observations on the prior.
#[derive(Debug)]
pub struct ImpactModel {
    config: EventConfig,
    priors: HashMap<(EventType, PhaseKind), BTreeMap<String, f64>>,
    outcomes: RwLock<HashMap<(OutcomeKey, String), OutcomeStats>>,
}

impl ImpactModel {
    pub fn new(config: EventConfig) -> Self {
        Self {
            config,
            priors: default_prior_table(),
            outcomes: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EventConfig {
        &self.config
    }

    /// Cold-start multiplier for a category, 1.0 when the table is silent
    pub fn prior_multiplier(&self, event_type: EventType, phase: EventPhase, category: &str) -> f64 {
        self.priors
            .get(&(event_type, phase.into()))
            .and_then(|table| table.get(category).or_else(|| table.get(ANY_CATEGORY)))
            .copied()
            .unwrap_or(1.0)
    }

    /// Record the realised demand multiplier of a past event
    pub fn record_outcome(
        &self,
        event_type: EventType,
        phase: EventPhase,
        category: &str,
        distance_km: f64,
        observed_multiplier: f64,
    ) -> Result<()> {
        if !observed_multiplier.is_finite() || observed_multiplier < 0.0 {
            return Err(ForecastError::validation(format!(
                "observed multiplier must be finite and non-negative, got {}",
                observed_multiplier
            )));
        }
        let key = OutcomeKey {
            event_type,
            phase: phase.into(),
            band: ProximityBand::of(distance_km),
        };
        let mut outcomes = self.outcomes.write();
        let stats = outcomes.entry((key, category.to_lowercase())).or_default();
        stats.sum += observed_multiplier;
        stats.count += 1;
        Ok(())
    }

    pub fn outcome_count(&self) -> usize {
        self.outcomes.read().values().map(|s| s.count as usize).sum()
    }

    /// Expected multiplier for the category given the prior and outcomes
    pub fn expected_multiplier(
        &self,
        event: &Event,
        phase: EventPhase,
        category: &str,
        distance_km: f64,
        pattern: Option<&DemandPattern>,
    ) -> f64 {
        let prior = self.festival_prior(event, phase, pattern).unwrap_or_else(|| {
            self.prior_multiplier(event.event_type, phase, category)
        });
        let key = OutcomeKey {
            event_type: event.event_type,
            phase: phase.into(),
            band: ProximityBand::of(distance_km),
        };
        let stats = self
            .outcomes
            .read()
            .get(&(key, category.to_lowercase()))
            .copied()
            .unwrap_or_default();
        let k = self.config.prior_strength;
        let blended = (prior * k + stats.sum) / (k + stats.count as f64);
        let blended = if blended.is_finite() { blended } else { prior };
        scale_by_attendance(blended, event.estimated_attendance)
    }

    fn festival_prior(&self, event: &Event, phase: EventPhase, pattern: Option<&DemandPattern>) -> Option<f64> {
        if event.event_type != EventType::Festival || phase != EventPhase::During {
            return None;
        }
        let name = event.festival.as_deref().unwrap_or(&event.name);
        pattern?.festival_multiplier(name)
    }

    /// Score in [0, 1] and direction of the event's effect on `category`
    pub fn calculate_impact_score(
        &self,
        event: &Event,
        phase: EventPhase,
        category: &str,
        distance_km: f64,
        pattern: Option<&DemandPattern>,
    ) -> ImpactScore {
        let multiplier = self.expected_multiplier(event, phase, category, distance_km, pattern);
        normalise_multiplier(multiplier, self.config.max_uplift_multiplier)
    }
}

impl Default for ImpactModel {
    fn default() -> Self {
        Self::new(EventConfig::default())
    }
}

/// Map a multiplier onto a directional [0, 1] score
pub fn normalise_multiplier(multiplier: f64, max_uplift_multiplier: f64) -> ImpactScore {
    if multiplier >= 1.0 {
        let span = (max_uplift_multiplier - 1.0).max(f64::EPSILON);
        ImpactScore {
            score: ((multiplier - 1.0) / span).clamp(0.0, 1.0),
            direction: ImpactDirection::Uplift,
            multiplier,
        }
    } else {
        ImpactScore {
            score: (1.0 - multiplier).clamp(0.0, 1.0),
            direction: ImpactDirection::Suppression,
            multiplier,
        }
    }
}

// Large gatherings push the uplift part of the multiplier further.
fn scale_by_attendance(multiplier: f64, attendance: Option<u32>) -> f64 {
    match attendance {
        Some(n) if n >= 10_000 && multiplier > 1.0 => 1.0 + (multiplier - 1.0) * 1.2,
        _ => multiplier,
    }
}

fn default_prior_table() -> HashMap<(EventType, PhaseKind), BTreeMap<String, f64>> {
    fn table(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
        entries.iter().map(|(c, m)| (c.to_string(), *m)).collect()
    }

    let mut priors = HashMap::new();
    priors.insert(
        (EventType::CricketMatch, PhaseKind::During),
        table(&[("snacks", 1.9), ("beverages", 1.8), ("disposables", 1.7)]),
    );
    priors.insert(
        (EventType::Festival, PhaseKind::During),
        table(&[
            ("sweets", 1.9),
            ("colours", 1.9),
            ("pooja", 1.7),
            ("dry_fruits", 1.7),
            ("gifting", 1.6),
        ]),
    );
    priors.insert(
        (EventType::Bandh, PhaseKind::During),
        table(&[(ANY_CATEGORY, 0.3)]),
    );
    priors.insert(
        (EventType::Bandh, PhaseKind::Lead),
        table(&[("staples", 1.8), ("dairy", 1.5), ("vegetables", 1.5)]),
    );
    priors.insert(
        (EventType::MonsoonAlert, PhaseKind::During),
        table(&[("umbrellas", 1.9), ("rainwear", 1.9), ("hot_beverages", 1.7)]),
    );
    priors.insert(
        (EventType::Wedding, PhaseKind::During),
        table(&[("sweets", 1.6), ("disposables", 1.7), ("beverages", 1.4), ("dry_fruits", 1.5)]),
    );
    priors.insert(
        (EventType::Rally, PhaseKind::During),
        table(&[("beverages", 1.5), ("snacks", 1.4), (ANY_CATEGORY, 0.85)]),
    );
    priors.insert(
        (EventType::Exam, PhaseKind::During),
        table(&[("stationery", 1.8), ("snacks", 1.2)]),
    );
    priors
}

/// A detected event that passed the proximity cutoff, with its score
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredEvent {
    pub event: Event,
    pub distance_km: f64,
    pub phase: EventPhase,
    pub proximity_factor: f64,
    pub impact: ImpactScore,
}

impl ScoredEvent {
    /// Festival the event stands for, when it is a festival
    pub fn festival_name(&self) -> Option<&str> {
        (self.event.event_type == EventType::Festival)
            .then(|| self.event.festival.as_deref().unwrap_or(&self.event.name))
    }

    /// Multiplicative contribution of this event to the forecast
    pub fn contribution(&self) -> f64 {
        let effect = self.impact.score * self.proximity_factor;
        match self.impact.direction {
            ImpactDirection::Uplift => 1.0 + effect,
            ImpactDirection::Suppression => (1.0 - effect).max(0.0),
        }
    }
}

/// Detects, scores and applies events for one store and category
#[derive(Debug, Clone, Default)]
pub struct EventAdjuster {
    config: EventConfig,
}

impl EventAdjuster {
    pub fn new(config: EventConfig) -> Self {
        Self { config }
    }

    /// Score every event relevant to `date`, dropping those beyond the cutoff
    pub fn score_events(
        &self,
        feed: &EventFeed,
        store: &Store,
        category: &str,
        date: NaiveDate,
        pattern: Option<&DemandPattern>,
        model: &ImpactModel,
    ) -> Vec<ScoredEvent> {
        let lookahead = date + chrono::Duration::days(i64::from(self.config.bandh_lead_days));
        feed.detect_events(&store.location, date, lookahead)
            .into_iter()
            .filter_map(|detected| {
                if detected.distance_km > self.config.max_distance_km {
                    debug!(
                        store_id = %store.id,
                        event = %detected.event.name,
                        distance_km = detected.distance_km,
                        "event beyond proximity cutoff"
                    );
                    return None;
                }
                let phase = self.phase_of(&detected.event, date)?;
                let impact = model.calculate_impact_score(
                    &detected.event,
                    phase,
                    category,
                    detected.distance_km,
                    pattern,
                );
                Some(ScoredEvent {
                    proximity_factor: proximity_factor(detected.distance_km, self.config.max_distance_km),
                    distance_km: detected.distance_km,
                    phase,
                    impact,
                    event: detected.event,
                })
            })
            .collect()
    }

    /// Events for one forecast day
    ///
    /// Festival events whose festival is already among the day's calendar
    /// festivals are left out; the regional pattern carries that effect.
    pub fn score_day(
        &self,
        feed: &EventFeed,
        store: &Store,
        category: &str,
        features: &ContextFeatures,
        pattern: Option<&DemandPattern>,
        model: &ImpactModel,
    ) -> Vec<ScoredEvent> {
        let mut scored = self.score_events(feed, store, category, features.date, pattern, model);
        scored.retain(|s| match s.festival_name() {
            Some(name) if features.festivals.iter().any(|f| f.eq_ignore_ascii_case(name)) => {
                debug!(
                    store_id = %store.id,
                    festival = name,
                    "festival event already in calendar features"
                );
                false
            }
            _ => true,
        });
        scored
    }

    fn phase_of(&self, event: &Event, date: NaiveDate) -> Option<EventPhase> {
        if event.is_active_on(date) {
            return Some(EventPhase::During);
        }
        let days_before = (event.start - date).num_days();
        if event.event_type == EventType::Bandh
            && days_before >= 1
            && days_before <= i64::from(self.config.bandh_lead_days)
        {
            return Some(EventPhase::Lead {
                days_before: days_before as u32,
            });
        }
        None
    }

    /// Apply every event whose score clears the gate, compounding multiplicatively
    ///
    /// An event exactly on the cutoff has zero proximity and is skipped like
    /// one beyond it.
    pub fn adjust_forecast(&self, base: &Forecast, events: &[ScoredEvent]) -> Forecast {
        let mut multiplier = 1.0;
        let mut factors = BTreeMap::new();
        for scored in events {
            if scored.distance_km > self.config.max_distance_km
                || scored.proximity_factor <= 0.0
                || scored.impact.score <= self.config.impact_threshold
            {
                continue;
            }
            let contribution = scored.contribution();
            multiplier *= contribution;
            let mut key = format!("event:{}", scored.event.name);
            if factors.contains_key(&key) {
                key = format!("event:{}#{}", scored.event.name, scored.event.id);
            }
            factors.insert(key, contribution);
        }
        if factors.is_empty() {
            return base.clone();
        }
        base.scaled(multiplier).with_factors(factors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::test_support::store_at;
    use crate::forecast::DataSource;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn base_forecast() -> Forecast {
        Forecast::new("s1", "cola-500", day(10), 20.0, (15.0, 25.0), 0.7, 0.5, DataSource::Blended).unwrap()
    }

    #[test]
    fn detect_events_respects_radius_and_window() {
        let origin = GeoPoint::new(19.0760, 72.8777);
        let near = Event::new("e1", "match", EventType::CricketMatch, origin.offset_km(1.0, 0.0), day(10), day(10), 3.0);
        let too_small = Event::new("e2", "rally", EventType::Rally, origin.offset_km(1.0, 0.0), day(10), day(10), 0.5);
        let later = Event::new("e3", "exam", EventType::Exam, origin, day(20), day(21), 5.0);
        let feed = EventFeed::new(vec![near, too_small, later]).unwrap();

        let found = feed.detect_events(&origin, day(9), day(11));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].event.id, "e1");
        assert_relative_eq!(found[0].distance_km, 1.0, epsilon = 0.01);
    }

    #[rstest]
    #[case(0.0, 1.0)]
    #[case(1.0, 0.5)]
    #[case(2.0, 0.0)]
    #[case(3.0, 0.0)]
    fn proximity_decays_linearly(#[case] distance: f64, #[case] expected: f64) {
        assert_relative_eq!(proximity_factor(distance, 2.0), expected);
    }

    #[test]
    fn cricket_beverages_at_one_km_scale_by_one_point_four() {
        let store = store_at("s1", 19.0760, 72.8777);
        let event = Event::new(
            "m1",
            "India vs Australia",
            EventType::CricketMatch,
            store.location.offset_km(1.0, 0.0),
            day(10),
            day(10),
            5.0,
        );
        let feed = EventFeed::new(vec![event]).unwrap();
        let model = ImpactModel::default();
        let adjuster = EventAdjuster::default();

        let scored = adjuster.score_events(&feed, &store, "beverages", day(10), None, &model);
        assert_eq!(scored.len(), 1);
        assert_relative_eq!(scored[0].impact.score, 0.8, epsilon = 1e-9);
        assert_relative_eq!(scored[0].proximity_factor, 0.5, epsilon = 1e-3);

        let adjusted = adjuster.adjust_forecast(&base_forecast(), &scored);
        assert_relative_eq!(adjusted.predicted_demand(), 28.0, epsilon = 0.02);
        let factor = adjusted.contributing_factors()["event:India vs Australia"];
        assert_relative_eq!(factor, 1.4, epsilon = 1e-3);
    }

    #[test]
    fn events_beyond_cutoff_are_never_scored() {
        let store = store_at("s1", 19.0760, 72.8777);
        let event = Event::new(
            "m1",
            "far match",
            EventType::CricketMatch,
            store.location.offset_km(3.0, 0.0),
            day(10),
            day(10),
            10.0,
        );
        let feed = EventFeed::new(vec![event]).unwrap();
        let scored = EventAdjuster::default().score_events(&feed, &store, "snacks", day(10), None, &ImpactModel::default());
        assert!(scored.is_empty());
    }

    #[test]
    fn bandh_suppresses_on_the_day_and_lifts_staples_before() {
        let store = store_at("s1", 19.0760, 72.8777);
        let bandh = Event::new("b1", "bandh", EventType::Bandh, store.location, day(12), day(12), 5.0);
        let feed = EventFeed::new(vec![bandh]).unwrap();
        let model = ImpactModel::default();
        let adjuster = EventAdjuster::default();

        let before = adjuster.score_events(&feed, &store, "staples", day(10), None, &model);
        assert_eq!(before[0].phase, EventPhase::Lead { days_before: 2 });
        assert_eq!(before[0].impact.direction, ImpactDirection::Uplift);

        let during = adjuster.score_events(&feed, &store, "snacks", day(12), None, &model);
        assert_eq!(during[0].phase, EventPhase::During);
        assert_eq!(during[0].impact.direction, ImpactDirection::Suppression);
        let adjusted = adjuster.adjust_forecast(&base_forecast(), &during);
        assert!(adjusted.predicted_demand() < base_forecast().predicted_demand());

        let too_early = adjuster.score_events(&feed, &store, "staples", day(8), None, &model);
        assert!(too_early.is_empty());
    }

    #[test]
    fn scores_at_or_below_gate_leave_forecast_untouched() {
        let store = store_at("s1", 19.0760, 72.8777);
        let exam = Event::new("x1", "boards", EventType::Exam, store.location, day(10), day(10), 2.0);
        let feed = EventFeed::new(vec![exam]).unwrap();
        let adjuster = EventAdjuster::default();
        let scored = adjuster.score_events(&feed, &store, "snacks", day(10), None, &ImpactModel::default());
        assert!(scored[0].impact.score <= 0.6);
        assert_eq!(adjuster.adjust_forecast(&base_forecast(), &scored), base_forecast());
    }

    #[test]
    fn recorded_outcomes_move_the_estimate() {
        let model = ImpactModel::default();
        let store = store_at("s1", 19.0760, 72.8777);
        let event = Event::new("m", "match", EventType::CricketMatch, store.location, day(1), day(1), 2.0);
        let before = model.expected_multiplier(&event, EventPhase::During, "snacks", 0.2, None);
        for _ in 0..6 {
            model.record_outcome(EventType::CricketMatch, EventPhase::During, "snacks", 0.3, 1.0).unwrap();
        }
        let after = model.expected_multiplier(&event, EventPhase::During, "snacks", 0.2, None);
        assert!(after < before);
        assert_relative_eq!(after, (1.9 * 3.0 + 6.0) / 9.0, epsilon = 1e-9);
        assert!(model
            .record_outcome(EventType::CricketMatch, EventPhase::During, "snacks", 0.3, -1.0)
            .is_err());
    }

    #[test]
    fn feed_rejects_inverted_windows() {
        let bad = Event::new("e", "x", EventType::Rally, GeoPoint::new(0.0, 0.0), day(5), day(4), 1.0);
        assert!(EventFeed::new(vec![bad]).is_err());
    }
}
