//! Context feature builder
//!
//! Pure mapping `(store, date) -> ContextFeatures`. Missing or expired
//! reference data never fails the build: the affected indicators take their
//! neutral default and the gap is listed in [`ContextFeatures::unavailable`].

use crate::data::Store;
use crate::feeds::ReferenceSnapshot;
use crate::reference::MonsoonPhase;
use chrono::{Datelike, NaiveDate, Weekday};

/// Reference sources the builder consults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    Festivals,
    Monsoon,
    Cricket,
}

/// Calendar/geo indicators for one store on one date
#[derive(Debug, Clone, PartialEq)]
pub struct ContextFeatures {
    pub date: NaiveDate,
    pub day_of_week: Weekday,
    /// Festivals observed in the store's state on this date
    pub festivals: Vec<String>,
    pub monsoon_phase: MonsoonPhase,
    pub salary_cycle: bool,
    pub cricket_match: bool,
    /// Reference sources that had no data for this date
    pub unavailable: Vec<ReferenceKind>,
}

/// Names of the entries of [`ContextFeatures::to_vector`], in order
pub const FEATURE_NAMES: [&str; 9] = [
    "day_of_week",
    "weekend",
    "festival",
    "monsoon_phase",
    "monsoon_wet",
    "salary_cycle",
    "cricket_match",
    "month",
    "day_of_month",
];

pub const FEATURE_COUNT: usize = FEATURE_NAMES.len();

/// Day-of-month in [1, 5] or [25, 31]
pub fn is_salary_cycle_day(date: NaiveDate) -> bool {
    let day = date.day();
    day <= 5 || day >= 25
}

impl ContextFeatures {
    /// Indicators with every reference-driven flag at its default
    pub fn neutral(date: NaiveDate) -> Self {
        Self {
            date,
            day_of_week: date.weekday(),
            festivals: Vec::new(),
            monsoon_phase: MonsoonPhase::Dry,
            salary_cycle: is_salary_cycle_day(date),
            cricket_match: false,
            unavailable: Vec::new(),
        }
    }

    pub fn festival_active(&self) -> bool {
        !self.festivals.is_empty()
    }

    /// Monday = 0 .. Sunday = 6
    pub fn weekday_index(&self) -> usize {
        self.day_of_week.num_days_from_monday() as usize
    }

    /// January = 0 .. December = 11
    pub fn month_index(&self) -> usize {
        self.date.month0() as usize
    }

    /// Fixed-shape numeric encoding, see [`FEATURE_NAMES`]
    pub fn to_vector(&self) -> [f64; FEATURE_COUNT] {
        let flag = |b: bool| if b { 1.0 } else { 0.0 };
        [
            self.weekday_index() as f64,
            flag(matches!(self.day_of_week, Weekday::Sat | Weekday::Sun)),
            flag(self.festival_active()),
            self.monsoon_phase.ordinal(),
            flag(self.monsoon_phase.is_wet()),
            flag(self.salary_cycle),
            flag(self.cricket_match),
            self.month_index() as f64,
            self.date.day() as f64,
        ]
    }
}

/// Builds [`ContextFeatures`] from one immutable reference snapshot
#[derive(Debug, Clone, Default)]
pub struct ContextFeatureBuilder {
    reference: ReferenceSnapshot,
}

impl ContextFeatureBuilder {
    pub fn new(reference: ReferenceSnapshot) -> Self {
        Self { reference }
    }

    pub fn reference(&self) -> &ReferenceSnapshot {
        &self.reference
    }

    pub fn build(&self, store: &Store, date: NaiveDate) -> ContextFeatures {
        let state = store.region.state.as_str();
        let mut features = ContextFeatures::neutral(date);

        match self
            .reference
            .festivals
            .as_ref()
            .and_then(|c| c.festivals_on(date, state))
        {
            Some(names) => features.festivals = names,
            None => features.unavailable.push(ReferenceKind::Festivals),
        }

        match self
            .reference
            .monsoon
            .as_ref()
            .and_then(|m| m.phase_on(date, state))
        {
            Some(phase) => features.monsoon_phase = phase,
            None => features.unavailable.push(ReferenceKind::Monsoon),
        }

        match self
            .reference
            .cricket
            .as_ref()
            .and_then(|c| c.india_plays_on(date))
        {
            Some(plays) => features.cricket_match = plays,
            None => features.unavailable.push(ReferenceKind::Cricket),
        }

        features
    }

    /// Features for every date in `[start, end]`
    pub fn build_range(&self, store: &Store, start: NaiveDate, end: NaiveDate) -> Vec<ContextFeatures> {
        start
            .iter_days()
            .take_while(|d| *d <= end)
            .map(|d| self.build(store, d))
            .collect()
    }
}
