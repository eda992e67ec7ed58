//! Read-only reference data owned outside the forecasting core
//!
//! Festival calendar, monsoon phase schedule and cricket fixtures. Each source
//! declares how far ahead it is valid; lookups past that horizon answer with
//! `None` so that callers can fall back to neutral defaults.

use chrono::NaiveDate;
use demand_math::GeoPoint;
use serde::{Deserialize, Serialize};

/// One festival occurrence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FestivalDay {
    pub name: String,
    pub date: NaiveDate,
    /// States observing the festival; empty means nationwide
    #[serde(default)]
    pub states: Vec<String>,
}

impl FestivalDay {
    pub fn observed_in(&self, state: &str) -> bool {
        self.states.is_empty() || self.states.iter().any(|s| s.eq_ignore_ascii_case(state))
    }
}

/// Festival calendar keyed by date and region
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FestivalCalendar {
    pub days: Vec<FestivalDay>,
    /// Last date the calendar is known to be complete for
    pub valid_through: Option<NaiveDate>,
}

impl FestivalCalendar {
    pub fn new(days: Vec<FestivalDay>, valid_through: Option<NaiveDate>) -> Self {
        Self { days, valid_through }
    }

    pub fn covers(&self, date: NaiveDate) -> bool {
        self.valid_through.map_or(true, |limit| date <= limit)
    }

    /// Festivals observed on `date` in `state`, or `None` past the horizon
    pub fn festivals_on(&self, date: NaiveDate, state: &str) -> Option<Vec<String>> {
        if !self.covers(date) {
            return None;
        }
        let mut names: Vec<String> = self
            .days
            .iter()
            .filter(|d| d.date == date && d.observed_in(state))
            .map(|d| d.name.clone())
            .collect();
        names.sort();
        names.dedup();
        Some(names)
    }
}

/// Monsoon phase of a region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonsoonPhase {
    #[default]
    Dry,
    PreMonsoon,
    Onset,
    Active,
    Withdrawal,
}

impl MonsoonPhase {
    /// Ordinal encoding used in feature vectors
    pub fn ordinal(&self) -> f64 {
        match self {
            MonsoonPhase::Dry => 0.0,
            MonsoonPhase::PreMonsoon => 1.0,
            MonsoonPhase::Onset => 2.0,
            MonsoonPhase::Active => 3.0,
            MonsoonPhase::Withdrawal => 4.0,
        }
    }

    /// Rain-bearing phases
    pub fn is_wet(&self) -> bool {
        matches!(self, MonsoonPhase::Onset | MonsoonPhase::Active)
    }
}

/// A contiguous monsoon phase window for one state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonsoonWindow {
    /// State name, or `"*"` for every state
    pub state: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub phase: MonsoonPhase,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonsoonSchedule {
    pub windows: Vec<MonsoonWindow>,
    pub valid_through: Option<NaiveDate>,
}

impl MonsoonSchedule {
    pub fn new(windows: Vec<MonsoonWindow>, valid_through: Option<NaiveDate>) -> Self {
        Self {
            windows,
            valid_through,
        }
    }

    /// Phase on `date` in `state`; a state-specific window beats a wildcard one
    pub fn phase_on(&self, date: NaiveDate, state: &str) -> Option<MonsoonPhase> {
        if self.valid_through.is_some_and(|limit| date > limit) {
            return None;
        }
        let in_window = |w: &&MonsoonWindow| w.start <= date && date <= w.end;
        let specific = self
            .windows
            .iter()
            .filter(in_window)
            .find(|w| w.state.eq_ignore_ascii_case(state));
        let wildcard = self.windows.iter().filter(in_window).find(|w| w.state == "*");
        Some(specific.or(wildcard).map_or(MonsoonPhase::Dry, |w| w.phase))
    }
}

/// A scheduled cricket match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CricketFixture {
    pub name: String,
    pub date: NaiveDate,
    pub involves_india: bool,
    /// Stadium location, when the match is played in India
    pub venue: Option<GeoPoint>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CricketFixtures {
    pub fixtures: Vec<CricketFixture>,
    pub valid_through: Option<NaiveDate>,
}

impl CricketFixtures {
    pub fn new(fixtures: Vec<CricketFixture>, valid_through: Option<NaiveDate>) -> Self {
        Self {
            fixtures,
            valid_through,
        }
    }

    /// Whether India plays on `date`; `None` past the fixture horizon
    pub fn india_plays_on(&self, date: NaiveDate) -> Option<bool> {
        if self.valid_through.is_some_and(|limit| date > limit) {
            return None;
        }
        Some(self.fixtures.iter().any(|f| f.date == date && f.involves_india))
    }
}
