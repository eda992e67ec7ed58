//! Timeout-bounded reference-data feeds with last-known-good fallback
//!
//! A refresh runs the fetch on its own thread and waits at most the configured
//! timeout. Whatever happens to the fetch, readers keep the previous snapshot
//! and the forecast path never waits on an external collaborator.

use crate::config::FeedConfig;
use crate::error::{ForecastError, Result};
use crate::events::EventFeed;
use crate::reference::{CricketFixtures, FestivalCalendar, MonsoonSchedule};
use parking_lot::RwLock;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Outcome of one refresh attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    /// New data was fetched
    Refreshed,
    /// Fetch failed or timed out; the previous snapshot is still served
    Stale,
    /// Fetch failed and there is nothing cached
    Unavailable,
}

struct FeedEntry<T> {
    value: Arc<T>,
    fetched_at: Instant,
}

/// Last-known-good cache of one reference feed
pub struct FeedCache<T> {
    name: String,
    current: RwLock<Option<FeedEntry<T>>>,
}

impl<T: Send + Sync + 'static> FeedCache<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            current: RwLock::new(None),
        }
    }

    /// Cache pre-seeded with a value fetched now
    pub fn with_value(name: impl Into<String>, value: T) -> Self {
        let cache = Self::new(name);
        cache.store(value);
        cache
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self, value: T) {
        *self.current.write() = Some(FeedEntry {
            value: Arc::new(value),
            fetched_at: Instant::now(),
        });
    }

    pub fn current(&self) -> Option<Arc<T>> {
        self.current.read().as_ref().map(|e| Arc::clone(&e.value))
    }

    pub fn age(&self) -> Option<Duration> {
        self.current.read().as_ref().map(|e| e.fetched_at.elapsed())
    }

    /// True when nothing is cached or the cached copy is older than `max_age`
    pub fn is_stale(&self, max_age: Duration) -> bool {
        self.age().map_or(true, |age| age > max_age)
    }

    fn fallback_status(&self) -> FeedStatus {
        if self.current.read().is_some() {
            FeedStatus::Stale
        } else {
            FeedStatus::Unavailable
        }
    }

    /// Run `fetch` and wait at most `timeout` for it.
    ///
    /// A fetch that overruns keeps running detached; its late result is
    /// dropped.
    pub fn refresh<F>(&self, fetch: F, timeout: Duration) -> FeedStatus
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let spawned = thread::Builder::new()
            .name(format!("feed-{}", self.name))
            .spawn(move || {
                let _ = tx.send(fetch());
            });

        if let Err(e) = spawned {
            warn!(feed = %self.name, error = %e, "Could not start feed fetch; serving cached copy");
            return self.fallback_status();
        }

        match rx.recv_timeout(timeout) {
            Ok(Ok(value)) => {
                self.store(value);
                info!(feed = %self.name, "Reference feed refreshed");
                FeedStatus::Refreshed
            }
            Ok(Err(e)) => {
                warn!(feed = %self.name, error = %e, "Feed fetch failed; serving last known good copy");
                self.fallback_status()
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    feed = %self.name,
                    timeout_ms = timeout.as_millis() as u64,
                    "Feed fetch timed out; serving last known good copy"
                );
                self.fallback_status()
            }
            Err(RecvTimeoutError::Disconnected) => {
                warn!(feed = %self.name, "Feed fetch aborted; serving last known good copy");
                self.fallback_status()
            }
        }
    }
}

/// External provider of reference data
pub trait ReferenceSource: Send + Sync {
    fn festival_calendar(&self) -> Result<FestivalCalendar>;
    fn monsoon_schedule(&self) -> Result<MonsoonSchedule>;
    fn cricket_fixtures(&self) -> Result<CricketFixtures>;
    fn local_events(&self) -> Result<EventFeed>;
}

/// Immutable view of every reference feed for one request
#[derive(Debug, Clone, Default)]
pub struct ReferenceSnapshot {
    pub festivals: Option<Arc<FestivalCalendar>>,
    pub monsoon: Option<Arc<MonsoonSchedule>>,
    pub cricket: Option<Arc<CricketFixtures>>,
    pub events: Option<Arc<EventFeed>>,
}

impl ReferenceSnapshot {
    pub fn new(
        festivals: FestivalCalendar,
        monsoon: MonsoonSchedule,
        cricket: CricketFixtures,
        events: EventFeed,
    ) -> Self {
        Self {
            festivals: Some(Arc::new(festivals)),
            monsoon: Some(Arc::new(monsoon)),
            cricket: Some(Arc::new(cricket)),
            events: Some(Arc::new(events)),
        }
    }
}

/// Status of each feed after [`ReferenceFeeds::refresh_all`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshReport {
    pub festivals: FeedStatus,
    pub monsoon: FeedStatus,
    pub cricket: FeedStatus,
    pub events: FeedStatus,
}

/// All reference feeds consumed by the core
pub struct ReferenceFeeds {
    config: FeedConfig,
    festivals: FeedCache<FestivalCalendar>,
    monsoon: FeedCache<MonsoonSchedule>,
    cricket: FeedCache<CricketFixtures>,
    events: FeedCache<EventFeed>,
}

impl ReferenceFeeds {
    pub fn new(config: FeedConfig) -> Self {
        Self {
            config,
            festivals: FeedCache::new("festival_calendar"),
            monsoon: FeedCache::new("monsoon_schedule"),
            cricket: FeedCache::new("cricket_fixtures"),
            events: FeedCache::new("local_events"),
        }
    }

    /// Feeds pre-loaded from a snapshot
    pub fn from_snapshot(config: FeedConfig, snapshot: ReferenceSnapshot) -> Self {
        let feeds = Self::new(config);
        if let Some(v) = snapshot.festivals {
            feeds.festivals.store((*v).clone());
        }
        if let Some(v) = snapshot.monsoon {
            feeds.monsoon.store((*v).clone());
        }
        if let Some(v) = snapshot.cricket {
            feeds.cricket.store((*v).clone());
        }
        if let Some(v) = snapshot.events {
            feeds.events.store((*v).clone());
        }
        feeds
    }

    /// Refresh every feed from `source`, each bounded by the fetch timeout
    pub fn refresh_all(&self, source: Arc<dyn ReferenceSource>) -> RefreshReport {
        let timeout = self.config.fetch_timeout();
        let s = Arc::clone(&source);
        let festivals = self.festivals.refresh(move || s.festival_calendar(), timeout);
        let s = Arc::clone(&source);
        let monsoon = self.monsoon.refresh(move || s.monsoon_schedule(), timeout);
        let s = Arc::clone(&source);
        let cricket = self.cricket.refresh(move || s.cricket_fixtures(), timeout);
        let s = Arc::clone(&source);
        let events = self.events.refresh(move || s.local_events(), timeout);

        RefreshReport {
            festivals,
            monsoon,
            cricket,
            events,
        }
    }

    /// Current view of all feeds; stale feeds are served with a warning
    pub fn snapshot(&self) -> ReferenceSnapshot {
        let event_max_age = Duration::from_secs(self.config.event_feed_max_age_secs);
        let calendar_max_age = Duration::from_secs(self.config.calendar_max_age_secs);

        if self.events.current().is_some() && self.events.is_stale(event_max_age) {
            warn!(feed = self.events.name(), "Local event feed is older than its refresh interval");
        }
        for (name, stale) in [
            (self.festivals.name(), self.festivals.current().is_some() && self.festivals.is_stale(calendar_max_age)),
            (self.cricket.name(), self.cricket.current().is_some() && self.cricket.is_stale(calendar_max_age)),
        ] {
            if stale {
                debug!(feed = name, "Serving stale reference feed");
            }
        }

        ReferenceSnapshot {
            festivals: self.festivals.current(),
            monsoon: self.monsoon.current(),
            cricket: self.cricket.current(),
            events: self.events.current(),
        }
    }
}

/// Convenience error for sources that have nothing to offer
pub fn feed_unavailable(feed: &str) -> ForecastError {
    ForecastError::FeedError(format!("{} feed unavailable", feed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_stores_value() {
        let cache: FeedCache<u32> = FeedCache::new("numbers");
        let status = cache.refresh(|| Ok(7), Duration::from_secs(1));
        assert_eq!(status, FeedStatus::Refreshed);
        assert_eq!(cache.current().as_deref(), Some(&7));
    }

    #[test]
    fn failure_keeps_last_known_good() {
        let cache = FeedCache::with_value("numbers", 3u32);
        let status = cache.refresh(|| Err(feed_unavailable("numbers")), Duration::from_secs(1));
        assert_eq!(status, FeedStatus::Stale);
        assert_eq!(cache.current().as_deref(), Some(&3));
    }

    #[test]
    fn failure_without_cache_is_unavailable() {
        let cache: FeedCache<u32> = FeedCache::new("numbers");
        let status = cache.refresh(|| Err(feed_unavailable("numbers")), Duration::from_secs(1));
        assert_eq!(status, FeedStatus::Unavailable);
        assert!(cache.current().is_none());
    }

    #[test]
    fn timeout_does_not_block_and_keeps_cache() {
        let cache = FeedCache::with_value("slow", 1u32);
        let started = Instant::now();
        let status = cache.refresh(
            || {
                thread::sleep(Duration::from_millis(500));
                Ok(2)
            },
            Duration::from_millis(20),
        );
        assert_eq!(status, FeedStatus::Stale);
        assert!(started.elapsed() < Duration::from_millis(400));
        assert_eq!(cache.current().as_deref(), Some(&1));
    }

    struct PartialSource;

    impl ReferenceSource for PartialSource {
        fn festival_calendar(&self) -> Result<FestivalCalendar> {
            Ok(FestivalCalendar::default())
        }
        fn monsoon_schedule(&self) -> Result<MonsoonSchedule> {
            Err(feed_unavailable("monsoon"))
        }
        fn cricket_fixtures(&self) -> Result<CricketFixtures> {
            Ok(CricketFixtures::default())
        }
        fn local_events(&self) -> Result<EventFeed> {
            thread::sleep(Duration::from_millis(300));
            Ok(EventFeed::default())
        }
    }

    #[test]
    fn refresh_all_reports_each_feed() {
        let config = FeedConfig {
            fetch_timeout_ms: 50,
            ..FeedConfig::default()
        };
        let feeds = ReferenceFeeds::new(config);
        let report = feeds.refresh_all(Arc::new(PartialSource));
        assert_eq!(report.festivals, FeedStatus::Refreshed);
        assert_eq!(report.monsoon, FeedStatus::Unavailable);
        assert_eq!(report.cricket, FeedStatus::Refreshed);
        assert_eq!(report.events, FeedStatus::Unavailable);

        let snapshot = feeds.snapshot();
        assert!(snapshot.festivals.is_some());
        assert!(snapshot.monsoon.is_none());
        assert!(snapshot.events.is_none());
    }

    #[test]
    fn staleness_tracks_age() {
        let cache = FeedCache::with_value("numbers", 1u32);
        assert!(!cache.is_stale(Duration::from_secs(60)));
        assert!(FeedCache::<u32>::new("empty").is_stale(Duration::from_secs(60)));
    }
}
