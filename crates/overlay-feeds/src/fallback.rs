//! Provenance labels and last-known-good fallback for fetched values.

use crate::error::FeedError;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// A value together with where it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Sourced<T> {
    Live { value: T },
    Cached { value: T, age_secs: f64 },
    Synthetic { value: T },
}

impl<T> Sourced<T> {
    pub fn value(&self) -> &T {
        match self {
            Sourced::Live { value } | Sourced::Cached { value, .. } | Sourced::Synthetic { value } => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Sourced::Live { value } | Sourced::Cached { value, .. } | Sourced::Synthetic { value } => value,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Sourced::Live { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Sourced::Live { .. } => "live",
            Sourced::Cached { .. } => "cached",
            Sourced::Synthetic { .. } => "synthetic",
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Sourced<U> {
        match self {
            Sourced::Live { value } => Sourced::Live { value: f(value) },
            Sourced::Cached { value, age_secs } => Sourced::Cached {
                value: f(value),
                age_secs,
            },
            Sourced::Synthetic { value } => Sourced::Synthetic { value: f(value) },
        }
    }
}

/// Most recent successful value of one feed.
#[derive(Debug, Clone)]
pub struct LastKnownGood<T> {
    latest: Option<(T, DateTime<Utc>)>,
    max_age: Option<Duration>,
}

impl<T: Clone> LastKnownGood<T> {
    /// Values older than `max_age` are no longer offered; `None` keeps them forever.
    pub fn new(max_age: Option<Duration>) -> Self {
        Self { latest: None, max_age }
    }

    pub fn store(&mut self, value: T, now: DateTime<Utc>) {
        self.latest = Some((value, now));
    }

    pub fn cached(&self, now: DateTime<Utc>) -> Option<Sourced<T>> {
        let (value, stored_at) = self.latest.as_ref()?;
        let age = now - *stored_at;
        if self.max_age.is_some_and(|max| age > max) {
            return None;
        }
        Some(Sourced::Cached {
            value: value.clone(),
            age_secs: age.num_milliseconds().max(0) as f64 / 1000.0,
        })
    }

    /// Fold a fetch outcome into a labelled value. Failures fall back to the
    /// cached value, then to `synthetic`; the error never escapes.
    pub fn resolve<F>(&mut self, feed: &str, outcome: Result<T, FeedError>, now: DateTime<Utc>, synthetic: F) -> Option<Sourced<T>>
    where
        F: FnOnce() -> Option<T>,
    {
        match outcome {
            Ok(value) => {
                self.store(value.clone(), now);
                Some(Sourced::Live { value })
            }
            Err(err) => {
                if let Some(cached) = self.cached(now) {
                    tracing::warn!("{} fetch failed, using cached value: {}", feed, err);
                    return Some(cached);
                }
                let fallback = synthetic().map(|value| Sourced::Synthetic { value });
                if fallback.is_some() {
                    tracing::warn!("{} fetch failed, using synthetic value: {}", feed, err);
                } else {
                    tracing::warn!("{} fetch failed with nothing to fall back on: {}", feed, err);
                }
                fallback
            }
        }
    }
}

impl<T: Clone> Default for LastKnownGood<T> {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn success_is_live_and_remembered() {
        let mut lkg = LastKnownGood::default();
        let sourced = lkg.resolve("metar", Ok(5), t0(), || None).unwrap();
        assert!(sourced.is_live());
        let cached = lkg.cached(t0() + Duration::seconds(30)).unwrap();
        assert_eq!(cached, Sourced::Cached { value: 5, age_secs: 30.0 });
    }

    #[test]
    fn failure_falls_back_to_cached_then_synthetic() {
        let mut lkg = LastKnownGood::new(Some(Duration::minutes(5)));
        lkg.store(1200.0, t0());

        let cached = lkg
            .resolve("elevation", Err(FeedError::NotConfigured), t0() + Duration::minutes(1), || Some(0.0))
            .unwrap();
        assert_eq!(cached.label(), "cached");
        assert_eq!(*cached.value(), 1200.0);

        let synthetic = lkg
            .resolve("elevation", Err(FeedError::NotConfigured), t0() + Duration::minutes(6), || Some(0.0))
            .unwrap();
        assert_eq!(synthetic, Sourced::Synthetic { value: 0.0 });
    }

    #[test]
    fn nothing_to_offer_yields_none() {
        let mut lkg: LastKnownGood<String> = LastKnownGood::default();
        assert!(lkg.resolve("radar", Err(FeedError::NotConfigured), t0(), || None).is_none());
    }

    #[test]
    fn map_keeps_label() {
        let cached = Sourced::Cached { value: 2, age_secs: 1.5 };
        assert_eq!(cached.map(|v| v * 10), Sourced::Cached { value: 20, age_secs: 1.5 });
    }
}
