//! Collection cursor: the time window and dedup marker carried between runs

use std::cmp::Ordering;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Whether new runs extend the window into the future or backfill the past
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Forward => write!(f, "forward"),
            Direction::Backward => write!(f, "backward"),
        }
    }
}

/// Composite `(timestamp, insert_id)` key, ordered lexicographically
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeenKey {
    pub timestamp: DateTime<Utc>,
    pub insert_id: String,
}

impl SeenKey {
    pub fn new(timestamp: DateTime<Utc>, insert_id: impl Into<String>) -> Self {
        Self {
            timestamp,
            insert_id: insert_id.into(),
        }
    }
}

impl Ord for SeenKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.insert_id.cmp(&other.insert_id))
    }
}

impl PartialOrd for SeenKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Persisted form of the cursor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSnapshot {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub direction: Direction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<SeenKey>,
    pub updated_at: DateTime<Utc>,
}

/// Half-open time range `[start, end)` fetched by one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl FetchWindow {
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.start <= timestamp && timestamp < self.end
    }
}

/// In-flight cursor owned by exactly one collection run
#[derive(Debug, Clone)]
pub struct CollectionState {
    direction: Direction,
    fetch: FetchWindow,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    last_seen: Option<SeenKey>,
    newest_accepted: Option<DateTime<Utc>>,
    accepted: u64,
}

impl CollectionState {
    /// Start a run and compute the window it must fetch.
    ///
    /// - no prior cursor: `[now - lookback, now)`
    /// - forward: `[prior.window_end, now)`
    /// - backward: `[prior.window_start - lookback, prior.window_start)`
    pub fn begin(
        direction: Direction,
        lookback: Duration,
        prior: Option<CollectionSnapshot>,
        now: DateTime<Utc>,
    ) -> Self {
        let lookback = TimeDelta::from_std(lookback).unwrap_or(TimeDelta::MAX);
        let back_from = |instant: DateTime<Utc>| {
            instant
                .checked_sub_signed(lookback)
                .unwrap_or(DateTime::<Utc>::MIN_UTC)
        };

        let Some(prior) = prior else {
            let fetch = FetchWindow {
                start: back_from(now),
                end: now,
            };
            return Self::from_parts(direction, fetch, fetch.start, fetch.end, None);
        };

        let fetch = match direction {
            // A prior end in the future (clock skew) yields an empty window
            Direction::Forward => FetchWindow {
                start: prior.window_end,
                end: now.max(prior.window_end),
            },
            Direction::Backward => FetchWindow {
                start: back_from(prior.window_start),
                end: prior.window_start,
            },
        };

        Self::from_parts(
            direction,
            fetch,
            prior.window_start.min(fetch.start),
            prior.window_end.max(fetch.end),
            prior.last_seen,
        )
    }

    fn from_parts(
        direction: Direction,
        fetch: FetchWindow,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        last_seen: Option<SeenKey>,
    ) -> Self {
        Self {
            direction,
            fetch,
            window_start,
            window_end,
            last_seen,
            newest_accepted: None,
            accepted: 0,
        }
    }

    pub fn window(&self) -> FetchWindow {
        self.fetch
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn last_seen(&self) -> Option<&SeenKey> {
        self.last_seen.as_ref()
    }

    /// Records accepted so far in this run
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    /// False only for the exact boundary record already claimed.
    ///
    /// Window bounds are enforced by the query, not here.
    pub fn should_accept(&self, timestamp: DateTime<Utc>, insert_id: &str) -> bool {
        match &self.last_seen {
            Some(seen) => !(seen.timestamp == timestamp && seen.insert_id == insert_id),
            None => true,
        }
    }

    /// Advance the cursor past an emitted record. Never rewinds.
    pub fn accept(&mut self, timestamp: DateTime<Utc>, insert_id: &str) {
        let candidate = SeenKey::new(timestamp, insert_id);
        let advance = match &self.last_seen {
            Some(seen) => candidate > *seen,
            None => true,
        };
        if advance {
            self.last_seen = Some(candidate);
        }

        self.window_end = self.window_end.max(timestamp);
        self.newest_accepted = Some(match self.newest_accepted {
            Some(newest) => newest.max(timestamp),
            None => timestamp,
        });
        self.accepted += 1;
    }

    /// Progress snapshot taken mid-run, after a fully emitted page.
    ///
    /// The window only reaches the newest accepted record, so a crash resumes
    /// from there. Backward runs never checkpoint.
    pub fn checkpoint(&self, now: DateTime<Utc>) -> Option<CollectionSnapshot> {
        if self.direction == Direction::Backward {
            return None;
        }
        let newest = self.newest_accepted?;

        Some(CollectionSnapshot {
            window_start: self.window_start,
            window_end: newest.max(self.fetch.start),
            direction: self.direction,
            last_seen: self.last_seen.clone(),
            updated_at: now,
        })
    }

    /// Finalize the run into a snapshot for persistence
    pub fn end(self, now: DateTime<Utc>) -> CollectionSnapshot {
        CollectionSnapshot {
            window_start: self.window_start,
            window_end: self.window_end,
            direction: self.direction,
            last_seen: self.last_seen,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 6, h, m, s).unwrap()
    }

    const DAY: Duration = Duration::from_secs(24 * 3600);
    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_first_run_uses_lookback() {
        let now = at(12, 0, 0);
        let state = CollectionState::begin(Direction::Forward, HOUR, None, now);

        assert_eq!(state.window(), FetchWindow { start: at(11, 0, 0), end: now });
        assert!(state.last_seen().is_none());
    }

    #[test]
    fn test_forward_resume_starts_at_prior_end() {
        let prior = CollectionSnapshot {
            window_start: at(1, 0, 0),
            window_end: at(10, 0, 0),
            direction: Direction::Forward,
            last_seen: Some(SeenKey::new(at(9, 59, 59), "abc")),
            updated_at: at(10, 0, 0),
        };
        let state = CollectionState::begin(Direction::Forward, DAY, Some(prior), at(12, 0, 0));

        assert_eq!(state.window(), FetchWindow { start: at(10, 0, 0), end: at(12, 0, 0) });
        assert_eq!(state.last_seen().unwrap().insert_id, "abc");

        let snapshot = state.end(at(12, 0, 1));
        assert_eq!(snapshot.window_start, at(1, 0, 0));
        assert_eq!(snapshot.window_end, at(12, 0, 0));
    }

    #[test]
    fn test_forward_resume_with_future_prior_is_empty() {
        let prior = CollectionSnapshot {
            window_start: at(1, 0, 0),
            window_end: at(13, 0, 0),
            direction: Direction::Forward,
            last_seen: None,
            updated_at: at(13, 0, 0),
        };
        let state = CollectionState::begin(Direction::Forward, DAY, Some(prior), at(12, 0, 0));
        assert!(state.window().is_empty());
    }

    #[test]
    fn test_backward_extends_into_the_past() {
        let prior = CollectionSnapshot {
            window_start: at(10, 0, 0),
            window_end: at(12, 0, 0),
            direction: Direction::Backward,
            last_seen: None,
            updated_at: at(12, 0, 0),
        };
        let state = CollectionState::begin(Direction::Backward, HOUR, Some(prior), at(18, 0, 0));

        assert_eq!(state.window(), FetchWindow { start: at(9, 0, 0), end: at(10, 0, 0) });
        assert!(state.checkpoint(at(18, 0, 0)).is_none());

        let snapshot = state.end(at(18, 0, 0));
        assert_eq!(snapshot.window_start, at(9, 0, 0));
        assert_eq!(snapshot.window_end, at(12, 0, 0));
    }

    #[test]
    fn test_should_accept_rejects_only_boundary_key() {
        let prior = CollectionSnapshot {
            window_start: at(1, 0, 0),
            window_end: at(10, 0, 0),
            direction: Direction::Forward,
            last_seen: Some(SeenKey::new(at(10, 0, 0), "b")),
            updated_at: at(10, 0, 0),
        };
        let state = CollectionState::begin(Direction::Forward, DAY, Some(prior), at(12, 0, 0));

        assert!(!state.should_accept(at(10, 0, 0), "b"));
        assert!(state.should_accept(at(10, 0, 0), "a"));
        assert!(state.should_accept(at(10, 0, 0), "c"));
        assert!(state.should_accept(at(11, 0, 0), "b"));
    }

    #[test]
    fn test_accept_keeps_greatest_key() {
        let mut state = CollectionState::begin(Direction::Forward, HOUR, None, at(12, 0, 0));

        state.accept(at(11, 30, 0), "b");
        state.accept(at(11, 30, 0), "a");
        assert_eq!(state.last_seen(), Some(&SeenKey::new(at(11, 30, 0), "b")));

        state.accept(at(11, 45, 0), "a");
        assert_eq!(state.last_seen(), Some(&SeenKey::new(at(11, 45, 0), "a")));
        assert_eq!(state.accepted(), 3);
    }

    #[test]
    fn test_out_of_range_record_does_not_rewind() {
        let mut state = CollectionState::begin(Direction::Forward, HOUR, None, at(12, 0, 0));
        state.accept(at(11, 30, 0), "x");
        state.accept(at(5, 0, 0), "y");

        assert_eq!(state.last_seen().unwrap().insert_id, "x");
        let snapshot = state.end(at(12, 0, 0));
        assert_eq!(snapshot.window_start, at(11, 0, 0));
        assert_eq!(snapshot.window_end, at(12, 0, 0));
    }

    #[test]
    fn test_checkpoint_stops_at_newest_record() {
        let mut state = CollectionState::begin(Direction::Forward, HOUR, None, at(12, 0, 0));
        assert!(state.checkpoint(at(12, 0, 0)).is_none());

        state.accept(at(11, 10, 0), "a");
        state.accept(at(11, 20, 0), "b");

        let checkpoint = state.checkpoint(at(12, 0, 0)).unwrap();
        assert_eq!(checkpoint.window_start, at(11, 0, 0));
        assert_eq!(checkpoint.window_end, at(11, 20, 0));
        assert_eq!(checkpoint.last_seen, Some(SeenKey::new(at(11, 20, 0), "b")));
    }

    #[test]
    fn test_snapshot_json_shape() {
        let snapshot = CollectionSnapshot {
            window_start: at(1, 0, 0),
            window_end: at(2, 0, 0),
            direction: Direction::Backward,
            last_seen: None,
            updated_at: at(2, 0, 0),
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["direction"], "backward");
        assert!(json.get("last_seen").is_none());
    }
}
