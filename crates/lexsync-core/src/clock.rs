//! Hybrid logical clock.
//!
//! Timestamps combine a wall clock reading with a logical counter so that a
//! single clock instance never issues the same or a smaller timestamp twice,
//! even when the wall clock stalls or jumps backwards.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// A point in hybrid logical time.
///
/// Ordered by `wall_clock`, then `counter`. Commits break remaining ties
/// with their id (see [`Commit::compare_key`](crate::Commit::compare_key)).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HybridTimestamp {
    pub wall_clock: DateTime<Utc>,
    pub counter: i64,
}

impl HybridTimestamp {
    pub fn new(wall_clock: DateTime<Utc>, counter: i64) -> Self {
        Self {
            wall_clock,
            counter,
        }
    }

    /// Build a timestamp from unix milliseconds. Out-of-range values clamp
    /// to the epoch.
    pub fn from_millis(millis: i64, counter: i64) -> Self {
        Self::new(millis_to_datetime(millis), counter)
    }

    /// The wall clock component as unix milliseconds.
    pub fn wall_millis(&self) -> i64 {
        self.wall_clock.timestamp_millis()
    }
}

impl fmt::Display for HybridTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.wall_clock.to_rfc3339(), self.counter)
    }
}

/// Convert unix milliseconds to a UTC datetime, clamping invalid values to
/// the epoch.
pub fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or_default()
}

/// Source of wall clock readings.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock, truncated to millisecond precision so that the wall
/// clock component survives a round trip through a [`SyncState`](crate::SyncState).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> DateTime<Utc> {
        millis_to_datetime(Utc::now().timestamp_millis())
    }
}

/// A time source driven by the caller.
///
/// Readings are served from a queue of scripted values; once the queue is
/// empty the last reading repeats. Useful for tests that need stalled or
/// backwards-moving clocks.
#[derive(Debug)]
pub struct ManualTimeSource {
    state: Mutex<ManualState>,
}

#[derive(Debug)]
struct ManualState {
    current: DateTime<Utc>,
    queued: VecDeque<DateTime<Utc>>,
}

impl ManualTimeSource {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            state: Mutex::new(ManualState {
                current: start,
                queued: VecDeque::new(),
            }),
        }
    }

    pub fn at_millis(millis: i64) -> Self {
        Self::new(millis_to_datetime(millis))
    }

    /// Set the reading returned from now on.
    pub fn set(&self, now: DateTime<Utc>) {
        let mut state = self.state.lock();
        state.queued.clear();
        state.current = now;
    }

    pub fn set_millis(&self, millis: i64) {
        self.set(millis_to_datetime(millis));
    }

    /// Move the current reading forward (or backward, for negative values).
    pub fn advance_millis(&self, millis: i64) {
        let mut state = self.state.lock();
        let next = state.current.timestamp_millis().saturating_add(millis);
        state.current = millis_to_datetime(next);
    }

    /// Queue readings to be returned one per call.
    pub fn push_readings(&self, readings: impl IntoIterator<Item = DateTime<Utc>>) {
        self.state.lock().queued.extend(readings);
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> DateTime<Utc> {
        let mut state = self.state.lock();
        if let Some(next) = state.queued.pop_front() {
            state.current = next;
        }
        state.current
    }
}

impl<T: TimeSource + ?Sized> TimeSource for std::sync::Arc<T> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// Issues strictly increasing [`HybridTimestamp`]s.
///
/// One instance per replica. The last issued timestamp is the only shared
/// mutable state and is guarded by a short critical section.
pub struct HybridClock<T: TimeSource = SystemTimeSource> {
    source: T,
    last_issued: Mutex<HybridTimestamp>,
}

impl HybridClock<SystemTimeSource> {
    /// A clock reading the system time.
    pub fn system() -> Self {
        Self::new(SystemTimeSource)
    }
}

impl<T: TimeSource> HybridClock<T> {
    pub fn new(source: T) -> Self {
        Self {
            source,
            last_issued: Mutex::new(HybridTimestamp::new(DateTime::<Utc>::MIN_UTC, 0)),
        }
    }

    /// A clock that will only issue timestamps after `last`.
    ///
    /// Used when reopening a replica so new commits sort after stored ones.
    pub fn with_last_issued(source: T, last: HybridTimestamp) -> Self {
        Self {
            source,
            last_issued: Mutex::new(last),
        }
    }

    /// Issue the next timestamp.
    pub fn get_timestamp(&self) -> HybridTimestamp {
        let now = self.source.now();
        let mut last = self.last_issued.lock();
        let next = if now <= last.wall_clock {
            HybridTimestamp::new(last.wall_clock, last.counter.saturating_add(1))
        } else {
            HybridTimestamp::new(now, 0)
        };
        *last = next;
        next
    }

    /// Catch up with timestamps observed elsewhere, e.g. on pulled commits.
    pub fn merge_observed<I>(&self, observed: I)
    where
        I: IntoIterator<Item = HybridTimestamp>,
    {
        let Some(max) = observed.into_iter().max() else {
            return;
        };
        let mut last = self.last_issued.lock();
        if max > *last {
            *last = max;
        }
    }

    /// The most recently issued (or merged) timestamp.
    pub fn last_issued(&self) -> HybridTimestamp {
        *self.last_issued.lock()
    }

    pub fn source(&self) -> &T {
        &self.source
    }
}

impl<T: TimeSource> fmt::Debug for HybridClock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HybridClock")
            .field("last_issued", &self.last_issued())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_advancing_clock_resets_counter() {
        let clock = HybridClock::new(ManualTimeSource::at_millis(1_000));
        let t1 = clock.get_timestamp();
        clock.source().set_millis(2_000);
        let t2 = clock.get_timestamp();

        assert_eq!(t1, HybridTimestamp::from_millis(1_000, 0));
        assert_eq!(t2, HybridTimestamp::from_millis(2_000, 0));
    }

    #[test]
    fn test_stalled_clock_bumps_counter() {
        let clock = HybridClock::new(ManualTimeSource::at_millis(1_000));
        let t1 = clock.get_timestamp();
        let t2 = clock.get_timestamp();
        let t3 = clock.get_timestamp();

        assert_eq!(t2, HybridTimestamp::from_millis(1_000, 1));
        assert_eq!(t3, HybridTimestamp::from_millis(1_000, 2));
        assert!(t1 < t2 && t2 < t3);
    }

    #[test]
    fn test_backwards_clock_keeps_last_wall_time() {
        let clock = HybridClock::new(ManualTimeSource::at_millis(5_000));
        clock.get_timestamp();
        clock.source().set_millis(4_000);
        let t = clock.get_timestamp();

        assert_eq!(t, HybridTimestamp::from_millis(5_000, 1));
    }

    #[test]
    fn test_merge_observed_moves_clock_forward() {
        let clock = HybridClock::new(ManualTimeSource::at_millis(1_000));
        clock.get_timestamp();

        let observed = vec![
            HybridTimestamp::from_millis(9_000, 3),
            HybridTimestamp::from_millis(7_000, 0),
        ];
        clock.merge_observed(observed);

        let next = clock.get_timestamp();
        assert_eq!(next, HybridTimestamp::from_millis(9_000, 4));
    }

    #[test]
    fn test_merge_observed_ignores_older_times() {
        let clock = HybridClock::new(ManualTimeSource::at_millis(10_000));
        let issued = clock.get_timestamp();
        clock.merge_observed([HybridTimestamp::from_millis(500, 0)]);

        assert_eq!(clock.last_issued(), issued);
    }

    #[test]
    fn test_merge_observed_empty_is_noop() {
        let clock = HybridClock::new(ManualTimeSource::at_millis(10_000));
        let issued = clock.get_timestamp();
        clock.merge_observed(std::iter::empty());

        assert_eq!(clock.last_issued(), issued);
    }

    #[test]
    fn test_seeded_clock_issues_after_seed() {
        let seed = HybridTimestamp::from_millis(50_000, 7);
        let clock = HybridClock::with_last_issued(ManualTimeSource::at_millis(10), seed);

        assert!(clock.get_timestamp() > seed);
    }

    #[test]
    fn test_timestamp_json_shape() {
        let ts = HybridTimestamp::from_millis(0, 2);
        let json = serde_json::to_value(ts).unwrap();

        assert_eq!(json["counter"], 2);
        assert!(json["wallClock"].as_str().unwrap().starts_with("1970-01-01T00:00:00"));
    }

    #[test]
    fn test_system_time_is_millisecond_precise() {
        let now = SystemTimeSource.now();
        assert_eq!(now.timestamp_subsec_nanos() % 1_000_000, 0);
    }

    proptest! {
        #[test]
        fn prop_issued_timestamps_strictly_increase(readings in prop::collection::vec(0i64..10_000, 1..64)) {
            let source = ManualTimeSource::at_millis(0);
            source.push_readings(readings.iter().map(|ms| millis_to_datetime(*ms)));
            let clock = HybridClock::new(source);

            let mut previous: Option<HybridTimestamp> = None;
            for _ in 0..readings.len() {
                let ts = clock.get_timestamp();
                if let Some(prev) = previous {
                    prop_assert!(ts > prev);
                }
                previous = Some(ts);
            }
        }

        #[test]
        fn prop_next_timestamp_follows_merged_max(
            now in 0i64..10_000,
            observed in prop::collection::vec((0i64..20_000, 0i64..5), 1..16),
        ) {
            let clock = HybridClock::new(ManualTimeSource::at_millis(now));
            let observed: Vec<_> = observed
                .into_iter()
                .map(|(ms, counter)| HybridTimestamp::from_millis(ms, counter))
                .collect();
            let max = *observed.iter().max().unwrap();

            clock.merge_observed(observed);
            prop_assert!(clock.get_timestamp() > max);
        }
    }
}
