use crate::domain::models::ResolvedOccurrence;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// In-memory source of truth for "what occurrences currently exist".
///
/// The store is rebuilt wholesale on each feed refresh and never proactively
/// pruned, so entries may outlive their end instant; every read compares
/// against `now` instead of trusting liveness.
#[derive(Debug, Default)]
pub struct EventStore {
    occurrences: HashMap<String, ResolvedOccurrence>,
}

impl EventStore {
    /// Insert or overwrite the entry keyed by the occurrence id. Trigger
    /// registration is deliberately not decided here; the ingestion driver
    /// pairs the two as one step.
    pub fn admit(&mut self, occurrence: ResolvedOccurrence) {
        self.occurrences
            .insert(occurrence.occurrence_id.clone(), occurrence);
    }

    pub fn clear(&mut self) {
        self.occurrences.clear();
    }

    pub fn get(&self, occurrence_id: &str) -> Option<&ResolvedOccurrence> {
        self.occurrences.get(occurrence_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedOccurrence> {
        self.occurrences.values()
    }

    pub fn len(&self) -> usize {
        self.occurrences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.occurrences.is_empty()
    }

    /// True iff `now` lies within `[start, end]` of any occurrence, boundaries
    /// inclusive.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.occurrences
            .values()
            .any(|occurrence| occurrence.is_current(now))
    }

    /// True iff `now` lies within `[start - before, end + after]` of any
    /// occurrence; the pre-window, active interval, and post-window form one
    /// continuous range.
    pub fn is_in_window(&self, now: DateTime<Utc>, before: Duration, after: Duration) -> bool {
        self.occurrences.values().any(|occurrence| {
            occurrence.start - before <= now && now <= occurrence.end + after
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn occurrence(id: &str, start: &str, end: &str) -> ResolvedOccurrence {
        ResolvedOccurrence {
            occurrence_id: id.to_string(),
            start: fixed_time(start),
            end: fixed_time(end),
            summary: "Show".to_string(),
            is_recurring_instance: false,
            source_uid: None,
        }
    }

    #[test]
    fn admit_overwrites_same_key() {
        let mut store = EventStore::default();
        store.admit(occurrence("a", "2026-03-02T10:00:00Z", "2026-03-02T11:00:00Z"));
        store.admit(occurrence("a", "2026-03-02T12:00:00Z", "2026-03-02T13:00:00Z"));

        assert_eq!(store.len(), 1);
        assert_eq!(
            store.get("a").expect("entry exists").start,
            fixed_time("2026-03-02T12:00:00Z")
        );
    }

    #[test]
    fn is_active_boundaries_are_inclusive() {
        let mut store = EventStore::default();
        store.admit(occurrence("a", "2026-03-02T10:00:00Z", "2026-03-02T11:00:00Z"));

        assert!(store.is_active(fixed_time("2026-03-02T10:00:00Z")));
        assert!(store.is_active(fixed_time("2026-03-02T11:00:00Z")));
        assert!(store.is_active(fixed_time("2026-03-02T10:30:00Z")));
        assert!(!store.is_active(fixed_time("2026-03-02T09:59:59Z")));
        assert!(!store.is_active(fixed_time("2026-03-02T11:00:01Z")));
    }

    #[test]
    fn window_bounds_match_five_minute_margins() {
        let mut store = EventStore::default();
        store.admit(occurrence("a", "2026-03-02T10:00:00Z", "2026-03-02T11:00:00Z"));
        let before = Duration::minutes(5);
        let after = Duration::minutes(5);

        assert!(store.is_in_window(fixed_time("2026-03-02T09:55:00Z"), before, after));
        assert!(store.is_in_window(fixed_time("2026-03-02T11:05:00Z"), before, after));
        assert!(!store.is_in_window(fixed_time("2026-03-02T09:54:00Z"), before, after));
        assert!(!store.is_in_window(fixed_time("2026-03-02T11:06:00Z"), before, after));
    }

    #[test]
    fn empty_store_is_never_active_or_in_window() {
        let store = EventStore::default();
        let now = fixed_time("2026-03-02T10:00:00Z");
        assert!(!store.is_active(now));
        assert!(!store.is_in_window(now, Duration::minutes(120), Duration::minutes(120)));
        assert!(store.is_empty());
    }

    proptest! {
        #[test]
        fn window_query_matches_interval_arithmetic(
            offset_minutes in -180i64..180i64,
            before_minutes in 0i64..=120i64,
            after_minutes in 0i64..=120i64,
        ) {
            let mut store = EventStore::default();
            store.admit(occurrence("a", "2026-03-02T10:00:00Z", "2026-03-02T11:00:00Z"));
            let now = fixed_time("2026-03-02T10:00:00Z") + Duration::minutes(offset_minutes);

            let expected = offset_minutes >= -before_minutes
                && offset_minutes <= 60 + after_minutes;
            prop_assert_eq!(
                store.is_in_window(
                    now,
                    Duration::minutes(before_minutes),
                    Duration::minutes(after_minutes),
                ),
                expected
            );
        }
    }
}
