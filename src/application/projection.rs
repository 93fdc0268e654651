use crate::domain::models::ResolvedOccurrence;
use chrono::{DateTime, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Shown for the current slot when nothing is scheduled.
pub const NOTHING_SCHEDULED: &str = "Nothing Scheduled";

/// Formatted view of one event slot: name plus split date/time strings for
/// both boundaries. All fields empty when the slot is vacant (except the
/// current slot's sentinel name, applied by `project`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectionSlot {
    pub name: String,
    pub start_date: String,
    pub start_time: String,
    pub end_date: String,
    pub end_time: String,
}

impl ProjectionSlot {
    fn from_occurrence(occurrence: &ResolvedOccurrence) -> Self {
        let (start_date, start_time) = format_local_parts(occurrence.start);
        let (end_date, end_time) = format_local_parts(occurrence.end);
        Self {
            name: occurrence.summary.clone(),
            start_date,
            start_time,
            end_date,
            end_time,
        }
    }
}

/// The ten-field current/next view derived from the store on demand.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventProjection {
    pub current: ProjectionSlot,
    pub next: ProjectionSlot,
}

impl Default for EventProjection {
    fn default() -> Self {
        Self {
            current: ProjectionSlot {
                name: NOTHING_SCHEDULED.to_string(),
                ..ProjectionSlot::default()
            },
            next: ProjectionSlot::default(),
        }
    }
}

/// Single scan over the store: current is any occurrence spanning `now`
/// (earliest start wins on overlap, then smallest occurrence id, replacing
/// the historical iteration-order ambiguity); next is the future occurrence
/// with the minimal start.
pub fn project<'a>(
    occurrences: impl Iterator<Item = &'a ResolvedOccurrence>,
    now: DateTime<Utc>,
) -> EventProjection {
    let mut current: Option<&ResolvedOccurrence> = None;
    let mut next: Option<&ResolvedOccurrence> = None;

    for occurrence in occurrences {
        if occurrence.is_current(now) {
            let replace = current.is_none_or(|held| {
                (occurrence.start, occurrence.occurrence_id.as_str())
                    < (held.start, held.occurrence_id.as_str())
            });
            if replace {
                current = Some(occurrence);
            }
        } else if occurrence.start > now {
            let replace = next.is_none_or(|held| occurrence.start < held.start);
            if replace {
                next = Some(occurrence);
            }
        }
    }

    let mut projection = EventProjection::default();
    if let Some(occurrence) = current {
        projection.current = ProjectionSlot::from_occurrence(occurrence);
    }
    if let Some(occurrence) = next {
        projection.next = ProjectionSlot::from_occurrence(occurrence);
    }
    projection
}

/// Split an instant into local `YYYY-MM-DD` and zero-padded 24-hour `HH:MM`.
fn format_local_parts(instant: DateTime<Utc>) -> (String, String) {
    format_parts(instant.with_timezone(&Local))
}

fn format_parts<Tz: TimeZone>(instant: DateTime<Tz>) -> (String, String)
where
    Tz::Offset: std::fmt::Display,
{
    (
        instant.format("%Y-%m-%d").to_string(),
        instant.format("%H:%M").to_string(),
    )
}
