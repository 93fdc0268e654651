//! ICS feed parsing using the icalendar crate's parser.
//!
//! Produces normalized, UTC-anchored `EventDefinition` values. Components
//! carrying a RECURRENCE-ID are folded into their master definition's
//! override map; everything downstream of this module is wire-format free.

use crate::domain::models::{EventDefinition, EventOverride, occurrence_key};
use crate::infrastructure::error::EngineError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use icalendar::{
    CalendarDateTime, DatePerhapsTime,
    parser::{Property, read_calendar, unfold},
};
use std::str::FromStr;

struct ParsedComponent {
    uid: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    summary: String,
    rrule: Option<String>,
    exdates: Vec<DateTime<Utc>>,
    recurrence_id: Option<DateTime<Utc>>,
}

/// Parse a full ICS document into event definitions, keeping only VEVENT
/// components. Components missing a UID or a parseable DTSTART are dropped
/// rather than failing the whole feed.
pub fn parse_calendar(content: &str) -> Result<Vec<EventDefinition>, EngineError> {
    let unfolded = unfold(content);
    let calendar = read_calendar(&unfolded)
        .map_err(|error| EngineError::Feed(format!("invalid ICS document: {error}")))?;

    let mut masters: Vec<EventDefinition> = Vec::new();
    let mut overrides: Vec<(String, EventOverride)> = Vec::new();

    for component in &calendar.components {
        if component.name != "VEVENT" {
            continue;
        }
        let Some(parsed) = parse_vevent(component) else {
            continue;
        };

        match parsed.recurrence_id {
            Some(anchor) => overrides.push((
                parsed.uid,
                EventOverride {
                    recurrence_id: anchor,
                    start: parsed.start,
                    end: parsed.end,
                    summary: parsed.summary,
                },
            )),
            None => masters.push(EventDefinition {
                uid: parsed.uid,
                start: parsed.start,
                end: parsed.end,
                summary: parsed.summary,
                rrule: parsed.rrule,
                overrides: Default::default(),
                exdates: parsed.exdates.into_iter().collect(),
            }),
        }
    }

    for (uid, ov) in overrides {
        match masters.iter_mut().find(|master| master.uid == uid) {
            Some(master) => {
                master.overrides.insert(ov.recurrence_id, ov);
            }
            // An override without a master series still describes a concrete
            // event; surface it as a plain single definition, keyed by its
            // recurrence anchor so siblings sharing a UID stay distinct.
            None => masters.push(EventDefinition::single(
                occurrence_key(&uid, ov.recurrence_id),
                ov.start,
                ov.end,
                ov.summary,
            )),
        }
    }

    Ok(masters)
}

fn parse_vevent(component: &icalendar::parser::Component<'_>) -> Option<ParsedComponent> {
    let uid = component.find_prop("UID")?.val.to_string();
    let start = to_utc(DatePerhapsTime::try_from(component.find_prop("DTSTART")?).ok()?)?;
    // Zero-length events are legal in feeds that omit DTEND.
    let end = component
        .find_prop("DTEND")
        .and_then(|prop| DatePerhapsTime::try_from(prop).ok())
        .and_then(to_utc)
        .unwrap_or(start);
    let summary = component
        .find_prop("SUMMARY")
        .map(|prop| prop.val.to_string())
        .unwrap_or_default();

    let rrule = component.find_prop("RRULE").map(|prop| prop.val.to_string());
    let exdates: Vec<DateTime<Utc>> = component
        .properties
        .iter()
        .filter(|prop| prop.name == "EXDATE")
        .flat_map(parse_exdate_property)
        .collect();

    let recurrence_id = component
        .find_prop("RECURRENCE-ID")
        .and_then(|prop| DatePerhapsTime::try_from(prop).ok())
        .and_then(to_utc);

    Some(ParsedComponent {
        uid,
        start,
        end,
        summary,
        rrule,
        exdates,
        recurrence_id,
    })
}

/// Normalize icalendar's date-or-datetime to a UTC instant: all-day dates
/// become midnight UTC and floating datetimes are read as UTC.
fn to_utc(dpt: DatePerhapsTime) -> Option<DateTime<Utc>> {
    match dpt {
        DatePerhapsTime::Date(date) => Some(date.and_hms_opt(0, 0, 0)?.and_utc()),
        DatePerhapsTime::DateTime(cal_dt) => match cal_dt {
            CalendarDateTime::Utc(dt) => Some(dt),
            CalendarDateTime::Floating(naive) => Some(naive.and_utc()),
            CalendarDateTime::WithTimezone { date_time, tzid } => {
                let tz = Tz::from_str(&tzid).ok()?;
                tz.from_local_datetime(&date_time)
                    .earliest()
                    .map(|dt| dt.with_timezone(&Utc))
            }
        },
    }
}

/// Parse one EXDATE property into UTC instants.
///
/// Handles TZID parameters, VALUE=DATE, trailing-Z UTC, floating values, and
/// comma-separated lists.
fn parse_exdate_property(prop: &Property) -> Vec<DateTime<Utc>> {
    let tzid = prop
        .params
        .iter()
        .find(|param| param.key == "TZID")
        .and_then(|param| param.val.as_ref().map(|value| value.to_string()));

    let is_date = prop.params.iter().any(|param| {
        param.key == "VALUE" && param.val.as_ref().map(|value| value.as_ref()) == Some("DATE")
    });

    prop.val
        .as_ref()
        .split(',')
        .filter_map(|raw| {
            let raw = raw.trim();
            if raw.is_empty() {
                return None;
            }
            if is_date {
                return NaiveDate::parse_from_str(raw, "%Y%m%d")
                    .ok()?
                    .and_hms_opt(0, 0, 0)
                    .map(|dt| dt.and_utc());
            }
            if let Some(tzid) = tzid.as_deref() {
                let tz = Tz::from_str(tzid).ok()?;
                let naive = NaiveDateTime::parse_from_str(raw, "%Y%m%dT%H%M%S").ok()?;
                return tz
                    .from_local_datetime(&naive)
                    .earliest()
                    .map(|dt| dt.with_timezone(&Utc));
            }
            let trimmed = raw.trim_end_matches('Z');
            NaiveDateTime::parse_from_str(trimmed, "%Y%m%dT%H%M%S")
                .ok()
                .map(|dt| dt.and_utc())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    #[test]
    fn parses_single_event_fields() {
        let ics = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:TEST\r\n\
BEGIN:VEVENT\r\n\
UID:single-1\r\n\
SUMMARY:Production meeting\r\n\
DTSTART:20260302T090000Z\r\n\
DTEND:20260302T100000Z\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

        let definitions = parse_calendar(ics).expect("feed should parse");
        assert_eq!(definitions.len(), 1);
        let definition = &definitions[0];
        assert_eq!(definition.uid, "single-1");
        assert_eq!(definition.summary, "Production meeting");
        assert_eq!(definition.start, fixed_time("2026-03-02T09:00:00Z"));
        assert_eq!(definition.end, fixed_time("2026-03-02T10:00:00Z"));
        assert!(definition.rrule.is_none());
    }

    #[test]
    fn collects_rrule_and_exdates() {
        let ics = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:TEST\r\n\
BEGIN:VEVENT\r\n\
UID:weekly-1\r\n\
SUMMARY:Weekly show\r\n\
DTSTART:20260302T090000Z\r\n\
DTEND:20260302T100000Z\r\n\
RRULE:FREQ=WEEKLY;BYDAY=MO\r\n\
EXDATE:20260309T090000Z,20260316T090000Z\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

        let definitions = parse_calendar(ics).expect("feed should parse");
        assert_eq!(definitions.len(), 1);
        let definition = &definitions[0];
        assert_eq!(definition.rrule.as_deref(), Some("FREQ=WEEKLY;BYDAY=MO"));
        assert_eq!(definition.exdates.len(), 2);
        assert!(definition.exdates.contains(&fixed_time("2026-03-09T09:00:00Z")));
        assert!(definition.exdates.contains(&fixed_time("2026-03-16T09:00:00Z")));
    }

    #[test]
    fn recurrence_id_component_becomes_master_override() {
        let ics = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:TEST\r\n\
BEGIN:VEVENT\r\n\
UID:weekly-1\r\n\
SUMMARY:Weekly show\r\n\
DTSTART:20260302T090000Z\r\n\
DTEND:20260302T100000Z\r\n\
RRULE:FREQ=WEEKLY;BYDAY=MO\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
UID:weekly-1\r\n\
SUMMARY:Weekly show (moved)\r\n\
DTSTART:20260309T110000Z\r\n\
DTEND:20260309T120000Z\r\n\
RECURRENCE-ID:20260309T090000Z\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

        let definitions = parse_calendar(ics).expect("feed should parse");
        assert_eq!(definitions.len(), 1);
        let master = &definitions[0];
        let anchor = fixed_time("2026-03-09T09:00:00Z");
        let ov = master
            .overrides
            .get(&anchor)
            .expect("override attached to master");
        assert_eq!(ov.summary, "Weekly show (moved)");
        assert_eq!(ov.start, fixed_time("2026-03-09T11:00:00Z"));
    }

    #[test]
    fn orphan_override_is_kept_as_single_definition() {
        let ics = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:TEST\r\n\
BEGIN:VEVENT\r\n\
UID:orphan-1\r\n\
SUMMARY:Detached instance\r\n\
DTSTART:20260309T110000Z\r\n\
DTEND:20260309T120000Z\r\n\
RECURRENCE-ID:20260309T090000Z\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

        let definitions = parse_calendar(ics).expect("feed should parse");
        assert_eq!(definitions.len(), 1);
        assert_eq!(
            definitions[0].uid,
            occurrence_key("orphan-1", fixed_time("2026-03-09T09:00:00Z"))
        );
        assert!(definitions[0].rrule.is_none());
        assert_eq!(definitions[0].start, fixed_time("2026-03-09T11:00:00Z"));
    }

    #[test]
    fn sibling_orphan_overrides_stay_distinct() {
        let ics = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:TEST\r\n\
BEGIN:VEVENT\r\n\
UID:orphan-1\r\n\
SUMMARY:First instance\r\n\
DTSTART:20260309T110000Z\r\n\
DTEND:20260309T120000Z\r\n\
RECURRENCE-ID:20260309T090000Z\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
UID:orphan-1\r\n\
SUMMARY:Second instance\r\n\
DTSTART:20260316T110000Z\r\n\
DTEND:20260316T120000Z\r\n\
RECURRENCE-ID:20260316T090000Z\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

        let definitions = parse_calendar(ics).expect("feed should parse");
        assert_eq!(definitions.len(), 2);
        let mut uids: Vec<&str> = definitions.iter().map(|d| d.uid.as_str()).collect();
        uids.sort_unstable();
        assert_eq!(
            uids,
            vec![
                occurrence_key("orphan-1", fixed_time("2026-03-09T09:00:00Z")),
                occurrence_key("orphan-1", fixed_time("2026-03-16T09:00:00Z")),
            ]
        );
        assert!(definitions.iter().all(|d| d.overrides.is_empty()));
    }

    #[test]
    fn tzid_exdates_are_normalized_to_utc() {
        let ics = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:TEST\r\n\
BEGIN:VEVENT\r\n\
UID:zoned-1\r\n\
SUMMARY:Zoned weekly\r\n\
DTSTART:20260105T100000Z\r\n\
DTEND:20260105T110000Z\r\n\
RRULE:FREQ=WEEKLY;BYDAY=MO\r\n\
EXDATE;TZID=America/New_York:20260112T050000\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

        let definitions = parse_calendar(ics).expect("feed should parse");
        // 05:00 America/New_York is 10:00 UTC in January.
        assert!(definitions[0]
            .exdates
            .contains(&fixed_time("2026-01-12T10:00:00Z")));
    }

    #[test]
    fn events_missing_uid_or_dtstart_are_dropped() {
        let ics = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:TEST\r\n\
BEGIN:VEVENT\r\n\
SUMMARY:No uid\r\n\
DTSTART:20260302T090000Z\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
UID:ok-1\r\n\
SUMMARY:Kept\r\n\
DTSTART:20260302T090000Z\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

        let definitions = parse_calendar(ics).expect("feed should parse");
        assert_eq!(definitions.len(), 1);
        assert_eq!(definitions[0].uid, "ok-1");
        // Missing DTEND collapses to a zero-length interval.
        assert_eq!(definitions[0].end, definitions[0].start);
    }
}
