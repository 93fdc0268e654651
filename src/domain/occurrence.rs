use crate::domain::models::{EventDefinition, ResolvedOccurrence, occurrence_key};
use crate::infrastructure::error::EngineError;
use chrono::{DateTime, Utc};
use rrule::RRuleSet;

/// Upper bound on rule-generated candidates examined per resolution. A series
/// would need this many consecutive overridden/excluded instants before the
/// resolver wrongly reports exhaustion.
const CANDIDATE_SCAN_LIMIT: u16 = 128;

/// Resolve the next concrete occurrence of a recurring definition strictly
/// after `after`, skipping instants covered by an exception override or an
/// excluded-instant entry.
///
/// Returns `Ok(None)` when the definition carries no rule or the rule is
/// exhausted (bounded COUNT/UNTIL); both terminate the series normally.
pub fn resolve_next(
    definition: &EventDefinition,
    after: DateTime<Utc>,
) -> Result<Option<ResolvedOccurrence>, EngineError> {
    let Some(rrule) = definition.rrule.as_deref() else {
        return Ok(None);
    };

    let rule_set: RRuleSet = format!(
        "DTSTART:{}\nRRULE:{}",
        definition.start.format("%Y%m%dT%H%M%SZ"),
        rrule
    )
    .parse()
    .map_err(|error| {
        EngineError::Recurrence(format!(
            "invalid recurrence rule for '{}': {error}",
            definition.uid
        ))
    })?;

    // `after` is an inclusive bound in the rrule crate, so a reference that
    // lands exactly on a rule-generated instant comes back as the first
    // candidate. The strictly-after contract is enforced in the scan.
    let tz: rrule::Tz = Utc.into();
    let result = rule_set
        .after(after.with_timezone(&tz))
        .all(CANDIDATE_SCAN_LIMIT);

    let duration = definition.end - definition.start;
    for candidate in &result.dates {
        let start = candidate.with_timezone(&Utc);
        if start <= after {
            continue;
        }
        if definition.overrides.contains_key(&start) || definition.exdates.contains(&start) {
            continue;
        }
        return Ok(Some(ResolvedOccurrence {
            occurrence_id: occurrence_key(&definition.uid, start),
            start,
            end: start + duration,
            summary: definition.summary.clone(),
            is_recurring_instance: true,
            source_uid: Some(definition.uid.clone()),
        }));
    }

    Ok(None)
}
