use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A normalized calendar definition as produced by the feed collaborator.
///
/// Definitions are held for the duration of one ingestion pass and never
/// mutated; recurring instances refer back to them by `uid` only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventDefinition {
    pub uid: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub summary: String,
    pub rrule: Option<String>,
    #[serde(default)]
    pub overrides: HashMap<DateTime<Utc>, EventOverride>,
    #[serde(default)]
    pub exdates: HashSet<DateTime<Utc>>,
}

impl EventDefinition {
    pub fn single(
        uid: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            uid: uid.into(),
            start,
            end,
            summary: summary.into(),
            rrule: None,
            overrides: HashMap::new(),
            exdates: HashSet::new(),
        }
    }

    pub fn is_recurring(&self) -> bool {
        self.rrule.is_some()
    }
}

/// A replaced instance of a recurring series, anchored at the instant the rule
/// would otherwise have generated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventOverride {
    pub recurrence_id: DateTime<Utc>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub summary: String,
}

/// One concrete, time-bound event instance admitted to the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolvedOccurrence {
    pub occurrence_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub summary: String,
    pub is_recurring_instance: bool,
    /// Key into the definitions held by the current ingestion pass; only set
    /// for recurring instances, and only used to resolve the next occurrence.
    pub source_uid: Option<String>,
}

impl ResolvedOccurrence {
    pub fn from_single(definition: &EventDefinition) -> Self {
        Self {
            occurrence_id: definition.uid.clone(),
            start: definition.start,
            end: definition.end,
            summary: definition.summary.clone(),
            is_recurring_instance: false,
            source_uid: None,
        }
    }

    /// Overrides get a key disambiguated by their recurrence anchor so they
    /// never collide with the base series' own occurrence keys.
    pub fn from_override(base_uid: &str, ov: &EventOverride) -> Self {
        Self {
            occurrence_id: occurrence_key(base_uid, ov.recurrence_id),
            start: ov.start,
            end: ov.end,
            summary: ov.summary.clone(),
            is_recurring_instance: false,
            source_uid: None,
        }
    }

    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        self.start <= now && now <= self.end
    }
}

pub fn occurrence_key(base_uid: &str, anchor: DateTime<Utc>) -> String {
    format!("{base_uid}_{}", anchor.timestamp_millis())
}
