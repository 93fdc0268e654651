use crate::application::projection::{EventProjection, project};
use crate::application::scheduler::{TriggerKind, TriggerScheduler};
use crate::application::store::EventStore;
use crate::domain::models::{EventDefinition, ResolvedOccurrence};
use crate::domain::occurrence::resolve_next;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Owns the event store, the definitions of the current ingestion pass, and
/// the trigger scheduler, and drives all three as one unit. Every mutation
/// funnels through here so admit-then-schedule stays atomic with respect to
/// the engine task that owns this value.
pub struct EventScheduler<S: TriggerScheduler> {
    store: EventStore,
    definitions: HashMap<String, EventDefinition>,
    scheduler: S,
    window_before: Duration,
    window_after: Duration,
}

impl<S: TriggerScheduler> EventScheduler<S> {
    pub fn new(scheduler: S, window_before: Duration, window_after: Duration) -> Self {
        Self {
            store: EventStore::default(),
            definitions: HashMap::new(),
            scheduler,
            window_before,
            window_after,
        }
    }

    /// Rebuild the scheduling horizon from a fresh feed snapshot. All
    /// outstanding triggers are canceled and the store cleared before any
    /// admission, so a stale timer can never fire against the new pass.
    pub fn ingest(&mut self, definitions: Vec<EventDefinition>, now: DateTime<Utc>) {
        self.scheduler.cancel_all();
        self.store.clear();
        self.definitions.clear();

        for definition in definitions {
            for ov in definition.overrides.values() {
                if ov.end < now {
                    continue;
                }
                self.admit_and_schedule(
                    ResolvedOccurrence::from_override(&definition.uid, ov),
                    now,
                );
            }

            if definition.is_recurring() {
                match resolve_next(&definition, now) {
                    Ok(Some(occurrence)) => self.admit_and_schedule(occurrence, now),
                    Ok(None) => debug!(uid = %definition.uid, "recurring series exhausted"),
                    Err(error) => {
                        warn!(uid = %definition.uid, %error, "skipping recurring series");
                    }
                }
                self.definitions.insert(definition.uid.clone(), definition);
                continue;
            }

            if definition.overrides.is_empty() && definition.end >= now {
                self.admit_and_schedule(ResolvedOccurrence::from_single(&definition), now);
            }
        }

        info!(
            occurrences = self.store.len(),
            triggers = self.scheduler.registered_len(),
            "ingestion pass complete"
        );
    }

    /// Admission and trigger registration as one step: only boundary instants
    /// strictly in the future get a trigger; instants already passed are lost
    /// by design (no catch-up firing).
    fn admit_and_schedule(&mut self, occurrence: ResolvedOccurrence, now: DateTime<Utc>) {
        let candidates = [
            (TriggerKind::WindowStart, occurrence.start - self.window_before),
            (TriggerKind::Start, occurrence.start),
            (TriggerKind::End, occurrence.end),
            (TriggerKind::WindowEnd, occurrence.end + self.window_after),
        ];
        for (kind, at) in candidates {
            if at > now {
                self.scheduler.register(kind, &occurrence.occurrence_id, at);
            }
        }
        self.store.admit(occurrence);
    }

    /// Process one fired trigger. A `start` firing on a recurring instance
    /// extends the series by resolving and admitting exactly one successor;
    /// all other kinds only mark state for re-derivation by the caller.
    pub fn handle_trigger(&mut self, kind: TriggerKind, occurrence_id: &str, now: DateTime<Utc>) {
        let Some(occurrence) = self.store.get(occurrence_id).cloned() else {
            // Stale delivery for an occurrence replaced mid-flight.
            debug!(occurrence_id, kind = kind.as_str(), "trigger for unknown occurrence");
            return;
        };

        match kind {
            TriggerKind::Start => {
                info!(summary = %occurrence.summary, occurrence_id, "event started");
                if occurrence.is_recurring_instance {
                    self.extend_series(&occurrence, now);
                }
            }
            TriggerKind::End => {
                info!(summary = %occurrence.summary, occurrence_id, "event ended");
            }
            TriggerKind::WindowStart | TriggerKind::WindowEnd => {
                debug!(
                    summary = %occurrence.summary,
                    occurrence_id,
                    kind = kind.as_str(),
                    "window boundary crossed"
                );
            }
        }
    }

    fn extend_series(&mut self, fired: &ResolvedOccurrence, now: DateTime<Utc>) {
        let Some(uid) = fired.source_uid.as_deref() else {
            return;
        };
        let Some(definition) = self.definitions.get(uid).cloned() else {
            debug!(uid, "no held definition for fired series");
            return;
        };

        // The fired occurrence's own start is the reference instant, so a
        // delayed delivery cannot skip occurrences.
        match resolve_next(&definition, fired.start) {
            Ok(Some(successor)) => self.admit_and_schedule(successor, now),
            Ok(None) => debug!(uid, "recurring series exhausted"),
            Err(error) => warn!(uid, %error, "failed to extend recurring series"),
        }
    }

    pub fn projection(&self, now: DateTime<Utc>) -> EventProjection {
        project(self.store.iter(), now)
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.store.is_active(now)
    }

    pub fn is_in_window(&self, now: DateTime<Utc>, before: Duration, after: Duration) -> bool {
        self.store.is_in_window(now, before, after)
    }

    pub fn active_occurrences(&self, now: DateTime<Utc>) -> Vec<&ResolvedOccurrence> {
        self.store
            .iter()
            .filter(|occurrence| occurrence.is_current(now))
            .collect()
    }

    pub fn occurrence_count(&self) -> usize {
        self.store.len()
    }

    pub fn cancel_all_triggers(&mut self) {
        self.scheduler.cancel_all();
    }

    #[cfg(test)]
    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    #[cfg(test)]
    pub fn store(&self) -> &EventStore {
        &self.store
    }
}
