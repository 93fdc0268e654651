use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// The four boundary instants tracked per occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerKind {
    WindowStart,
    Start,
    End,
    WindowEnd,
}

impl TriggerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerKind::WindowStart => "window_start",
            TriggerKind::Start => "start",
            TriggerKind::End => "end",
            TriggerKind::WindowEnd => "window_end",
        }
    }
}

pub fn trigger_key(kind: TriggerKind, occurrence_id: &str) -> String {
    format!("{}_{occurrence_id}", kind.as_str())
}

/// Message posted to the engine inbox when a trigger's instant arrives. Timers
/// carry no state beyond this; the engine task owns everything mutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerEvent {
    pub kind: TriggerKind,
    pub occurrence_id: String,
}

/// Registers and cancels one-shot time-anchored triggers, keyed by
/// `<kind>_<occurrenceId>`. A key is registered at most once at any time;
/// re-registering cancels the previous timer first.
pub trait TriggerScheduler: Send {
    fn register(&mut self, kind: TriggerKind, occurrence_id: &str, at: DateTime<Utc>);
    fn cancel_all(&mut self);
    fn registered_len(&self) -> usize;
}

/// Tokio-backed scheduler: each registration spawns a task that sleeps until
/// the deadline and posts a `TriggerEvent` to the engine inbox.
#[derive(Debug)]
pub struct TokioTriggerScheduler {
    inbox: mpsc::UnboundedSender<TriggerEvent>,
    timers: HashMap<String, JoinHandle<()>>,
}

impl TokioTriggerScheduler {
    pub fn new(inbox: mpsc::UnboundedSender<TriggerEvent>) -> Self {
        Self {
            inbox,
            timers: HashMap::new(),
        }
    }
}

impl TriggerScheduler for TokioTriggerScheduler {
    fn register(&mut self, kind: TriggerKind, occurrence_id: &str, at: DateTime<Utc>) {
        let key = trigger_key(kind, occurrence_id);
        if let Some(existing) = self.timers.remove(&key) {
            existing.abort();
        }

        let inbox = self.inbox.clone();
        let event = TriggerEvent {
            kind,
            occurrence_id: occurrence_id.to_string(),
        };
        let handle = tokio::spawn(async move {
            let delay = (at - Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(delay).await;
            // The engine may already be gone during shutdown; nothing to do.
            let _ = inbox.send(event);
        });
        self.timers.insert(key, handle);
    }

    fn cancel_all(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
    }

    /// Fired timers leave their completed handle in the table until the next
    /// `cancel_all`, so only still-pending tasks count as registered.
    fn registered_len(&self) -> usize {
        self.timers
            .values()
            .filter(|handle| !handle.is_finished())
            .count()
    }
}

impl Drop for TokioTriggerScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
