use crate::application::ingest::EventScheduler;
use crate::application::projection::EventProjection;
use crate::application::scheduler::{TokioTriggerScheduler, TriggerEvent};
use crate::infrastructure::config::{EngineConfig, clamp_window_minutes};
use crate::infrastructure::error::EngineError;
use crate::infrastructure::feed_client::CalendarFeedClient;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Connection state surfaced to the host, transitioned on every fetch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedStatus {
    Ok,
    Connecting,
    Error(String),
}

enum EngineCommand {
    Refresh {
        done: oneshot::Sender<Result<(), EngineError>>,
    },
    Projection {
        reply: oneshot::Sender<EventProjection>,
    },
    IsActive {
        reply: oneshot::Sender<bool>,
    },
    IsInWindow {
        before_minutes: i64,
        after_minutes: i64,
        reply: oneshot::Sender<bool>,
    },
    LogActive,
    Shutdown,
}

/// Public surface of the engine: a cloneable command sender plus watch
/// receivers for the status signal and the current/next projection.
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::UnboundedSender<EngineCommand>,
    status: watch::Receiver<FeedStatus>,
    projection: watch::Receiver<EventProjection>,
}

impl EngineHandle {
    /// Force a feed refresh now and wait for the pass to finish.
    pub async fn refresh(&self) -> Result<(), EngineError> {
        let (done, ack) = oneshot::channel();
        self.send(EngineCommand::Refresh { done })?;
        ack.await
            .map_err(|_| EngineError::Feed("engine stopped during refresh".to_string()))?
    }

    pub async fn projection(&self) -> Result<EventProjection, EngineError> {
        let (reply, response) = oneshot::channel();
        self.send(EngineCommand::Projection { reply })?;
        response
            .await
            .map_err(|_| EngineError::Feed("engine stopped".to_string()))
    }

    pub async fn is_active(&self) -> Result<bool, EngineError> {
        let (reply, response) = oneshot::channel();
        self.send(EngineCommand::IsActive { reply })?;
        response
            .await
            .map_err(|_| EngineError::Feed("engine stopped".to_string()))
    }

    /// Window minutes are clamped to [0, 120] on each side.
    pub async fn is_in_window(
        &self,
        before_minutes: i64,
        after_minutes: i64,
    ) -> Result<bool, EngineError> {
        let (reply, response) = oneshot::channel();
        self.send(EngineCommand::IsInWindow {
            before_minutes,
            after_minutes,
            reply,
        })?;
        response
            .await
            .map_err(|_| EngineError::Feed("engine stopped".to_string()))
    }

    /// Diagnostic action: log every currently active occurrence.
    pub fn log_active(&self) -> Result<(), EngineError> {
        self.send(EngineCommand::LogActive)
    }

    pub fn shutdown(&self) {
        let _ = self.commands.send(EngineCommand::Shutdown);
    }

    pub fn status(&self) -> watch::Receiver<FeedStatus> {
        self.status.clone()
    }

    pub fn projection_watch(&self) -> watch::Receiver<EventProjection> {
        self.projection.clone()
    }

    fn send(&self, command: EngineCommand) -> Result<(), EngineError> {
        self.commands
            .send(command)
            .map_err(|_| EngineError::Feed("engine stopped".to_string()))
    }
}

/// Spawn the engine task. One task owns the scheduler core and processes
/// commands, fired triggers, the periodic refresh, and the active-state
/// backstop strictly serially.
pub fn spawn(
    config: EngineConfig,
    feed: Arc<dyn CalendarFeedClient>,
) -> (EngineHandle, JoinHandle<()>) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();
    let (status_tx, status_rx) = watch::channel(FeedStatus::Ok);
    let (projection_tx, projection_rx) = watch::channel(EventProjection::default());

    let core = EventScheduler::new(
        TokioTriggerScheduler::new(trigger_tx),
        config.window_before(),
        config.window_after(),
    );

    let task = EngineTask {
        core,
        config,
        feed,
        command_rx,
        trigger_rx,
        status_tx,
        projection_tx,
    };
    let join = tokio::spawn(task.run());

    (
        EngineHandle {
            commands: command_tx,
            status: status_rx,
            projection: projection_rx,
        },
        join,
    )
}

struct EngineTask {
    core: EventScheduler<TokioTriggerScheduler>,
    config: EngineConfig,
    feed: Arc<dyn CalendarFeedClient>,
    command_rx: mpsc::UnboundedReceiver<EngineCommand>,
    trigger_rx: mpsc::UnboundedReceiver<TriggerEvent>,
    status_tx: watch::Sender<FeedStatus>,
    projection_tx: watch::Sender<EventProjection>,
}

impl EngineTask {
    async fn run(mut self) {
        let refresh_period =
            std::time::Duration::from_secs(u64::from(self.config.refresh_interval_minutes) * 60);
        let backstop_period = std::time::Duration::from_secs(self.config.active_check_seconds);
        // First scheduled firings land one full period out; the initial
        // refresh below covers startup.
        let mut refresh_tick = tokio::time::interval_at(
            tokio::time::Instant::now() + refresh_period,
            refresh_period,
        );
        let mut backstop_tick = tokio::time::interval_at(
            tokio::time::Instant::now() + backstop_period,
            backstop_period,
        );

        let _ = self.refresh_feed().await;

        loop {
            tokio::select! {
                command = self.command_rx.recv() => {
                    match command {
                        Some(EngineCommand::Refresh { done }) => {
                            let result = self.refresh_feed().await;
                            let _ = done.send(result);
                        }
                        Some(EngineCommand::Projection { reply }) => {
                            let _ = reply.send(self.core.projection(Utc::now()));
                        }
                        Some(EngineCommand::IsActive { reply }) => {
                            let _ = reply.send(self.core.is_active(Utc::now()));
                        }
                        Some(EngineCommand::IsInWindow { before_minutes, after_minutes, reply }) => {
                            let _ = reply.send(self.core.is_in_window(
                                Utc::now(),
                                Duration::minutes(clamp_window_minutes(before_minutes)),
                                Duration::minutes(clamp_window_minutes(after_minutes)),
                            ));
                        }
                        Some(EngineCommand::LogActive) => self.log_active(),
                        Some(EngineCommand::Shutdown) | None => break,
                    }
                }
                Some(event) = self.trigger_rx.recv() => {
                    self.core.handle_trigger(event.kind, &event.occurrence_id, Utc::now());
                    self.publish_projection();
                }
                _ = refresh_tick.tick() => {
                    let _ = self.refresh_feed().await;
                }
                _ = backstop_tick.tick() => {
                    // Correctness backstop against missed or drifted timers.
                    self.publish_projection();
                }
            }
        }

        self.core.cancel_all_triggers();
        info!("engine stopped");
    }

    /// One fetch-and-ingest pass. A failed fetch leaves the store and trigger
    /// table exactly as they were; only the status signal changes.
    async fn refresh_feed(&mut self) -> Result<(), EngineError> {
        let _ = self.status_tx.send(FeedStatus::Connecting);
        debug!(url = %self.config.feed_url, "fetching calendar feed");

        match self.feed.fetch_events(&self.config.feed_url).await {
            Ok(definitions) => {
                self.core.ingest(definitions, Utc::now());
                let _ = self.status_tx.send(FeedStatus::Ok);
                self.publish_projection();
                Ok(())
            }
            Err(error) => {
                warn!(%error, "feed refresh failed; keeping previous state");
                let _ = self.status_tx.send(FeedStatus::Error(error.to_string()));
                Err(error)
            }
        }
    }

    fn publish_projection(&self) {
        let _ = self.projection_tx.send(self.core.projection(Utc::now()));
    }

    fn log_active(&self) {
        let now = Utc::now();
        let active = self.core.active_occurrences(now);
        if active.is_empty() {
            info!("no active events");
            return;
        }
        for occurrence in active {
            info!(
                summary = %occurrence.summary,
                start = %occurrence.start,
                end = %occurrence.end,
                "active event"
            );
        }
    }
}
