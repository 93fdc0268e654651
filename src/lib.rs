//! Watches an iCal feed, keeps a current/next event projection, and fires
//! time-precise triggers at occurrence boundaries.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::engine::{EngineHandle, FeedStatus, spawn};
pub use application::projection::{EventProjection, NOTHING_SCHEDULED, ProjectionSlot};
pub use domain::models::{EventDefinition, EventOverride, ResolvedOccurrence};
pub use infrastructure::config::EngineConfig;
pub use infrastructure::error::EngineError;
pub use infrastructure::feed_client::{CalendarFeedClient, IcsFeedClient};
