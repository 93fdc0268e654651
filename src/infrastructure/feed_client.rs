use crate::domain::models::EventDefinition;
use crate::infrastructure::error::EngineError;
use crate::infrastructure::feed_parser::parse_calendar;
use async_trait::async_trait;
use reqwest::Client;
use url::Url;

/// Boundary to the calendar feed; the engine only ever sees normalized
/// definitions, never the wire format.
#[async_trait]
pub trait CalendarFeedClient: Send + Sync {
    async fn fetch_events(&self, feed_url: &Url) -> Result<Vec<EventDefinition>, EngineError>;
}

#[derive(Debug, Clone, Default)]
pub struct IcsFeedClient {
    client: Client,
}

impl IcsFeedClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    fn http_error(status: reqwest::StatusCode, body: &str) -> EngineError {
        let message = if body.trim().is_empty() {
            format!("feed fetch failed: http {}", status.as_u16())
        } else {
            format!("feed fetch failed: http {}; body={body}", status.as_u16())
        };
        EngineError::Feed(message)
    }
}

#[async_trait]
impl CalendarFeedClient for IcsFeedClient {
    async fn fetch_events(&self, feed_url: &Url) -> Result<Vec<EventDefinition>, EngineError> {
        let response = self
            .client
            .get(feed_url.clone())
            .send()
            .await
            .map_err(|error| {
                EngineError::Feed(format!("network error while fetching feed: {error}"))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            EngineError::Feed(format!("failed reading feed response: {error}"))
        })?;

        if !status.is_success() {
            return Err(Self::http_error(status, &body));
        }

        parse_calendar(&body)
    }
}
