use calwatch::{EngineConfig, EngineError, IcsFeedClient, spawn};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|value| value.parse().ok())
}

#[tokio::main]
async fn main() -> Result<(), EngineError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "calwatch=info".into()),
        )
        .init();

    let feed_url = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("CALWATCH_FEED_URL").ok())
        .ok_or_else(|| {
            EngineError::InvalidConfig(
                "usage: calwatch <feed-url> (or set CALWATCH_FEED_URL)".to_string(),
            )
        })?;

    let config = EngineConfig::from_settings(
        &feed_url,
        env_parse("CALWATCH_REFRESH_MINUTES"),
        env_parse("CALWATCH_WINDOW_BEFORE_MINUTES"),
        env_parse("CALWATCH_WINDOW_AFTER_MINUTES"),
    )?;

    tracing::info!(url = %config.feed_url, "starting calwatch");
    let (handle, join) = spawn(config, Arc::new(IcsFeedClient::new()));

    tokio::signal::ctrl_c()
        .await
        .map_err(|error| EngineError::InvalidConfig(format!("failed to listen for ctrl-c: {error}")))?;
    tracing::info!("shutting down");
    handle.shutdown();
    let _ = join.await;
    Ok(())
}
