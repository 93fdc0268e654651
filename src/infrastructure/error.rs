use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("feed error: {0}")]
    Feed(String),
    #[error("recurrence error: {0}")]
    Recurrence(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}
