pub mod engine;
pub mod ingest;
pub mod projection;
pub mod scheduler;
pub mod store;
