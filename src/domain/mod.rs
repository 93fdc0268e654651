pub mod models;
pub mod occurrence;
