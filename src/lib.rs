pub mod config;
pub mod counters;
pub mod credential;
pub mod error;
pub mod gate;
pub mod models;
pub mod moderation;
pub mod openapi;
pub mod repo;
pub mod routes;
pub mod storage;

// Re-export commonly used items for tests / external users
pub use config::AppConfig;
pub use routes::{config, AppState};
