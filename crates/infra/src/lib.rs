//! Infrastructure layer: configuration, persistence, external service clients
//! and background jobs.

pub mod ai;
pub mod config;
pub mod jobs;
pub mod store;

pub use config::{AiConfig, AppConfig, AuthConfig, ConfigError};
pub use jobs::{StuckPurposeRunner, StuckPurposeRunnerHandle, run_stuck_scan};
pub use store::{InMemoryStore, PostgresStore, ProcurementStore, SharedStore, StoreError, StoreResult};
