//! services/api/src/error.rs
//!
//! Defines the primary error type for the `api` service.

use quiz_engine_core::ports::PortError;
use quiz_engine_core::EngineError;

use crate::config::ConfigError;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error surfaced by the quiz-game engine.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Represents an error that propagated up from one of the core service
    /// ports.
    #[error("Service port error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}
