//! crates/quiz_engine_core/src/error.rs
//!
//! The engine's error taxonomy. Every variant is rejected before any
//! mutation, except `Port`, which carries store/collaborator failures
//! through unchanged.

use uuid::Uuid;

use crate::ports::PortError;

/// The primary error type of the quiz-game engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Malformed or out-of-range input, e.g. a reorder delta outside {±1}.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// The session, level, or question does not belong to the caller's
    /// game or user.
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// The game session is not in PROGRESS anymore.
    #[error("The game session is not available anymore")]
    SessionClosed,

    /// The question has already been answered or expired.
    #[error("The question has already been answered")]
    AlreadyAnswered,

    /// A reference points at an entity of the wrong parent, e.g. a question
    /// of a different session.
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// The question-bank item does not expose exactly one correct answer;
    /// an authoring-data integrity problem, not user-recoverable.
    #[error("The question-bank item {0} is not applicable for this activity")]
    UnsupportedQuestion(Uuid),

    /// A failure that propagated up from one of the collaborator ports.
    #[error(transparent)]
    Port(#[from] PortError),
}

/// A convenience type alias for `Result<T, EngineError>`.
pub type EngineResult<T> = Result<T, EngineError>;
