//! crates/quiz_engine_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the engine's collaborators.
//! These traits form the boundary of the hexagonal architecture, allowing
//! the engine to be independent of the hosting platform's storage, question
//! bank, completion tracking, and file handling.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use uuid::Uuid;

use crate::domain::{
    BankQuestion, Category, CategoryFilter, Game, GameSession, Level, Question,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors of external services (database,
/// question bank, file storage) behind a small shared vocabulary.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// A uniqueness constraint was violated, e.g. a second attempt record
    /// for the same (session, level) pair.
    #[error("Duplicate key: {0}")]
    Duplicate(String),
    /// A compare-and-persist update lost against a concurrent writer.
    #[error("Concurrent modification: {0}")]
    Conflict(String),
    /// The backing service is unreachable; the operation is retryable.
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Store Port
//=========================================================================================

/// The relational store behind the engine.
///
/// All `update_*` methods use compare-and-persist semantics: the write only
/// succeeds if the stored row still carries the `version` of the passed
/// value, and the stored version is bumped on success. A lost race surfaces
/// as [`PortError::Conflict`]. `insert_question` must enforce uniqueness of
/// the (session, level) pair and report violations as
/// [`PortError::Duplicate`].
#[async_trait]
pub trait GameStore: Send + Sync {
    // --- Games (read-only config owned by the host) ---
    async fn get_game(&self, game_id: Uuid) -> PortResult<Game>;

    // --- Levels ---
    async fn get_level(&self, level_id: Uuid) -> PortResult<Level>;

    /// All ACTIVE levels of a game, ordered by ascending position.
    async fn active_levels(&self, game_id: Uuid) -> PortResult<Vec<Level>>;

    /// The ACTIVE level at the given position, if any.
    async fn active_level_by_position(
        &self,
        game_id: Uuid,
        position: u32,
    ) -> PortResult<Option<Level>>;

    async fn insert_level(&self, level: Level) -> PortResult<Level>;

    async fn update_level(&self, level: &Level) -> PortResult<Level>;

    // --- Categories ---
    async fn categories_for_level(&self, level_id: Uuid) -> PortResult<Vec<Category>>;

    async fn insert_category(&self, category: Category) -> PortResult<Category>;

    async fn update_category(&self, category: &Category) -> PortResult<Category>;

    async fn delete_category(&self, category_id: Uuid) -> PortResult<()>;

    // --- Game sessions ---
    async fn get_session(&self, session_id: Uuid) -> PortResult<GameSession>;

    /// All PROGRESS sessions of (game, user).
    async fn sessions_in_progress(
        &self,
        game_id: Uuid,
        user_id: Uuid,
    ) -> PortResult<Vec<GameSession>>;

    /// The most recently modified PROGRESS or FINISHED session of
    /// (game, user), if any.
    async fn latest_resumable_session(
        &self,
        game_id: Uuid,
        user_id: Uuid,
    ) -> PortResult<Option<GameSession>>;

    async fn insert_session(&self, session: GameSession) -> PortResult<GameSession>;

    async fn update_session(&self, session: &GameSession) -> PortResult<GameSession>;

    // --- Question attempts ---
    async fn get_question(&self, question_id: Uuid) -> PortResult<Question>;

    async fn question_for_level(
        &self,
        session_id: Uuid,
        level_id: Uuid,
    ) -> PortResult<Option<Question>>;

    async fn insert_question(&self, question: Question) -> PortResult<Question>;

    async fn update_question(&self, question: &Question) -> PortResult<Question>;
}

//=========================================================================================
// Host Collaborator Ports
//=========================================================================================

/// The host platform's question bank.
#[async_trait]
pub trait QuestionSource: Send + Sync {
    /// Draws a random question from the bank, restricted to the given
    /// category filters. Fails with [`PortError::NotFound`] when no
    /// question matches.
    async fn fetch_random_question(
        &self,
        filters: &[CategoryFilter],
    ) -> PortResult<BankQuestion>;

    /// Resolves a previously drawn question by its bank reference.
    async fn get_bank_question(&self, bank_ref: Uuid) -> PortResult<BankQuestion>;
}

/// The host platform's activity-completion tracker. Invoked once when a
/// session transitions to FINISHED.
#[async_trait]
pub trait CompletionNotifier: Send + Sync {
    async fn notify_complete(&self, user_id: Uuid, game_id: Uuid) -> PortResult<()>;
}

/// The host platform's file storage for level artwork. Opaque to the engine;
/// it only keeps the returned filename on the level.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Stores the uploaded artwork and returns the filename to keep.
    async fn store_level_image(
        &self,
        level_id: Uuid,
        mime_type: &str,
        content: &[u8],
    ) -> PortResult<String>;

    async fn delete_level_image(&self, level_id: Uuid, filename: &str) -> PortResult<()>;
}

/// Capability callback for administrative level management. The hosting
/// platform decides who may edit levels; the engine only asks.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn can_manage_levels(&self, user_id: Uuid, game_id: Uuid) -> PortResult<bool>;
}

//=========================================================================================
// Clock and Shuffle Ports
//=========================================================================================

/// Wall-clock access, injected so tests can control elapsed time. All
/// elapsed-time computation is `now - stored creation timestamp`; the engine
/// never runs a timer of its own.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The production clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Shuffling of id sequences (level order, answer order), injected for
/// determinism in tests.
pub trait Shuffle: Send + Sync {
    fn shuffle_ids(&self, ids: &mut [Uuid]);
}

/// The production shuffler: a uniformly random permutation.
pub struct ThreadRngShuffle;

impl Shuffle for ThreadRngShuffle {
    fn shuffle_ids(&self, ids: &mut [Uuid]) {
        ids.shuffle(&mut rand::thread_rng());
    }
}
