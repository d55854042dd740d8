//! crates/quiz_engine_core/src/domain.rs
//!
//! Defines the pure, core data structures for the quiz-game engine.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// The configured activity instance. Owned by the hosting platform and
/// read-only to this engine.
#[derive(Debug, Clone)]
pub struct Game {
    pub id: Uuid,
    /// Base time (in seconds) a user gets per question; also the score
    /// ceiling for a correct answer.
    pub question_duration: i64,
    /// Expected reading speed used for the reading-time extension.
    pub words_per_minute: u32,
    pub shuffle_levels: bool,
    pub shuffle_answers: bool,
    /// Number of currently active levels; a session finishes when it has
    /// this many answers.
    pub active_level_count: u32,
}

/// Lifecycle state of a level. Levels are never hard-deleted so that old
/// game sessions can still resolve their fixed level order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelState {
    Active,
    Deleted,
}

impl LevelState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LevelState::Active => "active",
            LevelState::Deleted => "deleted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(LevelState::Active),
            "deleted" => Some(LevelState::Deleted),
            _ => None,
        }
    }
}

/// One stage of a game. Positions among ACTIVE levels of one game form a
/// dense 0..N-1 sequence.
#[derive(Debug, Clone)]
pub struct Level {
    pub id: Uuid,
    pub game_id: Uuid,
    pub position: u32,
    pub name: String,
    pub bg_color: String,
    /// Filename of the level artwork inside the host's image store.
    pub image: Option<String>,
    pub state: LevelState,
    /// Optimistic concurrency token, bumped by the store on every update.
    pub version: i64,
}

impl Level {
    pub fn is_active(&self) -> bool {
        self.state == LevelState::Active
    }
}

/// A question-bank category a level draws its questions from. Owned
/// exclusively by its level.
#[derive(Debug, Clone)]
pub struct Category {
    pub id: Uuid,
    pub level_id: Uuid,
    /// Reference into the host platform's category tree.
    pub category_ref: Uuid,
    pub include_subcategories: bool,
}

impl Category {
    pub fn to_filter(&self) -> CategoryFilter {
        CategoryFilter {
            category_ref: self.category_ref,
            include_subcategories: self.include_subcategories,
        }
    }
}

/// Category constraint passed to the question source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryFilter {
    pub category_ref: Uuid,
    pub include_subcategories: bool,
}

/// Lifecycle state of a game session. FINISHED and DUMPED are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Progress,
    Finished,
    Dumped,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Progress => "progress",
            SessionState::Finished => "finished",
            SessionState::Dumped => "dumped",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "progress" => Some(SessionState::Progress),
            "finished" => Some(SessionState::Finished),
            "dumped" => Some(SessionState::Dumped),
            _ => None,
        }
    }
}

/// One playthrough of a game by one user.
///
/// The level order is materialized once at creation and never changes, so a
/// running session keeps a stable level sequence even if levels are
/// reordered or soft-deleted afterwards.
#[derive(Debug, Clone)]
pub struct GameSession {
    pub id: Uuid,
    pub game_id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub level_order: Vec<Uuid>,
    pub score: i64,
    pub answers_total: u32,
    pub answers_correct: u32,
    pub state: SessionState,
    /// Optimistic concurrency token, bumped by the store on every update.
    pub version: i64,
}

impl GameSession {
    pub fn is_in_progress(&self) -> bool {
        self.state == SessionState::Progress
    }

    pub fn is_finished(&self) -> bool {
        self.state == SessionState::Finished
    }
}

/// The per-(session, level) attempt record — distinct from the question-bank
/// item it references.
///
/// Created lazily on the first visit of a level; its creation timestamp is
/// the start of the answer timer. Immutable once `finished` is true.
#[derive(Debug, Clone)]
pub struct Question {
    pub id: Uuid,
    pub session_id: Uuid,
    pub level_id: Uuid,
    /// Reference to the opaque question-bank item.
    pub bank_ref: Uuid,
    /// Permutation of the bank item's answer-option ids, materialized at
    /// creation so the presentation is stable across requests.
    pub answer_order: Vec<Uuid>,
    pub given_answer: Option<Uuid>,
    pub finished: bool,
    pub correct: bool,
    /// Points earned; 0 if incorrect, unanswered, or expired.
    pub score: i64,
    /// Seconds left of the time budget when the question was finalized.
    pub time_remaining: i64,
    pub created_at: DateTime<Utc>,
    /// Optimistic concurrency token, bumped by the store on every update.
    pub version: i64,
}

/// An answer option of a question-bank item, as exposed by the host.
#[derive(Debug, Clone)]
pub struct BankAnswer {
    pub id: Uuid,
    pub text: String,
    pub correct: bool,
}

/// A question-bank item as exposed by the host's question source.
#[derive(Debug, Clone)]
pub struct BankQuestion {
    pub id: Uuid,
    pub text: String,
    pub answers: Vec<BankAnswer>,
}

impl BankQuestion {
    /// Ids of all answer options, in the bank's own order.
    pub fn answer_ids(&self) -> Vec<Uuid> {
        self.answers.iter().map(|a| a.id).collect()
    }

    /// The single correct answer, or `None` if the item does not expose
    /// exactly one correct option (authoring-data integrity problem).
    pub fn single_correct_answer(&self) -> Option<&BankAnswer> {
        let mut correct = self.answers.iter().filter(|a| a.correct);
        match (correct.next(), correct.next()) {
            (Some(answer), None) => Some(answer),
            _ => None,
        }
    }
}

/// A level annotated with the attempt of a particular session, as returned
/// by the level listing.
#[derive(Debug, Clone)]
pub struct LevelOverview {
    pub level: Level,
    pub question: Option<Question>,
}

/// What to do with a level's artwork when saving the level.
#[derive(Debug, Clone)]
pub enum ImageChange {
    /// Leave the stored artwork untouched.
    Keep,
    /// Remove the stored artwork.
    Clear,
    /// Replace the artwork with the given upload.
    Upload { mime_type: String, content: Vec<u8> },
}

/// Desired state of one category in a level save payload.
#[derive(Debug, Clone)]
pub struct CategoryDraft {
    /// Identity of an already-stored category, or `None` for a new one.
    pub id: Option<Uuid>,
    pub category_ref: Uuid,
    pub include_subcategories: bool,
}

/// Admin save payload for a level. `id == None` creates a new level at the
/// end of the game's level sequence.
#[derive(Debug, Clone)]
pub struct LevelDraft {
    pub id: Option<Uuid>,
    pub name: String,
    pub bg_color: String,
    pub image: ImageChange,
    pub categories: Vec<CategoryDraft>,
}
