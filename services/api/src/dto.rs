//! services/api/src/dto.rs
//!
//! Serializable views of the domain entities, handed to the hosting
//! platform for presentation. They mirror the shapes the host's frontend
//! expects and carry a few derived values (score ceiling, total time
//! budget) alongside the raw attempt data.

use chrono::{DateTime, Utc};
use quiz_engine_core::domain::{Category, Game, GameSession, LevelOverview, Question};
use serde::Serialize;
use uuid::Uuid;

/// View of a game session.
#[derive(Debug, Serialize)]
pub struct GameSessionDto {
    pub id: Uuid,
    pub game_id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub level_order: Vec<Uuid>,
    pub score: i64,
    pub answers_total: u32,
    pub answers_correct: u32,
    /// "progress", "finished" or "dumped".
    pub state: &'static str,
}

impl GameSessionDto {
    pub fn from_domain(session: &GameSession) -> Self {
        Self {
            id: session.id,
            game_id: session.game_id,
            user_id: session.user_id,
            created_at: session.created_at,
            updated_at: session.updated_at,
            level_order: session.level_order.clone(),
            score: session.score,
            answers_total: session.answers_total,
            answers_correct: session.answers_correct,
            state: session.state.as_str(),
        }
    }
}

/// View of a question attempt, including the derived scoring bounds the
/// frontend needs to render the countdown.
#[derive(Debug, Serialize)]
pub struct QuestionDto {
    pub id: Uuid,
    pub session_id: Uuid,
    pub level_id: Uuid,
    pub bank_ref: Uuid,
    pub answer_order: Vec<Uuid>,
    pub given_answer: Option<Uuid>,
    pub finished: bool,
    pub correct: bool,
    pub score: i64,
    pub time_remaining: i64,
    pub created_at: DateTime<Utc>,
    /// Maximum achievable score: the game's base question duration.
    pub score_max: i64,
    /// Total time budget in seconds (base duration plus reading time).
    pub time_max: i64,
}

impl QuestionDto {
    /// `time_max` is computed by the caller via
    /// [`quiz_engine_core::timing::available_seconds`], since it needs the
    /// resolved bank question.
    pub fn from_domain(question: &Question, game: &Game, time_max: i64) -> Self {
        Self {
            id: question.id,
            session_id: question.session_id,
            level_id: question.level_id,
            bank_ref: question.bank_ref,
            answer_order: question.answer_order.clone(),
            given_answer: question.given_answer,
            finished: question.finished,
            correct: question.correct,
            score: question.score,
            time_remaining: question.time_remaining,
            created_at: question.created_at,
            score_max: game.question_duration,
            time_max,
        }
    }
}

/// Attempt summary embedded in a level listing.
#[derive(Debug, Serialize)]
pub struct AttemptSummaryDto {
    pub question_id: Uuid,
    pub finished: bool,
    pub correct: bool,
    pub score: i64,
    pub given_answer: Option<Uuid>,
    pub time_remaining: i64,
}

/// View of a level, annotated with the current session's attempt if any.
#[derive(Debug, Serialize)]
pub struct LevelDto {
    pub id: Uuid,
    pub game_id: Uuid,
    pub position: u32,
    pub name: String,
    pub bg_color: String,
    pub image: Option<String>,
    pub attempt: Option<AttemptSummaryDto>,
}

impl LevelDto {
    pub fn from_overview(overview: &LevelOverview) -> Self {
        Self {
            id: overview.level.id,
            game_id: overview.level.game_id,
            position: overview.level.position,
            name: overview.level.name.clone(),
            bg_color: overview.level.bg_color.clone(),
            image: overview.level.image.clone(),
            attempt: overview.question.as_ref().map(|question| AttemptSummaryDto {
                question_id: question.id,
                finished: question.finished,
                correct: question.correct,
                score: question.score,
                given_answer: question.given_answer,
                time_remaining: question.time_remaining,
            }),
        }
    }
}

/// View of a level category.
#[derive(Debug, Serialize)]
pub struct CategoryDto {
    pub id: Uuid,
    pub level_id: Uuid,
    pub category_ref: Uuid,
    pub include_subcategories: bool,
}

impl CategoryDto {
    pub fn from_domain(category: &Category) -> Self {
        Self {
            id: category.id,
            level_id: category.level_id,
            category_ref: category.category_ref,
            include_subcategories: category.include_subcategories,
        }
    }
}
