//! services/api/src/adapters/db.rs
//!
//! The PostgreSQL store adapter: the concrete implementation of the
//! `GameStore` port using `sqlx`. Optimistic versioning and the uniqueness
//! of (session, level) attempt rows are enforced here, backed by the
//! schema in `migrations/`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quiz_engine_core::domain::{
    Category, Game, GameSession, Level, LevelState, Question, SessionState,
};
use quiz_engine_core::ports::{GameStore, PortError, PortResult};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::config::Config;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `GameStore` port.
#[derive(Clone)]
pub struct DbStore {
    pool: PgPool,
}

impl DbStore {
    /// Creates a new `DbStore` on an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a fresh pool from the service configuration.
    pub async fn connect(config: &Config) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .connect(&config.database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Maps a sqlx failure onto the shared port vocabulary.
fn map_db_error(error: sqlx::Error) -> PortError {
    match error {
        sqlx::Error::RowNotFound => PortError::NotFound("row not found".to_string()),
        sqlx::Error::Database(db) if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation) => {
            PortError::Duplicate(db.to_string())
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            PortError::Unavailable(error.to_string())
        }
        other => PortError::Unexpected(other.to_string()),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct GameRecord {
    id: Uuid,
    question_duration: i64,
    words_per_minute: i32,
    shuffle_levels: bool,
    shuffle_answers: bool,
    active_level_count: i64,
}

impl GameRecord {
    fn to_domain(self) -> Game {
        Game {
            id: self.id,
            question_duration: self.question_duration,
            words_per_minute: self.words_per_minute as u32,
            shuffle_levels: self.shuffle_levels,
            shuffle_answers: self.shuffle_answers,
            active_level_count: self.active_level_count as u32,
        }
    }
}

#[derive(FromRow)]
struct LevelRecord {
    id: Uuid,
    game_id: Uuid,
    position: i32,
    name: String,
    bg_color: String,
    image: Option<String>,
    state: String,
    version: i64,
}

impl LevelRecord {
    fn to_domain(self) -> PortResult<Level> {
        let state = LevelState::parse(&self.state).ok_or_else(|| {
            PortError::Unexpected(format!("unknown level state '{}'", self.state))
        })?;
        Ok(Level {
            id: self.id,
            game_id: self.game_id,
            position: self.position as u32,
            name: self.name,
            bg_color: self.bg_color,
            image: self.image,
            state,
            version: self.version,
        })
    }
}

#[derive(FromRow)]
struct CategoryRecord {
    id: Uuid,
    level_id: Uuid,
    category_ref: Uuid,
    include_subcategories: bool,
}

impl CategoryRecord {
    fn to_domain(self) -> Category {
        Category {
            id: self.id,
            level_id: self.level_id,
            category_ref: self.category_ref,
            include_subcategories: self.include_subcategories,
        }
    }
}

#[derive(FromRow)]
struct SessionRecord {
    id: Uuid,
    game_id: Uuid,
    user_id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    level_order: Vec<Uuid>,
    score: i64,
    answers_total: i32,
    answers_correct: i32,
    state: String,
    version: i64,
}

impl SessionRecord {
    fn to_domain(self) -> PortResult<GameSession> {
        let state = SessionState::parse(&self.state).ok_or_else(|| {
            PortError::Unexpected(format!("unknown session state '{}'", self.state))
        })?;
        Ok(GameSession {
            id: self.id,
            game_id: self.game_id,
            user_id: self.user_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
            level_order: self.level_order,
            score: self.score,
            answers_total: self.answers_total as u32,
            answers_correct: self.answers_correct as u32,
            state,
            version: self.version,
        })
    }
}

#[derive(FromRow)]
struct QuestionRecord {
    id: Uuid,
    session_id: Uuid,
    level_id: Uuid,
    bank_ref: Uuid,
    answer_order: Vec<Uuid>,
    given_answer: Option<Uuid>,
    finished: bool,
    correct: bool,
    score: i64,
    time_remaining: i64,
    created_at: DateTime<Utc>,
    version: i64,
}

impl QuestionRecord {
    fn to_domain(self) -> Question {
        Question {
            id: self.id,
            session_id: self.session_id,
            level_id: self.level_id,
            bank_ref: self.bank_ref,
            answer_order: self.answer_order,
            given_answer: self.given_answer,
            finished: self.finished,
            correct: self.correct,
            score: self.score,
            time_remaining: self.time_remaining,
            created_at: self.created_at,
            version: self.version,
        }
    }
}

const LEVEL_COLUMNS: &str = "id, game_id, position, name, bg_color, image, state, version";
const SESSION_COLUMNS: &str = "id, game_id, user_id, created_at, updated_at, level_order, \
     score, answers_total, answers_correct, state, version";
const QUESTION_COLUMNS: &str = "id, session_id, level_id, bank_ref, answer_order, \
     given_answer, finished, correct, score, time_remaining, created_at, version";

//=========================================================================================
// `GameStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl GameStore for DbStore {
    async fn get_game(&self, game_id: Uuid) -> PortResult<Game> {
        let record = sqlx::query_as::<_, GameRecord>(
            "SELECT g.id, g.question_duration, g.words_per_minute, g.shuffle_levels, \
                    g.shuffle_answers, \
                    (SELECT COUNT(*) FROM quiz_levels l \
                      WHERE l.game_id = g.id AND l.state = 'active') AS active_level_count \
               FROM quiz_games g WHERE g.id = $1",
        )
        .bind(game_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("Game {} not found", game_id)),
            other => map_db_error(other),
        })?;
        Ok(record.to_domain())
    }

    async fn get_level(&self, level_id: Uuid) -> PortResult<Level> {
        let record = sqlx::query_as::<_, LevelRecord>(&format!(
            "SELECT {LEVEL_COLUMNS} FROM quiz_levels WHERE id = $1"
        ))
        .bind(level_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                PortError::NotFound(format!("Level {} not found", level_id))
            }
            other => map_db_error(other),
        })?;
        record.to_domain()
    }

    async fn active_levels(&self, game_id: Uuid) -> PortResult<Vec<Level>> {
        let records = sqlx::query_as::<_, LevelRecord>(&format!(
            "SELECT {LEVEL_COLUMNS} FROM quiz_levels \
              WHERE game_id = $1 AND state = 'active' ORDER BY position ASC"
        ))
        .bind(game_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn active_level_by_position(
        &self,
        game_id: Uuid,
        position: u32,
    ) -> PortResult<Option<Level>> {
        let record = sqlx::query_as::<_, LevelRecord>(&format!(
            "SELECT {LEVEL_COLUMNS} FROM quiz_levels \
              WHERE game_id = $1 AND state = 'active' AND position = $2"
        ))
        .bind(game_id)
        .bind(position as i32)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;
        record.map(|r| r.to_domain()).transpose()
    }

    async fn insert_level(&self, level: Level) -> PortResult<Level> {
        let record = sqlx::query_as::<_, LevelRecord>(&format!(
            "INSERT INTO quiz_levels (id, game_id, position, name, bg_color, image, state, version) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, 0) RETURNING {LEVEL_COLUMNS}"
        ))
        .bind(level.id)
        .bind(level.game_id)
        .bind(level.position as i32)
        .bind(&level.name)
        .bind(&level.bg_color)
        .bind(&level.image)
        .bind(level.state.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)?;
        record.to_domain()
    }

    async fn update_level(&self, level: &Level) -> PortResult<Level> {
        let record = sqlx::query_as::<_, LevelRecord>(&format!(
            "UPDATE quiz_levels \
                SET position = $1, name = $2, bg_color = $3, image = $4, state = $5, \
                    version = version + 1 \
              WHERE id = $6 AND version = $7 RETURNING {LEVEL_COLUMNS}"
        ))
        .bind(level.position as i32)
        .bind(&level.name)
        .bind(&level.bg_color)
        .bind(&level.image)
        .bind(level.state.as_str())
        .bind(level.id)
        .bind(level.version)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;
        match record {
            Some(record) => record.to_domain(),
            None => Err(PortError::Conflict(format!(
                "level {} was modified concurrently",
                level.id
            ))),
        }
    }

    async fn categories_for_level(&self, level_id: Uuid) -> PortResult<Vec<Category>> {
        let records = sqlx::query_as::<_, CategoryRecord>(
            "SELECT id, level_id, category_ref, include_subcategories \
               FROM quiz_level_categories WHERE level_id = $1 ORDER BY id",
        )
        .bind(level_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn insert_category(&self, category: Category) -> PortResult<Category> {
        let record = sqlx::query_as::<_, CategoryRecord>(
            "INSERT INTO quiz_level_categories (id, level_id, category_ref, include_subcategories) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, level_id, category_ref, include_subcategories",
        )
        .bind(category.id)
        .bind(category.level_id)
        .bind(category.category_ref)
        .bind(category.include_subcategories)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(record.to_domain())
    }

    async fn update_category(&self, category: &Category) -> PortResult<Category> {
        let record = sqlx::query_as::<_, CategoryRecord>(
            "UPDATE quiz_level_categories \
                SET category_ref = $1, include_subcategories = $2 \
              WHERE id = $3 RETURNING id, level_id, category_ref, include_subcategories",
        )
        .bind(category.category_ref)
        .bind(category.include_subcategories)
        .bind(category.id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;
        match record {
            Some(record) => Ok(record.to_domain()),
            None => Err(PortError::NotFound(format!(
                "Category {} not found",
                category.id
            ))),
        }
    }

    async fn delete_category(&self, category_id: Uuid) -> PortResult<()> {
        sqlx::query("DELETE FROM quiz_level_categories WHERE id = $1")
            .bind(category_id)
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(())
    }

    async fn get_session(&self, session_id: Uuid) -> PortResult<GameSession> {
        let record = sqlx::query_as::<_, SessionRecord>(&format!(
            "SELECT {SESSION_COLUMNS} FROM quiz_game_sessions WHERE id = $1"
        ))
        .bind(session_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                PortError::NotFound(format!("Game session {} not found", session_id))
            }
            other => map_db_error(other),
        })?;
        record.to_domain()
    }

    async fn sessions_in_progress(
        &self,
        game_id: Uuid,
        user_id: Uuid,
    ) -> PortResult<Vec<GameSession>> {
        let records = sqlx::query_as::<_, SessionRecord>(&format!(
            "SELECT {SESSION_COLUMNS} FROM quiz_game_sessions \
              WHERE game_id = $1 AND user_id = $2 AND state = 'progress'"
        ))
        .bind(game_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn latest_resumable_session(
        &self,
        game_id: Uuid,
        user_id: Uuid,
    ) -> PortResult<Option<GameSession>> {
        let record = sqlx::query_as::<_, SessionRecord>(&format!(
            "SELECT {SESSION_COLUMNS} FROM quiz_game_sessions \
              WHERE game_id = $1 AND user_id = $2 AND state IN ('progress', 'finished') \
              ORDER BY updated_at DESC LIMIT 1"
        ))
        .bind(game_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;
        record.map(|r| r.to_domain()).transpose()
    }

    async fn insert_session(&self, session: GameSession) -> PortResult<GameSession> {
        let record = sqlx::query_as::<_, SessionRecord>(&format!(
            "INSERT INTO quiz_game_sessions \
                (id, game_id, user_id, created_at, updated_at, level_order, score, \
                 answers_total, answers_correct, state, version) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 0) \
             RETURNING {SESSION_COLUMNS}"
        ))
        .bind(session.id)
        .bind(session.game_id)
        .bind(session.user_id)
        .bind(session.created_at)
        .bind(session.updated_at)
        .bind(&session.level_order)
        .bind(session.score)
        .bind(session.answers_total as i32)
        .bind(session.answers_correct as i32)
        .bind(session.state.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)?;
        record.to_domain()
    }

    async fn update_session(&self, session: &GameSession) -> PortResult<GameSession> {
        let record = sqlx::query_as::<_, SessionRecord>(&format!(
            "UPDATE quiz_game_sessions \
                SET updated_at = $1, score = $2, answers_total = $3, answers_correct = $4, \
                    state = $5, version = version + 1 \
              WHERE id = $6 AND version = $7 RETURNING {SESSION_COLUMNS}"
        ))
        .bind(session.updated_at)
        .bind(session.score)
        .bind(session.answers_total as i32)
        .bind(session.answers_correct as i32)
        .bind(session.state.as_str())
        .bind(session.id)
        .bind(session.version)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;
        match record {
            Some(record) => record.to_domain(),
            None => Err(PortError::Conflict(format!(
                "game session {} was modified concurrently",
                session.id
            ))),
        }
    }

    async fn get_question(&self, question_id: Uuid) -> PortResult<Question> {
        let record = sqlx::query_as::<_, QuestionRecord>(&format!(
            "SELECT {QUESTION_COLUMNS} FROM quiz_questions WHERE id = $1"
        ))
        .bind(question_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                PortError::NotFound(format!("Question {} not found", question_id))
            }
            other => map_db_error(other),
        })?;
        Ok(record.to_domain())
    }

    async fn question_for_level(
        &self,
        session_id: Uuid,
        level_id: Uuid,
    ) -> PortResult<Option<Question>> {
        let record = sqlx::query_as::<_, QuestionRecord>(&format!(
            "SELECT {QUESTION_COLUMNS} FROM quiz_questions \
              WHERE session_id = $1 AND level_id = $2"
        ))
        .bind(session_id)
        .bind(level_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(record.map(|r| r.to_domain()))
    }

    async fn insert_question(&self, question: Question) -> PortResult<Question> {
        // The UNIQUE (session_id, level_id) constraint turns a concurrent
        // first visit into a Duplicate error the engine resolves as a read.
        let record = sqlx::query_as::<_, QuestionRecord>(&format!(
            "INSERT INTO quiz_questions \
                (id, session_id, level_id, bank_ref, answer_order, given_answer, \
                 finished, correct, score, time_remaining, created_at, version) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 0) \
             RETURNING {QUESTION_COLUMNS}"
        ))
        .bind(question.id)
        .bind(question.session_id)
        .bind(question.level_id)
        .bind(question.bank_ref)
        .bind(&question.answer_order)
        .bind(question.given_answer)
        .bind(question.finished)
        .bind(question.correct)
        .bind(question.score)
        .bind(question.time_remaining)
        .bind(question.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(record.to_domain())
    }

    async fn update_question(&self, question: &Question) -> PortResult<Question> {
        let record = sqlx::query_as::<_, QuestionRecord>(&format!(
            "UPDATE quiz_questions \
                SET given_answer = $1, finished = $2, correct = $3, score = $4, \
                    time_remaining = $5, version = version + 1 \
              WHERE id = $6 AND version = $7 RETURNING {QUESTION_COLUMNS}"
        ))
        .bind(question.given_answer)
        .bind(question.finished)
        .bind(question.correct)
        .bind(question.score)
        .bind(question.time_remaining)
        .bind(question.id)
        .bind(question.version)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;
        match record {
            Some(record) => Ok(record.to_domain()),
            None => Err(PortError::Conflict(format!(
                "question {} was modified concurrently",
                question.id
            ))),
        }
    }
}
