//! services/api/src/adapters/memory.rs
//!
//! An in-memory implementation of the `GameStore` port. Used by the
//! integration tests and for embedding the engine without a database; it
//! honors the same contract as the PostgreSQL adapter, including the
//! optimistic version checks and the uniqueness of (session, level)
//! attempt rows.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use quiz_engine_core::domain::{Category, Game, GameSession, Level, Question, SessionState};
use quiz_engine_core::ports::{GameStore, PortError, PortResult};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    games: HashMap<Uuid, Game>,
    levels: HashMap<Uuid, Level>,
    categories: HashMap<Uuid, Category>,
    sessions: HashMap<Uuid, GameSession>,
    questions: HashMap<Uuid, Question>,
    /// Uniqueness index over (session, level), like the database constraint.
    question_keys: HashMap<(Uuid, Uuid), Uuid>,
}

/// An in-memory store. Cheap to clone handles via `Arc`.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a game config row. The `active_level_count` field is kept in
    /// sync automatically from the seeded levels.
    pub fn seed_game(&self, game: Game) {
        self.tables.lock().unwrap().games.insert(game.id, game);
    }

    pub fn seed_level(&self, level: Level) {
        self.tables.lock().unwrap().levels.insert(level.id, level);
    }

    pub fn seed_category(&self, category: Category) {
        self.tables
            .lock()
            .unwrap()
            .categories
            .insert(category.id, category);
    }

    /// Direct read access for test assertions.
    pub fn level_snapshot(&self, level_id: Uuid) -> Option<Level> {
        self.tables.lock().unwrap().levels.get(&level_id).cloned()
    }

    fn active_levels_sorted(tables: &Tables, game_id: Uuid) -> Vec<Level> {
        let mut levels: Vec<Level> = tables
            .levels
            .values()
            .filter(|level| level.game_id == game_id && level.is_active())
            .cloned()
            .collect();
        levels.sort_by_key(|level| level.position);
        levels
    }
}

#[async_trait]
impl GameStore for MemoryStore {
    async fn get_game(&self, game_id: Uuid) -> PortResult<Game> {
        let tables = self.tables.lock().unwrap();
        let mut game = tables
            .games
            .get(&game_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Game {} not found", game_id)))?;
        game.active_level_count = Self::active_levels_sorted(&tables, game_id).len() as u32;
        Ok(game)
    }

    async fn get_level(&self, level_id: Uuid) -> PortResult<Level> {
        self.tables
            .lock()
            .unwrap()
            .levels
            .get(&level_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Level {} not found", level_id)))
    }

    async fn active_levels(&self, game_id: Uuid) -> PortResult<Vec<Level>> {
        let tables = self.tables.lock().unwrap();
        Ok(Self::active_levels_sorted(&tables, game_id))
    }

    async fn active_level_by_position(
        &self,
        game_id: Uuid,
        position: u32,
    ) -> PortResult<Option<Level>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .levels
            .values()
            .find(|level| {
                level.game_id == game_id && level.is_active() && level.position == position
            })
            .cloned())
    }

    async fn insert_level(&self, level: Level) -> PortResult<Level> {
        let mut tables = self.tables.lock().unwrap();
        if tables.levels.contains_key(&level.id) {
            return Err(PortError::Duplicate(format!(
                "level {} already exists",
                level.id
            )));
        }
        let mut stored = level;
        stored.version = 0;
        tables.levels.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn update_level(&self, level: &Level) -> PortResult<Level> {
        let mut tables = self.tables.lock().unwrap();
        let current = tables
            .levels
            .get(&level.id)
            .ok_or_else(|| PortError::NotFound(format!("Level {} not found", level.id)))?;
        if current.version != level.version {
            return Err(PortError::Conflict(format!(
                "level {} was modified concurrently",
                level.id
            )));
        }
        let mut stored = level.clone();
        stored.version += 1;
        tables.levels.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn categories_for_level(&self, level_id: Uuid) -> PortResult<Vec<Category>> {
        let tables = self.tables.lock().unwrap();
        let mut categories: Vec<Category> = tables
            .categories
            .values()
            .filter(|category| category.level_id == level_id)
            .cloned()
            .collect();
        categories.sort_by_key(|category| category.id);
        Ok(categories)
    }

    async fn insert_category(&self, category: Category) -> PortResult<Category> {
        let mut tables = self.tables.lock().unwrap();
        if tables.categories.contains_key(&category.id) {
            return Err(PortError::Duplicate(format!(
                "category {} already exists",
                category.id
            )));
        }
        tables.categories.insert(category.id, category.clone());
        Ok(category)
    }

    async fn update_category(&self, category: &Category) -> PortResult<Category> {
        let mut tables = self.tables.lock().unwrap();
        if !tables.categories.contains_key(&category.id) {
            return Err(PortError::NotFound(format!(
                "Category {} not found",
                category.id
            )));
        }
        tables.categories.insert(category.id, category.clone());
        Ok(category.clone())
    }

    async fn delete_category(&self, category_id: Uuid) -> PortResult<()> {
        self.tables.lock().unwrap().categories.remove(&category_id);
        Ok(())
    }

    async fn get_session(&self, session_id: Uuid) -> PortResult<GameSession> {
        self.tables
            .lock()
            .unwrap()
            .sessions
            .get(&session_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Game session {} not found", session_id)))
    }

    async fn sessions_in_progress(
        &self,
        game_id: Uuid,
        user_id: Uuid,
    ) -> PortResult<Vec<GameSession>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .sessions
            .values()
            .filter(|session| {
                session.game_id == game_id
                    && session.user_id == user_id
                    && session.is_in_progress()
            })
            .cloned()
            .collect())
    }

    async fn latest_resumable_session(
        &self,
        game_id: Uuid,
        user_id: Uuid,
    ) -> PortResult<Option<GameSession>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .sessions
            .values()
            .filter(|session| {
                session.game_id == game_id
                    && session.user_id == user_id
                    && matches!(
                        session.state,
                        SessionState::Progress | SessionState::Finished
                    )
            })
            .max_by_key(|session| session.updated_at)
            .cloned())
    }

    async fn insert_session(&self, session: GameSession) -> PortResult<GameSession> {
        let mut tables = self.tables.lock().unwrap();
        if tables.sessions.contains_key(&session.id) {
            return Err(PortError::Duplicate(format!(
                "game session {} already exists",
                session.id
            )));
        }
        let mut stored = session;
        stored.version = 0;
        tables.sessions.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn update_session(&self, session: &GameSession) -> PortResult<GameSession> {
        let mut tables = self.tables.lock().unwrap();
        let current = tables
            .sessions
            .get(&session.id)
            .ok_or_else(|| PortError::NotFound(format!("Game session {} not found", session.id)))?;
        if current.version != session.version {
            return Err(PortError::Conflict(format!(
                "game session {} was modified concurrently",
                session.id
            )));
        }
        let mut stored = session.clone();
        stored.version += 1;
        tables.sessions.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_question(&self, question_id: Uuid) -> PortResult<Question> {
        self.tables
            .lock()
            .unwrap()
            .questions
            .get(&question_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Question {} not found", question_id)))
    }

    async fn question_for_level(
        &self,
        session_id: Uuid,
        level_id: Uuid,
    ) -> PortResult<Option<Question>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .question_keys
            .get(&(session_id, level_id))
            .and_then(|id| tables.questions.get(id))
            .cloned())
    }

    async fn insert_question(&self, question: Question) -> PortResult<Question> {
        let mut tables = self.tables.lock().unwrap();
        let key = (question.session_id, question.level_id);
        if tables.question_keys.contains_key(&key) {
            return Err(PortError::Duplicate(format!(
                "question for session {} and level {} already exists",
                question.session_id, question.level_id
            )));
        }
        let mut stored = question;
        stored.version = 0;
        tables.question_keys.insert(key, stored.id);
        tables.questions.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn update_question(&self, question: &Question) -> PortResult<Question> {
        let mut tables = self.tables.lock().unwrap();
        let current = tables
            .questions
            .get(&question.id)
            .ok_or_else(|| PortError::NotFound(format!("Question {} not found", question.id)))?;
        if current.version != question.version {
            return Err(PortError::Conflict(format!(
                "question {} was modified concurrently",
                question.id
            )));
        }
        let mut stored = question.clone();
        stored.version += 1;
        tables.questions.insert(stored.id, stored.clone());
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn question(session_id: Uuid, level_id: Uuid) -> Question {
        Question {
            id: Uuid::new_v4(),
            session_id,
            level_id,
            bank_ref: Uuid::new_v4(),
            answer_order: vec![Uuid::new_v4()],
            given_answer: None,
            finished: false,
            correct: false,
            score: 0,
            time_remaining: 0,
            created_at: Utc::now(),
            version: 0,
        }
    }

    #[tokio::test]
    async fn second_insert_for_same_session_and_level_is_a_duplicate() {
        let store = MemoryStore::new();
        let session_id = Uuid::new_v4();
        let level_id = Uuid::new_v4();

        store
            .insert_question(question(session_id, level_id))
            .await
            .unwrap();
        let err = store
            .insert_question(question(session_id, level_id))
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Duplicate(_)));
    }

    #[tokio::test]
    async fn stale_version_update_conflicts() {
        let store = MemoryStore::new();
        let inserted = store
            .insert_question(question(Uuid::new_v4(), Uuid::new_v4()))
            .await
            .unwrap();

        let mut first = inserted.clone();
        first.finished = true;
        store.update_question(&first).await.unwrap();

        // The second writer still holds version 0.
        let mut second = inserted;
        second.correct = true;
        let err = store.update_question(&second).await.unwrap_err();
        assert!(matches!(err, PortError::Conflict(_)));
    }
}
