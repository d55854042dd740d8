//! services/api/src/adapters/mock.rs
//!
//! Deterministic implementations of the host-collaborator ports for tests
//! and local development: a scripted question source, a recording
//! completion notifier, an in-memory image store, a fixed-capability
//! authorizer, a manually advanced clock, and a reversing shuffler.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use quiz_engine_core::domain::{
    BankQuestion, Category, CategoryFilter, Game, GameSession, Level, Question,
};
use quiz_engine_core::ports::{
    Authorizer, Clock, CompletionNotifier, GameStore, ImageStore, PortError, PortResult,
    QuestionSource,
};
use uuid::Uuid;

use crate::adapters::memory::MemoryStore;

//=========================================================================================
// Question Source
//=========================================================================================

/// A question source that hands out its questions in a fixed order and
/// records the category filters it was asked with.
pub struct ScriptedQuestionSource {
    by_id: HashMap<Uuid, BankQuestion>,
    queue: Mutex<VecDeque<Uuid>>,
    filters_seen: Mutex<Vec<Vec<CategoryFilter>>>,
}

impl ScriptedQuestionSource {
    pub fn new(questions: Vec<BankQuestion>) -> Self {
        let queue = questions.iter().map(|q| q.id).collect();
        let by_id = questions.into_iter().map(|q| (q.id, q)).collect();
        Self {
            by_id,
            queue: Mutex::new(queue),
            filters_seen: Mutex::new(Vec::new()),
        }
    }

    /// The category filters passed to `fetch_random_question`, in call
    /// order.
    pub fn filters_seen(&self) -> Vec<Vec<CategoryFilter>> {
        self.filters_seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl QuestionSource for ScriptedQuestionSource {
    async fn fetch_random_question(
        &self,
        filters: &[CategoryFilter],
    ) -> PortResult<BankQuestion> {
        self.filters_seen.lock().unwrap().push(filters.to_vec());
        let id = self
            .queue
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| PortError::NotFound("question bank exhausted".to_string()))?;
        self.get_bank_question(id).await
    }

    async fn get_bank_question(&self, bank_ref: Uuid) -> PortResult<BankQuestion> {
        self.by_id
            .get(&bank_ref)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Bank question {} not found", bank_ref)))
    }
}

//=========================================================================================
// Completion Notifier
//=========================================================================================

/// Records every completion notification it receives. Can be told to fail,
/// still recording the attempt.
#[derive(Default)]
pub struct RecordingNotifier {
    completions: Mutex<Vec<(Uuid, Uuid)>>,
    failure: Mutex<Option<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// The (user, game) pairs notified so far.
    pub fn completions(&self) -> Vec<(Uuid, Uuid)> {
        self.completions.lock().unwrap().clone()
    }

    /// Makes every following notification fail with the given message.
    pub fn fail_with(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }
}

#[async_trait]
impl CompletionNotifier for RecordingNotifier {
    async fn notify_complete(&self, user_id: Uuid, game_id: Uuid) -> PortResult<()> {
        self.completions.lock().unwrap().push((user_id, game_id));
        if let Some(message) = self.failure.lock().unwrap().clone() {
            return Err(PortError::Unavailable(message));
        }
        Ok(())
    }
}

//=========================================================================================
// Image Store
//=========================================================================================

/// Keeps uploaded artwork in memory and hands back synthetic filenames.
#[derive(Default)]
pub struct MemoryImageStore {
    images: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stored_filenames(&self) -> Vec<String> {
        self.images.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl ImageStore for MemoryImageStore {
    async fn store_level_image(
        &self,
        level_id: Uuid,
        mime_type: &str,
        content: &[u8],
    ) -> PortResult<String> {
        let extension = mime_type.rsplit('/').next().unwrap_or("bin");
        let filename = format!("level-{}.{}", level_id, extension);
        self.images
            .lock()
            .unwrap()
            .insert(filename.clone(), content.to_vec());
        Ok(filename)
    }

    async fn delete_level_image(&self, _level_id: Uuid, filename: &str) -> PortResult<()> {
        self.images.lock().unwrap().remove(filename);
        Ok(())
    }
}

//=========================================================================================
// Authorizer
//=========================================================================================

/// Grants level management to a fixed set of users.
#[derive(Default)]
pub struct StaticAuthorizer {
    managers: HashSet<Uuid>,
}

impl StaticAuthorizer {
    pub fn with_managers(managers: impl IntoIterator<Item = Uuid>) -> Self {
        Self {
            managers: managers.into_iter().collect(),
        }
    }
}

#[async_trait]
impl Authorizer for StaticAuthorizer {
    async fn can_manage_levels(&self, user_id: Uuid, _game_id: Uuid) -> PortResult<bool> {
        Ok(self.managers.contains(&user_id))
    }
}

//=========================================================================================
// Clock and Shuffle
//=========================================================================================

/// A clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// A "shuffle" that deterministically reverses the slice, so tests can tell
/// shuffled from unshuffled order.
pub struct ReverseShuffle;

impl quiz_engine_core::ports::Shuffle for ReverseShuffle {
    fn shuffle_ids(&self, ids: &mut [Uuid]) {
        ids.reverse();
    }
}

/// A shuffle that leaves the order untouched.
pub struct NoShuffle;

impl quiz_engine_core::ports::Shuffle for NoShuffle {
    fn shuffle_ids(&self, _ids: &mut [Uuid]) {}
}

//=========================================================================================
// Store Fault Injection
//=========================================================================================

/// Wraps the in-memory store and makes chosen `update_level` calls lose
/// their optimistic version check, to drive multi-write recovery paths that
/// a real store only hits under concurrent writers.
pub struct ConflictInjectingStore {
    inner: Arc<MemoryStore>,
    fail_on_calls: Mutex<HashSet<u32>>,
    calls: Mutex<u32>,
}

impl ConflictInjectingStore {
    /// `fail_on_calls` numbers the `update_level` invocations (1-based)
    /// that report a conflict instead of writing.
    pub fn wrapping(inner: Arc<MemoryStore>, fail_on_calls: impl IntoIterator<Item = u32>) -> Self {
        Self {
            inner,
            fail_on_calls: Mutex::new(fail_on_calls.into_iter().collect()),
            calls: Mutex::new(0),
        }
    }
}

#[async_trait]
impl GameStore for ConflictInjectingStore {
    async fn get_game(&self, game_id: Uuid) -> PortResult<Game> {
        self.inner.get_game(game_id).await
    }

    async fn get_level(&self, level_id: Uuid) -> PortResult<Level> {
        self.inner.get_level(level_id).await
    }

    async fn active_levels(&self, game_id: Uuid) -> PortResult<Vec<Level>> {
        self.inner.active_levels(game_id).await
    }

    async fn active_level_by_position(
        &self,
        game_id: Uuid,
        position: u32,
    ) -> PortResult<Option<Level>> {
        self.inner.active_level_by_position(game_id, position).await
    }

    async fn insert_level(&self, level: Level) -> PortResult<Level> {
        self.inner.insert_level(level).await
    }

    async fn update_level(&self, level: &Level) -> PortResult<Level> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            *calls
        };
        if self.fail_on_calls.lock().unwrap().remove(&call) {
            return Err(PortError::Conflict(format!(
                "level {} was modified concurrently",
                level.id
            )));
        }
        self.inner.update_level(level).await
    }

    async fn categories_for_level(&self, level_id: Uuid) -> PortResult<Vec<Category>> {
        self.inner.categories_for_level(level_id).await
    }

    async fn insert_category(&self, category: Category) -> PortResult<Category> {
        self.inner.insert_category(category).await
    }

    async fn update_category(&self, category: &Category) -> PortResult<Category> {
        self.inner.update_category(category).await
    }

    async fn delete_category(&self, category_id: Uuid) -> PortResult<()> {
        self.inner.delete_category(category_id).await
    }

    async fn get_session(&self, session_id: Uuid) -> PortResult<GameSession> {
        self.inner.get_session(session_id).await
    }

    async fn sessions_in_progress(
        &self,
        game_id: Uuid,
        user_id: Uuid,
    ) -> PortResult<Vec<GameSession>> {
        self.inner.sessions_in_progress(game_id, user_id).await
    }

    async fn latest_resumable_session(
        &self,
        game_id: Uuid,
        user_id: Uuid,
    ) -> PortResult<Option<GameSession>> {
        self.inner.latest_resumable_session(game_id, user_id).await
    }

    async fn insert_session(&self, session: GameSession) -> PortResult<GameSession> {
        self.inner.insert_session(session).await
    }

    async fn update_session(&self, session: &GameSession) -> PortResult<GameSession> {
        self.inner.update_session(session).await
    }

    async fn get_question(&self, question_id: Uuid) -> PortResult<Question> {
        self.inner.get_question(question_id).await
    }

    async fn question_for_level(
        &self,
        session_id: Uuid,
        level_id: Uuid,
    ) -> PortResult<Option<Question>> {
        self.inner.question_for_level(session_id, level_id).await
    }

    async fn insert_question(&self, question: Question) -> PortResult<Question> {
        self.inner.insert_question(question).await
    }

    async fn update_question(&self, question: &Question) -> PortResult<Question> {
        self.inner.update_question(question).await
    }
}
