//! crates/quiz_engine_core/src/engine/mod.rs
//!
//! The game engine: session lifecycle, the per-level question state
//! machine, and administrative level management. All I/O goes through the
//! ports; the engine itself holds no mutable state, so one instance can be
//! shared across concurrent requests.

mod levels;
mod questions;
mod sessions;

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::{Game, GameSession, Level, Question};
use crate::error::{EngineError, EngineResult};
use crate::ports::{
    Authorizer, Clock, CompletionNotifier, GameStore, ImageStore, QuestionSource, Shuffle,
};

/// How often a compare-and-persist update of session aggregates is retried
/// before giving up.
const MAX_PERSIST_RETRIES: usize = 3;

/// The quiz-game engine. Construct once with the host's adapters and share
/// via `Arc`.
pub struct GameEngine {
    store: Arc<dyn GameStore>,
    questions: Arc<dyn QuestionSource>,
    notifier: Arc<dyn CompletionNotifier>,
    images: Arc<dyn ImageStore>,
    authorizer: Arc<dyn Authorizer>,
    clock: Arc<dyn Clock>,
    shuffle: Arc<dyn Shuffle>,
}

impl GameEngine {
    pub fn new(
        store: Arc<dyn GameStore>,
        questions: Arc<dyn QuestionSource>,
        notifier: Arc<dyn CompletionNotifier>,
        images: Arc<dyn ImageStore>,
        authorizer: Arc<dyn Authorizer>,
        clock: Arc<dyn Clock>,
        shuffle: Arc<dyn Shuffle>,
    ) -> Self {
        Self {
            store,
            questions,
            notifier,
            images,
            authorizer,
            clock,
            shuffle,
        }
    }

    /// Checks that the session belongs to the given game and user.
    pub fn verify_session_owner(
        &self,
        session: &GameSession,
        game: &Game,
        user_id: Uuid,
    ) -> EngineResult<()> {
        if session.game_id != game.id {
            return Err(EngineError::AccessDenied(format!(
                "game session {} doesn't belong to game {}",
                session.id, game.id
            )));
        }
        if session.user_id != user_id {
            return Err(EngineError::AccessDenied(format!(
                "game session {} doesn't belong to user {}",
                session.id, user_id
            )));
        }
        Ok(())
    }

    /// Checks that the caller may manage the levels of this game, via the
    /// host's capability callback.
    async fn ensure_can_manage(&self, game: &Game, user_id: Uuid) -> EngineResult<()> {
        if self.authorizer.can_manage_levels(user_id, game.id).await? {
            Ok(())
        } else {
            Err(EngineError::AccessDenied(format!(
                "user {} may not manage levels of game {}",
                user_id, game.id
            )))
        }
    }
}

fn ensure_level_in_game(level: &Level, game: &Game) -> EngineResult<()> {
    if level.game_id != game.id {
        return Err(EngineError::AccessDenied(format!(
            "level {} doesn't belong to game {}",
            level.id, game.id
        )));
    }
    Ok(())
}

fn ensure_question_in_session(question: &Question, session: &GameSession) -> EngineResult<()> {
    if question.session_id != session.id {
        return Err(EngineError::InvalidReference(format!(
            "question {} doesn't belong to game session {}",
            question.id, session.id
        )));
    }
    Ok(())
}
