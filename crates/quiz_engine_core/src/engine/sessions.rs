//! crates/quiz_engine_core/src/engine/sessions.rs
//!
//! Session lifecycle: creation, resumption, and termination. At most one
//! session per (game, user) may be in PROGRESS at any time; starting a new
//! one transitions older ones to DUMPED first.

use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{Game, GameSession, SessionState};
use crate::error::EngineResult;
use crate::ports::PortError;

use super::GameEngine;

impl GameEngine {
    /// Dumps every running session of (game, user) and creates a fresh one
    /// in PROGRESS, with the game's active levels as its fixed level order
    /// (uniformly shuffled iff the game enables level shuffling).
    pub async fn start_session(&self, game: &Game, user_id: Uuid) -> EngineResult<GameSession> {
        self.dump_running_sessions(game, user_id).await?;
        self.insert_session(game, user_id).await
    }

    /// Returns the most recently modified PROGRESS or FINISHED session of
    /// (game, user), or creates a new one if none exists. A FINISHED
    /// session is still returned so results stay visible until the user
    /// explicitly starts over.
    pub async fn resume_or_create_session(
        &self,
        game: &Game,
        user_id: Uuid,
    ) -> EngineResult<GameSession> {
        if let Some(session) = self
            .store
            .latest_resumable_session(game.id, user_id)
            .await?
        {
            debug!(session = %session.id, state = session.state.as_str(), "resuming game session");
            return Ok(session);
        }
        self.start_session(game, user_id).await
    }

    /// Sets the session to DUMPED if it is still in PROGRESS. A no-op (not
    /// an error) when the session is already terminal.
    pub async fn cancel_session(
        &self,
        game: &Game,
        user_id: Uuid,
        session_id: Uuid,
    ) -> EngineResult<GameSession> {
        let session = self.store.get_session(session_id).await?;
        self.verify_session_owner(&session, game, user_id)?;
        if !session.is_in_progress() {
            return Ok(session);
        }
        let mut dumped = session;
        dumped.state = SessionState::Dumped;
        dumped.updated_at = self.clock.now();
        match self.store.update_session(&dumped).await {
            Ok(saved) => {
                info!(session = %saved.id, "game session cancelled");
                Ok(saved)
            }
            // A concurrent request finished or dumped it first; the result
            // the caller cares about is the terminal row.
            Err(PortError::Conflict(_)) => Ok(self.store.get_session(dumped.id).await?),
            Err(e) => Err(e.into()),
        }
    }

    /// Closes all sessions of (game, user) that are still in PROGRESS.
    ///
    /// The targeted rows are read immediately before each write and updated
    /// with compare-and-persist, so a session created by a concurrent
    /// request can never be dumped by mistake.
    async fn dump_running_sessions(&self, game: &Game, user_id: Uuid) -> EngineResult<()> {
        let running = self.store.sessions_in_progress(game.id, user_id).await?;
        for session in running {
            let mut dumped = session;
            dumped.state = SessionState::Dumped;
            dumped.updated_at = self.clock.now();
            match self.store.update_session(&dumped).await {
                Ok(saved) => debug!(session = %saved.id, "dumped running game session"),
                Err(PortError::Conflict(_)) => {
                    // Lost a race on this row; only dump it if it is still
                    // running after a re-read.
                    let current = self.store.get_session(dumped.id).await?;
                    if current.is_in_progress() {
                        let mut again = current;
                        again.state = SessionState::Dumped;
                        again.updated_at = self.clock.now();
                        self.store.update_session(&again).await?;
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn insert_session(&self, game: &Game, user_id: Uuid) -> EngineResult<GameSession> {
        let levels = self.store.active_levels(game.id).await?;
        let mut level_order: Vec<Uuid> = levels.iter().map(|level| level.id).collect();
        if game.shuffle_levels {
            self.shuffle.shuffle_ids(&mut level_order);
        }
        let now = self.clock.now();
        let session = GameSession {
            id: Uuid::new_v4(),
            game_id: game.id,
            user_id,
            created_at: now,
            updated_at: now,
            level_order,
            score: 0,
            answers_total: 0,
            answers_correct: 0,
            state: SessionState::Progress,
            version: 0,
        };
        let saved = self.store.insert_session(session).await?;
        info!(session = %saved.id, game = %game.id, "created game session");
        Ok(saved)
    }
}
