//! crates/quiz_engine_core/src/engine/questions.rs
//!
//! The per-(session, level) question state machine:
//! UNSTARTED (no attempt row) -> IN_PROGRESS (row exists, not finished)
//! -> FINISHED (answered or expired; terminal). The attempt's creation
//! timestamp is the start of the answer timer; elapsed time is always
//! recomputed from it on demand.

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{BankQuestion, Game, GameSession, Level, Question, SessionState};
use crate::error::{EngineError, EngineResult};
use crate::ports::PortError;
use crate::timing;

use super::{ensure_level_in_game, ensure_question_in_session, GameEngine, MAX_PERSIST_RETRIES};

/// How a question attempt ends: with a chosen answer, or by expiry.
enum Finalization {
    Answered { given: Uuid, correct: bool },
    Expired,
}

impl GameEngine {
    /// Returns the attempt record for (session, level), creating it on the
    /// first visit.
    ///
    /// Reading an existing attempt is idempotent and allowed on any
    /// session; creating a new one requires the session to be in PROGRESS.
    /// Creation is race-safe: if a concurrent request inserts the row
    /// first, the uniqueness constraint turns this call into a read.
    pub async fn fetch_or_start_question(
        &self,
        game: &Game,
        session: &GameSession,
        level: &Level,
    ) -> EngineResult<Question> {
        ensure_level_in_game(level, game)?;
        if let Some(existing) = self.store.question_for_level(session.id, level.id).await? {
            return Ok(existing);
        }
        if !session.is_in_progress() {
            return Err(EngineError::SessionClosed);
        }
        if !session.level_order.contains(&level.id) {
            return Err(EngineError::InvalidReference(format!(
                "level {} is not part of game session {}",
                level.id, session.id
            )));
        }

        let categories = self.store.categories_for_level(level.id).await?;
        let filters: Vec<_> = categories.iter().map(|c| c.to_filter()).collect();
        let bank = self.questions.fetch_random_question(&filters).await?;

        let mut answer_order = bank.answer_ids();
        if game.shuffle_answers {
            self.shuffle.shuffle_ids(&mut answer_order);
        }
        let question = Question {
            id: Uuid::new_v4(),
            session_id: session.id,
            level_id: level.id,
            bank_ref: bank.id,
            answer_order,
            given_answer: None,
            finished: false,
            correct: false,
            score: 0,
            time_remaining: 0,
            created_at: self.clock.now(),
            version: 0,
        };
        match self.store.insert_question(question).await {
            Ok(saved) => {
                debug!(session = %session.id, level = %level.id, question = %saved.id,
                    "started question");
                Ok(saved)
            }
            Err(PortError::Duplicate(_)) => {
                // A concurrent first visit won the insert; its row is the
                // attempt for this level.
                self.store
                    .question_for_level(session.id, level.id)
                    .await?
                    .ok_or_else(|| {
                        PortError::Unexpected(format!(
                            "duplicate insert for (session {}, level {}) but no row found",
                            session.id, level.id
                        ))
                        .into()
                    })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Applies the submitted answer to the attempt record, computes score
    /// and remaining time, and updates the session aggregates.
    pub async fn submit_answer(
        &self,
        game: &Game,
        session: &GameSession,
        question_id: Uuid,
        chosen_answer: Uuid,
    ) -> EngineResult<Question> {
        let question = self.load_open_question(session, question_id).await?;
        if !question.answer_order.contains(&chosen_answer) {
            return Err(EngineError::Validation(format!(
                "answer {} is not an option of question {}",
                chosen_answer, question.id
            )));
        }
        let bank = self.questions.get_bank_question(question.bank_ref).await?;
        let correct_answer = bank
            .single_correct_answer()
            .ok_or(EngineError::UnsupportedQuestion(bank.id))?;
        let finalization = Finalization::Answered {
            given: chosen_answer,
            correct: chosen_answer == correct_answer.id,
        };
        let finalized = self.finalize_question(game, question, &bank, finalization).await?;
        self.record_answer(game, session.id, &finalized).await?;
        Ok(finalized)
    }

    /// Marks the attempt as expired (time ran out on the client): no given
    /// answer, incorrect, zero score. The elapsed-time overage is clamped
    /// to zero remaining time.
    pub async fn expire_answer(
        &self,
        game: &Game,
        session: &GameSession,
        question_id: Uuid,
    ) -> EngineResult<Question> {
        let question = self.load_open_question(session, question_id).await?;
        let bank = self.questions.get_bank_question(question.bank_ref).await?;
        let finalized = self
            .finalize_question(game, question, &bank, Finalization::Expired)
            .await?;
        self.record_answer(game, session.id, &finalized).await?;
        Ok(finalized)
    }

    /// Shared preconditions of submit and expire: session still running,
    /// question belongs to it, question not yet finished.
    async fn load_open_question(
        &self,
        session: &GameSession,
        question_id: Uuid,
    ) -> EngineResult<Question> {
        if !session.is_in_progress() {
            return Err(EngineError::SessionClosed);
        }
        let question = self.store.get_question(question_id).await?;
        ensure_question_in_session(&question, session)?;
        if question.finished {
            return Err(EngineError::AlreadyAnswered);
        }
        Ok(question)
    }

    /// Computes remaining time and score and persists the terminal attempt
    /// state. The compare-and-persist update guarantees that of a racing
    /// submit and expire, exactly one finalizes the row; the loser surfaces
    /// as `AlreadyAnswered`.
    async fn finalize_question(
        &self,
        game: &Game,
        mut question: Question,
        bank: &BankQuestion,
        finalization: Finalization,
    ) -> EngineResult<Question> {
        let now = self.clock.now();
        let time_taken = (now - question.created_at).num_seconds().max(0);
        let time_available = timing::available_seconds(game, bank);
        let time_remaining = (time_available - time_taken).max(0);

        question.finished = true;
        question.time_remaining = time_remaining;
        match finalization {
            Finalization::Answered { given, correct } => {
                question.given_answer = Some(given);
                question.correct = correct;
                // The score ceiling is the base duration: answers given
                // during the reading-time extension cannot exceed the
                // normal maximum.
                question.score = if correct {
                    time_remaining.min(game.question_duration)
                } else {
                    0
                };
            }
            Finalization::Expired => {
                question.given_answer = None;
                question.correct = false;
                question.score = 0;
            }
        }
        match self.store.update_question(&question).await {
            Ok(saved) => {
                debug!(question = %saved.id, correct = saved.correct, score = saved.score,
                    time_remaining = saved.time_remaining, "finalized question");
                Ok(saved)
            }
            Err(PortError::Conflict(_)) => Err(EngineError::AlreadyAnswered),
            Err(e) => Err(e.into()),
        }
    }

    /// Folds a finalized attempt into the session aggregates, transitioning
    /// the session to FINISHED once every active level has an answer.
    ///
    /// The session row is re-read and written with compare-and-persist; on
    /// a conflict the whole read-modify-write is retried, so concurrent
    /// answers from duplicate tabs never lose an increment.
    async fn record_answer(
        &self,
        game: &Game,
        session_id: Uuid,
        question: &Question,
    ) -> EngineResult<GameSession> {
        for _ in 0..MAX_PERSIST_RETRIES {
            let mut session = self.store.get_session(session_id).await?;
            // The caller's snapshot may be stale: a concurrent cancel
            // (duplicate tab) can have closed the session after the attempt
            // was finalized. Terminal states are never left again.
            if !session.is_in_progress() {
                return Err(EngineError::SessionClosed);
            }
            session.answers_total += 1;
            if question.correct {
                session.score += question.score;
                session.answers_correct += 1;
            }
            let finishing = session.answers_total == game.active_level_count;
            if finishing {
                session.state = SessionState::Finished;
            }
            session.updated_at = self.clock.now();
            match self.store.update_session(&session).await {
                Ok(saved) => {
                    if finishing {
                        info!(session = %saved.id, score = saved.score, "game session finished");
                        // The answer is already committed at this point; a
                        // notification failure must not surface as a failed
                        // submit to the caller.
                        if let Err(e) = self.notifier.notify_complete(saved.user_id, game.id).await
                        {
                            warn!(session = %saved.id, error = %e,
                                "completion notification failed");
                        }
                    }
                    return Ok(saved);
                }
                Err(PortError::Conflict(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        warn!(session = %session_id, "session aggregate update kept conflicting");
        Err(EngineError::Port(PortError::Conflict(format!(
            "session {} update retries exhausted",
            session_id
        ))))
    }
}
