//! The question flow: lazy attempt creation, answer submission with
//! time-based scoring, expiry, and the session finish transition.

mod common;

use chrono::Duration;
use common::{build, default_harness, Setup};
use quiz_engine_core::domain::{BankAnswer, BankQuestion, SessionState};
use quiz_engine_core::ports::GameStore;
use quiz_engine_core::{timing, EngineError};
use uuid::Uuid;

#[tokio::test]
async fn first_visit_creates_the_attempt_and_later_visits_return_it() {
    let h = default_harness();
    let session = h.engine.start_session(&h.game, h.player).await.unwrap();

    let first = h
        .engine
        .fetch_or_start_question(&h.game, &session, &h.levels[0])
        .await
        .unwrap();
    let second = h
        .engine
        .fetch_or_start_question(&h.game, &session, &h.levels[0])
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.bank_ref, second.bank_ref);
    // Only the first visit hits the question source.
    assert_eq!(h.source.filters_seen().len(), 1);
}

#[tokio::test]
async fn attempt_creation_passes_the_level_categories_as_filters() {
    let h = default_harness();
    let session = h.engine.start_session(&h.game, h.player).await.unwrap();

    h.engine
        .fetch_or_start_question(&h.game, &session, &h.levels[0])
        .await
        .unwrap();

    let expected: Vec<_> = h
        .engine
        .level_categories(&h.game, h.admin, h.levels[0].id)
        .await
        .unwrap()
        .iter()
        .map(|c| c.to_filter())
        .collect();
    assert_eq!(h.source.filters_seen(), vec![expected]);
}

#[tokio::test]
async fn answer_order_is_shuffled_when_the_game_enables_it() {
    let h = build(Setup {
        shuffle_answers: true,
        reverse_shuffle: true,
        ..Setup::default()
    });
    let session = h.engine.start_session(&h.game, h.player).await.unwrap();

    let question = h
        .engine
        .fetch_or_start_question(&h.game, &session, &h.levels[0])
        .await
        .unwrap();

    let mut expected = h.bank_item(&question).answer_ids();
    expected.reverse();
    assert_eq!(question.answer_order, expected);
}

#[tokio::test]
async fn a_level_outside_the_session_order_is_rejected() {
    let h = default_harness();
    let session = h.engine.start_session(&h.game, h.player).await.unwrap();

    // A level added after the session started is not part of its order.
    let late = h
        .engine
        .save_level(
            &h.game,
            h.admin,
            quiz_engine_core::domain::LevelDraft {
                id: None,
                name: "Late level".to_string(),
                bg_color: "#000000".to_string(),
                image: quiz_engine_core::domain::ImageChange::Keep,
                categories: vec![],
            },
        )
        .await
        .unwrap();

    let err = h
        .engine
        .fetch_or_start_question(&h.game, &session, &late)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidReference(_)));
}

#[tokio::test]
async fn a_closed_session_cannot_start_new_attempts_but_keeps_old_ones_readable() {
    let h = default_harness();
    let session = h.engine.start_session(&h.game, h.player).await.unwrap();

    let question = h
        .engine
        .fetch_or_start_question(&h.game, &session, &h.levels[0])
        .await
        .unwrap();
    let session = h
        .engine
        .cancel_session(&h.game, h.player, session.id)
        .await
        .unwrap();

    let reread = h
        .engine
        .fetch_or_start_question(&h.game, &session, &h.levels[0])
        .await
        .unwrap();
    assert_eq!(reread.id, question.id);

    let err = h
        .engine
        .fetch_or_start_question(&h.game, &session, &h.levels[1])
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SessionClosed));
}

#[tokio::test]
async fn a_correct_answer_scores_the_remaining_time() {
    let h = default_harness();
    let session = h.engine.start_session(&h.game, h.player).await.unwrap();

    let question = h
        .engine
        .fetch_or_start_question(&h.game, &session, &h.levels[0])
        .await
        .unwrap();
    let available = timing::available_seconds(&h.game, h.bank_item(&question));
    // Leave less than the base duration on the clock, so the score equals
    // the remaining time rather than the cap.
    let remaining = h.game.question_duration - 5;
    h.clock.advance(Duration::seconds(available - remaining));

    let chosen = h.correct_answer_of(&question);
    let answered = h
        .engine
        .submit_answer(&h.game, &session, question.id, chosen)
        .await
        .unwrap();

    assert!(answered.finished);
    assert!(answered.correct);
    assert_eq!(answered.given_answer, Some(chosen));
    assert_eq!(answered.time_remaining, remaining);
    assert_eq!(answered.score, remaining);

    let session = h.session_snapshot(session.id).await;
    assert_eq!(session.score, answered.score);
    assert_eq!(session.answers_total, 1);
    assert_eq!(session.answers_correct, 1);
    assert_eq!(session.state, SessionState::Progress);
}

#[tokio::test]
async fn an_instant_answer_is_capped_at_the_base_duration() {
    let h = default_harness();
    let session = h.engine.start_session(&h.game, h.player).await.unwrap();

    let question = h
        .engine
        .fetch_or_start_question(&h.game, &session, &h.levels[0])
        .await
        .unwrap();
    let available = timing::available_seconds(&h.game, h.bank_item(&question));
    assert!(available > h.game.question_duration);

    let chosen = h.correct_answer_of(&question);
    let answered = h
        .engine
        .submit_answer(&h.game, &session, question.id, chosen)
        .await
        .unwrap();

    // Zero seconds taken leaves the full budget, but the score ceiling is
    // the base duration.
    assert_eq!(answered.time_remaining, available);
    assert_eq!(answered.score, h.game.question_duration);
}

#[tokio::test]
async fn a_correct_answer_at_the_deadline_scores_zero() {
    let h = default_harness();
    let session = h.engine.start_session(&h.game, h.player).await.unwrap();

    let question = h
        .engine
        .fetch_or_start_question(&h.game, &session, &h.levels[0])
        .await
        .unwrap();
    let available = timing::available_seconds(&h.game, h.bank_item(&question));
    h.clock.advance(Duration::seconds(available));

    let chosen = h.correct_answer_of(&question);
    let answered = h
        .engine
        .submit_answer(&h.game, &session, question.id, chosen)
        .await
        .unwrap();

    assert!(answered.correct);
    assert_eq!(answered.time_remaining, 0);
    assert_eq!(answered.score, 0);
}

#[tokio::test]
async fn a_wrong_answer_scores_zero_but_still_counts() {
    let h = default_harness();
    let session = h.engine.start_session(&h.game, h.player).await.unwrap();

    let question = h
        .engine
        .fetch_or_start_question(&h.game, &session, &h.levels[0])
        .await
        .unwrap();
    let wrong = h.wrong_answer_of(&question);
    let answered = h
        .engine
        .submit_answer(&h.game, &session, question.id, wrong)
        .await
        .unwrap();

    assert!(answered.finished);
    assert!(!answered.correct);
    assert_eq!(answered.score, 0);

    let session = h.session_snapshot(session.id).await;
    assert_eq!(session.score, 0);
    assert_eq!(session.answers_total, 1);
    assert_eq!(session.answers_correct, 0);
}

#[tokio::test]
async fn an_answer_that_is_not_an_option_is_rejected_before_any_mutation() {
    let h = default_harness();
    let session = h.engine.start_session(&h.game, h.player).await.unwrap();

    let question = h
        .engine
        .fetch_or_start_question(&h.game, &session, &h.levels[0])
        .await
        .unwrap();
    let err = h
        .engine
        .submit_answer(&h.game, &session, question.id, Uuid::new_v4())
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Validation(_)));
    let question = h.engine.fetch_or_start_question(&h.game, &session, &h.levels[0]).await.unwrap();
    assert!(!question.finished);
}

#[tokio::test]
async fn a_question_can_only_be_finalized_once() {
    let h = default_harness();
    let session = h.engine.start_session(&h.game, h.player).await.unwrap();

    let question = h
        .engine
        .fetch_or_start_question(&h.game, &session, &h.levels[0])
        .await
        .unwrap();
    let chosen = h.correct_answer_of(&question);
    h.engine
        .submit_answer(&h.game, &session, question.id, chosen)
        .await
        .unwrap();

    let err = h
        .engine
        .submit_answer(&h.game, &session, question.id, chosen)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AlreadyAnswered));

    let err = h
        .engine
        .expire_answer(&h.game, &session, question.id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AlreadyAnswered));
}

#[tokio::test]
async fn a_question_from_another_session_is_rejected() {
    let h = default_harness();
    let old = h.engine.start_session(&h.game, h.player).await.unwrap();
    let question = h
        .engine
        .fetch_or_start_question(&h.game, &old, &h.levels[0])
        .await
        .unwrap();

    let current = h.engine.start_session(&h.game, h.player).await.unwrap();
    let err = h
        .engine
        .submit_answer(
            &h.game,
            &current,
            question.id,
            h.correct_answer_of(&question),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidReference(_)));
}

#[tokio::test]
async fn expiry_records_an_incorrect_unanswered_attempt() {
    let h = default_harness();
    let session = h.engine.start_session(&h.game, h.player).await.unwrap();

    let question = h
        .engine
        .fetch_or_start_question(&h.game, &session, &h.levels[0])
        .await
        .unwrap();
    let available = timing::available_seconds(&h.game, h.bank_item(&question));
    // Well past the budget; the overage is clamped to zero remaining time.
    h.clock.advance(Duration::seconds(available + 120));

    let expired = h
        .engine
        .expire_answer(&h.game, &session, question.id)
        .await
        .unwrap();

    assert!(expired.finished);
    assert!(!expired.correct);
    assert_eq!(expired.given_answer, None);
    assert_eq!(expired.score, 0);
    assert_eq!(expired.time_remaining, 0);

    let session = h.session_snapshot(session.id).await;
    assert_eq!(session.answers_total, 1);
    assert_eq!(session.answers_correct, 0);
}

#[tokio::test]
async fn a_bank_item_without_exactly_one_correct_answer_is_unsupported() {
    let broken = BankQuestion {
        id: Uuid::new_v4(),
        text: "Pick one".to_string(),
        answers: vec![
            BankAnswer {
                id: Uuid::new_v4(),
                text: "first".to_string(),
                correct: true,
            },
            BankAnswer {
                id: Uuid::new_v4(),
                text: "second".to_string(),
                correct: true,
            },
        ],
    };
    let broken_id = broken.id;
    let h = build(Setup {
        level_count: 1,
        bank_override: Some(vec![broken]),
        ..Setup::default()
    });
    let session = h.engine.start_session(&h.game, h.player).await.unwrap();

    let question = h
        .engine
        .fetch_or_start_question(&h.game, &session, &h.levels[0])
        .await
        .unwrap();
    let chosen = question.answer_order[0];
    let err = h
        .engine
        .submit_answer(&h.game, &session, question.id, chosen)
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::UnsupportedQuestion(id) if id == broken_id));
    // The attempt stays open.
    let question = h.store.get_question(question.id).await.unwrap();
    assert!(!question.finished);
}

#[tokio::test]
async fn answering_every_level_finishes_the_session_and_notifies_once() {
    let h = default_harness();
    let session = h.engine.start_session(&h.game, h.player).await.unwrap();

    for level in &h.levels {
        h.answer_level_correctly(&session, level).await;
    }

    let session = h.session_snapshot(session.id).await;
    assert_eq!(session.state, SessionState::Finished);
    assert_eq!(session.answers_total, h.levels.len() as u32);
    assert_eq!(session.answers_correct, h.levels.len() as u32);
    assert_eq!(h.notifier.completions(), vec![(h.player, h.game.id)]);
}

#[tokio::test]
async fn expiry_of_the_last_level_also_finishes_and_notifies() {
    let h = default_harness();
    let session = h.engine.start_session(&h.game, h.player).await.unwrap();

    h.answer_level_correctly(&session, &h.levels[0]).await;
    h.answer_level_correctly(&session, &h.levels[1]).await;

    let question = h
        .engine
        .fetch_or_start_question(&h.game, &session, &h.levels[2])
        .await
        .unwrap();
    h.clock.advance(Duration::seconds(600));
    h.engine
        .expire_answer(&h.game, &session, question.id)
        .await
        .unwrap();

    let session = h.session_snapshot(session.id).await;
    assert_eq!(session.state, SessionState::Finished);
    assert_eq!(session.answers_total, 3);
    assert_eq!(session.answers_correct, 2);
    assert_eq!(h.notifier.completions(), vec![(h.player, h.game.id)]);
}

#[tokio::test]
async fn a_submit_racing_a_cancel_cannot_revive_the_session() {
    let h = build(Setup {
        level_count: 1,
        ..Setup::default()
    });
    let session = h.engine.start_session(&h.game, h.player).await.unwrap();
    let question = h
        .engine
        .fetch_or_start_question(&h.game, &session, &h.levels[0])
        .await
        .unwrap();

    // A duplicate tab cancels while this caller still holds the PROGRESS
    // snapshot.
    h.engine
        .cancel_session(&h.game, h.player, session.id)
        .await
        .unwrap();

    let err = h
        .engine
        .submit_answer(&h.game, &session, question.id, h.correct_answer_of(&question))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SessionClosed));

    let stored = h.session_snapshot(session.id).await;
    assert_eq!(stored.state, SessionState::Dumped);
    assert_eq!(stored.answers_total, 0);
    assert_eq!(stored.score, 0);
    assert!(h.notifier.completions().is_empty());
}

#[tokio::test]
async fn a_notifier_failure_does_not_undo_a_finished_session() {
    let h = build(Setup {
        level_count: 1,
        ..Setup::default()
    });
    h.notifier.fail_with("completion service down");

    let session = h.engine.start_session(&h.game, h.player).await.unwrap();
    let answered = h.answer_level_correctly(&session, &h.levels[0]).await;
    assert!(answered.correct);

    let stored = h.session_snapshot(session.id).await;
    assert_eq!(stored.state, SessionState::Finished);
    assert_eq!(stored.answers_total, 1);
    // The attempt to notify was still made.
    assert_eq!(h.notifier.completions(), vec![(h.player, h.game.id)]);
}
