//! Shared harness for the engine integration tests: wires a `GameEngine`
//! to the in-memory store and the deterministic collaborator doubles.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::sync::Arc;

use api::adapters::memory::MemoryStore;
use api::adapters::mock::{
    ManualClock, MemoryImageStore, NoShuffle, RecordingNotifier, ReverseShuffle,
    ScriptedQuestionSource, StaticAuthorizer,
};
use chrono::{TimeZone, Utc};
use quiz_engine_core::domain::{
    BankAnswer, BankQuestion, Category, Game, GameSession, Level, LevelState, Question,
};
use quiz_engine_core::ports::{GameStore, Shuffle};
use quiz_engine_core::GameEngine;
use uuid::Uuid;

pub struct Setup {
    pub level_count: usize,
    pub shuffle_levels: bool,
    pub shuffle_answers: bool,
    pub question_duration: i64,
    pub words_per_minute: u32,
    /// Use the reversing shuffle double instead of the identity one, so
    /// tests can tell shuffled from unshuffled order.
    pub reverse_shuffle: bool,
    /// Replaces the generated one-question-per-level bank.
    pub bank_override: Option<Vec<BankQuestion>>,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            level_count: 3,
            shuffle_levels: false,
            shuffle_answers: false,
            question_duration: 30,
            words_per_minute: 60,
            reverse_shuffle: false,
            bank_override: None,
        }
    }
}

pub struct Harness {
    pub engine: GameEngine,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<RecordingNotifier>,
    pub source: Arc<ScriptedQuestionSource>,
    pub images: Arc<MemoryImageStore>,
    pub game: Game,
    pub levels: Vec<Level>,
    pub bank: Vec<BankQuestion>,
    pub admin: Uuid,
    pub player: Uuid,
}

pub fn build(setup: Setup) -> Harness {
    build_wrapped(setup, |store| store as Arc<dyn GameStore>)
}

/// Like [`build`], but lets the test interpose its own `GameStore` (e.g. a
/// fault-injecting wrapper) between the engine and the in-memory store.
pub fn build_wrapped(
    setup: Setup,
    wrap: impl FnOnce(Arc<MemoryStore>) -> Arc<dyn GameStore>,
) -> Harness {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::starting_at(
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
    ));
    let notifier = Arc::new(RecordingNotifier::new());
    let images = Arc::new(MemoryImageStore::new());
    let admin = Uuid::new_v4();
    let player = Uuid::new_v4();
    let authorizer = Arc::new(StaticAuthorizer::with_managers([admin]));

    let game = Game {
        id: Uuid::new_v4(),
        question_duration: setup.question_duration,
        words_per_minute: setup.words_per_minute,
        shuffle_levels: setup.shuffle_levels,
        shuffle_answers: setup.shuffle_answers,
        active_level_count: setup.level_count as u32,
    };
    store.seed_game(game.clone());

    let mut levels = Vec::new();
    let mut bank = Vec::new();
    for position in 0..setup.level_count {
        let level = Level {
            id: Uuid::new_v4(),
            game_id: game.id,
            position: position as u32,
            name: format!("Level {}", position + 1),
            bg_color: "#105B72".to_string(),
            image: None,
            state: LevelState::Active,
            version: 0,
        };
        store.seed_level(level.clone());
        store.seed_category(Category {
            id: Uuid::new_v4(),
            level_id: level.id,
            category_ref: Uuid::new_v4(),
            include_subcategories: false,
        });
        bank.push(bank_question(&format!(
            "Which thinker is associated with level {}",
            position + 1
        )));
        levels.push(level);
    }
    if let Some(override_bank) = setup.bank_override {
        bank = override_bank;
    }

    let source = Arc::new(ScriptedQuestionSource::new(bank.clone()));
    let shuffle: Arc<dyn Shuffle> = if setup.reverse_shuffle {
        Arc::new(ReverseShuffle)
    } else {
        Arc::new(NoShuffle)
    };
    let engine = GameEngine::new(
        wrap(store.clone()),
        source.clone(),
        notifier.clone(),
        images.clone(),
        authorizer,
        clock.clone(),
        shuffle,
    );

    Harness {
        engine,
        store,
        clock,
        notifier,
        source,
        images,
        game,
        levels,
        bank,
        admin,
        player,
    }
}

pub fn default_harness() -> Harness {
    build(Setup::default())
}

/// A three-option bank question whose first option is the correct one.
pub fn bank_question(prompt: &str) -> BankQuestion {
    BankQuestion {
        id: Uuid::new_v4(),
        text: prompt.to_string(),
        answers: vec![
            BankAnswer {
                id: Uuid::new_v4(),
                text: "the correct option".to_string(),
                correct: true,
            },
            BankAnswer {
                id: Uuid::new_v4(),
                text: "a wrong option".to_string(),
                correct: false,
            },
            BankAnswer {
                id: Uuid::new_v4(),
                text: "another wrong option".to_string(),
                correct: false,
            },
        ],
    }
}

impl Harness {
    pub fn bank_item(&self, question: &Question) -> &BankQuestion {
        self.bank
            .iter()
            .find(|bank| bank.id == question.bank_ref)
            .expect("question references a seeded bank item")
    }

    pub fn correct_answer_of(&self, question: &Question) -> Uuid {
        self.bank_item(question)
            .single_correct_answer()
            .expect("seeded bank items have one correct answer")
            .id
    }

    pub fn wrong_answer_of(&self, question: &Question) -> Uuid {
        self.bank_item(question)
            .answers
            .iter()
            .find(|answer| !answer.correct)
            .expect("seeded bank items have wrong answers")
            .id
    }

    pub async fn session_snapshot(&self, session_id: Uuid) -> GameSession {
        self.store.get_session(session_id).await.unwrap()
    }

    /// Answers the given level correctly, immediately after starting it.
    pub async fn answer_level_correctly(&self, session: &GameSession, level: &Level) -> Question {
        let question = self
            .engine
            .fetch_or_start_question(&self.game, session, level)
            .await
            .unwrap();
        let chosen = self.correct_answer_of(&question);
        self.engine
            .submit_answer(&self.game, session, question.id, chosen)
            .await
            .unwrap()
    }
}
