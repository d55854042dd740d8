//! crates/quiz_engine_core/src/timing.rs
//!
//! The time-budget calculator: how long a user may spend on a question.
//! The budget is the game's base duration plus a reading-time estimate
//! derived from the word count of the question and its answer options.

use std::sync::OnceLock;

use regex::Regex;

use crate::domain::{BankQuestion, Game};

/// Reading time never goes below this, regardless of reading speed.
const MIN_READING_SECONDS: i64 = 5;

/// Total time (in seconds) available for answering the given question.
pub fn available_seconds(game: &Game, bank: &BankQuestion) -> i64 {
    game.question_duration + reading_seconds(game.words_per_minute, question_word_count(bank))
}

/// Additional seconds a user needs to read `word_count` words at the given
/// reading speed. Minimum is 5 seconds; there is no upper bound.
pub fn reading_seconds(words_per_minute: u32, word_count: usize) -> i64 {
    let wpm = words_per_minute.max(1) as f64;
    let seconds = (60.0 / wpm * word_count as f64).round() as i64;
    seconds.max(MIN_READING_SECONDS)
}

/// Total number of words in the question prompt and all answer-option texts.
pub fn question_word_count(bank: &BankQuestion) -> usize {
    let mut count = count_words(&bank.text);
    for answer in &bank.answers {
        count += count_words(&answer.text);
    }
    count
}

/// Counts the words in one string. HTML markup is stripped first; a word is
/// a run of alphabetic characters (locale letters such as umlauts included),
/// optionally joined by apostrophes or hyphens.
pub fn count_words(text: &str) -> usize {
    let stripped = strip_markup(text);
    let mut count = 0;
    let mut in_word = false;
    for c in stripped.chars() {
        if in_word {
            in_word = c.is_alphabetic() || c == '\'' || c == '-';
        } else if c.is_alphabetic() {
            in_word = true;
            count += 1;
        }
    }
    count
}

fn strip_markup(text: &str) -> std::borrow::Cow<'_, str> {
    static TAG: OnceLock<Regex> = OnceLock::new();
    let re = TAG.get_or_init(|| Regex::new(r"<[^>]*>").expect("tag pattern is valid"));
    re.replace_all(text, "")
}
