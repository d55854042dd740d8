//! crates/quiz_engine_core/src/lib.rs
//!
//! The core of the timed quiz-game engine: pure domain structs, the port
//! traits that form the hexagonal boundary, and the session/question/level
//! lifecycle logic. Persistence, host integration, and presentation live
//! behind the ports and are provided by the `api` service crate.

pub mod domain;
pub mod engine;
pub mod error;
pub mod ports;
pub mod timing;

pub use engine::GameEngine;
pub use error::{EngineError, EngineResult};
