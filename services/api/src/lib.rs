//! services/api/src/lib.rs
//!
//! The host-integration service for the quiz-game engine: configuration,
//! the PostgreSQL store adapter, in-memory adapters for tests and
//! database-free embedding, and the serializable DTO views handed to the
//! hosting platform. The operations themselves live in
//! `quiz_engine_core::GameEngine`; this crate wires them to the outside
//! world.

pub mod adapters;
pub mod config;
pub mod dto;
pub mod error;
