//! services/api/src/adapters/mod.rs
//!
//! Concrete implementations of the engine's ports.

pub mod db;
pub mod memory;
pub mod mock;
