//! Deterministic, pure logic shared by the engine.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! strings and paths and return deterministic outputs suitable for tests.

pub mod action;
pub mod budget;
pub mod invariants;
pub mod naming;
pub mod path;
pub mod plan;
pub mod text;
pub mod types;
