//! Side-effecting operations: processes, sandboxed execution, file edits,
//! workspace persistence, prompt rendering and the generation backend.

pub mod atomic;
pub mod config;
pub mod editor;
pub mod generator;
pub mod process;
pub mod prompt;
pub mod sandbox;
pub mod snapshot;
pub mod workspace;
