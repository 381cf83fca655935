//! Plan-driven build orchestration.
//!
//! A project is described by a Markdown build plan whose checkbox steps are
//! executed one at a time against an isolated workspace. Failed command steps
//! enter a bounded auto-fix loop that asks a text-generation backend for a
//! single file edit, applies it, and re-runs the command.
//!
//! - **[`core`]**: Pure, deterministic logic (plan parsing, action parsing,
//!   path containment, prompt budgeting). No I/O.
//! - **[`io`]**: Side-effecting operations (processes, sandbox, file editor,
//!   workspace store, generation backend).
//!
//! Orchestration modules ([`engine`], [`looping`]) combine the two to
//! implement CLI commands.

pub mod core;
pub mod engine;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
