//! Stable exit codes for planforge CLI commands.

/// Command succeeded, or a step executed successfully.
pub const OK: i32 = 0;
/// Command failed: invalid config or plan, a missing project, or another error.
pub const INVALID: i32 = 1;
/// Every step in the plan is checked off and the report was written.
pub const COMPLETE: i32 = 2;
/// A step failed (including an exhausted fix loop).
pub const STEP_FAILED: i32 = 3;
/// The project has no plan yet.
pub const NO_PLAN: i32 = 4;
