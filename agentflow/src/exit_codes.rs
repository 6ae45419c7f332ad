//! Stable exit codes for agentflow CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid workspace, configuration, arguments, or another error.
pub const INVALID: i32 = 1;
/// The engine refused the operation; nothing changed.
pub const REFUSED: i32 = 2;
/// A generator call failed and the task was marked failed.
pub const FAILED: i32 = 3;
