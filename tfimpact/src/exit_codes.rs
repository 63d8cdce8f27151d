//! Stable exit codes for tfimpact CLI commands.

/// Command succeeded, including "nothing to test".
pub const OK: i32 = 0;
/// Tests or validation failed, or the command itself errored.
pub const FAILED: i32 = 1;
