//! I/O helpers: git, terraform, filesystem and process execution.

pub mod config;
pub mod discover;
pub mod git;
pub mod module_files;
pub mod plan_workspace;
pub mod process;
pub mod terraform;
pub mod toolchain;
pub mod validation_workspace;
