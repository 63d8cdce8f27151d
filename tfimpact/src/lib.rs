//! Change-aware test selection and plan analysis for Terraform module repositories.
//!
//! The crate keeps the same split throughout:
//!
//! - **[`core`]**: Pure, deterministic logic (change sets, impact, test-file mapping,
//!   plan queries, value rendering, source scanning). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (git, terraform, filesystem, process execution).
//!
//! Orchestration modules ([`select`], [`validate`], [`review`]) coordinate core logic
//! with I/O to implement CLI commands.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod review;
pub mod select;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod validate;
