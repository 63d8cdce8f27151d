//! Pure logic: no filesystem, no subprocesses.

pub mod changeset;
pub mod hcl_scan;
pub mod impact;
pub mod plan;
pub mod test_map;
pub mod value;
