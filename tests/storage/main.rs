//! Integration tests for chunk-scoped machine storage.
//!
//! These tests drive `ChunkMachineStorage` through whole partition
//! lifecycles (activate → mutate → deactivate → reactivate) over in-memory
//! and file-backed collaborators.
//!
//! Codec details, cache bookkeeping and registry behavior are covered by the
//! unit tests in each crate.

#[path = "../common/mod.rs"]
mod common;

mod cache_consistency;
mod example_scenario;
mod file_backed;
mod format_rejection;
mod lifecycle;
