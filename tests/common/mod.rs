//! Common test utilities for codeclean-engine integration tests
//!
//! - `TestRepo` builder for throwaway source trees
//! - `scan_repo` for running a scan with deterministic, bridge-free parsers

#![allow(dead_code)]

pub mod test_repo;

pub use test_repo::{scan_repo, TestRepo};
