//! Consolidated test utilities for p4ic-cache
//!
//! Integration tests run the cache against an in-memory server with a real
//! client root on disk, and the CLI against state files written by the library.

pub mod assertions;
pub mod fake_server;
pub mod fixtures;
