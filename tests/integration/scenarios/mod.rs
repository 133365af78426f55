//! Test scenarios for integration testing
//!
//! Each module contains tests for specific functionality:
//! - operations: primary reads and writes through the manager
//! - replication: mirror fan-out and partial failure
//! - expiry: TTL handling against a paused clock
//! - lifecycle: lazy, exactly-once pool construction
//! - redis_backend: the pooled Redis backend against a RESP server

pub mod operations;
