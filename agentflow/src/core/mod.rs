//! Deterministic, pure logic shared by the engine.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod checks;
pub mod invariants;
pub mod retrieval;
pub mod review_parse;
pub mod selector;
pub mod task;
pub mod types;
pub mod workflow;
