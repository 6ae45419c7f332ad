//! Contract-driven task orchestration for model-backed agents.
//!
//! A workspace holds task definitions, agent personas, and reference
//! documents. The engine walks the task graph in dependency order, hands
//! each task to a generator, optionally iterates on automated review, red
//! team, and QA feedback, and gates the result behind human approval.
//!
//! - **[`core`]**: Pure, deterministic logic (data model, readiness,
//!   validation, selection, check evaluation, review parsing, retrieval).
//! - **[`io`]**: Side-effecting adapters (workspace files, configuration,
//!   prompts, child processes, the generator backend, archives).
//!
//! Orchestration modules ([`engine`], [`looping`], [`review`], [`select`],
//! [`validate`], [`status`], [`export`], [`standalone`]) coordinate the two
//! to implement CLI commands.

pub mod core;
pub mod engine;
pub mod exit_codes;
pub mod export;
pub mod io;
pub mod logging;
pub mod looping;
pub mod review;
pub mod select;
pub mod standalone;
pub mod status;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod validate;
