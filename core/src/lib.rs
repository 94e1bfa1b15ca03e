//! Core orchestration logic for `tidyctl`.
//!
//! The crate drives a repeating clang-tidy refactor pipeline over a CMake +
//! Ninja C/C++ project: run a full tidy pass, partition the diagnostics into
//! prioritized task files, rename identifiers through clangd, archive
//! completed tasks, and keep the tidy state fresh with incremental reruns on
//! a configurable cadence.
//!
//! Components, leaves first:
//!
//! - [`process`] — subprocess runner with merged, tee'd output streaming
//! - [`diagnostics`] — clang-tidy log parsing and rename-candidate extraction
//! - [`tasks`] — prioritized task partitioning into `tasks/batch_NNN/`
//! - [`state`] — persisted batch / refresh / flow state
//! - [`ninja_log`] — `.ninja_log` step timing statistics
//! - [`compile_db`] — `compile_commands.json` lookup indexes
//! - [`invoker`] — configure-if-stale plus the full tidy build
//! - [`verify`] — the configure/build/test collaborator
//! - [`refresh`] — incremental refresh and full-pass cadence
//! - [`rename`] — the plan / apply / audit rename pipeline
//! - [`flow`] — the outer loop, clean, flow, batch, and close state machines

pub mod compile_db;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod flow;
pub mod invoker;
pub mod ninja_log;
pub mod pathkey;
pub mod paths;
pub mod process;
pub mod refresh;
pub mod rename;
pub mod state;
pub mod tasks;
pub mod verify;

pub use config::TidyConfig;
pub use error::{OrchestratorError, Result};
