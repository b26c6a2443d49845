//! tickerd-core
//!
//! Core building blocks for the tickerd analysis orchestrator.
//!
//! - **domain**: ids, subjects, task states, records
//! - **store**: in-memory task registry + FIFO ready queue
//! - **gateway**: submission normalization, validation, admission control
//! - **runner**: `AnalysisRunner` collaborator seam
//! - **worker**: worker pool driving the runner with live log relay
//! - **envfile**: `.env`-style config store with backup + atomic replace
//! - **guard**: loopback origin check for config mutation

pub mod domain;
pub mod envfile;
pub mod error;
pub mod gateway;
pub mod guard;
pub mod runner;
pub mod store;
pub mod worker;
