//! tickerd-web
//!
//! HTTP surface for the tickerd orchestrator: submission, task polling,
//! cancellation, and the loopback-guarded config endpoints.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod runner;
pub mod state;
