//! Consortium runner library.
//!
//! Exposes the workflow and its supporting modules for integration testing.
//! In production, `consortium-runner` is used as a binary (main.rs).

pub mod cli;
pub mod error;
pub mod logging;
pub mod output;
pub mod report;
pub mod stage;
pub mod workflow;
