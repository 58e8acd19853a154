//! envboot - detect, install and verify the external CLI tools an
//! application depends on.
//!
//! The [`bootstrap::EnvBootstrapService`] owns a small state machine that
//! probes for two tools, runs bundled installer scripts for whichever are
//! missing, streams their output to observers, and settles into either
//! `env-ready` or `failed`. Any number of callers may call
//! [`start`](bootstrap::EnvBootstrapService::start) concurrently; they all
//! share one run.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod i18n;
pub mod probe;
pub mod runner;
