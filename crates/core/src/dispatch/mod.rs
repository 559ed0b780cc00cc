//! Handler dispatch: isolated subprocess launch with a bounded timeout.
//!
//! The only contract between the orchestrator and a handler is a set of
//! environment variables and the process exit code. Stdout/stderr are
//! captured for operator diagnostics, and stdout is additionally parsed
//! as JSON so handlers can declare their output files explicitly.

pub mod executor;
pub mod runner;
pub mod subprocess;
