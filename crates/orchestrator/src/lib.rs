//! Run coordination for the loadbay pipeline.
//!
//! One invocation is one locked run: acquire the advisory lock, purge
//! staging, snapshot the pending registry rows, then dispatch and collect
//! each task strictly in order.

pub mod config;
pub mod pipeline;
