//! Swiftstream - Build orchestration for Swift streams
//!
//! This library runs the builds of Swift projects targeting native,
//! WebAssembly and Android backends, and coalesces hot rebuilds requested
//! by a file watcher.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`cli`] - Command-line interface parsing and output formatting
//! - [`core`] - Build pipeline, lanes, freshness and hot rebuilds
//! - [`infra`] - Infrastructure layer (processes, filesystem, directories)
//! - [`config`] - Configuration and constants
//! - [`error`] - Error types and handling

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;

#[cfg(test)]
pub mod test_utils;
