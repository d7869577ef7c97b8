//! Core build orchestration logic
//!
//! Processes and filesystem access go through [`crate::infra`].
//!
//! # Submodules
//!
//! - [`kind`] - Build kinds, lanes, backends and artifact kinds
//! - [`abort`] - Abort handles
//! - [`task_runner`] - Serial command queue
//! - [`state`] - Lane state and build tickets
//! - [`freshness`] - Freshness tracker (build timestamps)
//! - [`compress`] - Background gzip/brotli jobs
//! - [`manifest`] - Manifest (swiftstream.toml) parsing and validation
//! - [`profile`] - Stream profiles and built-in step commands
//! - [`targets`] - Executable target discovery
//! - [`pipeline`] - Build pipeline
//! - [`phases`] - Phase implementations
//! - [`hot_rebuild`] - Hot-rebuild coalescer
//! - [`report`] - Status sinks and build statuses
//! - [`checksum`] - Content checksums
//! - [`cache`] - Build cache management
//! - [`global_config`] - Global configuration management

pub mod abort;
pub mod cache;
pub mod checksum;
pub mod compress;
pub mod freshness;
pub mod global_config;
pub mod hot_rebuild;
pub mod kind;
pub mod manifest;
pub mod phases;
pub mod pipeline;
pub mod profile;
pub mod report;
pub mod state;
pub mod targets;
pub mod task_runner;
