//! Infrastructure layer
//!
//! Handles all I/O operations: external processes, filesystem and
//! directory layout.

pub mod dirs;
pub mod filesystem;
pub mod process;
