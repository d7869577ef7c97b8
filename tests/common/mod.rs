//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

/// Test project context
///
/// Creates a temporary directory for test projects and provides
/// utilities for setting up test scenarios.
pub struct TestProject {
    /// Temporary directory for the test project
    pub dir: TempDir,
}

#[allow(dead_code)]
impl TestProject {
    /// Create a new test project in a temporary directory
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Create a project with a manifest and a Swift package
    pub fn with_manifest(manifest: &str) -> Self {
        let project = Self::new();
        project.create_file("swiftstream.toml", manifest);
        project.create_file("Package.swift", "// swift-tools-version:5.9\n");
        project.create_file("Sources/App/main.swift", "print(\"hello\")\n");
        project
    }

    /// Get the path to the test project directory
    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Create a file in the test project
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(path, content).expect("Failed to write file");
    }

    /// Create a directory in the test project
    pub fn create_dir(&self, name: &str) {
        let path = self.dir.path().join(name);
        std::fs::create_dir_all(path).expect("Failed to create directory");
    }

    /// Check if a file exists in the test project
    pub fn file_exists(&self, name: &str) -> bool {
        self.dir.path().join(name).exists()
    }

    /// Read a file from the test project
    pub fn read_file(&self, name: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(name)).expect("Failed to read file")
    }

    /// The swiftstream binary, isolated from the user's global config
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_swiftstream"));
        cmd.current_dir(self.path());
        cmd.env("SWIFTSTREAM_CONFIG_DIR", self.path().join(".config"));
        cmd.env_remove("SWIFTSTREAM_PROJECT_DIR");
        cmd.env_remove("RUST_LOG");
        cmd
    }

    /// Run swiftstream with arguments
    pub fn run(&self, args: &[&str]) -> Output {
        self.command()
            .args(args)
            .output()
            .expect("Failed to execute swiftstream")
    }

    /// Run swiftstream feeding `input` on stdin
    pub fn run_with_stdin(&self, args: &[&str], input: &str) -> Output {
        let mut child = self
            .command()
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("Failed to spawn swiftstream");
        child
            .stdin
            .take()
            .expect("stdin is piped")
            .write_all(input.as_bytes())
            .expect("Failed to write stdin");
        child.wait_with_output().expect("Failed to wait for swiftstream")
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Pure stream whose steps are `sh` one-liners
#[allow(dead_code)]
pub const PURE_MANIFEST: &str = r#"
[project]
name = "test-project"
stream = "pure"

[build]
targets = ["App"]

[steps.resolve]
program = "sh"
args = ["-c", "mkdir -p {build_path}"]

[steps.compile]
program = "sh"
args = ["-c", "echo {target} {mode} >> compiled.log"]

[steps.styles]
program = "sh"
args = ["-c", "echo styled >> styles.log"]
"#;

/// Server stream whose compile step fails
#[allow(dead_code)]
pub const FAILING_MANIFEST: &str = r#"
[project]
name = "broken"
stream = "server"

[build]
targets = ["Server"]

[steps.resolve]
program = "sh"
args = ["-c", "mkdir -p {build_path}"]

[steps.compile]
program = "sh"
args = ["-c", "echo 'error: no such module' >&2; exit 1"]
"#;

/// Stdout lines parsed as JSON, skipping anything else
#[allow(dead_code)]
pub fn json_lines(output: &Output) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect()
}
