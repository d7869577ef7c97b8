//! Default configuration values

use std::time::Duration;

/// Project manifest file name
pub const MANIFEST_FILE: &str = "swiftstream.toml";

/// Swift package manifest file name
pub const PACKAGE_MANIFEST: &str = "Package.swift";

/// Swift sources directory
pub const SOURCES_DIR: &str = "Sources";

/// Build directory, relative to the project root
pub const BUILD_DIR: &str = ".build";

/// Freshness table file name, stored inside [`BUILD_DIR`]
pub const TIMESTAMPS_FILE: &str = "buildTimestamps.json";

/// Development output folder, relative to the project root
pub const DEV_OUTPUT_DIR: &str = "DevPublic";

/// Release output folder, relative to the project root
pub const RELEASE_OUTPUT_DIR: &str = "DistPublic";

/// Default web sources folder
pub const DEFAULT_WEB_SOURCES: &str = "WebSources";

/// Default web app target
pub const DEFAULT_APP_TARGET: &str = "App";

/// Web dependency lockfile checked by the install step
pub const WEB_PACKAGE_JSON: &str = "package.json";

/// Interval between checks while waiting on compression jobs
pub const COMPRESSION_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Extensions considered part of the web sources tree
pub const WEB_SOURCE_EXTENSIONS: &[&str] = &["js", "ts", "tsx", "json", "css", "scss", "sass", "html"];

/// Directories never descended into by freshness checks
pub const FRESHNESS_EXCLUDED_DIRS: &[&str] = &["node_modules", ".build"];
