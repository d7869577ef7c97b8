//! Build identities
//!
//! What is being built ([`BuildKind`]), in which mode, on which lane, and
//! for which backend, plus the artifact kinds the freshness table tracks.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What is being built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildKind {
    /// Full debug build
    Debug,
    /// Full release build
    Release,
    /// Swift executables after a source change
    HotSwift,
    /// Stylesheets
    HotStyle,
    /// Script bundle
    HotScript,
    /// HTML pages
    HotMarkup,
}

impl BuildKind {
    /// Hot kinds in replay order
    pub const HOT: [BuildKind; 4] = [
        BuildKind::HotSwift,
        BuildKind::HotScript,
        BuildKind::HotMarkup,
        BuildKind::HotStyle,
    ];

    pub fn is_hot(self) -> bool {
        !matches!(self, Self::Debug | Self::Release)
    }

    /// The lane this kind runs on; every hot kind shares the debug lane
    pub fn lane(self) -> Lane {
        match self {
            Self::Release => Lane::Release,
            _ => Lane::Debug,
        }
    }

    pub fn mode(self) -> BuildMode {
        match self {
            Self::Release => BuildMode::Release,
            _ => BuildMode::Debug,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Release => "release",
            Self::HotSwift => "hot_swift",
            Self::HotStyle => "hot_style",
            Self::HotScript => "hot_script",
            Self::HotMarkup => "hot_markup",
        }
    }

    /// Title used in status lines, e.g. "Debug Build"
    pub fn title(self) -> &'static str {
        match self {
            Self::Debug => "Debug Build",
            Self::Release => "Release Build",
            Self::HotSwift => "Hot Rebuild Swift",
            Self::HotStyle => "Hot Rebuild CSS",
            Self::HotScript => "Hot Rebuild JS",
            Self::HotMarkup => "Hot Rebuild HTML",
        }
    }
}

impl fmt::Display for BuildKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debug" => Ok(Self::Debug),
            "release" => Ok(Self::Release),
            "hot_swift" | "swift" => Ok(Self::HotSwift),
            "hot_style" | "style" | "css" => Ok(Self::HotStyle),
            "hot_script" | "script" | "js" => Ok(Self::HotScript),
            "hot_markup" | "markup" | "html" => Ok(Self::HotMarkup),
            other => Err(format!("Unknown build kind '{other}'")),
        }
    }
}

/// Compiler configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    Debug,
    Release,
}

impl BuildMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Release => "release",
        }
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An independent build lane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lane {
    Debug,
    Release,
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Debug => f.write_str("debug"),
            Self::Release => f.write_str("release"),
        }
    }
}

/// Toolchain backend a sibling sub-pipeline builds for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Native,
    Wasi,
    Android,
}

impl Backend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Wasi => "wasi",
            Self::Android => "android",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Artifact kinds tracked by the freshness table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    SwiftPackageManifest,
    SwiftSources,
    DependencyLockfile,
    WebSources,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 4] = [
        ArtifactKind::SwiftPackageManifest,
        ArtifactKind::SwiftSources,
        ArtifactKind::DependencyLockfile,
        ArtifactKind::WebSources,
    ];

    /// Key prefix in the persisted table
    pub fn key(self) -> &'static str {
        match self {
            Self::SwiftPackageManifest => "swiftPackage",
            Self::SwiftSources => "swiftSources",
            Self::DependencyLockfile => "dependencyLockfile",
            Self::WebSources => "webSources",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}
