//! Version arithmetic.
//!
//! Versions are plain `major.minor.patch` triples. Pre-release and build
//! metadata are rejected: the bump workflow only ever moves between release
//! versions.

use semver::Version;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from version operations.
#[derive(Error, Debug)]
pub enum VersionError {
    /// Failed to parse a semver string.
    #[error("invalid semver: {0}")]
    InvalidSemver(#[from] semver::Error),

    /// The string parsed, but is not a plain `major.minor.patch` release.
    #[error("unexpected version shape `{0}` (expected major.minor.patch)")]
    UnexpectedShape(String),
}

/// Result alias for version operations.
pub type VersionResult<T> = Result<T, VersionError>;

/// Which component of the version to increment.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum BumpKind {
    /// Patch release (x.y.Z).
    #[default]
    Patch,
    /// Minor release (x.Y.0).
    Minor,
    /// Major release (X.0.0).
    Major,
}

impl std::fmt::Display for BumpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Patch => write!(f, "patch"),
            Self::Minor => write!(f, "minor"),
            Self::Major => write!(f, "major"),
        }
    }
}

/// Compute the next version by applying a bump kind.
///
/// Lower components are reset to zero.
pub const fn next_version(current: &Version, kind: BumpKind) -> Version {
    match kind {
        BumpKind::Patch => Version::new(current.major, current.minor, current.patch + 1),
        BumpKind::Minor => Version::new(current.major, current.minor + 1, 0),
        BumpKind::Major => Version::new(current.major + 1, 0, 0),
    }
}

/// Parse a version string, stripping an optional `v` prefix.
pub fn parse_version(s: &str) -> VersionResult<Version> {
    let trimmed = s.trim();
    let bare = trimmed.strip_prefix('v').unwrap_or(trimmed);
    let version = Version::parse(bare)?;
    if !version.pre.is_empty() || !version.build.is_empty() {
        return Err(VersionError::UnexpectedShape(trimmed.to_string()));
    }
    Ok(version)
}

/// The git tag name for a version (`v1.2.3`).
pub fn tag_name(version: &Version) -> String {
    format!("v{version}")
}
