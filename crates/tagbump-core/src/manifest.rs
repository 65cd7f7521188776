//! Build-manifest operations.
//!
//! [`ManifestTool`] reads and bumps the version recorded in the project
//! manifest. [`CargoManifest`] drives `cargo metadata` for reading and an
//! external cargo subcommand (cargo-edit's `set-version` by default) for
//! bumping.

use std::process::Command;

use camino::Utf8PathBuf;
use semver::Version;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::ManifestConfig;
use crate::version::{BumpKind, VersionError, parse_version};

/// Errors from manifest operations.
#[derive(Error, Debug)]
pub enum ManifestError {
    /// The tool that bumps the manifest is not installed.
    #[error("{tool} is not installed ({hint})")]
    ToolMissing {
        /// Binary that was looked up on `PATH`.
        tool: String,
        /// How to install it.
        hint: String,
    },

    /// A configured command is empty.
    #[error("{0} command is empty")]
    EmptyCommand(&'static str),

    /// Failed to spawn a command.
    #[error("failed to execute `{command}`: {source}")]
    Exec {
        /// The command line.
        command: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A command exited unsuccessfully.
    #[error("`{command}` failed: {stderr}")]
    Command {
        /// The command line.
        command: String,
        /// Captured stderr.
        stderr: String,
    },

    /// `cargo metadata` printed something we could not read.
    #[error("unreadable cargo metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    /// The configured package is not part of the workspace.
    #[error("package `{0}` not found in cargo metadata")]
    PackageNotFound(String),

    /// The workspace has no package to take the version from.
    #[error("cargo metadata lists no packages")]
    NoPackages,

    /// The manifest holds a version we cannot bump.
    #[error(transparent)]
    Version(#[from] VersionError),
}

/// Result alias for manifest operations.
pub type ManifestResult<T> = Result<T, ManifestError>;

/// Manifest operations consumed by the workflows.
pub trait ManifestTool {
    /// Fail with [`ManifestError::ToolMissing`] if the bump tool is absent.
    fn ensure_available(&self) -> ManifestResult<()>;

    /// The version currently recorded in the manifest.
    fn read_version(&self) -> ManifestResult<Version>;

    /// Bump the manifest version in place.
    fn bump(&self, kind: BumpKind) -> ManifestResult<()>;

    /// Check that the manifest (and lockfile) are consistent after a bump.
    fn validate(&self) -> ManifestResult<()>;

    /// Files a bump commit is allowed to touch, relative to the project root.
    fn files(&self) -> &[String];
}

/// [`ManifestTool`] backed by `cargo`.
#[derive(Debug, Clone)]
pub struct CargoManifest {
    root: Utf8PathBuf,
    bump_command: String,
    check_command: String,
    files: Vec<String>,
    package: Option<String>,
}

impl CargoManifest {
    /// Build from the `[manifest]` config section, running commands in `root`.
    pub fn new(root: impl Into<Utf8PathBuf>, config: &ManifestConfig) -> Self {
        Self {
            root: root.into(),
            bump_command: config.bump_command.clone(),
            check_command: config.check_command.clone(),
            files: config.files.clone(),
            package: config.package.clone(),
        }
    }

    /// Arguments appended to the bump command.
    fn bump_args(&self, kind: BumpKind) -> Vec<String> {
        let mut args = vec![kind.to_string()];
        if let Some(package) = &self.package {
            args.push("--package".into());
            args.push(package.clone());
        }
        args
    }

    fn run(
        &self,
        what: &'static str,
        command_line: &str,
        extra: &[&str],
    ) -> ManifestResult<String> {
        let parts: Vec<&str> = command_line.split_whitespace().collect();
        let Some((bin, args)) = parts.split_first() else {
            return Err(ManifestError::EmptyCommand(what));
        };
        let shown = if extra.is_empty() {
            command_line.to_string()
        } else {
            format!("{command_line} {}", extra.join(" "))
        };

        debug!(command = %shown, "running {what} command");

        let output = Command::new(bin)
            .args(args)
            .args(extra)
            .current_dir(self.root.as_std_path())
            .output()
            .map_err(|source| ManifestError::Exec {
                command: shown.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ManifestError::Command {
                command: shown,
                stderr,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl ManifestTool for CargoManifest {
    #[instrument(skip(self), fields(bump_command = %self.bump_command))]
    fn ensure_available(&self) -> ManifestResult<()> {
        let parts: Vec<&str> = self.bump_command.split_whitespace().collect();
        let Some(tool) = required_binary(&parts) else {
            return Err(ManifestError::EmptyCommand("bump"));
        };
        if which::which(&tool).is_ok() {
            debug!(%tool, "bump tool found");
            Ok(())
        } else {
            let hint = install_hint(&tool);
            Err(ManifestError::ToolMissing { tool, hint })
        }
    }

    #[instrument(skip(self))]
    fn read_version(&self) -> ManifestResult<Version> {
        let stdout = self.run(
            "metadata",
            "cargo metadata --no-deps --format-version=1",
            &[],
        )?;
        let version = version_from_metadata(&stdout, self.package.as_deref())?;
        debug!(%version, "manifest version");
        Ok(version)
    }

    #[instrument(skip(self))]
    fn bump(&self, kind: BumpKind) -> ManifestResult<()> {
        let args = self.bump_args(kind);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run("bump", &self.bump_command, &args)?;
        Ok(())
    }

    #[instrument(skip(self))]
    fn validate(&self) -> ManifestResult<()> {
        self.run("check", &self.check_command, &[])?;
        Ok(())
    }

    fn files(&self) -> &[String] {
        &self.files
    }
}

#[derive(Deserialize)]
struct Metadata {
    packages: Vec<PackageMetadata>,
}

#[derive(Deserialize)]
struct PackageMetadata {
    name: String,
    version: String,
}

/// Pick the package version out of `cargo metadata` JSON.
///
/// Without a package name the first package wins.
fn version_from_metadata(json: &str, package: Option<&str>) -> ManifestResult<Version> {
    let metadata: Metadata = serde_json::from_str(json)?;
    let found = match package {
        Some(name) => metadata.packages.iter().find(|p| p.name == name),
        None => metadata.packages.first(),
    };
    let Some(found) = found else {
        return Err(package.map_or(ManifestError::NoPackages, |name| {
            ManifestError::PackageNotFound(name.to_string())
        }));
    };
    Ok(parse_version(&found.version)?)
}

/// The binary that must be on `PATH` for a bump command to work.
///
/// `cargo foo ...` needs the `cargo-foo` plugin; anything else needs its
/// first word.
fn required_binary(parts: &[&str]) -> Option<String> {
    match parts {
        ["cargo", sub, ..] if !sub.starts_with('-') => Some(format!("cargo-{sub}")),
        [bin, ..] => Some((*bin).to_string()),
        [] => None,
    }
}

fn install_hint(tool: &str) -> String {
    match tool {
        "cargo-set-version" => "install it with `cargo install cargo-edit`".into(),
        t if t.starts_with("cargo-") => format!("install it with `cargo install {t}`"),
        t => format!("make sure `{t}` is on PATH"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const METADATA: &str = r#"{
        "packages": [
            {"name": "app", "version": "1.2.3", "id": "app 1.2.3"},
            {"name": "app-core", "version": "0.4.0", "id": "app-core 0.4.0"}
        ],
        "workspace_members": [],
        "version": 1
    }"#;

    #[test]
    fn metadata_first_package_by_default() {
        assert_eq!(
            version_from_metadata(METADATA, None).unwrap(),
            Version::new(1, 2, 3)
        );
    }

    #[test]
    fn metadata_selects_named_package() {
        assert_eq!(
            version_from_metadata(METADATA, Some("app-core")).unwrap(),
            Version::new(0, 4, 0)
        );
    }

    #[test]
    fn metadata_missing_package() {
        let err = version_from_metadata(METADATA, Some("nope")).unwrap_err();
        assert!(matches!(err, ManifestError::PackageNotFound(_)));
        assert!(err.to_string().contains("`nope`"));

        let err = version_from_metadata(r#"{"packages": []}"#, None).unwrap_err();
        assert!(matches!(err, ManifestError::NoPackages));
    }

    #[test]
    fn metadata_garbage_is_an_error() {
        assert!(matches!(
            version_from_metadata("warning: something\n", None),
            Err(ManifestError::Metadata(_))
        ));
    }

    #[test]
    fn metadata_prerelease_is_rejected() {
        let json = r#"{"packages": [{"name": "app", "version": "2.0.0-rc.1"}]}"#;
        assert!(matches!(
            version_from_metadata(json, None),
            Err(ManifestError::Version(VersionError::UnexpectedShape(_)))
        ));
    }

    #[test]
    fn required_binary_for_cargo_plugins() {
        assert_eq!(
            required_binary(&["cargo", "set-version", "--bump"]).as_deref(),
            Some("cargo-set-version")
        );
        assert_eq!(
            required_binary(&["cargo", "bump"]).as_deref(),
            Some("cargo-bump")
        );
        assert_eq!(
            required_binary(&["./scripts/bump.sh"]).as_deref(),
            Some("./scripts/bump.sh")
        );
        assert_eq!(required_binary(&[]), None);
    }

    #[test]
    fn install_hints() {
        assert!(install_hint("cargo-set-version").contains("cargo-edit"));
        assert!(install_hint("cargo-bump").contains("cargo install cargo-bump"));
        assert!(install_hint("bumper").contains("PATH"));
    }

    #[test]
    fn missing_tool_is_reported() {
        let config = ManifestConfig {
            bump_command: "cargo definitely-not-a-real-plugin-xyz".into(),
            ..ManifestConfig::default()
        };
        let manifest = CargoManifest::new(".", &config);
        let err = manifest.ensure_available().unwrap_err();
        assert!(matches!(err, ManifestError::ToolMissing { .. }));
        assert!(err.to_string().contains("cargo-definitely-not-a-real-plugin-xyz"));
    }

    #[test]
    fn empty_bump_command_is_rejected() {
        let config = ManifestConfig {
            bump_command: "   ".into(),
            ..ManifestConfig::default()
        };
        let manifest = CargoManifest::new(".", &config);
        assert!(matches!(
            manifest.ensure_available(),
            Err(ManifestError::EmptyCommand("bump"))
        ));
        assert!(matches!(
            manifest.bump(BumpKind::Patch),
            Err(ManifestError::EmptyCommand("bump"))
        ));
    }

    #[test]
    fn bump_args_name_the_configured_package() {
        let manifest = CargoManifest::new(".", &ManifestConfig::default());
        assert_eq!(manifest.bump_args(BumpKind::Major), ["major"]);

        let config = ManifestConfig {
            package: Some("app-core".into()),
            ..ManifestConfig::default()
        };
        let manifest = CargoManifest::new(".", &config);
        assert_eq!(
            manifest.bump_args(BumpKind::Minor),
            ["minor", "--package", "app-core"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn bump_command_receives_kind_and_package() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
        let script = root.join("record.sh");
        std::fs::write(&script, "#!/bin/sh\necho \"$@\" > args.txt\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = ManifestConfig {
            bump_command: script.to_string(),
            package: Some("app-core".into()),
            ..ManifestConfig::default()
        };
        CargoManifest::new(root.clone(), &config)
            .bump(BumpKind::Minor)
            .unwrap();

        let recorded = std::fs::read_to_string(root.join("args.txt")).unwrap();
        assert_eq!(recorded.trim(), "minor --package app-core");
    }

    #[cfg(unix)]
    #[test]
    fn failing_command_reports_its_command_line() {
        let config = ManifestConfig {
            check_command: "sh -c false".into(),
            ..ManifestConfig::default()
        };
        let err = CargoManifest::new(".", &config).validate().unwrap_err();
        match err {
            ManifestError::Command { command, .. } => assert_eq!(command, "sh -c false"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn files_come_from_config() {
        let manifest = CargoManifest::new(".", &ManifestConfig::default());
        assert_eq!(manifest.files(), ["Cargo.toml", "Cargo.lock"]);
    }
}
