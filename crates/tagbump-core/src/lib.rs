//! Core library for tagbump.
//!
//! Version arithmetic, guard checks and the bump/undo workflows behind the
//! `tagbump` CLI. The workflows talk to git and cargo only through the
//! [`VersionControl`] and [`ManifestTool`] traits, so they run the same
//! against the real tools ([`SystemGit`], [`CargoManifest`]) and the
//! in-memory `fake::FakeProject`.
//!
//! # Modules
//!
//! - [`bump`] - The bump workflow
//! - [`undo`] - The undo workflow
//! - [`guard`] - Pure guard checks and the [`guard::Decision`] they return
//! - [`workflow`] - Errors, events and helpers shared by both workflows
//! - [`git`] - Git operations
//! - [`manifest`] - Cargo manifest operations
//! - [`version`] - Version arithmetic
//! - [`config`] - Configuration loading and management
//! - [`error`] - Configuration error types
//! - `fake` - In-memory git and cargo for tests (`test-support` feature)
//!
//! # Quick Start
//!
//! ```no_run
//! use tagbump_core::{BumpKind, BumpOptions, CargoManifest, ConfigLoader, SystemGit, run_bump};
//!
//! let config = ConfigLoader::new()
//!     .with_project_search(".")
//!     .load()
//!     .expect("Failed to load configuration");
//!
//! let git = SystemGit::new(".");
//! let manifest = CargoManifest::new(".", &config.manifest);
//! let options = BumpOptions::from_config(BumpKind::Minor, &config.git).with_dry_run(true);
//!
//! let outcome = run_bump(&git, &manifest, &options, |_| false, |_| {}).expect("bump failed");
//! println!("{} -> {}", outcome.previous, outcome.next);
//! ```
#![deny(unsafe_code)]

pub mod bump;

pub mod config;

pub mod error;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub mod git;

pub mod guard;

pub mod manifest;

pub mod undo;

pub mod version;

pub mod workflow;

pub use bump::{BumpOptions, BumpOutcome, BumpStage, run_bump};

pub use config::{Config, ConfigLoader, LogLevel};

pub use error::{ConfigError, ConfigResult};

pub use git::{GitError, PullStatus, SystemGit, VersionControl};

pub use guard::{Confirmation, Decision, GuardViolation};

pub use manifest::{CargoManifest, ManifestError, ManifestTool};

pub use undo::{UndoOptions, UndoOutcome, UndoStage, run_undo};

pub use version::{BumpKind, VersionError, next_version, tag_name};

pub use workflow::{RepositoryState, WorkflowError, WorkflowEvent, WorkflowResult};

// Re-export semver so downstream crates don't need a direct dependency.
pub use semver;
