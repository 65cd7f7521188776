//! Pieces shared by the bump and undo workflows.
//!
//! Both workflows are state machines driven by an orchestrator that owns
//! the only two side channels to the outside world: a `confirm` callback
//! that answers [`Confirmation`]s and an `on_event` callback that receives
//! [`WorkflowEvent`]s for progress display.

use semver::Version;
use serde::Serialize;
use thiserror::Error;

use crate::git::{GitError, PullStatus, VersionControl};
use crate::guard::{self, Confirmation, Decision, GuardViolation};
use crate::manifest::{ManifestError, ManifestTool};
use crate::version::{BumpKind, VersionError};

// ──────────────────────────────────────────────
// Errors
// ──────────────────────────────────────────────

/// Errors from the bump and undo workflows.
#[derive(Error, Debug)]
pub enum WorkflowError {
    /// A guard stopped the workflow.
    #[error(transparent)]
    Guard(#[from] GuardViolation),

    /// Manifest tooling failed.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// A git command failed.
    #[error(transparent)]
    Git(#[from] GitError),

    /// A version could not be read.
    #[error(transparent)]
    Version(#[from] VersionError),

    /// The manifest does not hold the version the bump should have produced.
    #[error("manifest reports v{actual} after the bump, expected v{expected}")]
    Consistency {
        /// Version the bump should have produced.
        expected: Version,
        /// Version the manifest reports.
        actual: Version,
    },

    /// The local branch is not in step with its upstream.
    #[error("{status} from {remote}; review the incoming changes and push manually")]
    RemoteDivergence {
        /// Remote that was pulled.
        remote: String,
        /// What the pull found.
        status: PullStatus,
    },
}

/// Result alias for workflow operations.
pub type WorkflowResult<T> = Result<T, WorkflowError>;

// ──────────────────────────────────────────────
// Events
// ──────────────────────────────────────────────

/// Progress events emitted while a workflow runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowEvent {
    /// A long-running external step is starting.
    Running(String),
    /// The next version has been worked out.
    VersionComputed {
        /// Current manifest version.
        current: Version,
        /// Version after the bump.
        next: Version,
        /// Bump kind.
        kind: BumpKind,
    },
    /// An existing tag was removed so it can be recreated.
    TagReplaced {
        /// The removed tag.
        tag: String,
    },
    /// The manifest now records the new version.
    ManifestBumped {
        /// The new version.
        version: Version,
    },
    /// A commit was created.
    Committed {
        /// Short hash.
        hash: String,
        /// Commit message.
        message: String,
    },
    /// A tag was created at HEAD.
    Tagged {
        /// Tag name.
        tag: String,
    },
    /// The upstream was pulled.
    Pulled(PullStatus),
    /// The branch and tags were pushed.
    Pushed {
        /// Remote name.
        remote: String,
        /// Branch name.
        branch: String,
    },
    /// The push was declined or impossible.
    PushSkipped {
        /// Remote name.
        remote: String,
        /// Branch name, if HEAD is on one.
        branch: Option<String>,
    },
    /// Commits were reset, keeping their changes in the working tree.
    Reset {
        /// Number of commits.
        commits: usize,
    },
    /// Working tree changes were stashed.
    Stashed {
        /// Stashed paths.
        files: Vec<String>,
    },
    /// A local tag was deleted.
    TagDeleted {
        /// Tag name.
        tag: String,
    },
    /// A tag was deleted from the remote.
    RemoteTagDeleted {
        /// Remote name.
        remote: String,
        /// Tag name.
        tag: String,
    },
    /// The reverted branch was force-pushed.
    ForcePushed {
        /// Remote name.
        remote: String,
        /// Branch name.
        branch: String,
    },
    /// The force-push was declined or impossible.
    ForcePushSkipped {
        /// Remote name.
        remote: String,
        /// Branch name, if HEAD is on one.
        branch: Option<String>,
    },
}

// ──────────────────────────────────────────────
// Repository snapshot
// ──────────────────────────────────────────────

/// What the bump workflow observes before it changes anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryState {
    /// Version recorded in the manifest.
    pub current_version: Version,
    /// Tags pointing at HEAD.
    pub head_tags: Vec<String>,
    /// Paths staged in the index.
    pub staged_files: Vec<String>,
}

impl RepositoryState {
    /// Read the snapshot from git and the manifest.
    pub fn observe<V, M>(vcs: &V, manifest: &M) -> WorkflowResult<Self>
    where
        V: VersionControl + ?Sized,
        M: ManifestTool + ?Sized,
    {
        Ok(Self {
            head_tags: vcs.tags_containing_head()?,
            staged_files: vcs.staged_files()?,
            current_version: manifest.read_version()?,
        })
    }
}

// ──────────────────────────────────────────────
// Helpers for the orchestrators
// ──────────────────────────────────────────────

/// A [`Decision`] after any confirmation has been answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Settled {
    Proceed,
    Declined(Confirmation),
}

/// Turn a decision into a settled answer, asking through `confirm` if needed.
pub(crate) fn settle<C>(decision: Decision, confirm: &mut C) -> WorkflowResult<Settled>
where
    C: FnMut(&Confirmation) -> bool,
{
    match decision {
        Decision::Proceed => Ok(Settled::Proceed),
        Decision::Abort(violation) => Err(violation.into()),
        Decision::NeedsConfirmation(question) => {
            if confirm(&question) {
                Ok(Settled::Proceed)
            } else {
                Ok(Settled::Declined(question))
            }
        }
    }
}

/// The checked-out branch, which must be `configured` when that is set.
pub(crate) fn checked_out_branch<V>(
    vcs: &V,
    configured: Option<&str>,
) -> WorkflowResult<Option<String>>
where
    V: VersionControl + ?Sized,
{
    let current = vcs.current_branch()?;
    match guard::branch_matches(configured, current.as_deref()) {
        Decision::Abort(violation) => Err(violation.into()),
        Decision::Proceed | Decision::NeedsConfirmation(_) => Ok(current),
    }
}
