//! The bump workflow.
//!
//! [`run_bump`] drives a small state machine over [`BumpStage`]:
//!
//! ```text
//! Start -> GuardChecks -> VersionComputed -> TagConflictCheck
//!       -> DryRunExit                                  (dry run)
//!       -> StagedChangesCheck -> Committed -> Tagged -> PushDecision -> Done
//! ```
//!
//! Each transition performs the work that leads to the next stage. Guards
//! come from [`crate::guard`]; the orchestrator is the only place a
//! confirmation is asked for.

use semver::Version;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::config::{DEFAULT_COMMIT_MESSAGE, GitConfig};
use crate::git::{PullStatus, VersionControl};
use crate::guard::{self, Confirmation, GuardViolation};
use crate::manifest::ManifestTool;
use crate::version::{BumpKind, next_version, tag_name};
use crate::workflow::{
    RepositoryState, Settled, WorkflowError, WorkflowEvent, WorkflowResult, checked_out_branch,
    settle,
};

// ──────────────────────────────────────────────
// Options and outcome
// ──────────────────────────────────────────────

/// Everything a bump run needs to know up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BumpOptions {
    /// Which component to increment.
    pub kind: BumpKind,
    /// Push without asking.
    pub push: bool,
    /// Report the next version and stop before changing anything.
    pub dry_run: bool,
    /// Remote to pull from and push to.
    pub remote: String,
    /// Branch the bump must run on; `None` accepts whichever is checked out.
    pub branch: Option<String>,
    /// Create annotated tags instead of lightweight ones.
    pub annotated_tags: bool,
    /// Commit message template.
    pub commit_message: String,
}

impl BumpOptions {
    /// Options with the default git settings.
    pub fn new(kind: BumpKind) -> Self {
        Self::from_config(kind, &GitConfig::default())
    }

    /// Options taking remote, branch, tag and message settings from config.
    pub fn from_config(kind: BumpKind, git: &GitConfig) -> Self {
        Self {
            kind,
            push: false,
            dry_run: false,
            remote: git.remote.clone(),
            branch: git.branch.clone(),
            annotated_tags: git.annotated_tags,
            commit_message: git.commit_message.clone(),
        }
    }

    /// Set the push flag.
    #[must_use]
    pub const fn with_push(mut self, push: bool) -> Self {
        self.push = push;
        self
    }

    /// Set the dry-run flag.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

impl Default for BumpOptions {
    fn default() -> Self {
        Self::new(BumpKind::default())
    }
}

/// Stages of the bump state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BumpStage {
    /// Tooling checked, repository observed.
    Start,
    /// HEAD-already-tagged check.
    GuardChecks,
    /// Next version known.
    VersionComputed,
    /// Next tag checked against existing tags.
    TagConflictCheck,
    /// Dry run finished; nothing was changed.
    DryRunExit,
    /// Index checked for staged changes.
    StagedChangesCheck,
    /// Manifest bumped and committed.
    Committed,
    /// Bump commit tagged.
    Tagged,
    /// Push asked for or skipped.
    PushDecision,
    /// Workflow finished.
    Done,
}

impl BumpStage {
    /// Whether the machine stops here.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::DryRunExit | Self::Done)
    }
}

/// What a bump run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BumpOutcome {
    /// Version before the bump.
    pub previous: Version,
    /// Version after the bump (or that would be, on a dry run).
    pub next: Version,
    /// Tag for the new version.
    pub tag: String,
    /// Bump kind.
    pub kind: BumpKind,
    /// Whether this was a dry run.
    pub dry_run: bool,
    /// Short hash of the bump commit.
    pub commit: Option<String>,
    /// Whether the branch and tags were pushed.
    pub pushed: bool,
    /// Stages visited, in order.
    pub trail: Vec<BumpStage>,
}

/// Fill in `{prev_version}` and `{version}` in a commit message template.
pub fn render_commit_message(template: &str, previous: &Version, next: &Version) -> String {
    let template = if template.trim().is_empty() {
        DEFAULT_COMMIT_MESSAGE
    } else {
        template
    };
    template
        .replace("{prev_version}", &previous.to_string())
        .replace("{version}", &next.to_string())
}

// ──────────────────────────────────────────────
// Orchestrator
// ──────────────────────────────────────────────

/// Run the bump workflow.
///
/// `confirm` answers every [`Confirmation`] the guards raise; returning
/// `false` declines. `on_event` receives progress as it happens.
#[instrument(skip_all, fields(kind = %options.kind, dry_run = options.dry_run))]
pub fn run_bump<V, M, C, E>(
    vcs: &V,
    manifest: &M,
    options: &BumpOptions,
    confirm: C,
    on_event: E,
) -> WorkflowResult<BumpOutcome>
where
    V: VersionControl + ?Sized,
    M: ManifestTool + ?Sized,
    C: FnMut(&Confirmation) -> bool,
    E: FnMut(WorkflowEvent),
{
    manifest.ensure_available()?;
    let observed = RepositoryState::observe(vcs, manifest)?;
    debug!(?observed, "repository observed");

    let next = next_version(&observed.current_version, options.kind);
    let mut run = BumpRun {
        vcs,
        manifest,
        options,
        confirm,
        on_event,
        tag: tag_name(&next),
        next,
        observed,
        branch: None,
        commit: None,
        pushed: false,
    };

    let mut trail = Vec::new();
    let mut stage = BumpStage::Start;
    loop {
        trail.push(stage);
        if stage.is_terminal() {
            break;
        }
        stage = run.advance(stage)?;
        debug!(?stage, "bump stage");
    }

    info!(
        previous = %run.observed.current_version,
        next = %run.next,
        dry_run = options.dry_run,
        "bump finished"
    );

    Ok(BumpOutcome {
        previous: run.observed.current_version,
        next: run.next,
        tag: run.tag,
        kind: options.kind,
        dry_run: options.dry_run,
        commit: run.commit,
        pushed: run.pushed,
        trail,
    })
}

struct BumpRun<'a, V: ?Sized, M: ?Sized, C, E> {
    vcs: &'a V,
    manifest: &'a M,
    options: &'a BumpOptions,
    confirm: C,
    on_event: E,
    observed: RepositoryState,
    next: Version,
    tag: String,
    branch: Option<String>,
    commit: Option<String>,
    pushed: bool,
}

impl<V, M, C, E> BumpRun<'_, V, M, C, E>
where
    V: VersionControl + ?Sized,
    M: ManifestTool + ?Sized,
    C: FnMut(&Confirmation) -> bool,
    E: FnMut(WorkflowEvent),
{
    fn advance(&mut self, stage: BumpStage) -> WorkflowResult<BumpStage> {
        match stage {
            BumpStage::Start => Ok(BumpStage::GuardChecks),
            BumpStage::GuardChecks => {
                let decision = guard::head_tagged_for_bump(&self.observed.head_tags);
                if let Settled::Declined(_) = settle(decision, &mut self.confirm)? {
                    return Err(GuardViolation::AlreadyTagged {
                        tags: self.observed.head_tags.clone(),
                    }
                    .into());
                }
                (self.on_event)(WorkflowEvent::VersionComputed {
                    current: self.observed.current_version.clone(),
                    next: self.next.clone(),
                    kind: self.options.kind,
                });
                Ok(BumpStage::VersionComputed)
            }
            BumpStage::VersionComputed => Ok(BumpStage::TagConflictCheck),
            BumpStage::TagConflictCheck => {
                self.resolve_tag_conflict()?;
                if self.options.dry_run {
                    Ok(BumpStage::DryRunExit)
                } else {
                    Ok(BumpStage::StagedChangesCheck)
                }
            }
            BumpStage::StagedChangesCheck => {
                settle(
                    guard::staged_changes(&self.observed.staged_files),
                    &mut self.confirm,
                )?;
                self.branch = checked_out_branch(self.vcs, self.options.branch.as_deref())?;
                self.bump_and_commit()?;
                Ok(BumpStage::Committed)
            }
            BumpStage::Committed => {
                let message = self.message();
                let annotation = self.options.annotated_tags.then_some(message.as_str());
                self.vcs.create_tag(&self.tag, annotation)?;
                (self.on_event)(WorkflowEvent::Tagged {
                    tag: self.tag.clone(),
                });
                Ok(BumpStage::Tagged)
            }
            BumpStage::Tagged => Ok(BumpStage::PushDecision),
            BumpStage::PushDecision => {
                self.push()?;
                Ok(BumpStage::Done)
            }
            BumpStage::DryRunExit | BumpStage::Done => Ok(stage),
        }
    }

    fn message(&self) -> String {
        render_commit_message(
            &self.options.commit_message,
            &self.observed.current_version,
            &self.next,
        )
    }

    fn resolve_tag_conflict(&mut self) -> WorkflowResult<()> {
        let exists = self.vcs.tag_exists(&self.tag)?;
        let decision = guard::tag_conflict(&self.tag, exists, self.options.dry_run);
        match settle(decision, &mut self.confirm)? {
            Settled::Declined(_) => Err(GuardViolation::TagConflict {
                tag: self.tag.clone(),
            }
            .into()),
            Settled::Proceed if exists => {
                self.vcs.delete_local_tag(&self.tag)?;
                (self.on_event)(WorkflowEvent::TagReplaced {
                    tag: self.tag.clone(),
                });
                Ok(())
            }
            Settled::Proceed => Ok(()),
        }
    }

    fn bump_and_commit(&mut self) -> WorkflowResult<()> {
        (self.on_event)(WorkflowEvent::Running(format!(
            "Bumping {} version",
            self.options.kind
        )));
        self.manifest.bump(self.options.kind)?;

        (self.on_event)(WorkflowEvent::Running("Checking manifest".into()));
        self.manifest.validate()?;

        let actual = self.manifest.read_version()?;
        if actual != self.next {
            return Err(WorkflowError::Consistency {
                expected: self.next.clone(),
                actual,
            });
        }
        (self.on_event)(WorkflowEvent::ManifestBumped {
            version: actual,
        });

        let message = self.message();
        // Only tracked manifest files the bump rewrote; an ignored lockfile stays out
        let modified = self.vcs.modified_files()?;
        let files: Vec<String> = self
            .manifest
            .files()
            .iter()
            .filter(|file| modified.contains(file))
            .cloned()
            .collect();
        debug!(?files, "staging manifest files");
        self.vcs.stage(&files)?;
        let hash = self.vcs.commit(&message)?;
        (self.on_event)(WorkflowEvent::Committed {
            hash: hash.clone(),
            message,
        });
        self.commit = Some(hash);
        Ok(())
    }

    fn push(&mut self) -> WorkflowResult<()> {
        let remote = self.options.remote.clone();
        let Some(branch) = self.branch.clone() else {
            if self.options.push {
                return Err(GuardViolation::DetachedHead.into());
            }
            (self.on_event)(WorkflowEvent::PushSkipped {
                remote,
                branch: None,
            });
            return Ok(());
        };

        let decision = guard::push_requested(self.options.push, &remote, &branch);
        if let Settled::Declined(_) = settle(decision, &mut self.confirm)? {
            (self.on_event)(WorkflowEvent::PushSkipped {
                remote,
                branch: Some(branch),
            });
            return Ok(());
        }

        (self.on_event)(WorkflowEvent::Running(format!("Pulling from {remote}")));
        let status = self.vcs.pull()?;
        (self.on_event)(WorkflowEvent::Pulled(status));
        if status != PullStatus::UpToDate {
            return Err(WorkflowError::RemoteDivergence { remote, status });
        }

        (self.on_event)(WorkflowEvent::Running(format!("Pushing {branch} to {remote}")));
        self.vcs.push(&remote, &branch, true)?;
        (self.on_event)(WorkflowEvent::Pushed { remote, branch });
        self.pushed = true;
        Ok(())
    }
}
