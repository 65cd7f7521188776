//! The undo workflow: revert the last bump commit and its tag.
//!
//! ```text
//! Start -> GuardChecks -> PurityCheck -> VersionCaptured
//!       -> DryRunExit                                  (dry run)
//!       -> Reset -> Stashed -> TagDeleted -> Done
//!                                        -> RemoteTagDeleted -> Done  (push)
//! ```
//!
//! The reset keeps the bump in the working tree and the stash then tucks it
//! away, so the manifest changes stay recoverable with `git stash pop`.

use semver::Version;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::config::GitConfig;
use crate::git::VersionControl;
use crate::guard::{self, Confirmation};
use crate::manifest::ManifestTool;
use crate::version::tag_name;
use crate::workflow::{Settled, WorkflowEvent, WorkflowResult, checked_out_branch, settle};

/// Everything an undo run needs to know up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoOptions {
    /// Also delete the remote tag and offer a force-push.
    pub push: bool,
    /// Report what would be undone and stop.
    pub dry_run: bool,
    /// Remote the tag was pushed to.
    pub remote: String,
    /// Branch a pushing undo must run on; `None` accepts whichever is checked out.
    pub branch: Option<String>,
}

impl UndoOptions {
    /// Options taking remote and branch from config.
    pub fn from_config(git: &GitConfig) -> Self {
        Self {
            push: false,
            dry_run: false,
            remote: git.remote.clone(),
            branch: git.branch.clone(),
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

impl Default for UndoOptions {
    fn default() -> Self {
        Self::from_config(&GitConfig::default())
    }
}

/// Stages of the undo state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UndoStage {
    /// Tooling checked, current version read.
    Start,
    /// HEAD-is-tagged check.
    GuardChecks,
    /// HEAD commit checked for foreign files.
    PurityCheck,
    /// Guards passed; the version to undo is settled.
    VersionCaptured,
    /// Dry run finished; nothing was changed.
    DryRunExit,
    /// HEAD reset by one commit.
    Reset,
    /// Manifest changes stashed.
    Stashed,
    /// Local tag deleted.
    TagDeleted,
    /// Remote tag deleted.
    RemoteTagDeleted,
    /// Workflow finished.
    Done,
}

impl UndoStage {
    /// Whether the machine stops here.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::DryRunExit | Self::Done)
    }
}

/// What an undo run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UndoOutcome {
    /// Version that was undone.
    pub from: Version,
    /// Version the manifest holds afterwards; `None` on a dry run.
    pub to: Option<Version>,
    /// Tag that was (or would be) deleted.
    pub tag: String,
    /// Whether the tag was deleted from the remote.
    pub remote_tag_deleted: bool,
    /// Whether the branch was force-pushed.
    pub force_pushed: bool,
    /// Whether this was a dry run.
    pub dry_run: bool,
    /// Stages visited, in order.
    pub trail: Vec<UndoStage>,
}

/// Run the undo workflow.
///
/// `confirm` is only consulted for the force-push; `on_event` receives
/// progress as it happens.
#[instrument(skip_all, fields(push = options.push, dry_run = options.dry_run))]
pub fn run_undo<V, M, C, E>(
    vcs: &V,
    manifest: &M,
    options: &UndoOptions,
    confirm: C,
    on_event: E,
) -> WorkflowResult<UndoOutcome>
where
    V: VersionControl + ?Sized,
    M: ManifestTool + ?Sized,
    C: FnMut(&Confirmation) -> bool,
    E: FnMut(WorkflowEvent),
{
    manifest.ensure_available()?;
    let from = manifest.read_version()?;

    let mut run = UndoRun {
        vcs,
        manifest,
        options,
        confirm,
        on_event,
        tag: tag_name(&from),
        from,
        changed: Vec::new(),
        branch: None,
        to: None,
        remote_tag_deleted: false,
        force_pushed: false,
    };

    let mut trail = Vec::new();
    let mut stage = UndoStage::Start;
    loop {
        trail.push(stage);
        if stage.is_terminal() {
            break;
        }
        stage = run.advance(stage)?;
        debug!(?stage, "undo stage");
    }

    info!(from = %run.from, to = ?run.to, dry_run = options.dry_run, "undo finished");

    Ok(UndoOutcome {
        from: run.from,
        tag: run.tag,
        to: run.to,
        remote_tag_deleted: run.remote_tag_deleted,
        force_pushed: run.force_pushed,
        dry_run: options.dry_run,
        trail,
    })
}

struct UndoRun<'a, V: ?Sized, M: ?Sized, C, E> {
    vcs: &'a V,
    manifest: &'a M,
    options: &'a UndoOptions,
    confirm: C,
    on_event: E,
    from: Version,
    tag: String,
    changed: Vec<String>,
    branch: Option<String>,
    to: Option<Version>,
    remote_tag_deleted: bool,
    force_pushed: bool,
}

impl<V, M, C, E> UndoRun<'_, V, M, C, E>
where
    V: VersionControl + ?Sized,
    M: ManifestTool + ?Sized,
    C: FnMut(&Confirmation) -> bool,
    E: FnMut(WorkflowEvent),
{
    fn advance(&mut self, stage: UndoStage) -> WorkflowResult<UndoStage> {
        match stage {
            UndoStage::Start => Ok(UndoStage::GuardChecks),
            UndoStage::GuardChecks => {
                let head_tags = self.vcs.tags_containing_head()?;
                settle(guard::head_tagged_for_undo(&head_tags), &mut self.confirm)?;
                Ok(UndoStage::PurityCheck)
            }
            UndoStage::PurityCheck => {
                self.changed = self.vcs.changed_files("HEAD~1", "HEAD")?;
                settle(
                    guard::bump_commit_purity(&self.changed, self.manifest.files()),
                    &mut self.confirm,
                )?;
                Ok(UndoStage::VersionCaptured)
            }
            UndoStage::VersionCaptured => {
                if self.options.dry_run {
                    return Ok(UndoStage::DryRunExit);
                }
                if self.options.push {
                    self.branch = checked_out_branch(self.vcs, self.options.branch.as_deref())?;
                }
                self.vcs.reset_mixed(1)?;
                (self.on_event)(WorkflowEvent::Reset { commits: 1 });
                Ok(UndoStage::Reset)
            }
            UndoStage::Reset => {
                // Exactly what the bump commit touched; an empty pathspec would stash everything
                let files = self.changed.clone();
                if !files.is_empty() {
                    self.vcs.stash_push(&files)?;
                    (self.on_event)(WorkflowEvent::Stashed { files });
                }
                Ok(UndoStage::Stashed)
            }
            UndoStage::Stashed => {
                let tag = self.tag.clone();
                self.vcs.delete_local_tag(&tag)?;
                (self.on_event)(WorkflowEvent::TagDeleted { tag });
                self.to = Some(self.manifest.read_version()?);
                Ok(UndoStage::TagDeleted)
            }
            UndoStage::TagDeleted => {
                if !self.options.push {
                    return Ok(UndoStage::Done);
                }
                let tag = self.tag.clone();
                let remote = self.options.remote.clone();
                (self.on_event)(WorkflowEvent::Running(format!(
                    "Deleting {tag} from {remote}"
                )));
                self.vcs.delete_remote_tag(&remote, &tag)?;
                (self.on_event)(WorkflowEvent::RemoteTagDeleted { remote, tag });
                self.remote_tag_deleted = true;
                Ok(UndoStage::RemoteTagDeleted)
            }
            UndoStage::RemoteTagDeleted => {
                self.force_push()?;
                Ok(UndoStage::Done)
            }
            UndoStage::DryRunExit | UndoStage::Done => Ok(stage),
        }
    }

    fn force_push(&mut self) -> WorkflowResult<()> {
        let remote = self.options.remote.clone();
        let Some(branch) = self.branch.clone() else {
            (self.on_event)(WorkflowEvent::ForcePushSkipped {
                remote,
                branch: None,
            });
            return Ok(());
        };

        if let Settled::Declined(_) = settle(guard::force_push(&remote, &branch), &mut self.confirm)?
        {
            (self.on_event)(WorkflowEvent::ForcePushSkipped {
                remote,
                branch: Some(branch),
            });
            return Ok(());
        }

        (self.on_event)(WorkflowEvent::Running(format!(
            "Force-pushing {branch} to {remote}"
        )));
        self.vcs.force_push(&remote, &branch)?;
        (self.on_event)(WorkflowEvent::ForcePushed { remote, branch });
        self.force_pushed = true;
        Ok(())
    }
}
