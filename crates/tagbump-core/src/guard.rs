//! Guard checks for the bump and undo workflows.
//!
//! Every guard is a pure function from repository observations to a
//! [`Decision`]. Guards never prompt: a guard that wants a human answer
//! returns [`Decision::NeedsConfirmation`] and the orchestrator asks.

use serde::Serialize;
use thiserror::Error;

/// A guard condition that stops the workflow.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "violation", rename_all = "kebab-case")]
pub enum GuardViolation {
    /// HEAD is already tagged and the user chose not to bump again.
    #[error("HEAD is already tagged ({}); aborting", .tags.join(", "))]
    AlreadyTagged {
        /// Tags at HEAD.
        tags: Vec<String>,
    },

    /// The tag for the next version already exists.
    #[error("tag {tag} already exists")]
    TagConflict {
        /// The conflicting tag.
        tag: String,
    },

    /// Staged changes would be swept into the bump commit.
    #[error("there are staged changes ({}); commit or unstage them before bumping", .files.join(", "))]
    StagedChanges {
        /// Staged paths.
        files: Vec<String>,
    },

    /// Undo needs HEAD to be a tagged bump commit.
    #[error("HEAD isn't tagged; nothing to undo")]
    NotTagged,

    /// The HEAD commit touches files other than the manifest.
    #[error(
        "HEAD is tagged but also changes {}; reset and remove the tag manually",
        .files.join(", ")
    )]
    ImpureBumpCommit {
        /// Changed paths outside the manifest set.
        files: Vec<String>,
    },

    /// Push requested but there is no branch to push.
    #[error("HEAD is detached; check out a branch to push")]
    DetachedHead,

    /// `git.branch` names a branch other than the one checked out.
    #[error(
        "`git.branch` is {expected} but HEAD is {}; check out {expected} first",
        .current.as_ref().map_or_else(|| "detached".to_string(), |b| format!("on {b}"))
    )]
    BranchMismatch {
        /// Configured branch.
        expected: String,
        /// Checked-out branch, `None` when detached.
        current: Option<String>,
    },
}

/// A yes/no question the workflow needs answered before it can continue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "confirmation", rename_all = "kebab-case")]
pub enum Confirmation {
    /// HEAD already carries a tag; bumping again is probably a mistake.
    HeadAlreadyTagged {
        /// Tags at HEAD.
        tags: Vec<String>,
    },
    /// The next tag exists; delete it and tag the bump commit instead.
    ReplaceExistingTag {
        /// The conflicting tag.
        tag: String,
    },
    /// Push the bump commit and tags.
    Push {
        /// Remote name.
        remote: String,
        /// Branch to push.
        branch: String,
    },
    /// Force-push the branch after an undo.
    ForcePush {
        /// Remote name.
        remote: String,
        /// Branch to force-push.
        branch: String,
    },
}

impl Confirmation {
    /// Context to show before the question, if any.
    pub fn warning(&self) -> Option<String> {
        match self {
            Self::HeadAlreadyTagged { tags } => Some(format!(
                "HEAD is already tagged ({}). Seems like an attempt to bump without any new changes.",
                tags.join(", ")
            )),
            Self::ReplaceExistingTag { tag } => Some(format!("The tag {tag} already exists.")),
            Self::Push { .. } => None,
            Self::ForcePush { .. } => {
                Some("Undo removes the tag and reverts the commit locally only.".into())
            }
        }
    }

    /// The question to ask.
    pub fn question(&self) -> String {
        match self {
            Self::HeadAlreadyTagged { .. } => "Proceed with the bump anyway?".into(),
            Self::ReplaceExistingTag { tag } => format!("Remove {tag} and replace it?"),
            Self::Push { remote, branch } => {
                format!("Push {branch} and tags to {remote}?")
            }
            Self::ForcePush { remote, branch } => format!(
                "Also force-push the reverted {branch} to {remote}? (this rewrites remote history)"
            ),
        }
    }
}

/// The verdict of a guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Continue to the next stage.
    Proceed,
    /// Stop the workflow.
    Abort(GuardViolation),
    /// Continue only if the user agrees.
    NeedsConfirmation(Confirmation),
}

/// Bumping on top of an already tagged HEAD needs a confirmation.
pub fn head_tagged_for_bump(head_tags: &[String]) -> Decision {
    if head_tags.is_empty() {
        Decision::Proceed
    } else {
        Decision::NeedsConfirmation(Confirmation::HeadAlreadyTagged {
            tags: head_tags.to_vec(),
        })
    }
}

/// An existing next-version tag aborts a dry run and asks otherwise.
pub fn tag_conflict(tag: &str, exists: bool, dry_run: bool) -> Decision {
    match (exists, dry_run) {
        (false, _) => Decision::Proceed,
        (true, true) => Decision::Abort(GuardViolation::TagConflict { tag: tag.into() }),
        (true, false) => {
            Decision::NeedsConfirmation(Confirmation::ReplaceExistingTag { tag: tag.into() })
        }
    }
}

/// Any staged file aborts the bump.
pub fn staged_changes(staged: &[String]) -> Decision {
    if staged.is_empty() {
        Decision::Proceed
    } else {
        Decision::Abort(GuardViolation::StagedChanges {
            files: staged.to_vec(),
        })
    }
}

/// Push straight away when requested, otherwise ask.
pub fn push_requested(requested: bool, remote: &str, branch: &str) -> Decision {
    if requested {
        Decision::Proceed
    } else {
        Decision::NeedsConfirmation(Confirmation::Push {
            remote: remote.into(),
            branch: branch.into(),
        })
    }
}

/// Undo refuses to run unless HEAD is tagged.
pub fn head_tagged_for_undo(head_tags: &[String]) -> Decision {
    if head_tags.is_empty() {
        Decision::Abort(GuardViolation::NotTagged)
    } else {
        Decision::Proceed
    }
}

/// Undo only reverts commits that touch nothing but manifest files.
pub fn bump_commit_purity(changed: &[String], manifest_files: &[String]) -> Decision {
    let foreign: Vec<String> = changed
        .iter()
        .filter(|file| !manifest_files.contains(file))
        .cloned()
        .collect();
    if foreign.is_empty() {
        Decision::Proceed
    } else {
        Decision::Abort(GuardViolation::ImpureBumpCommit { files: foreign })
    }
}

/// A configured branch must be the checked-out one.
pub fn branch_matches(configured: Option<&str>, current: Option<&str>) -> Decision {
    match configured {
        Some(expected) if current != Some(expected) => {
            Decision::Abort(GuardViolation::BranchMismatch {
                expected: expected.into(),
                current: current.map(str::to_string),
            })
        }
        _ => Decision::Proceed,
    }
}

/// Force-pushing is always an explicit choice.
pub fn force_push(remote: &str, branch: &str) -> Decision {
    Decision::NeedsConfirmation(Confirmation::ForcePush {
        remote: remote.into(),
        branch: branch.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn untagged_head_proceeds_to_bump() {
        assert_eq!(head_tagged_for_bump(&[]), Decision::Proceed);
    }

    #[test]
    fn tagged_head_asks_before_bump() {
        let decision = head_tagged_for_bump(&strings(&["v1.2.3"]));
        assert_eq!(
            decision,
            Decision::NeedsConfirmation(Confirmation::HeadAlreadyTagged {
                tags: strings(&["v1.2.3"])
            })
        );
    }

    #[test]
    fn tag_conflict_matrix() {
        assert_eq!(tag_conflict("v1.3.0", false, false), Decision::Proceed);
        assert_eq!(tag_conflict("v1.3.0", false, true), Decision::Proceed);
        assert_eq!(
            tag_conflict("v1.3.0", true, true),
            Decision::Abort(GuardViolation::TagConflict {
                tag: "v1.3.0".into()
            })
        );
        assert_eq!(
            tag_conflict("v1.3.0", true, false),
            Decision::NeedsConfirmation(Confirmation::ReplaceExistingTag {
                tag: "v1.3.0".into()
            })
        );
    }

    #[test]
    fn staged_files_abort() {
        assert_eq!(staged_changes(&[]), Decision::Proceed);
        assert_eq!(
            staged_changes(&strings(&["src/lib.rs"])),
            Decision::Abort(GuardViolation::StagedChanges {
                files: strings(&["src/lib.rs"])
            })
        );
    }

    #[test]
    fn push_flag_skips_the_question() {
        assert_eq!(push_requested(true, "origin", "main"), Decision::Proceed);
        assert!(matches!(
            push_requested(false, "origin", "main"),
            Decision::NeedsConfirmation(Confirmation::Push { .. })
        ));
    }

    #[test]
    fn undo_requires_tagged_head() {
        assert_eq!(
            head_tagged_for_undo(&[]),
            Decision::Abort(GuardViolation::NotTagged)
        );
        assert_eq!(head_tagged_for_undo(&strings(&["v2.0.0"])), Decision::Proceed);
    }

    #[test]
    fn purity_accepts_manifest_subset() {
        let manifest = strings(&["Cargo.toml", "Cargo.lock"]);
        assert_eq!(
            bump_commit_purity(&strings(&["Cargo.toml"]), &manifest),
            Decision::Proceed
        );
        assert_eq!(
            bump_commit_purity(&strings(&["Cargo.lock", "Cargo.toml"]), &manifest),
            Decision::Proceed
        );
    }

    #[test]
    fn purity_lists_only_foreign_files() {
        let manifest = strings(&["Cargo.toml", "Cargo.lock"]);
        assert_eq!(
            bump_commit_purity(&strings(&["Cargo.toml", "src/main.rs", "README.md"]), &manifest),
            Decision::Abort(GuardViolation::ImpureBumpCommit {
                files: strings(&["src/main.rs", "README.md"])
            })
        );
    }

    #[test]
    fn configured_branch_must_be_checked_out() {
        assert_eq!(branch_matches(None, Some("feature")), Decision::Proceed);
        assert_eq!(branch_matches(None, None), Decision::Proceed);
        assert_eq!(branch_matches(Some("main"), Some("main")), Decision::Proceed);
        assert_eq!(
            branch_matches(Some("main"), Some("feature")),
            Decision::Abort(GuardViolation::BranchMismatch {
                expected: "main".into(),
                current: Some("feature".into())
            })
        );
        assert_eq!(
            branch_matches(Some("main"), None),
            Decision::Abort(GuardViolation::BranchMismatch {
                expected: "main".into(),
                current: None
            })
        );
    }

    #[test]
    fn branch_mismatch_messages() {
        let on_feature = GuardViolation::BranchMismatch {
            expected: "main".into(),
            current: Some("feature".into()),
        };
        assert_eq!(
            on_feature.to_string(),
            "`git.branch` is main but HEAD is on feature; check out main first"
        );
        let detached = GuardViolation::BranchMismatch {
            expected: "main".into(),
            current: None,
        };
        assert!(detached.to_string().contains("HEAD is detached"));
    }

    #[test]
    fn force_push_always_asks() {
        assert!(matches!(
            force_push("origin", "main"),
            Decision::NeedsConfirmation(Confirmation::ForcePush { .. })
        ));
    }

    #[test]
    fn confirmation_text() {
        let push = Confirmation::Push {
            remote: "origin".into(),
            branch: "main".into(),
        };
        assert_eq!(push.question(), "Push main and tags to origin?");
        assert!(push.warning().is_none());

        let tagged = Confirmation::HeadAlreadyTagged {
            tags: strings(&["v1.0.0", "stable"]),
        };
        assert!(tagged.warning().unwrap().contains("v1.0.0, stable"));

        let force = Confirmation::ForcePush {
            remote: "origin".into(),
            branch: "main".into(),
        };
        assert!(force.question().contains("force-push"));
    }

    #[test]
    fn violation_messages() {
        let err = GuardViolation::StagedChanges {
            files: strings(&["a.rs", "b.rs"]),
        };
        assert!(err.to_string().contains("a.rs, b.rs"));
        assert_eq!(
            GuardViolation::NotTagged.to_string(),
            "HEAD isn't tagged; nothing to undo"
        );
    }

    #[test]
    fn violation_serializes_with_tag() {
        let json = serde_json::to_string(&GuardViolation::TagConflict {
            tag: "v1.0.0".into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"violation":"tag-conflict","tag":"v1.0.0"}"#);
    }
}
