//! Undo workflow against the in-memory project.

use tagbump_core::fake::FakeProject;
use tagbump_core::semver::Version;
use tagbump_core::{
    BumpKind, BumpOptions, Confirmation, GuardViolation, UndoOptions, UndoStage, WorkflowError,
    WorkflowEvent, run_bump, run_undo,
};

fn never(_: &Confirmation) -> bool {
    false
}

fn always(_: &Confirmation) -> bool {
    true
}

/// A project whose HEAD is a fresh `1.2.3 -> 1.3.0` bump commit.
fn bumped() -> FakeProject {
    let project =
        FakeProject::new(Version::new(1, 2, 3)).with_commit("feat: add widgets", &["src/lib.rs"]);
    run_bump(
        &project,
        &project,
        &BumpOptions::new(BumpKind::Minor),
        never,
        |_| {},
    )
    .unwrap();
    project
}

#[test]
fn undo_reverts_commit_tag_and_manifest() {
    let project = bumped();
    let commits_before = project.state().commits.len();
    let mut events = Vec::new();

    let outcome = run_undo(
        &project,
        &project,
        &UndoOptions::default(),
        always,
        |e| events.push(e),
    )
    .unwrap();

    assert_eq!(outcome.from, Version::new(1, 3, 0));
    assert_eq!(outcome.to, Some(Version::new(1, 2, 3)));
    assert_eq!(outcome.tag, "v1.3.0");
    assert!(!outcome.remote_tag_deleted);
    assert!(!outcome.force_pushed);

    assert_eq!(project.state().commits.len(), commits_before - 1);
    assert_eq!(project.head().message, "feat: add widgets");
    assert!(!project.has_tag("v1.3.0"));
    assert!(project.has_tag("v1.2.3"));
    assert_eq!(project.state().stash.len(), 1);
    assert_eq!(project.state().stash[0].version, Version::new(1, 3, 0));

    assert_eq!(
        events,
        [
            WorkflowEvent::Reset { commits: 1 },
            WorkflowEvent::Stashed {
                files: vec!["Cargo.lock".into(), "Cargo.toml".into()]
            },
            WorkflowEvent::TagDeleted {
                tag: "v1.3.0".into()
            },
        ]
    );
    assert_eq!(
        outcome.trail,
        [
            UndoStage::Start,
            UndoStage::GuardChecks,
            UndoStage::PurityCheck,
            UndoStage::VersionCaptured,
            UndoStage::Reset,
            UndoStage::Stashed,
            UndoStage::TagDeleted,
            UndoStage::Done,
        ]
    );
}

#[test]
fn undo_then_bump_round_trips() {
    let project = bumped();
    let original = project.head();

    run_undo(&project, &project, &UndoOptions::default(), never, |_| {}).unwrap();
    run_bump(
        &project,
        &project,
        &BumpOptions::new(BumpKind::Minor),
        never,
        |_| {},
    )
    .unwrap();

    assert_eq!(project.head(), original);
    assert_eq!(project.tag_distance("v1.3.0"), Some(0));
}

#[test]
fn untagged_head_is_not_undone() {
    let project =
        FakeProject::new(Version::new(1, 2, 3)).with_commit("feat: add widgets", &["src/lib.rs"]);
    let before = project.snapshot();

    let err = run_undo(&project, &project, &UndoOptions::default(), always, |_| {}).unwrap_err();

    assert!(matches!(err, WorkflowError::Guard(GuardViolation::NotTagged)));
    assert_eq!(project.snapshot(), before);
}

#[test]
fn impure_commit_is_left_alone() {
    let project = FakeProject::new(Version::new(1, 2, 3))
        .with_commit("release 1.2.4 with fixes", &["Cargo.toml", "src/lib.rs"])
        .with_head_tag("v1.2.4");
    let before = project.snapshot();

    let err = run_undo(&project, &project, &UndoOptions::default(), always, |_| {}).unwrap_err();

    match err {
        WorkflowError::Guard(GuardViolation::ImpureBumpCommit { files }) => {
            assert_eq!(files, ["src/lib.rs"]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(project.snapshot(), before);
    assert!(project.log().is_empty());
}

#[test]
fn dry_undo_reports_without_mutation() {
    let project = bumped();
    let before = project.snapshot();

    let outcome = run_undo(
        &project,
        &project,
        &UndoOptions::default().with_dry_run(true),
        always,
        |_| {},
    )
    .unwrap();

    assert!(outcome.dry_run);
    assert_eq!(outcome.from, Version::new(1, 3, 0));
    assert_eq!(outcome.to, None);
    assert_eq!(outcome.trail.last(), Some(&UndoStage::DryRunExit));
    assert_eq!(project.snapshot(), before);
}

#[test]
fn push_deletes_remote_tag_and_asks_before_force_push() {
    let project = bumped().with_remote_tags(&["v1.3.0"]);
    let mut asked = Vec::new();

    let outcome = run_undo(
        &project,
        &project,
        &UndoOptions::default().with_push(true),
        |c: &Confirmation| {
            asked.push(c.clone());
            true
        },
        |_| {},
    )
    .unwrap();

    assert!(outcome.remote_tag_deleted);
    assert!(outcome.force_pushed);
    assert!(!project.state().remote_tags.contains("v1.3.0"));
    assert_eq!(
        asked,
        [Confirmation::ForcePush {
            remote: "origin".into(),
            branch: "main".into(),
        }]
    );
    let log = project.log();
    assert_eq!(
        &log[log.len() - 2..],
        ["push origin :refs/tags/v1.3.0", "push --force origin main"]
    );
}

#[test]
fn declined_force_push_still_deletes_remote_tag() {
    let project = bumped().with_remote_tags(&["v1.3.0"]);
    let mut events = Vec::new();

    let outcome = run_undo(
        &project,
        &project,
        &UndoOptions::default().with_push(true),
        never,
        |e| events.push(e),
    )
    .unwrap();

    assert!(outcome.remote_tag_deleted);
    assert!(!outcome.force_pushed);
    assert!(events.contains(&WorkflowEvent::ForcePushSkipped {
        remote: "origin".into(),
        branch: Some("main".into()),
    }));
    assert!(!project.log().iter().any(|l| l.contains("--force")));
}

#[test]
fn undo_without_push_never_asks() {
    let project = bumped().with_remote_tags(&["v1.3.0"]);
    let mut asked = 0;
    run_undo(
        &project,
        &project,
        &UndoOptions::default(),
        |_: &Confirmation| {
            asked += 1;
            true
        },
        |_| {},
    )
    .unwrap();
    assert_eq!(asked, 0);
    assert!(project.state().remote_tags.contains("v1.3.0"));
}

#[test]
fn missing_remote_tag_is_reported() {
    let project = bumped();
    let err = run_undo(
        &project,
        &project,
        &UndoOptions::default().with_push(true),
        always,
        |_| {},
    )
    .unwrap_err();
    assert!(matches!(err, WorkflowError::Git(_)));
    // Local undo already happened.
    assert!(!project.has_tag("v1.3.0"));
}

#[test]
fn untracked_lockfile_stashes_only_what_the_bump_changed() {
    let project = FakeProject::new(Version::new(1, 2, 3))
        .with_untracked_lockfile()
        .with_commit("feat: add widgets", &["src/lib.rs"]);
    run_bump(
        &project,
        &project,
        &BumpOptions::new(BumpKind::Patch),
        never,
        |_| {},
    )
    .unwrap();
    let mut events = Vec::new();

    let outcome = run_undo(
        &project,
        &project,
        &UndoOptions::default(),
        never,
        |e| events.push(e),
    )
    .unwrap();

    assert_eq!(outcome.to, Some(Version::new(1, 2, 3)));
    assert!(events.contains(&WorkflowEvent::Stashed {
        files: vec!["Cargo.toml".into()]
    }));
    assert_eq!(project.state().stash[0].files, ["Cargo.toml"]);
    assert!(project.state().modified.is_empty());
    assert!(!project.has_tag("v1.2.4"));
}

#[test]
fn pushing_undo_on_another_branch_changes_nothing() {
    let project = bumped().with_remote_tags(&["v1.3.0"]);
    let before = project.snapshot();
    let mut options = UndoOptions::default().with_push(true);
    options.branch = Some("release".into());

    let err = run_undo(&project, &project, &options, always, |_| {}).unwrap_err();

    assert!(matches!(
        err,
        WorkflowError::Guard(GuardViolation::BranchMismatch { .. })
    ));
    assert_eq!(project.snapshot(), before);
}

#[test]
fn local_undo_ignores_the_configured_branch() {
    let project = bumped();
    let mut options = UndoOptions::default();
    options.branch = Some("release".into());

    let outcome = run_undo(&project, &project, &options, never, |_| {}).unwrap();
    assert_eq!(outcome.to, Some(Version::new(1, 2, 3)));
}
