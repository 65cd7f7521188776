//! In-memory stand-ins for git and cargo.
//!
//! [`FakeProject`] implements both [`VersionControl`] and [`ManifestTool`]
//! over one shared [`FakeState`], so the bump and undo workflows can be run
//! end to end without spawning a process. Every mutating call is appended to
//! [`FakeState::log`] in a git-like spelling.

use std::cell::{Ref, RefCell};
use std::collections::{BTreeMap, BTreeSet};

use semver::Version;

use crate::git::{GitError, GitResult, PullStatus, VersionControl};
use crate::manifest::{ManifestError, ManifestResult, ManifestTool};
use crate::version::{BumpKind, next_version, tag_name};

/// Manifest files of the fake project.
pub const MANIFEST_FILES: [&str; 2] = ["Cargo.toml", "Cargo.lock"];

/// A commit in the fake history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeCommit {
    /// Commit message.
    pub message: String,
    /// Paths the commit changed.
    pub files: Vec<String>,
    /// Manifest version recorded by the commit.
    pub version: Version,
}

/// A stash entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeStash {
    /// Stashed paths.
    pub files: Vec<String>,
    /// Manifest version held by the stashed working tree.
    pub version: Version,
}

/// Everything the fake repository and manifest know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeState {
    /// History, oldest first; the last entry is HEAD.
    pub commits: Vec<FakeCommit>,
    /// Local tags and the commit index they point at.
    pub tags: BTreeMap<String, usize>,
    /// Tags present on the remote.
    pub remote_tags: BTreeSet<String>,
    /// Version in the working-tree manifest.
    pub manifest_version: Version,
    /// Paths modified in the working tree but not staged.
    pub modified: BTreeSet<String>,
    /// Paths staged in the index.
    pub staged: BTreeSet<String>,
    /// Stash entries, newest last.
    pub stash: Vec<FakeStash>,
    /// Checked-out branch; `None` when detached.
    pub branch: Option<String>,
    /// What the next pull reports.
    pub pull_status: PullStatus,
    /// Whether the bump tool is installed.
    pub tool_installed: bool,
    /// Version the bump tool writes instead of the correct one.
    pub bump_override: Option<Version>,
    /// Whether the manifest check fails.
    pub check_fails: bool,
    /// Mutating commands in the order they ran.
    pub log: Vec<String>,
}

/// A fake Cargo project in a fake git repository.
#[derive(Debug)]
pub struct FakeProject {
    state: RefCell<FakeState>,
    files: Vec<String>,
}

impl FakeProject {
    /// A project at `version` whose only commit is tagged `v{version}`.
    pub fn new(version: Version) -> Self {
        let initial = FakeCommit {
            message: "Initial commit".into(),
            files: vec!["Cargo.toml".into(), "Cargo.lock".into(), "src/lib.rs".into()],
            version: version.clone(),
        };
        let state = FakeState {
            commits: vec![initial],
            tags: BTreeMap::from([(tag_name(&version), 0)]),
            remote_tags: BTreeSet::new(),
            manifest_version: version,
            modified: BTreeSet::new(),
            staged: BTreeSet::new(),
            stash: Vec::new(),
            branch: Some("main".into()),
            pull_status: PullStatus::UpToDate,
            tool_installed: true,
            bump_override: None,
            check_fails: false,
            log: Vec::new(),
        };
        Self {
            state: RefCell::new(state),
            files: MANIFEST_FILES.iter().map(|f| (*f).to_string()).collect(),
        }
    }

    /// Add an untagged commit changing `files`.
    #[must_use]
    pub fn with_commit(self, message: &str, files: &[&str]) -> Self {
        {
            let mut state = self.state.borrow_mut();
            let version = state.manifest_version.clone();
            state.commits.push(FakeCommit {
                message: message.into(),
                files: files.iter().map(|f| (*f).to_string()).collect(),
                version,
            });
        }
        self
    }

    /// Tag HEAD.
    #[must_use]
    pub fn with_head_tag(self, name: &str) -> Self {
        {
            let mut state = self.state.borrow_mut();
            let head = state.commits.len() - 1;
            state.tags.insert(name.into(), head);
        }
        self
    }

    /// Tag the first commit, wherever HEAD is.
    #[must_use]
    pub fn with_root_tag(self, name: &str) -> Self {
        self.state.borrow_mut().tags.insert(name.into(), 0);
        self
    }

    /// Stage paths in the index.
    #[must_use]
    pub fn with_staged(self, files: &[&str]) -> Self {
        self.state
            .borrow_mut()
            .staged
            .extend(files.iter().map(|f| (*f).to_string()));
        self
    }

    /// Mark tags as present on the remote.
    #[must_use]
    pub fn with_remote_tags(self, tags: &[&str]) -> Self {
        self.state
            .borrow_mut()
            .remote_tags
            .extend(tags.iter().map(|t| (*t).to_string()));
        self
    }

    /// Set what the next pull reports.
    #[must_use]
    pub fn with_pull_status(self, status: PullStatus) -> Self {
        self.state.borrow_mut().pull_status = status;
        self
    }

    /// Check out `branch`.
    #[must_use]
    pub fn on_branch(self, branch: &str) -> Self {
        self.state.borrow_mut().branch = Some(branch.into());
        self
    }

    /// Drop `Cargo.lock` from history, as in a library crate that ignores it.
    #[must_use]
    pub fn with_untracked_lockfile(self) -> Self {
        {
            let mut state = self.state.borrow_mut();
            for commit in &mut state.commits {
                commit.files.retain(|f| f != "Cargo.lock");
            }
        }
        self
    }

    /// Detach HEAD.
    #[must_use]
    pub fn detached(self) -> Self {
        self.state.borrow_mut().branch = None;
        self
    }

    /// Pretend the bump tool is not installed.
    #[must_use]
    pub fn without_tool(self) -> Self {
        self.state.borrow_mut().tool_installed = false;
        self
    }

    /// Make the bump tool write `version` regardless of the bump kind.
    #[must_use]
    pub fn with_bump_override(self, version: Version) -> Self {
        self.state.borrow_mut().bump_override = Some(version);
        self
    }

    /// Make the manifest check fail.
    #[must_use]
    pub fn with_failing_check(self) -> Self {
        self.state.borrow_mut().check_fails = true;
        self
    }

    /// Borrow the current state.
    pub fn state(&self) -> Ref<'_, FakeState> {
        self.state.borrow()
    }

    /// Copy of the current state, for before/after comparisons.
    pub fn snapshot(&self) -> FakeState {
        self.state.borrow().clone()
    }

    /// The HEAD commit.
    pub fn head(&self) -> FakeCommit {
        let state = self.state.borrow();
        state.commits[state.commits.len() - 1].clone()
    }

    /// Whether a local tag exists.
    pub fn has_tag(&self, name: &str) -> bool {
        self.state.borrow().tags.contains_key(name)
    }

    /// Where a local tag points, counted from HEAD (`Some(0)` is HEAD).
    pub fn tag_distance(&self, name: &str) -> Option<usize> {
        let state = self.state.borrow();
        let index = *state.tags.get(name)?;
        state.head_index().checked_sub(index)
    }

    /// The mutation log.
    pub fn log(&self) -> Vec<String> {
        self.state.borrow().log.clone()
    }
}

fn failure(command: &str, stderr: impl Into<String>) -> GitError {
    GitError::Command {
        command: command.into(),
        stderr: stderr.into(),
    }
}

impl FakeState {
    fn head_index(&self) -> usize {
        self.commits.len() - 1
    }

    /// Whether some commit in history touched `path`.
    fn tracked(&self, path: &str) -> bool {
        self.commits.iter().any(|c| c.files.iter().any(|f| f == path))
    }

    /// Whether git would accept `path` as a pathspec.
    fn known(&self, path: &str) -> bool {
        self.tracked(path) || self.modified.contains(path) || self.staged.contains(path)
    }

    fn check_pathspecs(&self, command: &str, paths: &[String]) -> GitResult<()> {
        match paths.iter().find(|p| !self.known(p)) {
            Some(path) => Err(failure(
                command,
                format!("error: pathspec '{path}' did not match any file(s) known to git"),
            )),
            None => Ok(()),
        }
    }

    /// Resolve `HEAD` or `HEAD~n` to a commit index.
    fn resolve(&self, rev: &str) -> GitResult<usize> {
        let back = match rev.strip_prefix("HEAD") {
            Some("") => 0,
            Some(rest) => rest
                .strip_prefix('~')
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| failure("rev-parse", format!("bad revision '{rev}'")))?,
            None => return Err(failure("rev-parse", format!("bad revision '{rev}'"))),
        };
        self.head_index()
            .checked_sub(back)
            .ok_or_else(|| failure("rev-parse", format!("unknown revision '{rev}'")))
    }
}

impl VersionControl for FakeProject {
    fn tags_matching(&self, pattern: &str) -> GitResult<Vec<String>> {
        let state = self.state.borrow();
        let matches = |tag: &str| match pattern.strip_suffix('*') {
            Some(prefix) => tag.starts_with(prefix),
            None => tag == pattern,
        };
        Ok(state.tags.keys().filter(|t| matches(t.as_str())).cloned().collect())
    }

    fn tags_containing_head(&self) -> GitResult<Vec<String>> {
        let state = self.state.borrow();
        let head = state.head_index();
        Ok(state
            .tags
            .iter()
            .filter(|(_, index)| **index == head)
            .map(|(tag, _)| tag.clone())
            .collect())
    }

    fn staged_files(&self) -> GitResult<Vec<String>> {
        Ok(self.state.borrow().staged.iter().cloned().collect())
    }

    fn modified_files(&self) -> GitResult<Vec<String>> {
        Ok(self.state.borrow().modified.iter().cloned().collect())
    }

    fn changed_files(&self, from: &str, to: &str) -> GitResult<Vec<String>> {
        let state = self.state.borrow();
        let from = state.resolve(from)?;
        let to = state.resolve(to)?;
        let files: BTreeSet<String> = state.commits[from + 1..=to]
            .iter()
            .flat_map(|c| c.files.iter().cloned())
            .collect();
        Ok(files.into_iter().collect())
    }

    fn stage(&self, paths: &[String]) -> GitResult<()> {
        let mut state = self.state.borrow_mut();
        state.check_pathspecs("add", paths)?;
        for path in paths {
            if state.modified.remove(path) {
                state.staged.insert(path.clone());
            }
        }
        state.log.push(format!("add {}", paths.join(" ")));
        Ok(())
    }

    fn commit(&self, message: &str) -> GitResult<String> {
        let mut state = self.state.borrow_mut();
        if state.staged.is_empty() {
            return Err(failure("commit", "nothing to commit, working tree clean"));
        }
        let files = std::mem::take(&mut state.staged).into_iter().collect();
        let version = state.manifest_version.clone();
        state.commits.push(FakeCommit {
            message: message.into(),
            files,
            version,
        });
        state.log.push(format!("commit -m {message}"));
        Ok(format!("{:07x}", 0xabc_0000 + state.head_index()))
    }

    fn create_tag(&self, name: &str, annotation: Option<&str>) -> GitResult<()> {
        let mut state = self.state.borrow_mut();
        if state.tags.contains_key(name) {
            return Err(failure("tag", format!("tag '{name}' already exists")));
        }
        let head = state.head_index();
        state.tags.insert(name.into(), head);
        match annotation {
            Some(message) => state.log.push(format!("tag -a {name} -m {message}")),
            None => state.log.push(format!("tag {name}")),
        }
        Ok(())
    }

    fn delete_local_tag(&self, name: &str) -> GitResult<()> {
        let mut state = self.state.borrow_mut();
        if state.tags.remove(name).is_none() {
            return Err(failure("tag", format!("tag '{name}' not found.")));
        }
        state.log.push(format!("tag -d {name}"));
        Ok(())
    }

    fn delete_remote_tag(&self, remote: &str, name: &str) -> GitResult<()> {
        let mut state = self.state.borrow_mut();
        if !state.remote_tags.remove(name) {
            return Err(failure(
                "push",
                format!("unable to delete '{name}': remote ref does not exist"),
            ));
        }
        state.log.push(format!("push {remote} :refs/tags/{name}"));
        Ok(())
    }

    fn pull(&self) -> GitResult<PullStatus> {
        let mut state = self.state.borrow_mut();
        state.log.push("pull --ff-only".into());
        Ok(state.pull_status)
    }

    fn push(&self, remote: &str, branch: &str, with_tags: bool) -> GitResult<()> {
        let mut state = self.state.borrow_mut();
        if with_tags {
            let tags: Vec<String> = state.tags.keys().cloned().collect();
            state.remote_tags.extend(tags);
            state.log.push(format!("push {remote} {branch} --tags"));
        } else {
            state.log.push(format!("push {remote} {branch}"));
        }
        Ok(())
    }

    fn force_push(&self, remote: &str, branch: &str) -> GitResult<()> {
        self.state
            .borrow_mut()
            .log
            .push(format!("push --force {remote} {branch}"));
        Ok(())
    }

    fn reset_mixed(&self, commits: usize) -> GitResult<()> {
        let mut state = self.state.borrow_mut();
        if commits >= state.commits.len() {
            return Err(failure("reset", format!("unknown revision 'HEAD~{commits}'")));
        }
        let keep = state.commits.len() - commits;
        let dropped = state.commits.split_off(keep);
        let files: Vec<String> = dropped.into_iter().flat_map(|c| c.files).collect();
        state.modified.extend(files);
        state.staged.clear();
        state.log.push(format!("reset --mixed HEAD~{commits}"));
        Ok(())
    }

    fn stash_push(&self, paths: &[String]) -> GitResult<()> {
        let mut state = self.state.borrow_mut();
        state.check_pathspecs("stash", paths)?;
        state.log.push(format!("stash push -- {}", paths.join(" ")));
        let files: Vec<String> = paths
            .iter()
            .filter(|p| state.modified.contains(*p))
            .cloned()
            .collect();
        // git prints "No local changes to save" and exits 0
        if files.is_empty() {
            return Ok(());
        }
        for file in &files {
            state.modified.remove(file);
        }
        let stashed = FakeStash {
            files,
            version: state.manifest_version.clone(),
        };
        if stashed.files.iter().any(|f| f == "Cargo.toml") {
            let head = state.head_index();
            state.manifest_version = state.commits[head].version.clone();
        }
        state.stash.push(stashed);
        Ok(())
    }

    fn current_branch(&self) -> GitResult<Option<String>> {
        Ok(self.state.borrow().branch.clone())
    }
}

impl ManifestTool for FakeProject {
    fn ensure_available(&self) -> ManifestResult<()> {
        if self.state.borrow().tool_installed {
            Ok(())
        } else {
            Err(ManifestError::ToolMissing {
                tool: "cargo-set-version".into(),
                hint: "install it with `cargo install cargo-edit`".into(),
            })
        }
    }

    fn read_version(&self) -> ManifestResult<Version> {
        Ok(self.state.borrow().manifest_version.clone())
    }

    fn bump(&self, kind: BumpKind) -> ManifestResult<()> {
        let mut state = self.state.borrow_mut();
        let next = match state.bump_override.take() {
            Some(version) => version,
            None => next_version(&state.manifest_version, kind),
        };
        state.manifest_version = next;
        let touched: Vec<String> = self
            .files
            .iter()
            .filter(|f| state.tracked(f))
            .cloned()
            .collect();
        state.modified.extend(touched);
        state.log.push(format!("cargo set-version --bump {kind}"));
        Ok(())
    }

    fn validate(&self) -> ManifestResult<()> {
        if self.state.borrow().check_fails {
            Err(ManifestError::Command {
                command: "cargo check --quiet".into(),
                stderr: "error: failed to parse manifest".into(),
            })
        } else {
            Ok(())
        }
    }

    fn files(&self) -> &[String] {
        &self.files
    }
}
