//! Git operations for the bump and undo workflows.
//!
//! [`VersionControl`] is the narrow surface the workflows depend on.
//! [`SystemGit`] implements it by shelling out to `git`, so the user's SSH
//! keys, GPG signing, hooks and other configuration are inherited.

use std::process::Command;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument};

/// Errors from git operations.
#[derive(Error, Debug)]
pub enum GitError {
    /// Failed to execute the `git` command.
    #[error("failed to run git: {0}")]
    Exec(#[from] std::io::Error),

    /// `git` returned a non-zero exit code.
    #[error("git {command} failed: {stderr}")]
    Command {
        /// The git subcommand that failed (e.g., "commit").
        command: String,
        /// Captured stderr.
        stderr: String,
    },

    /// Not inside a git repository.
    #[error("not a git repository (or any parent up to mount point)")]
    NotARepo,
}

/// Result alias for git operations.
pub type GitResult<T> = Result<T, GitError>;

/// What a pull found on the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PullStatus {
    /// Local branch already contained everything on the remote.
    UpToDate,
    /// The remote had new commits and the branch was fast-forwarded.
    FastForwarded,
    /// Local and remote histories diverged; nothing was merged.
    Diverged,
}

impl std::fmt::Display for PullStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UpToDate => write!(f, "already up to date"),
            Self::FastForwarded => write!(f, "pulled new commits"),
            Self::Diverged => write!(f, "history diverged"),
        }
    }
}

/// Version-control operations consumed by the workflows.
///
/// Revisions are passed as git revision strings (`HEAD`, `HEAD~1`).
pub trait VersionControl {
    /// Tag names matching a `git tag --list` pattern.
    fn tags_matching(&self, pattern: &str) -> GitResult<Vec<String>>;

    /// Whether a tag with exactly this name exists locally.
    fn tag_exists(&self, name: &str) -> GitResult<bool> {
        Ok(self.tags_matching(name)?.iter().any(|t| t == name))
    }

    /// Tags whose commits contain HEAD.
    fn tags_containing_head(&self) -> GitResult<Vec<String>>;

    /// Paths with staged (cached) changes.
    fn staged_files(&self) -> GitResult<Vec<String>>;

    /// Tracked paths with unstaged working-tree changes.
    fn modified_files(&self) -> GitResult<Vec<String>>;

    /// Paths that differ between two revisions.
    fn changed_files(&self, from: &str, to: &str) -> GitResult<Vec<String>>;

    /// Stage the given paths.
    fn stage(&self, paths: &[String]) -> GitResult<()>;

    /// Commit staged changes, returning the short hash of the new commit.
    fn commit(&self, message: &str) -> GitResult<String>;

    /// Create a tag at HEAD. `annotation` makes it an annotated tag.
    fn create_tag(&self, name: &str, annotation: Option<&str>) -> GitResult<()>;

    /// Delete a local tag.
    fn delete_local_tag(&self, name: &str) -> GitResult<()>;

    /// Delete a tag on a remote.
    fn delete_remote_tag(&self, remote: &str, name: &str) -> GitResult<()>;

    /// Pull the current branch without creating merge commits.
    fn pull(&self) -> GitResult<PullStatus>;

    /// Push a branch, optionally with all tags.
    fn push(&self, remote: &str, branch: &str, with_tags: bool) -> GitResult<()>;

    /// Force-push a branch.
    fn force_push(&self, remote: &str, branch: &str) -> GitResult<()>;

    /// `git reset --mixed HEAD~<commits>`.
    fn reset_mixed(&self, commits: usize) -> GitResult<()>;

    /// Stash working-tree changes of the given paths only.
    fn stash_push(&self, paths: &[String]) -> GitResult<()>;

    /// The current branch name, `None` when HEAD is detached.
    fn current_branch(&self) -> GitResult<Option<String>>;
}

/// [`VersionControl`] backed by the `git` executable.
#[derive(Debug, Clone)]
pub struct SystemGit {
    root: Utf8PathBuf,
}

impl SystemGit {
    /// Run git commands inside `root`.
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Open the repository containing `dir`, rooted at its top level.
    pub fn discover(dir: impl AsRef<Utf8Path>) -> GitResult<Self> {
        let probe = Self::new(dir.as_ref());
        let top = probe
            .git(&["rev-parse", "--show-toplevel"])
            .map_err(|e| match e {
                GitError::Command { .. } => GitError::NotARepo,
                other => other,
            })?;
        let top = top.trim();
        debug!(root = top, "repository discovered");
        Ok(Self::new(top))
    }

    /// The directory git commands run in.
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Run a git command and return its stdout.
    fn git(&self, args: &[&str]) -> GitResult<String> {
        debug!(?args, "git");
        let output = Command::new("git")
            .args(args)
            .current_dir(self.root.as_std_path())
            .output()?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

            if stderr.contains("not a git repository") {
                return Err(GitError::NotARepo);
            }

            Err(GitError::Command {
                command: args.first().unwrap_or(&"").to_string(),
                stderr,
            })
        }
    }

    /// Run a git command with trailing path arguments after `--`.
    fn git_with_paths(&self, args: &[&str], paths: &[String]) -> GitResult<String> {
        let mut full: Vec<&str> = args.to_vec();
        full.push("--");
        full.extend(paths.iter().map(String::as_str));
        self.git(&full)
    }
}

impl VersionControl for SystemGit {
    #[instrument(skip(self))]
    fn tags_matching(&self, pattern: &str) -> GitResult<Vec<String>> {
        Ok(lines(&self.git(&["tag", "--list", pattern])?))
    }

    #[instrument(skip(self))]
    fn tags_containing_head(&self) -> GitResult<Vec<String>> {
        let tags = lines(&self.git(&["tag", "--contains", "HEAD"])?);
        debug!(?tags, "tags containing HEAD");
        Ok(tags)
    }

    #[instrument(skip(self))]
    fn staged_files(&self) -> GitResult<Vec<String>> {
        Ok(lines(&self.git(&["diff", "--name-only", "--cached"])?))
    }

    #[instrument(skip(self))]
    fn modified_files(&self) -> GitResult<Vec<String>> {
        Ok(lines(&self.git(&["diff", "--name-only"])?))
    }

    #[instrument(skip(self))]
    fn changed_files(&self, from: &str, to: &str) -> GitResult<Vec<String>> {
        Ok(lines(&self.git(&["diff", "--name-only", from, to])?))
    }

    #[instrument(skip(self))]
    fn stage(&self, paths: &[String]) -> GitResult<()> {
        self.git_with_paths(&["add"], paths)?;
        Ok(())
    }

    #[instrument(skip(self))]
    fn commit(&self, message: &str) -> GitResult<String> {
        self.git(&["commit", "--message", message])?;
        let hash = self.git(&["rev-parse", "--short", "HEAD"])?.trim().to_string();
        debug!(%hash, "committed");
        Ok(hash)
    }

    #[instrument(skip(self))]
    fn create_tag(&self, name: &str, annotation: Option<&str>) -> GitResult<()> {
        match annotation {
            Some(message) => self.git(&["tag", "--annotate", name, "--message", message])?,
            None => self.git(&["tag", name])?,
        };
        Ok(())
    }

    #[instrument(skip(self))]
    fn delete_local_tag(&self, name: &str) -> GitResult<()> {
        self.git(&["tag", "--delete", name])?;
        Ok(())
    }

    #[instrument(skip(self))]
    fn delete_remote_tag(&self, remote: &str, name: &str) -> GitResult<()> {
        self.git(&["push", "--delete", remote, name])?;
        Ok(())
    }

    #[instrument(skip(self))]
    fn pull(&self) -> GitResult<PullStatus> {
        match self.git(&["pull", "--ff-only"]) {
            Ok(stdout) => Ok(classify_pull(&stdout)),
            Err(GitError::Command { stderr, .. }) if is_divergence(&stderr) => {
                debug!(%stderr, "pull refused to fast-forward");
                Ok(PullStatus::Diverged)
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self))]
    fn push(&self, remote: &str, branch: &str, with_tags: bool) -> GitResult<()> {
        if with_tags {
            self.git(&["push", remote, branch, "--tags"])?;
        } else {
            self.git(&["push", remote, branch])?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    fn force_push(&self, remote: &str, branch: &str) -> GitResult<()> {
        self.git(&["push", "--force", remote, branch])?;
        Ok(())
    }

    #[instrument(skip(self))]
    fn reset_mixed(&self, commits: usize) -> GitResult<()> {
        self.git(&["reset", "--mixed", &format!("HEAD~{commits}")])?;
        Ok(())
    }

    #[instrument(skip(self))]
    fn stash_push(&self, paths: &[String]) -> GitResult<()> {
        self.git_with_paths(&["stash", "push"], paths)?;
        Ok(())
    }

    #[instrument(skip(self))]
    fn current_branch(&self) -> GitResult<Option<String>> {
        let output = self.git(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        let branch = output.trim().to_string();
        if branch == "HEAD" {
            debug!("detached HEAD");
            Ok(None)
        } else {
            debug!(%branch, "current branch");
            Ok(Some(branch))
        }
    }
}

/// Split command output into trimmed, non-empty lines.
fn lines(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Interpret the stdout of a successful `git pull --ff-only`.
fn classify_pull(stdout: &str) -> PullStatus {
    // Older git spells it "up-to-date"
    if stdout.contains("Already up to date") || stdout.contains("Already up-to-date") {
        PullStatus::UpToDate
    } else {
        PullStatus::FastForwarded
    }
}

fn is_divergence(stderr: &str) -> bool {
    stderr.contains("Not possible to fast-forward") || stderr.contains("diverg")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn lines_drops_blank_and_trims() {
        assert_eq!(
            lines("Cargo.toml\n  Cargo.lock \n\n"),
            vec!["Cargo.toml".to_string(), "Cargo.lock".to_string()]
        );
        assert!(lines("").is_empty());
    }

    #[test]
    fn classify_pull_output() {
        assert_eq!(classify_pull("Already up to date.\n"), PullStatus::UpToDate);
        assert_eq!(classify_pull("Already up-to-date.\n"), PullStatus::UpToDate);
        assert_eq!(
            classify_pull("Updating 1a2b3c..4d5e6f\nFast-forward\n"),
            PullStatus::FastForwarded
        );
    }

    #[test]
    fn divergence_detection() {
        assert!(is_divergence(
            "fatal: Not possible to fast-forward, aborting."
        ));
        assert!(is_divergence("hint: You have divergent branches"));
        assert!(!is_divergence("fatal: couldn't find remote ref main"));
    }

    #[test]
    fn git_error_on_bad_command() {
        let git = SystemGit::new(".");
        assert!(git.git(&["not-a-real-subcommand"]).is_err());
    }

    /// A throwaway repository with one commit, or `None` when git is unavailable.
    fn scratch_repo() -> Option<(TempDir, SystemGit)> {
        which::which("git").ok()?;
        let tmp = TempDir::new().ok()?;
        let root = Utf8PathBuf::try_from(tmp.path().to_path_buf()).ok()?;
        let git = SystemGit::new(root);
        git.git(&["init", "--quiet"]).ok()?;
        git.git(&["config", "user.email", "dev@example.com"]).ok()?;
        git.git(&["config", "user.name", "Dev"]).ok()?;
        git.git(&["config", "commit.gpgsign", "false"]).ok()?;
        git.git(&["config", "tag.gpgsign", "false"]).ok()?;
        std::fs::write(tmp.path().join("Cargo.toml"), "[package]\n").ok()?;
        git.stage(&["Cargo.toml".to_string()]).ok()?;
        git.commit("initial").ok()?;
        Some((tmp, git))
    }

    #[test]
    fn discover_finds_top_level_from_subdir() {
        let Some((tmp, _git)) = scratch_repo() else {
            return;
        };
        let sub = tmp.path().join("src");
        std::fs::create_dir(&sub).unwrap();
        let sub = Utf8PathBuf::try_from(sub).unwrap();

        let git = SystemGit::discover(&sub).unwrap();
        assert_eq!(
            std::fs::canonicalize(git.root()).unwrap(),
            std::fs::canonicalize(tmp.path()).unwrap()
        );
    }

    #[test]
    fn discover_outside_repo_fails() {
        if which::which("git").is_err() {
            return;
        }
        let tmp = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(tmp.path().to_path_buf()).unwrap();
        assert!(matches!(
            SystemGit::discover(&root),
            Err(GitError::NotARepo)
        ));
    }

    #[test]
    fn tags_round_trip_in_scratch_repo() {
        let Some((_tmp, git)) = scratch_repo() else {
            return;
        };
        assert!(git.tags_containing_head().unwrap().is_empty());
        assert!(!git.tag_exists("v0.1.0").unwrap());

        git.create_tag("v0.1.0", None).unwrap();
        assert!(git.tag_exists("v0.1.0").unwrap());
        assert_eq!(git.tags_containing_head().unwrap(), vec!["v0.1.0"]);

        git.delete_local_tag("v0.1.0").unwrap();
        assert!(!git.tag_exists("v0.1.0").unwrap());
    }

    #[test]
    fn staged_and_changed_files_in_scratch_repo() {
        let Some((tmp, git)) = scratch_repo() else {
            return;
        };
        std::fs::write(tmp.path().join("Cargo.toml"), "[package]\nname = \"x\"\n").unwrap();
        std::fs::write(tmp.path().join("Cargo.lock"), "# untracked\n").unwrap();
        assert!(git.staged_files().unwrap().is_empty());
        assert_eq!(git.modified_files().unwrap(), vec!["Cargo.toml"]);

        git.stage(&["Cargo.toml".to_string()]).unwrap();
        assert_eq!(git.staged_files().unwrap(), vec!["Cargo.toml"]);
        assert!(git.modified_files().unwrap().is_empty());

        git.commit("second").unwrap();
        assert_eq!(
            git.changed_files("HEAD~1", "HEAD").unwrap(),
            vec!["Cargo.toml"]
        );

        git.reset_mixed(1).unwrap();
        assert!(git.staged_files().unwrap().is_empty());
        git.stash_push(&["Cargo.toml".to_string()]).unwrap();
        let contents = std::fs::read_to_string(tmp.path().join("Cargo.toml")).unwrap();
        assert_eq!(contents, "[package]\n");
    }

    #[test]
    fn stash_of_unknown_path_fails_in_scratch_repo() {
        let Some((tmp, git)) = scratch_repo() else {
            return;
        };
        std::fs::write(tmp.path().join("Cargo.toml"), "[package]\nname = \"x\"\n").unwrap();
        let paths = ["Cargo.toml".to_string(), "Cargo.lock".to_string()];
        assert!(matches!(
            git.stash_push(&paths),
            Err(GitError::Command { .. })
        ));
        git.stash_push(&paths[..1]).unwrap();
        assert!(git.modified_files().unwrap().is_empty());
    }
}
