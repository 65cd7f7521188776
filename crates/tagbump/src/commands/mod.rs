//! Command implementations

pub mod bump;

pub mod undo;

use std::cell::RefCell;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use inquire::Confirm;
use owo_colors::OwoColorize;
use tagbump_core::{Confirmation, WorkflowEvent};
use tracing::debug;

/// Terminal side of a workflow run: answers confirmations and shows progress.
///
/// Methods take `&self` so one reporter can back both the `confirm` and the
/// `on_event` callbacks of a workflow at the same time.
pub struct Reporter {
    interactive: bool,
    spinner: RefCell<Option<ProgressBar>>,
}

impl Reporter {
    /// A reporter that prompts and prints.
    pub const fn interactive() -> Self {
        Self {
            interactive: true,
            spinner: RefCell::new(None),
        }
    }

    /// A reporter that prints nothing and declines every confirmation.
    pub const fn silent() -> Self {
        Self {
            interactive: false,
            spinner: RefCell::new(None),
        }
    }

    /// Ask the user. A prompt that cannot be shown counts as "no".
    pub fn confirm(&self, question: &Confirmation) -> bool {
        self.stop_spinner();
        if !self.interactive {
            debug!(?question, "non-interactive; declining");
            return false;
        }

        if let Some(warning) = question.warning() {
            println!("{} {}", "!".yellow().bold(), warning.yellow());
        }
        match Confirm::new(&question.question())
            .with_default(false)
            .prompt()
        {
            Ok(answer) => {
                debug!(?question, answer, "confirmation answered");
                answer
            }
            Err(err) => {
                debug!(?question, error = %err, "prompt unavailable; declining");
                false
            }
        }
    }

    /// Show a workflow event.
    pub fn event(&self, event: WorkflowEvent) {
        self.stop_spinner();
        if !self.interactive {
            return;
        }
        match event {
            WorkflowEvent::Running(message) => self.start_spinner(message),
            WorkflowEvent::VersionComputed {
                current,
                next,
                kind,
            } => println!(
                "{} {} bump: {} → {}",
                "•".cyan(),
                kind.to_string().bold(),
                current.to_string().dimmed(),
                next.to_string().green().bold(),
            ),
            WorkflowEvent::TagReplaced { tag } => {
                println!("  {} removed existing tag {}", "✓".green(), tag.bold());
            }
            WorkflowEvent::ManifestBumped { version } => {
                println!("  {} manifest now at {}", "✓".green(), version.to_string().bold());
            }
            WorkflowEvent::Committed { hash, message } => {
                println!("  {} committed {} {}", "✓".green(), hash.dimmed(), message);
            }
            WorkflowEvent::Tagged { tag } => {
                println!("  {} tagged {}", "✓".green(), tag.green().bold());
            }
            WorkflowEvent::Pulled(status) => {
                println!("  {} pull: {}", "✓".green(), status.to_string().dimmed());
            }
            WorkflowEvent::Pushed { remote, branch } => {
                println!(
                    "  {} pushed {} and tags to {}",
                    "✓".green(),
                    branch.bold(),
                    remote.bold()
                );
            }
            WorkflowEvent::PushSkipped { remote, branch } => {
                let branch = branch.unwrap_or_else(|| "<branch>".into());
                println!(
                    "  {} not pushed; run {}",
                    "–".yellow(),
                    format!("git push {remote} {branch} --tags").bold()
                );
            }
            WorkflowEvent::Reset { commits } => {
                println!("  {} reset {commits} commit", "✓".green());
            }
            WorkflowEvent::Stashed { files } => {
                println!(
                    "  {} stashed {} {}",
                    "✓".green(),
                    files.join(", "),
                    "(git stash pop to restore)".dimmed()
                );
            }
            WorkflowEvent::TagDeleted { tag } => {
                println!("  {} deleted tag {}", "✓".green(), tag.bold());
            }
            WorkflowEvent::RemoteTagDeleted { remote, tag } => {
                println!(
                    "  {} deleted tag {} from {}",
                    "✓".green(),
                    tag.bold(),
                    remote.bold()
                );
            }
            WorkflowEvent::ForcePushed { remote, branch } => {
                println!(
                    "  {} force-pushed {} to {}",
                    "✓".green(),
                    branch.bold(),
                    remote.bold()
                );
            }
            WorkflowEvent::ForcePushSkipped { remote, branch } => {
                let branch = branch.unwrap_or_else(|| "<branch>".into());
                println!(
                    "  {} {} still has the bump commit; run {} to drop it",
                    "–".yellow(),
                    remote,
                    format!("git push --force {remote} {branch}").bold()
                );
            }
        }
    }

    /// Clear any spinner left running.
    pub fn finish(&self) {
        self.stop_spinner();
    }

    fn start_spinner(&self, message: String) {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("  {spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.set_message(format!("{message}..."));
        spinner.enable_steady_tick(Duration::from_millis(80));
        *self.spinner.borrow_mut() = Some(spinner);
    }

    fn stop_spinner(&self) {
        if let Some(spinner) = self.spinner.borrow_mut().take() {
            spinner.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_reporter_declines() {
        let reporter = Reporter::silent();
        assert!(!reporter.confirm(&Confirmation::Push {
            remote: "origin".into(),
            branch: "main".into(),
        }));
    }

    #[test]
    fn silent_reporter_never_spins() {
        let reporter = Reporter::silent();
        reporter.event(WorkflowEvent::Running("Pushing".into()));
        assert!(reporter.spinner.borrow().is_none());
        reporter.finish();
    }
}
