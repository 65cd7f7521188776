//! Undo command: thin CLI layer over `tagbump_core::undo`.

use anyhow::Context;
use clap::Args;
use owo_colors::OwoColorize;
use tracing::{debug, instrument};

use tagbump_core::config::Config;
use tagbump_core::undo::{UndoOptions, UndoOutcome, run_undo};
use tagbump_core::{CargoManifest, SystemGit};

use super::Reporter;

/// Arguments for the `undo` subcommand.
#[derive(Args, Debug, Default)]
pub struct UndoArgs {
    /// Also delete the tag from the remote and offer a force-push
    #[arg(short, long)]
    pub push: bool,

    /// Report what would be undone without changing anything
    #[arg(short, long)]
    pub dry: bool,
}

impl UndoArgs {
    /// Workflow options for these arguments under `config`.
    pub fn options(&self, config: &Config) -> UndoOptions {
        UndoOptions::from_config(&config.git)
            .with_push(self.push)
            .with_dry_run(self.dry)
    }
}

/// Execute the undo command.
#[instrument(name = "cmd_undo", skip_all, fields(push = args.push, dry = args.dry))]
pub fn cmd_undo(
    args: UndoArgs,
    global_json: bool,
    config: &Config,
    cwd: &camino::Utf8Path,
) -> anyhow::Result<()> {
    debug!(json_output = global_json, "executing undo command");

    let git = SystemGit::discover(cwd).context("undo needs a git repository")?;
    let manifest = CargoManifest::new(git.root(), &config.manifest);
    let options = args.options(config);

    let reporter = if global_json {
        Reporter::silent()
    } else {
        Reporter::interactive()
    };

    if options.dry_run && !global_json {
        println!("{}", "DRY RUN: nothing will be changed".yellow().bold());
    }

    let result = run_undo(
        &git,
        &manifest,
        &options,
        |question| reporter.confirm(question),
        |event| reporter.event(event),
    );
    reporter.finish();
    let outcome = result.context("undo failed")?;

    if global_json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("{}", summary(&outcome));
    }
    Ok(())
}

/// The closing line for a finished undo.
fn summary(outcome: &UndoOutcome) -> String {
    match &outcome.to {
        Some(to) => format!(
            "{} Reverted v{} to v{}",
            "✓".green().bold(),
            outcome.from,
            to.to_string().green().bold(),
        ),
        None => format!(
            "{} Dry run: would revert v{} and delete tag {}",
            "○".cyan(),
            outcome.from,
            outcome.tag,
        ),
    }
}
