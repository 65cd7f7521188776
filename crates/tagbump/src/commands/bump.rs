//! Bump command: thin CLI layer over `tagbump_core::bump`.

use anyhow::Context;
use clap::Args;
use owo_colors::OwoColorize;
use tracing::{debug, instrument};

use tagbump_core::bump::{BumpOptions, BumpOutcome, run_bump};
use tagbump_core::config::Config;
use tagbump_core::{BumpKind, CargoManifest, SystemGit};

use super::Reporter;

/// Arguments for the `bump` subcommand.
#[derive(Args, Debug, Default)]
pub struct BumpArgs {
    /// Which part of the version to increment
    #[arg(short = 't', long = "type", value_enum, default_value_t, value_name = "TYPE")]
    pub kind: BumpKind,

    /// Push the commit and tags without asking
    #[arg(short, long)]
    pub push: bool,

    /// Report the next version without changing anything
    #[arg(short, long)]
    pub dry: bool,
}

impl BumpArgs {
    /// Workflow options for these arguments under `config`.
    pub fn options(&self, config: &Config) -> BumpOptions {
        BumpOptions::from_config(self.kind, &config.git)
            .with_push(self.push)
            .with_dry_run(self.dry)
    }
}

/// Execute the bump command.
#[instrument(name = "cmd_bump", skip_all, fields(kind = %args.kind, dry = args.dry))]
pub fn cmd_bump(
    args: BumpArgs,
    global_json: bool,
    config: &Config,
    cwd: &camino::Utf8Path,
) -> anyhow::Result<()> {
    debug!(json_output = global_json, push = args.push, "executing bump command");

    let git = SystemGit::discover(cwd).context("bump needs a git repository")?;
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

    let result = run_bump(
        &git,
        &manifest,
        &options,
        |question| reporter.confirm(question),
        |event| reporter.event(event),
    );
    reporter.finish();
    let outcome = result.context("bump failed")?;

    if global_json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("{}", summary(&outcome));
    }
    Ok(())
}

/// The closing line for a finished bump.
fn summary(outcome: &BumpOutcome) -> String {
    if outcome.dry_run {
        format!(
            "{} Dry run: would bump v{} to v{} and tag {}",
            "○".cyan(),
            outcome.previous,
            outcome.next.to_string().green().bold(),
            outcome.tag,
        )
    } else {
        let pushed = if outcome.pushed { " and pushed" } else { "" };
        format!(
            "{} Bumped v{} to v{}{pushed}",
            "✓".green().bold(),
            outcome.previous,
            outcome.next.to_string().green().bold(),
        )
    }
}
