//! Maintenance tasks for the tagbump workspace.
//!
//! - `completions` writes shell completion scripts
//! - `man` writes man pages for `tagbump` and each subcommand
//! - `dist` does both into the default `dist/share` layout
//!
//! Run `cargo xtask --help` to see available commands.

#![deny(unsafe_code)]

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Binary name used for generated files.
pub const BIN_NAME: &str = "tagbump";

#[derive(Parser, Debug)]
#[command(name = "xtask")]
#[command(about = "Project maintenance tasks")]
struct Xtask {
    #[command(subcommand)]
    command: Task,
}

#[derive(Subcommand, Debug)]
enum Task {
    /// Generate shell completions for the tagbump CLI.
    Completions(commands::completions::CompletionsArgs),

    /// Generate man pages for the tagbump CLI.
    Man(commands::man::ManArgs),

    /// Generate completions and man pages under dist/share.
    Dist,
}

fn main() -> Result<(), String> {
    let task = Xtask::parse();
    match task.command {
        Task::Completions(args) => commands::completions::cmd_completions(args),
        Task::Man(args) => commands::man::cmd_man(args),
        Task::Dist => {
            commands::completions::cmd_completions(
                commands::completions::CompletionsArgs::default(),
            )?;
            commands::man::cmd_man(commands::man::ManArgs::default())
        }
    }
}

/// The workspace root, one level above this crate.
pub fn workspace_root() -> PathBuf {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    manifest_dir.parent().unwrap_or(&manifest_dir).to_path_buf()
}
