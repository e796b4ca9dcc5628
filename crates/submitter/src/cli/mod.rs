//! Command-line front end.

mod commands;
pub mod progress;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

pub use self::commands::{Preview, render_preview};

#[derive(Debug, Parser)]
#[command(name = "submitter")]
#[command(about = "Package files and submit them to an assignment target")]
#[command(version)]
pub struct Cli {
    /// Target catalog (TOML). Defaults to `defaults.targets` from config.
    #[arg(short, long, global = true, value_name = "FILE")]
    pub targets: Option<PathBuf>,

    /// More log output; repeat for more detail.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors and hide the progress bar.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the assignments in the target catalog
    List {
        /// Also show hidden assignments
        #[arg(long)]
        all: bool,
    },

    /// Show which files would be included, excluded, or are missing
    Preview {
        #[command(flatten)]
        selection: Selection,

        /// Print the preview as JSON
        #[arg(long)]
        json: bool,
    },

    /// Package the files and deliver them to the assignment's destination
    Submit(SubmitArgs),

    /// Print shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Args)]
pub struct Selection {
    /// Assignment name, either qualified (`Group/Name`) or bare when unique
    pub assignment: String,

    /// Files and directories to submit
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Include hidden files when scanning directories
    #[arg(long)]
    pub hidden: bool,

    /// Do not honour .gitignore and .submitignore files
    #[arg(long)]
    pub no_ignore: bool,
}

#[derive(Debug, Args)]
pub struct SubmitArgs {
    #[command(flatten)]
    pub selection: Selection,

    /// Account name. Defaults to `defaults.username` or SUBMITTER_USER.
    #[arg(short, long)]
    pub user: Option<String>,

    /// Read the password from the first line of stdin instead of prompting
    #[arg(long)]
    pub password_stdin: bool,

    /// Package without delivering and report what would be sent
    #[arg(long)]
    pub dry_run: bool,

    /// Stop at the first file the packager rejects
    #[arg(long)]
    pub abort_on_item_error: bool,

    /// Pause between files handed to the packager, in milliseconds
    #[arg(long, value_name = "MS")]
    pub item_delay_ms: Option<u64>,
}

/// Parse arguments, set up logging, and run the selected command.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    crate::infra::logging::init(crate::infra::logging::level_for(cli.verbose, cli.quiet));
    commands::dispatch(cli)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn submit_flags_parse() {
        let cli = Cli::try_parse_from([
            "submitter",
            "--targets",
            "targets.toml",
            "submit",
            "CS 1114/Lab 1",
            "src",
            "README.md",
            "--user",
            "alice",
            "--dry-run",
            "--item-delay-ms",
            "0",
        ])
        .unwrap();

        assert_eq!(cli.targets, Some(PathBuf::from("targets.toml")));
        let Command::Submit(args) = cli.command else {
            panic!("expected submit");
        };
        assert_eq!(args.selection.assignment, "CS 1114/Lab 1");
        assert_eq!(args.selection.paths.len(), 2);
        assert_eq!(args.user.as_deref(), Some("alice"));
        assert!(args.dry_run);
        assert_eq!(args.item_delay_ms, Some(0));
    }

    #[test]
    fn preview_requires_paths() {
        assert!(Cli::try_parse_from(["submitter", "preview", "Lab 1"]).is_err());
    }
}
