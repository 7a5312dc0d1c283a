//! Command-line interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Mail-triage daemon: watches IMAP mailboxes and routes new mail into
/// priority folders.
#[derive(Parser, Debug)]
#[command(name = "mailsift", version, about)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Daemon lifecycle commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the daemon. Fails with exit code 1 if one is already running.
    Start {
        /// Stay attached to the terminal instead of detaching.
        #[arg(long)]
        foreground: bool,
    },
    /// Stop a running daemon. A no-op when none is running.
    Stop,
    /// Stop any running daemon, then start a new one.
    Restart {
        /// Stay attached to the terminal instead of detaching.
        #[arg(long)]
        foreground: bool,
    },
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
    fn parses_start_with_flags() {
        let cli = Cli::parse_from(["mailsift", "start", "--foreground", "--config", "/tmp/c.toml"]);
        assert!(matches!(cli.command, Command::Start { foreground: true }));
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("/tmp/c.toml")));
    }
}
