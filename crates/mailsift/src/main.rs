//! `mailsift` - mail-triage daemon.
//!
//! Watches IMAP mailboxes over IDLE, ranks new messages with an
//! incrementally trained weight model, and routes them into priority
//! folders.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod cli;
mod config;
mod daemon;

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Command};
use config::Config;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Start { foreground } => run_start(cli.config.as_deref(), foreground),
        Command::Stop => run_stop(cli.config.as_deref()),
        Command::Restart { foreground } => run_stop(cli.config.as_deref())
            .and_then(|_| run_start(cli.config.as_deref(), foreground)),
    };

    match result {
        Ok(code) => code,
        Err(error) => {
            eprintln!("mailsift: {error:#}");
            ExitCode::from(1)
        }
    }
}

fn run_start(config_path: Option<&Path>, foreground: bool) -> anyhow::Result<ExitCode> {
    let config = Config::load(config_path)?;
    daemon::start(&config, foreground)
}

fn run_stop(config_path: Option<&Path>) -> anyhow::Result<ExitCode> {
    // Stop should still work when the config is missing or broken; fall
    // back to the default state directory to find the pid marker.
    let state_dir = Config::load(config_path)
        .map_or_else(|_| config::default_state_dir(), |config| config.state_dir());
    daemon::stop(&state_dir)
}

/// Initializes the tracing subscriber.
///
/// Detached daemons log without ANSI colors since stderr goes to a file.
pub(crate) fn init_tracing(ansi: bool) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "mailsift=info,mailsift_core=info,mailsift_imap=warn".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_ansi(ansi))
        .init();
}
