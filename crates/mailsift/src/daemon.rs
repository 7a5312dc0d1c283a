//! Daemon lifecycle: pid-marker singleton, background detach, watcher
//! spawning and signal-driven graceful shutdown.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, anyhow};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::info;

use mailsift_core::{
    FileWeightStore, ImapSessionFactory, IntentClassifier, LexiconIntentClassifier, RankingEngine,
    TriagePipeline, Watcher, WatcherConfig, WeightRepository,
};

use crate::config::Config;

/// Runtime file locations, all under the instance's state directory.
pub struct DaemonPaths {
    /// The pid marker enforcing the process singleton.
    pub pid_file: PathBuf,
    /// Log files when running detached.
    pub log_dir: PathBuf,
    /// Weight tables and rank history.
    pub model_dir: PathBuf,
}

impl DaemonPaths {
    /// Derives all runtime paths from the state directory.
    #[must_use]
    pub fn new(state_dir: &Path) -> Self {
        Self {
            pid_file: state_dir.join("mailsift.pid"),
            log_dir: state_dir.join("logs"),
            model_dir: state_dir.join("models"),
        }
    }
}

/// Checks whether a daemon instance is alive, cleaning up a stale marker.
#[must_use]
pub fn is_running(paths: &DaemonPaths) -> Option<u32> {
    let pid = read_pid_file(&paths.pid_file)?;
    if !is_process_alive(pid) {
        let _ = std::fs::remove_file(&paths.pid_file);
        return None;
    }
    Some(pid)
}

fn read_pid_file(path: &Path) -> Option<u32> {
    let content = std::fs::read_to_string(path).ok()?;
    content.trim().parse().ok()
}

#[allow(unsafe_code, clippy::cast_possible_wrap)]
fn is_process_alive(pid: u32) -> bool {
    // kill(pid, 0) probes for existence without delivering a signal.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[allow(unsafe_code, clippy::cast_possible_wrap)]
fn terminate(pid: u32) {
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGTERM);
    }
}

/// Starts the daemon.
///
/// With a live instance already present this prints its pid and exits with
/// status 1. Otherwise the process (optionally) detaches, writes its pid
/// marker and runs account watchers until a termination signal.
///
/// # Errors
///
/// Returns an error if the state directory, detach, or runtime setup fails.
pub fn start(config: &Config, foreground: bool) -> anyhow::Result<ExitCode> {
    let state_dir = config.state_dir();
    std::fs::create_dir_all(&state_dir)
        .with_context(|| format!("creating state directory {}", state_dir.display()))?;
    let paths = DaemonPaths::new(&state_dir);

    if let Some(pid) = is_running(&paths) {
        eprintln!("mailsift is already running (pid {pid})");
        return Ok(ExitCode::from(1));
    }

    if foreground {
        std::fs::write(&paths.pid_file, std::process::id().to_string())
            .with_context(|| format!("writing pid marker {}", paths.pid_file.display()))?;
        crate::init_tracing(true);
    } else {
        // The fork must happen before the async runtime exists.
        detach(&paths)?;
        crate::init_tracing(false);
    }

    let runtime = tokio::runtime::Runtime::new().context("building async runtime")?;
    let result = runtime.block_on(serve(config, &paths));

    let _ = std::fs::remove_file(&paths.pid_file);
    result.map(|()| ExitCode::SUCCESS)
}

/// Detaches into the background, redirecting output to the log directory.
fn detach(paths: &DaemonPaths) -> anyhow::Result<()> {
    std::fs::create_dir_all(&paths.log_dir)
        .with_context(|| format!("creating log directory {}", paths.log_dir.display()))?;

    let stdout = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(paths.log_dir.join("mailsift.out"))
        .context("opening stdout log")?;
    let stderr = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(paths.log_dir.join("mailsift.err"))
        .context("opening stderr log")?;

    daemonize::Daemonize::new()
        .pid_file(&paths.pid_file)
        .stdout(stdout)
        .stderr(stderr)
        .start()
        .map_err(|error| anyhow!("failed to detach: {error}"))?;

    Ok(())
}

/// Runs one watcher task per configured account until shutdown.
async fn serve(config: &Config, paths: &DaemonPaths) -> anyhow::Result<()> {
    let store = FileWeightStore::open(paths.model_dir.clone())
        .await
        .context("opening weight store")?;
    let store: Arc<dyn WeightRepository> = Arc::new(store);
    let intent: Arc<dyn IntentClassifier> = Arc::new(LexiconIntentClassifier::default());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut watchers = JoinSet::new();
    for account in config.resolved_accounts() {
        let engine = RankingEngine::new(Arc::clone(&store), Arc::clone(&intent));
        let pipeline = TriagePipeline::new(engine, Arc::clone(&store));
        let watcher = Watcher::new(
            account,
            ImapSessionFactory,
            pipeline,
            WatcherConfig::default(),
            shutdown_rx.clone(),
        );
        watchers.spawn(watcher.run());
    }
    drop(shutdown_rx);
    info!(accounts = watchers.len(), "daemon started");

    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupt received; shutting down"),
        _ = sigterm.recv() => info!("termination signal received; shutting down"),
        () = drain(&mut watchers) => {
            // Every account hit a fatal error; nothing left to supervise.
            info!("all account watchers stopped");
            return Ok(());
        }
    }

    let _ = shutdown_tx.send(true);
    drain(&mut watchers).await;
    info!("daemon stopped");
    Ok(())
}

async fn drain(watchers: &mut JoinSet<()>) {
    while watchers.join_next().await.is_some() {}
}

/// How long `stop` waits for the daemon to exit.
const STOP_WAIT: Duration = Duration::from_secs(10);
const STOP_POLL: Duration = Duration::from_millis(200);

/// Stops a running daemon; a no-op when none is running.
///
/// # Errors
///
/// Returns an error if the process ignores SIGTERM past the wait budget.
pub fn stop(state_dir: &Path) -> anyhow::Result<ExitCode> {
    let paths = DaemonPaths::new(state_dir);
    let Some(pid) = is_running(&paths) else {
        eprintln!("mailsift is not running");
        return Ok(ExitCode::SUCCESS);
    };

    terminate(pid);

    let deadline = std::time::Instant::now() + STOP_WAIT;
    while is_process_alive(pid) {
        if std::time::Instant::now() >= deadline {
            anyhow::bail!("process {pid} did not exit within {STOP_WAIT:?}");
        }
        std::thread::sleep(STOP_POLL);
    }

    let _ = std::fs::remove_file(&paths.pid_file);
    println!("mailsift stopped (pid {pid})");
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("mailsift-daemon-{}-{tag}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn missing_pid_file_means_not_running() {
        let dir = scratch_dir("missing");
        assert_eq!(is_running(&DaemonPaths::new(&dir)), None);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn stale_pid_marker_is_cleaned_up() {
        let dir = scratch_dir("stale");
        let paths = DaemonPaths::new(&dir);
        // Far above any realistic pid_max, so no live process matches.
        std::fs::write(&paths.pid_file, "2147483000").unwrap();

        assert_eq!(is_running(&paths), None);
        assert!(!paths.pid_file.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn live_pid_marker_is_detected() {
        let dir = scratch_dir("live");
        let paths = DaemonPaths::new(&dir);
        // Our own pid is certainly alive.
        std::fs::write(&paths.pid_file, std::process::id().to_string()).unwrap();

        assert_eq!(is_running(&paths), Some(std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn garbage_pid_marker_reads_as_absent() {
        let dir = scratch_dir("garbage");
        let paths = DaemonPaths::new(&dir);
        std::fs::write(&paths.pid_file, "not a pid").unwrap();

        assert_eq!(is_running(&paths), None);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn stop_without_instance_is_a_noop() {
        let dir = scratch_dir("noop");
        assert!(stop(&dir).is_ok());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
