//! Per-account connection supervision.
//!
//! One watcher owns one account's session end to end: connect,
//! authenticate, sit in bounded IDLE waits, hand notifications to the
//! triage pipeline, refresh the watch on a fixed cadence, and back off on
//! transient trouble. A fatal error stops this watcher only; the daemon and
//! every other account keep running.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::account::Account;
use crate::session::{MailSession, MailboxSignal, SessionFactory};
use crate::triage::{TriagePipeline, folders};
use crate::{Error, Result, Severity};

/// Timing and backoff knobs for a watcher.
#[derive(Debug, Clone, Copy)]
pub struct WatcherConfig {
    /// Upper bound of one idle wait call.
    pub idle_timeout: Duration,
    /// Cadence at which the idle watch is torn down and re-issued.
    pub refresh_after: Duration,
    /// Base delay of the transient-failure backoff; the actual delay is
    /// `failure_count × base`.
    pub backoff_base: Duration,
    /// Failure count past which the counter resets to 1.
    pub failure_cap: u32,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(30),
            refresh_after: Duration::from_secs(7 * 60),
            backoff_base: Duration::from_secs(10),
            failure_cap: 10,
        }
    }
}

/// Supervises the connection of one account.
pub struct Watcher<F: SessionFactory> {
    account: Account,
    factory: F,
    pipeline: TriagePipeline,
    config: WatcherConfig,
    shutdown: watch::Receiver<bool>,
}

impl<F: SessionFactory> Watcher<F> {
    /// Creates a watcher for one account.
    pub const fn new(
        account: Account,
        factory: F,
        pipeline: TriagePipeline,
        config: WatcherConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            account,
            factory,
            pipeline,
            config,
            shutdown,
        }
    }

    /// Runs until shutdown or a fatal error for this account.
    pub async fn run(mut self) {
        let label = self.account.label().to_string();
        info!(account = %label, host = %self.account.host, "starting account watcher");

        let mut failures: u32 = 0;

        while !self.shutdown_requested() {
            let mut session = match self.establish(&label).await {
                Ok(session) => session,
                Err(e) => {
                    if self.handle_failure(&label, &e, &mut failures, "connect").await {
                        continue;
                    }
                    break;
                }
            };
            failures = 0;

            let outcome = self.watch(&mut session, &label, &mut failures).await;
            // Whatever happened, the session is released before deciding.
            if let Err(e) = session.logout().await {
                debug!(account = %label, error = %e, "logout failed while releasing session");
            }

            match outcome {
                // Clean exit: shutdown was requested mid-watch.
                Ok(()) => break,
                Err(e) => {
                    if self.handle_failure(&label, &e, &mut failures, "watch").await {
                        continue;
                    }
                    break;
                }
            }
        }

        info!(account = %label, "account watcher stopped");
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Connects and authenticates a fresh session.
    async fn establish(&self, label: &str) -> Result<F::Session> {
        debug!(account = label, host = %self.account.host, "connecting");
        let mut session = self.factory.connect(&self.account).await?;

        if let Err(e) = session
            .authenticate(&self.account.username, &self.account.password)
            .await
        {
            // Invalid credentials and network hiccups alike: drop the
            // half-open session before reporting.
            let _ = session.logout().await;
            return Err(e);
        }

        info!(account = label, "authenticated");
        Ok(session)
    }

    /// The watch loop: bounded idle waits, triage on notification, periodic
    /// refresh. Returns `Ok(())` only when shutdown was requested.
    async fn watch(
        &mut self,
        session: &mut F::Session,
        label: &str,
        failures: &mut u32,
    ) -> Result<()> {
        loop {
            session.select_mailbox(folders::INBOX, true).await?;
            let refresh_at = Instant::now() + self.config.refresh_after;

            loop {
                if self.shutdown_requested() {
                    session.idle_done().await?;
                    return Ok(());
                }
                let now = Instant::now();
                if now >= refresh_at {
                    break;
                }

                let wait = self.config.idle_timeout.min(refresh_at - now);
                let signal = tokio::select! {
                    _ = self.shutdown.changed() => {
                        session.idle_done().await?;
                        return Ok(());
                    }
                    signal = session.idle_wait(wait) => signal?,
                };
                // A completed wait, however quiet, proves the server is up.
                *failures = 0;

                if signal == MailboxSignal::NewMail {
                    session.idle_done().await?;
                    let report = self.pipeline.run(session, label).await?;
                    info!(
                        account = label,
                        candidates = report.candidates,
                        important = report.important,
                        urgent = report.urgent,
                        marked = report.marked,
                        "triage pass finished"
                    );
                    session.select_mailbox(folders::INBOX, true).await?;
                }
            }

            // Scheduled hygiene, not an error: leave IDLE and re-issue it.
            session.idle_done().await?;
            debug!(account = label, "refreshing idle watch");
        }
    }

    /// Logs a failure and decides whether the outer loop retries.
    async fn handle_failure(
        &mut self,
        label: &str,
        error: &Error,
        failures: &mut u32,
        operation: &str,
    ) -> bool {
        match error.severity() {
            Severity::Transient => {
                *failures = next_failure(*failures, self.config.failure_cap);
                let delay = self.config.backoff_base * *failures;
                warn!(
                    account = label,
                    operation,
                    error = %error,
                    failures = *failures,
                    delay_secs = delay.as_secs(),
                    "transient failure; backing off"
                );
                self.sleep_unless_shutdown(delay).await
            }
            Severity::Fatal => {
                if error.is_auth() {
                    error!(account = label, operation, error = %error,
                        "credentials rejected; stopping account watcher");
                } else if error.is_security() {
                    error!(account = label, operation, error = %error,
                        "transport security negotiation failed; stopping account watcher");
                } else {
                    error!(account = label, operation, error = %error,
                        "unexpected failure; stopping account watcher");
                }
                false
            }
        }
    }

    /// Sleeps for the backoff delay; returns false if shutdown interrupted.
    async fn sleep_unless_shutdown(&mut self, delay: Duration) -> bool {
        tokio::select! {
            () = tokio::time::sleep(delay) => true,
            _ = self.shutdown.changed() => false,
        }
    }
}

/// Advances the transient-failure counter. Past the cap it resets to 1
/// instead of growing unbounded.
const fn next_failure(failures: u32, cap: u32) -> u32 {
    if failures >= cap { 1 } else { failures + 1 }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use crate::rank::{FixedIntentClassifier, RankingEngine};
    use crate::weights::MemoryWeightStore;

    fn test_account() -> Account {
        Account {
            name: Some("test".into()),
            host: "imap.example.com".into(),
            port: 993,
            username: "t@example.com".into(),
            password: "pw".into(),
            use_tls: true,
            timeout_secs: 1,
        }
    }

    fn test_pipeline() -> TriagePipeline {
        let store = Arc::new(MemoryWeightStore::new());
        let engine = RankingEngine::new(store.clone(), Arc::new(FixedIntentClassifier(0.0)));
        TriagePipeline::new(engine, store)
    }

    fn fast_config() -> WatcherConfig {
        WatcherConfig {
            idle_timeout: Duration::from_secs(30),
            refresh_after: Duration::from_secs(7 * 60),
            backoff_base: Duration::from_secs(10),
            failure_cap: 10,
        }
    }

    #[test]
    fn failure_counter_resets_past_the_cap() {
        let cap = 3;
        let mut failures = 0;
        let observed: Vec<u32> = (0..5)
            .map(|_| {
                failures = next_failure(failures, cap);
                failures
            })
            .collect();
        assert_eq!(observed, vec![1, 2, 3, 1, 2]);
    }

    /// Session double that cannot be constructed; for factories that always
    /// fail to connect.
    struct NoSession;

    #[async_trait]
    impl MailSession for NoSession {
        async fn authenticate(&mut self, _: &str, _: &str) -> Result<()> {
            Ok(())
        }
        async fn select_mailbox(&mut self, _: &str, _: bool) -> Result<()> {
            Ok(())
        }
        async fn search(&mut self, _: &str) -> Result<Vec<mailsift_imap::Uid>> {
            Ok(Vec::new())
        }
        async fn fetch_message(&mut self, _: mailsift_imap::Uid) -> Result<Option<Vec<u8>>> {
            Ok(None)
        }
        async fn move_message(&mut self, _: mailsift_imap::Uid, _: &str) -> Result<()> {
            Ok(())
        }
        async fn add_flag(&mut self, _: mailsift_imap::Uid, _: &str) -> Result<()> {
            Ok(())
        }
        async fn flags(&mut self, _: mailsift_imap::Uid) -> Result<Option<Vec<String>>> {
            Ok(None)
        }
        async fn create_folder(&mut self, _: &str) -> Result<()> {
            Ok(())
        }
        async fn idle_wait(&mut self, _: Duration) -> Result<MailboxSignal> {
            Ok(MailboxSignal::Quiet)
        }
        async fn idle_done(&mut self) -> Result<()> {
            Ok(())
        }
        async fn logout(&mut self) -> Result<()> {
            Ok(())
        }
    }

    /// Factory whose connects always fail with a transient network error.
    struct RefusingFactory {
        attempts: Arc<AtomicU32>,
    }

    #[async_trait]
    impl SessionFactory for RefusingFactory {
        type Session = NoSession;

        async fn connect(&self, _: &Account) -> Result<Self::Session> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(Error::Imap(mailsift_imap::Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "refused",
            ))))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_connect_failures_retry_until_shutdown() {
        let attempts = Arc::new(AtomicU32::new(0));
        let (tx, rx) = watch::channel(false);
        let watcher = Watcher::new(
            test_account(),
            RefusingFactory {
                attempts: Arc::clone(&attempts),
            },
            test_pipeline(),
            fast_config(),
            rx,
        );
        let handle = tokio::spawn(watcher.run());

        // Backoffs are 10s, 20s, 30s, ... so two minutes of virtual time
        // buys several attempts.
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(attempts.load(Ordering::SeqCst) >= 3);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    /// Session whose authentication always fails.
    struct RejectingSession;

    #[async_trait]
    impl MailSession for RejectingSession {
        async fn authenticate(&mut self, _: &str, _: &str) -> Result<()> {
            Err(Error::Imap(mailsift_imap::Error::Auth(
                "invalid credentials".into(),
            )))
        }
        async fn select_mailbox(&mut self, _: &str, _: bool) -> Result<()> {
            Ok(())
        }
        async fn search(&mut self, _: &str) -> Result<Vec<mailsift_imap::Uid>> {
            Ok(Vec::new())
        }
        async fn fetch_message(&mut self, _: mailsift_imap::Uid) -> Result<Option<Vec<u8>>> {
            Ok(None)
        }
        async fn move_message(&mut self, _: mailsift_imap::Uid, _: &str) -> Result<()> {
            Ok(())
        }
        async fn add_flag(&mut self, _: mailsift_imap::Uid, _: &str) -> Result<()> {
            Ok(())
        }
        async fn flags(&mut self, _: mailsift_imap::Uid) -> Result<Option<Vec<String>>> {
            Ok(None)
        }
        async fn create_folder(&mut self, _: &str) -> Result<()> {
            Ok(())
        }
        async fn idle_wait(&mut self, _: Duration) -> Result<MailboxSignal> {
            Ok(MailboxSignal::Quiet)
        }
        async fn idle_done(&mut self) -> Result<()> {
            Ok(())
        }
        async fn logout(&mut self) -> Result<()> {
            Ok(())
        }
    }

    struct RejectingFactory {
        attempts: Arc<AtomicU32>,
    }

    #[async_trait]
    impl SessionFactory for RejectingFactory {
        type Session = RejectingSession;

        async fn connect(&self, _: &Account) -> Result<Self::Session> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Ok(RejectingSession)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_credentials_stop_without_retry() {
        let attempts = Arc::new(AtomicU32::new(0));
        let (_tx, rx) = watch::channel(false);
        let watcher = Watcher::new(
            test_account(),
            RejectingFactory {
                attempts: Arc::clone(&attempts),
            },
            test_pipeline(),
            fast_config(),
            rx,
        );

        // Fatal on the first attempt: run() returns on its own.
        watcher.run().await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    /// Session that idles quietly forever, counting waits and refreshes.
    struct QuietSession {
        waits: Arc<AtomicU32>,
        dones: Arc<AtomicU32>,
    }

    #[async_trait]
    impl MailSession for QuietSession {
        async fn authenticate(&mut self, _: &str, _: &str) -> Result<()> {
            Ok(())
        }
        async fn select_mailbox(&mut self, _: &str, _: bool) -> Result<()> {
            Ok(())
        }
        async fn search(&mut self, _: &str) -> Result<Vec<mailsift_imap::Uid>> {
            Ok(Vec::new())
        }
        async fn fetch_message(&mut self, _: mailsift_imap::Uid) -> Result<Option<Vec<u8>>> {
            Ok(None)
        }
        async fn move_message(&mut self, _: mailsift_imap::Uid, _: &str) -> Result<()> {
            Ok(())
        }
        async fn add_flag(&mut self, _: mailsift_imap::Uid, _: &str) -> Result<()> {
            Ok(())
        }
        async fn flags(&mut self, _: mailsift_imap::Uid) -> Result<Option<Vec<String>>> {
            Ok(None)
        }
        async fn create_folder(&mut self, _: &str) -> Result<()> {
            Ok(())
        }
        async fn idle_wait(&mut self, timeout: Duration) -> Result<MailboxSignal> {
            self.waits.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(timeout).await;
            Ok(MailboxSignal::Quiet)
        }
        async fn idle_done(&mut self) -> Result<()> {
            self.dones.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn logout(&mut self) -> Result<()> {
            Ok(())
        }
    }

    struct QuietFactory {
        waits: Arc<AtomicU32>,
        dones: Arc<AtomicU32>,
    }

    #[async_trait]
    impl SessionFactory for QuietFactory {
        type Session = QuietSession;

        async fn connect(&self, _: &Account) -> Result<Self::Session> {
            Ok(QuietSession {
                waits: Arc::clone(&self.waits),
                dones: Arc::clone(&self.dones),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn quiet_watch_refreshes_on_cadence_without_error() {
        let waits = Arc::new(AtomicU32::new(0));
        let dones = Arc::new(AtomicU32::new(0));
        let (tx, rx) = watch::channel(false);
        let watcher = Watcher::new(
            test_account(),
            QuietFactory {
                waits: Arc::clone(&waits),
                dones: Arc::clone(&dones),
            },
            test_pipeline(),
            fast_config(),
            rx,
        );
        let handle = tokio::spawn(watcher.run());

        // Eight quiet minutes: one full 7-minute refresh cycle plus change.
        tokio::time::sleep(Duration::from_secs(8 * 60)).await;

        // 7 minutes of 30-second waits, then a refresh, then more waits.
        assert!(waits.load(Ordering::SeqCst) >= 14);
        assert!(dones.load(Ordering::SeqCst) >= 1);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
