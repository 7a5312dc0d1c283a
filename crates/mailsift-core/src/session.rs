//! Protocol session capability traits.
//!
//! The triage pipeline and connection supervisor only ever talk to a mail
//! server through [`MailSession`]; any conforming implementation — the real
//! IMAP client or a scripted test double — satisfies them.

use std::time::Duration;

use async_trait::async_trait;
use mailsift_imap::{Client, ImapStream, Uid};

use crate::account::Account;
use crate::Result;

/// What a bounded idle wait observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxSignal {
    /// The server reported newly arrived mail.
    NewMail,
    /// The wait elapsed, or nothing of interest happened.
    Quiet,
}

/// The protocol operations the daemon needs from a mail session.
///
/// One session is owned by exactly one connection supervisor and never
/// shared; all methods take `&mut self`.
#[async_trait]
pub trait MailSession: Send {
    /// Authenticates the session.
    async fn authenticate(&mut self, username: &str, password: &str) -> Result<()>;

    /// Selects a mailbox, read-only or read-write.
    async fn select_mailbox(&mut self, mailbox: &str, readonly: bool) -> Result<()>;

    /// Searches the selected mailbox; returns matching uids.
    async fn search(&mut self, criteria: &str) -> Result<Vec<Uid>>;

    /// Fetches the raw content of one message, `None` if it vanished.
    async fn fetch_message(&mut self, uid: Uid) -> Result<Option<Vec<u8>>>;

    /// Moves one message to another folder.
    async fn move_message(&mut self, uid: Uid, destination: &str) -> Result<()>;

    /// Adds a flag or keyword to one message.
    async fn add_flag(&mut self, uid: Uid, flag: &str) -> Result<()>;

    /// Reads the flag set of one message, `None` if it vanished.
    async fn flags(&mut self, uid: Uid) -> Result<Option<Vec<String>>>;

    /// Creates a folder. Not idempotent: creating an existing folder is a
    /// server refusal; callers that want idempotence swallow it.
    async fn create_folder(&mut self, mailbox: &str) -> Result<()>;

    /// Waits up to `timeout` for a mailbox change notification.
    async fn idle_wait(&mut self, timeout: Duration) -> Result<MailboxSignal>;

    /// Leaves notification mode.
    async fn idle_done(&mut self) -> Result<()>;

    /// Logs out and releases the session.
    async fn logout(&mut self) -> Result<()>;
}

#[async_trait]
impl MailSession for Client<ImapStream> {
    async fn authenticate(&mut self, username: &str, password: &str) -> Result<()> {
        Ok(self.login(username, password).await?)
    }

    async fn select_mailbox(&mut self, mailbox: &str, readonly: bool) -> Result<()> {
        Ok(self.select(mailbox, readonly).await?)
    }

    async fn search(&mut self, criteria: &str) -> Result<Vec<Uid>> {
        Ok(self.uid_search(criteria).await?)
    }

    async fn fetch_message(&mut self, uid: Uid) -> Result<Option<Vec<u8>>> {
        Ok(self.uid_fetch_message(uid).await?)
    }

    async fn move_message(&mut self, uid: Uid, destination: &str) -> Result<()> {
        Ok(self.uid_move(uid, destination).await?)
    }

    async fn add_flag(&mut self, uid: Uid, flag: &str) -> Result<()> {
        Ok(self.uid_add_flag(uid, flag).await?)
    }

    async fn flags(&mut self, uid: Uid) -> Result<Option<Vec<String>>> {
        Ok(self.uid_fetch_flags(uid).await?)
    }

    async fn create_folder(&mut self, mailbox: &str) -> Result<()> {
        Ok(self.create(mailbox).await?)
    }

    async fn idle_wait(&mut self, timeout: Duration) -> Result<MailboxSignal> {
        let event = Client::idle_wait(self, timeout).await?;
        Ok(if event.is_new_mail() {
            MailboxSignal::NewMail
        } else {
            MailboxSignal::Quiet
        })
    }

    async fn idle_done(&mut self) -> Result<()> {
        Ok(Client::idle_done(self).await?)
    }

    async fn logout(&mut self) -> Result<()> {
        Ok(Client::logout(self).await?)
    }
}

/// Opens authenticated-capable sessions for an account.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// The session type this factory produces.
    type Session: MailSession;

    /// Establishes a connection for the account. Authentication is the
    /// caller's next step.
    async fn connect(&self, account: &Account) -> Result<Self::Session>;
}

/// Production factory connecting real IMAP sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImapSessionFactory;

#[async_trait]
impl SessionFactory for ImapSessionFactory {
    type Session = Client<ImapStream>;

    async fn connect(&self, account: &Account) -> Result<Self::Session> {
        Ok(Client::connect(
            &account.host,
            account.port,
            account.use_tls,
            account.timeout(),
        )
        .await?)
    }
}
