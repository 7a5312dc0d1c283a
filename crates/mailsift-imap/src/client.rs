//! Single-connection IMAP client.
//!
//! Covers exactly the operations the triage daemon needs: LOGIN,
//! SELECT/EXAMINE, UID SEARCH, UID FETCH (RFC822 and FLAGS), UID STORE,
//! UID MOVE, CREATE, IDLE/DONE and LOGOUT. One command is in flight at a
//! time; IDLE is tracked as internal state so callers can interleave
//! `idle_wait` and `idle_done` without holding a borrow across the wait.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::framed::Framed;
use crate::response::{self, Completion};
use crate::stream::ImapStream;
use crate::tag::TagGenerator;
use crate::types::{IdleEvent, Uid};
use crate::{Error, Result};

/// IMAP client over an arbitrary stream.
///
/// Production code uses [`Client<ImapStream>`]; tests substitute mock
/// streams.
pub struct Client<S> {
    framed: Framed<S>,
    tags: TagGenerator,
    /// Tag of the IDLE command currently awaiting DONE, if any.
    idle_tag: Option<String>,
}

impl Client<ImapStream> {
    /// Connects to the server and reads the greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP connect exceeds `timeout`, the TLS
    /// handshake fails, or the server greets with BYE.
    pub async fn connect(host: &str, port: u16, use_tls: bool, timeout: Duration) -> Result<Self> {
        let stream = ImapStream::connect(host, port, use_tls, timeout).await?;
        let client = Self::from_stream(stream).await?;
        debug!(host, port, tls = use_tls, "connected to IMAP server");
        Ok(client)
    }
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps an established stream, consuming the server greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if the greeting is BYE or not an OK/PREAUTH line.
    pub async fn from_stream(stream: S) -> Result<Self> {
        let mut framed = Framed::new(stream);

        let greeting = framed.read_response().await?;
        if let Some(text) = response::bye_text(&greeting) {
            return Err(Error::Bye(text));
        }
        if !greeting.starts_with(b"* OK") && !greeting.starts_with(b"* PREAUTH") {
            return Err(Error::Protocol(format!(
                "unexpected greeting: {}",
                String::from_utf8_lossy(&greeting).trim_end()
            )));
        }

        Ok(Self {
            framed,
            tags: TagGenerator::new(),
            idle_tag: None,
        })
    }

    /// Authenticates with LOGIN.
    ///
    /// # Errors
    ///
    /// A NO completion is reported as [`Error::Auth`]; transport failures
    /// surface as [`Error::Io`].
    pub async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let cmd = format!(
            "LOGIN {} {}",
            response::quote(username),
            response::quote(password)
        );
        match self.command(&cmd).await {
            Ok(_) => Ok(()),
            Err(Error::No(text)) => Err(Error::Auth(text)),
            Err(e) => Err(e),
        }
    }

    /// Selects a mailbox, read-only (EXAMINE) or read-write (SELECT).
    ///
    /// # Errors
    ///
    /// Returns an error if the mailbox cannot be selected.
    pub async fn select(&mut self, mailbox: &str, readonly: bool) -> Result<()> {
        let verb = if readonly { "EXAMINE" } else { "SELECT" };
        self.command(&format!("{verb} {}", response::quote(mailbox)))
            .await
            .map(drop)
    }

    /// Creates a mailbox.
    ///
    /// # Errors
    ///
    /// Returns [`Error::No`] when the mailbox already exists; callers decide
    /// whether that is worth reporting.
    pub async fn create(&mut self, mailbox: &str) -> Result<()> {
        self.command(&format!("CREATE {}", response::quote(mailbox)))
            .await
            .map(drop)
    }

    /// Runs UID SEARCH with the given criteria.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn uid_search(&mut self, criteria: &str) -> Result<Vec<Uid>> {
        let responses = self.command(&format!("UID SEARCH {criteria}")).await?;

        let mut ids = Vec::new();
        for r in &responses {
            if let Some(found) = response::search_ids(r) {
                ids.extend(found);
            }
        }
        Ok(ids)
    }

    /// Fetches the full RFC822 content of one message.
    ///
    /// Returns `None` when the message no longer exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn uid_fetch_message(&mut self, uid: Uid) -> Result<Option<Vec<u8>>> {
        let responses = self.command(&format!("UID FETCH {uid} (RFC822)")).await?;
        Ok(responses
            .iter()
            .filter(|r| response::is_fetch(r))
            .find_map(|r| response::fetch_literal(r)))
    }

    /// Fetches the flag set of one message.
    ///
    /// Returns `None` when the message no longer exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn uid_fetch_flags(&mut self, uid: Uid) -> Result<Option<Vec<String>>> {
        let responses = self.command(&format!("UID FETCH {uid} (FLAGS)")).await?;
        Ok(responses
            .iter()
            .filter(|r| response::is_fetch(r))
            .find_map(|r| response::fetch_flags(r)))
    }

    /// Adds a flag or keyword to one message.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn uid_add_flag(&mut self, uid: Uid, flag: &str) -> Result<()> {
        self.command(&format!("UID STORE {uid} +FLAGS ({flag})"))
            .await
            .map(drop)
    }

    /// Moves one message to another mailbox.
    ///
    /// # Errors
    ///
    /// Returns [`Error::No`] when the destination is missing.
    pub async fn uid_move(&mut self, uid: Uid, mailbox: &str) -> Result<()> {
        self.command(&format!("UID MOVE {uid} {}", response::quote(mailbox)))
            .await
            .map(drop)
    }

    /// Waits up to `timeout` for a mailbox change, entering IDLE on demand.
    ///
    /// An elapsed timeout is not an error; it returns [`IdleEvent::Quiet`].
    /// If the server terminates IDLE with a tagged completion, the idle state
    /// is cleared and the next call re-issues the command.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a BYE from the server.
    pub async fn idle_wait(&mut self, timeout: Duration) -> Result<IdleEvent> {
        if self.idle_tag.is_none() {
            self.idle_start().await?;
        }

        match tokio::time::timeout(timeout, self.framed.read_response()).await {
            Err(_) => Ok(IdleEvent::Quiet),
            Ok(Ok(r)) => self.idle_event(&r),
            Ok(Err(e)) => Err(e),
        }
    }

    /// Leaves IDLE with DONE. No-op when not idling.
    ///
    /// # Errors
    ///
    /// Returns an error if the DONE exchange fails.
    pub async fn idle_done(&mut self) -> Result<()> {
        let Some(tag) = self.idle_tag.take() else {
            return Ok(());
        };
        self.framed.write_line(b"DONE\r\n").await?;
        let responses = self.framed.read_until_tagged(&tag).await?;
        Self::check(&tag, &responses)
    }

    /// Logs out. The connection is unusable afterwards.
    ///
    /// Any pending IDLE is terminated first.
    ///
    /// # Errors
    ///
    /// Returns an error if the LOGOUT exchange fails.
    pub async fn logout(&mut self) -> Result<()> {
        if self.idle_tag.is_some() {
            self.idle_done().await?;
        }
        let tag = self.tags.next();
        self.framed
            .write_line(format!("{tag} LOGOUT\r\n").as_bytes())
            .await?;
        // The server answers with BYE then the tagged OK.
        let responses = self.framed.read_until_tagged(&tag).await?;
        Self::check(&tag, &responses)
    }

    /// Sends IDLE and waits for the continuation request.
    async fn idle_start(&mut self) -> Result<()> {
        let tag = self.tags.next();
        self.framed
            .write_line(format!("{tag} IDLE\r\n").as_bytes())
            .await?;

        loop {
            let r = self.framed.read_response().await?;
            if r.starts_with(b"+") {
                self.idle_tag = Some(tag);
                return Ok(());
            }
            if let Some(text) = response::bye_text(&r) {
                return Err(Error::Bye(text));
            }
            match response::completion(&tag, &r) {
                Some(Completion::No(t)) => return Err(Error::No(t)),
                Some(Completion::Bad(t)) => return Err(Error::Bad(t)),
                Some(Completion::Ok) => {
                    return Err(Error::Protocol(
                        "IDLE completed without continuation".to_string(),
                    ));
                }
                // Untagged chatter before the continuation is allowed.
                None => {}
            }
        }
    }

    /// Interprets one response received while idling.
    fn idle_event(&mut self, r: &[u8]) -> Result<IdleEvent> {
        if let Some(text) = response::bye_text(r) {
            self.idle_tag = None;
            return Err(Error::Bye(text));
        }
        if let Some((count, keyword)) = response::mailbox_change(r) {
            return Ok(match keyword.as_str() {
                "EXISTS" => IdleEvent::Exists(count),
                "RECENT" => IdleEvent::Recent(count),
                _ => IdleEvent::Expunge(count),
            });
        }
        // A tagged completion means the server ended IDLE on its own.
        if let Some(tag) = self.idle_tag.clone()
            && let Some(c) = response::completion(&tag, r)
        {
            self.idle_tag = None;
            return match c {
                Completion::Ok => Ok(IdleEvent::Quiet),
                Completion::No(t) => Err(Error::No(t)),
                Completion::Bad(t) => Err(Error::Bad(t)),
            };
        }
        Ok(IdleEvent::Quiet)
    }

    /// Sends one tagged command and collects responses through completion.
    async fn command(&mut self, cmd: &str) -> Result<Vec<Vec<u8>>> {
        let tag = self.tags.next();
        self.framed
            .write_line(format!("{tag} {cmd}\r\n").as_bytes())
            .await?;
        let responses = self.framed.read_until_tagged(&tag).await?;
        Self::check(&tag, &responses)?;
        Ok(responses)
    }

    /// Maps the tagged completion to a result.
    fn check(tag: &str, responses: &[Vec<u8>]) -> Result<()> {
        let last = responses
            .last()
            .ok_or_else(|| Error::Protocol("missing tagged completion".to_string()))?;
        match response::completion(tag, last) {
            Some(Completion::Ok) => Ok(()),
            Some(Completion::No(t)) => Err(Error::No(t)),
            Some(Completion::Bad(t)) => Err(Error::Bad(t)),
            None => Err(Error::Protocol("missing tagged completion".to_string())),
        }
    }
}
