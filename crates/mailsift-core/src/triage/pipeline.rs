//! The triage pipeline.
//!
//! One run: find unread, unprocessed messages in the inbox, classify each,
//! route it (Important folder, Urgent folder, or the processed marker), and
//! feed the outcome back into the weight store.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::message::Message;
use crate::rank::{Decision, RankingEngine};
use crate::session::MailSession;
use crate::terms;
use crate::weights::{RankRecord, UpsertMeta, WeightCategory, WeightRepository};
use crate::Result;

/// Folder names the pipeline routes into.
pub mod folders {
    /// The watched inbox.
    pub const INBOX: &str = "INBOX";
    /// Destination for important, non-urgent mail.
    pub const IMPORTANT: &str = "INBOX.Important";
    /// Destination for important, urgent mail.
    pub const URGENT: &str = "INBOX.Urgent";
}

/// Keyword marking a message as already triaged.
pub const PROCESSED_FLAG: &str = "processed";

/// Search criteria selecting triage candidates.
pub const CANDIDATE_CRITERIA: &str = "UNSEEN UNKEYWORD processed";

/// Counters from one triage run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriageReport {
    /// Messages matching the candidate search.
    pub candidates: usize,
    /// Messages moved to the Important folder.
    pub important: usize,
    /// Messages moved to the Urgent folder.
    pub urgent: usize,
    /// Messages that stayed in place and gained the processed marker.
    pub marked: usize,
}

/// Classifies and routes new messages for one account's session.
pub struct TriagePipeline {
    engine: RankingEngine,
    weights: Arc<dyn WeightRepository>,
}

impl TriagePipeline {
    /// Creates a pipeline over the given engine and weight store.
    #[must_use]
    pub fn new(engine: RankingEngine, weights: Arc<dyn WeightRepository>) -> Self {
        Self { engine, weights }
    }

    /// Runs one triage pass over the inbox.
    ///
    /// Per-message routing trouble (a NO on a move, a vanished message) is
    /// recovered locally; the remaining candidates are still processed. Only
    /// session-level failures abort the run.
    ///
    /// # Errors
    ///
    /// Returns an error if a session-level operation (select, search, fetch)
    /// or a weight-store update fails.
    pub async fn run<S: MailSession>(&self, session: &mut S, account: &str) -> Result<TriageReport> {
        self.ensure_folder(session, account, folders::IMPORTANT).await?;
        self.ensure_folder(session, account, folders::URGENT).await?;

        session.select_mailbox(folders::INBOX, true).await?;
        let uids = session.search(CANDIDATE_CRITERIA).await?;
        debug!(account, candidates = uids.len(), "triage pass starting");

        let mut report = TriageReport {
            candidates: uids.len(),
            ..TriageReport::default()
        };

        for uid in uids {
            let Some(raw) = session.fetch_message(uid).await? else {
                warn!(account, uid, "message disappeared before fetch; skipping");
                continue;
            };
            let message = Message::parse(uid, &raw);
            let decision = self.engine.rank(&message).await?;
            info!(
                account,
                uid,
                rank = decision.rank,
                threshold = decision.threshold,
                important = decision.important,
                urgent = decision.urgent,
                subject = %message.subject,
                "message classified"
            );

            match (decision.important, decision.urgent) {
                (true, false) => {
                    self.shift(session, account, uid, folders::IMPORTANT).await?;
                    report.important += 1;
                }
                (true, true) => {
                    self.shift(session, account, uid, folders::URGENT).await?;
                    report.urgent += 1;
                }
                _ => {
                    self.mark_processed(session, account, uid).await?;
                    report.marked += 1;
                }
            }

            // Every decision trains the model, whichever way it went.
            self.learn(&message, &decision).await?;
        }

        Ok(report)
    }

    /// Creates a routing folder; an existing folder is not an error.
    async fn ensure_folder<S: MailSession>(
        &self,
        session: &mut S,
        account: &str,
        folder: &str,
    ) -> Result<()> {
        match session.create_folder(folder).await {
            Ok(()) => {
                info!(account, folder, "created routing folder");
                Ok(())
            }
            Err(e) if e.is_operation_refusal() => {
                info!(account, folder, "routing folder already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Moves one message out of the inbox; a refused move leaves it in place.
    async fn shift<S: MailSession>(
        &self,
        session: &mut S,
        account: &str,
        uid: mailsift_imap::Uid,
        destination: &str,
    ) -> Result<()> {
        session.select_mailbox(folders::INBOX, false).await?;
        match session.move_message(uid, destination).await {
            Ok(()) => {
                info!(account, uid, destination, "message routed");
                Ok(())
            }
            Err(e) if e.is_operation_refusal() => {
                error!(account, uid, destination, error = %e, "move refused; message left in inbox");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Adds the processed marker, verifying it landed.
    ///
    /// Idempotent: a marker that is already present is left alone without
    /// complaint. A message that vanished mid-flight is logged and skipped.
    async fn mark_processed<S: MailSession>(
        &self,
        session: &mut S,
        account: &str,
        uid: mailsift_imap::Uid,
    ) -> Result<()> {
        session.select_mailbox(folders::INBOX, false).await?;

        let Some(flags) = session.flags(uid).await? else {
            warn!(account, uid, "message disappeared before marking; skipping");
            return Ok(());
        };
        if flags.iter().any(|f| f == PROCESSED_FLAG) {
            return Ok(());
        }

        session.add_flag(uid, PROCESSED_FLAG).await?;

        match session.flags(uid).await? {
            None => warn!(account, uid, "message disappeared during marking"),
            Some(flags) if !flags.iter().any(|f| f == PROCESSED_FLAG) => {
                warn!(account, uid, "processed marker did not stick; weights may update twice");
            }
            Some(_) => debug!(account, uid, "processed marker added"),
        }
        Ok(())
    }

    /// Submits one decision to the weight store.
    ///
    /// Order matters: the rank is recorded last, after the upserts, and
    /// always after the decision that consumed the previous threshold.
    async fn learn(&self, message: &Message, decision: &Decision) -> Result<()> {
        let occurrence = UpsertMeta::occurrence(message.date);

        if !message.sender.is_empty() {
            self.weights
                .upsert(WeightCategory::Sender, &message.sender, &occurrence)
                .await?;
            self.weights
                .upsert(WeightCategory::ThreadSender, &message.sender, &occurrence)
                .await?;
        }
        if !message.subject.is_empty() {
            self.weights
                .upsert(WeightCategory::ThreadActivity, &message.subject, &occurrence)
                .await?;
        }
        for (term, frequency) in terms::term_frequencies(&message.subject) {
            self.weights
                .upsert(WeightCategory::ThreadTerm, &term, &UpsertMeta::term(frequency))
                .await?;
        }
        for (term, frequency) in terms::term_frequencies(&message.body) {
            self.weights
                .upsert(WeightCategory::MessageTerm, &term, &UpsertMeta::term(frequency))
                .await?;
        }

        self.weights
            .record_rank(RankRecord {
                date: message.date.unwrap_or_else(Utc::now),
                sender: message.sender.clone(),
                subject: message.subject.clone(),
                rank: decision.rank,
                important: decision.important,
                urgent: decision.urgent,
            })
            .await
    }
}
