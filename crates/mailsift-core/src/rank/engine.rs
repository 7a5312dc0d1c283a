//! The classification engine.
//!
//! Rank is the product of five independently looked-up multiplicative
//! factors; every factor defaults to 1 when its key has never been seen, so
//! a message from a blank-slate world ranks exactly 1.

use std::sync::Arc;

use crate::message::Message;
use crate::rank::intent::{IntentClassifier, URGENCY_CUTOFF};
use crate::terms;
use crate::weights::{NEUTRAL_WEIGHT, WeightCategory, WeightRepository};
use crate::Result;

/// The outcome of classifying one message. Produced once per message.
#[derive(Debug, Clone, Copy)]
pub struct Decision {
    /// Combined multiplicative rank.
    pub rank: f64,
    /// Whether the rank cleared the threshold.
    pub important: bool,
    /// Whether the intent classifier called the message urgent.
    pub urgent: bool,
    /// The threshold the rank was compared against.
    pub threshold: f64,
}

/// Combines weight-store lookups into a priority decision.
pub struct RankingEngine {
    weights: Arc<dyn WeightRepository>,
    intent: Arc<dyn IntentClassifier>,
}

impl RankingEngine {
    /// Creates an engine over the given store and classifier.
    #[must_use]
    pub fn new(weights: Arc<dyn WeightRepository>, intent: Arc<dyn IntentClassifier>) -> Self {
        Self { weights, intent }
    }

    /// Ranks one message and decides importance and urgency.
    ///
    /// The threshold is the median of all previously recorded ranks; this
    /// call reads it but never writes history. Recording the decision is the
    /// caller's job, strictly after the decision is made.
    ///
    /// # Errors
    ///
    /// Returns an error if a weight lookup fails.
    pub async fn rank(&self, message: &Message) -> Result<Decision> {
        let sender_wt = self
            .weights
            .weight(WeightCategory::Sender, &message.sender)
            .await?;
        let thread_sender_wt = self
            .weights
            .weight(WeightCategory::ThreadSender, &message.sender)
            .await?;

        // Thread activity only speaks for actual replies.
        let thread_activity_wt = if message.is_reply {
            self.weights
                .weight(WeightCategory::ThreadActivity, &message.subject)
                .await?
        } else {
            NEUTRAL_WEIGHT
        };

        let subject_terms = terms::terms(&message.subject);
        let thread_term_wt = self
            .weights
            .mean_weight(WeightCategory::ThreadTerm, &subject_terms)
            .await?;

        let body_terms = terms::terms(&message.body);
        let message_term_wt = self
            .weights
            .mean_weight(WeightCategory::MessageTerm, &body_terms)
            .await?;

        let rank =
            sender_wt * thread_sender_wt * thread_activity_wt * thread_term_wt * message_term_wt;
        let threshold = self.weights.threshold().await?;

        let urgency = self
            .intent
            .score(&format!("{} {}", message.subject, message.body));

        Ok(Decision {
            rank,
            important: rank > threshold,
            urgent: urgency > URGENCY_CUTOFF,
            threshold,
        })
    }
}
