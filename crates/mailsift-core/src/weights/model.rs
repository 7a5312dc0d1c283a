//! Weight model data types and update formulas.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Weight a key resolves to when it has never been inserted.
pub const NEUTRAL_WEIGHT: f64 = 1.0;

/// Reply count at which thread-activity weights switch from frequency
/// counting to time-decay recomputation.
pub const THREAD_FREQUENCY_THRESHOLD: u64 = 2;

/// The weight table a key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WeightCategory {
    /// Keyed by sender address.
    Sender,
    /// Keyed by sender address, fed by reply threads.
    ThreadSender,
    /// Keyed by normalized thread subject; carries time metadata.
    ThreadActivity,
    /// Keyed by vocabulary terms of subjects.
    ThreadTerm,
    /// Keyed by vocabulary terms of message bodies.
    MessageTerm,
}

impl WeightCategory {
    /// All categories, in table order.
    pub const ALL: [Self; 5] = [
        Self::Sender,
        Self::ThreadSender,
        Self::ThreadActivity,
        Self::ThreadTerm,
        Self::MessageTerm,
    ];

    /// File name of the persisted table for this category.
    #[must_use]
    pub const fn table_name(self) -> &'static str {
        match self {
            Self::Sender => "sender_weights.json",
            Self::ThreadSender => "thread_sender_weights.json",
            Self::ThreadActivity => "thread_weights.json",
            Self::ThreadTerm => "thread_term_weights.json",
            Self::MessageTerm => "message_term_weights.json",
        }
    }
}

/// One row of a weight table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightEntry {
    /// Sender address, thread subject or term, unique per category.
    pub key: String,
    /// Current weight; never negative.
    pub weight: f64,
    /// Occurrence count behind the weight.
    pub frequency: u64,
    /// When the thread was first seen (thread-activity only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<DateTime<Utc>>,
    /// Seconds between the first message and the latest reply
    /// (thread-activity only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_span_secs: Option<f64>,
}

/// Context accompanying an upsert: the message date for occurrence-driven
/// categories, the in-message frequency for term categories.
#[derive(Debug, Clone, Copy)]
pub struct UpsertMeta {
    /// When the triggering message was sent.
    pub occurred_at: Option<DateTime<Utc>>,
    /// How often the term appeared in the relevant text.
    pub term_frequency: u64,
}

impl UpsertMeta {
    /// Meta for one sender/thread occurrence.
    #[must_use]
    pub const fn occurrence(occurred_at: Option<DateTime<Utc>>) -> Self {
        Self {
            occurred_at,
            term_frequency: 1,
        }
    }

    /// Meta for a term with the given in-message frequency.
    #[must_use]
    pub const fn term(term_frequency: u64) -> Self {
        Self {
            occurred_at: None,
            term_frequency,
        }
    }
}

/// Diminishing-return accumulation: `ln(e^w + d)`.
///
/// Each application grows the weight by less than the previous one, so a
/// flood of occurrences cannot blow a single key up linearly.
#[must_use]
pub fn accumulate(weight: f64, increment: f64) -> f64 {
    (weight.exp() + increment).ln()
}

#[allow(clippy::cast_precision_loss)]
impl WeightEntry {
    /// Builds the insertion row for a key first seen now.
    #[must_use]
    pub fn first(category: WeightCategory, key: &str, meta: &UpsertMeta) -> Self {
        let mut entry = Self {
            key: key.to_string(),
            weight: NEUTRAL_WEIGHT,
            frequency: 1,
            first_seen: None,
            time_span_secs: None,
        };
        match category {
            WeightCategory::Sender | WeightCategory::ThreadSender => {
                entry.weight = 2.0_f64.ln();
            }
            WeightCategory::ThreadActivity => {
                entry.first_seen = Some(meta.occurred_at.unwrap_or_else(Utc::now));
                entry.time_span_secs = Some(0.0);
            }
            WeightCategory::ThreadTerm | WeightCategory::MessageTerm => {
                entry.weight = ((meta.term_frequency + 1) as f64).ln();
                entry.frequency = meta.term_frequency;
            }
        }
        entry
    }

    /// Applies one more occurrence to an existing row.
    pub fn update(&mut self, category: WeightCategory, meta: &UpsertMeta) {
        match category {
            WeightCategory::Sender | WeightCategory::ThreadSender => {
                self.weight = accumulate(self.weight, 1.0);
                self.frequency += 1;
            }
            WeightCategory::ThreadActivity => self.update_thread_activity(meta),
            WeightCategory::ThreadTerm | WeightCategory::MessageTerm => {
                self.weight = accumulate(self.weight, meta.term_frequency as f64);
                self.frequency += meta.term_frequency;
            }
        }
    }

    /// Thread activity: count replies until the threshold, then weigh the
    /// thread by how densely replies arrive over its lifetime.
    fn update_thread_activity(&mut self, meta: &UpsertMeta) {
        if self.frequency < THREAD_FREQUENCY_THRESHOLD {
            self.frequency += 1;
            return;
        }

        let occurred_at = meta.occurred_at.unwrap_or_else(Utc::now);
        let first_seen = *self.first_seen.get_or_insert(occurred_at);
        let span = (occurred_at - first_seen).num_seconds() as f64;
        // A zero or negative span would make the decay degenerate; keep the
        // previous weight until time actually passes.
        if span > 0.0 {
            self.time_span_secs = Some(span);
            self.weight = 10.0 + (self.frequency as f64 / span).log10();
        }
    }
}

/// One row of the rank history log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankRecord {
    /// Message date, or the triage time when absent.
    pub date: DateTime<Utc>,
    /// Sender address.
    pub sender: String,
    /// Normalized subject.
    pub subject: String,
    /// Combined multiplicative rank.
    pub rank: f64,
    /// Whether the rank cleared the threshold.
    pub important: bool,
    /// Whether the intent classifier called the message urgent.
    pub urgent: bool,
}

/// Median of a value list; 0 when empty. Used for the decision threshold.
#[must_use]
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        f64::midpoint(sorted[mid - 1], sorted[mid])
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    #[test]
    fn sender_insert_starts_at_ln_two() {
        let entry = WeightEntry::first(
            WeightCategory::Sender,
            "a@example.com",
            &UpsertMeta::occurrence(None),
        );
        assert_eq!(entry.weight, 2.0_f64.ln());
        assert_eq!(entry.frequency, 1);
    }

    #[test]
    fn sender_update_accumulates() {
        let mut entry = WeightEntry::first(
            WeightCategory::Sender,
            "a@example.com",
            &UpsertMeta::occurrence(None),
        );
        let before = entry.weight;
        entry.update(WeightCategory::Sender, &UpsertMeta::occurrence(None));

        assert_eq!(entry.weight, (before.exp() + 1.0).ln());
        assert_eq!(entry.frequency, 2);
    }

    #[test]
    fn term_insert_uses_frequency() {
        let entry = WeightEntry::first(WeightCategory::MessageTerm, "budget", &UpsertMeta::term(3));
        assert_eq!(entry.weight, 4.0_f64.ln());
        assert_eq!(entry.frequency, 3);
    }

    #[test]
    fn term_update_accumulates_frequency() {
        let mut entry =
            WeightEntry::first(WeightCategory::ThreadTerm, "budget", &UpsertMeta::term(1));
        let before = entry.weight;
        entry.update(WeightCategory::ThreadTerm, &UpsertMeta::term(2));

        assert_eq!(entry.weight, (before.exp() + 2.0).ln());
        assert_eq!(entry.frequency, 3);
    }

    #[test]
    fn thread_activity_counts_then_decays() {
        let start = chrono::Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
        let mut entry = WeightEntry::first(
            WeightCategory::ThreadActivity,
            "launch plan",
            &UpsertMeta::occurrence(Some(start)),
        );
        assert_eq!(entry.frequency, 1);
        assert_eq!(entry.weight, NEUTRAL_WEIGHT);

        // Second occurrence only bumps the counter.
        entry.update(
            WeightCategory::ThreadActivity,
            &UpsertMeta::occurrence(Some(start + chrono::Duration::minutes(5))),
        );
        assert_eq!(entry.frequency, 2);
        assert_eq!(entry.weight, NEUTRAL_WEIGHT);

        // Third occurrence recomputes from the elapsed span.
        let later = start + chrono::Duration::minutes(10);
        entry.update(
            WeightCategory::ThreadActivity,
            &UpsertMeta::occurrence(Some(later)),
        );
        assert_eq!(entry.time_span_secs, Some(600.0));
        assert_eq!(entry.weight, 10.0 + (2.0_f64 / 600.0).log10());
    }

    #[test]
    fn thread_activity_denser_replies_weigh_more() {
        let start = chrono::Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
        let meta = |secs: i64| UpsertMeta::occurrence(Some(start + chrono::Duration::seconds(secs)));

        let mut fast = WeightEntry::first(WeightCategory::ThreadActivity, "t", &meta(0));
        fast.update(WeightCategory::ThreadActivity, &meta(10));
        fast.update(WeightCategory::ThreadActivity, &meta(60));

        let mut slow = WeightEntry::first(WeightCategory::ThreadActivity, "t", &meta(0));
        slow.update(WeightCategory::ThreadActivity, &meta(10));
        slow.update(WeightCategory::ThreadActivity, &meta(6000));

        assert!(fast.weight > slow.weight);
    }

    #[test]
    fn thread_activity_ignores_non_positive_spans() {
        let start = chrono::Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
        let meta = UpsertMeta::occurrence(Some(start));
        let mut entry = WeightEntry::first(WeightCategory::ThreadActivity, "t", &meta);
        entry.update(WeightCategory::ThreadActivity, &meta);
        entry.update(WeightCategory::ThreadActivity, &meta);

        assert_eq!(entry.weight, NEUTRAL_WEIGHT);
    }

    #[test]
    fn median_of_empty_history_is_zero() {
        assert_eq!(median(&[]), 0.0);
    }

    #[test]
    fn median_handles_odd_and_even_counts() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), 2.5);
    }

    proptest! {
        #[test]
        fn accumulate_matches_formula(w in 0.0..20.0_f64, d in 0.0..100.0_f64) {
            let expected = (w.exp() + d).ln();
            prop_assert!((accumulate(w, d) - expected).abs() < 1e-12);
        }

        #[test]
        fn accumulate_never_decreases(w in 0.0..20.0_f64, d in 0.0..100.0_f64) {
            prop_assert!(accumulate(w, d) >= w);
        }
    }
}
