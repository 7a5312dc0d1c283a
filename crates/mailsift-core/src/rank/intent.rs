//! Urgency intent scoring.
//!
//! The engine treats the intent classifier as a black box: text in,
//! probability out. The daemon injects one implementation at startup and
//! never trains or mutates it.

/// Inference contract of the urgency classifier.
pub trait IntentClassifier: Send + Sync {
    /// Probability in [0, 1] that the text asks for urgent action.
    fn score(&self, text: &str) -> f64;
}

/// Probability above which a message counts as urgent.
pub const URGENCY_CUTOFF: f64 = 0.5;

/// Default classifier: a lexicon of urgency phrases.
///
/// Every phrase found in the text raises the score towards 1 with
/// diminishing returns; text with no urgency phrasing scores 0.
pub struct LexiconIntentClassifier {
    phrases: Vec<&'static str>,
}

impl Default for LexiconIntentClassifier {
    fn default() -> Self {
        Self {
            phrases: vec![
                "urgent",
                "asap",
                "as soon as possible",
                "immediately",
                "right away",
                "end of day",
                "time sensitive",
                "deadline",
                "critical",
                "emergency",
                "action required",
                "please respond",
            ],
        }
    }
}

impl IntentClassifier for LexiconIntentClassifier {
    fn score(&self, text: &str) -> f64 {
        let text = text.to_lowercase();
        let hits = self
            .phrases
            .iter()
            .filter(|phrase| text.contains(*phrase))
            .count();
        #[allow(clippy::cast_precision_loss)]
        let score = 1.0 - (-(hits as f64)).exp();
        score
    }
}

/// Fixed-score classifier for tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedIntentClassifier(pub f64);

impl IntentClassifier for FixedIntentClassifier {
    fn score(&self, _text: &str) -> f64 {
        self.0
    }
}
