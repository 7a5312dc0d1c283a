//! Message classification: multiplicative ranking plus urgency intent.

mod engine;
mod intent;

pub use engine::{Decision, RankingEngine};
pub use intent::{FixedIntentClassifier, IntentClassifier, LexiconIntentClassifier, URGENCY_CUTOFF};
