//! # mailsift-core
//!
//! Domain logic for the mailsift triage daemon.
//!
//! This crate provides:
//! - **Weight model** - persisted, incrementally trained tables behind the
//!   [`WeightRepository`] contract
//! - **Classification engine** - multiplicative ranking plus an injected
//!   urgency classifier
//! - **Triage pipeline** - candidate selection, routing and online updates
//! - **Connection supervision** - per-account IDLE watch with backoff and
//!   failure classification
//! - **Session capability traits** - the protocol surface the daemon needs,
//!   satisfied by the real IMAP client or test doubles

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod account;
mod error;
pub mod message;
pub mod rank;
pub mod session;
pub mod terms;
pub mod triage;
pub mod watch;
pub mod weights;

pub use account::Account;
pub use error::{Error, Result, Severity};
pub use message::Message;
pub use rank::{Decision, IntentClassifier, LexiconIntentClassifier, RankingEngine};
pub use session::{ImapSessionFactory, MailSession, MailboxSignal, SessionFactory};
pub use triage::{TriagePipeline, TriageReport};
pub use watch::{Watcher, WatcherConfig};
pub use weights::{FileWeightStore, MemoryWeightStore, WeightCategory, WeightRepository};
