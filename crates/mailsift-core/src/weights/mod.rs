//! Incrementally trained weight model.
//!
//! Five persisted tables (sender, thread-sender, thread activity, thread
//! terms, message terms) plus the rank history that feeds the decision
//! threshold. Every routed message updates the tables through the
//! [`WeightRepository`] contract; nothing else mutates them.

mod model;
mod repository;

pub use model::{
    NEUTRAL_WEIGHT, RankRecord, THREAD_FREQUENCY_THRESHOLD, UpsertMeta, WeightCategory,
    WeightEntry, accumulate, median,
};
pub use repository::{FileWeightStore, MemoryWeightStore, WeightRepository};
