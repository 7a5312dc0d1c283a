//! Triage: turning a new-mail notification into routing decisions.

mod pipeline;

pub use pipeline::{CANDIDATE_CRITERIA, PROCESSED_FLAG, TriagePipeline, TriageReport, folders};
