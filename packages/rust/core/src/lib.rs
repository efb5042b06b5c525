//! Contract intelligence pipeline for PactLens.
//!
//! Ties storage, inference and retrieval together into the three stages a
//! caller can run against an uploaded contract: classification, full
//! analysis and conversation. [`ContractPipeline`] is the entry point.

pub mod analyze;
pub mod augment;
pub mod classify;
pub mod converse;
pub mod heuristics;
pub mod pipeline;
pub mod prompts;
pub mod retrieval;
pub mod validate;

#[cfg(test)]
mod testing;

pub use augment::{AugmentDecision, Decision, DecisionReason};
pub use classify::{Classification, ClassificationSource};
pub use converse::ChatAnswer;
pub use pipeline::{ContractPipeline, PipelineDeps};
pub use retrieval::{NormalizedResults, RetrievedItem};
pub use validate::OutputError;
