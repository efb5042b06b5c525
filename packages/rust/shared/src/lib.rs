//! Shared types, error model, and configuration for PactLens.
//!
//! This crate is the foundation depended on by all other PactLens crates.
//! It provides:
//! - [`PactLensError`]: the unified error type and its [`ErrorKind`] tags
//! - Domain types ([`Document`], [`AnalysisRecord`], [`ContractType`], [`Party`], [`ChatTurn`])
//! - Configuration ([`AppConfig`], [`Limits`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, InferenceConfig, Limits, RetrievalConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, validate_api_key,
};
pub use error::{ErrorKind, PactLensError, Result};
pub use types::{
    AnalysisRecord, CallerId, ChatRole, ChatTurn, Clauses, ConfidentialityClause, ContractType,
    Document, DocumentId, Extraction, IpClause, LawClause, LiabilityClause, Opportunity, Party,
    PaymentClause, RenewalClause, Risk, Severity, TerminationClause, FAVORABLE_THRESHOLD, hash_text,
    is_favorable,
};
