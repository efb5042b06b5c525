//! Error types for PactLens.
//!
//! Library crates use [`PactLensError`] via `thiserror`.
//! App crates (cli) wrap this with `color-eyre` for rich diagnostics.
//!
//! `Display` carries the diagnostic detail meant for logs. What a user gets to
//! see is [`PactLensError::user_message`], which never includes raw transport
//! or database error text.

use std::path::PathBuf;

/// Top-level error type for all PactLens operations.
#[derive(Debug, thiserror::Error)]
pub enum PactLensError {
    /// The caller may not access the requested document.
    #[error("unauthorized")]
    Unauthorized,

    /// A document, its extracted text, or an analysis record is missing.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// A terminal analysis record already exists for the document.
    #[error("analysis already exists")]
    AlreadyAnalyzed,

    /// The inference service judged the source text not to be a contract.
    #[error("domain rejection: {0}")]
    DomainRejection(String),

    /// The inference service returned an empty response.
    #[error("inference returned an empty response")]
    InferenceEmpty,

    /// The inference call itself failed (network, HTTP status, body decoding).
    #[error("inference transport error: {0}")]
    InferenceTransport(String),

    /// Inference output failed schema validation and has no safe fallback.
    #[error("invalid analysis: {0}")]
    InvalidAnalysis(String),

    /// Database or storage layer error.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// External retrieval failed. Never surfaced by the conversational stage.
    #[error("retrieval error: {0}")]
    Retrieval(String),

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Caller-supplied input failed validation.
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PactLensError>;

/// Taxonomy tag of a [`PactLensError`], independent of its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Unauthorized,
    NotFound,
    AlreadyAnalyzed,
    DomainRejection,
    InferenceEmpty,
    InferenceTransportFailure,
    InvalidAnalysis,
    PersistenceFailure,
    RetrievalFailure,
    Config,
    Io,
    Validation,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::NotFound => "not_found",
            Self::AlreadyAnalyzed => "already_analyzed",
            Self::DomainRejection => "domain_rejection",
            Self::InferenceEmpty => "inference_empty",
            Self::InferenceTransportFailure => "inference_transport_failure",
            Self::InvalidAnalysis => "invalid_analysis",
            Self::PersistenceFailure => "persistence_failure",
            Self::RetrievalFailure => "retrieval_failure",
            Self::Config => "config",
            Self::Io => "io",
            Self::Validation => "validation",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PactLensError {
    /// Create a not-found error for the named thing.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The taxonomy tag for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized => ErrorKind::Unauthorized,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyAnalyzed => ErrorKind::AlreadyAnalyzed,
            Self::DomainRejection(_) => ErrorKind::DomainRejection,
            Self::InferenceEmpty => ErrorKind::InferenceEmpty,
            Self::InferenceTransport(_) => ErrorKind::InferenceTransportFailure,
            Self::InvalidAnalysis(_) => ErrorKind::InvalidAnalysis,
            Self::Persistence(_) => ErrorKind::PersistenceFailure,
            Self::Retrieval(_) => ErrorKind::RetrievalFailure,
            Self::Config { .. } => ErrorKind::Config,
            Self::Io { .. } => ErrorKind::Io,
            Self::Validation { .. } => ErrorKind::Validation,
        }
    }

    /// Human-readable message safe to show to an end user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Unauthorized => "You do not have access to this contract.".into(),
            Self::NotFound { what } => format!("The requested {what} could not be found."),
            Self::AlreadyAnalyzed => "This contract has already been analyzed.".into(),
            // The rejection text is produced for the user by the model prompt contract.
            Self::DomainRejection(reason) if !reason.trim().is_empty() => reason.trim().to_string(),
            Self::DomainRejection(_) => {
                "This document does not appear to be a valid contract.".into()
            }
            Self::InferenceEmpty => "The analysis service returned no answer. Please try again.".into(),
            Self::InferenceTransport(_) => {
                "The analysis service is unavailable right now. Please try again later.".into()
            }
            Self::InvalidAnalysis(_) => {
                "The analysis could not be completed because the result was malformed.".into()
            }
            Self::Persistence(_) => "The result could not be saved. Please try again.".into(),
            Self::Retrieval(_) => "External information could not be retrieved.".into(),
            Self::Config { message } => format!("Configuration problem: {message}"),
            Self::Io { path, .. } => format!("Could not access {}.", path.display()),
            Self::Validation { message } => message.clone(),
        }
    }
}
