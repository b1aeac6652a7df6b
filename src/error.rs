//! Error types for the deposit relayer
//!
//! Errors are split by the level at which they are handled:
//!
//! - [`ConfigError`] - startup, never recovered
//! - [`FetchError`] - fetch level, consumes the listener's retry budget
//! - [`TranslateError`] / [`DispatchError`] - record level, logged and skipped
//! - [`ListenerError`] - loop level, reported once to the supervisor

use thiserror::Error;

use crate::types::ChainId;

/// Configuration could not be built
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to parse {0}: option is required and must be non-empty")]
    MissingOption(&'static str),

    #[error("unknown options encountered: {0:?}")]
    UnknownOptions(Vec<String>),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// Failure to obtain a batch of deposits from the upstream source
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("malformed deposit response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("deposit source unavailable: {0}")]
    Unavailable(String),
}

/// A single deposit record failed validation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TranslateError {
    #[error("{field} is not a base-10 unsigned integer: {value:?}")]
    MalformedAmount { field: &'static str, value: String },

    #[error("{field} is not valid hex: {value:?} ({reason})")]
    MalformedHex {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("{field} is not a valid identifier: {value:?} ({reason})")]
    MalformedIdentifier {
        field: &'static str,
        value: String,
        reason: String,
    },
}

impl TranslateError {
    /// Short label used for metrics
    pub fn reason(&self) -> &'static str {
        match self {
            TranslateError::MalformedAmount { .. } => "malformed_amount",
            TranslateError::MalformedHex { .. } => "malformed_hex",
            TranslateError::MalformedIdentifier { .. } => "malformed_identifier",
        }
    }
}

/// The router did not accept a message
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("unknown destination chain {0}")]
    UnknownDestination(ChainId),

    #[error("writer for chain {0} is closed")]
    WriterClosed(ChainId),

    #[error("router unavailable: {0}")]
    Unavailable(String),
}

impl DispatchError {
    /// Whether the failure affects the whole batch rather than one message.
    ///
    /// Only an unavailable router is batch level; everything else is scoped
    /// to the message that triggered it.
    pub fn is_batch_level(&self) -> bool {
        matches!(self, DispatchError::Unavailable(_))
    }
}

/// Unrecoverable listener failure, surfaced to the owning supervisor
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ListenerError {
    #[error("listener deposit polling failed after {attempts} attempts: {last_error}")]
    FatalPolling { attempts: u32, last_error: String },
}
