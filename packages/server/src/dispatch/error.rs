//! Dispatch error taxonomy.

use crate::broker::BrokerError;

/// Failures surfaced to callers of `Dispatcher::submit`.
///
/// A reply with no waiting caller is not an error anywhere in this taxonomy:
/// the listener discards it silently.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("no destination queue for language '{language}'")]
    UnknownLanguage { language: String },
    #[error("job could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("no reply within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("broker transport failure: {0}")]
    Transport(#[from] BrokerError),
    #[error("dispatcher is shutting down")]
    ShuttingDown,
}
