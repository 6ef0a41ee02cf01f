//! Wire schemas for submitted jobs and their replies.
//!
//! Jobs travel as camelCase JSON bodies; replies carry their correlation
//! identifier in broker metadata and an opaque payload in the body, so
//! [`Reply`] is assembled from transport fields rather than deserialized.

use serde::{Deserialize, Serialize};

use crate::correlation::CorrelationId;

/// A unit of code to execute, tagged with its target language.
///
/// Immutable once submitted: the dispatcher owns it only for the duration of
/// publishing, and the language doubles as the destination queue name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Target language, e.g. `"python"`.
    pub language: String,

    /// Source code to execute.
    pub code: String,
}

impl Job {
    /// Creates a job for the given language and code.
    pub fn new(language: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            code: code.into(),
        }
    }

    /// Encodes the job as a JSON body for publishing.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Decodes a job from a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not a valid job document.
    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// A reply read off the reply queue.
///
/// The correlation identifier comes from the message's transport metadata,
/// not its body; the payload is whatever the worker produced (typically the
/// captured process output) and is never interpreted here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Identifier of the request this reply answers.
    pub correlation_id: CorrelationId,

    /// Raw reply payload.
    pub payload: Vec<u8>,
}
