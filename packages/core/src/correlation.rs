//! Correlation identifiers linking a submitted job to its eventual reply.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque token correlating a request with its asynchronous reply.
///
/// Minted fresh for every submitted job via [`CorrelationId::generate`],
/// which renders a UUIDv4 as text. The receive path reconstructs ids from
/// transport metadata strings, so the type also converts from borrowed and
/// owned strings.
///
/// Uniqueness holds across all concurrently outstanding requests; an id is
/// only ever observed again after its original request has been resolved,
/// timed out, or abandoned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Mints a fresh, globally-unique identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice, e.g. for broker metadata.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CorrelationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
