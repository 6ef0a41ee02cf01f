//! Static routing from job languages to destination queues.
//!
//! The set of supported languages is known ahead of time, so the table is
//! plain configuration data: one physical queue per language, the queue named
//! after the language itself.

use std::collections::HashMap;

/// Maps job languages to the destination queues their workers consume.
#[derive(Debug, Clone)]
pub struct RoutingTable {
    queues: HashMap<String, String>,
}

impl RoutingTable {
    /// Builds a table where each language routes to a queue of the same name.
    pub fn new<I, S>(languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let queues = languages
            .into_iter()
            .map(|language| {
                let language = language.into();
                (language.clone(), language)
            })
            .collect();
        Self { queues }
    }

    /// Returns the destination queue for a language, or `None` if the
    /// language is not supported.
    #[must_use]
    pub fn queue_for(&self, language: &str) -> Option<&str> {
        self.queues.get(language).map(String::as_str)
    }

    /// Returns `true` if the language has a destination queue.
    #[must_use]
    pub fn supports(&self, language: &str) -> bool {
        self.queues.contains_key(language)
    }

    /// Returns the number of routed languages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queues.len()
    }

    /// Returns `true` if no languages are routed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}

impl Default for RoutingTable {
    /// The languages with stock sandbox workers.
    fn default() -> Self {
        Self::new(["python", "javascript"])
    }
}
