//! Dispatcher configuration.

use std::time::Duration;

use execq_core::RoutingTable;

/// Configuration for a [`Dispatcher`](super::Dispatcher) instance.
///
/// The reply queue is shared by all requests of one dispatcher and named
/// once at startup; deployments running several dispatchers against the same
/// broker should give each its own name.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Queue the reply listener consumes and workers address replies to.
    pub reply_queue: String,
    /// Language-to-queue routing table.
    pub routing: RoutingTable,
    /// Deadline applied uniformly to every submitted job.
    pub timeout: Duration,
    /// Capacity of the reply delivery channel.
    pub delivery_buffer: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            reply_queue: "replies".to_string(),
            routing: RoutingTable::default(),
            timeout: Duration::from_secs(30),
            delivery_buffer: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatcher_config_defaults() {
        let config = DispatcherConfig::default();
        assert_eq!(config.reply_queue, "replies");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.delivery_buffer, 256);
        assert!(config.routing.supports("python"));
    }
}
