//! Broker transport abstraction.
//!
//! The dispatcher talks to the message broker exclusively through the
//! [`Broker`] trait: publish a body onto a named queue with broker-level
//! metadata, or consume a queue as a stream of deliveries. Implementations:
//! AMQP ([`AmqpBroker`]), in-memory ([`MemoryBroker`], tests and embedding).

pub mod amqp;
pub mod memory;

pub use amqp::AmqpBroker;
pub use memory::MemoryBroker;

use async_trait::async_trait;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Message types
// ---------------------------------------------------------------------------

/// Broker-level metadata attached to a published message.
///
/// All fields are optional; the dispatcher sets `reply_to` and
/// `correlation_id` on every job publish, and `expiration_ms` to its timeout
/// window so the broker may drop messages nobody will wait for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishProperties {
    /// Queue the consumer should address its reply to.
    pub reply_to: Option<String>,
    /// Correlation identifier linking a reply back to its request.
    pub correlation_id: Option<String>,
    /// Per-message time-to-live in milliseconds.
    pub expiration_ms: Option<u64>,
}

/// A message handed to a consumer: transport metadata plus the raw body.
///
/// The correlation identifier travels in metadata, never in the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Correlation identifier from the message's transport metadata.
    pub correlation_id: Option<String>,
    /// Reply queue named by the publisher, if any.
    pub reply_to: Option<String>,
    /// Raw message body.
    pub body: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by the broker transport.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("broker connection closed")]
    ConnectionClosed,
    #[error("failed to connect to broker: {source}")]
    Connect {
        #[source]
        source: anyhow::Error,
    },
    #[error("publish to queue '{queue}' failed: {source}")]
    Publish {
        queue: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("consume on queue '{queue}' failed: {source}")]
    Consume {
        queue: String,
        #[source]
        source: anyhow::Error,
    },
}

// ---------------------------------------------------------------------------
// Broker trait
// ---------------------------------------------------------------------------

/// Pluggable broker transport.
///
/// Implementations must support concurrent `publish` calls from any task.
/// `consume` registers a long-lived subscription and hands back a bounded
/// channel; the consuming side processes deliveries one at a time in arrival
/// order, which is not guaranteed to match publish order across queues.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Publishes a message body onto the named queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be handed to the broker.
    async fn publish(
        &self,
        queue: &str,
        body: &[u8],
        props: PublishProperties,
    ) -> Result<(), BrokerError>;

    /// Subscribes to the named queue for the lifetime of the connection.
    ///
    /// Deliveries are buffered in a channel of the given capacity; a full
    /// channel applies backpressure to the broker side.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription cannot be established.
    async fn consume(
        &self,
        queue: &str,
        buffer: usize,
    ) -> Result<mpsc::Receiver<Delivery>, BrokerError>;
}
