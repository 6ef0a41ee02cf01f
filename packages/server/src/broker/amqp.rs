//! AMQP 0.9.1 [`Broker`] implementation over `lapin`.
//!
//! Connection management, channel multiplexing, and the wire protocol all
//! belong to `lapin`; this module only maps [`PublishProperties`] onto AMQP
//! basic properties and adapts a `lapin` consumer into the delivery channel
//! the listener expects.

use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::options::{BasicConsumeOptions, BasicPublishOptions, QueueDeclareOptions};
use lapin::types::{FieldTable, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{Broker, BrokerError, Delivery, PublishProperties};

/// Broker transport over a single AMQP channel.
///
/// `lapin` channels support concurrent publishes from any task, so one
/// channel serves all dispatcher traffic.
pub struct AmqpBroker {
    channel: Channel,
}

impl AmqpBroker {
    /// Connects to the broker at `uri` (e.g. `amqp://localhost:5672`) and
    /// opens a channel.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Connect`] if the connection or channel cannot
    /// be established.
    pub async fn connect(uri: &str) -> Result<Self, BrokerError> {
        let connection = Connection::connect(uri, ConnectionProperties::default())
            .await
            .map_err(|e| BrokerError::Connect { source: e.into() })?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| BrokerError::Connect { source: e.into() })?;
        debug!(uri, "connected to AMQP broker");
        Ok(Self { channel })
    }

    /// Wraps an already-open channel.
    #[must_use]
    pub fn from_channel(channel: Channel) -> Self {
        Self { channel }
    }
}

/// Maps transport metadata onto AMQP basic properties.
///
/// Per-message expiration is an AMQP string holding the TTL in milliseconds.
fn amqp_properties(props: &PublishProperties) -> BasicProperties {
    let mut basic = BasicProperties::default();
    if let Some(reply_to) = &props.reply_to {
        basic = basic.with_reply_to(ShortString::from(reply_to.clone()));
    }
    if let Some(correlation_id) = &props.correlation_id {
        basic = basic.with_correlation_id(ShortString::from(correlation_id.clone()));
    }
    if let Some(expiration_ms) = props.expiration_ms {
        basic = basic.with_expiration(ShortString::from(expiration_ms.to_string()));
    }
    basic
}

#[async_trait]
impl Broker for AmqpBroker {
    async fn publish(
        &self,
        queue: &str,
        body: &[u8],
        props: PublishProperties,
    ) -> Result<(), BrokerError> {
        self.channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                body,
                amqp_properties(&props),
            )
            .await
            .map_err(|e| BrokerError::Publish {
                queue: queue.to_string(),
                source: e.into(),
            })?
            .await
            .map_err(|e| BrokerError::Publish {
                queue: queue.to_string(),
                source: e.into(),
            })?;
        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
        buffer: usize,
    ) -> Result<mpsc::Receiver<Delivery>, BrokerError> {
        self.channel
            .queue_declare(queue, QueueDeclareOptions::default(), FieldTable::default())
            .await
            .map_err(|e| BrokerError::Consume {
                queue: queue.to_string(),
                source: e.into(),
            })?;

        // Auto-ack: replies with no waiting caller are discarded, never
        // redelivered, so there is nothing to nack.
        let options = BasicConsumeOptions {
            no_ack: true,
            ..BasicConsumeOptions::default()
        };
        let mut consumer = self
            .channel
            .basic_consume(queue, "", options, FieldTable::default())
            .await
            .map_err(|e| BrokerError::Consume {
                queue: queue.to_string(),
                source: e.into(),
            })?;

        let (tx, rx) = mpsc::channel(buffer);
        let queue_name = queue.to_string();
        tokio::spawn(async move {
            while let Some(attempt) = consumer.next().await {
                let message = match attempt {
                    Ok(message) => message,
                    Err(error) => {
                        warn!(queue = %queue_name, %error, "consumer stream error");
                        continue;
                    }
                };
                let delivery = Delivery {
                    correlation_id: message
                        .properties
                        .correlation_id()
                        .as_ref()
                        .map(|s| s.as_str().to_string()),
                    reply_to: message
                        .properties
                        .reply_to()
                        .as_ref()
                        .map(|s| s.as_str().to_string()),
                    body: message.data,
                };
                if tx.send(delivery).await.is_err() {
                    // Receiver side went away; drop the subscription.
                    break;
                }
            }
            debug!(queue = %queue_name, "consumer stream ended");
        });

        Ok(rx)
    }
}
