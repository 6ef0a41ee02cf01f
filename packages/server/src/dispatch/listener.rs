//! Long-lived subscription on the reply queue.
//!
//! One listener per dispatcher. Each inbound message's correlation identifier
//! is read from transport metadata (never the body) and handed to the
//! registry; a reply with no waiting caller is discarded without fuss.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use execq_core::{CorrelationId, Reply};

use crate::broker::{Broker, BrokerError, Delivery};
use super::registry::CorrelationRegistry;

/// Handle to the spawned reply-listener task.
pub struct ReplyListener {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl ReplyListener {
    /// Subscribes to `queue` and spawns the listener task.
    ///
    /// Deliveries are processed one at a time in arrival order; arrival order
    /// carries no relation to request submission order.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription cannot be established.
    pub async fn start(
        broker: &dyn Broker,
        queue: &str,
        buffer: usize,
        registry: Arc<CorrelationRegistry>,
    ) -> Result<Self, BrokerError> {
        let mut deliveries = broker.consume(queue, buffer).await?;
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let queue_name = queue.to_string();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    delivery = deliveries.recv() => {
                        match delivery {
                            Some(delivery) => handle_delivery(&registry, delivery),
                            None => {
                                debug!(queue = %queue_name, "delivery channel closed, listener exiting");
                                break;
                            }
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
        });

        Ok(Self {
            shutdown_tx,
            handle,
        })
    }

    /// Signals shutdown and waits for the listener task to finish.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.handle.await;
    }
}

/// Routes one delivery into the registry.
///
/// Must never fail: a missing or unknown correlation identifier means the
/// waiter already timed out, the delivery is a duplicate, or the message was
/// misrouted. All of those are dropped silently.
fn handle_delivery(registry: &CorrelationRegistry, delivery: Delivery) {
    let Some(reply) = into_reply(delivery) else {
        debug!("discarding reply without correlation id");
        return;
    };

    let id = &reply.correlation_id;
    if registry.deliver(id, reply.payload) {
        trace!(correlation_id = %id, "reply matched pending request");
    } else {
        debug!(correlation_id = %id, "discarding stale reply");
    }
}

/// Lifts a transport delivery into a domain reply.
///
/// The correlation identifier lives in transport metadata; a delivery
/// without one cannot be a reply to anything.
fn into_reply(delivery: Delivery) -> Option<Reply> {
    let raw_id = delivery.correlation_id?;
    Some(Reply {
        correlation_id: CorrelationId::from(raw_id),
        payload: delivery.body,
    })
}
