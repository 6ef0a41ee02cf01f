//! In-process [`Broker`] implementation.
//!
//! Routes published messages straight to the registered consumer for the
//! queue, buffering anything published before a consumer subscribes. Used by
//! the test suite and for embedding the dispatcher without a real broker.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{Broker, BrokerError, Delivery, PublishProperties};

/// In-memory broker backed by per-queue channels.
///
/// One consumer per queue; a second `consume` call replaces the first.
/// Expiration metadata is accepted and ignored — nothing expires in memory.
#[derive(Debug, Default)]
pub struct MemoryBroker {
    consumers: DashMap<String, mpsc::Sender<Delivery>>,
    backlog: Mutex<HashMap<String, VecDeque<Delivery>>>,
    fail_publishes: AtomicBool,
    published: AtomicU64,
}

impl MemoryBroker {
    /// Creates an empty broker with no queues or consumers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent publish fail with a transport error.
    ///
    /// Exercises the dispatcher's rollback path without a real broker outage.
    pub fn fail_publishes(&self, fail: bool) {
        self.fail_publishes.store(fail, Ordering::Relaxed);
    }

    /// Number of messages accepted by `publish` so far.
    #[must_use]
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn publish(
        &self,
        queue: &str,
        body: &[u8],
        props: PublishProperties,
    ) -> Result<(), BrokerError> {
        if self.fail_publishes.load(Ordering::Relaxed) {
            return Err(BrokerError::Publish {
                queue: queue.to_string(),
                source: anyhow::anyhow!("simulated publish failure"),
            });
        }

        let delivery = Delivery {
            correlation_id: props.correlation_id,
            reply_to: props.reply_to,
            body: body.to_vec(),
        };

        // Clone the sender out of the map so no guard is held across await.
        let consumer = self
            .consumers
            .get(queue)
            .map(|entry| entry.value().clone());

        match consumer {
            Some(tx) => tx
                .send(delivery)
                .await
                .map_err(|_| BrokerError::ConnectionClosed)?,
            None => self
                .backlog
                .lock()
                .entry(queue.to_string())
                .or_default()
                .push_back(delivery),
        }

        self.published.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
        buffer: usize,
    ) -> Result<mpsc::Receiver<Delivery>, BrokerError> {
        let (tx, rx) = mpsc::channel(buffer);
        self.consumers.insert(queue.to_string(), tx.clone());

        let buffered = self
            .backlog
            .lock()
            .remove(queue)
            .unwrap_or_default();
        for delivery in buffered {
            tx.send(delivery)
                .await
                .map_err(|_| BrokerError::ConnectionClosed)?;
        }

        Ok(rx)
    }
}
