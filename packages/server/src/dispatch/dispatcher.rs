//! The public entry point: submit a job, await its correlated reply.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use execq_core::{CorrelationId, Job};

use crate::broker::{Broker, PublishProperties};
use super::config::DispatcherConfig;
use super::error::DispatchError;
use super::listener::ReplyListener;
use super::registry::CorrelationRegistry;

/// Publishes jobs onto per-language queues and correlates the replies that
/// arrive on its private reply queue back to the callers that submitted them.
///
/// One dispatcher owns one reply queue, one listener, and one registry.
/// `submit` may be called from any number of tasks concurrently.
pub struct Dispatcher {
    broker: Arc<dyn Broker>,
    registry: Arc<CorrelationRegistry>,
    listener: Mutex<Option<ReplyListener>>,
    config: DispatcherConfig,
}

impl Dispatcher {
    /// Subscribes to the reply queue and returns a ready dispatcher.
    ///
    /// # Errors
    ///
    /// Returns an error if the reply-queue subscription cannot be
    /// established.
    pub async fn start(
        broker: Arc<dyn Broker>,
        config: DispatcherConfig,
    ) -> Result<Self, DispatchError> {
        let registry = Arc::new(CorrelationRegistry::new());
        let listener = ReplyListener::start(
            broker.as_ref(),
            &config.reply_queue,
            config.delivery_buffer,
            Arc::clone(&registry),
        )
        .await?;

        info!(reply_queue = %config.reply_queue, "dispatcher started");

        Ok(Self {
            broker,
            registry,
            listener: Mutex::new(Some(listener)),
            config,
        })
    }

    /// Submits a job and suspends until its reply arrives or the deadline
    /// elapses.
    ///
    /// The pending entry is registered before publishing, closing the race
    /// where a reply could arrive ahead of registration. Whichever of reply
    /// delivery and deadline expiry removes the entry first wins; either way
    /// the entry is gone exactly once when this returns.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::UnknownLanguage`] if the routing table has no queue
    ///   for the job's language; nothing is registered or published.
    /// - [`DispatchError::Encode`] if the job body cannot be serialized.
    /// - [`DispatchError::Transport`] if the publish fails; the registration
    ///   is rolled back.
    /// - [`DispatchError::Timeout`] if no reply arrives within the window.
    /// - [`DispatchError::ShuttingDown`] if the dispatcher is shut down
    ///   before or while the call is waiting.
    pub async fn submit(&self, job: &Job) -> Result<Vec<u8>, DispatchError> {
        let queue = self
            .config
            .routing
            .queue_for(&job.language)
            .ok_or_else(|| DispatchError::UnknownLanguage {
                language: job.language.clone(),
            })?
            .to_string();

        if self.listener.lock().is_none() {
            return Err(DispatchError::ShuttingDown);
        }

        let body = job.to_bytes()?;
        let timeout_ms = u64::try_from(self.config.timeout.as_millis()).unwrap_or(u64::MAX);

        let id = CorrelationId::generate();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.registry.register(id.clone(), reply_tx);

        let props = PublishProperties {
            reply_to: Some(self.config.reply_queue.clone()),
            correlation_id: Some(id.to_string()),
            expiration_ms: Some(timeout_ms),
        };
        if let Err(error) = self.broker.publish(&queue, &body, props).await {
            // Roll back so no partial registration lingers.
            self.registry.cancel(&id);
            return Err(error.into());
        }
        debug!(correlation_id = %id, queue = %queue, "job published");

        match tokio::time::timeout(self.config.timeout, reply_rx).await {
            Ok(Ok(payload)) => Ok(payload),
            // Sender dropped without firing: the registry was drained.
            Ok(Err(_closed)) => Err(DispatchError::ShuttingDown),
            Err(_elapsed) => {
                self.registry.cancel(&id);
                Err(DispatchError::Timeout { timeout_ms })
            }
        }
    }

    /// Number of requests currently awaiting replies.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.registry.pending_count()
    }

    /// Stops the reply listener and fails every pending wait with
    /// [`DispatchError::ShuttingDown`]. Subsequent submissions fail fast.
    pub async fn shutdown(&self) {
        let listener = self.listener.lock().take();
        if let Some(listener) = listener {
            listener.stop().await;
        }

        let drained = self.registry.drain();
        if drained > 0 {
            warn!(drained, "dispatcher shut down with requests still pending");
        }
        info!("dispatcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use execq_core::RoutingTable;

    use crate::broker::{Delivery, MemoryBroker};
    use super::*;

    fn test_config(timeout_ms: u64) -> DispatcherConfig {
        DispatcherConfig {
            routing: RoutingTable::new(["python", "go"]),
            timeout: Duration::from_millis(timeout_ms),
            ..DispatcherConfig::default()
        }
    }

    /// Stand-in worker: consumes a job queue and answers every job on its
    /// `reply_to` queue with the same correlation id.
    fn spawn_worker<F>(
        broker: Arc<MemoryBroker>,
        queue: &'static str,
        respond: F,
    ) -> tokio::task::JoinHandle<()>
    where
        F: Fn(&Delivery) -> Vec<u8> + Send + 'static,
    {
        tokio::spawn(async move {
            let mut deliveries = broker.consume(queue, 16).await.unwrap();
            while let Some(delivery) = deliveries.recv().await {
                let reply_to = delivery.reply_to.clone().expect("jobs carry reply_to");
                let props = PublishProperties {
                    correlation_id: delivery.correlation_id.clone(),
                    ..PublishProperties::default()
                };
                let body = respond(&delivery);
                broker.publish(&reply_to, &body, props).await.unwrap();
            }
        })
    }

    #[tokio::test]
    async fn round_trip_resolves_with_reply_payload() {
        let broker = Arc::new(MemoryBroker::new());
        let dispatcher = Dispatcher::start(broker.clone(), test_config(1000))
            .await
            .unwrap();

        spawn_worker(broker.clone(), "python", |delivery| {
            // The worker side sees the JSON body the dispatcher encoded.
            let job = Job::from_bytes(&delivery.body).unwrap();
            assert_eq!(job, Job::new("python", "print(1)"));
            b"1\n".to_vec()
        });

        let payload = dispatcher
            .submit(&Job::new("python", "print(1)"))
            .await
            .unwrap();
        assert_eq!(payload, b"1\n");
        assert_eq!(dispatcher.pending_count(), 0);
    }

    #[tokio::test]
    async fn concurrent_submissions_resolve_out_of_order() {
        let broker = Arc::new(MemoryBroker::new());
        let dispatcher = Dispatcher::start(broker.clone(), test_config(2000))
            .await
            .unwrap();

        // The python worker answers slowly, so the go reply overtakes it.
        let mut python_jobs = broker.consume("python", 16).await.unwrap();
        {
            let broker = broker.clone();
            tokio::spawn(async move {
                let job = python_jobs.recv().await.unwrap();
                tokio::time::sleep(Duration::from_millis(100)).await;
                let props = PublishProperties {
                    correlation_id: job.correlation_id.clone(),
                    ..PublishProperties::default()
                };
                broker
                    .publish(&job.reply_to.unwrap(), b"python-out", props)
                    .await
                    .unwrap();
            });
        }
        spawn_worker(broker.clone(), "go", |_| b"go-out".to_vec());

        let python_job = Job::new("python", "print(1)");
        let go_job = Job::new("go", "fmt.Println(1)");
        let (python, go) = tokio::join!(
            dispatcher.submit(&python_job),
            dispatcher.submit(&go_job),
        );

        assert_eq!(python.unwrap(), b"python-out");
        assert_eq!(go.unwrap(), b"go-out");
        assert_eq!(dispatcher.pending_count(), 0);
    }

    #[tokio::test]
    async fn timeout_rejects_and_leaves_no_entry() {
        let broker = Arc::new(MemoryBroker::new());
        let dispatcher = Dispatcher::start(broker.clone(), test_config(50))
            .await
            .unwrap();

        // No worker consumes the python queue; no reply will ever come.
        let err = dispatcher
            .submit(&Job::new("python", "print(1)"))
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Timeout { timeout_ms: 50 }));
        assert_eq!(dispatcher.pending_count(), 0);
    }

    #[tokio::test]
    async fn late_reply_after_timeout_is_dropped() {
        let broker = Arc::new(MemoryBroker::new());
        let dispatcher = Dispatcher::start(broker.clone(), test_config(50))
            .await
            .unwrap();

        // Capture the published job instead of answering it.
        let mut jobs = broker.consume("python", 16).await.unwrap();

        let err = dispatcher
            .submit(&Job::new("python", "print(1)"))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Timeout { .. }));
        assert_eq!(dispatcher.pending_count(), 0);

        // Worker answers after the caller already gave up.
        let stale = jobs.recv().await.unwrap();
        broker
            .publish(
                &stale.reply_to.unwrap(),
                b"too late",
                PublishProperties {
                    correlation_id: stale.correlation_id,
                    ..PublishProperties::default()
                },
            )
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(dispatcher.pending_count(), 0);

        // The listener is unaffected: a fresh submission still round-trips.
        let python2_job = Job::new("python", "print(2)");
        let (result, ()) = tokio::join!(
            dispatcher.submit(&python2_job),
            async {
                let job = jobs.recv().await.unwrap();
                broker
                    .publish(
                        &job.reply_to.clone().unwrap(),
                        b"2\n",
                        PublishProperties {
                            correlation_id: job.correlation_id.clone(),
                            ..PublishProperties::default()
                        },
                    )
                    .await
                    .unwrap();
            }
        );
        assert_eq!(result.unwrap(), b"2\n");
    }

    #[tokio::test]
    async fn unknown_language_registers_and_publishes_nothing() {
        let broker = Arc::new(MemoryBroker::new());
        let dispatcher = Dispatcher::start(broker.clone(), test_config(1000))
            .await
            .unwrap();

        let err = dispatcher
            .submit(&Job::new("cobol", "DISPLAY '1'."))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DispatchError::UnknownLanguage { ref language } if language == "cobol"
        ));
        assert_eq!(dispatcher.pending_count(), 0);
        assert_eq!(broker.published_count(), 0);
    }

    #[tokio::test]
    async fn publish_failure_rolls_back_registration() {
        let broker = Arc::new(MemoryBroker::new());
        let dispatcher = Dispatcher::start(broker.clone(), test_config(1000))
            .await
            .unwrap();

        broker.fail_publishes(true);
        let err = dispatcher
            .submit(&Job::new("python", "print(1)"))
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Transport(_)));
        assert_eq!(dispatcher.pending_count(), 0);
    }

    #[tokio::test]
    async fn shutdown_fails_pending_waits() {
        let broker = Arc::new(MemoryBroker::new());
        let dispatcher = Arc::new(
            Dispatcher::start(broker.clone(), test_config(30_000))
                .await
                .unwrap(),
        );

        let waiting = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move { dispatcher.submit(&Job::new("python", "print(1)")).await })
        };

        // Let the submission register before shutting down.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(dispatcher.pending_count(), 1);

        dispatcher.shutdown().await;

        let result = waiting.await.unwrap();
        assert!(matches!(result, Err(DispatchError::ShuttingDown)));
        assert_eq!(dispatcher.pending_count(), 0);
    }

    #[tokio::test]
    async fn submit_after_shutdown_fails_fast() {
        let broker = Arc::new(MemoryBroker::new());
        let dispatcher = Dispatcher::start(broker.clone(), test_config(30_000))
            .await
            .unwrap();

        dispatcher.shutdown().await;

        let err = dispatcher
            .submit(&Job::new("python", "print(1)"))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::ShuttingDown));
        assert_eq!(broker.published_count(), 0);
    }
}
