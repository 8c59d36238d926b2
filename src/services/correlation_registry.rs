use dashmap::DashMap;
use futures_util::StreamExt;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

use async_nats::jetstream::consumer::pull;

use crate::messaging::envelopes::{AuditCreatedAck, AuditFailedAck};
use crate::messaging::stream_client::{NatsStreamClient, StreamError};
use crate::messaging::subjects::{
    AUDIT_LOG_CREATED, AUDIT_LOG_FAILED, DURABLE_REGISTRY_CREATED, DURABLE_REGISTRY_FAILED,
};

/// One-shot waiter handed to the saga. The coordinator registers it BEFORE
/// publishing the audit request, so an ack can never arrive without a waiter
/// to receive it.
pub struct AckWaiter {
    correlation_id: String,
    receiver: oneshot::Receiver<bool>,
}

/// Process-wide map from correlation id to the saga waiting on it. Two shared
/// subscriptions (ack + fail) multiplex every in-flight saga; the listener
/// tasks only do a map lookup and a channel send, never I/O.
#[derive(Default)]
pub struct CorrelationRegistry {
    waiters: DashMap<String, oneshot::Sender<bool>>,
}

impl CorrelationRegistry {
    pub fn new() -> Self {
        Self {
            waiters: DashMap::new(),
        }
    }

    /// Registers a waiter. A duplicate correlation id overwrites the earlier
    /// waiter, whose saga then observes failure semantics.
    pub fn register(&self, correlation_id: &str) -> AckWaiter {
        let (sender, receiver) = oneshot::channel();
        if self
            .waiters
            .insert(correlation_id.to_string(), sender)
            .is_some()
        {
            warn!(
                "Waiter for correlation id {} was overwritten",
                correlation_id
            );
        }
        AckWaiter {
            correlation_id: correlation_id.to_string(),
            receiver,
        }
    }

    /// Waits for ack (true) or failure (false), bounded by `timeout`. On
    /// timeout the entry is removed so a late ack is dropped as "no waiter".
    pub async fn await_ack(&self, waiter: AckWaiter, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, waiter.receiver).await {
            Ok(Ok(outcome)) => outcome,
            // Sender gone: overwritten or shut down. The entry no longer
            // belongs to this waiter, so leave the map alone.
            Ok(Err(_)) => false,
            Err(_elapsed) => {
                self.waiters.remove(&waiter.correlation_id);
                debug!(
                    "Waiter for correlation id {} timed out",
                    waiter.correlation_id
                );
                false
            }
        }
    }

    /// Resolves the waiter for a correlation id. Returns false when no waiter
    /// exists (late or duplicate message) — the message is dropped.
    pub fn resolve(&self, correlation_id: &str, outcome: bool) -> bool {
        match self.waiters.remove(correlation_id) {
            Some((_, sender)) => {
                let _ = sender.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Shutdown path: every in-flight saga observes failure and rolls back.
    pub fn fail_all(&self) {
        let pending: Vec<String> = self.waiters.iter().map(|e| e.key().clone()).collect();
        for correlation_id in pending {
            self.resolve(&correlation_id, false);
        }
    }

    pub fn pending_count(&self) -> usize {
        self.waiters.len()
    }

    /// Starts both background consumers. Must complete before any saga
    /// publishes; both subscriptions are created before this returns.
    pub async fn start_listeners(
        registry: &Arc<Self>,
        stream: &Arc<NatsStreamClient>,
    ) -> Result<(), StreamError> {
        let created = stream
            .durable_subscription(AUDIT_LOG_CREATED, DURABLE_REGISTRY_CREATED)
            .await?;
        let failed = stream
            .durable_subscription(AUDIT_LOG_FAILED, DURABLE_REGISTRY_FAILED)
            .await?;

        tokio::spawn(Self::created_loop(Arc::clone(registry), created));
        tokio::spawn(Self::failed_loop(Arc::clone(registry), failed));
        log::info!("Audit ack listeners started");
        Ok(())
    }

    async fn created_loop(registry: Arc<Self>, mut messages: pull::Stream) {
        while let Some(next) = messages.next().await {
            let message = match next {
                Ok(message) => message,
                Err(e) => {
                    warn!("Ack subscription error: {}", e);
                    continue;
                }
            };

            match serde_json::from_slice::<AuditCreatedAck>(&message.payload) {
                Ok(ack) => {
                    if registry.resolve(&ack.correlation_id, true) {
                        debug!(
                            "Resolved saga {} with audit log {}",
                            ack.correlation_id, ack.audit_log_id
                        );
                    } else {
                        debug!("Dropping late ack for correlation id {}", ack.correlation_id);
                    }
                }
                Err(e) => warn!("Ignoring malformed ack payload: {}", e),
            }

            if let Err(e) = message.ack().await {
                warn!("Failed to acknowledge ack message: {}", e);
            }
        }
        warn!("Ack listener stream ended");
    }

    async fn failed_loop(registry: Arc<Self>, mut messages: pull::Stream) {
        while let Some(next) = messages.next().await {
            let message = match next {
                Ok(message) => message,
                Err(e) => {
                    warn!("Failure subscription error: {}", e);
                    continue;
                }
            };

            match serde_json::from_slice::<AuditFailedAck>(&message.payload) {
                Ok(failure) => {
                    if registry.resolve(&failure.correlation_id, false) {
                        debug!(
                            "Saga {} failed remotely: {}",
                            failure.correlation_id, failure.error
                        );
                    } else {
                        debug!(
                            "Dropping late failure for correlation id {}",
                            failure.correlation_id
                        );
                    }
                }
                Err(e) => warn!("Ignoring malformed failure payload: {}", e),
            }

            if let Err(e) = message.ack().await {
                warn!("Failed to acknowledge failure message: {}", e);
            }
        }
        warn!("Failure listener stream ended");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ack_resolves_waiter_true() {
        let registry = CorrelationRegistry::new();
        let waiter = registry.register("corr-1");
        assert!(registry.resolve("corr-1", true));
        assert!(registry.await_ack(waiter, Duration::from_secs(1)).await);
        assert_eq!(registry.pending_count(), 0);
    }

    #[tokio::test]
    async fn failure_resolves_waiter_false() {
        let registry = CorrelationRegistry::new();
        let waiter = registry.register("corr-2");
        assert!(registry.resolve("corr-2", false));
        assert!(!registry.await_ack(waiter, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn timeout_removes_waiter_and_resolves_false() {
        let registry = CorrelationRegistry::new();
        let waiter = registry.register("corr-3");
        assert!(!registry.await_ack(waiter, Duration::from_millis(10)).await);
        assert_eq!(registry.pending_count(), 0);
        // The late ack finds no waiter and is dropped.
        assert!(!registry.resolve("corr-3", true));
    }

    #[tokio::test]
    async fn unknown_correlation_id_is_dropped() {
        let registry = CorrelationRegistry::new();
        assert!(!registry.resolve("never-registered", true));
    }

    #[tokio::test]
    async fn duplicate_register_overwrites_earlier_waiter() {
        let registry = CorrelationRegistry::new();
        let first = registry.register("corr-4");
        let second = registry.register("corr-4");
        assert_eq!(registry.pending_count(), 1);

        // The earlier saga observes failure; the later one gets the ack.
        assert!(registry.resolve("corr-4", true));
        assert!(!registry.await_ack(first, Duration::from_millis(50)).await);
        assert!(registry.await_ack(second, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn fail_all_flushes_every_pending_saga() {
        let registry = CorrelationRegistry::new();
        let a = registry.register("a");
        let b = registry.register("b");
        registry.fail_all();
        assert_eq!(registry.pending_count(), 0);
        assert!(!registry.await_ack(a, Duration::from_secs(1)).await);
        assert!(!registry.await_ack(b, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn resolution_after_spawned_delay_wakes_waiter() {
        let registry = Arc::new(CorrelationRegistry::new());
        let waiter = registry.register("corr-5");

        let resolver = Arc::clone(&registry);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            resolver.resolve("corr-5", true);
        });

        assert!(registry.await_ack(waiter, Duration::from_secs(2)).await);
    }
}
