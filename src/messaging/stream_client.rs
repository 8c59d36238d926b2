use async_trait::async_trait;
use bytes::Bytes;
use log::{info, warn};
use std::time::Duration;

use async_nats::jetstream::{
    self,
    consumer::pull,
    stream::{Config as StreamConfig, RetentionPolicy},
};
use async_nats::ConnectOptions;

use crate::config::BrokerConfig;
use crate::messaging::subjects::{STREAM_MAX_AGE_SECS, STREAM_NAME, STREAM_SUBJECTS};

/// Upper bound on waiting for the broker's persistence ack of a publish. A
/// slow ack surfaces as a publish failure and the saga rolls back.
const PUBLISH_ACK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("broker connection failed: {0}")]
    Connect(String),
    #[error("stream provisioning failed: {0}")]
    Provision(String),
    #[error("publish to '{subject}' failed: {reason}")]
    Publish { subject: String, reason: String },
    #[error("subscription on '{subject}' failed: {reason}")]
    Subscribe { subject: String, reason: String },
    #[error("broker shutdown failed: {0}")]
    Close(String),
}

/// Publish seam injected into the saga coordinator and the audit consumer so
/// tests can substitute a recording implementation.
#[async_trait]
pub trait StreamPublisher: Send + Sync {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), StreamError>;
}

/// Shared JetStream client: one connection per process, publishes
/// multiplexed, durable pull consumers for subscriptions.
pub struct NatsStreamClient {
    client: async_nats::Client,
    jetstream: jetstream::Context,
}

impl NatsStreamClient {
    /// Connects with infinite reconnect and provisions the durable stream.
    pub async fn connect(config: &BrokerConfig, service_name: &str) -> Result<Self, StreamError> {
        let client = ConnectOptions::new()
            .name(service_name.to_string())
            .retry_on_initial_connect()
            .event_callback(|event| async move {
                info!("NATS client event: {}", event);
            })
            .connect(&config.url)
            .await
            .map_err(|e| StreamError::Connect(e.to_string()))?;

        let jetstream = jetstream::new(client.clone());
        let stream_client = Self { client, jetstream };
        stream_client.ensure_stream().await?;
        Ok(stream_client)
    }

    /// Creates the AUDIT stream if missing. Retention keeps messages for the
    /// configured window and redelivers anything unacknowledged.
    async fn ensure_stream(&self) -> Result<(), StreamError> {
        self.jetstream
            .get_or_create_stream(StreamConfig {
                name: STREAM_NAME.to_string(),
                subjects: vec![STREAM_SUBJECTS.to_string()],
                max_age: Duration::from_secs(STREAM_MAX_AGE_SECS),
                retention: RetentionPolicy::Limits,
                ..Default::default()
            })
            .await
            .map_err(|e| StreamError::Provision(e.to_string()))?;
        info!("Durable stream '{}' ready", STREAM_NAME);
        Ok(())
    }

    /// Durable pull subscription on a single subject. Reconnecting processes
    /// resume from the consumer's last acknowledged message.
    pub async fn durable_subscription(
        &self,
        subject: &str,
        durable: &str,
    ) -> Result<pull::Stream, StreamError> {
        let stream = self
            .jetstream
            .get_stream(STREAM_NAME)
            .await
            .map_err(|e| StreamError::Subscribe {
                subject: subject.to_string(),
                reason: e.to_string(),
            })?;

        let consumer = stream
            .get_or_create_consumer(
                durable,
                pull::Config {
                    durable_name: Some(durable.to_string()),
                    filter_subject: subject.to_string(),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| StreamError::Subscribe {
                subject: subject.to_string(),
                reason: e.to_string(),
            })?;

        consumer
            .messages()
            .await
            .map_err(|e| StreamError::Subscribe {
                subject: subject.to_string(),
                reason: e.to_string(),
            })
    }

    /// Drains the connection so in-flight acks get delivered before exit.
    pub async fn close(&self) -> Result<(), StreamError> {
        self.client
            .drain()
            .await
            .map_err(|e| StreamError::Close(e.to_string()))
    }
}

#[async_trait]
impl StreamPublisher for NatsStreamClient {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), StreamError> {
        let ack_future = self
            .jetstream
            .publish(subject.to_string(), payload)
            .await
            .map_err(|e| StreamError::Publish {
                subject: subject.to_string(),
                reason: e.to_string(),
            })?;

        match tokio::time::timeout(PUBLISH_ACK_TIMEOUT, ack_future).await {
            Ok(Ok(_ack)) => Ok(()),
            Ok(Err(e)) => Err(StreamError::Publish {
                subject: subject.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => {
                warn!("Timed out waiting for stream ack on '{}'", subject);
                Err(StreamError::Publish {
                    subject: subject.to_string(),
                    reason: "stream ack timed out".to_string(),
                })
            }
        }
    }
}
