use async_trait::async_trait;
use bytes::Bytes;
use sqlx::postgres::PgPoolOptions;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use transaction_platform::db::TransactionRepository;
use transaction_platform::error::AppError;
use transaction_platform::messaging::stream_client::{StreamError, StreamPublisher};
use transaction_platform::models::transaction::CreateTransactionRequest;
use transaction_platform::services::correlation_registry::CorrelationRegistry;
use transaction_platform::services::transaction_saga::{RequestContext, TransactionSagaService};

#[derive(Default)]
struct RecordingPublisher {
    published: Mutex<Vec<(String, Bytes)>>,
}

impl RecordingPublisher {
    fn subjects(&self) -> Vec<String> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|(subject, _)| subject.clone())
            .collect()
    }
}

#[async_trait]
impl StreamPublisher for RecordingPublisher {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), StreamError> {
        self.published
            .lock()
            .unwrap()
            .push((subject.to_string(), payload));
        Ok(())
    }
}

fn saga_with_unreachable_database() -> (TransactionSagaService, Arc<RecordingPublisher>, Arc<CorrelationRegistry>) {
    // A lazy pool defers connecting; the first acquire fails fast.
    let pool = PgPoolOptions::new()
        .acquire_timeout(Duration::from_millis(100))
        .connect_lazy("postgres://nobody@127.0.0.1:1/nowhere")
        .expect("lazy pool construction");

    let publisher = Arc::new(RecordingPublisher::default());
    let registry = Arc::new(CorrelationRegistry::new());
    let saga = TransactionSagaService::new(
        TransactionRepository::new(pool),
        Arc::clone(&registry),
        Arc::clone(&publisher) as Arc<dyn StreamPublisher>,
        "transaction-service".to_string(),
        Duration::from_secs(10),
    );
    (saga, publisher, registry)
}

fn valid_request() -> CreateTransactionRequest {
    serde_json::from_str(r#"{"amount": 100.50, "currency": "USD", "description": "Test"}"#).unwrap()
}

/// Invalid input never reaches the database or the stream.
#[tokio::test]
async fn validation_failure_publishes_nothing() {
    let (saga, publisher, registry) = saga_with_unreachable_database();

    let request: CreateTransactionRequest =
        serde_json::from_str(r#"{"amount": -100, "currency": "USD"}"#).unwrap();
    let result = saga
        .create_transaction(Uuid::new_v4(), request, RequestContext::default())
        .await;

    assert!(matches!(result, Err(AppError::Validation(_))));
    assert!(publisher.subjects().is_empty());
    assert_eq!(registry.pending_count(), 0);
}

/// A local database failure aborts the saga before any audit request is
/// published, so there is nothing to compensate.
#[tokio::test]
async fn local_database_failure_publishes_nothing() {
    let (saga, publisher, registry) = saga_with_unreachable_database();

    let result = saga
        .create_transaction(Uuid::new_v4(), valid_request(), RequestContext::default())
        .await;

    assert!(matches!(result, Err(AppError::Database(_))));
    assert!(publisher.subjects().is_empty());
    assert_eq!(registry.pending_count(), 0);
}

/// Update and delete collapse unknown ids to NotFound without touching the
/// stream.
#[tokio::test]
async fn update_on_unreachable_database_surfaces_database_error() {
    let (saga, publisher, _registry) = saga_with_unreachable_database();

    let patch = serde_json::from_str(r#"{"status": "COMPLETED"}"#).unwrap();
    let result = saga
        .update_transaction(
            Uuid::new_v4(),
            Uuid::new_v4(),
            patch,
            RequestContext::default(),
        )
        .await;

    assert!(matches!(result, Err(AppError::Database(_))));
    assert!(publisher.subjects().is_empty());
}
