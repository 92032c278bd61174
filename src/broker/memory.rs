//! In-memory broker
//!
//! A broker that lives entirely inside the process. It implements the full
//! outbound capability for every provider, enforces batch limits, can be
//! scripted to fail, and records every delivery and every open handle. The
//! CLI `simulate` command and the test suite publish against it.
//!
//! Sends run under a [`RetryManager`] built from the retry policy the client
//! was opened with, so scripted transient failures are retried exactly as the
//! translated policy says.

use crate::broker::{
    BrokerClient, BrokerConnector, BrokerEndpoint, BrokerError, BrokerErrorKind, BrokerSender,
    MessageBatch, Payload,
};
use crate::core::retry::{RetryManager, RetryPolicy, RetrySchedule};
use crate::security::credentials::endpoint_label;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// Default maximum batch size, matching the Service Bus standard tier
pub const DEFAULT_MAX_BATCH_BYTES: usize = 256 * 1024;

/// Limits a batch must stay within
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_bytes: usize,
    pub max_messages: Option<usize>,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BATCH_BYTES,
            max_messages: None,
        }
    }
}

/// One successful broker call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub entity_path: String,
    pub payloads: Vec<Payload>,
    /// Sent through `send_batch` rather than `send`
    pub batched: bool,
    pub delivered_at: DateTime<Utc>,
}

impl Delivery {
    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    /// Payload bodies decoded as JSON, `Null` for bodies that are not JSON
    pub fn json_bodies(&self) -> Vec<serde_json::Value> {
        self.payloads
            .iter()
            .map(|payload| serde_json::from_slice(&payload.body).unwrap_or_default())
            .collect()
    }
}

/// A client opened against the broker
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionRecord {
    /// Endpoint with secrets masked
    pub endpoint: String,
    pub schedule: RetrySchedule,
}

/// Clients and senders currently open
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandleCounts {
    pub clients: usize,
    pub senders: usize,
}

#[derive(Debug, Default)]
struct BrokerState {
    deliveries: Vec<Delivery>,
    connections: Vec<ConnectionRecord>,
    scripted_failures: VecDeque<BrokerErrorKind>,
    send_attempts: usize,
    handles: HandleCounts,
}

/// In-process broker shared by every client opened on it
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    limits: BatchLimits,
    send_delay: Option<Duration>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(mut self, limits: BatchLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Delay every send attempt, simulating network latency
    pub fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = Some(delay);
        self
    }

    pub fn limits(&self) -> BatchLimits {
        self.limits
    }

    /// Make the next `times` send attempts fail with `kind`
    pub async fn fail_next(&self, kind: BrokerErrorKind, times: usize) {
        let mut state = self.state.lock().await;
        state.scripted_failures.extend(std::iter::repeat_n(kind, times));
    }

    pub async fn deliveries(&self) -> Vec<Delivery> {
        self.state.lock().await.deliveries.clone()
    }

    pub async fn connections(&self) -> Vec<ConnectionRecord> {
        self.state.lock().await.connections.clone()
    }

    /// Send attempts made so far, failed ones included
    pub async fn send_attempts(&self) -> usize {
        self.state.lock().await.send_attempts
    }

    pub async fn open_handles(&self) -> HandleCounts {
        self.state.lock().await.handles
    }

    async fn deliver(
        &self,
        entity_path: &str,
        payloads: Vec<Payload>,
        batched: bool,
    ) -> Result<(), BrokerError> {
        if let Some(delay) = self.send_delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().await;
        state.send_attempts += 1;

        if let Some(kind) = state.scripted_failures.pop_front() {
            return Err(BrokerError::new(kind, format!("scripted failure for {entity_path}")));
        }

        state.deliveries.push(Delivery {
            entity_path: entity_path.to_string(),
            payloads,
            batched,
            delivered_at: Utc::now(),
        });
        Ok(())
    }
}

#[async_trait]
impl<P> BrokerConnector<P> for MemoryBroker
where
    P: RetryPolicy + Send + Sync,
{
    async fn connect(
        &self,
        endpoint: &BrokerEndpoint,
        policy: &P,
    ) -> Result<Box<dyn BrokerClient>, BrokerError> {
        let schedule = policy.schedule();

        let mut state = self.state.lock().await;
        state.connections.push(ConnectionRecord {
            endpoint: endpoint_label(endpoint),
            schedule: schedule.clone(),
        });
        state.handles.clients += 1;

        Ok(Box::new(MemoryClient {
            broker: self.clone(),
            retry: RetryManager::new(schedule),
            closed: AtomicBool::new(false),
        }))
    }
}

struct MemoryClient {
    broker: MemoryBroker,
    retry: RetryManager,
    closed: AtomicBool,
}

#[async_trait]
impl BrokerClient for MemoryClient {
    async fn create_sender(&self, topic: &str) -> Result<Box<dyn BrokerSender>, BrokerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::new(BrokerErrorKind::Closed, "client is closed"));
        }

        self.broker.state.lock().await.handles.senders += 1;

        Ok(Box::new(MemorySender {
            broker: self.broker.clone(),
            entity_path: topic.to_string(),
            retry: self.retry.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    async fn close(&self) -> Result<(), BrokerError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.broker.state.lock().await.handles.clients -= 1;
        }
        Ok(())
    }
}

struct MemorySender {
    broker: MemoryBroker,
    entity_path: String,
    retry: RetryManager,
    closed: AtomicBool,
}

impl MemorySender {
    fn ensure_open(&self) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::new(
                BrokerErrorKind::Closed,
                format!("sender for {} is closed", self.entity_path),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl BrokerSender for MemorySender {
    fn entity_path(&self) -> &str {
        &self.entity_path
    }

    async fn create_batch(&self) -> Result<Box<dyn MessageBatch>, BrokerError> {
        self.ensure_open()?;
        Ok(Box::new(MemoryBatch::new(self.broker.limits)))
    }

    async fn send(&self, payload: &Payload) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let broker = &self.broker;
        let entity_path = self.entity_path.as_str();
        self.retry
            .retry(|| broker.deliver(entity_path, vec![payload.clone()], false))
            .await
    }

    async fn send_batch(&self, batch: Box<dyn MessageBatch>) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let broker = &self.broker;
        let entity_path = self.entity_path.as_str();
        let payloads = batch.payloads().to_vec();
        self.retry
            .retry(|| broker.deliver(entity_path, payloads.clone(), true))
            .await
    }

    async fn close(&self) -> Result<(), BrokerError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.broker.state.lock().await.handles.senders -= 1;
        }
        Ok(())
    }
}

/// Batch bounded by [`BatchLimits`]
#[derive(Debug)]
pub struct MemoryBatch {
    limits: BatchLimits,
    payloads: Vec<Payload>,
    size: usize,
}

impl MemoryBatch {
    pub fn new(limits: BatchLimits) -> Self {
        Self {
            limits,
            payloads: Vec::new(),
            size: 0,
        }
    }
}

impl MessageBatch for MemoryBatch {
    fn try_add(&mut self, payload: &Payload) -> bool {
        if let Some(max_messages) = self.limits.max_messages {
            if self.payloads.len() >= max_messages {
                return false;
            }
        }
        if self.size + payload.size() > self.limits.max_bytes {
            return false;
        }
        self.size += payload.size();
        self.payloads.push(payload.clone());
        true
    }

    fn len(&self) -> usize {
        self.payloads.len()
    }

    fn size_in_bytes(&self) -> usize {
        self.size
    }

    fn max_size_in_bytes(&self) -> usize {
        self.limits.max_bytes
    }

    fn payloads(&self) -> &[Payload] {
        &self.payloads
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FastRetry(u32);

    impl RetryPolicy for FastRetry {
        fn schedule(&self) -> RetrySchedule {
            RetrySchedule {
                max_attempts: self.0,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                ..RetrySchedule::default()
            }
        }
    }

    fn project() -> BrokerEndpoint {
        BrokerEndpoint::Project {
            project_id: "demo".to_string(),
        }
    }

    fn payload(body: &str) -> Payload {
        Payload::new("text/plain", body.as_bytes().to_vec())
    }

    #[test]
    fn test_limits_default_and_override() {
        assert_eq!(MemoryBroker::new().limits(), BatchLimits::default());
        assert_eq!(MemoryBroker::new().limits().max_bytes, DEFAULT_MAX_BATCH_BYTES);

        let limits = BatchLimits {
            max_bytes: 64,
            max_messages: Some(2),
        };
        assert_eq!(MemoryBroker::new().with_limits(limits).limits(), limits);
    }

    #[test]
    fn test_batch_respects_byte_limit() {
        let mut batch = MemoryBatch::new(BatchLimits {
            max_bytes: 10,
            max_messages: None,
        });

        assert!(batch.try_add(&payload("12345")));
        assert!(batch.try_add(&payload("12345")));
        assert!(!batch.try_add(&payload("1")));
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.size_in_bytes(), 10);
    }

    #[test]
    fn test_batch_respects_message_limit() {
        let mut batch = MemoryBatch::new(BatchLimits {
            max_bytes: 1024,
            max_messages: Some(1),
        });

        assert!(batch.try_add(&payload("a")));
        assert!(!batch.try_add(&payload("b")));
    }

    #[tokio::test]
    async fn test_send_records_delivery() {
        let broker = MemoryBroker::new();
        let client = broker.connect(&project(), &FastRetry(1)).await.unwrap();
        let sender = client.create_sender("orders").await.unwrap();

        sender.send(&payload("hello")).await.unwrap();

        let deliveries = broker.deliveries().await;
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].entity_path, "orders");
        assert!(!deliveries[0].batched);
        assert_eq!(broker.connections().await[0].endpoint, "projects/demo");
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let broker = MemoryBroker::new();
        broker.fail_next(BrokerErrorKind::Unavailable, 2).await;

        let client = broker.connect(&project(), &FastRetry(3)).await.unwrap();
        let sender = client.create_sender("orders").await.unwrap();

        sender.send(&payload("hello")).await.unwrap();

        assert_eq!(broker.send_attempts().await, 3);
        assert_eq!(broker.deliveries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_failure_surfaces_after_schedule() {
        let broker = MemoryBroker::new();
        broker.fail_next(BrokerErrorKind::Unavailable, 5).await;

        let client = broker.connect(&project(), &FastRetry(2)).await.unwrap();
        let sender = client.create_sender("orders").await.unwrap();

        let error = sender.send(&payload("hello")).await.unwrap_err();

        assert_eq!(error.kind, BrokerErrorKind::Unavailable);
        assert_eq!(broker.send_attempts().await, 2);
        assert!(broker.deliveries().await.is_empty());
    }

    #[tokio::test]
    async fn test_handles_are_counted() {
        let broker = MemoryBroker::new();
        let client = broker.connect(&project(), &FastRetry(1)).await.unwrap();
        let sender = client.create_sender("orders").await.unwrap();

        assert_eq!(
            broker.open_handles().await,
            HandleCounts {
                clients: 1,
                senders: 1
            }
        );

        sender.close().await.unwrap();
        sender.close().await.unwrap();
        client.close().await.unwrap();

        assert_eq!(broker.open_handles().await, HandleCounts::default());
    }

    #[tokio::test]
    async fn test_closed_sender_rejects_sends() {
        let broker = MemoryBroker::new();
        let client = broker.connect(&project(), &FastRetry(1)).await.unwrap();
        let sender = client.create_sender("orders").await.unwrap();
        sender.close().await.unwrap();

        let error = sender.send(&payload("late")).await.unwrap_err();
        assert_eq!(error.kind, BrokerErrorKind::Closed);
    }

    #[tokio::test]
    async fn test_batch_send_is_one_delivery() {
        let broker = MemoryBroker::new();
        let client = broker.connect(&project(), &FastRetry(1)).await.unwrap();
        let sender = client.create_sender("orders").await.unwrap();

        let mut batch = sender.create_batch().await.unwrap();
        assert!(batch.try_add(&payload(r#"{"id":1}"#)));
        assert!(batch.try_add(&payload(r#"{"id":2}"#)));
        sender.send_batch(batch).await.unwrap();

        let deliveries = broker.deliveries().await;
        assert_eq!(deliveries.len(), 1);
        assert!(deliveries[0].batched);
        assert_eq!(
            deliveries[0].json_bodies(),
            vec![serde_json::json!({"id": 1}), serde_json::json!({"id": 2})]
        );
    }
}
