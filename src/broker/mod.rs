//! Broker client capability
//!
//! Publishers never talk to a broker SDK directly. They go through the traits
//! in this module: a [`BrokerConnector`] opens a [`BrokerClient`] for one
//! endpoint and retry policy, the client hands out per-topic
//! [`BrokerSender`]s, and senders build size-bounded [`MessageBatch`]es.

pub mod memory;

pub use memory::{BatchLimits, ConnectionRecord, Delivery, HandleCounts, MemoryBroker};

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A serialized message ready for the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub message_id: String,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl Payload {
    pub fn new(content_type: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            content_type: content_type.into(),
            body,
        }
    }

    /// Body size in bytes
    pub fn size(&self) -> usize {
        self.body.len()
    }

    /// Lossy UTF-8 rendering of the body, cut at `max_chars`
    pub fn preview(&self, max_chars: usize) -> String {
        let text = String::from_utf8_lossy(&self.body);
        if text.chars().count() <= max_chars {
            return text.into_owned();
        }
        let mut preview: String = text.chars().take(max_chars).collect();
        preview.push_str("...");
        preview
    }
}

/// Connection identity a client is opened for
#[derive(Debug)]
pub enum BrokerEndpoint {
    /// Shared-access connection string (Service Bus)
    ConnectionString(SecretString),
    /// Cloud project (Pub/Sub)
    Project { project_id: String },
}

/// Classification of broker failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BrokerErrorKind {
    Unavailable,
    Timeout,
    Throttled,
    Rejected,
    Closed,
}

impl BrokerErrorKind {
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Unavailable | Self::Timeout | Self::Throttled)
    }
}

/// Failure reported by a broker client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind:?}: {message}")]
pub struct BrokerError {
    pub kind: BrokerErrorKind,
    pub message: String,
}

impl BrokerError {
    pub fn new(kind: BrokerErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

/// Ordered, size-bounded group of payloads sent in one broker call
pub trait MessageBatch: Send + Sync {
    /// Append a payload if it fits within the batch limits
    fn try_add(&mut self, payload: &Payload) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn size_in_bytes(&self) -> usize;

    fn max_size_in_bytes(&self) -> usize;

    fn payloads(&self) -> &[Payload];
}

/// Send capability scoped to one topic
#[async_trait]
pub trait BrokerSender: Send + Sync {
    /// Fully qualified entity the sender publishes to
    fn entity_path(&self) -> &str;

    async fn create_batch(&self) -> Result<Box<dyn MessageBatch>, BrokerError>;

    async fn send(&self, payload: &Payload) -> Result<(), BrokerError>;

    /// Send every payload of the batch in one call; the batch is consumed
    async fn send_batch(&self, batch: Box<dyn MessageBatch>) -> Result<(), BrokerError>;

    async fn close(&self) -> Result<(), BrokerError>;
}

/// Open connection to a broker
#[async_trait]
pub trait BrokerClient: Send + Sync {
    async fn create_sender(&self, topic: &str) -> Result<Box<dyn BrokerSender>, BrokerError>;

    async fn close(&self) -> Result<(), BrokerError>;
}

/// Opens broker clients for an endpoint under a provider retry policy
#[async_trait]
pub trait BrokerConnector<P: Send + Sync + ?Sized>: Send + Sync {
    async fn connect(
        &self,
        endpoint: &BrokerEndpoint,
        policy: &P,
    ) -> Result<Box<dyn BrokerClient>, BrokerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_preview_truncates() {
        let payload = Payload::new("text/plain", b"abcdefghij".to_vec());

        assert_eq!(payload.preview(4), "abcd...");
        assert_eq!(payload.preview(10), "abcdefghij");
    }

    #[test]
    fn test_transient_kinds() {
        assert!(BrokerErrorKind::Unavailable.is_transient());
        assert!(BrokerErrorKind::Throttled.is_transient());
        assert!(!BrokerErrorKind::Rejected.is_transient());
        assert!(!BrokerErrorKind::Closed.is_transient());
    }

    #[test]
    fn test_broker_error_display() {
        let error = BrokerError::new(BrokerErrorKind::Timeout, "deadline exceeded");
        assert_eq!(error.to_string(), "Timeout: deadline exceeded");
        assert!(error.is_transient());
    }
}
