//! Core traits for message publishing
//!
//! [`MessagePublisher`] is the capability every provider implements.
//! [`MessagePublisherExt`] layers typed `publish` / `publish_batch` calls on
//! top of it for any `Serialize` message. [`RetrySettingsTranslator`] turns a
//! flat settings map into a provider retry policy.

use crate::core::config::OptionMap;
use crate::core::error::Result;
use crate::core::retry::RetryPolicy;
use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Retry settings
// ============================================================================

/// Converts provider settings into a provider retry policy
///
/// Translation is pure and fail-fast: the first offending key is reported and
/// no default is ever guessed for a required field.
pub trait RetrySettingsTranslator: Send + Sync {
    type Policy: RetryPolicy + Send + Sync + 'static;

    fn translate(&self, options: &OptionMap) -> Result<Self::Policy>;
}

// ============================================================================
// Publisher
// ============================================================================

/// Static description of a constructed publisher
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublisherInfo {
    /// Provider id the publisher was registered under
    pub provider: &'static str,
    /// Connection identity with secrets masked
    pub endpoint: String,
    /// Translated retry policy, `null` for the broker default
    pub retry: serde_json::Value,
}

/// Publishes messages to topics of one broker family
///
/// Implementations are immutable after construction and safe to share across
/// tasks. Every call acquires its own broker sender and releases it before
/// returning, whatever the outcome.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    fn info(&self) -> PublisherInfo;

    /// Publish one message
    async fn publish_value(
        &self,
        topic: &str,
        message: serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Publish a sequence of messages
    async fn publish_batch_values(
        &self,
        topic: &str,
        messages: Vec<serde_json::Value>,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

/// Typed publishing helpers for every [`MessagePublisher`]
///
/// # Examples
///
/// ```no_run
/// use cloud_messaging::{MessagePublisherExt, MessagePublisherFactory, OptionMap, ProviderOptions};
/// use cloud_messaging::{MemoryBroker, PublisherContext};
///
/// # async fn example() -> cloud_messaging::Result<()> {
/// let broker = MemoryBroker::new();
/// let factory = MessagePublisherFactory::with_builtin_providers(PublisherContext::in_memory(&broker))?;
///
/// let options: OptionMap = [("ProjectId", "demo")].into_iter().collect();
/// let publisher = factory.create(&ProviderOptions::new("GooglePubSub", options))?;
///
/// publisher.publish("orders", &serde_json::json!({"id": 1})).await?;
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait MessagePublisherExt: MessagePublisher {
    async fn publish<T>(&self, topic: &str, message: &T) -> Result<()>
    where
        T: Serialize + Sync + ?Sized,
    {
        self.publish_with_cancel(topic, message, &CancellationToken::new())
            .await
    }

    async fn publish_with_cancel<T>(
        &self,
        topic: &str,
        message: &T,
        cancel: &CancellationToken,
    ) -> Result<()>
    where
        T: Serialize + Sync + ?Sized,
    {
        let value = serde_json::to_value(message)?;
        self.publish_value(topic, value, cancel).await
    }

    async fn publish_batch<T>(&self, topic: &str, messages: &[T]) -> Result<()>
    where
        T: Serialize + Sync,
    {
        self.publish_batch_with_cancel(topic, messages, &CancellationToken::new())
            .await
    }

    async fn publish_batch_with_cancel<T>(
        &self,
        topic: &str,
        messages: &[T],
        cancel: &CancellationToken,
    ) -> Result<()>
    where
        T: Serialize + Sync,
    {
        let values = messages
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        self.publish_batch_values(topic, values, cancel).await
    }
}

impl<P: MessagePublisher + ?Sized> MessagePublisherExt for P {}
